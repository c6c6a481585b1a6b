//! C7: the device discovery registry (spec.md §4.7).
//!
//! A fixed-size pool of fixed-size device-record lists. Populated by
//! feeding it decoded `DEVICE_STATUS` unsolicited frames as they arrive;
//! never pruned by the registry itself — callers release a list's handle
//! when they are done with it (mirrors `dfu_core::Pool`'s handle
//! discipline, which this crate reuses directly rather than re-deriving
//! its own bounded-pool type).
#![cfg_attr(not(test), no_std)]

use dfu_core::{Handle, Pool};
use dfu_wire::DeviceType;

/// One discovered device, keyed for lookup by `(device_type, variant)` or
/// by `physical_address`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceRecord {
    pub physical_address: [u8; 6],
    pub device_type: DeviceType,
    pub variant: u8,
    pub bl_major: u8,
    pub bl_minor: u8,
    pub bl_rev: u8,
    pub status_bits: u8,
    pub core_image_mask: u32,
    pub last_seen_timestamp: u64,
}

/// A bounded list of device records, reserved as a unit from a
/// [`Registry`]'s backing pool.
pub struct DeviceList<const N: usize> {
    records: [Option<DeviceRecord>; N],
}

impl<const N: usize> DeviceList<N> {
    const INIT: Option<DeviceRecord> = None;

    fn new() -> Self {
        DeviceList {
            records: [Self::INIT; N],
        }
    }

    /// Insert a freshly-seen record, or overwrite the existing one keyed
    /// on `(device_type, variant)` and advance its timestamp (spec.md
    /// §4.7: "fields are overwritten and `timestamp` advanced").
    #[allow(clippy::too_many_arguments)]
    pub fn add_or_update(
        &mut self,
        physical_address: [u8; 6],
        device_type: DeviceType,
        variant: u8,
        bl_major: u8,
        bl_minor: u8,
        bl_rev: u8,
        status_bits: u8,
        core_image_mask: u32,
        timestamp: u64,
    ) -> bool {
        for slot in self.records.iter_mut() {
            if let Some(existing) = slot {
                if existing.device_type == device_type && existing.variant == variant {
                    existing.physical_address = physical_address;
                    existing.bl_major = bl_major;
                    existing.bl_minor = bl_minor;
                    existing.bl_rev = bl_rev;
                    existing.status_bits = status_bits;
                    existing.core_image_mask = core_image_mask;
                    existing.last_seen_timestamp = timestamp;
                    return true;
                }
            }
        }
        for slot in self.records.iter_mut() {
            if slot.is_none() {
                *slot = Some(DeviceRecord {
                    physical_address,
                    device_type,
                    variant,
                    bl_major,
                    bl_minor,
                    bl_rev,
                    status_bits,
                    core_image_mask,
                    last_seen_timestamp: timestamp,
                });
                return true;
            }
        }
        false
    }

    pub fn find_by_type_variant(&self, device_type: DeviceType, variant: u8) -> Option<&DeviceRecord> {
        self.records
            .iter()
            .flatten()
            .find(|r| r.device_type == device_type && r.variant == variant)
    }

    pub fn find_by_physical_address(&self, address: [u8; 6]) -> Option<&DeviceRecord> {
        self.records.iter().flatten().find(|r| r.physical_address == address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.records.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.records.iter().filter(|r| r.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle to a reserved [`DeviceList`]. Opaque; obtained from
/// [`Registry::reserve`].
pub type ListHandle = Handle;

/// Pool of `LISTS` device lists, each holding up to `N` records.
pub struct Registry<const LISTS: usize, const N: usize> {
    pool: Pool<DeviceList<N>, LISTS>,
}

impl<const LISTS: usize, const N: usize> Registry<LISTS, N> {
    pub const fn new() -> Self {
        Registry { pool: Pool::new() }
    }

    pub fn reserve(&mut self) -> Option<ListHandle> {
        self.pool.reserve(DeviceList::new())
    }

    pub fn release(&mut self, handle: ListHandle) {
        self.pool.release(handle);
    }

    pub fn list(&self, handle: ListHandle) -> Option<&DeviceList<N>> {
        self.pool.get(handle)
    }

    pub fn list_mut(&mut self, handle: ListHandle) -> Option<&mut DeviceList<N>> {
        self.pool.get_mut(handle)
    }
}

impl<const LISTS: usize, const N: usize> Default for Registry<LISTS, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(variant: u8, timestamp: u64) -> (DeviceType, u8, u64) {
        (DeviceType(1), variant, timestamp)
    }

    #[test]
    fn add_or_update_overwrites_on_matching_key() {
        let mut registry: Registry<2, 4> = Registry::new();
        let handle = registry.reserve().unwrap();
        let list = registry.list_mut(handle).unwrap();

        let (device_type, variant, _) = sample(3, 0);
        list.add_or_update([1, 2, 3, 4, 5, 6], device_type, variant, 1, 0, 0, 0, 0, 100);
        list.add_or_update([9, 9, 9, 9, 9, 9], device_type, variant, 1, 1, 0, 0xFF, 0, 200);

        assert_eq!(list.len(), 1);
        let record = list.find_by_type_variant(device_type, variant).unwrap();
        assert_eq!(record.physical_address, [9, 9, 9, 9, 9, 9]);
        assert_eq!(record.bl_minor, 1);
        assert_eq!(record.status_bits, 0xFF);
        assert_eq!(record.last_seen_timestamp, 200);
    }

    #[test]
    fn find_by_physical_address_locates_record() {
        let mut registry: Registry<1, 4> = Registry::new();
        let handle = registry.reserve().unwrap();
        let list = registry.list_mut(handle).unwrap();
        list.add_or_update([1, 2, 3, 4, 5, 6], DeviceType(2), 0, 1, 0, 0, 0, 0, 1);
        assert!(list.find_by_physical_address([1, 2, 3, 4, 5, 6]).is_some());
        assert!(list.find_by_physical_address([0; 6]).is_none());
    }

    #[test]
    fn list_reservation_is_bounded() {
        let mut registry: Registry<1, 4> = Registry::new();
        let _handle = registry.reserve().unwrap();
        assert!(registry.reserve().is_none());
    }

    #[test]
    fn full_list_refuses_new_distinct_records() {
        let mut registry: Registry<1, 2> = Registry::new();
        let handle = registry.reserve().unwrap();
        let list = registry.list_mut(handle).unwrap();
        assert!(list.add_or_update([0; 6], DeviceType(1), 0, 0, 0, 0, 0, 0, 0));
        assert!(list.add_or_update([0; 6], DeviceType(1), 1, 0, 0, 0, 0, 0, 0));
        assert!(!list.add_or_update([0; 6], DeviceType(1), 2, 0, 0, 0, 0, 0, 0));
    }
}
