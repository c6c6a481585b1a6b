//! A concrete `LinkAdapter` over `std::net::UdpSocket` (spec.md §6's
//! "representative, Ethernet raw" envelope, adapted to a point-to-point
//! UDP socket instead of a raw AF_PACKET socket — see `DESIGN.md`).
//!
//! The engine's non-blocking contract (`rx` never blocks) rules out an
//! async socket here; `UdpSocket::set_nonblocking` plus `WouldBlock` is
//! the natural std fit, so this adapter stays synchronous even though
//! the teacher's own network tooling (`debug-net-client`) is `tokio`-based.

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};

use dfu_core::{LinkAdapter, Target};

/// Length of a synthetic device id, reusing the 6-byte width of a MAC
/// address without requiring real link-layer access.
pub const DEVICE_ID_LEN: usize = 6;
const ENVELOPE_HEADER_LEN: usize = DEVICE_ID_LEN * 2 + 2;
/// Minimum envelope size, padded with zeroes below this (spec.md §6:
/// "minimum frame padding to 60 bytes if needed").
const MIN_ENVELOPE_LEN: usize = 60;
const MAX_ENVELOPE_LEN: usize = dfu_core_max_envelope_len();

const fn dfu_core_max_envelope_len() -> usize {
    // `dfu_wire::MAX_MSG_LEN` plus the envelope header and padding floor.
    1500 + ENVELOPE_HEADER_LEN
}

pub const BROADCAST_ID: [u8; DEVICE_ID_LEN] = [0xFF; DEVICE_ID_LEN];

/// A `LinkAdapter` carrying DFU frames inside a synthetic Ethernet-shaped
/// envelope over one UDP socket paired with one peer address. Discovery
/// broadcasts (`Target::Any`) are sent to `broadcast_addr`.
pub struct UdpLink {
    socket: UdpSocket,
    local_id: [u8; DEVICE_ID_LEN],
    peer_addr: SocketAddr,
    broadcast_addr: SocketAddr,
    source_filter: Option<[u8; DEVICE_ID_LEN]>,
    last_sender_id: [u8; DEVICE_ID_LEN],
    rx_buf: [u8; MAX_ENVELOPE_LEN],
    rx_payload: [u8; 1500],
}

impl UdpLink {
    /// Bind a non-blocking UDP socket at `local_addr`, paired with
    /// `peer_addr` for unicast sends and `broadcast_addr` for discovery.
    pub fn bind(
        local_addr: SocketAddr,
        peer_addr: SocketAddr,
        broadcast_addr: SocketAddr,
        local_id: [u8; DEVICE_ID_LEN],
    ) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(local_addr)?;
        socket.set_nonblocking(true)?;
        Ok(UdpLink {
            socket,
            local_id,
            peer_addr,
            broadcast_addr,
            source_filter: None,
            last_sender_id: [0; DEVICE_ID_LEN],
            rx_buf: [0u8; MAX_ENVELOPE_LEN],
            rx_payload: [0u8; 1500],
        })
    }

    /// Only accept frames whose envelope source id matches `id`; frames
    /// from any other id are reported via `err` and dropped.
    pub fn set_source_filter(&mut self, id: Option<[u8; DEVICE_ID_LEN]>) {
        self.source_filter = id;
    }

    pub fn local_id(&self) -> [u8; DEVICE_ID_LEN] {
        self.local_id
    }

    fn build_envelope(&self, dest_id: [u8; DEVICE_ID_LEN], payload: &[u8]) -> heapless::Vec<u8, MAX_ENVELOPE_LEN> {
        let mut buf: heapless::Vec<u8, MAX_ENVELOPE_LEN> = heapless::Vec::new();
        let _ = buf.extend_from_slice(&dest_id);
        let _ = buf.extend_from_slice(&self.local_id);
        let _ = buf.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        let _ = buf.extend_from_slice(payload);
        while buf.len() < MIN_ENVELOPE_LEN {
            let _ = buf.push(0);
        }
        buf
    }
}

impl LinkAdapter for UdpLink {
    fn rx(&mut self) -> Option<(&[u8], u64)> {
        let n = match self.socket.recv(&mut self.rx_buf) {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::WouldBlock => return None,
            Err(e) => {
                log::debug!("dfu-link-udp recv error: {e}");
                return None;
            }
        };
        if n < ENVELOPE_HEADER_LEN {
            self.err(None, "envelope shorter than header");
            return None;
        }
        let src_id: [u8; DEVICE_ID_LEN] = self.rx_buf[DEVICE_ID_LEN..2 * DEVICE_ID_LEN].try_into().unwrap();
        let len = u16::from_be_bytes([self.rx_buf[2 * DEVICE_ID_LEN], self.rx_buf[2 * DEVICE_ID_LEN + 1]]) as usize;
        if n < ENVELOPE_HEADER_LEN + len {
            self.err(None, "envelope length prefix exceeds datagram size");
            return None;
        }
        if let Some(filter) = self.source_filter {
            if filter != src_id {
                self.err(None, "frame from unfiltered source id");
                return None;
            }
        }
        self.last_sender_id = src_id;
        self.rx_payload[..len].copy_from_slice(&self.rx_buf[ENVELOPE_HEADER_LEN..ENVELOPE_HEADER_LEN + len]);
        let source = u64::from_be_bytes([0, 0, src_id[0], src_id[1], src_id[2], src_id[3], src_id[4], src_id[5]]);
        Some((&self.rx_payload[..len], source))
    }

    fn tx(&mut self, bytes: &[u8], target: Target) -> bool {
        let (dest_id, addr) = match target {
            Target::Sender => (self.last_sender_id, self.peer_addr),
            Target::Any => (BROADCAST_ID, self.broadcast_addr),
        };
        let envelope = self.build_envelope(dest_id, bytes);
        self.socket.send_to(envelope.as_slice(), addr).is_ok()
    }

    fn err(&mut self, _bytes: Option<&[u8]>, message: &str) {
        log::warn!("dfu-link-udp: {message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_round_trip_preserves_payload_and_source_id() {
        let local_a: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let local_b: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let broadcast: SocketAddr = "127.0.0.1:9".parse().unwrap();

        let mut a = UdpLink::bind(local_a, local_b, broadcast, [1, 0, 0, 0, 0, 1]).unwrap();
        let a_addr = a.socket.local_addr().unwrap();
        let mut b = UdpLink::bind(local_b, a_addr, broadcast, [2, 0, 0, 0, 0, 2]).unwrap();
        // re-bind `a`'s notion of `b`'s address now that `b`'s ephemeral
        // port is known.
        let b_addr = b.socket.local_addr().unwrap();
        a.peer_addr = b_addr;

        assert!(a.tx(&[0xAA, 0xBB, 0xCC], Target::Any));

        let mut received = None;
        for _ in 0..200 {
            if let Some((bytes, source)) = b.rx() {
                received = Some((bytes.to_vec(), source));
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        let (bytes, source) = received.expect("frame delivered over loopback UDP");
        assert_eq!(bytes, vec![0xAA, 0xBB, 0xCC]);
        assert_eq!(source, u64::from_be_bytes([0, 0, 1, 0, 0, 0, 0, 1]));
    }
}
