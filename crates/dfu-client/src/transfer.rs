//! C5: the image transfer orchestrator (spec.md §4.5). Ships a byte
//! stream of known length into `(image_index, flash_address)` on a peer,
//! chunked to `MTU - 1` bytes per `RCV_DATA`, strictly in source order.

use dfu_core::{LinkAdapter, ProtocolConfig};

use crate::client::DfuClient;
use crate::error::TransferFailure;

/// Receives progress updates as a transfer proceeds. Optional; a no-op
/// implementation is provided for `()`.
pub trait ProgressSink {
    fn on_chunk_sent(&mut self, bytes_sent: u32, total: u32);
}

impl ProgressSink for () {
    fn on_chunk_sent(&mut self, _bytes_sent: u32, _total: u32) {}
}

/// Summary of a completed transfer, reported to the caller (spec.md
/// §4.5, step 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReport {
    pub elapsed_ms: u64,
    pub throughput_bytes_per_sec: u64,
    pub bytes_sent: u32,
}

/// Ship `data` into `image_index` at `addr` on the peer behind `client`.
#[allow(clippy::too_many_arguments)]
pub fn send_image<L, Cfg, const PERIODIC: usize>(
    client: &mut DfuClient<L, Cfg, PERIODIC>,
    link: &mut L,
    image_index: u8,
    addr: u32,
    data: &[u8],
    encrypted: bool,
    timeout_ms: u64,
    now_ms: impl Fn() -> u64,
    progress: &mut dyn ProgressSink,
) -> Result<TransferReport, TransferFailure>
where
    L: LinkAdapter,
    Cfg: ProtocolConfig,
{
    let start = now_ms();
    let total = data.len() as u32;

    client
        .begin_rcv(link, image_index, total, addr, encrypted, timeout_ms)
        .map_err(|error| TransferFailure {
            error,
            bytes_sent: 0,
            failing_chunk_index: 0,
        })?;

    let mut sent: u32 = 0;
    let mut chunk_index: u32 = 0;
    while (sent as usize) < data.len() {
        let mtu = client.mtu();
        let chunk_len = (mtu.saturating_sub(1) as usize).min(data.len() - sent as usize);
        let chunk = &data[sent as usize..sent as usize + chunk_len];

        client.rcv_data(link, chunk, timeout_ms).map_err(|error| TransferFailure {
            error,
            bytes_sent: sent,
            failing_chunk_index: chunk_index,
        })?;

        sent += chunk_len as u32;
        chunk_index += 1;
        progress.on_chunk_sent(sent, total);
    }

    client.rcv_complete(link, sent, timeout_ms).map_err(|error| TransferFailure {
        error,
        bytes_sent: sent,
        failing_chunk_index: chunk_index,
    })?;

    let elapsed_ms = now_ms().saturating_sub(start).max(1);
    let throughput_bytes_per_sec = (sent as u64 * 1000) / elapsed_ms;

    Ok(TransferReport {
        elapsed_ms,
        throughput_bytes_per_sec,
        bytes_sent: sent,
    })
}

