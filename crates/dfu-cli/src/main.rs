//! Host CLI wiring `dfu-client`, `dfu-registry`, and `dfu-link-udp`
//! together: discover devices, push a firmware image through a full
//! session, query image status, or request a reboot.

mod crypto;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use dfu_client::{establish_session, send_image, Clock, DfuClient, ProgressSink, Transactor, TransferReport};
use dfu_core::DefaultConfig;
use dfu_link_udp::UdpLink;
use dfu_registry::Registry;
use dfu_wire::{messages, Command, Header};

use crypto::XorChallengeCrypto;

#[derive(Parser, Debug)]
#[command(about = "Command-line controller for the DFU transport protocol")]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Listen for unsolicited DEVICE_STATUS broadcasts and list what answers.
    Discover(DiscoverArgs),
    /// Establish a session, push a firmware image, install it.
    Install(InstallArgs),
    /// Query whether an image slot holds a valid image.
    Status(StatusArgs),
    /// Request the peer reboot (requires an established session).
    Reboot(RebootArgs),
}

#[derive(Parser, Debug)]
struct LinkArgs {
    /// Local UDP address to bind.
    #[arg(long, default_value = "127.0.0.1:4801")]
    bind: SocketAddr,

    /// Address of the device under control.
    #[arg(long, default_value = "127.0.0.1:4800")]
    peer: SocketAddr,

    /// Broadcast address for discovery traffic.
    #[arg(long, default_value = "127.0.0.1:4802")]
    broadcast: SocketAddr,

    /// This host's synthetic 6-byte id, colon-hex.
    #[arg(long, default_value = "01:00:00:00:00:01")]
    local_id: String,
}

#[derive(Parser, Debug)]
struct DiscoverArgs {
    #[command(flatten)]
    link: LinkArgs,

    /// How long to listen before reporting what was found.
    #[arg(long, default_value_t = 3_000)]
    timeout_ms: u64,
}

#[derive(Parser, Debug)]
struct InstallArgs {
    #[command(flatten)]
    link: LinkArgs,

    /// Firmware image to send.
    image: PathBuf,

    /// Destination image slot (1..=96 application, 97..=127 reserved).
    #[arg(long, default_value_t = 1)]
    image_index: u8,

    /// Destination flash address on the peer.
    #[arg(long, default_value_t = 0)]
    addr: u32,

    /// MTU to propose during negotiation.
    #[arg(long, default_value_t = 256)]
    mtu: u16,

    /// Per-transaction timeout.
    #[arg(long, default_value_t = 2_000)]
    timeout_ms: u64,

    /// Shared XOR key for the placeholder challenge crypto (see `crypto.rs`).
    #[arg(long, default_value_t = 0xA5)]
    xor_key: u8,

    /// Reboot the peer once the image is installed, instead of ending the
    /// session cleanly.
    #[arg(long)]
    reboot: bool,
}

#[derive(Parser, Debug)]
struct StatusArgs {
    #[command(flatten)]
    link: LinkArgs,

    /// Image slot to query.
    image_index: u8,

    #[arg(long, default_value_t = 2_000)]
    timeout_ms: u64,
}

#[derive(Parser, Debug)]
struct RebootArgs {
    #[command(flatten)]
    link: LinkArgs,

    #[arg(long, default_value_t = 0)]
    delay_ms: u16,

    #[arg(long, default_value_t = 2_000)]
    timeout_ms: u64,
}

fn parse_device_id(s: &str) -> Result<[u8; 6]> {
    let mut id = [0u8; 6];
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 6 {
        bail!("device id must be 6 colon-separated hex octets, got {s:?}");
    }
    for (i, part) in parts.iter().enumerate() {
        id[i] = u8::from_str_radix(part, 16).with_context(|| format!("invalid hex octet {part:?}"))?;
    }
    Ok(id)
}

fn open_link(args: &LinkArgs) -> Result<UdpLink> {
    UdpLink::bind(args.bind, args.peer, args.broadcast, parse_device_id(&args.local_id)?)
        .with_context(|| format!("binding UDP socket at {}", args.bind))
}

struct CliProgress {
    total: u32,
    last_reported_pct: u32,
}

impl CliProgress {
    fn new(total: u32) -> Self {
        CliProgress { total, last_reported_pct: 0 }
    }
}

impl ProgressSink for CliProgress {
    fn on_chunk_sent(&mut self, bytes_sent: u32, total: u32) {
        let pct = if self.total == 0 { 100 } else { (bytes_sent as u64 * 100 / total.max(1) as u64) as u32 };
        if pct >= self.last_reported_pct + 10 || bytes_sent == total {
            log::info!("transfer progress: {bytes_sent}/{total} bytes ({pct}%)");
            self.last_reported_pct = pct;
        }
    }
}

fn report_transfer(report: TransferReport) {
    log::info!(
        "transfer complete: {} bytes in {}ms ({} B/s)",
        report.bytes_sent, report.elapsed_ms, report.throughput_bytes_per_sec
    );
}

fn cmd_discover(args: DiscoverArgs) -> Result<()> {
    let mut link = open_link(&args.link)?;
    let mut registry: Registry<1, 32> = Registry::new();
    let handle = registry.reserve().expect("a freshly created registry has capacity for one list");

    let deadline = Instant::now() + Duration::from_millis(args.timeout_ms);
    let start = Instant::now();
    while Instant::now() < deadline {
        if let Some((bytes, source)) = link.rx() {
            if !bytes.is_empty() && Header::unpack(bytes[0]).command() == Some(Command::DeviceStatus) {
                if let Ok(status) = messages::decode_device_status(bytes) {
                    let id = source.to_be_bytes();
                    let physical_address = [id[2], id[3], id[4], id[5], id[6], id[7]];
                    let list = registry.list_mut(handle).expect("handle reserved above");
                    list.add_or_update(
                        physical_address,
                        status.device_type,
                        status.variant,
                        status.bl_major,
                        status.bl_minor,
                        status.bl_rev,
                        status.status_bits,
                        0,
                        start.elapsed().as_millis() as u64,
                    );
                }
            }
        }
        std::thread::sleep(Duration::from_millis(5));
    }

    let list = registry.list(handle).expect("handle reserved above");
    if list.is_empty() {
        log::warn!("no devices discovered within {}ms", args.timeout_ms);
        return Ok(());
    }
    for record in list.iter() {
        println!(
            "{:02x?}  type={} variant={}  bootloader v{}.{}.{}  status=0x{:02x}  last_seen={}ms",
            record.physical_address,
            record.device_type.0,
            record.variant,
            record.bl_major,
            record.bl_minor,
            record.bl_rev,
            record.status_bits,
            record.last_seen_timestamp,
        );
    }
    Ok(())
}

fn cmd_install(args: InstallArgs) -> Result<()> {
    let mut link = open_link(&args.link)?;
    let mut client: DfuClient<UdpLink, DefaultConfig> = DfuClient::new();
    let clock = Clock::new();
    let now_ms = || clock.now_ms();

    let mut crypto = XorChallengeCrypto::new(args.xor_key);
    establish_session(&mut client, &mut link, &mut crypto, args.mtu, args.timeout_ms, &now_ms)
        .map_err(|e| anyhow::anyhow!("session handshake failed: {e}"))?;
    log::info!("session established, negotiated mtu={}", client.mtu());

    let firmware = std::fs::read(&args.image).with_context(|| format!("reading {}", args.image.display()))?;
    log::info!("sending {} bytes to image slot {}", firmware.len(), args.image_index);

    let mut progress = CliProgress::new(firmware.len() as u32);
    let report = send_image(
        &mut client,
        &mut link,
        args.image_index,
        args.addr,
        &firmware,
        false,
        args.timeout_ms,
        &now_ms,
        &mut progress,
    )
    .map_err(|failure| {
        anyhow::anyhow!(
            "transfer failed after {} bytes at chunk {}: {}",
            failure.bytes_sent, failure.failing_chunk_index, failure.error
        )
    })?;
    report_transfer(report);

    client
        .install_image(&mut link, args.timeout_ms)
        .map_err(|e| anyhow::anyhow!("install_image rejected: {e}"))?;
    log::info!("image installed");

    if args.reboot {
        client
            .reboot(&mut link, 0, args.timeout_ms)
            .map_err(|e| anyhow::anyhow!("reboot rejected: {e}"))?;
        log::info!("reboot requested");
    } else {
        client
            .end_session(&mut link, args.timeout_ms)
            .map_err(|e| anyhow::anyhow!("end_session failed: {e}"))?;
        log::info!("session ended cleanly");
    }
    Ok(())
}

fn cmd_status(args: StatusArgs) -> Result<()> {
    let mut link = open_link(&args.link)?;
    let mut transactor: Transactor<UdpLink, DefaultConfig> = Transactor::new();

    let mut frame = [0u8; 8];
    let len = messages::build_image_status_query(&mut frame, transactor.engine().toggle(), args.image_index)
        .map_err(|e| anyhow::anyhow!("encoding image_status query: {e}"))?;
    transactor
        .run(&mut link, Command::ImageStatus, &frame[..len], args.timeout_ms)
        .map_err(|e| anyhow::anyhow!("image_status query failed: {e}"))?;
    let status = messages::decode_image_status_response(transactor.response())
        .map_err(|e| anyhow::anyhow!("decoding image_status response: {e}"))?;
    println!("image {}: {}", status.image_index, if status.valid { "valid" } else { "invalid/empty" });
    Ok(())
}

fn cmd_reboot(args: RebootArgs) -> Result<()> {
    let mut link = open_link(&args.link)?;
    let mut transactor: Transactor<UdpLink, DefaultConfig> = Transactor::new();

    let mut frame = [0u8; 8];
    let len = messages::build_reboot(
        &mut frame,
        transactor.engine().toggle(),
        dfu_wire::MsgType::Command,
        args.delay_ms,
    )
    .map_err(|e| anyhow::anyhow!("encoding reboot request: {e}"))?;
    transactor
        .run(&mut link, Command::Reboot, &frame[..len], args.timeout_ms)
        .map_err(|e| anyhow::anyhow!("reboot rejected: {e}"))?;
    log::info!("reboot acknowledged");
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Cmd::Discover(args) => cmd_discover(args),
        Cmd::Install(args) => cmd_install(args),
        Cmd::Status(args) => cmd_status(args),
        Cmd::Reboot(args) => cmd_reboot(args),
    }
}
