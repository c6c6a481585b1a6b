//! A simulated DFU target: a device-side `dfu_core::Engine` instance
//! driven over `dfu-link-udp`, standing in for real bootloader firmware
//! so `dfu-cli` (and this binary's own log output) have a peer to talk
//! to during development. Naming loosely follows
//! `drv/lpc55-update-server`'s `UpdateState` vocabulary, minus its
//! `ringbuf` tracing (not part of this workspace's dependency set) in
//! favor of plain `log`.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;

use dfu_core::{DefaultConfig, EnginePool, HandlerArgs, Responder, SessionState, Target};
use dfu_link_udp::UdpLink;
use dfu_wire::{messages, Command, DeviceStatus, DeviceType, MsgType};

/// "Decrypt" stand-in for the session-establishment challenge artifact.
/// The real transform is an opaque collaborator the protocol never
/// specifies; this target just XORs against a fixed demo key so the
/// round trip is reversible without pulling in a crypto crate for a
/// simulator.
const DEMO_XOR_KEY: u8 = 0xA5;

fn demo_decrypt_challenge(bytes: &[u8]) -> Option<u32> {
    if bytes.len() < 4 {
        return None;
    }
    let mut word = [0u8; 4];
    for (i, b) in bytes[..4].iter().enumerate() {
        word[i] = b ^ DEMO_XOR_KEY;
    }
    Some(u32::from_le_bytes(word))
}

#[derive(Parser, Debug)]
#[command(about = "Simulated DFU target bootloader, for manual testing against dfu-cli")]
struct Args {
    /// Local UDP address to bind.
    #[arg(long, default_value = "127.0.0.1:4800")]
    bind: SocketAddr,

    /// Address of the controlling host; unicast replies go here until a
    /// command arrives from elsewhere.
    #[arg(long, default_value = "127.0.0.1:4801")]
    peer: SocketAddr,

    /// Broadcast address used for unsolicited DEVICE_STATUS/KEEP_ALIVE.
    #[arg(long, default_value = "127.0.0.1:4802")]
    broadcast: SocketAddr,

    /// Synthetic 6-byte device id, colon-hex (`aa:bb:cc:dd:ee:ff`).
    #[arg(long, default_value = "02:00:00:00:00:01")]
    id: String,

    /// Device type reported in DEVICE_STATUS (bits 7..3 of the type/variant byte).
    #[arg(long, default_value_t = 1)]
    device_type: u8,

    /// Device variant reported in DEVICE_STATUS (bits 2..0).
    #[arg(long, default_value_t = 0)]
    variant: u8,
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

/// In-memory "flash": each slot holds the bytes received for that image
/// index once `INSTALL_IMAGE` has accepted it.
struct Flash {
    images: BTreeMap<u8, Vec<u8>>,
}

/// State for a transfer in progress, from `BEGIN_RCV` through
/// `RCV_COMPLETE`.
struct Transfer {
    index: u8,
    encrypted: bool,
    expected_size: u32,
    data: Vec<u8>,
}

struct TargetCtx {
    challenge: u32,
    transfer: Option<Transfer>,
    flash: Flash,
    bl_version: (u8, u8, u8),
    device_type: u8,
    variant: u8,
    status_bits: u8,
    should_reboot: bool,
}

impl TargetCtx {
    fn new(device_type: u8, variant: u8) -> Self {
        TargetCtx {
            challenge: 0,
            transfer: None,
            flash: Flash { images: BTreeMap::new() },
            bl_version: (1, 0, 0),
            device_type,
            variant,
            status_bits: 0,
            should_reboot: false,
        }
    }
}

fn on_begin_session(
    ctx: &mut TargetCtx,
    responder: &mut Responder<'_, UdpLink>,
    _args: &HandlerArgs<'_>,
) -> Result<(), ()> {
    // A real bootloader would draw this from an RNG/TRNG; a fixed seed
    // mixed with the uptime keeps this simulator deterministic enough to
    // script against while still varying run to run.
    ctx.challenge = 0xC0FF_EE00 ^ (Instant::now().elapsed().subsec_nanos());
    let mut buf = [0u8; 8];
    let len = messages::build_begin_session_response(&mut buf, true, ctx.challenge).map_err(|_| ())?;
    log::info!("BEGIN_SESSION: issuing challenge {:#010x}", ctx.challenge);
    responder.send_msg(&buf[..len], Target::Sender).then_some(()).ok_or(())
}

fn on_negotiate_mtu(
    _ctx: &mut TargetCtx,
    responder: &mut Responder<'_, UdpLink>,
    args: &HandlerArgs<'_>,
) -> Result<(), ()> {
    let proposed = messages::decode_negotiate_mtu(args.frame).map_err(|_| ())?;
    let accepted = proposed.clamp(1, dfu_wire::MAX_MSG_LEN as u16);
    let mut buf = [0u8; 8];
    let len = messages::build_negotiate_mtu(&mut buf, true, MsgType::Response, accepted).map_err(|_| ())?;
    log::info!("NEGOTIATE_MTU: proposed {proposed}, accepted {accepted}");
    responder.send_msg(&buf[..len], Target::Sender).then_some(()).ok_or(())
}

fn on_begin_rcv(
    ctx: &mut TargetCtx,
    responder: &mut Responder<'_, UdpLink>,
    args: &HandlerArgs<'_>,
) -> Result<(), ()> {
    let parsed = messages::decode_begin_rcv(args.frame).map_err(|_| ())?;
    log::info!(
        "BEGIN_RCV: image {} size {} addr {:#x} encrypted {}",
        parsed.image_index, parsed.image_size, parsed.image_addr, parsed.encrypted
    );
    ctx.transfer = Some(Transfer {
        index: parsed.image_index,
        encrypted: parsed.encrypted,
        expected_size: parsed.image_size,
        data: Vec::with_capacity(parsed.image_size as usize),
    });
    if responder.send_ack(Command::BeginRcv) {
        Ok(())
    } else {
        Err(())
    }
}

fn on_rcv_data(
    ctx: &mut TargetCtx,
    responder: &mut Responder<'_, UdpLink>,
    args: &HandlerArgs<'_>,
) -> Result<(), ()> {
    let payload = messages::decode_rcv_data(args.frame).map_err(|_| ())?;
    let Some(transfer) = ctx.transfer.as_mut() else {
        responder.send_nak(Command::RcvData);
        return Err(());
    };
    transfer.data.extend_from_slice(payload);
    if responder.send_ack(Command::RcvData) {
        Ok(())
    } else {
        Err(())
    }
}

fn on_rcv_complete(
    ctx: &mut TargetCtx,
    responder: &mut Responder<'_, UdpLink>,
    args: &HandlerArgs<'_>,
) -> Result<(), ()> {
    let total = messages::decode_rcv_complete(args.frame).map_err(|_| ())?;
    let matches = ctx
        .transfer
        .as_ref()
        .map(|t| t.data.len() as u32 == total && total == t.expected_size)
        .unwrap_or(false);
    if !matches {
        log::warn!("RCV_COMPLETE: byte count mismatch (reported {total})");
        responder.send_nak(Command::RcvComplete);
        ctx.transfer = None;
        return Err(());
    }
    log::info!("RCV_COMPLETE: {total} bytes received");
    if responder.send_ack(Command::RcvComplete) {
        Ok(())
    } else {
        Err(())
    }
}

fn on_install_image(
    ctx: &mut TargetCtx,
    responder: &mut Responder<'_, UdpLink>,
    _args: &HandlerArgs<'_>,
) -> Result<(), ()> {
    let Some(transfer) = ctx.transfer.take() else {
        responder.send_nak(Command::InstallImage);
        return Err(());
    };

    if transfer.index == dfu_wire::CHALLENGE_IMAGE_INDEX {
        let decrypted = transfer.encrypted.then(|| demo_decrypt_challenge(&transfer.data)).flatten();
        if decrypted != Some(ctx.challenge) {
            log::warn!("INSTALL_IMAGE: challenge mismatch, refusing to promote session");
            responder.send_nak(Command::InstallImage);
            return Err(());
        }
        log::info!("INSTALL_IMAGE: challenge verified, session promoted to ACTIVE");
        responder.set_session_state(SessionState::Active);
    } else {
        log::info!("INSTALL_IMAGE: installing image {} ({} bytes)", transfer.index, transfer.data.len());
        ctx.flash.images.insert(transfer.index, transfer.data);
    }

    if responder.send_ack(Command::InstallImage) {
        Ok(())
    } else {
        Err(())
    }
}

fn on_end_session(
    ctx: &mut TargetCtx,
    responder: &mut Responder<'_, UdpLink>,
    _args: &HandlerArgs<'_>,
) -> Result<(), ()> {
    ctx.transfer = None;
    log::info!("END_SESSION");
    if responder.send_ack(Command::EndSession) {
        Ok(())
    } else {
        Err(())
    }
}

fn on_reboot(
    ctx: &mut TargetCtx,
    responder: &mut Responder<'_, UdpLink>,
    args: &HandlerArgs<'_>,
) -> Result<(), ()> {
    let delay_ms = messages::decode_reboot(args.frame).map_err(|_| ())?;
    log::info!("REBOOT: requested with {delay_ms}ms delay, simulator will exit");
    ctx.should_reboot = true;
    if responder.send_ack(Command::Reboot) {
        Ok(())
    } else {
        Err(())
    }
}

fn on_image_status(
    ctx: &mut TargetCtx,
    responder: &mut Responder<'_, UdpLink>,
    args: &HandlerArgs<'_>,
) -> Result<(), ()> {
    let index = messages::decode_image_status_query(args.frame).map_err(|_| ())?;
    let valid = ctx.flash.images.contains_key(&index);
    let mut buf = [0u8; 8];
    let len =
        messages::build_image_status_response(&mut buf, true, index, valid, [ctx.bl_version.0, ctx.bl_version.1])
            .map_err(|_| ())?;
    responder.send_msg(&buf[..len], Target::Sender).then_some(()).ok_or(())
}

fn periodic_device_status(ctx: &mut TargetCtx, responder: &mut Responder<'_, UdpLink>) {
    let status = DeviceStatus {
        bl_major: ctx.bl_version.0,
        bl_minor: ctx.bl_version.1,
        bl_rev: ctx.bl_version.2,
        status_bits: ctx.status_bits,
        device_type: DeviceType(ctx.device_type),
        variant: ctx.variant,
        uptime_minutes: 0,
    };
    let mut buf = [0u8; 9];
    if let Ok(len) = messages::build_device_status(&mut buf, true, MsgType::Unsolicited, &status) {
        responder.send_msg(&buf[..len], Target::Any);
    }
}

fn periodic_keep_alive(_ctx: &mut TargetCtx, responder: &mut Responder<'_, UdpLink>) {
    let mut buf = [0u8; 1];
    if let Ok(len) = messages::build_keep_alive(&mut buf, true) {
        responder.send_msg(&buf[..len], Target::Any);
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let local_id = parse_device_id(&args.id)?;

    let mut link = UdpLink::bind(args.bind, args.peer, args.broadcast, local_id)
        .with_context(|| format!("binding UDP socket at {}", args.bind))?;
    log::info!("dfu-target-sim listening on {} (id {})", args.bind, args.id);

    let mut engine_pool: EnginePool<UdpLink, TargetCtx, DefaultConfig, 2, 1> = EnginePool::new();
    let engine_handle = engine_pool
        .create(0)
        .expect("a freshly constructed single-instance pool has room for this simulator's engine");
    {
        let engine = engine_pool
            .get_mut(engine_handle)
            .expect("just-created handle is valid");
        engine.install_handler(Command::BeginSession, on_begin_session);
        engine.install_handler(Command::NegotiateMtu, on_negotiate_mtu);
        engine.install_handler(Command::BeginRcv, on_begin_rcv);
        engine.install_handler(Command::RcvData, on_rcv_data);
        engine.install_handler(Command::RcvComplete, on_rcv_complete);
        engine.install_handler(Command::InstallImage, on_install_image);
        engine.install_handler(Command::EndSession, on_end_session);
        engine.install_handler(Command::Reboot, on_reboot);
        engine.install_handler(Command::ImageStatus, on_image_status);
        engine.install_periodic(periodic_device_status, 5_000, 0);
        engine.install_periodic(periodic_keep_alive, 2_000, 0);
    }

    let mut ctx = TargetCtx::new(args.device_type, args.variant);
    let start = Instant::now();
    loop {
        let now_ms = start.elapsed().as_millis() as u64;
        let engine = engine_pool
            .get_mut(engine_handle)
            .expect("handle stays valid for the simulator's lifetime");
        engine.drive(&mut link, &mut ctx, now_ms);
        if ctx.should_reboot {
            log::info!("simulated reboot, exiting");
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    engine_pool.destroy(engine_handle);

    Ok(())
}
