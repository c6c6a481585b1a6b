mod support;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use dfu_client::DfuClient;
use dfu_core::{DefaultConfig, EnginePool, HandlerArgs, Responder, Target};
use dfu_wire::{messages, Command, MsgType};

struct DeviceCtx {
    challenge: u32,
}

fn on_begin_session(
    ctx: &mut DeviceCtx,
    responder: &mut Responder<'_, support::LoopbackLink>,
    _args: &HandlerArgs<'_>,
) -> Result<(), ()> {
    let mut buf = [0u8; 8];
    let len = messages::build_begin_session_response(&mut buf, true, ctx.challenge).map_err(|_| ())?;
    responder.send_msg(&buf[..len], Target::Sender).then_some(()).ok_or(())
}

fn on_negotiate_mtu(
    _ctx: &mut DeviceCtx,
    responder: &mut Responder<'_, support::LoopbackLink>,
    args: &HandlerArgs<'_>,
) -> Result<(), ()> {
    let proposed = messages::decode_negotiate_mtu(args.frame).map_err(|_| ())?;
    let accepted = proposed.min(256);
    let mut buf = [0u8; 8];
    let len = messages::build_negotiate_mtu(&mut buf, true, MsgType::Response, accepted).map_err(|_| ())?;
    responder.send_msg(&buf[..len], Target::Sender).then_some(()).ok_or(())
}

/// Runs a minimal device-side bootloader stub on a background thread
/// until `stop` is set, so the client's synchronous transactions on the
/// main thread have a peer to talk to.
fn spawn_device(mut link: support::LoopbackLink, stop: Arc<AtomicBool>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut pool: EnginePool<support::LoopbackLink, DeviceCtx, DefaultConfig, 4, 1> = EnginePool::new();
        let handle = pool.create(0).expect("fresh single-instance pool has room");
        let device = pool.get_mut(handle).expect("just-created handle is valid");
        device.install_handler(Command::BeginSession, on_begin_session);
        device.install_handler(Command::NegotiateMtu, on_negotiate_mtu);
        let mut ctx = DeviceCtx { challenge: 0xC0FFEE };

        let start = Instant::now();
        while !stop.load(Ordering::Relaxed) {
            let device = pool.get_mut(handle).expect("handle stays valid for the thread's lifetime");
            device.drive(&mut link, &mut ctx, start.elapsed().as_millis() as u64);
            thread::sleep(Duration::from_millis(1));
        }
        pool.destroy(handle);
    })
}

#[test]
fn begin_session_and_negotiate_mtu_round_trip() {
    let (device_link, client_link) = support::pair();
    let stop = Arc::new(AtomicBool::new(false));
    let device_thread = spawn_device(device_link, stop.clone());

    let mut client: DfuClient<support::LoopbackLink, DefaultConfig> = DfuClient::new();
    let mut link = client_link;

    let challenge = client
        .begin_session(&mut link, 2_000)
        .expect("device replied to begin_session");
    assert_eq!(challenge, 0xC0FFEE);

    let accepted = client
        .negotiate_mtu(&mut link, 128, 2_000)
        .expect("device replied to negotiate_mtu");
    assert_eq!(accepted, 128);
    assert_eq!(client.mtu(), 128);

    stop.store(true, Ordering::Relaxed);
    device_thread.join().unwrap();
}
