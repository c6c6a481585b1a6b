//! C6: the session sequencer (spec.md §4.6). Composes C4's transactions
//! and C5's transfer orchestrator into the handshake that promotes a
//! session from `INACTIVE` to `ACTIVE`.

use dfu_core::{LinkAdapter, ProtocolConfig};
use dfu_wire::CHALLENGE_IMAGE_INDEX;

use crate::client::DfuClient;
use crate::error::TransactionError;
use crate::transfer::{send_image, ProgressSink};

/// External crypto collaborator (spec.md §6: "the engine never sees keys
/// or cleartext"). Encrypts the session challenge with the peer's public
/// key; the device decrypts and compares during `install_image` on the
/// reserved challenge slot.
pub trait ChallengeCrypto {
    fn encrypt_challenge(&mut self, challenge: u32) -> heapless::Vec<u8, 256>;
}

/// Run the full handshake: `begin_session` → `negotiate_mtu` → encrypt
/// the challenge → transfer it at `CHALLENGE_IMAGE_INDEX` →
/// `install_image`. On any failure, `end_session` is called and the
/// original error is returned (spec.md §4.6, step 6).
pub fn establish_session<L, Cfg, const PERIODIC: usize>(
    client: &mut DfuClient<L, Cfg, PERIODIC>,
    link: &mut L,
    crypto: &mut dyn ChallengeCrypto,
    proposed_mtu: u16,
    timeout_ms: u64,
    now_ms: impl Fn() -> u64,
) -> Result<(), TransactionError>
where
    L: LinkAdapter,
    Cfg: ProtocolConfig,
{
    match run_handshake(client, link, crypto, proposed_mtu, timeout_ms, now_ms) {
        Ok(()) => Ok(()),
        Err(e) => {
            log::warn!("session handshake failed, tearing down: {e}");
            let _ = client.end_session(link, timeout_ms);
            Err(e)
        }
    }
}

fn run_handshake<L, Cfg, const PERIODIC: usize>(
    client: &mut DfuClient<L, Cfg, PERIODIC>,
    link: &mut L,
    crypto: &mut dyn ChallengeCrypto,
    proposed_mtu: u16,
    timeout_ms: u64,
    now_ms: impl Fn() -> u64,
) -> Result<(), TransactionError>
where
    L: LinkAdapter,
    Cfg: ProtocolConfig,
{
    let challenge = client.begin_session(link, timeout_ms)?;
    client.negotiate_mtu(link, proposed_mtu, timeout_ms)?;

    let encrypted = crypto.encrypt_challenge(challenge);

    let mut no_progress = ();
    send_image(
        client,
        link,
        CHALLENGE_IMAGE_INDEX,
        0,
        &encrypted,
        true,
        timeout_ms,
        &now_ms,
        &mut no_progress as &mut dyn ProgressSink,
    )
    .map_err(|failure| failure.error)?;

    client.install_image(link, timeout_ms)?;
    Ok(())
}
