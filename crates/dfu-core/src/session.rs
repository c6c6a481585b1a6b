use dfu_wire::Command;

/// Session state (spec.md §3's "small bitmap of `{INACTIVE, STARTING,
/// ACTIVE}`").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Inactive,
    Starting,
    Active,
}

/// Bitmask over `SessionState`, used to declare which states a command is
/// permitted in (spec.md §3: "Every command entry in the dispatch table
/// declares an allowed-state mask").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionMask(u8);

impl SessionMask {
    pub const INACTIVE: SessionMask = SessionMask(1 << 0);
    pub const STARTING: SessionMask = SessionMask(1 << 1);
    pub const ACTIVE: SessionMask = SessionMask(1 << 2);
    pub const ANY: SessionMask =
        SessionMask(Self::INACTIVE.0 | Self::STARTING.0 | Self::ACTIVE.0);

    pub const fn or(self, other: SessionMask) -> SessionMask {
        SessionMask(self.0 | other.0)
    }

    pub fn allows(self, state: SessionState) -> bool {
        let bit = match state {
            SessionState::Inactive => Self::INACTIVE.0,
            SessionState::Starting => Self::STARTING.0,
            SessionState::Active => Self::ACTIVE.0,
        };
        self.0 & bit != 0
    }
}

/// The allowed-state mask for each command.
///
/// `BEGIN_SESSION` is dispatchable from any state (`dfu_proto.c`'s
/// dispatch table lists `SESSION_STATE_INACTIVE | SESSION_STATE_ACTIVE |
/// SESSION_STATE_STARTING` for it), so a client whose prior `BEGIN_SESSION`
/// response was lost can simply retry instead of being rejected until a
/// timeout reverts the session. The image-transfer family
/// (`BEGIN_RCV`/`RCV_DATA`/`RCV_COMPLETE`/`ABORT_XFER`/`INSTALL_IMAGE`/
/// `BEGIN_SEND`/`SEND_DATA`/`IMAGE_STATUS`) is allowed in both `STARTING`
/// (the session sequencer's challenge transfer, C6) and `ACTIVE` (ordinary
/// firmware transfer, C5). `END_SESSION` tears down from either non-idle
/// state. `DEVICE_STATUS`/`KEEP_ALIVE` are unsolicited broadcasts and are
/// always permitted. `NEGOTIATE_MTU` happens during the handshake or while
/// already active. `REBOOT` requires a fully established session.
pub fn allowed_mask(command: Command) -> SessionMask {
    use Command::*;
    match command {
        BeginSession => SessionMask::ANY,
        NegotiateMtu => SessionMask::STARTING.or(SessionMask::ACTIVE),
        BeginRcv | RcvData | RcvComplete | AbortXfer | InstallImage
        | BeginSend | SendData | ImageStatus => {
            SessionMask::STARTING.or(SessionMask::ACTIVE)
        }
        EndSession => SessionMask::STARTING.or(SessionMask::ACTIVE),
        Reboot => SessionMask::ACTIVE,
        DeviceStatus | KeepAlive => SessionMask::ANY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_session_dispatchable_from_any_state() {
        // a lost BEGIN_SESSION response must be retryable without waiting
        // out the STARTING timeout first.
        let mask = allowed_mask(Command::BeginSession);
        assert!(mask.allows(SessionState::Inactive));
        assert!(mask.allows(SessionState::Starting));
        assert!(mask.allows(SessionState::Active));
    }

    #[test]
    fn device_status_allowed_in_any_state() {
        let mask = allowed_mask(Command::DeviceStatus);
        assert!(mask.allows(SessionState::Inactive));
        assert!(mask.allows(SessionState::Starting));
        assert!(mask.allows(SessionState::Active));
    }
}
