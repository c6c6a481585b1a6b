//! Concrete C4 transactions (spec.md §4.4's contract list), each a thin
//! typed wrapper over `Transactor::run`.

use dfu_core::{LinkAdapter, ProtocolConfig};
use dfu_wire::{messages, Command, MsgType, MAX_MSG_LEN};

use crate::error::TransactionError;
use crate::transaction::Transactor;

pub struct DfuClient<L, Cfg, const PERIODIC: usize = 1>
where
    L: LinkAdapter,
    Cfg: ProtocolConfig,
{
    transactor: Transactor<L, Cfg, PERIODIC>,
    scratch: [u8; MAX_MSG_LEN],
}

impl<L, Cfg, const PERIODIC: usize> DfuClient<L, Cfg, PERIODIC>
where
    L: LinkAdapter,
    Cfg: ProtocolConfig,
{
    pub fn new() -> Self {
        DfuClient {
            transactor: Transactor::new(),
            scratch: [0u8; MAX_MSG_LEN],
        }
    }

    pub fn mtu(&self) -> u16 {
        self.transactor.engine().mtu()
    }

    pub fn session_state(&self) -> dfu_core::SessionState {
        self.transactor.engine().session_state()
    }

    /// `begin_session(timeout, peer) -> challenge:u32`, completes on
    /// `RESPONSE` carrying the 4-byte challenge.
    pub fn begin_session(&mut self, link: &mut L, timeout_ms: u64) -> Result<u32, TransactionError> {
        let len = messages::build_begin_session(&mut self.scratch, self.transactor.engine().toggle(), MsgType::Command)?;
        self.transactor
            .run(link, Command::BeginSession, &self.scratch[..len], timeout_ms)?;
        Ok(messages::decode_begin_session_response(self.transactor.response())?)
    }

    /// `end_session(timeout, peer) -> ()`, completes on `ACK`.
    pub fn end_session(&mut self, link: &mut L, timeout_ms: u64) -> Result<(), TransactionError> {
        let len = messages::build_end_session(&mut self.scratch, self.transactor.engine().toggle(), MsgType::Command)?;
        self.transactor
            .run(link, Command::EndSession, &self.scratch[..len], timeout_ms)?;
        Ok(())
    }

    /// `negotiate_mtu(timeout, peer, proposed_mtu) -> accepted_mtu:u16`.
    pub fn negotiate_mtu(
        &mut self,
        link: &mut L,
        proposed_mtu: u16,
        timeout_ms: u64,
    ) -> Result<u16, TransactionError> {
        let len = messages::build_negotiate_mtu(
            &mut self.scratch,
            self.transactor.engine().toggle(),
            MsgType::Command,
            proposed_mtu,
        )?;
        self.transactor
            .run(link, Command::NegotiateMtu, &self.scratch[..len], timeout_ms)?;
        let accepted = messages::decode_negotiate_mtu(self.transactor.response())?;
        self.transactor.engine_mut().set_mtu(accepted);
        Ok(accepted)
    }

    /// `begin_rcv(timeout, peer, image_index, size, addr, encrypted) -> ()`.
    #[allow(clippy::too_many_arguments)]
    pub fn begin_rcv(
        &mut self,
        link: &mut L,
        image_index: u8,
        size: u32,
        addr: u32,
        encrypted: bool,
        timeout_ms: u64,
    ) -> Result<(), TransactionError> {
        let len = messages::build_begin_rcv(
            &mut self.scratch,
            self.transactor.engine().toggle(),
            MsgType::Command,
            image_index,
            encrypted,
            size,
            addr,
        )?;
        self.transactor
            .run(link, Command::BeginRcv, &self.scratch[..len], timeout_ms)?;
        Ok(())
    }

    /// `rcv_data(timeout, peer, bytes, len) -> ()`, rejected locally if
    /// `len > MTU - 1`.
    pub fn rcv_data(&mut self, link: &mut L, bytes: &[u8], timeout_ms: u64) -> Result<(), TransactionError> {
        let mtu = self.transactor.engine().mtu();
        if bytes.len() > mtu.saturating_sub(1) as usize {
            return Err(TransactionError::InvalidRequest);
        }
        let len = messages::build_rcv_data(&mut self.scratch, self.transactor.engine().toggle(), MsgType::Command, bytes, mtu)?;
        self.transactor
            .run(link, Command::RcvData, &self.scratch[..len], timeout_ms)?;
        Ok(())
    }

    /// `rcv_complete(timeout, peer, total) -> ()`.
    pub fn rcv_complete(&mut self, link: &mut L, total: u32, timeout_ms: u64) -> Result<(), TransactionError> {
        let len = messages::build_rcv_complete(
            &mut self.scratch,
            self.transactor.engine().toggle(),
            MsgType::Command,
            total,
        )?;
        self.transactor
            .run(link, Command::RcvComplete, &self.scratch[..len], timeout_ms)?;
        Ok(())
    }

    /// `install_image(timeout, peer, index) -> ()`.
    pub fn install_image(&mut self, link: &mut L, timeout_ms: u64) -> Result<(), TransactionError> {
        let len = messages::build_install_image(&mut self.scratch, self.transactor.engine().toggle(), MsgType::Command)?;
        self.transactor
            .run(link, Command::InstallImage, &self.scratch[..len], timeout_ms)?;
        Ok(())
    }

    /// `reboot(timeout, peer, delay_ms) -> ()`.
    pub fn reboot(&mut self, link: &mut L, delay_ms: u16, timeout_ms: u64) -> Result<(), TransactionError> {
        let len = messages::build_reboot(&mut self.scratch, self.transactor.engine().toggle(), MsgType::Command, delay_ms)?;
        self.transactor
            .run(link, Command::Reboot, &self.scratch[..len], timeout_ms)?;
        Ok(())
    }
}

impl<L, Cfg, const PERIODIC: usize> Default for DfuClient<L, Cfg, PERIODIC>
where
    L: LinkAdapter,
    Cfg: ProtocolConfig,
{
    fn default() -> Self {
        Self::new()
    }
}
