//! Host-side DFU client: the synchronous transaction layer (C4), image
//! transfer orchestrator (C5), and session sequencer (C6) built on top of
//! `dfu-core`'s polled engine (spec.md §4.4-§4.6).

mod client;
mod clock;
mod error;
mod sequencer;
mod transaction;
mod transfer;

pub use client::DfuClient;
pub use clock::Clock;
pub use error::{TransactionError, TransferFailure};
pub use sequencer::{establish_session, ChallengeCrypto};
pub use transaction::Transactor;
pub use transfer::{send_image, ProgressSink, TransferReport};
