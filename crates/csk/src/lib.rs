//! Custody Sweep Kit
//!
//! Orchestrates the funds sweep that runs after a wallet's key
//! configuration changes: locating remaining funds under prior keysets,
//! collecting the required signatures from the app key, the server
//! co-signer and the hardware device, and broadcasting the re-signed
//! transactions.
//!
//! The entry point is [`SweepService`], which drives the sweep lifecycle
//! state machine and publishes every state change on a watch channel for
//! the UI layer. All external capabilities (sweep preparation, signing,
//! broadcasting, the persisted status marker) are consumed through the
//! traits in [`csk_common`].

pub mod sweep;

pub use csk_common::{
    signer, store, AccountId, Amount, Environment, KeysetId, Psbt, SignaturePlan, SourceKeyset,
    Sweep, SweepContext, SweepMode, SweepPsbt,
};

pub use crate::sweep::error::Error;
pub use crate::sweep::merge::merge_hardware_signed;
pub use crate::sweep::state::SweepState;
pub use crate::sweep::SweepService;
