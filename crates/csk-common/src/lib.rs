//! CSK shared types and collaborator traits.
//!
//! This crate is the base foundation for the CSK (Custody Sweep Kit)
//! internal crates.
//!
//! It contains the sweep data model, the interfaces of the external
//! collaborators (sweep preparation, signers, broadcaster, status store) and
//! the common functions shared across the internal crates. The orchestration
//! logic itself lives in the `csk` crate.

pub mod amount;
pub mod context;
pub mod signer;
pub mod store;
pub mod sweep;

// re-exporting external crates
pub use bitcoin;

pub use self::amount::Amount;
pub use self::context::{AccountId, Environment, SweepContext, SweepMode};
pub use self::sweep::{KeysetId, Psbt, SignaturePlan, SourceKeyset, Sweep, SweepPsbt};

/// Return early with the given error when a condition does not hold
#[macro_export]
macro_rules! ensure_csk {
    ($cond:expr, $err:expr) => {
        if !$cond {
            return Err($err);
        }
    };
}
