//! Sweep data model
//!
//! A [`Sweep`] describes one recovery sweep attempt: the unsigned
//! transactions that move remaining funds from prior key configurations to
//! the active one, which of those transactions still need the hardware
//! signer, and the totals surfaced to the user. A sweep is immutable once
//! produced; when the underlying wallet state changes a new sweep must be
//! prepared rather than patching an existing one.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use bitcoin::Txid;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::amount::Amount;

/// Sweep data model Error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Same transaction listed twice in a sweep
    #[error("Duplicate sweep transaction `{0}`")]
    DuplicatePsbt(Txid),
    /// Hardware-sign entry that is not one of the sweep's transactions
    #[error("Hardware-sign transaction `{0}` is not part of the sweep")]
    UnknownHardwarePsbt(Txid),
}

/// Identifier of a keyset, a named bundle of public keys defining a spending
/// policy at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeysetId(String);

impl KeysetId {
    /// Keyset id from a raw identifier
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }
}

impl FromStr for KeysetId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_owned()))
    }
}

impl fmt::Display for KeysetId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Partially signed bitcoin transaction payload
///
/// The payload is opaque to the orchestrator; two values with the same
/// [`Psbt::txid`] represent the same logical transaction at different
/// signing stages and are substitutable by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Psbt {
    /// Transaction id, stable across signing stages
    pub txid: Txid,
    /// Base64-encoded transaction payload
    pub base64: String,
}

/// Which of the app and server signatures a transaction still requires
///
/// The hardware requirement is not carried here; it is expressed by
/// membership in [`Sweep::psbts_requiring_hw_sign`] so that it exists in
/// exactly one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignaturePlan {
    /// An application-key signature is still required
    pub requires_app_signature: bool,
    /// A server co-signature is still required
    pub requires_server_signature: bool,
}

impl SignaturePlan {
    /// Neither signature is required; the transaction is already fully
    /// signed and only needs broadcasting
    pub fn is_fully_signed(&self) -> bool {
        !self.requires_app_signature && !self.requires_server_signature
    }
}

/// The historical key configuration that owns a transaction's inputs
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceKeyset {
    /// Local keyset identifier, used to resolve the spending wallet
    pub keyset_id: KeysetId,
    /// Identifier the co-signing service knows this keyset by
    pub server_keyset_id: KeysetId,
}

/// One sweep transaction together with its signing requirements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepPsbt {
    /// The transaction payload
    pub psbt: Psbt,
    /// Key configuration owning the inputs
    pub source_keyset: SourceKeyset,
    /// Signatures still required from {app, server}
    pub signature_plan: SignaturePlan,
}

impl SweepPsbt {
    /// Transaction id of the underlying psbt
    pub fn txid(&self) -> Txid {
        self.psbt.txid
    }
}

/// One recovery sweep attempt
///
/// Constructed through [`Sweep::new`], which enforces that transactions are
/// unique by txid and that every hardware-sign entry is one of the sweep's
/// transactions. Transactions keep their preparation order so batch
/// processing is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSweep")]
pub struct Sweep {
    unsigned_psbts: Vec<SweepPsbt>,
    psbts_requiring_hw_sign: Vec<SweepPsbt>,
    total_fee_amount: Amount,
    total_transfer_amount: Amount,
    destination_address: String,
}

impl Sweep {
    /// New validated sweep
    pub fn new(
        unsigned_psbts: Vec<SweepPsbt>,
        psbts_requiring_hw_sign: Vec<SweepPsbt>,
        total_fee_amount: Amount,
        total_transfer_amount: Amount,
        destination_address: String,
    ) -> Result<Self, Error> {
        let mut seen = HashSet::new();
        for psbt in &unsigned_psbts {
            if !seen.insert(psbt.txid()) {
                return Err(Error::DuplicatePsbt(psbt.txid()));
            }
        }

        for psbt in &psbts_requiring_hw_sign {
            if !seen.contains(&psbt.txid()) {
                return Err(Error::UnknownHardwarePsbt(psbt.txid()));
            }
        }

        Ok(Self {
            unsigned_psbts,
            psbts_requiring_hw_sign,
            total_fee_amount,
            total_transfer_amount,
            destination_address,
        })
    }

    /// All transactions in this sweep, unique by txid
    pub fn unsigned_psbts(&self) -> &[SweepPsbt] {
        &self.unsigned_psbts
    }

    /// The subset of transactions that still need the hardware signer
    pub fn psbts_requiring_hw_sign(&self) -> &[SweepPsbt] {
        &self.psbts_requiring_hw_sign
    }

    /// Whether any transaction still needs the hardware signer
    pub fn requires_hardware_signing(&self) -> bool {
        !self.psbts_requiring_hw_sign.is_empty()
    }

    /// Total network fee across the sweep's transactions
    pub fn total_fee_amount(&self) -> Amount {
        self.total_fee_amount
    }

    /// Total amount moved to the destination
    pub fn total_transfer_amount(&self) -> Amount {
        self.total_transfer_amount
    }

    /// Address the funds are swept to
    pub fn destination_address(&self) -> &str {
        &self.destination_address
    }
}

#[derive(Deserialize)]
struct RawSweep {
    unsigned_psbts: Vec<SweepPsbt>,
    psbts_requiring_hw_sign: Vec<SweepPsbt>,
    total_fee_amount: Amount,
    total_transfer_amount: Amount,
    destination_address: String,
}

impl TryFrom<RawSweep> for Sweep {
    type Error = Error;

    fn try_from(raw: RawSweep) -> Result<Self, Self::Error> {
        Sweep::new(
            raw.unsigned_psbts,
            raw.psbts_requiring_hw_sign,
            raw.total_fee_amount,
            raw.total_transfer_amount,
            raw.destination_address,
        )
    }
}
