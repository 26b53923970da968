//! Hardware-signature merge

use std::collections::HashMap;

use bitcoin::Txid;
use csk_common::{Psbt, SweepPsbt};

/// Merge freshly hardware-signed psbts into a sweep's transaction set.
///
/// Each entry of `all` whose txid has a match in `hw_signed` gets its
/// payload replaced with the hardware-signed one; everything else is kept
/// unchanged. Hardware entries with no matching transaction are dead data
/// and ignored. The result always has the same length and order as `all`,
/// and re-applying the same `hw_signed` set is a no-op.
pub fn merge_hardware_signed(all: &[SweepPsbt], hw_signed: Vec<Psbt>) -> Vec<SweepPsbt> {
    let mut by_txid: HashMap<Txid, Psbt> = hw_signed
        .into_iter()
        .map(|psbt| (psbt.txid, psbt))
        .collect();

    let merged = all
        .iter()
        .cloned()
        .map(|mut sweep_psbt| {
            if let Some(hw_psbt) = by_txid.remove(&sweep_psbt.psbt.txid) {
                sweep_psbt.psbt = hw_psbt;
            }
            sweep_psbt
        })
        .collect();

    if !by_txid.is_empty() {
        tracing::debug!(
            unmatched = by_txid.len(),
            "ignoring hardware-signed psbts with no matching sweep transaction"
        );
    }

    merged
}
