//! Sweep state transition rules

use std::sync::Arc;

use csk_common::{ensure_csk, Sweep, SweepPsbt};
use serde::Serialize;

use super::error::Error as SweepError;

/// State transition Error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid transition
    #[error("Invalid sweep state transition: from {0} to {1}")]
    InvalidTransition(&'static str, &'static str),
    /// Action arrived in a state that does not accept it
    #[error("`{action}` is not allowed in state {state}")]
    NotAllowed {
        /// The rejected action entry point
        action: &'static str,
        /// State the machine was in
        state: &'static str,
    },
    /// Hardware-signing state constructed with nothing to hardware-sign.
    /// This is a defect in the caller, not a user-recoverable condition.
    #[error("Hardware-signing state requires a non-empty hardware-sign set")]
    EmptyHardwareSigningSet,
}

/// UI-observable state of one sweep attempt
///
/// Failure states carry the causal error behind an [`Arc`] so the state
/// stays cheap to clone through the watch channel while the UI can still
/// render the underlying cause.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SweepState {
    /// Asking the upstream collaborator to prepare a sweep for the current
    /// wallet. Initial state.
    GeneratingPsbts,
    /// Preparation failed; retryable by full restart
    GeneratePsbtsFailed {
        /// Causal error
        #[serde(skip)]
        error: Arc<SweepError>,
    },
    /// Preparation found nothing to sweep and no sweep was attempted
    /// before. Terminal.
    NoFundsFound,
    /// Preparation found nothing to sweep but a sweep was already attempted
    /// in an earlier session; treated as an idempotent success. Terminal.
    SweepSuccessNoData,
    /// A non-empty sweep exists; awaiting user confirmation
    PsbtsGenerated {
        /// The prepared sweep
        sweep: Sweep,
    },
    /// Waiting for the out-of-process hardware signer. Only constructed for
    /// sweeps with a non-empty hardware-sign set.
    AwaitingHardwareSignedSweeps {
        /// The prepared sweep
        sweep: Sweep,
    },
    /// Running the signing and broadcast pipeline over `psbts`
    SignAndBroadcast {
        /// Batch being processed, hardware signatures already merged
        psbts: Vec<SweepPsbt>,
        /// The sweep the batch came from
        sweep: Sweep,
    },
    /// Every transaction signed and broadcast. Terminal.
    SweepSuccess {
        /// The completed sweep
        sweep: Sweep,
    },
    /// At least one transaction failed to sign or broadcast; retryable by
    /// full restart. Terminal.
    SweepFailed {
        /// Causal error
        #[serde(skip)]
        error: Arc<SweepError>,
    },
}

impl SweepState {
    /// Hardware-signing wait state over `sweep`.
    ///
    /// Rejects a sweep whose hardware-sign set is empty; such a sweep must
    /// go straight to signing instead.
    pub fn awaiting_hardware_signed_sweeps(sweep: Sweep) -> Result<Self, Error> {
        ensure_csk!(
            sweep.requires_hardware_signing(),
            Error::EmptyHardwareSigningSet
        );
        Ok(SweepState::AwaitingHardwareSignedSweeps { sweep })
    }

    /// Short name of the state, used in transition errors and logs
    pub fn name(&self) -> &'static str {
        match self {
            SweepState::GeneratingPsbts => "GeneratingPsbts",
            SweepState::GeneratePsbtsFailed { .. } => "GeneratePsbtsFailed",
            SweepState::NoFundsFound => "NoFundsFound",
            SweepState::SweepSuccessNoData => "SweepSuccessNoData",
            SweepState::PsbtsGenerated { .. } => "PsbtsGenerated",
            SweepState::AwaitingHardwareSignedSweeps { .. } => "AwaitingHardwareSignedSweeps",
            SweepState::SignAndBroadcast { .. } => "SignAndBroadcast",
            SweepState::SweepSuccess { .. } => "SweepSuccess",
            SweepState::SweepFailed { .. } => "SweepFailed",
        }
    }

    /// Whether the sweep attempt is finished, successfully or not
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SweepState::NoFundsFound
                | SweepState::SweepSuccessNoData
                | SweepState::SweepSuccess { .. }
                | SweepState::SweepFailed { .. }
        )
    }

    /// Whether the user may retry from this state
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SweepState::GeneratePsbtsFailed { .. } | SweepState::SweepFailed { .. }
        )
    }
}

#[inline]
/// Check if the sweep state transition is allowed
///
/// Valid transitions:
/// - GeneratingPsbts -> GeneratePsbtsFailed, PsbtsGenerated, NoFundsFound, SweepSuccessNoData
/// - GeneratePsbtsFailed -> GeneratingPsbts
/// - PsbtsGenerated -> AwaitingHardwareSignedSweeps, SignAndBroadcast
/// - AwaitingHardwareSignedSweeps -> SignAndBroadcast, PsbtsGenerated
/// - SignAndBroadcast -> SweepSuccess, SweepFailed
/// - SweepFailed -> GeneratingPsbts
/// - NoFundsFound, SweepSuccessNoData, SweepSuccess -> (no transitions allowed)
pub fn check_sweep_state_transition(
    current_state: &SweepState,
    new_state: &SweepState,
) -> Result<(), Error> {
    let is_valid_transition = match current_state {
        SweepState::GeneratingPsbts => matches!(
            new_state,
            SweepState::GeneratePsbtsFailed { .. }
                | SweepState::PsbtsGenerated { .. }
                | SweepState::NoFundsFound
                | SweepState::SweepSuccessNoData
        ),
        SweepState::GeneratePsbtsFailed { .. } => {
            matches!(new_state, SweepState::GeneratingPsbts)
        }
        SweepState::PsbtsGenerated { .. } => matches!(
            new_state,
            SweepState::AwaitingHardwareSignedSweeps { .. } | SweepState::SignAndBroadcast { .. }
        ),
        SweepState::AwaitingHardwareSignedSweeps { .. } => matches!(
            new_state,
            SweepState::SignAndBroadcast { .. } | SweepState::PsbtsGenerated { .. }
        ),
        SweepState::SignAndBroadcast { .. } => matches!(
            new_state,
            SweepState::SweepSuccess { .. } | SweepState::SweepFailed { .. }
        ),
        SweepState::SweepFailed { .. } => matches!(new_state, SweepState::GeneratingPsbts),
        SweepState::NoFundsFound
        | SweepState::SweepSuccessNoData
        | SweepState::SweepSuccess { .. } => false,
    };

    if is_valid_transition {
        Ok(())
    } else {
        Err(Error::InvalidTransition(
            current_state.name(),
            new_state.name(),
        ))
    }
}
