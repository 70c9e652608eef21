//! Client compatibility gate.
//!
//! Runs after every committed block. The node must stop rather than keep
//! following rules it does not implement or a chain that demands a newer
//! client.

use strata_types::BlockHeight;

use crate::alert::AlertKind;
use crate::error::FatalError;
use crate::state::EngineState;

/// Checks `state` at `height` against the running client version.
pub fn check(state: &EngineState, height: BlockHeight, running: u32) -> Result<(), FatalError> {
    for activation in state.activations.completed(height) {
        if !activation.supported {
            return Err(FatalError::UnsupportedFeatureLive {
                feature: activation.feature,
                height: activation.activation_height,
            });
        }
        if activation.min_client_version > running {
            return Err(FatalError::ClientOutdated {
                running,
                required: activation.min_client_version,
                source_desc: format!("activation of feature {}", activation.feature),
            });
        }
    }

    for alert in state.alerts.iter() {
        if alert.kind == AlertKind::ClientVersion && alert.expiry_value > running {
            return Err(FatalError::ClientOutdated {
                running,
                required: alert.expiry_value,
                source_desc: format!("alert {}", alert.txid),
            });
        }
    }
    Ok(())
}
