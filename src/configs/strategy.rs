//! Strategy descriptor derivation
//!
//! Turns device, precision and layer counts into the placement string the
//! backend understands, e.g. `cuda fp16 *20 -> cpu fp16 *12`.

use crate::types::config::{DeviceKind, ModelParameters, PrecisionKind};

fn precision_token(precision: PrecisionKind) -> &'static str {
    match precision {
        PrecisionKind::Fp16 => "fp16",
        PrecisionKind::Int8 => "fp16i8",
        PrecisionKind::Fp32 => "fp32",
        PrecisionKind::Nf4 => "fp16i4",
        PrecisionKind::Q5_1 => "Q5_1",
    }
}

/// Derive the strategy descriptor for `params`.
///
/// Returns the custom strategy verbatim for `Custom`, a two-tier
/// accelerator/host descriptor for the CUDA devices, and `None` for every
/// other device (no strategy is shown there). Layer counts are clamped into
/// `[0, max_stored_layers]`, never rejected.
pub fn derive_strategy(params: &ModelParameters) -> Option<String> {
    match params.device {
        DeviceKind::Custom => Some(params.custom_strategy.clone()),
        DeviceKind::Cuda | DeviceKind::CudaBeta => Some(layered_strategy(params)),
        _ => None,
    }
}

fn layered_strategy(params: &ModelParameters) -> String {
    let max = params.max_stored_layers.max(0);
    let stored = params.stored_layers.clamp(0, max);
    let rest = max - stored;
    let token = precision_token(params.precision);

    if rest == 0 {
        format!("cuda {token}")
    } else if stored == 0 {
        format!("cpu {token}")
    } else {
        format!("cuda {token} *{stored} -> cpu {token} *{rest}")
    }
}
