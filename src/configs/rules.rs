//! Device rule table
//!
//! The single place that decides which precisions are legal for a device and
//! which model parameters apply to it. Nothing else in the crate compares
//! devices directly.

use crate::configs::ConfigError;
use crate::types::config::{DeviceKind, ModelParameters, PrecisionKind};

/// A model-parameter field whose visibility depends on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelField {
    Precision,
    StoredLayers,
    /// Read-only derived strategy
    CurrentStrategy,
    CustomStrategy,
    UseCustomCuda,
    /// Custom tokenizer override panel
    Advanced,
    EnableWebUi,
}

impl std::fmt::Display for ModelField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModelField::Precision => "precision",
            ModelField::StoredLayers => "storedLayers",
            ModelField::CurrentStrategy => "currentStrategy",
            ModelField::CustomStrategy => "customStrategy",
            ModelField::UseCustomCuda => "useCustomCuda",
            ModelField::Advanced => "advanced",
            ModelField::EnableWebUi => "enableWebUI",
        };
        f.write_str(name)
    }
}

/// Set of visible fields for one device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSet(&'static [ModelField]);

impl FieldSet {
    pub fn contains(&self, field: ModelField) -> bool {
        self.0.contains(&field)
    }

    pub fn iter(&self) -> impl Iterator<Item = ModelField> + '_ {
        self.0.iter().copied()
    }
}

/// Which conversion workflow applies to a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionKind {
    /// Pre-quantized torch checkpoint
    Torch,
    /// GGML file for rwkv.cpp
    Ggml,
    /// safetensors for the WebGPU runtimes
    SafeTensors,
}

struct DeviceRules {
    precisions: &'static [PrecisionKind],
    fields: &'static [ModelField],
    conversion: ConversionKind,
}

use ModelField::*;
use PrecisionKind::*;

const CUDA_RULES: DeviceRules = DeviceRules {
    precisions: &[Fp16, Int8, Fp32],
    fields: &[
        Precision,
        StoredLayers,
        CurrentStrategy,
        UseCustomCuda,
        Advanced,
        EnableWebUi,
    ],
    conversion: ConversionKind::Torch,
};

const HOST_RULES: DeviceRules = DeviceRules {
    precisions: &[Int8, Fp32],
    fields: &[Precision, Advanced, EnableWebUi],
    conversion: ConversionKind::Torch,
};

const GGML_RULES: DeviceRules = DeviceRules {
    precisions: &[Q5_1],
    fields: &[Precision, Advanced, EnableWebUi],
    conversion: ConversionKind::Ggml,
};

const WEBGPU_RULES: DeviceRules = DeviceRules {
    precisions: &[Fp16, Int8, Nf4],
    fields: &[Precision],
    conversion: ConversionKind::SafeTensors,
};

const WEBGPU_PYTHON_RULES: DeviceRules = DeviceRules {
    precisions: &[Fp16, Int8, Nf4],
    fields: &[Precision, Advanced, EnableWebUi],
    conversion: ConversionKind::SafeTensors,
};

const CUSTOM_RULES: DeviceRules = DeviceRules {
    precisions: &[],
    fields: &[CustomStrategy, UseCustomCuda, Advanced, EnableWebUi],
    conversion: ConversionKind::Torch,
};

fn rules_for(device: DeviceKind) -> &'static DeviceRules {
    match device {
        DeviceKind::Cuda | DeviceKind::CudaBeta => &CUDA_RULES,
        DeviceKind::Cpu | DeviceKind::Mps => &HOST_RULES,
        DeviceKind::CpuGgml => &GGML_RULES,
        DeviceKind::WebGpu => &WEBGPU_RULES,
        DeviceKind::WebGpuPython => &WEBGPU_PYTHON_RULES,
        DeviceKind::Custom => &CUSTOM_RULES,
    }
}

/// Legal precisions for `device`, in display order. Empty for `Custom`.
pub fn allowed_precisions(device: DeviceKind) -> &'static [PrecisionKind] {
    rules_for(device).precisions
}

/// Fields shown (and meaningful) for `device`
pub fn fields_visible(device: DeviceKind) -> FieldSet {
    FieldSet(rules_for(device).fields)
}

pub fn conversion_for(device: DeviceKind) -> ConversionKind {
    rules_for(device).conversion
}

/// Whether `device` is offered on the given OS (`std::env::consts::OS` values)
pub fn device_available_on(device: DeviceKind, os: &str) -> bool {
    match device {
        DeviceKind::Mps => os == "macos",
        _ => true,
    }
}

/// Devices offered on `os`, in display order
pub fn selectable_devices(os: &str) -> Vec<DeviceKind> {
    DeviceKind::ALL
        .into_iter()
        .filter(|d| device_available_on(*d, os))
        .collect()
}

/// Example strategy shown in an empty custom-strategy field
pub fn custom_strategy_placeholder(os: &str) -> &'static str {
    if os == "macos" {
        "mps fp32"
    } else {
        "cuda:0 fp16 *20 -> cuda:1 fp16"
    }
}

/// Check that the precision is legal for the device.
///
/// `Custom` has no precision field, so any stored precision is accepted there.
pub fn validate_model_parameters(params: &ModelParameters) -> Result<(), ConfigError> {
    if !fields_visible(params.device).contains(ModelField::Precision) {
        return Ok(());
    }
    if allowed_precisions(params.device).contains(&params.precision) {
        Ok(())
    } else {
        Err(ConfigError::InvalidFieldCombination {
            device: params.device,
            field: ModelField::Precision,
            value: params.precision.to_string(),
        })
    }
}
