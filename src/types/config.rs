//! Configuration types
//!
//! Named run configurations and their API / model parameter records.

use serde::{Deserialize, Serialize};

/// Compute target a configuration runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeviceKind {
    #[serde(rename = "CPU")]
    Cpu,
    #[serde(rename = "CPU (rwkv.cpp)")]
    CpuGgml,
    #[serde(rename = "MPS")]
    Mps,
    #[serde(rename = "CUDA")]
    Cuda,
    #[serde(rename = "CUDA-Beta")]
    CudaBeta,
    #[serde(rename = "WebGPU")]
    WebGpu,
    #[serde(rename = "WebGPU (Python)")]
    WebGpuPython,
    #[serde(rename = "Custom")]
    Custom,
}

impl DeviceKind {
    /// Every device, in display order
    pub const ALL: [DeviceKind; 8] = [
        DeviceKind::Cpu,
        DeviceKind::CpuGgml,
        DeviceKind::Mps,
        DeviceKind::Cuda,
        DeviceKind::CudaBeta,
        DeviceKind::WebGpu,
        DeviceKind::WebGpuPython,
        DeviceKind::Custom,
    ];

    /// Label used in the persisted store
    pub fn label(&self) -> &'static str {
        match self {
            DeviceKind::Cpu => "CPU",
            DeviceKind::CpuGgml => "CPU (rwkv.cpp)",
            DeviceKind::Mps => "MPS",
            DeviceKind::Cuda => "CUDA",
            DeviceKind::CudaBeta => "CUDA-Beta",
            DeviceKind::WebGpu => "WebGPU",
            DeviceKind::WebGpuPython => "WebGPU (Python)",
            DeviceKind::Custom => "Custom",
        }
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.label())
    }
}

/// Weight precision
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrecisionKind {
    #[serde(rename = "fp16")]
    Fp16,
    #[serde(rename = "int8")]
    Int8,
    #[serde(rename = "fp32")]
    Fp32,
    #[serde(rename = "nf4")]
    Nf4,
    #[serde(rename = "Q5_1")]
    Q5_1,
}

impl PrecisionKind {
    pub fn label(&self) -> &'static str {
        match self {
            PrecisionKind::Fp16 => "fp16",
            PrecisionKind::Int8 => "int8",
            PrecisionKind::Fp32 => "fp32",
            PrecisionKind::Nf4 => "nf4",
            PrecisionKind::Q5_1 => "Q5_1",
        }
    }
}

impl std::fmt::Display for PrecisionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.label())
    }
}

/// Serving parameters, all of which can be changed without restarting the backend
/// (except the port, which is only read at startup)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiParameters {
    /// Port the backend listens on (1 - 65535)
    pub api_port: u16,
    /// Default response length cap (100 - 8100, step 100)
    pub max_response_token: u32,
    /// Sampling temperature (0.0 - 2.0)
    pub temperature: f32,
    /// Nucleus sampling mass (0.0 - 1.0)
    pub top_p: f32,
    /// Presence penalty (-2.0 - 2.0)
    pub presence_penalty: f32,
    /// Frequency penalty (-2.0 - 2.0)
    pub frequency_penalty: f32,
}

impl Default for ApiParameters {
    fn default() -> Self {
        Self {
            api_port: 8000,
            max_response_token: 4100,
            temperature: 1.0,
            top_p: 0.3,
            presence_penalty: 0.0,
            frequency_penalty: 1.0,
        }
    }
}

/// Round to the nearest tenth, the step every float slider uses
fn snap_tenth(value: f32, min: f32, max: f32) -> f32 {
    let value = if value.is_finite() { value } else { min.max(0.0) };
    ((value.clamp(min, max) * 10.0).round() / 10.0).clamp(min, max)
}

impl ApiParameters {
    /// Clamp every value into its range and snap it to its step.
    pub fn validate(&mut self) {
        if self.api_port == 0 {
            self.api_port = 1;
        }

        let tokens = self.max_response_token.clamp(100, 8100);
        self.max_response_token = ((tokens + 50) / 100 * 100).clamp(100, 8100);

        self.temperature = snap_tenth(self.temperature, 0.0, 2.0);
        self.top_p = snap_tenth(self.top_p, 0.0, 1.0);
        self.presence_penalty = snap_tenth(self.presence_penalty, -2.0, 2.0);
        self.frequency_penalty = snap_tenth(self.frequency_penalty, -2.0, 2.0);
    }
}

/// Model loading parameters. Changing any of these needs a backend restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelParameters {
    pub model_name: String,
    pub device: DeviceKind,
    pub precision: PrecisionKind,
    /// Layers kept resident on the accelerator
    pub stored_layers: i64,
    pub max_stored_layers: i64,
    /// Operator-authored strategy, used only with `DeviceKind::Custom`
    #[serde(default)]
    pub custom_strategy: String,
    #[serde(default)]
    pub use_custom_cuda: bool,
    #[serde(default)]
    pub use_custom_tokenizer: bool,
    #[serde(default)]
    pub custom_tokenizer: String,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            model_name: "RWKV-4-World-1.5B-v1-fixed-20230612-ctx4096.pth".to_string(),
            device: DeviceKind::Cuda,
            precision: PrecisionKind::Fp16,
            stored_layers: 24,
            max_stored_layers: 24,
            custom_strategy: String::new(),
            use_custom_cuda: true,
            use_custom_tokenizer: false,
            custom_tokenizer: String::new(),
        }
    }
}

/// A named bundle of API and model parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    /// Operator-facing label, not a key
    pub name: String,
    pub api_parameters: ApiParameters,
    pub model_parameters: ModelParameters,
    #[serde(rename = "enableWebUI", default)]
    pub enable_web_ui: bool,
}

/// Name of the built-in template configuration
pub const DEFAULT_CONFIG_NAME: &str = "GPU-4G-1B5-World";

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_CONFIG_NAME.to_string(),
            api_parameters: ApiParameters::default(),
            model_parameters: ModelParameters::default(),
            enable_web_ui: false,
        }
    }
}

/// Partial update of [`ApiParameters`]; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiParametersPatch {
    pub api_port: Option<u16>,
    pub max_response_token: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub presence_penalty: Option<f32>,
    pub frequency_penalty: Option<f32>,
}

impl ApiParametersPatch {
    /// Merge the set fields into `params`, then re-validate ranges
    pub fn apply_to(&self, params: &mut ApiParameters) {
        if let Some(v) = self.api_port {
            params.api_port = v;
        }
        if let Some(v) = self.max_response_token {
            params.max_response_token = v;
        }
        if let Some(v) = self.temperature {
            params.temperature = v;
        }
        if let Some(v) = self.top_p {
            params.top_p = v;
        }
        if let Some(v) = self.presence_penalty {
            params.presence_penalty = v;
        }
        if let Some(v) = self.frequency_penalty {
            params.frequency_penalty = v;
        }
        params.validate();
    }
}

/// Partial update of [`ModelParameters`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelParametersPatch {
    pub model_name: Option<String>,
    pub device: Option<DeviceKind>,
    pub precision: Option<PrecisionKind>,
    pub stored_layers: Option<i64>,
    pub max_stored_layers: Option<i64>,
    pub custom_strategy: Option<String>,
    pub use_custom_cuda: Option<bool>,
    pub use_custom_tokenizer: Option<bool>,
    pub custom_tokenizer: Option<String>,
}

impl ModelParametersPatch {
    pub fn apply_to(&self, params: &mut ModelParameters) {
        if let Some(v) = &self.model_name {
            params.model_name = v.clone();
        }
        if let Some(v) = self.device {
            params.device = v;
        }
        if let Some(v) = self.precision {
            params.precision = v;
        }
        if let Some(v) = self.stored_layers {
            params.stored_layers = v;
        }
        if let Some(v) = self.max_stored_layers {
            params.max_stored_layers = v;
        }
        if let Some(v) = &self.custom_strategy {
            params.custom_strategy = v.clone();
        }
        if let Some(v) = self.use_custom_cuda {
            params.use_custom_cuda = v;
        }
        if let Some(v) = self.use_custom_tokenizer {
            params.use_custom_tokenizer = v;
        }
        if let Some(v) = &self.custom_tokenizer {
            params.custom_tokenizer = v.clone();
        }
    }
}
