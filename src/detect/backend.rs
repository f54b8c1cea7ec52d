use anyhow::{anyhow, bail, Result};
use image::RgbImage;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::detect::backends::StubBackend;
use crate::detect::result::DetectionBox;

/// Person detector owned by the detection worker.
///
/// Implementations are configured once (threshold, backend, target) and then
/// only see images. They never receive concurrent calls.
pub trait PersonDetector: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Detect people in a frame. Boxes below the configured confidence
    /// threshold are never returned.
    fn detect_persons(&mut self, image: &RgbImage) -> Result<Vec<DetectionBox>>;

    /// Latency of the most recent `detect_persons` call, in milliseconds.
    fn last_latency_ms(&self) -> f64;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Inference engine selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InferenceBackend {
    /// Best model-backed backend compiled into this build.
    #[default]
    Auto,
    /// ONNX inference via tract (feature `backend-tract`).
    Tract,
    /// Deterministic bright-blob detector for demos and tests.
    Stub,
}

/// Device the backend should execute on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InferenceTarget {
    #[default]
    Cpu,
    OpenCl,
    OpenClFp16,
    Vpu,
}

const CPU_ONLY: &[InferenceTarget] = &[InferenceTarget::Cpu];

impl InferenceBackend {
    /// True when this backend is available in the current build.
    pub fn is_compiled(&self) -> bool {
        match self {
            Self::Auto | Self::Stub => true,
            Self::Tract => cfg!(feature = "backend-tract"),
        }
    }

    pub fn requires_model(&self) -> bool {
        matches!(self, Self::Tract)
    }

    pub fn supported_targets(&self) -> &'static [InferenceTarget] {
        match self {
            Self::Auto | Self::Tract | Self::Stub => CPU_ONLY,
        }
    }

    /// Resolve `Auto` to a concrete backend.
    pub fn resolve(self) -> Result<Self> {
        match self {
            Self::Auto => {
                if Self::Tract.is_compiled() {
                    Ok(Self::Tract)
                } else {
                    Err(anyhow!(
                        "no model-backed inference backend compiled in.\n\
                         Recompile with: cargo build --features backend-tract\n\
                         Or use '--backend stub' for the synthetic detector."
                    ))
                }
            }
            other => Ok(other),
        }
    }
}

impl FromStr for InferenceBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auto" | "default" => Ok(Self::Auto),
            "tract" | "onnx" => Ok(Self::Tract),
            "stub" => Ok(Self::Stub),
            other => Err(anyhow!(
                "unknown inference backend '{}': expected 'auto', 'tract' or 'stub'",
                other
            )),
        }
    }
}

impl fmt::Display for InferenceBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Tract => write!(f, "tract"),
            Self::Stub => write!(f, "stub"),
        }
    }
}

impl FromStr for InferenceTarget {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        // Numeric codes are accepted for compatibility with older deployments.
        match s.to_lowercase().as_str() {
            "cpu" | "0" => Ok(Self::Cpu),
            "opencl" | "1" => Ok(Self::OpenCl),
            "opencl_fp16" | "opencl-fp16" | "2" => Ok(Self::OpenClFp16),
            "vpu" | "myriad" | "3" => Ok(Self::Vpu),
            other => Err(anyhow!(
                "unknown inference target '{}': expected 'cpu', 'opencl', 'opencl_fp16' or 'vpu'",
                other
            )),
        }
    }
}

impl fmt::Display for InferenceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::OpenCl => write!(f, "opencl"),
            Self::OpenClFp16 => write!(f, "opencl_fp16"),
            Self::Vpu => write!(f, "vpu"),
        }
    }
}

/// Construction-time detector parameters.
#[derive(Clone, Debug)]
pub struct DetectorSettings {
    pub backend: InferenceBackend,
    pub target: InferenceTarget,
    pub model: Option<PathBuf>,
    pub confidence: f32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            backend: InferenceBackend::Auto,
            target: InferenceTarget::Cpu,
            model: None,
            confidence: 0.5,
        }
    }
}

impl DetectorSettings {
    /// Check the backend/target/model combination and return the concrete backend.
    pub fn validate(&self) -> Result<InferenceBackend> {
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            bail!(
                "model confidence must be between 0 and 1 (exclusive), got {}",
                self.confidence
            );
        }

        let backend = self.backend.resolve()?;
        if !backend.is_compiled() {
            bail!(
                "inference backend '{}' is not compiled into this build (enable the backend-{} feature)",
                backend,
                backend
            );
        }
        if !backend.supported_targets().contains(&self.target) {
            bail!(
                "inference backend '{}' cannot run on target '{}'",
                backend,
                self.target
            );
        }
        if backend.requires_model() {
            match &self.model {
                None => bail!("inference backend '{}' requires --model", backend),
                Some(path) if path.as_os_str().is_empty() => {
                    bail!("invalid path to detection model: {}", path.display())
                }
                Some(_) => {}
            }
        }
        Ok(backend)
    }
}

/// Build the detector described by `settings`, rejecting invalid combinations
/// before any model is loaded.
pub fn build_detector(settings: &DetectorSettings) -> Result<Box<dyn PersonDetector>> {
    let backend = settings.validate()?;
    let mut detector: Box<dyn PersonDetector> = match backend {
        InferenceBackend::Stub => Box::new(StubBackend::new(settings.confidence)),
        InferenceBackend::Tract | InferenceBackend::Auto => build_tract(settings)?,
    };
    detector.warm_up()?;
    log::info!(
        "detector ready: backend={} target={} confidence={}",
        detector.name(),
        settings.target,
        settings.confidence
    );
    Ok(detector)
}

#[cfg(feature = "backend-tract")]
fn build_tract(settings: &DetectorSettings) -> Result<Box<dyn PersonDetector>> {
    use crate::detect::backends::TractBackend;

    let model = settings
        .model
        .as_ref()
        .ok_or_else(|| anyhow!("tract backend requires a model path"))?;
    Ok(Box::new(
        TractBackend::new(model)?.with_threshold(settings.confidence),
    ))
}

#[cfg(not(feature = "backend-tract"))]
fn build_tract(_settings: &DetectorSettings) -> Result<Box<dyn PersonDetector>> {
    bail!("tract backend requires the backend-tract feature")
}
