pub mod scripted;
pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

use anyhow::{anyhow, Result};

pub use scripted::ScriptedBackend;
pub use stub::StubBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;

use crate::config::DetectorSettings;
use crate::detect::backend::FaceDetector;

/// Build the detector named by `settings.backend`.
pub fn detector_from_settings(settings: &DetectorSettings) -> Result<Box<dyn FaceDetector>> {
    match settings.backend.as_str() {
        "stub" => Ok(Box::new(StubBackend::new())),
        "scripted" => {
            let script = settings
                .script
                .as_deref()
                .ok_or_else(|| anyhow!("scripted detector requires a script"))?;
            Ok(Box::new(ScriptedBackend::parse(script)?))
        }
        "tract" => tract_backend(settings),
        other => Err(anyhow!("unknown detector backend '{}'", other)),
    }
}

#[cfg(feature = "backend-tract")]
fn tract_backend(settings: &DetectorSettings) -> Result<Box<dyn FaceDetector>> {
    let model = settings
        .model_path
        .as_ref()
        .ok_or_else(|| anyhow!("tract detector requires a model path"))?;
    let (width, height) = settings.model_input;
    Ok(Box::new(
        TractBackend::new(model, width, height)?.with_threshold(settings.threshold),
    ))
}

#[cfg(not(feature = "backend-tract"))]
fn tract_backend(_settings: &DetectorSettings) -> Result<Box<dyn FaceDetector>> {
    Err(anyhow!("tract detector requires the backend-tract feature"))
}
