//! Vision collaborator boundary.
//!
//! Image payloads arrive as base64 text. When a dedicated vision model is
//! configured, the pipeline asks it for a textual description and keeps the
//! image away from the main model; otherwise the image rides along as a
//! multimodal turn. See the pipeline's vision stage for the full policy.

use async_trait::async_trait;

/// Produces textual descriptions of images.
#[async_trait]
pub trait VisionDescriber: Send + Sync {
    /// Whether a vision model is configured at all.
    fn is_configured(&self) -> bool;

    /// Describe the image, optionally steered by the user's query.
    ///
    /// Returns `None` both when unconfigured and when description fails;
    /// implementations swallow their own errors; the pipeline treats any
    /// `None` from a configured describer as a soft failure.
    async fn describe(&self, image_base64: &str, prompt_hint: Option<&str>) -> Option<String>;
}

/// No vision model configured: images go to the main model untouched.
pub struct NoVision;

#[async_trait]
impl VisionDescriber for NoVision {
    fn is_configured(&self) -> bool {
        false
    }

    async fn describe(&self, _image_base64: &str, _prompt_hint: Option<&str>) -> Option<String> {
        None
    }
}
