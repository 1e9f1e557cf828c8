use thiserror::Error;

use crate::media::MediaError;
use crate::viewer::compositor::CompositorError;

/// Failures surfaced by the viewport controller.
///
/// Every component-level failure is folded into one of these before it
/// reaches the host, so the session has a single place to render messages.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ViewerError {
    #[error("{0}")]
    InvalidScene(String),
    #[error("{0}")]
    PlatformUnsupported(String),
    #[error("{0}")]
    Load(String),
    #[error("scene load was superseded by a newer scene")]
    Superseded,
    #[error("no VR display is available")]
    DisplayUnavailable,
    #[error("Attempt to {0}, but no video found.")]
    NoVideo(&'static str),
    #[error("viewer has been destroyed")]
    Disposed,
}

impl ViewerError {
    pub(crate) fn from_media(err: &MediaError) -> Self {
        match err {
            MediaError::HlsUnsupported | MediaError::DashUnsupported => {
                ViewerError::PlatformUnsupported(format!("Video load error: {err}"))
            }
            _ => ViewerError::Load(format!("Video load error: {err}")),
        }
    }

    pub(crate) fn from_compositor(err: &CompositorError) -> Self {
        ViewerError::Load(err.to_string())
    }
}
