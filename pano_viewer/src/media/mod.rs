//! Video acquisition and cross-platform playback control.

mod loader;
mod proxy;

pub use loader::{
    DEFAULT_BITS_PER_SECOND, MediaConfig, MediaError, MediaEvent, MediaFormat, MediaLoader,
};
pub use proxy::{MUTE_THRESHOLD, PlaybackProxy};
