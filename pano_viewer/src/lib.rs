//! Scene lifecycle and render coordination for an embeddable 360° panorama
//! viewer.
//!
//! The crate never touches a browser directly. Every capability the viewer
//! depends on (GPU resources, image decode, media elements, the adaptive
//! streaming client, VR displays, page chrome, the host message channel) is a
//! port trait in [`ports`]; [`headless`] provides in-memory implementations
//! used by the CLI and the test suite.

pub mod error;
pub mod events;
pub mod headless;
pub mod media;
pub mod platform;
pub mod ports;
pub mod scene;
pub mod session;
pub mod tween;
pub mod viewer;

pub use error::ViewerError;
pub use events::EventBus;
pub use platform::PlatformProfile;
pub use scene::SceneDescriptor;
pub use session::ViewerSession;
pub use viewer::{SceneLoad, SceneState, ViewerEvent, ViewportController};
