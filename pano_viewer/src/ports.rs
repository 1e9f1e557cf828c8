//! Boundaries between the viewer core and the platform it runs on.
//!
//! Each trait is one capability of the embedding page. Asynchronous work
//! (texture decode, media readiness, adaptive manifest negotiation, VR
//! presentation changes) is started through a port and completes later as a
//! [`PlatformEvent`] fed back into the controller.

use glam::{Quat, Vec3};
use pano_stream::ViewerMessage;
use serde::Serialize;

use crate::viewer::mesh::MeshData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryId(pub u64);

/// Handle to a platform media element (video or audio).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MediaElementId(pub u64);

/// Identifies one asynchronous texture decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureTicket {
    pub generation: u64,
    pub serial: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    Rgb,
    Rgba,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoTextureParams {
    pub format: TextureFormat,
    pub flip_y: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgba,
    Bgra,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MaterialDesc {
    /// Plain unlit material sampling `texture`.
    Textured { texture: TextureId },
    /// Shader material that flips V in the vertex stage and reads channels
    /// in `order`; used for RGBA video textures uploaded without flip.
    SwizzledVideo {
        texture: TextureId,
        order: ChannelOrder,
    },
    Solid {
        color: [f32; 3],
        opacity: f32,
        transparent: bool,
        double_sided: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EyeLayer {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshDraw {
    pub geometry: GeometryId,
    pub material: MaterialId,
    pub layer: Option<EyeLayer>,
    pub render_order: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HotspotSprite {
    pub id: String,
    pub center: Vec3,
    pub radius: f32,
    pub scale: f32,
    pub inner_opacity: f32,
    pub outer_opacity: f32,
    pub inner_color: [f32; 3],
}

/// Everything the graphics port needs to draw one frame.
#[derive(Debug, Clone)]
pub struct FrameView<'a> {
    pub time_ms: f64,
    pub camera_orientation: Quat,
    pub camera_position: Vec3,
    pub fov_y_degrees: f32,
    pub aspect: f32,
    /// World position of the content group (spheres and hotspots).
    pub content_offset: Vec3,
    pub meshes: &'a [MeshDraw],
    pub hotspots: &'a [HotspotSprite],
    pub hotspots_visible: bool,
    pub reticle_visible: bool,
    pub stereo_output: bool,
}

pub trait GraphicsPort {
    /// Begin decoding `url`; completes with `TextureLoaded` or `TextureFailed`.
    fn request_texture(&mut self, ticket: TextureTicket, url: &str);
    fn create_video_texture(
        &mut self,
        element: MediaElementId,
        params: VideoTextureParams,
    ) -> TextureId;
    fn create_geometry(&mut self, mesh: &MeshData) -> GeometryId;
    fn create_material(&mut self, material: &MaterialDesc) -> MaterialId;
    fn set_material_opacity(&mut self, material: MaterialId, opacity: f32);
    fn release_texture(&mut self, texture: TextureId);
    fn release_material(&mut self, material: MaterialId);
    fn release_geometry(&mut self, geometry: GeometryId);
    fn resize(&mut self, width: u32, height: u32);
    fn draw(&mut self, frame: &FrameView<'_>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
}

/// Media element operations. Readiness and playback changes come back as
/// [`MediaSignal`]s tagged with the element.
pub trait MediaPort {
    fn create_element(&mut self, kind: MediaKind) -> MediaElementId;
    fn set_attribute(&mut self, element: MediaElementId, name: &str, value: &str);
    fn set_src(&mut self, element: MediaElementId, url: &str);
    fn src(&self, element: MediaElementId) -> Option<String>;
    fn load(&mut self, element: MediaElementId);
    fn play(&mut self, element: MediaElementId);
    fn pause(&mut self, element: MediaElementId);
    fn set_volume(&mut self, element: MediaElementId, volume: f64);
    fn set_muted(&mut self, element: MediaElementId, muted: bool);
    fn current_time(&self, element: MediaElementId) -> f64;
    fn set_current_time(&mut self, element: MediaElementId, seconds: f64);
    fn duration(&self, element: MediaElementId) -> Option<f64>;
    fn release(&mut self, element: MediaElementId);
    fn adaptive_client(&mut self) -> Option<&mut dyn AdaptiveClient>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdaptiveConfig {
    /// Bandwidth assumed for the first segment, in bits per second.
    pub default_bandwidth_estimate: u64,
}

/// Adaptive-streaming (DASH) client bound to one video element at a time.
pub trait AdaptiveClient {
    fn install_polyfills(&mut self);
    fn is_browser_supported(&self) -> bool;
    fn attach(&mut self, element: MediaElementId);
    fn configure(&mut self, config: &AdaptiveConfig);
    /// Begin loading the manifest; completes with `ManifestLoaded` or
    /// `PlayerError` on the attached element.
    fn load(&mut self, url: &str);
    fn detach(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub orientation: Quat,
    pub position: Vec3,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            orientation: Quat::IDENTITY,
            position: Vec3::ZERO,
        }
    }
}

/// A head-mounted display. Presentation requests complete asynchronously as
/// a `PresentChange` event.
pub trait VrDevice {
    fn name(&self) -> &str;
    fn is_presenting(&self) -> bool;
    fn request_present(&mut self) -> Result<(), String>;
    fn exit_present(&mut self);
    fn submit_frame(&mut self);
    fn pose(&self) -> Pose;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Cursor {
    Default,
    Pointer,
}

/// View plumbing around the canvas: spinner, banners, overlays.
pub trait ChromePort {
    fn show_loading(&mut self);
    fn hide_loading(&mut self);
    fn show_error(&mut self, message: &str);
    fn hide_error(&mut self);
    fn show_play_button(&mut self);
    fn hide_play_button(&mut self);
    fn request_fullscreen(&mut self);
    fn set_cursor(&mut self, cursor: Cursor);
    fn push_history(&mut self, query: &str);
}

/// Outbound channel to the embedding page.
pub trait HostPort {
    fn post(&mut self, message: ViewerMessage);
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaSignal {
    CanPlayThrough,
    LoadedMetadata,
    Error(String),
    ManifestLoaded,
    PlayerError(String),
    Play,
    Pause,
    TimeUpdate,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Mouse,
    Touch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerPhase {
    Down,
    Move,
    Up,
}

/// Pointer input in client pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub kind: PointerKind,
    pub phase: PointerPhase,
    pub x: f32,
    pub y: f32,
}

/// Completions and input delivered back to the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformEvent {
    TextureLoaded {
        ticket: TextureTicket,
        texture: TextureId,
    },
    TextureFailed {
        ticket: TextureTicket,
        reason: String,
    },
    Media {
        element: MediaElementId,
        signal: MediaSignal,
    },
    PresentChange,
    Resize {
        width: u32,
        height: u32,
    },
    Pointer(PointerEvent),
}

/// Anything that consumes platform events; lets the headless platform pump
/// either a bare controller or a full session.
pub trait EventSink {
    fn handle_event(&mut self, event: PlatformEvent);
}
