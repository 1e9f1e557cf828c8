//! In-memory platform.
//!
//! Every port writes into one shared [`HeadlessWorld`]. Asynchronous work
//! (texture decode, media readiness, manifest negotiation, VR presentation)
//! is queued as [`PlatformEvent`]s and only delivered when the host calls
//! [`HeadlessPlatform::pump`], which makes ordering fully deterministic.

use std::cell::{Ref, RefCell};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::rc::Rc;

use pano_stream::ViewerMessage;
use serde::Serialize;

use crate::ports::{
    AdaptiveClient, AdaptiveConfig, ChromePort, Cursor, EventSink, FrameView, GeometryId,
    GraphicsPort, HostPort, HotspotSprite, MaterialDesc, MaterialId, MediaElementId, MediaKind,
    MediaPort, MediaSignal, MeshDraw, PlatformEvent, Pose, TextureId, TextureTicket,
    VideoTextureParams, VrDevice,
};
use crate::viewer::ViewerPorts;
use crate::viewer::mesh::MeshData;

const DEFAULT_VIDEO_DURATION_S: f64 = 30.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ElementState {
    pub kind: MediaKind,
    pub attributes: BTreeMap<String, String>,
    pub src: Option<String>,
    pub volume: f64,
    pub muted: bool,
    pub paused: bool,
    pub current_time: f64,
    pub duration: Option<f64>,
    pub load_calls: u32,
    pub released: bool,
}

impl ElementState {
    fn new(kind: MediaKind) -> Self {
        Self {
            kind,
            attributes: BTreeMap::new(),
            src: None,
            volume: 1.0,
            muted: false,
            paused: true,
            current_time: 0.0,
            duration: None,
            load_calls: 0,
            released: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeometryRecord {
    pub vertex_count: usize,
    pub index_count: usize,
    /// Bytes a GPU upload of the vertex and index buffers would take.
    pub uploaded_bytes: usize,
    pub v_range: (f32, f32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdaptiveCall {
    InstallPolyfills,
    Attach(MediaElementId),
    Configure(AdaptiveConfig),
    Load(String),
    Detach,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "call", content = "arg", rename_all = "snake_case")]
pub enum ChromeCall {
    ShowLoading,
    HideLoading,
    ShowError(String),
    HideError,
    ShowPlayButton,
    HidePlayButton,
    RequestFullscreen,
    SetCursor(Cursor),
    PushHistory(String),
}

/// Owned copy of the last drawn frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRecord {
    pub time_ms: f64,
    pub meshes: Vec<MeshDraw>,
    pub hotspots: Vec<HotspotSprite>,
    pub camera_position: glam::Vec3,
    pub content_offset: glam::Vec3,
    pub hotspots_visible: bool,
    pub reticle_visible: bool,
    pub stereo_output: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    pub name: String,
    pub presenting: bool,
    pub pose: Pose,
    pub submits: u64,
    pub refuse_present: bool,
}

#[derive(Debug, Default)]
pub struct HeadlessWorld {
    next_id: u64,
    queue: VecDeque<PlatformEvent>,
    fail_patterns: Vec<String>,
    pub texture_requests: Vec<(TextureTicket, String)>,
    pub live_textures: BTreeSet<TextureId>,
    pub released_textures: Vec<TextureId>,
    pub video_textures: BTreeMap<TextureId, (MediaElementId, VideoTextureParams)>,
    pub live_materials: BTreeMap<MaterialId, MaterialDesc>,
    pub material_opacity: BTreeMap<MaterialId, f32>,
    pub live_geometries: BTreeMap<GeometryId, GeometryRecord>,
    pub elements: BTreeMap<MediaElementId, ElementState>,
    pub adaptive_calls: Vec<AdaptiveCall>,
    adaptive_unavailable: bool,
    adaptive_unsupported: bool,
    adaptive_element: Option<MediaElementId>,
    video_duration: Option<f64>,
    pub viewport: (u32, u32),
    pub draw_calls: u64,
    pub last_frame: Option<FrameRecord>,
    pub device: Option<DeviceState>,
    pub host_messages: Vec<ViewerMessage>,
    pub chrome_calls: Vec<ChromeCall>,
}

impl HeadlessWorld {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn fails(&self, url: &str) -> bool {
        self.fail_patterns
            .iter()
            .any(|pattern| url.contains(pattern.as_str()))
    }

    fn element_mut(&mut self, element: MediaElementId) -> Option<&mut ElementState> {
        self.elements.get_mut(&element)
    }

    fn signal(&mut self, element: MediaElementId, signal: MediaSignal) {
        self.queue.push_back(PlatformEvent::Media { element, signal });
    }

    fn duration(&self) -> f64 {
        self.video_duration.unwrap_or(DEFAULT_VIDEO_DURATION_S)
    }

    pub fn element(&self, element: MediaElementId) -> Option<&ElementState> {
        self.elements.get(&element)
    }

    pub fn live_elements(&self) -> usize {
        self.elements.values().filter(|state| !state.released).count()
    }

    pub fn queued_events(&self) -> usize {
        self.queue.len()
    }
}

/// Handle to the shared world; clones see the same state.
#[derive(Debug, Clone, Default)]
pub struct HeadlessPlatform {
    world: Rc<RefCell<HeadlessWorld>>,
}

impl HeadlessPlatform {
    pub fn new() -> Self {
        let platform = Self::default();
        platform.world.borrow_mut().viewport = (1280, 720);
        platform
    }

    pub fn world(&self) -> Ref<'_, HeadlessWorld> {
        self.world.borrow()
    }

    /// Any texture or media URL containing `pattern` fails to load.
    pub fn fail_url(&self, pattern: impl Into<String>) {
        self.world.borrow_mut().fail_patterns.push(pattern.into());
    }

    pub fn set_video_duration(&self, seconds: f64) {
        self.world.borrow_mut().video_duration = Some(seconds);
    }

    /// Remove the adaptive-streaming client entirely.
    pub fn disable_adaptive_client(&self) {
        self.world.borrow_mut().adaptive_unavailable = true;
    }

    pub fn set_adaptive_supported(&self, supported: bool) {
        self.world.borrow_mut().adaptive_unsupported = !supported;
    }

    pub fn set_pose(&self, pose: Pose) {
        if let Some(device) = self.world.borrow_mut().device.as_mut() {
            device.pose = pose;
        }
    }

    pub fn refuse_present(&self) {
        if let Some(device) = self.world.borrow_mut().device.as_mut() {
            device.refuse_present = true;
        }
    }

    pub fn push_event(&self, event: PlatformEvent) {
        self.world.borrow_mut().queue.push_back(event);
    }

    pub fn ports(&self) -> ViewerPorts {
        ViewerPorts {
            graphics: Box::new(HeadlessGraphics {
                world: self.world.clone(),
            }),
            media: Box::new(HeadlessMedia {
                world: self.world.clone(),
                adaptive: HeadlessAdaptive {
                    world: self.world.clone(),
                },
            }),
        }
    }

    /// A head-mounted display backed by this world.
    pub fn vr_device(&self, name: &str) -> Box<dyn VrDevice> {
        self.world.borrow_mut().device = Some(DeviceState {
            name: name.to_string(),
            presenting: false,
            pose: Pose::default(),
            submits: 0,
            refuse_present: false,
        });
        Box::new(HeadlessVrDevice {
            world: self.world.clone(),
            name: name.to_string(),
        })
    }

    pub fn chrome(&self) -> Box<dyn ChromePort> {
        Box::new(HeadlessChrome {
            world: self.world.clone(),
        })
    }

    pub fn host(&self) -> Box<dyn HostPort> {
        Box::new(HeadlessHost {
            world: self.world.clone(),
        })
    }

    /// Deliver queued events, including any queued while delivering, until
    /// the queue is empty. Returns how many were delivered.
    pub fn pump(&self, sink: &mut dyn EventSink) -> usize {
        let mut delivered = 0;
        loop {
            let next = self.world.borrow_mut().queue.pop_front();
            let Some(event) = next else {
                return delivered;
            };
            sink.handle_event(event);
            delivered += 1;
        }
    }

    /// Deliver only the events queued right now.
    pub fn pump_once(&self, sink: &mut dyn EventSink) -> usize {
        let batch: Vec<PlatformEvent> = self.world.borrow_mut().queue.drain(..).collect();
        let count = batch.len();
        for event in batch {
            sink.handle_event(event);
        }
        count
    }

    /// Drop queued events without delivering them.
    pub fn take_queue(&self) -> Vec<PlatformEvent> {
        self.world.borrow_mut().queue.drain(..).collect()
    }

    pub fn host_messages(&self) -> Vec<ViewerMessage> {
        self.world.borrow().host_messages.clone()
    }

    pub fn chrome_calls(&self) -> Vec<ChromeCall> {
        self.world.borrow().chrome_calls.clone()
    }

    pub fn texture_requests(&self) -> Vec<(TextureTicket, String)> {
        self.world.borrow().texture_requests.clone()
    }

    pub fn adaptive_calls(&self) -> Vec<AdaptiveCall> {
        self.world.borrow().adaptive_calls.clone()
    }

    pub fn element(&self, element: MediaElementId) -> Option<ElementState> {
        self.world.borrow().elements.get(&element).cloned()
    }

    pub fn last_frame(&self) -> Option<FrameRecord> {
        self.world.borrow().last_frame.clone()
    }

    pub fn device(&self) -> Option<DeviceState> {
        self.world.borrow().device.clone()
    }
}

struct HeadlessGraphics {
    world: Rc<RefCell<HeadlessWorld>>,
}

impl GraphicsPort for HeadlessGraphics {
    fn request_texture(&mut self, ticket: TextureTicket, url: &str) {
        let mut world = self.world.borrow_mut();
        world.texture_requests.push((ticket, url.to_string()));
        if world.fails(url) {
            world.queue.push_back(PlatformEvent::TextureFailed {
                ticket,
                reason: "404 Not Found".to_string(),
            });
            return;
        }
        let texture = TextureId(world.allocate());
        world.live_textures.insert(texture);
        world
            .queue
            .push_back(PlatformEvent::TextureLoaded { ticket, texture });
    }

    fn create_video_texture(
        &mut self,
        element: MediaElementId,
        params: VideoTextureParams,
    ) -> TextureId {
        let mut world = self.world.borrow_mut();
        let texture = TextureId(world.allocate());
        world.live_textures.insert(texture);
        world.video_textures.insert(texture, (element, params));
        texture
    }

    fn create_geometry(&mut self, mesh: &MeshData) -> GeometryId {
        let mut world = self.world.borrow_mut();
        let geometry = GeometryId(world.allocate());
        world.live_geometries.insert(
            geometry,
            GeometryRecord {
                vertex_count: mesh.vertices.len(),
                index_count: mesh.indices.len(),
                uploaded_bytes: mesh.vertex_bytes().len() + mesh.index_bytes().len(),
                v_range: mesh.v_range(),
            },
        );
        geometry
    }

    fn create_material(&mut self, material: &MaterialDesc) -> MaterialId {
        let mut world = self.world.borrow_mut();
        let id = MaterialId(world.allocate());
        if let MaterialDesc::Solid { opacity, .. } = material {
            world.material_opacity.insert(id, *opacity);
        }
        world.live_materials.insert(id, material.clone());
        id
    }

    fn set_material_opacity(&mut self, material: MaterialId, opacity: f32) {
        self.world
            .borrow_mut()
            .material_opacity
            .insert(material, opacity);
    }

    fn release_texture(&mut self, texture: TextureId) {
        let mut world = self.world.borrow_mut();
        if world.live_textures.remove(&texture) {
            world.released_textures.push(texture);
        } else {
            log::warn!("texture {:?} released twice", texture);
        }
    }

    fn release_material(&mut self, material: MaterialId) {
        let mut world = self.world.borrow_mut();
        world.live_materials.remove(&material);
        world.material_opacity.remove(&material);
    }

    fn release_geometry(&mut self, geometry: GeometryId) {
        self.world.borrow_mut().live_geometries.remove(&geometry);
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.world.borrow_mut().viewport = (width, height);
    }

    fn draw(&mut self, frame: &FrameView<'_>) {
        let mut world = self.world.borrow_mut();
        world.draw_calls += 1;
        world.last_frame = Some(FrameRecord {
            time_ms: frame.time_ms,
            meshes: frame.meshes.to_vec(),
            hotspots: frame.hotspots.to_vec(),
            camera_position: frame.camera_position,
            content_offset: frame.content_offset,
            hotspots_visible: frame.hotspots_visible,
            reticle_visible: frame.reticle_visible,
            stereo_output: frame.stereo_output,
        });
    }
}

struct HeadlessAdaptive {
    world: Rc<RefCell<HeadlessWorld>>,
}

impl AdaptiveClient for HeadlessAdaptive {
    fn install_polyfills(&mut self) {
        self.world
            .borrow_mut()
            .adaptive_calls
            .push(AdaptiveCall::InstallPolyfills);
    }

    fn is_browser_supported(&self) -> bool {
        !self.world.borrow().adaptive_unsupported
    }

    fn attach(&mut self, element: MediaElementId) {
        let mut world = self.world.borrow_mut();
        world.adaptive_element = Some(element);
        world.adaptive_calls.push(AdaptiveCall::Attach(element));
    }

    fn configure(&mut self, config: &AdaptiveConfig) {
        self.world
            .borrow_mut()
            .adaptive_calls
            .push(AdaptiveCall::Configure(*config));
    }

    fn load(&mut self, url: &str) {
        let mut world = self.world.borrow_mut();
        world.adaptive_calls.push(AdaptiveCall::Load(url.to_string()));
        let Some(element) = world.adaptive_element else {
            return;
        };
        if world.fails(url) {
            world.signal(
                element,
                MediaSignal::PlayerError(format!("Shaka error 1001 loading {url}")),
            );
            return;
        }
        let duration = world.duration();
        if let Some(state) = world.element_mut(element) {
            state.duration = Some(duration);
            state.src = Some(format!("blob:{url}"));
        }
        world.signal(element, MediaSignal::LoadedMetadata);
        world.signal(element, MediaSignal::ManifestLoaded);
    }

    fn detach(&mut self) {
        let mut world = self.world.borrow_mut();
        world.adaptive_element = None;
        world.adaptive_calls.push(AdaptiveCall::Detach);
    }
}

struct HeadlessMedia {
    world: Rc<RefCell<HeadlessWorld>>,
    adaptive: HeadlessAdaptive,
}

impl MediaPort for HeadlessMedia {
    fn create_element(&mut self, kind: MediaKind) -> MediaElementId {
        let mut world = self.world.borrow_mut();
        let element = MediaElementId(world.allocate());
        world.elements.insert(element, ElementState::new(kind));
        element
    }

    fn set_attribute(&mut self, element: MediaElementId, name: &str, value: &str) {
        if let Some(state) = self.world.borrow_mut().element_mut(element) {
            state.attributes.insert(name.to_string(), value.to_string());
        }
    }

    fn set_src(&mut self, element: MediaElementId, url: &str) {
        if let Some(state) = self.world.borrow_mut().element_mut(element) {
            state.src = (!url.is_empty()).then(|| url.to_string());
        }
    }

    fn src(&self, element: MediaElementId) -> Option<String> {
        self.world.borrow().element(element)?.src.clone()
    }

    fn load(&mut self, element: MediaElementId) {
        let mut world = self.world.borrow_mut();
        let duration = world.duration();
        let Some(state) = world.element_mut(element) else {
            return;
        };
        state.load_calls += 1;
        let Some(src) = state.src.clone() else {
            return;
        };
        if world.fails(&src) {
            world.signal(
                element,
                MediaSignal::Error("MEDIA_ERR_SRC_NOT_SUPPORTED".to_string()),
            );
            return;
        }
        if let Some(state) = world.element_mut(element) {
            state.duration = Some(duration);
        }
        world.signal(element, MediaSignal::LoadedMetadata);
        world.signal(element, MediaSignal::CanPlayThrough);
    }

    fn play(&mut self, element: MediaElementId) {
        let mut world = self.world.borrow_mut();
        let Some(state) = world.element_mut(element) else {
            return;
        };
        if state.paused {
            state.paused = false;
            world.signal(element, MediaSignal::Play);
        }
    }

    fn pause(&mut self, element: MediaElementId) {
        let mut world = self.world.borrow_mut();
        let Some(state) = world.element_mut(element) else {
            return;
        };
        if !state.paused {
            state.paused = true;
            world.signal(element, MediaSignal::Pause);
        }
    }

    fn set_volume(&mut self, element: MediaElementId, volume: f64) {
        if let Some(state) = self.world.borrow_mut().element_mut(element) {
            state.volume = volume;
        }
    }

    fn set_muted(&mut self, element: MediaElementId, muted: bool) {
        if let Some(state) = self.world.borrow_mut().element_mut(element) {
            state.muted = muted;
        }
    }

    fn current_time(&self, element: MediaElementId) -> f64 {
        self.world
            .borrow()
            .element(element)
            .map(|state| state.current_time)
            .unwrap_or(0.0)
    }

    fn set_current_time(&mut self, element: MediaElementId, seconds: f64) {
        if let Some(state) = self.world.borrow_mut().element_mut(element) {
            state.current_time = seconds;
        }
    }

    fn duration(&self, element: MediaElementId) -> Option<f64> {
        self.world.borrow().element(element)?.duration
    }

    fn release(&mut self, element: MediaElementId) {
        if let Some(state) = self.world.borrow_mut().element_mut(element) {
            state.released = true;
            state.paused = true;
        }
    }

    fn adaptive_client(&mut self) -> Option<&mut dyn AdaptiveClient> {
        if self.world.borrow().adaptive_unavailable {
            return None;
        }
        Some(&mut self.adaptive)
    }
}

struct HeadlessVrDevice {
    world: Rc<RefCell<HeadlessWorld>>,
    name: String,
}

impl VrDevice for HeadlessVrDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_presenting(&self) -> bool {
        self.world
            .borrow()
            .device
            .as_ref()
            .is_some_and(|device| device.presenting)
    }

    fn request_present(&mut self) -> Result<(), String> {
        let mut world = self.world.borrow_mut();
        let Some(device) = world.device.as_mut() else {
            return Err("device disconnected".to_string());
        };
        if device.refuse_present {
            return Err("presentation request denied".to_string());
        }
        if !device.presenting {
            device.presenting = true;
            world.queue.push_back(PlatformEvent::PresentChange);
        }
        Ok(())
    }

    fn exit_present(&mut self) {
        let mut world = self.world.borrow_mut();
        let Some(device) = world.device.as_mut() else {
            return;
        };
        if device.presenting {
            device.presenting = false;
            world.queue.push_back(PlatformEvent::PresentChange);
        }
    }

    fn submit_frame(&mut self) {
        if let Some(device) = self.world.borrow_mut().device.as_mut() {
            device.submits += 1;
        }
    }

    fn pose(&self) -> Pose {
        self.world
            .borrow()
            .device
            .as_ref()
            .map(|device| device.pose)
            .unwrap_or_default()
    }
}

struct HeadlessChrome {
    world: Rc<RefCell<HeadlessWorld>>,
}

impl HeadlessChrome {
    fn record(&mut self, call: ChromeCall) {
        self.world.borrow_mut().chrome_calls.push(call);
    }
}

impl ChromePort for HeadlessChrome {
    fn show_loading(&mut self) {
        self.record(ChromeCall::ShowLoading);
    }

    fn hide_loading(&mut self) {
        self.record(ChromeCall::HideLoading);
    }

    fn show_error(&mut self, message: &str) {
        self.record(ChromeCall::ShowError(message.to_string()));
    }

    fn hide_error(&mut self) {
        self.record(ChromeCall::HideError);
    }

    fn show_play_button(&mut self) {
        self.record(ChromeCall::ShowPlayButton);
    }

    fn hide_play_button(&mut self) {
        self.record(ChromeCall::HidePlayButton);
    }

    fn request_fullscreen(&mut self) {
        self.record(ChromeCall::RequestFullscreen);
    }

    fn set_cursor(&mut self, cursor: Cursor) {
        self.record(ChromeCall::SetCursor(cursor));
    }

    fn push_history(&mut self, query: &str) {
        self.record(ChromeCall::PushHistory(query.to_string()));
    }
}

struct HeadlessHost {
    world: Rc<RefCell<HeadlessWorld>>,
}

impl HostPort for HeadlessHost {
    fn post(&mut self, message: ViewerMessage) {
        log::debug!("host <- {}", message.kind());
        self.world.borrow_mut().host_messages.push(message);
    }
}
