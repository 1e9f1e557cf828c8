//! Scene lifecycle, per-frame coordination and VR mode handling.

pub mod camera;
pub mod compositor;
pub mod display;
pub mod hotspots;
pub mod mesh;

use std::collections::BTreeMap;
use std::sync::mpsc::Receiver;
use std::task::Poll;

use glam::{Vec2, Vec3};
use pano_stream::{HotspotSpec, ViewPosition};

use crate::error::ViewerError;
use crate::events::{EventBus, drain};
use crate::media::{MediaConfig, MediaEvent, MediaLoader, PlaybackProxy};
use crate::platform::PlatformProfile;
use crate::ports::{
    Cursor, EventSink, FrameView, GraphicsPort, MediaElementId, MediaPort, MediaSignal,
    PlatformEvent, PointerEvent, PointerKind, PointerPhase, TextureId, TextureTicket, VrDevice,
};
use crate::scene::SceneDescriptor;
use camera::{CameraRig, FOV_Y_DEGREES};
use compositor::{OpacityTicket, SphereCompositor};
use display::{DisplayApi, DisplayBackend};
use hotspots::{HotspotError, HotspotEvent, HotspotFrame, HotspotLayer};

const IE11_VIDEO_MESSAGE: &str = "Video is not supported on IE11.";
const SETTLED_HISTORY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneState {
    Idle,
    Loading,
    Loaded,
    Failed,
    Disposed,
}

/// Handle for one `set_scene` call; poll it with
/// [`ViewportController::poll_scene`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneLoad {
    generation: u64,
}

impl SceneLoad {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    Loaded {
        generation: u64,
        video: Option<MediaElementId>,
        duration: Option<f64>,
    },
    Error {
        message: String,
    },
    ModeChange {
        presenting: bool,
    },
    FullscreenExited,
    Metadata {
        duration: Option<f64>,
    },
    Playback(MediaSignal),
    Hotspot(HotspotEvent),
}

/// Platform capabilities the controller drives directly.
pub struct ViewerPorts {
    pub graphics: Box<dyn GraphicsPort>,
    pub media: Box<dyn MediaPort>,
}

#[derive(Debug, Clone, PartialEq)]
enum LoadStep {
    AwaitPreview {
        ticket: TextureTicket,
        full_url: String,
    },
    AwaitImage {
        ticket: TextureTicket,
        after_preview: bool,
    },
    AwaitVideo,
    Done,
}

#[derive(Debug)]
struct MediaSlot {
    loader: MediaLoader,
    events: Receiver<MediaEvent>,
    proxy: PlaybackProxy,
    ready: bool,
}

#[derive(Debug)]
struct ActiveScene {
    generation: u64,
    descriptor: SceneDescriptor,
    step: LoadStep,
    outcome: Option<Result<(), ViewerError>>,
    media: Option<MediaSlot>,
}

/// Top-level orchestrator for one viewer canvas.
///
/// `set_scene` tears the previous scene down before issuing any new request,
/// so resources from two scenes never coexist. Asynchronous completions
/// arrive through [`handle_event`](Self::handle_event) and carry the
/// generation they were issued for; anything from an older generation is
/// released and ignored.
pub struct ViewportController {
    graphics: Box<dyn GraphicsPort>,
    media: Box<dyn MediaPort>,
    profile: PlatformProfile,
    camera: CameraRig,
    compositor: SphereCompositor,
    hotspots: HotspotLayer,
    hotspot_events: Receiver<HotspotEvent>,
    display: DisplayBackend,
    state: SceneState,
    generation: u64,
    active: Option<ActiveScene>,
    settled: BTreeMap<u64, Result<(), ViewerError>>,
    presenting: bool,
    reticle_visible: bool,
    cursor: Cursor,
    drag: Option<Vec2>,
    content_offset: Vec3,
    now_ms: f64,
    frames: u64,
    submitted_frames: u64,
    events: EventBus<ViewerEvent>,
}

impl ViewportController {
    pub fn new(ports: ViewerPorts, profile: PlatformProfile, width: u32, height: u32) -> Self {
        let ViewerPorts {
            mut graphics,
            media,
        } = ports;
        let compositor = SphereCompositor::new(graphics.as_mut(), &profile);
        let mut hotspots = HotspotLayer::new(!profile.is_mobile());
        let hotspot_events = hotspots.subscribe();
        graphics.resize(width.max(1), height.max(1));
        Self {
            graphics,
            media,
            profile,
            camera: CameraRig::new(width, height),
            compositor,
            hotspots,
            hotspot_events,
            display: DisplayBackend::Orbit,
            state: SceneState::Idle,
            generation: 0,
            active: None,
            settled: BTreeMap::new(),
            presenting: false,
            reticle_visible: false,
            cursor: Cursor::Default,
            drag: None,
            content_offset: Vec3::ZERO,
            now_ms: 0.0,
            frames: 0,
            submitted_frames: 0,
            events: EventBus::new(),
        }
    }

    pub fn subscribe(&mut self) -> Receiver<ViewerEvent> {
        self.events.subscribe()
    }

    pub fn profile(&self) -> &PlatformProfile {
        &self.profile
    }

    pub fn state(&self) -> SceneState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn descriptor(&self) -> Option<&SceneDescriptor> {
        self.active.as_ref().map(|scene| &scene.descriptor)
    }

    pub fn compositor(&self) -> &SphereCompositor {
        &self.compositor
    }

    pub fn camera(&self) -> &CameraRig {
        &self.camera
    }

    pub fn hotspots(&self) -> &HotspotLayer {
        &self.hotspots
    }

    pub fn content_offset(&self) -> Vec3 {
        self.content_offset
    }

    pub fn is_presenting(&self) -> bool {
        self.presenting
    }

    pub fn reticle_visible(&self) -> bool {
        self.reticle_visible
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn submitted_frames(&self) -> u64 {
        self.submitted_frames
    }

    pub fn display(&self) -> &DisplayBackend {
        &self.display
    }

    /// Element of the loaded video, once the scene has settled with one.
    pub fn active_video(&self) -> Option<MediaElementId> {
        self.active
            .as_ref()
            .and_then(|scene| scene.media.as_ref())
            .filter(|slot| slot.ready)
            .map(|slot| slot.loader.element())
    }

    pub fn set_scene(&mut self, descriptor: SceneDescriptor) -> Result<SceneLoad, ViewerError> {
        if self.state == SceneState::Disposed {
            return Err(ViewerError::Disposed);
        }
        if let Some(message) = descriptor.error_message() {
            log::warn!("Invalid scene: {message}");
            self.events.emit(ViewerEvent::Error {
                message: message.to_string(),
            });
            return Err(ViewerError::InvalidScene(message.to_string()));
        }

        self.teardown();
        self.generation += 1;
        let generation = self.generation;
        self.state = SceneState::Loading;
        self.camera.set_default_yaw(descriptor.default_yaw_radians());
        self.camera.set_yaw_only(descriptor.is_yaw_only());
        if descriptor.is_debug() {
            log::info!("Loaded scene {:?}", descriptor);
        }

        let stereo = descriptor.is_stereo();
        let mut scene = ActiveScene {
            generation,
            descriptor,
            step: LoadStep::Done,
            outcome: None,
            media: None,
        };
        let mut failure = None;

        match (scene.descriptor.video_url(), scene.descriptor.image_url()) {
            (None, Some(image)) => {
                scene.step = match scene.descriptor.preview_url() {
                    Some(preview) => LoadStep::AwaitPreview {
                        ticket: self.compositor.begin_photosphere(
                            self.graphics.as_mut(),
                            generation,
                            preview,
                            stereo,
                        ),
                        full_url: image.to_string(),
                    },
                    None => LoadStep::AwaitImage {
                        ticket: self.compositor.begin_photosphere(
                            self.graphics.as_mut(),
                            generation,
                            image,
                            stereo,
                        ),
                        after_preview: false,
                    },
                };
            }
            (Some(video), fallback) => {
                if self.profile.supports_video_textures() {
                    let config = MediaConfig::from(&scene.descriptor);
                    let mut loader = MediaLoader::new(self.media.as_mut(), &config);
                    let events = loader.subscribe();
                    let proxy = PlaybackProxy::new(loader.element(), &config, &self.profile);
                    loader.load(self.media.as_mut(), &self.profile, video);
                    scene.media = Some(MediaSlot {
                        loader,
                        events,
                        proxy,
                        ready: false,
                    });
                    scene.step = LoadStep::AwaitVideo;
                } else if let Some(image) = fallback {
                    scene.step = LoadStep::AwaitImage {
                        ticket: self.compositor.begin_photosphere(
                            self.graphics.as_mut(),
                            generation,
                            image,
                            stereo,
                        ),
                        after_preview: false,
                    };
                } else {
                    failure = Some(ViewerError::PlatformUnsupported(IE11_VIDEO_MESSAGE.to_string()));
                }
            }
            (None, None) => {}
        }

        self.active = Some(scene);
        if let Some(err) = failure {
            self.settle(Err(err));
        }
        self.pump_media_events();
        Ok(SceneLoad { generation })
    }

    pub fn poll_scene(&self, load: &SceneLoad) -> Poll<Result<(), ViewerError>> {
        if let Some(scene) = self
            .active
            .as_ref()
            .filter(|scene| scene.generation == load.generation)
        {
            return match &scene.outcome {
                Some(outcome) => Poll::Ready(outcome.clone()),
                None => Poll::Pending,
            };
        }
        match self.settled.get(&load.generation) {
            Some(outcome) => Poll::Ready(outcome.clone()),
            None => Poll::Ready(Err(ViewerError::Superseded)),
        }
    }

    fn teardown(&mut self) {
        if let Some(scene) = self.active.take() {
            let outcome = scene.outcome.unwrap_or(Err(ViewerError::Superseded));
            self.settled.insert(scene.generation, outcome);
            while self.settled.len() > SETTLED_HISTORY {
                self.settled.pop_first();
            }
            if let Some(slot) = scene.media {
                slot.proxy.detach(self.media.as_mut(), self.now_ms);
                slot.loader.destroy(self.media.as_mut());
            }
        }
        self.compositor.clear(self.graphics.as_mut());
    }

    fn settle(&mut self, outcome: Result<(), ViewerError>) {
        let Some(scene) = self.active.as_mut() else {
            return;
        };
        if scene.outcome.is_some() {
            return;
        }
        scene.outcome = Some(outcome.clone());
        match outcome {
            Ok(()) => {
                self.state = SceneState::Loaded;
                let video = scene
                    .media
                    .as_mut()
                    .map(|slot| {
                        slot.ready = true;
                        slot.loader.element()
                    });
                let duration = video.and_then(|element| self.media.duration(element));
                self.events.emit(ViewerEvent::Loaded {
                    generation: scene.generation,
                    video,
                    duration,
                });
            }
            Err(err) => {
                self.state = SceneState::Failed;
                log::error!("scene {} failed: {err}", scene.generation);
                self.events.emit(ViewerEvent::Error {
                    message: err.to_string(),
                });
            }
        }
    }

    fn texture_loaded(&mut self, ticket: TextureTicket, texture: TextureId) {
        let current = self
            .active
            .as_ref()
            .is_some_and(|scene| scene.generation == ticket.generation);
        if !current || !self.compositor.complete_texture(self.graphics.as_mut(), ticket, texture) {
            if current {
                log::debug!("ignoring superseded texture {:?}", ticket);
            } else {
                log::debug!("releasing texture for stale scene {}", ticket.generation);
                self.graphics.release_texture(texture);
            }
            return;
        }
        let Some(scene) = self.active.as_mut() else {
            return;
        };
        match std::mem::replace(&mut scene.step, LoadStep::Done) {
            LoadStep::AwaitPreview { full_url, .. } => {
                let stereo = scene.descriptor.is_stereo();
                let generation = scene.generation;
                let full = self.compositor.begin_photosphere(
                    self.graphics.as_mut(),
                    generation,
                    &full_url,
                    stereo,
                );
                if let Some(scene) = self.active.as_mut() {
                    scene.step = LoadStep::AwaitImage {
                        ticket: full,
                        after_preview: true,
                    };
                }
                self.settle(Ok(()));
            }
            LoadStep::AwaitImage {
                after_preview: false,
                ..
            } => self.settle(Ok(())),
            _ => {}
        }
    }

    fn texture_failed(&mut self, ticket: TextureTicket, reason: &str) {
        let current = self
            .active
            .as_ref()
            .is_some_and(|scene| scene.generation == ticket.generation);
        if !current {
            return;
        }
        let Some(err) = self.compositor.texture_failed(ticket) else {
            return;
        };
        log::warn!("{err} ({reason})");
        let Some(scene) = self.active.as_mut() else {
            return;
        };
        let step = std::mem::replace(&mut scene.step, LoadStep::Done);
        let err = ViewerError::from_compositor(&err);
        match step {
            LoadStep::AwaitImage {
                after_preview: true,
                ..
            } => {
                self.events.emit(ViewerEvent::Error {
                    message: err.to_string(),
                });
            }
            _ => self.settle(Err(err)),
        }
    }

    fn media_signal(&mut self, element: MediaElementId, signal: MediaSignal) {
        let Some(slot) = self.active.as_mut().and_then(|scene| scene.media.as_mut()) else {
            log::debug!("ignoring media signal {:?} without a video", signal);
            return;
        };
        // The fake-playback audio companion reports play state for the video.
        let from_audio = slot.proxy.audio() == Some(element);
        if !from_audio && !slot.loader.handle_signal(self.media.as_ref(), element, &signal) {
            return;
        }
        let ready = slot.ready;
        self.pump_media_events();
        if ready
            && matches!(
                signal,
                MediaSignal::Play | MediaSignal::Pause | MediaSignal::TimeUpdate | MediaSignal::Ended
            )
        {
            self.events.emit(ViewerEvent::Playback(signal));
        }
    }

    fn pump_media_events(&mut self) {
        let pending: Vec<MediaEvent> = self
            .active
            .as_ref()
            .and_then(|scene| scene.media.as_ref())
            .map(|slot| drain(&slot.events))
            .unwrap_or_default();
        for event in pending {
            match event {
                MediaEvent::Load { element, format } => {
                    let stereo = self
                        .active
                        .as_ref()
                        .is_some_and(|scene| scene.descriptor.is_stereo());
                    let result = self
                        .compositor
                        .set_videosphere(self.graphics.as_mut(), element, format, stereo)
                        .map_err(|err| ViewerError::from_compositor(&err));
                    if let Some(scene) = self.active.as_mut() {
                        scene.step = LoadStep::Done;
                    }
                    self.settle(result);
                }
                MediaEvent::Error(err) => {
                    if let Some(scene) = self.active.as_mut() {
                        scene.step = LoadStep::Done;
                    }
                    self.settle(Err(ViewerError::from_media(&err)));
                }
                MediaEvent::Metadata { duration } => {
                    self.events.emit(ViewerEvent::Metadata { duration });
                }
            }
        }
    }

    /// Register a newly discovered VR device. Takes effect at the next
    /// present-change check.
    pub fn attach_display(&mut self, api: DisplayApi, device: Box<dyn VrDevice>) {
        self.display = DisplayBackend::probe(Some(api), Some(device));
        log::info!("VR display available via {}", self.display.label());
    }

    pub fn detach_display(&mut self) {
        if self.display.has_device() {
            log::info!("VR display disconnected");
        }
        self.display = DisplayBackend::Orbit;
    }

    pub fn enter_vr(&mut self) -> Result<(), ViewerError> {
        let vr_off = self
            .active
            .as_ref()
            .is_some_and(|scene| {
                scene.descriptor.is_vr_off()
                    || (scene.descriptor.is_video() && self.profile.uses_fake_playback())
            });
        if vr_off {
            return Err(ViewerError::DisplayUnavailable);
        }
        self.display.request_present()
    }

    pub fn exit_vr(&mut self) {
        self.display.exit_present();
    }

    fn on_present_change(&mut self) {
        let presenting = self.display.is_presenting();
        self.presenting = presenting;
        self.reticle_visible = presenting && !self.hotspots.is_empty();
        self.camera.set_tracking(self.display.pose());
        let (width, height) = self.camera.viewport();
        self.resize(width, height);
        if !presenting && self.profile.uses_simulated_fullscreen() {
            self.events.emit(ViewerEvent::FullscreenExited);
        }
        self.events.emit(ViewerEvent::ModeChange { presenting });
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.camera.resize(width, height);
        let (width, height) = self.camera.viewport();
        self.graphics.resize(width, height);
    }

    fn pointer(&mut self, event: PointerEvent) {
        let position = Vec2::new(event.x, event.y);
        match event.phase {
            PointerPhase::Down => self.drag = Some(position),
            PointerPhase::Move => {
                if let Some(last) = self.drag {
                    if !self.presenting && (event.kind == PointerKind::Touch || !self.profile.is_mobile()) {
                        let delta = position - last;
                        self.camera.orbit_by(delta.x, delta.y);
                    }
                    self.drag = Some(position);
                }
            }
            PointerPhase::Up => self.drag = None,
        }
        let frame = HotspotFrame {
            camera: &self.camera,
            content_offset: self.content_offset,
            presenting: self.presenting,
            now_ms: self.now_ms,
        };
        self.hotspots.pointer(&event, &frame);
        self.forward_hotspot_events();
    }

    fn forward_hotspot_events(&mut self) {
        for event in drain(&self.hotspot_events) {
            match &event {
                HotspotEvent::Focus(_) => self.cursor = Cursor::Pointer,
                HotspotEvent::Blur(_) => self.cursor = Cursor::Default,
                HotspotEvent::Click(_) => {}
            }
            self.events.emit(ViewerEvent::Hotspot(event));
        }
    }

    pub fn add_hotspot(&mut self, spec: &HotspotSpec) -> Result<(), HotspotError> {
        let result = self.hotspots.add(spec);
        self.reticle_visible = self.presenting && !self.hotspots.is_empty();
        result
    }

    pub fn remove_hotspot(&mut self, id: &str) -> Result<(), HotspotError> {
        let result = self.hotspots.remove(id);
        self.forward_hotspot_events();
        self.reticle_visible = self.presenting && !self.hotspots.is_empty();
        result
    }

    pub fn clear_hotspots(&mut self) {
        self.hotspots.clear_all();
        self.forward_hotspot_events();
        self.reticle_visible = false;
    }

    pub fn set_hotspots_visible(&mut self, visible: bool) {
        self.hotspots.set_visible(visible);
    }

    pub fn set_opacity(&mut self, target: f32, duration_ms: f64) -> OpacityTicket {
        self.compositor
            .set_opacity(self.graphics.as_mut(), target, duration_ms)
    }

    pub fn poll_opacity(&self, ticket: OpacityTicket) -> Poll<()> {
        self.compositor.poll_opacity(ticket)
    }

    pub fn autopan(&mut self) {
        self.camera.autopan();
    }

    /// Advance animations and playback, then draw and submit one frame.
    pub fn render(&mut self, now_ms: f64) {
        if self.state == SceneState::Disposed {
            return;
        }
        self.now_ms = now_ms;
        self.compositor.advance(self.graphics.as_mut(), now_ms);
        self.camera.advance(now_ms);
        self.camera.set_tracking(if self.presenting {
            self.display.pose()
        } else {
            None
        });
        if let Some(slot) = self.active.as_mut().and_then(|scene| scene.media.as_mut()) {
            slot.proxy.update(self.media.as_mut(), now_ms);
        }

        // Only the tracked head height moves the content; it is assigned,
        // never stacked on the tracked camera transform.
        self.content_offset = Vec3::new(0.0, self.camera.world_position().y, 0.0);

        let frame = HotspotFrame {
            camera: &self.camera,
            content_offset: self.content_offset,
            presenting: self.presenting,
            now_ms,
        };
        self.hotspots.update(&frame);
        self.forward_hotspot_events();

        let meshes = self.compositor.draws();
        let sprites = self.hotspots.sprites(self.content_offset);
        let view = FrameView {
            time_ms: now_ms,
            camera_orientation: self.camera.world_orientation(),
            camera_position: self.camera.world_position(),
            fov_y_degrees: FOV_Y_DEGREES,
            aspect: self.camera.aspect(),
            content_offset: self.content_offset,
            meshes: &meshes,
            hotspots: &sprites,
            hotspots_visible: self.hotspots.is_visible(),
            reticle_visible: self.reticle_visible,
            stereo_output: self.presenting,
        };
        self.graphics.draw(&view);
        if self.display.submit_frame() {
            self.submitted_frames += 1;
        }
        self.frames += 1;
    }

    pub fn has_video(&self) -> bool {
        self.active_video().is_some()
    }

    pub fn play(&mut self) -> Result<(), ViewerError> {
        let now_ms = self.now_ms;
        let slot = ready_slot(&mut self.active, "play")?;
        slot.proxy.play(self.media.as_mut(), now_ms);
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), ViewerError> {
        let now_ms = self.now_ms;
        let slot = ready_slot(&mut self.active, "pause")?;
        slot.proxy.pause(self.media.as_mut(), now_ms);
        Ok(())
    }

    pub fn is_playing(&self) -> bool {
        self.active
            .as_ref()
            .and_then(|scene| scene.media.as_ref())
            .is_some_and(|slot| slot.proxy.is_playing())
    }

    pub fn set_volume(&mut self, level: f64) -> Result<(), ViewerError> {
        let slot = ready_slot(&mut self.active, "set volume")?;
        slot.proxy.set_volume(self.media.as_mut(), level);
        Ok(())
    }

    pub fn set_muted(&mut self, muted: bool) -> Result<(), ViewerError> {
        let slot = ready_slot(&mut self.active, "mute")?;
        slot.proxy.mute(self.media.as_mut(), muted);
        Ok(())
    }

    pub fn set_current_time(&mut self, seconds: f64) -> Result<(), ViewerError> {
        let now_ms = self.now_ms;
        let slot = ready_slot(&mut self.active, "set current time")?;
        slot.proxy.set_current_time(self.media.as_mut(), now_ms, seconds);
        Ok(())
    }

    pub fn current_time(&self) -> Option<f64> {
        let element = self.active_video()?;
        Some(self.media.current_time(element))
    }

    pub fn duration(&self) -> Option<f64> {
        let element = self.active_video()?;
        self.media.duration(element)
    }

    pub fn position(&self) -> ViewPosition {
        let (yaw, pitch) = self.camera.yaw_pitch_degrees();
        ViewPosition { yaw, pitch }
    }

    /// Release the active scene. The controller accepts no further scenes.
    pub fn destroy(&mut self) {
        if self.state == SceneState::Disposed {
            return;
        }
        self.exit_vr();
        self.teardown();
        self.compositor.dispose(self.graphics.as_mut());
        self.state = SceneState::Disposed;
    }
}

impl EventSink for ViewportController {
    fn handle_event(&mut self, event: PlatformEvent) {
        if self.state == SceneState::Disposed {
            if let PlatformEvent::TextureLoaded { texture, .. } = event {
                self.graphics.release_texture(texture);
            }
            return;
        }
        match event {
            PlatformEvent::TextureLoaded { ticket, texture } => self.texture_loaded(ticket, texture),
            PlatformEvent::TextureFailed { ticket, reason } => self.texture_failed(ticket, &reason),
            PlatformEvent::Media { element, signal } => self.media_signal(element, signal),
            PlatformEvent::PresentChange => self.on_present_change(),
            PlatformEvent::Resize { width, height } => self.resize(width, height),
            PlatformEvent::Pointer(pointer) => self.pointer(pointer),
        }
    }
}

impl ViewportController {
    pub fn handle_event(&mut self, event: PlatformEvent) {
        EventSink::handle_event(self, event);
    }
}

fn ready_slot<'a>(
    active: &'a mut Option<ActiveScene>,
    action: &'static str,
) -> Result<&'a mut MediaSlot, ViewerError> {
    active
        .as_mut()
        .and_then(|scene| scene.media.as_mut())
        .filter(|slot| slot.ready)
        .ok_or(ViewerError::NoVideo(action))
}
