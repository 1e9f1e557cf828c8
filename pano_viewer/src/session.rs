//! Embed glue between the host page and the viewport controller.
//!
//! The session owns the inbound dispatcher, turns host commands into
//! controller calls, relays controller events back as host messages and
//! drives the page chrome (spinner, error banner, play overlay, cursor).

use std::sync::mpsc::Receiver;

use pano_stream::{ClickInfo, HostCommand, InboundDispatcher, InboundEnvelope, ReadyInfo, ViewerMessage};

use crate::error::ViewerError;
use crate::events::drain;
use crate::ports::{ChromePort, Cursor, EventSink, HostPort, MediaSignal, PlatformEvent, PointerKind, PointerPhase};
use crate::scene::{SceneDescriptor, sanitize_message};
use crate::viewer::compositor::OpacityTicket;
use crate::viewer::hotspots::HotspotEvent;
use crate::viewer::{SceneLoad, ViewerEvent, ViewportController};

const CONTENT_FADE_MS: f64 = 500.0;
const RENDER_ERROR_PREFIX: &str = "Render: ";

#[derive(Debug)]
enum ContentSwap {
    Idle,
    FadingOut {
        ticket: OpacityTicket,
        scene: Box<SceneDescriptor>,
    },
    Loading {
        load: SceneLoad,
    },
    FadingIn {
        ticket: OpacityTicket,
    },
}

pub struct ViewerSession {
    controller: ViewportController,
    events: Receiver<ViewerEvent>,
    dispatcher: InboundDispatcher,
    chrome: Box<dyn ChromePort>,
    host: Box<dyn HostPort>,
    swap: ContentSwap,
    ready_sent: bool,
    awaiting_tap: bool,
}

impl ViewerSession {
    pub fn new(
        mut controller: ViewportController,
        chrome: Box<dyn ChromePort>,
        host: Box<dyn HostPort>,
        debug: bool,
    ) -> Self {
        let events = controller.subscribe();
        let mut dispatcher = InboundDispatcher::new(debug);
        dispatcher.register();
        Self {
            controller,
            events,
            dispatcher,
            chrome,
            host,
            swap: ContentSwap::Idle,
            ready_sent: false,
            awaiting_tap: false,
        }
    }

    pub fn controller(&self) -> &ViewportController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut ViewportController {
        &mut self.controller
    }

    pub fn is_swapping_content(&self) -> bool {
        !matches!(self.swap, ContentSwap::Idle)
    }

    pub fn is_awaiting_tap(&self) -> bool {
        self.awaiting_tap
    }

    /// Load the initial scene, typically parsed from the page query.
    pub fn start(&mut self, scene: SceneDescriptor) -> Result<SceneLoad, ViewerError> {
        self.chrome.show_loading();
        let result = self.controller.set_scene(scene);
        self.relay_events();
        result
    }

    pub fn receive_json(&mut self, raw: &str) {
        if let Some(command) = self.dispatcher.route_json(raw) {
            self.apply(command);
        }
    }

    pub fn receive(&mut self, envelope: &InboundEnvelope) {
        if let Some(command) = self.dispatcher.route(envelope) {
            self.apply(command);
        }
    }

    pub fn apply(&mut self, command: HostCommand) {
        match command {
            HostCommand::Play => {
                let result = self.controller.play();
                self.report(result);
            }
            HostCommand::Pause => {
                let result = self.controller.pause();
                self.report(result);
            }
            HostCommand::SetContent(params) => {
                self.controller.clear_hotspots();
                self.controller.set_hotspots_visible(false);
                let ticket = self.controller.set_opacity(0.0, CONTENT_FADE_MS);
                self.swap = ContentSwap::FadingOut {
                    ticket,
                    scene: Box::new(SceneDescriptor::from_api_params(&params)),
                };
            }
            HostCommand::SetVolume(level) => match self.controller.set_volume(level) {
                Ok(()) => self.host.post(ViewerMessage::VolumeChange(level)),
                Err(err) => self.api_error(&err),
            },
            HostCommand::SetMuted(muted) => match self.controller.set_muted(muted) {
                Ok(()) => self.host.post(ViewerMessage::Muted(muted)),
                Err(err) => self.api_error(&err),
            },
            HostCommand::SetCurrentTime(seconds) => {
                match self.controller.set_current_time(seconds) {
                    Ok(()) => self.post_time(),
                    Err(err) => self.api_error(&err),
                }
            }
            HostCommand::GetPosition => {
                let position = self.controller.position();
                self.host.post(ViewerMessage::Position(position));
            }
            HostCommand::SetFullscreen => {
                if self.controller.has_video() {
                    self.chrome.request_fullscreen();
                    self.host.post(ViewerMessage::EnterFullscreen);
                } else {
                    self.api_error(&ViewerError::NoVideo("set fullscreen"));
                }
            }
            HostCommand::AddHotspot(spec) => {
                if let Err(err) = self.controller.add_hotspot(&spec) {
                    self.host.post(ViewerMessage::Error(err.to_string()));
                }
            }
            HostCommand::RemoveHotspot { id } => {
                if let Err(err) = self.controller.remove_hotspot(&id) {
                    self.host.post(ViewerMessage::Error(err.to_string()));
                }
            }
        }
        self.relay_events();
    }

    fn report(&mut self, result: Result<(), ViewerError>) {
        if let Err(err) = result {
            self.api_error(&err);
        }
    }

    fn api_error(&mut self, err: &ViewerError) {
        log::error!("{err}");
        self.host.post(ViewerMessage::Error(err.to_string()));
    }

    fn post_time(&mut self) {
        let time = self.controller.current_time().unwrap_or(0.0);
        self.host.post(ViewerMessage::TimeUpdate(time));
    }

    /// Render one frame and advance any content swap in flight.
    pub fn frame(&mut self, now_ms: f64) {
        self.controller.render(now_ms);
        self.advance_swap();
        self.relay_events();
    }

    pub fn enter_vr(&mut self) -> Result<(), ViewerError> {
        self.controller.enter_vr()
    }

    pub fn exit_vr(&mut self) {
        self.controller.exit_vr();
    }

    /// Start playback from the tap-to-play overlay.
    pub fn tap_to_play(&mut self) {
        if !self.awaiting_tap {
            return;
        }
        self.awaiting_tap = false;
        self.chrome.hide_play_button();
        let result = self.controller.play();
        self.report(result);
    }

    fn advance_swap(&mut self) {
        let swap = std::mem::replace(&mut self.swap, ContentSwap::Idle);
        let was_swapping = !matches!(swap, ContentSwap::Idle);
        self.swap = match swap {
            ContentSwap::FadingOut { ticket, scene } => {
                if self.controller.poll_opacity(ticket).is_pending() {
                    ContentSwap::FadingOut { ticket, scene }
                } else {
                    self.chrome.push_history(&scene.to_query_string());
                    match self.controller.set_scene(*scene) {
                        Ok(load) => ContentSwap::Loading { load },
                        Err(err) => {
                            log::warn!("content swap rejected: {err}");
                            ContentSwap::Idle
                        }
                    }
                }
            }
            ContentSwap::Loading { load } => match self.controller.poll_scene(&load) {
                std::task::Poll::Pending => ContentSwap::Loading { load },
                std::task::Poll::Ready(Ok(())) => ContentSwap::FadingIn {
                    ticket: self.controller.set_opacity(1.0, CONTENT_FADE_MS),
                },
                std::task::Poll::Ready(Err(err)) => {
                    log::warn!("content swap failed: {err}");
                    ContentSwap::Idle
                }
            },
            ContentSwap::FadingIn { ticket } => {
                if self.controller.poll_opacity(ticket).is_pending() {
                    ContentSwap::FadingIn { ticket }
                } else {
                    ContentSwap::Idle
                }
            }
            ContentSwap::Idle => ContentSwap::Idle,
        };
        if was_swapping && !self.is_swapping_content() {
            self.controller.set_hotspots_visible(true);
        }
    }

    fn relay_events(&mut self) {
        for event in drain(&self.events) {
            match event {
                ViewerEvent::Loaded {
                    video, duration, ..
                } => self.on_loaded(video.is_some(), duration),
                ViewerEvent::Error { message } => self.show_error(&message),
                ViewerEvent::ModeChange { presenting } => {
                    self.host.post(ViewerMessage::ModeChange(presenting));
                }
                ViewerEvent::FullscreenExited => self.host.post(ViewerMessage::ExitFullscreen),
                ViewerEvent::Metadata { .. } => self.post_time(),
                ViewerEvent::Playback(signal) => match signal {
                    MediaSignal::Play => self.host.post(ViewerMessage::Paused(false)),
                    MediaSignal::Pause => self.host.post(ViewerMessage::Paused(true)),
                    MediaSignal::TimeUpdate => self.post_time(),
                    MediaSignal::Ended => self.host.post(ViewerMessage::Ended(true)),
                    _ => {}
                },
                ViewerEvent::Hotspot(HotspotEvent::Focus(_)) => {
                    self.chrome.set_cursor(Cursor::Pointer);
                }
                ViewerEvent::Hotspot(HotspotEvent::Blur(_)) => {
                    self.chrome.set_cursor(Cursor::Default);
                }
                ViewerEvent::Hotspot(HotspotEvent::Click(id)) => {
                    self.host.post(ViewerMessage::Click(ClickInfo { id }));
                }
            }
        }
    }

    fn on_loaded(&mut self, has_video: bool, duration: Option<f64>) {
        let mobile = self.controller.profile().is_mobile();
        if has_video {
            if mobile {
                self.awaiting_tap = true;
                self.chrome.show_play_button();
            } else {
                let result = self.controller.play();
                self.report(result);
            }
        }
        self.chrome.hide_loading();
        let autopan_off = self
            .controller
            .descriptor()
            .is_some_and(|scene| scene.is_autopan_off());
        if !mobile && !has_video && !autopan_off {
            self.controller.autopan();
        }
        if !self.ready_sent {
            self.ready_sent = true;
            let duration = if has_video { duration } else { None };
            self.host.post(ViewerMessage::Ready(ReadyInfo { duration }));
        }
    }

    fn show_error(&mut self, message: &str) {
        self.chrome.hide_loading();
        let shown = sanitize_message(&format!("{RENDER_ERROR_PREFIX}{message}"));
        self.chrome.show_error(&shown);
        self.host.post(ViewerMessage::Error(message.to_string()));
    }

    /// Stop accepting host messages and release the scene.
    pub fn destroy(&mut self) {
        self.dispatcher.unregister();
        self.controller.destroy();
        self.relay_events();
    }
}

impl EventSink for ViewerSession {
    fn handle_event(&mut self, event: PlatformEvent) {
        let tap = matches!(
            &event,
            PlatformEvent::Pointer(pointer)
                if pointer.kind == PointerKind::Touch && pointer.phase == PointerPhase::Up
        );
        self.controller.handle_event(event);
        if tap {
            self.tap_to_play();
        }
        self.advance_swap();
        self.relay_events();
    }
}
