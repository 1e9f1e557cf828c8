use std::sync::mpsc::Receiver;

use thiserror::Error;
use url::Url;

use crate::events::EventBus;
use crate::platform::PlatformProfile;
use crate::ports::{AdaptiveConfig, MediaElementId, MediaKind, MediaPort, MediaSignal};
use crate::scene::SceneDescriptor;

/// Initial bandwidth assumption handed to the adaptive client.
pub const DEFAULT_BITS_PER_SECOND: u64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaConfig {
    pub looping: bool,
    pub volume: f64,
    pub muted: bool,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            looping: false,
            volume: 1.0,
            muted: false,
        }
    }
}

impl From<&SceneDescriptor> for MediaConfig {
    fn from(scene: &SceneDescriptor) -> Self {
        Self {
            looping: scene.looping(),
            volume: scene.volume(),
            muted: scene.muted(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFormat {
    Regular,
    Hls,
    Dash,
}

impl MediaFormat {
    /// Classify by the extension of the URL path; query and fragment are
    /// ignored.
    pub fn from_url(url: &str) -> Self {
        let path = match Url::parse(url) {
            Ok(parsed) => parsed.path().to_string(),
            Err(_) => Url::parse("http://relative.invalid/")
                .and_then(|base| base.join(url))
                .map(|joined| joined.path().to_string())
                .unwrap_or_else(|_| url.split(['?', '#']).next().unwrap_or(url).to_string()),
        };
        let extension = path
            .rsplit('/')
            .next()
            .and_then(|file| file.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());
        match extension.as_deref() {
            Some("m3u8") => MediaFormat::Hls,
            Some("mpd") => MediaFormat::Dash,
            _ => MediaFormat::Regular,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MediaFormat::Regular => "video",
            MediaFormat::Hls => "hls",
            MediaFormat::Dash => "dash",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MediaError {
    #[error("HLS is only supported on Safari.")]
    HlsUnsupported,
    #[error("DASH playback is not supported on this browser.")]
    DashUnsupported,
    #[error("unable to load {url}: {reason}")]
    Network { url: String, reason: String },
    #[error("{0}")]
    Player(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    Load {
        element: MediaElementId,
        format: MediaFormat,
    },
    Metadata {
        duration: Option<f64>,
    },
    Error(MediaError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadState {
    Idle,
    Pending,
    Settled,
}

/// Resolves a media URL to a ready video element.
///
/// The loader owns one element for its whole life. `load` picks direct
/// playback, native HLS or the adaptive client from the URL extension and the
/// platform; readiness arrives later through [`handle_signal`](Self::handle_signal).
/// Exactly one `Load` or `Error` is emitted per `load`.
#[derive(Debug)]
pub struct MediaLoader {
    element: MediaElementId,
    url: Option<String>,
    format: Option<MediaFormat>,
    state: LoadState,
    adaptive_attached: bool,
    events: EventBus<MediaEvent>,
}

impl MediaLoader {
    pub fn new(media: &mut dyn MediaPort, config: &MediaConfig) -> Self {
        let element = media.create_element(MediaKind::Video);
        if config.looping {
            media.set_attribute(element, "loop", "true");
        }
        media.set_volume(element, config.volume.clamp(0.0, 1.0));
        if config.muted {
            media.set_muted(element, true);
        }
        media.set_attribute(element, "preload", "auto");
        media.set_attribute(element, "playsinline", "true");
        media.set_attribute(element, "crossorigin", "anonymous");
        Self {
            element,
            url: None,
            format: None,
            state: LoadState::Idle,
            adaptive_attached: false,
            events: EventBus::new(),
        }
    }

    pub fn element(&self) -> MediaElementId {
        self.element
    }

    pub fn format(&self) -> Option<MediaFormat> {
        self.format
    }

    pub fn is_pending(&self) -> bool {
        self.state == LoadState::Pending
    }

    pub fn subscribe(&mut self) -> Receiver<MediaEvent> {
        self.events.subscribe()
    }

    pub fn load(&mut self, media: &mut dyn MediaPort, profile: &PlatformProfile, url: &str) {
        let format = MediaFormat::from_url(url);
        self.url = Some(url.to_string());
        self.format = Some(format);
        self.state = LoadState::Pending;
        log::debug!("loading {} as {}", url, format.label());

        match format {
            MediaFormat::Hls => {
                if profile.has_native_hls() {
                    self.load_direct(media, url);
                } else {
                    self.fail(MediaError::HlsUnsupported);
                }
            }
            MediaFormat::Dash => self.load_adaptive(media, url),
            MediaFormat::Regular => self.load_direct(media, url),
        }
    }

    fn load_direct(&mut self, media: &mut dyn MediaPort, url: &str) {
        media.set_src(self.element, url);
        media.load(self.element);
    }

    fn load_adaptive(&mut self, media: &mut dyn MediaPort, url: &str) {
        let Some(client) = media.adaptive_client() else {
            self.fail(MediaError::DashUnsupported);
            return;
        };
        client.install_polyfills();
        if !client.is_browser_supported() {
            self.fail(MediaError::DashUnsupported);
            return;
        }
        client.attach(self.element);
        client.configure(&AdaptiveConfig {
            default_bandwidth_estimate: DEFAULT_BITS_PER_SECOND,
        });
        client.load(url);
        self.adaptive_attached = true;
    }

    /// Feed an element signal. Returns `false` when the signal belongs to a
    /// different element.
    pub fn handle_signal(
        &mut self,
        media: &dyn MediaPort,
        element: MediaElementId,
        signal: &MediaSignal,
    ) -> bool {
        if element != self.element {
            return false;
        }
        match signal {
            MediaSignal::LoadedMetadata => {
                self.events.emit(MediaEvent::Metadata {
                    duration: media.duration(self.element),
                });
            }
            MediaSignal::CanPlayThrough if !self.adaptive_attached => self.succeed(),
            MediaSignal::ManifestLoaded if self.adaptive_attached => self.succeed(),
            MediaSignal::Error(reason) => {
                let url = self.url.clone().unwrap_or_default();
                self.fail(MediaError::Network {
                    url,
                    reason: reason.clone(),
                });
            }
            MediaSignal::PlayerError(reason) => self.fail(MediaError::Player(reason.clone())),
            _ => {}
        }
        true
    }

    fn succeed(&mut self) {
        if self.state != LoadState::Pending {
            return;
        }
        self.state = LoadState::Settled;
        if let Some(format) = self.format {
            self.events.emit(MediaEvent::Load {
                element: self.element,
                format,
            });
        }
    }

    fn fail(&mut self, error: MediaError) {
        if self.state != LoadState::Pending {
            log::debug!("ignoring media error after settlement: {error}");
            return;
        }
        log::error!("{error}");
        self.state = LoadState::Settled;
        self.events.emit(MediaEvent::Error(error));
    }

    /// Stop playback and release the element.
    pub fn destroy(self, media: &mut dyn MediaPort) {
        media.pause(self.element);
        if self.adaptive_attached {
            if let Some(client) = media.adaptive_client() {
                client.detach();
            }
        }
        media.set_src(self.element, "");
        media.release(self.element);
    }
}
