use pano_stream::{ContentParams, parse_flag};

use super::query::{SCENE_KEYS, parse_query, uri_decode, uri_encode};

const MISSING_CONTENT: &str = "Either image or video URL must be specified.";

/// Immutable description of what the viewer should show.
///
/// Construction never fails; callers check [`is_valid`](Self::is_valid) and
/// surface [`error_message`](Self::error_message) themselves. A new scene is
/// a new descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneDescriptor {
    image_url: Option<String>,
    video_url: Option<String>,
    preview_url: Option<String>,
    is_stereo: bool,
    looping: bool,
    volume: f64,
    muted: bool,
    default_yaw_radians: f32,
    debug: bool,
    is_yaw_only: bool,
    is_vr_off: bool,
    is_autopan_off: bool,
    hide_fullscreen_button: bool,
}

impl Default for SceneDescriptor {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl SceneDescriptor {
    /// Build from a page query string such as `?image=a.jpg&is_stereo=1`.
    pub fn from_query(query: &str) -> Self {
        let params = parse_query(query);
        Self::from_lookup(|key| params.get(key).map(String::as_str))
    }

    /// Build from the snake_case parameters carried by a `setimage` message.
    pub fn from_api_params(params: &ContentParams) -> Self {
        Self::from_lookup(|key| params.get(key))
    }

    pub fn builder() -> SceneDescriptorBuilder {
        SceneDescriptorBuilder::default()
    }

    fn from_lookup<'a>(lookup: impl Fn(&str) -> Option<&'a str>) -> Self {
        let text = |key: &str| lookup(key).map(str::trim).filter(|value| !value.is_empty());
        let flag = |key: &str| text(key).map(parse_flag).unwrap_or(false);
        let volume = text("volume")
            .and_then(|value| value.parse::<f64>().ok())
            .filter(|value| value.is_finite())
            .unwrap_or(1.0)
            .clamp(0.0, 1.0);
        let default_yaw_degrees = text("default_yaw")
            .and_then(|value| value.parse::<f32>().ok())
            .filter(|value| value.is_finite())
            .unwrap_or(0.0);

        Self {
            image_url: text("image").map(uri_encode),
            video_url: text("video").map(uri_encode),
            preview_url: text("preview").map(uri_encode),
            is_stereo: flag("is_stereo"),
            looping: flag("loop"),
            volume,
            muted: flag("muted"),
            default_yaw_radians: default_yaw_degrees.to_radians(),
            debug: flag("is_debug"),
            is_yaw_only: flag("is_yaw_only"),
            is_vr_off: flag("is_vr_off"),
            is_autopan_off: flag("is_autopan_off"),
            hide_fullscreen_button: flag("hide_fullscreen_button"),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.error_message().is_none()
    }

    pub fn error_message(&self) -> Option<&'static str> {
        if self.image_url.is_none() && self.video_url.is_none() {
            Some(MISSING_CONTENT)
        } else {
            None
        }
    }

    pub fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }

    pub fn video_url(&self) -> Option<&str> {
        self.video_url.as_deref()
    }

    /// Preview is only used ahead of a full image.
    pub fn preview_url(&self) -> Option<&str> {
        self.image_url.as_ref().and(self.preview_url.as_deref())
    }

    pub fn is_video(&self) -> bool {
        self.video_url.is_some()
    }

    pub fn is_stereo(&self) -> bool {
        self.is_stereo
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn muted(&self) -> bool {
        self.muted
    }

    pub fn default_yaw_radians(&self) -> f32 {
        self.default_yaw_radians
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn is_yaw_only(&self) -> bool {
        self.is_yaw_only
    }

    pub fn is_vr_off(&self) -> bool {
        self.is_vr_off
    }

    pub fn is_autopan_off(&self) -> bool {
        self.is_autopan_off
    }

    pub fn hide_fullscreen_button(&self) -> bool {
        self.hide_fullscreen_button
    }

    /// Query string reproducing this scene, for history updates.
    pub fn to_query_string(&self) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for key in SCENE_KEYS {
            let value = match key {
                "video" => self.video_url.as_deref().map(uri_decode),
                "image" => self.image_url.as_deref().map(uri_decode),
                "preview" => self.preview_url.as_deref().map(uri_decode),
                "loop" => self.looping.then(|| "true".to_string()),
                "volume" => (self.volume < 1.0).then(|| self.volume.to_string()),
                "muted" => self.muted.then(|| "true".to_string()),
                "is_stereo" => self.is_stereo.then(|| "true".to_string()),
                "is_yaw_only" => self.is_yaw_only.then(|| "true".to_string()),
                "is_debug" => self.debug.then(|| "true".to_string()),
                "is_vr_off" => self.is_vr_off.then(|| "true".to_string()),
                "is_autopan_off" => self.is_autopan_off.then(|| "true".to_string()),
                "default_yaw" => (self.default_yaw_radians != 0.0)
                    .then(|| format_degrees(self.default_yaw_radians)),
                "hide_fullscreen_button" => {
                    self.hide_fullscreen_button.then(|| "true".to_string())
                }
                _ => None,
            };
            if let Some(value) = value {
                serializer.append_pair(key, &value);
            }
        }
        serializer.finish()
    }
}

fn format_degrees(radians: f32) -> String {
    let degrees = radians.to_degrees();
    let rounded = (degrees * 1000.0).round() / 1000.0;
    rounded.to_string()
}

/// Programmatic construction for hosts that already have typed values.
#[derive(Debug, Clone, Default)]
pub struct SceneDescriptorBuilder {
    image: Option<String>,
    video: Option<String>,
    preview: Option<String>,
    is_stereo: bool,
    looping: bool,
    volume: Option<f64>,
    muted: bool,
    default_yaw_degrees: f32,
    debug: bool,
    is_yaw_only: bool,
    is_vr_off: bool,
    is_autopan_off: bool,
    hide_fullscreen_button: bool,
}

impl SceneDescriptorBuilder {
    pub fn image(mut self, url: impl Into<String>) -> Self {
        self.image = Some(url.into());
        self
    }

    pub fn video(mut self, url: impl Into<String>) -> Self {
        self.video = Some(url.into());
        self
    }

    pub fn preview(mut self, url: impl Into<String>) -> Self {
        self.preview = Some(url.into());
        self
    }

    pub fn stereo(mut self, stereo: bool) -> Self {
        self.is_stereo = stereo;
        self
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn muted(mut self, muted: bool) -> Self {
        self.muted = muted;
        self
    }

    pub fn default_yaw_degrees(mut self, degrees: f32) -> Self {
        self.default_yaw_degrees = degrees;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn yaw_only(mut self, yaw_only: bool) -> Self {
        self.is_yaw_only = yaw_only;
        self
    }

    pub fn vr_off(mut self, vr_off: bool) -> Self {
        self.is_vr_off = vr_off;
        self
    }

    pub fn autopan_off(mut self, autopan_off: bool) -> Self {
        self.is_autopan_off = autopan_off;
        self
    }

    pub fn hide_fullscreen_button(mut self, hide: bool) -> Self {
        self.hide_fullscreen_button = hide;
        self
    }

    pub fn build(self) -> SceneDescriptor {
        let encode = |url: Option<String>| {
            url.map(|url| url.trim().to_string())
                .filter(|url| !url.is_empty())
                .map(|url| uri_encode(&url))
        };
        let volume = self
            .volume
            .filter(|volume| volume.is_finite())
            .unwrap_or(1.0)
            .clamp(0.0, 1.0);
        let default_yaw = if self.default_yaw_degrees.is_finite() {
            self.default_yaw_degrees
        } else {
            0.0
        };
        SceneDescriptor {
            image_url: encode(self.image),
            video_url: encode(self.video),
            preview_url: encode(self.preview),
            is_stereo: self.is_stereo,
            looping: self.looping,
            volume,
            muted: self.muted,
            default_yaw_radians: default_yaw.to_radians(),
            debug: self.debug,
            is_yaw_only: self.is_yaw_only,
            is_vr_off: self.is_vr_off,
            is_autopan_off: self.is_autopan_off,
            hide_fullscreen_button: self.hide_fullscreen_button,
        }
    }
}
