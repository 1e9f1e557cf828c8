//! User-agent classification.
//!
//! Native HLS, fake playback, read-only volume and the simulated fullscreen
//! are platform-level behaviours that cannot be feature-detected reliably, so
//! they are keyed off the user agent string.

use once_cell::sync::Lazy;
use regex::Regex;

static IOS_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bOS (\d+)[_.]\d").expect("valid iOS version pattern"));
static MOBILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)android|webos|iphone|ipad|ipod|blackberry|iemobile|opera mini")
        .expect("valid mobile pattern")
});

pub const DESKTOP_CHROME_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformProfile {
    user_agent: String,
    safari: bool,
    ios: bool,
    ios_major: Option<u32>,
    ie11: bool,
    mobile: bool,
}

impl Default for PlatformProfile {
    fn default() -> Self {
        Self::from_user_agent(DESKTOP_CHROME_UA)
    }
}

impl PlatformProfile {
    pub fn from_user_agent(user_agent: &str) -> Self {
        let lower = user_agent.to_ascii_lowercase();
        let safari =
            lower.contains("safari") && !lower.contains("chrome") && !lower.contains("android");
        let ios = (lower.contains("ipad") || lower.contains("iphone") || lower.contains("ipod"))
            && !lower.contains("msstream");
        let ios_major = if ios {
            IOS_VERSION
                .captures(user_agent)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<u32>().ok())
        } else {
            None
        };
        let ie11 = lower.contains("trident/7.0") && lower.contains("rv:11");
        let mobile = MOBILE.is_match(user_agent);
        Self {
            user_agent: user_agent.to_string(),
            safari,
            ios,
            ios_major,
            ie11,
            mobile,
        }
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn is_safari(&self) -> bool {
        self.safari
    }

    pub fn is_ios(&self) -> bool {
        self.ios
    }

    pub fn is_mobile(&self) -> bool {
        self.mobile
    }

    pub fn has_native_hls(&self) -> bool {
        self.safari
    }

    /// iOS 9 and earlier cannot play inline video without taking over the
    /// screen, so playback is driven manually from an audio element.
    pub fn uses_fake_playback(&self) -> bool {
        matches!(self.ios_major, Some(major) if major <= 9)
    }

    pub fn volume_is_read_only(&self) -> bool {
        self.ios
    }

    pub fn supports_video_textures(&self) -> bool {
        !self.ie11
    }

    pub fn needs_hls_texture_workaround(&self) -> bool {
        self.safari
    }

    pub fn swizzles_bgra(&self) -> bool {
        self.ios
    }

    /// iOS presents VR through a fake fullscreen that never fires its own
    /// fullscreen-change event.
    pub fn uses_simulated_fullscreen(&self) -> bool {
        self.ios
    }
}
