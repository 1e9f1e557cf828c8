use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::Parser;
use pano_viewer::SceneDescriptor;
use pano_viewer::platform::DESKTOP_CHROME_UA;
use serde::Deserialize;
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(about = "Drive the panorama viewer core against the headless platform", version)]
pub struct Args {
    /// Scene as a page query string, e.g. "video=clip.mp4&is_stereo=1"
    #[arg(long, conflicts_with_all = ["image", "video", "preview"])]
    pub query: Option<String>,

    /// Equirectangular image URL
    #[arg(long)]
    pub image: Option<String>,

    /// Video URL (.mp4, .m3u8 or .mpd)
    #[arg(long)]
    pub video: Option<String>,

    /// Low-resolution image shown while the full image loads
    #[arg(long)]
    pub preview: Option<String>,

    /// Content is top/bottom stereo
    #[arg(long)]
    pub stereo: bool,

    #[arg(long = "loop")]
    pub looping: bool,

    /// Initial video volume between 0 and 1
    #[arg(long)]
    pub volume: Option<f64>,

    #[arg(long)]
    pub muted: bool,

    /// Initial camera yaw in degrees
    #[arg(long)]
    pub default_yaw: Option<f32>,

    /// Log the loaded scene and unknown host messages
    #[arg(long)]
    pub debug: bool,

    /// User agent used to build the platform profile
    #[arg(long, default_value = DESKTOP_CHROME_UA)]
    pub user_agent: String,

    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    #[arg(long, default_value_t = 720)]
    pub height: u32,

    /// Number of frames to simulate
    #[arg(long, default_value_t = 120)]
    pub frames: u32,

    /// Simulated frame interval in milliseconds
    #[arg(long, default_value_t = 16.0)]
    pub frame_ms: f64,

    /// Attach a WebVR display and enter VR once the scene has loaded
    #[arg(long)]
    pub vr: bool,

    /// Make any URL containing this pattern fail to load (repeatable)
    #[arg(long)]
    pub fail_url: Vec<String>,

    /// JSON lines of `{"frame": n, "message": {...}}` host messages
    #[arg(long)]
    pub messages: Option<PathBuf>,

    /// When set, write a JSON transcript of host messages and chrome calls
    #[arg(long)]
    pub transcript: Option<PathBuf>,
}

impl Args {
    pub fn scene(&self) -> SceneDescriptor {
        if let Some(query) = &self.query {
            return SceneDescriptor::from_query(query);
        }
        let mut builder = SceneDescriptor::builder()
            .stereo(self.stereo)
            .looping(self.looping)
            .muted(self.muted)
            .debug(self.debug);
        if let Some(image) = &self.image {
            builder = builder.image(image.clone());
        }
        if let Some(video) = &self.video {
            builder = builder.video(video.clone());
        }
        if let Some(preview) = &self.preview {
            builder = builder.preview(preview.clone());
        }
        if let Some(volume) = self.volume {
            builder = builder.volume(volume);
        }
        if let Some(yaw) = self.default_yaw {
            builder = builder.default_yaw_degrees(yaw);
        }
        builder.build()
    }
}

/// One host message delivered before the given frame renders.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptedMessage {
    pub frame: u32,
    pub message: Value,
}

pub fn load_messages(path: &Path) -> Result<Vec<ScriptedMessage>> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading message script {}", path.display()))?;
    let mut messages = Vec::new();
    for (index, line) in data.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let message: ScriptedMessage = serde_json::from_str(line).with_context(|| {
            format!("parsing message script {} line {}", path.display(), index + 1)
        })?;
        messages.push(message);
    }
    messages.sort_by_key(|message| message.frame);
    Ok(messages)
}
