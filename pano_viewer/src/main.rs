mod cli;

use std::fs;

use anyhow::{Context, Result};
use clap::Parser;
use pano_stream::ViewerMessage;
use pano_viewer::headless::{ChromeCall, HeadlessPlatform};
use pano_viewer::viewer::display::DisplayApi;
use pano_viewer::{PlatformProfile, SceneState, ViewerSession, ViewportController};
use serde::Serialize;

use cli::{Args, load_messages};

#[derive(Debug, Serialize)]
struct Transcript {
    state: &'static str,
    generation: u64,
    frames: u64,
    submitted_frames: u64,
    texture_requests: Vec<String>,
    host_messages: Vec<ViewerMessage>,
    chrome_calls: Vec<ChromeCall>,
}

fn state_label(state: SceneState) -> &'static str {
    match state {
        SceneState::Idle => "idle",
        SceneState::Loading => "loading",
        SceneState::Loaded => "loaded",
        SceneState::Failed => "failed",
        SceneState::Disposed => "disposed",
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::init();

    let script = match &args.messages {
        Some(path) => load_messages(path)?,
        None => Vec::new(),
    };

    let platform = HeadlessPlatform::new();
    for pattern in &args.fail_url {
        platform.fail_url(pattern.clone());
    }
    let profile = PlatformProfile::from_user_agent(&args.user_agent);
    let mut controller =
        ViewportController::new(platform.ports(), profile, args.width, args.height);
    if args.vr {
        controller.attach_display(DisplayApi::WebVr, platform.vr_device("Headless HMD"));
    }

    let scene = args.scene();
    let mut session = ViewerSession::new(
        controller,
        platform.chrome(),
        platform.host(),
        scene.is_debug(),
    );
    if let Err(err) = session.start(scene) {
        log::warn!("initial scene rejected: {err}");
    }
    platform.pump(&mut session);

    let mut vr_requested = false;
    let mut pending = script.iter().peekable();
    for frame in 0..args.frames {
        while let Some(scripted) = pending.next_if(|scripted| scripted.frame <= frame) {
            session.receive_json(&scripted.message.to_string());
        }
        if args.vr && !vr_requested && session.controller().state() == SceneState::Loaded {
            vr_requested = true;
            if let Err(err) = session.enter_vr() {
                log::warn!("unable to enter VR: {err}");
            }
        }
        platform.pump(&mut session);
        session.frame(f64::from(frame) * args.frame_ms);
        platform.pump(&mut session);
    }

    let controller = session.controller();
    let transcript = Transcript {
        state: state_label(controller.state()),
        generation: controller.generation(),
        frames: controller.frames(),
        submitted_frames: controller.submitted_frames(),
        texture_requests: platform
            .texture_requests()
            .into_iter()
            .map(|(_, url)| url)
            .collect(),
        host_messages: platform.host_messages(),
        chrome_calls: platform.chrome_calls(),
    };

    if let Some(path) = &args.transcript {
        let json =
            serde_json::to_string_pretty(&transcript).context("serializing transcript")?;
        fs::write(path, json)
            .with_context(|| format!("writing transcript to {}", path.display()))?;
        println!("Transcript written to {}", path.display());
    }

    println!(
        "{} after {} frames ({} submitted), {} host messages",
        transcript.state,
        transcript.frames,
        transcript.submitted_frames,
        transcript.host_messages.len()
    );
    for message in &transcript.host_messages {
        println!("  -> {}", message.kind());
    }
    Ok(())
}
