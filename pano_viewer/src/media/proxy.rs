use super::loader::MediaConfig;
use crate::platform::PlatformProfile;
use crate::ports::{MediaElementId, MediaKind, MediaPort};

/// Below this level a read-only-volume platform treats the video as muted.
pub const MUTE_THRESHOLD: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq)]
struct FakeClock {
    /// Frame time at which playhead zero would have started.
    origin_ms: f64,
}

/// Uniform play/pause/seek/volume over a video element.
///
/// On platforms that cannot play inline video the proxy runs "fake playback":
/// an audio element plays the same source while [`update`](Self::update)
/// advances the video playhead from the frame clock. Every other platform
/// forwards straight to the element. Repeating a call with the same argument
/// has no further effect.
#[derive(Debug)]
pub struct PlaybackProxy {
    video: MediaElementId,
    audio: Option<MediaElementId>,
    fake_playback: bool,
    read_only_volume: bool,
    clock: Option<FakeClock>,
    paused_at_s: f64,
    playing: bool,
    volume: f64,
    muted: bool,
}

impl PlaybackProxy {
    /// `config` is the policy the element was configured with; the audio
    /// companion starts from the same volume and mute state.
    pub fn new(video: MediaElementId, config: &MediaConfig, profile: &PlatformProfile) -> Self {
        Self {
            video,
            audio: None,
            fake_playback: profile.uses_fake_playback(),
            read_only_volume: profile.volume_is_read_only(),
            clock: None,
            paused_at_s: 0.0,
            playing: false,
            volume: config.volume.clamp(0.0, 1.0),
            muted: config.muted,
        }
    }

    pub fn video(&self) -> MediaElementId {
        self.video
    }

    pub fn audio(&self) -> Option<MediaElementId> {
        self.audio
    }

    pub fn is_fake_playback(&self) -> bool {
        self.fake_playback
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn play(&mut self, media: &mut dyn MediaPort, now_ms: f64) {
        if self.playing {
            return;
        }
        self.playing = true;
        if !self.fake_playback {
            media.play(self.video);
            return;
        }
        let audio = match self.audio {
            Some(audio) => audio,
            None => {
                let audio = media.create_element(MediaKind::Audio);
                if let Some(src) = media.src(self.video) {
                    media.set_src(audio, &src);
                }
                media.set_volume(audio, self.volume);
                media.set_muted(audio, self.muted);
                self.audio = Some(audio);
                audio
            }
        };
        self.clock = Some(FakeClock {
            origin_ms: now_ms - self.paused_at_s * 1000.0,
        });
        media.set_current_time(audio, self.paused_at_s);
        media.play(audio);
    }

    pub fn pause(&mut self, media: &mut dyn MediaPort, now_ms: f64) {
        if !self.playing {
            return;
        }
        self.playing = false;
        if !self.fake_playback {
            media.pause(self.video);
            return;
        }
        if let Some(clock) = self.clock.take() {
            self.paused_at_s = ((now_ms - clock.origin_ms) / 1000.0).max(0.0);
        }
        if let Some(audio) = self.audio {
            media.pause(audio);
        }
    }

    pub fn set_volume(&mut self, media: &mut dyn MediaPort, level: f64) {
        let level = level.clamp(0.0, 1.0);
        self.volume = level;
        if self.read_only_volume {
            media.set_muted(self.video, self.muted || level < MUTE_THRESHOLD);
        } else {
            media.set_volume(self.video, level);
        }
        if let Some(audio) = self.audio {
            media.set_volume(audio, level);
        }
    }

    pub fn mute(&mut self, media: &mut dyn MediaPort, muted: bool) {
        self.muted = muted;
        media.set_muted(self.video, muted);
        if let Some(audio) = self.audio {
            media.set_muted(audio, muted);
        }
    }

    pub fn current_time(&self, media: &dyn MediaPort) -> f64 {
        media.current_time(self.video)
    }

    pub fn set_current_time(&mut self, media: &mut dyn MediaPort, now_ms: f64, seconds: f64) {
        let seconds = seconds.max(0.0);
        media.set_current_time(self.video, seconds);
        if let Some(audio) = self.audio {
            media.set_current_time(audio, seconds);
        }
        if self.fake_playback {
            match self.clock.as_mut() {
                Some(clock) => clock.origin_ms = now_ms - seconds * 1000.0,
                None => self.paused_at_s = seconds,
            }
        }
    }

    /// Advance the fake playhead. A no-op unless fake playback is running.
    pub fn update(&mut self, media: &mut dyn MediaPort, now_ms: f64) {
        let Some(clock) = self.clock.as_mut() else {
            return;
        };
        let elapsed_s = ((now_ms - clock.origin_ms) / 1000.0).max(0.0);
        let duration = media.duration(self.video).filter(|d| d.is_finite() && *d > 0.0);
        match duration {
            Some(duration) if elapsed_s > duration => {
                clock.origin_ms = now_ms;
                media.set_current_time(self.video, 0.0);
                if let Some(audio) = self.audio {
                    media.set_current_time(audio, 0.0);
                }
            }
            _ => media.set_current_time(self.video, elapsed_s),
        }
    }

    /// Stop playback and release the audio companion, if any.
    pub fn detach(mut self, media: &mut dyn MediaPort, now_ms: f64) {
        self.pause(media, now_ms);
        if let Some(audio) = self.audio.take() {
            media.set_src(audio, "");
            media.release(audio);
        }
    }
}
