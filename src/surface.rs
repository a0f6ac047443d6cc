// Playback surface: turns queue position and input into commands for the
// embedded video widget running in the browser.
//
// Browsers only allow muted autoplay, so the surface starts muted and unmutes for
// good on the first click/keypress (or when the widget reports that unmuting is
// allowed right away). Once sound is on, every command is preceded by `Unmute`
// because the widget can fall back to muted on reloads.

use serde::Serialize;

use crate::normalize::VideoId;
use crate::playlist::{PlaybackEvent, PlaybackState};

pub const SEEK_STEP_SECS: f64 = 10.0;

/// Instruction for the browser-side widget.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WidgetCommand {
    #[serde(rename_all = "camelCase")]
    Load { video_id: VideoId },
    /// Nothing playable: show the static "Video not available." card.
    Placeholder,
    Play,
    Pause,
    SeekBy { seconds: f64 },
    Unmute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackKey {
    TogglePlay,
    SeekBack,
    SeekForward,
    Skip,
}

impl PlaybackKey {
    /// Map a DOM `KeyboardEvent.key` value.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "Enter" | " " | "MediaPlayPause" => Some(Self::TogglePlay),
            "ArrowLeft" => Some(Self::SeekBack),
            "ArrowRight" => Some(Self::SeekForward),
            "n" | "N" | "MediaTrackNext" => Some(Self::Skip),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SurfaceEvent {
    WidgetReady { can_unmute: bool },
    WidgetState { playing: bool },
    ItemEnded,
    Interaction,
    Key(PlaybackKey),
}

#[derive(Debug, Default)]
pub struct Surface {
    sound_enabled: bool,
    playing: bool,
    bound: Option<VideoId>,
}

impl Surface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sound_enabled(&self) -> bool {
        self.sound_enabled
    }

    /// Bind the controller's current item to the widget.
    ///
    /// With `force == false` an unchanged id is left playing; `force` reloads it,
    /// which is what restarts a single-item playlist after it ends.
    pub fn bind(&mut self, playback: &PlaybackState, force: bool) -> Vec<WidgetCommand> {
        let Some(current) = playback.current() else {
            let was_bound = self.bound.take().is_some();
            self.playing = false;
            return if was_bound || force {
                vec![WidgetCommand::Placeholder]
            } else {
                Vec::new()
            };
        };

        if !force && self.bound.as_ref() == Some(current) {
            return Vec::new();
        }

        // The widget autoplays whatever it loads.
        self.bound = Some(current.clone());
        self.playing = true;
        let mut out = vec![WidgetCommand::Load { video_id: current.clone() }];
        if self.sound_enabled {
            out.push(WidgetCommand::Unmute);
        }
        out
    }

    /// First render of a session: always emits either `Load` or `Placeholder`.
    pub fn initial(&mut self, playback: &PlaybackState) -> Vec<WidgetCommand> {
        self.bound = None;
        self.bind(playback, true)
    }

    pub fn handle(&mut self, playback: &mut PlaybackState, event: SurfaceEvent) -> Vec<WidgetCommand> {
        match event {
            SurfaceEvent::WidgetReady { can_unmute } => {
                if self.bound.is_none() {
                    return Vec::new();
                }
                if can_unmute {
                    self.sound_enabled = true;
                }
                let mut out = Vec::new();
                if self.sound_enabled {
                    out.push(WidgetCommand::Unmute);
                }
                out.push(WidgetCommand::Play);
                self.playing = true;
                out
            }
            SurfaceEvent::WidgetState { playing } => {
                self.playing = playing;
                Vec::new()
            }
            SurfaceEvent::ItemEnded => {
                playback.apply(PlaybackEvent::ItemEnded);
                self.bind(playback, true)
            }
            SurfaceEvent::Interaction => {
                playback.apply(PlaybackEvent::UserInteracted);
                if self.sound_enabled {
                    return Vec::new();
                }
                self.sound_enabled = true;
                if self.bound.is_some() {
                    vec![WidgetCommand::Unmute]
                } else {
                    Vec::new()
                }
            }
            SurfaceEvent::Key(key) => self.key(playback, key),
        }
    }

    fn key(&mut self, playback: &mut PlaybackState, key: PlaybackKey) -> Vec<WidgetCommand> {
        if self.bound.is_none() {
            return Vec::new();
        }

        let cmd = match key {
            PlaybackKey::TogglePlay => {
                self.playing = !self.playing;
                if self.playing {
                    WidgetCommand::Play
                } else {
                    WidgetCommand::Pause
                }
            }
            PlaybackKey::SeekBack => WidgetCommand::SeekBy { seconds: -SEEK_STEP_SECS },
            PlaybackKey::SeekForward => WidgetCommand::SeekBy { seconds: SEEK_STEP_SECS },
            PlaybackKey::Skip => {
                playback.apply(PlaybackEvent::Skip);
                return self.bind(playback, true);
            }
        };

        let mut out = Vec::with_capacity(2);
        if self.sound_enabled {
            out.push(WidgetCommand::Unmute);
        }
        out.push(cmd);
        out
    }
}
