// Queue controller: playlist derivation and the position state machine.
//
// All state changes go through `PlaybackState::apply`, so a session (or a test)
// can drive the controller with plain events and never needs a UI around it.

use serde::Serialize;

use crate::model::DisplayAssignment;
use crate::normalize::{normalize, VideoId};

/// Result of deriving a playlist from an assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DerivedPlaylist {
    pub playlist: Vec<VideoId>,
    /// Raw entries that did not normalize, in queue order.
    pub dropped: Vec<String>,
}

/// Normalize every queue entry, keeping order and dropping unrecognized ones.
pub fn derive_playlist(assignment: &DisplayAssignment) -> DerivedPlaylist {
    let mut out = DerivedPlaylist::default();
    for raw in &assignment.queue {
        match normalize(raw) {
            Some(id) => out.playlist.push(id),
            None => out.dropped.push(raw.clone()),
        }
    }
    out
}

#[derive(Debug, Clone, Copy)]
pub enum PlaybackEvent<'a> {
    /// The display's assignment was written, deleted (`None`), or first loaded.
    AssignmentChanged(Option<&'a DisplayAssignment>),
    /// The widget reported end-of-item.
    ItemEnded,
    /// Explicit skip-to-next from the keyboard.
    Skip,
    /// First click or keypress seen by the page.
    UserInteracted,
}

/// Per-session playback position. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackState {
    playlist: Vec<VideoId>,
    current_index: usize,
    has_interacted: bool,
}

impl PlaybackState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_assignment(assignment: Option<&DisplayAssignment>) -> Self {
        let mut s = Self::new();
        s.apply(PlaybackEvent::AssignmentChanged(assignment));
        s
    }

    pub fn apply(&mut self, event: PlaybackEvent<'_>) {
        match event {
            PlaybackEvent::AssignmentChanged(assignment) => {
                self.playlist = assignment
                    .map(|a| derive_playlist(a).playlist)
                    .unwrap_or_default();
                self.current_index = 0;
            }
            PlaybackEvent::ItemEnded | PlaybackEvent::Skip => self.advance(),
            PlaybackEvent::UserInteracted => self.has_interacted = true,
        }
    }

    /// Step to the next item, wrapping at the end. No-op on an empty playlist.
    pub fn advance(&mut self) {
        if self.playlist.is_empty() {
            return;
        }
        if self.current_index >= self.playlist.len() {
            self.current_index = 0;
        }
        self.current_index = (self.current_index + 1) % self.playlist.len();
    }

    pub fn current(&self) -> Option<&VideoId> {
        self.playlist.get(self.current_index)
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn playlist(&self) -> &[VideoId] {
        &self.playlist
    }

    pub fn has_interacted(&self) -> bool {
        self.has_interacted
    }
}
