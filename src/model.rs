use serde::{Deserialize, Serialize};

/// What one display ("user") is assigned to show.
///
/// `queue` is the single stored media representation. Older writers only knew a
/// single `videoUrl`; those writes arrive as a one-entry queue (see
/// [`DisplayAssignment::from_wire`]) and readers still get `videoUrl` back as the
/// first queue entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DisplayAssignment {
    pub name: String,
    pub queue: Vec<String>,
    pub message: Option<String>,
}

/// JSON shape of an assignment as stored and served.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentWire {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default)]
    pub queue: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl DisplayAssignment {
    /// Fold the legacy single field into the queue. A non-empty queue wins.
    pub fn from_wire(w: AssignmentWire) -> Self {
        let queue = clean_entries(w.queue);
        let queue = if !queue.is_empty() {
            queue
        } else {
            non_empty(w.video_url).into_iter().collect()
        };
        Self {
            name: w.name,
            queue,
            message: non_empty(w.message),
        }
    }

    pub fn to_wire(&self) -> AssignmentWire {
        AssignmentWire {
            name: self.name.clone(),
            video_url: self.video_url().map(str::to_string),
            queue: self.queue.clone(),
            message: self.message.clone(),
        }
    }

    /// Legacy single-video view: the head of the queue.
    pub fn video_url(&self) -> Option<&str> {
        self.queue.first().map(String::as_str)
    }

    /// Menu label: the configured name, or the display id when the name is blank.
    pub fn label<'a>(&'a self, id: &'a str) -> &'a str {
        if self.name.trim().is_empty() {
            id
        } else {
            &self.name
        }
    }
}

/// One row of the display list.
#[derive(Debug, Clone, Serialize)]
pub struct DisplayEntry {
    pub id: String,
    #[serde(flatten)]
    pub assignment: AssignmentWire,
}

pub(crate) fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

pub(crate) fn clean_entries(entries: Vec<String>) -> Vec<String> {
    entries
        .into_iter()
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .collect()
}
