// Admin form rules: validation and the read-before-write merges the admin pages
// rely on. Everything here is synchronous and side-effect free; the handlers in
// `api` do the store round trips.

use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::model::{clean_entries, non_empty, DisplayAssignment};

/// Create/update form of the display management page: the assignment JSON shape.
pub use crate::model::AssignmentWire as AssignmentForm;

/// Body of `POST /api/update-video` (single-assignment admin form and the
/// queue editor page).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVideoReq {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub queue: Option<Vec<String>>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Id for a newly created display: the name lower-cased with everything but
/// `[a-z0-9_-]` removed, or `user<millis>` when nothing is left. Ids double as
/// upload path segments under the media root.
pub fn display_id_from_name(name: &str, unix_millis: i128) -> String {
    let id: String = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if id.is_empty() {
        format!("user{unix_millis}")
    } else {
        id
    }
}

pub fn validate_create(form: AssignmentForm) -> ApiResult<DisplayAssignment> {
    let mut a = DisplayAssignment::from_wire(form);
    a.name = a.name.trim().to_string();
    if a.name.is_empty() {
        return Err(ApiError::validation("Name is required"));
    }
    if a.queue.is_empty() {
        return Err(ApiError::validation(
            "Provide a video URL or at least one queue entry",
        ));
    }
    Ok(a)
}

/// Full replacement for an existing display. A blank name keeps the stored one.
pub fn validate_update(
    id: &str,
    form: AssignmentForm,
    existing: Option<&DisplayAssignment>,
) -> ApiResult<DisplayAssignment> {
    let mut a = DisplayAssignment::from_wire(form);
    if a.queue.is_empty() {
        return Err(ApiError::validation(
            "Provide a video URL or at least one queue entry",
        ));
    }
    a.name = match a.name.trim() {
        "" => preserved_name(id, existing),
        n => n.to_string(),
    };
    Ok(a)
}

fn preserved_name(id: &str, existing: Option<&DisplayAssignment>) -> String {
    existing
        .map(|a| a.name.trim())
        .filter(|n| !n.is_empty())
        .unwrap_or(id)
        .to_string()
}

/// Build the replacement written by the update endpoint.
///
/// A non-empty queue beats `videoUrl`; with neither, the stored queue is kept so a
/// message-only update does not blank the screen.
pub fn apply_update_video(
    req: UpdateVideoReq,
    existing: Option<&DisplayAssignment>,
) -> ApiResult<(String, DisplayAssignment)> {
    let user_id = req.user_id.trim().to_string();
    if user_id.is_empty() {
        return Err(ApiError::validation("No userId provided"));
    }

    let queue = clean_entries(req.queue.unwrap_or_default());
    let video_url = non_empty(req.video_url);
    let message = non_empty(req.message);
    if queue.is_empty() && video_url.is_none() && message.is_none() {
        return Err(ApiError::validation(
            "Please provide a video URL, a queue, or a message to send",
        ));
    }

    let queue = if !queue.is_empty() {
        queue
    } else if let Some(url) = video_url {
        vec![url]
    } else {
        existing.map(|a| a.queue.clone()).unwrap_or_default()
    };
    if queue.is_empty() {
        return Err(ApiError::validation("No videoUrl provided"));
    }

    let name = preserved_name(&user_id, existing);
    Ok((user_id, DisplayAssignment { name, queue, message }))
}

/// Point a display at a freshly uploaded asset.
pub fn apply_upload(
    id: &str,
    public_url: String,
    message: Option<String>,
    existing: Option<&DisplayAssignment>,
) -> DisplayAssignment {
    DisplayAssignment {
        name: preserved_name(id, existing),
        queue: vec![public_url],
        message: non_empty(message).or_else(|| existing.and_then(|a| a.message.clone())),
    }
}

// --- Queue editing ----------------------------------------------------------

pub fn queue_add(queue: &mut Vec<String>, url: &str) -> ApiResult<()> {
    let url = url.trim();
    if url.is_empty() {
        return Err(ApiError::validation("Queue entry must not be empty"));
    }
    queue.push(url.to_string());
    Ok(())
}

pub fn queue_remove(queue: &mut Vec<String>, index: usize) -> ApiResult<String> {
    if index >= queue.len() {
        return Err(ApiError::validation(format!("No queue entry at index {index}")));
    }
    if queue.len() == 1 {
        return Err(ApiError::validation(
            "Please keep at least one video in the queue",
        ));
    }
    Ok(queue.remove(index))
}

pub fn queue_move(queue: &mut Vec<String>, from: usize, to: usize) -> ApiResult<()> {
    if from >= queue.len() || to >= queue.len() {
        return Err(ApiError::validation("Queue index out of range"));
    }
    if from != to {
        let item = queue.remove(from);
        queue.insert(to, item);
    }
    Ok(())
}
