// HTTP surface: admin CRUD + queue editing, the two legacy form endpoints,
// uploads, and the player websocket. Handlers stay thin; rules live in `admin`.

use std::path::Path;

use axum::{
    extract::{ws::WebSocketUpgrade, DefaultBodyLimit, Multipart, Path as UrlPath, Query, State},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use time::OffsetDateTime;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::info;

use crate::admin::{self, AssignmentForm, UpdateVideoReq};
use crate::error::{ApiError, ApiResult};
use crate::media::{self, MediaStore};
use crate::model::{DisplayAssignment, DisplayEntry};
use crate::playlist::{derive_playlist, DerivedPlaylist};
use crate::session;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub store: Store,
    pub media: MediaStore,
    pub default_display: String,
}

pub fn build_router(state: AppState, ui_dir: Option<&Path>, max_upload_bytes: usize) -> Router {
    let media_root = state.media.root().to_path_buf();

    let mut app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/v1/ping", get(ping))
        .route("/api/v1/displays", get(api_display_list).post(api_display_create))
        .route(
            "/api/v1/displays/:id",
            get(api_display_get)
                .put(api_display_update)
                .delete(api_display_delete),
        )
        .route("/api/v1/displays/:id/playlist", get(api_display_playlist))
        .route("/api/v1/displays/:id/queue/add", post(api_queue_add))
        .route("/api/v1/displays/:id/queue/remove", post(api_queue_remove))
        .route("/api/v1/displays/:id/queue/move", post(api_queue_move))
        .route("/api/update-video", post(api_update_video))
        .route(
            "/api/upload",
            post(api_upload).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/api/v1/player/ws", get(api_player_ws))
        .nest_service("/media", ServeDir::new(media_root));

    // Player and admin pages, when the engine serves them itself.
    if let Some(dir) = ui_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

async fn ping(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "ok": true,
        "version": state.version,
        "features": ["displays", "queue", "upload", "player"]
    }))
}

fn unix_millis() -> i128 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000
}

fn entry(id: &str, a: &DisplayAssignment) -> DisplayEntry {
    DisplayEntry {
        id: id.to_string(),
        assignment: a.to_wire(),
    }
}

async fn existing(state: &AppState, id: &str) -> ApiResult<DisplayAssignment> {
    state
        .store
        .get(id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("No data found for display {id}")))
}

// --- Display CRUD -----------------------------------------------------------------

async fn api_display_list(State(state): State<AppState>) -> Json<serde_json::Value> {
    let displays: Vec<DisplayEntry> = state
        .store
        .list()
        .await
        .iter()
        .map(|(id, a)| entry(id, a))
        .collect();
    Json(json!({ "displays": displays }))
}

async fn api_display_get(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> ApiResult<Json<DisplayEntry>> {
    let a = existing(&state, &id).await?;
    Ok(Json(entry(&id, &a)))
}

async fn api_display_create(
    State(state): State<AppState>,
    Json(form): Json<AssignmentForm>,
) -> ApiResult<Json<serde_json::Value>> {
    let a = admin::validate_create(form)?;
    let id = admin::display_id_from_name(&a.name, unix_millis());
    state.store.put(&id, a).await?;
    info!("display {id} created");
    Ok(Json(json!({ "ok": true, "id": id })))
}

async fn api_display_update(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
    Json(form): Json<AssignmentForm>,
) -> ApiResult<Json<serde_json::Value>> {
    let current = existing(&state, &id).await?;
    let a = admin::validate_update(&id, form, Some(&current))?;
    state.store.put(&id, a).await?;
    info!("display {id} updated");
    Ok(Json(json!({ "ok": true, "id": id })))
}

#[derive(Debug, Default, Deserialize)]
struct DeleteQuery {
    #[serde(default)]
    confirm: bool,
}

async fn api_display_delete(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
    Query(q): Query<DeleteQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    if !q.confirm {
        return Err(ApiError::validation(
            "Deleting a display must be confirmed with ?confirm=true",
        ));
    }
    if !state.store.remove(&id).await? {
        return Err(ApiError::NotFound(format!("No data found for display {id}")));
    }
    info!("display {id} deleted");
    Ok(Json(json!({ "ok": true })))
}

async fn api_display_playlist(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> ApiResult<Json<DerivedPlaylist>> {
    let a = existing(&state, &id).await?;
    Ok(Json(derive_playlist(&a)))
}

// --- Queue editor -----------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct QueueAddReq {
    url: String,
}

#[derive(Debug, Deserialize)]
struct QueueRemoveReq {
    index: usize,
}

#[derive(Debug, Deserialize)]
struct QueueMoveReq {
    from: usize,
    to: usize,
}

async fn save_queue(state: &AppState, id: &str, a: DisplayAssignment) -> ApiResult<Json<serde_json::Value>> {
    let queue = a.queue.clone();
    state.store.put(id, a).await?;
    Ok(Json(json!({ "ok": true, "queue": queue })))
}

async fn api_queue_add(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
    Json(req): Json<QueueAddReq>,
) -> ApiResult<Json<serde_json::Value>> {
    let mut a = existing(&state, &id).await?;
    admin::queue_add(&mut a.queue, &req.url)?;
    save_queue(&state, &id, a).await
}

async fn api_queue_remove(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
    Json(req): Json<QueueRemoveReq>,
) -> ApiResult<Json<serde_json::Value>> {
    let mut a = existing(&state, &id).await?;
    admin::queue_remove(&mut a.queue, req.index)?;
    save_queue(&state, &id, a).await
}

async fn api_queue_move(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
    Json(req): Json<QueueMoveReq>,
) -> ApiResult<Json<serde_json::Value>> {
    let mut a = existing(&state, &id).await?;
    admin::queue_move(&mut a.queue, req.from, req.to)?;
    save_queue(&state, &id, a).await
}

// --- Legacy form endpoints --------------------------------------------------------

async fn api_update_video(
    State(state): State<AppState>,
    Json(req): Json<UpdateVideoReq>,
) -> ApiResult<Json<serde_json::Value>> {
    let current = state.store.get(req.user_id.trim()).await;
    let (id, a) = admin::apply_update_video(req, current.as_ref())?;
    state.store.put(&id, a).await?;
    info!("display {id} assignment replaced");
    Ok(Json(json!({
        "success": true,
        "message": "Video updated successfully"
    })))
}

struct UploadFile {
    name: String,
    content_type: String,
    data: Vec<u8>,
}

async fn api_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<serde_json::Value>> {
    let mut file: Option<UploadFile> = None;
    let mut user_id: Option<String> = None;
    let mut message: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        match field.name().unwrap_or("") {
            "file" => {
                let name = field.file_name().unwrap_or("").to_string();
                let content_type = field.content_type().unwrap_or("").to_string();
                let data = field.bytes().await?;
                file = Some(UploadFile {
                    name,
                    content_type,
                    data: data.to_vec(),
                });
            }
            "userId" => {
                let text = field.text().await?;
                user_id = Some(text.trim().to_string()).filter(|s| !s.is_empty());
            }
            "message" => {
                let text = field.text().await?;
                message = Some(text);
            }
            _ => {}
        }
    }

    let file = file.ok_or_else(|| ApiError::validation("No file provided"))?;
    let user_id = user_id.ok_or_else(|| ApiError::validation("No userId provided"))?;
    if !media::is_video_content_type(&file.content_type) {
        return Err(ApiError::validation("Only video files are allowed"));
    }

    let stored = state
        .media
        .put(&user_id, &file.name, &file.content_type, &file.data)
        .await
        .map_err(|e| ApiError::Upload(e.to_string()))?;

    let current = state.store.get(&user_id).await;
    let a = admin::apply_upload(&user_id, stored.public_url.clone(), message, current.as_ref());
    state.store.put(&user_id, a).await?;
    info!("display {user_id} now plays uploaded {}", stored.key);

    Ok(Json(json!({
        "success": true,
        "downloadURL": stored.public_url,
        "fileName": stored.key
    })))
}

// --- Player -------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct PlayerQuery {
    user: Option<String>,
}

async fn api_player_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(q): Query<PlayerQuery>,
) -> Response {
    let display = q
        .user
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| state.default_display.clone());
    let store = state.store.clone();
    ws.on_upgrade(move |socket| session::run(socket, store, display))
}
