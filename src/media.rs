// --- Local object store for uploaded videos ---------------------------------
//
// Layout under the media root:
//   videos/<display id>/<unix millis>-<file name>            the asset
//   videos/<display id>/<unix millis>-<file name>.meta.json  upload metadata
//
// The tree is served read-only at /media, so the public address of an object is
// `<public base url>/media/<key>`.

use std::path::{Path, PathBuf};

use serde_json::json;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::info;

#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
    public_base_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub public_url: String,
}

/// Only `video/*` uploads are accepted.
pub fn is_video_content_type(content_type: &str) -> bool {
    content_type.trim().to_ascii_lowercase().starts_with("video/")
}

/// Replace everything outside `[A-Za-z0-9.-]` with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

// A single path segment that can never climb out of its parent.
fn safe_segment(raw: &str) -> String {
    let s = sanitize_file_name(raw);
    if s.is_empty() || s.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        s
    }
}

pub fn object_key(display_id: &str, unix_millis: i128, file_name: &str) -> String {
    let file_name = if file_name.is_empty() { "upload" } else { file_name };
    format!(
        "videos/{}/{}-{}",
        safe_segment(display_id),
        unix_millis,
        sanitize_file_name(file_name)
    )
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/media/{}", self.public_base_url, key)
    }

    /// Write one asset plus its metadata sidecar.
    pub async fn put(
        &self,
        display_id: &str,
        original_name: &str,
        content_type: &str,
        data: &[u8],
    ) -> anyhow::Result<StoredObject> {
        let now = OffsetDateTime::now_utc();
        let key = object_key(display_id, now.unix_timestamp_nanos() / 1_000_000, original_name);
        let path = self.root.join(&key);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| anyhow::anyhow!("failed to create {}: {e}", parent.display()))?;
        }
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", path.display()))?;

        let meta = json!({
            "contentType": content_type,
            "uploadedBy": display_id,
            "originalName": original_name,
            "uploadTime": now.format(&Rfc3339)?,
            "size": data.len(),
        });
        let meta_path = self.root.join(format!("{key}.meta.json"));
        tokio::fs::write(&meta_path, serde_json::to_vec_pretty(&meta)?)
            .await
            .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", meta_path.display()))?;

        info!("stored upload {} ({} bytes)", key, data.len());
        Ok(StoredObject {
            public_url: self.public_url(&key),
            key,
        })
    }
}
