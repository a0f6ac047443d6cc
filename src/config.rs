// Runtime configuration.
//
// Environment only, read once at startup:
//   SIGNAGE_BIND               listen address (loopback; put nginx/Caddy in front)
//   SIGNAGE_DB_PATH            SQLite file backing the assignment store
//   SIGNAGE_MEDIA_DIR          root of the uploaded-asset tree
//   SIGNAGE_PUBLIC_BASE_URL    prefix for public asset addresses
//   SIGNAGE_UI_DIR             optional static player/admin pages served at /
//   SIGNAGE_DEFAULT_DISPLAY    display used when the player omits ?user=
//   SIGNAGE_MAX_UPLOAD_MB      request body limit for uploads

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use tracing::info;

const DEFAULT_BIND: &str = "127.0.0.1:3000";
const DEFAULT_DB_PATH: &str = "/opt/signage/shared/signage.db";
const DEFAULT_MEDIA_DIR: &str = "/opt/signage/shared/media";
const DEFAULT_PUBLIC_BASE_URL: &str = "http://127.0.0.1:3000";
const DEFAULT_DISPLAY: &str = "user1";
const DEFAULT_MAX_UPLOAD_MB: usize = 512;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: SocketAddr,
    pub db_path: PathBuf,
    pub media_dir: PathBuf,
    pub public_base_url: String,
    pub ui_dir: Option<PathBuf>,
    pub default_display: String,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind = get("SIGNAGE_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind: SocketAddr = bind
            .parse()
            .with_context(|| format!("SIGNAGE_BIND is not a socket address: {bind}"))?;

        let db_path = get("SIGNAGE_DB_PATH").map(PathBuf::from).unwrap_or_else(|| {
            info!("SIGNAGE_DB_PATH not set; using {DEFAULT_DB_PATH}");
            PathBuf::from(DEFAULT_DB_PATH)
        });
        let media_dir = get("SIGNAGE_MEDIA_DIR").map(PathBuf::from).unwrap_or_else(|| {
            info!("SIGNAGE_MEDIA_DIR not set; using {DEFAULT_MEDIA_DIR}");
            PathBuf::from(DEFAULT_MEDIA_DIR)
        });

        let public_base_url =
            get("SIGNAGE_PUBLIC_BASE_URL").unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.to_string());
        url::Url::parse(&public_base_url)
            .with_context(|| format!("SIGNAGE_PUBLIC_BASE_URL is not a URL: {public_base_url}"))?;

        let max_upload_mb = match get("SIGNAGE_MAX_UPLOAD_MB") {
            Some(v) => v
                .parse::<usize>()
                .with_context(|| format!("SIGNAGE_MAX_UPLOAD_MB is not a number: {v}"))?,
            None => DEFAULT_MAX_UPLOAD_MB,
        };

        Ok(Self {
            bind,
            db_path,
            media_dir,
            public_base_url,
            ui_dir: get("SIGNAGE_UI_DIR").map(PathBuf::from),
            default_display: get("SIGNAGE_DEFAULT_DISPLAY").unwrap_or_else(|| DEFAULT_DISPLAY.to_string()),
            max_upload_bytes: max_upload_mb.saturating_mul(1024 * 1024),
        })
    }
}
