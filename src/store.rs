// --- Display assignment store ------------------------------------------------
//
// Ordered key/value tree (display id -> assignment) held in memory and mirrored
// to SQLite. Every write is persisted before the in-memory tree changes and
// before subscribers hear about it, all under the tree's write lock, so readers
// and notifications always agree with what is on disk.
//
// rusqlite is synchronous; all DB calls go through spawn_blocking.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::{params, Connection};
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};

use crate::model::DisplayAssignment;

const EVENT_CAPACITY: usize = 64;

fn db_init(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;

        CREATE TABLE IF NOT EXISTS displays (
            id       TEXT PRIMARY KEY,
            name     TEXT NOT NULL,
            queue    TEXT NOT NULL,
            message  TEXT
        );
        "#,
    )?;
    Ok(())
}

fn db_load_displays(conn: &Connection) -> anyhow::Result<BTreeMap<String, DisplayAssignment>> {
    db_init(conn)?;

    let mut stmt = conn.prepare("SELECT id, name, queue, message FROM displays")?;
    let mut rows = stmt.query([])?;

    let mut out = BTreeMap::new();
    while let Some(row) = rows.next()? {
        let id: String = row.get(0)?;
        let queue_json: String = row.get(2)?;
        let queue: Vec<String> = serde_json::from_str(&queue_json)
            .map_err(|e| anyhow::anyhow!("invalid queue JSON in DB (id={id}): {e}"))?;

        out.insert(
            id,
            DisplayAssignment {
                name: row.get(1)?,
                queue,
                message: row.get(3)?,
            },
        );
    }
    Ok(out)
}

fn db_save_display(conn: &mut Connection, id: &str, a: &DisplayAssignment) -> anyhow::Result<()> {
    db_init(conn)?;
    let queue_json = serde_json::to_string(&a.queue)?;
    conn.execute(
        "INSERT INTO displays (id, name, queue, message)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET
           name=excluded.name,
           queue=excluded.queue,
           message=excluded.message",
        params![id, a.name, queue_json, a.message],
    )?;
    Ok(())
}

fn db_delete_display(conn: &mut Connection, id: &str) -> anyhow::Result<()> {
    db_init(conn)?;
    conn.execute("DELETE FROM displays WHERE id = ?1", params![id])?;
    Ok(())
}

/// Which part of the tree a subscriber cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Display(String),
    All,
}

impl Scope {
    fn covers(&self, id: &str) -> bool {
        match self {
            Scope::Display(d) => d == id,
            Scope::All => true,
        }
    }
}

/// One committed write. `assignment == None` means the entry was deleted.
#[derive(Debug, Clone)]
pub struct StoreEvent {
    pub id: String,
    pub assignment: Option<DisplayAssignment>,
}

#[derive(Debug)]
pub enum Notification {
    Changed(StoreEvent),
    /// Events were missed; the subscriber must re-read its scope from the store.
    Resync,
}

#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

struct Inner {
    db_path: PathBuf,
    tree: RwLock<BTreeMap<String, DisplayAssignment>>,
    events: broadcast::Sender<StoreEvent>,
}

impl Store {
    /// Open the store at `db_path`. A DB that cannot be read leaves the store
    /// empty (writes will still try to persist).
    pub async fn open(db_path: impl Into<PathBuf>) -> Self {
        let db_path = db_path.into();
        let path = db_path.clone();
        let res = tokio::task::spawn_blocking(move || -> anyhow::Result<BTreeMap<String, DisplayAssignment>> {
            let conn = Connection::open(path)?;
            db_load_displays(&conn)
        })
        .await;

        let tree = match res {
            Ok(Ok(tree)) => {
                info!("loaded {} display assignment(s) from {}", tree.len(), db_path.display());
                tree
            }
            Ok(Err(e)) => {
                warn!("failed to load displays from sqlite, starting empty: {e}");
                BTreeMap::new()
            }
            Err(e) => {
                warn!("failed to join sqlite load task, starting empty: {e}");
                BTreeMap::new()
            }
        };

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                db_path,
                tree: RwLock::new(tree),
                events,
            }),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.inner.db_path
    }

    pub async fn list(&self) -> Vec<(String, DisplayAssignment)> {
        let tree = self.inner.tree.read().await;
        tree.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    pub async fn get(&self, id: &str) -> Option<DisplayAssignment> {
        self.inner.tree.read().await.get(id).cloned()
    }

    /// Replace the entry at `id` (creating it if needed).
    pub async fn put(&self, id: &str, assignment: DisplayAssignment) -> anyhow::Result<()> {
        let mut tree = self.inner.tree.write().await;

        let path = self.inner.db_path.clone();
        let (key, row) = (id.to_string(), assignment.clone());
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let mut conn = Connection::open(path)?;
            db_save_display(&mut conn, &key, &row)
        })
        .await??;

        tree.insert(id.to_string(), assignment.clone());
        let _ = self.inner.events.send(StoreEvent {
            id: id.to_string(),
            assignment: Some(assignment),
        });
        Ok(())
    }

    /// Remove the entry at `id`. Returns `false` if there was nothing to remove.
    pub async fn remove(&self, id: &str) -> anyhow::Result<bool> {
        let mut tree = self.inner.tree.write().await;
        if !tree.contains_key(id) {
            return Ok(false);
        }

        let path = self.inner.db_path.clone();
        let key = id.to_string();
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let mut conn = Connection::open(path)?;
            db_delete_display(&mut conn, &key)
        })
        .await??;

        tree.remove(id);
        let _ = self.inner.events.send(StoreEvent {
            id: id.to_string(),
            assignment: None,
        });
        Ok(true)
    }

    /// Register for change notifications. Dropping (or cancelling) the handle
    /// unregisters it.
    pub fn subscribe(&self, scope: Scope) -> Subscription {
        Subscription {
            scope,
            rx: self.inner.events.subscribe(),
        }
    }
}

pub struct Subscription {
    scope: Scope,
    rx: broadcast::Receiver<StoreEvent>,
}

impl Subscription {
    /// Wait for the next notification in scope. `None` once the store is gone.
    pub async fn recv(&mut self) -> Option<Notification> {
        loop {
            match self.rx.recv().await {
                Ok(ev) if self.scope.covers(&ev.id) => return Some(Notification::Changed(ev)),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("store subscriber lagged by {n} event(s); resyncing");
                    return Some(Notification::Resync);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn cancel(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn assignment(name: &str, queue: &[&str]) -> DisplayAssignment {
        DisplayAssignment {
            name: name.into(),
            queue: queue.iter().map(|s| s.to_string()).collect(),
            message: None,
        }
    }

    async fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("signage.db")).await;
        (dir, store)
    }

    #[tokio::test]
    async fn put_get_list_in_key_order() {
        let (_dir, store) = temp_store().await;
        store.put("user2", assignment("Bar", &["abc123XYZ90"])).await.unwrap();
        store.put("user1", assignment("Lobby", &["dQw4w9WgXcQ"])).await.unwrap();

        let ids: Vec<String> = store.list().await.into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["user1", "user2"]);
        assert_eq!(store.get("user2").await.unwrap().name, "Bar");
        assert!(store.get("user3").await.is_none());
    }

    #[tokio::test]
    async fn writes_survive_reopen() {
        let (dir, store) = temp_store().await;
        let mut a = assignment("Lobby", &["dQw4w9WgXcQ", "https://youtu.be/abc123XYZ90"]);
        a.message = Some("Welcome".into());
        store.put("user1", a.clone()).await.unwrap();
        store.put("user2", assignment("Gone", &["XYZ1234567A"])).await.unwrap();
        assert!(store.remove("user2").await.unwrap());
        drop(store);

        let reopened = Store::open(dir.path().join("signage.db")).await;
        assert_eq!(reopened.get("user1").await, Some(a));
        assert!(reopened.get("user2").await.is_none());
    }

    #[tokio::test]
    async fn put_is_full_replace() {
        let (_dir, store) = temp_store().await;
        let mut a = assignment("Lobby", &["dQw4w9WgXcQ"]);
        a.message = Some("Hi".into());
        store.put("user1", a).await.unwrap();
        store.put("user1", assignment("Lobby", &["abc123XYZ90"])).await.unwrap();

        let got = store.get("user1").await.unwrap();
        assert_eq!(got.queue, vec!["abc123XYZ90".to_string()]);
        assert_eq!(got.message, None);
    }

    #[tokio::test]
    async fn remove_missing_entry_is_false() {
        let (_dir, store) = temp_store().await;
        assert!(!store.remove("nobody").await.unwrap());
    }

    #[tokio::test]
    async fn scoped_subscription_only_sees_its_display() {
        let (_dir, store) = temp_store().await;
        let mut one = store.subscribe(Scope::Display("user1".into()));
        let mut all = store.subscribe(Scope::All);

        store.put("user2", assignment("Bar", &["abc123XYZ90"])).await.unwrap();
        store.put("user1", assignment("Lobby", &["dQw4w9WgXcQ"])).await.unwrap();
        store.remove("user1").await.unwrap();

        match one.recv().await {
            Some(Notification::Changed(ev)) => {
                assert_eq!(ev.id, "user1");
                assert!(ev.assignment.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
        match one.recv().await {
            Some(Notification::Changed(ev)) => assert!(ev.assignment.is_none()),
            other => panic!("unexpected {other:?}"),
        }

        let mut seen = Vec::new();
        for _ in 0..3 {
            if let Some(Notification::Changed(ev)) = all.recv().await {
                seen.push(ev.id);
            }
        }
        assert_eq!(seen, vec!["user2", "user1", "user1"]);
    }

    #[tokio::test]
    async fn lagging_subscriber_is_told_to_resync() {
        let (_dir, store) = temp_store().await;
        let mut sub = store.subscribe(Scope::All);
        for i in 0..(EVENT_CAPACITY + 5) {
            store.put(&format!("user{i}"), assignment("x", &["dQw4w9WgXcQ"])).await.unwrap();
        }
        assert!(matches!(sub.recv().await, Some(Notification::Resync)));
    }

    #[tokio::test]
    async fn cancelled_subscription_stops_receiving() {
        let (_dir, store) = temp_store().await;
        let sub = store.subscribe(Scope::All);
        sub.cancel();

        // With no live receivers the write still succeeds.
        store.put("user1", assignment("Lobby", &["dQw4w9WgXcQ"])).await.unwrap();

        let mut late = store.subscribe(Scope::All);
        let waited = tokio::time::timeout(Duration::from_millis(50), late.recv()).await;
        assert!(waited.is_err(), "late subscriber must not see earlier writes");
    }
}
