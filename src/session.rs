// --- Player session ------------------------------------------------------------
//
// One session per open player page, carried over a websocket:
//
//   Browser:  {"type":"key","key":"ArrowRight"} / click / ready / state / ended
//   Engine :  {"type":"render", ...} and {"type":"commands","commands":[...]}
//
// The session is the only place that listens to the page's input; it routes
// keys through `input::route` so the menu overlay and the playback shortcuts never
// both react to the same key. It owns its store subscriptions and drops them when
// the socket closes or the operator switches displays.

use axum::extract::ws::{Message, WebSocket};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::input::{self, Route};
use crate::menu::{Menu, MenuItem, MenuOutcome, MenuView};
use crate::model::DisplayAssignment;
use crate::normalize::VideoId;
use crate::playlist::{PlaybackEvent, PlaybackState};
use crate::store::{Notification, Scope, Store, StoreEvent, Subscription};
use crate::surface::{Surface, SurfaceEvent, WidgetCommand};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMsg {
    Key {
        key: String,
    },
    Click,
    #[serde(rename_all = "camelCase")]
    Ready {
        #[serde(default)]
        can_unmute: bool,
    },
    State {
        playing: bool,
    },
    Ended,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderView {
    pub display: String,
    pub name: Option<String>,
    pub message: Option<String>,
    pub playlist: Vec<VideoId>,
    pub current_index: usize,
    pub current: Option<VideoId>,
    pub sound_enabled: bool,
    pub has_interacted: bool,
    /// Show the "Press M for Menu" hint.
    pub menu_hint: bool,
    pub menu: Option<MenuView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMsg {
    Render(RenderView),
    Commands { commands: Vec<WidgetCommand> },
    /// Page addressing changed; the page should update `?user=`.
    Navigate { user: String },
    /// Key was not used; the page may handle it.
    Passthrough { key: String },
}

#[derive(Debug, Default)]
pub struct SessionStep {
    pub out: Vec<ServerMsg>,
    /// The operator committed a different display in the menu.
    pub switch_to: Option<String>,
}

pub struct PlayerSession {
    id: Uuid,
    store: Store,
    display: String,
    assignment: Option<DisplayAssignment>,
    displays: Vec<(String, DisplayAssignment)>,
    playback: PlaybackState,
    surface: Surface,
    menu: Menu,
}

impl PlayerSession {
    /// Load the display and the menu list, and produce the first render.
    pub async fn start(store: Store, display: String) -> (Self, Vec<ServerMsg>) {
        let assignment = store.get(&display).await;
        let displays = store.list().await;
        let playback = PlaybackState::from_assignment(assignment.as_ref());

        let mut session = Self {
            id: Uuid::new_v4(),
            store,
            display,
            assignment,
            displays,
            playback,
            surface: Surface::new(),
            menu: Menu::new(),
        };
        if session.assignment.is_none() {
            warn!(session = %session.id, "no data found for display {}", session.display);
        }
        info!(session = %session.id, display = %session.display, "player session started");

        let commands = session.surface.initial(&session.playback);
        let out = vec![session.render(), ServerMsg::Commands { commands }];
        (session, out)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn display(&self) -> &str {
        &self.display
    }

    fn display_ids(&self) -> Vec<String> {
        self.displays.iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn render(&self) -> ServerMsg {
        let menu = self.menu.cursor().map(|cursor| MenuView {
            cursor,
            items: self
                .displays
                .iter()
                .map(|(id, a)| MenuItem {
                    id: id.clone(),
                    label: a.label(id).to_string(),
                    message: a.message.clone(),
                    is_active: *id == self.display,
                })
                .collect(),
        });

        ServerMsg::Render(RenderView {
            display: self.display.clone(),
            name: self.assignment.as_ref().map(|a| a.label(&self.display).to_string()),
            message: self.assignment.as_ref().and_then(|a| a.message.clone()),
            playlist: self.playback.playlist().to_vec(),
            current_index: self.playback.current_index(),
            current: self.playback.current().cloned(),
            sound_enabled: self.surface.sound_enabled(),
            has_interacted: self.playback.has_interacted(),
            menu_hint: !self.menu.is_open() && self.displays.len() > 1,
            menu,
        })
    }

    pub fn on_client(&mut self, msg: ClientMsg) -> SessionStep {
        match msg {
            ClientMsg::Key { key } => self.on_key(key),
            ClientMsg::Click => {
                let commands = self.surface.handle(&mut self.playback, SurfaceEvent::Interaction);
                SessionStep {
                    out: with_commands(vec![self.render()], commands),
                    switch_to: None,
                }
            }
            ClientMsg::Ready { can_unmute } => {
                let commands = self
                    .surface
                    .handle(&mut self.playback, SurfaceEvent::WidgetReady { can_unmute });
                SessionStep {
                    out: with_commands(Vec::new(), commands),
                    switch_to: None,
                }
            }
            ClientMsg::State { playing } => {
                self.surface
                    .handle(&mut self.playback, SurfaceEvent::WidgetState { playing });
                SessionStep::default()
            }
            ClientMsg::Ended => {
                let commands = self.surface.handle(&mut self.playback, SurfaceEvent::ItemEnded);
                debug!(session = %self.id, index = self.playback.current_index(), "item ended");
                SessionStep {
                    out: with_commands(vec![self.render()], commands),
                    switch_to: None,
                }
            }
        }
    }

    fn on_key(&mut self, key: String) -> SessionStep {
        // Any keypress counts as the first interaction, even one the menu eats.
        let mut commands = self.surface.handle(&mut self.playback, SurfaceEvent::Interaction);
        let mut step = SessionStep::default();

        match input::route(&key, self.menu.is_open(), !self.displays.is_empty()) {
            Route::Menu(k) => {
                let ids = self.display_ids();
                match self.menu.handle(k, &ids, &self.display) {
                    MenuOutcome::Committed(id) if id != self.display => {
                        info!(session = %self.id, from = %self.display, to = %id, "display switched from menu");
                        step.out.push(ServerMsg::Navigate { user: id.clone() });
                        step.switch_to = Some(id);
                    }
                    MenuOutcome::Ignored => {}
                    _ => step.out.push(self.render()),
                }
            }
            Route::Playback(k) => {
                commands.extend(self.surface.handle(&mut self.playback, SurfaceEvent::Key(k)));
                step.out.push(self.render());
            }
            Route::Swallowed => {}
            Route::PassThrough => step.out.push(ServerMsg::Passthrough { key }),
        }

        step.out = with_commands(step.out, commands);
        step
    }

    /// Re-address the session. The caller must already hold a subscription for
    /// the new display so no write between the read below and the first
    /// notification can be missed.
    pub async fn switch_display(&mut self, display: String) -> Vec<ServerMsg> {
        self.display = display;
        self.assignment = self.store.get(&self.display).await;
        self.playback
            .apply(PlaybackEvent::AssignmentChanged(self.assignment.as_ref()));
        let commands = self.surface.bind(&self.playback, true);
        with_commands(vec![self.render()], commands)
    }

    /// The active display's assignment was written or deleted. The queue position
    /// only resets when the media list itself changed.
    pub fn on_display_event(&mut self, assignment: Option<DisplayAssignment>) -> Vec<ServerMsg> {
        debug!(session = %self.id, display = %self.display, "assignment updated");
        let same_queue =
            self.assignment.as_ref().map(|a| &a.queue) == assignment.as_ref().map(|a| &a.queue);
        self.assignment = assignment;
        if same_queue {
            return vec![self.render()];
        }
        self.playback
            .apply(PlaybackEvent::AssignmentChanged(self.assignment.as_ref()));
        let commands = self.surface.bind(&self.playback, false);
        with_commands(vec![self.render()], commands)
    }

    /// Some entry of the tree changed; refresh the menu list.
    pub fn on_tree_event(&mut self, ev: StoreEvent) -> Vec<ServerMsg> {
        match (ev.assignment, self.displays.binary_search_by(|(id, _)| id.as_str().cmp(&ev.id))) {
            (Some(a), Ok(i)) => self.displays[i].1 = a,
            (Some(a), Err(i)) => self.displays.insert(i, (ev.id, a)),
            (None, Ok(i)) => {
                self.displays.remove(i);
            }
            (None, Err(_)) => {}
        }
        self.menu.clamp(self.displays.len());
        vec![self.render()]
    }

    pub async fn resync_display(&mut self) -> Vec<ServerMsg> {
        let assignment = self.store.get(&self.display).await;
        self.on_display_event(assignment)
    }

    pub async fn resync_tree(&mut self) -> Vec<ServerMsg> {
        self.displays = self.store.list().await;
        self.menu.clamp(self.displays.len());
        vec![self.render()]
    }
}

fn with_commands(mut out: Vec<ServerMsg>, commands: Vec<WidgetCommand>) -> Vec<ServerMsg> {
    if !commands.is_empty() {
        out.push(ServerMsg::Commands { commands });
    }
    out
}

async fn send_all(socket: &mut WebSocket, msgs: Vec<ServerMsg>) -> bool {
    for m in msgs {
        let text = match serde_json::to_string(&m) {
            Ok(t) => t,
            Err(e) => {
                warn!("failed to encode player message: {e}");
                continue;
            }
        };
        if socket.send(Message::Text(text)).await.is_err() {
            return false;
        }
    }
    true
}

/// Drive one player page until its socket closes.
pub async fn run(mut socket: WebSocket, store: Store, display: String) {
    // Subscribe before reading the snapshot so no write can slip in between.
    let mut display_sub: Subscription = store.subscribe(Scope::Display(display.clone()));
    let mut tree_sub = store.subscribe(Scope::All);

    let (mut session, out) = PlayerSession::start(store.clone(), display).await;
    if !send_all(&mut socket, out).await {
        return;
    }

    loop {
        let out = tokio::select! {
            msg = socket.recv() => match msg {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(m) => {
                        let step = session.on_client(m);
                        let mut out = step.out;
                        if let Some(id) = step.switch_to {
                            let old = std::mem::replace(
                                &mut display_sub,
                                store.subscribe(Scope::Display(id.clone())),
                            );
                            old.cancel();
                            out.extend(session.switch_display(id).await);
                        }
                        out
                    }
                    Err(e) => {
                        debug!(session = %session.id(), "ignoring malformed player message: {e}");
                        Vec::new()
                    }
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => Vec::new(),
                Some(Err(e)) => {
                    debug!(session = %session.id(), "player socket error: {e}");
                    break;
                }
            },
            n = display_sub.recv() => match n {
                Some(Notification::Changed(ev)) => session.on_display_event(ev.assignment),
                Some(Notification::Resync) => session.resync_display().await,
                None => break,
            },
            n = tree_sub.recv() => match n {
                Some(Notification::Changed(ev)) => session.on_tree_event(ev),
                Some(Notification::Resync) => session.resync_tree().await,
                None => break,
            },
        };

        if !send_all(&mut socket, out).await {
            break;
        }
    }

    info!(session = %session.id(), display = %session.display(), "player session closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::video_id;

    fn assignment(name: &str, queue: &[&str]) -> DisplayAssignment {
        DisplayAssignment {
            name: name.into(),
            queue: queue.iter().map(|s| s.to_string()).collect(),
            message: None,
        }
    }

    async fn seeded_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("signage.db")).await;
        store
            .put("user1", assignment("Lobby", &["dQw4w9WgXcQ", "https://youtu.be/abc123XYZ90", "not-a-url"]))
            .await
            .unwrap();
        store.put("user2", assignment("Bar", &["XYZ1234567A"])).await.unwrap();
        store.put("user3", assignment("", &["nothing-here"])).await.unwrap();
        (dir, store)
    }

    fn commands(out: &[ServerMsg]) -> Vec<WidgetCommand> {
        out.iter()
            .filter_map(|m| match m {
                ServerMsg::Commands { commands } => Some(commands.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn key(k: &str) -> ClientMsg {
        ClientMsg::Key { key: k.to_string() }
    }

    fn load(id: &str) -> WidgetCommand {
        WidgetCommand::Load { video_id: video_id(id) }
    }

    #[tokio::test]
    async fn start_renders_and_loads_first_item() {
        let (_dir, store) = seeded_store().await;
        let (s, out) = PlayerSession::start(store, "user1".into()).await;
        assert_eq!(commands(&out), vec![load("dQw4w9WgXcQ")]);
        assert_eq!(s.playback.playlist().len(), 2);

        let ServerMsg::Render(view) = &out[0] else { panic!("first message must render") };
        assert_eq!(view.name.as_deref(), Some("Lobby"));
        assert!(view.menu_hint);
        assert!(view.menu.is_none());
    }

    #[tokio::test]
    async fn unknown_display_shows_placeholder() {
        let (_dir, store) = seeded_store().await;
        let (_s, out) = PlayerSession::start(store, "ghost".into()).await;
        assert_eq!(commands(&out), vec![WidgetCommand::Placeholder]);
    }

    #[tokio::test]
    async fn skip_and_end_walk_the_queue() {
        let (_dir, store) = seeded_store().await;
        let (mut s, _) = PlayerSession::start(store, "user1".into()).await;

        // First key also unmutes; the reload then re-asserts sound.
        let step = s.on_client(key("n"));
        assert_eq!(
            commands(&step.out),
            vec![WidgetCommand::Unmute, load("abc123XYZ90"), WidgetCommand::Unmute]
        );

        let step = s.on_client(ClientMsg::Ended);
        assert_eq!(commands(&step.out), vec![load("dQw4w9WgXcQ"), WidgetCommand::Unmute]);
    }

    #[tokio::test]
    async fn open_menu_suppresses_playback_keys() {
        let (_dir, store) = seeded_store().await;
        let (mut s, _) = PlayerSession::start(store, "user1".into()).await;
        s.on_client(ClientMsg::Click);

        let step = s.on_client(key("m"));
        let ServerMsg::Render(view) = &step.out[0] else { panic!("expected render") };
        let menu = view.menu.as_ref().unwrap();
        assert_eq!(menu.cursor, 0);
        assert_eq!(menu.items.len(), 3);
        assert_eq!(menu.items[2].label, "user3");
        assert!(menu.items[0].is_active);

        // Seek keys do nothing while the overlay is up.
        let step = s.on_client(key("ArrowRight"));
        assert!(commands(&step.out).is_empty());
        assert!(step.out.is_empty());

        let step = s.on_client(key("ArrowUp"));
        let ServerMsg::Render(view) = &step.out[0] else { panic!("expected render") };
        assert_eq!(view.menu.as_ref().unwrap().cursor, 2);
    }

    #[tokio::test]
    async fn menu_commit_switches_display() {
        let (_dir, store) = seeded_store().await;
        let (mut s, _) = PlayerSession::start(store, "user1".into()).await;

        s.on_client(key("M"));
        s.on_client(key("ArrowDown"));
        let step = s.on_client(key("Enter"));
        assert_eq!(step.switch_to.as_deref(), Some("user2"));
        assert!(matches!(&step.out[0], ServerMsg::Navigate { user } if user == "user2"));

        let out = s.switch_display("user2".into()).await;
        assert_eq!(s.display(), "user2");
        assert_eq!(commands(&out), vec![load("XYZ1234567A"), WidgetCommand::Unmute]);

        // Enter now toggles playback again instead of committing; the new item
        // autoplayed, so the toggle pauses it.
        let step = s.on_client(key("Enter"));
        assert!(step.switch_to.is_none());
        assert_eq!(commands(&step.out), vec![WidgetCommand::Unmute, WidgetCommand::Pause]);
    }

    #[tokio::test]
    async fn committing_current_display_just_closes() {
        let (_dir, store) = seeded_store().await;
        let (mut s, _) = PlayerSession::start(store, "user1".into()).await;
        s.on_client(key("m"));
        let step = s.on_client(key(" "));
        assert!(step.switch_to.is_none());
        let ServerMsg::Render(view) = &step.out[0] else { panic!("expected render") };
        assert!(view.menu.is_none());
    }

    #[tokio::test]
    async fn unknown_keys_pass_through() {
        let (_dir, store) = seeded_store().await;
        let (mut s, _) = PlayerSession::start(store, "user1".into()).await;
        let step = s.on_client(key("q"));
        assert!(step
            .out
            .iter()
            .any(|m| matches!(m, ServerMsg::Passthrough { key } if key == "q")));
    }

    #[tokio::test]
    async fn assignment_updates_rebind_only_when_item_changes() {
        let (_dir, store) = seeded_store().await;
        let (mut s, _) = PlayerSession::start(store, "user1".into()).await;
        s.on_client(key("n"));
        assert_eq!(s.playback.current_index(), 1);

        // Same head item: position resets to 0 and the widget is told to load it.
        let out = s.on_display_event(Some(assignment("Lobby", &["dQw4w9WgXcQ"])));
        assert_eq!(s.playback.current_index(), 0);
        assert_eq!(commands(&out), vec![load("dQw4w9WgXcQ"), WidgetCommand::Unmute]);

        let out = s.on_display_event(None);
        assert_eq!(commands(&out), vec![WidgetCommand::Placeholder]);
    }

    #[tokio::test]
    async fn message_only_write_keeps_queue_position() {
        let (_dir, store) = seeded_store().await;
        let (mut s, _) = PlayerSession::start(store, "user1".into()).await;
        s.on_client(key("n"));
        assert_eq!(s.playback.current_index(), 1);

        let mut a = assignment("Lobby", &["dQw4w9WgXcQ", "https://youtu.be/abc123XYZ90", "not-a-url"]);
        a.message = Some("Closing soon".into());
        let out = s.on_display_event(Some(a));

        assert_eq!(s.playback.current_index(), 1);
        assert_eq!(s.playback.current(), Some(&video_id("abc123XYZ90")));
        assert!(commands(&out).is_empty());
        let ServerMsg::Render(view) = &out[0] else { panic!("expected render") };
        assert_eq!(view.message.as_deref(), Some("Closing soon"));
        assert_eq!(view.current_index, 1);

        // A renamed display is also just a re-render.
        let out = s.on_display_event(Some(assignment(
            "Front Lobby",
            &["dQw4w9WgXcQ", "https://youtu.be/abc123XYZ90", "not-a-url"],
        )));
        assert_eq!(s.playback.current_index(), 1);
        let ServerMsg::Render(view) = &out[0] else { panic!("expected render") };
        assert_eq!(view.name.as_deref(), Some("Front Lobby"));
        assert_eq!(view.message, None);
    }

    #[tokio::test]
    async fn tree_events_keep_menu_list_sorted() {
        let (_dir, store) = seeded_store().await;
        let (mut s, _) = PlayerSession::start(store, "user1".into()).await;
        s.on_tree_event(StoreEvent {
            id: "aaa".into(),
            assignment: Some(assignment("First", &["dQw4w9WgXcQ"])),
        });
        s.on_tree_event(StoreEvent { id: "user3".into(), assignment: None });
        assert_eq!(s.display_ids(), vec!["aaa", "user1", "user2"]);
    }

    #[test]
    fn client_messages_parse() {
        let m: ClientMsg = serde_json::from_str(r#"{"type":"ready","canUnmute":true}"#).unwrap();
        assert!(matches!(m, ClientMsg::Ready { can_unmute: true }));
        let m: ClientMsg = serde_json::from_str(r#"{"type":"key","key":" "}"#).unwrap();
        assert!(matches!(m, ClientMsg::Key { key } if key == " "));
        assert!(serde_json::from_str::<ClientMsg>(r#"{"type":"dance"}"#).is_err());
    }

    #[test]
    fn server_messages_are_tagged() {
        let v = serde_json::to_value(ServerMsg::Commands {
            commands: vec![load("dQw4w9WgXcQ"), WidgetCommand::SeekBy { seconds: -10.0 }],
        })
        .unwrap();
        assert_eq!(v["type"], "commands");
        assert_eq!(v["commands"][0]["type"], "load");
        assert_eq!(v["commands"][0]["videoId"], "dQw4w9WgXcQ");
        assert_eq!(v["commands"][1]["type"], "seekBy");
        assert_eq!(v["commands"][1]["seconds"], -10.0);
    }
}
