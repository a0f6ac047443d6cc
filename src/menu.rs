// Display switch menu: a two-state overlay (closed/open) with a wrapping cursor
// over the known display ids. Committing hands the chosen id back to the caller;
// the menu itself never touches the store or the subscriptions.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuKey {
    Open,
    Up,
    Down,
    Commit,
    Close,
}

impl MenuKey {
    /// Map a DOM `KeyboardEvent.key` value.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "m" | "M" | "Menu" | "F1" => Some(Self::Open),
            "ArrowUp" => Some(Self::Up),
            "ArrowDown" => Some(Self::Down),
            "Enter" | " " => Some(Self::Commit),
            "Escape" | "Backspace" => Some(Self::Close),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum MenuState {
    #[default]
    Closed,
    Open {
        cursor: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuOutcome {
    Opened { cursor: usize },
    Moved { cursor: usize },
    /// The operator picked a display; the menu is closed again.
    Committed(String),
    Closed,
    /// Key had no effect in the current state.
    Ignored,
}

#[derive(Debug, Default)]
pub struct Menu {
    state: MenuState,
}

/// Snapshot sent to the page while the overlay is visible.
#[derive(Debug, Clone, Serialize)]
pub struct MenuView {
    pub cursor: usize,
    pub items: Vec<MenuItem>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    pub id: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub is_active: bool,
}

impl Menu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, MenuState::Open { .. })
    }

    pub fn cursor(&self) -> Option<usize> {
        match self.state {
            MenuState::Open { cursor } => Some(cursor),
            MenuState::Closed => None,
        }
    }

    /// Feed one key. `displays` is the current ordered id list, `active` the id
    /// the page is showing (the cursor starts there when the menu opens).
    pub fn handle(&mut self, key: MenuKey, displays: &[String], active: &str) -> MenuOutcome {
        if displays.is_empty() {
            if self.is_open() {
                self.state = MenuState::Closed;
                return MenuOutcome::Closed;
            }
            return MenuOutcome::Ignored;
        }
        let len = displays.len();

        match (self.state, key) {
            (MenuState::Closed, MenuKey::Open) => {
                let cursor = displays.iter().position(|d| d == active).unwrap_or(0);
                self.state = MenuState::Open { cursor };
                MenuOutcome::Opened { cursor }
            }
            (MenuState::Closed, _) => MenuOutcome::Ignored,
            (MenuState::Open { cursor }, MenuKey::Up) => {
                let cursor = if cursor == 0 || cursor >= len { len - 1 } else { cursor - 1 };
                self.state = MenuState::Open { cursor };
                MenuOutcome::Moved { cursor }
            }
            (MenuState::Open { cursor }, MenuKey::Down) => {
                let cursor = if cursor + 1 >= len { 0 } else { cursor + 1 };
                self.state = MenuState::Open { cursor };
                MenuOutcome::Moved { cursor }
            }
            (MenuState::Open { cursor }, MenuKey::Commit) => {
                self.state = MenuState::Closed;
                MenuOutcome::Committed(displays[cursor.min(len - 1)].clone())
            }
            (MenuState::Open { .. }, MenuKey::Close) => {
                self.state = MenuState::Closed;
                MenuOutcome::Closed
            }
            (MenuState::Open { .. }, MenuKey::Open) => MenuOutcome::Ignored,
        }
    }

    /// Keep the cursor valid after the display list changed under an open menu.
    pub fn clamp(&mut self, len: usize) {
        if let MenuState::Open { cursor } = self.state {
            self.state = if len == 0 {
                MenuState::Closed
            } else {
                MenuState::Open { cursor: cursor.min(len - 1) }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("user{i}")).collect()
    }

    #[test]
    fn up_from_first_wraps_to_last() {
        let d = ids(3);
        let mut m = Menu::new();
        assert_eq!(m.handle(MenuKey::Open, &d, "user1"), MenuOutcome::Opened { cursor: 0 });
        assert_eq!(m.handle(MenuKey::Up, &d, "user1"), MenuOutcome::Moved { cursor: 2 });
    }

    #[test]
    fn down_from_last_wraps_to_first() {
        let d = ids(3);
        let mut m = Menu::new();
        assert_eq!(m.handle(MenuKey::Open, &d, "user3"), MenuOutcome::Opened { cursor: 2 });
        assert_eq!(m.handle(MenuKey::Down, &d, "user3"), MenuOutcome::Moved { cursor: 0 });
        assert_eq!(m.handle(MenuKey::Down, &d, "user3"), MenuOutcome::Moved { cursor: 1 });
    }

    #[test]
    fn opens_on_active_display_or_first() {
        let d = ids(4);
        let mut m = Menu::new();
        assert_eq!(m.handle(MenuKey::Open, &d, "user3"), MenuOutcome::Opened { cursor: 2 });
        m.handle(MenuKey::Close, &d, "user3");
        assert_eq!(m.handle(MenuKey::Open, &d, "missing"), MenuOutcome::Opened { cursor: 0 });
    }

    #[test]
    fn commit_returns_highlighted_id_and_closes() {
        let d = ids(3);
        let mut m = Menu::new();
        m.handle(MenuKey::Open, &d, "user1");
        m.handle(MenuKey::Down, &d, "user1");
        assert_eq!(
            m.handle(MenuKey::Commit, &d, "user1"),
            MenuOutcome::Committed("user2".into())
        );
        assert!(!m.is_open());
    }

    #[test]
    fn escape_closes_without_commit() {
        let d = ids(2);
        let mut m = Menu::new();
        m.handle(MenuKey::Open, &d, "user1");
        assert_eq!(m.handle(MenuKey::Close, &d, "user1"), MenuOutcome::Closed);
        assert_eq!(m.cursor(), None);
    }

    #[test]
    fn closed_menu_ignores_navigation_and_empty_list_never_opens() {
        let mut m = Menu::new();
        assert_eq!(m.handle(MenuKey::Down, &ids(3), "user1"), MenuOutcome::Ignored);
        assert_eq!(m.handle(MenuKey::Open, &[], "user1"), MenuOutcome::Ignored);
        assert!(!m.is_open());
    }

    #[test]
    fn clamp_after_list_shrinks() {
        let d = ids(5);
        let mut m = Menu::new();
        m.handle(MenuKey::Open, &d, "user5");
        m.clamp(2);
        assert_eq!(m.cursor(), Some(1));
        m.clamp(0);
        assert!(!m.is_open());
    }

    #[test]
    fn key_names() {
        assert_eq!(MenuKey::from_key("F1"), Some(MenuKey::Open));
        assert_eq!(MenuKey::from_key("Backspace"), Some(MenuKey::Close));
        assert_eq!(MenuKey::from_key(" "), Some(MenuKey::Commit));
        assert_eq!(MenuKey::from_key("ArrowLeft"), None);
    }
}
