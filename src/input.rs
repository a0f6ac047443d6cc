// Single owner for keyboard input on the player page.
//
// Priority:
//   1) open menu: consumes its own keys and swallows everything else
//   2) closed menu: the open key opens it (only if there is something to list)
//   3) playback surface keys
//   4) anything left passes through to the page untouched

use crate::menu::MenuKey;
use crate::surface::PlaybackKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Menu(MenuKey),
    Playback(PlaybackKey),
    /// Consumed by the open overlay without effect.
    Swallowed,
    PassThrough,
}

pub fn route(key: &str, menu_open: bool, menu_available: bool) -> Route {
    if menu_open {
        return match MenuKey::from_key(key) {
            Some(MenuKey::Open) | None => Route::Swallowed,
            Some(k) => Route::Menu(k),
        };
    }

    if menu_available && MenuKey::from_key(key) == Some(MenuKey::Open) {
        return Route::Menu(MenuKey::Open);
    }

    match PlaybackKey::from_key(key) {
        Some(k) => Route::Playback(k),
        None => Route::PassThrough,
    }
}
