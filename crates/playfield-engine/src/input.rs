//! Abstract keyboard input.
//!
//! The host feeds raw key names into the event bus as [`KeyEvent`]s. Names are
//! normalized once, at construction: the space bar becomes `space`, arrows
//! collapse to `up`/`down`/`left`/`right`, `Enter` becomes `return`,
//! `Escape` becomes `escape`, and everything else is lower-cased.
//!
//! [`Keyboard`] is a shared buffer that listens on the bus and lets systems
//! ask "which keys were pressed this frame" and "is this key held".

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::rc::Rc;

use playfield_ecs::events::{BusEvent, EventBus, Subscription};

// ---------------------------------------------------------------------------
// KeyEvent
// ---------------------------------------------------------------------------

/// Whether a key went down, came up, or is repeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyState {
    Pressed,
    Released,
    Held,
}

/// A normalized key event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub state: KeyState,
    /// Normalized key name.
    pub key: String,
    /// Raw physical key code as reported by the host (e.g. `KeyA`).
    pub code: String,
}

impl KeyEvent {
    pub fn new(state: KeyState, key: &str, code: &str) -> Self {
        Self {
            state,
            key: normalize_key(key),
            code: code.to_owned(),
        }
    }

    pub fn pressed(key: &str, code: &str) -> Self {
        Self::new(KeyState::Pressed, key, code)
    }

    pub fn released(key: &str, code: &str) -> Self {
        Self::new(KeyState::Released, key, code)
    }

    pub fn held(key: &str, code: &str) -> Self {
        Self::new(KeyState::Held, key, code)
    }

    /// Matches the normalized name (case-insensitive) or the raw code.
    pub fn is_key(&self, key: &str) -> bool {
        self.key == key.to_lowercase() || self.code == key
    }

    /// The digit `0`–`9` this key names, if any.
    pub fn digit(&self) -> Option<u32> {
        let mut chars = self.key.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => c.to_digit(10),
            _ => None,
        }
    }
}

impl BusEvent for KeyEvent {
    type Kind = KeyState;

    fn kind(&self) -> KeyState {
        self.state
    }
}

/// Normalize a host key name.
pub fn normalize_key(key: &str) -> String {
    match key {
        " " | "Spacebar" => "space".to_owned(),
        "ArrowUp" => "up".to_owned(),
        "ArrowDown" => "down".to_owned(),
        "ArrowLeft" => "left".to_owned(),
        "ArrowRight" => "right".to_owned(),
        "Enter" => "return".to_owned(),
        "Escape" => "escape".to_owned(),
        other => other.to_lowercase(),
    }
}

// ---------------------------------------------------------------------------
// Keyboard
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct KeyboardState {
    presses: VecDeque<String>,
    held: BTreeSet<String>,
}

/// Shared per-frame keyboard buffer. Clones share state.
///
/// Presses queue in arrival order until a system drains them or the frame
/// ends; the held set tracks keys between their press and release. Repeat
/// (`Held`) events keep a key down without queuing another press.
#[derive(Debug, Clone, Default)]
pub struct Keyboard {
    state: Rc<RefCell<KeyboardState>>,
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to press and release events on `bus`. Keep the returned
    /// tokens to [`detach`](Self::detach) later.
    pub fn attach(&self, bus: &mut EventBus<KeyEvent>) -> Vec<Subscription<KeyState>> {
        [KeyState::Pressed, KeyState::Released, KeyState::Held]
            .into_iter()
            .map(|kind| {
                let keyboard = self.clone();
                bus.subscribe(kind, move |e| {
                    keyboard.record(e);
                    Ok(())
                })
            })
            .collect()
    }

    /// Remove the listeners installed by [`attach`](Self::attach).
    pub fn detach(bus: &mut EventBus<KeyEvent>, tokens: Vec<Subscription<KeyState>>) {
        for token in tokens {
            bus.unsubscribe(token);
        }
    }

    /// Apply one event directly.
    pub fn record(&self, event: &KeyEvent) {
        let mut state = self.state.borrow_mut();
        match event.state {
            KeyState::Pressed => {
                state.presses.push_back(event.key.clone());
                state.held.insert(event.key.clone());
            }
            KeyState::Released => {
                state.held.remove(&event.key);
            }
            KeyState::Held => {
                state.held.insert(event.key.clone());
            }
        }
    }

    /// Take all queued presses, oldest first.
    pub fn drain_presses(&self) -> Vec<String> {
        self.state.borrow_mut().presses.drain(..).collect()
    }

    /// Presses queued and not yet drained.
    pub fn pending_presses(&self) -> usize {
        self.state.borrow().presses.len()
    }

    /// Drop presses nobody drained. Held keys are kept. Returns how many
    /// were dropped.
    pub fn discard_presses(&self) -> usize {
        let mut state = self.state.borrow_mut();
        let dropped = state.presses.len();
        state.presses.clear();
        dropped
    }

    /// Whether `key` (normalized name) is currently down.
    pub fn is_down(&self, key: &str) -> bool {
        self.state.borrow().held.contains(key)
    }

    /// Whether any of `keys` is down.
    pub fn any_down(&self, keys: &[&str]) -> bool {
        let state = self.state.borrow();
        keys.iter().any(|k| state.held.contains(*k))
    }

    /// Forget every press and held key.
    pub fn clear(&self) {
        let mut state = self.state.borrow_mut();
        state.presses.clear();
        state.held.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization() {
        assert_eq!(normalize_key(" "), "space");
        assert_eq!(normalize_key("ArrowLeft"), "left");
        assert_eq!(normalize_key("Enter"), "return");
        assert_eq!(normalize_key("Escape"), "escape");
        assert_eq!(normalize_key("W"), "w");
        assert_eq!(normalize_key("3"), "3");
    }

    #[test]
    fn digits_and_matching() {
        let e = KeyEvent::pressed("4", "Digit4");
        assert_eq!(e.digit(), Some(4));
        assert!(e.is_key("Digit4"));
        assert_eq!(KeyEvent::pressed("ArrowUp", "ArrowUp").digit(), None);
        assert!(KeyEvent::pressed("A", "KeyA").is_key("a"));
    }

    #[test]
    fn keyboard_tracks_presses_and_holds_through_bus() {
        let mut bus = EventBus::<KeyEvent>::new();
        let kb = Keyboard::new();
        let tokens = kb.attach(&mut bus);

        bus.emit(KeyEvent::pressed(" ", "Space"));
        bus.emit(KeyEvent::pressed("d", "KeyD"));
        bus.process_events();
        assert_eq!(kb.drain_presses(), vec!["space", "d"]);
        assert!(kb.drain_presses().is_empty());
        assert!(kb.is_down("d"));

        bus.emit(KeyEvent::released("d", "KeyD"));
        bus.process_events();
        assert!(!kb.any_down(&["d", "right"]));

        Keyboard::detach(&mut bus, tokens);
        assert!(!bus.has_listeners(KeyState::Pressed));
        assert!(!bus.has_listeners(KeyState::Held));
    }

    #[test]
    fn repeats_hold_without_queuing_presses() {
        let mut bus = EventBus::<KeyEvent>::new();
        let kb = Keyboard::new();
        let _tokens = kb.attach(&mut bus);

        bus.emit(KeyEvent::held("ArrowRight", "ArrowRight"));
        bus.emit(KeyEvent::held("ArrowRight", "ArrowRight"));
        bus.process_events();
        assert!(kb.is_down("right"));
        assert_eq!(kb.pending_presses(), 0);
    }

    #[test]
    fn discarding_presses_keeps_held_keys() {
        let kb = Keyboard::new();
        kb.record(&KeyEvent::pressed("a", "KeyA"));
        kb.record(&KeyEvent::pressed("b", "KeyB"));
        assert_eq!(kb.pending_presses(), 2);
        assert_eq!(kb.discard_presses(), 2);
        assert_eq!(kb.pending_presses(), 0);
        assert!(kb.is_down("a") && kb.is_down("b"));
    }
}
