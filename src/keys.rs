use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Enter,
    Tab,
    Backspace,
    Escape,
    Space,
    Char(char),
    Other,
}

impl Key {
    /// Maps a DOM `KeyboardEvent.key` value.
    pub fn from_dom(key: &str) -> Self {
        match key {
            "Enter" => Key::Enter,
            "Tab" => Key::Tab,
            "Backspace" => Key::Backspace,
            "Escape" | "Esc" => Key::Escape,
            " " => Key::Space,
            _ => {
                let mut chars = key.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Key::Char(c),
                    _ => Key::Other,
                }
            }
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Key::Enter => write!(f, "Enter"),
            Key::Tab => write!(f, "Tab"),
            Key::Backspace => write!(f, "Backspace"),
            Key::Escape => write!(f, "Escape"),
            Key::Space => write!(f, "Space"),
            Key::Char(c) => write!(f, "{}", c),
            Key::Other => write!(f, "?"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        shift: false,
        ctrl: false,
        alt: false,
        meta: false,
    };

    pub const SHIFT: Modifiers = Modifiers {
        shift: true,
        ..Modifiers::NONE
    };

    pub fn is_empty(&self) -> bool {
        *self == Modifiers::NONE
    }

    pub fn intersects(&self, other: &Modifiers) -> bool {
        (self.shift && other.shift)
            || (self.ctrl && other.ctrl)
            || (self.alt && other.alt)
            || (self.meta && other.meta)
    }

    pub fn union(self, other: Modifiers) -> Modifiers {
        Modifiers {
            shift: self.shift || other.shift,
            ctrl: self.ctrl || other.ctrl,
            alt: self.alt || other.alt,
            meta: self.meta || other.meta,
        }
    }
}

impl fmt::Display for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let names = [
            (self.ctrl, "Ctrl"),
            (self.alt, "Alt"),
            (self.shift, "Shift"),
            (self.meta, "Meta"),
        ];

        let held: Vec<_> = names
            .iter()
            .filter(|(on, _)| *on)
            .map(|(_, name)| *name)
            .collect();
        write!(f, "{}", held.join("+"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyEvent {
    pub key: Key,
    pub modifiers: Modifiers,
}

impl KeyEvent {
    pub fn new(key: Key, modifiers: Modifiers) -> Self {
        KeyEvent { key, modifiers }
    }

    pub fn plain(key: Key) -> Self {
        KeyEvent::new(key, Modifiers::NONE)
    }
}

/// A key plus the exact set of modifiers that must be held with it.
pub type KeyChord = KeyEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    /// Finish the current line.
    Commit,
    /// The commit key held with a continuation modifier; the line goes on.
    Continue,
    /// Anything else; left to the widget.
    Edit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GestureMap {
    pub commit: KeyChord,
    pub continuation: Modifiers,
}

impl Default for GestureMap {
    fn default() -> Self {
        GestureMap {
            commit: KeyChord::plain(Key::Enter),
            continuation: Modifiers::SHIFT,
        }
    }
}

impl GestureMap {
    pub fn classify(&self, event: &KeyEvent) -> Gesture {
        if event.key != self.commit.key {
            return Gesture::Edit;
        }

        if event.modifiers.intersects(&self.continuation) {
            Gesture::Continue
        } else if event.modifiers == self.commit.modifiers {
            Gesture::Commit
        } else {
            Gesture::Edit
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dom_keys() {
        assert_eq!(Key::from_dom("Enter"), Key::Enter);
        assert_eq!(Key::from_dom("a"), Key::Char('a'));
        assert_eq!(Key::from_dom("é"), Key::Char('é'));
        assert_eq!(Key::from_dom(" "), Key::Space);
        assert_eq!(Key::from_dom("ArrowLeft"), Key::Other);
    }

    #[test]
    fn enter_commits_and_shift_enter_continues() {
        let map = GestureMap::default();
        let shift = Modifiers::SHIFT;
        let ctrl = Modifiers {
            ctrl: true,
            ..Modifiers::NONE
        };

        assert_eq!(map.classify(&KeyEvent::plain(Key::Enter)), Gesture::Commit);
        assert_eq!(map.classify(&KeyEvent::new(Key::Enter, shift)), Gesture::Continue);
        assert_eq!(map.classify(&KeyEvent::new(Key::Enter, ctrl)), Gesture::Edit);
        assert_eq!(map.classify(&KeyEvent::plain(Key::Char('x'))), Gesture::Edit);
    }

    #[test]
    fn modifier_display() {
        let m = Modifiers {
            ctrl: true,
            shift: true,
            ..Modifiers::NONE
        };
        assert_eq!(m.to_string(), "Ctrl+Shift");
        assert_eq!(Modifiers::NONE.to_string(), "");
    }
}
