use tracing::debug;

use crate::{
    chord,
    error::{BridgeError, BridgeResult},
    keys::{GestureMap, Key, KeyChord, Modifiers},
};

pub const DEFAULT_PROMPT: &str = "> ";

fn chord_text(chord: &KeyChord) -> String {
    if chord.modifiers.is_empty() {
        chord.key.to_string()
    } else {
        format!("{}+{}", chord.modifiers, chord.key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Echo committed lines to stdout, after `prompt`.
    pub echo: bool,
    pub prompt: String,
    pub commit_key: KeyChord,
    pub continuation: Modifiers,
    pub submit_key: Option<KeyChord>,
    pub max_line_bytes: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            echo: false,
            prompt: DEFAULT_PROMPT.to_string(),
            commit_key: KeyChord::plain(Key::Enter),
            continuation: Modifiers::SHIFT,
            submit_key: Some(KeyChord::new(
                Key::Enter,
                Modifiers {
                    ctrl: true,
                    ..Modifiers::NONE
                },
            )),
            max_line_bytes: None,
        }
    }
}

impl SessionConfig {
    /// The commit chord may not hold a continuation modifier, otherwise every
    /// commit would be read as a continuation.
    pub fn validate(&self) -> BridgeResult<()> {
        if self.commit_key.modifiers.intersects(&self.continuation) {
            return Err(BridgeError::InvalidChord {
                input: chord_text(&self.commit_key),
                reason: format!("shares a modifier with continuation '{}'", self.continuation),
            });
        }
        Ok(())
    }

    pub fn gestures(&self) -> BridgeResult<GestureMap> {
        self.validate()?;
        Ok(GestureMap {
            commit: self.commit_key,
            continuation: self.continuation,
        })
    }

    pub fn set_commit_key(&mut self, chord: &str) -> BridgeResult<()> {
        self.commit_key = chord::parse(chord)?;
        Ok(())
    }

    pub fn set_continuation(&mut self, modifiers: &str) -> BridgeResult<()> {
        self.continuation = chord::parse_modifiers(modifiers)?;
        Ok(())
    }

    /// `none` or an empty string disables the submit chord.
    pub fn set_submit_key(&mut self, chord: &str) -> BridgeResult<()> {
        let trimmed = chord.trim();
        self.submit_key = if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
            None
        } else {
            Some(chord::parse(trimmed)?)
        };
        Ok(())
    }

    /// Applies `LINEBRIDGE_*` settings found through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> BridgeResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("LINEBRIDGE_ECHO") {
            self.echo = matches!(v.trim(), "1" | "true" | "yes" | "on");
        }
        if let Some(v) = lookup("LINEBRIDGE_PROMPT") {
            self.prompt = v;
        }
        if let Some(v) = lookup("LINEBRIDGE_COMMIT_KEY") {
            self.set_commit_key(&v)?;
        }
        if let Some(v) = lookup("LINEBRIDGE_CONTINUATION") {
            self.set_continuation(&v)?;
        }
        if let Some(v) = lookup("LINEBRIDGE_SUBMIT_KEY") {
            self.set_submit_key(&v)?;
        }
        if let Some(v) = lookup("LINEBRIDGE_MAX_LINE_BYTES") {
            self.max_line_bytes = v.trim().parse().ok().filter(|n| *n > 0);
        }

        self.validate()?;
        debug!(config = ?self, "session config");
        Ok(())
    }

    pub fn from_env() -> BridgeResult<Self> {
        let mut config = SessionConfig::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults() {
        let config = SessionConfig::default();
        assert!(!config.echo);
        assert_eq!(config.prompt, "> ");
        assert_eq!(config.gestures().ok(), Some(GestureMap::default()));
        assert_eq!(config.max_line_bytes, None);
    }

    #[test]
    fn env_overrides() {
        let vars = env(&[
            ("LINEBRIDGE_ECHO", "yes"),
            ("LINEBRIDGE_COMMIT_KEY", "Alt+Enter"),
            ("LINEBRIDGE_CONTINUATION", "none"),
            ("LINEBRIDGE_SUBMIT_KEY", "none"),
            ("LINEBRIDGE_MAX_LINE_BYTES", "1024"),
        ]);

        let mut config = SessionConfig::default();
        config.apply_env(|k| vars.get(k).cloned()).ok();

        assert!(config.echo);
        assert_eq!(
            config.commit_key,
            KeyChord::new(
                Key::Enter,
                Modifiers {
                    alt: true,
                    ..Modifiers::NONE
                }
            )
        );
        assert_eq!(config.continuation, Modifiers::NONE);
        assert_eq!(config.submit_key, None);
        assert_eq!(config.max_line_bytes, Some(1024));
    }

    #[test]
    fn commit_chord_may_not_hold_continuation_modifier() {
        let mut config = SessionConfig::default();
        assert!(config.set_commit_key("Shift+Enter").is_ok());

        match config.gestures() {
            Err(BridgeError::InvalidChord { input, reason }) => {
                assert_eq!(input, "Shift+Enter");
                assert!(reason.contains("Shift"), "{}", reason);
            }
            other => panic!("expected chord error, got {:?}", other),
        }

        config.set_continuation("Alt").ok();
        assert!(config.gestures().is_ok());
    }

    #[test]
    fn env_rejects_overlapping_gestures() {
        let vars = env(&[
            ("LINEBRIDGE_COMMIT_KEY", "Alt+Enter"),
            ("LINEBRIDGE_CONTINUATION", "Alt"),
        ]);
        let mut config = SessionConfig::default();
        let err = config.apply_env(|k| vars.get(k).cloned());
        assert!(matches!(err, Err(BridgeError::InvalidChord { .. })));
    }

    #[test]
    fn bad_chord_is_reported() {
        let vars = env(&[("LINEBRIDGE_COMMIT_KEY", "Shift+")]);
        let mut config = SessionConfig::default();
        let err = config.apply_env(|k| vars.get(k).cloned());
        assert!(matches!(err, Err(BridgeError::InvalidChord { .. })));
    }
}
