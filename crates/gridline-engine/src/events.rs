//! Raw input events and input-pipeline capability negotiation.
//!
//! The engine does not sniff user agents. It observes what the input pipeline
//! actually delivers (does `beforeinput` report accurate ranges? does
//! composition fire duplicate commits?) and records that in an
//! [`InputProfile`] consulted at decision points: one strategy selected per
//! session from evidence, instead of platform string checks at every call
//! site.

use std::ops::Range;

/// A key as the interceptor classifies it. `Other` covers everything the
/// engine never needs to distinguish (modifier-only combinations, function
/// keys, and so on).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Backspace,
    Delete,
    Tab,
    Enter,
    ArrowLeft,
    ArrowRight,
    ArrowUp,
    ArrowDown,
    Home,
    End,
    PageUp,
    PageDown,
    Other,
}

impl Key {
    /// Keys that genuinely move the caret. These invalidate the caret cache:
    /// trusting cached cell context after a real navigation is how stale
    /// boundary decisions happen.
    pub fn is_navigation(&self) -> bool {
        matches!(
            self,
            Key::ArrowLeft
                | Key::ArrowRight
                | Key::ArrowUp
                | Key::ArrowDown
                | Key::Home
                | Key::End
                | Key::PageUp
                | Key::PageDown
        )
    }

    pub fn is_destructive(&self) -> bool {
        matches!(self, Key::Backspace | Key::Delete)
    }

    pub fn printable(&self) -> Option<char> {
        match self {
            Key::Char(c) if !c.is_control() => Some(*c),
            _ => None,
        }
    }
}

/// A raw key event, pre-classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInput {
    pub key: Key,
    pub shift: bool,
    pub ctrl_or_meta: bool,
}

impl KeyInput {
    pub fn plain(key: Key) -> Self {
        Self {
            key,
            shift: false,
            ctrl_or_meta: false,
        }
    }

    pub fn shifted(key: Key) -> Self {
        Self {
            key,
            shift: true,
            ctrl_or_meta: false,
        }
    }

    pub fn ch(c: char) -> Self {
        Self::plain(Key::Char(c))
    }
}

/// Everything the host's notification hooks can hand the engine.
///
/// `BeforeChange` is the structured "the pipeline is about to replace this
/// char range of this line with this text" notification, the one channel
/// through which native edits (autocorrect, predictive text, some paste
/// paths) arrive with usable coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    KeyDown(KeyInput),
    BeforeChange {
        line: usize,
        range: Range<usize>,
        text: String,
    },
    CompositionStart,
    CompositionUpdate { text: String },
    CompositionEnd { committed: String },
    Paste { text: String },
    Cut,
    Drop { text: String },
    /// Pointer press that placed the caret at a position.
    PointerDown { line: usize, ch: usize },
}

/// Observed input-pipeline capabilities, built up over a session.
#[derive(Debug, Clone, Default)]
pub struct InputProfile {
    before_change_events: u32,
    misreported_before_change: u32,
    composition_commits: u32,
    duplicate_commits: u32,
    last_commit: Option<String>,
}

impl InputProfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a structured before-change whose coordinates checked out (or
    /// not) against the model.
    pub fn observe_before_change(&mut self, accurate: bool) {
        self.before_change_events += 1;
        if !accurate {
            self.misreported_before_change += 1;
        }
    }

    /// Record a composition commit; back-to-back identical commits are the
    /// duplicate-commit signature some pipelines produce.
    pub fn observe_composition_commit(&mut self, committed: &str) {
        self.composition_commits += 1;
        if self.last_commit.as_deref() == Some(committed) {
            self.duplicate_commits += 1;
        }
        self.last_commit = Some(committed.to_string());
    }

    /// Composition is over; the next commit is not a duplicate of this one.
    pub fn composition_settled(&mut self) {
        self.last_commit = None;
    }

    /// Whether structured before-change coordinates can be trusted for
    /// direct scoped mutations. Optimistic until evidence says otherwise.
    pub fn reliable_before_change(&self) -> bool {
        self.misreported_before_change == 0
    }

    /// Whether this pipeline has produced duplicated composition commits.
    pub fn duplicate_composition_commits(&self) -> bool {
        self.duplicate_commits > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_keys() {
        assert!(Key::ArrowLeft.is_navigation());
        assert!(Key::Home.is_navigation());
        assert!(!Key::Tab.is_navigation());
        assert!(!Key::Char('a').is_navigation());
    }

    #[test]
    fn test_printable_excludes_control_chars() {
        assert_eq!(Key::Char('x').printable(), Some('x'));
        assert_eq!(Key::Char('\u{0008}').printable(), None);
        assert_eq!(Key::Backspace.printable(), None);
    }

    #[test]
    fn test_profile_starts_optimistic() {
        let profile = InputProfile::new();
        assert!(profile.reliable_before_change());
        assert!(!profile.duplicate_composition_commits());
    }

    #[test]
    fn test_profile_latches_unreliable_before_change() {
        let mut profile = InputProfile::new();
        profile.observe_before_change(true);
        profile.observe_before_change(false);
        profile.observe_before_change(true);
        assert!(!profile.reliable_before_change());
    }

    #[test]
    fn test_profile_detects_duplicate_commits() {
        let mut profile = InputProfile::new();
        profile.observe_composition_commit("か");
        profile.observe_composition_commit("か");
        assert!(profile.duplicate_composition_commits());
    }

    #[test]
    fn test_settled_composition_resets_duplicate_window() {
        let mut profile = InputProfile::new();
        profile.observe_composition_commit("か");
        profile.composition_settled();
        profile.observe_composition_commit("か");
        assert!(!profile.duplicate_composition_commits());
    }
}
