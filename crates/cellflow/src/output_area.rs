//! Output sink for a single code cell.

use serde_json::Value;

/// How a long output area is displayed. Only non-`Auto` states persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScrollState {
    #[default]
    Auto,
    Scrolled,
    Unscrolled,
}

impl ScrollState {
    /// Persisted form: `None` for auto, `Some(bool)` otherwise.
    pub fn to_metadata(self) -> Option<bool> {
        match self {
            ScrollState::Auto => None,
            ScrollState::Scrolled => Some(true),
            ScrollState::Unscrolled => Some(false),
        }
    }

    pub fn from_metadata(value: Option<bool>) -> Self {
        match value {
            None => ScrollState::Auto,
            Some(true) => ScrollState::Scrolled,
            Some(false) => ScrollState::Unscrolled,
        }
    }
}

/// Ordered output records of a code cell plus its display flags.
///
/// Output records are nbformat output objects kept as raw JSON; rendering is
/// someone else's job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputArea {
    outputs: Vec<Value>,
    pub trusted: bool,
    pub collapsed: bool,
    pub scroll_state: ScrollState,
    /// A `clear_output(wait=true)` arrived; clear before the next append.
    clear_queued: bool,
}

impl OutputArea {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outputs(&self) -> &[Value] {
        &self.outputs
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Clear now, or with `wait` defer the clear until the next output lands.
    pub fn clear(&mut self, wait: bool) {
        if wait {
            self.clear_queued = true;
        } else {
            self.outputs.clear();
            self.clear_queued = false;
        }
    }

    pub fn is_clear_queued(&self) -> bool {
        self.clear_queued
    }

    pub fn append(&mut self, output: Value) {
        if self.clear_queued {
            self.outputs.clear();
            self.clear_queued = false;
        }
        self.outputs.push(output);
    }

    /// Replace all outputs, as when restoring from a saved record.
    pub fn restore(&mut self, outputs: Vec<Value>) {
        self.outputs = outputs;
        self.clear_queued = false;
    }

    pub fn collapse(&mut self) {
        self.collapsed = true;
    }

    pub fn expand(&mut self) {
        self.collapsed = false;
    }

    pub fn toggle_collapsed(&mut self) {
        self.collapsed = !self.collapsed;
    }

    pub fn toggle_scroll(&mut self) {
        self.scroll_state = match self.scroll_state {
            ScrollState::Scrolled => ScrollState::Unscrolled,
            ScrollState::Auto | ScrollState::Unscrolled => ScrollState::Scrolled,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stream(text: &str) -> Value {
        json!({"output_type": "stream", "name": "stdout", "text": text})
    }

    #[test]
    fn test_append_preserves_order() {
        let mut area = OutputArea::new();
        area.append(stream("a"));
        area.append(stream("b"));

        assert_eq!(area.len(), 2);
        assert_eq!(area.outputs()[0]["text"], "a");
        assert_eq!(area.outputs()[1]["text"], "b");
    }

    #[test]
    fn test_clear_immediately() {
        let mut area = OutputArea::new();
        area.append(stream("a"));
        area.clear(false);
        assert!(area.is_empty());
    }

    #[test]
    fn test_clear_wait_defers_until_next_output() {
        let mut area = OutputArea::new();
        area.append(stream("old"));

        area.clear(true);
        assert_eq!(area.len(), 1);
        assert!(area.is_clear_queued());

        area.append(stream("new"));
        assert_eq!(area.len(), 1);
        assert_eq!(area.outputs()[0]["text"], "new");
        assert!(!area.is_clear_queued());
    }

    #[test]
    fn test_scroll_state_metadata() {
        assert_eq!(ScrollState::Auto.to_metadata(), None);
        assert_eq!(ScrollState::Scrolled.to_metadata(), Some(true));
        assert_eq!(ScrollState::Unscrolled.to_metadata(), Some(false));
        assert_eq!(ScrollState::from_metadata(None), ScrollState::Auto);
        assert_eq!(ScrollState::from_metadata(Some(false)), ScrollState::Unscrolled);
    }

    #[test]
    fn test_toggle_scroll_cycles_explicit_states() {
        let mut area = OutputArea::new();
        area.toggle_scroll();
        assert_eq!(area.scroll_state, ScrollState::Scrolled);
        area.toggle_scroll();
        assert_eq!(area.scroll_state, ScrollState::Unscrolled);
    }

    #[test]
    fn test_collapse_and_expand() {
        let mut area = OutputArea::new();
        area.collapse();
        assert!(area.collapsed);
        area.toggle_collapsed();
        assert!(!area.collapsed);
        area.collapse();
        area.expand();
        assert!(!area.collapsed);
    }
}
