use renderer::{ContentChange, HostEditor, Rect};

const PADDING: f32 = 16.0;
const CHAR_WIDTH: f32 = 8.4;
const LINE_HEIGHT: f32 = 20.0;
const CARET_WIDTH: f32 = 2.0;

/// Minimal in-memory editor: a monospace text buffer with the caret pinned to
/// the end. Stands in for a real editor widget.
#[derive(Debug, Default)]
pub struct ScratchEditor {
    bounds: Rect,
    text: String,
    changes: Vec<ContentChange>,
}

impl ScratchEditor {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn text(&self) -> &str {
        &self.text
    }
}

impl HostEditor for ScratchEditor {
    fn layout(&mut self, bounds: Rect) {
        self.bounds = bounds;
    }

    fn cursor_rect(&self) -> Option<Rect> {
        if self.bounds.width <= 0.0 || self.bounds.height <= 0.0 {
            return None;
        }
        let row = self.text.matches('\n').count();
        let column = self.text.rsplit('\n').next().map_or(0, |line| line.chars().count());
        let left = (self.bounds.left + PADDING + column as f32 * CHAR_WIDTH)
            .min(self.bounds.right() - CARET_WIDTH);
        let top = (self.bounds.top + PADDING + row as f32 * LINE_HEIGHT)
            .min(self.bounds.bottom() - LINE_HEIGHT);
        Some(Rect::new(
            left.max(self.bounds.left),
            top.max(self.bounds.top),
            CARET_WIDTH,
            LINE_HEIGHT,
        ))
    }

    fn insert(&mut self, text: &str) {
        let normalised = text.replace('\r', "\n");
        let chars = normalised.chars().filter(|c| !c.is_control() || *c == '\n').count();
        if chars == 0 {
            return;
        }
        self.text.extend(normalised.chars().filter(|c| !c.is_control() || *c == '\n'));
        self.changes.push(ContentChange { chars });
    }

    fn delete_backward(&mut self) {
        if self.text.pop().is_some() {
            self.changes.push(ContentChange { chars: 1 });
        }
    }

    fn take_changes(&mut self) -> Vec<ContentChange> {
        std::mem::take(&mut self.changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn editor() -> ScratchEditor {
        let mut editor = ScratchEditor::new();
        editor.layout(Rect::new(0.0, 32.0, 800.0, 600.0));
        editor
    }

    #[test]
    fn insert_reports_typed_characters() {
        let mut editor = editor();
        editor.insert("rain");
        editor.insert("\r");
        assert_eq!(editor.text(), "rain\n");
        assert_eq!(
            editor.take_changes(),
            vec![ContentChange { chars: 4 }, ContentChange { chars: 1 }]
        );
        assert!(editor.take_changes().is_empty());
    }

    #[test]
    fn control_characters_are_ignored() {
        let mut editor = editor();
        editor.insert("\u{8}");
        assert!(editor.take_changes().is_empty());
        assert_eq!(editor.text(), "");
    }

    #[test]
    fn caret_follows_text() {
        let mut editor = editor();
        let start = editor.cursor_rect().expect("caret");
        assert_eq!(start.left, PADDING);
        assert_eq!(start.top, 32.0 + PADDING);

        editor.insert("ab\ncd");
        let caret = editor.cursor_rect().expect("caret");
        assert!((caret.left - (PADDING + 2.0 * CHAR_WIDTH)).abs() < 1e-4);
        assert_eq!(caret.top, 32.0 + PADDING + LINE_HEIGHT);

        editor.delete_backward();
        assert_eq!(editor.text(), "ab\nc");
    }

    #[test]
    fn deletions_count_as_edits() {
        let mut editor = editor();
        editor.delete_backward();
        assert!(editor.take_changes().is_empty());

        editor.insert("drop");
        editor.take_changes();
        editor.delete_backward();
        editor.delete_backward();
        assert_eq!(editor.text(), "dr");
        assert_eq!(
            editor.take_changes(),
            vec![ContentChange { chars: 1 }, ContentChange { chars: 1 }]
        );
    }

    #[test]
    fn unlaid_editor_has_no_caret() {
        assert!(ScratchEditor::new().cursor_rect().is_none());
    }
}
