use crate::coords::Rect;

/// Content change reported by the editor since the last poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentChange {
    pub chars: usize,
}

/// The text editing surface the glass sits over.
pub trait HostEditor {
    /// Lays the editor out inside `bounds` (viewport pixels).
    fn layout(&mut self, bounds: Rect);
    /// Current caret line in viewport pixels, if the editor has focus.
    fn cursor_rect(&self) -> Option<Rect>;
    fn insert(&mut self, text: &str);
    fn delete_backward(&mut self);
    /// Drains pending change notifications.
    fn take_changes(&mut self) -> Vec<ContentChange>;
}
