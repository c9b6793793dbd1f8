//! In-session chat transcript.

use crate::models::ChatTurn;

/// Ordered, append-only history of chat turns for one session.
///
/// Turns are only ever added at the end; the whole history can be cleared
/// with [`reset`](Transcript::reset) when the active document changes.
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    turns: Vec<ChatTurn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: ChatTurn) {
        self.turns.push(turn);
    }

    /// Full history in chronological order.
    pub fn all(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn reset(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
