use std::cell::Cell;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Bot,
    Error,
    Pending,
}

/// Opaque handle returned by [`Transcript::append`], used to remove an entry later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u64);

#[derive(Debug, Clone)]
pub struct ConversationEntry {
    pub id: EntryId,
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Append-only log of conversation entries. Only pending entries are ever removed.
#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<ConversationEntry>,
    next_id: u64,
    // Lines scrolled back from the newest entry; 0 pins the view to the bottom
    scroll_offset: usize,
    // Upper bound for scroll_offset, published by the renderer each frame
    max_scroll: Cell<usize>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry at the end and snap the view to the bottom.
    pub fn append(&mut self, role: Role, text: impl Into<String>) -> EntryId {
        self.next_id += 1;
        let id = EntryId(self.next_id);
        self.entries.push(ConversationEntry {
            id,
            role,
            text: text.into(),
            timestamp: Utc::now(),
        });
        self.scroll_offset = 0;
        id
    }

    /// Remove the entry behind `id`. Returns false when it is already gone.
    pub fn remove(&mut self, id: EntryId) -> bool {
        match self.entries.iter().position(|entry| entry.id == id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.role == Role::Pending)
            .count()
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    pub fn set_max_scroll(&self, max: usize) {
        self.max_scroll.set(max);
    }

    pub fn scroll_up(&mut self, step: usize) {
        self.scroll_offset = (self.scroll_offset + step).min(self.max_scroll.get());
    }

    pub fn scroll_down(&mut self, step: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(step);
    }
}
