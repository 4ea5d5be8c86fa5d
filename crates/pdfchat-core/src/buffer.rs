//! Staging buffer for events awaiting a batch commit
//!
//! Shared between the queue consumer (appends) and the batch committer
//! (drains). A single mutex guards the vector; a drain swaps the whole vector
//! out, so any append racing a drain ends up in exactly one batch.

use parking_lot::Mutex;

use crate::event::QaEvent;

/// In-memory, append-only holding area between batch flushes
#[derive(Debug, Default)]
pub struct StagingBuffer {
    events: Mutex<Vec<QaEvent>>,
}

impl StagingBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event. Never fails; the buffer is unbounded.
    pub fn append(&self, event: QaEvent) {
        self.events.lock().push(event);
    }

    /// Remove and return every held event in insertion order
    pub fn drain_all(&self) -> Vec<QaEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Number of events currently held
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use uuid::Uuid;

    use super::*;

    fn event(n: usize) -> QaEvent {
        QaEvent::new("doc-1", format!("q{}", n), "a", "2024-05-01T10:00:00Z")
    }

    #[test]
    fn test_drain_returns_insertion_order() {
        let buffer = StagingBuffer::new();
        let events: Vec<_> = (0..5).map(event).collect();
        for e in &events {
            buffer.append(e.clone());
        }

        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.drain_all(), events);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_drain_empty() {
        let buffer = StagingBuffer::new();
        assert!(buffer.drain_all().is_empty());
    }

    #[test]
    fn test_appends_after_drain_go_to_next_batch() {
        let buffer = StagingBuffer::new();
        buffer.append(event(1));
        let first = buffer.drain_all();
        buffer.append(event(2));
        let second = buffer.drain_all();

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].question, "q2");
    }

    #[test]
    fn test_concurrent_appends_racing_drain_lose_nothing() {
        const WRITERS: usize = 8;
        const PER_WRITER: usize = 500;

        let buffer = Arc::new(StagingBuffer::new());
        let mut handles = Vec::new();

        for w in 0..WRITERS {
            let buffer = Arc::clone(&buffer);
            handles.push(std::thread::spawn(move || {
                let mut ids = Vec::with_capacity(PER_WRITER);
                for i in 0..PER_WRITER {
                    let e = event(w * PER_WRITER + i);
                    ids.push(e.id);
                    buffer.append(e);
                }
                ids
            }));
        }

        let drainer = {
            let buffer = Arc::clone(&buffer);
            std::thread::spawn(move || {
                let mut drained = Vec::new();
                for _ in 0..50 {
                    drained.extend(buffer.drain_all());
                    std::thread::yield_now();
                }
                drained
            })
        };

        let appended: Vec<Uuid> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let mut seen: Vec<Uuid> = drainer.join().unwrap().into_iter().map(|e| e.id).collect();
        seen.extend(buffer.drain_all().into_iter().map(|e| e.id));

        assert_eq!(seen.len(), WRITERS * PER_WRITER, "no loss, no duplication");
        let seen_set: HashSet<Uuid> = seen.into_iter().collect();
        let appended_set: HashSet<Uuid> = appended.into_iter().collect();
        assert_eq!(seen_set, appended_set);
    }
}
