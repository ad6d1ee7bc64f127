//! Deadline-ordered queue of pending note-offs.
//!
//! A min-heap keyed by `(deadline, sequence)`. The sequence number is assigned
//! at insertion so note-offs sharing a deadline fire in the order they were
//! scheduled.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

use crate::io::midi::Note;

/// A note-off waiting for its deadline
#[derive(Debug, Clone, Copy)]
pub struct ScheduledEvent {
    pub deadline: Instant,
    pub sequence: u64,
    pub note: Note,
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.sequence == other.sequence
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// BinaryHeap is a max-heap; the earliest (deadline, sequence) must compare greatest
impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

#[derive(Debug, Default)]
pub struct NoteOffQueue {
    heap: BinaryHeap<ScheduledEvent>,
    next_sequence: u64,
}

impl NoteOffQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a note-off. Returns true when it became the earliest entry.
    pub fn schedule(&mut self, note: Note, deadline: Instant) -> bool {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let earliest = self.peek_deadline().map_or(true, |d| deadline < d);
        self.heap.push(ScheduledEvent {
            deadline,
            sequence,
            note,
        });
        earliest
    }

    pub fn peek_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|event| event.deadline)
    }

    /// Pop the earliest entry if it is due at `now`
    pub fn pop_due(&mut self, now: Instant) -> Option<ScheduledEvent> {
        if self.peek_deadline()? <= now {
            self.heap.pop()
        } else {
            None
        }
    }

    /// Remove everything, earliest first
    pub fn drain_ordered(&mut self) -> Vec<ScheduledEvent> {
        let mut drained = Vec::with_capacity(self.heap.len());
        while let Some(event) = self.heap.pop() {
            drained.push(event);
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn note(pitch: u8) -> Note {
        Note::new(1, pitch, 100)
    }

    #[test]
    fn test_earliest_deadline_first() {
        let base = Instant::now();
        let mut queue = NoteOffQueue::new();
        queue.schedule(note(60), base + Duration::from_millis(100));
        queue.schedule(note(62), base + Duration::from_millis(50));
        queue.schedule(note(64), base + Duration::from_millis(75));

        let order: Vec<u8> = queue
            .drain_ordered()
            .iter()
            .map(|event| event.note.pitch)
            .collect();
        assert_eq!(order, vec![62, 64, 60]);
    }

    #[test]
    fn test_equal_deadlines_are_fifo() {
        let deadline = Instant::now() + Duration::from_millis(10);
        let mut queue = NoteOffQueue::new();
        for pitch in 60..70 {
            queue.schedule(note(pitch), deadline);
        }

        let order: Vec<u8> = queue
            .drain_ordered()
            .iter()
            .map(|event| event.note.pitch)
            .collect();
        assert_eq!(order, (60..70).collect::<Vec<_>>());
    }

    #[test]
    fn test_pop_due_respects_now() {
        let base = Instant::now();
        let mut queue = NoteOffQueue::new();
        queue.schedule(note(60), base + Duration::from_millis(10));
        queue.schedule(note(61), base + Duration::from_millis(20));

        assert!(queue.pop_due(base).is_none());
        assert_eq!(
            queue.pop_due(base + Duration::from_millis(15)).unwrap().note.pitch,
            60
        );
        assert!(queue.pop_due(base + Duration::from_millis(15)).is_none());
        assert_eq!(
            queue.pop_due(base + Duration::from_millis(20)).unwrap().note.pitch,
            61
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_schedule_reports_new_earliest() {
        let base = Instant::now();
        let mut queue = NoteOffQueue::new();
        assert!(queue.schedule(note(60), base + Duration::from_millis(100)));
        assert!(!queue.schedule(note(61), base + Duration::from_millis(200)));
        assert!(!queue.schedule(note(62), base + Duration::from_millis(100)));
        assert!(queue.schedule(note(63), base + Duration::from_millis(50)));
        assert_eq!(queue.len(), 4);
    }
}
