use std::collections::VecDeque;

use crate::canvas::LayerStack;

/// Default number of undo steps kept.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

// ============================================================================
// SNAPSHOT: full-stack deep copy
// ============================================================================

/// Deep copy of every layer (raster and metadata), the current-layer pointer
/// and the target resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct StackSnapshot {
    stack: LayerStack,
}

impl StackSnapshot {
    pub fn capture(stack: &LayerStack) -> Self {
        Self { stack: stack.clone() }
    }

    pub fn restore_into(&self, stack: &mut LayerStack) {
        stack.clone_from(&self.stack);
    }

    pub fn stack(&self) -> &LayerStack {
        &self.stack
    }

    /// Approximate heap footprint in bytes.
    pub fn memory_size(&self) -> usize {
        self.stack.layers().iter().map(|l| l.raster.as_bytes().len()).sum()
    }
}

struct HistoryEntry {
    description: String,
    snapshot: StackSnapshot,
}

// ============================================================================
// HISTORY MANAGER
// ============================================================================

/// Bounded undo/redo over whole-stack snapshots.
///
/// Callers push the state they want to be able to return to, i.e. a snapshot
/// taken *before* the mutation, once the mutation has completed.
pub struct HistoryManager {
    undo_stack: VecDeque<HistoryEntry>,
    redo_stack: VecDeque<HistoryEntry>,
    max_history_size: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HistoryManager {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_history_size: max_history_size.max(1),
        }
    }

    /// Record `before` as an undo target.  Clears redo.
    pub fn push(&mut self, description: impl Into<String>, before: StackSnapshot) {
        self.redo_stack.clear();
        self.undo_stack.push_back(HistoryEntry {
            description: description.into(),
            snapshot: before,
        });
        self.prune();
    }

    /// Snapshot `stack` as it is now and record it.
    pub fn push_current(&mut self, description: impl Into<String>, stack: &LayerStack) {
        self.push(description, StackSnapshot::capture(stack));
    }

    /// Swap the live stack with the most recent undo snapshot.
    /// Returns the undone step's description, or `None` when there is nothing to undo.
    pub fn undo(&mut self, stack: &mut LayerStack) -> Option<String> {
        let entry = self.undo_stack.pop_back()?;
        self.redo_stack.push_back(HistoryEntry {
            description: entry.description.clone(),
            snapshot: StackSnapshot::capture(stack),
        });
        entry.snapshot.restore_into(stack);
        Some(entry.description)
    }

    pub fn redo(&mut self, stack: &mut LayerStack) -> Option<String> {
        let entry = self.redo_stack.pop_back()?;
        self.undo_stack.push_back(HistoryEntry {
            description: entry.description.clone(),
            snapshot: StackSnapshot::capture(stack),
        });
        entry.snapshot.restore_into(stack);
        self.prune();
        Some(entry.description)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.back().map(|e| e.description.as_str())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.back().map(|e| e.description.as_str())
    }

    /// Most recent first.
    pub fn undo_history(&self) -> Vec<String> {
        self.undo_stack.iter().rev().map(|e| e.description.clone()).collect()
    }

    pub fn memory_usage(&self) -> usize {
        self.undo_stack
            .iter()
            .chain(self.redo_stack.iter())
            .map(|e| e.snapshot.memory_size())
            .sum()
    }

    fn prune(&mut self) {
        while self.undo_stack.len() > self.max_history_size {
            self.undo_stack.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn capacity(&self) -> usize {
        self.max_history_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{ImageRect, INK};
    use crate::settings::Resolution;

    fn stack() -> LayerStack {
        LayerStack::new(Resolution { width: 8, height: 8 })
    }

    #[test]
    fn undo_on_empty_is_noop() {
        let mut h = HistoryManager::default();
        let mut s = stack();
        let before = s.clone();
        assert_eq!(h.undo(&mut s), None);
        assert_eq!(s, before);
    }

    #[test]
    fn redo_after_fresh_push_is_noop() {
        let mut h = HistoryManager::default();
        let mut s = stack();
        h.push_current("a", &s);
        s.create_layer();
        let live = s.clone();
        assert_eq!(h.redo(&mut s), None);
        assert_eq!(s, live);
    }

    #[test]
    fn n_pushes_then_n_undos_restore_initial() {
        for n in 1..6 {
            let mut h = HistoryManager::default();
            let mut s = stack();
            let initial = s.clone();
            for i in 0..n {
                let before = StackSnapshot::capture(&s);
                s.current_mut().raster.fill_rect(ImageRect::from_origin_size(i, 0, 1, 1), INK);
                s.create_layer();
                h.push("edit", before);
            }
            for _ in 0..n {
                assert!(h.undo(&mut s).is_some());
            }
            assert_eq!(s, initial);
        }
    }

    #[test]
    fn undo_then_redo_returns_to_live_state() {
        let mut h = HistoryManager::default();
        let mut s = stack();
        let before = StackSnapshot::capture(&s);
        s.create_layer();
        h.push("new layer", before);
        let after = s.clone();
        h.undo(&mut s);
        assert_eq!(s.len(), 1);
        assert_eq!(h.redo(&mut s).as_deref(), Some("new layer"));
        assert_eq!(s, after);
    }

    #[test]
    fn new_push_clears_redo() {
        let mut h = HistoryManager::default();
        let mut s = stack();
        h.push_current("a", &s);
        h.undo(&mut s);
        assert!(h.can_redo());
        h.push_current("b", &s);
        assert!(!h.can_redo());
    }

    #[test]
    fn capacity_drops_oldest() {
        let mut h = HistoryManager::new(3);
        let s = stack();
        for i in 0..5 {
            h.push_current(format!("step {}", i), &s);
        }
        assert_eq!(h.undo_count(), 3);
        assert_eq!(h.undo_history(), vec!["step 4", "step 3", "step 2"]);
    }
}
