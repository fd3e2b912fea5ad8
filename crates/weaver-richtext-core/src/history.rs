//! Step-based undo/redo over mutation records.
//!
//! Records arrive from the mutation bus. User-origin records are appended to
//! the pending step; closing a step moves it onto the history list, truncating
//! anything after the cursor. Undo and redo replay records through the tree
//! primitives with [`Origin::Replay`], so replay itself is never recorded.
//!
//! While paused, user mutations are kept in a transient log instead, which
//! [`History::revert_current_step`] inverts without touching the list.

use smol_str::SmolStr;

use crate::config::EditorConfig;
use crate::error::{EditorError, Result};
use crate::mutation::{MutationRecord, Origin, QueuedMutation};
use crate::selection::Selection;
use crate::tree::Document;

const CLASS_ATTR: &str = "class";

/// One atomic, undoable batch of records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Step {
    pub id: u64,
    pub records: Vec<MutationRecord>,
    pub pre_selection: Option<Selection>,
    pub post_selection: Option<Selection>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum HistoryState {
    /// No open step.
    #[default]
    Idle,
    /// A pending step is collecting records.
    Recording,
    /// Mutations go to the transient revert log.
    Paused,
}

#[derive(Debug)]
pub struct History {
    steps: Vec<Step>,
    cursor: usize,
    next_step_id: u64,
    state: HistoryState,
    pending: Option<Step>,
    /// Pre-selection for the next step, taken when an edit begins.
    armed: Option<Option<Selection>>,
    paused_log: Vec<MutationRecord>,
    max_steps: usize,
    rendering_only_classes: Vec<SmolStr>,
}

impl History {
    pub fn new(config: &EditorConfig) -> Self {
        Self {
            steps: Vec::new(),
            cursor: 0,
            next_step_id: 1,
            state: HistoryState::Idle,
            pending: None,
            armed: None,
            paused_log: Vec::new(),
            max_steps: config.max_history_steps,
            rendering_only_classes: config.rendering_only_classes.clone(),
        }
    }

    // === Inspection ===

    pub fn state(&self) -> HistoryState {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        self.state == HistoryState::Paused
    }

    /// Closed steps, oldest first.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.steps.len()
    }

    /// A step holding at least one record is open.
    pub fn has_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|s| !s.records.is_empty())
    }

    pub fn pending(&self) -> Option<&Step> {
        self.pending.as_ref()
    }

    // === Recording ===

    /// Remember the selection from before an edit, for the step it may open.
    pub fn begin(&mut self, pre_selection: Option<Selection>) {
        if self.pending.is_none() && self.armed.is_none() {
            self.armed = Some(pre_selection);
        }
    }

    /// Feed one mutation from the bus.
    pub fn record(&mut self, mutation: &QueuedMutation, live_selection: Option<Selection>) {
        if mutation.origin != Origin::User {
            return;
        }
        if mutation.protected {
            tracing::trace!(
                target: "weaver::history",
                target_node = %mutation.record.target(),
                "dropping mutation under protected node"
            );
            return;
        }
        if self.state == HistoryState::Paused {
            // Unfiltered, so a revert restores rendering-only classes too.
            self.paused_log.push(mutation.record.clone());
            return;
        }
        let Some(record) = self.filter_rendering_only(&mutation.record) else {
            return;
        };

        if self.pending.is_none() {
            let id = self.next_step_id;
            self.next_step_id += 1;
            tracing::debug!(target: "weaver::history", step = id, "opening step");
            self.pending = Some(Step {
                id,
                records: Vec::new(),
                pre_selection: self.armed.take().unwrap_or(live_selection),
                post_selection: None,
            });
        }
        if let Some(pending) = self.pending.as_mut() {
            pending.records.push(record);
        }
        self.state = HistoryState::Recording;
    }

    /// Drop rendering-only classes from a `class` record. `None` when nothing else changed.
    fn filter_rendering_only(&self, record: &MutationRecord) -> Option<MutationRecord> {
        match record {
            MutationRecord::Attributes {
                target,
                name,
                old_value,
                new_value,
            } if name == CLASS_ATTR => {
                let old_value = self.strip_value(old_value.as_deref());
                let new_value = self.strip_value(new_value.as_deref());
                if old_value == new_value {
                    tracing::trace!(
                        target: "weaver::history",
                        target_node = %target,
                        "dropping rendering-only class change"
                    );
                    return None;
                }
                Some(MutationRecord::Attributes {
                    target: *target,
                    name: name.clone(),
                    old_value,
                    new_value,
                })
            }
            other => Some(other.clone()),
        }
    }

    /// A class value without rendering-only classes; empty counts as absent.
    fn strip_value(&self, value: Option<&str>) -> Option<String> {
        value
            .map(|v| self.strip_classes(v))
            .filter(|v| !v.is_empty())
    }

    fn strip_classes(&self, value: &str) -> String {
        value
            .split_ascii_whitespace()
            .filter(|c| !self.is_rendering_only(c))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn rendering_classes_of(&self, value: Option<&str>) -> Vec<String> {
        value
            .unwrap_or_default()
            .split_ascii_whitespace()
            .filter(|c| self.is_rendering_only(c))
            .map(str::to_string)
            .collect()
    }

    fn is_rendering_only(&self, class: &str) -> bool {
        self.rendering_only_classes.iter().any(|c| c == class)
    }

    /// Close the pending step with its post-selection.
    ///
    /// Returns the id of the new step, or `None` if nothing was recorded.
    pub fn commit(&mut self, post_selection: Option<Selection>) -> Option<u64> {
        self.armed = None;
        if self.state == HistoryState::Recording {
            self.state = HistoryState::Idle;
        }
        let mut step = self.pending.take().filter(|s| !s.records.is_empty())?;
        step.post_selection = post_selection;
        let id = step.id;

        if self.cursor < self.steps.len() {
            tracing::debug!(
                target: "weaver::history",
                dropped = self.steps.len() - self.cursor,
                "truncating redo steps"
            );
            self.steps.truncate(self.cursor);
        }
        self.steps.push(step);
        if self.steps.len() > self.max_steps {
            let excess = self.steps.len() - self.max_steps;
            self.steps.drain(..excess);
        }
        self.cursor = self.steps.len();
        tracing::debug!(
            target: "weaver::history",
            step = id,
            len = self.steps.len(),
            "closed step"
        );
        Some(id)
    }

    /// Forget the armed pre-selection of an edit that recorded nothing.
    pub fn disarm(&mut self) {
        if self.pending.is_none() {
            self.armed = None;
        }
    }

    // === Pause / revert ===

    pub fn pause(&mut self) {
        if self.state != HistoryState::Paused {
            tracing::debug!(target: "weaver::history", "history paused");
            self.state = HistoryState::Paused;
            self.paused_log.clear();
        }
    }

    /// Resume recording. Mutations made while paused stay on the tree, unrecorded.
    pub fn resume(&mut self) {
        if self.state == HistoryState::Paused {
            tracing::debug!(
                target: "weaver::history",
                unrecorded = self.paused_log.len(),
                "history resumed"
            );
            self.paused_log.clear();
            self.state = if self.pending.is_some() {
                HistoryState::Recording
            } else {
                HistoryState::Idle
            };
        }
    }

    /// Undo the current step in place.
    ///
    /// While paused, inverts every mutation since the pause; otherwise discards
    /// the pending step. The history list is never touched.
    pub fn revert_current_step(&mut self, doc: &mut Document) -> Result<()> {
        if self.state == HistoryState::Paused {
            let log = std::mem::take(&mut self.paused_log);
            tracing::debug!(
                target: "weaver::history",
                records = log.len(),
                "reverting paused mutations"
            );
            let inverses = log.iter().rev().map(MutationRecord::inverse);
            return self.apply_atomically(doc, inverses, true);
        }
        self.discard_pending(doc)
    }

    /// Roll back and drop the pending step (and anything logged while paused).
    pub fn discard_pending(&mut self, doc: &mut Document) -> Result<()> {
        let paused = std::mem::take(&mut self.paused_log);
        let inverses = paused.iter().rev().map(MutationRecord::inverse);
        self.apply_atomically(doc, inverses, true)?;
        self.armed = None;
        if let Some(step) = self.pending.take() {
            tracing::debug!(
                target: "weaver::history",
                step = step.id,
                records = step.records.len(),
                "discarding pending step"
            );
            if let Err(err) = self.apply_atomically(
                doc,
                step.records.iter().rev().map(MutationRecord::inverse),
                false,
            ) {
                self.pending = Some(step);
                return Err(err);
            }
        }
        if self.state == HistoryState::Recording {
            self.state = HistoryState::Idle;
        }
        Ok(())
    }

    // === Undo / redo ===

    /// Invert the step before the cursor. Returns its pre-selection, or `None`
    /// when there is nothing to undo.
    pub fn undo(&mut self, doc: &mut Document) -> Result<Option<Option<Selection>>> {
        if self.cursor == 0 {
            tracing::debug!(target: "weaver::history", "nothing to undo");
            return Ok(None);
        }
        let step = self.steps[self.cursor - 1].clone();
        self.apply_atomically(
            doc,
            step.records.iter().rev().map(MutationRecord::inverse),
            false,
        )?;
        self.cursor -= 1;
        tracing::debug!(target: "weaver::history", step = step.id, cursor = self.cursor, "undo");
        Ok(Some(step.pre_selection))
    }

    /// Replay the step at the cursor. Returns its post-selection, or `None`
    /// when there is nothing to redo.
    pub fn redo(&mut self, doc: &mut Document) -> Result<Option<Option<Selection>>> {
        let Some(step) = self.steps.get(self.cursor).cloned() else {
            tracing::debug!(target: "weaver::history", "nothing to redo");
            return Ok(None);
        };
        self.apply_atomically(doc, step.records.iter().cloned(), false)?;
        self.cursor += 1;
        tracing::debug!(target: "weaver::history", step = step.id, cursor = self.cursor, "redo");
        Ok(Some(step.post_selection))
    }

    /// Drop every step and any pending state.
    pub fn clear(&mut self) {
        self.steps.clear();
        self.cursor = 0;
        self.pending = None;
        self.armed = None;
        self.paused_log.clear();
        self.state = HistoryState::Idle;
    }

    // === Application ===

    /// Apply records in order; on failure, roll back the ones already applied.
    ///
    /// `exact` records are unfiltered and applied as they are; step records
    /// go through the class merge of [`History::apply_record`].
    fn apply_atomically(
        &self,
        doc: &mut Document,
        records: impl IntoIterator<Item = MutationRecord>,
        exact: bool,
    ) -> Result<()> {
        let apply = |doc: &mut Document, record: &MutationRecord| {
            if exact {
                doc.apply_record(record)
            } else {
                self.apply_record(doc, record)
            }
        };
        doc.replaying(|doc| {
            let mut applied: Vec<MutationRecord> = Vec::new();
            for record in records {
                if let Err(err) = apply(doc, &record) {
                    tracing::error!(
                        target: "weaver::history",
                        error = %err,
                        applied = applied.len(),
                        "replay failed, rolling back"
                    );
                    for done in applied.iter().rev() {
                        if let Err(rollback) = apply(doc, &done.inverse()) {
                            tracing::error!(
                                target: "weaver::history",
                                error = %rollback,
                                "rollback failed"
                            );
                        }
                    }
                    return Err(err);
                }
                applied.push(record);
            }
            Ok(())
        })
    }

    fn apply_record(&self, doc: &mut Document, record: &MutationRecord) -> Result<()> {
        match record {
            MutationRecord::Attributes {
                target,
                name,
                old_value,
                new_value,
            } if name == CLASS_ATTR => {
                // Stored class values exclude rendering-only classes; keep the live ones.
                let current = doc.attribute(*target, CLASS_ATTR).map(str::to_string);
                if !doc.is_element(*target) {
                    return Err(EditorError::NotAnElement(*target));
                }
                let current_stripped = self.strip_value(current.as_deref());
                let expected = self.strip_value(old_value.as_deref());
                if current_stripped != expected {
                    return Err(EditorError::InconsistentMutation(format!(
                        "class of {target} diverged from history"
                    )));
                }
                let live = self.rendering_classes_of(current.as_deref());
                let merged = match new_value {
                    Some(value) => {
                        let mut classes: Vec<&str> = value.split_ascii_whitespace().collect();
                        classes.extend(live.iter().map(String::as_str));
                        Some(classes.join(" "))
                    }
                    None if live.is_empty() => None,
                    None => Some(live.join(" ")),
                };
                match merged {
                    Some(value) => doc.set_attribute(*target, CLASS_ATTR, &value),
                    None => doc.remove_attribute(*target, CLASS_ATTR),
                }
            }
            other => doc.apply_record(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{find_text, parse_doc};
    use crate::tree::markup::inner_html;

    fn pump(history: &mut History, doc: &mut Document) {
        for mutation in doc.take_records() {
            history.record(&mutation, doc.live_selection());
        }
    }

    #[test]
    fn test_undo_redo_text_step() {
        let (mut doc, _) = parse_doc("<p>abc</p>");
        let mut history = History::new(&EditorConfig::default());
        let t = find_text(&doc, "abc");

        doc.insert_text(t, 3, "d").unwrap();
        doc.delete_text(t, 0..1).unwrap();
        pump(&mut history, &mut doc);
        assert_eq!(history.commit(None), Some(1));
        assert_eq!(inner_html(&doc, doc.root()), "<p>bcd</p>");

        history.undo(&mut doc).unwrap();
        assert_eq!(inner_html(&doc, doc.root()), "<p>abc</p>");
        assert!(history.can_redo());

        history.redo(&mut doc).unwrap();
        assert_eq!(inner_html(&doc, doc.root()), "<p>bcd</p>");

        // Replay is never recorded.
        pump(&mut history, &mut doc);
        assert!(!history.has_pending());
    }

    #[test]
    fn test_new_step_truncates_redo() {
        let (mut doc, _) = parse_doc("<p>a</p>");
        let mut history = History::new(&EditorConfig::default());
        let t = find_text(&doc, "a");

        for text in ["b", "c"] {
            doc.set_text(t, text).unwrap();
            pump(&mut history, &mut doc);
            history.commit(None);
        }
        history.undo(&mut doc).unwrap();
        assert_eq!(history.len(), 2);

        doc.set_text(t, "z").unwrap();
        pump(&mut history, &mut doc);
        history.commit(None);
        assert_eq!(history.len(), 2);
        assert!(!history.can_redo());
        assert_eq!(history.steps()[1].id, 3);
    }

    #[test]
    fn test_max_steps() {
        let (mut doc, _) = parse_doc("<p>a</p>");
        let config = EditorConfig {
            max_history_steps: 2,
            ..EditorConfig::default()
        };
        let mut history = History::new(&config);
        let t = find_text(&doc, "a");
        for text in ["b", "c", "d"] {
            doc.set_text(t, text).unwrap();
            pump(&mut history, &mut doc);
            history.commit(None);
        }
        assert_eq!(history.len(), 2);
        assert_eq!(history.cursor(), 2);
        assert_eq!(history.steps()[0].id, 2);
    }

    #[test]
    fn test_rendering_only_class_filtering() {
        let (mut doc, _) = parse_doc("<p class=\"lead\">a</p>");
        let p = doc.first_child(doc.root()).unwrap();
        let mut history = History::new(&EditorConfig::default());

        doc.set_attribute(p, "class", "lead is-hovered").unwrap();
        pump(&mut history, &mut doc);
        assert!(!history.has_pending());

        doc.set_attribute(p, "class", "lead big is-hovered").unwrap();
        pump(&mut history, &mut doc);
        history.commit(None);
        assert_eq!(
            history.steps()[0].records[0],
            MutationRecord::Attributes {
                target: p,
                name: "class".into(),
                old_value: Some("lead".into()),
                new_value: Some("lead big".into()),
            }
        );

        doc.silently(|doc| doc.set_attribute(p, "class", "lead big is-selected"))
            .unwrap();
        history.undo(&mut doc).unwrap();
        assert_eq!(doc.attribute(p, "class"), Some("lead is-selected"));
    }

    #[test]
    fn test_pause_and_revert() {
        let (mut doc, _) = parse_doc("<p class=\"a\">x</p>");
        let p = doc.first_child(doc.root()).unwrap();
        let mut history = History::new(&EditorConfig::default());

        history.pause();
        doc.set_attribute(p, "class", "b").unwrap();
        doc.set_attribute(p, "class", "c").unwrap();
        pump(&mut history, &mut doc);
        assert_eq!(history.state(), HistoryState::Paused);

        history.revert_current_step(&mut doc).unwrap();
        assert_eq!(doc.attribute(p, "class"), Some("a"));
        assert_eq!(history.len(), 0);
        assert!(!history.has_pending());
    }

    #[test]
    fn test_undo_is_atomic() {
        let (mut doc, _) = parse_doc("<p>ab</p><p>!</p>");
        let t = find_text(&doc, "ab");
        let extra = find_text(&doc, "!");
        let mut history = History::new(&EditorConfig::default());

        doc.set_text(t, "abc").unwrap();
        doc.set_text(t, "abcd").unwrap();
        pump(&mut history, &mut doc);
        history.commit(None);

        // The first record is inverted last and no longer matches the tree.
        history.steps[0].records.insert(
            0,
            MutationRecord::CharacterData {
                target: extra,
                old_text: "x".into(),
                new_text: "y".into(),
            },
        );

        let err = history.undo(&mut doc).unwrap_err();
        assert!(matches!(err, EditorError::InconsistentMutation(_)));
        assert_eq!(doc.text(t), Some("abcd"));
        assert_eq!(doc.text(extra), Some("!"));
        assert_eq!(history.cursor(), 1);
    }
}
