//! Edit ledger for a single editing session
//!
//! Edits are keyed by the bounding box of the run they replace. Submitting a
//! second edit for the same box overwrites the first and moves it to the end.

use serde::{Deserialize, Serialize};

use crate::model::Edit;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EditLedger {
    edits: Vec<Edit>,
}

impl EditLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace by `bbox_key`; returns the number of pending edits.
    pub fn upsert(&mut self, edit: Edit) -> usize {
        self.edits.retain(|e| e.bbox_key != edit.bbox_key);
        self.edits.push(edit);
        self.edits.len()
    }

    pub fn snapshot_ordered(&self) -> Vec<Edit> {
        self.edits.clone()
    }

    pub fn edits(&self) -> &[Edit] {
        &self.edits
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BBox, RunSnapshot};
    use pretty_assertions::assert_eq;

    fn edit_at(x: f64, y: f64, text: &str) -> Edit {
        Edit::new(
            BBox::new(x, y, x + 100.0, y + 14.0).unwrap(),
            text,
            RunSnapshot::default(),
        )
    }

    #[test]
    fn test_ledger_new_is_empty() {
        let ledger = EditLedger::new();
        assert!(ledger.is_empty());
        assert_eq!(ledger.snapshot_ordered().len(), 0);
    }

    #[test]
    fn test_upsert_returns_count() {
        let mut ledger = EditLedger::new();
        assert_eq!(ledger.upsert(edit_at(10.0, 10.0, "a")), 1);
        assert_eq!(ledger.upsert(edit_at(10.0, 30.0, "b")), 2);
        assert!(!ledger.is_empty());
    }

    #[test]
    fn test_upsert_same_bbox_replaces() {
        let mut ledger = EditLedger::new();
        ledger.upsert(edit_at(10.0, 10.0, "first"));
        let second = edit_at(10.0, 10.0, "second");
        assert_eq!(ledger.upsert(second.clone()), 1);
        assert_eq!(ledger.snapshot_ordered(), vec![second]);
    }

    #[test]
    fn test_replacement_moves_to_end() {
        let mut ledger = EditLedger::new();
        ledger.upsert(edit_at(10.0, 10.0, "a"));
        ledger.upsert(edit_at(10.0, 30.0, "b"));
        ledger.upsert(edit_at(10.0, 10.0, "a2"));

        let texts: Vec<String> = ledger
            .snapshot_ordered()
            .into_iter()
            .map(|e| e.new_text)
            .collect();
        assert_eq!(texts, vec!["b".to_string(), "a2".to_string()]);
    }

    #[test]
    fn test_near_equal_bbox_is_a_different_key() {
        let mut ledger = EditLedger::new();
        ledger.upsert(edit_at(10.0, 10.0, "a"));
        ledger.upsert(edit_at(10.000_000_1, 10.0, "b"));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_json_roundtrip() {
        let mut ledger = EditLedger::new();
        ledger.upsert(edit_at(1.0, 2.0, "x"));
        let restored = EditLedger::from_json(&ledger.to_json().unwrap()).unwrap();
        assert_eq!(restored.edits(), ledger.edits());
    }
}
