//! Change computation between two configuration snapshots

use crate::model::{Change, ChangeKind, Configuration};

/// Compute the ordered change list turning `old` into `new`.
///
/// Unlike the upstream Go implementation this emits nothing for a key that is
/// present in both snapshots with an unchanged value (see `DESIGN.md`, Open
/// Question 1, for why the anomaly is not preserved here).
pub fn diff(old: &Configuration, new: &Configuration) -> Vec<Change> {
    let mut changes = Vec::new();

    for (key, new_value) in new {
        match old.get(key) {
            Some(old_value) if old_value == new_value => {}
            Some(_) => changes.push(Change {
                kind: ChangeKind::Update,
                key: key.clone(),
                value: new_value.clone(),
            }),
            None => changes.push(Change {
                kind: ChangeKind::Add,
                key: key.clone(),
                value: new_value.clone(),
            }),
        }
    }

    for (key, old_value) in old {
        if !new.contains_key(key) {
            changes.push(Change {
                kind: ChangeKind::Delete,
                key: key.clone(),
                value: old_value.clone(),
            });
        }
    }

    changes.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.key.cmp(&b.key)));
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(pairs: &[(&str, serde_json::Value)]) -> Configuration {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_diff_empty_when_identical() {
        let a = config(&[("timeout", json!("100"))]);
        assert!(diff(&a, &a).is_empty());
    }

    #[test]
    fn test_diff_detects_add() {
        let old = config(&[]);
        let new = config(&[("timeout", json!("100"))]);
        let changes = diff(&old, &new);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Add);
        assert_eq!(changes[0].key, "timeout");
    }

    #[test]
    fn test_diff_detects_update() {
        let old = config(&[("timeout", json!("100"))]);
        let new = config(&[("timeout", json!("200"))]);
        let changes = diff(&old, &new);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Update);
        assert_eq!(changes[0].value, json!("200"));
    }

    #[test]
    fn test_diff_detects_delete() {
        let old = config(&[("timeout", json!("100"))]);
        let new = config(&[]);
        let changes = diff(&old, &new);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Delete);
    }

    #[test]
    fn test_diff_sorted_by_kind_then_key() {
        let old = config(&[("b", json!("1")), ("c", json!("1"))]);
        let new = config(&[("a", json!("1")), ("b", json!("2"))]);
        let changes = diff(&old, &new);
        // delete(c) groups after add(a) and update(b) due to Add < Update < Delete
        assert_eq!(changes[0].key, "a");
        assert_eq!(changes[0].kind, ChangeKind::Add);
        assert_eq!(changes[1].key, "b");
        assert_eq!(changes[1].kind, ChangeKind::Update);
        assert_eq!(changes[2].key, "c");
        assert_eq!(changes[2].kind, ChangeKind::Delete);
    }
}
