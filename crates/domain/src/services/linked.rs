//! Reconciliation of child rows submitted inline with their parent.

use crate::models::LinkedItem;
use crate::ports::LinkOp;

/// Stamps every submitted child with the parent id and stages its insert.
pub fn create_linked_items<L: LinkedItem>(parent_id: i64, items: Vec<L>) -> Vec<LinkOp<L>> {
    items
        .into_iter()
        .map(|mut item| {
            item.set_parent_id(parent_id);
            LinkOp::Insert(item)
        })
        .collect()
}

/// Outcome of [`update_linked_items`].
#[derive(Debug, Clone, PartialEq)]
pub struct LinkDiff<L> {
    pub ops: Vec<LinkOp<L>>,
    /// Ids of the persisted children staged for deletion.
    pub deleted_ids: Vec<i64>,
}

/// Diffs the submitted children against the persisted ones, by id only.
///
/// Persisted-only children are deleted, submitted-only children are stamped
/// and inserted. Children present on both sides are removed from
/// `submitted` and left alone, even if their other fields differ.
pub fn update_linked_items<L: LinkedItem>(
    parent_id: i64,
    submitted: &mut Vec<L>,
    existing: &[L],
) -> LinkDiff<L> {
    let deleted_ids: Vec<i64> = existing
        .iter()
        .map(LinkedItem::id)
        .filter(|id| !submitted.iter().any(|s| s.id() == *id))
        .collect();

    submitted.retain(|s| !existing.iter().any(|e| e.id() == s.id()));

    let mut ops: Vec<LinkOp<L>> = deleted_ids.iter().copied().map(LinkOp::Delete).collect();
    ops.extend(submitted.iter().cloned().map(|mut item| {
        item.set_parent_id(parent_id);
        LinkOp::Insert(item)
    }));

    LinkDiff { ops, deleted_ids }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ApplicationUserRole;

    fn membership(id: i64, role: i64) -> ApplicationUserRole {
        ApplicationUserRole {
            id,
            application_user_id: 0,
            application_role_id: role,
            role_name: None,
        }
    }

    #[test]
    fn test_create_stamps_parent() {
        let ops = create_linked_items(9, vec![membership(0, 1), membership(0, 2)]);
        assert_eq!(ops.len(), 2);
        for op in ops {
            match op {
                LinkOp::Insert(item) => assert_eq!(item.application_user_id, 9),
                LinkOp::Delete(_) => panic!("unexpected delete"),
            }
        }
    }

    #[test]
    fn test_three_way_diff() {
        // persisted {A, B, C}, submitted {B, C, D}
        let existing = vec![membership(1, 10), membership(2, 20), membership(3, 30)];
        let mut submitted = vec![membership(2, 20), membership(3, 30), membership(0, 40)];

        let diff = update_linked_items(5, &mut submitted, &existing);

        assert_eq!(diff.deleted_ids, vec![1]);
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].application_role_id, 40);
        assert_eq!(
            diff.ops,
            vec![
                LinkOp::Delete(1),
                LinkOp::Insert(ApplicationUserRole {
                    application_user_id: 5,
                    ..membership(0, 40)
                }),
            ]
        );
    }

    #[test]
    fn test_matched_children_are_not_diffed_by_content() {
        let existing = vec![membership(1, 10)];
        let mut submitted = vec![membership(1, 99)];

        let diff = update_linked_items(5, &mut submitted, &existing);
        assert!(diff.ops.is_empty());
        assert!(diff.deleted_ids.is_empty());
        assert!(submitted.is_empty());
    }

    #[test]
    fn test_empty_submission_deletes_everything() {
        let existing = vec![membership(1, 10), membership(2, 20)];
        let mut submitted = Vec::new();

        let diff = update_linked_items(5, &mut submitted, &existing);
        assert_eq!(diff.deleted_ids, vec![1, 2]);
    }
}
