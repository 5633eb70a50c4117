//! Key-order validation of one bucket's page tree
//!
//! Every subtree inherits a half-open interval `[min, max)` from its
//! ancestors. A branch element hands its child `[element key, next element
//! key)`, or the page's own upper bound for the last element. Keys on a
//! leaf must strictly increase. Separators on a branch are only checked
//! against the inherited bounds; their order shows up in the bounds handed
//! to each child.

use crate::check::finding::{Finding, NodeLevel, PageStack};
use crate::check::stringer::KeyValueStringer;
use crate::check::FindingSink;
use crate::common::error::Result;
use crate::storage::page::{BranchElement, LeafElement, PageNode};
use crate::storage::page_constants::PageId;
use crate::storage::page_type::describe_flags;
use crate::storage::tx::Tx;
use std::cmp::Ordering;

/// Walks a page tree checking keys against their inherited bounds
pub struct KeyOrderValidator<'t, 's, S: FindingSink + ?Sized> {
    tx: &'t Tx,
    stringer: &'s dyn KeyValueStringer,
    sink: &'s mut S,
}

impl<'t, 's, S: FindingSink + ?Sized> KeyOrderValidator<'t, 's, S> {
    /// Validator reporting into `sink`
    pub fn new(tx: &'t Tx, stringer: &'s dyn KeyValueStringer, sink: &'s mut S) -> Self {
        Self { tx, stringer, sink }
    }

    /// Validate the tree rooted at `root`, unbounded on both sides
    ///
    /// Returns the greatest key in the tree, or `None` if it holds no keys.
    ///
    /// # Errors
    ///
    /// Returns an error if a page cannot be resolved or decoded, or if the
    /// sink rejects a finding.
    pub fn check(&mut self, root: PageId) -> Result<Option<&'t [u8]>> {
        let mut stack = Vec::with_capacity(16);
        self.check_subtree(root, None, None, &mut stack)
    }

    fn check_subtree(
        &mut self,
        pgid: PageId,
        min_closed: Option<&'t [u8]>,
        max_open: Option<&'t [u8]>,
        stack: &mut Vec<PageId>,
    ) -> Result<Option<&'t [u8]>> {
        let cyclic = stack.contains(&pgid);
        stack.push(pgid);
        let result = if cyclic {
            self.sink
                .report(Finding::CyclicReference {
                    page_id: pgid,
                    stack: PageStack(stack.clone()),
                })
                .map(|()| None)
        } else {
            self.check_page(pgid, min_closed, max_open, stack)
        };
        stack.pop();
        result
    }

    fn check_page(
        &mut self,
        pgid: PageId,
        min_closed: Option<&'t [u8]>,
        max_open: Option<&'t [u8]>,
        stack: &mut Vec<PageId>,
    ) -> Result<Option<&'t [u8]>> {
        let page = self.tx.page(pgid)?;
        match page.node()? {
            PageNode::Branch(elements) => self.check_branch(pgid, &elements, min_closed, max_open, stack),
            PageNode::Leaf(elements) => self.check_leaf(pgid, &elements, min_closed, max_open, stack),
            PageNode::Other(flags) => {
                self.sink.report(Finding::UnexpectedPageType {
                    page_id: pgid,
                    page_type: describe_flags(flags),
                })?;
                Ok(None)
            }
        }
    }

    fn check_branch(
        &mut self,
        pgid: PageId,
        elements: &[BranchElement<'t>],
        min_closed: Option<&'t [u8]>,
        max_open: Option<&'t [u8]>,
        stack: &mut Vec<PageId>,
    ) -> Result<Option<&'t [u8]>> {
        let mut running_min = min_closed;
        let mut subtree_max = None;
        for (index, element) in elements.iter().enumerate() {
            // Only the first separator is held to the running minimum.
            let lower = running_min.filter(|_| index == 0);
            self.verify_key(pgid, NodeLevel::Branch, index, element.key, lower, max_open, stack)?;

            let child_max = elements.get(index + 1).map_or(max_open, |next| Some(next.key));
            subtree_max = self.check_subtree(element.pgid, Some(element.key), child_max, stack)?;
            running_min = subtree_max;
        }
        Ok(subtree_max)
    }

    fn check_leaf(
        &mut self,
        pgid: PageId,
        elements: &[LeafElement<'t>],
        min_closed: Option<&'t [u8]>,
        max_open: Option<&'t [u8]>,
        stack: &[PageId],
    ) -> Result<Option<&'t [u8]>> {
        let mut running_min = min_closed;
        for (index, element) in elements.iter().enumerate() {
            self.verify_key(pgid, NodeLevel::Leaf, index, element.key, running_min, max_open, stack)?;
            running_min = Some(element.key);
        }
        Ok(elements.last().map(|element| element.key))
    }

    /// Check one key against its predecessor (or inherited minimum at
    /// index 0) and the inherited maximum; `previous` is `None` when there
    /// is nothing to compare against
    #[allow(clippy::too_many_arguments)]
    fn verify_key(
        &mut self,
        page_id: PageId,
        level: NodeLevel,
        index: usize,
        key: &[u8],
        previous: Option<&[u8]>,
        max_open: Option<&[u8]>,
        stack: &[PageId],
    ) -> Result<()> {
        if let Some(previous) = previous {
            let finding = match (index, previous.cmp(key)) {
                (0, Ordering::Greater) => Some(Finding::BelowAncestorMin {
                    page_id,
                    level,
                    index,
                    key: self.stringer.key_to_string(key),
                    min_key: self.stringer.key_to_string(previous),
                    stack: PageStack(stack.to_vec()),
                }),
                (0, _) => None,
                (_, Ordering::Greater) => Some(Finding::OutOfOrder {
                    page_id,
                    level,
                    index,
                    key: self.stringer.key_to_string(key),
                    previous: self.stringer.key_to_string(previous),
                    stack: PageStack(stack.to_vec()),
                }),
                (_, Ordering::Equal) => Some(Finding::DuplicateKey {
                    page_id,
                    level,
                    index,
                    key: self.stringer.key_to_string(key),
                    previous: self.stringer.key_to_string(previous),
                    stack: PageStack(stack.to_vec()),
                }),
                (_, Ordering::Less) => None,
            };
            if let Some(finding) = finding {
                self.sink.report(finding)?;
            }
        }

        if let Some(max_open) = max_open.filter(|max| key >= *max) {
            self.sink.report(Finding::AboveAncestorMax {
                page_id,
                level,
                index,
                key: self.stringer.key_to_string(key),
                max_key: self.stringer.key_to_string(max_open),
                stack: PageStack(stack.to_vec()),
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::finding::FindingKind;
    use crate::common::test_utils::{ImageBuilder, LeafEntry, Utf8KeyValueStringer};
    use crate::storage::page_type::PageType;
    use pretty_assertions::assert_eq;

    fn validate(builder: &ImageBuilder, root: PageId) -> (Option<Vec<u8>>, Vec<Finding>) {
        let tx = Tx::from_bytes(builder.build()).unwrap();
        let mut findings = Vec::new();
        let max = KeyOrderValidator::new(&tx, &Utf8KeyValueStringer, &mut findings)
            .check(root)
            .unwrap()
            .map(<[u8]>::to_vec);
        (max, findings)
    }

    fn leaf(keys: &[&str]) -> Vec<LeafEntry> {
        keys.iter().map(|k| LeafEntry::value(k, "")).collect()
    }

    #[test]
    fn test_well_formed_two_levels() {
        let mut builder = ImageBuilder::new();
        builder.branch(3, &[("a", 4), ("m", 5)]);
        builder.leaf(4, &leaf(&["a", "c", "k"]));
        builder.leaf(5, &leaf(&["m", "z"]));

        let (max, findings) = validate(&builder, 3);
        assert!(findings.is_empty(), "{findings:?}");
        assert_eq!(max, Some(b"z".to_vec()));
    }

    #[test]
    fn test_leaf_out_of_order() {
        let mut builder = ImageBuilder::new();
        builder.leaf(3, &leaf(&["b", "a"]));

        let (max, findings) = validate(&builder, 3);
        assert_eq!(
            findings,
            vec![Finding::OutOfOrder {
                page_id: 3,
                level: NodeLevel::Leaf,
                index: 1,
                key: "a".into(),
                previous: "b".into(),
                stack: PageStack(vec![3]),
            }]
        );
        assert_eq!(max, Some(b"a".to_vec()));
    }

    #[test]
    fn test_leaf_duplicate() {
        let mut builder = ImageBuilder::new();
        builder.leaf(3, &leaf(&["a", "b", "b"]));

        let (_, findings) = validate(&builder, 3);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind(), FindingKind::DuplicateKey);
        assert_eq!(findings[0].key(), Some("b"));
    }

    #[test]
    fn test_child_key_above_next_separator() {
        let mut builder = ImageBuilder::new();
        builder.branch(3, &[("a", 4), ("m", 5)]);
        builder.leaf(4, &leaf(&["a", "q"]));
        builder.leaf(5, &leaf(&["m"]));

        let (max, findings) = validate(&builder, 3);
        assert_eq!(
            findings,
            vec![Finding::AboveAncestorMax {
                page_id: 4,
                level: NodeLevel::Leaf,
                index: 1,
                key: "q".into(),
                max_key: "m".into(),
                stack: PageStack(vec![3, 4]),
            }]
        );
        assert_eq!(max, Some(b"m".to_vec()));
    }

    #[test]
    fn test_child_key_below_separator() {
        let mut builder = ImageBuilder::new();
        builder.branch(3, &[("a", 4), ("m", 5)]);
        builder.leaf(4, &leaf(&["a"]));
        builder.leaf(5, &leaf(&["c", "n"]));

        let (_, findings) = validate(&builder, 3);
        assert_eq!(findings.len(), 1);
        assert_eq!(
            findings[0],
            Finding::BelowAncestorMin {
                page_id: 5,
                level: NodeLevel::Leaf,
                index: 0,
                key: "c".into(),
                min_key: "m".into(),
                stack: PageStack(vec![3, 5]),
            }
        );
    }

    #[test]
    fn test_separator_equal_to_previous_subtree_max() {
        let mut builder = ImageBuilder::new();
        builder.branch(3, &[("a", 4), ("k", 5)]);
        builder.leaf(4, &leaf(&["a", "k"]));
        builder.leaf(5, &leaf(&["k"]));

        let (_, findings) = validate(&builder, 3);
        let kinds: Vec<_> = findings.iter().map(Finding::kind).collect();
        assert_eq!(kinds, vec![FindingKind::AboveAncestorMax]);
        assert_eq!(findings[0].page_id(), 4);
    }

    #[test]
    fn test_unordered_separators_only_bound_children() {
        let mut builder = ImageBuilder::new();
        builder.branch(3, &[("a", 4), ("m", 5), ("c", 6)]);
        builder.leaf(4, &leaf(&["a"]));
        builder.leaf(5, &leaf(&["m"]));
        builder.leaf(6, &leaf(&["c"]));

        let (_, findings) = validate(&builder, 3);
        // "m" is handed the bound "c" by its right-hand neighbour.
        assert_eq!(
            findings,
            vec![Finding::AboveAncestorMax {
                page_id: 5,
                level: NodeLevel::Leaf,
                index: 0,
                key: "m".into(),
                max_key: "c".into(),
                stack: PageStack(vec![3, 5]),
            }]
        );
        assert!(findings.iter().all(|f| !matches!(
            f,
            Finding::OutOfOrder { level: NodeLevel::Branch, .. } | Finding::DuplicateKey { level: NodeLevel::Branch, .. }
        )));
    }

    #[test]
    fn test_first_separator_below_inherited_minimum() {
        let mut builder = ImageBuilder::new();
        builder.branch(3, &[("m", 4)]);
        builder.branch(4, &[("c", 5)]);
        builder.leaf(5, &leaf(&["n"]));

        let (_, findings) = validate(&builder, 3);
        assert_eq!(
            findings,
            vec![Finding::BelowAncestorMin {
                page_id: 4,
                level: NodeLevel::Branch,
                index: 0,
                key: "c".into(),
                min_key: "m".into(),
                stack: PageStack(vec![3, 4]),
            }]
        );
    }

    #[test]
    fn test_empty_leaf_returns_none() {
        let mut builder = ImageBuilder::new();
        builder.leaf(3, &[]);
        let (max, findings) = validate(&builder, 3);
        assert!(findings.is_empty());
        assert_eq!(max, None);
    }

    #[test]
    fn test_unexpected_page_type() {
        let mut builder = ImageBuilder::new();
        builder.branch(3, &[("a", 4)]);
        builder.raw(4, PageType::Freelist as u16);

        let (max, findings) = validate(&builder, 3);
        assert_eq!(
            findings,
            vec![Finding::UnexpectedPageType {
                page_id: 4,
                page_type: "freelist".into(),
            }]
        );
        assert_eq!(max, None);
    }

    #[test]
    fn test_cycle_is_reported_not_followed() {
        let mut builder = ImageBuilder::new();
        builder.branch(3, &[("a", 4)]);
        builder.branch(4, &[("a", 3)]);

        let (_, findings) = validate(&builder, 3);
        assert_eq!(
            findings,
            vec![Finding::CyclicReference {
                page_id: 3,
                stack: PageStack(vec![3, 4, 3]),
            }]
        );
    }

    #[test]
    fn test_unresolvable_child_is_fatal() {
        let mut builder = ImageBuilder::new();
        builder.branch(3, &[("a", 400)]);
        let tx = Tx::from_bytes(builder.build()).unwrap();
        let mut findings = Vec::new();
        let err = KeyOrderValidator::new(&tx, &Utf8KeyValueStringer, &mut findings)
            .check(3)
            .unwrap_err();
        assert!(err.is_corruption());
    }
}
