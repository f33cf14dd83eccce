//! Head reconciliation.
//!
//! Heads are reconciled rather than replaced so that stylesheets and scripts
//! shared by both pages stay loaded. Prefetch markers are never touched.

use crate::Element;
use crate::Node;

/// Outcome of pairing the live head against the incoming one.
///
/// `stale` indexes into the old candidate list, `fresh` into the new one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadPartition {
    pub stale: Vec<usize>,
    pub fresh: Vec<usize>,
}

/// Walks both lists in lockstep. Equal pairs are kept; a node that shows up
/// later on the other side cancels its earlier stale/fresh entry, so
/// reordered but identical nodes are neither removed nor duplicated.
pub fn partition_head(old: &[&Element], next: &[&Element]) -> HeadPartition {
    let mut partition = HeadPartition::default();
    let mut old_mark = 0_usize;
    let mut next_mark = 0_usize;

    while old_mark < old.len() || next_mark < next.len() {
        let old_node = old.get(old_mark).copied();
        let next_node = next.get(next_mark).copied();

        if let (Some(left), Some(right)) = (old_node, next_node)
            && left == right
        {
            old_mark += 1;
            next_mark += 1;
            continue;
        }

        if let Some(left) = old_node
            && let Some(position) = partition
                .fresh
                .iter()
                .position(|&index| next[index] == left)
        {
            partition.fresh.remove(position);
            old_mark += 1;
            continue;
        }

        if let Some(right) = next_node
            && let Some(position) = partition
                .stale
                .iter()
                .position(|&index| old[index] == right)
        {
            partition.stale.remove(position);
            next_mark += 1;
            continue;
        }

        if old_node.is_some() {
            partition.stale.push(old_mark);
        }
        if next_node.is_some() {
            partition.fresh.push(next_mark);
        }
        old_mark += 1;
        next_mark += 1;
    }

    partition
}

/// Applies the partition to `live`: stale elements are removed in place and
/// fresh ones are appended in their incoming order. Returns
/// `(removed, appended)`.
pub fn merge_head(live: &mut Element, next: &Element) -> (usize, usize) {
    let live_slots: Vec<usize> = live
        .children
        .iter()
        .enumerate()
        .filter_map(|(slot, node)| match node {
            Node::Element(element) if takes_part(element) => Some(slot),
            _ => None,
        })
        .collect();
    let old: Vec<&Element> = live_slots
        .iter()
        .filter_map(|&slot| live.children[slot].as_element())
        .collect();
    let incoming: Vec<&Element> = next.child_elements().filter(|e| takes_part(e)).collect();

    let partition = partition_head(&old, &incoming);
    let appended: Vec<Element> = partition
        .fresh
        .iter()
        .map(|&index| incoming[index].clone())
        .collect();

    let mut doomed: Vec<usize> = partition
        .stale
        .iter()
        .map(|&index| live_slots[index])
        .collect();
    doomed.sort_unstable();
    for slot in doomed.iter().rev() {
        live.children.remove(*slot);
    }

    let counts = (doomed.len(), appended.len());
    live.children
        .extend(appended.into_iter().map(Node::Element));
    counts
}

fn takes_part(element: &Element) -> bool {
    !(element.is("link") && element.has_rel("prefetch"))
}
