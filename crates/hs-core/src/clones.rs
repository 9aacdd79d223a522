//! Clone de-duplication.
//!
//! Federated calendars may deliver the same meeting twice, once tagged with a
//! clone marker in the title. Blocks sharing a date, start time, end time and
//! marker-free title collapse to a single representative.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveTime};

use crate::block::EventBlock;

type CloneKey = (NaiveDate, NaiveTime, NaiveTime, String);

/// Collapses clone groups to one block each.
///
/// Within a group, blocks without the marker take precedence; ties keep the
/// first-seen block. Groups are returned in the order they were first seen,
/// which makes the function idempotent.
pub fn dedupe_clones(blocks: Vec<EventBlock>, clone_marker: &str) -> Vec<EventBlock> {
    let marker = clone_marker.to_lowercase();
    let input_len = blocks.len();

    let mut index: HashMap<CloneKey, usize> = HashMap::new();
    let mut groups: Vec<Vec<EventBlock>> = Vec::new();
    for block in blocks {
        let key = clone_key(&block, &marker);
        if let Some(&slot) = index.get(&key) {
            groups[slot].push(block);
        } else {
            index.insert(key, groups.len());
            groups.push(vec![block]);
        }
    }

    let deduped: Vec<EventBlock> = groups
        .into_iter()
        .filter_map(|mut group| {
            group.sort_by_key(|block| is_clone(block, &marker));
            group.into_iter().next()
        })
        .collect();

    if deduped.len() < input_len {
        tracing::debug!(
            dropped = input_len - deduped.len(),
            "dropped cloned calendar events"
        );
    }
    deduped
}

fn clone_key(block: &EventBlock, marker: &str) -> CloneKey {
    let title = block.title().to_lowercase();
    let title = if marker.is_empty() {
        title
    } else {
        title.replace(marker, "")
    };
    (
        block.begin().date_naive(),
        block.begin().time(),
        block.end().time(),
        title.trim().to_string(),
    )
}

fn is_clone(block: &EventBlock, marker: &str) -> bool {
    !marker.is_empty() && block.title().to_lowercase().contains(marker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::test_support::{block, block_on};

    const MARKER: &str = "[Clone]";

    fn titles(blocks: &[EventBlock]) -> Vec<&str> {
        blocks.iter().map(EventBlock::title).collect()
    }

    #[test]
    fn marked_copy_is_dropped_even_when_seen_first() {
        let out = dedupe_clones(
            vec![
                block((9, 0), (10, 0), "[clone] Acme Sync"),
                block((9, 0), (10, 0), "Acme sync"),
            ],
            MARKER,
        );
        assert_eq!(titles(&out), vec!["Acme sync"]);
    }

    #[test]
    fn first_seen_wins_when_neither_is_marked() {
        let out = dedupe_clones(
            vec![
                block((9, 0), (10, 0), "Acme Sync"),
                block((9, 0), (10, 0), "acme sync "),
            ],
            MARKER,
        );
        assert_eq!(titles(&out), vec!["Acme Sync"]);
    }

    #[test]
    fn first_seen_wins_when_both_are_marked() {
        let out = dedupe_clones(
            vec![
                block((9, 0), (10, 0), "Acme Sync [CLONE]"),
                block((9, 0), (10, 0), "[clone] Acme Sync"),
            ],
            MARKER,
        );
        assert_eq!(titles(&out), vec!["Acme Sync [CLONE]"]);
    }

    #[test]
    fn different_times_or_days_are_kept() {
        let out = dedupe_clones(
            vec![
                block((9, 0), (10, 0), "Acme Sync"),
                block((9, 0), (10, 30), "[clone] Acme Sync"),
                block_on(28, (9, 0), (10, 0), "[clone] Acme Sync"),
            ],
            MARKER,
        );
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn preserves_first_seen_group_order() {
        let out = dedupe_clones(
            vec![
                block((11, 0), (12, 0), "Review"),
                block((9, 0), (10, 0), "Standup"),
                block((11, 0), (12, 0), "[clone] Review"),
            ],
            MARKER,
        );
        assert_eq!(titles(&out), vec!["Review", "Standup"]);
    }

    #[test]
    fn is_idempotent() {
        let input = vec![
            block((9, 0), (10, 0), "[clone] Acme Sync"),
            block((9, 0), (10, 0), "Acme Sync"),
            block((10, 0), (11, 0), "Design [clone]"),
            block((11, 0), (12, 0), "Retro"),
            block((11, 0), (12, 0), "retro"),
        ];
        let once = dedupe_clones(input, MARKER);
        let twice = dedupe_clones(once.clone(), MARKER);
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_marker_groups_by_title_only() {
        let out = dedupe_clones(
            vec![
                block((9, 0), (10, 0), "Acme Sync"),
                block((9, 0), (10, 0), "ACME SYNC"),
            ],
            "",
        );
        assert_eq!(titles(&out), vec!["Acme Sync"]);
    }
}
