//! Interval de-overlap.
//!
//! Blocks are consumed in `begin` order. Whenever the incoming block starts
//! before the last emitted piece ends, the incoming block is cut at that end:
//! the left piece is emitted and the remainder continues as the new incoming
//! block. Only the incoming block is ever cut, so piece boundaries (and with
//! them the rendered notes of already-synced entries) depend only on the
//! order in which blocks arrive.

use crate::block::EventBlock;

/// Splits partially-overlapping blocks so that no piece straddles the end of
/// the piece emitted before it.
///
/// Adjacent (`begin == last.end`) and zero-length blocks are never split. A
/// block that ends inside the last piece is emitted whole.
pub fn split_overlaps(mut blocks: Vec<EventBlock>) -> Vec<EventBlock> {
    blocks.sort_by_key(EventBlock::begin);

    let mut result: Vec<EventBlock> = Vec::with_capacity(blocks.len());
    for block in blocks {
        let mut incoming = block;
        while let Some(cut) = result
            .last()
            .map(EventBlock::end)
            .filter(|last_end| incoming.begin() < *last_end)
        {
            if incoming.end() <= cut {
                break;
            }
            result.push(incoming.with_span(incoming.begin(), cut));
            incoming = incoming.with_span(cut, incoming.end());
        }
        result.push(incoming);
    }

    tracing::debug!(pieces = result.len(), "split overlapping blocks");
    result
}
