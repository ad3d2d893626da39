//! Fixed-size batching of page images.
//!
//! Multimodal APIs cap the request size and the output tokens per call, so a
//! long document is sent in contiguous groups of at most `size` pages. The
//! batches partition the page sequence exactly: no reordering, no gaps, no
//! overlap.

use std::num::NonZeroUsize;

/// Split `items` into contiguous slices of `size`; only the last may be shorter.
///
/// Lazy and deterministic. An empty input yields no batches.
pub fn batches<T>(items: &[T], size: NonZeroUsize) -> std::slice::Chunks<'_, T> {
    items.chunks(size.get())
}

/// Number of batches `batches` yields for `len` items: `ceil(len / size)`.
pub fn batch_count(len: usize, size: NonZeroUsize) -> usize {
    len.div_ceil(size.get())
}

/// 1-based inclusive page span of batch `batch_index` (0-based).
pub fn page_span(batch_index: usize, size: NonZeroUsize, total: usize) -> (usize, usize) {
    let first = batch_index * size.get() + 1;
    let last = ((batch_index + 1) * size.get()).min(total);
    (first, last)
}
