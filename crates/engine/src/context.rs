//! Renders retrieved passages into the prompt's context block.

use ragline_core::RetrievalResult;

/// How many passages the strict strategy puts in front of the model.
pub const STRICT_MAX_CHUNKS: usize = 5;

/// How many passages the hybrid strategy puts in front of the model.
pub const HYBRID_MAX_CHUNKS: usize = 6;

const SEPARATOR: &str = "\n\n---\n\n";

/// Format the first `max_chunks` results as labelled blocks.
///
/// Each block reads `[Chunk {i} | id:{id} | score:{score}]` followed by the
/// passage text. `i` is 1-based, a missing id becomes `chunk-{i}` and a
/// missing score renders as `0.000`. Input order is kept as given.
pub fn build(results: &[RetrievalResult], max_chunks: usize) -> String {
    results
        .iter()
        .take(max_chunks)
        .enumerate()
        .map(|(i, result)| {
            let n = i + 1;
            let id = result
                .chunk_id
                .clone()
                .unwrap_or_else(|| format!("chunk-{n}"));
            let score = result.score.unwrap_or(0.0);
            format!("[Chunk {n} | id:{id} | score:{score:.3}]\n{}", result.content)
        })
        .collect::<Vec<_>>()
        .join(SEPARATOR)
}
