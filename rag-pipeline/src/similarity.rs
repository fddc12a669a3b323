use common::storage::types::document_chunk::DocumentChunk;

/// Cosine similarity of two vectors; 0 when either is empty, zero-norm or
/// the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Top `k` chunks by similarity to `query`. Equal scores keep input order.
pub fn rank_chunks<'a>(
    query: &[f32],
    chunks: &'a [DocumentChunk],
    k: usize,
) -> Vec<(&'a DocumentChunk, f32)> {
    let mut scored: Vec<(&DocumentChunk, f32)> = chunks
        .iter()
        .map(|chunk| (chunk, cosine_similarity(query, &chunk.embedding)))
        .collect();

    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, embedding: Vec<f32>) -> DocumentChunk {
        DocumentChunk::new("doc".into(), 0, text.into(), embedding)
    }

    #[test]
    fn test_identical_and_orthogonal_vectors() {
        assert!((cosine_similarity(&[1.0, 2.0], &[1.0, 2.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_inputs_score_zero() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_rank_chunks_orders_and_truncates() {
        let chunks = vec![
            chunk("far", vec![0.0, 1.0]),
            chunk("near", vec![1.0, 0.1]),
            chunk("exact", vec![1.0, 0.0]),
        ];

        let ranked = rank_chunks(&[1.0, 0.0], &chunks, 2);
        let texts: Vec<_> = ranked.iter().map(|(c, _)| c.text.as_str()).collect();
        assert_eq!(texts, vec!["exact", "near"]);
        assert!(ranked[0].1 >= ranked[1].1);
    }

    #[test]
    fn test_rank_chunks_ties_keep_input_order() {
        let chunks = vec![
            chunk("first", vec![1.0, 0.0]),
            chunk("second", vec![2.0, 0.0]),
            chunk("third", vec![0.5, 0.0]),
        ];

        let ranked = rank_chunks(&[1.0, 0.0], &chunks, 10);
        let texts: Vec<_> = ranked.iter().map(|(c, _)| c.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_rank_chunks_zero_k() {
        let chunks = vec![chunk("only", vec![1.0])];
        assert!(rank_chunks(&[1.0], &chunks, 0).is_empty());
    }
}
