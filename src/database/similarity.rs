pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Indices of the `k` best candidates by similarity to `query`, best first.
pub fn top_k(query: &[f32], candidates: &[Vec<f32>], k: usize) -> Vec<(usize, f32)> {
    let mut scored: Vec<(usize, f32)> = candidates
        .iter()
        .enumerate()
        .map(|(i, candidate)| (i, cosine_similarity(query, candidate)))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);
    scored
}

/// Maximal Marginal Relevance over `candidates`: greedily picks up to `k`
/// indices, trading relevance to `query` against redundancy with the
/// already picked ones. `lambda` = 1 is pure relevance, 0 pure diversity.
pub fn mmr_select(query: &[f32], candidates: &[Vec<f32>], k: usize, lambda: f32) -> Vec<usize> {
    let relevance: Vec<f32> = candidates
        .iter()
        .map(|candidate| cosine_similarity(query, candidate))
        .collect();

    let mut selected: Vec<usize> = Vec::with_capacity(k.min(candidates.len()));
    let mut remaining: Vec<usize> = (0..candidates.len()).collect();

    while selected.len() < k && !remaining.is_empty() {
        let mut best: Option<(usize, f32)> = None;
        for (position, &index) in remaining.iter().enumerate() {
            let redundancy = selected
                .iter()
                .map(|&chosen| cosine_similarity(&candidates[index], &candidates[chosen]))
                .fold(f32::NEG_INFINITY, f32::max);
            let redundancy = if selected.is_empty() { 0.0 } else { redundancy };
            let score = lambda * relevance[index] - (1.0 - lambda) * redundancy;
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((position, score));
            }
        }
        match best {
            Some((position, _)) => selected.push(remaining.remove(position)),
            None => break,
        }
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_parallel_and_orthogonal_vectors() {
        assert!((cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 3.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn top_k_orders_by_similarity() {
        let candidates = vec![vec![0.0, 1.0], vec![1.0, 0.1], vec![1.0, 0.0]];
        let hits: Vec<usize> = top_k(&[1.0, 0.0], &candidates, 2).into_iter().map(|(i, _)| i).collect();
        assert_eq!(hits, vec![2, 1]);
    }

    #[test]
    fn mmr_skips_near_duplicates() {
        let candidates = vec![
            vec![1.0, 0.0, 0.0],
            vec![0.99, 0.01, 0.0],
            vec![0.7, 0.7, 0.0],
        ];
        // relevance alone would pick the duplicate second
        assert_eq!(mmr_select(&[1.0, 0.0, 0.0], &candidates, 2, 1.0), vec![0, 1]);
        assert_eq!(mmr_select(&[1.0, 0.0, 0.0], &candidates, 2, 0.3), vec![0, 2]);
    }

    #[test]
    fn mmr_returns_at_most_the_candidates() {
        let candidates = vec![vec![1.0, 0.0]];
        assert_eq!(mmr_select(&[1.0, 0.0], &candidates, 5, 0.5), vec![0]);
        assert!(mmr_select(&[1.0, 0.0], &[], 5, 0.5).is_empty());
    }
}
