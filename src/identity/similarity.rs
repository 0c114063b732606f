//! Name similarity measures

use strsim::jaro_winkler;

/// Similarity of two display names in [0, 1]
pub trait NameSimilarity {
    fn score(&self, a: &str, b: &str) -> f64;
}

/// Ratcliff/Obershelp sequence ratio on case-folded names: `2 * M / T`,
/// where M is the number of characters in matching blocks and T the total
/// length of both names.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceRatio;

impl NameSimilarity for SequenceRatio {
    fn score(&self, a: &str, b: &str) -> f64 {
        let a: Vec<char> = a.trim().to_lowercase().chars().collect();
        let b: Vec<char> = b.trim().to_lowercase().chars().collect();
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        let matched = matching_characters(&a, &b);
        2.0 * matched as f64 / (a.len() + b.len()) as f64
    }
}

/// Jaro-Winkler similarity on case-folded names
#[derive(Debug, Clone, Copy, Default)]
pub struct JaroWinkler;

impl NameSimilarity for JaroWinkler {
    fn score(&self, a: &str, b: &str) -> f64 {
        let a = a.trim().to_lowercase();
        let b = b.trim().to_lowercase();
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        jaro_winkler(&a, &b)
    }
}

/// Longest common block of `a[alo..ahi]` and `b[blo..bhi]` as (i, j, len).
/// Ties go to the block starting earliest in `a`, then earliest in `b`.
fn longest_block(a: &[char], b: &[char], alo: usize, ahi: usize, blo: usize, bhi: usize) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_len) = (alo, blo, 0);
    // run[j] = length of the common run ending at a[i - 1], b[j - 1]
    let mut prev = vec![0usize; bhi - blo + 1];
    let mut curr = vec![0usize; bhi - blo + 1];

    for i in alo..ahi {
        for j in blo..bhi {
            let slot = j - blo + 1;
            curr[slot] = if a[i] == b[j] { prev[slot - 1] + 1 } else { 0 };
            if curr[slot] > best_len {
                best_len = curr[slot];
                best_i = i + 1 - best_len;
                best_j = j + 1 - best_len;
            }
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    (best_i, best_j, best_len)
}

/// Total size of the matching blocks found by recursive longest-block search
fn matching_characters(a: &[char], b: &[char]) -> usize {
    let mut total = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];

    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        if alo >= ahi || blo >= bhi {
            continue;
        }
        let (i, j, len) = longest_block(a, b, alo, ahi, blo, bhi);
        if len == 0 {
            continue;
        }
        total += len;
        pending.push((alo, i, blo, j));
        pending.push((i + len, ahi, j + len, bhi));
    }
    total
}
