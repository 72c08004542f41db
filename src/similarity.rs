// 🔤 Similarity - difflib-compatible sequence matching
//
// Ratcliff/Obershelp "gestalt" matching, identical in results to Python's
// difflib.SequenceMatcher (no junk function, autojunk enabled):
//
//   ratio = 2 * M / T
//
// where M is the number of characters covered by the recursively found
// longest matching blocks and T is the total length of both strings.
// Elements are Unicode scalar values, not bytes.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Sequences at least this long get the "popular element" heuristic
const AUTOJUNK_MIN_LEN: usize = 200;

// ============================================================================
// CLOSE MATCH RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseMatch {
    /// Candidate string as it appeared in the possibilities list
    pub candidate: String,

    /// Similarity ratio (0.0 - 1.0)
    pub score: f64,
}

// ============================================================================
// SEQUENCE MATCHER
// ============================================================================

/// Matcher with a fixed second sequence `b`.
///
/// `b` is indexed once (`b2j`), then any number of first sequences can be
/// compared against it. This mirrors `set_seq2` being called once per word in
/// `get_close_matches`.
pub struct SequenceMatcher {
    b: Vec<char>,

    /// Positions of each non-popular element of `b`, ascending
    b2j: HashMap<char, Vec<usize>>,

    /// Element counts of `b`, including popular elements
    full_b_count: HashMap<char, usize>,

    /// Elements dropped from `b2j` by the autojunk heuristic
    popular: HashSet<char>,
}

impl SequenceMatcher {
    pub fn new(b: &str) -> Self {
        let b: Vec<char> = b.chars().collect();

        let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
        let mut full_b_count: HashMap<char, usize> = HashMap::new();
        for (j, &elt) in b.iter().enumerate() {
            b2j.entry(elt).or_default().push(j);
            *full_b_count.entry(elt).or_insert(0) += 1;
        }

        let mut popular = HashSet::new();
        let n = b.len();
        if n >= AUTOJUNK_MIN_LEN {
            let ntest = n / 100 + 1;
            popular = b2j
                .iter()
                .filter(|(_, idxs)| idxs.len() > ntest)
                .map(|(&elt, _)| elt)
                .collect();
            for elt in &popular {
                b2j.remove(elt);
            }
        }

        SequenceMatcher {
            b,
            b2j,
            full_b_count,
            popular,
        }
    }

    /// Similarity ratio of `a` against this matcher's `b`
    pub fn ratio(&self, a: &str) -> f64 {
        let a: Vec<char> = a.chars().collect();
        let matched = self.matched_len(&a);
        calculate_ratio(matched, a.len() + self.b.len())
    }

    /// Upper bound on `ratio()` from shared element counts, ignoring order
    pub fn quick_ratio(&self, a: &str) -> f64 {
        let mut avail: HashMap<char, isize> = HashMap::new();
        let mut matches = 0;
        let mut len_a = 0;

        for elt in a.chars() {
            len_a += 1;
            let numb = *avail
                .entry(elt)
                .or_insert_with(|| self.full_b_count.get(&elt).copied().unwrap_or(0) as isize);
            avail.insert(elt, numb - 1);
            if numb > 0 {
                matches += 1;
            }
        }

        calculate_ratio(matches, len_a + self.b.len())
    }

    /// Upper bound on `ratio()` from lengths alone
    pub fn real_quick_ratio(&self, a: &str) -> f64 {
        let la = a.chars().count();
        let lb = self.b.len();
        calculate_ratio(la.min(lb), la + lb)
    }

    /// Sum of the sizes of all matching blocks between `a` and `b`
    fn matched_len(&self, a: &[char]) -> usize {
        let mut queue = vec![(0, a.len(), 0, self.b.len())];
        let mut matched = 0;

        while let Some((alo, ahi, blo, bhi)) = queue.pop() {
            let (i, j, k) = self.find_longest_match(a, alo, ahi, blo, bhi);
            if k == 0 {
                continue;
            }
            matched += k;
            if alo < i && blo < j {
                queue.push((alo, i, blo, j));
            }
            if i + k < ahi && j + k < bhi {
                queue.push((i + k, ahi, j + k, bhi));
            }
        }

        matched
    }

    /// Longest matching block in `a[alo..ahi]` and `b[blo..bhi]`.
    ///
    /// Returns `(i, j, size)`. Among maximal blocks, the one starting earliest
    /// in `a` wins, then earliest in `b`.
    fn find_longest_match(
        &self,
        a: &[char],
        alo: usize,
        ahi: usize,
        blo: usize,
        bhi: usize,
    ) -> (usize, usize, usize) {
        let mut best_i = alo;
        let mut best_j = blo;
        let mut best_size = 0;

        // j2len[j] = length of longest match ending with a[i-1] and b[j]
        let mut j2len: HashMap<usize, usize> = HashMap::new();
        for (i, elt) in a.iter().enumerate().take(ahi).skip(alo) {
            let mut new_j2len = HashMap::new();
            if let Some(indices) = self.b2j.get(elt) {
                for &j in indices {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let prev = if j == 0 {
                        0
                    } else {
                        j2len.get(&(j - 1)).copied().unwrap_or(0)
                    };
                    let k = prev + 1;
                    new_j2len.insert(j, k);
                    if k > best_size {
                        best_i = i + 1 - k;
                        best_j = j + 1 - k;
                        best_size = k;
                    }
                }
            }
            j2len = new_j2len;
        }

        // Popular elements are not junk: grow the block over equal neighbours
        while best_i > alo && best_j > blo && a[best_i - 1] == self.b[best_j - 1] {
            best_i -= 1;
            best_j -= 1;
            best_size += 1;
        }
        while best_i + best_size < ahi
            && best_j + best_size < bhi
            && a[best_i + best_size] == self.b[best_j + best_size]
        {
            best_size += 1;
        }

        (best_i, best_j, best_size)
    }
}

fn calculate_ratio(matches: usize, length: usize) -> f64 {
    if length > 0 {
        2.0 * matches as f64 / length as f64
    } else {
        1.0
    }
}

/// Similarity ratio between two strings (difflib `SequenceMatcher(None, a, b).ratio()`)
pub fn ratio(a: &str, b: &str) -> f64 {
    SequenceMatcher::new(b).ratio(a)
}

/// Best "good enough" matches for `word` among `possibilities`.
///
/// Candidates scoring at least `cutoff` are returned best-first, ordered by
/// `(score, candidate)` descending, at most `n` of them. Same contract as
/// difflib's `get_close_matches`, with scores kept for auditing.
pub fn get_close_matches<S: AsRef<str>>(
    word: &str,
    possibilities: &[S],
    n: usize,
    cutoff: f64,
) -> Result<Vec<CloseMatch>> {
    if n == 0 {
        bail!("n must be > 0: {}", n);
    }
    if !(0.0..=1.0).contains(&cutoff) {
        bail!("cutoff must be in [0.0, 1.0]: {}", cutoff);
    }

    Ok(rank_close_matches(word, possibilities, n, cutoff))
}

/// `get_close_matches` without argument checks, for callers that validated
/// `n` and `cutoff` up front.
pub(crate) fn rank_close_matches<S: AsRef<str>>(
    word: &str,
    possibilities: &[S],
    n: usize,
    cutoff: f64,
) -> Vec<CloseMatch> {
    let matcher = SequenceMatcher::new(word);
    let mut result: Vec<CloseMatch> = possibilities
        .iter()
        .map(|p| p.as_ref())
        .filter(|x| {
            matcher.real_quick_ratio(x) >= cutoff && matcher.quick_ratio(x) >= cutoff
        })
        .filter_map(|x| {
            let score = matcher.ratio(x);
            (score >= cutoff).then(|| CloseMatch {
                candidate: x.to_string(),
                score,
            })
        })
        .collect();

    result.sort_by(|l, r| {
        r.score
            .total_cmp(&l.score)
            .then_with(|| r.candidate.cmp(&l.candidate))
    });
    result.truncate(n);
    result
}

// ============================================================================
// TESTS
// ============================================================================
