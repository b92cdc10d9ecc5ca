//! Output-layer helpers for the two training objectives: a unigram noise
//! distribution for negative sampling and a Huffman coding of the vocabulary
//! for hierarchical softmax.

use oorandom::Rand64;

/// Exponent applied to raw counts in the noise distribution.
pub const UNIGRAM_POWER: f64 = 0.75;

/// Cumulative `count^0.75` distribution over vocabulary indices.
#[derive(Debug, Clone)]
pub struct UnigramTable {
    cumulative: Vec<f64>,
}

impl UnigramTable {
    pub fn new(counts: &[u64]) -> Self {
        let mut total = 0.0;
        let mut cumulative: Vec<f64> = counts
            .iter()
            .map(|&c| {
                total += (c as f64).powf(UNIGRAM_POWER);
                total
            })
            .collect();
        if total > 0.0 {
            for v in &mut cumulative {
                *v /= total;
            }
        }
        Self { cumulative }
    }

    /// Draw one vocabulary index.
    pub fn sample(&self, rng: &mut Rand64) -> usize {
        let r = rng.rand_float();
        self.cumulative
            .partition_point(|&c| c <= r)
            .min(self.cumulative.len().saturating_sub(1))
    }

    /// Probability mass of one index; zero outside the table.
    pub(crate) fn probability(&self, index: usize) -> f64 {
        let Some(&upper) = self.cumulative.get(index) else {
            return 0.0;
        };
        match index.checked_sub(1).and_then(|i| self.cumulative.get(i)) {
            Some(&lower) => upper - lower,
            None => upper,
        }
    }
}

/// Step on a Huffman path: inner node index and the branch bit taken there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HuffmanStep {
    pub node: usize,
    pub code: u8,
}

/// Huffman tree over vocabulary counts. Inner nodes are numbered
/// `0..vocab_len - 1`; the root is `vocab_len - 2`.
#[derive(Debug, Clone)]
pub struct HuffmanTree {
    paths: Vec<Vec<HuffmanStep>>,
}

impl HuffmanTree {
    pub fn new(counts: &[u64]) -> Self {
        let n = counts.len();
        if n < 2 {
            return Self {
                paths: vec![Vec::new(); n],
            };
        }

        // Leaves sorted by descending count; ties keep index order.
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| counts[b].cmp(&counts[a]).then(a.cmp(&b)));

        let mut weight: Vec<u64> = order.iter().map(|&i| counts[i]).collect();
        weight.resize(2 * n - 1, u64::MAX);
        let mut parent = vec![0usize; 2 * n - 1];
        let mut branch = vec![0u8; 2 * n - 1];

        // Two queues: leaves from the rare end, merged nodes in creation order.
        let mut leaf = n as isize - 1;
        let mut merged = n;
        for next in n..2 * n - 1 {
            let mut pick = || {
                if leaf >= 0 && weight[leaf as usize] < weight[merged] {
                    leaf -= 1;
                    (leaf + 1) as usize
                } else {
                    merged += 1;
                    merged - 1
                }
            };
            let first = pick();
            let second = pick();
            weight[next] = weight[first].saturating_add(weight[second]);
            parent[first] = next;
            parent[second] = next;
            branch[second] = 1;
        }

        let root = 2 * n - 2;
        let mut paths = vec![Vec::new(); n];
        for (sorted_pos, &vocab_index) in order.iter().enumerate() {
            let mut path = Vec::new();
            let mut node = sorted_pos;
            while node != root {
                let up = parent[node];
                path.push(HuffmanStep {
                    node: up - n,
                    code: branch[node],
                });
                node = up;
            }
            path.reverse();
            paths[vocab_index] = path;
        }

        Self { paths }
    }

    /// Root-to-leaf path of a vocabulary index.
    pub fn path(&self, index: usize) -> &[HuffmanStep] {
        self.paths.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of inner nodes.
    pub fn inner_nodes(&self) -> usize {
        self.paths.len().saturating_sub(1)
    }
}
