//! Sampling of leaf pairs ("coalescences") from a column tree and
//! re-derivation of their MRCAs in a second tree over the same leaves.

use crate::column_entry::{genome_of, ColumnEntry};
use crate::error::{Result, ScoreError};
use crate::tree::{NodeId, Tree};
use log::debug;
use rand::Rng;
use rustc_hash::{FxHashMap, FxHashSet};

/// Upper bound on random draws per possible pair before sampling gives up.
const SAMPLING_ATTEMPTS_PER_PAIR: usize = 64;

/// Two genomic positions and the name of their MRCA in some tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coalescence {
    pub first: ColumnEntry,
    pub second: ColumnEntry,
    pub mrca: String,
}

impl Coalescence {
    /// True if both records describe the same two positions in the same order.
    pub fn same_pair(&self, other: &Coalescence) -> bool {
        self.first == other.first && self.second == other.second
    }
}

/// Controls which leaf pairs of a column tree are sampled.
#[derive(Debug, Clone)]
pub struct SamplingOptions {
    /// Upper bound on the number of sampled pairs
    pub max_pairs: usize,
    /// If false, both leaves of a pair must belong to genomes with at least
    /// two leaves in the tree
    pub include_non_duplicated_genomes: bool,
    /// If set, every pair contains this leaf
    pub required_entry: Option<ColumnEntry>,
}

impl SamplingOptions {
    pub fn new(max_pairs: usize) -> Self {
        SamplingOptions {
            max_pairs,
            include_non_duplicated_genomes: true,
            required_entry: None,
        }
    }
}

/// Samples up to `options.max_pairs` leaf pairs from `tree` and records the
/// name of each pair's MRCA.
///
/// When fewer pairs exist than requested, every pair is examined; otherwise
/// pairs are drawn uniformly without replacement until enough are accepted
/// or every pair has been seen. Fewer eligible pairs than requested is not
/// an error.
pub fn sample_coalescences<R: Rng + ?Sized>(
    tree: &Tree,
    options: &SamplingOptions,
    rng: &mut R,
) -> Result<Vec<Coalescence>> {
    let name_to_id = tree.name_to_id();
    let leaves = tree.leaf_names();
    let n = leaves.len();
    if options.max_pairs == 0 || n < 2 {
        return Ok(Vec::new());
    }

    let mut genome_counts: FxHashMap<&str, usize> = FxHashMap::default();
    for leaf in &leaves {
        *genome_counts.entry(genome_of(leaf)).or_insert(0) += 1;
    }
    let is_duplicated = |leaf: usize| {
        genome_counts
            .get(genome_of(leaves[leaf]))
            .is_some_and(|&count| count >= 2)
    };
    let eligible = |(a, b): (usize, usize)| {
        options.include_non_duplicated_genomes || (is_duplicated(a) && is_duplicated(b))
    };

    let pairs = match &options.required_entry {
        Some(entry) => {
            let label = entry.label();
            let required = leaves
                .iter()
                .position(|leaf| *leaf == label)
                .ok_or_else(|| ScoreError::MissingName(label.clone()))?;
            let partners: Vec<usize> = (0..n).filter(|&i| i != required).collect();
            select_pairs(
                partners.len(),
                options.max_pairs,
                rng,
                |k| (required, partners[k]),
                |rng| (required, partners[rng.gen_range(0..partners.len())]),
                eligible,
            )?
        }
        None => {
            let all_pairs: Vec<(usize, usize)> = (0..n)
                .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
                .collect();
            select_pairs(
                all_pairs.len(),
                options.max_pairs,
                rng,
                |k| all_pairs[k],
                |rng| {
                    let i = rng.gen_range(0..n);
                    let mut j = rng.gen_range(0..n - 1);
                    if j >= i {
                        j += 1;
                    }
                    (i.min(j), i.max(j))
                },
                eligible,
            )?
        }
    };
    debug!(
        "Sampled {} of at most {} coalescences from {} leaves",
        pairs.len(),
        options.max_pairs,
        n
    );

    pairs
        .into_iter()
        .map(|(a, b)| {
            let mrca = tree.mrca(name_to_id[leaves[a]], name_to_id[leaves[b]])?;
            Ok(Coalescence {
                first: ColumnEntry::parse(leaves[a])?,
                second: ColumnEntry::parse(leaves[b])?,
                mrca: tree.name(mrca)?.to_string(),
            })
        })
        .collect()
}

/// Picks pairs out of a space of `total` candidates. Enumerates the space
/// when it is smaller than `max_pairs`, otherwise draws without replacement.
fn select_pairs<R, E, D, A>(
    total: usize,
    max_pairs: usize,
    rng: &mut R,
    pair_at: E,
    mut draw: D,
    accept: A,
) -> Result<Vec<(usize, usize)>>
where
    R: Rng + ?Sized,
    E: Fn(usize) -> (usize, usize),
    D: FnMut(&mut R) -> (usize, usize),
    A: Fn((usize, usize)) -> bool,
{
    if total < max_pairs {
        return Ok((0..total).map(pair_at).filter(|&p| accept(p)).collect());
    }

    let max_attempts = total.saturating_mul(SAMPLING_ATTEMPTS_PER_PAIR);
    let mut visited = FxHashSet::default();
    let mut accepted = Vec::new();
    let mut attempts = 0;
    while accepted.len() < max_pairs && visited.len() < total {
        if attempts == max_attempts {
            return Err(ScoreError::SamplingExhausted {
                attempts,
                accepted: accepted.len(),
            });
        }
        attempts += 1;
        let pair = draw(rng);
        let key = (pair.0.min(pair.1), pair.0.max(pair.1));
        if visited.insert(key) && accept(pair) {
            accepted.push(pair);
        }
    }
    Ok(accepted)
}

/// Recomputes the MRCA of every input pair in `tree`, keeping the input
/// order and the order of the two entries within each pair.
pub fn match_coalescences(tree: &Tree, coalescences: &[Coalescence]) -> Result<Vec<Coalescence>> {
    let name_to_id = tree.name_to_id();
    let lookup = |entry: &ColumnEntry| -> Result<NodeId> {
        let label = entry.label();
        name_to_id
            .get(&label)
            .copied()
            .ok_or(ScoreError::MissingName(label))
    };

    coalescences
        .iter()
        .map(|coalescence| {
            let mrca = tree.mrca(lookup(&coalescence.first)?, lookup(&coalescence.second)?)?;
            Ok(Coalescence {
                first: coalescence.first.clone(),
                second: coalescence.second.clone(),
                mrca: tree.name(mrca)?.to_string(),
            })
        })
        .collect()
}
