use crate::error::{Result, ScoreError};
use std::fmt;

/// One genomic position of a sampled column, as encoded in the leaf labels
/// written by the column extractor: `genome.sequence|position`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnEntry {
    pub genome: String,
    pub sequence: String,
    pub position: u64,
}

impl ColumnEntry {
    pub fn new(genome: &str, sequence: &str, position: u64) -> Self {
        ColumnEntry {
            genome: genome.to_string(),
            sequence: sequence.to_string(),
            position,
        }
    }

    /// Parses a `genome.sequence|position` label. The genome is everything
    /// before the first `.`, so sequence names may contain dots.
    pub fn parse(label: &str) -> Result<Self> {
        let Some((genome_and_seq, position)) = label.split_once('|') else {
            return Err(ScoreError::Format(format!(
                "Column label '{}' has no '|' separator",
                label
            )));
        };
        let position = position.parse::<u64>().map_err(|e| {
            ScoreError::Format(format!(
                "Invalid position '{}' in column label '{}': {}",
                position, label, e
            ))
        })?;
        let (genome, sequence) = genome_and_seq
            .split_once('.')
            .unwrap_or((genome_and_seq, ""));
        Ok(ColumnEntry::new(genome, sequence, position))
    }

    /// The leaf label this entry was parsed from.
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ColumnEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}|{}", self.genome, self.sequence, self.position)
    }
}

/// Genome part of a label, i.e. the token before the first `.`.
///
/// Also used to reduce an ancestral node label such as `Anc0.seq|12` to the
/// species name it belongs to.
pub fn genome_of(label: &str) -> &str {
    label.split('.').next().unwrap_or(label)
}

/// Makes a sequence name safe for Newick labels, the way the extractor does.
pub fn newick_safe_sequence_name(name: &str) -> String {
    name.replace(':', "_")
}
