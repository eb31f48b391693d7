use crate::error::{Result, ScoreError};
use rand::Rng;

/// Sequence lengths of the reference genome, used to pick columns uniformly
/// over the whole genome.
#[derive(Debug, Clone)]
pub struct ChromSizes {
    sequences: Vec<(String, u64)>,
    total: u64,
}

impl ChromSizes {
    /// Parses `name<TAB>size` lines. Lines with any other number of fields
    /// are ignored; a non-numeric size is an error.
    pub fn parse(output: &str) -> Result<Self> {
        let mut sequences = Vec::new();
        for line in output.lines() {
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != 2 {
                continue;
            }
            let size = fields[1].trim().parse::<u64>().map_err(|e| {
                ScoreError::Format(format!("Invalid size in line '{}': {}", line, e))
            })?;
            sequences.push((fields[0].to_string(), size));
        }
        // Natural sort by sequence name
        sequences.sort_by(|a, b| natord::compare(&a.0, &b.0));
        let total = sequences.iter().map(|(_, size)| size).sum();
        if total == 0 {
            return Err(ScoreError::Format(
                "No sequence sizes found for the reference genome".to_string(),
            ));
        }
        Ok(ChromSizes { sequences, total })
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn total_length(&self) -> u64 {
        self.total
    }

    /// Maps an offset into the concatenated genome to `(sequence, position)`.
    pub fn locate(&self, genome_pos: u64) -> Option<(&str, u64)> {
        let mut start = 0;
        for (name, size) in &self.sequences {
            if genome_pos < start + size {
                return Some((name.as_str(), genome_pos - start));
            }
            start += size;
        }
        None
    }

    /// Picks a position uniformly over the whole genome.
    pub fn sample_position<R: Rng + ?Sized>(&self, rng: &mut R) -> (String, u64) {
        let genome_pos = rng.gen_range(0..self.total);
        // total > 0 and genome_pos < total, so locate always succeeds
        let (name, pos) = self
            .locate(genome_pos)
            .unwrap_or((self.sequences[self.sequences.len() - 1].0.as_str(), 0));
        (name.to_string(), pos)
    }
}
