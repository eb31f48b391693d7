use crate::classify::SpeciesTree;
use crate::coalescence::SamplingOptions;
use crate::commands::score::score_trees;
use crate::error::Result;
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io::Write;

/// Classifies sampled coalescences of an alignment tree against a reconciled
/// tree of the same leaves and writes the partial-output records.
pub fn run_compare<W: Write>(
    species_newick: &str,
    hal_newick: &str,
    reconciled_newick: &str,
    options: &SamplingOptions,
    write_mismatches: bool,
    seed: Option<u64>,
    writer: &mut W,
) -> Result<usize> {
    let species = SpeciesTree::parse(species_newick.trim())?;
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let lines = score_trees(
        &species,
        hal_newick.trim(),
        reconciled_newick.trim(),
        options,
        write_mismatches,
        &mut rng,
    )?;
    for line in &lines {
        writeln!(writer, "{}", line)?;
    }
    info!("Wrote {} records", lines.len());
    Ok(lines.len())
}
