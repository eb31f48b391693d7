// Score command: sample reference columns, realign and re-estimate a tree
// around each, reconcile it against the species tree and compare its
// coalescences to the ones implied by the alignment.
//
// Columns are split into batches; every batch is an independent unit that
// runs on the rayon pool and writes its own partial file. Once all units
// have finished, the partial files are summarized into the report.

use crate::chrom_sizes::ChromSizes;
use crate::classify::{Classification, SpeciesTree};
use crate::coalescence::{match_coalescences, sample_coalescences, SamplingOptions};
use crate::column_entry::{newick_safe_sequence_name, ColumnEntry};
use crate::error::{Result, ScoreError};
use crate::external::{run_checked, ColumnWindow, CommandTemplate, ExternalCommand};
use crate::summary::{coalescence_line, mismatch_line, summarize, CoalescenceSummary};
use crate::tree::Tree;
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

pub const DEFAULT_EXTRACT_COMMAND: &str =
    "getRegionAroundSampledColumn HAL GENOME --refSequence SEQUENCE --refPos POSITION --width WIDTH";
pub const DEFAULT_ALIGNER_COMMAND: &str = "mafft INPUT > OUTPUT";
pub const DEFAULT_ESTIMATOR_COMMAND: &str = "fasttree -nt -gtr < INPUT > OUTPUT";
pub const DEFAULT_RECONCILE_COMMAND: &str = "reconcile GENE2SPECIES GENE_TREE SPECIES_TREE 0 1";
pub const DEFAULT_SPECIES_TREE_COMMAND: &str = "halStats --tree HAL";
pub const DEFAULT_CHROM_SIZES_COMMAND: &str = "halStats --chromSizes GENOME HAL";

/// Templates of every external tool the score command runs.
#[derive(Debug, Clone)]
pub struct ToolCommands {
    /// `HAL`, `GENOME`, `SEQUENCE`, `POSITION`, `WIDTH`
    pub extract: CommandTemplate,
    /// `INPUT`, `OUTPUT`
    pub aligner: CommandTemplate,
    /// `INPUT`, `OUTPUT`
    pub estimator: CommandTemplate,
    /// `GENE2SPECIES`, `GENE_TREE`, `SPECIES_TREE`
    pub reconcile: CommandTemplate,
    /// `HAL`
    pub species_tree: CommandTemplate,
    /// `HAL`, `GENOME`
    pub chrom_sizes: CommandTemplate,
}

impl Default for ToolCommands {
    fn default() -> Self {
        ToolCommands {
            extract: CommandTemplate::new(DEFAULT_EXTRACT_COMMAND),
            aligner: CommandTemplate::new(DEFAULT_ALIGNER_COMMAND),
            estimator: CommandTemplate::new(DEFAULT_ESTIMATOR_COMMAND),
            reconcile: CommandTemplate::new(DEFAULT_RECONCILE_COMMAND),
            species_tree: CommandTemplate::new(DEFAULT_SPECIES_TREE_COMMAND),
            chrom_sizes: CommandTemplate::new(DEFAULT_CHROM_SIZES_COMMAND),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScoreConfig {
    pub hal_file: String,
    pub ref_genome: String,
    pub num_samples: usize,
    pub samples_per_job: usize,
    pub coalescences_per_sample: usize,
    pub width: u64,
    pub only_duplicated_genomes: bool,
    pub only_sampled_position: bool,
    /// Columns with fewer sequences are skipped
    pub min_sequences: usize,
    pub commands: ToolCommands,
    pub mismatch_path: Option<PathBuf>,
    pub skip_failed_columns: bool,
    pub seed: Option<u64>,
    pub temp_dir: Option<PathBuf>,
}

impl ScoreConfig {
    pub fn new(hal_file: &str, ref_genome: &str) -> Self {
        ScoreConfig {
            hal_file: hal_file.to_string(),
            ref_genome: ref_genome.to_string(),
            num_samples: 50000,
            samples_per_job: 100,
            coalescences_per_sample: 10,
            width: 500,
            only_duplicated_genomes: false,
            only_sampled_position: false,
            min_sequences: 4,
            commands: ToolCommands::default(),
            mismatch_path: None,
            skip_failed_columns: false,
            seed: None,
            temp_dir: None,
        }
    }

    fn write_mismatches(&self) -> bool {
        self.mismatch_path.is_some()
    }
}

/// Result of a scoring run.
#[derive(Debug)]
pub struct ScoreOutcome {
    pub summary: CoalescenceSummary,
    /// Columns dropped because of a column-local error
    pub dropped_columns: usize,
}

/// Runs the whole pipeline and writes the report to `output_file`.
pub fn run_score(
    config: &ScoreConfig,
    runner: &dyn ExternalCommand,
    output_file: &Path,
) -> Result<ScoreOutcome> {
    let start_time = Instant::now();
    if config.samples_per_job == 0 {
        return Err(ScoreError::Format(
            "--samples-per-job must be positive".to_string(),
        ));
    }

    let species_newick = run_checked(
        runner,
        &config
            .commands
            .species_tree
            .fill(&[("HAL", config.hal_file.as_str())]),
    )?;
    let species = SpeciesTree::parse(species_newick.trim())?;
    let chrom_sizes = ChromSizes::parse(&run_checked(
        runner,
        &config.commands.chrom_sizes.fill(&[
            ("HAL", config.hal_file.as_str()),
            ("GENOME", config.ref_genome.as_str()),
        ]),
    )?)?;
    info!(
        "[score] {:.3}s Reference {} has {} sequences totalling {} bp",
        start_time.elapsed().as_secs_f64(),
        config.ref_genome,
        chrom_sizes.len(),
        chrom_sizes.total_length()
    );

    // Columns and per-unit seeds are drawn here so that units never share
    // or have to coordinate a random number generator
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let positions: Vec<(String, u64)> = (0..config.num_samples)
        .map(|_| chrom_sizes.sample_position(&mut rng))
        .collect();
    let batches: Vec<(usize, &[(String, u64)], u64)> = positions
        .chunks(config.samples_per_job)
        .enumerate()
        .map(|(index, batch)| (index, batch, rng.gen()))
        .collect();

    let mut builder = tempfile::Builder::new();
    builder.prefix("halcoal");
    let work_dir = match &config.temp_dir {
        Some(dir) => builder.tempdir_in(dir)?,
        None => builder.tempdir()?,
    };
    info!(
        "[score] {:.3}s Scoring {} columns in {} units",
        start_time.elapsed().as_secs_f64(),
        positions.len(),
        batches.len()
    );

    let unit = ScoringUnit {
        config,
        species: &species,
        runner,
        work_dir: work_dir.path(),
    };
    let unit_results: Vec<(PathBuf, usize)> = batches
        .par_iter()
        .map(|(index, batch, seed)| unit.run(*index, batch, *seed))
        .collect::<Result<Vec<_>>>()?;
    let dropped_columns: usize = unit_results.iter().map(|(_, dropped)| dropped).sum();
    let partial_files: Vec<PathBuf> = unit_results.into_iter().map(|(path, _)| path).collect();

    if dropped_columns > 0 {
        error!(
            "Dropped {} of {} columns after column-level errors (run with -v 1 for details)",
            dropped_columns,
            positions.len()
        );
    }
    info!(
        "[score] {:.3}s All units finished, summarizing",
        start_time.elapsed().as_secs_f64()
    );
    let summary = summarize(
        &partial_files,
        output_file,
        config.mismatch_path.as_deref(),
        &config.hal_file,
    )?;
    Ok(ScoreOutcome {
        summary,
        dropped_columns,
    })
}

/// One batch of columns, scored sequentially into a private partial file.
struct ScoringUnit<'a> {
    config: &'a ScoreConfig,
    species: &'a SpeciesTree,
    runner: &'a dyn ExternalCommand,
    work_dir: &'a Path,
}

impl<'a> ScoringUnit<'a> {
    /// Returns the partial file and the number of dropped columns.
    fn run(&self, index: usize, positions: &[(String, u64)], seed: u64) -> Result<(PathBuf, usize)> {
        let partial_path = self.work_dir.join(format!("unit_{:06}.tsv", index));
        let mut writer = BufWriter::new(File::create(&partial_path)?);
        let mut rng = StdRng::seed_from_u64(seed);

        let mut scored = 0;
        let mut dropped = 0;
        for (sequence, position) in positions {
            match self.score_column(sequence, *position, &mut rng) {
                Ok(lines) => {
                    // A column's records are written together or not at all
                    if !lines.is_empty() {
                        scored += 1;
                    }
                    for line in lines {
                        writeln!(writer, "{}", line)?;
                    }
                }
                Err(e)
                    if e.is_column_local()
                        || (self.config.skip_failed_columns && e.is_external_tool()) =>
                {
                    warn!(
                        "Dropping column {}.{}:{}: {}",
                        self.config.ref_genome, sequence, position, e
                    );
                    dropped += 1;
                }
                Err(e) => {
                    return Err(e);
                }
            }
        }
        writer.flush()?;
        debug!(
            "Unit {} scored {} of {} columns ({} dropped) into {}",
            index,
            scored,
            positions.len(),
            dropped,
            partial_path.display()
        );
        Ok((partial_path, dropped))
    }

    /// Extracts, realigns, re-estimates and reconciles one column and
    /// returns its partial-output records.
    fn score_column(&self, sequence: &str, position: u64, rng: &mut StdRng) -> Result<Vec<String>> {
        let commands = &self.config.commands;
        let position_str = position.to_string();
        let width = self.config.width.to_string();
        let extracted = run_checked(
            self.runner,
            &commands.extract.fill(&[
                ("HAL", self.config.hal_file.as_str()),
                ("GENOME", self.config.ref_genome.as_str()),
                ("SEQUENCE", sequence),
                ("POSITION", position_str.as_str()),
                ("WIDTH", width.as_str()),
            ]),
        )?;
        let window = ColumnWindow::parse(&extracted)?;
        if window.num_sequences() < self.config.min_sequences {
            debug!(
                "Skipping column {}:{}: only {} sequences",
                sequence,
                position,
                window.num_sequences()
            );
            return Ok(Vec::new());
        }

        let scratch = tempfile::Builder::new()
            .prefix("column")
            .tempdir_in(self.work_dir)?;
        let path_str = |name: &str| scratch.path().join(name).to_string_lossy().into_owned();
        let input_path = path_str("input.fa");
        let aligned_path = path_str("aligned.fa");
        let tree_path = path_str("estimated.nwk");
        let gene2species_path = path_str("gene2species.txt");

        fs::write(&input_path, &window.fasta)?;
        run_checked(
            self.runner,
            &commands.aligner.fill(&[
                ("INPUT", input_path.as_str()),
                ("OUTPUT", aligned_path.as_str()),
            ]),
        )?;
        run_checked(
            self.runner,
            &commands.estimator.fill(&[
                ("INPUT", aligned_path.as_str()),
                ("OUTPUT", tree_path.as_str()),
            ]),
        )?;
        let estimated_tree = fs::read_to_string(&tree_path)?;

        let mut gene2species = BufWriter::new(File::create(&gene2species_path)?);
        window.write_gene_to_species(&mut gene2species)?;
        gene2species.flush()?;
        drop(gene2species);

        let reconciled = run_checked(
            self.runner,
            &commands.reconcile.fill(&[
                ("GENE2SPECIES", gene2species_path.as_str()),
                ("GENE_TREE", estimated_tree.trim()),
                ("SPECIES_TREE", self.species.newick()),
            ]),
        )?;

        let mut options = SamplingOptions::new(self.config.coalescences_per_sample);
        options.include_non_duplicated_genomes = !self.config.only_duplicated_genomes;
        if self.config.only_sampled_position {
            options.required_entry = Some(ColumnEntry::new(
                &self.config.ref_genome,
                &newick_safe_sequence_name(sequence),
                position,
            ));
        }

        score_trees(
            self.species,
            &window.hal_tree,
            reconciled.trim(),
            &options,
            self.config.write_mismatches(),
            rng,
        )
    }
}

/// Samples coalescences from the alignment tree, matches them in the
/// reconciled tree and classifies each against the species tree. Returns
/// the partial-output records, mismatch records first for each pair.
pub fn score_trees<R: Rng + ?Sized>(
    species: &SpeciesTree,
    hal_newick: &str,
    reconciled_newick: &str,
    options: &SamplingOptions,
    write_mismatches: bool,
    rng: &mut R,
) -> Result<Vec<String>> {
    let hal = Tree::parse(hal_newick)?;
    let reconciled = Tree::parse(reconciled_newick)?;
    let hal_coalescences = sample_coalescences(&hal, options, rng)?;
    let reconciled_coalescences = match_coalescences(&reconciled, &hal_coalescences)?;
    let verdicts = species.classify_all(&hal_coalescences, &reconciled_coalescences)?;

    let mut lines = Vec::with_capacity(verdicts.len());
    for verdict in &verdicts {
        if write_mismatches && verdict.result != Classification::Identical {
            lines.push(mismatch_line(verdict, hal_newick, reconciled_newick));
        }
        lines.push(coalescence_line(verdict));
    }
    Ok(lines)
}
