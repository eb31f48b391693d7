use clap::Parser;
use halcoal::coalescence::SamplingOptions;
use halcoal::column_entry::ColumnEntry;
use halcoal::commands::compare::run_compare;
use halcoal::commands::score::{
    run_score, ScoreConfig, ToolCommands, DEFAULT_ALIGNER_COMMAND, DEFAULT_CHROM_SIZES_COMMAND,
    DEFAULT_ESTIMATOR_COMMAND, DEFAULT_EXTRACT_COMMAND, DEFAULT_RECONCILE_COMMAND,
    DEFAULT_SPECIES_TREE_COMMAND,
};
use halcoal::commands::summarize::run_summarize;
use halcoal::external::{CommandTemplate, ShellCommand};
use log::{error, info};
use rayon::ThreadPoolBuilder;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Common options shared between all commands
#[derive(Parser, Debug)]
struct CommonOpts {
    /// Number of threads for parallel processing.
    #[clap(short = 't', long, value_parser, default_value = "4")]
    threads: NonZeroUsize,

    /// Verbosity level (0 = error, 1 = info, 2 = debug)
    #[clap(short, long, default_value = "0")]
    verbose: u8,
}

/// Scores the gene trees implied by a multiple genome alignment against
/// independently estimated, species-tree reconciled gene trees.
#[derive(Parser, Debug)]
#[command(author, version, about, disable_help_subcommand = true)]
enum Args {
    /// Sample reference columns and score their coalescences
    Score {
        #[clap(flatten)]
        common: CommonOpts,

        /// Alignment file handed to the external tools
        hal_file: String,

        /// Reference genome whose positions are sampled
        ref_genome: String,

        /// Path of the report
        output_file: PathBuf,

        /// Number of columns to sample
        #[clap(long, value_parser, default_value_t = 50000)]
        num_samples: usize,

        /// Number of columns scored by each parallel unit
        #[clap(long, value_parser, default_value_t = 100)]
        samples_per_job: usize,

        /// Maximum number of coalescences sampled per column
        #[clap(long, value_parser, default_value_t = 10)]
        coalescences_per_sample: usize,

        /// Width of the region extracted around each column
        #[clap(long, value_parser, default_value_t = 500)]
        width: u64,

        /// Only sample pairs whose genomes both appear more than once in the column
        #[clap(long, action)]
        only_duplicated_genomes: bool,

        /// Only sample pairs that include the sampled reference position
        #[clap(long, action)]
        only_sampled_position: bool,

        /// Skip columns with fewer sequences than this
        #[clap(long, value_parser, default_value_t = 4)]
        min_sequences: usize,

        /// Aligner command (INPUT and OUTPUT are replaced by file paths)
        #[clap(long, value_parser, default_value = DEFAULT_ALIGNER_COMMAND)]
        aligner_command: String,

        /// Tree estimator command (INPUT and OUTPUT are replaced by file paths)
        #[clap(long, value_parser, default_value = DEFAULT_ESTIMATOR_COMMAND)]
        estimator_command: String,

        /// Column extraction command (HAL, GENOME, SEQUENCE, POSITION, WIDTH)
        #[clap(long, value_parser, default_value = DEFAULT_EXTRACT_COMMAND)]
        extract_command: String,

        /// Reconciliation command (GENE2SPECIES, GENE_TREE, SPECIES_TREE)
        #[clap(long, value_parser, default_value = DEFAULT_RECONCILE_COMMAND)]
        reconcile_command: String,

        /// Species tree query (HAL)
        #[clap(long, value_parser, default_value = DEFAULT_SPECIES_TREE_COMMAND)]
        species_tree_command: String,

        /// Reference sequence sizes query (HAL, GENOME)
        #[clap(long, value_parser, default_value = DEFAULT_CHROM_SIZES_COMMAND)]
        chrom_sizes_command: String,

        /// Write every non-identical coalescence, with both trees, to this file
        #[clap(long, value_parser)]
        write_mismatches_to_file: Option<PathBuf>,

        /// Drop columns whose external tools fail instead of failing the run
        #[clap(long, action)]
        skip_failed_columns: bool,

        /// Seed for reproducible sampling
        #[clap(long, value_parser)]
        seed: Option<u64>,

        /// Directory for partial results and scratch files
        #[clap(long, value_parser)]
        temp_dir: Option<PathBuf>,
    },
    /// Summarize partial results files into a report
    Summarize {
        #[clap(flatten)]
        common: CommonOpts,

        /// Path of the report
        #[clap(short = 'o', long, value_parser)]
        output_file: PathBuf,

        /// Value of the report's file attribute
        #[clap(long, value_parser, default_value = "")]
        label: String,

        /// Copy mismatch records to this file
        #[clap(long, value_parser)]
        write_mismatches_to_file: Option<PathBuf>,

        /// Partial results files
        #[clap(required = true)]
        partial_files: Vec<PathBuf>,
    },
    /// Compare an alignment tree with a reconciled tree and print the records
    Compare {
        #[clap(flatten)]
        common: CommonOpts,

        /// Species tree file (Newick)
        #[clap(short = 's', long, value_parser)]
        species_tree: PathBuf,

        /// Alignment-implied column tree file (Newick)
        #[clap(short = 'a', long, value_parser)]
        hal_tree: PathBuf,

        /// Reconciled gene tree file (Newick)
        #[clap(short = 'r', long, value_parser)]
        reconciled_tree: PathBuf,

        /// Maximum number of coalescences to sample
        #[clap(long, value_parser, default_value_t = 10)]
        coalescences_per_sample: usize,

        /// Only sample pairs whose genomes both appear more than once
        #[clap(long, action)]
        only_duplicated_genomes: bool,

        /// Only sample pairs that include this leaf (`genome.sequence|position`)
        #[clap(long, value_parser)]
        required_entry: Option<String>,

        /// Also print mismatch records
        #[clap(long, action)]
        write_mismatches: bool,

        /// Seed for reproducible sampling
        #[clap(long, value_parser)]
        seed: Option<u64>,
    },
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    match args {
        Args::Score {
            common,
            hal_file,
            ref_genome,
            output_file,
            num_samples,
            samples_per_job,
            coalescences_per_sample,
            width,
            only_duplicated_genomes,
            only_sampled_position,
            min_sequences,
            aligner_command,
            estimator_command,
            extract_command,
            reconcile_command,
            species_tree_command,
            chrom_sizes_command,
            write_mismatches_to_file,
            skip_failed_columns,
            seed,
            temp_dir,
        } => {
            initialize(&common)?;

            let mut config = ScoreConfig::new(&hal_file, &ref_genome);
            config.num_samples = num_samples;
            config.samples_per_job = samples_per_job;
            config.coalescences_per_sample = coalescences_per_sample;
            config.width = width;
            config.only_duplicated_genomes = only_duplicated_genomes;
            config.only_sampled_position = only_sampled_position;
            config.min_sequences = min_sequences;
            config.commands = ToolCommands {
                extract: CommandTemplate::new(&extract_command),
                aligner: CommandTemplate::new(&aligner_command),
                estimator: CommandTemplate::new(&estimator_command),
                reconcile: CommandTemplate::new(&reconcile_command),
                species_tree: CommandTemplate::new(&species_tree_command),
                chrom_sizes: CommandTemplate::new(&chrom_sizes_command),
            };
            config.mismatch_path = write_mismatches_to_file;
            config.skip_failed_columns = skip_failed_columns;
            config.seed = seed;
            config.temp_dir = temp_dir;

            info!(
                "Scoring {} columns of {} in {} ({} per unit, {} threads)",
                num_samples, ref_genome, hal_file, samples_per_job, common.threads
            );
            let outcome = run_score(&config, &ShellCommand, &output_file).map_err(|e| {
                error!("Scoring failed: {}", e);
                e
            })?;
            info!(
                "Wrote report with {} coalescences to {} ({} columns dropped)",
                outcome.summary.aggregate.total(),
                output_file.display(),
                outcome.dropped_columns
            );
        }
        Args::Summarize {
            common,
            output_file,
            label,
            write_mismatches_to_file,
            partial_files,
        } => {
            initialize(&common)?;
            run_summarize(
                &partial_files,
                &output_file,
                write_mismatches_to_file.as_deref(),
                &label,
            )
            .map_err(|e| {
                error!("Summarizing failed: {}", e);
                e
            })?;
        }
        Args::Compare {
            common,
            species_tree,
            hal_tree,
            reconciled_tree,
            coalescences_per_sample,
            only_duplicated_genomes,
            required_entry,
            write_mismatches,
            seed,
        } => {
            initialize(&common)?;

            let mut options = SamplingOptions::new(coalescences_per_sample);
            options.include_non_duplicated_genomes = !only_duplicated_genomes;
            options.required_entry = required_entry
                .as_deref()
                .map(ColumnEntry::parse)
                .transpose()?;

            let stdout = io::stdout();
            let mut writer = BufWriter::new(stdout.lock());
            run_compare(
                &fs::read_to_string(&species_tree)?,
                &fs::read_to_string(&hal_tree)?,
                &fs::read_to_string(&reconciled_tree)?,
                &options,
                write_mismatches,
                seed,
                &mut writer,
            )
            .map_err(|e| {
                error!("Comparison failed: {}", e);
                e
            })?;
            writer.flush()?;
        }
    }

    Ok(())
}

/// Initialize logger and thread pool based on common options
fn initialize(common: &CommonOpts) -> io::Result<()> {
    env_logger::Builder::new()
        .filter_level(match common.verbose {
            0 => log::LevelFilter::Error,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .init();

    ThreadPoolBuilder::new()
        .num_threads(common.threads.get())
        .build_global()
        .map_err(io::Error::other)
}
