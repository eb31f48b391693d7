//! Partial-output records written by the sampling units, and the
//! finalization step that folds them into per-genome and per-genome-pair
//! tallies and renders the report.
//!
//! Partial files are tab-separated, one record per line:
//! * `coalescence  g1 seq1 pos1  g2 seq2 pos2  result`
//! * `mismatch  g1 seq1 pos1  g2 seq2 pos2  halSpecies reconciledSpecies result halTree reconciledTree`

use crate::classify::{Classification, Verdict};
use crate::column_entry::ColumnEntry;
use crate::error::{Result, ScoreError};
use log::{debug, info};
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// `coalescence` record line (without trailing newline).
pub fn coalescence_line(verdict: &Verdict) -> String {
    format!(
        "coalescence\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
        verdict.first.genome,
        verdict.first.sequence,
        verdict.first.position,
        verdict.second.genome,
        verdict.second.sequence,
        verdict.second.position,
        verdict.result
    )
}

/// `mismatch` record line (without trailing newline), carrying both trees.
pub fn mismatch_line(verdict: &Verdict, hal_newick: &str, reconciled_newick: &str) -> String {
    format!(
        "mismatch\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
        verdict.first.genome,
        verdict.first.sequence,
        verdict.first.position,
        verdict.second.genome,
        verdict.second.sequence,
        verdict.second.position,
        verdict.hal_species,
        verdict.reconciled_species,
        verdict.result,
        hal_newick.trim(),
        reconciled_newick.trim()
    )
}

#[derive(Debug, Clone, PartialEq)]
pub enum PartialRecord {
    Coalescence {
        first: ColumnEntry,
        second: ColumnEntry,
        result: Classification,
    },
    Mismatch {
        first: ColumnEntry,
        second: ColumnEntry,
        hal_species: String,
        reconciled_species: String,
        result: Classification,
        hal_tree: String,
        reconciled_tree: String,
    },
}

impl PartialRecord {
    /// Parses one partial-output line. Blank lines give `None`.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Ok(None);
        }
        let fields: Vec<&str> = line.split('\t').collect();
        let expected = match fields[0] {
            "coalescence" => 8,
            "mismatch" => 12,
            other => {
                return Err(ScoreError::Format(format!(
                    "Unknown record type '{}' in line '{}'",
                    other, line
                )))
            }
        };
        if fields.len() != expected {
            return Err(ScoreError::Format(format!(
                "Expected {} fields but found {} in line '{}'",
                expected,
                fields.len(),
                line
            )));
        }

        let entry = |genome: &str, sequence: &str, position: &str| -> Result<ColumnEntry> {
            let position = position.parse::<u64>().map_err(|e| {
                ScoreError::Format(format!(
                    "Invalid position '{}' in line '{}': {}",
                    position, line, e
                ))
            })?;
            Ok(ColumnEntry::new(genome, sequence, position))
        };
        let first = entry(fields[1], fields[2], fields[3])?;
        let second = entry(fields[4], fields[5], fields[6])?;

        let record = if fields[0] == "coalescence" {
            PartialRecord::Coalescence {
                first,
                second,
                result: fields[7].parse()?,
            }
        } else {
            PartialRecord::Mismatch {
                first,
                second,
                hal_species: fields[7].to_string(),
                reconciled_species: fields[8].to_string(),
                result: fields[9].parse()?,
                hal_tree: fields[10].to_string(),
                reconciled_tree: fields[11].to_string(),
            }
        };
        Ok(Some(record))
    }
}

/// Counts of each classification within one scope.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResultTally {
    pub identical: u64,
    pub early: u64,
    pub late: u64,
}

impl ResultTally {
    pub fn record(&mut self, result: Classification) {
        match result {
            Classification::Identical => self.identical += 1,
            Classification::Early => self.early += 1,
            Classification::Late => self.late += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.identical + self.early + self.late
    }

    /// (identical, early, late) fractions. Empty scopes divide by one, so
    /// they report zeros.
    pub fn fractions(&self) -> (f64, f64, f64) {
        let total = match self.total() {
            0 => 1.0,
            n => n as f64,
        };
        (
            self.identical as f64 / total,
            self.early as f64 / total,
            self.late as f64 / total,
        )
    }

    fn attributes(&self) -> String {
        let (identical, early, late) = self.fractions();
        format!(
            "identical=\"{}\" early=\"{}\" late=\"{}\" identicalFraction=\"{:.6}\" earlyFraction=\"{:.6}\" lateFraction=\"{:.6}\"",
            self.identical, self.early, self.late, identical, early, late
        )
    }
}

#[derive(Debug, Default, Clone)]
pub struct GenomeResults {
    pub aggregate: ResultTally,
    /// Tallies against every other genome (or itself, for paralogs)
    pub pairs: FxHashMap<String, ResultTally>,
}

/// Accumulated results of a run.
#[derive(Debug, Default, Clone)]
pub struct CoalescenceSummary {
    pub aggregate: ResultTally,
    pub genomes: FxHashMap<String, GenomeResults>,
}

impl CoalescenceSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one verdict between `genome1` and `genome2`. Each genome's
    /// own tally is bumped once, and the pair tally in both directions, so
    /// pair tallies stay symmetric.
    pub fn record(&mut self, genome1: &str, genome2: &str, result: Classification) {
        self.aggregate.record(result);

        self.genome_mut(genome1).aggregate.record(result);
        self.genome_mut(genome1).pair_mut(genome2).record(result);
        if genome1 != genome2 {
            self.genome_mut(genome2).aggregate.record(result);
            self.genome_mut(genome2).pair_mut(genome1).record(result);
        }
    }

    fn genome_mut(&mut self, genome: &str) -> &mut GenomeResults {
        self.genomes.entry(genome.to_string()).or_default()
    }

    pub fn genome(&self, genome: &str) -> Option<&GenomeResults> {
        self.genomes.get(genome)
    }

    /// Tally of a genome pair; zero if the pair was never observed.
    pub fn pair(&self, genome1: &str, genome2: &str) -> ResultTally {
        self.genomes
            .get(genome1)
            .and_then(|g| g.pairs.get(genome2))
            .copied()
            .unwrap_or_default()
    }

    /// Folds the records of one partial file into this summary. Mismatch
    /// lines are copied verbatim to `mismatches` when given.
    pub fn read_partial<R: BufRead>(
        &mut self,
        reader: R,
        mut mismatches: Option<&mut dyn Write>,
    ) -> Result<()> {
        for line in reader.lines() {
            let line = line?;
            match PartialRecord::parse(&line)? {
                None => continue,
                Some(PartialRecord::Coalescence {
                    first,
                    second,
                    result,
                }) => self.record(&first.genome, &second.genome, result),
                Some(PartialRecord::Mismatch { .. }) => match mismatches.as_mut() {
                    Some(writer) => writeln!(writer, "{}", line)?,
                    None => debug!("Ignoring mismatch record: no mismatch file configured"),
                },
            }
        }
        Ok(())
    }

    /// Writes the report. Genomes and genome pairs appear in natural order.
    pub fn write_report<W: Write>(&self, writer: &mut W, label: &str) -> Result<()> {
        writeln!(writer, "<coalescenceTest file=\"{}\">", escape_attribute(label))?;
        writeln!(
            writer,
            "  <aggregateCoalescenceResults {} />",
            self.aggregate.attributes()
        )?;

        let mut genomes: Vec<&String> = self.genomes.keys().collect();
        genomes.sort_by(|a, b| natord::compare(a, b));
        for genome1 in genomes {
            let results = &self.genomes[genome1];
            writeln!(
                writer,
                "  <genomeCoalescenceTest genome=\"{}\">",
                escape_attribute(genome1)
            )?;
            writeln!(
                writer,
                "    <aggregateCoalescenceResults {} />",
                results.aggregate.attributes()
            )?;
            let mut partners: Vec<&String> = results.pairs.keys().collect();
            partners.sort_by(|a, b| natord::compare(a, b));
            for genome2 in partners {
                writeln!(
                    writer,
                    "    <coalescenceResults genome1=\"{}\" genome2=\"{}\" {} />",
                    escape_attribute(genome1),
                    escape_attribute(genome2),
                    results.pairs[genome2].attributes()
                )?;
            }
            writeln!(writer, "  </genomeCoalescenceTest>")?;
        }
        writeln!(writer, "</coalescenceTest>")?;
        Ok(())
    }
}

impl GenomeResults {
    fn pair_mut(&mut self, genome: &str) -> &mut ResultTally {
        self.pairs.entry(genome.to_string()).or_default()
    }
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Finalization step: reads every partial file (in any order), optionally
/// copying mismatch records to `mismatch_path`, and writes the report.
pub fn summarize<P: AsRef<Path>>(
    partial_files: &[P],
    output_file: &Path,
    mismatch_path: Option<&Path>,
    label: &str,
) -> Result<CoalescenceSummary> {
    let mut mismatch_writer = match mismatch_path {
        Some(path) => Some(std::io::BufWriter::new(File::create(path)?)),
        None => None,
    };

    let mut summary = CoalescenceSummary::new();
    for path in partial_files {
        let path = path.as_ref();
        debug!("Reading partial results from {}", path.display());
        let reader = BufReader::new(File::open(path)?);
        summary.read_partial(
            reader,
            mismatch_writer.as_mut().map(|w| w as &mut dyn Write),
        )?;
    }
    if let Some(writer) = mismatch_writer.as_mut() {
        writer.flush()?;
    }

    let mut writer = std::io::BufWriter::new(File::create(output_file)?);
    summary.write_report(&mut writer, label)?;
    writer.flush()?;

    info!(
        "Summarized {} coalescences from {} partial files into {}",
        summary.aggregate.total(),
        partial_files.len(),
        output_file.display()
    );
    Ok(summary)
}
