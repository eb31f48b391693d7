//! Boundary to the external tools of the pipeline: column extraction,
//! realignment, tree estimation, reconciliation and alignment queries.
//!
//! Tools are described by command templates whose uppercase placeholders
//! are substituted with shell-quoted values, and run through an
//! [ExternalCommand] so the scoring code never spawns processes itself.

use crate::column_entry::genome_of;
use crate::error::{Result, ScoreError};
use log::debug;
use std::io::{self, Write};
use std::process::Command;

/// Result of running one command line.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    /// Human-readable exit status
    pub status: String,
    pub stdout: String,
    pub stderr: String,
}

/// Something that can run a command line and report how it went.
pub trait ExternalCommand: Send + Sync {
    fn execute(&self, command_line: &str) -> io::Result<CommandOutput>;
}

/// Runs command lines through `sh -c`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellCommand;

impl ExternalCommand for ShellCommand {
    fn execute(&self, command_line: &str) -> io::Result<CommandOutput> {
        let output = Command::new("sh").arg("-c").arg(command_line).output()?;
        Ok(CommandOutput {
            success: output.status.success(),
            status: output.status.to_string(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Runs `command_line` and returns its stdout, failing on a non-zero exit.
pub fn run_checked(runner: &dyn ExternalCommand, command_line: &str) -> Result<String> {
    debug!("Running: {}", command_line);
    let output = runner.execute(command_line)?;
    if !output.success {
        return Err(ScoreError::ExternalTool {
            command: command_line.to_string(),
            status: output.status,
            stderr: output.stderr,
        });
    }
    Ok(output.stdout)
}

/// A command line with uppercase placeholders such as `INPUT` and `OUTPUT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate(String);

impl CommandTemplate {
    pub fn new(template: &str) -> Self {
        CommandTemplate(template.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Substitutes placeholders in a single left-to-right pass, so values are
    /// never themselves searched for placeholders. Values are shell-quoted.
    /// Where two placeholders start at the same offset the longer one wins.
    pub fn fill(&self, values: &[(&str, &str)]) -> String {
        let mut placeholders: Vec<&(&str, &str)> = values.iter().collect();
        placeholders.sort_by_key(|(name, _)| std::cmp::Reverse(name.len()));

        let template = self.0.as_str();
        let mut filled = String::with_capacity(template.len());
        let mut pos = 0;
        'outer: while pos < template.len() {
            let rest = &template[pos..];
            for (name, value) in &placeholders {
                if !name.is_empty() && rest.starts_with(name) {
                    filled.push_str(&shell_quote(value));
                    pos += name.len();
                    continue 'outer;
                }
            }
            let Some(c) = rest.chars().next() else { break };
            filled.push(c);
            pos += c.len_utf8();
        }
        filled
    }
}

impl std::fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Single-quotes a value for `sh`.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Output of the column extractor: the alignment-implied tree on a `#` line
/// followed by a FASTA of the region around every column entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnWindow {
    pub hal_tree: String,
    /// FASTA without the tree line
    pub fasta: String,
    /// FASTA headers without the leading `>`
    pub headers: Vec<String>,
}

impl ColumnWindow {
    pub fn parse(output: &str) -> Result<Self> {
        let mut lines = output.lines();
        let hal_tree = match lines.next() {
            Some(first) if first.starts_with('#') => first[1..].trim().to_string(),
            _ => {
                return Err(ScoreError::Format(
                    "Column extraction output does not start with a '#<tree>' line".to_string(),
                ))
            }
        };

        let mut fasta = String::new();
        let mut headers = Vec::new();
        for line in lines {
            if let Some(header) = line.strip_prefix('>') {
                headers.push(header.trim().to_string());
            }
            fasta.push_str(line);
            fasta.push('\n');
        }
        Ok(ColumnWindow {
            hal_tree,
            fasta,
            headers,
        })
    }

    pub fn num_sequences(&self) -> usize {
        self.headers.len()
    }

    /// Writes a `header<TAB>genome` map for the reconciler.
    pub fn write_gene_to_species<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for header in &self.headers {
            writeln!(writer, "{}\t{}", header, genome_of(header))?;
        }
        Ok(())
    }
}
