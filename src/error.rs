//! Error taxonomy shared by the tree model, the sampler/classifier and the
//! pipeline driver.

use crate::tree::NodeId;
use std::io;

#[derive(Debug)]
pub enum ScoreError {
    /// Malformed tree notation, column label, partial-output line or tool output.
    Format(String),
    /// A leaf or node name missing from a gene tree.
    MissingName(String),
    /// A species name missing from the species tree.
    UnknownSpecies(String),
    /// A computed MRCA carries no name.
    UnnamedNode(NodeId),
    NoCommonAncestor(NodeId, NodeId),
    SamplingExhausted { attempts: usize, accepted: usize },
    Invariant(String),
    ExternalTool {
        command: String,
        status: String,
        stderr: String,
    },
    Io(io::Error),
}

impl ScoreError {
    /// Errors that only invalidate the column being scored. Everything else
    /// means the inputs or the tree model are broken and the run must stop.
    pub fn is_column_local(&self) -> bool {
        matches!(
            self,
            ScoreError::MissingName(_)
                | ScoreError::UnnamedNode(_)
                | ScoreError::SamplingExhausted { .. }
        )
    }

    pub fn is_external_tool(&self) -> bool {
        matches!(self, ScoreError::ExternalTool { .. })
    }
}

impl std::fmt::Display for ScoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScoreError::Format(msg) => write!(f, "Format error: {}", msg),
            ScoreError::MissingName(name) => write!(f, "Name '{}' not found in tree", name),
            ScoreError::UnknownSpecies(name) => {
                write!(f, "Species '{}' not found in species tree", name)
            }
            ScoreError::UnnamedNode(id) => write!(f, "Node {} has no name", id),
            ScoreError::NoCommonAncestor(a, b) => {
                write!(f, "No MRCA found for nodes {} and {}", a, b)
            }
            ScoreError::SamplingExhausted { attempts, accepted } => write!(
                f,
                "Gave up sampling coalescences after {} attempts ({} accepted)",
                attempts, accepted
            ),
            ScoreError::Invariant(msg) => write!(f, "Invariant violated: {}", msg),
            ScoreError::ExternalTool {
                command,
                status,
                stderr,
            } => write!(
                f,
                "Command `{}` failed ({}): {}",
                command,
                status,
                stderr.trim()
            ),
            ScoreError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for ScoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScoreError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ScoreError {
    fn from(e: io::Error) -> Self {
        ScoreError::Io(e)
    }
}

impl From<ScoreError> for io::Error {
    fn from(e: ScoreError) -> Self {
        match e {
            ScoreError::Io(e) => e,
            ScoreError::Format(_) => io::Error::new(io::ErrorKind::InvalidData, e.to_string()),
            ScoreError::MissingName(_) | ScoreError::UnknownSpecies(_) => {
                io::Error::new(io::ErrorKind::NotFound, e.to_string())
            }
            other => io::Error::other(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScoreError>;
