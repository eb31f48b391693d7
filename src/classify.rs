//! Placement of an alignment-implied coalescence relative to an
//! independently estimated (reconciled) one, in species-tree terms.

use crate::coalescence::Coalescence;
use crate::column_entry::{genome_of, ColumnEntry};
use crate::error::{Result, ScoreError};
use crate::tree::{NodeId, Tree};
use rustc_hash::FxHashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Both trees put the MRCA at the same species-tree node
    Identical,
    /// The reconciled MRCA species is an ancestor of the alignment one
    Early,
    /// The alignment MRCA species is an ancestor of the reconciled one
    Late,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Identical => "identical",
            Classification::Early => "early",
            Classification::Late => "late",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Classification {
    type Err = ScoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "identical" => Ok(Classification::Identical),
            "early" => Ok(Classification::Early),
            "late" => Ok(Classification::Late),
            _ => Err(ScoreError::Format(format!(
                "Unknown coalescence result '{}'",
                s
            ))),
        }
    }
}

/// Outcome for one matched pair of coalescences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub first: ColumnEntry,
    pub second: ColumnEntry,
    /// Species of the alignment-tree MRCA
    pub hal_species: String,
    /// Reconciled-tree MRCA name
    pub reconciled_species: String,
    pub result: Classification,
}

/// Species tree with its name index, built once per run.
#[derive(Debug, Clone)]
pub struct SpeciesTree {
    tree: Tree,
    name_to_id: FxHashMap<String, NodeId>,
    newick: String,
}

impl SpeciesTree {
    pub fn parse(newick: &str) -> Result<Self> {
        let tree = Tree::parse(newick)?;
        let name_to_id = tree.name_to_id();
        Ok(SpeciesTree {
            tree,
            name_to_id,
            newick: newick.trim().to_string(),
        })
    }

    pub fn newick(&self) -> &str {
        &self.newick
    }

    pub fn id_of(&self, species: &str) -> Result<NodeId> {
        self.name_to_id
            .get(species)
            .copied()
            .ok_or_else(|| ScoreError::UnknownSpecies(species.to_string()))
    }

    /// Classifies one alignment-tree coalescence against the reconciled
    /// coalescence of the same pair.
    pub fn classify(&self, hal: &Coalescence, reconciled: &Coalescence) -> Result<Verdict> {
        if !hal.same_pair(reconciled) {
            return Err(ScoreError::Invariant(format!(
                "Coalescence pairs differ: ({}, {}) vs ({}, {})",
                hal.first, hal.second, reconciled.first, reconciled.second
            )));
        }

        // Ancestral labels carry sequence and position after the species name
        let hal_species = genome_of(&hal.mrca);
        let hal_id = self.id_of(hal_species)?;
        let reconciled_id = self.id_of(&reconciled.mrca)?;
        let species_mrca = self.tree.mrca(hal_id, reconciled_id)?;

        let result = if reconciled_id == hal_id {
            Classification::Identical
        } else if species_mrca == hal_id {
            Classification::Late
        } else if species_mrca == reconciled_id {
            Classification::Early
        } else {
            return Err(ScoreError::Invariant(format!(
                "Species '{}' and '{}' are not on a common lineage",
                hal_species, reconciled.mrca
            )));
        };

        Ok(Verdict {
            first: hal.first.clone(),
            second: hal.second.clone(),
            hal_species: hal_species.to_string(),
            reconciled_species: reconciled.mrca.clone(),
            result,
        })
    }

    /// Classifies positionally matched coalescence lists.
    pub fn classify_all(
        &self,
        hal: &[Coalescence],
        reconciled: &[Coalescence],
    ) -> Result<Vec<Verdict>> {
        if hal.len() != reconciled.len() {
            return Err(ScoreError::Invariant(format!(
                "{} alignment coalescences but {} reconciled coalescences",
                hal.len(),
                reconciled.len()
            )));
        }
        hal.iter()
            .zip(reconciled)
            .map(|(h, r)| self.classify(h, r))
            .collect()
    }
}
