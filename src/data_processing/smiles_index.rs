// A SmilesIndex holds one `.smi` source: `<smiles>\t<identifier>` records, no header.
// It is loaded once and never mutated. Iteration follows file order. An identifier
// repeated inside one file keeps the position of its first occurrence and the SMILES
// of its last one (last write wins).

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use ahash::AHashMap;
use log::{info, warn};

use crate::error::{DatasetError, Result};

#[derive(Debug, Clone)]
pub struct SmilesIndex {
    path: PathBuf,
    records: Vec<(String, String)>,      // (identifier, smiles) in file order
    positions: AHashMap<String, usize>, // identifier -> position in `records`
}

impl SmilesIndex {
    /// Reads a SMILES file. Fails on the first line that is not exactly `smiles<TAB>identifier`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| DatasetError::io(path, e))?;
        let reader = BufReader::new(file);

        let mut index = Self {
            path: path.to_path_buf(),
            records: Vec::new(),
            positions: AHashMap::new(),
        };

        for (line_number, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| DatasetError::io(path, e))?;
            // `lines` strips `\n` only.
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }

            let (smiles, identifier) = split_record(line).ok_or_else(|| DatasetError::Format {
                path: path.to_path_buf(),
                line: line_number + 1,
                reason: format!("expected `<smiles>\\t<identifier>`, got {line:?}"),
            })?;
            index.insert(identifier, smiles);
        }

        info!(
            "Loaded {} SMILES records from {}",
            index.len(),
            path.display()
        );
        Ok(index)
    }

    /// Builds an index from in-memory `(identifier, smiles)` records.
    pub fn from_records<I, K, V>(path: impl Into<PathBuf>, records: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut index = Self {
            path: path.into(),
            records: Vec::new(),
            positions: AHashMap::new(),
        };
        for (identifier, smiles) in records {
            let (identifier, smiles): (String, String) = (identifier.into(), smiles.into());
            index.insert(&identifier, &smiles);
        }
        index
    }

    fn insert(&mut self, identifier: &str, smiles: &str) {
        match self.positions.get(identifier) {
            Some(&position) => {
                warn!(
                    "Duplicate identifier {identifier} in {}, keeping the last SMILES",
                    self.path.display()
                );
                self.records[position].1 = smiles.to_string();
            }
            None => {
                self.positions
                    .insert(identifier.to_string(), self.records.len());
                self.records
                    .push((identifier.to_string(), smiles.to_string()));
            }
        }
    }

    pub fn get(&self, identifier: &str) -> Option<&str> {
        self.positions
            .get(identifier)
            .map(|&position| self.records[position].1.as_str())
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.positions.contains_key(identifier)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// `(identifier, smiles)` pairs in file order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.records
            .iter()
            .map(|(identifier, smiles)| (identifier.as_str(), smiles.as_str()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn split_record(line: &str) -> Option<(&str, &str)> {
    let mut fields = line.split('\t');
    let smiles = fields.next()?.trim();
    let identifier = fields.next()?.trim();
    if fields.next().is_some() || smiles.is_empty() || identifier.is_empty() {
        return None;
    }
    Some((smiles, identifier))
}
