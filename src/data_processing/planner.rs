// Two construction-time passes over the annotation rows. The first decides which rows
// resolve against every entity's SMILES index and yields the remap table from sample
// position to row position. The second fixes, per entity, the padded length every
// sample of that entity will have.

use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

use super::annotation::AnnotationRow;
use super::smiles_index::SmilesIndex;
use super::tokenizer::SmilesTokenizer;

/// Positions of the rows whose every identifier is present in the matching index.
///
/// `indices` is in entity order, like `AnnotationRow::identifiers`.
pub fn resolvable_rows(rows: &[AnnotationRow], indices: &[Arc<SmilesIndex>]) -> Vec<usize> {
    rows.iter()
        .enumerate()
        .filter(|(position, row)| {
            let unresolved = row
                .identifiers
                .iter()
                .zip(indices)
                .find(|(identifier, index)| !index.contains(identifier));
            match unresolved {
                Some((identifier, index)) => {
                    debug!(
                        "Dropping annotation row {position}: {identifier:?} not in {}",
                        index.path().display()
                    );
                    false
                }
                None => true,
            }
        })
        .map(|(position, _)| position)
        .collect()
}

/// Which SMILES the padded length of an entity is measured over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaddingScope {
    /// SMILES referenced by usable annotation rows.
    #[default]
    UsableRows,
    /// Every record of the entity's SMILES file, referenced or not.
    Corpus,
}

/// Longest tokenized sequence per entity over the usable rows, boundary tokens included.
///
/// `boundary_tokens` holds the `(start, stop)` token names per entity.
pub fn plan_padding_lengths(
    rows: &[AnnotationRow],
    usable: &[usize],
    indices: &[Arc<SmilesIndex>],
    boundary_tokens: &[(String, String)],
    tokenizer: &dyn SmilesTokenizer,
) -> Vec<usize> {
    indices
        .iter()
        .zip(boundary_tokens)
        .enumerate()
        .map(|(entity, (index, (start, stop)))| {
            usable
                .iter()
                .filter_map(|&position| index.get(&rows[position].identifiers[entity]))
                .map(|smiles| tokenizer.tokenize(smiles, start, stop).len())
                .max()
                .unwrap_or(0)
        })
        .collect()
}

/// Longest tokenized sequence per entity over every record of its index.
pub fn plan_corpus_padding_lengths(
    indices: &[Arc<SmilesIndex>],
    boundary_tokens: &[(String, String)],
    tokenizer: &dyn SmilesTokenizer,
) -> Vec<usize> {
    indices
        .iter()
        .zip(boundary_tokens)
        .map(|(index, (start, stop))| {
            index
                .iter()
                .map(|(_, smiles)| tokenizer.tokenize(smiles, start, stop).len())
                .max()
                .unwrap_or(0)
        })
        .collect()
}
