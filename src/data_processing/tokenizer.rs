// This module defines the SmilesTokenizer trait, the common interface the polymer dataset uses
// to turn a SMILES string into token indices framed by entity-specific start/stop tokens.
// SmilesLanguage is the built-in implementation: an atom-level vocabulary grown from the
// corpus. PretrainedSmilesTokenizer reuses the vocabulary of a `tokenizers` tokenizer.json.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ahash::AHashMap;
use fancy_regex::Regex;
use log::info;
use serde::{Deserialize, Serialize};

use super::smiles_index::SmilesIndex;
use crate::error::{DatasetError, Result};

/// Atom-level SMILES pattern: bracket atoms, two-letter halogens, organic subset atoms,
/// aromatic atoms, bonds, branches, ring closures and the remaining punctuation.
pub const SMILES_ATOM_PATTERN: &str = r"(\[[^\]]+]|Br?|Cl?|N|O|S|P|F|I|b|c|n|o|s|p|\(|\)|\.|=|#|-|\+|\\|\/|:|~|@|\?|>|\*|\$|\%[0-9]{2}|[0-9])";

pub const PAD_TOKEN: &str = "<PAD>";
pub const UNK_TOKEN: &str = "<UNK>";
pub const START_TOKEN: &str = "<START>";
pub const STOP_TOKEN: &str = "<STOP>";

/// Special tokens always reserved at indices 0-3, in this order.
pub const SPECIAL_TOKENS: [&str; 4] = [PAD_TOKEN, UNK_TOKEN, START_TOKEN, STOP_TOKEN];

pub trait SmilesTokenizer: Send + Sync {
    /// Converts a SMILES string into token indices, framed by the given start and stop tokens.
    fn tokenize(&self, smiles: &str, start_token: &str, stop_token: &str) -> Vec<usize>;

    /// Index used to left-pad sequences to a common length.
    fn padding_index(&self) -> usize;

    /// Looks up a symbolic token name.
    fn token_to_index(&self, token: &str) -> Option<usize>;

    fn vocab_size(&self) -> usize;

    /// Converts token indices back into a string.
    fn decode(&self, tokens: &[usize]) -> String;

    /// String form of the padding token.
    /// The default implementation decodes the padding index.
    fn pad_token_value(&self) -> String {
        self.decode(&[self.padding_index()])
    }
}

/// Start/stop token names for an entity, e.g. `catalyst` -> `<CATALYST_START>`, `<CATALYST_STOP>`.
pub fn boundary_tokens(entity_name: &str) -> (String, String) {
    let upper = entity_name.to_uppercase();
    (format!("<{upper}_START>"), format!("<{upper}_STOP>"))
}

pub(crate) fn compile_atom_pattern() -> Regex {
    Regex::new(SMILES_ATOM_PATTERN).expect("SMILES atom pattern is a valid regex")
}

/// Splits a SMILES string into atom-level tokens.
pub(crate) fn atomwise_tokenize<'a>(smiles: &'a str, pattern: &Regex) -> Vec<&'a str> {
    pattern
        .find_iter(smiles)
        .flatten()
        .map(|m| m.as_str())
        .collect()
}

#[derive(Serialize, Deserialize)]
struct VocabularyFile {
    tokens: Vec<String>,
}

/// Atom-level vocabulary built from the SMILES it is fed.
#[derive(Debug, Clone)]
pub struct SmilesLanguage {
    token_to_index: AHashMap<String, usize>,
    index_to_token: Vec<String>,
    pattern: Regex,
}

impl Default for SmilesLanguage {
    fn default() -> Self {
        let mut language = Self {
            token_to_index: AHashMap::new(),
            index_to_token: Vec::new(),
            pattern: compile_atom_pattern(),
        };
        for token in SPECIAL_TOKENS {
            language.add_token(token);
        }
        language
    }
}

impl SmilesLanguage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a token if it is new and returns its index.
    pub fn add_token(&mut self, token: &str) -> usize {
        if let Some(&index) = self.token_to_index.get(token) {
            return index;
        }
        let index = self.index_to_token.len();
        self.token_to_index.insert(token.to_string(), index);
        self.index_to_token.push(token.to_string());
        index
    }

    /// Adds every atom of a SMILES string to the vocabulary.
    pub fn add_smiles(&mut self, smiles: &str) {
        let atoms = atomwise_tokenize(smiles, &self.pattern);
        for atom in atoms {
            self.add_token(atom);
        }
    }

    /// Adds every record of a SMILES index, in file order.
    pub fn add_index(&mut self, index: &SmilesIndex) {
        for (_, smiles) in index.iter() {
            self.add_smiles(smiles);
        }
    }

    /// Writes the vocabulary as JSON, tokens listed by index.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| DatasetError::io(path, e))?;
        let vocabulary = VocabularyFile {
            tokens: self.index_to_token.clone(),
        };
        serde_json::to_writer_pretty(BufWriter::new(file), &vocabulary)?;
        Ok(())
    }

    /// Reads a vocabulary written by [`SmilesLanguage::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| DatasetError::io(path, e))?;
        let vocabulary: VocabularyFile = serde_json::from_reader(BufReader::new(file))?;

        if vocabulary.tokens.len() < SPECIAL_TOKENS.len()
            || vocabulary.tokens[..SPECIAL_TOKENS.len()] != SPECIAL_TOKENS
        {
            return Err(DatasetError::Tokenizer(format!(
                "vocabulary {} must start with {:?}",
                path.display(),
                SPECIAL_TOKENS
            )));
        }

        let mut language = Self::default();
        for token in &vocabulary.tokens {
            language.add_token(token);
        }
        if language.vocab_size() != vocabulary.tokens.len() {
            return Err(DatasetError::Tokenizer(format!(
                "vocabulary {} contains duplicate tokens",
                path.display()
            )));
        }
        info!("Loaded {} tokens from {}", language.vocab_size(), path.display());
        Ok(language)
    }

    fn unknown_index(&self) -> usize {
        self.token_to_index[UNK_TOKEN]
    }
}

impl SmilesTokenizer for SmilesLanguage {
    fn tokenize(&self, smiles: &str, start_token: &str, stop_token: &str) -> Vec<usize> {
        let unknown = self.unknown_index();
        let lookup = |token: &str| self.token_to_index.get(token).copied().unwrap_or(unknown);

        let atoms = atomwise_tokenize(smiles, &self.pattern);
        let mut tokens = Vec::with_capacity(atoms.len() + 2);
        tokens.push(lookup(start_token));
        tokens.extend(atoms.into_iter().map(|atom| lookup(atom)));
        tokens.push(lookup(stop_token));
        tokens
    }

    fn padding_index(&self) -> usize {
        self.token_to_index[PAD_TOKEN]
    }

    fn token_to_index(&self, token: &str) -> Option<usize> {
        self.token_to_index.get(token).copied()
    }

    fn vocab_size(&self) -> usize {
        self.index_to_token.len()
    }

    fn decode(&self, tokens: &[usize]) -> String {
        tokens
            .iter()
            .map(|&t| {
                self.index_to_token
                    .get(t)
                    .map(String::as_str)
                    .unwrap_or(UNK_TOKEN)
            })
            .collect()
    }
}

/// Tokenizer backed by the vocabulary of a serialized `tokenizers` tokenizer.
///
/// SMILES are split with the atom-level pattern and every atom is looked up in the
/// pretrained vocabulary, so the vocabulary is expected to be atom-level (e.g. `WordLevel`).
pub struct PretrainedSmilesTokenizer {
    tokenizer: tokenizers::Tokenizer,
    pattern: Regex,
    pad_index: usize,
    unk_index: usize,
}

impl PretrainedSmilesTokenizer {
    pub fn from_file(path: impl AsRef<Path>, pad_token: &str, unk_token: &str) -> Result<Self> {
        let path = path.as_ref();
        let tokenizer = tokenizers::Tokenizer::from_file(path)
            .map_err(|e| DatasetError::Tokenizer(format!("{}: {e}", path.display())))?;

        let lookup = |token: &str| {
            tokenizer.token_to_id(token).map(|id| id as usize).ok_or_else(|| {
                DatasetError::Tokenizer(format!("{} has no token {token}", path.display()))
            })
        };
        let pad_index = lookup(pad_token)?;
        let unk_index = lookup(unk_token)?;

        Ok(Self {
            tokenizer,
            pattern: compile_atom_pattern(),
            pad_index,
            unk_index,
        })
    }
}

impl SmilesTokenizer for PretrainedSmilesTokenizer {
    fn tokenize(&self, smiles: &str, start_token: &str, stop_token: &str) -> Vec<usize> {
        let lookup = |token: &str| {
            self.tokenizer
                .token_to_id(token)
                .map(|id| id as usize)
                .unwrap_or(self.unk_index)
        };

        let atoms = atomwise_tokenize(smiles, &self.pattern);
        let mut tokens = Vec::with_capacity(atoms.len() + 2);
        tokens.push(lookup(start_token));
        tokens.extend(atoms.into_iter().map(|atom| lookup(atom)));
        tokens.push(lookup(stop_token));
        tokens
    }

    fn padding_index(&self) -> usize {
        self.pad_index
    }

    fn token_to_index(&self, token: &str) -> Option<usize> {
        self.tokenizer.token_to_id(token).map(|id| id as usize)
    }

    fn vocab_size(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }

    fn decode(&self, tokens: &[usize]) -> String {
        tokens
            .iter()
            .map(|&t| {
                self.tokenizer
                    .id_to_token(t as u32)
                    .unwrap_or_else(|| UNK_TOKEN.to_string())
            })
            .collect()
    }
}
