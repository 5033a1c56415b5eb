// PolymerDataset joins several SMILES indices (one per entity, e.g. monomer and catalyst)
// with an annotation table. Construction loads every file, builds the vocabulary, filters
// out rows whose identifiers do not resolve in every index and fixes the padded length of
// each entity. Reading a sample afterwards is a pure lookup: tokenize each entity with its
// own start/stop tokens and left-pad it to that entity's length.

use std::sync::Arc;

use burn::config::Config;
use burn::data::dataset::Dataset;
use burn::tensor::{backend::Backend, Data, ElementConversion, Int, Shape, Tensor};
use derive_new::new;
use log::{info, warn};

use super::annotation::AnnotationTable;
use super::planner::{
    plan_corpus_padding_lengths, plan_padding_lengths, resolvable_rows, PaddingScope,
};
use super::smiles_index::SmilesIndex;
use super::tokenizer::{boundary_tokens, SmilesLanguage, SmilesTokenizer};
use crate::error::{self, DatasetError};

/// Files and options describing one polymer dataset.
#[derive(Config)]
pub struct PolymerDatasetConfig {
    /// One `.smi` file per entity, in `entity_names` order.
    pub smi_filepaths: Vec<String>,
    pub annotations_filepath: String,
    /// Entity names, matched case-insensitively against the annotation columns.
    pub entity_names: Vec<String>,
    /// Label columns, in output order. All non-entity columns when absent.
    pub annotations_column_names: Option<Vec<String>>,
    /// Row index column of the annotation file. It may repeat and is never a label.
    pub index_column: Option<String>,
    /// Fixed padded length per entity, replacing the planned lengths.
    pub padding_lengths: Option<Vec<usize>>,
    /// SMILES the planned lengths are measured over.
    #[config(default = "PaddingScope::UsableRows")]
    pub padding_scope: PaddingScope,
}

/// One sample: a left-padded token sequence per entity, then the labels.
#[derive(new, Clone, Debug, PartialEq)]
pub struct PolymerItem {
    pub entities: Vec<Vec<usize>>, // Token indices per entity, in entity order
    pub labels: Vec<f32>,          // Label values, in label column order
}

/// A sample converted to tensors.
#[derive(Debug, Clone, new)]
pub struct PolymerSample<B: Backend> {
    pub entities: Vec<Tensor<B, 1, Int>>,
    pub labels: Tensor<B, 1>,
}

impl PolymerItem {
    pub fn to_tensors<B: Backend>(&self, device: &B::Device) -> PolymerSample<B> {
        let entities = self
            .entities
            .iter()
            .map(|tokens| {
                let data: Data<B::IntElem, 1> = Data::new(
                    tokens.iter().map(|&t| (t as i64).elem()).collect(),
                    Shape::new([tokens.len()]),
                );
                Tensor::from_data(data, device)
            })
            .collect();

        let labels: Data<B::FloatElem, 1> = Data::new(
            self.labels.iter().map(|&v| v.elem()).collect(),
            Shape::new([self.labels.len()]),
        );

        PolymerSample {
            entities,
            labels: Tensor::from_data(labels, device),
        }
    }
}

pub struct PolymerDataset {
    entity_names: Vec<String>,
    boundary_tokens: Vec<(String, String)>, // (start, stop) token names per entity
    indices: Vec<Arc<SmilesIndex>>,         // SMILES index per entity
    annotations: Arc<AnnotationTable>,
    tokenizer: Arc<dyn SmilesTokenizer>,
    usable_rows: Vec<usize>, // Sample position -> annotation row position
    padding_lengths: Vec<usize>,
}

impl PolymerDataset {
    /// Loads the dataset with a vocabulary built from all of its SMILES files.
    pub fn new(config: &PolymerDatasetConfig) -> error::Result<Self> {
        Self::with_language(config, SmilesLanguage::new())
    }

    /// Loads the dataset, extending `language` with the boundary tokens of every entity
    /// and with the atoms of every record of every SMILES file.
    pub fn with_language(
        config: &PolymerDatasetConfig,
        mut language: SmilesLanguage,
    ) -> error::Result<Self> {
        if config.smi_filepaths.len() != config.entity_names.len() {
            return Err(DatasetError::config(format!(
                "got {} SMILES files for {} entity names",
                config.smi_filepaths.len(),
                config.entity_names.len()
            )));
        }

        let indices = config
            .smi_filepaths
            .iter()
            .map(|path| SmilesIndex::load(path).map(Arc::new))
            .collect::<error::Result<Vec<_>>>()?;

        let annotations = AnnotationTable::load(
            &config.annotations_filepath,
            &config.entity_names,
            config.annotations_column_names.as_deref(),
            config.index_column.as_deref(),
        )?;

        for name in &config.entity_names {
            let (start, stop) = boundary_tokens(name);
            language.add_token(&start);
            language.add_token(&stop);
        }
        for index in &indices {
            language.add_index(index);
        }

        Self::from_parts(
            config.entity_names.clone(),
            indices,
            Arc::new(annotations),
            Arc::new(language),
            config.padding_lengths.clone(),
            config.padding_scope,
        )
    }

    /// Joins already loaded sources. Indices and table may be shared with other datasets.
    ///
    /// The tokenizer must know the boundary tokens of every entity.
    pub fn from_parts(
        entity_names: Vec<String>,
        indices: Vec<Arc<SmilesIndex>>,
        annotations: Arc<AnnotationTable>,
        tokenizer: Arc<dyn SmilesTokenizer>,
        padding_lengths: Option<Vec<usize>>,
        padding_scope: PaddingScope,
    ) -> error::Result<Self> {
        if entity_names.is_empty() {
            return Err(DatasetError::config("at least one entity name is required"));
        }
        if indices.len() != entity_names.len() {
            return Err(DatasetError::config(format!(
                "got {} SMILES indices for {} entity names",
                indices.len(),
                entity_names.len()
            )));
        }
        let columns = annotations.entity_columns();
        let bound = columns.len() == entity_names.len()
            && columns
                .iter()
                .zip(&entity_names)
                .all(|(column, name)| column.to_lowercase() == name.to_lowercase());
        if !bound {
            return Err(DatasetError::config(format!(
                "entities {entity_names:?} do not match annotation columns {columns:?}"
            )));
        }

        let boundary_tokens: Vec<(String, String)> =
            entity_names.iter().map(|name| boundary_tokens(name)).collect();
        for token in boundary_tokens.iter().flat_map(|(start, stop)| [start, stop]) {
            if tokenizer.token_to_index(token).is_none() {
                return Err(DatasetError::config(format!(
                    "tokenizer has no boundary token {token}"
                )));
            }
        }

        let usable_rows = resolvable_rows(annotations.rows(), &indices);
        let planned = match padding_scope {
            PaddingScope::UsableRows => plan_padding_lengths(
                annotations.rows(),
                &usable_rows,
                &indices,
                &boundary_tokens,
                tokenizer.as_ref(),
            ),
            PaddingScope::Corpus => {
                plan_corpus_padding_lengths(&indices, &boundary_tokens, tokenizer.as_ref())
            }
        };

        let padding_lengths = match padding_lengths {
            Some(lengths) => {
                if lengths.len() != entity_names.len() {
                    return Err(DatasetError::config(format!(
                        "got {} padding lengths for {} entity names",
                        lengths.len(),
                        entity_names.len()
                    )));
                }
                for ((name, &fixed), &longest) in entity_names.iter().zip(&lengths).zip(&planned) {
                    if fixed < longest {
                        warn!(
                            "Padding length {fixed} for {name} is below its longest sequence \
                             ({longest}); longer sequences are truncated"
                        );
                    }
                }
                lengths
            }
            None => planned,
        };

        info!(
            "Polymer dataset: {} of {} annotation rows usable, padding lengths {:?} for {:?}",
            usable_rows.len(),
            annotations.len(),
            padding_lengths,
            entity_names
        );

        Ok(Self {
            entity_names,
            boundary_tokens,
            indices,
            annotations,
            tokenizer,
            usable_rows,
            padding_lengths,
        })
    }

    /// Returns the sample at `position`, counted over usable rows only.
    pub fn get_item(&self, position: usize) -> error::Result<PolymerItem> {
        let row_position = *self
            .usable_rows
            .get(position)
            .ok_or(DatasetError::IndexOutOfRange {
                index: position,
                len: self.usable_rows.len(),
            })?;
        let row = &self.annotations.rows()[row_position];

        let entities = row
            .identifiers
            .iter()
            .enumerate()
            .map(|(entity, identifier)| {
                // usable rows resolve in every index
                let smiles = self.indices[entity].get(identifier).unwrap_or_default();
                let (start, stop) = &self.boundary_tokens[entity];
                left_pad(
                    self.tokenizer.tokenize(smiles, start, stop),
                    self.padding_lengths[entity],
                    self.tokenizer.padding_index(),
                )
            })
            .collect();

        Ok(PolymerItem::new(entities, row.labels.clone()))
    }

    pub fn len(&self) -> usize {
        self.usable_rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.usable_rows.is_empty()
    }

    pub fn entity_names(&self) -> &[String] {
        &self.entity_names
    }

    /// `(start, stop)` token names per entity.
    pub fn boundary_tokens(&self) -> &[(String, String)] {
        &self.boundary_tokens
    }

    pub fn padding_lengths(&self) -> &[usize] {
        &self.padding_lengths
    }

    pub fn label_columns(&self) -> &[String] {
        self.annotations.label_columns()
    }

    pub fn tokenizer(&self) -> Arc<dyn SmilesTokenizer> {
        self.tokenizer.clone()
    }

    pub fn smiles_indices(&self) -> &[Arc<SmilesIndex>] {
        &self.indices
    }

    pub fn annotations(&self) -> Arc<AnnotationTable> {
        self.annotations.clone()
    }
}

impl Dataset<PolymerItem> for PolymerDataset {
    fn get(&self, index: usize) -> Option<PolymerItem> {
        self.get_item(index).ok()
    }

    fn len(&self) -> usize {
        self.usable_rows.len()
    }
}

/// Left-pads `tokens` with `padding_index` up to `length`.
/// Longer sequences keep their first `length` tokens.
pub fn left_pad(mut tokens: Vec<usize>, length: usize, padding_index: usize) -> Vec<usize> {
    if tokens.len() >= length {
        tokens.truncate(length);
        return tokens;
    }
    let mut padded = vec![padding_index; length - tokens.len()];
    padded.extend(tokens);
    padded
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    /// Two entities over in-memory indices; the annotation file is the only file on disk.
    type Fixture = (tempfile::TempDir, Vec<Arc<SmilesIndex>>, Arc<AnnotationTable>);

    fn fixture(annotations: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("annotations.csv");
        std::fs::write(&path, annotations).unwrap();

        let indices = vec![
            Arc::new(SmilesIndex::from_records(
                "monomer.smi",
                [("M1", "CCO"), ("M2", "C"), ("M3", "NCCS")],
            )),
            Arc::new(SmilesIndex::from_records(
                "catalyst.smi",
                [("C1", "CC"), ("C2", "NCCSCCCCC")],
            )),
        ];
        let table =
            AnnotationTable::load(&path, &names(&["monomer", "catalyst"]), None, None).unwrap();
        (dir, indices, Arc::new(table))
    }

    fn language(indices: &[Arc<SmilesIndex>]) -> Arc<SmilesLanguage> {
        let mut language = SmilesLanguage::new();
        for name in ["monomer", "catalyst"] {
            let (start, stop) = boundary_tokens(name);
            language.add_token(&start);
            language.add_token(&stop);
        }
        for index in indices {
            language.add_index(index);
        }
        Arc::new(language)
    }

    #[test]
    fn test_left_pad_shorter_sequence() {
        assert_eq!(left_pad(vec![7, 8], 5, 0), vec![0, 0, 0, 7, 8]);
    }

    #[test]
    fn test_left_pad_full_length_unchanged() {
        assert_eq!(left_pad(vec![7, 8, 9], 3, 0), vec![7, 8, 9]);
    }

    #[test]
    fn test_left_pad_truncates_keeping_leading_tokens() {
        assert_eq!(left_pad(vec![7, 8, 9, 10], 2, 0), vec![7, 8]);
    }

    #[test]
    fn test_from_parts_filters_and_pads() {
        let (_dir, indices, table) =
            fixture("label_0,monomer,catalyst\n1.0,M1,C1\n2.0,M9,C1\n3.0,M3,C2\n");
        let language = language(&indices);
        let dataset = PolymerDataset::from_parts(
            names(&["monomer", "catalyst"]),
            indices,
            table,
            language.clone(),
            None,
            PaddingScope::UsableRows,
        )
        .unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.padding_lengths(), &[6, 11]);

        let item = dataset.get_item(0).unwrap();
        let pad = language.padding_index();
        let start = language.token_to_index("<MONOMER_START>").unwrap();
        let stop = language.token_to_index("<MONOMER_STOP>").unwrap();
        let c = language.token_to_index("C").unwrap();
        let o = language.token_to_index("O").unwrap();
        assert_eq!(item.entities[0], vec![pad, start, c, c, o, stop]);
        assert_eq!(item.entities[1].len(), 11);
        assert_eq!(item.labels, vec![1.0]);

        // row 1 is skipped
        assert_eq!(dataset.get_item(1).unwrap().labels, vec![3.0]);
    }

    #[test]
    fn test_get_item_out_of_range() {
        let (_dir, indices, table) = fixture("label_0,monomer,catalyst\n1.0,M1,C1\n");
        let language = language(&indices);
        let dataset = PolymerDataset::from_parts(
            names(&["monomer", "catalyst"]),
            indices,
            table,
            language,
            None,
            PaddingScope::UsableRows,
        )
        .unwrap();

        assert!(matches!(
            dataset.get_item(1),
            Err(DatasetError::IndexOutOfRange { index: 1, len: 1 })
        ));
        assert!(Dataset::get(&dataset, 1).is_none());
    }

    #[test]
    fn test_get_item_is_deterministic() {
        let (_dir, indices, table) = fixture("label_0,monomer,catalyst\n1.0,M1,C1\n3.0,M3,C2\n");
        let language = language(&indices);
        let dataset = PolymerDataset::from_parts(
            names(&["monomer", "catalyst"]),
            indices,
            table,
            language,
            None,
            PaddingScope::UsableRows,
        )
        .unwrap();

        assert_eq!(dataset.get_item(1).unwrap(), dataset.get_item(1).unwrap());
    }

    #[test]
    fn test_explicit_padding_lengths() {
        let (_dir, indices, table) = fixture("label_0,monomer,catalyst\n1.0,M1,C1\n");
        let language = language(&indices);
        let dataset = PolymerDataset::from_parts(
            names(&["monomer", "catalyst"]),
            indices,
            table,
            language.clone(),
            Some(vec![8, 3]),
            PaddingScope::UsableRows,
        )
        .unwrap();

        let item = dataset.get_item(0).unwrap();
        let pad = language.padding_index();
        assert_eq!(item.entities[0][..3], [pad, pad, pad]);
        assert_eq!(item.entities[0].len(), 8);
        // <CATALYST_START> C C <CATALYST_STOP> truncated to three tokens
        let c = language.token_to_index("C").unwrap();
        let start = language.token_to_index("<CATALYST_START>").unwrap();
        assert_eq!(item.entities[1], vec![start, c, c]);
    }

    #[test]
    fn test_padding_length_count_mismatch() {
        let (_dir, indices, table) = fixture("label_0,monomer,catalyst\n1.0,M1,C1\n");
        let language = language(&indices);
        let result = PolymerDataset::from_parts(
            names(&["monomer", "catalyst"]),
            indices,
            table,
            language,
            Some(vec![8]),
            PaddingScope::UsableRows,
        );
        assert!(matches!(result, Err(DatasetError::Configuration(_))));
    }

    #[test]
    fn test_tokenizer_without_boundary_tokens() {
        let (_dir, indices, table) = fixture("label_0,monomer,catalyst\n1.0,M1,C1\n");
        let result = PolymerDataset::from_parts(
            names(&["monomer", "catalyst"]),
            indices,
            table,
            Arc::new(SmilesLanguage::new()),
            None,
            PaddingScope::UsableRows,
        );
        assert!(matches!(result, Err(DatasetError::Configuration(_))));
    }

    #[test]
    fn test_entity_names_must_match_table() {
        let (_dir, indices, table) = fixture("label_0,monomer,catalyst\n1.0,M1,C1\n");
        let language = language(&indices);
        let result = PolymerDataset::from_parts(
            names(&["catalyst", "monomer"]),
            indices,
            table,
            language,
            None,
            PaddingScope::UsableRows,
        );
        assert!(matches!(result, Err(DatasetError::Configuration(_))));
    }

    #[test]
    fn test_shared_sources_across_datasets() {
        let (_dir, indices, table) =
            fixture("label_0,monomer,catalyst\n1.0,M1,C1\n3.0,M3,C2\n");
        let language = language(&indices);

        let first = PolymerDataset::from_parts(
            names(&["monomer", "catalyst"]),
            indices.clone(),
            table.clone(),
            language.clone(),
            None,
            PaddingScope::UsableRows,
        )
        .unwrap();
        let second = PolymerDataset::from_parts(
            names(&["MONOMER", "Catalyst"]),
            indices,
            table,
            language,
            Some(vec![10, 12]),
            PaddingScope::UsableRows,
        )
        .unwrap();

        assert!(Arc::ptr_eq(&first.annotations(), &second.annotations()));
        assert_eq!(first.len(), second.len());
        assert_eq!(second.get_item(0).unwrap().entities[0].len(), 10);
    }

    #[test]
    fn test_corpus_scope_pads_to_longest_record() {
        let (_dir, indices, table) = fixture("label_0,monomer,catalyst\n1.0,M2,C1\n");
        let language = language(&indices);
        let dataset = PolymerDataset::from_parts(
            names(&["monomer", "catalyst"]),
            indices,
            table,
            language,
            None,
            PaddingScope::Corpus,
        )
        .unwrap();

        assert_eq!(dataset.padding_lengths(), &[6, 11]);
        assert_eq!(dataset.get_item(0).unwrap().entities[1].len(), 11);
    }

    #[test]
    fn test_item_to_tensors() {
        let item = PolymerItem::new(vec![vec![0, 4, 5], vec![6, 7]], vec![2.5, -1.0]);
        let device = Default::default();
        let sample = item.to_tensors::<TestBackend>(&device);

        assert_eq!(sample.entities.len(), 2);
        assert_eq!(sample.entities[0].dims(), [3]);
        assert_eq!(
            sample.entities[0].clone().into_data().convert::<i64>().value,
            vec![0, 4, 5]
        );
        assert_eq!(
            sample.labels.into_data().convert::<f32>().value,
            vec![2.5, -1.0]
        );
    }

    #[test]
    fn test_config_round_trip_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = PolymerDatasetConfig::new(
            names(&["monomer.smi", "catalyst.smi"]),
            "annotations.csv".to_string(),
            names(&["monomer", "cATalysT"]),
        )
        .with_annotations_column_names(Some(names(&["label_0"])));

        config.save(&path).unwrap();
        let loaded = PolymerDatasetConfig::load(&path).unwrap();
        assert_eq!(loaded.entity_names, config.entity_names);
        assert_eq!(loaded.annotations_column_names, Some(names(&["label_0"])));
        assert_eq!(loaded.padding_lengths, None);
        assert_eq!(loaded.padding_scope, PaddingScope::UsableRows);
    }
}
