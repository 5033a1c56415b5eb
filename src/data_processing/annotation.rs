// The annotation table: a comma-separated file with a header row. Every row names one
// identifier per entity (column matched case-insensitively against the entity name)
// and carries a vector of numeric labels. Identifiers are not checked against any
// SMILES index here; unresolvable rows are filtered later by the dataset.

use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Trim};
use log::info;

use crate::error::{DatasetError, Result};

/// One physical row of the annotation file.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationRow {
    pub index: Option<String>,    // Value of the index column, if one is configured
    pub identifiers: Vec<String>, // One identifier per entity, in entity order
    pub labels: Vec<f32>,         // Label values, in label column order
}

#[derive(Debug, Clone)]
pub struct AnnotationTable {
    path: PathBuf,
    columns: Vec<String>,
    entity_columns: Vec<String>,
    label_columns: Vec<String>,
    index_column: Option<String>,
    rows: Vec<AnnotationRow>,
}

impl AnnotationTable {
    /// Reads the annotation file.
    ///
    /// * `entity_names` - one identifier column per name, matched case-insensitively
    /// * `label_columns` - label columns in output order; `None` takes every column that is
    ///   neither an entity column nor the index column, in header order
    /// * `index_column` - optional row index column; may repeat, never used as a label
    pub fn load(
        path: impl AsRef<Path>,
        entity_names: &[String],
        label_columns: Option<&[String]>,
        index_column: Option<&str>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .from_path(path)?;
        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

        let entity_positions = entity_names
            .iter()
            .map(|name| find_entity_column(&columns, name))
            .collect::<Result<Vec<_>>>()?;

        let index_position = index_column
            .map(|name| find_column(&columns, name, "index"))
            .transpose()?;

        let label_positions: Vec<usize> = match label_columns {
            Some(names) => names
                .iter()
                .map(|name| find_column(&columns, name, "label"))
                .collect::<Result<_>>()?,
            None => (0..columns.len())
                .filter(|p| !entity_positions.contains(p) && Some(*p) != index_position)
                .collect(),
        };

        let mut rows = Vec::new();
        for (row_number, record) in reader.records().enumerate() {
            let record = record?;
            // header is line 1
            let line = record
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(row_number + 2);
            rows.push(parse_row(
                path,
                line,
                &record,
                &entity_positions,
                &label_positions,
                index_position,
            )?);
        }

        info!(
            "Loaded {} annotation rows with {} labels from {}",
            rows.len(),
            label_positions.len(),
            path.display()
        );

        Ok(Self {
            path: path.to_path_buf(),
            entity_columns: entity_positions.iter().map(|&p| columns[p].clone()).collect(),
            label_columns: label_positions.iter().map(|&p| columns[p].clone()).collect(),
            index_column: index_position.map(|p| columns[p].clone()),
            columns,
            rows,
        })
    }

    pub fn rows(&self) -> &[AnnotationRow] {
        &self.rows
    }

    pub fn row(&self, position: usize) -> Option<&AnnotationRow> {
        self.rows.get(position)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Header names, as they appear in the file.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Header names bound to the entities, in entity order.
    pub fn entity_columns(&self) -> &[String] {
        &self.entity_columns
    }

    pub fn label_columns(&self) -> &[String] {
        &self.label_columns
    }

    pub fn index_column(&self) -> Option<&str> {
        self.index_column.as_deref()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn find_entity_column(columns: &[String], entity_name: &str) -> Result<usize> {
    let wanted = entity_name.to_lowercase();
    let matches: Vec<usize> = columns
        .iter()
        .enumerate()
        .filter(|(_, column)| column.to_lowercase() == wanted)
        .map(|(position, _)| position)
        .collect();

    match matches.as_slice() {
        [position] => Ok(*position),
        [] => Err(DatasetError::config(format!(
            "no annotation column matches entity {entity_name:?} (columns: {columns:?})"
        ))),
        _ => Err(DatasetError::config(format!(
            "entity {entity_name:?} matches several annotation columns (columns: {columns:?})"
        ))),
    }
}

fn find_column(columns: &[String], name: &str, role: &str) -> Result<usize> {
    columns
        .iter()
        .position(|column| column == name)
        .ok_or_else(|| {
            DatasetError::config(format!(
                "{role} column {name:?} not found in annotations (columns: {columns:?})"
            ))
        })
}

fn parse_row(
    path: &Path,
    line: usize,
    record: &StringRecord,
    entity_positions: &[usize],
    label_positions: &[usize],
    index_position: Option<usize>,
) -> Result<AnnotationRow> {
    let cell = |position: usize| record.get(position).unwrap_or("");

    let labels = label_positions
        .iter()
        .map(|&position| {
            parse_label(cell(position)).ok_or_else(|| DatasetError::Format {
                path: path.to_path_buf(),
                line,
                reason: format!("label {:?} is not a number", cell(position)),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(AnnotationRow {
        index: index_position.map(|position| cell(position).to_string()),
        identifiers: entity_positions
            .iter()
            .map(|&position| cell(position).to_string())
            .collect(),
        labels,
    })
}

/// Empty cells are missing values.
fn parse_label(value: &str) -> Option<f32> {
    if value.is_empty() {
        return Some(f32::NAN);
    }
    value.parse().ok()
}
