//! Column-oriented annotation table as handed over by the curation tools.
//!
//! Cells are kept as text so that columns this crate does not know about
//! survive a load/build/save cycle untouched. Typed access goes through
//! [`AnnotationTable::records`] and [`AnnotationTable::tree_attributes`].

use crate::error::TableError;
use celltree_protocol::{
    columns, AnnotationRecord, CellCycleStage, CellId, FrameIndex, Relationship, TreeAttributes,
    NO_ID, REQUIRED_COLUMNS, TREE_COLUMNS,
};
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fs::File, io, path::Path};

/// Largest magnitude accepted in the integer columns of a record. Keeps the
/// float spellings exact and leaves room for minted tree ids and generation
/// offsets.
pub const MAX_ABS_VALUE: i64 = 1 << 53;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl AnnotationTable {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: vec![],
        }
    }

    /// Empty table carrying exactly the required annotation columns.
    pub fn with_required_columns() -> Self {
        Self::new(REQUIRED_COLUMNS)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Indices of `names`, failing on the first one that is absent.
    pub fn require_columns(&self, names: &[&str]) -> Result<Vec<usize>, TableError> {
        names
            .iter()
            .map(|name| {
                self.column_index(name)
                    .ok_or_else(|| TableError::MissingColumn(name.to_string()))
            })
            .collect()
    }

    pub fn push_row<S: Into<String>>(
        &mut self,
        cells: impl IntoIterator<Item = S>,
    ) -> Result<(), TableError> {
        let cells: Vec<String> = cells.into_iter().map(Into::into).collect();
        if cells.len() != self.columns.len() {
            return Err(TableError::RowWidth {
                row: self.rows.len(),
                expected: self.columns.len(),
                found: cells.len(),
            });
        }
        self.rows.push(cells);
        Ok(())
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| r[idx].as_str())
    }

    /// Adds `name` as the last column, or overwrites it in place if present.
    /// `values` must hold one entry per row.
    pub fn set_column(&mut self, name: &str, values: Vec<String>) -> Result<(), TableError> {
        if values.len() != self.rows.len() {
            return Err(TableError::RowWidth {
                row: values.len().min(self.rows.len()),
                expected: self.rows.len(),
                found: values.len(),
            });
        }
        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(())
    }

    pub fn remove_column(&mut self, name: &str) -> bool {
        let Some(idx) = self.column_index(name) else {
            return false;
        };
        self.columns.remove(idx);
        for row in &mut self.rows {
            row.remove(idx);
        }
        true
    }

    /// Reorders rows by `(frame_i, Cell_ID)`, the natural order of the table.
    pub fn sort_by_key(&mut self) -> Result<(), TableError> {
        let idx = self.require_columns(&[columns::FRAME, columns::CELL_ID])?;
        let mut keys = Vec::with_capacity(self.rows.len());
        for (row_idx, row) in self.rows.iter().enumerate() {
            let frame = parse_int(&row[idx[0]])
                .ok_or_else(|| TableError::invalid(row_idx, columns::FRAME, &row[idx[0]]))?;
            let cell = parse_int(&row[idx[1]])
                .ok_or_else(|| TableError::invalid(row_idx, columns::CELL_ID, &row[idx[1]]))?;
            keys.push((frame, cell));
        }
        let mut keyed: Vec<_> = keys.into_iter().zip(std::mem::take(&mut self.rows)).collect();
        keyed.sort_by_key(|(key, _)| *key);
        self.rows = keyed.into_iter().map(|(_, row)| row).collect();
        Ok(())
    }

    /// Typed view of every row, in row order.
    ///
    /// Fails on a missing required column, an unparsable cell, or two rows
    /// sharing the same `(frame_i, Cell_ID)`.
    pub fn records(&self) -> Result<Vec<AnnotationRecord>, TableError> {
        let idx = self.require_columns(&REQUIRED_COLUMNS)?;
        let mut seen: HashSet<(FrameIndex, CellId)> = HashSet::with_capacity(self.rows.len());
        let mut ret = Vec::with_capacity(self.rows.len());
        for (row_idx, row) in self.rows.iter().enumerate() {
            let int = |i: usize| -> Result<i64, TableError> {
                parse_int(&row[idx[i]])
                    .filter(|v| (-MAX_ABS_VALUE..=MAX_ABS_VALUE).contains(v))
                    .ok_or_else(|| TableError::invalid(row_idx, REQUIRED_COLUMNS[i], &row[idx[i]]))
            };
            let optional_id = |i: usize| -> Result<i64, TableError> {
                if row[idx[i]].trim().is_empty() {
                    Ok(NO_ID)
                } else {
                    int(i)
                }
            };
            let stage_text = &row[idx[2]];
            let relationship_text = &row[idx[5]];
            let history_text = &row[idx[6]];
            let record = AnnotationRecord {
                frame_i: int(0)?,
                cell_id: int(1)?,
                cell_cycle_stage: CellCycleStage::parse(stage_text).ok_or_else(|| {
                    TableError::invalid(row_idx, columns::CELL_CYCLE_STAGE, stage_text)
                })?,
                generation_num: int(3)?,
                relative_id: optional_id(4)?,
                relationship: Relationship::parse(relationship_text).ok_or_else(|| {
                    TableError::invalid(row_idx, columns::RELATIONSHIP, relationship_text)
                })?,
                is_history_known: parse_bool(history_text).ok_or_else(|| {
                    TableError::invalid(row_idx, columns::IS_HISTORY_KNOWN, history_text)
                })?,
                emerg_frame_i: optional_id(7)?,
                division_frame_i: optional_id(8)?,
            };
            if !seen.insert(record.key()) {
                return Err(TableError::DuplicateKey {
                    frame_i: record.frame_i,
                    cell_id: record.cell_id,
                });
            }
            ret.push(record);
        }
        Ok(ret)
    }

    /// Typed view of the tree columns written by a previous build.
    pub fn tree_attributes(&self) -> Result<Vec<TreeAttributes>, TableError> {
        let idx = self.require_columns(&TREE_COLUMNS)?;
        self.rows
            .iter()
            .enumerate()
            .map(|(row_idx, row)| -> Result<TreeAttributes, TableError> {
                let mut values = [0i64; 5];
                for (slot, (i, column)) in values.iter_mut().zip(idx.iter().zip(TREE_COLUMNS)) {
                    *slot = parse_int(&row[*i])
                        .ok_or_else(|| TableError::invalid(row_idx, column, &row[*i]))?;
                }
                Ok(TreeAttributes {
                    cell_id_tree: values[0],
                    parent_id_tree: values[1],
                    root_id_tree: values[2],
                    generation_num_tree: values[3],
                    sister_id_tree: values[4],
                })
            })
            .collect()
    }

    /// Writes `attrs` (one per row, row order) into the tree columns.
    pub fn write_tree_attributes(&mut self, attrs: &[TreeAttributes]) -> Result<(), TableError> {
        for (col, column) in TREE_COLUMNS.iter().enumerate() {
            let values = attrs.iter().map(|a| a.values()[col].to_string()).collect();
            self.set_column(column, values)?;
        }
        Ok(())
    }

    pub fn read_csv<R: io::Read>(reader: R) -> Result<Self, TableError> {
        let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(reader);
        let mut ret = Self::new(rdr.headers()?.iter());
        for result in rdr.records() {
            let record = result?;
            ret.push_row(record.iter())?;
        }
        Ok(ret)
    }

    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<(), TableError> {
        let mut wtr = WriterBuilder::new().from_writer(writer);
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn load_csv_path<P: AsRef<Path>>(path: P) -> Result<Self, TableError> {
        Self::read_csv(File::open(path)?)
    }

    pub fn save_csv_path<P: AsRef<Path>>(&self, path: P) -> Result<(), TableError> {
        self.write_csv(File::create(path)?)
    }
}

/// Integers as exported by tabular tools: `3`, ` 3 `, `3.0` and `-1.0`.
pub fn parse_int(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(v) = text.parse::<i64>() {
        return Some(v);
    }
    let v = text.parse::<f64>().ok()?;
    if v.is_finite() && v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

pub fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "1.0" | "yes" => Some(true),
        "false" | "0" | "0.0" | "no" => Some(false),
        _ => None,
    }
}
