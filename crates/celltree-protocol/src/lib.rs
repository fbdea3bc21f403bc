//! Shared machine-readable contracts for cell-cycle annotation tables and the
//! lineage tree derived from them.
//!
//! Column names follow the annotation table written by the curation tools, so
//! records and tree attributes serialize with the exact header spelling
//! (`Cell_ID`, `relative_ID`, `Cell_ID_tree`, ...).

use serde::{Deserialize, Serialize};

pub type CellId = i64;
pub type FrameIndex = i64;

/// Sentinel for "no cell" in id-valued columns.
pub const NO_ID: CellId = -1;

pub mod columns {
    pub const FRAME: &str = "frame_i";
    pub const CELL_ID: &str = "Cell_ID";
    pub const CELL_CYCLE_STAGE: &str = "cell_cycle_stage";
    pub const GENERATION_NUM: &str = "generation_num";
    pub const RELATIVE_ID: &str = "relative_ID";
    pub const RELATIONSHIP: &str = "relationship";
    pub const IS_HISTORY_KNOWN: &str = "is_history_known";
    pub const EMERG_FRAME: &str = "emerg_frame_i";
    pub const DIVISION_FRAME: &str = "division_frame_i";

    pub const CELL_ID_TREE: &str = "Cell_ID_tree";
    pub const PARENT_ID_TREE: &str = "parent_ID_tree";
    pub const ROOT_ID_TREE: &str = "root_ID_tree";
    pub const GENERATION_NUM_TREE: &str = "generation_num_tree";
    pub const SISTER_ID_TREE: &str = "sister_ID_tree";
}

pub const REQUIRED_COLUMNS: [&str; 9] = [
    columns::FRAME,
    columns::CELL_ID,
    columns::CELL_CYCLE_STAGE,
    columns::GENERATION_NUM,
    columns::RELATIVE_ID,
    columns::RELATIONSHIP,
    columns::IS_HISTORY_KNOWN,
    columns::EMERG_FRAME,
    columns::DIVISION_FRAME,
];

pub const TREE_COLUMNS: [&str; 5] = [
    columns::CELL_ID_TREE,
    columns::PARENT_ID_TREE,
    columns::ROOT_ID_TREE,
    columns::GENERATION_NUM_TREE,
    columns::SISTER_ID_TREE,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellCycleStage {
    G1,
    S,
}

impl CellCycleStage {
    pub fn label(self) -> &'static str {
        match self {
            Self::G1 => "G1",
            Self::S => "S",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_uppercase().as_str() {
            "G1" => Some(Self::G1),
            "S" => Some(Self::S),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relationship {
    Mother,
    Bud,
}

impl Relationship {
    pub fn label(self) -> &'static str {
        match self {
            Self::Mother => "mother",
            Self::Bud => "bud",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "mother" => Some(Self::Mother),
            "bud" => Some(Self::Bud),
            _ => None,
        }
    }
}

/// One row of the annotation table, keyed by `(frame_i, Cell_ID)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub frame_i: FrameIndex,
    #[serde(rename = "Cell_ID")]
    pub cell_id: CellId,
    pub cell_cycle_stage: CellCycleStage,
    pub generation_num: i64,
    #[serde(rename = "relative_ID")]
    pub relative_id: CellId,
    pub relationship: Relationship,
    pub is_history_known: bool,
    pub emerg_frame_i: FrameIndex,
    pub division_frame_i: FrameIndex,
}

impl AnnotationRecord {
    pub fn key(&self) -> (FrameIndex, CellId) {
        (self.frame_i, self.cell_id)
    }

    pub fn has_relative(&self) -> bool {
        self.relative_id != NO_ID
    }

    pub fn is_g1(&self) -> bool {
        self.cell_cycle_stage == CellCycleStage::G1
    }
}

/// The five columns added by a lineage build.
///
/// Defaults are the sentinels used before a pass has filled a row in:
/// `-1` for every id and `1` for the generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TreeAttributes {
    #[serde(rename = "Cell_ID_tree")]
    pub cell_id_tree: CellId,
    #[serde(rename = "parent_ID_tree")]
    pub parent_id_tree: CellId,
    #[serde(rename = "root_ID_tree")]
    pub root_id_tree: CellId,
    pub generation_num_tree: i64,
    #[serde(rename = "sister_ID_tree")]
    pub sister_id_tree: CellId,
}

impl Default for TreeAttributes {
    fn default() -> Self {
        Self {
            cell_id_tree: NO_ID,
            parent_id_tree: NO_ID,
            root_id_tree: NO_ID,
            generation_num_tree: 1,
            sister_id_tree: NO_ID,
        }
    }
}

impl TreeAttributes {
    /// A node that starts its own tree at generation 1.
    pub fn founder(cell_id: CellId, sister_id: CellId) -> Self {
        Self {
            cell_id_tree: cell_id,
            parent_id_tree: NO_ID,
            root_id_tree: cell_id,
            generation_num_tree: 1,
            sister_id_tree: sister_id,
        }
    }

    pub fn is_founder(&self) -> bool {
        self.parent_id_tree == NO_ID
    }

    /// Values in `TREE_COLUMNS` order.
    pub fn values(&self) -> [i64; 5] {
        [
            self.cell_id_tree,
            self.parent_id_tree,
            self.root_id_tree,
            self.generation_num_tree,
            self.sister_id_tree,
        ]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// Neither the own nor the relative's previous generation was found; the
    /// segment became a founder.
    UnresolvableAncestry,
    /// The partner's tree generation was not yet built; offset 0 was used.
    PartnerOffsetFallback,
    /// The relative named on a node's first row has no built node there.
    UnresolvedSister,
    /// An S-phase row had no G1 row to copy from and became its own founder.
    SPhaseFounder,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildDiagnostic {
    pub kind: DiagnosticKind,
    pub frame_i: FrameIndex,
    #[serde(rename = "Cell_ID")]
    pub cell_id: CellId,
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub record_count: usize,
    pub branch_count: usize,
    pub segment_count: usize,
    pub founder_count: usize,
    pub minted_surrogates: usize,
    pub max_generation: i64,
    pub diagnostics: Vec<BuildDiagnostic>,
}

impl BuildReport {
    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.diagnostics.iter().filter(|d| d.kind == kind).count()
    }
}

/// Advisory progress, emitted once per completed branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildProgress {
    pub completed_branches: usize,
    pub total_branches: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSummary {
    #[serde(rename = "root_ID_tree")]
    pub root_id: CellId,
    pub node_count: usize,
    pub max_generation: i64,
    pub first_frame: FrameIndex,
    pub last_frame: FrameIndex,
    pub physical_ids: Vec<CellId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvariantViolation {
    pub frame_i: FrameIndex,
    #[serde(rename = "Cell_ID")]
    pub cell_id: CellId,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_and_relationship_parse() {
        assert_eq!(CellCycleStage::parse(" g1 "), Some(CellCycleStage::G1));
        assert_eq!(CellCycleStage::parse("S"), Some(CellCycleStage::S));
        assert_eq!(CellCycleStage::parse("G2"), None);
        assert_eq!(Relationship::parse("Mother"), Some(Relationship::Mother));
        assert_eq!(Relationship::parse("bud"), Some(Relationship::Bud));
        assert_eq!(Relationship::parse("daughter"), None);
    }

    #[test]
    fn test_tree_attributes_default_sentinels() {
        let attrs = TreeAttributes::default();
        assert_eq!(attrs.values(), [-1, -1, -1, 1, -1]);
        assert!(attrs.is_founder());
    }

    #[test]
    fn test_tree_attributes_serialize_with_column_names() {
        let attrs = TreeAttributes::founder(7, 3);
        let json = serde_json::to_value(attrs).unwrap();
        for column in TREE_COLUMNS {
            assert!(json.get(column).is_some(), "missing {column}");
        }
        assert_eq!(json["root_ID_tree"], 7);
        assert_eq!(json["sister_ID_tree"], 3);
    }
}
