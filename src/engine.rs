use crate::{
    error::TableError,
    lineage::{build_lineage, check_invariants, strip_tree_columns},
    settings::BuildSettings,
    table::AnnotationTable,
};
use celltree_protocol::{BuildReport, TREE_COLUMNS};
use serde::{Deserialize, Serialize};
use std::{error::Error, fmt};

pub type OpId = String;
pub type RunId = String;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectState {
    #[serde(default)]
    pub table: AnnotationTable,
    #[serde(default)]
    pub parameters: BuildSettings,
    #[serde(default)]
    pub last_report: Option<BuildReport>,
}

impl ProjectState {
    pub fn load_from_path(path: &str) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path).map_err(|e| EngineError {
            code: ErrorCode::Io,
            message: format!("Could not read state file '{path}': {e}"),
        })?;
        serde_json::from_str(&text).map_err(|e| EngineError {
            code: ErrorCode::InvalidInput,
            message: format!("Could not parse state JSON '{path}': {e}"),
        })
    }

    pub fn save_to_path(&self, path: &str) -> Result<(), EngineError> {
        let text = serde_json::to_string_pretty(self).map_err(|e| EngineError {
            code: ErrorCode::Internal,
            message: format!("Could not serialize state: {e}"),
        })?;
        std::fs::write(path, text).map_err(|e| EngineError {
            code: ErrorCode::Io,
            message: format!("Could not write state file '{path}': {e}"),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Operation {
    LoadTable { path: String },
    SaveTable { path: String },
    BuildLineage,
    StripLineage,
    ValidateLineage,
    SetParameter {
        name: String,
        value: serde_json::Value,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub run_id: RunId,
    pub ops: Vec<Operation>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpResult {
    pub op_id: OpId,
    pub changed_columns: Vec<String>,
    pub warnings: Vec<String>,
    pub messages: Vec<String>,
    pub report: Option<BuildReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    pub run_id: RunId,
    pub op: Operation,
    pub result: OpResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    InvalidInput,
    NotFound,
    MissingColumn,
    Io,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineError {
    pub code: ErrorCode,
    pub message: String,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl Error for EngineError {}

impl From<TableError> for EngineError {
    fn from(err: TableError) -> Self {
        let code = match &err {
            TableError::MissingColumn(_) => ErrorCode::MissingColumn,
            TableError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => ErrorCode::NotFound,
            TableError::Io(_) => ErrorCode::Io,
            TableError::Csv(e) if e.is_io_error() => ErrorCode::Io,
            _ => ErrorCode::InvalidInput,
        };
        EngineError {
            code,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capabilities {
    pub protocol_version: String,
    pub supported_operations: Vec<String>,
    pub tree_columns: Vec<String>,
    pub parameters: BuildSettings,
    pub deterministic_operation_log: bool,
}

pub trait Engine {
    fn apply(&mut self, op: Operation) -> Result<OpResult, EngineError>;
    fn apply_workflow(&mut self, wf: Workflow) -> Result<Vec<OpResult>, EngineError>;
    fn snapshot(&self) -> &ProjectState;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineageEngine {
    state: ProjectState,
    journal: Vec<OperationRecord>,
    op_counter: u64,
}

impl LineageEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: ProjectState) -> Self {
        Self {
            state,
            ..Self::default()
        }
    }

    pub fn state(&self) -> &ProjectState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ProjectState {
        &mut self.state
    }

    pub fn capabilities() -> Capabilities {
        Capabilities {
            protocol_version: "v1".to_string(),
            supported_operations: vec![
                "LoadTable".to_string(),
                "SaveTable".to_string(),
                "BuildLineage".to_string(),
                "StripLineage".to_string(),
                "ValidateLineage".to_string(),
                "SetParameter".to_string(),
            ],
            tree_columns: TREE_COLUMNS.iter().map(|c| c.to_string()).collect(),
            parameters: BuildSettings::default(),
            deterministic_operation_log: true,
        }
    }

    pub fn operation_log(&self) -> &[OperationRecord] {
        &self.journal
    }

    fn next_op_id(&mut self) -> OpId {
        self.op_counter += 1;
        format!("op-{}", self.op_counter)
    }

    fn apply_internal(&mut self, op: Operation, run_id: &str) -> Result<OpResult, EngineError> {
        let op_id = self.next_op_id();
        let mut result = OpResult {
            op_id,
            ..OpResult::default()
        };

        match &op {
            Operation::LoadTable { path } => {
                let mut table = AnnotationTable::load_csv_path(path)?;
                table.sort_by_key()?;
                result.messages.push(format!(
                    "Loaded {} rows with {} columns from '{path}'",
                    table.len(),
                    table.columns().len()
                ));
                result.changed_columns = table.columns().to_vec();
                self.state.table = table;
                self.state.last_report = None;
            }
            Operation::SaveTable { path } => {
                self.state.table.save_csv_path(path)?;
                result
                    .messages
                    .push(format!("Saved {} rows to '{path}'", self.state.table.len()));
            }
            Operation::BuildLineage => {
                if self.state.table.is_empty() {
                    return Err(EngineError {
                        code: ErrorCode::NotFound,
                        message: "No annotation table loaded".to_string(),
                    });
                }
                let settings = self.state.parameters.clone();
                let report = build_lineage(&mut self.state.table, &settings, &mut |p| {
                    tracing::trace!(
                        completed = p.completed_branches,
                        total = p.total_branches,
                        "branch done"
                    );
                })?;
                result.changed_columns = TREE_COLUMNS.iter().map(|c| c.to_string()).collect();
                result.messages.push(format!(
                    "Built {} tree nodes in {} trees from {} rows",
                    report.segment_count, report.founder_count, report.record_count
                ));
                result.warnings = report
                    .diagnostics
                    .iter()
                    .map(|d| {
                        format!(
                            "{:?} at frame {} Cell_ID {}: {}",
                            d.kind, d.frame_i, d.cell_id, d.message
                        )
                    })
                    .collect();
                self.state.last_report = Some(report.clone());
                result.report = Some(report);
            }
            Operation::StripLineage => {
                let removed = strip_tree_columns(&mut self.state.table);
                result.messages.push(format!("Removed {removed} tree columns"));
                self.state.last_report = None;
            }
            Operation::ValidateLineage => {
                let violations = check_invariants(&self.state.table)?;
                if violations.is_empty() {
                    result.messages.push("Lineage tree is consistent".to_string());
                }
                result.warnings = violations
                    .iter()
                    .map(|v| format!("frame {} Cell_ID {}: {}", v.frame_i, v.cell_id, v.message))
                    .collect();
            }
            Operation::SetParameter { name, value } => {
                let message = self
                    .state
                    .parameters
                    .set(name, value)
                    .map_err(|message| EngineError {
                        code: ErrorCode::InvalidInput,
                        message,
                    })?;
                result.messages.push(message);
            }
        }

        self.journal.push(OperationRecord {
            run_id: run_id.to_string(),
            op,
            result: result.clone(),
        });
        Ok(result)
    }
}

impl Engine for LineageEngine {
    fn apply(&mut self, op: Operation) -> Result<OpResult, EngineError> {
        self.apply_internal(op, "interactive")
    }

    fn apply_workflow(&mut self, wf: Workflow) -> Result<Vec<OpResult>, EngineError> {
        let mut results = Vec::new();
        for op in wf.ops {
            let res = self.apply_internal(op, &wf.run_id)?;
            results.push(res);
        }
        Ok(results)
    }

    fn snapshot(&self) -> &ProjectState {
        &self.state
    }
}
