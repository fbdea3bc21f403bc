//! Lineage pipeline: normalization, tree building, sister linking and S-phase
//! projection over one annotation table, plus checks and summaries of the
//! resulting tree columns.

use crate::{
    error::TableError,
    normalize::normalize_generations,
    s_phase::{g1_attributes, project_s_phase},
    settings::BuildSettings,
    sisters::assign_sisters,
    table::AnnotationTable,
    tree::build_tree,
};
use celltree_protocol::{
    AnnotationRecord, BuildProgress, BuildReport, CellId, InvariantViolation, TreeAttributes,
    TreeSummary, NO_ID, TREE_COLUMNS,
};
use itertools::Itertools;
use std::collections::{BTreeMap, HashMap};

/// Tree attributes of a record set, index-aligned with the input.
#[derive(Debug, Clone)]
pub struct Lineage {
    pub normalized_gen_num: Vec<i64>,
    pub attributes: Vec<TreeAttributes>,
    pub report: BuildReport,
}

pub fn compute_lineage(
    records: &[AnnotationRecord],
    settings: &BuildSettings,
    progress: &mut dyn FnMut(BuildProgress),
) -> Lineage {
    let normalized = normalize_generations(records);
    let mut build = build_tree(records, &normalized, settings, progress);
    let mut diagnostics = std::mem::take(&mut build.diagnostics);
    diagnostics.extend(assign_sisters(&mut build, records));
    let mut attributes = g1_attributes(records, &build);
    diagnostics.extend(project_s_phase(records, &normalized, &build, &mut attributes));

    let report = BuildReport {
        record_count: records.len(),
        branch_count: build.branch_count,
        segment_count: build.segments.len(),
        founder_count: build.segments.iter().filter(|s| s.attrs.is_founder()).count(),
        minted_surrogates: build.minted_surrogates,
        max_generation: attributes
            .iter()
            .map(|a| a.generation_num_tree)
            .max()
            .unwrap_or(0),
        diagnostics,
    };
    Lineage {
        normalized_gen_num: normalized,
        attributes,
        report,
    }
}

/// Builds the lineage tree of `table` and writes the tree columns into it.
///
/// Rows end up in `(frame_i, Cell_ID)` order. Any column or value error is
/// returned before the table is touched.
pub fn build_lineage(
    table: &mut AnnotationTable,
    settings: &BuildSettings,
    progress: &mut dyn FnMut(BuildProgress),
) -> Result<BuildReport, TableError> {
    let mut records = table.records()?;
    if !records.is_sorted_by_key(|r| r.key()) {
        table.sort_by_key()?;
        records = table.records()?;
    }
    let lineage = compute_lineage(&records, settings, progress);
    table.write_tree_attributes(&lineage.attributes)?;
    tracing::info!(
        records = lineage.report.record_count,
        branches = lineage.report.branch_count,
        nodes = lineage.report.segment_count,
        founders = lineage.report.founder_count,
        diagnostics = lineage.report.diagnostics.len(),
        "lineage tree built"
    );
    Ok(lineage.report)
}

/// Removes the tree columns; returns how many were present.
pub fn strip_tree_columns(table: &mut AnnotationTable) -> usize {
    TREE_COLUMNS
        .iter()
        .filter(|column| table.remove_column(column))
        .count()
}

struct Node {
    parent: CellId,
    generation: i64,
    sister: CellId,
    first_frame: i64,
    first_relative: CellId,
}

/// Tree nodes keyed by `Cell_ID_tree`, taken from the G1 rows. S rows only
/// repeat a node or are founders of their own.
fn collect_nodes(
    records: &[AnnotationRecord],
    attrs: &[TreeAttributes],
) -> BTreeMap<CellId, Node> {
    let mut nodes: BTreeMap<CellId, Node> = BTreeMap::new();
    for (record, attr) in records.iter().zip(attrs).filter(|(r, _)| r.is_g1()) {
        let node = nodes.entry(attr.cell_id_tree).or_insert(Node {
            parent: attr.parent_id_tree,
            generation: attr.generation_num_tree,
            sister: attr.sister_id_tree,
            first_frame: record.frame_i,
            first_relative: record.relative_id,
        });
        if record.frame_i < node.first_frame {
            node.first_frame = record.frame_i;
            node.first_relative = record.relative_id;
        }
    }
    nodes
}

/// Checks the structural guarantees of built tree columns.
pub fn check_invariants(table: &AnnotationTable) -> Result<Vec<InvariantViolation>, TableError> {
    let records = table.records()?;
    let attrs = table.tree_attributes()?;
    let nodes = collect_nodes(&records, &attrs);
    let max_generation = attrs
        .iter()
        .map(|a| a.generation_num_tree)
        .max()
        .unwrap_or(1);
    let mut violations = vec![];
    let mut violation = |record: &AnnotationRecord, message: String| {
        violations.push(InvariantViolation {
            frame_i: record.frame_i,
            cell_id: record.cell_id,
            message,
        })
    };

    for (record, attr) in records.iter().zip(&attrs) {
        if attr.generation_num_tree < 1 {
            violation(
                record,
                format!("generation_num_tree {} below 1", attr.generation_num_tree),
            );
        }
    }

    for (record, attr) in records.iter().zip(&attrs).filter(|(r, _)| r.is_g1()) {
        if nodes
            .get(&attr.cell_id_tree)
            .is_none_or(|n| n.first_frame != record.frame_i)
        {
            continue;
        }
        let mut current = attr.cell_id_tree;
        let mut hops = 0;
        loop {
            let Some(node) = nodes.get(&current) else {
                violation(record, format!("parent {current} is not a tree node"));
                break;
            };
            if node.parent == NO_ID {
                break;
            }
            match nodes.get(&node.parent) {
                Some(parent) if parent.generation != node.generation - 1 => {
                    violation(
                        record,
                        format!(
                            "node {current} at generation {} has parent {} at generation {}",
                            node.generation, node.parent, parent.generation
                        ),
                    );
                    break;
                }
                _ => {}
            }
            hops += 1;
            if hops > max_generation {
                violation(
                    record,
                    format!("no founder within {max_generation} hops from {}", attr.cell_id_tree),
                );
                break;
            }
            current = node.parent;
        }

        if attr.sister_id_tree != NO_ID {
            if let Some(sister) = nodes.get(&attr.sister_id_tree) {
                if sister.sister != attr.cell_id_tree && sister.first_relative != NO_ID {
                    violation(
                        record,
                        format!(
                            "node {} names sister {} which names {}",
                            attr.cell_id_tree, attr.sister_id_tree, sister.sister
                        ),
                    );
                }
            }
        }
    }
    Ok(violations)
}

/// One summary per tree, ordered by root.
pub fn summarize_trees(table: &AnnotationTable) -> Result<Vec<TreeSummary>, TableError> {
    let records = table.records()?;
    let attrs = table.tree_attributes()?;
    let mut by_root: BTreeMap<CellId, Vec<(&AnnotationRecord, &TreeAttributes)>> = BTreeMap::new();
    for (record, attr) in records.iter().zip(&attrs) {
        by_root.entry(attr.root_id_tree).or_default().push((record, attr));
    }
    Ok(by_root
        .into_iter()
        .map(|(root_id, rows)| TreeSummary {
            root_id,
            node_count: rows.iter().map(|(_, a)| a.cell_id_tree).unique().count(),
            max_generation: rows
                .iter()
                .map(|(_, a)| a.generation_num_tree)
                .max()
                .unwrap_or(1),
            first_frame: rows.iter().map(|(r, _)| r.frame_i).min().unwrap_or(0),
            last_frame: rows.iter().map(|(r, _)| r.frame_i).max().unwrap_or(0),
            physical_ids: rows.iter().map(|(r, _)| r.cell_id).sorted().dedup().collect(),
        })
        .collect())
}

/// Tree attributes per `(frame_i, Cell_ID)`, for comparing builds.
pub fn attributes_by_key(
    table: &AnnotationTable,
) -> Result<HashMap<(i64, CellId), TreeAttributes>, TableError> {
    let records = table.records()?;
    let attrs = table.tree_attributes()?;
    Ok(records.iter().map(|r| r.key()).zip(attrs).collect())
}
