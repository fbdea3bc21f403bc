//! Projection of finished tree attributes onto S-phase rows.
//!
//! While a mother buds, the mother row and the bud row both belong to the
//! mother's current tree node. The node is identified through the mother's
//! `(Cell_ID, normalized generation)` and looked up among the G1 segments of
//! the same branch.

use crate::tree::{BranchKey, TreeBuild};
use celltree_protocol::{
    AnnotationRecord, BuildDiagnostic, CellId, DiagnosticKind, FrameIndex, Relationship,
    TreeAttributes,
};
use std::collections::HashMap;

/// Fills `attrs` (index-aligned with `records`) for every S row.
pub fn project_s_phase(
    records: &[AnnotationRecord],
    normalized: &[i64],
    build: &TreeBuild,
    attrs: &mut [TreeAttributes],
) -> Vec<BuildDiagnostic> {
    let by_key: HashMap<(FrameIndex, CellId), usize> = records
        .iter()
        .enumerate()
        .map(|(idx, r)| (r.key(), idx))
        .collect();
    let mut by_group: HashMap<(BranchKey, i64), Vec<usize>> = HashMap::new();
    for (idx, segment) in build.segments.iter().enumerate() {
        by_group
            .entry((segment.branch, segment.normalized_gen))
            .or_default()
            .push(idx);
    }

    let mut diagnostics = vec![];
    for (idx, record) in records.iter().enumerate() {
        if record.is_g1() {
            continue;
        }
        let owner = match record.relationship {
            Relationship::Mother => Some((record.cell_id, normalized[idx])),
            Relationship::Bud if record.has_relative() => by_key
                .get(&(record.frame_i, record.relative_id))
                .map(|&mother| (record.relative_id, normalized[mother])),
            Relationship::Bud => None,
        };
        let segment = owner.and_then(|(cell_id, generation)| {
            let branch = build.row_branch.get(&(record.frame_i, cell_id))?;
            by_group
                .get(&(*branch, generation))?
                .iter()
                .map(|&s| &build.segments[s])
                .filter(|s| s.start_frame <= record.frame_i)
                .max_by_key(|s| s.start_frame)
        });
        attrs[idx] = match segment {
            Some(segment) => segment.attrs,
            None => {
                tracing::debug!(
                    frame_i = record.frame_i,
                    cell_id = record.cell_id,
                    "S-phase row without preceding G1 node, treating as founder"
                );
                diagnostics.push(BuildDiagnostic {
                    kind: DiagnosticKind::SPhaseFounder,
                    frame_i: record.frame_i,
                    cell_id: record.cell_id,
                    message: format!(
                        "no G1 node for the mother of Cell_ID {} at frame {}",
                        record.cell_id, record.frame_i
                    ),
                });
                TreeAttributes::founder(record.cell_id, record.relative_id)
            }
        };
    }
    diagnostics
}

/// Per-row attributes of the G1 rows, with S rows left at the defaults.
pub fn g1_attributes(records: &[AnnotationRecord], build: &TreeBuild) -> Vec<TreeAttributes> {
    records
        .iter()
        .map(|r| {
            build
                .segment_at(r.frame_i, r.cell_id)
                .map(|s| s.attrs)
                .unwrap_or_default()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_generations;
    use crate::settings::BuildSettings;
    use crate::sisters::assign_sisters;
    use crate::testing::{one_division, RecordBuilder};
    use crate::tree::build_tree;

    fn project(records: &[AnnotationRecord]) -> (Vec<TreeAttributes>, Vec<BuildDiagnostic>) {
        let normalized = normalize_generations(records);
        let mut build = build_tree(records, &normalized, &BuildSettings::default(), &mut |_| {});
        assign_sisters(&mut build, records);
        let mut attrs = g1_attributes(records, &build);
        let diagnostics = project_s_phase(records, &normalized, &build, &mut attrs);
        (attrs, diagnostics)
    }

    #[test]
    fn test_budding_rows_copy_the_mother_node() {
        let records = one_division();
        let (attrs, diagnostics) = project(&records);
        assert!(diagnostics.is_empty());
        let at = |frame: i64, cell: i64| {
            let idx = records.iter().position(|r| r.key() == (frame, cell)).unwrap();
            attrs[idx]
        };
        let g1 = at(0, 5);
        assert_eq!(at(5, 5), g1);
        assert_eq!(at(10, 5), g1);
        assert_eq!(at(5, 9), g1, "bud rows belong to the mother's node");
        assert_eq!(at(10, 9), g1);
    }

    #[test]
    fn test_first_seen_in_s_becomes_founder() {
        let records = vec![
            RecordBuilder::s_mother(0, 4, 2, 6).history_known(false).build(),
            RecordBuilder::s_bud(0, 6, 4).build(),
            RecordBuilder::g1(1, 4, 3).relative(6).history_known(false).build(),
            RecordBuilder::g1(1, 6, 1).relative(4).build(),
        ];
        let (attrs, diagnostics) = project(&records);
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics
            .iter()
            .all(|d| d.kind == DiagnosticKind::SPhaseFounder));
        assert_eq!(attrs[0], TreeAttributes::founder(4, 6));
        // The bud's mother has no G1 node at generation 2 either.
        assert_eq!(attrs[1], TreeAttributes::founder(6, 4));
    }
}
