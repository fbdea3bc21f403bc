//! Sister linking, run once every tree node exists.

use crate::tree::TreeBuild;
use celltree_protocol::{AnnotationRecord, BuildDiagnostic, DiagnosticKind, NO_ID};

/// Sets `sister_ID_tree` on every node from the relative named on the node's
/// first row. Each node has its own `Cell_ID_tree`, so nodes and segments
/// coincide here.
pub fn assign_sisters(build: &mut TreeBuild, records: &[AnnotationRecord]) -> Vec<BuildDiagnostic> {
    let mut diagnostics = vec![];
    let mut sisters = Vec::with_capacity(build.segments.len());
    for segment in &build.segments {
        let first = &records[segment.rows[0]];
        if !first.has_relative() {
            sisters.push(NO_ID);
            continue;
        }
        match build.segment_at(first.frame_i, first.relative_id) {
            Some(relative) => sisters.push(relative.attrs.cell_id_tree),
            None => {
                tracing::debug!(
                    frame_i = first.frame_i,
                    cell_id = first.cell_id,
                    relative_id = first.relative_id,
                    "relative has no tree node at this frame"
                );
                diagnostics.push(BuildDiagnostic {
                    kind: DiagnosticKind::UnresolvedSister,
                    frame_i: first.frame_i,
                    cell_id: first.cell_id,
                    message: format!(
                        "relative {} has no G1 node at frame {}",
                        first.relative_id, first.frame_i
                    ),
                });
                sisters.push(NO_ID);
            }
        }
    }
    for (segment, sister) in build.segments.iter_mut().zip(sisters) {
        segment.attrs.sister_id_tree = sister;
    }
    diagnostics
}
