//! Lineage tree builder.
//!
//! Works on the G1 rows of a normalized annotation table. A physical
//! `Cell_ID` is cut into *branches* (maximal runs over consecutive table
//! frames) and each branch into *segments* (runs of G1 rows with the same
//! normalized generation). Every segment becomes one tree node with its own
//! `Cell_ID_tree`.
//!
//! Branches are processed in order of first appearance so that the partner a
//! daughter inherits its generation from is normally built already. All
//! lookup state lives in [`BuildContext`] and is dropped with it.

use crate::settings::BuildSettings;
use celltree_protocol::{
    AnnotationRecord, BuildDiagnostic, BuildProgress, CellId, DiagnosticKind, FrameIndex,
    TreeAttributes, NO_ID,
};
use itertools::Itertools;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// One appearance of a physical cell: `ordinal` counts reappearances after a
/// frame gap, starting at 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BranchKey {
    pub cell_id: CellId,
    pub ordinal: usize,
}

#[derive(Debug, Clone)]
pub struct Segment {
    pub branch: BranchKey,
    pub normalized_gen: i64,
    /// Record indices of the segment's G1 rows, in frame order.
    pub rows: Vec<usize>,
    pub start_frame: FrameIndex,
    pub end_frame: FrameIndex,
    pub attrs: TreeAttributes,
}

impl Segment {
    pub fn cell_id(&self) -> CellId {
        self.branch.cell_id
    }
}

#[derive(Debug, Clone)]
struct Branch {
    key: BranchKey,
    first_frame: FrameIndex,
    /// Record indices of every row (any stage), in frame order.
    rows: Vec<usize>,
}

/// Output of [`build_tree`]. Sisters are still unset at this point.
#[derive(Debug, Clone, Default)]
pub struct TreeBuild {
    pub segments: Vec<Segment>,
    /// `(frame_i, Cell_ID)` of each built G1 row to its segment.
    pub row_segment: HashMap<(FrameIndex, CellId), usize>,
    /// `(frame_i, Cell_ID)` of every row, any stage, to its branch.
    pub row_branch: HashMap<(FrameIndex, CellId), BranchKey>,
    pub branch_count: usize,
    pub minted_surrogates: usize,
    pub diagnostics: Vec<BuildDiagnostic>,
}

impl TreeBuild {
    pub fn segment_at(&self, frame_i: FrameIndex, cell_id: CellId) -> Option<&Segment> {
        self.row_segment
            .get(&(frame_i, cell_id))
            .map(|&idx| &self.segments[idx])
    }
}

struct BuildContext<'a> {
    records: &'a [AnnotationRecord],
    normalized: &'a [i64],
    settings: &'a BuildSettings,
    g1_rows: HashSet<(FrameIndex, CellId)>,
    /// `(Cell_ID, generation_num_tree)` to segment indices, in build order.
    segments_by_key: HashMap<(CellId, i64), Vec<usize>>,
    segments_by_surrogate: HashMap<CellId, usize>,
    root_of_branch: HashMap<BranchKey, CellId>,
    branch_offset: HashMap<BranchKey, i64>,
    surrogate_counter: CellId,
    out: TreeBuild,
}

/// Builds tree nodes for every G1 row of `records`.
///
/// `normalized` is index-aligned with `records`. The progress callback is
/// called once per completed branch.
pub fn build_tree(
    records: &[AnnotationRecord],
    normalized: &[i64],
    settings: &BuildSettings,
    progress: &mut dyn FnMut(BuildProgress),
) -> TreeBuild {
    let branches = split_branches(records);
    let max_id = records.iter().map(|r| r.cell_id).max().unwrap_or(0).max(0);
    let mut ctx = BuildContext {
        records,
        normalized,
        settings,
        g1_rows: records.iter().filter(|r| r.is_g1()).map(|r| r.key()).collect(),
        segments_by_key: HashMap::new(),
        segments_by_surrogate: HashMap::new(),
        root_of_branch: HashMap::new(),
        branch_offset: HashMap::new(),
        surrogate_counter: max_id.saturating_add(1),
        out: TreeBuild {
            row_branch: branches
                .iter()
                .flat_map(|b| b.rows.iter().map(move |&idx| (records[idx].key(), b.key)))
                .collect(),
            branch_count: branches.len(),
            ..TreeBuild::default()
        },
    };

    let total = branches.len();
    let mut completed = 0;
    let mut finish = |ctx: &mut BuildContext<'_>, branch: &Branch| {
        ctx.build_branch(branch);
        completed += 1;
        progress(BuildProgress {
            completed_branches: completed,
            total_branches: total,
        });
    };

    if settings.defer_unresolved_partners {
        let mut pending: VecDeque<&Branch> = branches.iter().collect();
        while !pending.is_empty() {
            let mut waiting = VecDeque::new();
            let mut progressed = false;
            while let Some(branch) = pending.pop_front() {
                if ctx.partner_ready(branch) {
                    finish(&mut ctx, branch);
                    progressed = true;
                } else {
                    waiting.push_back(branch);
                }
            }
            if !progressed {
                if let Some(branch) = waiting.pop_front() {
                    finish(&mut ctx, branch);
                }
            }
            pending = waiting;
        }
    } else {
        for branch in &branches {
            finish(&mut ctx, branch);
        }
    }

    tracing::debug!(
        branches = ctx.out.branch_count,
        segments = ctx.out.segments.len(),
        minted = ctx.out.minted_surrogates,
        "tree builder finished"
    );
    ctx.out
}

/// Groups each ID's rows into runs over consecutive table frames, sorted by
/// `(first frame, Cell_ID)`.
fn split_branches(records: &[AnnotationRecord]) -> Vec<Branch> {
    let frame_pos: HashMap<FrameIndex, usize> = records
        .iter()
        .map(|r| r.frame_i)
        .sorted()
        .dedup()
        .enumerate()
        .map(|(pos, frame)| (frame, pos))
        .collect();

    let mut by_id: BTreeMap<CellId, Vec<usize>> = BTreeMap::new();
    for (idx, record) in records.iter().enumerate() {
        by_id.entry(record.cell_id).or_default().push(idx);
    }

    let mut branches = vec![];
    for (cell_id, mut rows) in by_id {
        rows.sort_by_key(|&idx| records[idx].frame_i);
        let mut ordinal = 0;
        let mut current: Vec<usize> = vec![];
        for idx in rows {
            if let Some(&last) = current.last() {
                if frame_pos[&records[idx].frame_i] != frame_pos[&records[last].frame_i] + 1 {
                    branches.push(Branch {
                        key: BranchKey { cell_id, ordinal },
                        first_frame: records[current[0]].frame_i,
                        rows: std::mem::take(&mut current),
                    });
                    ordinal += 1;
                }
            }
            current.push(idx);
        }
        if !current.is_empty() {
            branches.push(Branch {
                key: BranchKey { cell_id, ordinal },
                first_frame: records[current[0]].frame_i,
                rows: current,
            });
        }
    }
    branches.sort_by_key(|b| (b.first_frame, b.key.cell_id, b.key.ordinal));
    branches
}

impl BuildContext<'_> {
    fn segment_rows(&self, branch: &Branch) -> Vec<Vec<usize>> {
        let runs = branch
            .rows
            .iter()
            .copied()
            .filter(|&idx| self.records[idx].is_g1())
            .chunk_by(|&idx| self.normalized[idx]);
        let ret = runs.into_iter().map(|(_, rows)| rows.collect()).collect();
        ret
    }

    fn first_g1_row(&self, branch: &Branch) -> Option<&AnnotationRecord> {
        branch
            .rows
            .iter()
            .map(|&idx| &self.records[idx])
            .find(|r| r.is_g1())
    }

    fn built_generation(&self, frame_i: FrameIndex, cell_id: CellId) -> Option<i64> {
        self.out
            .segment_at(frame_i, cell_id)
            .map(|s| s.attrs.generation_num_tree)
    }

    /// True if building `branch` now would not need the 0-fallback, or if
    /// waiting cannot help because the partner row will never be built.
    fn partner_ready(&self, branch: &Branch) -> bool {
        let Some(first) = self.first_g1_row(branch) else {
            return true;
        };
        if !first.has_relative() || first.relative_id == first.cell_id {
            return true;
        }
        if self.built_generation(first.frame_i, first.relative_id).is_some() {
            return true;
        }
        !self.g1_rows.contains(&(first.frame_i, first.relative_id))
    }

    fn mint_surrogate(&mut self) -> CellId {
        let id = self.surrogate_counter;
        self.surrogate_counter = self.surrogate_counter.saturating_add(1);
        self.out.minted_surrogates += 1;
        id
    }

    fn inherited_offset(&mut self, key: BranchKey, first: &AnnotationRecord) -> i64 {
        if let Some(&offset) = self.branch_offset.get(&key) {
            return offset;
        }
        let offset = if first.has_relative() {
            match self.built_generation(first.frame_i, first.relative_id) {
                Some(partner_gen) => partner_gen - 1,
                None => {
                    tracing::debug!(
                        frame_i = first.frame_i,
                        cell_id = first.cell_id,
                        relative_id = first.relative_id,
                        "partner has no tree generation yet, using offset 0"
                    );
                    self.out.diagnostics.push(BuildDiagnostic {
                        kind: DiagnosticKind::PartnerOffsetFallback,
                        frame_i: first.frame_i,
                        cell_id: first.cell_id,
                        message: format!(
                            "relative {} has no tree generation at frame {}",
                            first.relative_id, first.frame_i
                        ),
                    });
                    0
                }
            }
        } else {
            0
        };
        self.branch_offset.insert(key, offset);
        offset
    }

    /// Latest segment of `(cell_id, generation)` starting no later than
    /// `frame_i`.
    fn ancestor_candidate(
        &self,
        cell_id: CellId,
        generation: i64,
        frame_i: FrameIndex,
    ) -> Option<CellId> {
        self.segments_by_key
            .get(&(cell_id, generation))?
            .iter()
            .map(|&idx| &self.out.segments[idx])
            .filter(|s| s.start_frame <= frame_i)
            .max_by_key(|s| s.start_frame)
            .map(|s| s.attrs.cell_id_tree)
    }

    /// Follows parent pointers from `start` to the founder.
    fn resolve_root(&self, start: CellId, max_hops: i64) -> CellId {
        let mut current = start;
        for _ in 0..max_hops.max(1) {
            let Some(&idx) = self.segments_by_surrogate.get(&current) else {
                break;
            };
            let parent = self.out.segments[idx].attrs.parent_id_tree;
            if parent == NO_ID {
                break;
            }
            current = parent;
        }
        current
    }

    fn report_founder_fallback(&mut self, first: &AnnotationRecord, generation: i64) {
        if self.settings.warn_on_founder_fallback {
            tracing::warn!(
                frame_i = first.frame_i,
                cell_id = first.cell_id,
                generation,
                "no ancestor segment found, treating as founder"
            );
        } else {
            tracing::debug!(
                frame_i = first.frame_i,
                cell_id = first.cell_id,
                generation,
                "no ancestor segment found, treating as founder"
            );
        }
        self.out.diagnostics.push(BuildDiagnostic {
            kind: DiagnosticKind::UnresolvableAncestry,
            frame_i: first.frame_i,
            cell_id: first.cell_id,
            message: format!(
                "no segment of Cell_ID {} or relative {} at generation {}",
                first.cell_id,
                first.relative_id,
                generation - 1
            ),
        });
    }

    fn build_branch(&mut self, branch: &Branch) {
        let records = self.records;
        let segment_rows = self.segment_rows(branch);
        let Some(first_rows) = segment_rows.first() else {
            tracing::debug!(cell_id = branch.key.cell_id, "branch without G1 rows");
            return;
        };
        let offset = self.inherited_offset(branch.key, &records[first_rows[0]]);

        let mut local_by_gen: HashMap<i64, CellId> = HashMap::new();
        for (local_idx, rows) in segment_rows.into_iter().enumerate() {
            let first = &records[rows[0]];
            let generation = local_idx as i64 + 1 + offset;
            let cell_id_tree = if local_idx == 0 && branch.key.ordinal == 0 {
                branch.key.cell_id
            } else {
                self.mint_surrogate()
            };

            let parent_id_tree = if generation > 1 {
                let own = local_by_gen.get(&(generation - 1)).copied();
                let via_relative = || {
                    first
                        .has_relative()
                        .then(|| {
                            let frame_i = first.frame_i;
                            self.ancestor_candidate(first.relative_id, generation - 1, frame_i)
                        })
                        .flatten()
                };
                match own.or_else(via_relative) {
                    Some(parent) => parent,
                    None => {
                        self.report_founder_fallback(first, generation);
                        NO_ID
                    }
                }
            } else {
                NO_ID
            };

            let root_id_tree = if local_idx == 0 {
                let root = if generation == 1 || parent_id_tree == NO_ID {
                    cell_id_tree
                } else {
                    self.resolve_root(parent_id_tree, generation)
                };
                self.root_of_branch.insert(branch.key, root);
                root
            } else {
                self.root_of_branch
                    .get(&branch.key)
                    .copied()
                    .unwrap_or(cell_id_tree)
            };

            let segment = Segment {
                branch: branch.key,
                normalized_gen: self.normalized[rows[0]],
                start_frame: first.frame_i,
                end_frame: records[rows[rows.len() - 1]].frame_i,
                attrs: TreeAttributes {
                    cell_id_tree,
                    parent_id_tree,
                    root_id_tree,
                    generation_num_tree: generation,
                    sister_id_tree: NO_ID,
                },
                rows,
            };
            let seg_idx = self.out.segments.len();
            for &row in &segment.rows {
                self.out.row_segment.insert(records[row].key(), seg_idx);
            }
            self.segments_by_key
                .entry((branch.key.cell_id, generation))
                .or_default()
                .push(seg_idx);
            self.segments_by_surrogate.insert(cell_id_tree, seg_idx);
            local_by_gen.insert(generation, cell_id_tree);
            self.out.segments.push(segment);
        }
        tracing::debug!(
            cell_id = branch.key.cell_id,
            ordinal = branch.key.ordinal,
            first_frame = branch.first_frame,
            offset,
            "branch built"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_generations;
    use crate::testing::{one_division, RecordBuilder};

    fn build(records: &[AnnotationRecord], settings: &BuildSettings) -> TreeBuild {
        let normalized = normalize_generations(records);
        build_tree(records, &normalized, settings, &mut |_| {})
    }

    #[test]
    fn test_single_founder() {
        let records: Vec<_> = (0..3)
            .map(|f| RecordBuilder::g1(f, 5, 3).history_known(false).build())
            .collect();
        let out = build(&records, &BuildSettings::default());
        assert_eq!(out.segments.len(), 1);
        let attrs = out.segments[0].attrs;
        assert_eq!(attrs.cell_id_tree, 5);
        assert_eq!(attrs.parent_id_tree, NO_ID);
        assert_eq!(attrs.root_id_tree, 5);
        assert_eq!(attrs.generation_num_tree, 1);
        assert_eq!(out.minted_surrogates, 0);
    }

    #[test]
    fn test_division_mints_surrogate_for_mother_and_links_bud() {
        let records = one_division();
        let out = build(&records, &BuildSettings::default());
        // 5 before division, 5 after division (minted 10), bud 9.
        assert_eq!(out.segments.len(), 3);

        let before = out.segment_at(0, 5).unwrap().attrs;
        let after = out.segment_at(11, 5).unwrap().attrs;
        let bud = out.segment_at(11, 9).unwrap().attrs;

        assert_eq!(before.cell_id_tree, 5);
        assert_eq!(after.cell_id_tree, 10);
        assert_eq!(after.parent_id_tree, 5);
        assert_eq!(after.generation_num_tree, 2);

        assert_eq!(bud.cell_id_tree, 9);
        assert_eq!(bud.parent_id_tree, 5);
        assert_eq!(bud.generation_num_tree, 2);
        assert_eq!(bud.root_id_tree, 5);
        assert!(out.segment_at(5, 5).is_none(), "S rows are not built here");
    }

    #[test]
    fn test_id_reuse_after_gap_gets_new_identity() {
        let mut records = vec![];
        for f in 0..3 {
            records.push(RecordBuilder::g1(f, 9, 1).build());
            records.push(RecordBuilder::g1(f, 1, 1).build());
        }
        for f in 3..8 {
            records.push(RecordBuilder::g1(f, 1, 1).build());
        }
        for f in 8..10 {
            records.push(RecordBuilder::g1(f, 1, 1).build());
            records.push(RecordBuilder::g1(f, 9, 1).build());
        }
        let out = build(&records, &BuildSettings::default());
        assert_eq!(out.branch_count, 3);
        let early = out.segment_at(0, 9).unwrap().attrs;
        let late = out.segment_at(8, 9).unwrap().attrs;
        assert_eq!(early.cell_id_tree, 9);
        assert_ne!(late.cell_id_tree, early.cell_id_tree);
        assert_eq!(late.parent_id_tree, NO_ID);
        assert_eq!(late.root_id_tree, late.cell_id_tree);
    }

    #[test]
    fn test_unresolvable_ancestry_degrades_to_founder() {
        // 1 divides at frame 2 giving bud 2. Cell 6 appears at frame 3 and
        // names 2 as its relative, although 2 points back at 1. 2 sits at
        // tree generation 2 without a generation-1 node of its own, so 6
        // inherits generation 2 and finds no parent.
        let mut records = vec![];
        for f in 0..2 {
            records.push(RecordBuilder::g1(f, 1, 1).build());
        }
        for f in 2..4 {
            records.push(RecordBuilder::g1(f, 1, 2).relative(2).build());
            records.push(RecordBuilder::g1(f, 2, 1).relative(1).build());
        }
        records.push(RecordBuilder::g1(3, 6, 1).relative(2).build());

        let out = build(&records, &BuildSettings::default());
        let bud = out.segment_at(2, 2).unwrap().attrs;
        assert_eq!(bud.generation_num_tree, 2);
        assert_eq!(bud.parent_id_tree, 1);

        let orphan = out.segment_at(3, 6).unwrap().attrs;
        assert_eq!(orphan.generation_num_tree, 2);
        assert_eq!(orphan.parent_id_tree, NO_ID);
        assert_eq!(orphan.root_id_tree, 6);
        assert!(out
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::UnresolvableAncestry && d.cell_id == 6));
    }

    #[test]
    fn test_partner_fallback_and_deferred_retry() {
        // 8 is the bud of 1; 3 shows up at the same frame naming 8 as its
        // relative but has the lower ID, so it comes first in build order.
        let mut records = vec![];
        for f in 0..2 {
            records.push(RecordBuilder::g1(f, 1, 1).build());
        }
        for f in 2..4 {
            records.push(RecordBuilder::g1(f, 1, 2).relative(8).build());
            records.push(RecordBuilder::g1(f, 8, 1).relative(1).build());
            records.push(RecordBuilder::g1(f, 3, 1).relative(8).build());
        }
        let eager = build(&records, &BuildSettings::default());
        assert_eq!(eager.segment_at(2, 8).unwrap().attrs.generation_num_tree, 2);
        let three = eager.segment_at(2, 3).unwrap().attrs;
        assert_eq!(three.generation_num_tree, 1);
        assert!(eager
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::PartnerOffsetFallback && d.cell_id == 3));

        let deferred = build(
            &records,
            &BuildSettings {
                defer_unresolved_partners: true,
                ..BuildSettings::default()
            },
        );
        let three = deferred.segment_at(2, 3).unwrap().attrs;
        assert_eq!(three.generation_num_tree, 2);
        assert!(deferred
            .diagnostics
            .iter()
            .all(|d| d.kind != DiagnosticKind::PartnerOffsetFallback));
        assert_eq!(
            deferred.segments.len(),
            eager.segments.len(),
            "deferral changes order, not the node set"
        );
    }

    #[test]
    fn test_progress_is_reported_per_branch() {
        let records = one_division();
        let normalized = normalize_generations(&records);
        let mut seen = vec![];
        let out = build_tree(&records, &normalized, &BuildSettings::default(), &mut |p| {
            seen.push(p)
        });
        assert_eq!(seen.len(), out.branch_count);
        assert_eq!(seen.last().unwrap().completed_branches, out.branch_count);
        assert!(seen.iter().all(|p| p.total_branches == out.branch_count));
    }
}
