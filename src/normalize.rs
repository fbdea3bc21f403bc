//! Generation-number normalization.
//!
//! Users start counting generations wherever they like. For a mother cell whose
//! history is unknown, the first observed generation is shifted to 2 so that it
//! reads as "at least one division behind it"; every other cell keeps its
//! counter. The shift is a constant per physical `Cell_ID`.

use celltree_protocol::{AnnotationRecord, CellId, Relationship};
use std::collections::BTreeMap;

/// Per-`Cell_ID` offset, decided by the earliest record of that ID.
pub fn generation_offsets(records: &[AnnotationRecord]) -> BTreeMap<CellId, i64> {
    let mut earliest: BTreeMap<CellId, &AnnotationRecord> = BTreeMap::new();
    for record in records {
        earliest
            .entry(record.cell_id)
            .and_modify(|e| {
                if record.frame_i < e.frame_i {
                    *e = record;
                }
            })
            .or_insert(record);
    }
    earliest
        .into_iter()
        .map(|(cell_id, first)| {
            let offset = if first.relationship == Relationship::Mother && !first.is_history_known
            {
                2i64.saturating_sub(first.generation_num)
            } else {
                0
            };
            (cell_id, offset)
        })
        .collect()
}

/// `normalized_gen_num` for each record, index-aligned with `records`.
pub fn normalize_generations(records: &[AnnotationRecord]) -> Vec<i64> {
    let offsets = generation_offsets(records);
    records
        .iter()
        .map(|r| {
            let offset = offsets.get(&r.cell_id).copied().unwrap_or(0);
            r.generation_num.saturating_add(offset)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordBuilder;

    #[test]
    fn test_unknown_history_mother_starts_at_two() {
        let records = vec![
            RecordBuilder::g1(1, 5, 3).history_known(false).build(),
            RecordBuilder::g1(0, 5, 3).history_known(false).build(),
            RecordBuilder::g1(2, 5, 4).history_known(false).build(),
        ];
        assert_eq!(normalize_generations(&records), vec![2, 2, 3]);
    }

    #[test]
    fn test_known_history_is_untouched() {
        let records = vec![
            RecordBuilder::g1(0, 1, 7).build(),
            RecordBuilder::g1(1, 1, 8).build(),
        ];
        assert_eq!(normalize_generations(&records), vec![7, 8]);
    }

    #[test]
    fn test_bud_first_is_untouched() {
        // First seen as a bud, later an unknown-history mother: the earliest
        // record decides, so no shift applies.
        let records = vec![
            RecordBuilder::s_bud(0, 9, 4).generation(0).build(),
            RecordBuilder::g1(1, 9, 1).history_known(false).build(),
        ];
        assert_eq!(normalize_generations(&records), vec![0, 1]);
        assert_eq!(generation_offsets(&records).get(&9), Some(&0));
    }
}
