use crate::table::AnnotationTable;
use celltree_protocol::{AnnotationRecord, CellCycleStage, CellId, FrameIndex, Relationship, NO_ID};

pub struct RecordBuilder(AnnotationRecord);

impl RecordBuilder {
    pub fn g1(frame_i: FrameIndex, cell_id: CellId, generation_num: i64) -> Self {
        Self(AnnotationRecord {
            frame_i,
            cell_id,
            cell_cycle_stage: CellCycleStage::G1,
            generation_num,
            relative_id: NO_ID,
            relationship: Relationship::Mother,
            is_history_known: true,
            emerg_frame_i: NO_ID,
            division_frame_i: NO_ID,
        })
    }

    pub fn s_mother(
        frame_i: FrameIndex,
        cell_id: CellId,
        generation_num: i64,
        bud_id: CellId,
    ) -> Self {
        let mut ret = Self::g1(frame_i, cell_id, generation_num);
        ret.0.cell_cycle_stage = CellCycleStage::S;
        ret.0.relative_id = bud_id;
        ret
    }

    pub fn s_bud(frame_i: FrameIndex, cell_id: CellId, mother_id: CellId) -> Self {
        let mut ret = Self::g1(frame_i, cell_id, 0);
        ret.0.cell_cycle_stage = CellCycleStage::S;
        ret.0.relative_id = mother_id;
        ret.0.relationship = Relationship::Bud;
        ret
    }

    pub fn generation(mut self, generation_num: i64) -> Self {
        self.0.generation_num = generation_num;
        self
    }

    pub fn relative(mut self, relative_id: CellId) -> Self {
        self.0.relative_id = relative_id;
        self
    }

    pub fn history_known(mut self, known: bool) -> Self {
        self.0.is_history_known = known;
        self
    }

    pub fn build(self) -> AnnotationRecord {
        self.0
    }
}

pub fn table_from(records: &[AnnotationRecord]) -> AnnotationTable {
    let mut table = AnnotationTable::with_required_columns();
    for r in records {
        table
            .push_row([
                r.frame_i.to_string(),
                r.cell_id.to_string(),
                r.cell_cycle_stage.label().to_string(),
                r.generation_num.to_string(),
                r.relative_id.to_string(),
                r.relationship.label().to_string(),
                if r.is_history_known { "True" } else { "False" }.to_string(),
                r.emerg_frame_i.to_string(),
                r.division_frame_i.to_string(),
            ])
            .unwrap();
    }
    table
}

/// Mother 5 (unknown history, user generation 3) in G1 on frames 0..=4,
/// budding bud 9 on frames 5..=10; both in G1 from frame 11 to 13.
pub fn one_division() -> Vec<AnnotationRecord> {
    let mut records = vec![];
    for f in 0..=4 {
        records.push(RecordBuilder::g1(f, 5, 3).history_known(false).build());
    }
    for f in 5..=10 {
        records.push(RecordBuilder::s_mother(f, 5, 3, 9).history_known(false).build());
        records.push(RecordBuilder::s_bud(f, 9, 5).build());
    }
    for f in 11..=13 {
        records.push(
            RecordBuilder::g1(f, 5, 4)
                .relative(9)
                .history_known(false)
                .build(),
        );
        records.push(RecordBuilder::g1(f, 9, 1).relative(5).build());
    }
    records
}
