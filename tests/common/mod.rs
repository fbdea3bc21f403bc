#![allow(dead_code)]

use celltree::AnnotationTable;
use celltree::protocol::REQUIRED_COLUMNS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub frame_i: i64,
    pub cell_id: i64,
    pub stage: &'static str,
    pub generation_num: i64,
    pub relative_id: i64,
    pub relationship: &'static str,
    pub history_known: bool,
}

impl Row {
    pub fn g1(frame_i: i64, cell_id: i64, generation_num: i64, relative_id: i64) -> Self {
        Self {
            frame_i,
            cell_id,
            stage: "G1",
            generation_num,
            relative_id,
            relationship: "mother",
            history_known: true,
        }
    }

    pub fn s_mother(frame_i: i64, cell_id: i64, generation_num: i64, bud_id: i64) -> Self {
        Self {
            stage: "S",
            ..Self::g1(frame_i, cell_id, generation_num, bud_id)
        }
    }

    pub fn s_bud(frame_i: i64, cell_id: i64, mother_id: i64) -> Self {
        Self {
            stage: "S",
            relationship: "bud",
            ..Self::g1(frame_i, cell_id, 0, mother_id)
        }
    }

    pub fn unknown_history(mut self) -> Self {
        self.history_known = false;
        self
    }

    fn csv_line(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},-1,-1",
            self.frame_i,
            self.cell_id,
            self.stage,
            self.generation_num,
            self.relative_id,
            self.relationship,
            if self.history_known { "True" } else { "False" }
        )
    }
}

pub fn csv_text(rows: &[Row]) -> String {
    let mut text = REQUIRED_COLUMNS.join(",");
    text.push('\n');
    for row in rows {
        text.push_str(&row.csv_line());
        text.push('\n');
    }
    text
}

pub fn table(rows: &[Row]) -> AnnotationTable {
    AnnotationTable::read_csv(csv_text(rows).as_bytes()).unwrap()
}

/// Mother 5 (unknown history, generation 3) buds 9 over frames 5..=10; both
/// are in G1 from frame 11 on.
pub fn one_division() -> Vec<Row> {
    let mut rows = vec![];
    for f in 0..5 {
        rows.push(Row::g1(f, 5, 3, -1).unknown_history());
    }
    for f in 5..=10 {
        rows.push(Row::s_mother(f, 5, 3, 9).unknown_history());
        rows.push(Row::s_bud(f, 9, 5));
    }
    for f in 11..=13 {
        rows.push(Row::g1(f, 5, 4, 9).unknown_history());
        rows.push(Row::g1(f, 9, 1, 5));
    }
    rows
}
