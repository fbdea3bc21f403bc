pub mod about;
pub mod engine;
pub mod error;
pub mod lineage;
pub mod logging;
pub mod normalize;
pub mod s_phase;
pub mod settings;
pub mod sisters;
pub mod table;
pub mod tree;

#[cfg(test)]
mod testing;

pub use celltree_protocol as protocol;
pub use error::TableError;
pub use lineage::{
    attributes_by_key, build_lineage, check_invariants, compute_lineage, strip_tree_columns,
    summarize_trees, Lineage,
};
pub use settings::BuildSettings;
pub use table::AnnotationTable;
