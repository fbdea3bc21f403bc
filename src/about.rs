pub const CELLTREE_DISPLAY_VERSION: &str = env!("CELLTREE_DISPLAY_VERSION");
pub const CELLTREE_BUILD_N: &str = env!("CELLTREE_BUILD_N");

pub fn version_cli_text() -> String {
    format!(
        "celltree {}\nBuild {}\nLineage trees for budding yeast time-lapse annotations",
        CELLTREE_DISPLAY_VERSION, CELLTREE_BUILD_N
    )
}
