#![allow(clippy::doc_markdown)] // Generated file contains OPT_LEVEL without backticks

use std::sync::LazyLock;

include!(concat!(env!("OUT_DIR"), "/built.rs"));

/// Version string reported in logs and written into @PG records:
/// - Cargo package version
/// - short git commit hash, when built from a checkout
/// - `-dirty` when the checkout had uncommitted changes
pub static VERSION: LazyLock<String> = LazyLock::new(|| {
    let mut version = match GIT_COMMIT_HASH_SHORT {
        Some(hash) => format!("{PKG_VERSION}-{hash}"),
        None => PKG_VERSION.to_string(),
    };
    if GIT_DIRTY == Some(true) {
        version.push_str("-dirty");
    }
    version
});
