//! Output naming
//!
//! Outputs never overwrite anything: a taken name gets a `_1`, `_2`, …
//! suffix before the extension. The file system is the only state consulted,
//! so two processes writing into the same directory can still race.

use std::path::{Path, PathBuf};

/// `output_dir/<source stem>.<extension>`, before collision handling.
pub fn output_path_for(source: &Path, output_dir: &Path, extension: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "output".to_string());
    output_dir.join(format!("{}.{}", stem, extension))
}

/// First free path among `desired`, `stem_1.ext`, `stem_2.ext`, …
pub fn resolve_unique_path(desired: &Path) -> PathBuf {
    if !desired.exists() {
        return desired.to_path_buf();
    }

    let parent = desired.parent().unwrap_or_else(|| Path::new(""));
    let stem = desired
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = desired
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut counter: u64 = 1;
    loop {
        let candidate = parent.join(format!("{}_{}{}", stem, counter, extension));
        if !candidate.exists() {
            tracing::debug!(
                desired = %desired.display(),
                resolved = %candidate.display(),
                "Output name taken, using suffixed name"
            );
            return candidate;
        }
        counter += 1;
    }
}
