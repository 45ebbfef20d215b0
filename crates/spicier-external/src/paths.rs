//! Include path resolution shared by routing and rewriting.

use std::path::{Path, PathBuf};

/// File extension of compiled behavioral-model libraries.
pub const MODEL_LIBRARY_EXTENSION: &str = "osdi";
/// File extension of behavioral-model sources.
pub const MODEL_SOURCE_EXTENSION: &str = "va";

/// Resolve a path written in a netlist.
///
/// Order: the path itself when absolute, then relative to the netlist's
/// directory, then relative to each include directory. Only existing files
/// are returned.
pub fn resolve_include(
    raw: &str,
    base_dir: Option<&Path>,
    include_paths: &[PathBuf],
) -> Option<PathBuf> {
    let path = Path::new(raw);
    if raw.is_empty() {
        return None;
    }

    if path.is_absolute() {
        return path.is_file().then(|| path.to_path_buf());
    }

    base_dir
        .into_iter()
        .map(|dir| dir.join(path))
        .chain(include_paths.iter().map(|dir| dir.join(path)))
        .find(|candidate| candidate.is_file())
        .map(|found| std::path::absolute(&found).unwrap_or(found))
}

/// Whether a path names a compiled model library.
pub fn is_model_library(path: &str) -> bool {
    has_extension(path, MODEL_LIBRARY_EXTENSION)
}

/// Whether a path names a behavioral-model source.
pub fn is_model_source(path: &str) -> bool {
    has_extension(path, MODEL_SOURCE_EXTENSION)
}

fn has_extension(path: &str, ext: &str) -> bool {
    Path::new(path)
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}
