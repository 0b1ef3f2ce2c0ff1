//! Portable path normalization
//!
//! Manifest keys and chunk paths are always relative to a fixed base
//! directory and use forward slashes regardless of host platform.

use std::path::{Component, Path, PathBuf};

/// Normalize a path to its portable, base-relative form
///
/// Paths outside the base directory keep their absolute form (still with
/// forward slashes) so they remain unambiguous.
pub fn normalize_path(base: &Path, path: &Path) -> String {
    let absolute = absolutize(base, path);
    let base = lexical_clean(base);
    let relative = absolute.strip_prefix(&base).unwrap_or(&absolute);
    to_posix(relative)
}

/// Resolve a stored (normalized) path back to a filesystem path
pub fn resolve_path(base: &Path, normalized: &str) -> PathBuf {
    let candidate = Path::new(normalized);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(normalized.split('/').collect::<PathBuf>())
    }
}

/// Join relative paths onto `base` and resolve `.`/`..` lexically
pub fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        lexical_clean(path)
    } else {
        lexical_clean(&base.join(path))
    }
}

/// True if `normalized` lies at or below the normalized `root`
pub fn is_within(normalized: &str, root: &str) -> bool {
    root.is_empty()
        || normalized == root
        || normalized
            .strip_prefix(root)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn lexical_clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn to_posix(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut absolute = false;
    for component in path.components() {
        match component {
            Component::RootDir => absolute = true,
            Component::Prefix(prefix) => parts.push(prefix.as_os_str().to_string_lossy().to_string()),
            Component::Normal(part) => parts.push(part.to_string_lossy().to_string()),
            Component::CurDir | Component::ParentDir => {}
        }
    }
    let joined = parts.join("/");
    if absolute && !cfg!(windows) {
        format!("/{}", joined)
    } else {
        joined
    }
}
