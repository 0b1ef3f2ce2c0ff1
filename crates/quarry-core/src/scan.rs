//! Candidate file resolution for indexing

use crate::chunk::FileType;
use crate::error::{QuarryError, Result};
use glob::Pattern;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Directories to exclude from scanning
const EXCLUDE_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    ".cache",
    "vendor",
    "dist",
    "build",
    "__pycache__",
    ".venv",
    "target",
];

/// Scan options
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub include: Vec<Pattern>,
    pub exclude: Vec<Pattern>,
    pub follow_symlinks: bool,
    pub exclude_dirs: Vec<String>,
    pub exclude_hidden: bool,
}

impl ScanOptions {
    /// Compile include/exclude glob patterns
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        let include = include
            .iter()
            .map(|p| Pattern::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let exclude = exclude
            .iter()
            .map(|p| Pattern::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self {
            include,
            exclude,
            ..Default::default()
        })
    }

    fn accepts(&self, relative: &str) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|p| p.matches(relative));
        included && !self.exclude.iter().any(|p| p.matches(relative))
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
            follow_symlinks: true,
            exclude_dirs: EXCLUDE_DIRS.iter().map(|s| s.to_string()).collect(),
            exclude_hidden: true,
        }
    }
}

/// Files selected for indexing
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    /// Absolute file paths with their detected types, sorted and deduplicated
    pub files: BTreeMap<PathBuf, FileType>,
    /// Directory roots that were walked
    pub scanned_dirs: Vec<PathBuf>,
}

impl CandidateSet {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Resolve roots into the set of files to index
///
/// Directories are walked and filtered by include/exclude patterns (matched
/// against the path relative to that root) and by supported extension. A file
/// named directly must have a supported extension, otherwise this fails
/// before anything is indexed.
pub fn resolve_candidates(roots: &[PathBuf], options: &ScanOptions) -> Result<CandidateSet> {
    let mut set = CandidateSet::default();

    for root in roots {
        let metadata = std::fs::metadata(root).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                QuarryError::InvalidInput(format!("Path does not exist: {}", root.display()))
            }
            _ => QuarryError::Io(e),
        })?;

        if metadata.is_file() {
            let file_type = FileType::detect(root)?;
            set.files.insert(root.clone(), file_type);
            continue;
        }

        set.scanned_dirs.push(root.clone());
        for (path, file_type) in scan_dir(root, options)? {
            set.files.insert(path, file_type);
        }
    }

    Ok(set)
}

fn scan_dir(root: &Path, options: &ScanOptions) -> Result<Vec<(PathBuf, FileType)>> {
    let mut results = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(options.follow_symlinks)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !should_skip(e, options));

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let Some(file_type) = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(FileType::from_extension)
        else {
            continue;
        };

        let relative = path
            .strip_prefix(root)
            .map(|p| {
                p.components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .unwrap_or_else(|_| path.to_string_lossy().to_string());

        if options.accepts(&relative) {
            results.push((path.to_path_buf(), file_type));
        } else {
            tracing::debug!("Excluded by pattern: {}", relative);
        }
    }

    Ok(results)
}

fn should_skip(entry: &DirEntry, options: &ScanOptions) -> bool {
    let name = entry.file_name().to_string_lossy();

    if options.exclude_hidden && name.starts_with('.') {
        return true;
    }

    if entry.file_type().is_dir() && options.exclude_dirs.iter().any(|d| name == *d) {
        return true;
    }

    false
}
