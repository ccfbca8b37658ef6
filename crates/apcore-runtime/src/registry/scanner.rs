//! Filesystem scanner for module manifests.
//!
//! Discovery step 1: a recursive, depth-limited walk over one or more
//! extension roots collecting `*.module.yaml` manifests. The canonical
//! id of each module derives from its path relative to the root, with
//! the extension dropped and separators replaced by dots.

use apcore_module::DiscoveredModule;
use apcore_types::{ErrorKind, ModuleError};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Extension that marks a file as a module manifest.
pub const SOURCE_EXTENSION: &str = ".module.yaml";

/// Directory names skipped regardless of prefix rules.
const SKIP_DIR_NAMES: &[&str] = &["node_modules", "target"];

/// One extension root, optionally namespaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootSpec {
    /// The directory to scan.
    pub root: PathBuf,
    /// Namespace prefix for ids from this root; defaults to the root's
    /// directory name.
    pub namespace: Option<String>,
}

impl RootSpec {
    /// A root without an explicit namespace.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            namespace: None,
        }
    }

    /// A root with a namespace prefix.
    #[must_use]
    pub fn with_namespace(root: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            namespace: Some(namespace.into()),
        }
    }
}

/// Recursively scans one extensions root.
///
/// Entries whose name starts with `.` or `_` are skipped, as are
/// well-known build directories. Symlinks are skipped entirely unless
/// `follow_symlinks`; when followed, already-visited canonical paths
/// are tracked to break cycles. Duplicate ids keep the first occurrence
/// and log the rest; case-only collisions warn. Permission errors are
/// logged and scanning continues.
///
/// # Errors
///
/// `CONFIG_NOT_FOUND` when the root itself does not exist.
pub fn scan_extensions(
    root: &Path,
    max_depth: usize,
    follow_symlinks: bool,
) -> Result<Vec<DiscoveredModule>, ModuleError> {
    let root = root
        .canonicalize()
        .map_err(|_| ErrorKind::ConfigNotFound {
            path: root.display().to_string(),
        })?;

    let mut state = ScanState {
        root: root.clone(),
        max_depth,
        follow_symlinks,
        visited_real_paths: HashSet::from([root.clone()]),
        seen_ids: HashMap::new(),
        seen_ids_lower: HashMap::new(),
        results: Vec::new(),
    };
    state.scan_dir(&root, 1);
    Ok(state.results)
}

/// Scans multiple roots, prefixing each root's ids with its namespace.
///
/// # Errors
///
/// `CONFIG_INVALID` for duplicate namespaces; `CONFIG_NOT_FOUND` for a
/// missing root.
pub fn scan_multi_root(
    roots: &[RootSpec],
    max_depth: usize,
    follow_symlinks: bool,
) -> Result<Vec<DiscoveredModule>, ModuleError> {
    // Validate all namespaces before any scanning starts.
    let mut seen_namespaces = HashSet::new();
    let mut resolved = Vec::with_capacity(roots.len());
    for spec in roots {
        let namespace = spec.namespace.clone().unwrap_or_else(|| {
            spec.root
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        if !seen_namespaces.insert(namespace.clone()) {
            return Err(ModuleError::config_invalid(format!(
                "duplicate namespace: '{namespace}'"
            )));
        }
        resolved.push((spec.root.clone(), namespace));
    }

    let mut all = Vec::new();
    for (root, namespace) in resolved {
        let modules = scan_extensions(&root, max_depth, follow_symlinks)?;
        for module in modules {
            all.push(DiscoveredModule {
                canonical_id: format!("{namespace}.{}", module.canonical_id),
                namespace: Some(namespace.clone()),
                ..module
            });
        }
    }
    Ok(all)
}

struct ScanState {
    root: PathBuf,
    max_depth: usize,
    follow_symlinks: bool,
    visited_real_paths: HashSet<PathBuf>,
    seen_ids: HashMap<String, PathBuf>,
    seen_ids_lower: HashMap<String, String>,
    results: Vec<DiscoveredModule>,
}

impl ScanState {
    fn scan_dir(&mut self, dir: &Path, depth: usize) {
        if depth > self.max_depth {
            info!(dir = %dir.display(), max_depth = self.max_depth, "max depth exceeded, skipping");
            return;
        }

        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                error!(dir = %dir.display(), %e, "cannot scan directory");
                return;
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry.path()),
                Err(e) => {
                    error!(dir = %dir.display(), %e, "cannot read directory entry");
                    None
                }
            })
            .collect();
        paths.sort();

        for path in paths {
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            if name.starts_with('.') || name.starts_with('_') {
                continue;
            }
            if SKIP_DIR_NAMES.contains(&name.as_str()) {
                continue;
            }

            let metadata = match path.symlink_metadata() {
                Ok(metadata) => metadata,
                Err(e) => {
                    error!(path = %path.display(), %e, "cannot stat entry");
                    continue;
                }
            };
            let is_symlink = metadata.file_type().is_symlink();
            if is_symlink && !self.follow_symlinks {
                continue;
            }

            let target_is_dir = if is_symlink {
                path.metadata().map(|m| m.is_dir()).unwrap_or(false)
            } else {
                metadata.is_dir()
            };

            if target_is_dir {
                if is_symlink {
                    match path.canonicalize() {
                        Ok(real) => {
                            if !self.visited_real_paths.insert(real.clone()) {
                                warn!(
                                    link = %path.display(),
                                    target = %real.display(),
                                    "symlink cycle detected, skipping"
                                );
                                continue;
                            }
                        }
                        Err(e) => {
                            error!(path = %path.display(), %e, "cannot resolve symlink");
                            continue;
                        }
                    }
                }
                self.scan_dir(&path, depth + 1);
            } else if name.ends_with(SOURCE_EXTENSION) {
                self.record_file(&path, &name);
            }
        }
    }

    fn record_file(&mut self, path: &Path, name: &str) {
        let Ok(rel) = path.strip_prefix(&self.root) else {
            return;
        };
        let rel_text = rel.to_string_lossy();
        let trimmed = &rel_text[..rel_text.len() - SOURCE_EXTENSION.len()];
        let canonical_id = trimmed.replace(std::path::MAIN_SEPARATOR, ".");

        if let Some(existing) = self.seen_ids.get(&canonical_id) {
            error!(
                id = %canonical_id,
                path = %path.display(),
                existing = %existing.display(),
                "duplicate module id, skipping"
            );
            return;
        }

        let lower = canonical_id.to_lowercase();
        if let Some(other) = self.seen_ids_lower.get(&lower) {
            if other != &canonical_id {
                warn!(a = %canonical_id, b = %other, "module ids differ only by case");
            }
        }

        let stem = &name[..name.len() - SOURCE_EXTENSION.len()];
        let meta_path = path.with_file_name(format!("{stem}_meta.yaml"));
        let meta_path = meta_path.exists().then_some(meta_path);

        self.seen_ids.insert(canonical_id.clone(), path.to_path_buf());
        self.seen_ids_lower.insert(lower, canonical_id.clone());
        self.results.push(DiscoveredModule {
            file_path: path.to_path_buf(),
            canonical_id,
            meta_path,
            namespace: None,
        });
    }
}
