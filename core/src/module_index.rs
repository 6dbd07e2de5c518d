//! Module discovery: which source file declares which module.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use regex::Regex;

use crate::error::IndexError;

fn module_decl() -> &'static Regex {
    static MODULE_DECL: OnceLock<Regex> = OnceLock::new();
    MODULE_DECL.get_or_init(|| {
        Regex::new(r"(?i)(?:^|\n)module\s+([\w.]+)").expect("valid module declaration regex")
    })
}

/// The module name declared by `source`: the first `module <Dotted.Name>` at
/// the start of a line.
#[must_use]
pub fn module_name(source: &str) -> Option<&str> {
    module_decl()
        .captures(source)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Module name to absolute source path. Names are unique; the first file (in
/// path order) to declare a name keeps it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleIndex {
    modules: HashMap<String, PathBuf>,
}

impl ModuleIndex {
    /// Build from known pairs.
    pub fn from_entries<I, N, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = (N, P)>,
        N: Into<String>,
        P: Into<PathBuf>,
    {
        let mut index = Self::default();
        for (name, path) in entries {
            index.insert(name.into(), path.into());
        }
        index
    }

    /// Scan every file under `root` matching `globs` (root-relative) and
    /// index its module declaration. `skip_dir` (the compiler output) is not
    /// descended into.
    pub async fn build(
        root: PathBuf,
        globs: Vec<String>,
        skip_dir: PathBuf,
    ) -> Result<Self, IndexError> {
        tokio::task::spawn_blocking(move || Self::build_blocking(&root, &globs, skip_dir)).await?
    }

    fn build_blocking(
        root: &Path,
        globs: &[String],
        skip_dir: PathBuf,
    ) -> Result<Self, IndexError> {
        let matcher = glob_set(globs)?;
        let walker = WalkBuilder::new(root)
            .standard_filters(false)
            .filter_entry(move |entry| entry.path() != skip_dir && entry.file_name() != ".git")
            .build();

        let mut matched = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!("skipping unreadable entry: {e}");
                    continue;
                }
            };
            if entry.file_type().is_some_and(|ft| ft.is_dir()) {
                continue;
            }
            let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
            if matcher.is_match(rel) {
                matched.push(entry.into_path());
            }
        }
        matched.sort();

        let mut index = Self::default();
        for path in matched {
            let source = std::fs::read_to_string(&path).map_err(|source| IndexError::Read {
                path: path.clone(),
                source,
            })?;
            match module_name(&source) {
                Some(name) => index.insert(name.to_string(), path),
                None => {
                    tracing::debug!(path = %path.display(), "no module declaration, skipping");
                }
            }
        }
        tracing::debug!(modules = index.len(), "built module index");
        Ok(index)
    }

    fn insert(&mut self, name: String, path: PathBuf) {
        match self.modules.entry(name) {
            Entry::Vacant(slot) => {
                slot.insert(path);
            }
            Entry::Occupied(existing) => {
                tracing::warn!(
                    module = %existing.key(),
                    kept = %existing.get().display(),
                    ignored = %path.display(),
                    "module declared by more than one file"
                );
            }
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Path> {
        self.modules.get(name).map(PathBuf::as_path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

fn glob_set(globs: &[String]) -> Result<GlobSet, IndexError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in globs {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|source| IndexError::Glob {
                pattern: pattern.clone(),
                source,
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| IndexError::Glob {
        pattern: globs.join(", "),
        source,
    })
}
