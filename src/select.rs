//! File selection: walk configured roots and yield candidate documents.
//!
//! Each root is either a regular file (taken as-is) or a directory
//! (walked recursively). A candidate is skipped when any of its path
//! components is listed in `exclude_dirs`, when it is not a regular file,
//! when it is larger than `max_size_bytes`, when its name starts with a
//! dot and the source skips hidden files, or when include globs are
//! configured and none matches the path relative to its root.
//!
//! Selection is lazy and side-effect free. Entries that vanish or become
//! unreadable while walking are logged and skipped; they never abort the
//! walk.

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::fmt;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::config::SourceConfig;

const HIDDEN_MARKER: char = '.';

/// Why a path was not selected. Expected and silent: logged at debug level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionSkip {
    Excluded(String),
    NotAFile,
    Hidden,
    NotIncluded,
    TooLarge(u64),
    Unreadable(String),
}

impl fmt::Display for SelectionSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionSkip::Excluded(component) => write!(f, "excluded component '{}'", component),
            SelectionSkip::NotAFile => f.write_str("not a regular file"),
            SelectionSkip::Hidden => f.write_str("hidden file"),
            SelectionSkip::NotIncluded => f.write_str("no include glob matches"),
            SelectionSkip::TooLarge(size) => write!(f, "too large ({} bytes)", size),
            SelectionSkip::Unreadable(reason) => write!(f, "unreadable: {}", reason),
        }
    }
}

/// Walks the roots of one source category and applies its filters.
pub struct FileSelector {
    roots: Vec<PathBuf>,
    include: Option<GlobSet>,
    exclude_dirs: HashSet<String>,
    max_size_bytes: u64,
    skip_hidden: bool,
    follow_symlinks: bool,
}

impl FileSelector {
    pub fn new(source: &SourceConfig) -> Result<Self> {
        let include = if source.include_globs.is_empty() {
            None
        } else {
            Some(build_globset(&source.include_globs).with_context(|| {
                format!("invalid include_globs for source '{}'", source.category)
            })?)
        };

        Ok(Self {
            roots: source.roots.clone(),
            include,
            exclude_dirs: source.exclude_dirs.iter().cloned().collect(),
            max_size_bytes: source.max_size_bytes,
            skip_hidden: source.skip_hidden,
            follow_symlinks: source.follow_symlinks,
        })
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Lazily yield every selected path, root by root.
    pub fn select(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.roots.iter().flat_map(move |root| self.walk_root(root))
    }

    fn walk_root<'a>(&'a self, root: &'a Path) -> Box<dyn Iterator<Item = PathBuf> + 'a> {
        let metadata = match std::fs::metadata(root) {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::debug!(root = %root.display(), error = %e, "skipping missing root");
                return Box::new(std::iter::empty());
            }
        };

        if !metadata.is_dir() {
            // Explicitly listed files are exempt from the hidden-file rule.
            return match self.check(root, root, &metadata, false) {
                Ok(()) => Box::new(std::iter::once(root.to_path_buf())),
                Err(skip) => {
                    tracing::debug!(path = %root.display(), %skip, "skipping");
                    Box::new(std::iter::empty())
                }
            };
        }

        let walker = WalkDir::new(root)
            .follow_links(self.follow_symlinks)
            .into_iter()
            .filter_entry(move |entry| entry.depth() == 0 || !self.is_excluded_dir(entry))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(error = %e, "walk error");
                    None
                }
            })
            .filter(|entry| !entry.file_type().is_dir())
            .filter_map(move |entry| match self.check_entry(root, &entry) {
                Ok(()) => Some(entry.into_path()),
                Err(skip) => {
                    tracing::debug!(path = %entry.path().display(), %skip, "skipping");
                    None
                }
            });

        Box::new(walker)
    }

    fn is_excluded_dir(&self, entry: &DirEntry) -> bool {
        entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| self.exclude_dirs.contains(name))
    }

    fn check_entry(&self, root: &Path, entry: &DirEntry) -> Result<(), SelectionSkip> {
        let metadata = entry
            .metadata()
            .map_err(|e| SelectionSkip::Unreadable(e.to_string()))?;
        self.check(root, entry.path(), &metadata, true)
    }

    /// Apply every filter to one path. `enumerated` is false for paths
    /// that were listed directly as roots.
    pub fn check(
        &self,
        root: &Path,
        path: &Path,
        metadata: &Metadata,
        enumerated: bool,
    ) -> Result<(), SelectionSkip> {
        if let Some(component) = self.excluded_component(path) {
            return Err(SelectionSkip::Excluded(component));
        }

        if !metadata.is_file() {
            return Err(SelectionSkip::NotAFile);
        }

        if enumerated && self.skip_hidden && is_hidden(path) {
            return Err(SelectionSkip::Hidden);
        }

        if enumerated {
            if let Some(include) = &self.include {
                let relative = path.strip_prefix(root).unwrap_or(path);
                if !include.is_match(relative) {
                    return Err(SelectionSkip::NotIncluded);
                }
            }
        }

        if metadata.len() > self.max_size_bytes {
            return Err(SelectionSkip::TooLarge(metadata.len()));
        }

        Ok(())
    }

    /// The first path component that exactly equals an excluded name.
    pub fn excluded_component(&self, path: &Path) -> Option<String> {
        path.components()
            .filter_map(|c| c.as_os_str().to_str())
            .find(|c| self.exclude_dirs.contains(*c))
            .map(str::to_string)
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(HIDDEN_MARKER))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(GlobBuilder::new(pattern).literal_separator(true).build()?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;
    use std::fs;
    use tempfile::TempDir;

    fn source(roots: Vec<PathBuf>) -> SourceConfig {
        SourceConfig {
            category: Category::Home,
            roots,
            include_globs: Vec::new(),
            exclude_dirs: vec![".cache".to_string(), "Code".to_string()],
            max_size_bytes: 64,
            skip_hidden: true,
            follow_symlinks: false,
        }
    }

    fn selected(selector: &FileSelector) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = selector.select().collect();
        paths.sort();
        paths
    }

    #[test]
    fn walks_directories_and_applies_filters() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("config");
        fs::create_dir_all(root.join(".cache/app")).unwrap();
        fs::create_dir_all(root.join("Codecs")).unwrap();
        fs::create_dir_all(root.join("nvim")).unwrap();
        fs::write(root.join(".cache/app/state"), "cached").unwrap();
        fs::write(root.join("Codecs/list"), "codecs").unwrap();
        fs::write(root.join("nvim/init.lua"), "set number").unwrap();
        fs::write(root.join(".hidden"), "secret").unwrap();
        fs::write(root.join("big.txt"), "x".repeat(65)).unwrap();

        let selector = FileSelector::new(&source(vec![root.clone()])).unwrap();
        assert_eq!(
            selected(&selector),
            vec![root.join("Codecs/list"), root.join("nvim/init.lua")]
        );
    }

    #[test]
    fn excluded_directory_is_never_yielded() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().to_path_buf();
        fs::create_dir_all(root.join("a/.cache/deep")).unwrap();
        fs::write(root.join("a/.cache/deep/blob"), "cached").unwrap();

        let selector = FileSelector::new(&source(vec![root.clone()])).unwrap();
        assert!(selector.select().all(|p| !p.starts_with(root.join("a/.cache"))));
        assert_eq!(
            selector.excluded_component(&root.join("a/.cache/deep/blob")),
            Some(".cache".to_string())
        );
    }

    #[test]
    fn exclusion_is_exact_component_match() {
        let selector = FileSelector::new(&source(vec![])).unwrap();
        assert_eq!(
            selector.excluded_component(Path::new("/home/u/Code/settings.json")),
            Some("Code".to_string())
        );
        assert_eq!(
            selector.excluded_component(Path::new("/home/u/Codecs/settings.json")),
            None
        );
        assert_eq!(
            selector.excluded_component(Path::new("/home/u/my.cache/x")),
            None
        );
    }

    #[test]
    fn file_roots_are_taken_directly_even_when_hidden() {
        let tmp = TempDir::new().unwrap();
        let bashrc = tmp.path().join(".bashrc");
        fs::write(&bashrc, "alias ll='ls -l'").unwrap();

        let selector = FileSelector::new(&source(vec![bashrc.clone()])).unwrap();
        assert_eq!(selected(&selector), vec![bashrc]);
    }

    #[test]
    fn oversized_file_root_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let big = tmp.path().join("big.conf");
        fs::write(&big, "y".repeat(100)).unwrap();

        let selector = FileSelector::new(&source(vec![big])).unwrap();
        assert!(selected(&selector).is_empty());
    }

    #[test]
    fn missing_roots_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let present = tmp.path().join("present");
        fs::write(&present, "here").unwrap();

        let selector =
            FileSelector::new(&source(vec![tmp.path().join("absent"), present.clone()])).unwrap();
        assert_eq!(selected(&selector), vec![present]);
    }

    #[test]
    fn include_globs_match_relative_paths() {
        let tmp = TempDir::new().unwrap();
        let man = tmp.path().join("man");
        for dir in ["man1", "man3", "man5/extra"] {
            fs::create_dir_all(man.join(dir)).unwrap();
        }
        fs::write(man.join("man1/ls.1.gz"), "a").unwrap();
        fs::write(man.join("man1/ls.1"), "b").unwrap();
        fs::write(man.join("man3/printf.3.gz"), "c").unwrap();
        fs::write(man.join("man5/extra/nested.5.gz"), "d").unwrap();

        let mut config = source(vec![man.clone()]);
        config.include_globs = vec!["man1/*.gz".to_string(), "man5/*.gz".to_string()];
        config.skip_hidden = false;
        let selector = FileSelector::new(&config).unwrap();
        assert_eq!(selected(&selector), vec![man.join("man1/ls.1.gz")]);
    }

    #[test]
    fn selection_is_repeatable() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("one"), "1").unwrap();
        fs::write(tmp.path().join("two"), "2").unwrap();
        let selector = FileSelector::new(&source(vec![tmp.path().to_path_buf()])).unwrap();
        assert_eq!(selected(&selector), selected(&selector));
    }

    #[test]
    fn invalid_glob_is_rejected() {
        let mut config = source(vec![]);
        config.include_globs = vec!["man[1".to_string()];
        assert!(FileSelector::new(&config).is_err());
    }
}
