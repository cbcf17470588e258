//! Image discovery for a batch run.

use std::path::{Path, PathBuf};
use anyhow::{Context, Result};

/// Joins a glob `pattern` onto `img_root`, matching the root literally. An empty root leaves
/// the pattern relative to the working directory.
pub fn pattern_for(img_root: &Path, pattern: &str) -> String {
    if img_root.as_os_str().is_empty() {
        pattern.to_string()
    } else {
        let root = glob::Pattern::escape(&img_root.to_string_lossy());
        Path::new(&root).join(pattern).to_string_lossy().into_owned()
    }
}

/// Finite, single-pass sequence of image paths in enumeration order.
#[derive(Debug)]
pub struct ImageBatch {
    paths: std::vec::IntoIter<PathBuf>,
}

impl ImageBatch {
    /// Expands `pattern` eagerly so the batch size is known up front. No match is an empty batch;
    /// an unreadable entry met while expanding fails the whole call.
    pub fn from_pattern(pattern: &str) -> Result<Self> {
        let paths = glob::glob(pattern)
            .with_context(|| format!("Invalid image pattern `{pattern}`"))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to enumerate images for `{pattern}`"))?;
        log::debug!("{} image(s) match `{}`", paths.len(), pattern);
        Ok(Self { paths: paths.into_iter() })
    }

    pub fn single<P: AsRef<Path>>(path: P) -> Self {
        Self { paths: vec![path.as_ref().to_path_buf()].into_iter() }
    }
}

impl Iterator for ImageBatch {
    type Item = PathBuf;

    fn next(&mut self) -> Option<Self::Item> {
        self.paths.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.paths.size_hint()
    }
}

impl ExactSizeIterator for ImageBatch {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_root_keeps_pattern() {
        assert_eq!(pattern_for(Path::new(""), "*/*.jpg"), "*/*.jpg");
        assert_eq!(pattern_for(Path::new("data"), "*/*.jpg"), format!("data{}*/*.jpg", std::path::MAIN_SEPARATOR));
    }

    #[test]
    fn no_match_is_empty_batch() {
        let dir = tempfile::tempdir().unwrap();
        let batch = ImageBatch::from_pattern(&pattern_for(dir.path(), "*/*.jpg")).unwrap();
        assert_eq!(batch.len(), 0);
    }

    #[test]
    fn matches_nested_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("a/b/x.jpg"), b"").unwrap();
        std::fs::write(dir.path().join("a/b/y.png"), b"").unwrap();
        std::fs::write(dir.path().join("top.jpg"), b"").unwrap();

        let found: Vec<_> = ImageBatch::from_pattern(&pattern_for(dir.path(), "*/*/*.jpg")).unwrap().collect();
        assert_eq!(found, vec![dir.path().join("a/b/x.jpg")]);
    }

    #[test]
    fn root_with_glob_characters_is_literal() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("data[2024]");
        std::fs::create_dir_all(root.join("a/b")).unwrap();
        std::fs::write(root.join("a/b/x.jpg"), b"").unwrap();
        // would match as a character class without escaping
        std::fs::create_dir_all(dir.path().join("data2/a/b")).unwrap();
        std::fs::write(dir.path().join("data2/a/b/y.jpg"), b"").unwrap();

        let found: Vec<_> = ImageBatch::from_pattern(&pattern_for(&root, "*/*/*.jpg")).unwrap().collect();
        assert_eq!(found, vec![root.join("a/b/x.jpg")]);
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        assert!(ImageBatch::from_pattern("[").is_err());
    }
}
