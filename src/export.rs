//! Keypoint artifacts on disk.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Component, Path, PathBuf};
use anyhow::{Context, Result};
use ndarray::Array2;
use ndarray_npy::WriteNpyExt;

/// Mirrors `image` under `out_root`: the part of the path below `img_root` is kept and the
/// extension becomes `npy`. Paths outside `img_root` keep their own relative components.
pub fn output_path(image: &Path, img_root: &Path, out_root: &Path) -> PathBuf {
    let relative = image.strip_prefix(img_root).unwrap_or(image);
    let mut out = out_root.to_path_buf();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            out.push(part);
        }
    }
    out.with_extension("npy")
}

/// Writes `keypoints` as a NumPy `.npy` file, creating parent directories. The array lands
/// in a sibling temporary file first and is renamed over `path`.
pub fn save_keypoints(path: &Path, keypoints: &Array2<f32>) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory `{}`", dir.display()))?;
    }

    let tmp = path.with_extension("npy.tmp");
    let written = File::create(&tmp)
        .with_context(|| format!("Failed to create `{}`", tmp.display()))
        .and_then(|file| {
            keypoints
                .write_npy(BufWriter::new(file))
                .with_context(|| format!("Failed to write `{}`", tmp.display()))
        })
        .and_then(|_| {
            fs::rename(&tmp, path)
                .with_context(|| format!("Failed to move `{}` into place", path.display()))
        });

    if written.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    written
}
