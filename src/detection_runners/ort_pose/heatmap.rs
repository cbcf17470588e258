//! Heatmap decoding for top-down pose models.
//!
//! Heatmaps are `[K, H, W]` per person. Decoded keypoints are `[K, 3]` rows of
//! `x, y, score` in source image pixels.

use ndarray::{s, Array1, Array2, Array3, ArrayView2, ArrayView3, Axis};
use crate::common::PostProcess;
use super::affine::CenterScale;

/// Per-joint argmax location `[K, 2]` and peak value `[K]`.
/// Joints whose peak is not positive get location `-1`.
pub fn get_max_preds(heatmaps: ArrayView3<f32>) -> (Array2<f32>, Array1<f32>) {
    let (k, _, w) = heatmaps.dim();
    let mut preds = Array2::<f32>::zeros((k, 2));
    let mut maxvals = Array1::<f32>::zeros(k);

    for (j, heatmap) in heatmaps.axis_iter(Axis(0)).enumerate() {
        // first maximum in row-major order
        let mut best = (0usize, f32::NEG_INFINITY);
        for (idx, &v) in heatmap.iter().enumerate() {
            if v > best.1 {
                best = (idx, v);
            }
        }
        let (idx, maxval) = best;
        maxvals[j] = maxval;
        if maxval > 0. {
            preds[[j, 0]] = (idx % w) as f32;
            preds[[j, 1]] = (idx / w) as f32;
        } else {
            preds[[j, 0]] = -1.;
            preds[[j, 1]] = -1.;
        }
    }

    (preds, maxvals)
}

/// Undoes a horizontal input flip: joint `j` takes channel `flip_index[j]`, then the width
/// axis is mirrored.
pub fn flip_back(heatmaps: ArrayView3<f32>, flip_index: &[usize]) -> Array3<f32> {
    let mirrored = heatmaps.slice(s![.., .., ..;-1]);
    mirrored.select(Axis(0), flip_index)
}

/// Moves every heatmap one pixel to the right, keeping column 0.
pub fn shift_right(heatmaps: &mut Array3<f32>) {
    let w = heatmaps.dim().2;
    for x in (1..w).rev() {
        let (mut dst, src) = heatmaps.multi_slice_mut((s![.., .., x], s![.., .., x - 1]));
        dst.assign(&src);
    }
}

/// Quarter-pixel step toward the higher neighbour on each axis.
fn refine_quarter(heatmap: ArrayView2<f32>, coord: &mut [f32; 2]) {
    let (h, w) = heatmap.dim();
    let (px, py) = (coord[0] as isize, coord[1] as isize);
    if 1 < px && px < w as isize - 1 && 1 < py && py < h as isize - 1 {
        let (px, py) = (px as usize, py as usize);
        let dx = heatmap[[py, px + 1]] - heatmap[[py, px - 1]];
        let dy = heatmap[[py + 1, px]] - heatmap[[py - 1, px]];
        coord[0] += sign(dx) * 0.25;
        coord[1] += sign(dy) * 0.25;
    }
}

fn sign(v: f32) -> f32 {
    if v > 0. {
        1.
    } else if v < 0. {
        -1.
    } else {
        0.
    }
}

/// Second-order Taylor refinement on a log heatmap.
fn taylor(heatmap: ArrayView2<f32>, coord: &mut [f32; 2]) {
    let (h, w) = heatmap.dim();
    let (px, py) = (coord[0] as isize, coord[1] as isize);
    if !(1 < px && px < w as isize - 2 && 1 < py && py < h as isize - 2) {
        return;
    }
    let (px, py) = (px as usize, py as usize);
    let at = |y: usize, x: usize| heatmap[[y, x]];

    let dx = 0.5 * (at(py, px + 1) - at(py, px - 1));
    let dy = 0.5 * (at(py + 1, px) - at(py - 1, px));
    let dxx = 0.25 * (at(py, px + 2) - 2. * at(py, px) + at(py, px - 2));
    let dxy = 0.25
        * (at(py + 1, px + 1) - at(py - 1, px + 1) - at(py + 1, px - 1) + at(py - 1, px - 1));
    let dyy = 0.25 * (at(py + 2, px) - 2. * at(py, px) + at(py - 2, px));

    let det = dxx * dyy - dxy * dxy;
    if det != 0. {
        // offset = -H^-1 * grad
        coord[0] -= (dyy * dx - dxy * dy) / det;
        coord[1] -= (-dxy * dx + dxx * dy) / det;
    }
}

fn gaussian_kernel(size: usize) -> Vec<f32> {
    let sigma = 0.3 * ((size as f32 - 1.) * 0.5 - 1.) + 0.8;
    let half = (size as f32 - 1.) * 0.5;
    let weights: Vec<f32> = (0..size)
        .map(|i| {
            let x = i as f32 - half;
            (-(x * x) / (2. * sigma * sigma)).exp()
        })
        .collect();
    let total: f32 = weights.iter().sum::<f32>();
    weights.into_iter().map(|w| w / total).collect()
}

fn reflect101(i: isize, n: usize) -> usize {
    let n = n as isize;
    if n == 1 {
        return 0;
    }
    let mut i = i;
    loop {
        if i < 0 {
            i = -i;
        } else if i >= n {
            i = 2 * (n - 1) - i;
        } else {
            return i as usize;
        }
    }
}

/// Blurs each heatmap with a `kernel x kernel` Gaussian on a zero-padded canvas and rescales
/// it so its peak is unchanged.
pub fn gaussian_blur(heatmaps: &mut Array3<f32>, kernel: usize) {
    let weights = gaussian_kernel(kernel);
    let border = (kernel - 1) / 2;
    let (_, h, w) = heatmaps.dim();
    let (ph, pw) = (h + 2 * border, w + 2 * border);

    for mut heatmap in heatmaps.axis_iter_mut(Axis(0)) {
        let origin_max = heatmap.fold(f32::NEG_INFINITY, |m, &v| m.max(v));

        let mut padded = Array2::<f32>::zeros((ph, pw));
        padded.slice_mut(s![border..border + h, border..border + w]).assign(&heatmap);

        let mut rows = Array2::<f32>::zeros((ph, pw));
        for y in 0..ph {
            for x in 0..pw {
                rows[[y, x]] = weights
                    .iter()
                    .enumerate()
                    .map(|(i, wt)| wt * padded[[y, reflect101(x as isize + i as isize - border as isize, pw)]])
                    .sum::<f32>();
            }
        }
        for y in 0..h {
            for x in 0..w {
                let (yy, xx) = (y + border, x + border);
                heatmap[[y, x]] = weights
                    .iter()
                    .enumerate()
                    .map(|(i, wt)| wt * rows[[reflect101(yy as isize + i as isize - border as isize, ph), xx]])
                    .sum::<f32>();
            }
        }

        let new_max = heatmap.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        if new_max > 0. {
            heatmap.mapv_inplace(|v| v * origin_max / new_max);
        }
    }
}

/// Maps heatmap coordinates of a `hm_w x hm_h` map back into source image pixels.
pub fn transform_preds(coords: &mut Array2<f32>, cs: &CenterScale, hm_w: usize, hm_h: usize) {
    let size = cs.size();
    let (scale_x, scale_y) = (size[0] / hm_w as f32, size[1] / hm_h as f32);
    for mut row in coords.axis_iter_mut(Axis(0)) {
        row[0] = row[0] * scale_x + cs.center[0] - size[0] * 0.5;
        row[1] = row[1] * scale_y + cs.center[1] - size[1] * 0.5;
    }
}

/// Decodes one person's heatmaps into `[K, 3]` keypoints.
pub fn decode(heatmaps: ArrayView3<f32>, cs: &CenterScale, post_process: PostProcess, kernel: usize) -> Array2<f32> {
    let (k, h, w) = heatmaps.dim();
    let (mut preds, maxvals) = get_max_preds(heatmaps);

    match post_process {
        PostProcess::None => {}
        PostProcess::Default => {
            for (j, heatmap) in heatmaps.axis_iter(Axis(0)).enumerate() {
                let mut coord = [preds[[j, 0]], preds[[j, 1]]];
                refine_quarter(heatmap, &mut coord);
                preds[[j, 0]] = coord[0];
                preds[[j, 1]] = coord[1];
            }
        }
        PostProcess::Unbiased => {
            let mut blurred = heatmaps.to_owned();
            gaussian_blur(&mut blurred, kernel);
            blurred.mapv_inplace(|v| v.max(1e-10).ln());
            for (j, heatmap) in blurred.axis_iter(Axis(0)).enumerate() {
                let mut coord = [preds[[j, 0]], preds[[j, 1]]];
                taylor(heatmap, &mut coord);
                preds[[j, 0]] = coord[0];
                preds[[j, 1]] = coord[1];
            }
        }
    }

    transform_preds(&mut preds, cs, w, h);

    let mut keypoints = Array2::<f32>::zeros((k, 3));
    keypoints.slice_mut(s![.., 0..2]).assign(&preds);
    keypoints.column_mut(2).assign(&maxvals);
    keypoints
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn peak(k: usize, h: usize, w: usize, at: &[(usize, usize, f32)]) -> Array3<f32> {
        let mut hm = Array3::<f32>::zeros((k, h, w));
        for (j, &(y, x, v)) in at.iter().enumerate() {
            hm[[j, y, x]] = v;
        }
        hm
    }

    #[test]
    fn argmax_and_non_positive_peaks() {
        let mut hm = peak(2, 4, 5, &[(2, 3, 0.9)]);
        hm[[1, 0, 0]] = -0.5;
        let (preds, maxvals) = get_max_preds(hm.view());
        assert_eq!(preds.row(0).to_vec(), vec![3., 2.]);
        assert_eq!(maxvals[0], 0.9);
        assert_eq!(preds.row(1).to_vec(), vec![-1., -1.]);
    }

    #[test]
    fn quarter_offset_moves_toward_higher_neighbour() {
        let mut hm = peak(1, 8, 8, &[(4, 4, 1.0)]);
        hm[[0, 4, 5]] = 0.5;
        hm[[0, 3, 4]] = 0.3;
        let cs = CenterScale { center: [4., 4.], scale: [8. / 200., 8. / 200.] };
        let kpts = decode(hm.view(), &cs, PostProcess::Default, 11);
        // crop covers the heatmap one to one, so the mapping is the identity
        assert!((kpts[[0, 0]] - 4.25).abs() < 1e-6);
        assert!((kpts[[0, 1]] - 3.75).abs() < 1e-6);
        assert_eq!(kpts[[0, 2]], 1.0);
    }

    #[test]
    fn flip_back_swaps_pairs_and_mirrors() {
        let hm = peak(3, 2, 4, &[(0, 0, 1.), (1, 1, 2.), (0, 3, 3.)]);
        let back = flip_back(hm.view(), &[0, 2, 1]);
        // joint 0 mirrored in place
        assert_eq!(back[[0, 0, 3]], 1.);
        // joint 1 now holds joint 2 mirrored, and vice versa
        assert_eq!(back[[1, 0, 0]], 3.);
        assert_eq!(back[[2, 1, 2]], 2.);
    }

    #[test]
    fn shift_right_duplicates_first_column() {
        let mut hm = Array3::from_shape_vec((1, 1, 4), vec![1., 2., 3., 4.]).unwrap();
        shift_right(&mut hm);
        assert_eq!(hm.iter().copied().collect::<Vec<_>>(), vec![1., 1., 2., 3.]);
    }

    #[test]
    fn unbiased_recovers_subpixel_peak() {
        // Gaussian centered between columns 10 and 11
        let (h, w) = (24usize, 24usize);
        let mut hm = Array3::<f32>::zeros((1, h, w));
        for y in 0..h {
            for x in 0..w {
                let (dx, dy) = (x as f32 - 10.4, y as f32 - 12.);
                hm[[0, y, x]] = (-(dx * dx + dy * dy) / (2. * 2. * 2.)).exp();
            }
        }
        let cs = CenterScale { center: [12., 12.], scale: [24. / 200., 24. / 200.] };
        let kpts = decode(hm.view(), &cs, PostProcess::Unbiased, 11);
        assert!((kpts[[0, 0]] - 10.4).abs() < 0.1, "x = {}", kpts[[0, 0]]);
        assert!((kpts[[0, 1]] - 12.).abs() < 0.1, "y = {}", kpts[[0, 1]]);
    }

    #[test]
    fn blur_preserves_peak_value() {
        let mut hm = peak(1, 9, 9, &[(4, 4, 0.8)]);
        gaussian_blur(&mut hm, 3);
        let max = hm.fold(0f32, |m, &v| m.max(v));
        assert!((max - 0.8).abs() < 1e-6);
        assert!(hm[[0, 4, 5]] > 0.);
    }

    #[test]
    fn kernel_is_normalised_and_symmetric() {
        let k = gaussian_kernel(11);
        assert!((k.iter().sum::<f32>() - 1.).abs() < 1e-5);
        assert!((k[0] - k[10]).abs() < 1e-7);
        assert_eq!(reflect101(-1, 5), 1);
        assert_eq!(reflect101(5, 5), 3);
    }
}
