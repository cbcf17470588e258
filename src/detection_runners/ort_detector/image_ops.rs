//! File adapted from: https://github.com/jamjamjon
//!
//! Functions to preprocess images.

use anyhow::{anyhow, bail, Result};
use fast_image_resize::{
    images::{CroppedImageMut, Image as FirImage},
    pixels::PixelType,
    FilterType, ResizeAlg, ResizeOptions, Resizer,
};
use image::RgbImage;
use crate::data::X;

/// Letterbox padding value, as the YOLO exporters train with.
pub const LETTERBOX_FILL: u8 = 114;

/// Scales `image` into a `target_w x target_h` canvas keeping its aspect ratio, anchored at
/// the top-left corner, and returns the `[1, 3, H, W]` tensor in `[0, 1]` with the scale factor.
pub fn letterbox(image: &RgbImage, target_h: u32, target_w: u32) -> Result<(X, f32)> {
    let src = to_fir_image(image)?;
    let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));
    let mut resizer = Resizer::new();
    let (padded, ratio) = letterbox_image(&src, target_h, target_w, LETTERBOX_FILL, &mut resizer, &options)?;
    let x = nchw_normalize(padded.buffer(), target_w, target_h, [0.; 3], [1.; 3])?;
    Ok((x, ratio))
}

pub fn to_fir_image(image: &RgbImage) -> Result<FirImage<'static>> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        bail!("Cannot preprocess an empty image ({width}x{height})");
    }
    FirImage::from_vec_u8(width, height, image.as_raw().clone(), PixelType::U8x3)
        .map_err(|err| anyhow!("Failed to convert to FirImage: {err}"))
}

fn letterbox_image(
    img: &FirImage,
    target_h: u32,
    target_w: u32,
    bg: u8,
    resizer: &mut Resizer,
    resize_options: &ResizeOptions,
) -> Result<(FirImage<'static>, f32)> {
    let (w0, h0) = (img.width(), img.height());
    let scale = (target_w as f32 / w0 as f32).min(target_h as f32 / h0 as f32);
    let new_w = ((w0 as f32 * scale).round() as u32).clamp(1, target_w);
    let new_h = ((h0 as f32 * scale).round() as u32).clamp(1, target_h);

    let mut padded = FirImage::from_vec_u8(
        target_w,
        target_h,
        vec![bg; (target_w * target_h * 3) as usize],
        PixelType::U8x3,
    )?;

    {
        let mut cropped = CroppedImageMut::new(&mut padded, 0, 0, new_w, new_h)?;
        resizer.resize(img, &mut cropped, resize_options)?;
    }

    Ok((padded, scale))
}

/// Packs an interleaved RGB buffer into a `[1, 3, H, W]` tensor of `(p / 255 - mean) / std`.
pub fn nchw_normalize(buf: &[u8], width: u32, height: u32, mean: [f32; 3], std: [f32; 3]) -> Result<X> {
    let w = width as usize;
    let h = height as usize;

    if buf.len() != w * h * 3 {
        bail!("Unexpected buffer size: got {}, expected {}", buf.len(), w * h * 3);
    }
    if std.iter().any(|s| *s == 0.) {
        bail!("Normalisation std must be non-zero, got {:?}", std);
    }

    let hw = w * h;
    let mut out = vec![0.0f32; buf.len()];
    for (i, px) in buf.chunks_exact(3).enumerate() {
        for c in 0..3 {
            out[i + c * hw] = (px[c] as f32 / 255.0 - mean[c]) / std[c];
        }
    }

    X::from_shape_vec(&[1, 3, h, w], out)
}
