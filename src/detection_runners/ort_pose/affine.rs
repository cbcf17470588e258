//! Box to crop geometry for top-down pose models.

use image::{Rgb, RgbImage};
use crate::common::PoseBox;

/// Pixel size of one unit of `scale`.
pub const PIXEL_STD: f32 = 200.;

/// Crop center and size of a person box, with size in units of [`PIXEL_STD`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CenterScale {
    pub center: [f32; 2],
    pub scale: [f32; 2],
}

impl CenterScale {
    /// Centers a crop on `bbox`, grows the short side to `aspect_ratio` (width over height)
    /// and pads both sides by `padding`.
    pub fn from_box(bbox: &PoseBox, aspect_ratio: f32, padding: f32) -> Self {
        let (x, y, mut w, mut h) = bbox.xywh_inclusive();
        let center = [x + w * 0.5, y + h * 0.5];

        if w > aspect_ratio * h {
            h = w / aspect_ratio;
        } else if w < aspect_ratio * h {
            w = h * aspect_ratio;
        }

        Self {
            center,
            scale: [w / PIXEL_STD * padding, h / PIXEL_STD * padding],
        }
    }

    /// Crop size in source pixels.
    pub fn size(&self) -> [f32; 2] {
        [self.scale[0] * PIXEL_STD, self.scale[1] * PIXEL_STD]
    }

    /// Maps an output pixel of an `out_w x out_h` crop back into the source image.
    pub fn to_source(&self, u: f32, v: f32, out_w: u32, out_h: u32) -> (f32, f32) {
        let s = out_w as f32 / self.size()[0];
        (
            (u - out_w as f32 * 0.5) / s + self.center[0],
            (v - out_h as f32 * 0.5) / s + self.center[1],
        )
    }
}

/// Resamples the region described by `cs` into an `out_w x out_h` image, bilinear, zero outside.
pub fn warp_crop(image: &RgbImage, cs: &CenterScale, out_w: u32, out_h: u32) -> RgbImage {
    let mut crop = RgbImage::new(out_w, out_h);
    for (u, v, px) in crop.enumerate_pixels_mut() {
        let (x, y) = cs.to_source(u as f32, v as f32, out_w, out_h);
        *px = sample_bilinear(image, x, y);
    }
    crop
}

fn sample_bilinear(image: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (w, h) = (image.width() as i64, image.height() as i64);
    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);
    let (x0, y0) = (x0 as i64, y0 as i64);

    let mut acc = [0f32; 3];
    for (dy, wy) in [(0, 1. - fy), (1, fy)] {
        for (dx, wx) in [(0, 1. - fx), (1, fx)] {
            let (px, py) = (x0 + dx, y0 + dy);
            if px < 0 || py < 0 || px >= w || py >= h {
                continue;
            }
            let p = image.get_pixel(px as u32, py as u32);
            for c in 0..3 {
                acc[c] += wx * wy * p[c] as f32;
            }
        }
    }
    Rgb(acc.map(|v| v.round().clamp(0., 255.) as u8))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tall_box_is_widened_to_aspect_ratio() {
        // 100x200 inclusive box, model aspect 192/256
        let b = PoseBox::new(0., 0., 99., 199., 1.);
        let cs = CenterScale::from_box(&b, 0.75, 1.25);
        assert_eq!(cs.center, [50., 100.]);
        assert!((cs.scale[0] - 150. / 200. * 1.25).abs() < 1e-6);
        assert!((cs.scale[1] - 200. / 200. * 1.25).abs() < 1e-6);
    }

    #[test]
    fn crop_center_maps_to_box_center() {
        let cs = CenterScale { center: [40., 30.], scale: [0.5, 0.5] };
        let (x, y) = cs.to_source(50., 50., 100, 100);
        assert_eq!((x, y), (40., 30.));
        // 100 source pixels over 100 output pixels
        let (x, _) = cs.to_source(0., 50., 100, 100);
        assert_eq!(x, -10.);
    }

    #[test]
    fn identity_crop_copies_pixels_and_zero_pads() {
        let mut img = RgbImage::new(4, 4);
        img.put_pixel(1, 2, Rgb([10, 20, 30]));
        // 4x4 crop centered at (2, 2) with unit pixel scale is the identity
        let cs = CenterScale { center: [2., 2.], scale: [4. / PIXEL_STD, 4. / PIXEL_STD] };
        let crop = warp_crop(&img, &cs, 4, 4);
        assert_eq!(crop.get_pixel(1, 2), &Rgb([10, 20, 30]));

        let shifted = CenterScale { center: [4., 4.], ..cs };
        let crop = warp_crop(&img, &shifted, 4, 4);
        assert_eq!(crop.get_pixel(3, 3), &Rgb([0, 0, 0]));
    }
}
