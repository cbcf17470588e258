pub mod affine;
pub mod heatmap;
mod topdown;

pub use topdown::*;
