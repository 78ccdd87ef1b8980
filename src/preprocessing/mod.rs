//! Image preprocessing module for OCR enhancement
//!
//! Turns a raw raster page into a binarized, deskewed, upscaled image.

pub mod pipeline;
pub mod steps;

pub use pipeline::{Pipeline, PreprocessingResult, Preset, StepTiming};
