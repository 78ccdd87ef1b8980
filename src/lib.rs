//! Text extraction from scanned documents, with optional speech output

pub mod config;
pub mod engine;
pub mod engines;
pub mod error;
pub mod extractor;
pub mod html;
pub mod input;
pub mod preprocessing;
pub mod rasterizer;
pub mod server;
pub mod speech;
