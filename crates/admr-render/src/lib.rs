//! Rendering pipeline for ADM content
//!
//! Turns streams of time-varying ADM metadata plus input samples into output
//! loudspeaker samples:
//!
//! - the point-source panner on a triangulated sphere, with the polar extent
//!   engine layered on top
//! - the allocentric (Cartesian) panner and cube extent engine
//! - the Objects gain calculator (screen scaling and edge lock, divergence,
//!   zone exclusion, channel lock, diffuse split)
//! - the DirectSpeakers panner with the BS.2051 mapping rules
//! - AllRAD HOA decoder design with near-field compensation
//! - the track processor resolving `TrackSpec` trees into sample streams
//! - the block processor applying interpolated gain matrices to samples

pub mod aligner;
pub mod allo_extent;
pub mod allocentric;
pub mod block;
pub mod conversion;
pub mod convex_hull;
pub mod direct_speakers;
pub mod extent;
pub mod gain_calc;
pub mod hoa;
pub mod monitor;
pub mod point_source;
pub mod renderer;
pub mod screen;
pub mod sphere;
pub mod track_processor;
pub mod zone;

mod error;

pub use error::{RenderError, RenderResult};
pub use renderer::Renderer;
