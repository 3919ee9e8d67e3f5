//! Core types for the ADM renderer
//!
//! This crate holds everything the rendering pipeline shares but that is not
//! itself part of the ADM document model or the panning engine:
//!
//! - geometry in the ADM coordinate convention (anticlockwise azimuth,
//!   elevation up from the equator, +Y forward)
//! - polar/Cartesian positions and screen descriptions
//! - loudspeaker layouts, including the BS.2051 tables and real-world
//!   speaker mapping
//! - exact rational times for block format timing
//! - deduplicated warning collection

pub mod bs2051;
pub mod geom;
pub mod layout;
pub mod position;
pub mod time;
pub mod warnings;

mod error;

pub use error::{CoreError, CoreResult};
pub use geom::Vec3;
pub use position::{
    CartesianPosition, CartesianScreen, PolarPosition, PolarScreen, Position, Screen,
};
pub use time::Time;
pub use warnings::Warnings;
