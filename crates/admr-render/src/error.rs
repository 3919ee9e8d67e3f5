//! Error types for the render layer

use thiserror::Error;

/// Errors raised while configuring or running the rendering pipeline.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Problem configuring a panner for a layout
    #[error("invalid layout: {0}")]
    InvalidLayout(String),

    /// All non-LFE loudspeakers removed by zone exclusion
    #[error("zone exclusion excludes all loudspeakers")]
    AllSpeakersExcluded,

    /// Screen scaling undefined for this position
    #[error("screen scaling is undefined for position {0:?}")]
    UndefinedScreenScale([f64; 3]),

    /// Invalid screen geometry
    #[error("invalid screen specification: {0}")]
    InvalidScreen(String),

    /// A position the point source panner cannot handle
    #[error("no panner region found for position {0:?}")]
    PositionNotHandled([f64; 3]),

    /// Inconsistent metadata timing at render time
    #[error("metadata timing error: {0}")]
    Timing(String),

    /// Unsupported HOA parameters
    #[error("HOA error: {0}")]
    Hoa(String),

    /// Output samples exceeded full scale and --fail-on-overload is set
    #[error("overload in channel {channel}; peak level was {peak_dbfs:.1}dBFS")]
    Overload { channel: usize, peak_dbfs: f64 },

    /// Error with item context attached
    #[error("{context}: {source}")]
    InItem {
        context: String,
        #[source]
        source: Box<RenderError>,
    },
}

impl RenderError {
    /// Attach the ADM path of the item being rendered.
    pub fn in_item(self, context: &str) -> RenderError {
        RenderError::InItem {
            context: context.to_owned(),
            source: Box::new(self),
        }
    }
}

/// Result type for render operations.
pub type RenderResult<T> = Result<T, RenderError>;
