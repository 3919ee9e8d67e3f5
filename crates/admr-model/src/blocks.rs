//! audioBlockFormat variants
//!
//! One tagged union per ADM type path. The variants are closed sets;
//! consumers pattern-match and exhaustiveness is part of correctness.

use admr_core::Time;

use crate::elements::ChannelFormatRef;

/// HOA normalization conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalization {
    SN3D,
    N3D,
    FuMa,
}

impl Normalization {
    pub fn name(self) -> &'static str {
        match self {
            Normalization::SN3D => "SN3D",
            Normalization::N3D => "N3D",
            Normalization::FuMa => "FuMa",
        }
    }
}

/// screenEdgeLock information from position elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScreenEdgeLock {
    pub horizontal: Option<HorizontalEdge>,
    pub vertical: Option<VerticalEdge>,
}

impl ScreenEdgeLock {
    pub fn is_set(&self) -> bool {
        self.horizontal.is_some() || self.vertical.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HorizontalEdge {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalEdge {
    Top,
    Bottom,
}

/// Objects position in polar coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectPolarPosition {
    pub azimuth: f64,
    pub elevation: f64,
    pub distance: f64,
    pub screen_edge_lock: ScreenEdgeLock,
}

/// Objects position in Cartesian coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectCartesianPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub screen_edge_lock: ScreenEdgeLock,
}

/// Position of an Objects block in either convention.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObjectPosition {
    Polar(ObjectPolarPosition),
    Cartesian(ObjectCartesianPosition),
}

impl ObjectPosition {
    pub fn polar(azimuth: f64, elevation: f64, distance: f64) -> Self {
        ObjectPosition::Polar(ObjectPolarPosition {
            azimuth,
            elevation,
            distance,
            screen_edge_lock: ScreenEdgeLock::default(),
        })
    }

    pub fn cartesian(x: f64, y: f64, z: f64) -> Self {
        ObjectPosition::Cartesian(ObjectCartesianPosition {
            x,
            y,
            z,
            screen_edge_lock: ScreenEdgeLock::default(),
        })
    }

    pub fn screen_edge_lock(&self) -> ScreenEdgeLock {
        match self {
            ObjectPosition::Polar(p) => p.screen_edge_lock,
            ObjectPosition::Cartesian(c) => c.screen_edge_lock,
        }
    }

    pub fn is_cartesian(&self) -> bool {
        matches!(self, ObjectPosition::Cartesian(_))
    }
}

/// channelLock element.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChannelLock {
    pub max_distance: Option<f64>,
}

/// objectDivergence element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectDivergence {
    pub value: f64,
    pub azimuth_range: Option<f64>,
    pub position_range: Option<f64>,
}

/// jumpPosition element.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JumpPosition {
    pub flag: bool,
    pub interpolation_length: Option<Time>,
}

/// Cartesian exclusion zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CartesianZone {
    pub min_x: f64,
    pub min_y: f64,
    pub min_z: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub max_z: f64,
}

/// Polar exclusion zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolarZone {
    pub min_elevation: f64,
    pub max_elevation: f64,
    pub min_azimuth: f64,
    pub max_azimuth: f64,
}

/// An exclusion zone in either convention.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Zone {
    Cartesian(CartesianZone),
    Polar(PolarZone),
}

/// audioBlockFormat with typeDefinition Objects.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectsBlock {
    pub id: String,
    pub rtime: Option<Time>,
    pub duration: Option<Time>,

    pub position: ObjectPosition,
    /// Render using the allocentric (Cartesian) path
    pub cartesian: bool,
    pub width: f64,
    pub height: f64,
    pub depth: f64,
    pub gain: f64,
    pub diffuse: f64,
    pub channel_lock: Option<ChannelLock>,
    pub object_divergence: Option<ObjectDivergence>,
    pub jump_position: JumpPosition,
    pub screen_ref: bool,
    /// Bypass screen-related transforms
    pub head_locked: bool,
    pub importance: i32,
    pub zone_exclusion: Vec<Zone>,
}

impl ObjectsBlock {
    /// A block with a position and all other parameters defaulted.
    pub fn with_position(id: &str, position: ObjectPosition) -> Self {
        Self {
            id: id.to_owned(),
            rtime: None,
            duration: None,
            position,
            cartesian: position.is_cartesian(),
            width: 0.0,
            height: 0.0,
            depth: 0.0,
            gain: 1.0,
            diffuse: 0.0,
            channel_lock: None,
            object_divergence: None,
            jump_position: JumpPosition::default(),
            screen_ref: false,
            head_locked: false,
            importance: 10,
            zone_exclusion: Vec::new(),
        }
    }
}

/// A coordinate with optional min/max bounds, for DirectSpeakers positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundCoordinate {
    pub value: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl BoundCoordinate {
    pub fn exact(value: f64) -> Self {
        Self { value, min: None, max: None }
    }

    pub fn min_value(&self) -> f64 {
        self.min.unwrap_or(self.value)
    }

    pub fn max_value(&self) -> f64 {
        self.max.unwrap_or(self.value)
    }
}

/// DirectSpeakers position in polar coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectSpeakerPolarPosition {
    pub bounded_azimuth: BoundCoordinate,
    pub bounded_elevation: BoundCoordinate,
    pub bounded_distance: BoundCoordinate,
    pub screen_edge_lock: ScreenEdgeLock,
}

impl DirectSpeakerPolarPosition {
    pub fn azimuth(&self) -> f64 {
        self.bounded_azimuth.value
    }

    pub fn elevation(&self) -> f64 {
        self.bounded_elevation.value
    }

    pub fn distance(&self) -> f64 {
        self.bounded_distance.value
    }

    pub fn as_cartesian(&self) -> admr_core::Vec3 {
        admr_core::geom::cart(self.azimuth(), self.elevation(), self.distance())
    }
}

/// DirectSpeakers position in Cartesian coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectSpeakerCartesianPosition {
    pub bounded_x: BoundCoordinate,
    pub bounded_y: BoundCoordinate,
    pub bounded_z: BoundCoordinate,
    pub screen_edge_lock: ScreenEdgeLock,
}

/// DirectSpeakers position in either convention.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DirectSpeakerPosition {
    Polar(DirectSpeakerPolarPosition),
    Cartesian(DirectSpeakerCartesianPosition),
}

impl DirectSpeakerPosition {
    pub fn polar(azimuth: f64, elevation: f64) -> Self {
        DirectSpeakerPosition::Polar(DirectSpeakerPolarPosition {
            bounded_azimuth: BoundCoordinate::exact(azimuth),
            bounded_elevation: BoundCoordinate::exact(elevation),
            bounded_distance: BoundCoordinate::exact(1.0),
            screen_edge_lock: ScreenEdgeLock::default(),
        })
    }
}

/// audioBlockFormat with typeDefinition DirectSpeakers.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectSpeakersBlock {
    pub id: String,
    pub rtime: Option<Time>,
    pub duration: Option<Time>,

    pub position: DirectSpeakerPosition,
    pub speaker_labels: Vec<String>,
}

/// audioBlockFormat with typeDefinition HOA.
#[derive(Debug, Clone, PartialEq)]
pub struct HoaBlock {
    pub id: String,
    pub rtime: Option<Time>,
    pub duration: Option<Time>,

    pub order: Option<i32>,
    pub degree: Option<i32>,
    pub normalization: Option<Normalization>,
    pub nfc_ref_dist: Option<f64>,
    pub screen_ref: Option<bool>,
    pub equation: Option<String>,
}

/// One matrix coefficient referencing an input channelFormat.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixCoefficient {
    pub input_channel_format: ChannelFormatRef,
    pub gain: Option<f64>,
    /// Delay in milliseconds
    pub delay_ms: Option<f64>,
    /// Phase shift in degrees; rejected by the renderer if present
    pub phase: Option<f64>,
    /// Frequency band attributes; rejected by the renderer if present
    pub gain_var: Option<String>,
}

/// audioBlockFormat with typeDefinition Matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixBlock {
    pub id: String,
    pub rtime: Option<Time>,
    pub duration: Option<Time>,

    pub matrix: Vec<MatrixCoefficient>,
    pub output_channel_format: Option<ChannelFormatRef>,
}

/// audioBlockFormat with typeDefinition Binaural.
#[derive(Debug, Clone, PartialEq)]
pub struct BinauralBlock {
    pub id: String,
    pub rtime: Option<Time>,
    pub duration: Option<Time>,
}

/// The block formats of one channelFormat, tagged by type.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockFormats {
    Objects(Vec<ObjectsBlock>),
    DirectSpeakers(Vec<DirectSpeakersBlock>),
    Hoa(Vec<HoaBlock>),
    Matrix(Vec<MatrixBlock>),
    Binaural(Vec<BinauralBlock>),
}

impl BlockFormats {
    pub fn len(&self) -> usize {
        match self {
            BlockFormats::Objects(b) => b.len(),
            BlockFormats::DirectSpeakers(b) => b.len(),
            BlockFormats::Hoa(b) => b.len(),
            BlockFormats::Matrix(b) => b.len(),
            BlockFormats::Binaural(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Common timing fields of each block, in order.
    pub fn timings(&self) -> Vec<(Option<Time>, Option<Time>)> {
        fn t<B>(blocks: &[B], f: impl Fn(&B) -> (Option<Time>, Option<Time>)) -> Vec<(Option<Time>, Option<Time>)> {
            blocks.iter().map(f).collect()
        }

        match self {
            BlockFormats::Objects(b) => t(b, |b| (b.rtime, b.duration)),
            BlockFormats::DirectSpeakers(b) => t(b, |b| (b.rtime, b.duration)),
            BlockFormats::Hoa(b) => t(b, |b| (b.rtime, b.duration)),
            BlockFormats::Matrix(b) => t(b, |b| (b.rtime, b.duration)),
            BlockFormats::Binaural(b) => t(b, |b| (b.rtime, b.duration)),
        }
    }
}
