//! ADM document model and rendering item selection
//!
//! The ADM reference graph is stored as an arena of elements keyed by typed
//! indices (`PackFormatRef`, `ChannelFormatRef`, ...); after building, the
//! graph is a DAG and elements never change. Item selection walks the graph
//! from a selected audioProgramme and flattens it into rendering items, each
//! binding a `TrackSpec` to a typed metadata source.

pub mod blocks;
pub mod builder;
pub mod chna;
pub mod document;
pub mod elements;
pub mod importance;
pub mod items;
pub mod select;
pub mod timing;
pub mod validate;

mod error;

pub use blocks::{
    CartesianZone, ChannelLock, DirectSpeakersBlock, DirectSpeakerPosition, HoaBlock,
    JumpPosition, MatrixBlock, MatrixCoefficient, Normalization, ObjectDivergence,
    ObjectPosition, ObjectsBlock, PolarZone, ScreenEdgeLock, Zone,
};
pub use document::AdmDocument;
pub use elements::{
    ChannelFormatRef, ContentRef, FormatDefinition, Frequency, ObjectRef, PackFormatRef,
    ProgrammeRef, StreamFormatRef, TrackFormatRef, TrackUidRef, TypeDefinition,
};
pub use error::{ModelError, ModelResult};
pub use items::{
    AdmPath, DirectSpeakersTypeMetadata, ExtraData, HoaTypeMetadata, ImportanceData,
    MetadataSource, ObjectTypeMetadata, RenderingItem, TrackSpec,
};
pub use select::{select_rendering_items, SelectionOptions};
