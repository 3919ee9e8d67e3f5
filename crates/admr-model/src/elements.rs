//! ADM element types
//!
//! Only the fields consumed by the renderer are modelled. References between
//! elements are typed indices into the arenas of `AdmDocument`; the string
//! IDs are kept for diagnostics and CHNA matching.

use admr_core::{Screen, Time};

use crate::blocks::{BlockFormats, Normalization};

macro_rules! element_ref {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) usize);

        impl $name {
            pub fn index(self) -> usize {
                self.0
            }
        }
    };
}

element_ref!(/// Index of an audioProgramme
    ProgrammeRef);
element_ref!(/// Index of an audioContent
    ContentRef);
element_ref!(/// Index of an audioObject
    ObjectRef);
element_ref!(/// Index of an audioPackFormat
    PackFormatRef);
element_ref!(/// Index of an audioChannelFormat
    ChannelFormatRef);
element_ref!(/// Index of an audioStreamFormat
    StreamFormatRef);
element_ref!(/// Index of an audioTrackFormat
    TrackFormatRef);
element_ref!(/// Index of an audioTrackUID
    TrackUidRef);

/// ADM typeDefinition values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeDefinition {
    DirectSpeakers,
    Matrix,
    Objects,
    Hoa,
    Binaural,
}

impl TypeDefinition {
    pub fn name(self) -> &'static str {
        match self {
            TypeDefinition::DirectSpeakers => "DirectSpeakers",
            TypeDefinition::Matrix => "Matrix",
            TypeDefinition::Objects => "Objects",
            TypeDefinition::Hoa => "HOA",
            TypeDefinition::Binaural => "Binaural",
        }
    }
}

/// ADM formatDefinition values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatDefinition {
    Pcm,
}

/// audioChannelFormat frequency element.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Frequency {
    pub low_pass: Option<f64>,
    pub high_pass: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct AudioProgramme {
    pub id: String,
    pub name: String,
    pub language: Option<String>,
    pub start: Option<Time>,
    pub end: Option<Time>,
    pub contents: Vec<ContentRef>,
    /// Reference screen for screen-related content
    pub reference_screen: Option<Screen>,
}

#[derive(Debug, Clone)]
pub struct AudioContent {
    pub id: String,
    pub name: String,
    pub language: Option<String>,
    pub objects: Vec<ObjectRef>,
}

#[derive(Debug, Clone)]
pub struct AudioObject {
    pub id: String,
    pub name: String,
    pub start: Option<Time>,
    pub duration: Option<Time>,
    pub importance: Option<i32>,
    pub interact: Option<bool>,
    /// Objects marked disabled are pruned during item selection
    pub disabled: bool,
    pub pack_formats: Vec<PackFormatRef>,
    /// `None` entries are silent tracks (`ATU_00000000` references)
    pub track_uids: Vec<Option<TrackUidRef>>,
    pub objects: Vec<ObjectRef>,
    pub complementary_objects: Vec<ObjectRef>,
}

#[derive(Debug, Clone)]
pub struct AudioPackFormat {
    pub id: String,
    pub name: String,
    pub type_def: TypeDefinition,
    pub channel_formats: Vec<ChannelFormatRef>,
    pub pack_formats: Vec<PackFormatRef>,
    pub importance: Option<i32>,
    pub absolute_distance: Option<f64>,
    pub is_common_definition: bool,

    // HOA parameters, also settable per block format
    pub normalization: Option<Normalization>,
    pub nfc_ref_dist: Option<f64>,
    pub screen_ref: Option<bool>,

    // Matrix references
    pub input_pack_format: Option<PackFormatRef>,
    pub output_pack_format: Option<PackFormatRef>,
    pub encode_pack_formats: Vec<PackFormatRef>,
}

#[derive(Debug, Clone)]
pub struct AudioChannelFormat {
    pub id: String,
    pub name: String,
    pub type_def: TypeDefinition,
    pub blocks: BlockFormats,
    pub frequency: Frequency,
}

#[derive(Debug, Clone)]
pub struct AudioStreamFormat {
    pub id: String,
    pub name: String,
    pub format: FormatDefinition,
    pub channel_format: Option<ChannelFormatRef>,
    pub pack_format: Option<PackFormatRef>,
    pub track_formats: Vec<TrackFormatRef>,
}

#[derive(Debug, Clone)]
pub struct AudioTrackFormat {
    pub id: String,
    pub name: String,
    pub format: FormatDefinition,
    pub stream_format: Option<StreamFormatRef>,
}

#[derive(Debug, Clone)]
pub struct AudioTrackUid {
    pub id: String,
    /// 1-based index into the wave tracks, from the CHNA chunk
    pub track_index: Option<usize>,
    pub sample_rate: Option<u32>,
    pub bit_depth: Option<u32>,
    pub track_format: Option<TrackFormatRef>,
    /// Direct channelFormat reference (BS.2076-2 style)
    pub channel_format: Option<ChannelFormatRef>,
    pub pack_format: Option<PackFormatRef>,
}
