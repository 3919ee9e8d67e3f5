//! Rendering items, track specs and typed metadata
//!
//! Item selection flattens the ADM graph into these types; the renderers
//! consume nothing else.

use admr_core::{Screen, Time};

use crate::blocks::{DirectSpeakersBlock, Normalization, ObjectsBlock};
use crate::elements::Frequency;

/// A source of samples for one rendered channel.
///
/// Evaluation is defined in the render layer; equality is structural so that
/// repeated sub-specs can be cached.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackSpec {
    /// A track of zeros
    Silent,
    /// A physical wave track (0-based)
    Direct(usize),
    /// Apply a matrix coefficient to the input spec
    MatrixCoefficient {
        input: Box<TrackSpec>,
        coefficient: CoefficientSpec,
    },
    /// Sum of the input specs
    Mix(Vec<TrackSpec>),
}

impl TrackSpec {
    /// The largest physical track index referenced, if any.
    pub fn max_direct_index(&self) -> Option<usize> {
        match self {
            TrackSpec::Silent => None,
            TrackSpec::Direct(index) => Some(*index),
            TrackSpec::MatrixCoefficient { input, .. } => input.max_direct_index(),
            TrackSpec::Mix(inputs) => inputs.iter().filter_map(|t| t.max_direct_index()).max(),
        }
    }
}

/// A resolved matrix coefficient: gain and delay only; phase and
/// frequency-variant coefficients are rejected during selection.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CoefficientSpec {
    pub gain: Option<f64>,
    pub delay_ms: Option<f64>,
}

/// Common metadata from outside the block format.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtraData {
    pub object_start: Option<Time>,
    pub object_duration: Option<Time>,
    /// Reference screen from the audioProgramme
    pub reference_screen: Option<Screen>,
    pub channel_frequency: Frequency,
}

impl Default for ExtraData {
    fn default() -> Self {
        Self {
            object_start: None,
            object_duration: None,
            reference_screen: Some(Screen::default_screen()),
            channel_frequency: Frequency::default(),
        }
    }
}

/// Importance values applicable to a rendering item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportanceData {
    pub audio_object: Option<i32>,
    pub audio_pack_format: Option<i32>,
}

/// The path through the ADM used to reach one track/channel, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AdmPath {
    pub programme_id: Option<String>,
    pub content_id: Option<String>,
    pub object_ids: Vec<String>,
    pub pack_format_ids: Vec<String>,
    pub channel_format_id: Option<String>,
}

impl AdmPath {
    /// Render as `programme -> content -> object -> pack -> channel`.
    pub fn display(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(p) = &self.programme_id {
            parts.push(p);
        }
        if let Some(c) = &self.content_id {
            parts.push(c);
        }
        parts.extend(self.object_ids.iter().map(|s| s.as_str()));
        parts.extend(self.pack_format_ids.iter().map(|s| s.as_str()));
        if let Some(c) = &self.channel_format_id {
            parts.push(c);
        }
        parts.join(" -> ")
    }
}

/// TypeMetadata for typeDefinition Objects.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectTypeMetadata {
    pub block_format: ObjectsBlock,
    pub extra_data: ExtraData,
}

/// TypeMetadata for typeDefinition DirectSpeakers.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectSpeakersTypeMetadata {
    pub block_format: DirectSpeakersBlock,
    /// BS.2051 layout name of the common-definitions pack this channel
    /// belongs to, if any; enables the ITU downmix mapping rules
    pub itu_pack_layout: Option<String>,
    pub extra_data: ExtraData,
}

/// TypeMetadata for typeDefinition HOA; covers all channels of the item.
#[derive(Debug, Clone, PartialEq)]
pub struct HoaTypeMetadata {
    pub rtime: Option<Time>,
    pub duration: Option<Time>,
    pub orders: Vec<i32>,
    pub degrees: Vec<i32>,
    pub normalization: Normalization,
    pub nfc_ref_dist: Option<f64>,
    pub screen_ref: bool,
    pub extra_data: ExtraData,
}

/// A restartable, finite source of metadata blocks.
///
/// Explicitly an iterator protocol rather than a coroutine: block processors
/// need to pull one block at a time and remember their own position.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataSource<T> {
    blocks: Vec<T>,
    next: usize,
}

impl<T: Clone> MetadataSource<T> {
    pub fn new(blocks: Vec<T>) -> Self {
        Self { blocks, next: 0 }
    }

    /// Get the next metadata block, if one is available.
    pub fn next_block(&mut self) -> Option<T> {
        let block = self.blocks.get(self.next).cloned();
        if block.is_some() {
            self.next += 1;
        }
        block
    }

    /// Restart from the first block.
    pub fn reset(&mut self) {
        self.next = 0;
    }

    pub fn blocks(&self) -> &[T] {
        &self.blocks
    }

    /// Apply a function to every block.
    pub fn map_blocks(self, f: impl FnMut(T) -> T) -> Self {
        Self {
            blocks: self.blocks.into_iter().map(f).collect(),
            next: 0,
        }
    }
}

/// RenderingItem for typeDefinition Objects.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRenderingItem {
    pub track_spec: TrackSpec,
    pub metadata_source: MetadataSource<ObjectTypeMetadata>,
    pub importance: ImportanceData,
    pub adm_path: AdmPath,
}

/// RenderingItem for typeDefinition DirectSpeakers.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectSpeakersRenderingItem {
    pub track_spec: TrackSpec,
    pub metadata_source: MetadataSource<DirectSpeakersTypeMetadata>,
    pub importance: ImportanceData,
    pub adm_path: AdmPath,
}

/// RenderingItem for typeDefinition HOA; one item carries all tracks of the
/// pack.
#[derive(Debug, Clone, PartialEq)]
pub struct HoaRenderingItem {
    pub track_specs: Vec<TrackSpec>,
    pub metadata_source: MetadataSource<HoaTypeMetadata>,
    pub importances: Vec<ImportanceData>,
    pub adm_paths: Vec<AdmPath>,
}

/// An item to be rendered: a track spec (or several, for HOA) bound to a
/// typed metadata source.
///
/// Matrix packs do not appear as a separate variant: encode/decode/direct
/// structures resolve to DirectSpeakers items over `TrackSpec` chains during
/// selection.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderingItem {
    Objects(ObjectRenderingItem),
    DirectSpeakers(DirectSpeakersRenderingItem),
    Hoa(HoaRenderingItem),
}

impl RenderingItem {
    /// A short type name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            RenderingItem::Objects(_) => "Objects",
            RenderingItem::DirectSpeakers(_) => "DirectSpeakers",
            RenderingItem::Hoa(_) => "HOA",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_source() {
        let mut source = MetadataSource::new(vec![1, 2, 3]);
        assert_eq!(source.next_block(), Some(1));
        assert_eq!(source.next_block(), Some(2));
        source.reset();
        assert_eq!(source.next_block(), Some(1));
        assert_eq!(source.next_block(), Some(2));
        assert_eq!(source.next_block(), Some(3));
        assert_eq!(source.next_block(), None);
        assert_eq!(source.next_block(), None);
    }

    #[test]
    fn test_track_spec_structural_eq() {
        let a = TrackSpec::Mix(vec![TrackSpec::Direct(0), TrackSpec::Silent]);
        let b = TrackSpec::Mix(vec![TrackSpec::Direct(0), TrackSpec::Silent]);
        let c = TrackSpec::Mix(vec![TrackSpec::Direct(1), TrackSpec::Silent]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_adm_path_display() {
        let path = AdmPath {
            programme_id: Some("APR_1001".into()),
            content_id: Some("ACO_1001".into()),
            object_ids: vec!["AO_1001".into()],
            pack_format_ids: vec!["AP_00031001".into()],
            channel_format_id: Some("AC_00031001".into()),
        };
        assert_eq!(
            path.display(),
            "APR_1001 -> ACO_1001 -> AO_1001 -> AP_00031001 -> AC_00031001"
        );
    }
}
