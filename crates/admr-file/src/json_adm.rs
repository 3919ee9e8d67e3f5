//! The serialized ADM document representation
//!
//! The renderer consumes resolved documents; this module defines the JSON
//! form used by the tooling to carry them in the `axml` chunk, and the
//! `AdmParser` seam through which other representations (notably the XML
//! form, an external collaborator) can be plugged in.

use serde::{Deserialize, Serialize};

use admr_core::{Screen, Time};
use admr_model::blocks::{
    BinauralBlock, BlockFormats, BoundCoordinate, CartesianZone, ChannelLock,
    DirectSpeakerCartesianPosition, DirectSpeakerPolarPosition, DirectSpeakerPosition,
    DirectSpeakersBlock, HoaBlock, HorizontalEdge, JumpPosition, MatrixBlock, MatrixCoefficient,
    Normalization, ObjectCartesianPosition, ObjectDivergence, ObjectPolarPosition,
    ObjectPosition, ObjectsBlock, PolarZone, ScreenEdgeLock, VerticalEdge, Zone,
};
use admr_model::builder::AdmBuilder;
use admr_model::document::ElementRef;
use admr_model::elements::{ChannelFormatRef, TypeDefinition};
use admr_model::AdmDocument;

use crate::error::{FileError, FileResult};

/// Parses an `axml` chunk payload into a resolved document.
pub trait AdmParser {
    fn parse(&self, axml: &[u8]) -> FileResult<AdmDocument>;
}

/// The built-in parser for the JSON document representation.
#[derive(Debug, Default)]
pub struct JsonAdmParser;

impl AdmParser for JsonAdmParser {
    fn parse(&self, axml: &[u8]) -> FileResult<AdmDocument> {
        let json: AdmJson =
            serde_json::from_slice(axml).map_err(|e| FileError::AdmParse(e.to_string()))?;
        json.into_document()
    }
}

/// Serialize a document into the JSON representation.
pub fn document_to_json(doc: &AdmDocument) -> FileResult<Vec<u8>> {
    let json = AdmJson::from_document(doc);
    serde_json::to_vec_pretty(&json).map_err(|e| FileError::AdmParse(e.to_string()))
}

// the serde types; optional values serialize only when present to keep
// generated documents small

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct AdmJson {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    programmes: Vec<ProgrammeJson>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    contents: Vec<ContentJson>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    objects: Vec<ObjectJson>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pack_formats: Vec<PackFormatJson>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    channel_formats: Vec<ChannelFormatJson>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    stream_formats: Vec<StreamFormatJson>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    track_formats: Vec<TrackFormatJson>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    track_uids: Vec<TrackUidJson>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProgrammeJson {
    id: String,
    name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    contents: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reference_screen: Option<Screen>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ContentJson {
    id: String,
    name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    objects: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ObjectJson {
    id: String,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    duration: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    importance: Option<i32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    disabled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pack_formats: Vec<String>,
    /// `null` entries are silent (`ATU_00000000`) references
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    track_uids: Vec<Option<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    objects: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    complementary_objects: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PackFormatJson {
    id: String,
    name: String,
    #[serde(rename = "type")]
    type_def: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    channel_formats: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pack_formats: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    importance: Option<i32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    is_common_definition: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    normalization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nfc_ref_dist: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    screen_ref: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    input_pack_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output_pack_format: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    encode_pack_formats: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChannelFormatJson {
    id: String,
    name: String,
    #[serde(rename = "type")]
    type_def: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    low_pass: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    high_pass: Option<f64>,
    #[serde(default)]
    blocks: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StreamFormatJson {
    id: String,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    channel_format: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    track_formats: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TrackFormatJson {
    id: String,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stream_format: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TrackUidJson {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    track_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    track_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    channel_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pack_format: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ScreenEdgeLockJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    horizontal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vertical: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum PositionJson {
    Polar {
        azimuth: f64,
        elevation: f64,
        #[serde(default = "default_distance")]
        distance: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        screen_edge_lock: Option<ScreenEdgeLockJson>,
    },
    Cartesian {
        #[serde(rename = "X")]
        x: f64,
        #[serde(rename = "Y")]
        y: f64,
        #[serde(rename = "Z")]
        z: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        screen_edge_lock: Option<ScreenEdgeLockJson>,
    },
}

fn default_distance() -> f64 {
    1.0
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum BoundJson {
    Exact(f64),
    Bounded {
        value: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum DirectSpeakerPositionJson {
    Polar {
        azimuth: BoundJson,
        elevation: BoundJson,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        distance: Option<BoundJson>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        screen_edge_lock: Option<ScreenEdgeLockJson>,
    },
    Cartesian {
        #[serde(rename = "X")]
        x: BoundJson,
        #[serde(rename = "Y")]
        y: BoundJson,
        #[serde(rename = "Z")]
        z: BoundJson,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        screen_edge_lock: Option<ScreenEdgeLockJson>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum ZoneJson {
    Polar {
        min_azimuth: f64,
        max_azimuth: f64,
        min_elevation: f64,
        max_elevation: f64,
    },
    Cartesian {
        min_x: f64,
        min_y: f64,
        min_z: f64,
        max_x: f64,
        max_y: f64,
        max_z: f64,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct ObjectsBlockJson {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rtime: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    duration: Option<Time>,
    position: PositionJson,
    #[serde(default)]
    cartesian: bool,
    #[serde(default)]
    width: f64,
    #[serde(default)]
    height: f64,
    #[serde(default)]
    depth: f64,
    #[serde(default = "default_gain")]
    gain: f64,
    #[serde(default)]
    diffuse: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    channel_lock: Option<ChannelLockJson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    object_divergence: Option<ObjectDivergenceJson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    jump_position: Option<JumpPositionJson>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    screen_ref: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    head_locked: bool,
    #[serde(default = "default_importance")]
    importance: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    zone_exclusion: Vec<ZoneJson>,
}

fn default_gain() -> f64 {
    1.0
}

fn default_importance() -> i32 {
    10
}

#[derive(Debug, Serialize, Deserialize)]
struct ChannelLockJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_distance: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ObjectDivergenceJson {
    value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    azimuth_range: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    position_range: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct JumpPositionJson {
    flag: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    interpolation_length: Option<Time>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DirectSpeakersBlockJson {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rtime: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    duration: Option<Time>,
    position: DirectSpeakerPositionJson,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    speaker_labels: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct HoaBlockJson {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rtime: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    duration: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    order: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    degree: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    normalization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nfc_ref_dist: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    screen_ref: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    equation: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MatrixBlockJson {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rtime: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    duration: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output_channel_format: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    matrix: Vec<MatrixCoefficientJson>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MatrixCoefficientJson {
    input_channel_format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    gain: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delay_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    phase: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BinauralBlockJson {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rtime: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    duration: Option<Time>,
}

// conversion helpers

fn parse_error(message: impl Into<String>) -> FileError {
    FileError::AdmParse(message.into())
}

fn type_def_from_str(s: &str) -> FileResult<TypeDefinition> {
    match s {
        "DirectSpeakers" => Ok(TypeDefinition::DirectSpeakers),
        "Matrix" => Ok(TypeDefinition::Matrix),
        "Objects" => Ok(TypeDefinition::Objects),
        "HOA" => Ok(TypeDefinition::Hoa),
        "Binaural" => Ok(TypeDefinition::Binaural),
        other => Err(parse_error(format!("unknown typeDefinition '{}'", other))),
    }
}

fn normalization_from_str(s: &str) -> FileResult<Normalization> {
    match s {
        "SN3D" => Ok(Normalization::SN3D),
        "N3D" => Ok(Normalization::N3D),
        "FuMa" => Ok(Normalization::FuMa),
        other => Err(parse_error(format!("unknown normalization '{}'", other))),
    }
}

fn edge_lock_from_json(json: Option<ScreenEdgeLockJson>) -> FileResult<ScreenEdgeLock> {
    let Some(json) = json else {
        return Ok(ScreenEdgeLock::default());
    };

    let horizontal = json
        .horizontal
        .map(|h| match h.as_str() {
            "left" => Ok(HorizontalEdge::Left),
            "right" => Ok(HorizontalEdge::Right),
            other => Err(parse_error(format!("unknown horizontal edge '{}'", other))),
        })
        .transpose()?;
    let vertical = json
        .vertical
        .map(|v| match v.as_str() {
            "top" => Ok(VerticalEdge::Top),
            "bottom" => Ok(VerticalEdge::Bottom),
            other => Err(parse_error(format!("unknown vertical edge '{}'", other))),
        })
        .transpose()?;

    Ok(ScreenEdgeLock { horizontal, vertical })
}

fn edge_lock_to_json(lock: ScreenEdgeLock) -> Option<ScreenEdgeLockJson> {
    if !lock.is_set() {
        return None;
    }
    Some(ScreenEdgeLockJson {
        horizontal: lock.horizontal.map(|h| {
            match h {
                HorizontalEdge::Left => "left",
                HorizontalEdge::Right => "right",
            }
            .to_owned()
        }),
        vertical: lock.vertical.map(|v| {
            match v {
                VerticalEdge::Top => "top",
                VerticalEdge::Bottom => "bottom",
            }
            .to_owned()
        }),
    })
}

fn bound_from_json(json: BoundJson) -> BoundCoordinate {
    match json {
        BoundJson::Exact(value) => BoundCoordinate::exact(value),
        BoundJson::Bounded { value, min, max } => BoundCoordinate { value, min, max },
    }
}

fn bound_to_json(bound: BoundCoordinate) -> BoundJson {
    if bound.min.is_none() && bound.max.is_none() {
        BoundJson::Exact(bound.value)
    } else {
        BoundJson::Bounded {
            value: bound.value,
            min: bound.min,
            max: bound.max,
        }
    }
}

impl AdmJson {
    fn into_document(self) -> FileResult<AdmDocument> {
        let mut b = AdmBuilder::new();
        let err = |e: admr_model::ModelError| parse_error(e.to_string());

        // create every element first so that references can point anywhere
        for p in &self.programmes {
            // an absent reference screen means the default screen
            let screen = p.reference_screen.or_else(|| Some(Screen::default_screen()));
            b.add_programme(&p.id, &p.name, screen).map_err(err)?;
        }
        for c in &self.contents {
            b.add_content(&c.id, &c.name).map_err(err)?;
        }
        for o in &self.objects {
            let r = b.add_object(&o.id, &o.name).map_err(err)?;
            let object = b.object_mut(r);
            object.start = o.start;
            object.duration = o.duration;
            object.importance = o.importance;
            object.disabled = o.disabled;
        }
        for p in &self.pack_formats {
            let type_def = type_def_from_str(&p.type_def)?;
            let r = b.add_pack_format(&p.id, &p.name, type_def).map_err(err)?;
            let pack = b.pack_format_mut(r);
            pack.importance = p.importance;
            pack.is_common_definition = p.is_common_definition;
            pack.nfc_ref_dist = p.nfc_ref_dist;
            pack.screen_ref = p.screen_ref;
            if let Some(n) = &p.normalization {
                b.pack_format_mut(r).normalization = Some(normalization_from_str(n)?);
            }
        }
        for c in &self.channel_formats {
            let type_def = type_def_from_str(&c.type_def)?;
            // block contents are filled in after all channels exist, since
            // matrix blocks reference other channel formats
            let empty = match type_def {
                TypeDefinition::Objects => BlockFormats::Objects(Vec::new()),
                TypeDefinition::DirectSpeakers => BlockFormats::DirectSpeakers(Vec::new()),
                TypeDefinition::Hoa => BlockFormats::Hoa(Vec::new()),
                TypeDefinition::Matrix => BlockFormats::Matrix(Vec::new()),
                TypeDefinition::Binaural => BlockFormats::Binaural(Vec::new()),
            };
            let r = b.add_channel_format(&c.id, &c.name, type_def, empty).map_err(err)?;
            b.channel_format_mut(r).frequency = admr_model::elements::Frequency {
                low_pass: c.low_pass,
                high_pass: c.high_pass,
            };
        }
        for s in &self.stream_formats {
            b.add_stream_format(&s.id, &s.name).map_err(err)?;
        }
        for t in &self.track_formats {
            b.add_track_format(&t.id, &t.name).map_err(err)?;
        }
        for u in &self.track_uids {
            b.add_track_uid(&u.id, u.track_index).map_err(err)?;
        }

        // resolve all references
        let programme_ref = |b: &AdmBuilder, id: &str| match b.lookup(id) {
            Some(ElementRef::Programme(r)) => Ok(r),
            _ => Err(parse_error(format!("unresolved audioProgramme reference '{}'", id))),
        };
        let content_ref = |b: &AdmBuilder, id: &str| match b.lookup(id) {
            Some(ElementRef::Content(r)) => Ok(r),
            _ => Err(parse_error(format!("unresolved audioContent reference '{}'", id))),
        };
        let object_ref = |b: &AdmBuilder, id: &str| match b.lookup(id) {
            Some(ElementRef::Object(r)) => Ok(r),
            _ => Err(parse_error(format!("unresolved audioObject reference '{}'", id))),
        };
        let pack_ref = |b: &AdmBuilder, id: &str| match b.lookup(id) {
            Some(ElementRef::PackFormat(r)) => Ok(r),
            _ => Err(parse_error(format!("unresolved audioPackFormat reference '{}'", id))),
        };
        let channel_ref = |b: &AdmBuilder, id: &str| match b.lookup(id) {
            Some(ElementRef::ChannelFormat(r)) => Ok(r),
            _ => Err(parse_error(format!("unresolved audioChannelFormat reference '{}'", id))),
        };
        let stream_ref = |b: &AdmBuilder, id: &str| match b.lookup(id) {
            Some(ElementRef::StreamFormat(r)) => Ok(r),
            _ => Err(parse_error(format!("unresolved audioStreamFormat reference '{}'", id))),
        };
        let track_format_ref = |b: &AdmBuilder, id: &str| match b.lookup(id) {
            Some(ElementRef::TrackFormat(r)) => Ok(r),
            _ => Err(parse_error(format!("unresolved audioTrackFormat reference '{}'", id))),
        };
        let track_uid_ref = |b: &AdmBuilder, id: &str| match b.lookup(id) {
            Some(ElementRef::TrackUid(r)) => Ok(r),
            _ => Err(parse_error(format!("unresolved audioTrackUID reference '{}'", id))),
        };

        for p in &self.programmes {
            let pr = programme_ref(&b, &p.id)?;
            for c in &p.contents {
                let cr = content_ref(&b, c)?;
                b.link_programme_content(pr, cr);
            }
        }
        for c in &self.contents {
            let cr = content_ref(&b, &c.id)?;
            for o in &c.objects {
                let or = object_ref(&b, o)?;
                b.link_content_object(cr, or);
            }
        }
        for o in &self.objects {
            let or = object_ref(&b, &o.id)?;
            for p in &o.pack_formats {
                let pr = pack_ref(&b, p)?;
                b.link_object_pack(or, pr);
            }
            for t in &o.track_uids {
                let uid = match t {
                    None => None,
                    Some(id) if id == "ATU_00000000" => None,
                    Some(id) => Some(track_uid_ref(&b, id)?),
                };
                b.link_object_track_uid(or, uid);
            }
            for s in &o.objects {
                let sr = object_ref(&b, s)?;
                b.link_nested_object(or, sr);
            }
            for s in &o.complementary_objects {
                let sr = object_ref(&b, s)?;
                b.link_complementary_object(or, sr);
            }
        }
        for p in &self.pack_formats {
            let pr = pack_ref(&b, &p.id)?;
            for c in &p.channel_formats {
                let cr = channel_ref(&b, c)?;
                b.link_pack_channel(pr, cr);
            }
            for s in &p.pack_formats {
                let sr = pack_ref(&b, s)?;
                b.link_nested_pack(pr, sr);
            }
            if let Some(id) = &p.input_pack_format {
                let r = pack_ref(&b, id)?;
                b.pack_format_mut(pr).input_pack_format = Some(r);
            }
            if let Some(id) = &p.output_pack_format {
                let r = pack_ref(&b, id)?;
                b.pack_format_mut(pr).output_pack_format = Some(r);
            }
            for id in &p.encode_pack_formats {
                let r = pack_ref(&b, id)?;
                b.pack_format_mut(pr).encode_pack_formats.push(r);
            }
        }
        for s in &self.stream_formats {
            let sr = stream_ref(&b, &s.id)?;
            if let Some(id) = &s.channel_format {
                let cr = channel_ref(&b, id)?;
                b.link_stream_channel(sr, cr);
            }
            for id in &s.track_formats {
                let tr = track_format_ref(&b, id)?;
                b.link_track_stream(tr, sr).map_err(err)?;
            }
        }
        for t in &self.track_formats {
            if let Some(id) = &t.stream_format {
                let tr = track_format_ref(&b, &t.id)?;
                let sr = stream_ref(&b, id)?;
                b.link_track_stream(tr, sr).map_err(err)?;
            }
        }
        for u in &self.track_uids {
            let ur = track_uid_ref(&b, &u.id)?;
            let track_format = u
                .track_format
                .as_ref()
                .map(|id| track_format_ref(&b, id))
                .transpose()?;
            let channel_format = u
                .channel_format
                .as_ref()
                .map(|id| channel_ref(&b, id))
                .transpose()?;
            let pack_format = u
                .pack_format
                .as_ref()
                .map(|id| pack_ref(&b, id))
                .transpose()?;
            b.link_track_uid(ur, track_format, channel_format, pack_format);
        }

        // finally fill in block formats
        for c in &self.channel_formats {
            let cr = channel_ref(&b, &c.id)?;
            let type_def = type_def_from_str(&c.type_def)?;
            let blocks = parse_blocks(&b, type_def, &c.blocks, &channel_ref)?;
            b.channel_format_mut(cr).blocks = blocks;
        }

        Ok(b.finish())
    }

    fn from_document(doc: &AdmDocument) -> AdmJson {
        AdmJson {
            programmes: doc
                .programmes
                .iter()
                .map(|p| ProgrammeJson {
                    id: p.id.clone(),
                    name: p.name.clone(),
                    contents: p.contents.iter().map(|&c| doc.content(c).id.clone()).collect(),
                    reference_screen: p.reference_screen,
                })
                .collect(),
            contents: doc
                .contents
                .iter()
                .map(|c| ContentJson {
                    id: c.id.clone(),
                    name: c.name.clone(),
                    objects: c.objects.iter().map(|&o| doc.object(o).id.clone()).collect(),
                })
                .collect(),
            objects: doc
                .objects
                .iter()
                .map(|o| ObjectJson {
                    id: o.id.clone(),
                    name: o.name.clone(),
                    start: o.start,
                    duration: o.duration,
                    importance: o.importance,
                    disabled: o.disabled,
                    pack_formats: o
                        .pack_formats
                        .iter()
                        .map(|&p| doc.pack_format(p).id.clone())
                        .collect(),
                    track_uids: o
                        .track_uids
                        .iter()
                        .map(|t| t.map(|t| doc.track_uid(t).id.clone()))
                        .collect(),
                    objects: o.objects.iter().map(|&s| doc.object(s).id.clone()).collect(),
                    complementary_objects: o
                        .complementary_objects
                        .iter()
                        .map(|&s| doc.object(s).id.clone())
                        .collect(),
                })
                .collect(),
            pack_formats: doc
                .pack_formats
                .iter()
                .map(|p| PackFormatJson {
                    id: p.id.clone(),
                    name: p.name.clone(),
                    type_def: p.type_def.name().to_owned(),
                    channel_formats: p
                        .channel_formats
                        .iter()
                        .map(|&c| doc.channel_format(c).id.clone())
                        .collect(),
                    pack_formats: p
                        .pack_formats
                        .iter()
                        .map(|&s| doc.pack_format(s).id.clone())
                        .collect(),
                    importance: p.importance,
                    is_common_definition: p.is_common_definition,
                    normalization: p.normalization.map(|n| n.name().to_owned()),
                    nfc_ref_dist: p.nfc_ref_dist,
                    screen_ref: p.screen_ref,
                    input_pack_format: p.input_pack_format.map(|r| doc.pack_format(r).id.clone()),
                    output_pack_format: p.output_pack_format.map(|r| doc.pack_format(r).id.clone()),
                    encode_pack_formats: p
                        .encode_pack_formats
                        .iter()
                        .map(|&r| doc.pack_format(r).id.clone())
                        .collect(),
                })
                .collect(),
            channel_formats: doc
                .channel_formats
                .iter()
                .map(|c| ChannelFormatJson {
                    id: c.id.clone(),
                    name: c.name.clone(),
                    type_def: c.type_def.name().to_owned(),
                    low_pass: c.frequency.low_pass,
                    high_pass: c.frequency.high_pass,
                    blocks: blocks_to_json(doc, &c.blocks),
                })
                .collect(),
            stream_formats: doc
                .stream_formats
                .iter()
                .map(|s| StreamFormatJson {
                    id: s.id.clone(),
                    name: s.name.clone(),
                    channel_format: s.channel_format.map(|c| doc.channel_format(c).id.clone()),
                    track_formats: s
                        .track_formats
                        .iter()
                        .map(|&t| doc.track_format(t).id.clone())
                        .collect(),
                })
                .collect(),
            track_formats: doc
                .track_formats
                .iter()
                .map(|t| TrackFormatJson {
                    id: t.id.clone(),
                    name: t.name.clone(),
                    stream_format: t.stream_format.map(|s| doc.stream_format(s).id.clone()),
                })
                .collect(),
            track_uids: doc
                .track_uids
                .iter()
                .map(|u| TrackUidJson {
                    id: u.id.clone(),
                    track_index: u.track_index,
                    track_format: u.track_format.map(|t| doc.track_format(t).id.clone()),
                    channel_format: u.channel_format.map(|c| doc.channel_format(c).id.clone()),
                    pack_format: u.pack_format.map(|p| doc.pack_format(p).id.clone()),
                })
                .collect(),
        }
    }
}

fn parse_blocks(
    b: &AdmBuilder,
    type_def: TypeDefinition,
    blocks: &[serde_json::Value],
    channel_ref: &impl Fn(&AdmBuilder, &str) -> FileResult<ChannelFormatRef>,
) -> FileResult<BlockFormats> {
    fn decode<T: serde::de::DeserializeOwned>(value: &serde_json::Value) -> FileResult<T> {
        serde_json::from_value(value.clone()).map_err(|e| parse_error(e.to_string()))
    }

    match type_def {
        TypeDefinition::Objects => {
            let blocks: Vec<ObjectsBlock> = blocks
                .iter()
                .map(|v| {
                    let json: ObjectsBlockJson = decode(v)?;
                    Ok(ObjectsBlock {
                        id: json.id,
                        rtime: json.rtime,
                        duration: json.duration,
                        cartesian: json.cartesian
                            || matches!(json.position, PositionJson::Cartesian { .. }),
                        position: match json.position {
                            PositionJson::Polar {
                                azimuth,
                                elevation,
                                distance,
                                screen_edge_lock,
                            } => ObjectPosition::Polar(ObjectPolarPosition {
                                azimuth,
                                elevation,
                                distance,
                                screen_edge_lock: edge_lock_from_json(screen_edge_lock)?,
                            }),
                            PositionJson::Cartesian { x, y, z, screen_edge_lock } => {
                                ObjectPosition::Cartesian(ObjectCartesianPosition {
                                    x,
                                    y,
                                    z,
                                    screen_edge_lock: edge_lock_from_json(screen_edge_lock)?,
                                })
                            }
                        },
                        width: json.width,
                        height: json.height,
                        depth: json.depth,
                        gain: json.gain,
                        diffuse: json.diffuse,
                        channel_lock: json
                            .channel_lock
                            .map(|c| ChannelLock { max_distance: c.max_distance }),
                        object_divergence: json.object_divergence.map(|d| ObjectDivergence {
                            value: d.value,
                            azimuth_range: d.azimuth_range,
                            position_range: d.position_range,
                        }),
                        jump_position: json
                            .jump_position
                            .map(|j| JumpPosition {
                                flag: j.flag,
                                interpolation_length: j.interpolation_length,
                            })
                            .unwrap_or_default(),
                        screen_ref: json.screen_ref,
                        head_locked: json.head_locked,
                        importance: json.importance,
                        zone_exclusion: json
                            .zone_exclusion
                            .into_iter()
                            .map(|z| match z {
                                ZoneJson::Polar {
                                    min_azimuth,
                                    max_azimuth,
                                    min_elevation,
                                    max_elevation,
                                } => Zone::Polar(PolarZone {
                                    min_azimuth,
                                    max_azimuth,
                                    min_elevation,
                                    max_elevation,
                                }),
                                ZoneJson::Cartesian {
                                    min_x,
                                    min_y,
                                    min_z,
                                    max_x,
                                    max_y,
                                    max_z,
                                } => Zone::Cartesian(CartesianZone {
                                    min_x,
                                    min_y,
                                    min_z,
                                    max_x,
                                    max_y,
                                    max_z,
                                }),
                            })
                            .collect(),
                    })
                })
                .collect::<FileResult<_>>()?;
            Ok(BlockFormats::Objects(blocks))
        }
        TypeDefinition::DirectSpeakers => {
            let blocks: Vec<DirectSpeakersBlock> = blocks
                .iter()
                .map(|v| {
                    let json: DirectSpeakersBlockJson = decode(v)?;
                    Ok(DirectSpeakersBlock {
                        id: json.id,
                        rtime: json.rtime,
                        duration: json.duration,
                        position: match json.position {
                            DirectSpeakerPositionJson::Polar {
                                azimuth,
                                elevation,
                                distance,
                                screen_edge_lock,
                            } => DirectSpeakerPosition::Polar(DirectSpeakerPolarPosition {
                                bounded_azimuth: bound_from_json(azimuth),
                                bounded_elevation: bound_from_json(elevation),
                                bounded_distance: distance
                                    .map(bound_from_json)
                                    .unwrap_or(BoundCoordinate::exact(1.0)),
                                screen_edge_lock: edge_lock_from_json(screen_edge_lock)?,
                            }),
                            DirectSpeakerPositionJson::Cartesian {
                                x,
                                y,
                                z,
                                screen_edge_lock,
                            } => DirectSpeakerPosition::Cartesian(DirectSpeakerCartesianPosition {
                                bounded_x: bound_from_json(x),
                                bounded_y: bound_from_json(y),
                                bounded_z: bound_from_json(z),
                                screen_edge_lock: edge_lock_from_json(screen_edge_lock)?,
                            }),
                        },
                        speaker_labels: json.speaker_labels,
                    })
                })
                .collect::<FileResult<_>>()?;
            Ok(BlockFormats::DirectSpeakers(blocks))
        }
        TypeDefinition::Hoa => {
            let blocks: Vec<HoaBlock> = blocks
                .iter()
                .map(|v| {
                    let json: HoaBlockJson = decode(v)?;
                    Ok(HoaBlock {
                        id: json.id,
                        rtime: json.rtime,
                        duration: json.duration,
                        order: json.order,
                        degree: json.degree,
                        normalization: json
                            .normalization
                            .as_deref()
                            .map(normalization_from_str)
                            .transpose()?,
                        nfc_ref_dist: json.nfc_ref_dist,
                        screen_ref: json.screen_ref,
                        equation: json.equation,
                    })
                })
                .collect::<FileResult<_>>()?;
            Ok(BlockFormats::Hoa(blocks))
        }
        TypeDefinition::Matrix => {
            let blocks: Vec<MatrixBlock> = blocks
                .iter()
                .map(|v| {
                    let json: MatrixBlockJson = decode(v)?;
                    Ok(MatrixBlock {
                        id: json.id,
                        rtime: json.rtime,
                        duration: json.duration,
                        output_channel_format: json
                            .output_channel_format
                            .as_deref()
                            .map(|id| channel_ref(b, id))
                            .transpose()?,
                        matrix: json
                            .matrix
                            .into_iter()
                            .map(|c| {
                                Ok(MatrixCoefficient {
                                    input_channel_format: channel_ref(b, &c.input_channel_format)?,
                                    gain: c.gain,
                                    delay_ms: c.delay_ms,
                                    phase: c.phase,
                                    gain_var: None,
                                })
                            })
                            .collect::<FileResult<_>>()?,
                    })
                })
                .collect::<FileResult<_>>()?;
            Ok(BlockFormats::Matrix(blocks))
        }
        TypeDefinition::Binaural => {
            let blocks: Vec<BinauralBlock> = blocks
                .iter()
                .map(|v| {
                    let json: BinauralBlockJson = decode(v)?;
                    Ok(BinauralBlock {
                        id: json.id,
                        rtime: json.rtime,
                        duration: json.duration,
                    })
                })
                .collect::<FileResult<_>>()?;
            Ok(BlockFormats::Binaural(blocks))
        }
    }
}

fn to_value<T: Serialize>(v: &T) -> serde_json::Value {
    serde_json::to_value(v).expect("serialization is total")
}

fn blocks_to_json(doc: &AdmDocument, blocks: &BlockFormats) -> Vec<serde_json::Value> {
    match blocks {
        BlockFormats::Objects(blocks) => blocks
            .iter()
            .map(|block| {
                to_value(&ObjectsBlockJson {
                    id: block.id.clone(),
                    rtime: block.rtime,
                    duration: block.duration,
                    position: match block.position {
                        ObjectPosition::Polar(p) => PositionJson::Polar {
                            azimuth: p.azimuth,
                            elevation: p.elevation,
                            distance: p.distance,
                            screen_edge_lock: edge_lock_to_json(p.screen_edge_lock),
                        },
                        ObjectPosition::Cartesian(c) => PositionJson::Cartesian {
                            x: c.x,
                            y: c.y,
                            z: c.z,
                            screen_edge_lock: edge_lock_to_json(c.screen_edge_lock),
                        },
                    },
                    cartesian: block.cartesian,
                    width: block.width,
                    height: block.height,
                    depth: block.depth,
                    gain: block.gain,
                    diffuse: block.diffuse,
                    channel_lock: block
                        .channel_lock
                        .map(|c| ChannelLockJson { max_distance: c.max_distance }),
                    object_divergence: block.object_divergence.map(|d| ObjectDivergenceJson {
                        value: d.value,
                        azimuth_range: d.azimuth_range,
                        position_range: d.position_range,
                    }),
                    jump_position: (block.jump_position != JumpPosition::default()).then(|| {
                        JumpPositionJson {
                            flag: block.jump_position.flag,
                            interpolation_length: block.jump_position.interpolation_length,
                        }
                    }),
                    screen_ref: block.screen_ref,
                    head_locked: block.head_locked,
                    importance: block.importance,
                    zone_exclusion: block
                        .zone_exclusion
                        .iter()
                        .map(|z| match z {
                            Zone::Polar(z) => ZoneJson::Polar {
                                min_azimuth: z.min_azimuth,
                                max_azimuth: z.max_azimuth,
                                min_elevation: z.min_elevation,
                                max_elevation: z.max_elevation,
                            },
                            Zone::Cartesian(z) => ZoneJson::Cartesian {
                                min_x: z.min_x,
                                min_y: z.min_y,
                                min_z: z.min_z,
                                max_x: z.max_x,
                                max_y: z.max_y,
                                max_z: z.max_z,
                            },
                        })
                        .collect(),
                })
            })
            .collect(),
        BlockFormats::DirectSpeakers(blocks) => blocks
            .iter()
            .map(|block| {
                to_value(&DirectSpeakersBlockJson {
                    id: block.id.clone(),
                    rtime: block.rtime,
                    duration: block.duration,
                    position: match block.position {
                        DirectSpeakerPosition::Polar(p) => DirectSpeakerPositionJson::Polar {
                            azimuth: bound_to_json(p.bounded_azimuth),
                            elevation: bound_to_json(p.bounded_elevation),
                            distance: Some(bound_to_json(p.bounded_distance)),
                            screen_edge_lock: edge_lock_to_json(p.screen_edge_lock),
                        },
                        DirectSpeakerPosition::Cartesian(c) => {
                            DirectSpeakerPositionJson::Cartesian {
                                x: bound_to_json(c.bounded_x),
                                y: bound_to_json(c.bounded_y),
                                z: bound_to_json(c.bounded_z),
                                screen_edge_lock: edge_lock_to_json(c.screen_edge_lock),
                            }
                        }
                    },
                    speaker_labels: block.speaker_labels.clone(),
                })
            })
            .collect(),
        BlockFormats::Hoa(blocks) => blocks
            .iter()
            .map(|block| {
                to_value(&HoaBlockJson {
                    id: block.id.clone(),
                    rtime: block.rtime,
                    duration: block.duration,
                    order: block.order,
                    degree: block.degree,
                    normalization: block.normalization.map(|n| n.name().to_owned()),
                    nfc_ref_dist: block.nfc_ref_dist,
                    screen_ref: block.screen_ref,
                    equation: block.equation.clone(),
                })
            })
            .collect(),
        BlockFormats::Matrix(blocks) => blocks
            .iter()
            .map(|block| {
                to_value(&MatrixBlockJson {
                    id: block.id.clone(),
                    rtime: block.rtime,
                    duration: block.duration,
                    output_channel_format: block
                        .output_channel_format
                        .map(|c| doc.channel_format(c).id.clone()),
                    matrix: block
                        .matrix
                        .iter()
                        .map(|c| MatrixCoefficientJson {
                            input_channel_format: doc
                                .channel_format(c.input_channel_format)
                                .id
                                .clone(),
                            gain: c.gain,
                            delay_ms: c.delay_ms,
                            phase: c.phase,
                        })
                        .collect(),
                })
            })
            .collect(),
        BlockFormats::Binaural(blocks) => blocks
            .iter()
            .map(|block| {
                to_value(&BinauralBlockJson {
                    id: block.id.clone(),
                    rtime: block.rtime,
                    duration: block.duration,
                })
            })
            .collect(),
    }
}
