//! The ADM document arena

use std::collections::HashMap;

use crate::elements::*;
use crate::error::{ModelError, ModelResult};

/// A resolved ADM document.
///
/// Elements live in per-type arenas and refer to each other by typed index;
/// string IDs are kept for diagnostics and CHNA matching. The document is
/// immutable during rendering.
#[derive(Debug, Clone, Default)]
pub struct AdmDocument {
    pub programmes: Vec<AudioProgramme>,
    pub contents: Vec<AudioContent>,
    pub objects: Vec<AudioObject>,
    pub pack_formats: Vec<AudioPackFormat>,
    pub channel_formats: Vec<AudioChannelFormat>,
    pub stream_formats: Vec<AudioStreamFormat>,
    pub track_formats: Vec<AudioTrackFormat>,
    pub track_uids: Vec<AudioTrackUid>,

    pub(crate) ids: HashMap<String, ElementRef>,
}

/// A reference to any element type, for lookup by string ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementRef {
    Programme(ProgrammeRef),
    Content(ContentRef),
    Object(ObjectRef),
    PackFormat(PackFormatRef),
    ChannelFormat(ChannelFormatRef),
    StreamFormat(StreamFormatRef),
    TrackFormat(TrackFormatRef),
    TrackUid(TrackUidRef),
}

impl AdmDocument {
    pub fn programme(&self, r: ProgrammeRef) -> &AudioProgramme {
        &self.programmes[r.0]
    }

    pub fn content(&self, r: ContentRef) -> &AudioContent {
        &self.contents[r.0]
    }

    pub fn object(&self, r: ObjectRef) -> &AudioObject {
        &self.objects[r.0]
    }

    pub fn pack_format(&self, r: PackFormatRef) -> &AudioPackFormat {
        &self.pack_formats[r.0]
    }

    pub fn channel_format(&self, r: ChannelFormatRef) -> &AudioChannelFormat {
        &self.channel_formats[r.0]
    }

    pub fn stream_format(&self, r: StreamFormatRef) -> &AudioStreamFormat {
        &self.stream_formats[r.0]
    }

    pub fn track_format(&self, r: TrackFormatRef) -> &AudioTrackFormat {
        &self.track_formats[r.0]
    }

    pub fn track_uid(&self, r: TrackUidRef) -> &AudioTrackUid {
        &self.track_uids[r.0]
    }

    /// Iterate over all programme refs.
    pub fn programme_refs(&self) -> impl Iterator<Item = ProgrammeRef> {
        (0..self.programmes.len()).map(ProgrammeRef)
    }

    pub fn object_refs(&self) -> impl Iterator<Item = ObjectRef> {
        (0..self.objects.len()).map(ObjectRef)
    }

    pub fn pack_format_refs(&self) -> impl Iterator<Item = PackFormatRef> {
        (0..self.pack_formats.len()).map(PackFormatRef)
    }

    pub fn channel_format_refs(&self) -> impl Iterator<Item = ChannelFormatRef> {
        (0..self.channel_formats.len()).map(ChannelFormatRef)
    }

    pub fn track_uid_refs(&self) -> impl Iterator<Item = TrackUidRef> {
        (0..self.track_uids.len()).map(TrackUidRef)
    }

    /// Look up any element by its string ID.
    pub fn lookup(&self, id: &str) -> Option<ElementRef> {
        self.ids.get(id).copied()
    }

    pub fn lookup_programme(&self, id: &str) -> ModelResult<ProgrammeRef> {
        match self.lookup(id) {
            Some(ElementRef::Programme(r)) => Ok(r),
            Some(_) => Err(ModelError::Reference(format!(
                "{} is not an audioProgramme",
                id
            ))),
            None => Err(ModelError::Reference(format!(
                "could not find audioProgramme with ID {}",
                id
            ))),
        }
    }

    pub fn lookup_object(&self, id: &str) -> ModelResult<ObjectRef> {
        match self.lookup(id) {
            Some(ElementRef::Object(r)) => Ok(r),
            Some(_) => Err(ModelError::Reference(format!("{} is not an audioObject", id))),
            None => Err(ModelError::Reference(format!(
                "could not find audioObject with ID {}",
                id
            ))),
        }
    }

    /// The channelFormat referenced (directly or through the
    /// trackFormat/streamFormat chain) by a trackUID.
    pub fn channel_format_for_track_uid(
        &self,
        uid: TrackUidRef,
    ) -> ModelResult<ChannelFormatRef> {
        let track_uid = self.track_uid(uid);

        if let Some(channel_format) = track_uid.channel_format {
            return Ok(channel_format);
        }

        let track_format = track_uid.track_format.ok_or_else(|| {
            ModelError::Reference(format!(
                "audioTrackUID {} has no audioTrackFormat or audioChannelFormat reference",
                track_uid.id
            ))
        })?;

        let stream_format = self.track_format(track_format).stream_format.ok_or_else(|| {
            ModelError::Reference(format!(
                "audioTrackFormat {} is not linked to an audioStreamFormat",
                self.track_format(track_format).id
            ))
        })?;

        self.stream_format(stream_format).channel_format.ok_or_else(|| {
            ModelError::Reference(format!(
                "audioStreamFormat {} has no audioChannelFormat reference",
                self.stream_format(stream_format).id
            ))
        })
    }

    /// All audioObjects which are not sub-objects of another audioObject.
    pub fn root_objects(&self) -> Vec<ObjectRef> {
        let mut is_sub = vec![false; self.objects.len()];
        for object in &self.objects {
            for &sub in &object.objects {
                is_sub[sub.0] = true;
            }
        }

        self.object_refs().filter(|r| !is_sub[r.0]).collect()
    }
}
