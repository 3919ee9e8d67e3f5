//! Incremental construction of ADM documents
//!
//! Parsers and test code build documents through `AdmBuilder`, which checks
//! ID uniqueness as elements are added and links the
//! audioTrackFormat/audioStreamFormat relationship in whichever direction the
//! input provided it.

use admr_core::Screen;

use crate::blocks::{BlockFormats, DirectSpeakersBlock, HoaBlock, Normalization, ObjectsBlock};
use crate::document::{AdmDocument, ElementRef};
use crate::elements::*;
use crate::error::{ModelError, ModelResult};

/// Builder for `AdmDocument`.
#[derive(Debug, Default)]
pub struct AdmBuilder {
    doc: AdmDocument,
}

impl AdmBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&mut self, id: &str, element: ElementRef) -> ModelResult<()> {
        if self.doc.ids.insert(id.to_owned(), element).is_some() {
            return Err(ModelError::Parse(format!("duplicate element ID {}", id)));
        }
        Ok(())
    }

    pub fn add_programme(
        &mut self,
        id: &str,
        name: &str,
        reference_screen: Option<Screen>,
    ) -> ModelResult<ProgrammeRef> {
        let r = ProgrammeRef(self.doc.programmes.len());
        self.register(id, ElementRef::Programme(r))?;
        self.doc.programmes.push(AudioProgramme {
            id: id.to_owned(),
            name: name.to_owned(),
            language: None,
            start: None,
            end: None,
            contents: Vec::new(),
            reference_screen,
        });
        Ok(r)
    }

    pub fn add_content(&mut self, id: &str, name: &str) -> ModelResult<ContentRef> {
        let r = ContentRef(self.doc.contents.len());
        self.register(id, ElementRef::Content(r))?;
        self.doc.contents.push(AudioContent {
            id: id.to_owned(),
            name: name.to_owned(),
            language: None,
            objects: Vec::new(),
        });
        Ok(r)
    }

    pub fn add_object(&mut self, id: &str, name: &str) -> ModelResult<ObjectRef> {
        let r = ObjectRef(self.doc.objects.len());
        self.register(id, ElementRef::Object(r))?;
        self.doc.objects.push(AudioObject {
            id: id.to_owned(),
            name: name.to_owned(),
            start: None,
            duration: None,
            importance: None,
            interact: None,
            disabled: false,
            pack_formats: Vec::new(),
            track_uids: Vec::new(),
            objects: Vec::new(),
            complementary_objects: Vec::new(),
        });
        Ok(r)
    }

    pub fn add_pack_format(
        &mut self,
        id: &str,
        name: &str,
        type_def: TypeDefinition,
    ) -> ModelResult<PackFormatRef> {
        let r = PackFormatRef(self.doc.pack_formats.len());
        self.register(id, ElementRef::PackFormat(r))?;
        self.doc.pack_formats.push(AudioPackFormat {
            id: id.to_owned(),
            name: name.to_owned(),
            type_def,
            channel_formats: Vec::new(),
            pack_formats: Vec::new(),
            importance: None,
            absolute_distance: None,
            is_common_definition: false,
            normalization: None,
            nfc_ref_dist: None,
            screen_ref: None,
            input_pack_format: None,
            output_pack_format: None,
            encode_pack_formats: Vec::new(),
        });
        Ok(r)
    }

    pub fn add_channel_format(
        &mut self,
        id: &str,
        name: &str,
        type_def: TypeDefinition,
        blocks: BlockFormats,
    ) -> ModelResult<ChannelFormatRef> {
        let matches = matches!(
            (&blocks, type_def),
            (BlockFormats::Objects(_), TypeDefinition::Objects)
                | (BlockFormats::DirectSpeakers(_), TypeDefinition::DirectSpeakers)
                | (BlockFormats::Hoa(_), TypeDefinition::Hoa)
                | (BlockFormats::Matrix(_), TypeDefinition::Matrix)
                | (BlockFormats::Binaural(_), TypeDefinition::Binaural)
        );
        if !matches {
            return Err(ModelError::Parse(format!(
                "block formats of {} do not match its typeDefinition {}",
                id,
                type_def.name()
            )));
        }

        let r = ChannelFormatRef(self.doc.channel_formats.len());
        self.register(id, ElementRef::ChannelFormat(r))?;
        self.doc.channel_formats.push(AudioChannelFormat {
            id: id.to_owned(),
            name: name.to_owned(),
            type_def,
            blocks,
            frequency: Frequency::default(),
        });
        Ok(r)
    }

    pub fn add_stream_format(&mut self, id: &str, name: &str) -> ModelResult<StreamFormatRef> {
        let r = StreamFormatRef(self.doc.stream_formats.len());
        self.register(id, ElementRef::StreamFormat(r))?;
        self.doc.stream_formats.push(AudioStreamFormat {
            id: id.to_owned(),
            name: name.to_owned(),
            format: FormatDefinition::Pcm,
            channel_format: None,
            pack_format: None,
            track_formats: Vec::new(),
        });
        Ok(r)
    }

    pub fn add_track_format(&mut self, id: &str, name: &str) -> ModelResult<TrackFormatRef> {
        let r = TrackFormatRef(self.doc.track_formats.len());
        self.register(id, ElementRef::TrackFormat(r))?;
        self.doc.track_formats.push(AudioTrackFormat {
            id: id.to_owned(),
            name: name.to_owned(),
            format: FormatDefinition::Pcm,
            stream_format: None,
        });
        Ok(r)
    }

    pub fn add_track_uid(&mut self, id: &str, track_index: Option<usize>) -> ModelResult<TrackUidRef> {
        if id == "ATU_00000000" {
            return Err(ModelError::Reference(
                "ATU_00000000 is reserved for silent tracks and cannot be defined".into(),
            ));
        }

        let r = TrackUidRef(self.doc.track_uids.len());
        self.register(id, ElementRef::TrackUid(r))?;
        self.doc.track_uids.push(AudioTrackUid {
            id: id.to_owned(),
            track_index,
            sample_rate: None,
            bit_depth: None,
            track_format: None,
            channel_format: None,
            pack_format: None,
        });
        Ok(r)
    }

    /// Look up any element added so far by its string ID.
    pub fn lookup(&self, id: &str) -> Option<ElementRef> {
        self.doc.ids.get(id).copied()
    }

    // mutable access for setting optional fields after creation

    pub fn programme_mut(&mut self, r: ProgrammeRef) -> &mut AudioProgramme {
        &mut self.doc.programmes[r.0]
    }

    pub fn object_mut(&mut self, r: ObjectRef) -> &mut AudioObject {
        &mut self.doc.objects[r.0]
    }

    pub fn pack_format_mut(&mut self, r: PackFormatRef) -> &mut AudioPackFormat {
        &mut self.doc.pack_formats[r.0]
    }

    pub fn channel_format_mut(&mut self, r: ChannelFormatRef) -> &mut AudioChannelFormat {
        &mut self.doc.channel_formats[r.0]
    }

    pub fn stream_format_mut(&mut self, r: StreamFormatRef) -> &mut AudioStreamFormat {
        &mut self.doc.stream_formats[r.0]
    }

    pub fn track_uid_mut(&mut self, r: TrackUidRef) -> &mut AudioTrackUid {
        &mut self.doc.track_uids[r.0]
    }

    // linking

    pub fn link_programme_content(&mut self, p: ProgrammeRef, c: ContentRef) {
        self.doc.programmes[p.0].contents.push(c);
    }

    pub fn link_content_object(&mut self, c: ContentRef, o: ObjectRef) {
        self.doc.contents[c.0].objects.push(o);
    }

    pub fn link_object_pack(&mut self, o: ObjectRef, p: PackFormatRef) {
        self.doc.objects[o.0].pack_formats.push(p);
    }

    /// Add a trackUID reference to an object; `None` is a silent
    /// (`ATU_00000000`) reference.
    pub fn link_object_track_uid(&mut self, o: ObjectRef, t: Option<TrackUidRef>) {
        self.doc.objects[o.0].track_uids.push(t);
    }

    pub fn link_nested_object(&mut self, parent: ObjectRef, child: ObjectRef) {
        self.doc.objects[parent.0].objects.push(child);
    }

    pub fn link_complementary_object(&mut self, root: ObjectRef, comp: ObjectRef) {
        self.doc.objects[root.0].complementary_objects.push(comp);
    }

    pub fn link_pack_channel(&mut self, p: PackFormatRef, c: ChannelFormatRef) {
        self.doc.pack_formats[p.0].channel_formats.push(c);
    }

    pub fn link_nested_pack(&mut self, parent: PackFormatRef, child: PackFormatRef) {
        self.doc.pack_formats[parent.0].pack_formats.push(child);
    }

    /// Link a trackFormat to a streamFormat. Either reference direction in
    /// the input ends up here; both directions are stored in the document.
    pub fn link_track_stream(&mut self, t: TrackFormatRef, s: StreamFormatRef) -> ModelResult<()> {
        let track = &mut self.doc.track_formats[t.0];
        match track.stream_format {
            None => track.stream_format = Some(s),
            Some(existing) if existing == s => {}
            Some(_) => {
                return Err(ModelError::Reference(format!(
                    "audioTrackFormat {} references multiple audioStreamFormats",
                    track.id
                )))
            }
        }

        let stream = &mut self.doc.stream_formats[s.0];
        if !stream.track_formats.contains(&t) {
            stream.track_formats.push(t);
        }
        Ok(())
    }

    pub fn link_stream_channel(&mut self, s: StreamFormatRef, c: ChannelFormatRef) {
        self.doc.stream_formats[s.0].channel_format = Some(c);
    }

    pub fn link_track_uid(
        &mut self,
        uid: TrackUidRef,
        track_format: Option<TrackFormatRef>,
        channel_format: Option<ChannelFormatRef>,
        pack_format: Option<PackFormatRef>,
    ) {
        let u = &mut self.doc.track_uids[uid.0];
        u.track_format = track_format;
        u.channel_format = channel_format;
        u.pack_format = pack_format;
    }

    /// Finish building, returning the document.
    pub fn finish(self) -> AdmDocument {
        self.doc
    }

    // convenience for tests and generated files: a complete chain for a
    // single mono item

    fn add_mono_chain(
        &mut self,
        n: usize,
        name: &str,
        type_def: TypeDefinition,
        blocks: BlockFormats,
        track_index: usize,
    ) -> ModelResult<(ObjectRef, PackFormatRef, ChannelFormatRef, TrackUidRef)> {
        let pack = self.add_pack_format(&format!("AP_100{}1001", n), name, type_def)?;
        let channel = self.add_channel_format(&format!("AC_100{}1001", n), name, type_def, blocks)?;
        self.link_pack_channel(pack, channel);

        let stream = self.add_stream_format(&format!("AS_100{}1001", n), name)?;
        let track = self.add_track_format(&format!("AT_100{}1001_01", n), name)?;
        self.link_track_stream(track, stream)?;
        self.link_stream_channel(stream, channel);

        let uid = self.add_track_uid(&format!("ATU_0000100{}", n), Some(track_index))?;
        self.link_track_uid(uid, Some(track), None, Some(pack));

        let object = self.add_object(&format!("AO_100{}", n), name)?;
        self.link_object_pack(object, pack);
        self.link_object_track_uid(object, Some(uid));

        Ok((object, pack, channel, uid))
    }

    /// Add a mono Objects item with a full reference chain, returning the
    /// audioObject.
    pub fn add_objects_item(
        &mut self,
        n: usize,
        name: &str,
        blocks: Vec<ObjectsBlock>,
        track_index: usize,
    ) -> ModelResult<ObjectRef> {
        let (object, _, _, _) = self.add_mono_chain(
            n,
            name,
            TypeDefinition::Objects,
            BlockFormats::Objects(blocks),
            track_index,
        )?;
        Ok(object)
    }

    /// Add a mono DirectSpeakers item with a full reference chain.
    pub fn add_direct_speakers_item(
        &mut self,
        n: usize,
        name: &str,
        blocks: Vec<DirectSpeakersBlock>,
        track_index: usize,
    ) -> ModelResult<ObjectRef> {
        let (object, _, _, _) = self.add_mono_chain(
            n,
            name,
            TypeDefinition::DirectSpeakers,
            BlockFormats::DirectSpeakers(blocks),
            track_index,
        )?;
        Ok(object)
    }

    /// Add an HOA item with one channel per (order, degree) pair, tracks
    /// taken from consecutive indices starting at `first_track_index`.
    /// Returns the audioObject and its audioPackFormat.
    pub fn add_hoa_item(
        &mut self,
        n: usize,
        name: &str,
        orders_degrees: &[(i32, i32)],
        normalization: Normalization,
        first_track_index: usize,
    ) -> ModelResult<(ObjectRef, PackFormatRef)> {
        let pack = self.add_pack_format(&format!("AP_100{}1001", n), name, TypeDefinition::Hoa)?;

        let object = self.add_object(&format!("AO_100{}", n), name)?;
        self.link_object_pack(object, pack);

        for (i, &(order, degree)) in orders_degrees.iter().enumerate() {
            let block = HoaBlock {
                id: format!("AB_100{}10{:02}_00000001", n, i + 1),
                rtime: None,
                duration: None,
                order: Some(order),
                degree: Some(degree),
                normalization: Some(normalization),
                nfc_ref_dist: None,
                screen_ref: None,
                equation: None,
            };

            let channel = self.add_channel_format(
                &format!("AC_100{}10{:02}", n, i + 1),
                &format!("{}_{}", name, i),
                TypeDefinition::Hoa,
                BlockFormats::Hoa(vec![block]),
            )?;
            self.link_pack_channel(pack, channel);

            let stream = self.add_stream_format(&format!("AS_100{}10{:02}", n, i + 1), name)?;
            let track = self.add_track_format(&format!("AT_100{}10{:02}_01", n, i + 1), name)?;
            self.link_track_stream(track, stream)?;
            self.link_stream_channel(stream, channel);

            let uid = self.add_track_uid(
                &format!("ATU_0000{}{:03}", n, i + 1),
                Some(first_track_index + i),
            )?;
            self.link_track_uid(uid, Some(track), None, Some(pack));
            self.link_object_track_uid(object, Some(uid));
        }

        Ok((object, pack))
    }

    /// Add a default programme and content referencing the given objects.
    pub fn add_default_programme(&mut self, objects: &[ObjectRef]) -> ModelResult<ProgrammeRef> {
        let programme = self.add_programme("APR_1001", "Default", Some(Screen::default_screen()))?;
        let content = self.add_content("ACO_1001", "Default")?;
        self.link_programme_content(programme, content);
        for &object in objects {
            self.link_content_object(content, object);
        }
        Ok(programme)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::ObjectPosition;

    #[test]
    fn test_duplicate_id() {
        let mut b = AdmBuilder::new();
        b.add_object("AO_1001", "a").unwrap();
        assert!(b.add_object("AO_1001", "b").is_err());
    }

    #[test]
    fn test_silent_uid_rejected() {
        let mut b = AdmBuilder::new();
        assert!(b.add_track_uid("ATU_00000000", Some(1)).is_err());
    }

    #[test]
    fn test_mono_chain() {
        let mut b = AdmBuilder::new();
        let block = ObjectsBlock::with_position("AB_10011001_00000001", ObjectPosition::polar(0.0, 0.0, 1.0));
        let object = b.add_objects_item(1, "test", vec![block], 1).unwrap();
        b.add_default_programme(&[object]).unwrap();

        let doc = b.finish();
        assert_eq!(doc.programmes.len(), 1);
        assert_eq!(doc.track_uids.len(), 1);

        let uid = TrackUidRef(0);
        let channel = doc.channel_format_for_track_uid(uid).unwrap();
        assert_eq!(doc.channel_format(channel).name, "test");
    }

    #[test]
    fn test_track_stream_both_directions() {
        let mut b = AdmBuilder::new();
        let s = b.add_stream_format("AS_00011001", "s").unwrap();
        let t = b.add_track_format("AT_00011001_01", "t").unwrap();
        // linking twice (once per direction in the source) is fine
        b.link_track_stream(t, s).unwrap();
        b.link_track_stream(t, s).unwrap();

        let doc = b.finish();
        assert_eq!(doc.track_formats[0].stream_format, Some(s));
        assert_eq!(doc.stream_formats[0].track_formats, vec![t]);
    }
}
