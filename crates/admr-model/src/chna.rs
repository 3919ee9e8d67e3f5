//! CHNA table model
//!
//! The CHNA chunk binds 1-based wave track indices to audioTrackUID,
//! audioTrackFormat and audioPackFormat IDs. The byte layout lives in the
//! file layer; this module applies a decoded table to a document.

use crate::document::{AdmDocument, ElementRef};
use crate::error::{ModelError, ModelResult};

/// One row of the CHNA table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChnaEntry {
    /// 1-based index of the wave track
    pub track_index: usize,
    /// e.g. `ATU_00000001`
    pub track_uid_id: String,
    /// e.g. `AT_00010001_01`
    pub track_format_id: String,
    /// e.g. `AP_00010002`; empty when not given
    pub pack_format_id: String,
}

/// A decoded CHNA table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChnaTable {
    pub entries: Vec<ChnaEntry>,
}

impl ChnaTable {
    /// Apply track indices and references from the table to the matching
    /// audioTrackUIDs in the document.
    ///
    /// `ATU_00000000` is reserved for silent tracks and must not appear as a
    /// real binding.
    pub fn apply(&self, doc: &mut AdmDocument) -> ModelResult<()> {
        for entry in &self.entries {
            if entry.track_uid_id == "ATU_00000000" {
                return Err(ModelError::Reference(
                    "ATU_00000000 is reserved for silent tracks and cannot appear in CHNA".into(),
                ));
            }

            let uid = match doc.lookup(&entry.track_uid_id) {
                Some(ElementRef::TrackUid(r)) => r,
                Some(_) => {
                    return Err(ModelError::Reference(format!(
                        "CHNA entry {} does not name an audioTrackUID",
                        entry.track_uid_id
                    )))
                }
                None => {
                    return Err(ModelError::Reference(format!(
                        "CHNA references unknown audioTrackUID {}",
                        entry.track_uid_id
                    )))
                }
            };

            let track_format = match doc.lookup(&entry.track_format_id) {
                Some(ElementRef::TrackFormat(r)) => Some(r),
                Some(ElementRef::ChannelFormat(r)) => {
                    // BS.2076-2 CHNA rows may name a channelFormat directly
                    doc.track_uids[uid.index()].channel_format = Some(r);
                    None
                }
                Some(_) => {
                    return Err(ModelError::Reference(format!(
                        "CHNA entry {} does not name an audioTrackFormat",
                        entry.track_format_id
                    )))
                }
                None => {
                    return Err(ModelError::Reference(format!(
                        "CHNA references unknown audioTrackFormat {}",
                        entry.track_format_id
                    )))
                }
            };

            let pack_format = if entry.pack_format_id.is_empty() {
                None
            } else {
                match doc.lookup(&entry.pack_format_id) {
                    Some(ElementRef::PackFormat(r)) => Some(r),
                    _ => {
                        return Err(ModelError::Reference(format!(
                            "CHNA references unknown audioPackFormat {}",
                            entry.pack_format_id
                        )))
                    }
                }
            };

            let u = &mut doc.track_uids[uid.index()];
            u.track_index = Some(entry.track_index);
            if track_format.is_some() {
                u.track_format = track_format;
            }
            if pack_format.is_some() {
                u.pack_format = pack_format;
            }
        }

        Ok(())
    }

    /// Build the table from a document's trackUIDs.
    pub fn from_document(doc: &AdmDocument) -> ModelResult<ChnaTable> {
        let mut entries = Vec::new();

        for uid in &doc.track_uids {
            let track_index = uid.track_index.ok_or_else(|| {
                ModelError::Reference(format!("audioTrackUID {} has no track index", uid.id))
            })?;

            let track_format_id = match (uid.track_format, uid.channel_format) {
                (Some(t), _) => doc.track_format(t).id.clone(),
                (None, Some(c)) => doc.channel_format(c).id.clone(),
                (None, None) => {
                    return Err(ModelError::Reference(format!(
                        "audioTrackUID {} has no format reference",
                        uid.id
                    )))
                }
            };

            entries.push(ChnaEntry {
                track_index,
                track_uid_id: uid.id.clone(),
                track_format_id,
                pack_format_id: uid
                    .pack_format
                    .map(|p| doc.pack_format(p).id.clone())
                    .unwrap_or_default(),
            });
        }

        Ok(ChnaTable { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{BlockFormats, ObjectPosition, ObjectsBlock};
    use crate::builder::AdmBuilder;

    fn simple_doc() -> AdmDocument {
        let mut b = AdmBuilder::new();
        let block = ObjectsBlock::with_position("AB_1", ObjectPosition::polar(0.0, 0.0, 1.0));
        let object = b.add_objects_item(1, "test", vec![block], 1).unwrap();
        b.add_default_programme(&[object]).unwrap();
        b.finish()
    }

    #[test]
    fn test_round_trip() {
        let mut doc = simple_doc();
        let table = ChnaTable::from_document(&doc).unwrap();
        assert_eq!(table.entries.len(), 1);
        assert_eq!(table.entries[0].track_index, 1);
        assert_eq!(table.entries[0].track_uid_id, "ATU_00001001");

        // applying the table back is a no-op
        let before = doc.track_uids.clone();
        table.apply(&mut doc).unwrap();
        assert_eq!(doc.track_uids.len(), before.len());
        assert_eq!(doc.track_uids[0].track_index, Some(1));
    }

    #[test]
    fn test_zero_uid_rejected() {
        let mut doc = simple_doc();
        let table = ChnaTable {
            entries: vec![ChnaEntry {
                track_index: 1,
                track_uid_id: "ATU_00000000".into(),
                track_format_id: "AT_10011001_01".into(),
                pack_format_id: String::new(),
            }],
        };
        assert!(table.apply(&mut doc).is_err());
    }

    #[test]
    fn test_unknown_uid_rejected() {
        let mut doc = simple_doc();
        let table = ChnaTable {
            entries: vec![ChnaEntry {
                track_index: 1,
                track_uid_id: "ATU_0000dead".into(),
                track_format_id: "AT_10011001_01".into(),
                pack_format_id: String::new(),
            }],
        };
        assert!(table.apply(&mut doc).is_err());
    }
}
