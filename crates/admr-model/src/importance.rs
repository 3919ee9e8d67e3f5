//! Importance-based filtering of rendering items
//!
//! Items can be dropped entirely based on audioObject or audioPackFormat
//! importance; block formats below the threshold are muted rather than
//! dropped, so that timing is preserved.

use crate::items::RenderingItem;

fn keep(importance: Option<i32>, threshold: i32) -> bool {
    importance.map_or(true, |i| i >= threshold)
}

/// Apply importance handling with the given threshold: drop items whose
/// audioObject or audioPackFormat importance is below it, and mute Objects
/// block formats below it.
pub fn filter_by_importance(
    items: Vec<RenderingItem>,
    threshold: i32,
) -> Vec<RenderingItem> {
    items
        .into_iter()
        .filter(|item| match item {
            RenderingItem::Hoa(item) => item.importances.iter().any(|i| {
                keep(i.audio_object, threshold) && keep(i.audio_pack_format, threshold)
            }),
            RenderingItem::Objects(item) => {
                keep(item.importance.audio_object, threshold)
                    && keep(item.importance.audio_pack_format, threshold)
            }
            RenderingItem::DirectSpeakers(item) => {
                keep(item.importance.audio_object, threshold)
                    && keep(item.importance.audio_pack_format, threshold)
            }
        })
        .map(|item| match item {
            RenderingItem::Objects(mut item) => {
                item.metadata_source = item.metadata_source.map_blocks(|mut block| {
                    if block.block_format.importance < threshold {
                        block.block_format.gain = 0.0;
                    }
                    block
                });
                RenderingItem::Objects(item)
            }
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{ObjectPosition, ObjectsBlock};
    use crate::items::{
        AdmPath, ExtraData, ImportanceData, MetadataSource, ObjectRenderingItem,
        ObjectTypeMetadata, TrackSpec,
    };

    fn item(object_importance: Option<i32>, block_importance: i32) -> RenderingItem {
        let mut block = ObjectsBlock::with_position("AB_1", ObjectPosition::polar(0.0, 0.0, 1.0));
        block.importance = block_importance;

        RenderingItem::Objects(ObjectRenderingItem {
            track_spec: TrackSpec::Direct(0),
            metadata_source: MetadataSource::new(vec![ObjectTypeMetadata {
                block_format: block,
                extra_data: ExtraData::default(),
            }]),
            importance: ImportanceData {
                audio_object: object_importance,
                audio_pack_format: None,
            },
            adm_path: AdmPath::default(),
        })
    }

    #[test]
    fn test_object_importance_drops_item() {
        let items = filter_by_importance(vec![item(Some(4), 10), item(Some(6), 10)], 5);
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_no_importance_is_kept() {
        let items = filter_by_importance(vec![item(None, 10)], 10);
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_block_importance_mutes() {
        let items = filter_by_importance(vec![item(None, 3)], 5);
        let RenderingItem::Objects(item) = &items[0] else { panic!() };
        assert_eq!(item.metadata_source.blocks()[0].block_format.gain, 0.0);
    }
}
