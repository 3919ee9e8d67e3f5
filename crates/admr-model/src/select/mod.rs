//! Rendering item selection
//!
//! Walks the reference graph from a selected audioProgramme (or from the
//! audioObjects / CHNA table when the upper structure is absent), allocates
//! audioTrackUIDs to channels within pack formats, and emits one rendering
//! item per channel (per pack for HOA), binding a `TrackSpec` to a typed
//! metadata source.

pub mod allocation;
pub mod hoa;
pub mod matrix;

use admr_core::{Screen, Warnings};

use crate::blocks::BlockFormats;
use crate::document::AdmDocument;
use crate::elements::{
    ChannelFormatRef, ContentRef, ObjectRef, PackFormatRef, ProgrammeRef, TrackUidRef,
    TypeDefinition,
};
use crate::error::{ModelError, ModelResult};
use crate::items::{
    AdmPath, DirectSpeakersRenderingItem, DirectSpeakersTypeMetadata, ExtraData,
    HoaRenderingItem, HoaTypeMetadata, ImportanceData, MetadataSource, ObjectRenderingItem,
    ObjectTypeMetadata, RenderingItem, TrackSpec,
};
use crate::validate::validate_structure;

use allocation::{
    allocate_packs, AllocatedPack, AllocationChannel, AllocationPack, AllocationTrack, Slot,
};

/// Common-definitions packs corresponding to BS.2051 layouts, used to enable
/// the DirectSpeakers mapping rules.
const ITU_PACKS: &[(&str, &str)] = &[
    ("AP_00010001", "0+1+0"),
    ("AP_00010002", "0+2+0"),
    ("AP_0001000c", "0+5+0"),
    ("AP_00010003", "0+5+0"),
    ("AP_00010004", "2+5+0"),
    ("AP_00010005", "4+5+0"),
    ("AP_00010010", "4+5+1"),
    ("AP_00010007", "3+7+0"),
    ("AP_00010008", "4+9+0"),
    ("AP_00010009", "9+10+3"),
    ("AP_0001000f", "0+7+0"),
    ("AP_00010017", "4+7+0"),
];

/// Options controlling item selection.
#[derive(Debug, Clone, Default)]
pub struct SelectionOptions {
    /// audioProgramme ID to select; default is the one with the lowest ID
    pub programme_id: Option<String>,
    /// audioObject IDs to select from complementary object groups
    pub complementary_object_ids: Vec<String>,
}

/// Select rendering items from an ADM document.
pub fn select_rendering_items(
    doc: &AdmDocument,
    options: &SelectionOptions,
    warnings: &mut Warnings,
) -> ModelResult<Vec<RenderingItem>> {
    validate_structure(doc)?;

    let packs = build_allocation_packs(doc)?;
    let ignored = select_complementary_objects(doc, options)?;

    let mut items = Vec::new();

    if doc.programmes.is_empty() && doc.objects.is_empty() {
        // CHNA-only: allocate all tracks with no pack references
        let context = Context::default();
        emit_for_tracks(doc, &packs, &context, doc.track_uid_refs().collect(), None, 0, &mut items)?;
        return Ok(items);
    }

    let programme = select_programme(doc, options, warnings)?;

    let object_paths: Vec<(Context, Vec<ObjectRef>)> = match programme {
        Some(programme) => {
            let mut paths = Vec::new();
            for &content in &doc.programme(programme).contents {
                for root in &doc.content(content).objects {
                    collect_object_paths(doc, *root, &mut |path| {
                        paths.push((
                            Context {
                                programme: Some(programme),
                                content: Some(content),
                                object_path: Vec::new(),
                            },
                            path,
                        ))
                    });
                }
            }
            paths
        }
        None => {
            let mut paths = Vec::new();
            for root in doc.root_objects() {
                collect_object_paths(doc, root, &mut |path| {
                    paths.push((Context::default(), path))
                });
            }
            paths
        }
    };

    for (context, path) in object_paths {
        // prune complementary objects that were not selected, and objects
        // marked disabled
        if path.iter().any(|o| ignored.contains(o)) {
            continue;
        }
        if path.iter().any(|&o| doc.object(o).disabled) {
            continue;
        }

        let object = *path.last().expect("paths are never empty");
        let context = Context {
            object_path: path.clone(),
            ..context
        };

        let real_tracks: Vec<TrackUidRef> = doc
            .object(object)
            .track_uids
            .iter()
            .filter_map(|t| *t)
            .collect();
        let num_silent = doc.object(object).track_uids.len() - real_tracks.len();

        emit_for_tracks(
            doc,
            &packs,
            &context,
            real_tracks,
            Some(&doc.object(object).pack_formats),
            num_silent,
            &mut items,
        )?;
    }

    Ok(items)
}

/// The programme/content/object selection leading to an allocation.
#[derive(Debug, Clone, Default)]
struct Context {
    programme: Option<ProgrammeRef>,
    content: Option<ContentRef>,
    object_path: Vec<ObjectRef>,
}

fn select_programme(
    doc: &AdmDocument,
    options: &SelectionOptions,
    warnings: &mut Warnings,
) -> ModelResult<Option<ProgrammeRef>> {
    if let Some(id) = &options.programme_id {
        return Ok(Some(doc.lookup_programme(id)?));
    }

    if doc.programmes.is_empty() {
        return Ok(None);
    }

    if doc.programmes.len() > 1 {
        warnings.warn("more than one audioProgramme; selecting the one with the lowest ID");
    }

    Ok(doc
        .programme_refs()
        .min_by(|&a, &b| doc.programme(a).id.cmp(&doc.programme(b).id)))
}

fn select_complementary_objects(
    doc: &AdmDocument,
    options: &SelectionOptions,
) -> ModelResult<Vec<ObjectRef>> {
    let selected: Vec<ObjectRef> = options
        .complementary_object_ids
        .iter()
        .map(|id| doc.lookup_object(id))
        .collect::<ModelResult<_>>()?;

    let roots: Vec<ObjectRef> = doc
        .object_refs()
        .filter(|&o| !doc.object(o).complementary_objects.is_empty())
        .collect();

    let group_of = |root: ObjectRef| -> Vec<ObjectRef> {
        let mut group = vec![root];
        group.extend(&doc.object(root).complementary_objects);
        group
    };

    // selected objects must belong to some complementary group
    for &s in &selected {
        let in_group = roots.iter().any(|&root| group_of(root).contains(&s));
        if !in_group {
            return Err(ModelError::Reference(format!(
                "selected audioObject {} is not part of any complementary audioObject group",
                doc.object(s).id
            )));
        }
    }

    let mut ignored = Vec::new();
    for &root in &roots {
        let group = group_of(root);
        let explicit: Vec<ObjectRef> = group
            .iter()
            .copied()
            .filter(|o| selected.contains(o))
            .collect();

        if explicit.len() > 1 {
            return Err(ModelError::Reference(format!(
                "multiple audioObjects selected from complementary object group '{}'",
                doc.object(root).id
            )));
        }

        // default to the root object when no member was selected
        let keep = explicit.first().copied().unwrap_or(root);
        ignored.extend(group.into_iter().filter(|&o| o != keep));
    }

    Ok(ignored)
}

/// All paths through the audioObject nesting starting at `root`.
fn collect_object_paths(
    doc: &AdmDocument,
    root: ObjectRef,
    emit: &mut impl FnMut(Vec<ObjectRef>),
) {
    fn walk(
        doc: &AdmDocument,
        path: &mut Vec<ObjectRef>,
        emit: &mut impl FnMut(Vec<ObjectRef>),
    ) {
        emit(path.clone());
        let last = *path.last().expect("paths are never empty");
        for &sub in &doc.object(last).objects {
            path.push(sub);
            walk(doc, path, emit);
            path.pop();
        }
    }

    let mut path = vec![root];
    walk(doc, &mut path, emit);
}

/// All paths through the nested pack structure starting at `root`; each path
/// contributes the channels directly on its last pack.
fn pack_format_paths_from(doc: &AdmDocument, root: PackFormatRef) -> Vec<Vec<PackFormatRef>> {
    fn walk(
        doc: &AdmDocument,
        path: &mut Vec<PackFormatRef>,
        out: &mut Vec<Vec<PackFormatRef>>,
    ) {
        out.push(path.clone());
        let last = *path.last().expect("paths are never empty");
        for &sub in &doc.pack_format(last).pack_formats {
            path.push(sub);
            walk(doc, path, out);
            path.pop();
        }
    }

    let mut out = Vec::new();
    let mut path = vec![root];
    walk(doc, &mut path, &mut out);
    out
}

/// The path from a root pack to the pack directly containing a channel.
fn pack_format_path_to(
    doc: &AdmDocument,
    root: PackFormatRef,
    channel: ChannelFormatRef,
) -> Vec<PackFormatRef> {
    pack_format_paths_from(doc, root)
        .into_iter()
        .find(|path| {
            doc.pack_format(*path.last().unwrap())
                .channel_formats
                .contains(&channel)
        })
        .unwrap_or_else(|| vec![root])
}

/// How the channels of a wrapped pack relate to the items to be emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PackKind {
    Regular,
    Matrix,
}

struct WrappedPack {
    alloc: AllocationPack,
    kind: PackKind,
}

fn channels_of_paths(doc: &AdmDocument, root: PackFormatRef) -> Vec<AllocationChannel> {
    pack_format_paths_from(doc, root)
        .into_iter()
        .flat_map(|path| {
            let last = *path.last().unwrap();
            doc.pack_format(last)
                .channel_formats
                .iter()
                .map(move |&channel_format| AllocationChannel {
                    channel_format,
                    pack_formats: path.clone(),
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Wrap every pack in the document in the allocation patterns it can be
/// referenced through. Matrix packs contribute several patterns, one per
/// reference structure.
fn build_allocation_packs(doc: &AdmDocument) -> ModelResult<Vec<WrappedPack>> {
    let mut packs = Vec::new();

    for pack in doc.pack_format_refs() {
        if doc.pack_format(pack).type_def != TypeDefinition::Matrix {
            packs.push(WrappedPack {
                alloc: AllocationPack {
                    root_pack: pack,
                    channels: channels_of_paths(doc, pack),
                },
                kind: PackKind::Regular,
            });
            continue;
        }

        let matrix_type = matrix::type_of(doc, pack)?;

        if matches!(matrix_type, matrix::MatrixType::Direct | matrix::MatrixType::Decode) {
            // direct/decode use: tracks reference the matrix pack and the
            // channels of its input (or encode) pack
            let input_pack = matrix::input_pack_format(doc, pack)?;
            let input_channels: Vec<AllocationChannel> = channels_of_paths(doc, input_pack)
                .into_iter()
                .map(|c| AllocationChannel {
                    channel_format: c.channel_format,
                    pack_formats: vec![pack],
                })
                .collect();

            packs.push(WrappedPack {
                alloc: AllocationPack { root_pack: pack, channels: input_channels },
                kind: PackKind::Matrix,
            });

            // pre-applied use: tracks reference the matrix pack and its own
            // channels
            packs.push(WrappedPack {
                alloc: AllocationPack {
                    root_pack: pack,
                    channels: channels_of_paths(doc, pack),
                },
                kind: PackKind::Matrix,
            });
        }

        if matrix_type == matrix::MatrixType::Decode {
            // encode-then-decode use: tracks reference the encode pack and
            // the channels of its input pack
            let encode_pack = matrix::input_pack_format(doc, pack)?;
            let encode_input = matrix::input_pack_format(doc, encode_pack)?;

            let input_channels: Vec<AllocationChannel> = channels_of_paths(doc, encode_input)
                .into_iter()
                .map(|c| AllocationChannel {
                    channel_format: c.channel_format,
                    pack_formats: vec![encode_pack],
                })
                .collect();

            packs.push(WrappedPack {
                alloc: AllocationPack { root_pack: pack, channels: input_channels },
                kind: PackKind::Matrix,
            });
        }
    }

    Ok(packs)
}

/// Diagnostics to attach to an allocation failure.
fn possible_reference_errors(
    doc: &AdmDocument,
    tracks: &[AllocationTrack],
    pack_refs: Option<&[PackFormatRef]>,
) -> Vec<String> {
    let mut errors = Vec::new();

    for track in tracks {
        let uid = doc.track_uid(track.track_uid);
        match track.pack_format {
            None => errors.push(format!("audioTrackUID {} has no audioPackFormat reference", uid.id)),
            Some(pack) => {
                let pack = doc.pack_format(pack);
                let channel = doc.channel_format(track.channel_format);
                if pack.type_def != channel.type_def {
                    errors.push(format!(
                        "audioTrackUID {} references audioPackFormat {} of type {} but audioChannelFormat {} of type {}",
                        uid.id,
                        pack.id,
                        pack.type_def.name(),
                        channel.id,
                        channel.type_def.name(),
                    ));
                }
            }
        }
    }

    if let Some(refs) = pack_refs {
        let total_channels: usize = refs
            .iter()
            .map(|&p| channels_of_paths(doc, p).len())
            .sum();
        if total_channels != tracks.len() {
            errors.push(format!(
                "referenced audioPackFormats have {} channels but {} tracks are referenced",
                total_channels,
                tracks.len()
            ));
        }
    }

    errors
}

#[allow(clippy::too_many_arguments)]
fn emit_for_tracks(
    doc: &AdmDocument,
    packs: &[WrappedPack],
    context: &Context,
    track_uids: Vec<TrackUidRef>,
    pack_refs: Option<&[PackFormatRef]>,
    num_silent: usize,
    items: &mut Vec<RenderingItem>,
) -> ModelResult<()> {
    let tracks: Vec<AllocationTrack> = track_uids
        .iter()
        .map(|&uid| {
            Ok(AllocationTrack {
                channel_format: doc.channel_format_for_track_uid(uid)?,
                pack_format: doc.track_uid(uid).pack_format,
                track_uid: uid,
            })
        })
        .collect::<ModelResult<_>>()?;

    let alloc_packs: Vec<AllocationPack> = packs.iter().map(|p| p.alloc.clone()).collect();
    let mut solutions = allocate_packs(&alloc_packs, &tracks, pack_refs, num_silent, 2);

    let location = match context.object_path.last() {
        Some(&o) => format!("audioObject {}", doc.object(o).id),
        None => "CHNA".to_owned(),
    };

    if solutions.len() != 1 {
        return Err(ModelError::FormatRef {
            message: format!(
                "{} format references found in {}",
                if solutions.is_empty() { "conflicting" } else { "ambiguous" },
                location,
            ),
            possible_errors: possible_reference_errors(doc, &tracks, pack_refs),
        });
    }

    for allocated in solutions.remove(0) {
        emit_for_pack(doc, packs, context, &tracks, &allocated, items)?;
    }

    Ok(())
}

fn track_spec_for_slot(doc: &AdmDocument, tracks: &[AllocationTrack], slot: Slot) -> ModelResult<TrackSpec> {
    match slot {
        Slot::Silent => Ok(TrackSpec::Silent),
        Slot::Track(i) => {
            let uid = doc.track_uid(tracks[i].track_uid);
            let index = uid.track_index.ok_or_else(|| {
                ModelError::Reference(format!(
                    "audioTrackUID {} has no track index; is it missing from the CHNA chunk?",
                    uid.id
                ))
            })?;
            if index == 0 {
                return Err(ModelError::Reference(format!(
                    "audioTrackUID {} has track index 0; indices are 1-based",
                    uid.id
                )));
            }
            Ok(TrackSpec::Direct(index - 1))
        }
        Slot::Empty => unreachable!("complete solutions have no empty slots"),
    }
}

fn emit_for_pack(
    doc: &AdmDocument,
    packs: &[WrappedPack],
    context: &Context,
    tracks: &[AllocationTrack],
    allocated: &AllocatedPack,
    items: &mut Vec<RenderingItem>,
) -> ModelResult<()> {
    let wrapped = &packs[allocated.pack];

    let input_allocation: Vec<(ChannelFormatRef, TrackSpec)> = wrapped
        .alloc
        .channels
        .iter()
        .zip(&allocated.slots)
        .map(|(channel, &slot)| {
            Ok((channel.channel_format, track_spec_for_slot(doc, tracks, slot)?))
        })
        .collect::<ModelResult<_>>()?;

    let (output_pack, channel_allocation) = match wrapped.kind {
        PackKind::Regular => (wrapped.alloc.root_pack, input_allocation),
        PackKind::Matrix => {
            let output_pack = doc
                .pack_format(wrapped.alloc.root_pack)
                .output_pack_format
                .expect("matrix wrapped packs have an output pack");
            (
                output_pack,
                matrix::output_channel_allocation(doc, wrapped.alloc.root_pack, &input_allocation)?,
            )
        }
    };

    match doc.pack_format(output_pack).type_def {
        TypeDefinition::Objects => {
            for (channel, track_spec) in channel_allocation {
                items.push(RenderingItem::Objects(objects_item(
                    doc, context, output_pack, channel, track_spec,
                )?));
            }
        }
        TypeDefinition::DirectSpeakers => {
            for (channel, track_spec) in channel_allocation {
                items.push(RenderingItem::DirectSpeakers(direct_speakers_item(
                    doc, context, output_pack, channel, track_spec,
                )?));
            }
        }
        TypeDefinition::Hoa => {
            items.push(RenderingItem::Hoa(hoa_item(
                doc, context, output_pack, channel_allocation,
            )?));
        }
        TypeDefinition::Matrix => {
            return Err(ModelError::Validation(format!(
                "matrix audioPackFormat {} cannot be an output pack",
                doc.pack_format(output_pack).id
            )))
        }
        TypeDefinition::Binaural => {
            return Err(ModelError::Validation(
                "Binaural content cannot be rendered to loudspeakers".into(),
            ))
        }
    }

    Ok(())
}

fn extra_data(doc: &AdmDocument, context: &Context, channel: ChannelFormatRef) -> ExtraData {
    let object = context.object_path.last().map(|&o| doc.object(o));

    ExtraData {
        object_start: object.and_then(|o| o.start),
        object_duration: object.and_then(|o| o.duration),
        reference_screen: match context.programme {
            Some(p) => doc.programme(p).reference_screen,
            None => Some(Screen::default_screen()),
        },
        channel_frequency: doc.channel_format(channel).frequency,
    }
}

fn importance_data(
    doc: &AdmDocument,
    context: &Context,
    pack_path: &[PackFormatRef],
) -> ImportanceData {
    // no importance value means maximum importance; the minimum along each
    // path wins
    let object_importance = context
        .object_path
        .iter()
        .filter_map(|&o| doc.object(o).importance)
        .min();
    let pack_importance = pack_path
        .iter()
        .filter_map(|&p| doc.pack_format(p).importance)
        .min();

    ImportanceData {
        audio_object: if context.object_path.is_empty() { None } else { object_importance },
        audio_pack_format: pack_importance,
    }
}

fn adm_path(
    doc: &AdmDocument,
    context: &Context,
    pack_path: &[PackFormatRef],
    channel: ChannelFormatRef,
) -> AdmPath {
    AdmPath {
        programme_id: context.programme.map(|p| doc.programme(p).id.clone()),
        content_id: context.content.map(|c| doc.content(c).id.clone()),
        object_ids: context
            .object_path
            .iter()
            .map(|&o| doc.object(o).id.clone())
            .collect(),
        pack_format_ids: pack_path
            .iter()
            .map(|&p| doc.pack_format(p).id.clone())
            .collect(),
        channel_format_id: Some(doc.channel_format(channel).id.clone()),
    }
}

fn objects_item(
    doc: &AdmDocument,
    context: &Context,
    output_pack: PackFormatRef,
    channel: ChannelFormatRef,
    track_spec: TrackSpec,
) -> ModelResult<ObjectRenderingItem> {
    let pack_path = pack_format_path_to(doc, output_pack, channel);
    let extra = extra_data(doc, context, channel);

    let BlockFormats::Objects(blocks) = &doc.channel_format(channel).blocks else {
        return Err(ModelError::Validation(format!(
            "audioChannelFormat {} in an Objects pack has non-Objects blocks",
            doc.channel_format(channel).id
        )));
    };

    Ok(ObjectRenderingItem {
        track_spec,
        metadata_source: MetadataSource::new(
            blocks
                .iter()
                .map(|block| ObjectTypeMetadata {
                    block_format: block.clone(),
                    extra_data: extra.clone(),
                })
                .collect(),
        ),
        importance: importance_data(doc, context, &pack_path),
        adm_path: adm_path(doc, context, &pack_path, channel),
    })
}

fn direct_speakers_item(
    doc: &AdmDocument,
    context: &Context,
    output_pack: PackFormatRef,
    channel: ChannelFormatRef,
    track_spec: TrackSpec,
) -> ModelResult<DirectSpeakersRenderingItem> {
    let pack_path = pack_format_path_to(doc, output_pack, channel);
    let extra = extra_data(doc, context, channel);

    // the innermost common-definitions pack enables the ITU mapping rules
    let itu_pack_layout = pack_path.last().and_then(|&p| {
        let pack = doc.pack_format(p);
        if !pack.is_common_definition {
            return None;
        }
        ITU_PACKS
            .iter()
            .find(|(id, _)| *id == pack.id)
            .map(|(_, layout)| (*layout).to_owned())
    });

    let BlockFormats::DirectSpeakers(blocks) = &doc.channel_format(channel).blocks else {
        return Err(ModelError::Validation(format!(
            "audioChannelFormat {} in a DirectSpeakers pack has non-DirectSpeakers blocks",
            doc.channel_format(channel).id
        )));
    };

    Ok(DirectSpeakersRenderingItem {
        track_spec,
        metadata_source: MetadataSource::new(
            blocks
                .iter()
                .map(|block| DirectSpeakersTypeMetadata {
                    block_format: block.clone(),
                    itu_pack_layout: itu_pack_layout.clone(),
                    extra_data: extra.clone(),
                })
                .collect(),
        ),
        importance: importance_data(doc, context, &pack_path),
        adm_path: adm_path(doc, context, &pack_path, channel),
    })
}

fn hoa_item(
    doc: &AdmDocument,
    context: &Context,
    output_pack: PackFormatRef,
    channel_allocation: Vec<(ChannelFormatRef, TrackSpec)>,
) -> ModelResult<HoaRenderingItem> {
    if channel_allocation.is_empty() {
        return Err(ModelError::Validation(format!(
            "HOA audioPackFormat {} has no channels",
            doc.pack_format(output_pack).id
        )));
    }

    let pack_paths: Vec<Vec<PackFormatRef>> = channel_allocation
        .iter()
        .map(|(channel, _)| pack_format_path_to(doc, output_pack, *channel))
        .collect();

    let path_channels: Vec<hoa::PackPathChannel> = channel_allocation
        .iter()
        .zip(&pack_paths)
        .map(|((channel, _), path)| (path.as_slice(), *channel))
        .collect();

    let (orders, degrees) = hoa::get_orders_degrees(doc, &path_channels)?;

    let type_metadata = HoaTypeMetadata {
        rtime: hoa::get_rtime(doc, &path_channels)?,
        duration: hoa::get_duration(doc, &path_channels)?,
        orders,
        degrees,
        normalization: hoa::get_normalization(doc, &path_channels)?,
        nfc_ref_dist: hoa::get_nfc_ref_dist(doc, &path_channels)?,
        screen_ref: hoa::get_screen_ref(doc, &path_channels)?,
        extra_data: extra_data(doc, context, channel_allocation[0].0),
    };

    Ok(HoaRenderingItem {
        track_specs: channel_allocation.iter().map(|(_, t)| t.clone()).collect(),
        metadata_source: MetadataSource::new(vec![type_metadata]),
        importances: channel_allocation
            .iter()
            .zip(&pack_paths)
            .map(|(_, path)| importance_data(doc, context, path))
            .collect(),
        adm_paths: channel_allocation
            .iter()
            .zip(&pack_paths)
            .map(|((channel, _), path)| adm_path(doc, context, path, *channel))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{
        BlockFormats, DirectSpeakerPosition, DirectSpeakersBlock, MatrixBlock,
        MatrixCoefficient, ObjectPosition, ObjectsBlock,
    };
    use crate::builder::AdmBuilder;

    fn objects_doc() -> AdmDocument {
        let mut b = AdmBuilder::new();
        let block = ObjectsBlock::with_position("AB_1", ObjectPosition::polar(30.0, 0.0, 1.0));
        let object = b.add_objects_item(1, "test", vec![block], 1).unwrap();
        b.add_default_programme(&[object]).unwrap();
        b.finish()
    }

    #[test]
    fn test_select_objects() {
        let doc = objects_doc();
        let mut warnings = Warnings::new();
        let items =
            select_rendering_items(&doc, &SelectionOptions::default(), &mut warnings).unwrap();

        assert_eq!(items.len(), 1);
        let RenderingItem::Objects(item) = &items[0] else {
            panic!("expected an Objects item")
        };
        assert_eq!(item.track_spec, TrackSpec::Direct(0));
        assert_eq!(item.metadata_source.blocks().len(), 1);
        assert_eq!(
            item.adm_path.display(),
            "APR_1001 -> ACO_1001 -> AO_1001 -> AP_10011001 -> AC_10011001"
        );
    }

    #[test]
    fn test_selection_deterministic() {
        let doc = objects_doc();
        let mut w1 = Warnings::new();
        let mut w2 = Warnings::new();
        let a = select_rendering_items(&doc, &SelectionOptions::default(), &mut w1).unwrap();
        let b = select_rendering_items(&doc, &SelectionOptions::default(), &mut w2).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_silent_track() {
        // a mono Objects pack fed from a single silent track reference
        let mut b = AdmBuilder::new();
        let pack = b.add_pack_format("AP_10021001", "st", TypeDefinition::Objects).unwrap();
        let block = ObjectsBlock::with_position("AB_2", ObjectPosition::polar(0.0, 0.0, 1.0));
        let channel = b
            .add_channel_format(
                "AC_10021001",
                "c2",
                TypeDefinition::Objects,
                BlockFormats::Objects(vec![block]),
            )
            .unwrap();
        b.link_pack_channel(pack, channel);
        let object = b.add_object("AO_2001", "with silent").unwrap();
        b.link_object_pack(object, pack);
        b.link_object_track_uid(object, None);
        b.add_default_programme(&[object]).unwrap();

        let doc = b.finish();
        let mut warnings = Warnings::new();
        let items =
            select_rendering_items(&doc, &SelectionOptions::default(), &mut warnings).unwrap();

        assert_eq!(items.len(), 1);
        let RenderingItem::Objects(item) = &items[0] else {
            panic!("expected an Objects item")
        };
        assert_eq!(item.track_spec, TrackSpec::Silent);
    }

    #[test]
    fn test_complementary_default_and_selected() {
        let mut b = AdmBuilder::new();
        let block1 = ObjectsBlock::with_position("AB_1", ObjectPosition::polar(0.0, 0.0, 1.0));
        let o1 = b.add_objects_item(1, "english", vec![block1], 1).unwrap();
        let block2 = ObjectsBlock::with_position("AB_2", ObjectPosition::polar(0.0, 0.0, 1.0));
        let o2 = b.add_objects_item(2, "german", vec![block2], 2).unwrap();
        b.link_complementary_object(o1, o2);
        // both objects are reachable from the content; complementary
        // selection decides which one renders
        b.add_default_programme(&[o1, o2]).unwrap();
        let doc = b.finish();

        // default: the root of the group is selected
        let mut warnings = Warnings::new();
        let items =
            select_rendering_items(&doc, &SelectionOptions::default(), &mut warnings).unwrap();
        assert_eq!(items.len(), 1);
        let RenderingItem::Objects(item) = &items[0] else { panic!() };
        assert_eq!(item.track_spec, TrackSpec::Direct(0));

        // selecting the alternative switches the rendered object
        let options = SelectionOptions {
            complementary_object_ids: vec!["AO_1002".into()],
            ..Default::default()
        };
        let items = select_rendering_items(&doc, &options, &mut warnings).unwrap();
        assert_eq!(items.len(), 1);
        let RenderingItem::Objects(item) = &items[0] else { panic!() };
        assert_eq!(item.track_spec, TrackSpec::Direct(1));
    }

    #[test]
    fn test_disabled_object_pruned() {
        let mut b = AdmBuilder::new();
        let block = ObjectsBlock::with_position("AB_1", ObjectPosition::polar(0.0, 0.0, 1.0));
        let object = b.add_objects_item(1, "test", vec![block], 1).unwrap();
        b.object_mut(object).disabled = true;
        b.add_default_programme(&[object]).unwrap();

        let doc = b.finish();
        let mut warnings = Warnings::new();
        let items =
            select_rendering_items(&doc, &SelectionOptions::default(), &mut warnings).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_chna_only() {
        let mut b = AdmBuilder::new();
        let block = DirectSpeakersBlock {
            id: "AB_1".into(),
            rtime: None,
            duration: None,
            position: DirectSpeakerPosition::polar(30.0, 0.0),
            speaker_labels: vec!["M+030".into()],
        };
        // chain without an object or programme
        let pack = b
            .add_pack_format("AP_00011001", "p", TypeDefinition::DirectSpeakers)
            .unwrap();
        let channel = b
            .add_channel_format(
                "AC_00011001",
                "c",
                TypeDefinition::DirectSpeakers,
                BlockFormats::DirectSpeakers(vec![block]),
            )
            .unwrap();
        b.link_pack_channel(pack, channel);
        let stream = b.add_stream_format("AS_00011001", "s").unwrap();
        let track = b.add_track_format("AT_00011001_01", "t").unwrap();
        b.link_track_stream(track, stream).unwrap();
        b.link_stream_channel(stream, channel);
        let uid = b.add_track_uid("ATU_00000001", Some(1)).unwrap();
        b.link_track_uid(uid, Some(track), None, Some(pack));

        let doc = b.finish();
        let mut warnings = Warnings::new();
        let items =
            select_rendering_items(&doc, &SelectionOptions::default(), &mut warnings).unwrap();

        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], RenderingItem::DirectSpeakers(_)));
    }

    #[test]
    fn test_matrix_direct() {
        // a 2-channel direct matrix: output channels are mid/side over a
        // stereo DirectSpeakers input
        let mut b = AdmBuilder::new();

        // input pack: stereo DirectSpeakers
        let in_pack = b
            .add_pack_format("AP_00011001", "stereo", TypeDefinition::DirectSpeakers)
            .unwrap();
        let mut in_channels = Vec::new();
        for (i, (name, az)) in [("left", 30.0), ("right", -30.0)].iter().enumerate() {
            let block = DirectSpeakersBlock {
                id: format!("AB_0001100{}_00000001", i + 1),
                rtime: None,
                duration: None,
                position: DirectSpeakerPosition::polar(*az, 0.0),
                speaker_labels: vec![if *az > 0.0 { "M+030".into() } else { "M-030".into() }],
            };
            let channel = b
                .add_channel_format(
                    &format!("AC_0001100{}", i + 1),
                    name,
                    TypeDefinition::DirectSpeakers,
                    BlockFormats::DirectSpeakers(vec![block]),
                )
                .unwrap();
            b.link_pack_channel(in_pack, channel);
            in_channels.push(channel);
        }

        // matrix pack turning mid/side tracks into left/right
        let matrix_pack = b
            .add_pack_format("AP_00021001", "ms", TypeDefinition::Matrix)
            .unwrap();
        b.pack_format_mut(matrix_pack).input_pack_format = Some(in_pack);
        b.pack_format_mut(matrix_pack).output_pack_format = Some(in_pack);

        for (i, name) in ["mid", "side"].iter().enumerate() {
            let block = MatrixBlock {
                id: format!("AB_0002100{}_00000001", i + 1),
                rtime: None,
                duration: None,
                matrix: vec![
                    MatrixCoefficient {
                        input_channel_format: in_channels[0],
                        gain: Some(0.5),
                        delay_ms: None,
                        phase: None,
                        gain_var: None,
                    },
                    MatrixCoefficient {
                        input_channel_format: in_channels[1],
                        gain: Some(if i == 0 { 0.5 } else { -0.5 }),
                        delay_ms: None,
                        phase: None,
                        gain_var: None,
                    },
                ],
                output_channel_format: Some(in_channels[i]),
            };
            let channel = b
                .add_channel_format(
                    &format!("AC_0002100{}", i + 1),
                    name,
                    TypeDefinition::Matrix,
                    BlockFormats::Matrix(vec![block]),
                )
                .unwrap();
            b.link_pack_channel(matrix_pack, channel);
        }

        // object referencing the matrix pack, with tracks for the input
        // channels
        let object = b.add_object("AO_1001", "ms object").unwrap();
        b.link_object_pack(object, matrix_pack);
        for (i, &in_channel) in in_channels.iter().enumerate() {
            let stream = b.add_stream_format(&format!("AS_0001100{}", i + 1), "s").unwrap();
            let track = b
                .add_track_format(&format!("AT_0001100{}_01", i + 1), "t")
                .unwrap();
            b.link_track_stream(track, stream).unwrap();
            b.link_stream_channel(stream, in_channel);
            let uid = b
                .add_track_uid(&format!("ATU_0000000{}", i + 1), Some(i + 1))
                .unwrap();
            b.link_track_uid(uid, Some(track), None, Some(matrix_pack));
            b.link_object_track_uid(object, Some(uid));
        }
        b.add_default_programme(&[object]).unwrap();

        let doc = b.finish();
        let mut warnings = Warnings::new();
        let items =
            select_rendering_items(&doc, &SelectionOptions::default(), &mut warnings).unwrap();

        assert_eq!(items.len(), 2);
        for item in &items {
            let RenderingItem::DirectSpeakers(item) = item else {
                panic!("matrix output should be DirectSpeakers items")
            };
            // each output channel mixes coefficient-weighted copies of both
            // input tracks
            let TrackSpec::Mix(inputs) = &item.track_spec else {
                panic!("expected a mix: {:?}", item.track_spec)
            };
            assert_eq!(inputs.len(), 2);
            for input in inputs {
                assert!(matches!(input, TrackSpec::MatrixCoefficient { .. }));
            }
        }
    }
}
