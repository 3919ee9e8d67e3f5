//! HOA parameter extraction
//!
//! HOA parameters may be set on audioPackFormats anywhere on the path to a
//! channel, or on the audioBlockFormat itself. Values from different places
//! must agree; parameters which apply to the whole pack must agree between
//! channels.

use admr_core::Time;

use crate::blocks::{BlockFormats, HoaBlock, Normalization};
use crate::document::AdmDocument;
use crate::elements::{ChannelFormatRef, PackFormatRef};
use crate::error::{ModelError, ModelResult};

/// The pack path and channel of one selected HOA channel.
pub type PackPathChannel<'a> = (&'a [PackFormatRef], ChannelFormatRef);

fn hoa_block<'a>(doc: &'a AdmDocument, channel: ChannelFormatRef) -> ModelResult<&'a HoaBlock> {
    let cf = doc.channel_format(channel);
    match &cf.blocks {
        BlockFormats::Hoa(blocks) if blocks.len() == 1 => Ok(&blocks[0]),
        BlockFormats::Hoa(_) => Err(ModelError::Validation(format!(
            "HOA audioChannelFormat {} must have exactly one audioBlockFormat",
            cf.id
        ))),
        _ => Err(ModelError::Validation(format!(
            "audioChannelFormat {} is not an HOA channel",
            cf.id
        ))),
    }
}

/// Get a parameter definable on packs or the block, checking consistency
/// along one path.
fn pack_param<T: PartialEq + Copy>(
    doc: &AdmDocument,
    (path, channel): PackPathChannel,
    name: &str,
    from_pack: impl Fn(&crate::elements::AudioPackFormat) -> Option<T>,
    from_block: impl Fn(&HoaBlock) -> Option<T>,
) -> ModelResult<Option<T>> {
    let mut values: Vec<T> = path
        .iter()
        .filter_map(|&p| from_pack(doc.pack_format(p)))
        .collect();
    if let Some(v) = from_block(hoa_block(doc, channel)?) {
        values.push(v);
    }

    match values.split_first() {
        None => Ok(None),
        Some((first, rest)) => {
            if rest.iter().any(|v| v != first) {
                return Err(ModelError::Validation(format!(
                    "conflicting {} values in path from {} to {}",
                    name,
                    doc.pack_format(path[0]).id,
                    doc.channel_format(channel).id,
                )));
            }
            Ok(Some(*first))
        }
    }
}

/// Get one parameter which must be consistent across all channels.
fn single_param<T: PartialEq + Copy>(
    doc: &AdmDocument,
    channels: &[PackPathChannel],
    name: &str,
    get: impl Fn(&AdmDocument, PackPathChannel) -> ModelResult<Option<T>>,
) -> ModelResult<Option<T>> {
    let first = get(doc, channels[0])?;
    for &channel in &channels[1..] {
        if get(doc, channel)? != first {
            return Err(ModelError::Validation(format!(
                "all HOA audioChannelFormats in a single audioPackFormat must share the same {} value, but {} and {} differ",
                name,
                doc.channel_format(channels[0].1).id,
                doc.channel_format(channel.1).id,
            )));
        }
    }
    Ok(first)
}

pub fn get_normalization(
    doc: &AdmDocument,
    channels: &[PackPathChannel],
) -> ModelResult<Normalization> {
    Ok(single_param(doc, channels, "normalization", |doc, c| {
        pack_param(doc, c, "normalization", |p| p.normalization, |b| b.normalization)
    })?
    .unwrap_or(Normalization::SN3D))
}

pub fn get_nfc_ref_dist(
    doc: &AdmDocument,
    channels: &[PackPathChannel],
) -> ModelResult<Option<f64>> {
    let dist = single_param(doc, channels, "nfcRefDist", |doc, c| {
        pack_param(doc, c, "nfcRefDist", |p| p.nfc_ref_dist, |b| b.nfc_ref_dist)
    })?;
    // a reference distance of 0 means no compensation
    Ok(dist.filter(|&d| d != 0.0))
}

pub fn get_screen_ref(doc: &AdmDocument, channels: &[PackPathChannel]) -> ModelResult<bool> {
    Ok(single_param(doc, channels, "screenRef", |doc, c| {
        pack_param(doc, c, "screenRef", |p| p.screen_ref, |b| b.screen_ref)
    })?
    .unwrap_or(false))
}

pub fn get_rtime(doc: &AdmDocument, channels: &[PackPathChannel]) -> ModelResult<Option<Time>> {
    single_param(doc, channels, "rtime", |doc, (_, c)| {
        Ok(hoa_block(doc, c)?.rtime)
    })
}

pub fn get_duration(doc: &AdmDocument, channels: &[PackPathChannel]) -> ModelResult<Option<Time>> {
    single_param(doc, channels, "duration", |doc, (_, c)| {
        Ok(hoa_block(doc, c)?.duration)
    })
}

/// Order and degree for each channel.
pub fn get_orders_degrees(
    doc: &AdmDocument,
    channels: &[PackPathChannel],
) -> ModelResult<(Vec<i32>, Vec<i32>)> {
    let mut orders = Vec::with_capacity(channels.len());
    let mut degrees = Vec::with_capacity(channels.len());

    for &(_, channel) in channels {
        let block = hoa_block(doc, channel)?;
        let (Some(order), Some(degree)) = (block.order, block.degree) else {
            return Err(ModelError::Validation(format!(
                "HOA block format {} is missing order or degree",
                block.id
            )));
        };
        orders.push(order);
        degrees.push(degree);
    }

    Ok((orders, degrees))
}
