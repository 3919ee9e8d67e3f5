//! Matrix pack handling during selection
//!
//! Matrix packs never reach the renderers directly: their effect is folded
//! into `TrackSpec` chains, and the items emitted belong to the
//! outputPackFormat. Direct packs have both input and output references,
//! encode packs only input, decode packs only output.

use crate::blocks::BlockFormats;
use crate::document::AdmDocument;
use crate::elements::{ChannelFormatRef, PackFormatRef};
use crate::error::{ModelError, ModelResult};
use crate::items::{CoefficientSpec, TrackSpec};

/// The role of a matrix audioPackFormat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixType {
    Direct,
    Encode,
    Decode,
}

/// Classify a matrix pack by its references.
pub fn type_of(doc: &AdmDocument, pack: PackFormatRef) -> ModelResult<MatrixType> {
    let p = doc.pack_format(pack);
    match (p.input_pack_format.is_some(), p.output_pack_format.is_some()) {
        (true, true) => Ok(MatrixType::Direct),
        (true, false) => Ok(MatrixType::Encode),
        (false, true) => Ok(MatrixType::Decode),
        (false, false) => Err(ModelError::Validation(format!(
            "matrix audioPackFormat {} has neither input nor output pack references",
            p.id
        ))),
    }
}

/// The pack whose channels the tracks of a direct/decode matrix reference:
/// the inputPackFormat for direct packs, the encodePackFormat for decode.
pub fn input_pack_format(doc: &AdmDocument, pack: PackFormatRef) -> ModelResult<PackFormatRef> {
    let p = doc.pack_format(pack);
    match type_of(doc, pack)? {
        MatrixType::Decode => p.encode_pack_formats.first().copied().ok_or_else(|| {
            ModelError::Validation(format!(
                "decode matrix audioPackFormat {} has no encodePackFormat",
                p.id
            ))
        }),
        _ => p.input_pack_format.ok_or_else(|| {
            ModelError::Validation(format!(
                "matrix audioPackFormat {} has no inputPackFormat",
                p.id
            ))
        }),
    }
}

fn matrix_block(doc: &AdmDocument, channel: ChannelFormatRef) -> ModelResult<&crate::blocks::MatrixBlock> {
    let cf = doc.channel_format(channel);
    match &cf.blocks {
        BlockFormats::Matrix(blocks) if blocks.len() == 1 => Ok(&blocks[0]),
        _ => Err(ModelError::Validation(format!(
            "matrix audioChannelFormat {} must have exactly one audioBlockFormat",
            cf.id
        ))),
    }
}

/// Build the output channel allocation of a matrix pack.
///
/// Starting at the channels of the direct/decode matrix, follow
/// inputChannelFormat references recursively until a channel from the input
/// allocation is reached, building coefficient track specs on the way back
/// up. Each output channel is the outputChannelFormat of a matrix channel.
pub fn output_channel_allocation(
    doc: &AdmDocument,
    root_pack: PackFormatRef,
    input_allocation: &[(ChannelFormatRef, TrackSpec)],
) -> ModelResult<Vec<(ChannelFormatRef, TrackSpec)>> {
    fn track_spec_for(
        doc: &AdmDocument,
        channel: ChannelFormatRef,
        input_allocation: &[(ChannelFormatRef, TrackSpec)],
    ) -> ModelResult<TrackSpec> {
        if let Some((_, spec)) = input_allocation.iter().find(|(c, _)| *c == channel) {
            return Ok(spec.clone());
        }

        let block = matrix_block(doc, channel)?;

        let mut inputs = Vec::with_capacity(block.matrix.len());
        for coefficient in &block.matrix {
            if coefficient.phase.is_some() || coefficient.gain_var.is_some() {
                return Err(ModelError::Validation(format!(
                    "matrix block format {}: phase and frequency-variant coefficients are not supported",
                    block.id
                )));
            }

            inputs.push(TrackSpec::MatrixCoefficient {
                input: Box::new(track_spec_for(
                    doc,
                    coefficient.input_channel_format,
                    input_allocation,
                )?),
                coefficient: CoefficientSpec {
                    gain: coefficient.gain,
                    delay_ms: coefficient.delay_ms,
                },
            });
        }

        Ok(TrackSpec::Mix(inputs))
    }

    doc.pack_format(root_pack)
        .channel_formats
        .iter()
        .map(|&channel| {
            let block = matrix_block(doc, channel)?;
            let output = block.output_channel_format.ok_or_else(|| {
                ModelError::Reference(format!(
                    "matrix block format {} has no outputChannelFormat",
                    block.id
                ))
            })?;
            Ok((output, track_spec_for(doc, channel, input_allocation)?))
        })
        .collect()
}
