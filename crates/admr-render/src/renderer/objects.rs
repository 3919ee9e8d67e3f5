//! The Objects type renderer

use admr_core::layout::Layout;
use admr_core::{Time, Warnings};
use admr_model::blocks::ObjectsBlock;
use admr_model::items::{ObjectRenderingItem, ObjectTypeMetadata};
use ndarray::Array2;

use crate::block::{
    BlockTiming, InterpretTimingMetadata, ProcessingBlock, ProcessingQueue, SampleTime,
};
use crate::error::{RenderError, RenderResult};
use crate::gain_calc::GainCalc;
use crate::track_processor::TrackProcessor;

/// Interpret a stream of Objects metadata into processing blocks.
///
/// Gains step at the block start, ramp linearly over the interpolation time
/// (jumpPosition off), or hold the previous gains over the interpolation
/// time and then step (jumpPosition on). Interpolation from the previous
/// gains only happens between directly adjacent blocks.
#[derive(Debug, Default)]
struct InterpretObjectMetadata {
    timing: InterpretTimingMetadata,
    last_block_end: Option<SampleTime>,
    last_block_gains: Option<Vec<f64>>,
}

impl InterpretObjectMetadata {
    fn interp_length(block: &ObjectsBlock, start: Time, end: SampleTime) -> SampleTime {
        if block.jump_position.flag {
            Some(block.jump_position.interpolation_length.unwrap_or(Time::ZERO))
        } else {
            end.map(|end| end - start)
        }
    }

    fn interpret(
        &mut self,
        gain_calc: &GainCalc,
        sample_rate: u32,
        meta: &ObjectTypeMetadata,
        warnings: &mut Warnings,
    ) -> RenderResult<Vec<ProcessingBlock>> {
        let block = &meta.block_format;

        let (start_time, end_time) = self.timing.block_start_end(
            &block.id,
            block.rtime,
            block.duration,
            meta.extra_data.object_start,
            meta.extra_data.object_duration,
        )?;

        let interp_time = Self::interp_length(block, start_time, end_time);
        let mut target_time = interp_time.map(|t| start_time + t);

        if let (Some(target), Some(end)) = (target_time, end_time) {
            if target > end {
                return Err(RenderError::Timing(format!(
                    "interpolation length of block {} is longer than the block",
                    block.id
                )));
            }
        }

        // interpolate from the previous block only if this block starts
        // immediately after it
        let interp_from = if self.last_block_end == Some(Some(start_time)) {
            self.last_block_gains.clone()
        } else {
            target_time = Some(start_time);
            None
        };

        // an unbounded interpolation time can only happen on the first
        // block of an item, where it degenerates to a step
        let target_time = target_time.unwrap_or(start_time);

        let interp_to = gain_calc
            .render(meta, warnings)
            .map_err(|e| e.in_item(&format!("block {}", block.id)))?
            .combined();

        let to_samples = |t: Time| t.to_fractional_samples(sample_rate);
        let start_sample = to_samples(start_time);
        let end_sample = end_time.map(to_samples);
        let target_sample = to_samples(target_time);

        let mut out = Vec::new();

        if target_sample != start_sample {
            if block.jump_position.flag {
                // hold the previous gains, then step
                out.push(ProcessingBlock::FixedGains {
                    timing: BlockTiming::new(start_sample, Some(target_sample)),
                    gains: interp_from
                        .clone()
                        .expect("hold only happens after an adjacent block"),
                });
            } else {
                out.push(ProcessingBlock::InterpGains {
                    timing: BlockTiming::new(start_sample, Some(target_sample)),
                    gains_start: interp_from,
                    gains_end: Some(interp_to.clone()),
                });
            }
        }

        if end_sample.map_or(true, |end| end != target_sample) {
            out.push(ProcessingBlock::FixedGains {
                timing: BlockTiming::new(target_sample, end_sample),
                gains: interp_to.clone(),
            });
        }

        self.last_block_end = Some(end_time);
        self.last_block_gains = Some(interp_to);

        Ok(out)
    }
}

struct ObjectChannel {
    track: TrackProcessor,
    metadata: Vec<ObjectTypeMetadata>,
    next_block: usize,
    interpret: InterpretObjectMetadata,
    queue: ProcessingQueue,
    context: String,
}

/// Renderer for all Objects rendering items.
pub struct ObjectsRenderer {
    gain_calc: GainCalc,
    num_channels: usize,
    channels: Vec<ObjectChannel>,
}

impl ObjectsRenderer {
    pub fn new(layout: &Layout) -> RenderResult<Self> {
        Ok(Self {
            gain_calc: GainCalc::new(layout)?,
            num_channels: layout.num_channels(),
            channels: Vec::new(),
        })
    }

    pub fn set_rendering_items(&mut self, items: Vec<ObjectRenderingItem>) {
        self.channels = items
            .into_iter()
            .map(|item| ObjectChannel {
                track: TrackProcessor::new(&item.track_spec),
                metadata: item.metadata_source.blocks().to_vec(),
                next_block: 0,
                interpret: InterpretObjectMetadata::default(),
                queue: ProcessingQueue::new(),
                context: item.adm_path.display(),
            })
            .collect();
    }

    pub fn render(
        &mut self,
        sample_rate: u32,
        start_sample: i64,
        input: &Array2<f64>,
        warnings: &mut Warnings,
    ) -> RenderResult<Array2<f64>> {
        let mut output = Array2::zeros((input.nrows(), self.num_channels));

        for channel in &mut self.channels {
            let track_samples = channel.track.process(sample_rate, input);

            let metadata = &channel.metadata;
            let next_block = &mut channel.next_block;
            let interpret = &mut channel.interpret;
            let gain_calc = &self.gain_calc;

            channel
                .queue
                .process(start_sample, &track_samples, &mut output, || {
                    let Some(meta) = metadata.get(*next_block) else {
                        return Ok(None);
                    };
                    *next_block += 1;
                    interpret
                        .interpret(gain_calc, sample_rate, meta, warnings)
                        .map(Some)
                })
                .map_err(|e| e.in_item(&channel.context))?;
        }

        Ok(output)
    }
}
