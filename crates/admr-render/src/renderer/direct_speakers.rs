//! The DirectSpeakers type renderer

use admr_core::layout::Layout;
use admr_core::Warnings;
use admr_model::items::{DirectSpeakersRenderingItem, DirectSpeakersTypeMetadata};
use ndarray::Array2;

use crate::block::{BlockTiming, InterpretTimingMetadata, ProcessingBlock, ProcessingQueue};
use crate::direct_speakers::DirectSpeakersPanner;
use crate::error::RenderResult;
use crate::track_processor::TrackProcessor;

/// DirectSpeakers blocks produce fixed gains over their interval; there is
/// no interpolation between blocks.
#[derive(Debug, Default)]
struct InterpretDirectSpeakersMetadata {
    timing: InterpretTimingMetadata,
}

impl InterpretDirectSpeakersMetadata {
    fn interpret(
        &mut self,
        panner: &DirectSpeakersPanner,
        sample_rate: u32,
        meta: &DirectSpeakersTypeMetadata,
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

        let gains = panner.handle(meta, warnings)?;

        Ok(vec![ProcessingBlock::FixedGains {
            timing: BlockTiming::new(
                start_time.to_fractional_samples(sample_rate),
                end_time.map(|t| t.to_fractional_samples(sample_rate)),
            ),
            gains,
        }])
    }
}

struct DirectSpeakersChannel {
    track: TrackProcessor,
    metadata: Vec<DirectSpeakersTypeMetadata>,
    next_block: usize,
    interpret: InterpretDirectSpeakersMetadata,
    queue: ProcessingQueue,
    context: String,
}

/// Renderer for all DirectSpeakers rendering items.
pub struct DirectSpeakersRenderer {
    panner: DirectSpeakersPanner,
    num_channels: usize,
    channels: Vec<DirectSpeakersChannel>,
}

impl DirectSpeakersRenderer {
    pub fn new(layout: &Layout) -> RenderResult<Self> {
        Ok(Self {
            panner: DirectSpeakersPanner::new(layout)?,
            num_channels: layout.num_channels(),
            channels: Vec::new(),
        })
    }

    pub fn set_rendering_items(&mut self, items: Vec<DirectSpeakersRenderingItem>) {
        self.channels = items
            .into_iter()
            .map(|item| DirectSpeakersChannel {
                track: TrackProcessor::new(&item.track_spec),
                metadata: item.metadata_source.blocks().to_vec(),
                next_block: 0,
                interpret: InterpretDirectSpeakersMetadata::default(),
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
            let panner = &self.panner;

            channel
                .queue
                .process(start_sample, &track_samples, &mut output, || {
                    let Some(meta) = metadata.get(*next_block) else {
                        return Ok(None);
                    };
                    *next_block += 1;
                    interpret
                        .interpret(panner, sample_rate, meta, warnings)
                        .map(Some)
                })
                .map_err(|e| e.in_item(&channel.context))?;
        }

        Ok(output)
    }
}
