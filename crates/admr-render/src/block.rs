//! Time-bounded gain processing blocks
//!
//! Metadata blocks are interpreted into processing blocks with fractional
//! start and end times; each applies fixed or linearly interpolated gains to
//! one input channel and sums into the output bus. A processing channel
//! pulls metadata lazily and applies the resulting blocks in time order.

use admr_core::Time;
use ndarray::Array2;

use crate::error::{RenderError, RenderResult};

/// Fractional sample time; `None` is unbounded (used for the end of blocks
/// with no duration).
pub type SampleTime = Option<Time>;

fn ceil_or(t: SampleTime, unbounded: i64) -> i64 {
    t.map_or(unbounded, |t| t.ceil())
}

/// Common timing of a processing block: the fractional interval
/// [start_sample, end_sample) affects the integer samples
/// [first_sample, last_sample).
#[derive(Debug, Clone, PartialEq)]
pub struct BlockTiming {
    pub start_sample: Time,
    /// `None` for a block with no end
    pub end_sample: SampleTime,
    pub first_sample: i64,
    pub last_sample: i64,
}

impl BlockTiming {
    pub fn new(start_sample: Time, end_sample: SampleTime) -> Self {
        Self {
            start_sample,
            end_sample,
            first_sample: start_sample.ceil(),
            last_sample: ceil_or(end_sample, i64::MAX),
        }
    }

    /// The overlap of this block with a sample block starting at
    /// `start_sample` of length `num_samples`, as (state range, sample
    /// range) offsets.
    pub fn overlap(
        &self,
        start_sample: i64,
        num_samples: usize,
    ) -> Option<(std::ops::Range<usize>, std::ops::Range<usize>)> {
        let end_sample = start_sample + num_samples as i64;

        let overlap_start = start_sample.max(self.first_sample);
        let overlap_end = end_sample.min(self.last_sample);

        if overlap_start < overlap_end {
            Some((
                (overlap_start - self.first_sample) as usize
                    ..(overlap_end - self.first_sample) as usize,
                (overlap_start - start_sample) as usize..(overlap_end - start_sample) as usize,
            ))
        } else {
            None
        }
    }
}

/// A block of gain processing over one input channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingBlock {
    /// Apply fixed gains over the block.
    FixedGains { timing: BlockTiming, gains: Vec<f64> },
    /// Interpolate linearly from `gains_start` to `gains_end` over the
    /// block; either may be absent, fading from or to silence contributions.
    InterpGains {
        timing: BlockTiming,
        gains_start: Option<Vec<f64>>,
        gains_end: Option<Vec<f64>>,
    },
}

impl ProcessingBlock {
    pub fn timing(&self) -> &BlockTiming {
        match self {
            ProcessingBlock::FixedGains { timing, .. } => timing,
            ProcessingBlock::InterpGains { timing, .. } => timing,
        }
    }

    /// The interpolation ramp value at integer sample `s`: 0 at
    /// start_sample, 1 at end_sample.
    fn ramp_at(timing: &BlockTiming, s: i64) -> f64 {
        let start = timing.start_sample.as_f64();
        let end = timing
            .end_sample
            .expect("interpolated blocks always have an end")
            .as_f64();
        (s as f64 - start) / (end - start)
    }

    /// Apply this block to input samples, summing into the output.
    ///
    /// `output` has shape (samples, channels) and is aligned with `input`;
    /// `start_sample` is the index of the first sample of both.
    pub fn process(&self, start_sample: i64, input: &[f64], output: &mut Array2<f64>) {
        let Some((state_range, sample_range)) = self.timing().overlap(start_sample, input.len())
        else {
            return;
        };

        match self {
            ProcessingBlock::FixedGains { gains, .. } => {
                for i in sample_range {
                    for (c, &g) in gains.iter().enumerate() {
                        output[[i, c]] += input[i] * g;
                    }
                }
            }
            ProcessingBlock::InterpGains {
                timing,
                gains_start,
                gains_end,
            } => {
                for (state_i, sample_i) in state_range.zip(sample_range) {
                    let p = Self::ramp_at(timing, timing.first_sample + state_i as i64);

                    if let Some(gains_start) = gains_start {
                        let fade_down = input[sample_i] * (1.0 - p);
                        for (c, &g) in gains_start.iter().enumerate() {
                            output[[sample_i, c]] += fade_down * g;
                        }
                    }
                    if let Some(gains_end) = gains_end {
                        let fade_up = input[sample_i] * p;
                        for (c, &g) in gains_end.iter().enumerate() {
                            output[[sample_i, c]] += fade_up * g;
                        }
                    }
                }
            }
        }
    }
}

/// Start and end times of a metadata block given object-level timing.
///
/// Tracks the previous block end to detect overlapping blocks; call with
/// every block in sequence.
#[derive(Debug, Default)]
pub struct InterpretTimingMetadata {
    last_block_end: Option<SampleTime>,
}

impl InterpretTimingMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get (start, end) of a block, in seconds; `None` end means unbounded.
    pub fn block_start_end(
        &mut self,
        block_id: &str,
        rtime: Option<Time>,
        duration: Option<Time>,
        object_start: Option<Time>,
        object_duration: Option<Time>,
    ) -> RenderResult<(Time, SampleTime)> {
        let object_start = object_start.unwrap_or(Time::ZERO);
        let object_end = object_duration.map(|d| object_start + d);

        let (block_start, block_end) = match (rtime, duration) {
            (Some(rtime), Some(duration)) => {
                let start = object_start + rtime;
                let end = start + duration;
                if let Some(object_end) = object_end {
                    if end > object_end {
                        return Err(RenderError::Timing(format!(
                            "block {} ends after its audioObject",
                            block_id
                        )));
                    }
                }
                (start, Some(end))
            }
            (None, None) => (object_start, object_end),
            _ => {
                return Err(RenderError::Timing(format!(
                    "block {}: rtime and duration must be used together",
                    block_id
                )))
            }
        };

        // this also catches several blocks without timing information
        if let Some(last_end) = self.last_block_end {
            let overlapping = match last_end {
                None => true,
                Some(last_end) => block_start < last_end,
            };
            if overlapping {
                return Err(RenderError::Timing(format!(
                    "overlapping blocks detected at block {}",
                    block_id
                )));
            }
        }
        self.last_block_end = Some(block_end);

        Ok((block_start, block_end))
    }
}

/// Queue of processing blocks to apply to an audio stream; the first entry
/// is the currently active one.
///
/// Blocks are pulled lazily through a refill callback which interprets the
/// next metadata block, returning `None` when the metadata is exhausted.
#[derive(Debug, Default)]
pub struct ProcessingQueue {
    queue: std::collections::VecDeque<ProcessingBlock>,
}

impl ProcessingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn refill(
        &mut self,
        start_sample: Option<i64>,
        next_blocks: &mut impl FnMut() -> RenderResult<Option<Vec<ProcessingBlock>>>,
    ) -> RenderResult<()> {
        while self.queue.is_empty() {
            let Some(states) = next_blocks()? else {
                return Ok(());
            };

            for state in states {
                if let Some(start_sample) = start_sample {
                    if state.timing().first_sample < start_sample {
                        return Err(RenderError::Timing(
                            "metadata underrun: metadata arrived after the samples it would apply to"
                                .into(),
                        ));
                    }
                }
                self.queue.push_back(state);
            }
        }
        Ok(())
    }

    /// Process a block of input samples, summing into the output bus.
    pub fn process(
        &mut self,
        start_sample: i64,
        input: &[f64],
        output: &mut Array2<f64>,
        mut next_blocks: impl FnMut() -> RenderResult<Option<Vec<ProcessingBlock>>>,
    ) -> RenderResult<()> {
        let end_sample = start_sample + input.len() as i64;
        self.refill(Some(start_sample), &mut next_blocks)?;

        while let Some(front) = self.queue.front() {
            front.process(start_sample, input, output);

            if front.timing().last_sample < end_sample {
                // this processing block ends inside the sample block; move
                // to the next one
                self.queue.pop_front();
                self.refill(None, &mut next_blocks)?;
            } else if front.timing().last_sample == end_sample {
                self.queue.pop_front();
                break;
            } else {
                break;
            }
        }

        Ok(())
    }
}
