//! Alignment and mixing of output streams
//!
//! Mixes blocks from several renderers with varying delays into one aligned
//! stream. Each round consists of one `add` per input stream followed by one
//! `get`, which returns the region completed by all streams.

use ndarray::{s, Array2};

/// Mix a number of input streams with varying delays into a single aligned
/// output stream.
pub struct BlockAligner {
    buf: Array2<f64>,
    /// sample number of the first sample in the buffer
    buf_start: i64,
    /// end of the earliest buffer added this round; everything before it is
    /// complete
    first_end: Option<i64>,
}

impl BlockAligner {
    pub fn new(n_channels: usize) -> Self {
        Self {
            buf: Array2::zeros((0, n_channels)),
            buf_start: 0,
            first_end: None,
        }
    }

    /// Add a block of samples to be summed into the output; `start` is the
    /// output index of the first sample and may be negative.
    pub fn add(&mut self, start: i64, samples: &Array2<f64>) {
        let mut start = start;
        let mut samples = samples.view();

        // strip off any samples before time 0
        if start < self.buf_start {
            assert!(self.buf_start == 0, "samples in past only allowed before time 0");

            let to_discard = ((self.buf_start - start) as usize).min(samples.nrows());
            samples = samples.slice_move(s![to_discard.., ..]);
            start += to_discard as i64;
        }

        let end = start + samples.nrows() as i64;

        let start_buf = (start - self.buf_start) as usize;
        let end_buf = (end - self.buf_start) as usize;

        if end_buf > self.buf.nrows() {
            let mut grown = Array2::zeros((end_buf, self.buf.ncols()));
            grown
                .slice_mut(s![..self.buf.nrows(), ..])
                .assign(&self.buf);
            self.buf = grown;
        }

        if samples.nrows() > 0 {
            let mut region = self.buf.slice_mut(s![start_buf..end_buf, ..]);
            region += &samples;
        }

        if self.first_end.map_or(true, |fe| fe > end) {
            self.first_end = Some(end);
        }
    }

    /// Get the samples that have been completely filled by all input
    /// streams; the first sample returned is the sample for time 0.
    pub fn get(&mut self) -> Array2<f64> {
        let first_end = self.first_end.expect("get called before add");
        let n_samples = ((first_end - self.buf_start).max(0)) as usize;

        let result = self.buf.slice(s![..n_samples, ..]).to_owned();

        let remaining = self.buf.slice(s![n_samples.., ..]).to_owned();
        let mut buf = Array2::zeros(self.buf.raw_dim());
        buf.slice_mut(s![..remaining.nrows(), ..]).assign(&remaining);
        self.buf = buf;

        self.buf_start += n_samples as i64;
        self.first_end = None;

        result
    }
}
