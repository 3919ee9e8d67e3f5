//! Output peak monitoring

use admr_core::Warnings;
use ndarray::Array2;

use crate::error::{RenderError, RenderResult};

/// Monitors the peak level of each channel in a multichannel stream.
pub struct PeakMonitor {
    peak_abs_linear: Vec<f64>,
}

impl PeakMonitor {
    pub fn new(n_channels: usize) -> Self {
        Self {
            peak_abs_linear: vec![0.0; n_channels],
        }
    }

    /// Process a block of samples of shape (samples, channels).
    pub fn process(&mut self, samples: &Array2<f64>) {
        for row in samples.rows() {
            for (peak, &s) in self.peak_abs_linear.iter_mut().zip(row) {
                *peak = peak.max(s.abs());
            }
        }
    }

    pub fn has_overloaded(&self) -> bool {
        self.peak_abs_linear.iter().any(|&p| p > 1.0)
    }

    /// Produce a warning for each overloaded channel.
    pub fn warn_overloaded(&self, warnings: &mut Warnings) {
        for (channel, &peak) in self.peak_abs_linear.iter().enumerate() {
            if peak > 1.0 {
                warnings.warn(format!(
                    "overload in channel {}; peak level was {:.1}dBFS",
                    channel,
                    20.0 * peak.log10()
                ));
            }
        }
    }

    /// Fail on the first overloaded channel, for `--fail-on-overload`.
    pub fn check_overload(&self) -> RenderResult<()> {
        for (channel, &peak) in self.peak_abs_linear.iter().enumerate() {
            if peak > 1.0 {
                return Err(RenderError::Overload {
                    channel,
                    peak_dbfs: 20.0 * peak.log10(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_no_overload() {
        let mut monitor = PeakMonitor::new(2);
        monitor.process(&array![[0.5, -0.9], [0.1, 0.2]]);
        assert!(!monitor.has_overloaded());
        assert!(monitor.check_overload().is_ok());
    }

    #[test]
    fn test_overload_detected() {
        let mut monitor = PeakMonitor::new(2);
        monitor.process(&array![[0.5, -1.5]]);
        assert!(monitor.has_overloaded());

        let mut warnings = Warnings::new();
        monitor.warn_overloaded(&mut warnings);
        assert_eq!(warnings.iter().count(), 1);

        assert!(matches!(
            monitor.check_overload(),
            Err(RenderError::Overload { channel: 1, .. })
        ));
    }

    #[test]
    fn test_peak_accumulates_across_blocks() {
        let mut monitor = PeakMonitor::new(1);
        monitor.process(&array![[0.5]]);
        monitor.process(&array![[1.2]]);
        monitor.process(&array![[0.1]]);
        assert!(monitor.has_overloaded());
    }
}
