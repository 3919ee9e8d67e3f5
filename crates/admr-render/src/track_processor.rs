//! Resolving track specs into sample streams
//!
//! A `TrackSpec` tree describes how to obtain the samples for one rendered
//! channel from the physical input tracks. Trees are simplified before
//! processing (silent inputs removed, trivial mixes collapsed), and results
//! for repeated stateless sub-specs are computed once per block.

use ndarray::Array2;

use admr_model::items::TrackSpec;

/// A fixed delay line over one channel.
#[derive(Debug, Clone)]
pub struct Delay {
    buffer: Vec<f64>,
}

impl Delay {
    pub fn new(delay_samples: usize) -> Self {
        Self {
            buffer: vec![0.0; delay_samples],
        }
    }

    pub fn process(&mut self, input: &[f64]) -> Vec<f64> {
        if self.buffer.is_empty() {
            return input.to_vec();
        }

        let mut combined = Vec::with_capacity(self.buffer.len() + input.len());
        combined.extend_from_slice(&self.buffer);
        combined.extend_from_slice(input);

        let output = combined[..input.len()].to_vec();
        let keep = combined.len() - self.buffer.len();
        self.buffer.copy_from_slice(&combined[keep..]);
        output
    }
}

/// Simplify a track spec without changing its effect: silent mix inputs are
/// removed, trivial mixes collapsed, and coefficients over silence made
/// silent.
pub fn simplify_track_spec(spec: &TrackSpec) -> TrackSpec {
    match spec {
        TrackSpec::Silent | TrackSpec::Direct(_) => spec.clone(),
        TrackSpec::MatrixCoefficient { input, coefficient } => {
            let input = simplify_track_spec(input);
            if input == TrackSpec::Silent {
                TrackSpec::Silent
            } else {
                TrackSpec::MatrixCoefficient {
                    input: Box::new(input),
                    coefficient: *coefficient,
                }
            }
        }
        TrackSpec::Mix(inputs) => {
            let inputs: Vec<TrackSpec> = inputs
                .iter()
                .map(simplify_track_spec)
                .filter(|t| *t != TrackSpec::Silent)
                .collect();

            match inputs.len() {
                0 => TrackSpec::Silent,
                1 => inputs.into_iter().next().unwrap(),
                _ => TrackSpec::Mix(inputs),
            }
        }
    }
}

#[derive(Debug)]
enum Node {
    Silent,
    Direct(usize),
    Coefficient {
        input: Box<TrackProcessor>,
        gain: Option<f64>,
        delay_ms: Option<f64>,
        delay: Option<Delay>,
    },
    Mix(Vec<TrackProcessor>),
}

/// Processor for a single track spec.
#[derive(Debug)]
pub struct TrackProcessor {
    spec: TrackSpec,
    node: Node,
}

impl TrackProcessor {
    /// Build a processor for a track spec; the spec is simplified first.
    pub fn new(spec: &TrackSpec) -> Self {
        let spec = simplify_track_spec(spec);
        let node = Self::build(&spec);
        Self { spec, node }
    }

    fn build(spec: &TrackSpec) -> Node {
        match spec {
            TrackSpec::Silent => Node::Silent,
            TrackSpec::Direct(index) => Node::Direct(*index),
            TrackSpec::MatrixCoefficient { input, coefficient } => Node::Coefficient {
                input: Box::new(TrackProcessor {
                    spec: (**input).clone(),
                    node: Self::build(input),
                }),
                gain: coefficient.gain,
                delay_ms: coefficient.delay_ms,
                delay: None,
            },
            TrackSpec::Mix(inputs) => Node::Mix(
                inputs
                    .iter()
                    .map(|input| TrackProcessor {
                        spec: input.clone(),
                        node: Self::build(input),
                    })
                    .collect(),
            ),
        }
    }

    fn is_stateless(node: &Node) -> bool {
        match node {
            Node::Silent | Node::Direct(_) => true,
            Node::Coefficient { delay_ms, input, .. } => {
                delay_ms.is_none() && Self::is_stateless(&input.node)
            }
            Node::Mix(inputs) => inputs.iter().all(|i| Self::is_stateless(&i.node)),
        }
    }

    /// Get the samples for the track spec from a block of input samples of
    /// shape (samples, channels).
    pub fn process(&mut self, sample_rate: u32, input: &Array2<f64>) -> Vec<f64> {
        let mut cache: Vec<(TrackSpec, Vec<f64>)> = Vec::new();
        Self::eval(&mut self.node, &self.spec, sample_rate, input, &mut cache)
    }

    fn eval(
        node: &mut Node,
        spec: &TrackSpec,
        sample_rate: u32,
        input: &Array2<f64>,
        cache: &mut Vec<(TrackSpec, Vec<f64>)>,
    ) -> Vec<f64> {
        let stateless = Self::is_stateless(node);
        if stateless {
            if let Some((_, result)) = cache.iter().find(|(s, _)| s == spec) {
                return result.clone();
            }
        }

        let result = match node {
            Node::Silent => vec![0.0; input.nrows()],
            Node::Direct(index) => input.column(*index).to_vec(),
            Node::Coefficient {
                input: sub,
                gain,
                delay_ms,
                delay,
            } => {
                let mut samples = Self::eval(&mut sub.node, &sub.spec, sample_rate, input, cache);

                if let Some(gain) = gain {
                    for s in &mut samples {
                        *s *= *gain;
                    }
                }

                if let Some(delay_ms) = delay_ms {
                    let delay = delay.get_or_insert_with(|| {
                        let samples =
                            ((sample_rate as f64 * *delay_ms) / 1000.0 - 0.5).ceil().max(0.0);
                        Delay::new(samples as usize)
                    });
                    samples = delay.process(&samples);
                }

                samples
            }
            Node::Mix(inputs) => {
                let mut out = vec![0.0; input.nrows()];
                for sub in inputs {
                    let samples = Self::eval(&mut sub.node, &sub.spec, sample_rate, input, cache);
                    for (o, s) in out.iter_mut().zip(samples) {
                        *o += s;
                    }
                }
                out
            }
        };

        if stateless {
            cache.push((spec.clone(), result.clone()));
        }

        result
    }
}

/// Processor rendering several track specs into an array of shape
/// (samples, specs).
#[derive(Debug)]
pub struct MultiTrackProcessor {
    processors: Vec<TrackProcessor>,
}

impl MultiTrackProcessor {
    pub fn new(specs: &[TrackSpec]) -> Self {
        Self {
            processors: specs.iter().map(TrackProcessor::new).collect(),
        }
    }

    pub fn process(&mut self, sample_rate: u32, input: &Array2<f64>) -> Array2<f64> {
        let mut out = Array2::<f64>::zeros((input.nrows(), self.processors.len()));
        for (i, processor) in self.processors.iter_mut().enumerate() {
            let samples = processor.process(sample_rate, input);
            for (r, s) in samples.into_iter().enumerate() {
                out[[r, i]] = s;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use admr_model::items::CoefficientSpec;
    use ndarray::array;

    fn input() -> Array2<f64> {
        array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0]]
    }

    #[test]
    fn test_direct() {
        let mut p = TrackProcessor::new(&TrackSpec::Direct(1));
        assert_eq!(p.process(48000, &input()), vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_silent() {
        let mut p = TrackProcessor::new(&TrackSpec::Silent);
        assert_eq!(p.process(48000, &input()), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_mix() {
        let spec = TrackSpec::Mix(vec![TrackSpec::Direct(0), TrackSpec::Direct(1)]);
        let mut p = TrackProcessor::new(&spec);
        assert_eq!(p.process(48000, &input()), vec![11.0, 22.0, 33.0]);
    }

    #[test]
    fn test_simplify() {
        let spec = TrackSpec::Mix(vec![
            TrackSpec::Silent,
            TrackSpec::Mix(vec![TrackSpec::Direct(0), TrackSpec::Silent]),
        ]);
        assert_eq!(simplify_track_spec(&spec), TrackSpec::Direct(0));

        let silent_coeff = TrackSpec::MatrixCoefficient {
            input: Box::new(TrackSpec::Silent),
            coefficient: CoefficientSpec { gain: Some(2.0), delay_ms: None },
        };
        assert_eq!(simplify_track_spec(&silent_coeff), TrackSpec::Silent);
    }

    #[test]
    fn test_coefficient_gain() {
        let spec = TrackSpec::MatrixCoefficient {
            input: Box::new(TrackSpec::Direct(0)),
            coefficient: CoefficientSpec { gain: Some(0.5), delay_ms: None },
        };
        let mut p = TrackProcessor::new(&spec);
        assert_eq!(p.process(48000, &input()), vec![0.5, 1.0, 1.5]);
    }

    #[test]
    fn test_coefficient_delay() {
        // 1 sample at 1000 Hz sample rate with 1 ms delay
        let spec = TrackSpec::MatrixCoefficient {
            input: Box::new(TrackSpec::Direct(0)),
            coefficient: CoefficientSpec { gain: None, delay_ms: Some(1.0) },
        };
        let mut p = TrackProcessor::new(&spec);
        assert_eq!(p.process(1000, &input()), vec![0.0, 1.0, 2.0]);
        // state carries across blocks
        assert_eq!(p.process(1000, &input()), vec![3.0, 1.0, 2.0]);
    }

    #[test]
    fn test_delay_rounding() {
        // delay of 1.6 samples rounds to 2; 1.4 rounds to 1
        let spec = |ms: f64| TrackSpec::MatrixCoefficient {
            input: Box::new(TrackSpec::Direct(0)),
            coefficient: CoefficientSpec { gain: None, delay_ms: Some(ms) },
        };

        let mut p = TrackProcessor::new(&spec(1.6));
        assert_eq!(p.process(1000, &input()), vec![0.0, 0.0, 1.0]);

        let mut p = TrackProcessor::new(&spec(1.4));
        assert_eq!(p.process(1000, &input()), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_multi() {
        let mut p = MultiTrackProcessor::new(&[TrackSpec::Direct(1), TrackSpec::Silent]);
        let out = p.process(48000, &input());
        assert_eq!(out.shape(), &[3, 2]);
        assert_eq!(out[[1, 0]], 20.0);
        assert_eq!(out[[1, 1]], 0.0);
    }
}
