//! The HOA type renderer
//!
//! Each HOA item carries one static decoder matrix over its lifetime, so
//! metadata is interpreted up front: per item, a time interval, a decoder of
//! shape (speakers, channels) and optional per-channel near-field
//! compensation filters.

use admr_core::layout::Layout;
use admr_core::Warnings;
use admr_model::items::{HoaRenderingItem, HoaTypeMetadata};
use ndarray::Array2;

use crate::block::{BlockTiming, InterpretTimingMetadata};
use crate::error::RenderResult;
use crate::hoa::{HoaDecoderDesign, NfcFilter};
use crate::point_source;
use crate::track_processor::MultiTrackProcessor;

struct InterpretedHoaBlock {
    /// timing at the most recently seen sample rate
    timing: BlockTiming,
    decoder: Array2<f64>,
    /// one filter per input channel when nfcRefDist is set
    nfc: Option<Vec<NfcFilter>>,
    meta: HoaTypeMetadata,
}

struct HoaItem {
    tracks: MultiTrackProcessor,
    metadata: Vec<HoaTypeMetadata>,
    /// interpreted lazily at the first render call, when the sample rate is
    /// known
    blocks: Option<Vec<InterpretedHoaBlock>>,
    context: String,
}

/// Renderer for all HOA rendering items.
pub struct HoaRenderer {
    design: HoaDecoderDesign,
    /// mean real distance of the non-LFE speakers, used as the NFC
    /// reproduction distance
    reproduction_distance: f64,
    /// index of each non-LFE channel in the full channel list
    non_lfe_indices: Vec<usize>,
    num_channels: usize,
    items: Vec<HoaItem>,
}

impl HoaRenderer {
    pub fn new(layout: &Layout) -> RenderResult<Self> {
        let without_lfe = layout.without_lfe();
        let panner = point_source::configure(&without_lfe)?;

        let mean_distance = without_lfe
            .channels
            .iter()
            .map(|c| c.polar_position.distance)
            .sum::<f64>()
            / without_lfe.num_channels() as f64;

        Ok(Self {
            design: HoaDecoderDesign::new(&panner)?,
            reproduction_distance: if mean_distance > 0.0 { mean_distance } else { 1.0 },
            non_lfe_indices: (0..layout.num_channels())
                .filter(|&i| !layout.channels[i].is_lfe)
                .collect(),
            num_channels: layout.num_channels(),
            items: Vec::new(),
        })
    }

    pub fn set_rendering_items(&mut self, items: Vec<HoaRenderingItem>) {
        self.items = items
            .into_iter()
            .map(|item| HoaItem {
                tracks: MultiTrackProcessor::new(&item.track_specs),
                metadata: item.metadata_source.blocks().to_vec(),
                blocks: None,
                context: item
                    .adm_paths
                    .first()
                    .map(|p| p.display())
                    .unwrap_or_default(),
            })
            .collect();
    }

    fn interpret(
        &self,
        metadata: &[HoaTypeMetadata],
        sample_rate: u32,
        warnings: &mut Warnings,
    ) -> RenderResult<Vec<InterpretedHoaBlock>> {
        let mut timing = InterpretTimingMetadata::new();

        metadata
            .iter()
            .map(|meta| {
                if meta.screen_ref {
                    warnings.warn("screenRef for HOA is not implemented; ignoring");
                }

                let (start, end) = timing.block_start_end(
                    "HOA block",
                    meta.rtime,
                    meta.duration,
                    meta.extra_data.object_start,
                    meta.extra_data.object_duration,
                )?;

                let decoder = self.design.design(meta)?;

                let nfc = meta
                    .nfc_ref_dist
                    .map(|ref_dist| {
                        meta.orders
                            .iter()
                            .map(|&order| {
                                NfcFilter::new(
                                    order,
                                    ref_dist,
                                    self.reproduction_distance,
                                    sample_rate as f64,
                                )
                            })
                            .collect::<RenderResult<Vec<_>>>()
                    })
                    .transpose()?;

                Ok(InterpretedHoaBlock {
                    timing: BlockTiming::new(
                        start.to_fractional_samples(sample_rate),
                        end.map(|t| t.to_fractional_samples(sample_rate)),
                    ),
                    decoder,
                    nfc,
                    meta: meta.clone(),
                })
            })
            .collect()
    }

    pub fn render(
        &mut self,
        sample_rate: u32,
        start_sample: i64,
        input: &Array2<f64>,
        warnings: &mut Warnings,
    ) -> RenderResult<Array2<f64>> {
        let mut output = Array2::zeros((input.nrows(), self.num_channels));

        // interpret metadata on first use; self.items is taken apart to keep
        // the borrows disjoint
        for item_index in 0..self.items.len() {
            if self.items[item_index].blocks.is_none() {
                let interpreted = self
                    .interpret(&self.items[item_index].metadata, sample_rate, warnings)
                    .map_err(|e| e.in_item(&self.items[item_index].context))?;
                self.items[item_index].blocks = Some(interpreted);
            }

            let item = &mut self.items[item_index];
            let mut track_samples = item.tracks.process(sample_rate, input);

            for block in item.blocks.as_mut().expect("interpreted above") {
                let Some((_, sample_range)) =
                    block.timing.overlap(start_sample, input.nrows())
                else {
                    continue;
                };

                // near-field compensation runs per input channel before the
                // static decode
                if let Some(nfc) = &mut block.nfc {
                    for (c, filter) in nfc.iter_mut().enumerate() {
                        let mut column: Vec<f64> = sample_range
                            .clone()
                            .map(|i| track_samples[[i, c]])
                            .collect();
                        filter.process(&mut column);
                        for (i, s) in sample_range.clone().zip(column) {
                            track_samples[[i, c]] = s;
                        }
                    }
                }

                let n_inputs = block.meta.orders.len();
                for i in sample_range {
                    for (l, &out_channel) in self.non_lfe_indices.iter().enumerate() {
                        let mut acc = 0.0;
                        for c in 0..n_inputs {
                            acc += block.decoder[[l, c]] * track_samples[[i, c]];
                        }
                        output[[i, out_channel]] += acc;
                    }
                }
            }
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use admr_core::bs2051;
    use admr_model::blocks::Normalization;
    use admr_model::items::{AdmPath, ExtraData, ImportanceData, MetadataSource, TrackSpec};

    fn first_order_item(nfc_ref_dist: Option<f64>) -> HoaRenderingItem {
        HoaRenderingItem {
            track_specs: (0..4).map(TrackSpec::Direct).collect(),
            metadata_source: MetadataSource::new(vec![HoaTypeMetadata {
                rtime: None,
                duration: None,
                orders: vec![0, 1, 1, 1],
                degrees: vec![0, -1, 0, 1],
                normalization: Normalization::SN3D,
                nfc_ref_dist,
                screen_ref: false,
                extra_data: ExtraData::default(),
            }]),
            importances: vec![ImportanceData::default(); 4],
            adm_paths: vec![AdmPath::default(); 4],
        }
    }

    #[test]
    fn test_omni_renders_to_all_speakers() {
        let layout = bs2051::get_layout("0+5+0").unwrap();
        let mut renderer = HoaRenderer::new(&layout).unwrap();
        renderer.set_rendering_items(vec![first_order_item(None)]);

        // W-only input: constant over all directions
        let mut input = Array2::zeros((64, 4));
        for i in 0..64 {
            input[[i, 0]] = 1.0;
        }

        let mut warnings = Warnings::new();
        let output = renderer.render(48000, 0, &input, &mut warnings).unwrap();
        assert_eq!(output.shape(), &[64, 6]);

        // all non-LFE speakers get some signal, the LFE none
        let lfe = layout.channel_index("LFE1").unwrap();
        assert_eq!(output[[32, lfe]], 0.0);

        let active = (0..6)
            .filter(|&c| c != lfe && output[[32, c]].abs() > 1e-3)
            .count();
        assert!(active >= 4, "only {} speakers active", active);
    }

    #[test]
    fn test_static_decode_is_time_invariant() {
        let layout = bs2051::get_layout("0+5+0").unwrap();
        let mut renderer = HoaRenderer::new(&layout).unwrap();
        renderer.set_rendering_items(vec![first_order_item(None)]);

        let input = Array2::from_elem((16, 4), 0.25);
        let mut warnings = Warnings::new();
        let a = renderer.render(48000, 0, &input, &mut warnings).unwrap();
        let b = renderer.render(48000, 16, &input, &mut warnings).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_nfc_changes_output() {
        let layout = bs2051::get_layout("0+5+0").unwrap();

        let mut plain = HoaRenderer::new(&layout).unwrap();
        plain.set_rendering_items(vec![first_order_item(None)]);

        let mut nfc = HoaRenderer::new(&layout).unwrap();
        nfc.set_rendering_items(vec![first_order_item(Some(2.0))]);

        let mut input = Array2::zeros((64, 4));
        input[[0, 1]] = 1.0; // an impulse on a first-order channel

        let mut warnings = Warnings::new();
        let a = plain.render(48000, 0, &input, &mut warnings).unwrap();
        let b = nfc.render(48000, 0, &input, &mut warnings).unwrap();
        assert_ne!(a, b);
    }
}
