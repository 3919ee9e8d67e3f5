//! Per-type renderers and the top-level renderer
//!
//! The top-level `Renderer` owns one renderer per ADM type path; each
//! consumes its rendering items and produces output sample blocks, which are
//! summed on the block aligner.

mod direct_speakers;
mod hoa;
mod objects;

pub use direct_speakers::DirectSpeakersRenderer;
pub use hoa::HoaRenderer;
pub use objects::ObjectsRenderer;

use admr_core::layout::Layout;
use admr_core::Warnings;
use admr_model::items::RenderingItem;
use ndarray::Array2;

use crate::aligner::BlockAligner;
use crate::error::RenderResult;

/// Renderer supporting all the ADM type paths.
pub struct Renderer {
    aligner: BlockAligner,
    objects: ObjectsRenderer,
    direct_speakers: DirectSpeakersRenderer,
    hoa: HoaRenderer,
    start_sample: i64,
}

impl Renderer {
    pub fn new(layout: &Layout) -> RenderResult<Self> {
        Ok(Self {
            aligner: BlockAligner::new(layout.num_channels()),
            objects: ObjectsRenderer::new(layout)?,
            direct_speakers: DirectSpeakersRenderer::new(layout)?,
            hoa: HoaRenderer::new(layout)?,
            start_sample: 0,
        })
    }

    /// Set the rendering items to process.
    ///
    /// This resets the internal state, so it should be called once before
    /// rendering starts.
    pub fn set_rendering_items(&mut self, items: &[RenderingItem]) -> RenderResult<()> {
        let objects = items.iter().filter_map(|i| match i {
            RenderingItem::Objects(item) => Some(item.clone()),
            _ => None,
        });
        self.objects.set_rendering_items(objects.collect());

        let direct = items.iter().filter_map(|i| match i {
            RenderingItem::DirectSpeakers(item) => Some(item.clone()),
            _ => None,
        });
        self.direct_speakers.set_rendering_items(direct.collect());

        let hoa = items.iter().filter_map(|i| match i {
            RenderingItem::Hoa(item) => Some(item.clone()),
            _ => None,
        });
        self.hoa.set_rendering_items(hoa.collect());

        self.start_sample = 0;
        Ok(())
    }

    /// Render n samples; input shape is (samples, tracks), output
    /// (samples, layout channels).
    pub fn render(
        &mut self,
        sample_rate: u32,
        samples: &Array2<f64>,
        warnings: &mut Warnings,
    ) -> RenderResult<Array2<f64>> {
        let objects_out = self
            .objects
            .render(sample_rate, self.start_sample, samples, warnings)?;
        self.aligner.add(self.start_sample, &objects_out);

        let direct_out =
            self.direct_speakers
                .render(sample_rate, self.start_sample, samples, warnings)?;
        self.aligner.add(self.start_sample, &direct_out);

        let hoa_out = self
            .hoa
            .render(sample_rate, self.start_sample, samples, warnings)?;
        self.aligner.add(self.start_sample, &hoa_out);

        self.start_sample += samples.nrows() as i64;

        Ok(self.aligner.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use admr_core::bs2051;
    use admr_core::Time;
    use admr_model::blocks::{
        DirectSpeakerPosition, DirectSpeakersBlock, JumpPosition, ObjectPosition, ObjectsBlock,
    };
    use admr_model::items::{
        AdmPath, DirectSpeakersRenderingItem, DirectSpeakersTypeMetadata, ExtraData,
        ImportanceData, MetadataSource, ObjectRenderingItem, ObjectTypeMetadata, TrackSpec,
    };

    fn sine_input(n: usize, tracks: usize) -> Array2<f64> {
        let mut input = Array2::zeros((n, tracks));
        for i in 0..n {
            input[[i, 0]] = (i as f64 * 0.1).sin();
        }
        input
    }

    fn objects_item(blocks: Vec<ObjectsBlock>) -> RenderingItem {
        RenderingItem::Objects(ObjectRenderingItem {
            track_spec: TrackSpec::Direct(0),
            metadata_source: MetadataSource::new(
                blocks
                    .into_iter()
                    .map(|block_format| ObjectTypeMetadata {
                        block_format,
                        extra_data: ExtraData::default(),
                    })
                    .collect(),
            ),
            importance: ImportanceData::default(),
            adm_path: AdmPath::default(),
        })
    }

    #[test]
    fn test_direct_speakers_passthrough() {
        // scenario A: DirectSpeakers labelled M+030 into 0+5+0 is a 1:1
        // route
        let layout = bs2051::get_layout("0+5+0").unwrap();
        let mut renderer = Renderer::new(&layout).unwrap();

        let block = DirectSpeakersBlock {
            id: "AB_1".into(),
            rtime: None,
            duration: None,
            position: DirectSpeakerPosition::polar(30.0, 0.0),
            speaker_labels: vec!["M+030".into()],
        };
        let item = RenderingItem::DirectSpeakers(DirectSpeakersRenderingItem {
            track_spec: TrackSpec::Direct(0),
            metadata_source: MetadataSource::new(vec![DirectSpeakersTypeMetadata {
                block_format: block,
                itu_pack_layout: None,
                extra_data: ExtraData::default(),
            }]),
            importance: ImportanceData::default(),
            adm_path: AdmPath::default(),
        });

        renderer.set_rendering_items(&[item]).unwrap();

        let input = sine_input(1024, 1);
        let mut warnings = Warnings::new();
        let output = renderer.render(48000, &input, &mut warnings).unwrap();

        assert_eq!(output.shape(), &[1024, 6]);
        let target = layout.channel_index("M+030").unwrap();
        for i in 0..1024 {
            assert!((output[[i, target]] - input[[i, 0]]).abs() < 1e-12);
            for c in 0..6 {
                if c != target {
                    assert_eq!(output[[i, c]], 0.0);
                }
            }
        }
    }

    #[test]
    fn test_objects_static_position() {
        // scenario B: a centre-front object splits equally between M+030
        // and M-030 of 0+2+0
        let layout = bs2051::get_layout("0+2+0").unwrap();
        let mut renderer = Renderer::new(&layout).unwrap();

        let block = ObjectsBlock::with_position("AB_1", ObjectPosition::polar(0.0, 0.0, 1.0));
        renderer.set_rendering_items(&[objects_item(vec![block])]).unwrap();

        let input = sine_input(512, 1);
        let mut warnings = Warnings::new();
        let output = renderer.render(48000, &input, &mut warnings).unwrap();

        let expected = 0.5_f64.sqrt();
        for i in 0..512 {
            assert!((output[[i, 0]] - expected * input[[i, 0]]).abs() < 1e-9);
            assert!((output[[i, 1]] - expected * input[[i, 0]]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_objects_interpolated_movement() {
        // scenario C: a position moving over one second produces a smooth
        // gain ramp between channels
        let layout = bs2051::get_layout("0+5+0").unwrap();
        let mut renderer = Renderer::new(&layout).unwrap();

        let sample_rate = 1000;
        let mut first =
            ObjectsBlock::with_position("AB_1", ObjectPosition::polar(30.0, 0.0, 1.0));
        first.rtime = Some(Time::ZERO);
        first.duration = Some(Time::ZERO);
        let mut second =
            ObjectsBlock::with_position("AB_2", ObjectPosition::polar(-30.0, 0.0, 1.0));
        second.rtime = Some(Time::ZERO);
        second.duration = Some(Time::from_seconds(1));
        second.jump_position = JumpPosition { flag: false, interpolation_length: None };

        renderer
            .set_rendering_items(&[objects_item(vec![first, second])])
            .unwrap();

        let input = Array2::from_elem((1000, 1), 1.0);
        let mut warnings = Warnings::new();
        let output = renderer.render(sample_rate, &input, &mut warnings).unwrap();

        let left = layout.channel_index("M+030").unwrap();
        let right = layout.channel_index("M-030").unwrap();

        // starts fully left, ends almost fully right
        assert!((output[[0, left]] - 1.0).abs() < 1e-9);
        assert!(output[[0, right]].abs() < 1e-9);
        assert!(output[[999, right]] > 0.99);

        // the gains crossfade linearly: left + right is one throughout, and
        // the midpoint is an equal split
        for i in 0..1000 {
            assert!((output[[i, left]] + output[[i, right]] - 1.0).abs() < 1e-9);
        }
        assert!((output[[500, left]] - 0.5).abs() < 1e-3);

        // gains are continuous: no per-sample jumps larger than the ramp
        // slope allows
        for i in 1..1000 {
            for &c in &[left, right] {
                assert!(
                    (output[[i, c]] - output[[i - 1, c]]).abs() < 0.002,
                    "step at {} channel {}",
                    i,
                    c
                );
            }
        }
    }

    #[test]
    fn test_objects_jump_position() {
        // with jumpPosition set and no interpolationLength, the gain steps
        // at the block boundary
        let layout = bs2051::get_layout("0+5+0").unwrap();
        let mut renderer = Renderer::new(&layout).unwrap();

        let sample_rate = 1000;
        let mut first =
            ObjectsBlock::with_position("AB_1", ObjectPosition::polar(30.0, 0.0, 1.0));
        first.rtime = Some(Time::ZERO);
        first.duration = Some(Time::new(1, 2));
        let mut second =
            ObjectsBlock::with_position("AB_2", ObjectPosition::polar(-30.0, 0.0, 1.0));
        second.rtime = Some(Time::new(1, 2));
        second.duration = Some(Time::new(1, 2));
        second.jump_position = JumpPosition { flag: true, interpolation_length: None };

        renderer
            .set_rendering_items(&[objects_item(vec![first, second])])
            .unwrap();

        let input = Array2::from_elem((1000, 1), 1.0);
        let mut warnings = Warnings::new();
        let output = renderer.render(sample_rate, &input, &mut warnings).unwrap();

        let left = layout.channel_index("M+030").unwrap();
        let right = layout.channel_index("M-030").unwrap();

        assert!((output[[499, left]] - 1.0).abs() < 1e-9);
        assert!((output[[500, right]] - 1.0).abs() < 1e-9);
        assert!(output[[500, left]].abs() < 1e-9);
    }

    #[test]
    fn test_metadata_gap_renders_silence() {
        // rtime > 0 for the first block: samples before it are silent
        let layout = bs2051::get_layout("0+5+0").unwrap();
        let mut renderer = Renderer::new(&layout).unwrap();

        let mut block = ObjectsBlock::with_position("AB_1", ObjectPosition::polar(30.0, 0.0, 1.0));
        block.rtime = Some(Time::new(1, 2));
        block.duration = Some(Time::new(1, 2));

        renderer.set_rendering_items(&[objects_item(vec![block])]).unwrap();

        let input = Array2::from_elem((1000, 1), 1.0);
        let mut warnings = Warnings::new();
        let output = renderer.render(1000, &input, &mut warnings).unwrap();

        let left = layout.channel_index("M+030").unwrap();
        assert_eq!(output[[0, left]], 0.0);
        assert_eq!(output[[499, left]], 0.0);
        assert!((output[[500, left]] - 1.0).abs() < 1e-9);
    }
}
