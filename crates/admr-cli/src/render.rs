//! File-to-file rendering driver

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{bail, Context, Result};
use ndarray::Array2;

use admr_core::layout::{load_real_layout, Layout};
use admr_core::{bs2051, Warnings};
use admr_file::chunks::{FormatInfo, FORMAT_PCM};
use admr_file::{AdmParser, Bw64Reader, Bw64Writer, JsonAdmParser};
use admr_model::blocks::BlockFormats;
use admr_model::select::{select_rendering_items, SelectionOptions};
use admr_model::timing::check_block_format_timings;
use admr_model::{AdmDocument, RenderingItem};
use admr_render::monitor::PeakMonitor;
use admr_render::{conversion, Renderer};

use crate::ConversionMode;

const BLOCK_SIZE: usize = 8192;

/// Ancillary rendering parameters and the file-to-file driver using them.
pub struct OfflineRenderDriver {
    pub target_layout: String,
    pub speakers_file: Option<std::path::PathBuf>,
    pub output_gain_db: f64,
    pub fail_on_overload: bool,
    pub enable_block_duration_fix: bool,
    pub programme_id: Option<String>,
    pub complementary_object_ids: Vec<String>,
    pub apply_conversion: Option<ConversionMode>,
    pub strict: bool,
}

impl OfflineRenderDriver {
    /// Load the target layout, applying the speakers file when given;
    /// returns the layout, an optional upmix matrix and the output channel
    /// count.
    fn load_output_layout(&self) -> Result<(Layout, Option<Array2<f64>>, usize)> {
        let layout = bs2051::get_layout(&self.target_layout).with_context(|| {
            format!(
                "available systems are: {}",
                bs2051::layout_names().join(", ")
            )
        })?;

        match &self.speakers_file {
            Some(path) => {
                let file = File::open(path)
                    .with_context(|| format!("opening speakers file {}", path.display()))?;
                let real_layout = load_real_layout(BufReader::new(file))?;

                let (layout, upmix) = layout.with_real_layout(&real_layout)?;
                layout.check_positions()?;
                layout.check_upmix_matrix(&upmix)?;

                let n_channels = upmix.nrows();
                Ok((layout, Some(upmix), n_channels))
            }
            None => {
                let n_channels = layout.num_channels();
                Ok((layout, None, n_channels))
            }
        }
    }

    fn output_gain_linear(&self) -> f64 {
        10.0_f64.powf(self.output_gain_db / 20.0)
    }

    /// Convert all Objects block formats to the selected coordinate
    /// convention.
    fn apply_conversion(&self, doc: &mut AdmDocument) {
        let Some(mode) = self.apply_conversion else { return };

        for channel in &mut doc.channel_formats {
            if let BlockFormats::Objects(blocks) = &mut channel.blocks {
                for block in blocks {
                    *block = match mode {
                        ConversionMode::ToPolar => conversion::to_polar(block),
                        ConversionMode::ToCartesian => conversion::to_cartesian(block),
                    };
                }
            }
        }
    }

    fn load_document(
        &self,
        reader: &Bw64Reader<BufReader<File>>,
        warnings: &mut Warnings,
    ) -> Result<AdmDocument> {
        let axml = reader
            .axml()
            .context("input file has no axml chunk")?;

        let mut doc = JsonAdmParser.parse(axml).context("parsing ADM document")?;

        if let Some(chna) = reader.chna() {
            chna.table.apply(&mut doc).context("applying CHNA table")?;
        }

        check_block_format_timings(&mut doc, self.enable_block_duration_fix, warnings)
            .context("checking block format timing")?;

        self.apply_conversion(&mut doc);

        Ok(doc)
    }

    /// Render input_file to output_file.
    pub fn run(&self, input_file: &Path, output_file: &Path) -> Result<()> {
        let (layout, upmix, n_channels) = self.load_output_layout()?;

        let file = File::open(input_file)
            .with_context(|| format!("opening {}", input_file.display()))?;
        let mut infile = Bw64Reader::new(BufReader::new(file))?;

        let mut warnings = Warnings::new();
        let doc = self.load_document(&infile, &mut warnings)?;

        let options = SelectionOptions {
            programme_id: self.programme_id.clone(),
            complementary_object_ids: self.complementary_object_ids.clone(),
        };
        let items = select_rendering_items(&doc, &options, &mut warnings)
            .context("selecting rendering items")?;

        // track indices come from the CHNA chunk and must fit the file
        let max_index = items
            .iter()
            .flat_map(|item| -> Vec<_> {
                match item {
                    RenderingItem::Objects(i) => vec![i.track_spec.max_direct_index()],
                    RenderingItem::DirectSpeakers(i) => vec![i.track_spec.max_direct_index()],
                    RenderingItem::Hoa(i) => {
                        i.track_specs.iter().map(|t| t.max_direct_index()).collect()
                    }
                }
            })
            .flatten()
            .max();
        if let Some(max_index) = max_index {
            if max_index >= infile.channels() {
                bail!(
                    "CHNA references track {} but the file has only {} tracks",
                    max_index + 1,
                    infile.channels()
                );
            }
        }

        let mut renderer = Renderer::new(&layout)?;
        renderer.set_rendering_items(&items)?;

        let format = FormatInfo {
            format_tag: FORMAT_PCM,
            channel_count: n_channels as u16,
            sample_rate: infile.sample_rate(),
            bits_per_sample: 24,
        };
        let out = File::create(output_file)
            .with_context(|| format!("creating {}", output_file.display()))?;
        let mut outfile = Bw64Writer::new(std::io::BufWriter::new(out), format)?;

        let mut monitor = PeakMonitor::new(n_channels);
        let gain = self.output_gain_linear();

        loop {
            let input = infile.read_sample_block(BLOCK_SIZE)?;
            if input.nrows() == 0 {
                break;
            }

            let mut output = renderer.render(infile.sample_rate(), &input, &mut warnings)?;
            output.mapv_inplace(|s| s * gain);

            let output = match &upmix {
                Some(upmix) => apply_upmix(&output, upmix),
                None => output,
            };

            monitor.process(&output);
            outfile.write_sample_block(&output)?;
        }

        outfile.finalize()?;

        monitor.warn_overloaded(&mut warnings);

        if self.strict && !warnings.is_empty() {
            let lines = warnings.into_lines();
            bail!("warnings treated as errors:\n{}", lines.join("\n"));
        }
        for line in warnings.into_lines() {
            eprintln!("warning: {}", line);
        }

        if self.fail_on_overload {
            monitor.check_overload()?;
        }

        Ok(())
    }
}

/// Map layout channels to output channels: rows of `samples` times the
/// transpose of the upmix matrix.
fn apply_upmix(samples: &Array2<f64>, upmix: &Array2<f64>) -> Array2<f64> {
    let mut out = Array2::zeros((samples.nrows(), upmix.nrows()));
    for i in 0..samples.nrows() {
        for r in 0..upmix.nrows() {
            let mut acc = 0.0;
            for c in 0..samples.ncols() {
                acc += upmix[[r, c]] * samples[[i, c]];
            }
            out[[i, r]] = acc;
        }
    }
    out
}
