//! File inspection and generation utilities

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use ndarray::Array2;

use admr_file::chunks::{FormatInfo, FORMAT_PCM};
use admr_file::json_adm::document_to_json;
use admr_file::{AdmParser, Bw64Reader, Bw64Writer, ChnaChunk, JsonAdmParser};
use admr_model::blocks::{Normalization, ObjectPosition, ObjectsBlock};
use admr_model::builder::AdmBuilder;
use admr_model::chna::ChnaTable;

#[derive(Subcommand)]
pub enum UtilCommands {
    /// Generate a test BW64 file with a panned sine object
    MakeTestBwf {
        output_file: PathBuf,

        /// Azimuth of the object in degrees
        #[arg(long, default_value_t = 0.0)]
        azimuth: f64,

        /// Duration in seconds
        #[arg(long, default_value_t = 5)]
        duration: u32,

        /// Sample rate
        #[arg(long, default_value_t = 48000)]
        sample_rate: u32,
    },

    /// Replace the axml chunk of a file
    ReplaceAxml {
        input_file: PathBuf,
        output_file: PathBuf,

        /// File to read the new axml payload from
        #[arg(short, long)]
        axml: PathBuf,
    },

    /// Print the axml chunk of a file
    DumpAxml { input_file: PathBuf },

    /// Print the chna chunk of a file
    DumpChna { input_file: PathBuf },

    /// Wrap a plain ambiX WAV file as BW64 with HOA metadata
    AmbixToBwf {
        input_file: PathBuf,
        output_file: PathBuf,

        /// NFC reference distance; 0 disables compensation
        #[arg(long, default_value_t = 0.0)]
        nfc_ref_dist: f64,
    },

    /// Parse and rewrite the metadata chunks canonically
    Regenerate {
        input_file: PathBuf,
        output_file: PathBuf,
    },
}

pub fn run(command: UtilCommands) -> Result<()> {
    match command {
        UtilCommands::MakeTestBwf { output_file, azimuth, duration, sample_rate } => {
            make_test_bwf(&output_file, azimuth, duration, sample_rate)
        }
        UtilCommands::ReplaceAxml { input_file, output_file, axml } => {
            replace_axml(&input_file, &output_file, &axml)
        }
        UtilCommands::DumpAxml { input_file } => dump_axml(&input_file),
        UtilCommands::DumpChna { input_file } => dump_chna(&input_file),
        UtilCommands::AmbixToBwf { input_file, output_file, nfc_ref_dist } => {
            ambix_to_bwf(&input_file, &output_file, nfc_ref_dist)
        }
        UtilCommands::Regenerate { input_file, output_file } => {
            regenerate(&input_file, &output_file)
        }
    }
}

fn open_reader(path: &Path) -> Result<Bw64Reader<BufReader<File>>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    Ok(Bw64Reader::new(BufReader::new(file))?)
}

fn create_writer(path: &Path, format: FormatInfo) -> Result<Bw64Writer<BufWriter<File>>> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    Ok(Bw64Writer::new(BufWriter::new(file), format)?)
}

fn copy_samples(
    reader: &mut Bw64Reader<BufReader<File>>,
    writer: &mut Bw64Writer<BufWriter<File>>,
) -> Result<()> {
    loop {
        let block = reader.read_sample_block(8192)?;
        if block.nrows() == 0 {
            return Ok(());
        }
        writer.write_sample_block(&block)?;
    }
}

fn make_test_bwf(output: &Path, azimuth: f64, duration: u32, sample_rate: u32) -> Result<()> {
    let mut builder = AdmBuilder::new();
    let block = ObjectsBlock::with_position(
        "AB_10011001_00000001",
        ObjectPosition::polar(azimuth, 0.0, 1.0),
    );
    let object = builder.add_objects_item(1, "test sine", vec![block], 1)?;
    builder.add_default_programme(&[object])?;
    let doc = builder.finish();

    let format = FormatInfo {
        format_tag: FORMAT_PCM,
        channel_count: 1,
        sample_rate,
        bits_per_sample: 24,
    };

    let mut writer = create_writer(output, format)?;
    writer.set_axml(document_to_json(&doc)?);
    writer.set_chna(ChnaChunk {
        table: ChnaTable::from_document(&doc)?,
    });

    // a -20 dBFS sine at 1 kHz
    let n = (duration * sample_rate) as usize;
    let amplitude = 0.1;
    let step = 2.0 * std::f64::consts::PI * 1000.0 / sample_rate as f64;
    let mut samples = Array2::zeros((n, 1));
    for i in 0..n {
        samples[[i, 0]] = amplitude * (step * i as f64).sin();
    }

    writer.write_sample_block(&samples)?;
    writer.finalize()?;
    Ok(())
}

fn replace_axml(input: &Path, output: &Path, axml_file: &Path) -> Result<()> {
    let mut axml = Vec::new();
    File::open(axml_file)
        .with_context(|| format!("opening {}", axml_file.display()))?
        .read_to_end(&mut axml)?;

    let mut reader = open_reader(input)?;
    let mut writer = create_writer(output, reader.format())?;

    writer.set_axml(axml);
    if let Some(chna) = reader.chna() {
        writer.set_chna(chna.clone());
    }

    copy_samples(&mut reader, &mut writer)?;
    writer.finalize()?;
    Ok(())
}

fn dump_axml(input: &Path) -> Result<()> {
    let reader = open_reader(input)?;
    let axml = reader.axml().context("file has no axml chunk")?;

    std::io::stdout().write_all(axml)?;
    Ok(())
}

fn dump_chna(input: &Path) -> Result<()> {
    let reader = open_reader(input)?;
    let chna = reader.chna().context("file has no chna chunk")?;

    for entry in &chna.table.entries {
        println!(
            "{} {} {} {}",
            entry.track_index,
            entry.track_uid_id,
            entry.track_format_id,
            if entry.pack_format_id.is_empty() {
                "-"
            } else {
                &entry.pack_format_id
            },
        );
    }
    Ok(())
}

fn ambix_to_bwf(input: &Path, output: &Path, nfc_ref_dist: f64) -> Result<()> {
    let mut reader = open_reader(input)?;

    // the channel count must be a square, (order + 1)^2
    let channels = reader.channels();
    let order = (channels as f64).sqrt() as i32 - 1;
    if ((order + 1) * (order + 1)) as usize != channels {
        bail!(
            "ambiX files must have a square number of channels, got {}",
            channels
        );
    }

    // ACN channel ordering
    let orders_degrees: Vec<(i32, i32)> = (0..=order)
        .flat_map(|n| (-n..=n).map(move |m| (n, m)))
        .collect();

    let mut builder = AdmBuilder::new();
    let (object, pack) =
        builder.add_hoa_item(1, "ambiX", &orders_degrees, Normalization::SN3D, 1)?;
    if nfc_ref_dist != 0.0 {
        builder.pack_format_mut(pack).nfc_ref_dist = Some(nfc_ref_dist);
    }
    builder.add_default_programme(&[object])?;
    let doc = builder.finish();

    let mut writer = create_writer(output, reader.format())?;
    writer.set_axml(document_to_json(&doc)?);
    writer.set_chna(ChnaChunk {
        table: ChnaTable::from_document(&doc)?,
    });

    copy_samples(&mut reader, &mut writer)?;
    writer.finalize()?;
    Ok(())
}

fn regenerate(input: &Path, output: &Path) -> Result<()> {
    let mut reader = open_reader(input)?;

    let axml = reader.axml().context("file has no axml chunk")?;
    let mut doc = JsonAdmParser.parse(axml)?;
    if let Some(chna) = reader.chna() {
        chna.table.apply(&mut doc)?;
    }

    let mut writer = create_writer(output, reader.format())?;
    writer.set_axml(document_to_json(&doc)?);
    writer.set_chna(ChnaChunk {
        table: ChnaTable::from_document(&doc)?,
    });

    copy_samples(&mut reader, &mut writer)?;
    writer.finalize()?;
    Ok(())
}
