//! BW64 writing

use byteorder::{LittleEndian, WriteBytesExt};
use ndarray::Array2;
use std::io::{Seek, SeekFrom, Write};

use crate::chunks::{ChnaChunk, FormatInfo, FORMAT_IEEE_FLOAT, FORMAT_PCM};
use crate::error::{FileError, FileResult};

/// Writer for WAV files with `axml` and `chna` chunks.
///
/// Metadata chunks are set before the first sample block is written; chunk
/// sizes are patched in `finalize`. Files larger than 4 GiB are not
/// produced.
pub struct Bw64Writer<W: Write + Seek> {
    writer: W,
    format: FormatInfo,
    axml: Option<Vec<u8>>,
    chna: Option<ChnaChunk>,
    header_written: bool,
    riff_size_pos: u64,
    data_size_pos: u64,
    data_bytes: u64,
}

impl<W: Write + Seek> Bw64Writer<W> {
    pub fn new(writer: W, format: FormatInfo) -> FileResult<Self> {
        if !matches!(
            (format.format_tag, format.bits_per_sample),
            (FORMAT_PCM, 16) | (FORMAT_PCM, 24) | (FORMAT_IEEE_FLOAT, 32)
        ) {
            return Err(FileError::UnsupportedEncoding(format!(
                "cannot write format tag {:#06x} with {} bits per sample",
                format.format_tag, format.bits_per_sample
            )));
        }

        Ok(Self {
            writer,
            format,
            axml: None,
            chna: None,
            header_written: false,
            riff_size_pos: 0,
            data_size_pos: 0,
            data_bytes: 0,
        })
    }

    /// Set the `axml` chunk contents; must happen before writing samples.
    pub fn set_axml(&mut self, axml: Vec<u8>) {
        assert!(!self.header_written, "axml must be set before writing samples");
        self.axml = Some(axml);
    }

    /// Set the `chna` chunk contents; must happen before writing samples.
    pub fn set_chna(&mut self, chna: ChnaChunk) {
        assert!(!self.header_written, "chna must be set before writing samples");
        self.chna = Some(chna);
    }

    fn write_header(&mut self) -> FileResult<()> {
        let w = &mut self.writer;

        w.write_all(b"RIFF")?;
        self.riff_size_pos = w.stream_position()?;
        w.write_u32::<LittleEndian>(0)?;
        w.write_all(b"WAVE")?;

        w.write_all(b"fmt ")?;
        w.write_u32::<LittleEndian>(16)?;
        self.format.write(&mut *w)?;

        if let Some(chna) = &self.chna {
            let mut bytes = Vec::with_capacity(chna.byte_size());
            chna.write(&mut bytes)?;

            w.write_all(b"chna")?;
            w.write_u32::<LittleEndian>(bytes.len() as u32)?;
            w.write_all(&bytes)?;
            if bytes.len() % 2 == 1 {
                w.write_all(&[0])?;
            }
        }

        if let Some(axml) = &self.axml {
            w.write_all(b"axml")?;
            w.write_u32::<LittleEndian>(axml.len() as u32)?;
            w.write_all(axml)?;
            if axml.len() % 2 == 1 {
                w.write_all(&[0])?;
            }
        }

        w.write_all(b"data")?;
        self.data_size_pos = w.stream_position()?;
        w.write_u32::<LittleEndian>(0)?;

        self.header_written = true;
        Ok(())
    }

    /// Write a block of samples of shape (frames, channels), clipped to
    /// full scale.
    pub fn write_sample_block(&mut self, samples: &Array2<f64>) -> FileResult<()> {
        if !self.header_written {
            self.write_header()?;
        }

        if samples.ncols() != self.format.channel_count as usize {
            return Err(FileError::BadFormat(format!(
                "expected {} channels, got {}",
                self.format.channel_count,
                samples.ncols()
            )));
        }

        let mut bytes =
            Vec::with_capacity(samples.nrows() * self.format.block_align() as usize);

        for row in samples.rows() {
            for &sample in row {
                match (self.format.format_tag, self.format.bits_per_sample) {
                    (FORMAT_PCM, 16) => {
                        let v = (sample.clamp(-1.0, 1.0) * 32767.0).round() as i16;
                        bytes.write_i16::<LittleEndian>(v)?;
                    }
                    (FORMAT_PCM, 24) => {
                        let v = (sample.clamp(-1.0, 1.0) * 8388607.0).round() as i32;
                        bytes.write_i24::<LittleEndian>(v)?;
                    }
                    (FORMAT_IEEE_FLOAT, 32) => {
                        bytes.write_f32::<LittleEndian>(sample as f32)?;
                    }
                    _ => unreachable!("validated in new"),
                }
            }
        }

        self.writer.write_all(&bytes)?;
        self.data_bytes += bytes.len() as u64;

        if self.data_bytes > u32::MAX as u64 {
            return Err(FileError::BadFormat(
                "output too large for a 32-bit RIFF file".into(),
            ));
        }

        Ok(())
    }

    /// Patch the chunk sizes; the writer is unusable afterwards.
    pub fn finalize(mut self) -> FileResult<()> {
        if !self.header_written {
            self.write_header()?;
        }

        let end = self.writer.stream_position()?;

        self.writer.seek(SeekFrom::Start(self.data_size_pos))?;
        self.writer.write_u32::<LittleEndian>(self.data_bytes as u32)?;

        self.writer.seek(SeekFrom::Start(self.riff_size_pos))?;
        self.writer.write_u32::<LittleEndian>((end - 8) as u32)?;

        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::Bw64Reader;
    use admr_model::chna::{ChnaEntry, ChnaTable};
    use std::io::Cursor;

    #[test]
    fn test_float_round_trip_is_exact() {
        let format = FormatInfo {
            format_tag: FORMAT_IEEE_FLOAT,
            channel_count: 1,
            sample_rate: 44100,
            bits_per_sample: 32,
        };

        let mut samples = Array2::zeros((10, 1));
        for i in 0..10 {
            samples[[i, 0]] = (i as f64 * 0.125).sin() as f32 as f64;
        }

        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = Bw64Writer::new(&mut buf, format).unwrap();
            writer.write_sample_block(&samples).unwrap();
            writer.finalize().unwrap();
        }

        buf.set_position(0);
        let mut reader = Bw64Reader::new(buf).unwrap();
        let block = reader.read_sample_block(10).unwrap();
        assert_eq!(block, samples);
    }

    #[test]
    fn test_chna_round_trip() {
        let format = FormatInfo {
            format_tag: FORMAT_PCM,
            channel_count: 1,
            sample_rate: 48000,
            bits_per_sample: 16,
        };

        let chna = ChnaChunk {
            table: ChnaTable {
                entries: vec![ChnaEntry {
                    track_index: 1,
                    track_uid_id: "ATU_00000001".into(),
                    track_format_id: "AT_00010001_01".into(),
                    pack_format_id: "AP_00010001".into(),
                }],
            },
        };

        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = Bw64Writer::new(&mut buf, format).unwrap();
            writer.set_chna(chna.clone());
            writer.write_sample_block(&Array2::zeros((4, 1))).unwrap();
            writer.finalize().unwrap();
        }

        buf.set_position(0);
        let reader = Bw64Reader::new(buf).unwrap();
        assert_eq!(reader.chna(), Some(&chna));
    }

    #[test]
    fn test_wrong_channel_count_rejected() {
        let format = FormatInfo {
            format_tag: FORMAT_PCM,
            channel_count: 2,
            sample_rate: 48000,
            bits_per_sample: 16,
        };

        let mut buf = Cursor::new(Vec::new());
        let mut writer = Bw64Writer::new(&mut buf, format).unwrap();
        assert!(writer.write_sample_block(&Array2::zeros((4, 3))).is_err());
    }
}
