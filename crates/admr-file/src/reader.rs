//! BW64 reading

use byteorder::{LittleEndian, ReadBytesExt};
use ndarray::Array2;
use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};

use crate::chunks::{ChnaChunk, FormatInfo, FORMAT_IEEE_FLOAT, FORMAT_PCM};
use crate::error::{FileError, FileResult};

/// Reader for BW64/RF64/RIFF WAV files.
///
/// The header is parsed up front; sample blocks are then pulled on demand
/// with `read_sample_block`.
pub struct Bw64Reader<R> {
    reader: R,
    format: FormatInfo,
    data_start: u64,
    data_size: u64,
    read_frames: u64,
    axml: Option<Vec<u8>>,
    chna: Option<ChnaChunk>,
}

impl<R: Read + Seek> Bw64Reader<R> {
    pub fn new(mut reader: R) -> FileResult<Self> {
        let mut riff_id = [0u8; 4];
        reader.read_exact(&mut riff_id)?;
        if !matches!(&riff_id, b"RIFF" | b"BW64" | b"RF64") {
            return Err(FileError::BadFormat("not a RIFF/BW64/RF64 file".into()));
        }

        let _riff_size = reader.read_u32::<LittleEndian>()?;

        let mut wave_id = [0u8; 4];
        reader.read_exact(&mut wave_id)?;
        if &wave_id != b"WAVE" {
            return Err(FileError::BadFormat("missing WAVE identifier".into()));
        }

        let mut format = None;
        let mut data: Option<(u64, u64)> = None;
        let mut axml = None;
        let mut chna = None;
        // 64-bit sizes for chunks listed in ds64
        let mut ds64_sizes: HashMap<[u8; 4], u64> = HashMap::new();

        loop {
            let mut chunk_id = [0u8; 4];
            match reader.read_exact(&mut chunk_id) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            let chunk_size_32 = reader.read_u32::<LittleEndian>()?;
            let chunk_size = if chunk_size_32 == u32::MAX {
                ds64_sizes.get(&chunk_id).copied().ok_or_else(|| {
                    FileError::BadFormat(format!(
                        "chunk {} has a 64-bit size but no ds64 entry",
                        String::from_utf8_lossy(&chunk_id)
                    ))
                })?
            } else {
                chunk_size_32 as u64
            };

            match &chunk_id {
                b"ds64" => {
                    let mut chunk = vec![0u8; chunk_size as usize];
                    reader.read_exact(&mut chunk)?;
                    let mut rest = chunk.as_slice();

                    let riff_size = rest.read_u64::<LittleEndian>()?;
                    let data_size = rest.read_u64::<LittleEndian>()?;
                    let _sample_count = rest.read_u64::<LittleEndian>()?;
                    ds64_sizes.insert(*b"RF64", riff_size);
                    ds64_sizes.insert(*b"data", data_size);

                    let table_length = rest.read_u32::<LittleEndian>()?;
                    for _ in 0..table_length {
                        let mut id = [0u8; 4];
                        rest.read_exact(&mut id)?;
                        let size = rest.read_u64::<LittleEndian>()?;
                        ds64_sizes.insert(id, size);
                    }
                }
                b"fmt " => {
                    let mut chunk = vec![0u8; chunk_size as usize];
                    reader.read_exact(&mut chunk)?;
                    format = Some(FormatInfo::read(&chunk)?);
                }
                b"data" => {
                    let start = reader.stream_position()?;
                    data = Some((start, chunk_size));
                    reader.seek(SeekFrom::Current(chunk_size as i64))?;
                }
                b"axml" => {
                    let mut chunk = vec![0u8; chunk_size as usize];
                    reader.read_exact(&mut chunk)?;
                    axml = Some(chunk);
                }
                b"chna" => {
                    let mut chunk = vec![0u8; chunk_size as usize];
                    reader.read_exact(&mut chunk)?;
                    chna = Some(ChnaChunk::read(&chunk)?);
                }
                _ => {
                    reader.seek(SeekFrom::Current(chunk_size as i64))?;
                }
            }

            // chunks are word aligned
            if chunk_size % 2 == 1 {
                reader.seek(SeekFrom::Current(1))?;
            }
        }

        let format = format.ok_or(FileError::BadChunk {
            chunk: "fmt ",
            message: "missing".into(),
        })?;
        let (data_start, data_size) = data.ok_or(FileError::BadChunk {
            chunk: "data",
            message: "missing".into(),
        })?;

        reader.seek(SeekFrom::Start(data_start))?;

        Ok(Self {
            reader,
            format,
            data_start,
            data_size,
            read_frames: 0,
            axml,
            chna,
        })
    }

    pub fn format(&self) -> FormatInfo {
        self.format
    }

    pub fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.format.channel_count as usize
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.format.bits_per_sample
    }

    /// Raw `axml` chunk contents, if present.
    pub fn axml(&self) -> Option<&[u8]> {
        self.axml.as_deref()
    }

    /// Decoded `chna` chunk, if present.
    pub fn chna(&self) -> Option<&ChnaChunk> {
        self.chna.as_ref()
    }

    /// Number of frames in the data chunk.
    pub fn num_frames(&self) -> u64 {
        self.data_size / self.format.block_align() as u64
    }

    /// Read up to `n` frames as an array of shape (frames, channels) of
    /// floats in [-1, 1]; a zero-row result indicates the end of the file.
    pub fn read_sample_block(&mut self, n: usize) -> FileResult<Array2<f64>> {
        let remaining = self.num_frames() - self.read_frames;
        let n = (n as u64).min(remaining) as usize;

        let channels = self.channels();
        let bytes_per_sample = (self.format.bits_per_sample / 8) as usize;
        let mut raw = vec![0u8; n * channels * bytes_per_sample];
        self.reader.read_exact(&mut raw)?;
        self.read_frames += n as u64;

        let mut out = Array2::zeros((n, channels));
        let mut cursor = raw.as_slice();

        for i in 0..n {
            for c in 0..channels {
                out[[i, c]] = match (self.format.format_tag, self.format.bits_per_sample) {
                    (FORMAT_PCM, 16) => {
                        cursor.read_i16::<LittleEndian>()? as f64 / 32768.0
                    }
                    (FORMAT_PCM, 24) => {
                        cursor.read_i24::<LittleEndian>()? as f64 / 8388608.0
                    }
                    (FORMAT_PCM, 32) => {
                        cursor.read_i32::<LittleEndian>()? as f64 / 2147483648.0
                    }
                    (FORMAT_IEEE_FLOAT, 32) => cursor.read_f32::<LittleEndian>()? as f64,
                    (FORMAT_IEEE_FLOAT, 64) => cursor.read_f64::<LittleEndian>()?,
                    (tag, bits) => {
                        return Err(FileError::UnsupportedEncoding(format!(
                            "format tag {:#06x} with {} bits per sample",
                            tag, bits
                        )))
                    }
                };
            }
        }

        Ok(out)
    }

    /// Seek back to the first frame.
    pub fn rewind(&mut self) -> FileResult<()> {
        self.reader.seek(SeekFrom::Start(self.data_start))?;
        self.read_frames = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::Bw64Writer;
    use std::io::Cursor;

    #[test]
    fn test_round_trip_with_chunks() {
        let format = FormatInfo {
            format_tag: FORMAT_PCM,
            channel_count: 2,
            sample_rate: 48000,
            bits_per_sample: 24,
        };

        let mut samples = Array2::zeros((100, 2));
        for i in 0..100 {
            samples[[i, 0]] = (i as f64 / 100.0) - 0.5;
            samples[[i, 1]] = 0.25;
        }

        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = Bw64Writer::new(&mut buf, format).unwrap();
            writer.set_axml(b"<testdoc/>".to_vec());
            writer.write_sample_block(&samples).unwrap();
            writer.finalize().unwrap();
        }

        buf.set_position(0);
        let mut reader = Bw64Reader::new(buf).unwrap();
        assert_eq!(reader.sample_rate(), 48000);
        assert_eq!(reader.channels(), 2);
        assert_eq!(reader.num_frames(), 100);
        assert_eq!(reader.axml(), Some(b"<testdoc/>".as_slice()));

        let block = reader.read_sample_block(64).unwrap();
        assert_eq!(block.shape(), &[64, 2]);
        // 24-bit quantisation error bound
        assert!((block[[10, 0]] - samples[[10, 0]]).abs() < 2.0 / 8388608.0);

        let block = reader.read_sample_block(64).unwrap();
        assert_eq!(block.shape(), &[36, 2]);

        let block = reader.read_sample_block(64).unwrap();
        assert_eq!(block.nrows(), 0);
    }
}
