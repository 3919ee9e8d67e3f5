//! Chunk data structures and their byte layouts

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use admr_model::chna::{ChnaEntry, ChnaTable};

use crate::error::{FileError, FileResult};

/// Contents of the `fmt ` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatInfo {
    pub format_tag: u16,
    pub channel_count: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

pub const FORMAT_PCM: u16 = 0x0001;
pub const FORMAT_IEEE_FLOAT: u16 = 0x0003;

impl FormatInfo {
    pub fn block_align(&self) -> u16 {
        self.channel_count * (self.bits_per_sample / 8)
    }

    pub fn bytes_per_second(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }

    pub fn read(mut data: &[u8]) -> FileResult<Self> {
        if data.len() < 16 {
            return Err(FileError::BadChunk {
                chunk: "fmt ",
                message: format!("expected at least 16 bytes, got {}", data.len()),
            });
        }

        let format_tag = data.read_u16::<LittleEndian>()?;
        let channel_count = data.read_u16::<LittleEndian>()?;
        let sample_rate = data.read_u32::<LittleEndian>()?;
        let _bytes_per_second = data.read_u32::<LittleEndian>()?;
        let _block_align = data.read_u16::<LittleEndian>()?;
        let bits_per_sample = data.read_u16::<LittleEndian>()?;

        if !matches!(format_tag, FORMAT_PCM | FORMAT_IEEE_FLOAT) {
            return Err(FileError::UnsupportedEncoding(format!(
                "format tag {:#06x}",
                format_tag
            )));
        }
        if channel_count == 0 {
            return Err(FileError::BadChunk {
                chunk: "fmt ",
                message: "zero channels".into(),
            });
        }

        Ok(Self {
            format_tag,
            channel_count,
            sample_rate,
            bits_per_sample,
        })
    }

    pub fn write(&self, mut w: impl Write) -> FileResult<()> {
        w.write_u16::<LittleEndian>(self.format_tag)?;
        w.write_u16::<LittleEndian>(self.channel_count)?;
        w.write_u32::<LittleEndian>(self.sample_rate)?;
        w.write_u32::<LittleEndian>(self.bytes_per_second())?;
        w.write_u16::<LittleEndian>(self.block_align())?;
        w.write_u16::<LittleEndian>(self.bits_per_sample)?;
        Ok(())
    }
}

/// The `chna` chunk: a fixed-layout table binding track indices to ADM IDs.
///
/// Each entry is 40 bytes: track index (u16), UID (12 bytes), trackFormat
/// reference (14 bytes), packFormat reference (11 bytes) and one pad byte.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChnaChunk {
    pub table: ChnaTable,
}

const CHNA_ENTRY_SIZE: usize = 40;

fn read_fixed_string(data: &mut impl Read, len: usize) -> FileResult<String> {
    let mut buf = vec![0u8; len];
    data.read_exact(&mut buf)?;

    let end = buf.iter().position(|&b| b == 0).unwrap_or(len);
    String::from_utf8(buf[..end].to_vec()).map_err(|_| FileError::BadChunk {
        chunk: "chna",
        message: "non-UTF-8 identifier".into(),
    })
}

fn write_fixed_string(w: &mut impl Write, s: &str, len: usize) -> FileResult<()> {
    let bytes = s.as_bytes();
    if bytes.len() > len {
        return Err(FileError::BadChunk {
            chunk: "chna",
            message: format!("identifier '{}' longer than {} bytes", s, len),
        });
    }
    w.write_all(bytes)?;
    for _ in bytes.len()..len {
        w.write_all(&[0])?;
    }
    Ok(())
}

impl ChnaChunk {
    pub fn read(mut data: &[u8]) -> FileResult<Self> {
        if data.len() < 4 {
            return Err(FileError::BadChunk {
                chunk: "chna",
                message: "too short".into(),
            });
        }

        let _num_tracks = data.read_u16::<LittleEndian>()?;
        let num_uids = data.read_u16::<LittleEndian>()? as usize;

        if data.len() < num_uids * CHNA_ENTRY_SIZE {
            return Err(FileError::BadChunk {
                chunk: "chna",
                message: format!(
                    "expected {} entries but only {} bytes follow",
                    num_uids,
                    data.len()
                ),
            });
        }

        let mut entries = Vec::with_capacity(num_uids);
        for _ in 0..num_uids {
            let track_index = data.read_u16::<LittleEndian>()? as usize;
            let track_uid_id = read_fixed_string(&mut data, 12)?;
            let track_format_id = read_fixed_string(&mut data, 14)?;
            let pack_format_id = read_fixed_string(&mut data, 11)?;
            let mut pad = [0u8; 1];
            data.read_exact(&mut pad)?;

            entries.push(ChnaEntry {
                track_index,
                track_uid_id,
                track_format_id,
                pack_format_id,
            });
        }

        Ok(Self {
            table: ChnaTable { entries },
        })
    }

    pub fn write(&self, mut w: impl Write) -> FileResult<()> {
        let num_tracks = self
            .table
            .entries
            .iter()
            .map(|e| e.track_index)
            .collect::<std::collections::HashSet<_>>()
            .len();

        w.write_u16::<LittleEndian>(num_tracks as u16)?;
        w.write_u16::<LittleEndian>(self.table.entries.len() as u16)?;

        for entry in &self.table.entries {
            w.write_u16::<LittleEndian>(entry.track_index as u16)?;
            write_fixed_string(&mut w, &entry.track_uid_id, 12)?;
            write_fixed_string(&mut w, &entry.track_format_id, 14)?;
            write_fixed_string(&mut w, &entry.pack_format_id, 11)?;
            w.write_all(&[0])?;
        }
        Ok(())
    }

    pub fn byte_size(&self) -> usize {
        4 + self.table.entries.len() * CHNA_ENTRY_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_round_trip() {
        let info = FormatInfo {
            format_tag: FORMAT_PCM,
            channel_count: 6,
            sample_rate: 48000,
            bits_per_sample: 24,
        };

        let mut bytes = Vec::new();
        info.write(&mut bytes).unwrap();
        assert_eq!(bytes.len(), 16);

        assert_eq!(FormatInfo::read(&bytes).unwrap(), info);
    }

    #[test]
    fn test_format_rejects_unknown_tag() {
        let info = FormatInfo {
            format_tag: 0x0055, // mp3
            channel_count: 2,
            sample_rate: 48000,
            bits_per_sample: 16,
        };
        let mut bytes = Vec::new();
        info.write(&mut bytes).unwrap();
        assert!(FormatInfo::read(&bytes).is_err());
    }

    #[test]
    fn test_chna_round_trip() {
        let chunk = ChnaChunk {
            table: ChnaTable {
                entries: vec![
                    ChnaEntry {
                        track_index: 1,
                        track_uid_id: "ATU_00000001".into(),
                        track_format_id: "AT_00010001_01".into(),
                        pack_format_id: "AP_00010002".into(),
                    },
                    ChnaEntry {
                        track_index: 2,
                        track_uid_id: "ATU_00000002".into(),
                        track_format_id: "AT_00010002_01".into(),
                        pack_format_id: String::new(),
                    },
                ],
            },
        };

        let mut bytes = Vec::new();
        chunk.write(&mut bytes).unwrap();
        assert_eq!(bytes.len(), chunk.byte_size());

        assert_eq!(ChnaChunk::read(&bytes).unwrap(), chunk);
    }
}
