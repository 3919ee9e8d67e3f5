//! BW64 file I/O and ADM document serialization
//!
//! Chunk-level access to BW64/RF64 WAV files: the `fmt `, `data`, `axml`,
//! `chna` and `ds64` chunks are understood; everything else is carried
//! through opaquely. The `axml` payload itself is only interpreted through
//! the `AdmParser` seam; the built-in parser handles the renderer's JSON
//! document representation, while XML parsing remains an external
//! collaborator.

pub mod chunks;
pub mod json_adm;
pub mod reader;
pub mod writer;

mod error;

pub use chunks::{ChnaChunk, FormatInfo};
pub use error::{FileError, FileResult};
pub use json_adm::{AdmParser, JsonAdmParser};
pub use reader::Bw64Reader;
pub use writer::Bw64Writer;
