//! File header (`TES3`)
//!
//! Every content file opens with one `TES3` record: a fixed 300-byte `HEDR`
//! block followed by `MAST`/`DATA` pairs naming the files it depends on.

use std::io::{Read, Seek, Write};

use serde::Serialize;
use tracing::debug;

use super::tags;
use crate::reader::EsmReader;
use crate::traits::{ParseError, ParseResult};
use crate::writer::EsmWriter;

/// One declared dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MasterFile {
    pub name: String,
    /// Size of the dependency when the file was saved
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileHeader {
    pub version: f32,
    pub file_type: u32,
    pub author: String,
    pub description: String,
    pub record_count: u32,
    pub masters: Vec<MasterFile>,
}

impl Default for FileHeader {
    fn default() -> Self {
        Self {
            version: Self::VERSION,
            file_type: Self::PLUGIN,
            author: String::new(),
            description: String::new(),
            record_count: 0,
            masters: Vec::new(),
        }
    }
}

impl FileHeader {
    pub const VERSION: f32 = 1.3;
    pub const PLUGIN: u32 = 0;
    pub const MASTER: u32 = 1;

    const HEDR_SIZE: u32 = 300;
    const AUTHOR_LEN: usize = 32;
    const DESCRIPTION_LEN: usize = 256;

    pub fn is_master(&self) -> bool {
        self.file_type == Self::MASTER
    }

    /// Read the leading `TES3` record
    pub fn read<R: Read + Seek>(reader: &mut EsmReader<R>) -> ParseResult<Self> {
        let header = reader
            .read_record_header()?
            .ok_or(ParseError::UnexpectedEof {
                offset: reader.offset(),
                wanted: 16,
            })?;
        if header.tag != tags::TES3 {
            return Err(ParseError::InvalidMagic {
                expected: tags::TES3.as_bytes().to_vec(),
                found: header.tag.as_bytes().to_vec(),
            });
        }

        let hedr = reader.expect_sub(tags::HEDR)?;
        if hedr.length != Self::HEDR_SIZE {
            return Err(ParseError::FieldSizeMismatch {
                tag: tags::HEDR,
                expected: Self::HEDR_SIZE as usize,
                found: hedr.length,
            });
        }
        let version = reader.read_field::<f32>()?;
        let file_type = reader.read_field::<u32>()?;
        let author = reader.read_fixed_string(Self::AUTHOR_LEN)?;
        let description = reader.read_fixed_string(Self::DESCRIPTION_LEN)?;
        let record_count = reader.read_field::<u32>()?;

        let mut masters = Vec::new();
        while let Some(sub) = reader.read_sub_header()? {
            match sub.tag {
                tags::MAST => masters.push(MasterFile {
                    name: reader.read_zstring()?,
                    size: 0,
                }),
                tags::DATA => {
                    let master = masters.last_mut().ok_or_else(|| {
                        ParseError::InvalidStructure("DATA without a preceding MAST".to_string())
                    })?;
                    master.size = reader.read_fixed()?;
                }
                _ => reader.skip_unknown()?,
            }
        }

        debug!(
            file = reader.name(),
            version,
            records = record_count,
            masters = masters.len(),
            "Read file header"
        );
        Ok(Self {
            version,
            file_type,
            author,
            description,
            record_count,
            masters,
        })
    }

    /// Write the `TES3` record
    pub fn write<W: Write>(&self, writer: &mut EsmWriter<W>) -> ParseResult<()> {
        writer.start_record(tags::TES3, 0)?;
        writer.start_sub(tags::HEDR)?;
        writer.write_field(&self.version)?;
        writer.write_field(&self.file_type)?;
        writer.write_fixed_string(&self.author, Self::AUTHOR_LEN)?;
        writer.write_fixed_string(&self.description, Self::DESCRIPTION_LEN)?;
        writer.write_field(&self.record_count)?;
        writer.end_sub()?;
        for master in &self.masters {
            writer.write_zstring(tags::MAST, &master.name)?;
            writer.write_fixed(tags::DATA, &master.size)?;
        }
        writer.end_record()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample() -> FileHeader {
        FileHeader {
            author: "Bethesda".into(),
            description: "The main data file".into(),
            record_count: 48_126,
            masters: vec![
                MasterFile {
                    name: "Morrowind.esm".into(),
                    size: 79_837_557,
                },
                MasterFile {
                    name: "Tribunal.esm".into(),
                    size: 4_565_686,
                },
            ],
            ..FileHeader::default()
        }
    }

    #[test]
    fn test_header_write_back() {
        let header = sample();
        let mut writer = EsmWriter::new(Vec::new());
        header.write(&mut writer).unwrap();
        let bytes = writer.into_inner();
        // MAST holds the NUL-terminated name, DATA the 8-byte size
        let masters: usize = header
            .masters
            .iter()
            .map(|m| 8 + m.name.len() + 1 + 8 + 8)
            .sum();
        assert_eq!(masters, 2 * 24 + 14 + 13);
        assert_eq!(bytes.len(), 16 + 8 + 300 + masters);

        let mut reader = EsmReader::new(Cursor::new(bytes), "plugin.esp").unwrap();
        let read = FileHeader::read(&mut reader).unwrap();
        assert_eq!(read, header);
        assert!(!read.is_master());
    }

    #[test]
    fn test_wrong_leading_record() {
        let mut writer = EsmWriter::new(Vec::new());
        writer.start_record(tags::GLOB, 0).unwrap();
        writer.write_zstring(tags::NAME, "x").unwrap();
        writer.end_record().unwrap();

        let mut reader = EsmReader::new(Cursor::new(writer.into_inner()), "bad.esp").unwrap();
        let err = FileHeader::read(&mut reader).unwrap_err();
        assert!(matches!(err, ParseError::InvalidMagic { .. }));
    }

    #[test]
    fn test_short_hedr_rejected() {
        let mut writer = EsmWriter::new(Vec::new());
        writer.start_record(tags::TES3, 0).unwrap();
        writer.write_sub(tags::HEDR, &[0u8; 12]).unwrap();
        writer.end_record().unwrap();

        let mut reader = EsmReader::new(Cursor::new(writer.into_inner()), "short.esp").unwrap();
        let err = FileHeader::read(&mut reader).unwrap_err();
        assert!(matches!(err, ParseError::FieldSizeMismatch { found: 12, .. }));
    }
}
