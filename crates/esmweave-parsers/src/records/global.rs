//! Global variables (`GLOB`)

use std::io::{Read, Seek, Write};

use esmweave_core::{RecordId, Tag};
use serde::Serialize;

use super::{header_deleted, preserved_flags, require, tags};
use crate::reader::EsmReader;
use crate::traits::{EsmRecord, Identified, Loaded, ParseError, ParseResult};
use crate::writer::EsmWriter;

/// Storage type of a global variable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum VarType {
    Short,
    Long,
    #[default]
    Float,
}

impl VarType {
    /// Type code stored in `FNAM`
    pub fn code(self) -> u8 {
        match self {
            VarType::Short => b's',
            VarType::Long => b'l',
            VarType::Float => b'f',
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            b's' => Some(VarType::Short),
            b'l' => Some(VarType::Long),
            b'f' => Some(VarType::Float),
            _ => None,
        }
    }
}

/// A global script variable. The value is always stored as a float.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Global {
    pub id: RecordId,
    pub kind: VarType,
    pub value: f32,
    pub record_flags: u32,
}

impl Global {
    pub fn new(id: impl Into<RecordId>, kind: VarType, value: f32) -> Self {
        Self {
            id: id.into(),
            kind,
            value,
            record_flags: 0,
        }
    }

    /// Value truncated the way integer globals are read by scripts
    pub fn as_int(&self) -> i32 {
        match self.kind {
            VarType::Float => self.value as i32,
            VarType::Short | VarType::Long => self.value.round() as i32,
        }
    }
}

impl Identified for Global {
    type Id = RecordId;

    fn id(&self) -> RecordId {
        self.id.clone()
    }
}

impl EsmRecord for Global {
    const TAG: Tag = tags::GLOB;

    fn load<R: Read + Seek>(reader: &mut EsmReader<R>) -> ParseResult<Loaded<Self>> {
        let mut record = Global {
            record_flags: preserved_flags(reader),
            ..Global::default()
        };
        let mut deleted = header_deleted(reader);
        let mut has_name = false;

        while let Some(sub) = reader.read_sub_header()? {
            match sub.tag {
                tags::NAME => {
                    record.id = reader.read_zstring()?.into();
                    has_name = true;
                }
                tags::FNAM => {
                    let code = reader.read_fixed::<u8>()?;
                    record.kind = VarType::from_code(code).ok_or_else(|| {
                        ParseError::InvalidStructure(format!(
                            "unknown global type code {:?}",
                            char::from(code)
                        ))
                    })?;
                }
                tags::FLTV => record.value = reader.read_fixed()?,
                tags::DELE => {
                    reader.skip_sub_payload()?;
                    deleted = true;
                }
                _ => reader.skip_unknown()?,
            }
        }

        require(has_name, Self::TAG, tags::NAME)?;
        Ok(Loaded { record, deleted })
    }

    fn save<W: Write>(&self, writer: &mut EsmWriter<W>, deleted: bool) -> ParseResult<()> {
        writer.write_zstring(tags::NAME, self.id.as_str())?;
        if deleted {
            return writer.write_deleted_marker();
        }
        writer.write_fixed(tags::FNAM, &self.kind.code())?;
        writer.write_fixed(tags::FLTV, &self.value)
    }

    fn record_flags(&self) -> u32 {
        self.record_flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::test_support::{assert_write_back_stable, decode, encode};

    #[test]
    fn test_global_write_back() {
        let global = Global::new("PCYear", VarType::Short, 427.0);
        let loaded = assert_write_back_stable(&global, false);
        assert_eq!(loaded.record, global);
        assert_eq!(loaded.record.as_int(), 427);
    }

    #[test]
    fn test_deleted_global_keeps_only_id() {
        let global = Global::new("OldFlag", VarType::Long, 1.0);
        let loaded = decode::<Global>(encode(&global, true));
        assert!(loaded.deleted);
        assert_eq!(loaded.record.id, RecordId::from("oldflag"));
        assert_eq!(loaded.record.kind, VarType::Float);
    }

    #[test]
    fn test_missing_name_is_fatal() {
        let mut writer = EsmWriter::new(Vec::new());
        writer.start_record(tags::GLOB, 0).unwrap();
        writer.write_fixed(tags::FLTV, &1.0f32).unwrap();
        writer.end_record().unwrap();

        let bytes = writer.into_inner();
        let mut reader = EsmReader::new(std::io::Cursor::new(bytes), "x.esp").unwrap();
        reader.read_record_header().unwrap();
        let err = Global::load(&mut reader).unwrap_err();
        assert!(matches!(err, ParseError::MissingSubRecord { .. }));
    }
}
