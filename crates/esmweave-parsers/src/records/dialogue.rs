//! Dialogue topics (`DIAL`)
//!
//! A topic record is followed in the file by the `INFO` responses that
//! belong to it.

use std::io::{Read, Seek, Write};

use esmweave_core::{RecordId, Tag};
use serde::Serialize;

use super::{header_deleted, preserved_flags, require, tags};
use crate::reader::EsmReader;
use crate::traits::{EsmRecord, Identified, Loaded, ParseError, ParseResult};
use crate::writer::EsmWriter;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum DialogueType {
    #[default]
    Topic,
    Voice,
    Greeting,
    Persuasion,
    Journal,
}

impl DialogueType {
    pub fn code(self) -> u8 {
        match self {
            DialogueType::Topic => 0,
            DialogueType::Voice => 1,
            DialogueType::Greeting => 2,
            DialogueType::Persuasion => 3,
            DialogueType::Journal => 4,
        }
    }

    pub fn from_code(code: u8) -> ParseResult<Self> {
        Ok(match code {
            0 => DialogueType::Topic,
            1 => DialogueType::Voice,
            2 => DialogueType::Greeting,
            3 => DialogueType::Persuasion,
            4 => DialogueType::Journal,
            other => {
                return Err(ParseError::InvalidStructure(format!(
                    "unknown dialogue type {other}"
                )))
            }
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Dialogue {
    pub id: RecordId,
    pub kind: DialogueType,
    pub record_flags: u32,
}

impl Dialogue {
    pub fn new(id: impl Into<RecordId>, kind: DialogueType) -> Self {
        Self {
            id: id.into(),
            kind,
            record_flags: 0,
        }
    }
}

impl Identified for Dialogue {
    type Id = RecordId;

    fn id(&self) -> RecordId {
        self.id.clone()
    }
}

impl EsmRecord for Dialogue {
    const TAG: Tag = tags::DIAL;

    fn load<R: Read + Seek>(reader: &mut EsmReader<R>) -> ParseResult<Loaded<Self>> {
        let mut record = Dialogue {
            record_flags: preserved_flags(reader),
            ..Dialogue::default()
        };
        let mut deleted = header_deleted(reader);
        let mut has_name = false;

        while let Some(sub) = reader.read_sub_header()? {
            match sub.tag {
                tags::NAME => {
                    record.id = reader.read_zstring()?.into();
                    has_name = true;
                }
                tags::DATA => match sub.length {
                    // Older files pad the type to four bytes.
                    1 | 4 => {
                        let code = reader.read_field::<u8>()?;
                        reader.skip_sub_payload()?;
                        record.kind = DialogueType::from_code(code)?;
                    }
                    found => {
                        return Err(ParseError::FieldSizeMismatch {
                            tag: sub.tag,
                            expected: 1,
                            found,
                        })
                    }
                },
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
        writer.write_fixed(tags::DATA, &self.kind.code())
    }

    fn record_flags(&self) -> u32 {
        self.record_flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::test_support::{assert_write_back_stable, decode};

    #[test]
    fn test_dialogue_write_back() {
        let topic = Dialogue::new("Background", DialogueType::Topic);
        assert_eq!(assert_write_back_stable(&topic, false).record, topic);

        let journal = Dialogue::new("A1_1_FindSpymaster", DialogueType::Journal);
        assert_eq!(assert_write_back_stable(&journal, false).record, journal);
    }

    #[test]
    fn test_padded_type_field() {
        let mut writer = EsmWriter::new(Vec::new());
        writer.start_record(tags::DIAL, 0).unwrap();
        writer.write_zstring(tags::NAME, "Greeting 0").unwrap();
        writer.write_sub(tags::DATA, &[2, 0, 0, 0]).unwrap();
        writer.end_record().unwrap();

        let loaded = decode::<Dialogue>(writer.into_inner());
        assert_eq!(loaded.record.kind, DialogueType::Greeting);
    }
}
