//! Game settings (`GMST`)

use std::io::{Read, Seek, Write};

use esmweave_core::{RecordId, Tag};
use serde::Serialize;

use super::{header_deleted, preserved_flags, require, tags};
use crate::reader::EsmReader;
use crate::traits::{EsmRecord, Identified, Loaded, ParseResult};
use crate::writer::EsmWriter;

/// Typed setting value
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "type", content = "value")]
pub enum SettingValue {
    #[default]
    None,
    Int(i32),
    Float(f32),
    String(String),
}

/// A named engine setting
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GameSetting {
    pub id: RecordId,
    pub value: SettingValue,
    pub record_flags: u32,
}

impl GameSetting {
    pub fn new(id: impl Into<RecordId>, value: SettingValue) -> Self {
        Self {
            id: id.into(),
            value,
            record_flags: 0,
        }
    }
}

impl Identified for GameSetting {
    type Id = RecordId;

    fn id(&self) -> RecordId {
        self.id.clone()
    }
}

impl EsmRecord for GameSetting {
    const TAG: Tag = tags::GMST;

    fn load<R: Read + Seek>(reader: &mut EsmReader<R>) -> ParseResult<Loaded<Self>> {
        let mut record = GameSetting {
            record_flags: preserved_flags(reader),
            ..GameSetting::default()
        };
        let mut deleted = header_deleted(reader);
        let mut has_name = false;

        while let Some(sub) = reader.read_sub_header()? {
            match sub.tag {
                tags::NAME => {
                    record.id = reader.read_zstring()?.into();
                    has_name = true;
                }
                tags::STRV => record.value = SettingValue::String(reader.read_string()?),
                tags::INTV => record.value = SettingValue::Int(reader.read_fixed()?),
                tags::FLTV => record.value = SettingValue::Float(reader.read_fixed()?),
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
        match &self.value {
            SettingValue::None => Ok(()),
            SettingValue::Int(v) => writer.write_fixed(tags::INTV, v),
            SettingValue::Float(v) => writer.write_fixed(tags::FLTV, v),
            SettingValue::String(s) => writer.write_string(tags::STRV, s),
        }
    }

    fn record_flags(&self) -> u32 {
        self.record_flags
    }
}
