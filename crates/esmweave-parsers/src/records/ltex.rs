//! Landscape textures (`LTEX`)

use std::io::{Read, Seek, Write};

use esmweave_core::{RecordId, Tag};
use serde::Serialize;

use super::{header_deleted, preserved_flags, require, tags};
use crate::reader::EsmReader;
use crate::traits::{EsmRecord, Identified, Loaded, ParseResult};
use crate::writer::EsmWriter;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LandTexture {
    pub id: RecordId,
    /// Index referenced by terrain `VTEX` layers
    pub index: u32,
    pub texture: String,
    pub record_flags: u32,
}

impl Identified for LandTexture {
    type Id = RecordId;

    fn id(&self) -> RecordId {
        self.id.clone()
    }
}

impl EsmRecord for LandTexture {
    const TAG: Tag = tags::LTEX;

    fn load<R: Read + Seek>(reader: &mut EsmReader<R>) -> ParseResult<Loaded<Self>> {
        let mut record = LandTexture {
            record_flags: preserved_flags(reader),
            ..LandTexture::default()
        };
        let mut deleted = header_deleted(reader);
        let mut has_name = false;

        while let Some(sub) = reader.read_sub_header()? {
            match sub.tag {
                tags::NAME => {
                    record.id = reader.read_zstring()?.into();
                    has_name = true;
                }
                tags::INTV => record.index = reader.read_fixed()?,
                tags::DATA => record.texture = reader.read_zstring()?,
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
        writer.write_fixed(tags::INTV, &self.index)?;
        if deleted {
            return writer.write_deleted_marker();
        }
        writer.write_zstring(tags::DATA, &self.texture)
    }

    fn record_flags(&self) -> u32 {
        self.record_flags
    }
}
