//! Containers (`CONT`)

use std::io::{Read, Seek, Write};

use esmweave_core::{RecordId, Tag};
use serde::Serialize;

use super::{header_deleted, preserved_flags, require, tags, write_opt_id, write_opt_str, InventoryItem};
use crate::reader::EsmReader;
use crate::traits::{EsmRecord, Identified, Loaded, ParseResult};
use crate::writer::EsmWriter;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Container {
    pub id: RecordId,
    pub model: Option<String>,
    pub name: Option<String>,
    /// Carrying capacity (`CNDT`)
    pub weight: f32,
    /// 0x1 organic, 0x2 respawns
    pub flags: u32,
    pub script: Option<RecordId>,
    pub inventory: Vec<InventoryItem>,
    pub record_flags: u32,
}

impl Identified for Container {
    type Id = RecordId;

    fn id(&self) -> RecordId {
        self.id.clone()
    }
}

impl EsmRecord for Container {
    const TAG: Tag = tags::CONT;

    fn load<R: Read + Seek>(reader: &mut EsmReader<R>) -> ParseResult<Loaded<Self>> {
        let mut record = Container {
            record_flags: preserved_flags(reader),
            ..Container::default()
        };
        let mut deleted = header_deleted(reader);
        let mut has_name = false;

        while let Some(sub) = reader.read_sub_header()? {
            match sub.tag {
                tags::NAME => {
                    record.id = reader.read_zstring()?.into();
                    has_name = true;
                }
                tags::MODL => record.model = Some(reader.read_zstring()?),
                tags::FNAM => record.name = Some(reader.read_zstring()?),
                tags::CNDT => record.weight = reader.read_fixed()?,
                tags::FLAG => record.flags = reader.read_fixed()?,
                tags::SCRI => record.script = Some(reader.read_zstring()?.into()),
                tags::NPCO => record.inventory.push(InventoryItem::load(reader)?),
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
        write_opt_str(writer, tags::MODL, self.model.as_deref())?;
        write_opt_str(writer, tags::FNAM, self.name.as_deref())?;
        writer.write_fixed(tags::CNDT, &self.weight)?;
        writer.write_fixed(tags::FLAG, &self.flags)?;
        write_opt_id(writer, tags::SCRI, self.script.as_ref())?;
        for item in &self.inventory {
            item.save(writer)?;
        }
        Ok(())
    }

    fn record_flags(&self) -> u32 {
        self.record_flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::test_support::assert_write_back_stable;

    #[test]
    fn test_container_write_back() {
        let chest = Container {
            id: "chest_small_01".into(),
            model: Some("o\\Contain_chest_small_01.nif".into()),
            name: Some("Chest".into()),
            weight: 100.0,
            flags: 0x8,
            script: Some("chestScript".into()),
            inventory: vec![
                InventoryItem {
                    count: 5,
                    item: "Gold_001".into(),
                },
                InventoryItem {
                    count: -1,
                    item: "random_potion".into(),
                },
            ],
            record_flags: 0,
        };
        assert_eq!(assert_write_back_stable(&chest, false).record, chest);
    }
}
