//! Creatures (`CREA`)

use std::io::{Read, Seek, Write};

use esmweave_core::{RecordId, Tag};
use serde::Serialize;

use super::{header_deleted, preserved_flags, require, tags, write_opt_id, write_opt_str, InventoryItem};
use crate::field::Field;
use crate::reader::EsmReader;
use crate::traits::{EsmRecord, Identified, Loaded, ParseResult};
use crate::writer::EsmWriter;

/// 96-byte `NPDT` stat block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CreatureStats {
    /// 0 creature, 1 daedra, 2 undead, 3 humanoid
    pub kind: i32,
    pub level: i32,
    pub attributes: [i32; 8],
    pub health: i32,
    pub mana: i32,
    pub fatigue: i32,
    pub soul: i32,
    pub combat: i32,
    pub magic: i32,
    pub stealth: i32,
    /// Min/max damage for the three attacks
    pub attacks: [i32; 6],
    pub gold: i32,
}

impl Field for CreatureStats {
    const SIZE: usize = 96;

    fn decode(buf: &mut &[u8]) -> ParseResult<Self> {
        Ok(Self {
            kind: i32::decode(buf)?,
            level: i32::decode(buf)?,
            attributes: <[i32; 8]>::decode(buf)?,
            health: i32::decode(buf)?,
            mana: i32::decode(buf)?,
            fatigue: i32::decode(buf)?,
            soul: i32::decode(buf)?,
            combat: i32::decode(buf)?,
            magic: i32::decode(buf)?,
            stealth: i32::decode(buf)?,
            attacks: <[i32; 6]>::decode(buf)?,
            gold: i32::decode(buf)?,
        })
    }

    fn encode(&self, out: &mut Vec<u8>) -> ParseResult<()> {
        self.kind.encode(out)?;
        self.level.encode(out)?;
        self.attributes.encode(out)?;
        for value in [
            self.health,
            self.mana,
            self.fatigue,
            self.soul,
            self.combat,
            self.magic,
            self.stealth,
        ] {
            value.encode(out)?;
        }
        self.attacks.encode(out)?;
        self.gold.encode(out)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Creature {
    pub id: RecordId,
    pub model: Option<String>,
    pub name: Option<String>,
    pub script: Option<RecordId>,
    pub stats: CreatureStats,
    pub flags: u32,
    pub scale: Option<f32>,
    pub inventory: Vec<InventoryItem>,
    pub record_flags: u32,
}

impl Identified for Creature {
    type Id = RecordId;

    fn id(&self) -> RecordId {
        self.id.clone()
    }
}

impl EsmRecord for Creature {
    const TAG: Tag = tags::CREA;

    fn load<R: Read + Seek>(reader: &mut EsmReader<R>) -> ParseResult<Loaded<Self>> {
        let mut record = Creature {
            record_flags: preserved_flags(reader),
            ..Creature::default()
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
                tags::SCRI => record.script = Some(reader.read_zstring()?.into()),
                tags::NPDT => record.stats = reader.read_fixed()?,
                tags::FLAG => record.flags = reader.read_fixed()?,
                tags::XSCL => record.scale = Some(reader.read_fixed()?),
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
        write_opt_id(writer, tags::SCRI, self.script.as_ref())?;
        writer.write_fixed(tags::NPDT, &self.stats)?;
        writer.write_fixed(tags::FLAG, &self.flags)?;
        if let Some(scale) = self.scale {
            writer.write_fixed(tags::XSCL, &scale)?;
        }
        for item in &self.inventory {
            item.save(writer)?;
        }
        Ok(())
    }

    fn record_flags(&self) -> u32 {
        self.record_flags
    }
}

impl Creature {
    /// Convenience constructor used by tools and tests
    pub fn new(id: impl Into<RecordId>, health: i32) -> Self {
        Self {
            id: id.into(),
            stats: CreatureStats {
                health,
                ..CreatureStats::default()
            },
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::test_support::assert_write_back_stable;
    use crate::traits::ParseError;

    #[test]
    fn test_creature_write_back() {
        let rat = Creature {
            model: Some("r\\Rat.NIF".into()),
            name: Some("Rat".into()),
            scale: Some(1.25),
            stats: CreatureStats {
                level: 1,
                attributes: [10, 10, 10, 30, 10, 10, 10, 10],
                health: 10,
                attacks: [1, 3, 1, 3, 1, 3],
                ..CreatureStats::default()
            },
            inventory: vec![InventoryItem {
                count: 2,
                item: "ingred_rat_meat_01".into(),
            }],
            ..Creature::new("rat_01", 10)
        };
        let loaded = assert_write_back_stable(&rat, false);
        assert_eq!(loaded.record, rat);
        assert_eq!(loaded.record.stats.health, 10);
    }

    #[test]
    fn test_short_inventory_line_is_fatal() {
        let mut writer = EsmWriter::new(Vec::new());
        writer.start_record(tags::CREA, 0).unwrap();
        writer.write_zstring(tags::NAME, "rat_01").unwrap();
        writer.write_sub(tags::NPCO, &[0u8; 20]).unwrap();
        writer.end_record().unwrap();

        let mut reader = EsmReader::new(std::io::Cursor::new(writer.into_inner()), "x.esp").unwrap();
        reader.read_record_header().unwrap();
        let err = Creature::load(&mut reader).unwrap_err();
        assert!(matches!(err, ParseError::FieldSizeMismatch { expected: 36, found: 20, .. }));
    }
}
