//! Non-player characters (`NPC_`)

use std::io::{Read, Seek, Write};

use esmweave_core::{RecordId, Tag};
use serde::Serialize;

use super::{header_deleted, preserved_flags, require, tags, write_opt_id, write_opt_str, InventoryItem};
use crate::field::Field;
use crate::reader::EsmReader;
use crate::traits::{EsmRecord, Identified, Loaded, ParseError, ParseResult};
use crate::writer::EsmWriter;

/// Full stat block (52-byte `NPDT`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NpcFullStats {
    pub level: i16,
    pub attributes: [u8; 8],
    pub skills: [u8; 27],
    pub health: u16,
    pub mana: u16,
    pub fatigue: u16,
    pub disposition: u8,
    pub reputation: u8,
    pub rank: u8,
    pub gold: i32,
}

impl Field for NpcFullStats {
    const SIZE: usize = 52;

    fn decode(buf: &mut &[u8]) -> ParseResult<Self> {
        let level = i16::decode(buf)?;
        let attributes = <[u8; 8]>::decode(buf)?;
        let skills = <[u8; 27]>::decode(buf)?;
        let _pad = u8::decode(buf)?;
        let health = u16::decode(buf)?;
        let mana = u16::decode(buf)?;
        let fatigue = u16::decode(buf)?;
        let disposition = u8::decode(buf)?;
        let reputation = u8::decode(buf)?;
        let rank = u8::decode(buf)?;
        let _pad = u8::decode(buf)?;
        let gold = i32::decode(buf)?;
        Ok(Self {
            level,
            attributes,
            skills,
            health,
            mana,
            fatigue,
            disposition,
            reputation,
            rank,
            gold,
        })
    }

    fn encode(&self, out: &mut Vec<u8>) -> ParseResult<()> {
        self.level.encode(out)?;
        self.attributes.encode(out)?;
        self.skills.encode(out)?;
        0u8.encode(out)?;
        self.health.encode(out)?;
        self.mana.encode(out)?;
        self.fatigue.encode(out)?;
        self.disposition.encode(out)?;
        self.reputation.encode(out)?;
        self.rank.encode(out)?;
        0u8.encode(out)?;
        self.gold.encode(out)
    }
}

/// Auto-calculated stat block (12-byte `NPDT`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NpcAutoStats {
    pub level: i16,
    pub disposition: u8,
    pub reputation: u8,
    pub rank: u8,
    pub gold: i32,
}

impl Field for NpcAutoStats {
    const SIZE: usize = 12;

    fn decode(buf: &mut &[u8]) -> ParseResult<Self> {
        let level = i16::decode(buf)?;
        let disposition = u8::decode(buf)?;
        let reputation = u8::decode(buf)?;
        let rank = u8::decode(buf)?;
        let _unknown = <[u8; 3]>::decode(buf)?;
        let gold = i32::decode(buf)?;
        Ok(Self {
            level,
            disposition,
            reputation,
            rank,
            gold,
        })
    }

    fn encode(&self, out: &mut Vec<u8>) -> ParseResult<()> {
        self.level.encode(out)?;
        self.disposition.encode(out)?;
        self.reputation.encode(out)?;
        self.rank.encode(out)?;
        [0u8; 3].encode(out)?;
        self.gold.encode(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NpcStats {
    Full(NpcFullStats),
    AutoCalculated(NpcAutoStats),
}

impl Default for NpcStats {
    fn default() -> Self {
        NpcStats::AutoCalculated(NpcAutoStats::default())
    }
}

impl NpcStats {
    pub fn level(&self) -> i16 {
        match self {
            NpcStats::Full(s) => s.level,
            NpcStats::AutoCalculated(s) => s.level,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Npc {
    pub id: RecordId,
    pub model: Option<String>,
    pub name: Option<String>,
    pub race: Option<RecordId>,
    pub class: Option<RecordId>,
    pub faction: Option<RecordId>,
    pub head: Option<RecordId>,
    pub hair: Option<RecordId>,
    pub script: Option<RecordId>,
    pub stats: NpcStats,
    pub flags: u32,
    pub inventory: Vec<InventoryItem>,
    pub record_flags: u32,
}

impl Identified for Npc {
    type Id = RecordId;

    fn id(&self) -> RecordId {
        self.id.clone()
    }
}

impl EsmRecord for Npc {
    const TAG: Tag = tags::NPC_;

    fn load<R: Read + Seek>(reader: &mut EsmReader<R>) -> ParseResult<Loaded<Self>> {
        let mut record = Npc {
            record_flags: preserved_flags(reader),
            ..Npc::default()
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
                tags::RNAM => record.race = Some(reader.read_zstring()?.into()),
                tags::CNAM => record.class = Some(reader.read_zstring()?.into()),
                tags::ANAM => record.faction = Some(reader.read_zstring()?.into()),
                tags::BNAM => record.head = Some(reader.read_zstring()?.into()),
                tags::KNAM => record.hair = Some(reader.read_zstring()?.into()),
                tags::SCRI => record.script = Some(reader.read_zstring()?.into()),
                tags::NPDT => {
                    let len = sub.length as usize;
                    record.stats = if len == NpcFullStats::SIZE {
                        NpcStats::Full(reader.read_fixed()?)
                    } else if len == NpcAutoStats::SIZE {
                        NpcStats::AutoCalculated(reader.read_fixed()?)
                    } else {
                        return Err(ParseError::FieldSizeMismatch {
                            tag: sub.tag,
                            expected: NpcFullStats::SIZE,
                            found: sub.length,
                        });
                    };
                }
                tags::FLAG => record.flags = reader.read_fixed()?,
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
        write_opt_id(writer, tags::RNAM, self.race.as_ref())?;
        write_opt_id(writer, tags::CNAM, self.class.as_ref())?;
        write_opt_id(writer, tags::ANAM, self.faction.as_ref())?;
        write_opt_id(writer, tags::BNAM, self.head.as_ref())?;
        write_opt_id(writer, tags::KNAM, self.hair.as_ref())?;
        write_opt_id(writer, tags::SCRI, self.script.as_ref())?;
        match &self.stats {
            NpcStats::Full(stats) => writer.write_fixed(tags::NPDT, stats)?,
            NpcStats::AutoCalculated(stats) => writer.write_fixed(tags::NPDT, stats)?,
        }
        writer.write_fixed(tags::FLAG, &self.flags)?;
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
    use crate::records::test_support::{assert_write_back_stable, encode};
    use std::io::Cursor;

    fn guard() -> Npc {
        Npc {
            id: "imperial guard".into(),
            model: Some("b\\B_N_Imperial_M_Head_01.nif".into()),
            name: Some("Guard".into()),
            race: Some("Imperial".into()),
            class: Some("Guard".into()),
            faction: Some("Imperial Legion".into()),
            script: None,
            stats: NpcStats::Full(NpcFullStats {
                level: 20,
                attributes: [50; 8],
                skills: [30; 27],
                health: 220,
                mana: 100,
                fatigue: 300,
                disposition: 50,
                reputation: 0,
                rank: 2,
                gold: 25,
            }),
            flags: 0x18,
            inventory: vec![InventoryItem {
                count: 1,
                item: "imperial broadsword".into(),
            }],
            ..Npc::default()
        }
    }

    #[test]
    fn test_full_stats_write_back() {
        let npc = guard();
        let loaded = assert_write_back_stable(&npc, false);
        assert_eq!(loaded.record, npc);
        assert_eq!(loaded.record.stats.level(), 20);
    }

    #[test]
    fn test_auto_calculated_write_back() {
        let npc = Npc {
            stats: NpcStats::AutoCalculated(NpcAutoStats {
                level: 4,
                disposition: 40,
                reputation: 1,
                rank: 0,
                gold: 10,
            }),
            ..guard()
        };
        assert_eq!(assert_write_back_stable(&npc, false).record, npc);
    }

    #[test]
    fn test_unexpected_stat_block_size() {
        let mut bytes = encode(&guard(), false);
        // Corrupt the NPDT length field (52 -> 40) and shrink the record to match.
        let npdt = bytes.windows(4).position(|w| w == b"NPDT").unwrap();
        bytes[npdt + 4..npdt + 8].copy_from_slice(&40u32.to_le_bytes());
        bytes.drain(npdt + 8..npdt + 20);
        let len = u32::try_from(bytes.len() - 16).unwrap();
        bytes[4..8].copy_from_slice(&len.to_le_bytes());

        let mut reader = EsmReader::new(Cursor::new(bytes), "bad.esp").unwrap();
        reader.read_record_header().unwrap();
        let err = Npc::load(&mut reader).unwrap_err();
        assert!(matches!(err, ParseError::FieldSizeMismatch { expected: 52, found: 40, .. }));
    }
}
