//! Record type models
//!
//! One passive value type per supported record kind. Each decodes its own
//! sub-records from an [`EsmReader`] and writes them back through an
//! [`EsmWriter`].

pub mod cell;
pub mod cellref;
pub mod container;
pub mod creature;
pub mod dialogue;
pub mod global;
pub mod gmst;
pub mod header;
pub mod info;
pub mod land;
pub mod ltex;
pub mod npc;
pub mod script;

use std::io::{Read, Seek, Write};

use esmweave_core::{RecordId, Tag};
use serde::Serialize;

use crate::reader::{flags, EsmReader, RecordHeader};
use crate::traits::{ParseError, ParseResult};
use crate::writer::EsmWriter;

pub use cell::{AmbientLight, Cell, CellData};
pub use cellref::{write_role_marker, CellRef, Placement, ReferenceCursor, ReferenceRole};
pub use container::Container;
pub use creature::{Creature, CreatureStats};
pub use dialogue::{Dialogue, DialogueType};
pub use global::{Global, VarType};
pub use gmst::{GameSetting, SettingValue};
pub use header::{FileHeader, MasterFile};
pub use info::{ConditionValue, DialogueInfo, InfoCondition, InfoData, QuestStatus};
pub use land::Land;
pub use ltex::LandTexture;
pub use npc::{Npc, NpcAutoStats, NpcFullStats, NpcStats};
pub use script::{Script, ScriptHeader};

/// Record and sub-record tags
pub mod tags {
    use esmweave_core::Tag;

    // Records
    pub const TES3: Tag = Tag::new(b"TES3");
    pub const GLOB: Tag = Tag::new(b"GLOB");
    pub const GMST: Tag = Tag::new(b"GMST");
    pub const SCPT: Tag = Tag::new(b"SCPT");
    pub const NPC_: Tag = Tag::new(b"NPC_");
    pub const CREA: Tag = Tag::new(b"CREA");
    pub const CONT: Tag = Tag::new(b"CONT");
    pub const DIAL: Tag = Tag::new(b"DIAL");
    pub const INFO: Tag = Tag::new(b"INFO");
    pub const CELL: Tag = Tag::new(b"CELL");
    pub const LAND: Tag = Tag::new(b"LAND");
    pub const LTEX: Tag = Tag::new(b"LTEX");

    // Sub-records
    pub const HEDR: Tag = Tag::new(b"HEDR");
    pub const MAST: Tag = Tag::new(b"MAST");
    pub const DATA: Tag = Tag::new(b"DATA");
    pub const NAME: Tag = Tag::new(b"NAME");
    pub const DELE: Tag = Tag::new(b"DELE");
    pub const FNAM: Tag = Tag::new(b"FNAM");
    pub const FLTV: Tag = Tag::new(b"FLTV");
    pub const STRV: Tag = Tag::new(b"STRV");
    pub const INTV: Tag = Tag::new(b"INTV");
    pub const SCHD: Tag = Tag::new(b"SCHD");
    pub const SCVR: Tag = Tag::new(b"SCVR");
    pub const SCDT: Tag = Tag::new(b"SCDT");
    pub const SCTX: Tag = Tag::new(b"SCTX");
    pub const MODL: Tag = Tag::new(b"MODL");
    pub const RNAM: Tag = Tag::new(b"RNAM");
    pub const CNAM: Tag = Tag::new(b"CNAM");
    pub const ANAM: Tag = Tag::new(b"ANAM");
    pub const BNAM: Tag = Tag::new(b"BNAM");
    pub const KNAM: Tag = Tag::new(b"KNAM");
    pub const SCRI: Tag = Tag::new(b"SCRI");
    pub const NPDT: Tag = Tag::new(b"NPDT");
    pub const FLAG: Tag = Tag::new(b"FLAG");
    pub const NPCO: Tag = Tag::new(b"NPCO");
    pub const XSCL: Tag = Tag::new(b"XSCL");
    pub const CNDT: Tag = Tag::new(b"CNDT");
    pub const INAM: Tag = Tag::new(b"INAM");
    pub const PNAM: Tag = Tag::new(b"PNAM");
    pub const NNAM: Tag = Tag::new(b"NNAM");
    pub const ONAM: Tag = Tag::new(b"ONAM");
    pub const DNAM: Tag = Tag::new(b"DNAM");
    pub const SNAM: Tag = Tag::new(b"SNAM");
    pub const QSTN: Tag = Tag::new(b"QSTN");
    pub const QSTF: Tag = Tag::new(b"QSTF");
    pub const QSTR: Tag = Tag::new(b"QSTR");
    pub const FRMR: Tag = Tag::new(b"FRMR");
    pub const NAM0: Tag = Tag::new(b"NAM0");
    pub const GRTP: Tag = Tag::new(b"GRTP");
    pub const MVRF: Tag = Tag::new(b"MVRF");
    pub const RGNN: Tag = Tag::new(b"RGNN");
    pub const WHGT: Tag = Tag::new(b"WHGT");
    pub const NAM5: Tag = Tag::new(b"NAM5");
    pub const AMBI: Tag = Tag::new(b"AMBI");
    pub const VNML: Tag = Tag::new(b"VNML");
    pub const VHGT: Tag = Tag::new(b"VHGT");
    pub const WNAM: Tag = Tag::new(b"WNAM");
    pub const VCLR: Tag = Tag::new(b"VCLR");
    pub const VTEX: Tag = Tag::new(b"VTEX");
}

/// One inventory line (`NPCO`): a count and a 32-byte item id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryItem {
    pub count: i32,
    pub item: RecordId,
}

impl InventoryItem {
    /// Encoded payload size
    pub const SIZE: usize = 36;

    pub(crate) fn load<R: Read + Seek>(reader: &mut EsmReader<R>) -> ParseResult<Self> {
        let found = reader.remaining_in_sub();
        if found as usize != Self::SIZE {
            return Err(ParseError::FieldSizeMismatch {
                tag: tags::NPCO,
                expected: Self::SIZE,
                found,
            });
        }
        let count = reader.read_field::<i32>()?;
        let item = reader.read_fixed_string(32)?;
        Ok(Self {
            count,
            item: item.into(),
        })
    }

    pub(crate) fn save<W: Write>(&self, writer: &mut EsmWriter<W>) -> ParseResult<()> {
        writer.start_sub(tags::NPCO)?;
        writer.write_field(&self.count)?;
        writer.write_fixed_string(self.item.as_str(), 32)?;
        writer.end_sub()
    }
}

/// Header flags worth preserving on write-back
pub(crate) fn preserved_flags<R: Read + Seek>(reader: &EsmReader<R>) -> u32 {
    reader.current_record().map_or(0, |h| h.flags & !flags::DELETED)
}

/// Whether the record header itself carries the deletion flag
pub(crate) fn header_deleted<R: Read + Seek>(reader: &EsmReader<R>) -> bool {
    reader.current_record().is_some_and(RecordHeader::is_deleted)
}

pub(crate) fn require(present: bool, record: Tag, subrecord: Tag) -> ParseResult<()> {
    if present {
        Ok(())
    } else {
        Err(ParseError::MissingSubRecord { record, subrecord })
    }
}

/// Write an optional id sub-record
pub(crate) fn write_opt_id<W: Write>(
    writer: &mut EsmWriter<W>,
    tag: Tag,
    id: Option<&RecordId>,
) -> ParseResult<()> {
    match id {
        Some(id) => writer.write_zstring(tag, id.as_str()),
        None => Ok(()),
    }
}

/// Write an optional text sub-record
pub(crate) fn write_opt_str<W: Write>(
    writer: &mut EsmWriter<W>,
    tag: Tag,
    text: Option<&str>,
) -> ParseResult<()> {
    match text {
        Some(text) => writer.write_zstring(tag, text),
        None => Ok(()),
    }
}
