//! Dialogue responses (`INFO`)
//!
//! Responses carry no topic of their own; they belong to the `DIAL` record
//! that precedes them in the file, so the loader assigns `topic` after
//! decoding. Ordering inside a topic comes from the `PNAM`/`NNAM` links.

use std::io::{Read, Seek, Write};

use esmweave_core::{RecordId, Tag};
use serde::Serialize;

use super::{header_deleted, preserved_flags, require, tags, write_opt_id, write_opt_str};
use crate::field::Field;
use crate::reader::EsmReader;
use crate::traits::{EsmRecord, Identified, Loaded, ParseError, ParseResult};
use crate::writer::EsmWriter;

/// 12-byte `DATA` block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InfoData {
    pub dialogue_type: u8,
    pub disposition: i32,
    pub rank: i8,
    pub gender: i8,
    pub pc_rank: i8,
    pub unknown: i8,
}

impl Field for InfoData {
    const SIZE: usize = 12;

    fn decode(buf: &mut &[u8]) -> ParseResult<Self> {
        let dialogue_type = u8::decode(buf)?;
        let _pad = <[u8; 3]>::decode(buf)?;
        Ok(Self {
            dialogue_type,
            disposition: i32::decode(buf)?,
            rank: i8::decode(buf)?,
            gender: i8::decode(buf)?,
            pc_rank: i8::decode(buf)?,
            unknown: i8::decode(buf)?,
        })
    }

    fn encode(&self, out: &mut Vec<u8>) -> ParseResult<()> {
        self.dialogue_type.encode(out)?;
        [0u8; 3].encode(out)?;
        self.disposition.encode(out)?;
        self.rank.encode(out)?;
        self.gender.encode(out)?;
        self.pc_rank.encode(out)?;
        self.unknown.encode(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum ConditionValue {
    Int(i32),
    Float(f32),
}

/// One `SCVR` select rule with its comparison value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfoCondition {
    pub rule: String,
    pub value: Option<ConditionValue>,
}

/// Journal markers (`QSTN`, `QSTF`, `QSTR`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QuestStatus {
    Name,
    Finished,
    Restart,
}

impl QuestStatus {
    fn tag(self) -> Tag {
        match self {
            QuestStatus::Name => tags::QSTN,
            QuestStatus::Finished => tags::QSTF,
            QuestStatus::Restart => tags::QSTR,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DialogueInfo {
    /// Owning topic, assigned from the preceding `DIAL`
    pub topic: RecordId,
    pub info: RecordId,
    /// Previous response in the topic chain (empty = head)
    pub prev: RecordId,
    /// Next response in the topic chain (empty = tail)
    pub next: RecordId,
    pub data: InfoData,
    pub actor: Option<RecordId>,
    pub race: Option<RecordId>,
    pub class: Option<RecordId>,
    pub faction: Option<RecordId>,
    pub cell: Option<RecordId>,
    pub pc_faction: Option<RecordId>,
    pub sound: Option<String>,
    pub response: Option<String>,
    pub conditions: Vec<InfoCondition>,
    pub result_script: Option<String>,
    pub quest_status: Option<QuestStatus>,
    pub record_flags: u32,
}

impl DialogueInfo {
    pub fn new(
        topic: impl Into<RecordId>,
        info: impl Into<RecordId>,
        prev: impl Into<RecordId>,
        next: impl Into<RecordId>,
    ) -> Self {
        Self {
            topic: topic.into(),
            info: info.into(),
            prev: prev.into(),
            next: next.into(),
            ..Self::default()
        }
    }

    /// Compose the container key for a response within a topic
    pub fn key(topic: &RecordId, info: &RecordId) -> RecordId {
        RecordId::new(format!("{topic}#{info}"))
    }
}

impl Identified for DialogueInfo {
    type Id = RecordId;

    fn id(&self) -> RecordId {
        Self::key(&self.topic, &self.info)
    }
}

impl EsmRecord for DialogueInfo {
    const TAG: Tag = tags::INFO;

    fn load<R: Read + Seek>(reader: &mut EsmReader<R>) -> ParseResult<Loaded<Self>> {
        let mut record = DialogueInfo {
            record_flags: preserved_flags(reader),
            ..DialogueInfo::default()
        };
        let mut deleted = header_deleted(reader);
        let mut has_id = false;

        while let Some(sub) = reader.read_sub_header()? {
            match sub.tag {
                tags::INAM => {
                    record.info = reader.read_zstring()?.into();
                    has_id = true;
                }
                tags::PNAM => record.prev = reader.read_zstring()?.into(),
                tags::NNAM => record.next = reader.read_zstring()?.into(),
                tags::DATA => record.data = reader.read_fixed()?,
                tags::ONAM => record.actor = Some(reader.read_zstring()?.into()),
                tags::RNAM => record.race = Some(reader.read_zstring()?.into()),
                tags::CNAM => record.class = Some(reader.read_zstring()?.into()),
                tags::FNAM => record.faction = Some(reader.read_zstring()?.into()),
                tags::ANAM => record.cell = Some(reader.read_zstring()?.into()),
                tags::DNAM => record.pc_faction = Some(reader.read_zstring()?.into()),
                tags::SNAM => record.sound = Some(reader.read_zstring()?),
                tags::NAME => record.response = Some(reader.read_string()?),
                tags::SCVR => record.conditions.push(InfoCondition {
                    rule: reader.read_string()?,
                    value: None,
                }),
                tags::INTV | tags::FLTV => {
                    let value = if sub.tag == tags::INTV {
                        ConditionValue::Int(reader.read_fixed()?)
                    } else {
                        ConditionValue::Float(reader.read_fixed()?)
                    };
                    let condition = record.conditions.last_mut().ok_or_else(|| {
                        ParseError::InvalidStructure(format!("{} without a preceding SCVR", sub.tag))
                    })?;
                    condition.value = Some(value);
                }
                tags::BNAM => record.result_script = Some(reader.read_string()?),
                tags::QSTN | tags::QSTF | tags::QSTR => {
                    reader.skip_sub_payload()?;
                    record.quest_status = Some(match sub.tag {
                        tags::QSTN => QuestStatus::Name,
                        tags::QSTF => QuestStatus::Finished,
                        _ => QuestStatus::Restart,
                    });
                }
                tags::DELE => {
                    reader.skip_sub_payload()?;
                    deleted = true;
                }
                _ => reader.skip_unknown()?,
            }
        }

        require(has_id, Self::TAG, tags::INAM)?;
        Ok(Loaded { record, deleted })
    }

    fn save<W: Write>(&self, writer: &mut EsmWriter<W>, deleted: bool) -> ParseResult<()> {
        writer.write_zstring(tags::INAM, self.info.as_str())?;
        writer.write_zstring(tags::PNAM, self.prev.as_str())?;
        writer.write_zstring(tags::NNAM, self.next.as_str())?;
        if deleted {
            return writer.write_deleted_marker();
        }
        writer.write_fixed(tags::DATA, &self.data)?;
        write_opt_id(writer, tags::ONAM, self.actor.as_ref())?;
        write_opt_id(writer, tags::RNAM, self.race.as_ref())?;
        write_opt_id(writer, tags::CNAM, self.class.as_ref())?;
        write_opt_id(writer, tags::FNAM, self.faction.as_ref())?;
        write_opt_id(writer, tags::ANAM, self.cell.as_ref())?;
        write_opt_id(writer, tags::DNAM, self.pc_faction.as_ref())?;
        write_opt_str(writer, tags::SNAM, self.sound.as_deref())?;
        if let Some(response) = &self.response {
            writer.write_string(tags::NAME, response)?;
        }
        for condition in &self.conditions {
            writer.write_string(tags::SCVR, &condition.rule)?;
            match condition.value {
                Some(ConditionValue::Int(v)) => writer.write_fixed(tags::INTV, &v)?,
                Some(ConditionValue::Float(v)) => writer.write_fixed(tags::FLTV, &v)?,
                None => {}
            }
        }
        if let Some(script) = &self.result_script {
            writer.write_string(tags::BNAM, script)?;
        }
        if let Some(status) = self.quest_status {
            writer.write_fixed(status.tag(), &1u8)?;
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
    fn test_info_write_back() {
        let info = DialogueInfo {
            data: InfoData {
                dialogue_type: 0,
                disposition: 30,
                rank: -1,
                gender: -1,
                pc_rank: -1,
                unknown: 0,
            },
            actor: Some("fargoth".into()),
            cell: Some("Seyda Neen".into()),
            response: Some("Have you seen my ring?".into()),
            conditions: vec![InfoCondition {
                rule: "02JX0Fargoth_Ring".into(),
                value: Some(ConditionValue::Int(1)),
            }],
            result_script: Some("Journal MS_FargothRing 10".into()),
            quest_status: Some(QuestStatus::Name),
            ..DialogueInfo::new("", "1234567891", "", "2234567891")
        };
        let loaded = assert_write_back_stable(&info, false);
        assert_eq!(loaded.record, info);
    }

    #[test]
    fn test_id_includes_topic() {
        let mut info = DialogueInfo::new("", "42", "", "");
        info.topic = "Background".into();
        assert_eq!(info.id(), RecordId::from("background#42"));
    }

    #[test]
    fn test_deleted_info_keeps_links() {
        let info = DialogueInfo::new("", "B", "A", "C");
        let loaded = assert_write_back_stable(&info, true);
        assert_eq!(loaded.record.prev, RecordId::from("A"));
        assert_eq!(loaded.record.next, RecordId::from("C"));
    }
}
