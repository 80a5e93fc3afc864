//! Compiled scripts (`SCPT`)
//!
//! The source text is usually the largest payload in a content file and is
//! only needed by editors, so it is deferred.

use std::io::{Read, Seek, Write};

use esmweave_core::{RecordId, Tag};
use serde::Serialize;

use super::{header_deleted, preserved_flags, require, tags};
use crate::deferred::Deferred;
use crate::field::Field;
use crate::reader::EsmReader;
use crate::traits::{EsmRecord, Identified, Loaded, ParseError, ParseResult, TextCodec};
use crate::writer::EsmWriter;

/// Variable counts and sizes from `SCHD`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScriptHeader {
    pub num_shorts: u32,
    pub num_longs: u32,
    pub num_floats: u32,
    pub data_size: u32,
    pub local_var_size: u32,
}

impl ScriptHeader {
    /// Size of `SCHD` including the 32-byte name
    pub const RECORD_SIZE: usize = 52;
}

impl Field for ScriptHeader {
    const SIZE: usize = 20;

    fn decode(buf: &mut &[u8]) -> ParseResult<Self> {
        Ok(Self {
            num_shorts: u32::decode(buf)?,
            num_longs: u32::decode(buf)?,
            num_floats: u32::decode(buf)?,
            data_size: u32::decode(buf)?,
            local_var_size: u32::decode(buf)?,
        })
    }

    fn encode(&self, out: &mut Vec<u8>) -> ParseResult<()> {
        self.num_shorts.encode(out)?;
        self.num_longs.encode(out)?;
        self.num_floats.encode(out)?;
        self.data_size.encode(out)?;
        self.local_var_size.encode(out)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Script {
    pub id: RecordId,
    pub header: ScriptHeader,
    /// Local variable names, in declaration order
    pub variables: Vec<String>,
    /// Compiled byte code
    pub bytecode: Vec<u8>,
    #[serde(skip)]
    pub text: Option<Deferred>,
    pub record_flags: u32,
}

impl Script {
    /// Decode the source text, reading it from disk on first use
    pub fn source_text(&self, codec: &dyn TextCodec) -> ParseResult<Option<String>> {
        self.text.as_ref().map(|t| t.text(codec)).transpose()
    }
}

impl Identified for Script {
    type Id = RecordId;

    fn id(&self) -> RecordId {
        self.id.clone()
    }
}

impl EsmRecord for Script {
    const TAG: Tag = tags::SCPT;

    fn load<R: Read + Seek>(reader: &mut EsmReader<R>) -> ParseResult<Loaded<Self>> {
        let mut record = Script {
            record_flags: preserved_flags(reader),
            ..Script::default()
        };
        let mut deleted = header_deleted(reader);
        let mut has_header = false;

        while let Some(sub) = reader.read_sub_header()? {
            match sub.tag {
                tags::SCHD => {
                    if sub.length as usize != ScriptHeader::RECORD_SIZE {
                        return Err(ParseError::FieldSizeMismatch {
                            tag: sub.tag,
                            expected: ScriptHeader::RECORD_SIZE,
                            found: sub.length,
                        });
                    }
                    record.id = reader.read_fixed_string(32)?.into();
                    record.header = reader.read_field()?;
                    has_header = true;
                }
                tags::SCVR => {
                    let bytes = reader.read_bytes()?;
                    record.variables = bytes
                        .split(|&b| b == 0)
                        .filter(|name| !name.is_empty())
                        .map(|name| reader.codec().decode(name))
                        .collect();
                }
                tags::SCDT => record.bytecode = reader.read_bytes()?,
                tags::SCTX => record.text = Some(reader.defer_payload()?),
                tags::DELE => {
                    reader.skip_sub_payload()?;
                    deleted = true;
                }
                _ => reader.skip_unknown()?,
            }
        }

        require(has_header, Self::TAG, tags::SCHD)?;
        Ok(Loaded { record, deleted })
    }

    fn save<W: Write>(&self, writer: &mut EsmWriter<W>, deleted: bool) -> ParseResult<()> {
        writer.start_sub(tags::SCHD)?;
        writer.write_fixed_string(self.id.as_str(), 32)?;
        writer.write_field(&self.header)?;
        writer.end_sub()?;
        if deleted {
            return writer.write_deleted_marker();
        }

        if !self.variables.is_empty() {
            let mut bytes = Vec::new();
            for name in &self.variables {
                bytes.extend(writer.codec().encode(name));
                bytes.push(0);
            }
            writer.write_sub(tags::SCVR, &bytes)?;
        }
        if !self.bytecode.is_empty() {
            writer.write_sub(tags::SCDT, &self.bytecode)?;
        }
        if let Some(text) = &self.text {
            writer.write_sub(tags::SCTX, &text.bytes()?)?;
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
    use crate::traits::PassThrough;

    fn rat_script() -> Script {
        Script {
            id: "ratScript".into(),
            header: ScriptHeader {
                num_shorts: 1,
                num_longs: 0,
                num_floats: 1,
                data_size: 4,
                local_var_size: 12,
            },
            variables: vec!["doOnce".into(), "timer".into()],
            bytecode: vec![0x01, 0x01, 0x00, 0x00],
            text: Some(Deferred::loaded(b"Begin ratScript\nshort doOnce\nfloat timer\nEnd".to_vec())),
            record_flags: 0,
        }
    }

    #[test]
    fn test_script_write_back() {
        let script = rat_script();
        let loaded = assert_write_back_stable(&script, false);
        assert_eq!(loaded.record, script);
        assert_eq!(
            loaded.record.source_text(&PassThrough).unwrap().as_deref(),
            Some("Begin ratScript\nshort doOnce\nfloat timer\nEnd")
        );
    }

    #[test]
    fn test_deleted_script_keeps_header() {
        let loaded = assert_write_back_stable(&rat_script(), true);
        assert_eq!(loaded.record.id, RecordId::from("RATSCRIPT"));
        assert!(loaded.record.variables.is_empty());
        assert!(loaded.record.text.is_none());
    }
}
