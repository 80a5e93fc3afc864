//! Placed references inside a `CELL` record
//!
//! References follow the cell's own fields. Each starts with `FRMR` (the
//! narrow reference number) and runs until the next `FRMR`, a role marker,
//! or the end of the record. References start out persistent; `NAM0`
//! switches to temporary, `GRTP` names a role explicitly.

use std::io::{Read, Seek, Write};

use esmweave_core::{RawRefNum, RecordId, RefNum};
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::cell::Cell;
use super::{require, tags, write_opt_id};
use crate::field::Field;
use crate::reader::EsmReader;
use crate::refnum::RefNumCodec;
use crate::traits::{Identified, Loaded, ParseError, ParseResult};
use crate::writer::EsmWriter;

/// Which list of a cell a reference belongs to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceRole {
    #[default]
    Persistent,
    Temporary,
    VisibleDistant,
}

impl ReferenceRole {
    /// Map a `GRTP` group type to a role
    pub fn from_group_type(group_type: u32) -> ParseResult<Self> {
        match group_type {
            8 => Ok(ReferenceRole::Persistent),
            9 => Ok(ReferenceRole::Temporary),
            10 => Ok(ReferenceRole::VisibleDistant),
            _ => Err(ParseError::UnknownReferenceRole { group_type }),
        }
    }

    pub fn group_type(self) -> u32 {
        match self {
            ReferenceRole::Persistent => 8,
            ReferenceRole::Temporary => 9,
            ReferenceRole::VisibleDistant => 10,
        }
    }
}

/// Position and rotation (`DATA`, 24 bytes)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Placement {
    pub position: [f32; 3],
    pub rotation: [f32; 3],
}

impl Field for Placement {
    const SIZE: usize = 24;

    fn decode(buf: &mut &[u8]) -> ParseResult<Self> {
        Ok(Self {
            position: <[f32; 3]>::decode(buf)?,
            rotation: <[f32; 3]>::decode(buf)?,
        })
    }

    fn encode(&self, out: &mut Vec<u8>) -> ParseResult<()> {
        self.position.encode(out)?;
        self.rotation.encode(out)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellRef {
    pub refnum: RefNum,
    /// Base object this reference places
    pub object: RecordId,
    pub scale: Option<f32>,
    pub owner: Option<RecordId>,
    pub placement: Option<Placement>,
    /// List the reference was read from
    pub role: ReferenceRole,
}

impl CellRef {
    pub fn new(refnum: RefNum, object: impl Into<RecordId>) -> Self {
        Self {
            refnum,
            object: object.into(),
            scale: None,
            owner: None,
            placement: None,
            role: ReferenceRole::Persistent,
        }
    }

    /// Decode one reference starting at its `FRMR`
    pub fn load<R: Read + Seek>(
        reader: &mut EsmReader<R>,
        codec: &RefNumCodec,
        role: ReferenceRole,
    ) -> ParseResult<Loaded<Self>> {
        reader.expect_sub(tags::FRMR)?;
        let raw = RawRefNum(reader.read_fixed()?);
        let mut record = CellRef::new(codec.decode(raw), RecordId::default());
        record.role = role;
        let mut deleted = false;
        let mut has_name = false;

        while let Some(tag) = reader.peek_sub_tag()? {
            if Cell::is_reference_tag(tag) {
                break;
            }
            reader.read_sub_header()?;
            match tag {
                tags::NAME => {
                    record.object = reader.read_zstring()?.into();
                    has_name = true;
                }
                tags::XSCL => record.scale = Some(reader.read_fixed()?),
                tags::ANAM => record.owner = Some(reader.read_zstring()?.into()),
                tags::DATA => record.placement = Some(reader.read_fixed()?),
                tags::DELE => {
                    reader.skip_sub_payload()?;
                    deleted = true;
                }
                _ => reader.skip_unknown()?,
            }
        }

        require(has_name || deleted, tags::CELL, tags::NAME)?;
        trace!(refnum = %record.refnum, object = %record.object, ?role, deleted, "Read reference");
        Ok(Loaded { record, deleted })
    }

    /// Write this reference, packing its reference number for the file
    /// described by `codec`
    pub fn save<W: Write>(
        &self,
        writer: &mut EsmWriter<W>,
        codec: &RefNumCodec,
        deleted: bool,
    ) -> ParseResult<()> {
        let raw = codec.encode(self.refnum)?;
        writer.write_fixed(tags::FRMR, &raw.0)?;
        writer.write_zstring(tags::NAME, self.object.as_str())?;
        if deleted {
            return writer.write_deleted_marker();
        }
        if let Some(scale) = self.scale {
            writer.write_fixed(tags::XSCL, &scale)?;
        }
        write_opt_id(writer, tags::ANAM, self.owner.as_ref())?;
        if let Some(placement) = &self.placement {
            writer.write_fixed(tags::DATA, placement)?;
        }
        Ok(())
    }
}

impl Identified for CellRef {
    type Id = RefNum;

    fn id(&self) -> RefNum {
        self.refnum
    }
}

/// Walks the references of one `CELL` record, tracking role markers
#[derive(Debug)]
pub struct ReferenceCursor<'a> {
    codec: &'a RefNumCodec,
    role: ReferenceRole,
}

impl<'a> ReferenceCursor<'a> {
    pub fn new(codec: &'a RefNumCodec) -> Self {
        Self {
            codec,
            role: ReferenceRole::Persistent,
        }
    }

    /// Role the next reference will be assigned
    pub fn role(&self) -> ReferenceRole {
        self.role
    }

    /// Read the next reference, consuming any role markers before it.
    /// Returns `None` at the end of the cell record.
    pub fn next_ref<R: Read + Seek>(
        &mut self,
        reader: &mut EsmReader<R>,
    ) -> ParseResult<Option<Loaded<CellRef>>> {
        while let Some(tag) = reader.peek_sub_tag()? {
            match tag {
                tags::FRMR => return CellRef::load(reader, self.codec, self.role).map(Some),
                tags::NAM0 => {
                    let sub = reader.expect_sub(tags::NAM0)?;
                    // Zero-length marker, or the classic temporary count.
                    if sub.length != 0 && sub.length != 4 {
                        return Err(ParseError::FieldSizeMismatch {
                            tag: sub.tag,
                            expected: 4,
                            found: sub.length,
                        });
                    }
                    reader.skip_sub_payload()?;
                    self.role = ReferenceRole::Temporary;
                }
                tags::GRTP => {
                    reader.expect_sub(tags::GRTP)?;
                    let group_type = reader.read_fixed::<u32>()?;
                    self.role = ReferenceRole::from_group_type(group_type)?;
                }
                _ => {
                    reader.read_sub_header()?;
                    reader.skip_unknown()?;
                }
            }
        }
        Ok(None)
    }
}

/// Write the marker that opens the list for `role`.
///
/// Persistent references come first and need no marker; temporary ones use
/// the classic `NAM0` count.
pub fn write_role_marker<W: Write>(
    writer: &mut EsmWriter<W>,
    role: ReferenceRole,
    count: u32,
) -> ParseResult<()> {
    match role {
        ReferenceRole::Persistent => Ok(()),
        ReferenceRole::Temporary => writer.write_fixed(tags::NAM0, &count),
        ReferenceRole::VisibleDistant => writer.write_fixed(tags::GRTP, &role.group_type()),
    }
}
