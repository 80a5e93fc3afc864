//! Cells (`CELL`)
//!
//! [`Cell::load`] reads the cell's own fields and stops at the first
//! reference sub-record, leaving the reader positioned for a
//! [`ReferenceCursor`](super::ReferenceCursor).

use std::io::{Read, Seek, Write};

use esmweave_core::{CellId, RecordId, Tag};
use serde::Serialize;

use super::{header_deleted, preserved_flags, require, tags, write_opt_id};
use crate::field::Field;
use crate::reader::EsmReader;
use crate::traits::{EsmRecord, Identified, Loaded, ParseResult};
use crate::writer::EsmWriter;

/// 12-byte `DATA` block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CellData {
    pub flags: u32,
    pub grid_x: i32,
    pub grid_y: i32,
}

impl CellData {
    pub const INTERIOR: u32 = 0x01;
    pub const HAS_WATER: u32 = 0x02;
    pub const NO_SLEEP: u32 = 0x04;
    pub const QUASI_EXTERIOR: u32 = 0x80;

    pub fn is_interior(&self) -> bool {
        self.flags & Self::INTERIOR != 0
    }
}

impl Field for CellData {
    const SIZE: usize = 12;

    fn decode(buf: &mut &[u8]) -> ParseResult<Self> {
        Ok(Self {
            flags: u32::decode(buf)?,
            grid_x: i32::decode(buf)?,
            grid_y: i32::decode(buf)?,
        })
    }

    fn encode(&self, out: &mut Vec<u8>) -> ParseResult<()> {
        self.flags.encode(out)?;
        self.grid_x.encode(out)?;
        self.grid_y.encode(out)
    }
}

/// Interior lighting (`AMBI`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AmbientLight {
    pub ambient: u32,
    pub sunlight: u32,
    pub fog_color: u32,
    pub fog_density: f32,
}

impl Field for AmbientLight {
    const SIZE: usize = 16;

    fn decode(buf: &mut &[u8]) -> ParseResult<Self> {
        Ok(Self {
            ambient: u32::decode(buf)?,
            sunlight: u32::decode(buf)?,
            fog_color: u32::decode(buf)?,
            fog_density: f32::decode(buf)?,
        })
    }

    fn encode(&self, out: &mut Vec<u8>) -> ParseResult<()> {
        self.ambient.encode(out)?;
        self.sunlight.encode(out)?;
        self.fog_color.encode(out)?;
        self.fog_density.encode(out)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Cell {
    /// Interior name, or the optional display name of an exterior cell
    pub name: String,
    pub data: CellData,
    pub region: Option<RecordId>,
    pub water_height: Option<f32>,
    pub map_color: Option<u32>,
    pub ambient: Option<AmbientLight>,
    pub record_flags: u32,
}

impl Cell {
    pub fn interior(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: CellData {
                flags: CellData::INTERIOR,
                ..CellData::default()
            },
            ..Self::default()
        }
    }

    pub fn exterior(x: i32, y: i32) -> Self {
        Self {
            data: CellData {
                flags: 0,
                grid_x: x,
                grid_y: y,
            },
            ..Self::default()
        }
    }

    /// Whether a sub-record tag starts the reference list
    pub fn is_reference_tag(tag: Tag) -> bool {
        matches!(tag, tags::FRMR | tags::NAM0 | tags::GRTP | tags::MVRF)
    }
}

impl Identified for Cell {
    type Id = CellId;

    fn id(&self) -> CellId {
        if self.data.is_interior() {
            CellId::Interior(RecordId::new(self.name.clone()))
        } else {
            CellId::Exterior {
                x: self.data.grid_x,
                y: self.data.grid_y,
            }
        }
    }
}

impl EsmRecord for Cell {
    const TAG: Tag = tags::CELL;

    fn load<R: Read + Seek>(reader: &mut EsmReader<R>) -> ParseResult<Loaded<Self>> {
        let mut record = Cell {
            record_flags: preserved_flags(reader),
            ..Cell::default()
        };
        let mut deleted = header_deleted(reader);
        let mut has_name = false;
        let mut has_data = false;

        while let Some(tag) = reader.peek_sub_tag()? {
            if Cell::is_reference_tag(tag) {
                break;
            }
            reader.read_sub_header()?;
            match tag {
                tags::NAME => {
                    record.name = reader.read_zstring()?;
                    has_name = true;
                }
                tags::DATA => {
                    record.data = reader.read_fixed()?;
                    has_data = true;
                }
                tags::RGNN => record.region = Some(reader.read_zstring()?.into()),
                tags::WHGT => record.water_height = Some(reader.read_fixed()?),
                tags::NAM5 => record.map_color = Some(reader.read_fixed()?),
                tags::AMBI => record.ambient = Some(reader.read_fixed()?),
                tags::DELE => {
                    reader.skip_sub_payload()?;
                    deleted = true;
                }
                _ => reader.skip_unknown()?,
            }
        }

        require(has_name, Self::TAG, tags::NAME)?;
        require(has_data, Self::TAG, tags::DATA)?;
        Ok(Loaded { record, deleted })
    }

    /// Writes the cell fields only; references are appended by the caller
    /// before the record is closed.
    fn save<W: Write>(&self, writer: &mut EsmWriter<W>, deleted: bool) -> ParseResult<()> {
        writer.write_zstring(tags::NAME, &self.name)?;
        if deleted {
            writer.write_deleted_marker()?;
        }
        writer.write_fixed(tags::DATA, &self.data)?;
        if deleted {
            return Ok(());
        }
        write_opt_id(writer, tags::RGNN, self.region.as_ref())?;
        if let Some(height) = self.water_height {
            writer.write_fixed(tags::WHGT, &height)?;
        }
        if let Some(color) = self.map_color {
            writer.write_fixed(tags::NAM5, &color)?;
        }
        if let Some(ambient) = &self.ambient {
            writer.write_fixed(tags::AMBI, ambient)?;
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
    fn test_interior_write_back() {
        let cell = Cell {
            water_height: Some(-120.5),
            ambient: Some(AmbientLight {
                ambient: 0x0040_4040,
                sunlight: 0x0080_8080,
                fog_color: 0,
                fog_density: 0.75,
            }),
            ..Cell::interior("Seyda Neen, Census and Excise Office")
        };
        let loaded = assert_write_back_stable(&cell, false);
        assert_eq!(loaded.record, cell);
        assert_eq!(
            loaded.record.id(),
            CellId::Interior("seyda neen, census and excise office".into())
        );
    }

    #[test]
    fn test_exterior_identity() {
        let cell = Cell {
            region: Some("Bitter Coast Region".into()),
            map_color: Some(0x00FF_00FF),
            ..Cell::exterior(-2, -9)
        };
        let loaded = assert_write_back_stable(&cell, false);
        assert_eq!(loaded.record.id(), CellId::Exterior { x: -2, y: -9 });
    }

    #[test]
    fn test_deleted_exterior_keeps_grid() {
        let loaded = assert_write_back_stable(&Cell::exterior(3, 4), true);
        assert!(loaded.deleted);
        assert_eq!(loaded.record.id(), CellId::Exterior { x: 3, y: 4 });
    }
}
