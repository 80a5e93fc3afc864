//! Terrain tiles (`LAND`)
//!
//! Height, normal, colour and texture layers are large and only needed for
//! rendering, so they are kept as deferred payloads in file order.

use std::io::{Read, Seek, Write};

use esmweave_core::{LandId, Tag};
use serde::Serialize;

use super::{header_deleted, preserved_flags, require, tags};
use crate::deferred::Deferred;
use crate::field::Field;
use crate::reader::EsmReader;
use crate::traits::{EsmRecord, Identified, Loaded, ParseResult};
use crate::writer::EsmWriter;

impl Field for LandId {
    const SIZE: usize = 8;

    fn decode(buf: &mut &[u8]) -> ParseResult<Self> {
        Ok(LandId {
            x: i32::decode(buf)?,
            y: i32::decode(buf)?,
        })
    }

    fn encode(&self, out: &mut Vec<u8>) -> ParseResult<()> {
        self.x.encode(out)?;
        self.y.encode(out)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Land {
    pub coords: LandId,
    /// Which layers the tile carries
    pub data_flags: Option<u32>,
    #[serde(skip)]
    pub layers: Vec<(Tag, Deferred)>,
    pub record_flags: u32,
}

impl Land {
    pub const LAYER_TAGS: [Tag; 5] = [tags::VNML, tags::VHGT, tags::WNAM, tags::VCLR, tags::VTEX];

    pub fn new(x: i32, y: i32) -> Self {
        Self {
            coords: LandId { x, y },
            ..Self::default()
        }
    }

    /// Deferred payload of one layer
    pub fn layer(&self, tag: Tag) -> Option<&Deferred> {
        self.layers.iter().find(|(t, _)| *t == tag).map(|(_, d)| d)
    }
}

impl Identified for Land {
    type Id = LandId;

    fn id(&self) -> LandId {
        self.coords
    }
}

impl EsmRecord for Land {
    const TAG: Tag = tags::LAND;

    fn load<R: Read + Seek>(reader: &mut EsmReader<R>) -> ParseResult<Loaded<Self>> {
        let mut record = Land {
            record_flags: preserved_flags(reader),
            ..Land::default()
        };
        let mut deleted = header_deleted(reader);
        let mut has_coords = false;

        while let Some(sub) = reader.read_sub_header()? {
            match sub.tag {
                tags::INTV => {
                    record.coords = reader.read_fixed()?;
                    has_coords = true;
                }
                tags::DATA => record.data_flags = Some(reader.read_fixed()?),
                tag if Land::LAYER_TAGS.contains(&tag) => {
                    record.layers.push((tag, reader.defer_payload()?));
                }
                tags::DELE => {
                    reader.skip_sub_payload()?;
                    deleted = true;
                }
                _ => reader.skip_unknown()?,
            }
        }

        require(has_coords, Self::TAG, tags::INTV)?;
        Ok(Loaded { record, deleted })
    }

    fn save<W: Write>(&self, writer: &mut EsmWriter<W>, deleted: bool) -> ParseResult<()> {
        writer.write_fixed(tags::INTV, &self.coords)?;
        if deleted {
            return writer.write_deleted_marker();
        }
        if let Some(flags) = self.data_flags {
            writer.write_fixed(tags::DATA, &flags)?;
        }
        for (tag, payload) in &self.layers {
            writer.write_sub(*tag, &payload.bytes()?)?;
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
    fn test_land_write_back() {
        let land = Land {
            data_flags: Some(0x0F),
            layers: vec![
                (tags::VHGT, Deferred::loaded(vec![7u8; 64])),
                (tags::VTEX, Deferred::loaded(vec![1u8; 32])),
            ],
            ..Land::new(-3, 12)
        };
        let loaded = assert_write_back_stable(&land, false);
        assert_eq!(loaded.record, land);
        assert_eq!(loaded.record.id(), LandId { x: -3, y: 12 });
        assert_eq!(loaded.record.layer(tags::VTEX).map(Deferred::len), Some(32));
        assert!(loaded.record.layer(tags::VCLR).is_none());
    }
}
