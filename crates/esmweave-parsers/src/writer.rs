//! Chunked record writer
//!
//! Records are buffered until [`EsmWriter::end_record`] so the header can
//! carry the final payload length.

use std::io::Write;
use std::sync::Arc;

use byteorder::{LittleEndian, WriteBytesExt};
use esmweave_core::Tag;

use crate::field::Field;
use crate::records::tags;
use crate::traits::{ParseError, ParseResult, PassThrough, TextCodec};

struct PendingRecord {
    tag: Tag,
    flags: u32,
    payload: Vec<u8>,
    /// Tag and length-field position of the open sub-record
    open_sub: Option<(Tag, usize)>,
}

/// Writes records in the chunked layout read by [`crate::EsmReader`]
pub struct EsmWriter<W> {
    inner: W,
    codec: Arc<dyn TextCodec>,
    record: Option<PendingRecord>,
    records_written: u32,
}

impl<W: Write> EsmWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            codec: Arc::new(PassThrough),
            record: None,
            records_written: 0,
        }
    }

    /// Use a different text codec for string payloads
    pub fn with_codec(mut self, codec: Arc<dyn TextCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn codec(&self) -> &Arc<dyn TextCodec> {
        &self.codec
    }

    /// Number of complete records written
    pub fn records_written(&self) -> u32 {
        self.records_written
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Begin a record; its sub-records are buffered until `end_record`
    pub fn start_record(&mut self, tag: Tag, flags: u32) -> ParseResult<()> {
        if let Some(open) = &self.record {
            return Err(ParseError::InvalidStructure(format!(
                "cannot start {tag}: record {} is still open",
                open.tag
            )));
        }
        self.record = Some(PendingRecord {
            tag,
            flags,
            payload: Vec::new(),
            open_sub: None,
        });
        Ok(())
    }

    /// Finish the open record and write it out
    pub fn end_record(&mut self) -> ParseResult<()> {
        let record = self
            .record
            .take()
            .ok_or_else(|| ParseError::InvalidStructure("no record is open".into()))?;
        if let Some((sub, _)) = record.open_sub {
            return Err(ParseError::InvalidStructure(format!(
                "sub-record {sub} of {} was never closed",
                record.tag
            )));
        }

        let length = u32::try_from(record.payload.len()).map_err(|_| {
            ParseError::InvalidStructure(format!("record {} is too large", record.tag))
        })?;
        self.inner.write_all(record.tag.as_bytes())?;
        self.inner.write_u32::<LittleEndian>(length)?;
        self.inner.write_u32::<LittleEndian>(0)?;
        self.inner.write_u32::<LittleEndian>(record.flags)?;
        self.inner.write_all(&record.payload)?;
        self.records_written += 1;
        Ok(())
    }

    fn pending(&mut self) -> ParseResult<&mut PendingRecord> {
        self.record
            .as_mut()
            .ok_or_else(|| ParseError::InvalidStructure("no record is open".into()))
    }

    /// Begin a sub-record whose length is patched in by `end_sub`
    pub fn start_sub(&mut self, tag: Tag) -> ParseResult<()> {
        let record = self.pending()?;
        if let Some((open, _)) = record.open_sub {
            return Err(ParseError::InvalidStructure(format!(
                "cannot start {tag}: sub-record {open} is still open"
            )));
        }
        record.payload.extend_from_slice(tag.as_bytes());
        record.open_sub = Some((tag, record.payload.len()));
        record.payload.extend_from_slice(&[0; 4]);
        Ok(())
    }

    /// Close the open sub-record
    pub fn end_sub(&mut self) -> ParseResult<()> {
        let record = self.pending()?;
        let (tag, at) = record
            .open_sub
            .take()
            .ok_or_else(|| ParseError::InvalidStructure("no sub-record is open".into()))?;
        let length = u32::try_from(record.payload.len() - at - 4)
            .map_err(|_| ParseError::InvalidStructure(format!("sub-record {tag} is too large")))?;
        record.payload[at..at + 4].copy_from_slice(&length.to_le_bytes());
        Ok(())
    }

    fn open_payload(&mut self) -> ParseResult<&mut Vec<u8>> {
        let record = self.pending()?;
        if record.open_sub.is_none() {
            return Err(ParseError::InvalidStructure("no sub-record is open".into()));
        }
        Ok(&mut record.payload)
    }

    /// Append raw bytes to the open sub-record
    pub fn write_raw(&mut self, bytes: &[u8]) -> ParseResult<()> {
        self.open_payload()?.extend_from_slice(bytes);
        Ok(())
    }

    /// Append one fixed-size value to the open sub-record
    pub fn write_field<T: Field>(&mut self, value: &T) -> ParseResult<()> {
        value.encode(self.open_payload()?)
    }

    /// Append a NUL-padded fixed-width string to the open sub-record
    pub fn write_fixed_string(&mut self, text: &str, len: usize) -> ParseResult<()> {
        let mut bytes = self.codec.encode(text);
        bytes.resize(len, 0);
        self.write_raw(&bytes)
    }

    /// Write a complete sub-record from raw bytes
    pub fn write_sub(&mut self, tag: Tag, bytes: &[u8]) -> ParseResult<()> {
        self.start_sub(tag)?;
        self.write_raw(bytes)?;
        self.end_sub()
    }

    /// Write a sub-record holding exactly one fixed-size value
    pub fn write_fixed<T: Field>(&mut self, tag: Tag, value: &T) -> ParseResult<()> {
        self.start_sub(tag)?;
        self.write_field(value)?;
        self.end_sub()
    }

    /// Write a string sub-record without a terminator
    pub fn write_string(&mut self, tag: Tag, text: &str) -> ParseResult<()> {
        let bytes = self.codec.encode(text);
        self.write_sub(tag, &bytes)
    }

    /// Write a NUL-terminated string sub-record
    pub fn write_zstring(&mut self, tag: Tag, text: &str) -> ParseResult<()> {
        let mut bytes = self.codec.encode(text);
        bytes.push(0);
        self.write_sub(tag, &bytes)
    }

    /// Write the deletion marker sub-record
    pub fn write_deleted_marker(&mut self) -> ParseResult<()> {
        self.write_fixed(tags::DELE, &0u32)
    }
}
