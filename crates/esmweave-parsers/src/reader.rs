//! Chunked record reader
//!
//! A content file is a flat sequence of records. Each record is a 16-byte
//! header (tag, payload length, reserved word, flags) followed by a payload
//! made of sub-records, each an 8-byte header (tag, payload length) and its
//! payload. The reader walks this structure forward only, tracking how many
//! bytes remain in the file, the current record and the current sub-record.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use esmweave_core::Tag;
use serde::Serialize;
use smallvec::{smallvec, SmallVec};
use tracing::{debug, warn};

use crate::deferred::Deferred;
use crate::field::Field;
use crate::records::FileHeader;
use crate::traits::{ParseError, ParseOptions, ParseResult, PassThrough, TextCodec};

/// Record header flag bits
pub mod flags {
    /// Record is a deletion tombstone
    pub const DELETED: u32 = 0x0000_0020;
    /// Reference or record is persistent
    pub const PERSISTENT: u32 = 0x0000_0400;
    /// Initially disabled
    pub const DISABLED: u32 = 0x0000_0800;
    /// Blocked from being changed by later files
    pub const BLOCKED: u32 = 0x0000_2000;
}

/// Top-level record header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecordHeader {
    pub tag: Tag,
    pub length: u32,
    pub reserved: u32,
    pub flags: u32,
}

impl RecordHeader {
    /// Encoded header size
    pub const SIZE: u64 = 16;

    fn from_bytes(buf: &[u8; 16]) -> Self {
        Self {
            tag: Tag([buf[0], buf[1], buf[2], buf[3]]),
            length: LittleEndian::read_u32(&buf[4..8]),
            reserved: LittleEndian::read_u32(&buf[8..12]),
            flags: LittleEndian::read_u32(&buf[12..16]),
        }
    }

    /// Whether the deletion flag is set
    pub fn is_deleted(&self) -> bool {
        self.flags & flags::DELETED != 0
    }

    pub fn is_persistent(&self) -> bool {
        self.flags & flags::PERSISTENT != 0
    }

    pub fn is_blocked(&self) -> bool {
        self.flags & flags::BLOCKED != 0
    }
}

/// Sub-record header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubRecordHeader {
    pub tag: Tag,
    pub length: u32,
}

impl SubRecordHeader {
    /// Encoded header size
    pub const SIZE: u32 = 8;
}

/// Snapshot of a reader position, sufficient to reopen the file and
/// resume reading the same sub-record payload later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderContext {
    /// Display name of the file
    pub name: String,
    /// Path the file was opened from; `None` for in-memory sources
    pub path: Option<PathBuf>,
    /// Absolute byte offset
    pub offset: u64,
    /// Bytes remaining in the file
    pub left_file: u64,
    /// Bytes remaining in the current record
    pub left_rec: u32,
    /// Bytes remaining in the current sub-record
    pub left_sub: u32,
    pub record: Option<RecordHeader>,
    pub subrecord: Option<SubRecordHeader>,
}

/// Forward-only reader over one content file
pub struct EsmReader<R> {
    inner: R,
    name: String,
    path: Option<PathBuf>,
    codec: Arc<dyn TextCodec>,
    options: ParseOptions,
    offset: u64,
    left_file: u64,
    left_rec: u32,
    left_sub: u32,
    record: Option<RecordHeader>,
    subrecord: Option<SubRecordHeader>,
    records_read: u64,
}

impl EsmReader<BufReader<File>> {
    /// Open a content file from disk
    pub fn open(path: impl AsRef<Path>) -> ParseResult<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());

        let mut reader = Self::new(BufReader::new(file), name)?;
        reader.path = Some(path.to_path_buf());
        Ok(reader)
    }

    /// Reopen the file a context was saved from and position the reader
    /// at the saved sub-record payload
    pub fn restore(ctx: &ReaderContext) -> ParseResult<Self> {
        let Some(path) = ctx.path.clone() else {
            return Err(ParseError::DeferredSourceUnavailable {
                path: None,
                source: io::Error::new(io::ErrorKind::NotFound, "payload was read from memory"),
            });
        };

        let unavailable = |source| ParseError::DeferredSourceUnavailable {
            path: Some(path.clone()),
            source,
        };
        let file = File::open(&path).map_err(unavailable)?;
        let mut inner = BufReader::new(file);
        inner.seek(SeekFrom::Start(ctx.offset)).map_err(unavailable)?;

        Ok(Self {
            inner,
            name: ctx.name.clone(),
            path: Some(path),
            codec: Arc::new(PassThrough),
            options: ParseOptions::default(),
            offset: ctx.offset,
            left_file: ctx.left_file,
            left_rec: ctx.left_rec,
            left_sub: ctx.left_sub,
            record: ctx.record,
            subrecord: ctx.subrecord,
            records_read: 0,
        })
    }
}

impl<R: Read + Seek> EsmReader<R> {
    /// Wrap a seekable source. Reading starts at the source's current position.
    pub fn new(mut inner: R, name: impl Into<String>) -> ParseResult<Self> {
        let start = inner.stream_position()?;
        let end = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(start))?;

        Ok(Self {
            inner,
            name: name.into(),
            path: None,
            codec: Arc::new(PassThrough),
            options: ParseOptions::default(),
            offset: start,
            left_file: end.saturating_sub(start),
            left_rec: 0,
            left_sub: 0,
            record: None,
            subrecord: None,
            records_read: 0,
        })
    }

    /// Use a different text codec for string payloads
    pub fn with_codec(mut self, codec: Arc<dyn TextCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Use different parse options
    pub fn with_options(mut self, options: ParseOptions) -> Self {
        self.options = options;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn codec(&self) -> &Arc<dyn TextCodec> {
        &self.codec
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// Absolute byte offset of the next unread byte
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Number of record headers read so far
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    /// Header of the record being read
    pub fn current_record(&self) -> Option<&RecordHeader> {
        self.record.as_ref()
    }

    /// Tag of the record being read
    pub fn record_tag(&self) -> Tag {
        self.record.map_or(Tag::new(b"\0\0\0\0"), |r| r.tag)
    }

    /// Flags of the record being read
    pub fn record_flags(&self) -> u32 {
        self.record.map_or(0, |r| r.flags)
    }

    /// Header of the sub-record being read
    pub fn current_subrecord(&self) -> Option<&SubRecordHeader> {
        self.subrecord.as_ref()
    }

    /// Whether another record follows the current one
    pub fn has_more_records(&self) -> bool {
        self.left_file > u64::from(self.left_rec)
    }

    /// Whether another sub-record follows the current one in this record
    pub fn has_more_subs(&self) -> bool {
        self.left_rec > self.left_sub
    }

    /// Bytes left unread in the current sub-record
    pub fn remaining_in_sub(&self) -> u32 {
        self.left_sub
    }

    /// Attach the current file, offset and tags to an error.
    ///
    /// Errors that already carry a location are returned unchanged.
    pub fn locate(&self, err: ParseError) -> ParseError {
        if matches!(err, ParseError::At { .. }) {
            return err;
        }
        ParseError::At {
            file: self.name.clone(),
            offset: self.offset,
            record: self.record.map(|r| r.tag),
            subrecord: self.subrecord.map(|s| s.tag),
            source: Box::new(err),
        }
    }

    fn read_exact_counted(&mut self, buf: &mut [u8]) -> ParseResult<()> {
        match self.inner.read_exact(buf) {
            Ok(()) => {
                let len = buf.len() as u64;
                self.offset += len;
                self.left_file = self.left_file.saturating_sub(len);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(ParseError::UnexpectedEof {
                offset: self.offset,
                wanted: buf.len() as u64,
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn skip_counted(&mut self, len: u32) -> ParseResult<()> {
        if len == 0 {
            return Ok(());
        }
        if u64::from(len) > self.left_file {
            return Err(ParseError::UnexpectedEof {
                offset: self.offset,
                wanted: u64::from(len),
            });
        }
        self.inner.seek(SeekFrom::Current(i64::from(len)))?;
        self.offset += u64::from(len);
        self.left_file -= u64::from(len);
        Ok(())
    }

    /// Read the next record header, skipping whatever is left of the
    /// current record. Returns `None` at end of file.
    pub fn read_record_header(&mut self) -> ParseResult<Option<RecordHeader>> {
        if self.left_rec > 0 {
            self.skip_record_payload()?;
        }
        self.subrecord = None;

        if self.left_file == 0 {
            self.record = None;
            return Ok(None);
        }
        if self.left_file < RecordHeader::SIZE {
            return Err(ParseError::UnexpectedEof {
                offset: self.offset,
                wanted: RecordHeader::SIZE,
            });
        }

        let mut buf = [0u8; 16];
        self.read_exact_counted(&mut buf)?;
        let header = RecordHeader::from_bytes(&buf);
        self.record = Some(header);

        if u64::from(header.length) > self.left_file {
            return Err(ParseError::RecordOverrun {
                tag: header.tag,
                length: header.length,
                available: self.left_file,
            });
        }

        self.left_rec = header.length;
        self.left_sub = 0;
        self.records_read += 1;
        Ok(Some(header))
    }

    /// Read the next sub-record header, skipping the unread part of the
    /// current one. Returns `None` at the end of the record.
    pub fn read_sub_header(&mut self) -> ParseResult<Option<SubRecordHeader>> {
        if self.left_sub > 0 {
            self.skip_sub_payload()?;
        }
        self.subrecord = None;

        if self.left_rec == 0 {
            return Ok(None);
        }
        if self.left_rec < SubRecordHeader::SIZE {
            return Err(ParseError::InvalidStructure(format!(
                "{} trailing bytes cannot hold a sub-record header",
                self.left_rec
            )));
        }

        let mut buf = [0u8; 8];
        self.read_exact_counted(&mut buf)?;
        self.left_rec -= SubRecordHeader::SIZE;

        let tag = Tag([buf[0], buf[1], buf[2], buf[3]]);
        let mut length = LittleEndian::read_u32(&buf[4..8]);

        if length > self.left_rec {
            if self.options.strict_validation || !self.record_boundary_is_sound()? {
                self.subrecord = Some(SubRecordHeader { tag, length });
                return Err(ParseError::SubRecordOverrun {
                    tag,
                    length,
                    available: self.left_rec,
                });
            }
            warn!(
                file = %self.name,
                offset = self.offset,
                subrecord = %tag,
                declared = length,
                available = self.left_rec,
                "Clamping overrunning sub-record to the end of its record"
            );
            length = self.left_rec;
        }

        let header = SubRecordHeader { tag, length };
        self.subrecord = Some(header);
        self.left_sub = length;
        Ok(Some(header))
    }

    /// Whether the bytes right after the current record are end of file or
    /// a plausible record tag, meaning the record length can be trusted.
    fn record_boundary_is_sound(&mut self) -> ParseResult<bool> {
        let after = self.left_file - u64::from(self.left_rec);
        if after == 0 {
            return Ok(true);
        }
        if after < 4 {
            return Ok(false);
        }

        self.inner.seek(SeekFrom::Current(i64::from(self.left_rec)))?;
        let mut tag = [0u8; 4];
        let read = self.inner.read_exact(&mut tag);
        self.inner.seek(SeekFrom::Start(self.offset))?;
        read?;

        Ok(Tag(tag).is_valid_record_tag())
    }

    /// Peek at the tag of the next sub-record without consuming anything
    pub fn peek_sub_tag(&mut self) -> ParseResult<Option<Tag>> {
        if self.left_rec - self.left_sub < SubRecordHeader::SIZE {
            return Ok(None);
        }

        if self.left_sub > 0 {
            self.inner.seek(SeekFrom::Current(i64::from(self.left_sub)))?;
        }
        let mut tag = [0u8; 4];
        let read = self.inner.read_exact(&mut tag);
        self.inner.seek(SeekFrom::Start(self.offset))?;
        read?;

        Ok(Some(Tag(tag)))
    }

    /// Read the next sub-record header and require it to carry `tag`
    pub fn expect_sub(&mut self, tag: Tag) -> ParseResult<SubRecordHeader> {
        match self.read_sub_header()? {
            Some(header) if header.tag == tag => Ok(header),
            Some(header) => Err(ParseError::UnexpectedSubRecord {
                expected: tag,
                found: header.tag,
            }),
            None => Err(ParseError::MissingSubRecord {
                record: self.record_tag(),
                subrecord: tag,
            }),
        }
    }

    /// Skip the unread part of the current sub-record
    pub fn skip_sub_payload(&mut self) -> ParseResult<()> {
        let len = self.left_sub;
        self.skip_counted(len)?;
        self.left_rec -= len;
        self.left_sub = 0;
        Ok(())
    }

    /// Skip the unread part of the current record
    pub fn skip_record_payload(&mut self) -> ParseResult<()> {
        let len = self.left_rec;
        self.skip_counted(len)?;
        self.left_rec = 0;
        self.left_sub = 0;
        self.subrecord = None;
        Ok(())
    }

    /// Handle a sub-record the current model does not understand.
    ///
    /// Skipped with a debug event unless unknown sub-records are rejected.
    pub fn skip_unknown(&mut self) -> ParseResult<()> {
        let Some(sub) = self.subrecord else {
            return Ok(());
        };
        if !self.options.skip_unknown_subrecords {
            return Err(ParseError::UnknownSubRecord {
                record: self.record_tag(),
                subrecord: sub.tag,
            });
        }
        debug!(
            file = %self.name,
            record = %self.record_tag(),
            subrecord = %sub.tag,
            length = sub.length,
            "Skipping unknown sub-record"
        );
        self.skip_sub_payload()
    }

    fn read_payload(&mut self, buf: &mut [u8]) -> ParseResult<()> {
        let len = u32::try_from(buf.len()).unwrap_or(u32::MAX);
        if len > self.left_sub {
            return Err(ParseError::FieldSizeMismatch {
                tag: self.subrecord.map_or(self.record_tag(), |s| s.tag),
                expected: buf.len(),
                found: self.left_sub,
            });
        }
        self.read_exact_counted(buf)?;
        self.left_sub -= len;
        self.left_rec -= len;
        Ok(())
    }

    /// Read one fixed-size value from the current sub-record payload
    pub fn read_field<T: Field>(&mut self) -> ParseResult<T> {
        let mut buf: SmallVec<[u8; 64]> = smallvec![0u8; T::SIZE];
        self.read_payload(&mut buf)?;
        T::decode(&mut &buf[..])
    }

    /// Read a sub-record whose payload is exactly one `T`
    pub fn read_fixed<T: Field>(&mut self) -> ParseResult<T> {
        let Some(sub) = self.subrecord else {
            return Err(ParseError::InvalidStructure(
                "no sub-record is being read".to_string(),
            ));
        };
        if sub.length as usize != T::SIZE || self.left_sub != sub.length {
            return Err(ParseError::FieldSizeMismatch {
                tag: sub.tag,
                expected: T::SIZE,
                found: sub.length,
            });
        }
        self.read_field()
    }

    /// Read the rest of the current sub-record payload
    pub fn read_bytes(&mut self) -> ParseResult<Vec<u8>> {
        let mut buf = vec![0u8; self.left_sub as usize];
        self.read_payload(&mut buf)?;
        Ok(buf)
    }

    /// Read `len` payload bytes
    pub fn read_exact_bytes(&mut self, len: usize) -> ParseResult<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_payload(&mut buf)?;
        Ok(buf)
    }

    /// Read the rest of the payload as a string, dropping trailing NULs
    pub fn read_string(&mut self) -> ParseResult<String> {
        let bytes = self.read_bytes()?;
        let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        Ok(self.codec.decode(&bytes[..end]))
    }

    /// Read the rest of the payload as a string ending at the first NUL
    pub fn read_zstring(&mut self) -> ParseResult<String> {
        let bytes = self.read_bytes()?;
        Ok(self.decode_fixed(&bytes))
    }

    /// Read a NUL-padded fixed-width string from inside a payload
    pub fn read_fixed_string(&mut self, len: usize) -> ParseResult<String> {
        let bytes = self.read_exact_bytes(len)?;
        Ok(self.decode_fixed(&bytes))
    }

    fn decode_fixed(&self, bytes: &[u8]) -> String {
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        self.codec.decode(&bytes[..end])
    }

    /// Snapshot the current position
    pub fn save_context(&self) -> ReaderContext {
        ReaderContext {
            name: self.name.clone(),
            path: self.path.clone(),
            offset: self.offset,
            left_file: self.left_file,
            left_rec: self.left_rec,
            left_sub: self.left_sub,
            record: self.record,
            subrecord: self.subrecord,
        }
    }

    /// Defer the current sub-record payload until first access.
    ///
    /// Only file-backed readers can reopen their source, so in-memory
    /// readers and small payloads are read immediately.
    pub fn defer_payload(&mut self) -> ParseResult<Deferred> {
        if self.path.is_some() && self.left_sub >= self.options.defer_threshold {
            let ctx = self.save_context();
            self.skip_sub_payload()?;
            Ok(Deferred::lazy(ctx))
        } else {
            Ok(Deferred::loaded(self.read_bytes()?))
        }
    }

    /// Read the leading `TES3` record of the file
    pub fn read_file_header(&mut self) -> ParseResult<FileHeader> {
        FileHeader::read(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::EsmWriter;
    use std::io::Cursor;

    fn two_records() -> Vec<u8> {
        let mut writer = EsmWriter::new(Vec::new());
        writer.start_record(Tag::new(b"GLOB"), flags::PERSISTENT).unwrap();
        writer.write_zstring(Tag::new(b"NAME"), "Gold").unwrap();
        writer.write_fixed(Tag::new(b"FLTV"), &42.0f32).unwrap();
        writer.end_record().unwrap();
        writer.start_record(Tag::new(b"GMST"), 0).unwrap();
        writer.write_zstring(Tag::new(b"NAME"), "iMaxInfoDist").unwrap();
        writer.end_record().unwrap();
        writer.into_inner()
    }

    #[test]
    fn test_walk_records_and_subrecords() {
        let mut reader = EsmReader::new(Cursor::new(two_records()), "test.esp").unwrap();

        let header = reader.read_record_header().unwrap().unwrap();
        assert_eq!(header.tag, Tag::new(b"GLOB"));
        assert!(header.is_persistent());
        assert!(reader.has_more_records());

        assert_eq!(reader.peek_sub_tag().unwrap(), Some(Tag::new(b"NAME")));
        reader.expect_sub(Tag::new(b"NAME")).unwrap();
        assert_eq!(reader.read_zstring().unwrap(), "Gold");
        assert!(reader.has_more_subs());

        reader.expect_sub(Tag::new(b"FLTV")).unwrap();
        assert_eq!(reader.read_fixed::<f32>().unwrap(), 42.0);
        assert!(!reader.has_more_subs());
        assert!(reader.read_sub_header().unwrap().is_none());

        let header = reader.read_record_header().unwrap().unwrap();
        assert_eq!(header.tag, Tag::new(b"GMST"));
        assert!(!reader.has_more_records());
        assert!(reader.read_record_header().unwrap().is_none());
    }

    #[test]
    fn test_skipping_unread_record() {
        let mut reader = EsmReader::new(Cursor::new(two_records()), "test.esp").unwrap();
        reader.read_record_header().unwrap();
        let header = reader.read_record_header().unwrap().unwrap();
        assert_eq!(header.tag, Tag::new(b"GMST"));
        assert_eq!(reader.records_read(), 2);
    }

    #[test]
    fn test_fixed_size_mismatch() {
        let mut reader = EsmReader::new(Cursor::new(two_records()), "test.esp").unwrap();
        reader.read_record_header().unwrap();
        reader.expect_sub(Tag::new(b"NAME")).unwrap();
        let err = reader.read_fixed::<u32>().unwrap_err();
        assert!(matches!(err, ParseError::FieldSizeMismatch { found: 5, .. }));
    }

    #[test]
    fn test_peek_after_partial_read() {
        let mut reader = EsmReader::new(Cursor::new(two_records()), "test.esp").unwrap();
        reader.read_record_header().unwrap();
        reader.expect_sub(Tag::new(b"NAME")).unwrap();
        let offset = reader.offset();
        assert_eq!(reader.peek_sub_tag().unwrap(), Some(Tag::new(b"FLTV")));
        assert_eq!(reader.offset(), offset);
        assert_eq!(reader.read_zstring().unwrap(), "Gold");
    }

    #[test]
    fn test_truncated_record_is_fatal() {
        let mut data = two_records();
        data.truncate(data.len() - 3);
        let mut reader = EsmReader::new(Cursor::new(data), "short.esp").unwrap();
        reader.read_record_header().unwrap();
        let err = reader.read_record_header().unwrap_err();
        assert!(matches!(err, ParseError::RecordOverrun { .. }));
    }

    fn overrun_record(trailer: &[u8]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(b"SCPT");
        data.extend_from_slice(&12u32.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(b"SCTX");
        data.extend_from_slice(&40u32.to_le_bytes());
        data.extend_from_slice(b"abcd");
        data.extend_from_slice(trailer);
        data
    }

    #[test]
    fn test_overrun_clamped_in_tail_position() {
        let mut reader = EsmReader::new(Cursor::new(overrun_record(&[])), "tail.esp").unwrap();
        reader.read_record_header().unwrap();
        let sub = reader.read_sub_header().unwrap().unwrap();
        assert_eq!(sub.length, 4);
        assert_eq!(reader.read_bytes().unwrap(), b"abcd");
    }

    #[test]
    fn test_overrun_clamped_before_valid_record() {
        let data = overrun_record(b"GLOB\0\0\0\0\0\0\0\0\0\0\0\0");
        let mut reader = EsmReader::new(Cursor::new(data), "next.esp").unwrap();
        reader.read_record_header().unwrap();
        assert_eq!(reader.read_sub_header().unwrap().unwrap().length, 4);
        reader.skip_sub_payload().unwrap();
        assert_eq!(reader.read_record_header().unwrap().unwrap().tag, Tag::new(b"GLOB"));
    }

    #[test]
    fn test_overrun_fatal_before_garbage() {
        let data = overrun_record(b"\x01\x02\x03\x04junk");
        let mut reader = EsmReader::new(Cursor::new(data), "bad.esp").unwrap();
        reader.read_record_header().unwrap();
        let err = reader.read_sub_header().unwrap_err();
        assert!(matches!(err, ParseError::SubRecordOverrun { length: 40, available: 4, .. }));

        let located = reader.locate(err);
        assert_eq!(located.file(), Some("bad.esp"));
        assert!(located.to_string().contains("SCTX"));
    }

    #[test]
    fn test_strict_validation_rejects_overrun() {
        let options = ParseOptions {
            strict_validation: true,
            ..ParseOptions::default()
        };
        let mut reader = EsmReader::new(Cursor::new(overrun_record(&[])), "tail.esp")
            .unwrap()
            .with_options(options);
        reader.read_record_header().unwrap();
        assert!(reader.read_sub_header().is_err());
    }

    #[test]
    fn test_in_memory_payload_is_never_deferred() {
        let options = ParseOptions {
            defer_threshold: 0,
            ..ParseOptions::default()
        };
        let mut reader = EsmReader::new(Cursor::new(two_records()), "mem.esp")
            .unwrap()
            .with_options(options);
        reader.read_record_header().unwrap();
        reader.expect_sub(Tag::new(b"NAME")).unwrap();
        let deferred = reader.defer_payload().unwrap();
        assert!(deferred.is_loaded());
        assert_eq!(&*deferred.bytes().unwrap(), b"Gold\0");
    }
}
