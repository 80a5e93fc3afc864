// esmweave-parsers/src/traits.rs
//! Core traits defining the record interface for all record kinds.
//!
//! This module establishes the shared vocabulary of the parsers crate:
//! - The [`EsmRecord`] trait every record model implements
//! - Consistent error handling across the reader, writer and models
//! - Pluggable text decoding for string payloads
//! - Progress reporting for long load sessions

use std::fmt;
use std::hash::Hash;
use std::io::{Read, Seek, Write};
use std::path::PathBuf;
use std::sync::Arc;

use esmweave_core::{RefNum, Tag};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::reader::EsmReader;
use crate::writer::EsmWriter;

/// Errors that can occur while reading or writing content files
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid magic bytes: expected {expected:?}, found {found:?}")]
    InvalidMagic { expected: Vec<u8>, found: Vec<u8> },

    #[error("Unexpected end of file at offset {offset}: wanted {wanted} more bytes")]
    UnexpectedEof { offset: u64, wanted: u64 },

    #[error("Record {tag} declares {length} bytes but only {available} remain in the file")]
    RecordOverrun { tag: Tag, length: u32, available: u64 },

    #[error("Sub-record {tag} declares {length} bytes but only {available} remain in its record")]
    SubRecordOverrun { tag: Tag, length: u32, available: u32 },

    #[error("Sub-record {tag} has size {found}, expected {expected}")]
    FieldSizeMismatch { tag: Tag, expected: usize, found: u32 },

    #[error("Record {record} is missing required sub-record {subrecord}")]
    MissingSubRecord { record: Tag, subrecord: Tag },

    #[error("Expected sub-record {expected}, found {found}")]
    UnexpectedSubRecord { expected: Tag, found: Tag },

    #[error("Unknown sub-record {subrecord} in record {record}")]
    UnknownSubRecord { record: Tag, subrecord: Tag },

    #[error("Unknown reference group type {group_type}")]
    UnknownReferenceRole { group_type: u32 },

    #[error("Cannot write reference {index} in narrow form: its content file was never resolved")]
    UnresolvedRefNum { index: u32 },

    #[error("Reference {refnum} does not belong to the written file or its masters")]
    RefNumNotRepresentable { refnum: RefNum },

    #[error("Deferred payload source {path:?} is unavailable: {source}")]
    DeferredSourceUnavailable {
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid structure: {0}")]
    InvalidStructure(String),

    #[error("{file} at offset {offset} ({location}): {source}", location = describe_location(.record, .subrecord))]
    At {
        file: String,
        offset: u64,
        record: Option<Tag>,
        subrecord: Option<Tag>,
        #[source]
        source: Box<ParseError>,
    },

    #[error("Nested error in {context}: {source}")]
    Nested {
        context: String,
        #[source]
        source: Box<ParseError>,
    },
}

fn describe_location(record: &Option<Tag>, subrecord: &Option<Tag>) -> String {
    match (record, subrecord) {
        (Some(rec), Some(sub)) => format!("record {rec}, sub-record {sub}"),
        (Some(rec), None) => format!("record {rec}"),
        _ => "file header".to_string(),
    }
}

impl ParseError {
    /// Wrap this error with additional context
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ParseError::Nested {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping location and context wrappers
    pub fn root(&self) -> &ParseError {
        match self {
            ParseError::At { source, .. } | ParseError::Nested { source, .. } => source.root(),
            other => other,
        }
    }

    /// Name of the file the error was raised in, when known
    pub fn file(&self) -> Option<&str> {
        match self {
            ParseError::At { file, .. } => Some(file),
            ParseError::Nested { source, .. } => source.file(),
            _ => None,
        }
    }

    /// Byte offset the error was raised at, when known
    pub fn offset(&self) -> Option<u64> {
        match self {
            ParseError::At { offset, .. } => Some(*offset),
            ParseError::Nested { source, .. } => source.offset(),
            _ => None,
        }
    }

    /// Whether this error is a calling-code defect rather than bad input
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self.root(),
            ParseError::UnresolvedRefNum { .. } | ParseError::RefNumNotRepresentable { .. }
        )
    }
}

impl From<ParseError> for esmweave_core::Error {
    fn from(err: ParseError) -> Self {
        let file = err.file().unwrap_or("<unknown>").to_string();
        esmweave_core::Error::parse(file, err)
    }
}

/// Result type alias for parsing operations
pub type ParseResult<T> = Result<T, ParseError>;

/// Configuration options for parsing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// Reject sub-record overruns instead of clamping them in tail position
    pub strict_validation: bool,
    /// Whether to skip unknown sub-records instead of erroring
    pub skip_unknown_subrecords: bool,
    /// Minimum payload size (in bytes) worth deferring until first access
    pub defer_threshold: u32,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            strict_validation: false,
            skip_unknown_subrecords: true,
            defer_threshold: 256,
        }
    }
}

/// Text decoding collaborator for string payloads.
///
/// Content files carry legacy 8-bit text; the host decides how it maps
/// to Unicode.
pub trait TextCodec: Send + Sync + fmt::Debug {
    /// Codec name, as accepted by [`codec_by_name`]
    fn name(&self) -> &str;

    /// Decode raw payload bytes
    fn decode(&self, bytes: &[u8]) -> String;

    /// Encode text for writing
    fn encode(&self, text: &str) -> Vec<u8>;
}

/// Byte-preserving default codec.
///
/// Every byte maps to the code point of the same value, so decoding and
/// re-encoding reproduces the input exactly.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl TextCodec for PassThrough {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn decode(&self, bytes: &[u8]) -> String {
        bytes.iter().map(|&b| char::from(b)).collect()
    }

    fn encode(&self, text: &str) -> Vec<u8> {
        text.chars()
            .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
            .collect()
    }
}

/// UTF-8 codec for content authored with modern tools
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8Codec;

impl TextCodec for Utf8Codec {
    fn name(&self) -> &str {
        "utf-8"
    }

    fn decode(&self, bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }

    fn encode(&self, text: &str) -> Vec<u8> {
        text.as_bytes().to_vec()
    }
}

/// Look up a built-in codec by name
pub fn codec_by_name(name: &str) -> Option<Arc<dyn TextCodec>> {
    match name.to_ascii_lowercase().as_str() {
        "passthrough" | "latin1" | "raw" => Some(Arc::new(PassThrough)),
        "utf-8" | "utf8" => Some(Arc::new(Utf8Codec)),
        _ => None,
    }
}

/// Host-supplied progress collaborator
pub trait ProgressSink {
    /// Announce the number of steps in the current file
    fn set_progress_range(&mut self, total: u64);

    /// Report the number of steps completed so far
    fn set_progress(&mut self, current: u64);
}

/// Progress sink that discards all updates
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn set_progress_range(&mut self, _total: u64) {}

    fn set_progress(&mut self, _current: u64) {}
}

/// Anything with a stable identity inside an overlay container
pub trait Identified {
    /// Identity type (case-insensitive for string ids)
    type Id: Clone + Eq + Hash + Ord + fmt::Display + fmt::Debug;

    /// The record's identity
    fn id(&self) -> Self::Id;
}

impl<T: Identified + ?Sized> Identified for Arc<T> {
    type Id = T::Id;

    fn id(&self) -> T::Id {
        (**self).id()
    }
}

/// A decoded record plus the deletion state it was stored with
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<T> {
    /// The decoded value
    pub record: T,
    /// Whether the record carried a deletion marker
    pub deleted: bool,
}

impl<T> Loaded<T> {
    /// A live record
    pub fn live(record: T) -> Self {
        Self {
            record,
            deleted: false,
        }
    }
}

/// Core trait for all top-level record models
///
/// Implementors decode one record payload from the reader (positioned
/// right after the record header) and can write it back in the same
/// chunked layout.
pub trait EsmRecord: Identified + Clone + Sized {
    /// Top-level record tag
    const TAG: Tag;

    /// Decode the payload of the current record
    fn load<R: Read + Seek>(reader: &mut EsmReader<R>) -> ParseResult<Loaded<Self>>;

    /// Write the payload sub-records; deleted records only write their id
    /// and the deletion marker
    fn save<W: Write>(&self, writer: &mut EsmWriter<W>, deleted: bool) -> ParseResult<()>;

    /// Record header flags to preserve on write-back
    fn record_flags(&self) -> u32 {
        0
    }

    /// Write a complete record (header and payload)
    fn write_record<W: Write>(&self, writer: &mut EsmWriter<W>, deleted: bool) -> ParseResult<()> {
        let mut flags = self.record_flags() & !crate::reader::flags::DELETED;
        if deleted {
            flags |= crate::reader::flags::DELETED;
        }
        writer.start_record(Self::TAG, flags)?;
        self.save(writer, deleted)?;
        writer.end_record()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_context() {
        let error = ParseError::InvalidMagic {
            expected: b"TES3".to_vec(),
            found: b"TES4".to_vec(),
        };

        let contextualized = error.with_context("reading file header");

        match &contextualized {
            ParseError::Nested { context, .. } => {
                assert_eq!(context, "reading file header");
            }
            _ => panic!("Expected Nested error"),
        }
        assert!(matches!(contextualized.root(), ParseError::InvalidMagic { .. }));
    }

    #[test]
    fn test_located_error_message() {
        let error = ParseError::At {
            file: "Tribunal.esm".into(),
            offset: 0x40,
            record: Some(Tag::new(b"NPC_")),
            subrecord: Some(Tag::new(b"NPDT")),
            source: Box::new(ParseError::FieldSizeMismatch {
                tag: Tag::new(b"NPDT"),
                expected: 52,
                found: 40,
            }),
        };

        let message = error.to_string();
        assert!(message.contains("Tribunal.esm"));
        assert!(message.contains("record NPC_, sub-record NPDT"));
        assert_eq!(error.file(), Some("Tribunal.esm"));
        assert_eq!(error.offset(), Some(0x40));
    }

    #[test]
    fn test_pass_through_preserves_bytes() {
        let bytes: Vec<u8> = (0u8..=255).collect();
        let codec = PassThrough;
        assert_eq!(codec.encode(&codec.decode(&bytes)), bytes);
    }

    #[test]
    fn test_codec_lookup() {
        assert_eq!(codec_by_name("UTF-8").unwrap().name(), "utf-8");
        assert_eq!(codec_by_name("latin1").unwrap().name(), "passthrough");
        assert!(codec_by_name("koi8-r").is_none());
    }

    #[test]
    fn test_invariant_violation_detection() {
        let err = ParseError::UnresolvedRefNum { index: 7 }.with_context("saving cell");
        assert!(err.is_invariant_violation());
    }
}
