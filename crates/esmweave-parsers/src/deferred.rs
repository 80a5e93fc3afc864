//! Deferred sub-record payloads
//!
//! Large blobs (script source, terrain layers) are skipped during the
//! initial pass and fetched from the source file on first access.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use crate::reader::{EsmReader, ReaderContext};
use crate::traits::{ParseError, ParseResult, TextCodec};

/// A sub-record payload that may still be on disk
#[derive(Clone)]
pub struct Deferred {
    /// Where to re-read the payload from (absent for eager payloads)
    source: Option<ReaderContext>,
    len: usize,
    /// Cached bytes (loaded on first access)
    cache: Arc<RwLock<Option<Arc<[u8]>>>>,
}

impl Deferred {
    /// Wrap bytes that are already in memory
    pub fn loaded(bytes: impl Into<Arc<[u8]>>) -> Self {
        let bytes = bytes.into();
        Self {
            source: None,
            len: bytes.len(),
            cache: Arc::new(RwLock::new(Some(bytes))),
        }
    }

    /// Refer to the payload at a saved reader position
    pub(crate) fn lazy(ctx: ReaderContext) -> Self {
        Self {
            len: ctx.left_sub as usize,
            source: Some(ctx),
            cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Check if the bytes are in memory
    pub fn is_loaded(&self) -> bool {
        self.cache.read().is_some()
    }

    /// The saved position, for payloads read from a file
    pub fn source(&self) -> Option<&ReaderContext> {
        self.source.as_ref()
    }

    /// Get the payload, reading it from the source file if needed
    pub fn bytes(&self) -> ParseResult<Arc<[u8]>> {
        if let Some(bytes) = self.cache.read().as_ref() {
            return Ok(Arc::clone(bytes));
        }

        let mut cache = self.cache.write();
        if let Some(bytes) = cache.as_ref() {
            return Ok(Arc::clone(bytes));
        }

        let ctx = self.source.as_ref().ok_or_else(|| {
            ParseError::InvalidStructure("deferred payload has neither bytes nor a source".into())
        })?;
        let mut reader = EsmReader::restore(ctx)?;
        let bytes: Arc<[u8]> = reader.read_bytes().map_err(|e| reader.locate(e))?.into();
        trace!(file = %ctx.name, offset = ctx.offset, len = bytes.len(), "Loaded deferred payload");

        *cache = Some(Arc::clone(&bytes));
        Ok(bytes)
    }

    /// Decode the payload as text, dropping trailing NULs
    pub fn text(&self, codec: &dyn TextCodec) -> ParseResult<String> {
        let bytes = self.bytes()?;
        let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        Ok(codec.decode(&bytes[..end]))
    }

    /// Drop cached bytes to free memory. Eager payloads are kept.
    pub fn unload(&self) {
        if self.source.is_some() {
            *self.cache.write() = None;
        }
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("len", &self.len)
            .field("loaded", &self.is_loaded())
            .field("file", &self.source.as_ref().map(|c| c.name.as_str()))
            .finish()
    }
}

impl PartialEq for Deferred {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.cache, &other.cache) {
            return true;
        }
        if self.len != other.len {
            return false;
        }
        match (self.bytes(), other.bytes()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{ParseOptions, PassThrough};
    use crate::writer::EsmWriter;
    use esmweave_core::Tag;
    use std::io::Write;

    fn script_file(text: &str) -> tempfile::NamedTempFile {
        let mut writer = EsmWriter::new(Vec::new());
        writer.start_record(Tag::new(b"SCPT"), 0).unwrap();
        writer.write_string(Tag::new(b"SCTX"), text).unwrap();
        writer.end_record().unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&writer.into_inner()).unwrap();
        file.flush().unwrap();
        file
    }

    fn defer_first_sub(path: &std::path::Path) -> Deferred {
        let options = ParseOptions {
            defer_threshold: 1,
            ..ParseOptions::default()
        };
        let mut reader = EsmReader::open(path).unwrap().with_options(options);
        reader.read_record_header().unwrap();
        reader.read_sub_header().unwrap();
        reader.defer_payload().unwrap()
    }

    #[test]
    fn test_lazy_load_on_first_access() {
        let file = script_file("Begin RatScript\nEnd");
        let deferred = defer_first_sub(file.path());

        assert!(!deferred.is_loaded());
        assert_eq!(deferred.len(), 19);
        assert_eq!(deferred.text(&PassThrough).unwrap(), "Begin RatScript\nEnd");
        assert!(deferred.is_loaded());

        deferred.unload();
        assert!(!deferred.is_loaded());
    }

    #[test]
    fn test_clones_share_cache() {
        let file = script_file("Begin x\nEnd");
        let deferred = defer_first_sub(file.path());
        let copy = deferred.clone();

        deferred.bytes().unwrap();
        assert!(copy.is_loaded());
    }

    #[test]
    fn test_missing_source_fails_on_access() {
        let file = script_file("Begin gone\nEnd");
        let path = file.path().to_path_buf();
        let deferred = defer_first_sub(&path);
        drop(file);

        let err = deferred.bytes().unwrap_err();
        assert!(matches!(err, ParseError::DeferredSourceUnavailable { .. }));
    }

    #[test]
    fn test_eager_payload() {
        let deferred = Deferred::loaded(b"abc".to_vec());
        assert!(deferred.is_loaded());
        deferred.unload();
        assert!(deferred.is_loaded());
        assert_eq!(deferred, Deferred::loaded(b"abc".to_vec()));
    }
}
