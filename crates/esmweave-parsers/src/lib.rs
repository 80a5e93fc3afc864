//! esmweave-parsers
//!
//! Reading and writing the TES3 chunked record format.
//!
//! # Layout
//!
//! | Module      | Contents |
//! |-------------|----------|
//! | `reader`    | Pull-based record / sub-record cursor with overrun policy |
//! | `writer`    | Mirror of the reader, patches lengths on close |
//! | `field`     | Fixed-size little-endian payload fields |
//! | `deferred`  | Payloads read on first access |
//! | `refnum`    | Narrow and wide reference number encodings |
//! | `records`   | One model per supported record kind |
//! | `registry`  | Tag to record kind table |
//!
//! # Example
//!
//! ```rust,ignore
//! use esmweave_parsers::{EsmReader, EsmRecord, Global, GLOBAL_REGISTRY, RecordKind};
//!
//! let mut reader = EsmReader::open("Morrowind.esm")?;
//! let header = reader.read_file_header()?;
//! println!("{} masters, {} records", header.masters.len(), header.record_count);
//!
//! while let Some(record) = reader.read_record_header()? {
//!     if let Ok(RecordKind::Global) = GLOBAL_REGISTRY.get_for_tag(record.tag) {
//!         let global = Global::load(&mut reader)?;
//!         println!("{} = {}", global.record.id, global.record.value);
//!     }
//! }
//! ```

pub mod deferred;
pub mod field;
pub mod logging;
pub mod reader;
pub mod records;
pub mod refnum;
pub mod registry;
pub mod traits;
pub mod writer;

// Re-export main types
pub use traits::{
    codec_by_name, EsmRecord, Identified, Loaded, NoProgress, ParseError, ParseOptions,
    ParseResult, PassThrough, ProgressSink, TextCodec, Utf8Codec,
};

pub use deferred::Deferred;
pub use field::Field;
pub use reader::{flags, EsmReader, ReaderContext, RecordHeader, SubRecordHeader};
pub use refnum::{RefNumCodec, RefNumWidth};
pub use registry::{
    RecordKind, RecordRegistration, RecordRegistrationBuilder, RecordRegistry, RegistryError,
    GLOBAL_REGISTRY,
};
pub use writer::EsmWriter;

pub use records::{
    write_role_marker, Cell, CellRef, Container, Creature, Dialogue, DialogueInfo, FileHeader,
    GameSetting, Global, Land, LandTexture, MasterFile, Npc, ReferenceCursor, ReferenceRole,
    Script, SettingValue, VarType,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
