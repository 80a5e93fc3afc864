//! esmweave-data
//!
//! Load-order layering for TES3 content files: overlay containers with
//! base and modified layers, the dialogue response chain merger, per-cell
//! reference summaries and the loader that drives a session.
//!
//! # Example
//!
//! ```rust,ignore
//! use esmweave_data::{ContentFile, DirectoryResolver, LoadOptions, Loader};
//!
//! let loader = Loader::new(DirectoryResolver::new("Data Files"), LoadOptions::default())?;
//! let (content, report) = loader.load_all(&[
//!     ContentFile::base("Morrowind.esm"),
//!     ContentFile::plugin("Patch.esp"),
//! ])?;
//! for warning in &report.warnings {
//!     eprintln!("{warning}");
//! }
//! println!("{} creatures", content.creatures.len());
//! ```

pub mod cell_groups;
pub mod collection;
pub mod content;
pub mod defaults;
pub mod info_order;
pub mod loader;
pub mod report;

pub use cell_groups::{CellGroupSummary, CellGroups};
pub use collection::{Collection, CollectionStats, Entry, Layer, NotFoundIgnored, RecordState};
pub use content::{parse_land_id, ContentData};
pub use info_order::{InfoLink, InfoOrder, UnlinkedInfo};
pub use loader::{
    ContentFile, DirectoryResolver, FileRole, LoadOptions, Loader, LoaderState, PathResolver, Step,
};
pub use report::{FileSummary, LoadReport, LoadWarning, WarningKind};
