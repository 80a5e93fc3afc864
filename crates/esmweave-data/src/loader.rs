//! Load orchestration
//!
//! A [`Loader`] drives one session: content files are opened strictly in
//! load order, each top-level record is decoded by its model and merged
//! into the overlay containers, and [`Loader::finish`] hands back the
//! merged [`ContentData`] together with the [`LoadReport`].
//!
//! ```text
//! Idle -> FileOpen -> RecordDispatch -> FileExhausted -> (Idle | FileOpen)
//! ```
//!
//! A fatal error in a file moves the loader to `Failed`, which accepts no
//! further calls. Records merged before the error stay behind, so the
//! session cannot be continued or finished.

use std::collections::HashSet;
use std::fmt;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use esmweave_core::{Error, RecordId, Result, Tag};
use esmweave_parsers::logging::instrument_load;
use esmweave_parsers::{
    codec_by_name, log_load_complete, log_load_error, log_load_start, Cell, Dialogue,
    DialogueInfo, EsmReader, EsmRecord, Identified, Loaded, NoProgress, ParseError, ParseOptions,
    ParseResult, ProgressSink, RecordHeader, RecordKind, RefNumCodec, ReferenceCursor, TextCodec,
    GLOBAL_REGISTRY,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::collection::{Collection, Layer};
use crate::content::ContentData;
use crate::defaults;
use crate::info_order::InfoLink;
use crate::report::{FileSummary, LoadReport, LoadWarning, WarningKind};

/// Whether a file contributes to the base or the modified layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileRole {
    Base,
    Plugin,
}

impl FileRole {
    pub fn layer(self) -> Layer {
        match self {
            FileRole::Base => Layer::Base,
            FileRole::Plugin => Layer::Modified,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    Idle,
    FileOpen,
    RecordDispatch,
    FileExhausted,
    /// A fatal error ended the session
    Failed,
}

impl fmt::Display for LoaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Outcome of [`Loader::step_one_record`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// The current file is exhausted
    Done,
}

/// Maps content file names to paths on disk
pub trait PathResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<PathBuf>;
}

/// Looks content files up in a list of directories.
///
/// Directories are searched in the order they were added. Names match
/// case-insensitively, since master lists rarely agree with the spelling
/// on disk.
#[derive(Debug, Clone, Default)]
pub struct DirectoryResolver {
    roots: Vec<PathBuf>,
}

impl DirectoryResolver {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            roots: vec![root.as_ref().to_path_buf()],
        }
    }

    pub fn with_root(mut self, root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        if !self.roots.contains(&root) {
            self.roots.push(root);
        }
        self
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    fn find_in(root: &Path, name: &str) -> Option<PathBuf> {
        let direct = root.join(name);
        if direct.is_file() {
            return Some(direct);
        }
        fs::read_dir(root)
            .ok()?
            .filter_map(|entry| entry.ok())
            .find(|entry| entry.file_name().to_string_lossy().eq_ignore_ascii_case(name))
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
    }
}

impl PathResolver for DirectoryResolver {
    fn resolve(&self, name: &str) -> Option<PathBuf> {
        let as_path = Path::new(name);
        if as_path.components().count() > 1 && as_path.is_file() {
            return Some(as_path.to_path_buf());
        }
        self.roots.iter().find_map(|root| Self::find_in(root, name))
    }
}

/// Session-wide options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    pub parse: ParseOptions,
    /// Add the well-known fallback globals and settings on finish
    pub synthesize_defaults: bool,
    /// Text codec name, see [`codec_by_name`]
    pub encoding: String,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            parse: ParseOptions::default(),
            synthesize_defaults: true,
            encoding: "passthrough".to_string(),
        }
    }
}

/// One entry of a load order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFile {
    pub name: String,
    pub role: FileRole,
}

impl ContentFile {
    pub fn base(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: FileRole::Base,
        }
    }

    pub fn plugin(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: FileRole::Plugin,
        }
    }
}

/// The file currently being read
struct OpenFile {
    reader: EsmReader<BufReader<File>>,
    name: String,
    role: FileRole,
    refnums: RefNumCodec,
    /// Last `DIAL` seen in this file; owns the `INFO`s that follow it
    topic: Option<RecordId>,
    unsupported: HashSet<Tag>,
    started: Instant,
}

impl OpenFile {
    /// Records read after the `TES3` header
    fn records(&self) -> u64 {
        self.reader.records_read().saturating_sub(1)
    }

    fn warning(&self, kind: WarningKind, offset: u64, record: Tag, message: String) -> LoadWarning {
        warn!(file = %self.name, offset, %record, "{kind}: {message}");
        LoadWarning {
            kind,
            file: Some(self.name.clone()),
            offset: Some(offset),
            record: Some(record),
            message,
        }
    }
}

pub struct Loader {
    resolver: Box<dyn PathResolver>,
    progress: Box<dyn ProgressSink>,
    options: LoadOptions,
    text: Arc<dyn TextCodec>,
    state: LoaderState,
    current: Option<OpenFile>,
    content: ContentData,
    report: LoadReport,
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("state", &self.state)
            .field("current", &self.current.as_ref().map(|file| &file.name))
            .field("files", &self.report.files.len())
            .finish_non_exhaustive()
    }
}

impl Loader {
    pub fn new(resolver: impl PathResolver + 'static, options: LoadOptions) -> Result<Self> {
        let text = codec_by_name(&options.encoding).ok_or_else(|| Error::InvalidConfig {
            message: format!("unknown text encoding '{}'", options.encoding),
        })?;
        Ok(Self {
            resolver: Box::new(resolver),
            progress: Box::new(NoProgress),
            options,
            text,
            state: LoaderState::Idle,
            current: None,
            content: ContentData::new(),
            report: LoadReport::default(),
        })
    }

    pub fn with_progress(mut self, sink: impl ProgressSink + 'static) -> Self {
        self.progress = Box::new(sink);
        self
    }

    pub fn state(&self) -> LoaderState {
        self.state
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    pub fn text_codec(&self) -> &Arc<dyn TextCodec> {
        &self.text
    }

    /// Data merged so far
    pub fn content(&self) -> &ContentData {
        &self.content
    }

    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    /// Open the next file of the load order and read its header.
    ///
    /// Every declared master must already be loaded.
    pub fn start_file(&mut self, name: &str, role: FileRole) -> Result<()> {
        if !matches!(self.state, LoaderState::Idle | LoaderState::FileExhausted) {
            return Err(Error::InvalidState {
                expected: "Idle or FileExhausted",
                actual: self.state.to_string(),
            });
        }
        if self.report.files.iter().any(|f| f.name.eq_ignore_ascii_case(name)) {
            return Err(Error::AlreadyLoaded {
                file: name.to_string(),
            });
        }

        let path = self
            .resolver
            .resolve(name)
            .ok_or_else(|| Error::FileNotFound(PathBuf::from(name)))?;
        let mut reader = EsmReader::open(&path)
            .map_err(|e| Error::parse(name, e))?
            .with_codec(Arc::clone(&self.text))
            .with_options(self.options.parse.clone());
        let header = match reader.read_file_header() {
            Ok(header) => header,
            Err(e) => {
                let located = reader.locate(e);
                log_load_error!(name, located);
                self.state = LoaderState::Failed;
                return Err(Error::parse(name, located));
            }
        };

        let mut parents = Vec::with_capacity(header.masters.len());
        for master in &header.masters {
            let Some(loaded) = self
                .report
                .files
                .iter()
                .find(|f| f.name.eq_ignore_ascii_case(&master.name))
            else {
                self.state = LoaderState::Failed;
                return Err(Error::MissingDependency {
                    file: name.to_string(),
                    dependency: master.name.clone(),
                });
            };
            parents.push(loaded.index);
        }

        let index = u32::try_from(self.report.files.len())
            .map_err(|_| Error::internal("load order exceeds u32 files"))?;
        log_load_start!(name, role);
        debug!(file = name, index, ?parents, records = header.record_count, "Resolved masters");

        self.progress.set_progress_range(u64::from(header.record_count));
        self.report.files.push(FileSummary {
            name: name.to_string(),
            role,
            index,
            masters: header.masters.iter().map(|m| m.name.clone()).collect(),
            declared_records: header.record_count,
            records_read: 0,
        });
        self.current = Some(OpenFile {
            reader,
            name: name.to_string(),
            role,
            refnums: RefNumCodec::new(index, parents),
            topic: None,
            unsupported: HashSet::new(),
            started: Instant::now(),
        });
        self.state = LoaderState::FileOpen;
        Ok(())
    }

    /// Read and merge one top-level record of the current file
    pub fn step_one_record(&mut self) -> Result<Step> {
        let file = match (self.state, self.current.as_mut()) {
            (LoaderState::FileOpen | LoaderState::RecordDispatch, Some(file)) => file,
            _ => {
                return Err(Error::InvalidState {
                    expected: "FileOpen or RecordDispatch",
                    actual: self.state.to_string(),
                })
            }
        };

        let header = match file.reader.read_record_header() {
            Ok(Some(header)) => header,
            Ok(None) => {
                self.close_file();
                return Ok(Step::Done);
            }
            Err(e) => return Err(self.fail(e)),
        };
        self.state = LoaderState::RecordDispatch;

        if let Err(e) = dispatch(file, &header, &mut self.content, &mut self.report) {
            return Err(self.fail(e));
        }
        self.progress.set_progress(file.records());
        Ok(Step::Continue)
    }

    /// Read every remaining record of the current file
    pub fn read_to_end(&mut self) -> Result<()> {
        while self.step_one_record()? == Step::Continue {}
        Ok(())
    }

    fn close_file(&mut self) {
        if let Some(file) = self.current.take() {
            let records = file.records();
            if let Some(summary) = self.report.files.last_mut() {
                summary.records_read = records;
            }
            log_load_complete!(file.name, file.started.elapsed(), records);
        }
        self.state = LoaderState::FileExhausted;
    }

    /// Locate a parse error and end the session
    fn fail(&mut self, err: ParseError) -> Error {
        let file = self.current.take();
        let located = match &file {
            Some(file) => file.reader.locate(err),
            None => err,
        };
        if let (Some(file), Some(summary)) = (&file, self.report.files.last_mut()) {
            summary.records_read = file.records();
        }
        let name = file.map_or_else(|| "<unknown>".to_string(), |f| f.name);
        log_load_error!(name, located);
        self.state = LoaderState::Failed;
        Error::parse(name, located)
    }

    /// End the session.
    ///
    /// Response chains are finalized, neighbours that never appeared are
    /// reported, and missing fallback records are added.
    pub fn finish(mut self) -> Result<(ContentData, LoadReport)> {
        if !matches!(self.state, LoaderState::Idle | LoaderState::FileExhausted) {
            return Err(Error::InvalidState {
                expected: "Idle or FileExhausted",
                actual: self.state.to_string(),
            });
        }

        for unlinked in self.content.info_order.finalize() {
            let message = format!(
                "{} in topic '{}' (prev '{}', next '{}')",
                unlinked.id,
                unlinked.topic,
                unlinked.prev.as_ref().map_or("", RecordId::as_str),
                unlinked.next.as_ref().map_or("", RecordId::as_str),
            );
            warn!("Unresolved response neighbour: {message}");
            self.report.warn(LoadWarning {
                kind: WarningKind::UnresolvedInfoNeighbor,
                file: None,
                offset: None,
                record: Some(DialogueInfo::TAG),
                message,
            });
        }

        if self.options.synthesize_defaults {
            let added = defaults::synthesize(
                &mut self.content.globals,
                &mut self.content.game_settings,
            );
            self.report.defaults_added = added.into_iter().map(|id| id.to_string()).collect();
        }

        self.state = LoaderState::Idle;
        Ok((self.content, self.report))
    }

    /// Load every file in order and finish the session
    pub fn load_all(mut self, files: &[ContentFile]) -> Result<(ContentData, LoadReport)> {
        for file in files {
            instrument_load(&file.name, || -> Result<()> {
                self.start_file(&file.name, file.role)?;
                self.read_to_end()
            })?;
        }
        self.finish()
    }
}

fn dispatch(
    file: &mut OpenFile,
    header: &RecordHeader,
    content: &mut ContentData,
    report: &mut LoadReport,
) -> ParseResult<()> {
    let offset = file.reader.offset().saturating_sub(RecordHeader::SIZE);
    let kind = match GLOBAL_REGISTRY.get_for_tag(header.tag) {
        Ok(kind) => kind,
        Err(_) => {
            report.note_skipped(header.tag);
            if file.unsupported.insert(header.tag) {
                let warning = file.warning(
                    WarningKind::UnsupportedRecord,
                    offset,
                    header.tag,
                    format!("{} records are skipped", header.tag),
                );
                report.warn(warning);
            }
            return file.reader.skip_record_payload();
        }
    };

    let layer = file.role.layer();
    let mut ctx = MergeCtx {
        file,
        report,
        offset,
        tag: header.tag,
        layer,
    };
    match kind {
        RecordKind::Global => ctx.load_into(&mut content.globals)?,
        RecordKind::GameSetting => ctx.load_into(&mut content.game_settings)?,
        RecordKind::Script => ctx.load_into(&mut content.scripts)?,
        RecordKind::Npc => ctx.load_into(&mut content.npcs)?,
        RecordKind::Creature => ctx.load_into(&mut content.creatures)?,
        RecordKind::Container => ctx.load_into(&mut content.containers)?,
        RecordKind::Dialogue => {
            let loaded = Dialogue::load(&mut ctx.file.reader)?;
            ctx.file.topic = Some(loaded.record.id.clone());
            ctx.merge(&mut content.dialogues, loaded);
        }
        RecordKind::DialogueInfo => {
            let mut loaded = DialogueInfo::load(&mut ctx.file.reader)?;
            let Some(topic) = ctx.file.topic.clone() else {
                let message = format!("response {} has no topic", loaded.record.info);
                ctx.warn(WarningKind::InfoWithoutTopic, message);
                return Ok(());
            };
            loaded.record.topic = topic;
            content.info_order.insert(
                &loaded.record.topic,
                InfoLink::from_info(&loaded.record),
                loaded.deleted,
            );
            ctx.merge(&mut content.infos, loaded);
        }
        RecordKind::Cell => {
            let loaded = Cell::load(&mut ctx.file.reader)?;
            let cell = loaded.record.id();
            let deleted = loaded.deleted;
            ctx.merge(&mut content.cells, loaded);
            if deleted {
                return Ok(());
            }

            let file = &mut *ctx.file;
            let mut cursor = ReferenceCursor::new(&file.refnums);
            let mut refs = Vec::new();
            while let Some(reference) = cursor.next_ref(&mut file.reader)? {
                refs.push(reference);
            }
            for reference in refs {
                let refnum = reference.record.refnum;
                content.cell_groups.add_reference(
                    &cell,
                    refnum,
                    reference.record.role,
                    reference.deleted,
                    layer,
                );
                content.reference_cells.insert(refnum, cell.clone());
                ctx.merge(&mut content.references, reference);
            }
        }
        RecordKind::Land => ctx.load_into(&mut content.lands)?,
        RecordKind::LandTexture => ctx.load_into(&mut content.land_textures)?,
    }
    Ok(())
}

/// Where a record came from, for merging and warnings
struct MergeCtx<'a> {
    file: &'a mut OpenFile,
    report: &'a mut LoadReport,
    offset: u64,
    tag: Tag,
    layer: Layer,
}

impl MergeCtx<'_> {
    fn warn(&mut self, kind: WarningKind, message: String) {
        let warning = self.file.warning(kind, self.offset, self.tag, message);
        self.report.warn(warning);
    }

    fn load_into<T: EsmRecord>(&mut self, collection: &mut Collection<T>) -> ParseResult<()> {
        let loaded = T::load(&mut self.file.reader)?;
        self.merge(collection, loaded);
        Ok(())
    }

    fn merge<T: Identified + Clone>(
        &mut self,
        collection: &mut Collection<T>,
        loaded: Loaded<T>,
    ) {
        if !loaded.deleted {
            collection.load(loaded.record, self.layer);
            return;
        }
        let id = loaded.record.id();
        if collection.mark_deleted(&id, self.layer == Layer::Base).is_err() {
            self.warn(WarningKind::DeleteOfUnknown, format!("{} {id} was never defined", self.tag));
        }
    }
}
