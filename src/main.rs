//! esmweave CLI
//!
//! Loads a TES3 load order, reports what each plugin changed and writes
//! the merged modifications back out as a single plugin.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{debug, info};

use esmweave_core::{CellId, Error, RecordId};
use esmweave_data::{
    ContentData, ContentFile, DirectoryResolver, LoadOptions, LoadReport, Loader,
};
use esmweave_parsers::logging::{self, TracingConfig};
use esmweave_parsers::{
    codec_by_name, FileHeader, MasterFile, ProgressSink, RecordKind, RefNumCodec, ReferenceRole,
    GLOBAL_REGISTRY,
};

/// esmweave - TES3 load-order merging and write-back
#[derive(Parser)]
#[command(name = "esmweave")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output format for structured data
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Load options as JSON; flags override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a load order and print a summary and the warning report
    Load(LoadArgs),

    /// Print one entry (both layers and its state) as JSON
    Show(ShowArgs),

    /// Print the final response order of a dialogue topic
    Order(OrderArgs),

    /// Print the reference summary of a cell
    Cell(CellArgs),

    /// Write every modification as a new plugin
    Save(SaveArgs),

    /// List the supported record kinds
    Kinds,
}

#[derive(Args)]
struct LoadOrderArgs {
    /// Master files, in load order
    #[arg(required = true)]
    masters: Vec<PathBuf>,

    /// Plugin files, in load order
    #[arg(long = "plugin", num_args = 1..)]
    plugins: Vec<PathBuf>,

    /// Additional directories searched for declared masters
    #[arg(long = "data")]
    data_dirs: Vec<PathBuf>,

    /// Text encoding of string payloads (passthrough, utf8)
    #[arg(long)]
    encoding: Option<String>,

    /// Reject clamped sub-record overruns
    #[arg(long)]
    strict: bool,

    /// Do not add fallback globals and game settings
    #[arg(long)]
    no_defaults: bool,
}

#[derive(Args)]
struct LoadArgs {
    #[command(flatten)]
    files: LoadOrderArgs,
}

#[derive(Args)]
struct ShowArgs {
    /// Record kind (name or tag, e.g. creature or CREA)
    kind: String,

    /// Record id; cells as `#x y` or a name, terrain as `x,y`, responses as `topic#info`
    id: String,

    #[command(flatten)]
    files: LoadOrderArgs,
}

#[derive(Args)]
struct OrderArgs {
    /// Dialogue topic
    topic: String,

    #[command(flatten)]
    files: LoadOrderArgs,
}

#[derive(Args)]
struct CellArgs {
    /// Cell name, or `#x y` for exterior cells
    id: String,

    #[command(flatten)]
    files: LoadOrderArgs,
}

#[derive(Args)]
struct SaveArgs {
    /// Output plugin path
    #[arg(short, long)]
    output: PathBuf,

    /// Author written to the file header
    #[arg(long, default_value = "")]
    author: String,

    /// Description written to the file header
    #[arg(long, default_value = "")]
    description: String,

    #[command(flatten)]
    files: LoadOrderArgs,
}

/// Forwards loader progress to the log
#[derive(Default)]
struct LogProgress {
    total: u64,
}

impl ProgressSink for LogProgress {
    fn set_progress_range(&mut self, total: u64) {
        self.total = total;
    }

    fn set_progress(&mut self, current: u64) {
        logging::log_progress(current, self.total);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_with_config(TracingConfig::for_verbosity(cli.verbose));

    let options = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Invalid config {}", path.display()))?
        }
        None => LoadOptions::default(),
    };

    match cli.command {
        Commands::Load(args) => cmd_load(&args, &options, cli.format),
        Commands::Show(args) => cmd_show(&args, &options),
        Commands::Order(args) => cmd_order(&args, &options, cli.format),
        Commands::Cell(args) => cmd_cell(&args, &options, cli.format),
        Commands::Save(args) => cmd_save(&args, &options),
        Commands::Kinds => cmd_kinds(cli.format),
    }
}

fn file_name(path: &Path) -> Result<String> {
    let name = path
        .file_name()
        .with_context(|| format!("Not a file path: {}", path.display()))?;
    Ok(name.to_string_lossy().into_owned())
}

impl LoadOrderArgs {
    fn options(&self, base: &LoadOptions) -> LoadOptions {
        let mut options = base.clone();
        if let Some(encoding) = &self.encoding {
            options.encoding.clone_from(encoding);
        }
        if self.strict {
            options.parse.strict_validation = true;
        }
        if self.no_defaults {
            options.synthesize_defaults = false;
        }
        options
    }

    fn resolver(&self) -> DirectoryResolver {
        let parents = self
            .masters
            .iter()
            .chain(&self.plugins)
            .filter_map(|path| path.parent())
            .map(|dir| if dir.as_os_str().is_empty() { Path::new(".") } else { dir });
        self.data_dirs
            .iter()
            .map(PathBuf::as_path)
            .chain(parents)
            .fold(DirectoryResolver::default(), DirectoryResolver::with_root)
    }

    fn load_order(&self) -> Result<Vec<ContentFile>> {
        let masters = self.masters.iter().map(|p| file_name(p).map(ContentFile::base));
        let plugins = self.plugins.iter().map(|p| file_name(p).map(ContentFile::plugin));
        masters.chain(plugins).collect()
    }

    fn load(&self, base: &LoadOptions) -> Result<(ContentData, LoadReport)> {
        let order = self.load_order()?;
        info!(files = order.len(), "Loading");
        let loader = Loader::new(self.resolver(), self.options(base))
            .context("Invalid load options")?
            .with_progress(LogProgress::default());
        loader.load_all(&order).context("Failed to load content files")
    }
}

fn cmd_load(args: &LoadArgs, options: &LoadOptions, format: OutputFormat) -> Result<()> {
    let (content, report) = args.files.load(options)?;
    let stats: BTreeMap<_, _> = content
        .stats()
        .into_iter()
        .map(|(kind, stats)| (kind.name(), stats))
        .collect();

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "stats": stats,
                "report": report,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            println!("{:<6} {:<8} {:>9} {:>9}  {}", "Index", "Role", "Declared", "Read", "File");
            println!("{:-<6} {:-<8} {:->9} {:->9}  {:-<30}", "", "", "", "", "");
            for file in &report.files {
                println!(
                    "{:<6} {:<8} {:>9} {:>9}  {}",
                    file.index,
                    format!("{:?}", file.role),
                    file.declared_records,
                    file.records_read,
                    file.name
                );
            }

            println!();
            println!(
                "{:<10} {:>9} {:>9} {:>9} {:>9}",
                "Kind", "Base", "Added", "Modified", "Deleted"
            );
            println!("{:-<10} {:->9} {:->9} {:->9} {:->9}", "", "", "", "", "");
            for (kind, stats) in &stats {
                println!(
                    "{:<10} {:>9} {:>9} {:>9} {:>9}",
                    kind, stats.base_only, stats.modified_only, stats.modified, stats.deleted
                );
            }

            if !report.skipped.is_empty() {
                println!("\nSkipped records:");
                for (tag, count) in &report.skipped {
                    println!("  {tag}: {count}");
                }
            }
            if !report.defaults_added.is_empty() {
                println!("\nFallback records added: {}", report.defaults_added.join(", "));
            }
            if report.is_clean() {
                println!("\nNo warnings");
            } else {
                println!("\nWarnings ({}):", report.warnings.len());
                for warning in &report.warnings {
                    println!("  {warning}");
                }
            }
        }
    }
    Ok(())
}

fn not_found(id: String) -> anyhow::Error {
    Error::RecordNotFound { id }.into()
}

fn cmd_show(args: &ShowArgs, options: &LoadOptions) -> Result<()> {
    let Some(kind) = RecordKind::parse(&args.kind) else {
        bail!("Unknown record kind: {}", args.kind);
    };
    let (content, _) = args.files.load(options)?;
    let Some(entry) = content.entry_json(kind, &args.id)? else {
        return Err(not_found(format!("{} '{}'", kind.name(), args.id)));
    };
    println!("{}", serde_json::to_string_pretty(&entry)?);
    Ok(())
}

fn cmd_order(args: &OrderArgs, options: &LoadOptions, format: OutputFormat) -> Result<()> {
    let (content, _) = args.files.load(options)?;
    let topic = RecordId::from(args.topic.as_str());
    if !content.dialogues.has_identity(&topic) {
        return Err(not_found(format!("dialogue topic '{}'", args.topic)));
    }
    let infos = content.ordered_infos(&topic);

    match format {
        OutputFormat::Json => {
            let json: Vec<_> = infos
                .iter()
                .map(|info| {
                    serde_json::json!({
                        "info": info.info,
                        "prev": info.prev,
                        "next": info.next,
                        "actor": info.actor,
                        "response": info.response,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            for (position, info) in infos.iter().enumerate() {
                let speaker = info.actor.as_ref().map_or_else(String::new, |a| format!("[{a}] "));
                let response = info.response.as_deref().unwrap_or("");
                println!("{:>4}. {:<24} {speaker}{response}", position + 1, info.info);
            }
            println!("\n{} responses", infos.len());
        }
    }
    Ok(())
}

fn cmd_cell(args: &CellArgs, options: &LoadOptions, format: OutputFormat) -> Result<()> {
    let (content, _) = args.files.load(options)?;
    let cell = CellId::parse(&args.id);
    let Some(summary) = content.cell_groups.get(&cell) else {
        bail!("No references in cell '{}'", args.id);
    };

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "summary": summary.as_ref(),
                "references": content.cell_references(&cell),
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            println!("{cell}");
            for role in [
                ReferenceRole::Persistent,
                ReferenceRole::Temporary,
                ReferenceRole::VisibleDistant,
            ] {
                let refs = summary.list(role);
                println!("  {role:?} ({})", refs.len());
                for refnum in refs {
                    let object = content
                        .references
                        .find(refnum)
                        .map_or_else(|| "?".to_string(), |r| r.object.to_string());
                    println!("    {refnum:<12} {object}");
                }
            }
        }
    }
    Ok(())
}

fn cmd_save(args: &SaveArgs, options: &LoadOptions) -> Result<()> {
    let options = args.files.options(options);
    let (content, report) = args.files.load(&options)?;

    let paths: Vec<&PathBuf> = args.files.masters.iter().chain(&args.files.plugins).collect();
    let mut masters = Vec::with_capacity(report.files.len());
    for (file, path) in report.files.iter().zip(paths) {
        let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        masters.push(MasterFile {
            name: file.name.clone(),
            size,
        });
    }

    // The saved plugin sits after every loaded file, so each of them is a master.
    let count = u32::try_from(masters.len()).context("Too many content files")?;
    let refnums = RefNumCodec::new(count, 0..count);
    let header = FileHeader {
        author: args.author.clone(),
        description: args.description.clone(),
        masters,
        ..FileHeader::default()
    };
    let text = codec_by_name(&options.encoding)
        .with_context(|| format!("Unknown text encoding: {}", options.encoding))?;

    let mut out = Vec::new();
    let written = content
        .write_plugin(&mut out, &header, &refnums, Arc::clone(&text))
        .context("Failed to write plugin")?;
    fs::write(&args.output, &out)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    debug!(bytes = out.len(), "Plugin written");

    println!("Wrote {written} records to {}", args.output.display());
    Ok(())
}

fn cmd_kinds(format: OutputFormat) -> Result<()> {
    let kinds = GLOBAL_REGISTRY.list();
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&kinds)?),
        OutputFormat::Text => {
            println!("{:<6} {:<10} {:<6} {}", "Tag", "Kind", "Save", "Description");
            println!("{:-<6} {:-<10} {:-<6} {:-<40}", "", "", "", "");
            for kind in &kinds {
                let save = if kind.write_back { "yes" } else { "no" };
                println!("{:<6} {:<10} {:<6} {}", kind.tag, kind.kind.name(), save, kind.description);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_load_order() {
        let cli = Cli::try_parse_from([
            "esmweave",
            "-vv",
            "load",
            "Data/Morrowind.esm",
            "Data/Tribunal.esm",
            "--plugin",
            "Patch.esp",
            "--no-defaults",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::Load(args) = cli.command else {
            panic!("expected load");
        };
        let order = args.files.load_order().unwrap();
        assert_eq!(order.len(), 3);
        assert_eq!(order[0], ContentFile::base("Morrowind.esm"));
        assert_eq!(order[2], ContentFile::plugin("Patch.esp"));
        assert!(!args.files.options(&LoadOptions::default()).synthesize_defaults);

        let roots = args.files.resolver();
        assert_eq!(roots.roots(), [PathBuf::from("Data"), PathBuf::from(".")]);
    }

    #[test]
    fn test_missing_record_is_not_found() {
        let err = not_found("creature 'rat_99'".to_string());
        let core = err.downcast_ref::<Error>().unwrap();
        assert!(core.is_not_found());
        assert_eq!(err.to_string(), "Record not found: creature 'rat_99'");
    }

    #[test]
    fn test_cli_show_arguments() {
        let cli = Cli::try_parse_from([
            "esmweave",
            "--format",
            "json",
            "show",
            "CREA",
            "rat_01",
            "Morrowind.esm",
        ])
        .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        let Commands::Show(args) = cli.command else {
            panic!("expected show");
        };
        assert_eq!(RecordKind::parse(&args.kind), Some(RecordKind::Creature));
        assert_eq!(args.files.masters, [PathBuf::from("Morrowind.esm")]);
    }

    #[test]
    fn test_load_requires_a_master() {
        assert!(Cli::try_parse_from(["esmweave", "load"]).is_err());
    }
}
