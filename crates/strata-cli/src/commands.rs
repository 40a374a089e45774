use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::Context as _;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use strata_graph::{heap, registry, HeapConfig};
use strata_store::{DirRecordStore, DirStoreConfig, RecordStore};
use strata_types::RecordReader;
use tracing::debug;

use crate::cli::*;
use crate::demo;

/// Settings read from `--config`.
#[derive(Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub heap: HeapConfig,
    pub store: DirStoreConfig,
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<CliConfig> {
    let Some(path) = path else {
        return Ok(CliConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config = toml::from_str(&text)
        .with_context(|| format!("parsing config {}", path.display()))?;
    Ok(config)
}

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    heap::configure(config.heap);
    demo::register()?;

    let store = DirRecordStore::open(&cli.store, config.store)
        .with_context(|| format!("opening store {}", cli.store.display()))?;
    debug!(root = %store.root().display(), "store ready");

    let format = cli.format;
    match cli.command {
        Command::Demo(args) => cmd_demo(&store, args, &format),
        Command::Ls(_) => cmd_ls(&store, &format),
        Command::Show(args) => cmd_show(&store, args, &format),
        Command::Rm(args) => cmd_rm(&store, args),
        Command::Stats(_) => cmd_stats(&store, &format),
    }
}

// ---------------------------------------------------------------------------
// Record inspection
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct RecordInfo {
    pub key: String,
    pub class_id: String,
    pub class_name: Option<String>,
    pub size: usize,
}

#[derive(Debug, Serialize)]
pub struct RecordDump {
    #[serde(flatten)]
    pub info: RecordInfo,
    pub payload: String,
}

#[derive(Debug, Default, Serialize)]
pub struct StoreStats {
    pub records: usize,
    pub total_bytes: u64,
    pub classes: BTreeMap<String, usize>,
}

/// Every record leads with its class id.
fn describe(key: &str, bytes: &[u8]) -> RecordInfo {
    let class_id = RecordReader::new(bytes.to_vec()).read_class().ok();
    RecordInfo {
        key: key.to_owned(),
        class_id: class_id.map_or_else(|| "--------".to_owned(), |id| id.to_hex()),
        class_name: class_id.and_then(registry::class_name),
        size: bytes.len(),
    }
}

pub fn list(store: &impl RecordStore) -> anyhow::Result<Vec<RecordInfo>> {
    let mut records = Vec::new();
    for key in store.keys()? {
        if let Some(bytes) = store.get(&key)? {
            records.push(describe(&key, &bytes));
        }
    }
    records.sort_by_key(|info| (info.key.parse::<u32>().unwrap_or(u32::MAX), info.key.clone()));
    Ok(records)
}

pub fn show(store: &impl RecordStore, key: &str) -> anyhow::Result<RecordDump> {
    let bytes = store
        .get(key)?
        .with_context(|| format!("no record under key {key}"))?;
    Ok(RecordDump {
        info: describe(key, &bytes),
        payload: hex::encode(&bytes),
    })
}

pub fn remove(store: &impl RecordStore, key: &str) -> anyhow::Result<()> {
    if !store.delete(key)? {
        anyhow::bail!("no record under key {key}");
    }
    Ok(())
}

pub fn stats(store: &impl RecordStore) -> anyhow::Result<StoreStats> {
    let mut stats = StoreStats::default();
    for info in list(store)? {
        stats.records += 1;
        stats.total_bytes += info.size as u64;
        let class = info.class_name.unwrap_or(info.class_id);
        *stats.classes.entry(class).or_default() += 1;
    }
    Ok(stats)
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_demo(store: &DirRecordStore, args: DemoArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let report = demo::run(store, args.nodes)?;
    if let OutputFormat::Json = format {
        return print_json(&report);
    }
    let ids: Vec<String> = report.ids.iter().map(u32::to_string).collect();
    println!("Built a ring of {} nodes: {}", report.ids.len().to_string().bold(), ids.join(" -> ").yellow());
    println!("{} Persisted {} records to {}", "✓".green().bold(), report.records_written, store.root().display());
    println!("  Unloaded; live objects left: {}", report.live_after_unload.to_string().cyan());
    println!("{} Loaded {} records back", "✓".green().bold(), report.records_loaded);
    println!("  Walk: {}", report.reloaded.join(" -> "));
    if report.cycle_closed {
        println!("  Cycle: {}", "closed".green());
    } else {
        println!("  Cycle: {}", "open".red());
    }
    Ok(())
}

fn cmd_ls(store: &DirRecordStore, format: &OutputFormat) -> anyhow::Result<()> {
    let records = list(store)?;
    if let OutputFormat::Json = format {
        return print_json(&records);
    }
    if records.is_empty() {
        println!("No records.");
    }
    for info in &records {
        println!(
            "{}  {}  {:>8}  {}",
            format!("{:>10}", info.key).yellow(),
            info.class_id.cyan(),
            info.size,
            info.class_name.as_deref().unwrap_or("?"),
        );
    }
    Ok(())
}

fn cmd_show(store: &DirRecordStore, args: ShowArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let dump = show(store, &args.key)?;
    if let OutputFormat::Json = format {
        return print_json(&dump);
    }
    println!("Record {}", dump.info.key.yellow().bold());
    println!("  Class: {} ({})", dump.info.class_id.cyan(), dump.info.class_name.as_deref().unwrap_or("unregistered"));
    println!("  Size: {} bytes", dump.info.size);
    println!("  Payload: {}", dump.payload.dimmed());
    Ok(())
}

fn cmd_rm(store: &DirRecordStore, args: RmArgs) -> anyhow::Result<()> {
    remove(store, &args.key)?;
    println!("Removed record {}", args.key.yellow());
    Ok(())
}

fn cmd_stats(store: &DirRecordStore, format: &OutputFormat) -> anyhow::Result<()> {
    let stats = stats(store)?;
    if let OutputFormat::Json = format {
        return print_json(&stats);
    }
    println!("Records: {}", stats.records.to_string().bold());
    println!("Bytes: {}", stats.total_bytes);
    for (class, count) in &stats.classes {
        println!("  {}: {}", class.cyan(), count);
    }
    Ok(())
}
