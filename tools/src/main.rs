//! pattern-runner: headless pattern detection and AML analysis.
//!
//! Usage:
//!   pattern-runner --data ledger.json --command analyze
//!   pattern-runner --data export.csv --command patterns
//!   pattern-runner --db ledger.db --table transactions --command threads
//!   pattern-runner --synthetic 1000 --seed 42 --export-db demo.db
//!   pattern-runner --data ledger.json --ipc-mode

use anyhow::{bail, Context, Result};
use patternfinder_core::{
    config::AnalyzerConfig,
    loader::DatasetSource,
    orchestrator::AnalysisOrchestrator,
    service::AnalysisService,
    store::{LedgerStore, DEFAULT_TABLE},
    synth,
};
use serde_json::{json, Value};
use std::env;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    GetSummary,
    GetPatterns,
    Analyze,
    GetThreads,
    Health,
    LoadDataset {
        path: PathBuf,
        #[serde(default)]
        table: Option<String>,
    },
    Quit,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let command = flag_value(&args, "--command").unwrap_or("analyze");

    let config = match flag_value(&args, "--config") {
        Some(path) => AnalyzerConfig::load(path)?,
        None => AnalyzerConfig::from_env(),
    };
    let service = AnalysisService::new(AnalysisOrchestrator::from_config(config));

    if let Some(source) = source_from_args(&args)? {
        let info = service.load(&source)?;
        log::info!("Loaded {} rows from {} (v{})", info.rows, info.label, info.version);
    }

    if ipc_mode {
        return run_ipc_loop(&service);
    }

    if service.current().is_err() {
        bail!("no dataset given: use --data, --db or --synthetic");
    }
    let output = run_command(&service, command)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn source_from_args(args: &[String]) -> Result<Option<DatasetSource>> {
    if let Some(path) = flag_value(args, "--data") {
        return Ok(Some(DatasetSource::from_path(path)?));
    }
    if let Some(path) = flag_value(args, "--db") {
        let table = flag_value(args, "--table").unwrap_or(DEFAULT_TABLE);
        return Ok(Some(DatasetSource::Sqlite {
            path: PathBuf::from(path),
            table: table.to_string(),
        }));
    }
    if let Some(count) = flag_value(args, "--synthetic") {
        let count: usize = count.parse().context("--synthetic expects a row count")?;
        let seed = parse_arg(args, "--seed", 42u64);
        let txns = synth::generate(seed, count);
        if let Some(path) = flag_value(args, "--export-db") {
            export_db(Path::new(path), &txns)?;
        }
        return Ok(Some(DatasetSource::Rows {
            label: format!("synthetic(seed={seed}, rows={count})"),
            rows: synth::to_raw_rows(&txns),
        }));
    }
    Ok(None)
}

fn export_db(path: &Path, txns: &[patternfinder_core::transaction::Transaction]) -> Result<()> {
    let store = LedgerStore::open(path)?;
    store.migrate()?;
    let n = store.insert_transactions(txns)?;
    log::info!("Exported {n} synthetic transactions to {}", path.display());
    Ok(())
}

fn run_command(service: &AnalysisService, command: &str) -> Result<Value> {
    let value = match command {
        "summary" => serde_json::to_value(service.summary()?)?,
        "patterns" => serde_json::to_value(service.patterns()?)?,
        "analyze" => serde_json::to_value(service.analyze()?)?,
        "threads" => {
            service.analyze()?;
            serde_json::to_value(service.threads()?)?
        }
        "health" => serde_json::to_value(service.health())?,
        other => bail!("unknown command '{other}'"),
    };
    Ok(value)
}

fn run_ipc_loop(service: &AnalysisService) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                writeln!(stdout, "{}", json!({ "success": false, "error": e.to_string() }))?;
                stdout.flush()?;
                continue;
            }
        };
        if matches!(cmd, IpcCommand::Quit) {
            break;
        }

        let reply = match handle_ipc(service, cmd) {
            Ok(data) => json!({ "success": true, "data": data }),
            Err(e) => {
                log::warn!("IPC command failed: {e:#}");
                json!({ "success": false, "error": format!("{e:#}") })
            }
        };
        writeln!(stdout, "{reply}")?;
        stdout.flush()?;
    }
    Ok(())
}

fn handle_ipc(service: &AnalysisService, cmd: IpcCommand) -> Result<Value> {
    let value = match cmd {
        IpcCommand::GetSummary => serde_json::to_value(service.summary()?)?,
        IpcCommand::GetPatterns => serde_json::to_value(service.patterns()?)?,
        IpcCommand::Analyze => serde_json::to_value(service.analyze()?)?,
        IpcCommand::GetThreads => serde_json::to_value(service.threads()?)?,
        IpcCommand::Health => serde_json::to_value(service.health())?,
        IpcCommand::LoadDataset { path, table } => {
            let source = match table {
                Some(table) => DatasetSource::Sqlite { path, table },
                None => DatasetSource::from_path(&path)?,
            };
            serde_json::to_value(service.load(&source)?)?
        }
        IpcCommand::Quit => Value::Null,
    };
    Ok(value)
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
