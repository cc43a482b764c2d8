#![forbid(unsafe_code)]
//! Operator CLI for the incident ledger

use clap::{Parser, Subcommand};
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::Color as TableColor;
use comfy_table::{Attribute, Cell, ContentArrangement, Table};
use incident_ledger::blockchain::TIMESTAMP_FORMAT;
use incident_ledger::config::load_config;
use incident_ledger::miner::expected_attempts;
use incident_ledger::{Block, Ledger, LedgerError, Payload};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./ledger.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Opens the ledger, creating the key and genesis block if needed
    Init,
    /// Records one incident
    Record {
        /// Incident type, e.g. fire_accident
        #[arg(long, required_unless_present = "json")]
        kind: Option<String>,
        /// Free-text description
        #[arg(long)]
        message: Option<String>,
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
        /// When the incident happened (defaults to now)
        #[arg(long)]
        time: Option<String>,
        /// Raw JSON object used as the payload instead of the flags above
        #[arg(long, conflicts_with_all = ["kind", "message", "lat", "lon", "time"])]
        json: Option<String>,
    },
    /// Lists the blocks of the chain
    Show {
        /// Only the most recent N blocks
        #[arg(long)]
        limit: Option<usize>,
        /// Print the chain as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Re-verifies every hash, link and signature
    Verify,
    /// Prints the public key used to check signatures
    ExportKey,
}

fn main() -> ExitCode {
    // stdout carries command output only (`show --json`, `export-key`).
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = load_config(cli.config.as_deref())?;
    let ledger = Ledger::open(&config)?;

    match cli.command {
        Commands::Init => init(&ledger),
        Commands::Record {
            kind,
            message,
            lat,
            lon,
            time,
            json,
        } => {
            let payload = match json {
                Some(raw) => parse_payload(&raw)?,
                None => build_payload(kind.unwrap_or_default(), message, lat.zip(lon), time),
            };
            record(&ledger, payload)
        }
        Commands::Show { limit, json } => show(&ledger, limit, json),
        Commands::Verify => Ok(verify(&ledger)),
        Commands::ExportKey => export_key(&ledger),
    }
}

fn parse_payload(raw: &str) -> Result<Payload, Box<dyn std::error::Error>> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        other => Err(format!("payload must be a JSON object, got {}", other).into()),
    }
}

fn build_payload(
    kind: String,
    message: Option<String>,
    location: Option<(f64, f64)>,
    time: Option<String>,
) -> Payload {
    let time = time.unwrap_or_else(|| chrono::Local::now().format(TIMESTAMP_FORMAT).to_string());
    let mut payload = Payload::new();
    payload.insert("type".to_string(), json!(kind));
    payload.insert("time".to_string(), json!(time));
    if let Some((lat, lon)) = location {
        payload.insert("location".to_string(), json!([lat, lon]));
    }
    if let Some(message) = message {
        payload.insert("message".to_string(), json!(message));
    }
    payload
}

fn init(ledger: &Ledger) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let genesis = ledger.chain().into_iter().next().ok_or("ledger is empty")?;
    println!("{}", "Ledger ready".bright_green().bold());
    println!("  Blocks:      {}", ledger.len());
    println!("  Difficulty:  {}", ledger.difficulty());
    println!("  Genesis:     {}", genesis.hash.bright_yellow());
    if let Some(path) = ledger.public_key_path() {
        println!("  Public key:  {}", path.display());
    }
    Ok(ExitCode::SUCCESS)
}

fn record(ledger: &Ledger, payload: Payload) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]")?);
    spinner.set_message(format!(
        "Mining block #{} (~{} attempts expected)",
        ledger.len(),
        expected_attempts(ledger.difficulty())
    ));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let started = Instant::now();
    let block = ledger.record(payload)?;
    let elapsed = started.elapsed();
    spinner.finish_and_clear();

    println!("{}", "Block recorded".bright_green().bold());
    print_block(&block);
    println!(
        "  Mining time:   {}",
        humantime::format_duration(Duration::from_millis(elapsed.as_millis() as u64))
    );

    if let Some(err) = ledger.last_persist_error() {
        eprintln!(
            "{} block is in memory only, the chain file was not updated: {}",
            "warning:".yellow().bold(),
            err
        );
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn print_block(block: &Block) {
    println!("  Index:         #{}", block.index);
    println!("  Timestamp:     {}", block.timestamp);
    println!("  Hash:          {}", block.hash.bright_yellow());
    println!("  Previous:      {}", block.previous_hash);
    println!("  Nonce:         {}", block.nonce);
    println!("  Payload:       {}", block.data);
}

/// Abbreviates by characters; loaded files may hold arbitrary text here.
fn short(hash: &str) -> String {
    let chars: Vec<char> = hash.chars().collect();
    if chars.len() > 20 {
        let head: String = chars[..10].iter().collect();
        let tail: String = chars[chars.len() - 6..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        hash.to_string()
    }
}

fn show(ledger: &Ledger, limit: Option<usize>, as_json: bool) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let chain = ledger.chain();
    let skip = limit.map_or(0, |n| chain.len().saturating_sub(n));
    let blocks = &chain[skip..];

    if as_json {
        println!("{}", serde_json::to_string_pretty(blocks)?);
        return Ok(ExitCode::SUCCESS);
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            ["Index", "Timestamp", "Type", "Hash", "Previous", "Nonce"]
                .into_iter()
                .map(|h| Cell::new(h).fg(TableColor::Cyan).add_attribute(Attribute::Bold)),
        );

    for block in blocks {
        let kind = block
            .data
            .get("type")
            .and_then(Value::as_str)
            .or_else(|| block.data.get("data").and_then(Value::as_str))
            .unwrap_or("-");
        table.add_row(vec![
            Cell::new(format!("#{}", block.index)).fg(TableColor::White),
            Cell::new(&block.timestamp).fg(TableColor::Grey),
            Cell::new(kind).fg(TableColor::Yellow),
            Cell::new(short(&block.hash)).fg(TableColor::Green),
            Cell::new(short(&block.previous_hash)).fg(TableColor::White),
            Cell::new(block.nonce).fg(TableColor::White),
        ]);
    }

    println!("{}", table);
    println!("{} of {} blocks", blocks.len(), chain.len());
    Ok(ExitCode::SUCCESS)
}

fn verify(ledger: &Ledger) -> ExitCode {
    match ledger.verify_chain() {
        Ok(()) => {
            println!(
                "{} {} blocks, difficulty {}",
                "Chain valid:".bright_green().bold(),
                ledger.len(),
                ledger.difficulty()
            );
            ExitCode::SUCCESS
        }
        Err(LedgerError::InvalidBlock { index, fault }) => {
            println!(
                "{} block #{}: {}",
                "Chain invalid at".red().bold(),
                index,
                fault
            );
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn export_key(ledger: &Ledger) -> Result<ExitCode, Box<dyn std::error::Error>> {
    if let Some(path) = ledger.public_key_path() {
        eprintln!("{} {}", "Public key file:".bright_cyan(), path.display());
    }
    print!("{}", ledger.public_key_pem()?);
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_hash() {
        let hash = "0000a3f1c9e2b7d4a5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c";
        assert_eq!(short(hash), "0000a3f1c9...3a4b5c");
        assert_eq!(short("0"), "0");
    }

    #[test]
    fn test_short_hash_with_multibyte_text() {
        let tampered = "ééééééééééééééééééééééééé🔥";
        assert_eq!(short(tampered), "éééééééééé...ééééé🔥");
    }
}
