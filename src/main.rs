use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use dsmr_p1::logging::init_logger_with_default;
use dsmr_p1::{log_info, P1Error, SessionConfig, TelegramReport, TelegramSession};
use log::warn;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "dsmr-p1")]
#[command(about = "Read telegrams from DSMR P1 and IEC 62056-21 D0 smart meters")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read telegrams pushed on a DSMR P1 port
    P1 {
        device: PathBuf,
        #[command(flatten)]
        options: ReadOptions,
    },
    /// Request telegrams through an IEC 62056-21 optical probe
    D0 {
        device: PathBuf,
        #[command(flatten)]
        options: ReadOptions,
    },
}

#[derive(Args)]
struct ReadOptions {
    /// Telegram buffer size in bytes
    #[arg(short, long)]
    bufsize: Option<usize>,
    /// Inter-character timeout in seconds
    #[arg(short, long, allow_negative_numbers = true)]
    timeout: Option<i32>,
    /// Append unparseable telegrams to this file
    #[arg(short, long)]
    dump: Option<PathBuf>,
    /// Number of telegrams to read, 0 reads forever
    #[arg(short = 'n', long, default_value_t = 1)]
    count: u64,
    /// JSON file with session settings; flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Print records as JSON
    #[arg(long)]
    json: bool,
}

impl ReadOptions {
    fn session_config(&self) -> Result<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => SessionConfig::default(),
        };
        if let Some(bufsize) = self.bufsize {
            config.buffer_size = bufsize;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
        if let Some(dump) = &self.dump {
            config.dump_path = Some(dump.clone());
        }
        Ok(config)
    }
}

fn load_config(path: &Path) -> Result<SessionConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
}

fn print_report(session: &TelegramSession, report: &TelegramReport, json: bool) -> Result<()> {
    let grammar = session.grammar();
    if json {
        let output = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "mode": session.mode(),
            "identification": grammar.identification(),
            "report": report,
            "records": grammar.records(),
        });
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if let Some(ident) = grammar.identification() {
        println!("# {ident}");
    }
    for record in grammar.records() {
        let values: Vec<String> = record
            .values
            .iter()
            .map(|v| match &v.unit {
                Some(unit) => format!("{} {unit}", v.value),
                None => v.value.clone(),
            })
            .collect();
        println!("{} {}", record.code, values.join(" | "));
    }
    Ok(())
}

fn run(mut session: TelegramSession, d0: bool, options: &ReadOptions) -> Result<()> {
    let mut done = 0u64;
    while options.count == 0 || done < options.count {
        let result = if d0 { session.read_d0() } else { session.read() };
        match result {
            Ok(report) => {
                done += 1;
                log_info(&format!(
                    "Telegram of {} bytes, status {:?}, {} parse errors",
                    report.len, report.status, report.parse_errors
                ));
                print_report(&session, &report, options.json)?;
            }
            Err(P1Error::NoData) if !session.is_terminal() => {
                log_info("End of input reached");
                break;
            }
            Err(e) if e.is_recoverable() => warn!("{e}"),
            Err(e) => return Err(e).context("reading telegram"),
        }
    }
    session.close().context("closing input")?;
    Ok(())
}

fn main() -> Result<()> {
    init_logger_with_default("info");

    let cli = Cli::parse();

    match cli.command {
        Commands::P1 { device, options } => {
            let session = TelegramSession::open_p1(&device, options.session_config()?)
                .with_context(|| format!("opening P1 input {}", device.display()))?;
            run(session, false, &options)
        }
        Commands::D0 { device, options } => {
            let session = TelegramSession::open_d0(&device, options.session_config()?)
                .with_context(|| format!("opening D0 input {}", device.display()))?;
            run(session, true, &options)
        }
    }
}
