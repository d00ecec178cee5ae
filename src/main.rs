use anyhow::{Context, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use formvault::clock::SystemClock;
use formvault::storage::FilesystemStore;
use formvault::{logging, CancelFlag, Config, Database, SubmissionQuery, SubmissionRequest, SubmissionService};

enum Command {
    /// Reconcile a request read from a file, or stdin for `-`.
    Submit { request: PathBuf },
    Show { query: SubmissionQuery },
    Fetch { upload_id: i64, output: PathBuf },
}

struct Cli {
    config_path: Option<PathBuf>,
    command: Command,
}

fn parse_args() -> Cli {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;
    let mut positional = Vec::new();
    let mut row_id = None;
    let mut form_key = None;
    let mut file_id = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("formvault {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                config_path = Some(PathBuf::from(required_value(&args, i)));
                i += 1;
            }
            "--row" => {
                row_id = Some(parse_number(&args, i, "--row"));
                i += 1;
            }
            "--form" => {
                form_key = Some(required_value(&args, i).to_string());
                i += 1;
            }
            "--file" => {
                file_id = Some(parse_number(&args, i, "--file"));
                i += 1;
            }
            arg if arg.starts_with("--") => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
            arg => positional.push(arg.to_string()),
        }
        i += 1;
    }

    let command = match positional.first().map(String::as_str) {
        Some("submit") if positional.len() == 2 => Command::Submit {
            request: PathBuf::from(&positional[1]),
        },
        Some("show") if positional.len() == 1 => {
            let (Some(row_id), Some(form_key)) = (row_id, form_key) else {
                eprintln!("Error: show requires --row and --form");
                std::process::exit(1);
            };
            let mut query = SubmissionQuery::new(row_id, form_key);
            query.file_id = file_id;
            Command::Show { query }
        }
        Some("fetch") if positional.len() == 3 => match positional[1].parse() {
            Ok(upload_id) => Command::Fetch {
                upload_id,
                output: PathBuf::from(&positional[2]),
            },
            Err(_) => {
                eprintln!("Error: upload id must be a number, got '{}'", positional[1]);
                std::process::exit(1);
            }
        },
        _ => {
            print_help();
            std::process::exit(1);
        }
    };

    Cli { config_path, command }
}

fn required_value(args: &[String], i: usize) -> &str {
    match args.get(i + 1) {
        Some(value) => value,
        None => {
            eprintln!("Error: {} requires a value", args[i]);
            std::process::exit(1);
        }
    }
}

fn parse_number(args: &[String], i: usize, flag: &str) -> i64 {
    let value = required_value(args, i);
    value.parse().unwrap_or_else(|_| {
        eprintln!("Error: {} expects a number, got '{}'", flag, value);
        std::process::exit(1);
    })
}

fn print_help() {
    println!(
        r#"formvault - Form submission store with concurrent evidence uploads

USAGE:
    formvault [OPTIONS] submit <REQUEST.json | ->
    formvault [OPTIONS] show --row N --form KEY [--file N]
    formvault [OPTIONS] fetch <UPLOAD_ID> <OUTPUT>

OPTIONS:
    --config, -c PATH   Path to config file
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    FORMVAULT_CONFIG    Path to config file (overrides default location)
    FORMVAULT_LOG       Log level (trace, debug, info, warn, error)

Submissions and the fetched projection are printed as JSON on stdout.
"#
    );
}

fn read_request(path: &Path) -> Result<SubmissionRequest> {
    let raw = if path.as_os_str() == "-" {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("Failed to read request from stdin")?;
        raw
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read request {}", path.display()))?
    };
    serde_json::from_str(&raw).context("Request is not a valid submission")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = parse_args();

    let config = match &cli.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    logging::init(Some(Config::config_dir().join("logs")))?;
    tracing::info!("formvault {} starting", env!("CARGO_PKG_VERSION"));

    let db = Database::open(&config.db_path)
        .with_context(|| format!("Failed to open database {}", config.db_path.display()))?;
    db.initialize()?;

    let store = Arc::new(FilesystemStore::new(config.storage.root.clone()));
    let service = SubmissionService::from_config(&config, Arc::new(db), store, Arc::new(SystemClock));

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling submission");
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Command::Submit { request } => {
            let request = read_request(&request)?;
            let view = service.submit(request, &cancel).await?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Command::Show { query } => {
            let view = service.find(query).await?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Command::Fetch { upload_id, output } => {
            let Some(stored) = service.open_upload(upload_id).await? else {
                anyhow::bail!("No upload with id {}", upload_id);
            };
            tokio::fs::write(&output, &stored.bytes)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!(
                "{} ({}, {} bytes) -> {}",
                stored.record.upload.file_name,
                stored.content_type,
                stored.bytes.len(),
                output.display()
            );
        }
    }

    Ok(())
}
