use anyhow::{Context, Result};
use clap::Parser;
use reactty::{ConfigError, Engine, EngineOptions, parse_file, terminal};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Exit status for a configuration that does not compile.
const EXIT_CONFIG: i32 = 252;
/// Exit status for spawn and I/O failures.
const EXIT_FAILURE: i32 = 253;

#[derive(Parser, Debug)]
#[command(
    name = "reactty",
    about = "Run a shell in a pty and react to its output with rules",
    version
)]
struct Args {
    /// Path to the rule file
    config: PathBuf,

    /// Shell to run in the PTY
    #[arg(short, long, env = "SHELL", default_value = "/bin/sh")]
    shell: String,

    /// Extra argument for the shell (repeatable)
    #[arg(long = "shell-arg", allow_hyphen_values = true)]
    shell_args: Vec<String>,

    /// Log filter, e.g. `debug` or `reactty=trace`. RUST_LOG takes precedence
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Compile the rule file and exit
    #[arg(long)]
    check: bool,

    /// Controller command and its arguments
    #[arg(last = true)]
    controller: Vec<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = init_logging(&args) {
        eprintln!("Error: {e:#}");
        std::process::exit(EXIT_FAILURE);
    }

    let code = match run(args).await {
        Ok(code) => code,
        Err(e) => {
            if let Some(config) = e.downcast_ref::<ConfigError>() {
                eprintln!("{config}");
                EXIT_CONFIG
            } else {
                error!("Run failed: {e:#}");
                eprintln!("Error: {e:#}");
                EXIT_FAILURE
            }
        }
    };

    // The stdin reader thread may still be blocked; exit without joining it.
    std::process::exit(code);
}

async fn run(args: Args) -> Result<i32> {
    let rules = parse_file(&args.config)?;

    if args.check {
        println!("{}: {} rule(s) OK", args.config.display(), rules.len());
        return Ok(0);
    }

    let mut options = EngineOptions::new(args.shell)
        .with_shell_args(args.shell_args)
        .with_passthrough_input(true);
    if let Some((command, rest)) = args.controller.split_first() {
        options = options.with_controller(command.clone(), rest.to_vec());
    }
    if let Some((rows, cols)) = terminal::size() {
        options = options.with_size(rows, cols);
    }

    let engine = Engine::spawn(rules, options).context("Failed to start session")?;
    let code = engine.run().await?;
    info!(exit_code = code, "Session finished");
    Ok(code)
}

fn init_logging(args: &Args) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    match &args.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}
