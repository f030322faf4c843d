mod core;
mod output;
mod repl;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, error, info};

use crate::core::config::Config;
use crate::core::credentials::CredentialStore;
use crate::core::dispatcher::{self, Dispatcher};
use crate::core::runner::ScriptRunner;
use crate::core::supervisor::NodeSupervisor;
use crate::output::Printer;
use crate::repl::{Repl, TerminalState};

/// A CLI for local crypto development with Anvil.
///
/// Start Anvil, capture its first private key, and run your scripts against it.
#[derive(Parser, Debug)]
#[command(name = "crybro", author, version, about)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Configuration file (JSON), defaults to ~/.crybro/config.json
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start Anvil and enter interactive mode
    Start {
        /// Port to run Anvil on
        #[arg(short, long)]
        port: Option<u16>,

        /// Run in interactive mode (default)
        #[arg(short = 'i', long, overrides_with = "no_interactive")]
        interactive: bool,

        /// Just keep Anvil running until interrupted
        #[arg(short = 'I', long = "no-interactive", overrides_with = "interactive")]
        no_interactive: bool,
    },
    /// List all script files in the current directory
    List,
    /// Run a script file
    Run {
        /// Script name, number, or path to run
        script: String,
    },
    /// Show current environment variables
    Env,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    initialize_logging(cli.debug)?;

    let config = Config::load(cli.config.as_deref())?;
    let cwd = std::env::current_dir().context("Cannot determine working directory")?;
    debug!(?config, cwd = %cwd.display(), "configuration loaded");

    match cli.command {
        None => start(config, None, true, cwd),
        Some(Commands::Start {
            port,
            interactive,
            no_interactive,
        }) => start(config, port, interactive || !no_interactive, cwd),
        Some(Commands::List) => {
            dispatcher::list_scripts(&Printer::new(), &cwd);
            Ok(())
        }
        Some(Commands::Run { script }) => run_once(&script, &cwd),
        Some(Commands::Env) => {
            show_process_env();
            Ok(())
        }
    }
}

fn initialize_logging(debug: bool) -> Result<()> {
    // The terminal belongs to the shell; stay quiet unless asked.
    let level = if debug { "debug" } else { "warn" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

fn start(config: Config, port: Option<u16>, interactive: bool, cwd: PathBuf) -> Result<()> {
    let printer = Printer::new();
    let port = port.unwrap_or(config.default_port);

    output::show_banner(&printer);

    let supervisor = Arc::new(NodeSupervisor::new(config));
    install_shutdown_handler(Arc::clone(&supervisor), TerminalState::capture())?;

    printer.info(&format!("Starting Anvil on port {}...", port));
    let mut store = CredentialStore::new();
    let credentials = match supervisor.start(port, &mut store) {
        Ok(credentials) => credentials,
        Err(e) => {
            error!(error = %e, binary = supervisor.binary(), "node startup failed");
            printer.error(&e.to_string());
            std::process::exit(1);
        }
    };

    println!();
    printer.success("Anvil started successfully!");
    output::show_env(&printer, &credentials);
    if let Some(log) = supervisor.log_path() {
        printer.dim(&format!("Anvil output: {}", log.display()));
    }

    if !interactive {
        printer.dim("Press Ctrl+C to stop Anvil");
        supervisor.wait();
        if supervisor.stop() {
            printer.warning("Anvil exited.");
        }
        return Ok(());
    }

    output::show_help(&printer);

    let mut repl = match Repl::new() {
        Ok(repl) => repl,
        Err(e) => {
            supervisor.stop();
            anyhow::bail!(e);
        }
    };

    let mut shell = Dispatcher::new(Arc::clone(&supervisor), store, cwd);
    shell.run(&mut repl);

    if let Err(e) = repl.save_history() {
        debug!(error = %e, "history not saved");
    }
    Ok(())
}

/// Route Ctrl+C and SIGTERM through the same idempotent stop as `exit`.
fn install_shutdown_handler(supervisor: Arc<NodeSupervisor>, terminal: TerminalState) -> Result<()> {
    ctrlc::set_handler(move || {
        info!("shutdown signal received");
        terminal.restore();
        if supervisor.stop() {
            Printer::new().warning("Anvil stopped.");
        }
        std::process::exit(0);
    })
    .context("Error setting Ctrl-C handler")
}

fn run_once(script: &str, cwd: &Path) -> Result<()> {
    let store = CredentialStore::from_process_env();
    let ok = dispatcher::run_script(&Printer::new(), &ScriptRunner::new(), &store, cwd, script);
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

fn show_process_env() {
    let printer = Printer::new();
    match CredentialStore::from_process_env().canonical() {
        Some(credentials) => output::show_env(&printer, &credentials),
        None => printer.warning("Anvil not running. Use 'crybro start' first."),
    }
}
