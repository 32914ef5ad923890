//! memsearch - memory search over pluggable providers
//!
//! CLI entry point with global panic handler.

use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use memsearch::backends::MemoryBackend;
use memsearch::cache::{DefaultBackendFactory, ProviderCache};
use memsearch::cli::format_failure;
use memsearch::config::{memsearch_home, Config};
use memsearch::discovery::select_backend;
use memsearch::error::{exit_codes, FailOpen};

// =============================================================================
// CLI Definition
// =============================================================================

/// memsearch - search agent memory through the best available provider
#[derive(Parser)]
#[command(name = "memsearch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Agent whose workspace and discovery order to use
    #[arg(long, global = true, default_value = "main")]
    agent: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search memory
    Search {
        /// Search query
        query: String,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
        /// Maximum number of results
        #[arg(long, short)]
        limit: Option<usize>,
        /// Drop results scoring below this
        #[arg(long)]
        min_score: Option<f64>,
        /// Conversation-scoped context key
        #[arg(long)]
        session_key: Option<String>,
    },

    /// Read a memory file from the workspace
    Read {
        /// Workspace-relative path
        path: String,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
        /// First line to return (1-based)
        #[arg(long)]
        from: Option<usize>,
        /// Number of lines to return
        #[arg(long)]
        lines: Option<usize>,
    },

    /// Show the selected backend's status
    Status {
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// Refresh the selected backend's index
    Sync {
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
        /// Rebuild even if the index looks fresh
        #[arg(long, short)]
        force: bool,
        /// Reason passed to the backend
        #[arg(long)]
        reason: Option<String>,
    },

    /// Show discovered memory backends
    Backends {
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },
}

impl Commands {
    fn output_flags(&self) -> (bool, bool) {
        match self {
            Commands::Search { json, quiet, .. }
            | Commands::Read { json, quiet, .. }
            | Commands::Status { json, quiet }
            | Commands::Sync { json, quiet, .. }
            | Commands::Backends { json, quiet } => (*json, *quiet),
        }
    }
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    setup_panic_handler();
    init_tracing();

    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("memsearch error: {}", e);
            ExitCode::from(exit_codes::FAILURE as u8)
        }
    }
}

/// Log to stderr, filtered by `MEMSEARCH_LOG` (default `warn`).
fn init_tracing() {
    let filter = EnvFilter::try_from_env("MEMSEARCH_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Set up the global panic handler.
///
/// On panic, appends to ~/.memsearch/crash.log.
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if let Some(home) = memsearch_home() {
            let _ = std::fs::create_dir_all(&home);
            if let Ok(mut file) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(home.join("crash.log"))
            {
                let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
                let _ = writeln!(file, "[{}] {}", timestamp, info);
            }
        }
        default_hook(info);
    }));
}

/// Run the CLI and return the exit code.
async fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir()?;
    let config = Config::load_from_cwd(&cwd);

    if let Commands::Backends { json, quiet } = cli.command {
        return Ok(run_backends(json, quiet, &cli.agent, config, &cwd));
    }

    let cache = ProviderCache::new(Arc::new(DefaultBackendFactory));
    let selection = select_backend(&cache, &config, &cli.agent, &cwd).await;

    let code = match selection.handle.as_ref() {
        Some(handle) => {
            let backend: Arc<dyn MemoryBackend> = Arc::clone(handle) as Arc<dyn MemoryBackend>;
            run_with_backend(cli.command, backend).await
        }
        None => {
            let (json, quiet) = cli.command.output_flags();
            let error = selection
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "memory search unavailable".to_string());
            print_formatted(&format_failure(&error, json, quiet));
            success_to_exit_code(false)
        }
    };

    selection
        .release(&cache)
        .await
        .fail_open_default("closing memory backends");

    Ok(code)
}

async fn run_with_backend(command: Commands, backend: Arc<dyn MemoryBackend>) -> ExitCode {
    match command {
        Commands::Search {
            query,
            json,
            quiet,
            limit,
            min_score,
            session_key,
        } => {
            use memsearch::cli::search::{SearchCommand, SearchOptions};

            let cmd = SearchCommand::new(backend);
            let options = SearchOptions {
                json,
                quiet,
                limit,
                min_score,
                session_key,
            };
            let output = cmd.run(&query, &options).await;
            print_formatted(&cmd.format_output(&output, &options));
            success_to_exit_code(output.success)
        }
        Commands::Read {
            path,
            json,
            quiet,
            from,
            lines,
        } => {
            use memsearch::cli::read::{ReadCommand, ReadOptions};

            let cmd = ReadCommand::new(backend);
            let options = ReadOptions {
                json,
                quiet,
                from,
                lines,
            };
            let output = cmd.run(&path, &options).await;
            print_formatted(&cmd.format_output(&output, &options));
            success_to_exit_code(output.success)
        }
        Commands::Status { json, quiet } => {
            use memsearch::cli::status::{StatusCommand, StatusOptions};

            let cmd = StatusCommand::new(backend);
            let options = StatusOptions { json, quiet };
            let output = cmd.run(&options).await;
            print_formatted(&cmd.format_output(&output, &options));
            success_to_exit_code(output.success)
        }
        Commands::Sync {
            json,
            quiet,
            force,
            reason,
        } => {
            use memsearch::cli::sync::{SyncCommand, SyncOptions};

            let cmd = SyncCommand::new(backend);
            let options = SyncOptions {
                json,
                quiet,
                force,
                reason,
            };
            let output = cmd.run(&options).await;
            print_formatted(&cmd.format_output(&output, &options));
            success_to_exit_code(output.success)
        }
        // Handled before selection.
        Commands::Backends { .. } => success_to_exit_code(true),
    }
}

fn run_backends(json: bool, quiet: bool, agent: &str, config: Config, cwd: &Path) -> ExitCode {
    use memsearch::cli::backends_cmd::{BackendsCommand, BackendsOptions};

    let cmd = BackendsCommand::new(cwd.to_string_lossy(), agent, config);
    let options = BackendsOptions { json, quiet };

    let output = cmd.run(&options);
    print_formatted(&cmd.format_output(&output, &options));

    success_to_exit_code(output.success)
}

fn print_formatted(formatted: &str) {
    if !formatted.is_empty() {
        print!("{}", formatted);
        if !formatted.ends_with('\n') {
            println!();
        }
    }
}

fn success_to_exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::from(exit_codes::SUCCESS as u8)
    } else {
        ExitCode::from(exit_codes::FAILURE as u8)
    }
}
