// Copyright 2026 Veriscope Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use veriscope::cli;

#[derive(Parser)]
#[command(
    name = "veriscope",
    about = "Veriscope — automated evidence capture for profile verification",
    version,
    after_help = "Run 'veriscope <command> --help' for details on each command."
)]
struct Cli {
    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the capture service (REST API)
    Serve {
        /// HTTP port to listen on
        #[arg(long, default_value = "7710")]
        port: u16,
        /// Maximum concurrent capture sessions
        #[arg(long, default_value = "4")]
        max_concurrent: usize,
        /// Directory for screenshot artifacts (default ~/.veriscope/captures)
        #[arg(long)]
        capture_dir: Option<PathBuf>,
    },
    /// Run a single capture and print the result as JSON
    Capture {
        /// Profile URL to capture
        url: String,
        /// Capture mode (PROFILE_EXTRACTION or TOKEN_IN_BIO)
        #[arg(long, default_value = "PROFILE_EXTRACTION")]
        mode: String,
        /// Ownership token (required for TOKEN_IN_BIO)
        #[arg(long)]
        token: Option<String>,
        /// Screenshot budget, clamped to [1,3]
        #[arg(long)]
        max_screenshots: Option<i64>,
        /// Viewport as WIDTHxHEIGHT (default 1280x800)
        #[arg(long)]
        viewport: Option<String>,
        /// Directory for screenshot artifacts
        #[arg(long)]
        capture_dir: Option<PathBuf>,
    },
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    cli::init_tracing(args.verbose);

    let result = match args.command {
        Commands::Serve {
            port,
            max_concurrent,
            capture_dir,
        } => cli::serve::run(port, max_concurrent, capture_dir).await,
        Commands::Capture {
            url,
            mode,
            token,
            max_screenshots,
            viewport,
            capture_dir,
        } => {
            cli::capture_cmd::run(&url, &mode, token, max_screenshots, viewport, capture_dir)
                .await
        }
        Commands::Doctor => cli::doctor::run().await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "veriscope", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        eprintln!("  Error: {e:#}");
        std::process::exit(1);
    }
    result
}
