//! prismae: developer CLI for the Prismae core.
//!
//! Drives the same engine the app embeds, against the configured backend.
//!
//! ## Subcommands
//!
//! - `route`: routes a deep link and prints the resulting router state
//! - `parse`: prints how a deep link parses, or why it is rejected
//! - `session`: restores the persisted session and prints it
//! - `sign-in`: signs in with email and password
//! - `analyze`: sends meal text to the analysis proxy

mod logging;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use prismae_core::{
    parse_deep_link, CoreConfig, CoreFfiError, DeepLinkRouter, LoggingActivityManager,
    PrismaeEngine, RouterSnapshot, StorageConfig,
};

#[derive(Parser)]
#[command(name = "prismae")]
#[command(about = "Prismae core developer tool")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.prismae/config.json)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Route a deep link and print the router state
    Route {
        #[arg(value_name = "URL")]
        url: String,
    },

    /// Parse a deep link without applying it
    Parse {
        #[arg(value_name = "URL")]
        url: String,
    },

    /// Restore the persisted session and print it
    Session,

    /// Sign in with email and password
    SignIn {
        #[arg(long)]
        email: String,

        #[arg(long)]
        password: String,
    },

    /// Estimate nutrition for a meal description
    Analyze {
        #[arg(value_name = "TEXT")]
        text: String,
    },
}

fn load_config(path: Option<PathBuf>) -> Result<CoreConfig, CoreFfiError> {
    let path = match path {
        Some(path) => path,
        None => StorageConfig::from_home()?.config_file(),
    };
    Ok(CoreConfig::load(&path)?.with_env_overrides())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CoreFfiError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| CoreFfiError::from(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

fn router_json(state: &RouterSnapshot) -> serde_json::Value {
    serde_json::json!({
        "pending_meal_window_id": state.pending_meal_window_id,
        "should_show_quick_add": state.should_show_quick_add,
        "pending_end_fast_id": state.pending_end_fast_id,
        "should_show_end_fast_confirmation": state.should_show_end_fast_confirmation,
    })
}

fn engine(config: CoreConfig) -> Result<PrismaeEngine, CoreFfiError> {
    PrismaeEngine::new(config, Arc::new(LoggingActivityManager))
}

fn run(command: Commands, config: CoreConfig) -> Result<(), CoreFfiError> {
    match command {
        Commands::Route { url } => {
            let router =
                DeepLinkRouter::new(config.url_scheme.clone(), Arc::new(LoggingActivityManager));
            let handled = router.route(&url);
            let state = RouterSnapshot::from(&router.snapshot());
            print_json(&serde_json::json!({
                "handled": handled,
                "state": router_json(&state),
            }))
        }
        Commands::Parse { url } => {
            match parse_deep_link(&url, &config.url_scheme) {
                Ok(link) => println!("{:?}", link),
                Err(err) => println!("rejected: {}", err),
            }
            Ok(())
        }
        Commands::Session => {
            let engine = engine(config)?;
            engine.check_session_on_launch();
            print_json(&engine.session_state())
        }
        Commands::SignIn { email, password } => {
            let engine = engine(config)?;
            engine.sign_in(email, password)?;
            print_json(&engine.session_state())
        }
        Commands::Analyze { text } => {
            let engine = engine(config)?;
            engine.check_session_on_launch();
            print_json(&engine.analyze_text(text)?)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("prismae: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let logs_dir = StorageConfig::resolve(config.storage_root.as_deref())
        .ok()
        .map(|storage| storage.logs_dir());
    let _logging_guard = logging::init(logs_dir.as_deref());

    if let Err(e) = run(cli.command, config) {
        tracing::error!(error = %e, "prismae failed");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
