// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tollgate - entitlement resolution and cross-session sync client.
//!
//! This is the binary entry point: it loads configuration, wires the SQLite
//! cache, HTTP remote source and realtime channel, and runs one subcommand.

mod commands;
mod runtime;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;

use tollgate_config::TollgateConfig;
use tollgate_core::TollgateError;

use crate::runtime::Runtime;

/// Tollgate - entitlement resolution and cross-session sync client.
#[derive(Parser, Debug)]
#[command(name = "tollgate", version, about, long_about = None)]
struct Cli {
    /// Load configuration from this file instead of the default hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Check whether a user may access a content bundle.
    Check {
        content: String,
        #[arg(long)]
        user: String,
        /// Session token; stored for later commands.
        #[arg(long)]
        token: Option<String>,
        /// Print a JSON report.
        #[arg(long)]
        json: bool,
    },
    /// Print the days left on an entitlement.
    Remaining {
        content: String,
        #[arg(long)]
        user: String,
    },
    /// Resync a user's entitlements and list the catalog.
    Sync {
        #[arg(long)]
        user: String,
    },
    /// Redeem an access code.
    Redeem {
        code: String,
        #[arg(long)]
        user: String,
    },
    /// List accounts with a stored session.
    Accounts,
    /// Forget a user's session and cached entitlements.
    Logout {
        #[arg(long)]
        user: String,
    },
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tollgate={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> TollgateConfig {
    let loaded = match path {
        Some(path) => tollgate_config::load_and_validate_path(path),
        None => tollgate_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            tollgate_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

async fn run(command: Commands, runtime: &Runtime) -> Result<(), TollgateError> {
    let manager = &runtime.manager;
    match command {
        Commands::Check {
            content,
            user,
            token,
            json,
        } => commands::check(manager, &content, &user, token, json).await,
        Commands::Remaining { content, user } => commands::remaining(manager, &content, &user).await,
        Commands::Sync { user } => commands::sync(manager, &user).await,
        Commands::Redeem { code, user } => commands::redeem(manager, &code, &user).await,
        Commands::Accounts => commands::accounts(manager).await,
        Commands::Logout { user } => commands::logout(manager, &user).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref());
    init_tracing(&config.logging.log_level);

    let runtime = match Runtime::build(&config).await {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            std::process::exit(1);
        }
    };

    let result = tokio::select! {
        result = run(cli.command, &runtime) => result,
        _ = tokio::signal::ctrl_c() => Err(TollgateError::Cancelled),
    };

    if let Err(e) = runtime.shutdown().await {
        tracing::warn!(error = %e, "shutdown did not complete cleanly");
    }

    if let Err(e) = result {
        let hint = match &e {
            TollgateError::Unauthenticated => " (pass --token to sign in)",
            _ => "",
        };
        eprintln!("{} {e}{hint}", "error:".red().bold());
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_check_with_token() {
        let cli = Cli::try_parse_from([
            "tollgate", "check", "Q1", "--user", "u1", "--token", "tok", "--json",
        ])
        .unwrap();
        match cli.command {
            Commands::Check {
                content,
                user,
                token,
                json,
            } => {
                assert_eq!(content, "Q1");
                assert_eq!(user, "u1");
                assert_eq!(token.as_deref(), Some("tok"));
                assert!(json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn user_is_required_for_identity_commands() {
        assert!(Cli::try_parse_from(["tollgate", "remaining", "Q1"]).is_err());
        assert!(Cli::try_parse_from(["tollgate", "redeem", "ABC123"]).is_err());
        assert!(Cli::try_parse_from(["tollgate", "accounts"]).is_ok());
    }

    #[test]
    fn global_config_flag() {
        let cli = Cli::try_parse_from(["tollgate", "accounts", "--config", "/tmp/t.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/t.toml")));
    }

    #[test]
    fn binary_loads_config_defaults() {
        let config = tollgate_config::load_and_validate_str("")
            .expect("default config should be valid");
        assert_eq!(config.logging.log_level, "info");
    }

    #[tokio::test]
    async fn runtime_builds_offline_against_temp_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let toml = format!(
            "[realtime]\nenabled = false\n\n[storage]\ndatabase_path = \"{}\"\n",
            path.display()
        );
        let config = tollgate_config::load_and_validate_str(&toml).unwrap();
        let runtime = Runtime::build(&config).await.unwrap();

        assert!(runtime.manager.known_identities().await.unwrap().is_empty());
        assert!(matches!(
            runtime.manager.has_access(&tollgate_core::ContentId::new("q1")).await,
            Err(TollgateError::Unauthenticated)
        ));
        runtime.shutdown().await.unwrap();
    }
}
