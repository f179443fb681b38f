//! Config validation CLI tool
//!
//! Validates a rocc configuration file and reports any errors.

use clap::Parser;
use rocc_config::{ConfigError, StoreKind};
use rocc_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

/// Validate a rocc configuration file
#[derive(Parser, Debug)]
#[command(name = "validate-config")]
#[command(about = "Validates a rocc configuration file", long_about = None)]
struct Args {
    /// Configuration file (defaults to the standard config path)
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(default_config_path);

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match rocc_config::load_config(&config_path) {
        Ok(settings) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", rocc_config::CURRENT_CONFIG_VERSION);
            println!("  Origin host: {}", settings.node.origin_host);
            let store = match settings.node.store {
                StoreKind::Sqlite => format!("sqlite ({})", settings.node.store_path().display()),
                StoreKind::Memory => "memory".to_string(),
            };
            println!("  Store: {}", store);
            println!();
            println!("Ro defaults:");
            let ids: Vec<String> = settings
                .ro
                .application_ids
                .iter()
                .map(|id| id.to_string())
                .collect();
            println!("  Applications: {}", ids.join(", "));
            println!("  CCFH: {:?}", settings.ro.credit_control_failure_handling);
            println!("  DDFH: {:?}", settings.ro.direct_debiting_failure_handling);
            println!("  Validity time: {}s", settings.ro.validity_time.as_secs());
            println!("  Tx timer: {}s", settings.ro.tx_timer.as_secs());
            match settings.ro.supervision_timeout {
                Some(t) => println!("  Supervision: {}s", t.as_secs()),
                None => println!("  Supervision: 2x validity time"),
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        rocc_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
