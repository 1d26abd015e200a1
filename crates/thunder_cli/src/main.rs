//! Thunder - Main entry point.
//!
//! Runs the module named after the active stack and prints its exports.
//! Every option falls back to a `THUNDER_*` environment variable, see
//! `thunder --help`.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Configuration error
//! - 3: Module error

use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::builder::FalseyValueParser;
use clap::Parser;
use thunder_config::{ConfigError, LoadOptions};
use thunder_core::{ConfigStore, LocalConfigStore, LocalEngine};
use thunder_modules::{
    run_active_stack, ModuleCatalog, ModuleError, ModuleManager, ModuleRegistry, ThunderContext,
};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "thunder")]
#[command(version, about = "Thunder - runs the module named after the active stack")]
struct Cli {
    /// Provider of the module to run (aws, azure, cloudflare, shared)
    #[arg(env = "THUNDER_PROVIDER", default_value = "aws")]
    provider: String,

    /// Active stack; selects the module
    #[arg(long, env = "THUNDER_STACK")]
    stack: String,

    /// Project name
    #[arg(long, env = "THUNDER_PROJECT", default_value = "thunder")]
    project: String,

    /// Where the configuration search starts [default: current directory]
    #[arg(long, env = "THUNDER_ENTRYPOINT")]
    entrypoint: Option<PathBuf>,

    /// Stack settings file [default: Pulumi.<stack>.yaml next to the entrypoint]
    #[arg(long, env = "THUNDER_STACK_FILE")]
    stack_file: Option<PathBuf>,

    /// Directory stack outputs are read from and written to
    #[arg(long, env = "THUNDER_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Directory holding `modules/`, checked against the compiled modules
    #[arg(long, env = "THUNDER_PACKAGE_ROOT")]
    package_root: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, env = "THUNDER_DEBUG", value_parser = FalseyValueParser::new())]
    debug: bool,
}

pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const CONFIG_ERROR: u8 = 2;
    pub const MODULE_ERROR: u8 = 3;
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match run(cli) {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(categorize_error(&e))
        }
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("warn,thunder_core=debug,thunder_config=debug,thunder_modules=debug,thunder_cli=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // Already initialized when embedded; keep the existing subscriber.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .try_init();

    debug!("thunder logging enabled");
}

fn run(cli: Cli) -> Result<()> {
    let entrypoint = match cli.entrypoint {
        Some(entrypoint) => entrypoint,
        None => env::current_dir()?,
    };

    let mut engine = LocalEngine::new(cli.project, cli.stack.as_str());
    if let Some(dir) = cli.state_dir {
        engine = engine.with_state_dir(dir);
    }

    let store = load_store(&entrypoint, &cli.stack, cli.stack_file)?;
    let manager = load_modules(cli.package_root.as_deref())?;
    let options = LoadOptions::new().with_entrypoint(entrypoint.clone());
    let ctx = ThunderContext::load(Arc::new(engine.clone()), store, &options, manager)?;

    let exports = run_active_stack(&ctx, &cli.provider)?;
    engine.complete_with_inputs()?;

    match exports.resolved() {
        Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        None => info!(
            "{} exported values are still pending",
            exports.deferred_leaves().iter().filter(|d| !d.is_resolved()).count()
        ),
    }

    if let Some(path) = engine.persist()? {
        info!("outputs written to {}", path.display());
    }
    Ok(())
}

fn load_store(
    entrypoint: &Path,
    stack: &str,
    stack_file: Option<PathBuf>,
) -> Result<Arc<dyn ConfigStore>> {
    let path = match stack_file {
        Some(path) => Some(path),
        None => {
            let default = entrypoint.join(format!("Pulumi.{}.yaml", stack));
            default.is_file().then_some(default)
        }
    };

    let store = match path {
        Some(path) => LocalConfigStore::from_stack_file(&path)
            .with_context(|| format!("failed to load stack settings from {}", path.display()))?,
        None => {
            debug!("no stack settings file, using empty settings");
            LocalConfigStore::new()
        }
    };
    Ok(Arc::new(store))
}

fn load_modules(package_root: Option<&Path>) -> Result<ModuleManager> {
    let catalog = Arc::new(ModuleCatalog::builtin()?);
    let registry = match package_root {
        Some(root) => ModuleRegistry::discover(root, catalog)?,
        None => ModuleRegistry::from_catalog(catalog)?,
    };
    debug!("{} modules available", registry.len());
    Ok(ModuleManager::new(registry))
}

fn categorize_error(e: &anyhow::Error) -> u8 {
    if e.downcast_ref::<ConfigError>().is_some() {
        return ExitCodes::CONFIG_ERROR;
    }
    match e.downcast_ref::<ModuleError>() {
        Some(ModuleError::Config(_)) => ExitCodes::CONFIG_ERROR,
        Some(_) => ExitCodes::MODULE_ERROR,
        None => ExitCodes::GENERAL_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_stack_file_next_to_entrypoint() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("Pulumi.s3.yaml"),
            "config:\n  aws:region: us-west-2\n",
        )
        .unwrap();

        let store = load_store(dir.path(), "s3", None).unwrap();
        assert_eq!(store.get("aws:region").as_deref(), Some("us-west-2"));
    }

    #[test]
    fn test_missing_stack_file_gives_empty_settings() {
        let dir = tempdir().unwrap();
        let store = load_store(dir.path(), "s3", None).unwrap();
        assert!(store.entries().is_empty());
    }

    #[test]
    fn test_explicit_stack_file_wins() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("Pulumi.s3.yaml"), "config:\n  aws:region: us-west-2\n").unwrap();
        let other = dir.path().join("other.yaml");
        fs::write(&other, "config:\n  aws:region: eu-west-1\n").unwrap();

        let store = load_store(dir.path(), "s3", Some(other)).unwrap();
        assert_eq!(store.get("aws:region").as_deref(), Some("eu-west-1"));
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["thunder", "--stack", "s3"]).unwrap();
        assert_eq!(cli.provider, "aws");
        assert_eq!(cli.stack, "s3");
        assert_eq!(cli.project, "thunder");
        assert!(cli.entrypoint.is_none());
        assert!(cli.stack_file.is_none());
        assert!(!cli.debug);
    }

    #[test]
    fn test_cli_positional_provider_and_options() {
        let cli = Cli::try_parse_from([
            "thunder",
            "shared",
            "--stack",
            "seed",
            "--project",
            "infra",
            "--state-dir",
            "/tmp/state",
            "--debug",
        ])
        .unwrap();
        assert_eq!(cli.provider, "shared");
        assert_eq!(cli.project, "infra");
        assert_eq!(cli.state_dir, Some(PathBuf::from("/tmp/state")));
        assert!(cli.debug);
    }

    #[test]
    fn test_cli_requires_stack() {
        let err = Cli::try_parse_from(["thunder", "aws"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_categorize_error() {
        let config = anyhow::Error::from(ModuleError::Config(ConfigError::MissingKey {
            key: "team".to_string(),
        }));
        assert_eq!(categorize_error(&config), ExitCodes::CONFIG_ERROR);

        let missing = anyhow::Error::from(ModuleError::ProviderNotFound("gcp".to_string()));
        assert_eq!(categorize_error(&missing), ExitCodes::MODULE_ERROR);

        assert_eq!(
            categorize_error(&anyhow::anyhow!("state directory is not writable")),
            ExitCodes::GENERAL_ERROR
        );
    }
}
