//! The `resolve` command
//!
//! Runs the checks of one invocation in a fixed order and hands the request
//! to the [`Resolver`]. Each step may end the invocation:
//!
//! 1. the early-access flag, before touching the filesystem
//! 2. schema discovery
//! 3. the `Prisma schema loaded from` line, emitted even if later steps fail
//! 4. the action flags
//! 5. connecting the datasource's ledger
//! 6. resolution

use clap::Args;
use migrate_core::{Outcome, ResolutionRequest, Resolver};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::connector::{self, ConnectorConfig};
use crate::datasource;
use crate::error::CliError;
use crate::reporter::{schema_loaded, ConsoleReporter, Reporter};
use crate::schema;

/// Arguments of `migrate resolve`
#[derive(Debug, Clone, Default, Args)]
pub struct ResolveArgs {
    /// Opt in to this early-access command
    #[arg(long)]
    pub early_access_feature: bool,

    /// Record a failed migration as applied
    #[arg(long, value_name = "MIGRATION")]
    pub applied: Option<String>,

    /// Record a failed migration as rolled back
    #[arg(long, value_name = "MIGRATION")]
    pub rolledback: Option<String>,

    /// Path to the schema file
    #[arg(long, value_name = "PATH")]
    pub schema: Option<PathBuf>,
}

/// Everything an invocation reads from its surroundings
pub struct Context {
    cwd: PathBuf,
    reporter: Arc<dyn Reporter>,
    config: ConnectorConfig,
    env: HashMap<String, String>,
}

impl Context {
    pub fn new(cwd: impl Into<PathBuf>, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            cwd: cwd.into(),
            reporter,
            config: ConnectorConfig::default(),
            env: HashMap::new(),
        }
    }

    /// Context of the running process: its working directory, the console
    /// and configuration from the environment
    pub fn from_process() -> Result<Self, CliError> {
        let cwd = std::env::current_dir()?;
        let config = ConnectorConfig::from_env()?;
        Ok(Self::new(cwd, Arc::new(ConsoleReporter)).with_config(config))
    }

    pub fn with_config(mut self, config: ConnectorConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets a variable seen by `env("...")` urls ahead of the process environment
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    pub fn reporter(&self) -> &dyn Reporter {
        self.reporter.as_ref()
    }

    fn var(&self, name: &str) -> Option<String> {
        self.env
            .get(name)
            .cloned()
            .or_else(|| std::env::var(name).ok())
    }
}

/// Runs `migrate resolve`
///
/// Returns the outcome on success; the caller decides how to print it.
pub async fn resolve(args: ResolveArgs, ctx: &Context) -> Result<Outcome, CliError> {
    if !args.early_access_feature {
        return Err(CliError::EarlyAccess);
    }

    let schema = schema::discover(&ctx.cwd, args.schema.as_deref())?;
    ctx.reporter.info(&schema_loaded(schema.display_path()));

    let request = ResolutionRequest::from_flags(args.applied, args.rolledback)?;

    let datasource = datasource::parse(schema.contents(), |name| ctx.var(name))?;
    let store = connector::connect(&datasource, schema.dir(), &ctx.config).await?;

    log::debug!("resolving {}", request.action);
    let outcome = Resolver::new(store).resolve(request).await?;
    Ok(outcome)
}
