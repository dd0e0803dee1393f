use clap::{Parser, Subcommand};
use migrate_cli::{resolve, Context, ResolveArgs};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "migrate")]
#[command(version, about = "Manage the migration history of a database")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve a failed migration by marking it as applied or rolled back
    Resolve(ResolveArgs),
}

async fn run(cli: Cli, ctx: &Context) -> anyhow::Result<()> {
    match cli.command {
        Command::Resolve(args) => {
            let outcome = resolve(args, ctx).await?;
            ctx.reporter().log(&outcome.to_string());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let ctx = match Context::from_process() {
        Ok(ctx) => ctx,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    match run(cli, &ctx).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            ctx.reporter().error(&err.to_string());
            ExitCode::FAILURE
        }
    }
}
