use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod commands;
mod config;
mod context;
mod output;

use cli::{Cli, Commands};
use context::Context;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let overrides = match &cli.command {
        Commands::Run(args) => args.overrides(),
        _ => config::Overrides::default(),
    };
    let ctx = Context::new(&cli, &overrides)?;

    match cli.command {
        Commands::Plan => commands::plan::execute(&ctx),
        Commands::Status(args) => commands::status::execute(&ctx, args).await,
        Commands::Run(args) => commands::run::execute(&ctx, args).await,
        Commands::Inventory => commands::inventory::execute(&ctx),
    }
}

fn init_tracing(cli: &Cli) {
    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("transit_sweep={0},sweep_workflow={0}", default_level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
