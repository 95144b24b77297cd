use anyhow::Result;
use clap::Parser;
use integration_graph::ReqwestGraphTransport;
use shiftgen_app::{build_service, graph_connection, run, Cli};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let config = shiftgen_config::load_from_env()?;
    let transport = Arc::new(ReqwestGraphTransport::new(&graph_connection(&config)?)?);
    let service = build_service(&config, transport)?;
    tracing::debug!(site = %config.graph.site_id, command = ?cli.command, "running command");

    let output = run(cli.command, &service).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
