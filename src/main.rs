//! kmeans-miner: clustering server and command-line client
//!
//! This is the main entrypoint that sets up logging and dispatches to the
//! server or to one of the client requests.

use anyhow::{Context, Result};
use clap::Parser;
use kmeans_miner::{Args, Command, CsvTableSource, KMeansClient, Server, SessionConfig};
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| args.log_level.as_str().into()))
        .init();

    args.command.validate()?;

    match &args.command {
        Command::Serve { host, port, data_dir, .. } => {
            let options = args.command.miner_options()?;
            run_server(host, *port, data_dir.clone(), SessionConfig {
                model_dir: data_dir.clone(),
                options,
            })
            .await
        }
        Command::Db {
            server,
            table,
            clusters,
            output,
        } => run_db(&server.address(), table, *clusters, output).await,
        Command::File { server, input } => run_file(&server.address(), input).await,
    }
}

/// Serve clients until Ctrl-C
async fn run_server(host: &str, port: u16, data_dir: std::path::PathBuf, config: SessionConfig) -> Result<()> {
    let source = Arc::new(CsvTableSource::new(data_dir));
    let server = Server::bind((host, port), source, config)
        .await
        .with_context(|| format!("failed to bind {}:{}", host, port))?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for Ctrl-C");
            }
        })
        .await?;
    Ok(())
}

/// Ask the server to cluster a table and print its report
async fn run_db(addr: &str, table: &str, clusters: i64, output: &str) -> Result<()> {
    println!("=== Clustering table '{}' into {} clusters ===\n", table, clusters);
    let start_time = Instant::now();

    let mut client = KMeansClient::connect(addr).await?;
    let messages = client.mine_from_db(table, clusters, output).await?;
    for message in &messages {
        println!("{}", message);
    }

    println!("\n✓ Request complete");
    println!("  Processing time: {:.2}s", start_time.elapsed().as_secs_f64());
    Ok(())
}

/// Print the centroids of a saved model
async fn run_file(addr: &str, input: &str) -> Result<()> {
    println!("=== Model '{}' ===\n", input);

    let mut client = KMeansClient::connect(addr).await?;
    for message in client.load_from_file(input).await? {
        println!("{}", message);
    }
    Ok(())
}
