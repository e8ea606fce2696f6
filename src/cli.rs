//! Command-line interface definitions and argument parsing

use crate::model::MinerOptions;
use crate::server::DEFAULT_PORT;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

/// K-Means clustering server over tabular data, with a command-line client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Log filter used when RUST_LOG is not set (e.g. "info", "kmeans_miner=debug")
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the clustering server
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Directory holding `<table>.csv` files; models are saved here too
        #[arg(short, long, default_value = "./data")]
        data_dir: PathBuf,

        /// Fixed seed for centroid sampling, for reproducible runs
        #[arg(long)]
        seed: Option<u64>,

        /// Stop a run after this many iterations
        #[arg(long)]
        max_iterations: Option<usize>,
    },

    /// Cluster a table on the server and save the model
    Db {
        #[command(flatten)]
        server: ServerAddr,

        /// Table to cluster
        #[arg(short, long)]
        table: String,

        /// Number of clusters
        #[arg(short = 'k', long)]
        clusters: i64,

        /// Model file name on the server
        #[arg(short, long)]
        output: String,
    },

    /// Print the centroids of a model saved on the server
    File {
        #[command(flatten)]
        server: ServerAddr,

        /// Model file name on the server
        #[arg(short, long)]
        input: String,
    },
}

/// Where the client subcommands connect to
#[derive(ClapArgs, Debug, Clone)]
pub struct ServerAddr {
    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

impl ServerAddr {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Command {
    /// Engine options for `serve`; rejects a zero iteration cap
    pub fn miner_options(&self) -> crate::Result<MinerOptions> {
        let Command::Serve {
            seed, max_iterations, ..
        } = self
        else {
            anyhow::bail!("engine options only apply to the serve command");
        };
        if *max_iterations == Some(0) {
            anyhow::bail!("--max-iterations must be at least 1");
        }
        Ok(MinerOptions {
            seed: *seed,
            max_iterations: *max_iterations,
        })
    }

    /// Checks the client can make before contacting the server
    pub fn validate(&self) -> crate::Result<()> {
        match self {
            Command::Serve { .. } => {
                self.miner_options()?;
            }
            Command::Db { table, clusters, output, .. } => {
                if table.trim().is_empty() {
                    anyhow::bail!("Table name must not be empty");
                }
                if *clusters < 1 {
                    anyhow::bail!("Number of clusters must be positive, got {}", clusters);
                }
                if output.trim().is_empty() {
                    anyhow::bail!("Output file name must not be empty");
                }
            }
            Command::File { input, .. } => {
                if input.trim().is_empty() {
                    anyhow::bail!("Input file name must not be empty");
                }
            }
        }
        Ok(())
    }
}
