//! kmeans-miner: K-Means clustering over mixed continuous/discrete tables
//!
//! This library provides the clustering engine, model persistence, and a
//! small request/reply server that clusters tables on behalf of remote clients.

pub mod attribute;
pub mod cli;
pub mod client;
pub mod cluster;
pub mod data;
pub mod error;
pub mod model;
pub mod protocol;
pub mod server;
pub mod session;
pub mod source;
pub mod tuple;

// Re-export public items for easier access
pub use attribute::{Attribute, ContinuousAttribute, DiscreteAttribute};
pub use cli::{Args, Command};
pub use client::KMeansClient;
pub use cluster::{Cluster, ClusterSet};
pub use data::{Dataset, Value};
pub use error::{ClientError, ErrorKind, MiningError, MiningResult, ProtocolError};
pub use model::{KMeansMiner, MinerOptions, MinerState};
pub use server::Server;
pub use session::SessionConfig;
pub use source::{Aggregate, Column, ColumnKind, CsvTableSource, DataSource, MemorySource, Table};
pub use tuple::{Item, Tuple};

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
