//! Per-connection request handler
//!
//! A session reads one command, runs the matching workflow, streams the
//! results back and terminates the response with `END`. It then waits for
//! the next command until the peer disconnects.

use crate::data::Dataset;
use crate::error::{MiningError, MiningResult, ProtocolError};
use crate::model::{KMeansMiner, MinerOptions};
use crate::protocol::{Frame, FrameStream, ACK, CMD_DB, CMD_FILE, END};
use crate::source::DataSource;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

/// Settings shared by every session of a server
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Directory model files are written to and read from
    pub model_dir: PathBuf,
    pub options: MinerOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("."),
            options: MinerOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    AwaitCommand,
    DbClustering,
    FileLoad,
    AwaitNext,
}

pub struct Session<S> {
    frames: FrameStream<S>,
    source: Arc<dyn DataSource>,
    config: SessionConfig,
    state: SessionState,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, source: Arc<dyn DataSource>, config: SessionConfig) -> Self {
        Self {
            frames: FrameStream::new(stream),
            source,
            config,
            state: SessionState::AwaitCommand,
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "session state");
        self.state = next;
    }

    /// Serve requests until the peer closes the connection.
    ///
    /// Application failures are reported to the peer and do not end the
    /// session; a `ProtocolError` does.
    pub async fn run(mut self) -> Result<(), ProtocolError> {
        loop {
            self.transition(SessionState::AwaitCommand);
            let Some(frame) = self.frames.next_value().await? else {
                info!("client disconnected");
                return Ok(());
            };
            let command = match frame {
                Frame::Text(command) => command,
                other => {
                    return Err(ProtocolError::UnexpectedFrame {
                        expected: "command",
                        found: other.to_string(),
                    })
                }
            };

            match command.as_str() {
                CMD_DB => self.db_clustering().await?,
                CMD_FILE => self.file_load().await?,
                other => {
                    warn!(command = other, "unsupported command");
                    self.frames.send_text(format!("unsupported command: {}", other)).await?;
                }
            }

            self.frames.send_text(END).await?;
            self.transition(SessionState::AwaitNext);
        }
    }

    async fn db_clustering(&mut self) -> Result<(), ProtocolError> {
        self.transition(SessionState::DbClustering);
        let table = self.frames.expect_text().await?;
        let clusters = self.frames.expect_value().await?;
        let file = self.frames.expect_text().await?;
        self.frames.send_text(ACK).await?;
        info!(%table, %clusters, %file, "clustering request");

        let source = Arc::clone(&self.source);
        let config = self.config.clone();
        let messages = tokio::task::spawn_blocking(move || {
            db_workflow(source.as_ref(), &config, &table, &clusters, &file)
        })
        .await
        .unwrap_or_else(|e| vec![format!("Clustering failed: {}", e)]);

        for message in messages {
            self.frames.send_text(message).await?;
        }
        Ok(())
    }

    async fn file_load(&mut self) -> Result<(), ProtocolError> {
        self.transition(SessionState::FileLoad);
        let file = self.frames.expect_text().await?;
        self.frames.send_text(ACK).await?;
        info!(%file, "model load request");

        let model_dir = self.config.model_dir.clone();
        let message = tokio::task::spawn_blocking(move || file_workflow(&model_dir, &file))
            .await
            .unwrap_or_else(|e| format!("Loading failed: {}", e));

        self.frames.send_text(message).await
    }
}

/// Cluster count as sent by the client: an integer, or text holding one
fn parse_cluster_count(frame: &Frame) -> MiningResult<i64> {
    match frame {
        Frame::Int(k) => Ok(*k),
        Frame::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| MiningError::Validation(format!("'{}' is not a valid number of clusters", s))),
        Frame::Null => Err(MiningError::Validation("missing number of clusters".to_string())),
    }
}

/// Model files live directly inside the model directory
fn model_path(model_dir: &Path, file: &str) -> MiningResult<PathBuf> {
    let name = Path::new(file);
    let plain = name.components().count() == 1 && name.file_name().is_some();
    if file.is_empty() || !plain {
        return Err(MiningError::Validation(format!("invalid model file name '{}'", file)));
    }
    // tables share the directory
    if name.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csv")) {
        return Err(MiningError::Validation(format!("model file '{}' would replace a table", file)));
    }
    Ok(model_dir.join(name))
}

fn cluster_table(
    source: &dyn DataSource,
    options: MinerOptions,
    table: &str,
    clusters: &Frame,
) -> MiningResult<(KMeansMiner, Dataset, usize)> {
    let k = parse_cluster_count(clusters)?;
    let data = Dataset::load(source, table)?;
    let k = usize::try_from(k).map_err(|_| MiningError::OutOfRangeSampleSize {
        k,
        tuples: data.number_of_tuples(),
    })?;

    let mut miner = KMeansMiner::with_options(k, options);
    let iterations = miner.kmeans(&data)?;
    Ok((miner, data, iterations))
}

/// Messages for a DB request: iteration count, cluster report, save outcome,
/// or the failure that stopped the run.
fn db_workflow(
    source: &dyn DataSource,
    config: &SessionConfig,
    table: &str,
    clusters: &Frame,
    file: &str,
) -> Vec<String> {
    let (miner, data, iterations) = match cluster_table(source, config.options, table, clusters) {
        Ok(result) => result,
        Err(e) => {
            warn!(table, kind = ?e.kind(), error = %e, "clustering failed");
            return vec![e.to_string()];
        }
    };

    let mut messages = vec![
        format!("Number of iterations: {}\n", iterations),
        miner.clusters().report(&data),
    ];
    match model_path(&config.model_dir, file).and_then(|path| miner.save(path)) {
        Ok(()) => messages.push(format!("Saved to {}", file)),
        Err(e) => {
            warn!(file, kind = ?e.kind(), error = %e, "saving model failed");
            messages.push(format!("Saving to {} failed: {}", file, e));
        }
    }
    messages
}

/// Centroid summary of a saved model, or the reason it could not be read
fn file_workflow(model_dir: &Path, file: &str) -> String {
    match model_path(model_dir, file).and_then(KMeansMiner::load) {
        Ok(miner) => miner.clusters().to_string(),
        Err(e) => {
            warn!(file, kind = ?e.kind(), error = %e, "loading model failed");
            e.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;
    use crate::source::{Column, ColumnKind, MemorySource, Table};
    use tempfile::TempDir;
    use tokio::io::{duplex, DuplexStream};

    fn source() -> Arc<dyn DataSource> {
        let numbers = Table::new(
            vec![Column::new("x", ColumnKind::Numeric)],
            [1.0, 2.0, 3.0, 10.0, 11.0, 12.0]
                .iter()
                .map(|&v| vec![Value::Number(v)])
                .collect(),
        );
        let empty = Table::new(vec![Column::new("x", ColumnKind::Numeric)], vec![]);
        Arc::new(MemorySource::new().with_table("numbers", numbers).with_table("empty", empty))
    }

    fn start(dir: &TempDir) -> FrameStream<DuplexStream> {
        let (client, server) = duplex(64 * 1024);
        let config = SessionConfig {
            model_dir: dir.path().to_path_buf(),
            options: MinerOptions { seed: Some(17), max_iterations: None },
        };
        tokio::spawn(Session::new(server, source(), config).run());
        FrameStream::new(client)
    }

    async fn read_until_end(frames: &mut FrameStream<DuplexStream>) -> Vec<String> {
        let mut messages = Vec::new();
        loop {
            let text = frames.expect_text().await.unwrap();
            if text == END {
                return messages;
            }
            messages.push(text);
        }
    }

    async fn request_db(frames: &mut FrameStream<DuplexStream>, table: &str, k: Frame, file: &str) {
        frames.send_text(CMD_DB).await.unwrap();
        frames.send_text(table).await.unwrap();
        frames.write_frame(&k).await.unwrap();
        frames.send_text(file).await.unwrap();
    }

    #[test]
    fn test_parse_cluster_count() {
        assert_eq!(parse_cluster_count(&Frame::Int(3)).unwrap(), 3);
        assert_eq!(parse_cluster_count(&Frame::text(" 4 ")).unwrap(), 4);
        assert!(matches!(
            parse_cluster_count(&Frame::text("three")),
            Err(MiningError::Validation(_))
        ));
    }

    #[test]
    fn test_model_path_stays_in_model_dir() {
        let dir = Path::new("/srv/models");
        assert_eq!(model_path(dir, "a.kmeans").unwrap(), dir.join("a.kmeans"));
        assert!(model_path(dir, "../a.kmeans").is_err());
        assert!(model_path(dir, "/etc/passwd").is_err());
        assert!(model_path(dir, "").is_err());
        assert!(model_path(dir, "numbers.CSV").is_err());
    }

    #[tokio::test]
    async fn test_model_name_cannot_overwrite_a_table() {
        let dir = TempDir::new().unwrap();
        let mut frames = start(&dir);

        request_db(&mut frames, "numbers", Frame::Int(2), "numbers.csv").await;
        assert_eq!(frames.expect_text().await.unwrap(), ACK);
        let messages = read_until_end(&mut frames).await;
        assert_eq!(messages.len(), 3);
        assert!(messages[2].starts_with("Saving to numbers.csv failed: Invalid request"), "{}", messages[2]);
        assert!(!dir.path().join("numbers.csv").exists());
    }

    #[tokio::test]
    async fn test_db_then_file_on_one_connection() {
        let dir = TempDir::new().unwrap();
        let mut frames = start(&dir);

        request_db(&mut frames, "numbers", Frame::Int(2), "numbers.kmeans").await;
        assert_eq!(frames.expect_text().await.unwrap(), ACK);
        let messages = read_until_end(&mut frames).await;
        assert_eq!(messages.len(), 3);
        assert!(messages[0].starts_with("Number of iterations: "));
        assert!(messages[1].contains("Centroid = ( 2 )"));
        assert!(messages[1].contains("Centroid = ( 11 )"));
        assert_eq!(messages[2], "Saved to numbers.kmeans");

        frames.send_text(CMD_FILE).await.unwrap();
        frames.send_text("numbers.kmeans").await.unwrap();
        assert_eq!(frames.expect_text().await.unwrap(), ACK);
        let messages = read_until_end(&mut frames).await;
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("0: Centroid = ("));
        assert!(!messages[0].contains("Tuples"));
    }

    #[tokio::test]
    async fn test_empty_table_reports_and_keeps_session() {
        let dir = TempDir::new().unwrap();
        let mut frames = start(&dir);

        request_db(&mut frames, "empty", Frame::Int(2), "empty.kmeans").await;
        assert_eq!(frames.expect_text().await.unwrap(), ACK);
        let messages = read_until_end(&mut frames).await;
        assert_eq!(messages, vec!["Table 'empty' is empty".to_string()]);
        assert!(!dir.path().join("empty.kmeans").exists());

        request_db(&mut frames, "numbers", Frame::text("2"), "n.kmeans").await;
        assert_eq!(frames.expect_text().await.unwrap(), ACK);
        assert_eq!(read_until_end(&mut frames).await.len(), 3);
    }

    #[tokio::test]
    async fn test_invalid_cluster_counts() {
        let dir = TempDir::new().unwrap();
        let mut frames = start(&dir);

        for k in [Frame::Int(0), Frame::Int(-2), Frame::Int(7)] {
            request_db(&mut frames, "numbers", k, "bad.kmeans").await;
            assert_eq!(frames.expect_text().await.unwrap(), ACK);
            let messages = read_until_end(&mut frames).await;
            assert_eq!(messages.len(), 1);
            assert!(messages[0].contains("out of range"), "{}", messages[0]);
        }

        request_db(&mut frames, "numbers", Frame::text("many"), "bad.kmeans").await;
        assert_eq!(frames.expect_text().await.unwrap(), ACK);
        let messages = read_until_end(&mut frames).await;
        assert!(messages[0].starts_with("Invalid request"));
    }

    #[tokio::test]
    async fn test_corrupt_model_reported() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("broken.kmeans"), b"KMCS\x01\x00").unwrap();
        let mut frames = start(&dir);

        frames.send_text(CMD_FILE).await.unwrap();
        frames.send_text("broken.kmeans").await.unwrap();
        assert_eq!(frames.expect_text().await.unwrap(), ACK);
        let messages = read_until_end(&mut frames).await;
        assert!(messages[0].starts_with("Corrupt model"), "{}", messages[0]);

        frames.send_text(CMD_FILE).await.unwrap();
        frames.send_text("missing.kmeans").await.unwrap();
        assert_eq!(frames.expect_text().await.unwrap(), ACK);
        let messages = read_until_end(&mut frames).await;
        assert!(messages[0].starts_with("IO error"), "{}", messages[0]);
    }

    #[tokio::test]
    async fn test_unsupported_command() {
        let dir = TempDir::new().unwrap();
        let mut frames = start(&dir);

        frames.send_text("PING").await.unwrap();
        assert_eq!(frames.expect_text().await.unwrap(), "unsupported command: PING");
        assert_eq!(frames.expect_text().await.unwrap(), END);
    }

    #[tokio::test]
    async fn test_integer_command_ends_session() {
        let dir = TempDir::new().unwrap();
        let (client, server) = duplex(1024);
        let session = Session::new(server, source(), SessionConfig {
            model_dir: dir.path().to_path_buf(),
            ..SessionConfig::default()
        });
        let handle = tokio::spawn(session.run());

        let mut frames = FrameStream::new(client);
        frames.write_frame(&Frame::Int(1)).await.unwrap();
        assert!(matches!(
            handle.await.unwrap(),
            Err(ProtocolError::UnexpectedFrame { expected: "command", .. })
        ));
    }
}
