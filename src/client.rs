//! Client side of the request/reply protocol

use crate::error::ClientError;
use crate::protocol::{Frame, FrameStream, ACK, CMD_DB, CMD_FILE, END};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

/// One connection to a k-means server; requests run one at a time
pub struct KMeansClient {
    frames: FrameStream<TcpStream>,
}

impl KMeansClient {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| ClientError::Communication(e.to_string()))?;
        Ok(Self {
            frames: FrameStream::new(stream),
        })
    }

    /// Cluster `table` into `k` groups and save the model as `file` on the
    /// server. Returns every message sent before `END`.
    pub async fn mine_from_db(&mut self, table: &str, k: i64, file: &str) -> Result<Vec<String>, ClientError> {
        self.frames.send_text(CMD_DB).await?;
        self.frames.send_text(table).await?;
        self.frames.write_frame(&Frame::Int(k)).await?;
        self.frames.send_text(file).await?;
        self.collect_reply().await
    }

    /// Centroid summary of the model saved as `file` on the server
    pub async fn load_from_file(&mut self, file: &str) -> Result<Vec<String>, ClientError> {
        self.frames.send_text(CMD_FILE).await?;
        self.frames.send_text(file).await?;
        self.collect_reply().await
    }

    async fn collect_reply(&mut self) -> Result<Vec<String>, ClientError> {
        let first = self.frames.expect_text().await?;
        if first != ACK {
            let rest = self.read_until_end().await?;
            debug!(reply = %first, "request rejected");
            let mut detail = vec![first];
            detail.extend(rest);
            return Err(ClientError::Communication(detail.join("\n")));
        }
        self.read_until_end().await
    }

    async fn read_until_end(&mut self) -> Result<Vec<String>, ClientError> {
        let mut messages = Vec::new();
        loop {
            let text = self.frames.expect_text().await?;
            if text == END {
                return Ok(messages);
            }
            messages.push(text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_rejected_request_is_communication_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut frames = FrameStream::new(socket);
            assert_eq!(frames.expect_text().await.unwrap(), "FILE");
            assert_eq!(frames.expect_text().await.unwrap(), "model.kmeans");
            frames.send_text("busy").await.unwrap();
            frames.send_text(END).await.unwrap();
        });

        let mut client = KMeansClient::connect(addr).await.unwrap();
        let err = client.load_from_file("model.kmeans").await.unwrap_err();
        assert!(matches!(err, ClientError::Communication(ref m) if m == "busy"));
        assert!(err.to_string().starts_with("Communication server error"));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        assert!(matches!(
            KMeansClient::connect(addr).await,
            Err(ClientError::Communication(_))
        ));
    }
}
