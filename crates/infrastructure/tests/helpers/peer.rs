use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::time::timeout;

pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Client side of a backend session, speaking raw protocol lines.
pub struct TestPeer {
    reader: BufReader<OwnedReadHalf>,
    writer: Option<OwnedWriteHalf>,
}

impl TestPeer {
    pub fn new(stream: UnixStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer: Some(write_half),
        }
    }

    pub async fn connect(path: &Path) -> std::io::Result<Self> {
        Ok(Self::new(UnixStream::connect(path).await?))
    }

    pub async fn send(&mut self, line: &str) {
        self.send_raw(format!("{}\n", line).as_bytes()).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        let writer = self.writer.as_mut().expect("write side already closed");
        writer.write_all(bytes).await.unwrap();
        writer.flush().await.unwrap();
    }

    /// Next line without its terminator, `None` on EOF.
    pub async fn recv(&mut self) -> Option<String> {
        let mut line = String::new();
        let read = timeout(TEST_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a line");
        match read {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches('\n').to_string()),
        }
    }

    /// Sends the handshake and returns the acknowledgement line.
    pub async fn handshake(&mut self, version: u8) -> Option<String> {
        self.send(&format!("HELO\t{}", version)).await;
        self.recv().await
    }

    /// Half-closes the connection so the backend sees EOF.
    pub async fn finish(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.shutdown().await;
        }
    }
}
