//! Client over a single connection with serialized commands.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nzbdav_common::{Error, Result};
use nzbdav_stream::buffer_to_end::DEFAULT_CAPACITY;
use nzbdav_stream::BufferToEndStream;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

use crate::body::YencBodyStream;
use crate::client::{NntpClient, SegmentStream};
use crate::connection::{NntpConnection, Transport};

/// Wraps one [`NntpConnection`] behind an async mutex.
///
/// A segment stream keeps the mutex locked until its body has been read to
/// the terminating line, so the next command never sees leftover body data.
/// Each command and its reply run on a spawned task: a caller that gives up
/// after the command was sent cannot leave the reply unread.
pub struct SingleConnectionClient {
    conn: Arc<Mutex<NntpConnection>>,
}

impl SingleConnectionClient {
    pub fn new(conn: NntpConnection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub async fn connect(
        host: &str,
        port: u16,
        use_ssl: bool,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let conn = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            conn = NntpConnection::connect(host, port, use_ssl) => conn?,
        };
        Ok(Self::new(conn))
    }

    /// Wrap an open transport. Reads the server greeting.
    pub async fn from_transport(transport: Box<dyn Transport>) -> Result<Self> {
        Ok(Self::new(NntpConnection::handshake(transport).await?))
    }

    pub async fn authenticate(
        &self,
        user: &str,
        pass: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut conn = self.lock(cancel).await?;
        let (user, pass) = (user.to_string(), pass.to_string());
        exchange(async move { conn.authenticate(&user, &pass).await }).await
    }

    async fn lock(&self, cancel: &CancellationToken) -> Result<OwnedMutexGuard<NntpConnection>> {
        let conn = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            guard = self.conn.clone().lock_owned() => guard,
        };
        if !conn.is_in_sync() {
            return Err(Error::protocol("connection out of sync with the server"));
        }
        Ok(conn)
    }
}

/// Run a command exchange to completion on its own task.
async fn exchange<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    tokio::spawn(work)
        .await
        .map_err(|e| Error::internal(format!("nntp exchange task failed: {e}")))?
}

#[async_trait]
impl NntpClient for SingleConnectionClient {
    async fn stat(&self, segment_id: &str, cancel: &CancellationToken) -> Result<bool> {
        let mut conn = self.lock(cancel).await?;
        let segment_id = segment_id.to_string();
        exchange(async move { conn.stat(&segment_id).await }).await
    }

    async fn date(&self, cancel: &CancellationToken) -> Result<DateTime<Utc>> {
        let mut conn = self.lock(cancel).await?;
        exchange(async move { conn.date().await }).await
    }

    async fn get_segment_stream(
        &self,
        segment_id: &str,
        cancel: &CancellationToken,
    ) -> Result<SegmentStream> {
        let mut conn = self.lock(cancel).await?;
        let segment_id = segment_id.to_string();
        exchange(async move {
            conn.body(&segment_id).await?;
            let (header, body) = YencBodyStream::open(conn).await?;
            let stream = BufferToEndStream::new(body, DEFAULT_CAPACITY);
            Ok(SegmentStream::new(header, Box::new(stream)))
        })
        .await
    }

    async fn wait_for_ready(&self, cancel: &CancellationToken) -> Result<()> {
        drop(self.lock(cancel).await?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::tests::article;
    use crate::connection::tests::scripted_server;
    use nzbdav_stream::ReadStream;
    use std::time::Duration;

    #[tokio::test]
    async fn test_segment_holds_connection_until_drained() {
        let data = vec![42u8; 20_000];
        let server = scripted_server(
            "200 ready\r\n",
            vec![
                ("BODY <a@x>", article("movie.mkv", &data, 1, 20_000)),
                ("STAT <a@x>", b"223 0 <a@x>\r\n".to_vec()),
            ],
        );
        let client = SingleConnectionClient::from_transport(Box::new(server))
            .await
            .unwrap();
        let cancel = CancellationToken::new();

        let mut segment = client.get_segment_stream("a@x", &cancel).await.unwrap();
        assert_eq!(segment.header().file_size, 20_000);
        let mut first = [0u8; 16];
        segment.read(&mut first).await.unwrap();
        drop(segment);

        tokio::time::timeout(Duration::from_secs(5), client.wait_for_ready(&cancel))
            .await
            .unwrap()
            .unwrap();
        assert!(client.stat("a@x", &cancel).await.unwrap());
    }

    #[tokio::test]
    async fn test_abandoned_fetch_does_not_leak_into_next_command() {
        let (transport, server) = tokio::io::duplex(1 << 20);
        tokio::spawn(async move {
            use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
            let (read, mut write) = tokio::io::split(server);
            write.write_all(b"200 ready\r\n").await.unwrap();
            let mut lines = BufReader::new(read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let reply = match line.as_str() {
                    "BODY <a@x>" => {
                        // Slower than the caller is willing to wait.
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        article("a.bin", &[1u8; 3000], 1, 3000)
                    }
                    "BODY <b@x>" => article("b.bin", &[2u8; 3000], 1, 3000),
                    other => panic!("unexpected command {other}"),
                };
                write.write_all(&reply).await.unwrap();
            }
        });
        let client = SingleConnectionClient::from_transport(Box::new(transport))
            .await
            .unwrap();
        let cancel = CancellationToken::new();

        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            client.get_segment_stream("a@x", &cancel),
        )
        .await;
        assert!(abandoned.is_err());

        let mut segment = tokio::time::timeout(
            Duration::from_secs(5),
            client.get_segment_stream("b@x", &cancel),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(segment.header().file_name, "b.bin");
        let mut data = Vec::new();
        segment.read_to_end(&mut data).await.unwrap();
        assert_eq!(data, vec![2u8; 3000]);
    }

    #[tokio::test]
    async fn test_header_only_fetch() {
        let server = scripted_server(
            "200 ready\r\n",
            vec![
                ("BODY <h@x>", article("show.nfo", b"hello", 1, 5)),
                ("DATE", b"111 20250101101010\r\n".to_vec()),
            ],
        );
        let client = SingleConnectionClient::from_transport(Box::new(server))
            .await
            .unwrap();
        let cancel = CancellationToken::new();
        let header = client.get_segment_yenc_header("h@x", &cancel).await.unwrap();
        assert_eq!(header.file_name, "show.nfo");
        assert_eq!(header.file_size, 5);

        // The rest of the body drains before the next command runs.
        let date = client.date(&cancel).await.unwrap();
        assert_eq!(date.to_rfc3339(), "2025-01-01T10:10:10+00:00");
    }
}
