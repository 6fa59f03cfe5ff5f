//! A single NNTP connection speaking the reader commands nzbdav needs.
//!
//! Implements the greeting, `AUTHINFO USER/PASS`, `STAT`, `DATE` and `BODY`
//! from RFC 3977 and RFC 4643. Body lines are read raw; dot-unstuffing and
//! the terminating `.` line are handled by [`crate::body`].

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use nzbdav_common::{Error, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{self, ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

/// Anything a connection can run over: TCP, TLS, or an in-memory duplex.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// Status line of a server response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    pub message: String,
}

impl Response {
    fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end();
        let (code, message) = line.split_once(' ').unwrap_or((line, ""));
        let code = code
            .parse()
            .map_err(|_| Error::protocol(format!("malformed response: {line}")))?;
        Ok(Self {
            code,
            message: message.to_string(),
        })
    }
}

pub struct NntpConnection {
    stream: BufStream<Box<dyn Transport>>,
    /// A command was sent whose reply (or body) has not been read in full.
    pending: bool,
}

impl NntpConnection {
    /// Open a TCP (optionally TLS) connection and read the greeting.
    pub async fn connect(host: &str, port: u16, use_ssl: bool) -> Result<Self> {
        let tcp = TcpStream::connect((host, port))
            .await
            .map_err(|e| Error::CouldNotConnect(format!("{host}:{port}: {e}")))?;
        tcp.set_nodelay(true).ok();

        if !use_ssl {
            return Self::handshake(Box::new(tcp)).await;
        }

        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let config = ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::internal(format!("tls setup failed: {e}")))?
        .with_root_certificates(roots)
        .with_no_client_auth();

        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| Error::CouldNotConnect(format!("invalid tls server name {host}: {e}")))?;
        let tls = TlsConnector::from(Arc::new(config))
            .connect(server_name, tcp)
            .await
            .map_err(|e| Error::CouldNotConnect(format!("tls handshake with {host}: {e}")))?;
        Self::handshake(Box::new(tls)).await
    }

    /// Wrap an already-open transport and read the greeting.
    pub async fn handshake(transport: Box<dyn Transport>) -> Result<Self> {
        let mut conn = Self {
            stream: BufStream::new(transport),
            pending: false,
        };
        let greeting = conn.read_response().await?;
        match greeting.code {
            200 | 201 => Ok(conn),
            _ => Err(Error::CouldNotConnect(format!(
                "unexpected greeting: {} {}",
                greeting.code, greeting.message
            ))),
        }
    }

    pub async fn authenticate(&mut self, user: &str, pass: &str) -> Result<()> {
        let response = self.command(&format!("AUTHINFO USER {user}")).await?;
        let response = match response.code {
            281 => return Ok(()),
            381 => self.command(&format!("AUTHINFO PASS {pass}")).await?,
            _ => response,
        };
        if response.code == 281 {
            Ok(())
        } else {
            Err(Error::CouldNotLogin(format!(
                "{} {}",
                response.code, response.message
            )))
        }
    }

    /// Whether the article exists.
    pub async fn stat(&mut self, message_id: &str) -> Result<bool> {
        let response = self.command(&format!("STAT {}", bracket(message_id))).await?;
        match response.code {
            223 => Ok(true),
            430 => Ok(false),
            _ => Err(unexpected("STAT", &response)),
        }
    }

    pub async fn date(&mut self) -> Result<DateTime<Utc>> {
        let response = self.command("DATE").await?;
        if response.code != 111 {
            return Err(unexpected("DATE", &response));
        }
        let stamp = response.message.split_whitespace().next().unwrap_or("");
        NaiveDateTime::parse_from_str(stamp, "%Y%m%d%H%M%S")
            .map(|naive| naive.and_utc())
            .map_err(|_| Error::protocol(format!("malformed DATE response: {}", response.message)))
    }

    /// Request an article body. On success the body lines follow on the wire.
    pub async fn body(&mut self, message_id: &str) -> Result<()> {
        let response = self.command(&format!("BODY {}", bracket(message_id))).await?;
        match response.code {
            222 => {
                self.pending = true;
                Ok(())
            }
            430 => Err(Error::ArticleNotFound(message_id.to_string())),
            _ => Err(unexpected("BODY", &response)),
        }
    }

    /// Whether every reply sent so far has been read. A connection that
    /// is out of sync refuses further commands.
    pub fn is_in_sync(&self) -> bool {
        !self.pending
    }

    /// Mark the body following a `222` reply as fully read.
    pub(crate) fn finish_body(&mut self) {
        self.pending = false;
    }

    async fn command(&mut self, line: &str) -> Result<Response> {
        if self.pending {
            return Err(Error::protocol(
                "connection out of sync: a previous reply was never read",
            ));
        }
        self.pending = true;
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.write_all(b"\r\n").await?;
        self.stream.flush().await?;
        let response = self.read_response().await?;
        self.pending = false;
        Ok(response)
    }

    async fn read_response(&mut self) -> Result<Response> {
        let mut line = Vec::new();
        self.read_line(&mut line).await?;
        Response::parse(&String::from_utf8_lossy(&line))
    }

    /// Read one raw line without its terminator. Fails if the server hangs up.
    pub(crate) async fn read_line(&mut self, line: &mut Vec<u8>) -> Result<()> {
        line.clear();
        let n = self.stream.read_until(b'\n', line).await?;
        if n == 0 {
            return Err(Error::protocol("connection closed by server"));
        }
        while matches!(line.last(), Some(b'\n' | b'\r')) {
            line.pop();
        }
        Ok(())
    }
}

fn bracket(message_id: &str) -> String {
    if message_id.starts_with('<') {
        message_id.to_string()
    } else {
        format!("<{message_id}>")
    }
}

fn unexpected(command: &str, response: &Response) -> Error {
    Error::protocol(format!(
        "unexpected {command} response: {} {}",
        response.code, response.message
    ))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tokio::io::{duplex, AsyncReadExt, DuplexStream};

    /// A scripted server: answers each expected command with a canned reply.
    pub(crate) fn scripted_server(
        greeting: &'static str,
        script: Vec<(&'static str, Vec<u8>)>,
    ) -> DuplexStream {
        let (client, mut server) = duplex(1 << 20);
        tokio::spawn(async move {
            server.write_all(greeting.as_bytes()).await.unwrap();
            let mut pending = Vec::new();
            for (expected, reply) in script {
                let line = loop {
                    if let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                        let line: Vec<u8> = pending.drain(..=pos).collect();
                        break String::from_utf8(line).unwrap();
                    }
                    let mut buf = [0u8; 1024];
                    let n = server.read(&mut buf).await.unwrap();
                    if n == 0 {
                        return;
                    }
                    pending.extend_from_slice(&buf[..n]);
                };
                assert_eq!(line.trim_end(), expected);
                server.write_all(&reply).await.unwrap();
            }
        });
        client
    }

    #[tokio::test]
    async fn test_greeting_and_auth() {
        let server = scripted_server(
            "200 news.example.com ready\r\n",
            vec![
                ("AUTHINFO USER alice", b"381 password required\r\n".to_vec()),
                ("AUTHINFO PASS secret", b"281 welcome\r\n".to_vec()),
            ],
        );
        let mut conn = NntpConnection::handshake(Box::new(server)).await.unwrap();
        conn.authenticate("alice", "secret").await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_greeting() {
        let server = scripted_server("502 go away\r\n", vec![]);
        let err = NntpConnection::handshake(Box::new(server)).await.err().unwrap();
        assert_matches!(err, Error::CouldNotConnect(_));
    }

    #[tokio::test]
    async fn test_bad_credentials() {
        let server = scripted_server(
            "200 ready\r\n",
            vec![
                ("AUTHINFO USER bob", b"381 password required\r\n".to_vec()),
                ("AUTHINFO PASS nope", b"481 rejected\r\n".to_vec()),
            ],
        );
        let mut conn = NntpConnection::handshake(Box::new(server)).await.unwrap();
        let err = conn.authenticate("bob", "nope").await.unwrap_err();
        assert_matches!(err, Error::CouldNotLogin(_));
    }

    #[tokio::test]
    async fn test_stat_and_date() {
        let server = scripted_server(
            "201 ready, no posting\r\n",
            vec![
                ("STAT <a@b>", b"223 0 <a@b>\r\n".to_vec()),
                ("STAT <missing@b>", b"430 no such article\r\n".to_vec()),
                ("DATE", b"111 20240315120000\r\n".to_vec()),
            ],
        );
        let mut conn = NntpConnection::handshake(Box::new(server)).await.unwrap();
        assert!(conn.stat("a@b").await.unwrap());
        assert!(!conn.stat("<missing@b>").await.unwrap());
        let date = conn.date().await.unwrap();
        assert_eq!(date.to_rfc3339(), "2024-03-15T12:00:00+00:00");
    }

    #[tokio::test]
    async fn test_abandoned_command_leaves_connection_out_of_sync() {
        let (client, mut server) = duplex(1 << 16);
        tokio::spawn(async move {
            server.write_all(b"200 ready\r\n").await.unwrap();
            // Read commands but never answer them.
            let mut buf = [0u8; 256];
            while server.read(&mut buf).await.unwrap_or(0) > 0 {}
        });
        let mut conn = NntpConnection::handshake(Box::new(client)).await.unwrap();
        assert!(conn.is_in_sync());

        let abandoned = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            conn.stat("a@x"),
        )
        .await;
        assert!(abandoned.is_err());
        assert!(!conn.is_in_sync());
        assert_matches!(conn.stat("b@x").await, Err(Error::Protocol(_)));
    }

    #[tokio::test]
    async fn test_body_missing_article() {
        let server = scripted_server(
            "200 ready\r\n",
            vec![("BODY <gone@x>", b"430 no such article\r\n".to_vec())],
        );
        let mut conn = NntpConnection::handshake(Box::new(server)).await.unwrap();
        let err = conn.body("gone@x").await.unwrap_err();
        assert_matches!(err, Error::ArticleNotFound(_));
    }
}
