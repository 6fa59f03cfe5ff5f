//! Streaming decode of a yEnc article body.

use std::ops::DerefMut;

use async_trait::async_trait;
use nzbdav_common::{Error, Result};
use nzbdav_stream::ReadStream;

use crate::connection::NntpConnection;
use crate::yenc::{decode_line, YencHeader};

/// Decodes a `BODY` response line by line as it is read.
///
/// Holds the connection (typically a lock guard) until the terminating `.`
/// line has been consumed. Dropping it earlier leaves unread body lines on
/// the wire, so callers wrap it in a [`nzbdav_stream::BufferToEndStream`].
pub struct YencBodyStream<C> {
    conn: C,
    line: Vec<u8>,
    decoded: Vec<u8>,
    consumed: usize,
    /// `=yend` seen; remaining lines are ignored.
    yend: bool,
    /// Terminating `.` consumed.
    done: bool,
}

impl<C> YencBodyStream<C>
where
    C: DerefMut<Target = NntpConnection> + Send,
{
    /// Read up to the yEnc header. The `BODY` command must already have
    /// been accepted on `conn`.
    pub async fn open(mut conn: C) -> Result<(YencHeader, Self)> {
        let mut line = Vec::new();
        let ybegin = loop {
            if !next_line(&mut conn, &mut line).await? {
                return Err(Error::InvalidYenc("article body has no =ybegin line".into()));
            }
            if line.starts_with(b"=ybegin ") {
                break String::from_utf8_lossy(&line).into_owned();
            }
        };

        let mut stream = Self {
            conn,
            line: Vec::new(),
            decoded: Vec::new(),
            consumed: 0,
            yend: false,
            done: false,
        };

        // `=ypart` immediately follows `=ybegin` in multipart posts.
        if !next_line(&mut stream.conn, &mut line).await? {
            stream.done = true;
            let header = YencHeader::parse(&ybegin, None)?;
            return Ok((header, stream));
        }
        let header = if line.starts_with(b"=ypart ") {
            YencHeader::parse(&ybegin, Some(&String::from_utf8_lossy(&line)))
        } else {
            stream.accept(&line);
            YencHeader::parse(&ybegin, None)
        };
        match header {
            Ok(header) => Ok((header, stream)),
            Err(e) => {
                stream.drain().await?;
                Err(e)
            }
        }
    }

    /// Decode a data line, or note `=yend`.
    fn accept(&mut self, line: &[u8]) {
        if line.starts_with(b"=yend") {
            self.yend = true;
        } else if !self.yend {
            decode_line(line, &mut self.decoded);
        }
    }

    /// Consume the rest of the body up to and including the `.` line.
    async fn drain(&mut self) -> Result<()> {
        while !self.done {
            if !next_line(&mut self.conn, &mut self.line).await? {
                self.done = true;
            }
        }
        Ok(())
    }
}

/// Read the next body line with dot-unstuffing. Returns false at the
/// terminating `.` line.
async fn next_line(conn: &mut NntpConnection, line: &mut Vec<u8>) -> Result<bool> {
    conn.read_line(line).await?;
    if line.as_slice() == b"." {
        conn.finish_body();
        return Ok(false);
    }
    if line.starts_with(b"..") {
        line.remove(0);
    }
    Ok(true)
}

#[async_trait]
impl<C> ReadStream for YencBodyStream<C>
where
    C: DerefMut<Target = NntpConnection> + Send,
{
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        while self.consumed == self.decoded.len() {
            self.decoded.clear();
            self.consumed = 0;
            if self.done {
                return Ok(0);
            }
            let mut line = std::mem::take(&mut self.line);
            let more = next_line(&mut self.conn, &mut line).await;
            if matches!(more, Ok(true)) {
                self.accept(&line);
            }
            self.line = line;
            if !more? {
                self.done = true;
                return Ok(0);
            }
        }
        let n = buf.len().min(self.decoded.len() - self.consumed);
        buf[..n].copy_from_slice(&self.decoded[self.consumed..self.consumed + n]);
        self.consumed += n;
        Ok(n)
    }
}
