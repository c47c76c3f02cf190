//! APRS-IS client.

use crate::feed::{FeedError, ObservationSource};
use crate::frame;
use async_trait::async_trait;
use liveness::Observation;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, trace};

/// Software name announced at login
pub const SOFTWARE: &str = "sentry";

/// Longest line accepted from the server; longer lines are reported as invalid frames
pub const MAX_LINE_LEN: usize = 1024;

/// Connection parameters for an APRS-IS server
#[derive(Debug, Clone)]
pub struct AprsIsSettings {
    /// `host:port`
    pub server: String,
    pub user: String,
    pub passcode: String,
    /// Server-side filter, e.g. `s//# s//&`
    pub filter: String,
    pub connect_timeout: Duration,
}

impl AprsIsSettings {
    /// Login line sent right after connecting
    pub fn login_line(&self) -> String {
        let mut line = format!(
            "user {} pass {} vers {} {}",
            self.user,
            self.passcode,
            SOFTWARE,
            env!("CARGO_PKG_VERSION")
        );
        if !self.filter.is_empty() {
            line.push_str(" filter ");
            line.push_str(&self.filter);
        }
        line.push('\n');
        line
    }
}

/// Line-oriented APRS-IS session over TCP
pub struct AprsIsClient {
    settings: AprsIsSettings,
    conn: Option<BufReader<TcpStream>>,
    line: Vec<u8>,
}

impl AprsIsClient {
    pub fn new(settings: AprsIsSettings) -> Self {
        Self {
            settings,
            conn: None,
            line: Vec::with_capacity(256),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }
}

#[async_trait]
impl ObservationSource for AprsIsClient {
    async fn dial(&mut self) -> Result<(), FeedError> {
        let server = self.settings.server.clone();
        info!(server = %server, "Dialing APRS-IS");

        let mut stream = match timeout(self.settings.connect_timeout, TcpStream::connect(&server)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(FeedError::Connect { server, source }),
            Err(_) => {
                return Err(FeedError::Connect {
                    server,
                    source: io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
                });
            }
        };

        let login = self.settings.login_line();
        if let Err(source) = stream.write_all(login.as_bytes()).await {
            return Err(FeedError::Login { server, source });
        }

        info!(server = %server, user = %self.settings.user, filter = %self.settings.filter, "Connected to APRS-IS");
        self.conn = Some(BufReader::new(stream));
        Ok(())
    }

    async fn next(&mut self) -> Result<Option<Observation>, FeedError> {
        let Some(reader) = self.conn.as_mut() else {
            return Err(FeedError::Stream(io::Error::new(
                io::ErrorKind::NotConnected,
                "not connected",
            )));
        };

        loop {
            self.line.clear();
            let limit = MAX_LINE_LEN as u64 + 1;
            let n = (&mut *reader)
                .take(limit)
                .read_until(b'\n', &mut self.line)
                .await
                .map_err(FeedError::Stream)?;
            if n == 0 {
                return Ok(None);
            }

            if !self.line.ends_with(b"\n") && n as u64 == limit {
                skip_line(reader).await.map_err(FeedError::Stream)?;
                let prefix = String::from_utf8_lossy(&self.line[..MAX_LINE_LEN]);
                debug!(len = n, "Oversized line from server");
                return Ok(Some(Observation::invalid(prefix)));
            }

            let text = String::from_utf8_lossy(&self.line);
            let text = text.trim_end_matches(['\r', '\n']);
            if text.is_empty() {
                continue;
            }
            if text.starts_with('#') {
                trace!(comment = %text, "Server comment");
                continue;
            }

            return Ok(Some(frame::parse_line(text)));
        }
    }

    async fn close(&mut self) -> Result<(), FeedError> {
        if let Some(conn) = self.conn.take() {
            conn.into_inner()
                .shutdown()
                .await
                .map_err(FeedError::Stream)?;
        }
        Ok(())
    }
}

/// Discard input up to and including the next newline
async fn skip_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> io::Result<()> {
    loop {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            return Ok(());
        }
        match buf.iter().position(|&b| b == b'\n') {
            Some(i) => {
                reader.consume(i + 1);
                return Ok(());
            }
            None => {
                let len = buf.len();
                reader.consume(len);
            }
        }
    }
}
