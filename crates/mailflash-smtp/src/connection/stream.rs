//! Low-level SMTP stream handling.

use crate::error::{Error, Result};
use crate::reply::Reply;
use rustls::pki_types::ServerName;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::{
    TlsConnector,
    rustls::{ClientConfig, RootCertStore},
};

const WIRE_TARGET: &str = "mailflash_smtp::wire";

#[derive(Debug)]
enum Transport {
    Tcp(BufReader<TcpStream>),
    Tls(Box<BufReader<tokio_rustls::client::TlsStream<TcpStream>>>),
}

/// SMTP stream (TCP or TLS) with optional wire logging.
///
/// With `debug` enabled every line sent and received is logged at `DEBUG`
/// under the `mailflash_smtp::wire` target; otherwise at `TRACE`.
#[derive(Debug)]
pub struct SmtpStream {
    transport: Transport,
    debug: bool,
}

impl SmtpStream {
    /// Enables or disables wire logging at `DEBUG` level.
    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Reads one complete (possibly multi-line) reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails, the peer closes the connection,
    /// or the reply is malformed.
    pub async fn read_reply(&mut self) -> Result<Reply> {
        let debug = self.debug;
        match &mut self.transport {
            Transport::Tcp(reader) => read_reply(reader, debug).await,
            Transport::Tls(reader) => read_reply(&mut **reader, debug).await,
        }
    }

    /// Writes data to the stream and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        match &mut self.transport {
            Transport::Tcp(reader) => {
                reader.get_mut().write_all(data).await?;
                reader.get_mut().flush().await?;
            }
            Transport::Tls(reader) => {
                reader.get_mut().write_all(data).await?;
                reader.get_mut().flush().await?;
            }
        }
        Ok(())
    }

    /// Logs an outgoing line.
    pub(crate) fn log_sent(&self, line: &str) {
        log_wire(self.debug, ">>", line);
    }

    /// Upgrades a TCP stream to TLS.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS handshake fails.
    pub async fn upgrade_to_tls(self, hostname: &str) -> Result<Self> {
        let tcp_stream = match self.transport {
            Transport::Tcp(reader) => reader.into_inner(),
            Transport::Tls(_) => return Err(Error::Protocol("Already using TLS".into())),
        };

        let tls_stream = handshake(hostname, tcp_stream).await?;
        Ok(Self {
            transport: Transport::Tls(Box::new(BufReader::new(tls_stream))),
            debug: self.debug,
        })
    }
}

/// Connects to an SMTP server over plain TCP.
///
/// # Errors
///
/// Returns an error if the connection fails.
pub async fn connect(hostname: &str, port: u16) -> Result<SmtpStream> {
    let stream = TcpStream::connect((hostname, port)).await?;
    Ok(SmtpStream {
        transport: Transport::Tcp(BufReader::new(stream)),
        debug: false,
    })
}

/// Connects to an SMTP server over TLS (implicit TLS, usually port 465).
///
/// # Errors
///
/// Returns an error if the connection or TLS handshake fails.
pub async fn connect_tls(hostname: &str, port: u16) -> Result<SmtpStream> {
    let tcp_stream = TcpStream::connect((hostname, port)).await?;
    let tls_stream = handshake(hostname, tcp_stream).await?;
    Ok(SmtpStream {
        transport: Transport::Tls(Box::new(BufReader::new(tls_stream))),
        debug: false,
    })
}

async fn handshake(
    hostname: &str,
    tcp_stream: TcpStream,
) -> Result<tokio_rustls::client::TlsStream<TcpStream>> {
    let server_name = ServerName::try_from(hostname.to_string())
        .map_err(|_| Error::Protocol(format!("Invalid hostname: {hostname}")))?;
    Ok(create_tls_connector()
        .connect(server_name, tcp_stream)
        .await?)
}

/// Creates a TLS connector trusting the webpki root certificates.
fn create_tls_connector() -> TlsConnector {
    let root_store = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}

/// Reads reply lines until the last line of a reply.
async fn read_reply<R>(reader: &mut R, debug: bool) -> Result<Reply>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = Vec::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "server closed the connection",
            )));
        }

        let line = line.trim_end_matches(['\r', '\n']).to_string();
        if line.is_empty() {
            continue;
        }
        log_wire(debug, "<<", &line);

        let is_last = Reply::is_last_line(&line);
        lines.push(line);
        if is_last {
            break;
        }
    }

    Reply::parse(&lines)
}

fn log_wire(debug: bool, direction: &str, line: &str) {
    if debug {
        tracing::debug!(target: WIRE_TARGET, "{direction} {line}");
    } else {
        tracing::trace!(target: WIRE_TARGET, "{direction} {line}");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_read_multi_line_reply() {
        let mock = Builder::new()
            .read(b"250-mx.example.com\r\n250-SIZE 1000\r\n")
            .read(b"250 STARTTLS\r\n")
            .build();
        let mut reader = BufReader::new(mock);

        let reply = read_reply(&mut reader, false).await.unwrap();
        assert_eq!(reply.message.len(), 3);
        assert_eq!(reply.message[2], "STARTTLS");
    }

    #[tokio::test]
    async fn test_read_reply_skips_blank_lines() {
        let mock = Builder::new().read(b"\r\n220 ready\r\n").build();
        let mut reader = BufReader::new(mock);

        let reply = read_reply(&mut reader, true).await.unwrap();
        assert_eq!(reply.message, vec!["ready"]);
    }

    #[tokio::test]
    async fn test_read_reply_eof_is_an_error() {
        let mock = Builder::new().read(b"250-partial\r\n").build();
        let mut reader = BufReader::new(mock);

        let err = read_reply(&mut reader, false).await.unwrap_err();
        assert!(matches!(err, Error::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }
}
