//! Transport abstraction (TCP with optional TLS vs Unix socket)

use super::tls::{server_name, TlsConfig};
use crate::{Error, Result};
use bytes::BytesMut;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UnixStream};
use tokio_rustls::client::TlsStream;

/// Transport layer abstraction
pub enum Transport {
    /// Plain TCP connection
    Tcp(TcpStream),
    /// TLS-encrypted TCP connection
    Tls(Box<TlsStream<TcpStream>>),
    /// Unix domain socket
    Unix(UnixStream),
    /// Scripted I/O for session tests
    #[cfg(test)]
    Mock(tokio_test::io::Mock),
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Tcp(_) => f.write_str("Transport::Tcp"),
            Transport::Tls(_) => f.write_str("Transport::Tls"),
            Transport::Unix(_) => f.write_str("Transport::Unix"),
            #[cfg(test)]
            Transport::Mock(_) => f.write_str("Transport::Mock"),
        }
    }
}

impl Transport {
    /// Connect via plain TCP
    pub async fn connect_tcp(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        Ok(Transport::Tcp(stream))
    }

    /// Connect via Unix socket
    pub async fn connect_unix(path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(path).await?;
        Ok(Transport::Unix(stream))
    }

    /// Whether the stream is TLS-encrypted
    pub fn is_tls(&self) -> bool {
        matches!(self, Transport::Tls(_))
    }

    /// Write bytes to the transport
    pub async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        match self {
            Transport::Tcp(stream) => stream.write_all(buf).await?,
            Transport::Tls(stream) => stream.write_all(buf).await?,
            Transport::Unix(stream) => stream.write_all(buf).await?,
            #[cfg(test)]
            Transport::Mock(stream) => stream.write_all(buf).await?,
        }
        Ok(())
    }

    /// Flush the transport
    pub async fn flush(&mut self) -> Result<()> {
        match self {
            Transport::Tcp(stream) => stream.flush().await?,
            Transport::Tls(stream) => stream.flush().await?,
            Transport::Unix(stream) => stream.flush().await?,
            #[cfg(test)]
            Transport::Mock(stream) => stream.flush().await?,
        }
        Ok(())
    }

    /// Read bytes into buffer
    pub async fn read_buf(&mut self, buf: &mut BytesMut) -> Result<usize> {
        let n = match self {
            Transport::Tcp(stream) => stream.read_buf(buf).await?,
            Transport::Tls(stream) => stream.read_buf(buf).await?,
            Transport::Unix(stream) => stream.read_buf(buf).await?,
            #[cfg(test)]
            Transport::Mock(stream) => stream.read_buf(buf).await?,
        };
        Ok(n)
    }

    /// Upgrade a plain TCP transport to TLS after SSLRequest negotiation.
    pub async fn upgrade_to_tls(self, tls_config: &TlsConfig, hostname: &str) -> Result<Self> {
        match self {
            Transport::Tcp(tcp_stream) => {
                let server_name = server_name(hostname)?;
                let connector = tokio_rustls::TlsConnector::from(tls_config.client_config());
                let tls_stream = connector
                    .connect(server_name, tcp_stream)
                    .await
                    .map_err(|e| Error::Tls(format!("TLS handshake failed: {}", e)))?;
                Ok(Transport::Tls(Box::new(tls_stream)))
            }
            Transport::Tls(_) => Err(Error::Tls("transport is already TLS-encrypted".into())),
            Transport::Unix(_) => Err(Error::Tls("cannot upgrade Unix socket to TLS".into())),
            #[cfg(test)]
            Transport::Mock(_) => Err(Error::Tls("cannot upgrade mock transport to TLS".into())),
        }
    }

    /// Shutdown the transport
    pub async fn shutdown(&mut self) -> Result<()> {
        match self {
            Transport::Tcp(stream) => stream.shutdown().await?,
            Transport::Tls(stream) => stream.shutdown().await?,
            Transport::Unix(stream) => stream.shutdown().await?,
            #[cfg(test)]
            Transport::Mock(stream) => stream.shutdown().await?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tcp_connect_failure() {
        let result = Transport::connect_tcp("127.0.0.1", 1).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_unix_connect_failure() {
        let result = Transport::connect_unix(Path::new("/nonexistent/.s.PGSQL.5432")).await;
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_mock_round_trip() {
        let mock = tokio_test::io::Builder::new()
            .write(b"ping")
            .read(b"pong")
            .build();
        let mut transport = Transport::Mock(mock);
        assert!(!transport.is_tls());

        transport.write_all(b"ping").await.unwrap();
        let mut buf = BytesMut::new();
        let n = transport.read_buf(&mut buf).await.unwrap();
        assert_eq!(n, 4);
        assert_eq!(&buf[..], b"pong");
    }

    #[tokio::test]
    async fn test_unix_cannot_upgrade() {
        let (a, _b) = UnixStream::pair().unwrap();
        let tls = TlsConfig::builder().build().unwrap();
        let err = Transport::Unix(a)
            .upgrade_to_tls(&tls, "localhost")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Tls(_)));
    }
}
