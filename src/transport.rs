use std::io::{self, BufRead, BufReader, ErrorKind, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use crate::protocol::{ActionToken, encode_action};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("timed out waiting for the engine")]
    Timeout,
    #[error("engine connection closed")]
    Closed,
    #[error("engine connection failed: {0}")]
    Io(#[from] io::Error),
}

/// Blocking, line-at-a-time link to the engine. Callers alternate strictly
/// between sending and `recv_line`; the protocol has no request ids.
pub trait Transport {
    /// Writes `frame` verbatim and flushes.
    fn send_frame(&mut self, frame: &str) -> Result<(), TransportError>;

    /// Next line without its terminator, `Ok(None)` once the peer hangs up.
    fn recv_line(&mut self) -> Result<Option<String>, TransportError>;

    fn send_line(&mut self, line: &str) -> Result<(), TransportError> {
        self.send_frame(&format!("{line}\n"))
    }

    fn send_action(&mut self, action: &ActionToken) -> Result<(), TransportError> {
        self.send_frame(&encode_action(action))
    }
}

pub struct TcpTransport {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    peer: SocketAddr,
}

impl TcpTransport {
    pub fn connect(
        addr: SocketAddr,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let stream = TcpStream::connect_timeout(&addr, connect_timeout)?;
        Self::from_stream(stream, read_timeout)
    }

    pub fn from_stream(stream: TcpStream, read_timeout: Duration) -> Result<Self, TransportError> {
        stream.set_read_timeout(Some(read_timeout))?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        let writer = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
            peer,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl Transport for TcpTransport {
    fn send_frame(&mut self, frame: &str) -> Result<(), TransportError> {
        self.writer.write_all(frame.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }

    fn recv_line(&mut self) -> Result<Option<String>, TransportError> {
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(line.trim_end_matches(['\r', '\n']).to_string())),
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                Err(TransportError::Timeout)
            }
            Err(err) if err.kind() == ErrorKind::ConnectionReset => Err(TransportError::Closed),
            Err(err) => Err(err.into()),
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        let _ = self.writer.shutdown(std::net::Shutdown::Both);
    }
}
