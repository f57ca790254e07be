//! TCP transport, for WiFi/Ethernet bridges that speak the same line
//! protocol as a direct serial connection.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use cncbridge_core::{Result, TransportError};

use super::{ConnectionParams, Transport};

/// A [`Transport`] backed by a TCP socket.
pub struct TcpTransport {
    params: ConnectionParams,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    /// Build a transport for the given parameters; does not connect yet.
    pub fn new(params: ConnectionParams) -> Self {
        Self { params, stream: None }
    }
}

impl Transport for TcpTransport {
    fn open(&mut self) -> Result<()> {
        let addr = format!("{}:{}", self.params.address, self.params.tcp_port);
        let stream = TcpStream::connect(&addr).map_err(|e| TransportError::Io {
            reason: format!("connecting to {addr}: {e}"),
        })?;
        stream
            .set_read_timeout(Some(self.params.timeout))
            .map_err(|e| TransportError::Io {
                reason: e.to_string(),
            })?;
        stream.set_nodelay(true).ok();
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.stream = None;
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
        stream.write_all(buf).map_err(|e| TransportError::Io {
            reason: e.to_string(),
        })?;
        Ok(())
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
        match stream.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock) => {
                Ok(0)
            }
            Err(e) => Err(TransportError::Io {
                reason: e.to_string(),
            }
            .into()),
        }
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.params.timeout = timeout;
        if let Some(stream) = self.stream.as_ref() {
            stream.set_read_timeout(Some(timeout)).map_err(|e| TransportError::Io {
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}
