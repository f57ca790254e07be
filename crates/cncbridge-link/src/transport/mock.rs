//! An in-memory [`Transport`] for tests: a loopback-style pair of byte
//! queues plus optional scripted latency/drops, so the session controller
//! and file-transfer engine can be exercised without real hardware.

use std::collections::VecDeque;
use std::time::Duration;

use cncbridge_core::{Result, TransportError};

use super::Transport;

/// An in-memory transport. `inbound` is what [`Transport::read_available`]
/// drains (tests push the simulated peer's bytes here); `outbound` collects
/// everything the code under test writes.
#[derive(Debug, Default)]
pub struct MockTransport {
    open: bool,
    timeout: Duration,
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
    /// When set, `read_available`/`write_all` fail with this instead of acting.
    pub fail_with: Option<TransportError>,
}

impl MockTransport {
    /// A closed transport with an empty queue.
    pub fn new() -> Self {
        Self {
            open: false,
            timeout: Duration::from_millis(10),
            inbound: VecDeque::new(),
            outbound: Vec::new(),
            fail_with: None,
        }
    }

    /// Queue bytes as if the simulated peer had sent them.
    pub fn push_inbound(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes.iter().copied());
    }

    /// Everything written so far, in order.
    pub fn written(&self) -> &[u8] {
        &self.outbound
    }

    /// Clear the record of written bytes, keeping the connection open.
    pub fn clear_written(&mut self) {
        self.outbound.clear();
    }
}

impl Transport for MockTransport {
    fn open(&mut self) -> Result<()> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        if !self.open {
            return Err(TransportError::Closed.into());
        }
        if let Some(err) = self.fail_with.clone() {
            return Err(err.into());
        }
        self.outbound.extend_from_slice(buf);
        Ok(())
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.open {
            return Err(TransportError::Closed.into());
        }
        if let Some(err) = self.fail_with.clone() {
            return Err(err.into());
        }
        let mut n = 0;
        while n < buf.len() {
            match self.inbound.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_bytes() {
        let mut t = MockTransport::new();
        t.open().unwrap();
        t.push_inbound(b"ok\r\n");
        let mut buf = [0u8; 16];
        let n = t.read_available(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"ok\r\n");
    }

    #[test]
    fn write_is_rejected_when_closed() {
        let mut t = MockTransport::new();
        assert!(t.write_all(b"G0 X1\n").is_err());
    }
}
