//! The wire-level XMODEM-1K state machine: block framing, CRC-16 checksums,
//! retries, cancellation, and the filename/MD5 header and footer blocks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crc::{Crc, CRC_16_XMODEM};
use md5::{Digest, Md5};

use cncbridge_core::{Error, FileTransferError, Result, TransportError};

use crate::transport::Transport;

/// Map the crate-wide [`Error`] returned by [`Transport`] methods down to the
/// [`FileTransferError`] these functions report, preserving the underlying
/// [`TransportError`] where the failure actually came from the transport.
fn to_ft_error(e: Error) -> FileTransferError {
    match e {
        Error::Transport(t) => FileTransferError::TransportError(t),
        other => FileTransferError::TransportError(TransportError::Io {
            reason: other.to_string(),
        }),
    }
}

const BLOCK_SIZE: usize = 1024;
const STX: u8 = 0x02;
const EOT: u8 = 0x04;
const ACK: u8 = 0x06;
const NAK: u8 = 0x15;
const CAN: u8 = 0x18;
const PAD: u8 = 0x1A;

static XMODEM_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Tuning for one transfer: per-block timeout, retry budget, and how often
/// the progress callback is actually invoked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FileTransferConfig {
    /// How long to wait for a response to one block before retrying.
    pub block_timeout: Duration,
    /// How many times to retry a single block before giving up.
    pub max_retries: u32,
    /// Minimum interval between progress callback invocations.
    pub progress_throttle: Duration,
}

impl Default for FileTransferConfig {
    fn default() -> Self {
        Self {
            block_timeout: Duration::from_secs(10),
            max_retries: 10,
            progress_throttle: Duration::from_millis(50),
        }
    }
}

/// One progress update. `block_index` is the 0-based position in the data
/// block sequence (not the wire `seq`, which wraps at 256) and is what
/// [`resume_send`] expects back if a transfer needs to restart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferProgress {
    /// Bytes of the (possibly compressed) payload sent or received so far.
    pub bytes_done: u64,
    /// Total bytes of the payload.
    pub bytes_total: u64,
    /// 0-based data block index this update corresponds to.
    pub block_index: u32,
}

/// The result of [`receive_file`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedFile {
    /// Filename carried in the header block.
    pub filename: String,
    /// Decompressed file contents.
    pub data: Vec<u8>,
}

fn read_byte(transport: &mut dyn Transport, deadline: Instant) -> Result<Option<u8>> {
    let mut buf = [0u8; 1];
    loop {
        let n = transport.read_available(&mut buf)?;
        if n == 1 {
            return Ok(Some(buf[0]));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
    }
}

fn check_cancel(cancel: &AtomicBool, transport: &mut dyn Transport) -> std::result::Result<(), FileTransferError> {
    if cancel.load(Ordering::Relaxed) {
        let _ = transport.write_all(&[CAN, CAN]);
        return Err(FileTransferError::LocalCancelled);
    }
    Ok(())
}

fn frame_block(seq: u8, payload: &[u8; BLOCK_SIZE]) -> Vec<u8> {
    let crc = XMODEM_CRC.checksum(payload);
    let mut out = Vec::with_capacity(BLOCK_SIZE + 5);
    out.push(STX);
    out.push(seq);
    out.push(!seq);
    out.extend_from_slice(payload);
    out.extend_from_slice(&crc.to_be_bytes());
    out
}

fn send_block_with_retry(
    transport: &mut dyn Transport,
    seq: u8,
    payload: &[u8; BLOCK_SIZE],
    config: &FileTransferConfig,
    cancel: &AtomicBool,
) -> std::result::Result<(), FileTransferError> {
    let frame = frame_block(seq, payload);
    for attempt in 0..config.max_retries {
        check_cancel(cancel, transport)?;
        transport.write_all(&frame).map_err(to_ft_error)?;
        let deadline = Instant::now() + config.block_timeout;
        match read_byte(transport, deadline).map_err(to_ft_error)? {
            Some(ACK) => return Ok(()),
            Some(NAK) => continue,
            Some(CAN) => {
                let deadline = Instant::now() + Duration::from_millis(500);
                if read_byte(transport, deadline).map_err(to_ft_error)? == Some(CAN) {
                    tracing::warn!("peer cancelled transfer at block {}", seq);
                    return Err(FileTransferError::PeerCancelled);
                }
            }
            _ => {
                tracing::debug!("block {} retry {}/{}", seq, attempt + 1, config.max_retries);
            }
        }
    }
    Err(FileTransferError::Timeout {
        seq,
        retries: config.max_retries,
    })
}

fn send_eot_with_retry(
    transport: &mut dyn Transport,
    config: &FileTransferConfig,
) -> std::result::Result<(), FileTransferError> {
    for _ in 0..config.max_retries {
        transport.write_all(&[EOT]).map_err(to_ft_error)?;
        let deadline = Instant::now() + config.block_timeout;
        match read_byte(transport, deadline).map_err(to_ft_error)? {
            Some(ACK) => return Ok(()),
            _ => continue,
        }
    }
    Err(FileTransferError::Timeout {
        seq: 0,
        retries: config.max_retries,
    })
}

fn header_block(filename: &str, payload_len: usize) -> [u8; BLOCK_SIZE] {
    let mut block = [0u8; BLOCK_SIZE];
    let text = format!("{filename}\0{payload_len}\0");
    let bytes = text.as_bytes();
    let n = bytes.len().min(BLOCK_SIZE);
    block[..n].copy_from_slice(&bytes[..n]);
    block
}

fn md5_hex(payload: &[u8]) -> String {
    format!("{:x}", Md5::digest(payload))
}

fn footer_block(digest_hex: &str) -> [u8; BLOCK_SIZE] {
    let mut block = [PAD; BLOCK_SIZE];
    let bytes = digest_hex.as_bytes();
    block[..bytes.len()].copy_from_slice(bytes);
    block
}

fn data_block(chunk: &[u8]) -> [u8; BLOCK_SIZE] {
    let mut block = [PAD; BLOCK_SIZE];
    block[..chunk.len()].copy_from_slice(chunk);
    block
}

fn seq_for_block_index(index: usize) -> u8 {
    ((index + 1) % 256) as u8
}

/// Send `data` under `filename`, compressing first if `filename` ends in
/// `.lz`. Calls `on_progress` (throttled to `config.progress_throttle`) as
/// blocks are acknowledged.
pub fn send_file(
    transport: &mut dyn Transport,
    filename: &str,
    data: &[u8],
    config: &FileTransferConfig,
    cancel: &AtomicBool,
    on_progress: impl FnMut(TransferProgress),
) -> std::result::Result<(), FileTransferError> {
    send_from_block(transport, filename, data, config, cancel, on_progress, 0)
}

/// Resume a transfer that previously failed after acknowledging
/// `resume_after_block_index` data blocks (from the last [`TransferProgress`]
/// observed): re-sends the header, then continues from the next block.
pub fn resume_send(
    transport: &mut dyn Transport,
    filename: &str,
    data: &[u8],
    config: &FileTransferConfig,
    cancel: &AtomicBool,
    on_progress: impl FnMut(TransferProgress),
    resume_after_block_index: u32,
) -> std::result::Result<(), FileTransferError> {
    send_from_block(
        transport,
        filename,
        data,
        config,
        cancel,
        on_progress,
        resume_after_block_index as usize + 1,
    )
}

fn send_from_block(
    transport: &mut dyn Transport,
    filename: &str,
    data: &[u8],
    config: &FileTransferConfig,
    cancel: &AtomicBool,
    mut on_progress: impl FnMut(TransferProgress),
    start_block_index: usize,
) -> std::result::Result<(), FileTransferError> {
    let compress = filename.ends_with(".lz");
    let payload = if compress {
        lz4_flex::compress_prepend_size(data)
    } else {
        data.to_vec()
    };
    let total = payload.len() as u64;

    if start_block_index == 0 {
        let header = header_block(filename, data.len());
        send_block_with_retry(transport, 0, &header, config, cancel)?;
    }

    let chunks: Vec<&[u8]> = payload.chunks(BLOCK_SIZE).collect();
    let mut last_emit = Instant::now() - config.progress_throttle;
    let mut bytes_done = (start_block_index * BLOCK_SIZE).min(payload.len()) as u64;

    for (index, chunk) in chunks.iter().enumerate().skip(start_block_index) {
        let seq = seq_for_block_index(index);
        let block = data_block(chunk);
        send_block_with_retry(transport, seq, &block, config, cancel)?;
        bytes_done += chunk.len() as u64;

        let progress = TransferProgress {
            bytes_done,
            bytes_total: total,
            block_index: index as u32,
        };
        let now = Instant::now();
        if now.duration_since(last_emit) >= config.progress_throttle || bytes_done == total {
            last_emit = now;
            on_progress(progress);
        }
    }

    send_eot_with_retry(transport, config)?;

    let digest_hex = md5_hex(data);
    let footer_seq = seq_for_block_index(chunks.len());
    let footer = footer_block(&digest_hex);
    send_block_with_retry(transport, footer_seq, &footer, config, cancel)?;
    send_eot_with_retry(transport, config)?;

    Ok(())
}

fn read_block(
    transport: &mut dyn Transport,
    config: &FileTransferConfig,
) -> std::result::Result<Option<[u8; BLOCK_SIZE]>, FileTransferError> {
    let outer_deadline = Instant::now() + config.block_timeout;
    let lead = loop {
        match read_byte(transport, outer_deadline).map_err(to_ft_error)? {
            Some(EOT) => {
                transport.write_all(&[ACK]).map_err(to_ft_error)?;
                return Ok(None);
            }
            Some(STX) => break STX,
            Some(_) => {
                if Instant::now() >= outer_deadline {
                    return Err(FileTransferError::Timeout { seq: 0, retries: 0 });
                }
                continue; // discard noise and keep waiting for a frame to start
            }
            None => return Err(FileTransferError::Timeout { seq: 0, retries: 0 }),
        }
    };
    let _ = lead;

    let mut header = [0u8; 2];
    let deadline = Instant::now() + config.block_timeout;
    for b in header.iter_mut() {
        *b = read_byte(transport, deadline).map_err(to_ft_error)?.ok_or(FileTransferError::Timeout { seq: 0, retries: 0 })?;
    }
    let seq = header[0];
    if header[1] != !seq {
        transport.write_all(&[NAK]).map_err(to_ft_error)?;
        return Err(FileTransferError::ChecksumMismatch { seq });
    }

    let mut payload = [0u8; BLOCK_SIZE];
    for b in payload.iter_mut() {
        *b = read_byte(transport, deadline).map_err(to_ft_error)?.ok_or(FileTransferError::Timeout { seq, retries: 0 })?;
    }
    let mut crc_bytes = [0u8; 2];
    for b in crc_bytes.iter_mut() {
        *b = read_byte(transport, deadline).map_err(to_ft_error)?.ok_or(FileTransferError::Timeout { seq, retries: 0 })?;
    }
    let expected = u16::from_be_bytes(crc_bytes);
    if XMODEM_CRC.checksum(&payload) != expected {
        transport.write_all(&[NAK]).map_err(to_ft_error)?;
        return Err(FileTransferError::ChecksumMismatch { seq });
    }

    transport.write_all(&[ACK]).map_err(to_ft_error)?;
    Ok(Some(payload))
}

/// Receive one file: the header block (filename + payload length), every
/// data block up to `EOT`, the MD5 footer block, and the closing `EOT`.
/// Decompresses the result if the header's filename ends in `.lz`.
pub fn receive_file(
    transport: &mut dyn Transport,
    config: &FileTransferConfig,
    cancel: &AtomicBool,
    mut on_progress: impl FnMut(TransferProgress),
) -> std::result::Result<ReceivedFile, FileTransferError> {
    let header = read_block(transport, config)?.ok_or(FileTransferError::PeerCancelled)?;
    let text = String::from_utf8_lossy(&header);
    let mut parts = text.splitn(3, '\0');
    let filename = parts.next().unwrap_or_default().to_string();
    // The header carries the *uncompressed* length; for a `.lz` transfer this
    // is smaller than the number of wire bytes actually carrying it, so it
    // cannot be used to trim padding from the last compressed block.
    let uncompressed_len: usize = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or(FileTransferError::ChecksumMismatch { seq: 0 })?;
    let compressed = filename.ends_with(".lz");

    let mut wire = Vec::with_capacity(uncompressed_len);
    let mut last_emit = Instant::now() - config.progress_throttle;
    let mut block_index: u32 = 0;
    loop {
        check_cancel(cancel, transport)?;
        match read_block(transport, config)? {
            Some(block) => {
                if compressed {
                    // The exact compressed length isn't known up front; keep
                    // every block whole and let the LZ4 decoder stop once it
                    // has produced `uncompressed_len` bytes, ignoring the
                    // trailing PAD on the last block.
                    wire.extend_from_slice(&block);
                } else {
                    let remaining = uncompressed_len.saturating_sub(wire.len());
                    let take = remaining.min(BLOCK_SIZE);
                    wire.extend_from_slice(&block[..take]);
                }

                let progress = TransferProgress {
                    bytes_done: wire.len().min(uncompressed_len) as u64,
                    bytes_total: uncompressed_len as u64,
                    block_index,
                };
                block_index += 1;
                let now = Instant::now();
                if now.duration_since(last_emit) >= config.progress_throttle
                    || wire.len() >= uncompressed_len
                {
                    last_emit = now;
                    on_progress(progress);
                }
            }
            None => break, // EOT for the data phase
        }
    }

    let footer = read_block(transport, config)?.ok_or(FileTransferError::PeerCancelled)?;
    let expected_hex: String = footer
        .iter()
        .take_while(|&&b| b != PAD)
        .map(|&b| b as char)
        .collect();

    let data = if compressed {
        lz4_flex::decompress_size_prepended(&wire).map_err(|_| FileTransferError::MD5Mismatch {
            expected: expected_hex.clone(),
            actual: "decompression failed".to_string(),
        })?
    } else {
        wire
    };

    let actual_hex = md5_hex(&data);
    if expected_hex != actual_hex {
        return Err(FileTransferError::MD5Mismatch {
            expected: expected_hex,
            actual: actual_hex,
        });
    }

    Ok(ReceivedFile { filename, data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    fn responder_acking_everything(transport: &mut MockTransport, acks: usize) {
        for _ in 0..acks {
            transport.push_inbound(&[ACK]);
        }
    }

    #[test]
    fn header_block_contains_name_and_length() {
        let block = header_block("part.gcode", 42);
        let text = String::from_utf8_lossy(&block);
        assert!(text.starts_with("part.gcode\u{0}42\u{0}"));
    }

    #[test]
    fn small_file_round_trips_through_frame_and_crc() {
        let payload = b"G0 X0 Y0\nG1 X10 F100\n".to_vec();
        let mut block = [PAD; BLOCK_SIZE];
        block[..payload.len()].copy_from_slice(&payload);
        let frame = frame_block(1, &block);
        assert_eq!(frame[0], STX);
        assert_eq!(frame[1], 1);
        assert_eq!(frame[2], !1u8);
        let crc_in_frame = u16::from_be_bytes([frame[frame.len() - 2], frame[frame.len() - 1]]);
        assert_eq!(crc_in_frame, XMODEM_CRC.checksum(&block));
    }

    #[test]
    fn send_file_completes_against_an_always_acking_peer() {
        let mut transport = MockTransport::new();
        transport.open().unwrap();
        // header ack, one data block ack, EOT ack, footer ack, EOT ack.
        responder_acking_everything(&mut transport, 5);
        let cancel = AtomicBool::new(false);
        let mut updates = Vec::new();
        let result = send_file(
            &mut transport,
            "job.gcode",
            b"G0 X0\nG1 X1 F100\n",
            &FileTransferConfig::default(),
            &cancel,
            |p| updates.push(p),
        );
        assert!(result.is_ok(), "{result:?}");
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].block_index, 0);
    }

    #[test]
    fn send_file_header_declares_uncompressed_length_for_lz_filenames() {
        let mut transport = MockTransport::new();
        transport.open().unwrap();
        let data = b"G0 X0\nG1 X1 F100\n".to_vec();
        // header ack, one data block ack, EOT ack, footer ack, EOT ack.
        responder_acking_everything(&mut transport, 5);
        let cancel = AtomicBool::new(false);
        let result = send_file(&mut transport, "job.gcode.lz", &data, &FileTransferConfig::default(), &cancel, |_| {});
        assert!(result.is_ok(), "{result:?}");

        let written = transport.written();
        let header_text = String::from_utf8_lossy(&written[3..3 + BLOCK_SIZE]);
        assert!(
            header_text.starts_with(&format!("job.gcode.lz\u{0}{}\u{0}", data.len())),
            "header did not declare the uncompressed length: {header_text}"
        );
    }

    #[test]
    fn compressed_payload_digest_is_over_uncompressed_bytes() {
        let data = b"G0 X0 Y0\nG1 X100 Y100 F500\n".repeat(50);
        let compressed = lz4_flex::compress_prepend_size(&data);

        // Simulate the wire padding a short final block out to BLOCK_SIZE
        // with PAD bytes, the way data_block() pads a short final chunk.
        let mut padded = compressed.clone();
        let pad_len = BLOCK_SIZE - (padded.len() % BLOCK_SIZE);
        padded.extend(std::iter::repeat(PAD).take(pad_len));

        let decompressed = lz4_flex::decompress_size_prepended(&padded).unwrap();
        assert_eq!(decompressed, data);
        assert_eq!(md5_hex(&decompressed), md5_hex(&data));
    }

    #[test]
    fn local_cancel_sends_two_can_bytes() {
        let mut transport = MockTransport::new();
        transport.open().unwrap();
        let cancel = AtomicBool::new(true);
        let result = send_file(
            &mut transport,
            "job.gcode",
            b"G0 X0\n",
            &FileTransferConfig::default(),
            &cancel,
            |_| {},
        );
        assert!(matches!(result, Err(FileTransferError::LocalCancelled)));
        assert_eq!(transport.written(), &[CAN, CAN]);
    }

    #[test]
    fn peer_nak_triggers_retry_then_timeout_is_reported_on_exhaustion() {
        let mut transport = MockTransport::new();
        transport.open().unwrap();
        let mut config = FileTransferConfig::default();
        config.max_retries = 2;
        config.block_timeout = Duration::from_millis(5);
        let cancel = AtomicBool::new(false);
        let result = send_file(&mut transport, "job.gcode", b"G0 X0\n", &config, &cancel, |_| {});
        assert!(matches!(result, Err(FileTransferError::Timeout { retries: 2, .. })));
    }
}
