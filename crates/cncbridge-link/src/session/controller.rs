//! The session controller (component F): owns the transport, runs the
//! background status-poll/watchdog task, demultiplexes replies, and exposes
//! the high-level operations a caller actually wants (`home`, `jog`,
//! `upload`, override scaling, ...).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;

use cncbridge_core::{CNCPoint, CommandError, CncState, Error, GcodeParser, Result, StateError};

use crate::event::{ControllerEvent, EventDispatcher};
use crate::filetransfer::{self, FileTransferConfig, ReceivedFile, TransferProgress};
use crate::session::reply::{parse_reply_line, ReplyLine, StatusReport};
use crate::transport::Transport;

/// Real-time override command bytes (GRBL/grblHAL convention); written
/// directly to the transport, bypassing the line queue and its `ok` wait.
mod override_byte {
    pub const FEED_RESET: u8 = 0x90;
    pub const FEED_PLUS_10: u8 = 0x91;
    pub const FEED_MINUS_10: u8 = 0x92;
    pub const FEED_PLUS_1: u8 = 0x93;
    pub const FEED_MINUS_1: u8 = 0x94;
    pub const SPINDLE_RESET: u8 = 0x99;
    pub const SPINDLE_PLUS_10: u8 = 0x9A;
    pub const SPINDLE_MINUS_10: u8 = 0x9B;
    pub const SPINDLE_PLUS_1: u8 = 0x9C;
    pub const SPINDLE_MINUS_1: u8 = 0x9D;
    pub const RAPID_100: u8 = 0x95;
    pub const RAPID_50: u8 = 0x96;
    pub const RAPID_25: u8 = 0x97;
    pub const STATUS_QUERY: u8 = b'?';
    pub const FEED_HOLD: u8 = b'!';
    pub const CYCLE_START: u8 = b'~';
    pub const SOFT_RESET: u8 = 0x18;
}

/// Probe interval for `?` status queries.
const PROBE_INTERVAL: Duration = Duration::from_millis(200);
/// No reply at all to a status query for this long: first watchdog warning.
const WATCHDOG_WARN: Duration = Duration::from_millis(4500);
/// No reply at all for this long: the link is declared dead.
const WATCHDOG_DEAD: Duration = Duration::from_millis(7000);

/// The session's connection/activity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No transport is open.
    Disconnected,
    /// The transport is open and the controller has not replied yet.
    Connecting,
    /// Connected and not running a job or transfer.
    Idle,
    /// Streaming a job.
    Running,
    /// A file transfer is in progress; command submission is refused.
    Transferring,
    /// The controller reported an alarm; only `soft_reset` is accepted.
    Alarm,
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

struct Shared {
    transport: Mutex<Box<dyn Transport>>,
    state: Mutex<LinkState>,
    last_status: Mutex<Option<StatusReport>>,
    pending_acks: Mutex<VecDeque<oneshot::Sender<Result<()>>>>,
    events: EventDispatcher,
    feed_override_pct: Mutex<u16>,
    spindle_override_pct: Mutex<u16>,
    shutdown: AtomicBool,
    /// The locally-tracked machine state. Both `execute_gcode` (as lines are
    /// submitted) and the status-line handler in the background loop (as
    /// `<...>` reports arrive) write into this, so it is kept behind a
    /// session-wide lock rather than two independent copies drifting apart.
    parser: RwLock<GcodeParser>,
    /// Set by [`SessionController::cancel_transfer`] and checked by the
    /// in-progress upload/download at every block boundary.
    transfer_cancel: Arc<AtomicBool>,
}

/// Owns one connection to a controller.
#[derive(Clone)]
pub struct SessionController {
    shared: Arc<Shared>,
}

impl SessionController {
    /// Wrap an already-constructed transport. Call [`SessionController::connect`]
    /// to open it and start the background probe task.
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport: Mutex::new(transport),
                state: Mutex::new(LinkState::Disconnected),
                last_status: Mutex::new(None),
                pending_acks: Mutex::new(VecDeque::new()),
                events: EventDispatcher::new(),
                feed_override_pct: Mutex::new(100),
                spindle_override_pct: Mutex::new(100),
                shutdown: AtomicBool::new(false),
                parser: RwLock::new(GcodeParser::new()),
                transfer_cancel: Arc::new(AtomicBool::new(false)),
            }),
        }
    }

    /// Subscribe to this session's events.
    pub fn events(&self) -> EventDispatcher {
        self.shared.events.clone()
    }

    /// Current link state.
    pub fn state(&self) -> LinkState {
        *self.shared.state.lock()
    }

    /// The last parsed `<...>` status report, if any has arrived yet.
    pub fn last_status(&self) -> Option<StatusReport> {
        self.shared.last_status.lock().clone()
    }

    /// A snapshot of the locally-tracked machine state, folding in both the
    /// lines this session has submitted and every status report received
    /// back from the controller.
    pub fn cnc_state(&self) -> CncState {
        self.shared.parser.read().state.clone()
    }

    fn transition(&self, to: LinkState) {
        let from = std::mem::replace(&mut *self.shared.state.lock(), to);
        if from != to {
            self.shared.events.publish(ControllerEvent::StateChanged { from, to });
        }
    }

    fn require_state(&self, operation: &str, allowed: &[LinkState]) -> Result<()> {
        let current = self.state();
        if allowed.contains(&current) {
            return Ok(());
        }
        if current == LinkState::Transferring {
            return Err(StateError::TransferInProgress {
                operation: operation.to_string(),
            }
            .into());
        }
        Err(StateError::NotConnected {
            operation: operation.to_string(),
            state: current.to_string(),
        }
        .into())
    }

    /// Open the transport and start the background read/probe loop.
    pub async fn connect(&self) -> Result<()> {
        self.transition(LinkState::Connecting);
        {
            let mut transport = self.shared.transport.lock();
            transport.open()?;
        }
        tracing::debug!("transport open, starting probe loop");
        self.transition(LinkState::Idle);
        self.spawn_background_loop();
        Ok(())
    }

    /// Close the transport and stop the background loop.
    pub fn disconnect(&self) {
        self.shared.shutdown.store(true, Ordering::Relaxed);
        self.shared.transport.lock().close().ok();
        self.transition(LinkState::Disconnected);
        tracing::debug!("transport closed");
    }

    fn spawn_background_loop(&self) {
        let shared = self.shared.clone();
        tokio::task::spawn_blocking(move || {
            let mut last_probe = std::time::Instant::now();
            let mut last_reply = std::time::Instant::now();
            let mut line_buf = Vec::new();
            let mut read_buf = [0u8; 256];
            let mut warned = false;

            while !shared.shutdown.load(Ordering::Relaxed) {
                let n = {
                    let mut transport = shared.transport.lock();
                    if !transport.is_open() {
                        break;
                    }
                    transport.read_available(&mut read_buf).unwrap_or(0)
                };

                if n > 0 {
                    last_reply = std::time::Instant::now();
                    warned = false;
                    line_buf.extend_from_slice(&read_buf[..n]);
                    while let Some(pos) = line_buf.iter().position(|&b| b == b'\n') {
                        let raw: Vec<u8> = line_buf.drain(..=pos).collect();
                        let text = String::from_utf8_lossy(&raw).trim().to_string();
                        if !text.is_empty() {
                            shared.events.publish(ControllerEvent::LineReceived(text.clone()));
                            dispatch_reply(&shared, &text);
                        }
                    }
                } else {
                    std::thread::sleep(Duration::from_millis(5));
                }

                // The prober only owns the wire while the session is idle: a
                // running job or an in-progress file transfer needs every
                // byte, and a `?` interleaved into either would corrupt it.
                let is_idle = *shared.state.lock() == LinkState::Idle;

                if is_idle && last_probe.elapsed() >= PROBE_INTERVAL {
                    last_probe = std::time::Instant::now();
                    let mut transport = shared.transport.lock();
                    let _ = transport.write_all(&[override_byte::STATUS_QUERY]);
                }

                let idle = last_reply.elapsed();
                if idle >= WATCHDOG_DEAD {
                    tracing::error!("link watchdog: no reply for {:?}, declaring the link dead", idle);
                    let from = std::mem::replace(&mut *shared.state.lock(), LinkState::Alarm);
                    if from != LinkState::Alarm {
                        shared.events.publish(ControllerEvent::StateChanged {
                            from,
                            to: LinkState::Alarm,
                        });
                    }
                    shared
                        .events
                        .publish(ControllerEvent::Error("link watchdog: no reply for 7s".to_string()));
                    break;
                } else if is_idle && idle >= WATCHDOG_WARN && !warned {
                    warned = true;
                    tracing::warn!("link watchdog: no reply for {:?}, forcing a status query", idle);
                    shared
                        .events
                        .publish(ControllerEvent::Fault("link watchdog: no reply for 4.5s".to_string()));
                    let mut transport = shared.transport.lock();
                    let _ = transport.write_all(&[override_byte::STATUS_QUERY]);
                }
            }
        });
    }

    /// Submit one line of G-code (or a raw `$`/`M`-style command) and wait
    /// for its `ok`/`error` acknowledgement.
    pub async fn send_line(&self, line: &str) -> Result<()> {
        self.require_state("send_line", &[LinkState::Idle, LinkState::Running])?;
        let (tx, rx) = oneshot::channel();
        self.shared.pending_acks.lock().push_back(tx);

        {
            let mut transport = self.shared.transport.lock();
            transport.write_all(line.as_bytes())?;
            transport.write_all(b"\n")?;
        }

        rx.await.map_err(|_| Error::other("session closed while awaiting reply"))?
    }

    /// Stream a whole program, one line per `send_line` call, stopping at
    /// the first error. Each line is also fed to the local parser so
    /// [`SessionController::cnc_state`] stays in sync with what was sent,
    /// independent of whatever status reports come back.
    pub async fn execute_gcode(&self, program: &str) -> Result<()> {
        self.transition(LinkState::Running);
        for (idx, line) in program.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Err(e) = self.send_line(line).await {
                self.transition(LinkState::Idle);
                return Err(e);
            }
            let line_no = idx as u32 + 1;
            if let Err(e) = self.shared.parser.write().parse_line(line, line_no) {
                tracing::warn!(line_no, error = %e, "local parser fell out of sync with a sent line");
            }
        }
        self.transition(LinkState::Idle);
        Ok(())
    }

    /// Home the machine (`$H`).
    pub async fn home(&self) -> Result<()> {
        self.send_line("$H").await
    }

    /// Jog by a relative delta at the given feed rate (`$J=G91 ...`).
    pub async fn jog(&self, delta: CNCPoint, feed_rate: f64) -> Result<()> {
        self.send_line(&format!(
            "$J=G91 X{:.4} Y{:.4} Z{:.4} F{:.1}",
            delta.x, delta.y, delta.z, feed_rate
        ))
        .await
    }

    /// Probe toward the work surface (`G38.2`) then read the reported
    /// trigger position back out of the `[PRB:...]` info line.
    pub async fn xyz_probe(&self, target: CNCPoint, feed_rate: f64) -> Result<()> {
        self.send_line(&format!(
            "G38.2 X{:.4} Y{:.4} Z{:.4} F{:.1}",
            target.x, target.y, target.z, feed_rate
        ))
        .await
    }

    /// Run the machine's automatic tool-change sequence (Carvera's `M495`).
    pub async fn auto_command(&self) -> Result<()> {
        self.send_line("M495").await
    }

    /// Feed hold (`!`), a real-time byte sent immediately, bypassing the queue.
    pub fn feed_hold(&self) -> Result<()> {
        self.shared.transport.lock().write_all(&[override_byte::FEED_HOLD])
    }

    /// Cycle start / resume (`~`).
    pub fn cycle_start(&self) -> Result<()> {
        self.shared.transport.lock().write_all(&[override_byte::CYCLE_START])
    }

    /// Soft reset (`Ctrl-X`); valid even while in [`LinkState::Alarm`].
    pub fn soft_reset(&self) -> Result<()> {
        self.shared.transport.lock().write_all(&[override_byte::SOFT_RESET])?;
        self.transition(LinkState::Idle);
        Ok(())
    }

    /// Step the feed-rate override toward `target_pct` (1-300) using the
    /// controller's +-10%/+-1%/reset real-time bytes.
    pub fn set_feed_scale(&self, target_pct: u16) -> Result<()> {
        self.step_override(target_pct, true)
    }

    /// Step the spindle-speed override toward `target_pct` (1-200).
    pub fn set_spindle_scale(&self, target_pct: u16) -> Result<()> {
        self.step_override(target_pct, false)
    }

    /// Select one of the controller's three rapid-override presets: 100%,
    /// 50%, or 25%. Unlike feed/spindle overrides this is not steppable,
    /// so any value closer to one preset than the others snaps to it.
    pub fn set_rapid_scale(&self, target_pct: u16) -> Result<()> {
        let byte = if target_pct >= 75 {
            override_byte::RAPID_100
        } else if target_pct >= 38 {
            override_byte::RAPID_50
        } else {
            override_byte::RAPID_25
        };
        self.shared.transport.lock().write_all(&[byte])
    }

    fn step_override(&self, target_pct: u16, is_feed: bool) -> Result<()> {
        let current_lock = if is_feed {
            &self.shared.feed_override_pct
        } else {
            &self.shared.spindle_override_pct
        };
        let mut current = *current_lock.lock();

        let (reset, plus10, minus10, plus1, minus1) = if is_feed {
            (
                override_byte::FEED_RESET,
                override_byte::FEED_PLUS_10,
                override_byte::FEED_MINUS_10,
                override_byte::FEED_PLUS_1,
                override_byte::FEED_MINUS_1,
            )
        } else {
            (
                override_byte::SPINDLE_RESET,
                override_byte::SPINDLE_PLUS_10,
                override_byte::SPINDLE_MINUS_10,
                override_byte::SPINDLE_PLUS_1,
                override_byte::SPINDLE_MINUS_1,
            )
        };

        if target_pct == 100 {
            self.shared.transport.lock().write_all(&[reset])?;
            *current_lock.lock() = 100;
            return Ok(());
        }

        let mut transport = self.shared.transport.lock();
        while current.abs_diff(target_pct) >= 10 {
            let byte = if target_pct > current { plus10 } else { minus10 };
            transport.write_all(&[byte])?;
            current = if target_pct > current { current + 10 } else { current - 10 };
        }
        while current != target_pct {
            let byte = if target_pct > current { plus1 } else { minus1 };
            transport.write_all(&[byte])?;
            current = if target_pct > current { current + 1 } else { current - 1 };
        }
        drop(transport);
        *current_lock.lock() = current;
        Ok(())
    }

    /// Upload `data` to the controller under `filename` over the file-transfer
    /// engine, publishing [`ControllerEvent::TransferProgress`] as it goes.
    pub async fn upload(&self, filename: &str, data: Vec<u8>) -> Result<()> {
        self.require_state("upload", &[LinkState::Idle])?;
        self.transition(LinkState::Transferring);
        self.shared.transfer_cancel.store(false, Ordering::Relaxed);
        let shared = self.shared.clone();
        let filename = filename.to_string();
        let result = tokio::task::spawn_blocking(move || {
            let mut transport = shared.transport.lock();
            filetransfer::send_file(
                &mut **transport,
                &filename,
                &data,
                &FileTransferConfig::default(),
                &shared.transfer_cancel,
                |p: TransferProgress| {
                    shared
                        .events
                        .publish(ControllerEvent::TransferProgress(p.bytes_done as f32 / p.bytes_total.max(1) as f32));
                },
            )
        })
        .await
        .map_err(|e| Error::other(format!("upload task panicked: {e}")))?;

        self.transition(LinkState::Idle);
        result.map_err(Error::from)
    }

    /// Download a file from the controller over the file-transfer engine.
    pub async fn download(&self) -> Result<ReceivedFile> {
        self.require_state("download", &[LinkState::Idle])?;
        self.transition(LinkState::Transferring);
        self.shared.transfer_cancel.store(false, Ordering::Relaxed);
        let shared = self.shared.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut transport = shared.transport.lock();
            filetransfer::receive_file(&mut **transport, &FileTransferConfig::default(), &shared.transfer_cancel, |p| {
                shared
                    .events
                    .publish(ControllerEvent::TransferProgress(p.bytes_done as f32 / p.bytes_total.max(1) as f32));
            })
        })
        .await
        .map_err(|e| Error::other(format!("download task panicked: {e}")))?;

        self.transition(LinkState::Idle);
        result.map_err(Error::from)
    }

    /// Request cancellation of whatever upload/download is currently in
    /// progress. A no-op if nothing is transferring; the engine notices at
    /// its next block boundary and returns a `Cancelled` error, which
    /// `upload`/`download` propagate after returning the link to idle.
    pub fn cancel_transfer(&self) {
        self.shared.transfer_cancel.store(true, Ordering::Relaxed);
    }
}

fn dispatch_reply(shared: &Arc<Shared>, text: &str) {
    match parse_reply_line(text) {
        ReplyLine::Ok => complete_pending(shared, Ok(())),
        ReplyLine::CommandError(code) => complete_pending(
            shared,
            Err(CommandError::MachineError {
                code,
                message: format!("error:{code}"),
            }
            .into()),
        ),
        ReplyLine::Alarm(code) => {
            tracing::error!("controller reported ALARM:{}", code);
            let from = std::mem::replace(&mut *shared.state.lock(), LinkState::Alarm);
            if from != LinkState::Alarm {
                shared.events.publish(ControllerEvent::StateChanged {
                    from,
                    to: LinkState::Alarm,
                });
            }
            complete_pending(
                shared,
                Err(CommandError::Alarm {
                    code,
                    message: format!("ALARM:{code}"),
                }
                .into()),
            );
        }
        ReplyLine::Status(report) => {
            {
                let mut parser = shared.parser.write();
                if let Some(pos) = report.machine_position {
                    parser.state.position = pos;
                    shared.events.publish(ControllerEvent::PositionUpdated(pos));
                }
                if let Some(feed) = report.feed_rate {
                    parser.state.feed_rate = feed;
                }
                if let Some(rpm) = report.spindle_rpm {
                    parser.state.spindle_rpm = rpm;
                }
            }
            *shared.last_status.lock() = Some(report);
        }
        ReplyLine::Info(_) | ReplyLine::Unrecognised(_) => {}
    }
}

fn complete_pending(shared: &Arc<Shared>, result: Result<()>) {
    if let Err(e) = &result {
        shared.events.publish(ControllerEvent::from_error(e));
    }
    if let Some(tx) = shared.pending_acks.lock().pop_front() {
        let _ = tx.send(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    fn connected_controller() -> SessionController {
        let mut transport = MockTransport::new();
        transport.open().unwrap();
        SessionController::new(Box::new(transport))
    }

    #[tokio::test]
    async fn send_line_completes_on_ok_reply() {
        let controller = connected_controller();
        *controller.shared.state.lock() = LinkState::Idle;
        let c2 = controller.clone();
        let handle = tokio::spawn(async move { c2.send_line("G0 X1").await });
        tokio::time::sleep(Duration::from_millis(5)).await;
        dispatch_reply(&controller.shared, "ok");
        let result = handle.await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn send_line_while_disconnected_is_rejected() {
        let controller = connected_controller();
        let err = controller.send_line("G0 X1").await.unwrap_err();
        assert!(matches!(err, Error::State(StateError::NotConnected { .. })));
    }

    #[test]
    fn feed_scale_reset_writes_single_byte() {
        let controller = connected_controller();
        *controller.shared.feed_override_pct.lock() = 120;
        controller.set_feed_scale(100).unwrap();
        let transport = controller.shared.transport.lock();
        let mock = (&**transport as &dyn std::any::Any).downcast_ref::<MockTransport>();
        assert_eq!(mock.unwrap().written(), &[override_byte::FEED_RESET]);
    }

    #[test]
    fn feed_scale_steps_in_tens_then_ones() {
        let controller = connected_controller();
        controller.set_feed_scale(123).unwrap();
        let transport = controller.shared.transport.lock();
        let mock = (&**transport as &dyn std::any::Any).downcast_ref::<MockTransport>().unwrap();
        let written = mock.written();
        let tens = written.iter().filter(|&&b| b == override_byte::FEED_PLUS_10).count();
        let ones = written.iter().filter(|&&b| b == override_byte::FEED_PLUS_1).count();
        assert_eq!(tens, 2);
        assert_eq!(ones, 3);
    }

    #[test]
    fn rapid_scale_snaps_to_nearest_preset() {
        let controller = connected_controller();
        controller.set_rapid_scale(100).unwrap();
        controller.set_rapid_scale(60).unwrap();
        controller.set_rapid_scale(10).unwrap();
        let transport = controller.shared.transport.lock();
        let mock = (&**transport as &dyn std::any::Any).downcast_ref::<MockTransport>().unwrap();
        assert_eq!(
            mock.written(),
            &[override_byte::RAPID_100, override_byte::RAPID_50, override_byte::RAPID_25]
        );
    }

    #[tokio::test]
    async fn status_report_updates_shared_cnc_state() {
        let controller = connected_controller();
        *controller.shared.state.lock() = LinkState::Idle;
        dispatch_reply(
            &controller.shared,
            "<Idle|MPos:1.000,2.000,3.000,0.000|FS:500,12000>",
        );
        let state = controller.cnc_state();
        assert_eq!(state.position.x, 1.0);
        assert_eq!(state.position.y, 2.0);
        assert_eq!(state.position.z, 3.0);
    }

    #[tokio::test]
    async fn execute_gcode_keeps_local_parser_in_sync() {
        let controller = connected_controller();
        *controller.shared.state.lock() = LinkState::Idle;
        let c2 = controller.clone();
        let handle = tokio::spawn(async move { c2.execute_gcode("G1 X5 Y2 F300").await });
        tokio::time::sleep(Duration::from_millis(5)).await;
        dispatch_reply(&controller.shared, "ok");
        handle.await.unwrap().unwrap();
        let state = controller.cnc_state();
        assert_eq!(state.position.x, 5.0);
        assert_eq!(state.position.y, 2.0);
    }

    /// A connected, idle session left alone probes `?` roughly every 200 ms:
    /// over one second that is 4-6 probes, never zero and never a tight spin.
    #[tokio::test]
    async fn idle_session_sends_keepalive_probes() {
        let mut transport = MockTransport::new();
        transport.open().unwrap();
        let controller = SessionController::new(Box::new(transport));
        controller.connect().await.unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;

        let count = {
            let transport = controller.shared.transport.lock();
            let mock = (&**transport as &dyn std::any::Any).downcast_ref::<MockTransport>().unwrap();
            mock.written().iter().filter(|&&b| b == override_byte::STATUS_QUERY).count()
        };
        assert!((4..=6).contains(&count), "expected 4-6 probes in 1s, got {count}");
    }

    /// While a job is running the prober must not write a single `?`: every
    /// byte on the wire belongs to the job, and a keep-alive probe
    /// interleaved into it would corrupt the stream.
    #[tokio::test]
    async fn running_session_sends_no_keepalive_probes() {
        let mut transport = MockTransport::new();
        transport.open().unwrap();
        let controller = SessionController::new(Box::new(transport));
        controller.connect().await.unwrap();
        *controller.shared.state.lock() = LinkState::Running;

        tokio::time::sleep(Duration::from_secs(1)).await;

        let count = {
            let transport = controller.shared.transport.lock();
            let mock = (&**transport as &dyn std::any::Any).downcast_ref::<MockTransport>().unwrap();
            mock.written().iter().filter(|&&b| b == override_byte::STATUS_QUERY).count()
        };
        assert_eq!(count, 0, "prober wrote a `?` while the link was Running");
    }

    #[tokio::test]
    async fn upload_cancelled_up_front_is_rejected_and_link_returns_idle() {
        let controller = connected_controller();
        *controller.shared.state.lock() = LinkState::Idle;
        controller.cancel_transfer();

        let err = controller.upload("job.gcode", vec![0u8; 4096]).await.unwrap_err();
        assert!(matches!(err, Error::FileTransfer(cncbridge_core::FileTransferError::LocalCancelled)));
        assert_eq!(controller.state(), LinkState::Idle);

        let transport = controller.shared.transport.lock();
        let mock = (&**transport as &dyn std::any::Any).downcast_ref::<MockTransport>().unwrap();
        assert_eq!(mock.written(), &[0x18, 0x18]);
    }
}
