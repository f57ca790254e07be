//! Demultiplexing of lines read back from the controller into structured
//! replies: `<...>` status reports, `[...]` info lines, and the `ok`/
//! `error:n`/`ALARM:n` command acknowledgements.

use cncbridge_core::CNCPoint;

/// One parsed reply line.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyLine {
    /// A command completed successfully.
    Ok,
    /// The last command was rejected with this numeric code.
    CommandError(u32),
    /// The controller entered an alarm state with this numeric code.
    Alarm(u32),
    /// A `<...>` real-time status report.
    Status(StatusReport),
    /// A `[...]` informational line (e.g. `[GC:...]`, `[VER:...]`).
    Info(String),
    /// Anything that didn't match a recognised shape; surfaced verbatim.
    Unrecognised(String),
}

/// A parsed `<...>` status report.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatusReport {
    /// The state word (`Idle`, `Run`, `Hold`, `Alarm`, ...).
    pub state: String,
    /// Machine position, if the report carried an `MPos` field.
    pub machine_position: Option<CNCPoint>,
    /// Work position, if the report carried a `WPos` field.
    pub work_position: Option<CNCPoint>,
    /// Feed rate, if the report carried an `FS` or `F` field.
    pub feed_rate: Option<f64>,
    /// Spindle speed, if the report carried an `FS` field's second value.
    pub spindle_rpm: Option<f64>,
}

fn parse_point(field: &str) -> Option<CNCPoint> {
    let mut parts = field.split(',');
    let x: f64 = parts.next()?.parse().ok()?;
    let y: f64 = parts.next()?.parse().ok()?;
    let z: f64 = parts.next()?.parse().ok()?;
    let a: f64 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0.0);
    Some(CNCPoint::xyza(x, y, z, a))
}

fn parse_status(inner: &str) -> StatusReport {
    let mut report = StatusReport::default();
    let mut fields = inner.split('|');
    report.state = fields.next().unwrap_or_default().to_string();
    for field in fields {
        let Some((key, value)) = field.split_once(':') else {
            continue;
        };
        match key {
            "MPos" => report.machine_position = parse_point(value),
            "WPos" => report.work_position = parse_point(value),
            "FS" => {
                let mut nums = value.split(',');
                report.feed_rate = nums.next().and_then(|s| s.parse().ok());
                report.spindle_rpm = nums.next().and_then(|s| s.parse().ok());
            }
            "F" => report.feed_rate = value.parse().ok(),
            _ => {}
        }
    }
    report
}

/// Parse one line as read from the controller (already trimmed of
/// line-endings) into a [`ReplyLine`].
pub fn parse_reply_line(raw: &str) -> ReplyLine {
    let line = raw.trim();
    if line.eq_ignore_ascii_case("ok") {
        return ReplyLine::Ok;
    }
    if let Some(code) = line.strip_prefix("error:") {
        if let Ok(code) = code.trim().parse() {
            return ReplyLine::CommandError(code);
        }
    }
    if let Some(code) = line.strip_prefix("ALARM:") {
        if let Ok(code) = code.trim().parse() {
            return ReplyLine::Alarm(code);
        }
    }
    if let Some(inner) = line.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
        return ReplyLine::Status(parse_status(inner));
    }
    if let Some(inner) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        return ReplyLine::Info(inner.to_string());
    }
    ReplyLine::Unrecognised(line.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ok() {
        assert_eq!(parse_reply_line("ok"), ReplyLine::Ok);
    }

    #[test]
    fn parses_error_code() {
        assert_eq!(parse_reply_line("error:9"), ReplyLine::CommandError(9));
    }

    #[test]
    fn parses_alarm_code() {
        assert_eq!(parse_reply_line("ALARM:1"), ReplyLine::Alarm(1));
    }

    #[test]
    fn parses_status_report_with_machine_position() {
        let line = "<Idle|MPos:1.000,2.000,3.000|FS:500,12000>";
        match parse_reply_line(line) {
            ReplyLine::Status(report) => {
                assert_eq!(report.state, "Idle");
                let pos = report.machine_position.unwrap();
                assert!((pos.x - 1.0).abs() < 1e-9);
                assert_eq!(report.feed_rate, Some(500.0));
                assert_eq!(report.spindle_rpm, Some(12000.0));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parses_info_line() {
        assert_eq!(
            parse_reply_line("[GC:G0 G54 G17 G21 G90 G94 M5 M9 T0 F0 S0]"),
            ReplyLine::Info("GC:G0 G54 G17 G21 G90 G94 M5 M9 T0 F0 S0".to_string())
        );
    }
}
