//! Canned drilling/boring cycle expansion (`G81`/`G82`/`G83`/`G85`/`G86`/`G89`)
//! into plain rapid/feed/dwell moves.

use crate::data::CNCPoint;
use crate::error::GCodeParseError;

/// Which canned cycle to expand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CannedCycleKind {
    /// `G81`: straight drill, no dwell.
    Drill,
    /// `G82`: straight drill, dwell at the bottom.
    DrillDwell,
    /// `G83`: peck drill, retracting to `R` between pecks.
    PeckDrill,
    /// `G85`: bore, feed retract.
    Bore,
    /// `G86`: bore, rapid retract (spindle stop at bottom is a hardware
    /// side-effect this module does not model).
    BoreSpindleStop,
    /// `G89`: bore, dwell at the bottom, feed retract.
    BoreDwell,
}

/// Parameters for one cycle at one XY position. Holes repeated with `L` are
/// the caller's responsibility: call [`expand_canned_cycle`] once per target
/// position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CannedCycleParams {
    /// Which cycle.
    pub kind: CannedCycleKind,
    /// Target X.
    pub x: f64,
    /// Target Y.
    pub y: f64,
    /// Retract ("R") plane, machine Z.
    pub r: f64,
    /// Final depth, machine Z. Must be at or below `r`.
    pub z: f64,
    /// Peck increment (`Q`), required and must be positive for [`CannedCycleKind::PeckDrill`].
    pub q: Option<f64>,
    /// Dwell duration in seconds (`P`), required for [`CannedCycleKind::DrillDwell`]
    /// and [`CannedCycleKind::BoreDwell`].
    pub p: Option<f64>,
}

/// One move produced by expanding a canned cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CannedMove {
    /// Rapid traverse to a point.
    Rapid(CNCPoint),
    /// Feed-rate move to a point.
    Feed(CNCPoint),
    /// Dwell in place, seconds. Emits no coordinate.
    Dwell(f64),
}

fn command_name(kind: CannedCycleKind) -> &'static str {
    match kind {
        CannedCycleKind::Drill => "G81",
        CannedCycleKind::DrillDwell => "G82",
        CannedCycleKind::PeckDrill => "G83",
        CannedCycleKind::Bore => "G85",
        CannedCycleKind::BoreSpindleStop => "G86",
        CannedCycleKind::BoreDwell => "G89",
    }
}

/// Expand one canned cycle into its constituent rapid/feed/dwell moves.
/// `start` is the machine position before the cycle runs (its A/B/C are
/// carried through unchanged; its Z doubles as the height the initial XY
/// positioning rapid travels at, and as the "initial plane" the cycle
/// retracts to at the very end in this dialect -- see the design notes for
/// why the `G98`/`G99` initial-plane distinction is not modelled).
pub fn expand_canned_cycle(
    params: &CannedCycleParams,
    start: CNCPoint,
    line_no: u32,
) -> Result<Vec<CannedMove>, GCodeParseError> {
    if params.z > params.r {
        return Err(GCodeParseError::InvalidParameter {
            line_no,
            param: "Z".to_string(),
            reason: "final depth must be at or below the retract plane R".to_string(),
        });
    }

    let at = |z: f64| -> CNCPoint {
        let mut p = start;
        p.x = params.x;
        p.y = params.y;
        p.z = z;
        p
    };

    let mut moves = Vec::new();
    // Position over the hole at the current Z first, so XY motion never
    // happens at the same time as the plunge toward the retract plane.
    moves.push(CannedMove::Rapid(at(start.z)));
    moves.push(CannedMove::Rapid(at(params.r)));

    match params.kind {
        CannedCycleKind::Drill => {
            moves.push(CannedMove::Feed(at(params.z)));
            moves.push(CannedMove::Rapid(at(params.r)));
        }
        CannedCycleKind::DrillDwell => {
            let p = params.p.ok_or_else(|| GCodeParseError::MissingParameter {
                line_no,
                command: command_name(params.kind).to_string(),
                param: "P".to_string(),
            })?;
            moves.push(CannedMove::Feed(at(params.z)));
            moves.push(CannedMove::Dwell(p));
            moves.push(CannedMove::Rapid(at(params.r)));
        }
        CannedCycleKind::PeckDrill => {
            let q = params.q.ok_or_else(|| GCodeParseError::MissingParameter {
                line_no,
                command: command_name(params.kind).to_string(),
                param: "Q".to_string(),
            })?;
            if q <= 0.0 {
                return Err(GCodeParseError::InvalidParameter {
                    line_no,
                    param: "Q".to_string(),
                    reason: "peck increment must be positive".to_string(),
                });
            }
            let mut depth = params.r;
            loop {
                depth = (depth - q).max(params.z);
                moves.push(CannedMove::Feed(at(depth)));
                if depth <= params.z {
                    break;
                }
                moves.push(CannedMove::Rapid(at(params.r)));
            }
            moves.push(CannedMove::Rapid(at(params.r)));
        }
        CannedCycleKind::Bore => {
            moves.push(CannedMove::Feed(at(params.z)));
            moves.push(CannedMove::Feed(at(params.r)));
        }
        CannedCycleKind::BoreSpindleStop => {
            moves.push(CannedMove::Feed(at(params.z)));
            moves.push(CannedMove::Rapid(at(params.r)));
        }
        CannedCycleKind::BoreDwell => {
            let p = params.p.ok_or_else(|| GCodeParseError::MissingParameter {
                line_no,
                command: command_name(params.kind).to_string(),
                param: "P".to_string(),
            })?;
            moves.push(CannedMove::Feed(at(params.z)));
            moves.push(CannedMove::Dwell(p));
            moves.push(CannedMove::Feed(at(params.r)));
        }
    }

    Ok(moves)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(kind: CannedCycleKind) -> CannedCycleParams {
        CannedCycleParams {
            kind,
            x: 10.0,
            y: 5.0,
            r: 2.0,
            z: -10.0,
            q: Some(3.0),
            p: Some(0.5),
        }
    }

    #[test]
    fn drill_goes_down_then_retracts() {
        let moves = expand_canned_cycle(&params(CannedCycleKind::Drill), CNCPoint::ZERO, 1).unwrap();
        assert_eq!(moves.len(), 4);
        assert!(matches!(moves[0], CannedMove::Rapid(p) if (p.z - 0.0).abs() < 1e-9));
        assert!(matches!(moves[1], CannedMove::Rapid(p) if (p.z - 2.0).abs() < 1e-9));
        assert!(matches!(moves[2], CannedMove::Feed(p) if (p.z - (-10.0)).abs() < 1e-9));
        assert!(matches!(moves[3], CannedMove::Rapid(p) if (p.z - 2.0).abs() < 1e-9));
    }

    #[test]
    fn drill_positions_xy_at_the_current_z_before_descending_to_r() {
        // position (5,5,5), `G81 X20 Y20 Z-3 R2 F100`: XY travel happens at
        // the pre-cycle Z, never blended into the plunge toward R.
        let p = CannedCycleParams {
            kind: CannedCycleKind::Drill,
            x: 20.0,
            y: 20.0,
            r: 2.0,
            z: -3.0,
            q: None,
            p: None,
        };
        let start = CNCPoint::xyza(5.0, 5.0, 5.0, 0.0);
        let moves = expand_canned_cycle(&p, start, 1).unwrap();
        assert_eq!(moves.len(), 4);
        assert!(matches!(moves[0], CannedMove::Rapid(pt)
            if (pt.x - 20.0).abs() < 1e-9 && (pt.y - 20.0).abs() < 1e-9 && (pt.z - 5.0).abs() < 1e-9));
        assert!(matches!(moves[1], CannedMove::Rapid(pt)
            if (pt.x - 20.0).abs() < 1e-9 && (pt.y - 20.0).abs() < 1e-9 && (pt.z - 2.0).abs() < 1e-9));
        assert!(matches!(moves[2], CannedMove::Feed(pt) if (pt.z - (-3.0)).abs() < 1e-9));
        assert!(matches!(moves[3], CannedMove::Rapid(pt) if (pt.z - 2.0).abs() < 1e-9));
    }

    #[test]
    fn peck_drill_retracts_between_pecks_and_reaches_final_depth() {
        let moves = expand_canned_cycle(&params(CannedCycleKind::PeckDrill), CNCPoint::ZERO, 1).unwrap();
        let last_feed = moves.iter().rev().find_map(|m| match m {
            CannedMove::Feed(p) => Some(*p),
            _ => None,
        });
        assert!((last_feed.unwrap().z - (-10.0)).abs() < 1e-9);
        assert!(matches!(moves.last(), Some(CannedMove::Rapid(p)) if (p.z - 2.0).abs() < 1e-9));
    }

    #[test]
    fn peck_drill_without_q_is_rejected() {
        let mut p = params(CannedCycleKind::PeckDrill);
        p.q = None;
        let err = expand_canned_cycle(&p, CNCPoint::ZERO, 1).unwrap_err();
        assert!(matches!(err, GCodeParseError::MissingParameter { .. }));
    }

    #[test]
    fn dwell_cycle_includes_a_dwell_move() {
        let moves = expand_canned_cycle(&params(CannedCycleKind::DrillDwell), CNCPoint::ZERO, 1).unwrap();
        assert!(moves.iter().any(|m| matches!(m, CannedMove::Dwell(d) if (*d - 0.5).abs() < 1e-9)));
    }

    #[test]
    fn bore_retracts_at_feed_rate() {
        let moves = expand_canned_cycle(&params(CannedCycleKind::Bore), CNCPoint::ZERO, 1).unwrap();
        assert!(matches!(moves.last(), Some(CannedMove::Feed(p)) if (p.z - 2.0).abs() < 1e-9));
    }

    #[test]
    fn depth_above_retract_plane_is_rejected() {
        let mut p = params(CannedCycleKind::Drill);
        p.z = 5.0;
        let err = expand_canned_cycle(&p, CNCPoint::ZERO, 3).unwrap_err();
        assert!(matches!(err, GCodeParseError::InvalidParameter { line_no: 3, .. }));
    }
}
