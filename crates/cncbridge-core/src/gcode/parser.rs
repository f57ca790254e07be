//! The G-code line parser: tokenise, validate modal groups, resolve
//! coordinates through the active work offset and tool length compensation,
//! expand motion into machine-coordinate points, and fold them into
//! [`CncState`].

use std::collections::HashMap;

use crate::data::{CNCPoint, ToolOffset, Units, WcsEntry, WcsSlot};
use crate::error::GCodeParseError;
use crate::gcode::arc::{center_from_offset, center_from_radius, discretize_arc};
use crate::gcode::canned::{expand_canned_cycle, CannedCycleKind, CannedCycleParams, CannedMove};
use crate::gcode::modal::{modal_group_of_gcode, ModalGroup};
use crate::gcode::token::{tokenize, Word};
use crate::state::{CncState, DistanceMode, ModalDelta, MotionMode, Plane, PathPoint};

/// The outcome of parsing one source line: the words it carried, the motion
/// kind that applied, the total dwell time it spent, and the machine-coordinate
/// points it emitted into [`CncState::path`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    /// 1-based source line number.
    pub line_no: u32,
    /// The recognised words on this line, in source order.
    pub words: Vec<Word>,
    /// The motion mode that governed this line (inherited if not set here).
    pub motion_mode: MotionMode,
    /// Total seconds spent dwelling on this line (`G4 P..` or a canned
    /// cycle's dwell), zero if none.
    pub dwell_seconds: f64,
    /// Machine-coordinate points emitted by this line, in travel order.
    pub points: Vec<PathPoint>,
}

fn word_value(words: &HashMap<char, f64>, letter: char) -> Option<f64> {
    words.get(&letter).copied()
}

fn rotate_xy(x: f64, y: f64, rotation_rad: f64) -> (f64, f64) {
    let (sin, cos) = rotation_rad.sin_cos();
    (x * cos - y * sin, x * sin + y * cos)
}

fn unrotate_xy(x: f64, y: f64, rotation_rad: f64) -> (f64, f64) {
    let (sin, cos) = rotation_rad.sin_cos();
    (x * cos + y * sin, -x * sin + y * cos)
}

/// Machine coordinates -> work coordinates in the given WCS, undoing the
/// WCS offset/rotation and the currently-applied tool length offset.
fn machine_to_work(machine: CNCPoint, wcs: WcsEntry, tool_z: f64) -> CNCPoint {
    let x = machine.x - wcs.offset.x;
    let y = machine.y - wcs.offset.y;
    let (wx, wy) = unrotate_xy(x, y, wcs.rotation_rad);
    CNCPoint::new(
        wx,
        wy,
        machine.z - wcs.offset.z - tool_z,
        machine.a - wcs.offset.a,
        machine.b - wcs.offset.b,
        machine.c - wcs.offset.c,
    )
}

/// Work coordinates -> machine coordinates: the inverse of [`machine_to_work`].
fn work_to_machine(work: CNCPoint, wcs: WcsEntry, tool_z: f64) -> CNCPoint {
    let (x, y) = rotate_xy(work.x, work.y, wcs.rotation_rad);
    CNCPoint::new(
        x + wcs.offset.x,
        y + wcs.offset.y,
        work.z + wcs.offset.z + tool_z,
        work.a + wcs.offset.a,
        work.b + wcs.offset.b,
        work.c + wcs.offset.c,
    )
}

fn check_modal_conflicts(g_words: &[u32], line_no: u32) -> Result<(), GCodeParseError> {
    let mut seen: HashMap<ModalGroup, u32> = HashMap::new();
    for &code in g_words {
        if let Some(group) = modal_group_of_gcode(code) {
            if let Some(&first) = seen.get(&group) {
                return Err(GCodeParseError::ModalGroupConflict {
                    line_no,
                    first: format!("G{first}"),
                    second: format!("G{code}"),
                });
            }
            seen.insert(group, code);
        }
    }
    Ok(())
}

fn motion_mode_for_gcode(code: u32) -> Option<MotionMode> {
    match code {
        0 => Some(MotionMode::Rapid),
        1 => Some(MotionMode::Linear),
        2 => Some(MotionMode::CwArc),
        3 => Some(MotionMode::CcwArc),
        4 => Some(MotionMode::Dwell),
        81 | 82 | 83 | 85 | 86 | 89 => Some(MotionMode::CannedCycle),
        80 => None, // cancels canned-cycle mode; handled by leaving motion at the caller's discretion
        _ => None,
    }
}

fn canned_kind_for_gcode(code: u32) -> Option<CannedCycleKind> {
    match code {
        81 => Some(CannedCycleKind::Drill),
        82 => Some(CannedCycleKind::DrillDwell),
        83 => Some(CannedCycleKind::PeckDrill),
        85 => Some(CannedCycleKind::Bore),
        86 => Some(CannedCycleKind::BoreSpindleStop),
        89 => Some(CannedCycleKind::BoreDwell),
        _ => None,
    }
}

/// A streaming G-code parser, owning the [`CncState`] it folds every line
/// into. One instance tracks a single job's modal state across lines.
#[derive(Debug, Clone, Default)]
pub struct GcodeParser {
    /// The machine state this parser reads and updates.
    pub state: CncState,
}

impl GcodeParser {
    /// A parser starting from a freshly initialised [`CncState`].
    pub fn new() -> Self {
        Self {
            state: CncState::new(),
        }
    }

    /// Parse and apply every line of a multi-line program, in order. Stops
    /// at the first line that fails to parse.
    pub fn parse_program(&mut self, text: &str) -> Result<Vec<ParsedLine>, GCodeParseError> {
        let mut out = Vec::new();
        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx as u32 + 1;
            if raw.trim().is_empty() {
                continue;
            }
            out.push(self.parse_line(raw, line_no)?);
        }
        Ok(out)
    }

    /// Parse one line, applying its modal changes and motion to `self.state`.
    pub fn parse_line(&mut self, raw: &str, line_no: u32) -> Result<ParsedLine, GCodeParseError> {
        let words = tokenize(raw, line_no)?;

        let mut g_codes = Vec::new();
        let mut m_codes = Vec::new();
        let mut others: HashMap<char, f64> = HashMap::new();
        for w in &words {
            match w.letter {
                'G' => g_codes.push(w.value.round() as u32),
                'M' => m_codes.push(w.value.round() as u32),
                other => {
                    others.insert(other, w.value);
                }
            }
        }

        check_modal_conflicts(&g_codes, line_no)?;

        let delta = self.build_modal_delta(&g_codes, &others, line_no)?;
        self.state.apply_modal_delta(&delta);

        self.state.begin_line();
        let mut dwell_seconds = 0.0;

        if let Some(t) = word_value(&others, 'T') {
            self.state.tools.selected_tool = Some(t.round() as u32);
        }
        if m_codes.contains(&6) {
            tracing::debug!(line_no, tool = ?self.state.tools.selected_tool, "tool change commit");
            self.state.tools.change_tool();
        }

        if g_codes.contains(&10) {
            self.apply_g10(&others, line_no)?;
        }

        let motion = g_codes
            .iter()
            .copied()
            .find_map(motion_mode_for_gcode)
            .unwrap_or(self.state.motion_mode);

        match motion {
            MotionMode::Dwell => {
                let seconds = word_value(&others, 'P').ok_or_else(|| GCodeParseError::MissingParameter {
                    line_no,
                    command: "G4".to_string(),
                    param: "P".to_string(),
                })?;
                dwell_seconds += seconds;
            }
            MotionMode::Rapid | MotionMode::Linear => {
                if let Some(target) = self.resolve_linear_target(&others)? {
                    self.state.emit_point(target, line_no, motion);
                }
            }
            MotionMode::CwArc | MotionMode::CcwArc => {
                self.resolve_arc(&others, motion, line_no)?;
            }
            MotionMode::CannedCycle => {
                let code = g_codes.iter().copied().find(|c| canned_kind_for_gcode(*c).is_some());
                if let Some(code) = code {
                    dwell_seconds += self.resolve_canned_cycle(code, &others, line_no)?;
                }
            }
        }

        Ok(ParsedLine {
            line_no,
            words,
            motion_mode: motion,
            dwell_seconds,
            points: self.state.path.clone(),
        })
    }

    fn build_modal_delta(
        &self,
        g_codes: &[u32],
        others: &HashMap<char, f64>,
        line_no: u32,
    ) -> Result<ModalDelta, GCodeParseError> {
        let mut delta = ModalDelta::default();
        for &code in g_codes {
            match code {
                0 => delta.motion_mode = Some(MotionMode::Rapid),
                1 => delta.motion_mode = Some(MotionMode::Linear),
                2 => delta.motion_mode = Some(MotionMode::CwArc),
                3 => delta.motion_mode = Some(MotionMode::CcwArc),
                4 => delta.motion_mode = Some(MotionMode::Dwell),
                81 | 82 | 83 | 85 | 86 | 89 => delta.motion_mode = Some(MotionMode::CannedCycle),
                17 => delta.plane = Some(Plane::XY),
                18 => delta.plane = Some(Plane::XZ),
                19 => delta.plane = Some(Plane::YZ),
                20 => delta.units = Some(Units::INCH),
                21 => delta.units = Some(Units::MM),
                90 => delta.distance_mode = Some(DistanceMode::Absolute),
                91 => delta.distance_mode = Some(DistanceMode::Relative),
                43 => delta.length_compensation = Some(true),
                49 => delta.length_compensation = Some(false),
                54..=59 => {
                    delta.wcs_slot = WcsSlot::from_p_index(code - 53);
                }
                _ => {}
            }
        }
        if let Some(f) = word_value(others, 'F') {
            if f < 0.0 {
                return Err(GCodeParseError::InvalidParameter {
                    line_no,
                    param: "F".to_string(),
                    reason: "feed rate cannot be negative".to_string(),
                });
            }
            delta.feed_rate = Some(Units::convert(f, self.state.units, Units::MM));
        }
        if let Some(s) = word_value(others, 'S') {
            delta.spindle_rpm = Some(s);
        }
        Ok(delta)
    }

    fn apply_g10(&mut self, others: &HashMap<char, f64>, line_no: u32) -> Result<(), GCodeParseError> {
        let l = word_value(others, 'L').unwrap_or(0.0).round() as u32;
        if l == 1 {
            let tool = word_value(others, 'P').ok_or_else(|| GCodeParseError::MissingParameter {
                line_no,
                command: "G10 L1".to_string(),
                param: "P".to_string(),
            })? as u32;
            let offset = ToolOffset {
                x: word_value(others, 'X').unwrap_or(0.0),
                y: word_value(others, 'Y').unwrap_or(0.0),
                z: word_value(others, 'Z').unwrap_or(0.0),
            };
            self.state.tools.set_offset(tool, offset);
            return Ok(());
        }
        if l == 2 {
            let p = word_value(others, 'P').ok_or_else(|| GCodeParseError::MissingParameter {
                line_no,
                command: "G10 L2".to_string(),
                param: "P".to_string(),
            })?;
            let slot = WcsSlot::from_p_index(p.round() as u32).ok_or_else(|| GCodeParseError::InvalidParameter {
                line_no,
                param: "P".to_string(),
                reason: "must select one of G54..G59 (P1..P6)".to_string(),
            })?;
            let existing = self.state.wcs.get(slot);
            let offset = CNCPoint::new(
                word_value(others, 'X').unwrap_or(existing.offset.x),
                word_value(others, 'Y').unwrap_or(existing.offset.y),
                word_value(others, 'Z').unwrap_or(existing.offset.z),
                existing.offset.a,
                existing.offset.b,
                existing.offset.c,
            );
            let rotation_rad = word_value(others, 'R').map(|deg| deg.to_radians());
            self.state.wcs.set_offset(slot, offset, rotation_rad);
            return Ok(());
        }
        Err(GCodeParseError::MissingParameter {
            line_no,
            command: "G10".to_string(),
            param: "L".to_string(),
        })
    }

    fn resolve_linear_target(
        &self,
        others: &HashMap<char, f64>,
    ) -> Result<Option<CNCPoint>, GCodeParseError> {
        let wcs = self.state.wcs.active();
        let tool_z = self.state.tools.active_length_offset();
        let current_work = machine_to_work(self.state.position, wcs, tool_z);
        let has_axis = ['X', 'Y', 'Z', 'A', 'B', 'C'].iter().any(|l| others.contains_key(l));
        if !has_axis {
            return Ok(None);
        }
        let mut work = current_work;
        for &letter in &['X', 'Y', 'Z', 'A', 'B', 'C'] {
            if let Some(raw) = word_value(others, letter) {
                let v = Units::convert(raw, self.state.units, Units::MM);
                let field = match letter {
                    'X' => &mut work.x,
                    'Y' => &mut work.y,
                    'Z' => &mut work.z,
                    'A' => &mut work.a,
                    'B' => &mut work.b,
                    _ => &mut work.c,
                };
                *field = match self.state.distance_mode {
                    DistanceMode::Absolute => v,
                    DistanceMode::Relative => *field + v,
                };
            }
        }
        Ok(Some(work_to_machine(work, wcs, tool_z)))
    }

    fn plane_offset_letters(plane: Plane) -> (char, char) {
        match plane {
            Plane::XY => ('I', 'J'),
            Plane::XZ => ('I', 'K'),
            Plane::YZ => ('J', 'K'),
        }
    }

    fn resolve_arc(
        &mut self,
        others: &HashMap<char, f64>,
        motion: MotionMode,
        line_no: u32,
    ) -> Result<(), GCodeParseError> {
        let plane = self.state.plane;
        let start = self.state.position;
        let target = self
            .resolve_linear_target(others)?
            .unwrap_or(start);

        let (first_letter, second_letter) = Self::plane_offset_letters(plane);
        let start_in_plane = match plane {
            Plane::XY => (start.x, start.y),
            Plane::XZ => (start.x, start.z),
            Plane::YZ => (start.y, start.z),
        };
        let target_in_plane = match plane {
            Plane::XY => (target.x, target.y),
            Plane::XZ => (target.x, target.z),
            Plane::YZ => (target.y, target.z),
        };

        let clockwise = motion == MotionMode::CwArc;
        let (cf, cs) = if let Some(r) = word_value(others, 'R') {
            center_from_radius(
                start_in_plane.0,
                start_in_plane.1,
                target_in_plane.0,
                target_in_plane.1,
                Units::convert(r, self.state.units, Units::MM),
                clockwise,
                line_no,
            )?
        } else {
            let i = word_value(others, first_letter)
                .map(|v| Units::convert(v, self.state.units, Units::MM))
                .unwrap_or(0.0);
            let j = word_value(others, second_letter)
                .map(|v| Units::convert(v, self.state.units, Units::MM))
                .unwrap_or(0.0);
            center_from_offset(start_in_plane.0, start_in_plane.1, i, j)
        };

        let segments = discretize_arc(start, target, cf, cs, plane, clockwise, line_no)?;
        for seg in segments {
            self.state.emit_point(seg.point, line_no, motion);
        }
        Ok(())
    }

    fn resolve_canned_cycle(
        &mut self,
        code: u32,
        others: &HashMap<char, f64>,
        line_no: u32,
    ) -> Result<f64, GCodeParseError> {
        let kind = canned_kind_for_gcode(code).expect("caller verified this is a canned-cycle code");
        let command = format!("G{code}");

        let r = word_value(others, 'R').ok_or_else(|| GCodeParseError::MissingParameter {
            line_no,
            command: command.clone(),
            param: "R".to_string(),
        })?;
        let z = word_value(others, 'Z').ok_or_else(|| GCodeParseError::MissingParameter {
            line_no,
            command: command.clone(),
            param: "Z".to_string(),
        })?;
        let to_mm = |v: f64| Units::convert(v, self.state.units, Units::MM);

        let wcs = self.state.wcs.active();
        let tool_z = self.state.tools.active_length_offset();
        let current_work = machine_to_work(self.state.position, wcs, tool_z);
        let x = word_value(others, 'X').map(to_mm).unwrap_or(current_work.x);
        let y = word_value(others, 'Y').map(to_mm).unwrap_or(current_work.y);
        let machine_xy = work_to_machine(
            CNCPoint::new(x, y, 0.0, current_work.a, current_work.b, current_work.c),
            wcs,
            0.0,
        );

        let params = CannedCycleParams {
            kind,
            x: machine_xy.x,
            y: machine_xy.y,
            r: to_mm(r) + wcs.offset.z + tool_z,
            z: to_mm(z) + wcs.offset.z + tool_z,
            q: word_value(others, 'Q').map(to_mm),
            p: word_value(others, 'P'),
        };

        let moves = expand_canned_cycle(&params, self.state.position, line_no)?;
        let mut dwell_seconds = 0.0;
        for m in moves {
            match m {
                CannedMove::Rapid(p) => self.state.emit_point(p, line_no, MotionMode::Rapid),
                CannedMove::Feed(p) => self.state.emit_point(p, line_no, MotionMode::CannedCycle),
                CannedMove::Dwell(seconds) => dwell_seconds += seconds,
            }
        }
        Ok(dwell_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rapid_move_updates_position() {
        let mut parser = GcodeParser::new();
        let parsed = parser.parse_line("G0 X10 Y20", 1).unwrap();
        assert_eq!(parsed.points.len(), 1);
        assert!((parser.state.position.x - 10.0).abs() < 1e-9);
        assert!((parser.state.position.y - 20.0).abs() < 1e-9);
    }

    #[test]
    fn motion_mode_is_inherited_across_lines() {
        let mut parser = GcodeParser::new();
        parser.parse_line("G1 X1 F100", 1).unwrap();
        let second = parser.parse_line("X2", 2).unwrap();
        assert_eq!(second.motion_mode, MotionMode::Linear);
    }

    #[test]
    fn modal_conflict_is_rejected() {
        let mut parser = GcodeParser::new();
        let err = parser.parse_line("G0 G1 X1", 1).unwrap_err();
        assert!(matches!(err, GCodeParseError::ModalGroupConflict { .. }));
    }

    #[test]
    fn relative_mode_accumulates_from_work_position() {
        let mut parser = GcodeParser::new();
        parser.parse_line("G0 X10", 1).unwrap();
        parser.parse_line("G91 X5", 2).unwrap();
        assert!((parser.state.position.x - 15.0).abs() < 1e-9);
    }

    #[test]
    fn wcs_offset_shifts_machine_coordinates() {
        let mut parser = GcodeParser::new();
        parser.parse_line("G10 L2 P1 X100", 1).unwrap();
        parser.parse_line("G54 G0 X0", 2).unwrap();
        assert!((parser.state.position.x - 100.0).abs() < 1e-9);
    }

    #[test]
    fn inch_mode_converts_to_millimetres() {
        let mut parser = GcodeParser::new();
        parser.parse_line("G20 G0 X1", 1).unwrap();
        assert!((parser.state.position.x - 25.4).abs() < 1e-9);
    }

    #[test]
    fn dwell_records_seconds_and_emits_no_point() {
        let mut parser = GcodeParser::new();
        let parsed = parser.parse_line("G4 P1.5", 1).unwrap();
        assert_eq!(parsed.points.len(), 0);
        assert!((parsed.dwell_seconds - 1.5).abs() < 1e-9);
    }

    #[test]
    fn drill_cycle_emits_points_and_retracts() {
        let mut parser = GcodeParser::new();
        parser.parse_line("G0 Z5", 1).unwrap();
        let parsed = parser.parse_line("G81 X10 Y10 R2 Z-5 F100", 2).unwrap();
        assert!(!parsed.points.is_empty());
        assert!((parser.state.position.z - 2.0).abs() < 1e-9);
    }

    #[test]
    fn arc_endpoint_mismatch_is_rejected() {
        let mut parser = GcodeParser::new();
        parser.parse_line("G0 X10 Y0", 1).unwrap();
        let err = parser.parse_line("G2 X0 Y20 I-10 J0", 2).unwrap_err();
        assert!(matches!(err, GCodeParseError::ArcEndpoint { .. }));
    }

    #[test]
    fn tool_change_commits_selected_tool() {
        let mut parser = GcodeParser::new();
        parser.state.tools.set_offset(3, ToolOffset { x: 0.0, y: 0.0, z: -12.0 });
        parser.parse_line("T3 M6", 1).unwrap();
        assert_eq!(parser.state.tools.active_tool, 3);
    }
}
