//! CNC machine state (component E): position, modal groups, feed/spindle,
//! work coordinate systems, tool offsets, and the bounding box of the
//! current path.
//!
//! This is a pure data object. The [`crate::gcode`] parser is the only
//! writer during a parse call (it is lent a `&mut CncState` for the
//! duration); external callers may otherwise only call [`CncState::init_path`]
//! / [`CncState::reset_margins`] or observe fields directly.

use crate::data::{BoundingBox, CNCPoint, ToolTable, Units, WcsSlot, WcsTable};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The motion modal group: which of the mutually-exclusive motion words
/// (`G0`/`G1`/`G2`/`G3`/`G4`/canned cycles) is currently active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionMode {
    /// `G0` rapid positioning.
    Rapid,
    /// `G1` linear feed.
    Linear,
    /// `G2` clockwise arc.
    CwArc,
    /// `G3` counter-clockwise arc.
    CcwArc,
    /// `G4` dwell (emits no coordinates).
    Dwell,
    /// One of the canned cycles (`G81`/`G82`/`G83`/`G85`/`G86`/`G89`).
    CannedCycle,
}

impl fmt::Display for MotionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotionMode::Rapid => write!(f, "G0"),
            MotionMode::Linear => write!(f, "G1"),
            MotionMode::CwArc => write!(f, "G2"),
            MotionMode::CcwArc => write!(f, "G3"),
            MotionMode::Dwell => write!(f, "G4"),
            MotionMode::CannedCycle => write!(f, "canned-cycle"),
        }
    }
}

/// The active plane for arcs and canned cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Plane {
    /// `G17`, the default.
    XY,
    /// `G18`.
    XZ,
    /// `G19`.
    YZ,
}

impl Default for Plane {
    fn default() -> Self {
        Plane::XY
    }
}

/// Absolute (`G90`) or relative/incremental (`G91`) distance mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMode {
    /// `G90`: coordinates are absolute work-coordinate positions.
    Absolute,
    /// `G91`: coordinates are deltas from the previous work position.
    Relative,
}

impl Default for DistanceMode {
    fn default() -> Self {
        DistanceMode::Absolute
    }
}

/// One point emitted into the path buffer by a parsed motion line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathPoint {
    /// Machine-coordinate X.
    pub x: f64,
    /// Machine-coordinate Y.
    pub y: f64,
    /// Machine-coordinate Z.
    pub z: f64,
    /// Machine-coordinate A (rotary).
    pub a: f64,
    /// Source line number that produced this point.
    pub line_no: u32,
    /// Which motion word produced this point.
    pub motion_kind: MotionMode,
}

impl PathPoint {
    /// The point's XYZA coordinates as a [`CNCPoint`] (B and C are zero).
    pub fn as_cnc_point(&self) -> CNCPoint {
        CNCPoint::xyza(self.x, self.y, self.z, self.a)
    }
}

/// A batch of modal-group changes produced by a single parsed line, applied
/// to [`CncState`] atomically via [`CncState::apply_modal_delta`].
///
/// Every field is `Option`; `None` means "this line did not touch this
/// modal group".
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ModalDelta {
    /// New motion mode, if the line carried a motion word.
    pub motion_mode: Option<MotionMode>,
    /// New plane selection (`G17`/`G18`/`G19`).
    pub plane: Option<Plane>,
    /// New units (`G20`/`G21`).
    pub units: Option<Units>,
    /// New distance mode (`G90`/`G91`).
    pub distance_mode: Option<DistanceMode>,
    /// New active WCS (`G54`..`G59`).
    pub wcs_slot: Option<WcsSlot>,
    /// New feed rate (`Fn` on a line that sets it).
    pub feed_rate: Option<f64>,
    /// New spindle speed (`Sn`).
    pub spindle_rpm: Option<f64>,
    /// New tool-length-compensation flag (`G43`/`G49`).
    pub length_compensation: Option<bool>,
}

/// The full machine state: position, modal groups, feed/spindle, WCS table,
/// tool table, bounding box, and the path buffer from the last parse call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CncState {
    /// Last known commanded machine-coordinate position.
    pub position: CNCPoint,
    /// Active motion modal group.
    pub motion_mode: MotionMode,
    /// Active plane.
    pub plane: Plane,
    /// Active units; inch-mode input is converted to millimetres on parse.
    pub units: Units,
    /// Active distance mode.
    pub distance_mode: DistanceMode,
    /// Current feed rate, mm/min.
    pub feed_rate: f64,
    /// Current rapid/seek rate, mm/min.
    pub seek_rate: f64,
    /// Current spindle speed, RPM.
    pub spindle_rpm: f64,
    /// Feed override percentage, 1-300.
    pub feed_override_pct: u16,
    /// Spindle override percentage, 1-200.
    pub spindle_override_pct: u16,
    /// The `{G54..G59}` work coordinate systems.
    pub wcs: WcsTable,
    /// Tool number → offset mapping, plus selected/active tool.
    pub tools: ToolTable,
    /// Bounding box of every point emitted since the last [`CncState::reset_margins`].
    margins: BoundingBox,
    /// Coordinate sequence produced by the *last* parsed line; reset at the
    /// start of every `parse_line` call.
    pub path: Vec<PathPoint>,
}

impl CncState {
    /// A freshly initialised state: machine origin, G54 active, absolute mm, XY plane.
    pub fn new() -> Self {
        Self {
            position: CNCPoint::ZERO,
            motion_mode: MotionMode::Rapid,
            plane: Plane::default(),
            units: Units::default(),
            distance_mode: DistanceMode::default(),
            feed_rate: 0.0,
            seek_rate: 0.0,
            spindle_rpm: 0.0,
            feed_override_pct: 100,
            spindle_override_pct: 100,
            wcs: WcsTable::new(),
            tools: ToolTable::new(),
            margins: BoundingBox::empty(),
            path: Vec::new(),
        }
    }

    /// Re-seat the current position and clear the path buffer, marking a new
    /// job boundary. Does not touch the bounding box; call
    /// [`CncState::reset_margins`] separately if a fresh box is also wanted.
    pub fn init_path(&mut self, x: f64, y: f64, z: f64, a: f64) {
        self.position = CNCPoint::xyza(x, y, z, a);
        self.path.clear();
    }

    /// Clear the bounding box back to empty.
    pub fn reset_margins(&mut self) {
        self.margins.reset();
    }

    /// The bounding box of every point emitted since the last reset.
    pub fn get_margins(&self) -> BoundingBox {
        self.margins
    }

    /// Apply a batch of modal-group changes produced by one parsed line.
    pub fn apply_modal_delta(&mut self, delta: &ModalDelta) {
        if let Some(m) = delta.motion_mode {
            self.motion_mode = m;
        }
        if let Some(p) = delta.plane {
            self.plane = p;
        }
        if let Some(u) = delta.units {
            self.units = u;
        }
        if let Some(d) = delta.distance_mode {
            self.distance_mode = d;
        }
        if let Some(w) = delta.wcs_slot {
            self.wcs.activate(w);
        }
        if let Some(f) = delta.feed_rate {
            self.feed_rate = f;
        }
        if let Some(s) = delta.spindle_rpm {
            self.spindle_rpm = s;
        }
        if let Some(c) = delta.length_compensation {
            self.tools.length_compensation = c;
        }
    }

    /// Start a fresh path buffer for the line about to be parsed. Called by
    /// the parser at the top of `parse_line`, not part of the public
    /// external-caller surface.
    pub(crate) fn begin_line(&mut self) {
        self.path.clear();
    }

    /// Emit one point into the path buffer and the bounding box, and update
    /// the last-known position. Called by the parser for every interpolated
    /// machine-coordinate point.
    pub(crate) fn emit_point(&mut self, p: CNCPoint, line_no: u32, motion_kind: MotionMode) {
        self.path.push(PathPoint {
            x: p.x,
            y: p.y,
            z: p.z,
            a: p.a,
            line_no,
            motion_kind,
        });
        self.margins.expand(&p);
        self.position = p;
    }
}

impl Default for CncState {
    fn default() -> Self {
        Self::new()
    }
}
