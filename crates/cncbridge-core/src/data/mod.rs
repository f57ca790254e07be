//! Core data types: coordinates, units, bounding box, work coordinate systems,
//! and tool offsets (component E's supporting data model).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Machine coordinate units (millimeters or inches).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Units {
    /// Millimeters (metric); the machine's native unit.
    MM,
    /// Inches (imperial); converted to millimetres on parse.
    INCH,
}

impl Units {
    /// Convert a value from one unit to another.
    pub fn convert(value: f64, from: Units, to: Units) -> f64 {
        if from == to {
            return value;
        }
        match (from, to) {
            (Units::MM, Units::INCH) => value / 25.4,
            (Units::INCH, Units::MM) => value * 25.4,
            _ => value,
        }
    }
}

impl Default for Units {
    fn default() -> Self {
        Units::MM
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Units::MM => write!(f, "mm"),
            Units::INCH => write!(f, "in"),
        }
    }
}

/// A six-axis coordinate: three linear axes, one rotary, and two reserved
/// for future axes, always stored in machine-native millimetres/degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CNCPoint {
    /// X-axis position.
    pub x: f64,
    /// Y-axis position.
    pub y: f64,
    /// Z-axis position.
    pub z: f64,
    /// A-axis (rotary) position, degrees.
    pub a: f64,
    /// B-axis position.
    pub b: f64,
    /// C-axis position.
    pub c: f64,
}

impl CNCPoint {
    /// The origin.
    pub const ZERO: CNCPoint = CNCPoint {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        a: 0.0,
        b: 0.0,
        c: 0.0,
    };

    /// Construct a point from explicit axis values.
    pub fn new(x: f64, y: f64, z: f64, a: f64, b: f64, c: f64) -> Self {
        debug_assert!(
            x.is_finite() && y.is_finite() && z.is_finite() && a.is_finite() && b.is_finite() && c.is_finite(),
            "CNCPoint axes must be finite: x={x}, y={y}, z={z}, a={a}, b={b}, c={c}"
        );
        Self { x, y, z, a, b, c }
    }

    /// Construct a point with only X, Y, Z, A set (the axes this machine's
    /// G-code dialect actually drives); B and C are zero.
    pub fn xyza(x: f64, y: f64, z: f64, a: f64) -> Self {
        Self::new(x, y, z, a, 0.0, 0.0)
    }

    /// Component-wise addition.
    pub fn add(&self, other: &CNCPoint) -> Self {
        Self::new(
            self.x + other.x,
            self.y + other.y,
            self.z + other.z,
            self.a + other.a,
            self.b + other.b,
            self.c + other.c,
        )
    }

    /// Convert every axis from `from` units to `to` units.
    pub fn convert(&self, from: Units, to: Units) -> Self {
        if from == to {
            return *self;
        }
        let scale = match (from, to) {
            (Units::MM, Units::INCH) => 1.0 / 25.4,
            (Units::INCH, Units::MM) => 25.4,
            _ => 1.0,
        };
        Self::new(
            self.x * scale,
            self.y * scale,
            self.z * scale,
            self.a * scale,
            self.b * scale,
            self.c * scale,
        )
    }

    /// Euclidean distance between two points in the XYZ subspace.
    pub fn distance_xyz(&self, other: &CNCPoint) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl Default for CNCPoint {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for CNCPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "X:{:.3} Y:{:.3} Z:{:.3} A:{:.3}",
            self.x, self.y, self.z, self.a
        )
    }
}

/// Legacy three-plus-one axis position, kept for callers that only care
/// about the linear axes and the rotary axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// X-axis position.
    pub x: f64,
    /// Y-axis position.
    pub y: f64,
    /// Z-axis position.
    pub z: f64,
    /// Rotary axis position, if the machine reported one.
    pub a: Option<f64>,
}

impl Position {
    /// Construct a position with the rotary axis absent.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z, a: None }
    }

    /// Construct a position including the rotary axis.
    pub fn with_a(x: f64, y: f64, z: f64, a: f64) -> Self {
        Self { x, y, z, a: Some(a) }
    }

    /// Project a [`CNCPoint`] down to X, Y, Z, A.
    pub fn from_cnc_point(point: &CNCPoint) -> Self {
        Self::with_a(point.x, point.y, point.z, point.a)
    }

    /// Widen back into a full six-axis point with B and C at zero.
    pub fn to_cnc_point(&self) -> CNCPoint {
        CNCPoint::xyza(self.x, self.y, self.z, self.a.unwrap_or(0.0))
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.a {
            Some(a) => write!(f, "X:{:.3} Y:{:.3} Z:{:.3} A:{:.3}", self.x, self.y, self.z, a),
            None => write!(f, "X:{:.3} Y:{:.3} Z:{:.3}", self.x, self.y, self.z),
        }
    }
}

/// Axis-aligned bounding box ("margins") over every point emitted on the
/// current path since the last reset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Per-axis minimum seen so far.
    pub min: CNCPoint,
    /// Per-axis maximum seen so far.
    pub max: CNCPoint,
    /// Whether any point has been folded in yet; an empty box has no
    /// meaningful min/max.
    pub populated: bool,
}

impl BoundingBox {
    /// An empty bounding box, ready to absorb its first point.
    pub fn empty() -> Self {
        Self {
            min: CNCPoint::ZERO,
            max: CNCPoint::ZERO,
            populated: false,
        }
    }

    /// Fold a point into the box, widening min/max as needed.
    pub fn expand(&mut self, p: &CNCPoint) {
        if !self.populated {
            self.min = *p;
            self.max = *p;
            self.populated = true;
            return;
        }
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.min.z = self.min.z.min(p.z);
        self.min.a = self.min.a.min(p.a);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
        self.max.z = self.max.z.max(p.z);
        self.max.a = self.max.a.max(p.a);
    }

    /// Reset to empty.
    pub fn reset(&mut self) {
        *self = Self::empty();
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}

/// One of the six fixed work coordinate systems, G54 through G59.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[repr(u8)]
pub enum WcsSlot {
    /// G54
    G54 = 54,
    /// G55
    G55 = 55,
    /// G56
    G56 = 56,
    /// G57
    G57 = 57,
    /// G58
    G58 = 58,
    /// G59
    G59 = 59,
}

impl WcsSlot {
    /// All six slots, in G-code numeric order.
    pub const ALL: [WcsSlot; 6] = [
        WcsSlot::G54,
        WcsSlot::G55,
        WcsSlot::G56,
        WcsSlot::G57,
        WcsSlot::G58,
        WcsSlot::G59,
    ];

    /// Build a slot from the `G10 L2 P<n>` index (1-based) used on the wire.
    pub fn from_p_index(p: u32) -> Option<Self> {
        match p {
            1 => Some(WcsSlot::G54),
            2 => Some(WcsSlot::G55),
            3 => Some(WcsSlot::G56),
            4 => Some(WcsSlot::G57),
            5 => Some(WcsSlot::G58),
            6 => Some(WcsSlot::G59),
            _ => None,
        }
    }
}

/// The affine transform a work coordinate system applies: an offset from the
/// machine origin, plus an optional planar rotation about Z (a documented
/// extension beyond the plain G10 L2 offset form).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WcsEntry {
    /// Offset from machine zero, in millimetres/degrees.
    pub offset: CNCPoint,
    /// Rotation about the WCS origin in the XY plane, in radians.
    pub rotation_rad: f64,
}

impl Default for WcsEntry {
    fn default() -> Self {
        Self {
            offset: CNCPoint::ZERO,
            rotation_rad: 0.0,
        }
    }
}

/// The fixed `{G54..G59}` mapping plus which one is currently active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WcsTable {
    entries: HashMap<WcsSlot, WcsEntry>,
    active: WcsSlot,
}

impl WcsTable {
    /// Build a table with all six WCS entries at the identity transform and G54 active.
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        for slot in WcsSlot::ALL {
            entries.insert(slot, WcsEntry::default());
        }
        Self {
            entries,
            active: WcsSlot::G54,
        }
    }

    /// The currently active WCS slot.
    pub fn active_slot(&self) -> WcsSlot {
        self.active
    }

    /// The currently active WCS's transform.
    pub fn active(&self) -> WcsEntry {
        self.entries[&self.active]
    }

    /// Select a different WCS as active (`G54`..`G59`).
    pub fn activate(&mut self, slot: WcsSlot) {
        self.active = slot;
    }

    /// Set the offset (and, if given, the rotation) of a WCS slot (`G10 L2 Px`).
    pub fn set_offset(&mut self, slot: WcsSlot, offset: CNCPoint, rotation_rad: Option<f64>) {
        let entry = self.entries.entry(slot).or_insert_with(WcsEntry::default);
        entry.offset = offset;
        if let Some(r) = rotation_rad {
            entry.rotation_rad = r;
        }
    }

    /// Look up a slot's transform without activating it.
    pub fn get(&self, slot: WcsSlot) -> WcsEntry {
        self.entries[&slot]
    }
}

impl Default for WcsTable {
    fn default() -> Self {
        Self::new()
    }
}

/// A single tool's length/XYZ offset, set by `G10 L1`/`G43` style commands
/// in dialects that support it; this library tracks only what component D
/// needs — the Z length offset applied under tool-length compensation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ToolOffset {
    /// X offset.
    pub x: f64,
    /// Y offset.
    pub y: f64,
    /// Z (length) offset; this is the value applied to Z under `G43`.
    pub z: f64,
}

/// The tool-number → offset mapping, plus the currently selected and
/// currently active (post-`M6`) tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ToolTable {
    offsets: HashMap<u32, ToolOffset>,
    /// Tool selected by the last `Tn` word, pending an `M6` to take effect.
    pub selected_tool: Option<u32>,
    /// Tool whose offset is currently applied (after the last `M6`).
    pub active_tool: u32,
    /// Whether tool-length compensation (`G43`) is currently on.
    pub length_compensation: bool,
}

impl ToolTable {
    /// Create an empty tool table; tool 0 has a zero offset by convention.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an offset for a tool number.
    pub fn set_offset(&mut self, tool: u32, offset: ToolOffset) {
        self.offsets.insert(tool, offset);
    }

    /// Look up a tool's offset, defaulting to zero for an unregistered tool.
    pub fn offset(&self, tool: u32) -> ToolOffset {
        self.offsets.get(&tool).copied().unwrap_or_default()
    }

    /// The Z length offset currently in effect, honouring the
    /// length-compensation flag.
    pub fn active_length_offset(&self) -> f64 {
        if self.length_compensation {
            self.offset(self.active_tool).z
        } else {
            0.0
        }
    }

    /// Commit the selected tool as active (`M6`).
    pub fn change_tool(&mut self) {
        if let Some(t) = self.selected_tool {
            self.active_tool = t;
        }
    }
}
