//! Small stand-alone helpers (component G) shared by callers that want to
//! sanity-check or massage raw G-code text without going through the full
//! parser.

use std::collections::HashMap;

use crate::data::CNCPoint;

/// Cheaply check whether a line is plausibly a G-code line: non-empty once
/// comments are stripped, and containing at least one recognised word
/// letter. This is a quick filter for UI input boxes and file pre-scans, not
/// a substitute for [`crate::gcode::GcodeParser::parse_line`].
pub fn validate_gcode_line(line: &str) -> bool {
    crate::gcode::token::tokenize(line, 1)
        .map(|words| !words.is_empty())
        .unwrap_or(false)
}

/// Parse the axis words (`X`/`Y`/`Z`/`A`) out of a line into a map, ignoring
/// everything else and tolerating lines that wouldn't otherwise tokenise
/// cleanly as G-code (best-effort, for display/status strings).
pub fn parse_coordinate_string(s: &str) -> HashMap<char, f64> {
    let mut out = HashMap::new();
    if let Ok(words) = crate::gcode::token::tokenize(s, 1) {
        for w in words {
            if matches!(w.letter, 'X' | 'Y' | 'Z' | 'A') {
                out.insert(w.letter, w.value);
            }
        }
    }
    out
}

/// Euclidean distance between two points in the XYZ subspace.
pub fn distance(a: &CNCPoint, b: &CNCPoint) -> f64 {
    a.distance_xyz(b)
}

/// The midpoint of two points across all six axes.
pub fn midpoint(a: &CNCPoint, b: &CNCPoint) -> CNCPoint {
    CNCPoint::new(
        (a.x + b.x) / 2.0,
        (a.y + b.y) / 2.0,
        (a.z + b.z) / 2.0,
        (a.a + b.a) / 2.0,
        (a.b + b.b) / 2.0,
        (a.c + b.c) / 2.0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_plain_move() {
        assert!(validate_gcode_line("G1 X10 Y20 F500"));
    }

    #[test]
    fn rejects_unrecognised_letter() {
        assert!(!validate_gcode_line("W1 X2"));
    }

    #[test]
    fn rejects_empty_after_comment_strip() {
        assert!(!validate_gcode_line("; just a comment"));
    }

    #[test]
    fn extracts_axis_words_only() {
        let coords = parse_coordinate_string("G1 X1.5 Y-2 F100");
        assert_eq!(coords.len(), 2);
        assert_eq!(coords[&'X'], 1.5);
        assert_eq!(coords[&'Y'], -2.0);
    }

    #[test]
    fn distance_and_midpoint_match_expectations() {
        let a = CNCPoint::xyza(0.0, 0.0, 0.0, 0.0);
        let b = CNCPoint::xyza(3.0, 4.0, 0.0, 0.0);
        assert!((distance(&a, &b) - 5.0).abs() < 1e-9);
        let m = midpoint(&a, &b);
        assert!((m.x - 1.5).abs() < 1e-9);
        assert!((m.y - 2.0).abs() < 1e-9);
    }
}
