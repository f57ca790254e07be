//! Arc centre resolution and chord-error-bounded discretisation for `G2`/`G3`.

use crate::data::CNCPoint;
use crate::error::GCodeParseError;
use crate::state::Plane;

/// Minimum allowed discretisation density, segments per full revolution.
const MIN_SEGMENTS_PER_REV: u32 = 8;
/// Maximum allowed discretisation density, segments per full revolution.
const MAX_SEGMENTS_PER_REV: u32 = 2048;
/// Maximum allowed deviation between a chord and the true arc, millimetres.
const MAX_CHORD_ERROR_MM: f64 = 0.025;
/// Endpoint verification tolerance, millimetres (1.0um).
const ENDPOINT_TOLERANCE_MM: f64 = 0.001;

/// The two in-plane axes a [`Plane`] selects, in `(first, second)` order
/// matching the `I`/`J`/`K` word each plane reads its offsets from.
fn plane_axes(plane: Plane, p: &CNCPoint) -> (f64, f64) {
    match plane {
        Plane::XY => (p.x, p.y),
        Plane::XZ => (p.x, p.z),
        Plane::YZ => (p.y, p.z),
    }
}

fn with_plane_axes(plane: Plane, base: &CNCPoint, first: f64, second: f64) -> CNCPoint {
    let mut out = *base;
    match plane {
        Plane::XY => {
            out.x = first;
            out.y = second;
        }
        Plane::XZ => {
            out.x = first;
            out.z = second;
        }
        Plane::YZ => {
            out.y = first;
            out.z = second;
        }
    }
    out
}

/// Resolve an arc's centre, in the plane's two in-plane coordinates, from an
/// `I`/`J`/`K` offset pair given relative to the start point.
pub fn center_from_offset(start_first: f64, start_second: f64, i: f64, j: f64) -> (f64, f64) {
    (start_first + i, start_second + j)
}

/// Resolve an arc's centre from a signed radius word (`R`), following the
/// standard two-point/radius construction: `R > 0` selects the minor
/// (<=180 degree) arc, `R < 0` the major (>180 degree) arc.
pub fn center_from_radius(
    start_first: f64,
    start_second: f64,
    end_first: f64,
    end_second: f64,
    r: f64,
    clockwise: bool,
    line_no: u32,
) -> Result<(f64, f64), GCodeParseError> {
    let x = end_first - start_first;
    let y = end_second - start_second;
    let chord_sq = x * x + y * y;
    let mut h_div_d = 4.0 * r * r - chord_sq;
    if h_div_d < 0.0 {
        return Err(GCodeParseError::InvalidParameter {
            line_no,
            param: "R".to_string(),
            reason: "radius is too small to reach the endpoint".to_string(),
        });
    }
    h_div_d = -h_div_d.sqrt() / chord_sq.sqrt();
    if !clockwise {
        h_div_d = -h_div_d;
    }
    if r < 0.0 {
        h_div_d = -h_div_d;
    }
    let cx = start_first + 0.5 * (x - y * h_div_d);
    let cy = start_second + 0.5 * (y + x * h_div_d);
    Ok((cx, cy))
}

/// One discretised segment of an arc move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArcSegment {
    /// The machine-coordinate endpoint of this segment.
    pub point: CNCPoint,
}

/// Discretise a `G2`/`G3` arc into line segments whose chord error never
/// exceeds [`MAX_CHORD_ERROR_MM`], using between [`MIN_SEGMENTS_PER_REV`] and
/// [`MAX_SEGMENTS_PER_REV`] segments per full revolution.
///
/// `start` and `end` are full six-axis points; only the two axes `plane`
/// selects are interpolated along the circle, the remaining axes (including
/// the plane's own depth axis, for helical motion) are interpolated linearly
/// across the same parameter so a helix comes out for free.
pub fn discretize_arc(
    start: CNCPoint,
    end: CNCPoint,
    center_first: f64,
    center_second: f64,
    plane: Plane,
    clockwise: bool,
    line_no: u32,
) -> Result<Vec<ArcSegment>, GCodeParseError> {
    let (sf, ss) = plane_axes(plane, &start);
    let (ef, es) = plane_axes(plane, &end);

    let radius = ((sf - center_first).powi(2) + (ss - center_second).powi(2)).sqrt();
    if radius < f64::EPSILON {
        return Err(GCodeParseError::InvalidParameter {
            line_no,
            param: "I/J/K".to_string(),
            reason: "arc radius is zero".to_string(),
        });
    }

    let end_radius = ((ef - center_first).powi(2) + (es - center_second).powi(2)).sqrt();
    if (end_radius - radius).abs() * 1000.0 > ENDPOINT_TOLERANCE_MM * 1000.0 {
        return Err(GCodeParseError::ArcEndpoint {
            line_no,
            error_um: (end_radius - radius).abs() * 1000.0,
        });
    }

    let start_angle = (ss - center_second).atan2(sf - center_first);
    let end_angle = (es - center_second).atan2(ef - center_first);

    let full_circle = (sf - ef).abs() < 1e-9 && (ss - es).abs() < 1e-9;
    let two_pi = std::f64::consts::TAU;

    let mut sweep = if clockwise {
        start_angle - end_angle
    } else {
        end_angle - start_angle
    };
    if full_circle {
        sweep = two_pi;
    } else {
        while sweep <= 0.0 {
            sweep += two_pi;
        }
    }

    let max_theta = 2.0 * (1.0 - (MAX_CHORD_ERROR_MM / radius).min(1.0)).acos();
    let segments_per_rev = if max_theta.is_finite() && max_theta > 0.0 {
        (two_pi / max_theta).ceil() as u32
    } else {
        MAX_SEGMENTS_PER_REV
    };
    let segments_per_rev = segments_per_rev.clamp(MIN_SEGMENTS_PER_REV, MAX_SEGMENTS_PER_REV);

    let mut segment_count = ((segments_per_rev as f64) * sweep / two_pi).ceil() as u32;
    if segment_count < 1 {
        segment_count = 1;
    }

    let mut out = Vec::with_capacity(segment_count as usize);
    for step in 1..=segment_count {
        let t = step as f64 / segment_count as f64;
        let angle = if clockwise {
            start_angle - sweep * t
        } else {
            start_angle + sweep * t
        };
        let (first, second) = if step == segment_count {
            (ef, es)
        } else {
            (
                center_first + radius * angle.cos(),
                center_second + radius * angle.sin(),
            )
        };
        let mut point = with_plane_axes(plane, &start, first, second);
        point.a = start.a + (end.a - start.a) * t;
        point.b = start.b + (end.b - start.b) * t;
        point.c = start.c + (end.c - start.c) * t;
        // interpolate whichever axis the plane does *not* carry as an in-plane
        // coordinate (the helical/depth axis).
        match plane {
            Plane::XY => point.z = start.z + (end.z - start.z) * t,
            Plane::XZ => point.y = start.y + (end.y - start.y) * t,
            Plane::YZ => point.x = start.x + (end.x - start.x) * t,
        }
        out.push(ArcSegment { point });
    }

    if let Some(last) = out.last() {
        let deviation = last.point.distance_xyz(&end) * 1000.0;
        if deviation > ENDPOINT_TOLERANCE_MM * 1000.0 {
            return Err(GCodeParseError::ArcEndpoint {
                line_no,
                error_um: deviation,
            });
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quarter_circle_from_offset_reaches_endpoint() {
        let start = CNCPoint::xyza(10.0, 0.0, 0.0, 0.0);
        let end = CNCPoint::xyza(0.0, 10.0, 0.0, 0.0);
        let (cx, cy) = center_from_offset(10.0, 0.0, -10.0, 0.0);
        assert!((cx - 0.0).abs() < 1e-9);
        assert!((cy - 0.0).abs() < 1e-9);
        let segments = discretize_arc(start, end, cx, cy, Plane::XY, false, 1).unwrap();
        let last = segments.last().unwrap();
        assert!((last.point.x - 0.0).abs() < 1e-6);
        assert!((last.point.y - 10.0).abs() < 1e-6);
    }

    #[test]
    fn full_circle_returns_to_start() {
        let start = CNCPoint::xyza(10.0, 0.0, 0.0, 0.0);
        let end = start;
        let segments = discretize_arc(start, end, 0.0, 0.0, Plane::XY, true, 1).unwrap();
        assert!(segments.len() >= MIN_SEGMENTS_PER_REV as usize);
        let last = segments.last().unwrap();
        assert!((last.point.x - 10.0).abs() < 1e-6);
        assert!((last.point.y - 0.0).abs() < 1e-6);
    }

    #[test]
    fn chord_error_stays_within_bound() {
        let radius = 50.0;
        let start = CNCPoint::xyza(radius, 0.0, 0.0, 0.0);
        let end = CNCPoint::xyza(-radius, 0.0, 0.0, 0.0);
        let segments = discretize_arc(start, end, 0.0, 0.0, Plane::XY, false, 1).unwrap();
        let mut prev = start;
        for seg in &segments {
            let chord = prev.distance_xyz(&seg.point);
            let half_angle = (chord / (2.0 * radius)).asin();
            let error = radius * (1.0 - half_angle.cos());
            assert!(error <= MAX_CHORD_ERROR_MM + 1e-9, "chord error {error} exceeded bound");
            prev = seg.point;
        }
    }

    #[test]
    fn mismatched_radius_is_rejected() {
        let start = CNCPoint::xyza(10.0, 0.0, 0.0, 0.0);
        let end = CNCPoint::xyza(0.0, 20.0, 0.0, 0.0);
        let err = discretize_arc(start, end, 0.0, 0.0, Plane::XY, false, 7).unwrap_err();
        assert!(matches!(err, GCodeParseError::ArcEndpoint { line_no: 7, .. }));
    }

    #[test]
    fn radius_form_matches_offset_form() {
        let start = CNCPoint::xyza(10.0, 0.0, 0.0, 0.0);
        let end = CNCPoint::xyza(0.0, 10.0, 0.0, 0.0);
        let (cx, cy) = center_from_radius(10.0, 0.0, 0.0, 10.0, 10.0, false, 1).unwrap();
        assert!((cx - 0.0).abs() < 1e-6, "cx={cx}");
        assert!((cy - 0.0).abs() < 1e-6, "cy={cy}");
        let _ = (start, end);
    }

    proptest::proptest! {
        /// Every chord the discretiser produces, for any start angle, radius,
        /// and sweep direction, must stay within `MAX_CHORD_ERROR_MM`. This
        /// is the same invariant `chord_error_stays_within_bound` checks for
        /// one fixed case; this sweep checks it across the input space.
        #[test]
        fn chord_error_bound_holds_for_any_start_angle_and_radius(
            start_angle_deg in 0.0f64..360.0,
            sweep_deg in 1.0f64..359.0,
            radius in 0.5f64..500.0,
            clockwise in proptest::bool::ANY,
        ) {
            let start_angle = start_angle_deg.to_radians();
            let sweep = sweep_deg.to_radians();
            let end_angle = if clockwise {
                start_angle - sweep
            } else {
                start_angle + sweep
            };

            let start = CNCPoint::xyza(radius * start_angle.cos(), radius * start_angle.sin(), 0.0, 0.0);
            let end = CNCPoint::xyza(radius * end_angle.cos(), radius * end_angle.sin(), 0.0, 0.0);

            let segments = discretize_arc(start, end, 0.0, 0.0, Plane::XY, clockwise, 1).unwrap();

            let mut prev = start;
            for seg in &segments {
                let chord = prev.distance_xyz(&seg.point);
                let half_angle = (chord / (2.0 * radius)).clamp(-1.0, 1.0).asin();
                let error = radius * (1.0 - half_angle.cos());
                proptest::prop_assert!(
                    error <= MAX_CHORD_ERROR_MM + 1e-6,
                    "chord error {} exceeded bound at radius {}",
                    error,
                    radius
                );
                prev = seg.point;
            }
        }
    }
}
