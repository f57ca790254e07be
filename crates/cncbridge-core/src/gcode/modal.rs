//! Modal group membership for recognised G-words, used to reject lines that
//! carry two words from the same modal group.

/// The modal groups this dialect enforces "at most one word per line" for.
/// Group numbering follows the informal convention used by most GRBL-family
/// dialects; it is not meaningful outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModalGroup {
    /// G0/G1/G2/G3/G4/G80/G81/G82/G83/G85/G86/G89 — motion words.
    Motion,
    /// G17/G18/G19 — plane selection.
    Plane,
    /// G90/G91 — distance mode.
    Distance,
    /// G20/G21 — units.
    Units,
    /// G54..G59 — active work coordinate system.
    Wcs,
    /// G43/G49 — tool length compensation.
    ToolLengthComp,
    /// G98/G99 — canned-cycle retract plane.
    CannedRetract,
    /// G10 — offset/setting commands; not modal in the usual sense but still
    /// restricted to one per line since it takes the whole line's `X`/`Y`/`Z`/`R`
    /// words as its own parameters.
    Setting,
}

/// Map a numeric G-code to the modal group it belongs to, if this dialect
/// tracks one for it. Unrecognised G-codes return `None`: per the parser's
/// contract they are preserved verbatim for transmission but never alter
/// parser state or participate in conflict detection.
pub fn modal_group_of_gcode(code: u32) -> Option<ModalGroup> {
    match code {
        0 | 1 | 2 | 3 | 4 | 80 | 81 | 82 | 83 | 85 | 86 | 89 => Some(ModalGroup::Motion),
        17 | 18 | 19 => Some(ModalGroup::Plane),
        90 | 91 => Some(ModalGroup::Distance),
        20 | 21 => Some(ModalGroup::Units),
        54..=59 => Some(ModalGroup::Wcs),
        43 | 49 => Some(ModalGroup::ToolLengthComp),
        98 | 99 => Some(ModalGroup::CannedRetract),
        10 => Some(ModalGroup::Setting),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motion_words_share_a_group() {
        assert_eq!(modal_group_of_gcode(0), Some(ModalGroup::Motion));
        assert_eq!(modal_group_of_gcode(2), Some(ModalGroup::Motion));
        assert_eq!(modal_group_of_gcode(81), Some(ModalGroup::Motion));
    }

    #[test]
    fn wcs_words_share_a_group() {
        assert_eq!(modal_group_of_gcode(54), Some(ModalGroup::Wcs));
        assert_eq!(modal_group_of_gcode(59), Some(ModalGroup::Wcs));
    }

    #[test]
    fn unrecognised_code_has_no_group() {
        assert_eq!(modal_group_of_gcode(28), None);
    }
}
