//! Field sets - which columns of an element a request touches
//!
//! Every projection, insert, update and decode is driven by one of these
//! sets rather than by a hardcoded column list, which keeps the Query
//! Builder and the Row Materializer in lockstep.

bitflags::bitflags! {
    /// Columns of the `node` table
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NodeFields: u8 {
        const NODE_ID = 0b0000_0001;
        const CONTAINING_FACE = 0b0000_0010;
        const GEOM = 0b0000_0100;
    }
}

bitflags::bitflags! {
    /// Columns of the `edge_data` table
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EdgeFields: u8 {
        const EDGE_ID = 0b0000_0001;
        const START_NODE = 0b0000_0010;
        const END_NODE = 0b0000_0100;
        const FACE_LEFT = 0b0000_1000;
        const FACE_RIGHT = 0b0001_0000;
        const NEXT_LEFT = 0b0010_0000;
        const NEXT_RIGHT = 0b0100_0000;
        const GEOM = 0b1000_0000;
    }
}

bitflags::bitflags! {
    /// Columns of the `face` table
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FaceFields: u8 {
        const FACE_ID = 0b0000_0001;
        const MBR = 0b0000_0010;
    }
}

/// How the signed next-edge columns are rendered.
///
/// `edge_data` keeps unsigned shadow copies of `next_left_edge` and
/// `next_right_edge` (`abs_next_left_edge`, `abs_next_right_edge`) for
/// indexing. Writers that set or match the signed columns must keep the
/// shadows consistent, readers never need them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdgeDataMode {
    /// Signed next-edge columns only
    #[default]
    Plain,
    /// Signed next-edge columns each followed by their absolute shadow
    Full,
}

impl EdgeDataMode {
    pub fn includes_shadows(self) -> bool {
        matches!(self, EdgeDataMode::Full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_covers_every_flag() {
        assert_eq!(NodeFields::all().bits().count_ones(), 3);
        assert_eq!(EdgeFields::all().bits().count_ones(), 8);
        assert_eq!(FaceFields::all().bits().count_ones(), 2);
    }

    #[test]
    fn test_combinations() {
        let fields = EdgeFields::EDGE_ID | EdgeFields::GEOM;
        assert!(fields.contains(EdgeFields::GEOM));
        assert!(!fields.contains(EdgeFields::NEXT_LEFT));
        assert!(EdgeFields::empty().is_empty());
    }
}
