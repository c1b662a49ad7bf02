use serde::{Deserialize, Serialize};

use crate::pos::BlockPos;

/// One of the six axis directions of the block lattice.
///
/// The enumeration order (+x, −x, +y, −y, +z, −z) is the canonical neighbor
/// order used everywhere a position's neighbors are scanned. The order is
/// not observable through the public API, but keeping it fixed makes
/// tie-breaks deterministic within and across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    East,
    West,
    Up,
    Down,
    South,
    North,
}

impl Direction {
    /// All six directions in canonical order.
    pub const ALL: [Direction; 6] = [
        Direction::East,
        Direction::West,
        Direction::Up,
        Direction::Down,
        Direction::South,
        Direction::North,
    ];

    /// The unit offset this direction applies to a position.
    #[inline]
    pub const fn offset(self) -> (i32, i32, i32) {
        match self {
            Direction::East => (1, 0, 0),
            Direction::West => (-1, 0, 0),
            Direction::Up => (0, 1, 0),
            Direction::Down => (0, -1, 0),
            Direction::South => (0, 0, 1),
            Direction::North => (0, 0, -1),
        }
    }

    /// The direction pointing the opposite way.
    #[inline]
    pub const fn opposite(self) -> Direction {
        match self {
            Direction::East => Direction::West,
            Direction::West => Direction::East,
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::South => Direction::North,
            Direction::North => Direction::South,
        }
    }

    /// Offset `pos` one step in this direction.
    #[inline]
    pub fn step(self, pos: BlockPos) -> BlockPos {
        let (dx, dy, dz) = self.offset();
        pos.offset(dx, dy, dz)
    }

    /// The direction from `from` to an adjacent position `to`, if the two
    /// are lattice-adjacent.
    pub fn between(from: BlockPos, to: BlockPos) -> Option<Direction> {
        Direction::ALL.into_iter().find(|d| d.step(from) == to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn six_directions_are_distinct() {
        for (i, a) in Direction::ALL.into_iter().enumerate() {
            for b in Direction::ALL.into_iter().skip(i + 1) {
                assert_ne!(a.offset(), b.offset());
            }
        }
    }

    #[test]
    fn opposite_is_involutive() {
        for d in Direction::ALL {
            assert_eq!(d.opposite().opposite(), d);
            let (dx, dy, dz) = d.offset();
            let (ox, oy, oz) = d.opposite().offset();
            assert_eq!((dx + ox, dy + oy, dz + oz), (0, 0, 0));
        }
    }

    #[test]
    fn step_and_between_agree() {
        let origin = BlockPos::new(3, -2, 7);
        for d in Direction::ALL {
            let stepped = d.step(origin);
            assert_eq!(Direction::between(origin, stepped), Some(d));
        }
        assert_eq!(Direction::between(origin, origin), None);
        assert_eq!(
            Direction::between(origin, BlockPos::new(5, -2, 7)),
            None,
            "two steps away is not adjacent"
        );
    }
}
