//! Joining a forward path and a database chain into a full solution.

use std::fmt::{self, Display, Formatter};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{format_moves, Cube, Database, Move, Rotation};

/// Returns the moves which take `meeting` back to solved, found by walking its
/// chain of parents in `database` and undoing each move.
///
/// Returns `None` if `meeting` isn't in the database.
pub fn path_to_solved(database: &Database, meeting: &Cube) -> Option<Vec<Move>> {
    let mut entry = database.get(meeting)?;
    let mut path = Vec::with_capacity(entry.depth.into());
    while let Some(link) = entry.link {
        path.push(link.turn.inverse());
        // The loader checks that every parent is present, so this can't fail for a
        // database that made it into memory.
        entry = database.get(&link.parent)?;
    }
    Some(path)
}

/// Returns `forward` followed by the way back to solved from `meeting`, where
/// `meeting` is the state `forward` leads to.
pub fn reconstruct(database: &Database, meeting: &Cube, forward: &[Move]) -> Option<Vec<Move>> {
    let back = path_to_solved(database, meeting)?;
    let mut solution = Vec::with_capacity(forward.len() + back.len());
    solution.extend_from_slice(forward);
    solution.extend(back);
    Some(solution)
}

/// A complete answer for the state that was asked about: first rotate the whole
/// cube, then turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    pub rotations: Vec<Rotation>,
    pub moves: Vec<Move>,
}

impl Solution {
    /// Applies this solution to `cube`.
    pub fn apply_to(&self, cube: Cube) -> Cube {
        self.rotations
            .iter()
            .fold(cube, |cube, &rotation| cube.rotate(rotation))
            .apply_all(self.moves.iter().copied())
    }
}

impl Display for Solution {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if !self.rotations.is_empty() {
            writeln!(
                f,
                "First rotate the whole cube: {}",
                self.rotations.iter().join(" ")
            )?;
        }
        write!(f, "Solution ({} moves): {}", self.moves.len(), format_moves(&self.moves))
    }
}
