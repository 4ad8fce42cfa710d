//! Bringing an arbitrary cube into the orientation the search works in.
//!
//! The restricted move set never touches the down-back-left corner, so before
//! searching, the whole cube has to be rotated until that corner is solved.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::{Cube, Rotation};

/// The slots of the down-back-left corner's stickers (L, B and D faces).
pub const ANCHOR_SLOTS: [usize; 3] = [6, 19, 22];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no orientation of this cube has facelets 6, 19 and 22 in their solved slots")]
pub struct UnnormalizableState;

/// Returns whether the anchor corner is in its solved position.
pub fn is_normalized(cube: &Cube) -> bool {
    ANCHOR_SLOTS
        .iter()
        .all(|&slot| usize::from(cube.facelets()[slot]) == slot)
}

/// Finds the shortest sequence of whole-cube rotations which puts the anchor
/// corner in its solved position, and returns the rotated cube along with it.
///
/// Ties are broken by the order of `Rotation::ALL`. An already-normalized cube
/// is returned unchanged with no rotations.
pub fn normalize(cube: Cube) -> Result<(Cube, Vec<Rotation>), UnnormalizableState> {
    if is_normalized(&cube) {
        return Ok((cube, Vec::new()));
    }

    // There are only 24 orientations, so this exhausts quickly if the corner isn't
    // a real corner.
    let mut queue = VecDeque::from([(cube, Vec::new())]);
    let mut visited = FxHashSet::default();
    visited.insert(cube);
    while let Some((current, path)) = queue.pop_front() {
        for rotation in Rotation::ALL {
            let next = current.rotate(rotation);
            if !visited.insert(next) {
                continue;
            }
            let mut next_path = path.clone();
            next_path.push(rotation);
            if is_normalized(&next) {
                return Ok((next, next_path));
            }
            queue.push_back((next, next_path));
        }
    }

    Err(UnnormalizableState)
}

#[cfg(test)]
mod tests {
    use crate::{parse_moves, Cube, Move, Rotation};

    use super::{is_normalized, normalize, UnnormalizableState};

    #[test]
    fn already_normalized() {
        let cube = Cube::SOLVED.apply_all(parse_moves("R U R' F U F' U' R' F R' U F U'").unwrap());
        assert!(is_normalized(&cube));
        assert_eq!(normalize(cube), Ok((cube, vec![])));
        assert_eq!(normalize(Cube::SOLVED), Ok((Cube::SOLVED, vec![])));
    }

    #[test]
    fn rotated_solved() {
        // x^4 is the identity, so the shortest way back from x is x x x.
        let rotated = Cube::SOLVED.rotate(Rotation::X);
        assert_eq!(
            normalize(rotated),
            Ok((Cube::SOLVED, vec![Rotation::X, Rotation::X, Rotation::X]))
        );
        let rotated = Cube::SOLVED.rotate(Rotation::Y);
        assert_eq!(
            normalize(rotated),
            Ok((Cube::SOLVED, vec![Rotation::Y, Rotation::Y, Rotation::Y]))
        );
    }

    #[test]
    fn left_turn_becomes_right_turn() {
        // Turning L is the same as turning R and then rotating the whole cube.
        let left: Move = "L".parse().unwrap();
        let right: Move = "R".parse().unwrap();
        assert_eq!(
            normalize(Cube::SOLVED.apply(left)),
            Ok((Cube::SOLVED.apply(right), vec![Rotation::X]))
        );
    }

    #[test]
    fn every_orientation_normalizes() {
        let cube = Cube::SOLVED.apply_all(parse_moves("R U F' U R'").unwrap());
        for rotations in [
            vec![],
            vec![Rotation::X],
            vec![Rotation::Y, Rotation::X],
            vec![Rotation::X, Rotation::X, Rotation::Y],
            vec![Rotation::Y, Rotation::Y, Rotation::Y, Rotation::X],
        ] {
            let rotated = rotations
                .iter()
                .fold(cube, |cube, &rotation| cube.rotate(rotation));
            let (normalized, path) = normalize(rotated).unwrap();
            // Only one orientation has the anchor corner in place.
            assert_eq!(normalized, cube);
            assert_eq!(
                path.iter()
                    .fold(rotated, |cube, &rotation| cube.rotate(rotation)),
                normalized
            );
        }
    }

    #[test]
    fn broken_corner() {
        // Swapping two stickers of different corners leaves no orientation where the
        // anchor corner is whole.
        let mut facelets = *Cube::SOLVED.facelets();
        facelets.swap(4, 6);
        let cube = Cube::from_facelets(facelets).unwrap();
        assert_eq!(normalize(cube), Err(UnnormalizableState));
    }
}
