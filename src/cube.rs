//! Types for dealing with the state of a 2x2x2 cube and the moves which act on
//! it.
//!
//! The 24 facelet slots are laid out like this:
//!
//! ```text
//!       00 01
//!       02 03
//! 04 05 08 09 12 13 16 17
//! 06 07 10 11 14 15 18 19
//!       20 21
//!       22 23
//! ```
//!
//! which gives the faces in the order U, L, F, R, B, D.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use arbitrary::Arbitrary;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The number of facelet slots on the cube.
pub const FACELETS: usize = 24;

/// A permutation of facelet slots: `new[i] = old[perm[i]]`.
pub type Perm = [u8; FACELETS];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CubeError {
    #[error("unknown move `{0}`")]
    UnknownMove(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("a move set must contain at least one face")]
    EmptyMoveSet,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Arbitrary,
)]
pub enum Face {
    U,
    D,
    L,
    R,
    F,
    B,
}

use Face::*;

impl Face {
    /// All the faces, in move table order.
    pub const ALL: [Face; 6] = [U, D, L, R, F, B];

    pub fn letter(self) -> char {
        match self {
            U => 'U',
            D => 'D',
            L => 'L',
            R => 'R',
            F => 'F',
            B => 'B',
        }
    }

    pub fn from_letter(letter: char) -> Option<Face> {
        Face::ALL.into_iter().find(|face| face.letter() == letter)
    }
}

/// The clockwise quarter turn of each face, in the order of `Face::ALL`.
const BASE_TURNS: [Perm; 6] = [
    // U
    [
        2, 0, 3, 1, 8, 9, 6, 7, 12, 13, 10, 11, 16, 17, 14, 15, 4, 5, 18, 19, 20, 21, 22, 23,
    ],
    // D
    [
        0, 1, 2, 3, 4, 5, 18, 19, 8, 9, 6, 7, 12, 13, 10, 11, 16, 17, 14, 15, 22, 20, 23, 21,
    ],
    // L
    [
        19, 1, 17, 3, 6, 4, 7, 5, 0, 9, 2, 11, 12, 13, 14, 15, 16, 22, 18, 20, 8, 21, 10, 23,
    ],
    // R
    [
        0, 9, 2, 11, 4, 5, 6, 7, 8, 21, 10, 23, 14, 12, 15, 13, 3, 17, 1, 19, 20, 18, 22, 16,
    ],
    // F
    [
        0, 1, 7, 5, 4, 20, 6, 21, 10, 8, 11, 9, 2, 13, 3, 15, 16, 17, 18, 19, 14, 12, 22, 23,
    ],
    // B
    [
        13, 15, 2, 3, 1, 5, 0, 7, 8, 9, 10, 11, 12, 23, 14, 22, 18, 16, 19, 17, 20, 21, 4, 6,
    ],
];

const fn identity() -> Perm {
    let mut perm = [0; FACELETS];
    let mut i = 0;
    while i < FACELETS {
        perm[i] = i as u8;
        i += 1;
    }
    perm
}

/// Returns the permutation which applies `first` and then `second`.
const fn compose(first: &Perm, second: &Perm) -> Perm {
    let mut perm = [0; FACELETS];
    let mut i = 0;
    while i < FACELETS {
        perm[i] = first[second[i] as usize];
        i += 1;
    }
    perm
}

const fn is_identity(perm: &Perm) -> bool {
    let mut i = 0;
    while i < FACELETS {
        if perm[i] as usize != i {
            return false;
        }
        i += 1;
    }
    true
}

const fn is_permutation(perm: &Perm) -> bool {
    let mut seen = [false; FACELETS];
    let mut i = 0;
    while i < FACELETS {
        let value = perm[i] as usize;
        if value >= FACELETS || seen[value] {
            return false;
        }
        seen[value] = true;
        i += 1;
    }
    true
}

/// Builds the full quarter turn table: each base turn followed by its inverse,
/// which is the base turn applied three times.
///
/// This runs at compile time, so a base turn which isn't a permutation of order
/// 4 fails the build.
const fn build_move_table() -> [Perm; 12] {
    let mut table = [identity(); 12];
    let mut face = 0;
    while face < BASE_TURNS.len() {
        let base = &BASE_TURNS[face];
        assert!(is_permutation(base), "face turn is not a permutation");
        let prime = compose(&compose(base, base), base);
        assert!(
            is_identity(&compose(&prime, base)),
            "face turn is not of order 4"
        );
        table[2 * face] = *base;
        table[2 * face + 1] = prime;
        face += 1;
    }
    table
}

static MOVE_TABLE: [Perm; 12] = build_move_table();

/// A quarter turn of one face: clockwise, or counter-clockwise if `prime` is
/// set.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Arbitrary,
)]
pub struct Move {
    pub face: Face,
    pub prime: bool,
}

impl Move {
    /// Every move, in move table order.
    pub const ALL: [Move; 12] = [
        Move::new(U, false),
        Move::new(U, true),
        Move::new(D, false),
        Move::new(D, true),
        Move::new(L, false),
        Move::new(L, true),
        Move::new(R, false),
        Move::new(R, true),
        Move::new(F, false),
        Move::new(F, true),
        Move::new(B, false),
        Move::new(B, true),
    ];

    pub const fn new(face: Face, prime: bool) -> Self {
        Self { face, prime }
    }

    /// Returns the move which undoes this one.
    pub fn inverse(self) -> Self {
        Self {
            face: self.face,
            prime: !self.prime,
        }
    }

    /// Returns the facelet permutation this move applies.
    pub fn perm(self) -> &'static Perm {
        &MOVE_TABLE[2 * self.face as usize + usize::from(self.prime)]
    }
}

impl FromStr for Move {
    type Err = CubeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let face = chars.next().and_then(Face::from_letter);
        match (face, chars.as_str()) {
            (Some(face), "") => Ok(Move::new(face, false)),
            (Some(face), "'") => Ok(Move::new(face, true)),
            _ => Err(CubeError::UnknownMove(s.to_owned())),
        }
    }
}

impl Display for Move {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.face.letter())?;
        if self.prime {
            write!(f, "'")?;
        }
        Ok(())
    }
}

/// Parses a sequence of moves separated by whitespace and/or commas, e.g.
/// `"R U R' F"`.
pub fn parse_moves(s: &str) -> Result<Vec<Move>, CubeError> {
    s.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|word| !word.is_empty())
        .map(str::parse)
        .collect()
}

/// Formats a sequence of moves the way `parse_moves` reads them.
pub fn format_moves(moves: &[Move]) -> String {
    moves.iter().join(" ")
}

/// A whole-cube rotation, simulated by turning both layers along an axis in
/// opposite directions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Arbitrary,
)]
pub enum Rotation {
    /// Rotation about the R/L axis.
    X,
    /// Rotation about the U/D axis.
    Y,
}

impl Rotation {
    /// The generators of the rotation group, in the order they're tried.
    pub const ALL: [Rotation; 2] = [Rotation::X, Rotation::Y];

    /// The two face turns that make up this rotation.
    pub fn moves(self) -> [Move; 2] {
        match self {
            Rotation::X => [Move::new(R, false), Move::new(L, true)],
            Rotation::Y => [Move::new(U, false), Move::new(D, true)],
        }
    }
}

impl Display for Rotation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Rotation::X => write!(f, "x"),
            Rotation::Y => write!(f, "y"),
        }
    }
}

/// The state of a cube: `cube.facelets()[i]` is the facelet which started out
/// in slot `i`'s place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cube([u8; FACELETS]);

impl Cube {
    pub const SOLVED: Cube = Cube(identity());

    /// Creates a cube from a list of facelets, checking that it's a
    /// permutation of `0..24`.
    pub fn from_facelets(facelets: [u8; FACELETS]) -> Result<Self, CubeError> {
        if !is_permutation(&facelets) {
            return Err(CubeError::InvalidState(format!(
                "facelets must be a permutation of 0..{FACELETS}"
            )));
        }
        Ok(Self(facelets))
    }

    pub fn facelets(&self) -> &[u8; FACELETS] {
        &self.0
    }

    pub fn is_solved(&self) -> bool {
        *self == Self::SOLVED
    }

    pub fn permuted(&self, perm: &Perm) -> Self {
        Self(std::array::from_fn(|i| self.0[usize::from(perm[i])]))
    }

    pub fn apply(&self, turn: Move) -> Self {
        self.permuted(turn.perm())
    }

    /// Applies the move with the given name (e.g. `"R'"`).
    pub fn apply_named(&self, name: &str) -> Result<Self, CubeError> {
        Ok(self.apply(name.parse()?))
    }

    pub fn apply_all(&self, moves: impl IntoIterator<Item = Move>) -> Self {
        moves.into_iter().fold(*self, |cube, turn| cube.apply(turn))
    }

    pub fn rotate(&self, rotation: Rotation) -> Self {
        self.apply_all(rotation.moves())
    }
}

impl Default for Cube {
    fn default() -> Self {
        Self::SOLVED
    }
}

impl FromStr for Cube {
    type Err = CubeError;

    /// Parses 24 integers separated by whitespace and/or commas.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values: Vec<u8> = s
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|word| !word.is_empty())
            .map(|word| {
                word.parse::<u8>()
                    .map_err(|_| CubeError::InvalidState(format!("`{word}` is not a facelet")))
            })
            .collect::<Result<_, _>>()?;
        let facelets: [u8; FACELETS] = values.as_slice().try_into().map_err(|_| {
            CubeError::InvalidState(format!(
                "expected {FACELETS} facelets, found {}",
                values.len()
            ))
        })?;
        Self::from_facelets(facelets)
    }
}

impl Display for Cube {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.iter().join(" "))
    }
}

/// An ordered set of faces whose quarter turns the search is allowed to use.
///
/// The backward database and the forward search have to agree on this, so it
/// gets stored in the database header.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MoveSet {
    /// Sorted into move table order, without duplicates.
    faces: Vec<Face>,
}

impl MoveSet {
    pub fn new(faces: impl IntoIterator<Item = Face>) -> Result<Self, CubeError> {
        let mut faces: Vec<Face> = faces.into_iter().collect();
        faces.sort_unstable();
        faces.dedup();
        if faces.is_empty() {
            return Err(CubeError::EmptyMoveSet);
        }
        Ok(Self { faces })
    }

    /// The `<U, R, F>` subgroup, which leaves the down-back-left corner alone.
    pub fn restricted() -> Self {
        Self {
            faces: vec![U, R, F],
        }
    }

    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    pub fn contains(&self, turn: Move) -> bool {
        self.faces.contains(&turn.face)
    }

    /// Returns the moves in this set, in move table order.
    pub fn moves(&self) -> Vec<Move> {
        Move::ALL
            .into_iter()
            .filter(|&turn| self.contains(turn))
            .collect()
    }
}

impl Default for MoveSet {
    fn default() -> Self {
        Self::restricted()
    }
}

impl FromStr for MoveSet {
    type Err = CubeError;

    /// Parses a list of face letters, e.g. `"RUF"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let faces = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != ',')
            .map(|c| Face::from_letter(c).ok_or_else(|| CubeError::UnknownMove(c.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(faces)
    }
}

impl Display for MoveSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for face in &self.faces {
            write!(f, "{}", face.letter())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scrambled() -> Cube {
        Cube::SOLVED.apply_all(parse_moves("R U R' F U F' U' R' F R' U F U' L D B'").unwrap())
    }

    #[test]
    fn order_4() {
        for start in [Cube::SOLVED, scrambled()] {
            for turn in Move::ALL {
                let cube = start.apply(turn).apply(turn).apply(turn).apply(turn);
                assert_eq!(cube, start, "{turn} is not of order 4");
            }
        }
    }

    #[test]
    fn inverse() {
        for start in [Cube::SOLVED, scrambled()] {
            for turn in Move::ALL {
                assert_eq!(start.apply(turn).apply(turn.inverse()), start);
                assert_eq!(start.apply(turn.inverse()).apply(turn), start);
                assert_eq!(
                    start.apply(turn.inverse()),
                    start.apply(turn).apply(turn).apply(turn)
                );
            }
        }
        assert_eq!("R".parse::<Move>().unwrap().inverse().to_string(), "R'");
        assert_eq!("U'".parse::<Move>().unwrap().inverse().to_string(), "U");
    }

    #[test]
    fn back_is_front_seen_from_behind() {
        let y2 = [Rotation::Y, Rotation::Y];
        let front = Move::new(F, false);
        let conjugated = Cube::SOLVED
            .apply_all(y2.iter().flat_map(|r| r.moves()))
            .apply(front)
            .apply_all(y2.iter().flat_map(|r| r.moves()));
        assert_eq!(conjugated, Cube::SOLVED.apply(Move::new(B, false)));
    }

    #[test]
    fn rotations() {
        assert_eq!(
            Cube::SOLVED.rotate(Rotation::X).facelets(),
            &[8, 9, 10, 11, 5, 7, 4, 6, 20, 21, 22, 23, 14, 12, 15, 13, 3, 2, 1, 0, 19, 18, 17, 16]
        );
        assert_eq!(
            Cube::SOLVED.rotate(Rotation::Y).facelets(),
            &[2, 0, 3, 1, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 4, 5, 6, 7, 21, 23, 20, 22]
        );
    }

    #[test]
    fn restricted_moves_keep_anchor_corner() {
        let cube = scrambled();
        for turn in MoveSet::restricted().moves() {
            let turned = cube.apply(turn);
            for slot in [6, 19, 22] {
                assert_eq!(turned.facelets()[slot], cube.facelets()[slot]);
            }
        }
    }

    #[test]
    fn unknown_moves() {
        let cube = scrambled();
        for name in ["", "X", "r", "R2", "R''", "RU", " R"] {
            assert_eq!(
                cube.apply_named(name),
                Err(CubeError::UnknownMove(name.to_owned()))
            );
        }
        assert_eq!(cube, scrambled());
        assert_eq!(cube.apply_named("F'").unwrap(), cube.apply(Move::new(F, true)));
        assert!(matches!(
            parse_moves("R U Q"),
            Err(CubeError::UnknownMove(name)) if name == "Q"
        ));
    }

    #[test]
    fn parse_cube() {
        let cube = scrambled();
        assert_eq!(cube.to_string().parse::<Cube>().unwrap(), cube);
        assert_eq!(
            "0,1,2,3,4,5,6,7,8,9,10,11,12,13,14,15,16,17,18,19,20,21,22,23"
                .parse::<Cube>()
                .unwrap(),
            Cube::SOLVED
        );
        for bad in [
            "0 1 2",
            "0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16 17 18 19 20 21 22 22",
            "0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16 17 18 19 20 21 22 24",
            "0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16 17 18 19 20 21 22 x",
        ] {
            assert!(matches!(
                bad.parse::<Cube>(),
                Err(CubeError::InvalidState(_))
            ));
        }
    }

    #[test]
    fn move_sets() {
        let set: MoveSet = "FRU".parse().unwrap();
        assert_eq!(set, MoveSet::restricted());
        assert_eq!(format_moves(&set.moves()), "U U' R R' F F'");
        assert_eq!(set.to_string(), "URF");
        assert_eq!("".parse::<MoveSet>(), Err(CubeError::EmptyMoveSet));
        assert!(matches!(
            "RUQ".parse::<MoveSet>(),
            Err(CubeError::UnknownMove(_))
        ));
    }
}
