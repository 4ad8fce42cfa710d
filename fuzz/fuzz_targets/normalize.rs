#![no_main]
use libfuzzer_sys::fuzz_target;
use pocket_solver::{is_normalized, normalize, Cube, Move, Rotation};
use pretty_assertions::assert_eq;

fuzz_target!(|input: (Vec<Move>, Vec<Rotation>)| {
    let (moves, rotations) = input;
    let cube = Cube::SOLVED.apply_all(moves);
    let rotated = rotations
        .iter()
        .fold(cube, |cube, &rotation| cube.rotate(rotation));
    let (normalized, path) = normalize(rotated).unwrap();
    assert!(is_normalized(&normalized));
    assert_eq!(
        path.iter()
            .fold(rotated, |cube, &rotation| cube.rotate(rotation)),
        normalized
    );
    // x and y reach all 24 orientations within 5 rotations.
    assert!(path.len() <= 5);
});
