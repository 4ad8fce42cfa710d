#![no_main]
use libfuzzer_sys::fuzz_target;
use pocket_solver::{format_moves, parse_moves, Cube, Move};
use pretty_assertions::assert_eq;

fuzz_target!(|moves: Vec<Move>| {
    let cube = Cube::SOLVED.apply_all(moves.iter().copied());
    // Undoing every move in reverse gets back to solved.
    let undone = cube.apply_all(moves.iter().rev().map(|turn| turn.inverse()));
    assert!(undone.is_solved());
    // Doing any move four times is the same as doing nothing.
    for &turn in &moves {
        assert_eq!(cube.apply_all([turn; 4]), cube);
    }
    assert_eq!(parse_moves(&format_moves(&moves)).unwrap(), moves);
    assert_eq!(cube.to_string().parse::<Cube>().unwrap(), cube);
});
