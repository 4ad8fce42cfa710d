#![no_main]
use std::sync::OnceLock;

use libfuzzer_sys::{fuzz_target, Corpus};
use pocket_solver::{reconstruct, Cube, Database, Move, MoveSet};

fuzz_target!(|input: (Vec<Move>, Vec<Move>)| -> Corpus {
    static DATABASE: OnceLock<Database> = OnceLock::new();
    let database = DATABASE.get_or_init(|| Database::generate(4, &MoveSet::restricted(), None));

    let (forward, backward) = input;
    let moves = MoveSet::restricted();
    if !forward.iter().chain(&backward).all(|&turn| moves.contains(turn)) {
        return Corpus::Reject;
    }
    let meeting = Cube::SOLVED.apply_all(backward);
    let Some(_) = database.get(&meeting) else {
        return Corpus::Reject;
    };
    // The start state which `forward` takes to `meeting`.
    let start = meeting.apply_all(forward.iter().rev().map(|turn| turn.inverse()));
    let solution = reconstruct(database, &meeting, &forward).unwrap();
    assert!(start.apply_all(solution).is_solved());
    Corpus::Keep
});
