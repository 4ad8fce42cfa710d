//! Applies a sequence of moves to the solved cube and prints the state it ends
//! up in, in the form the solver reads.

use clap::Parser;
use pocket_solver::{parse_moves, Cube, DEFAULT_SCRAMBLE};

#[derive(Parser)]
struct Args {
    /// The moves to apply, e.g. `R U R' F`; defaults to the solver's default
    /// scramble.
    moves: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let Args { moves } = Args::parse();
    let moves = if moves.is_empty() {
        parse_moves(DEFAULT_SCRAMBLE)?
    } else {
        parse_moves(&moves.join(" "))?
    };
    println!("{}", Cube::SOLVED.apply_all(moves));
    Ok(())
}
