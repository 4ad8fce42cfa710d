//! Reading the state to solve from the command line.

use std::fs;
use std::path::Path;

use anyhow::Context;

use crate::{parse_moves, Cube};

/// The scramble solved when no state is given.
pub const DEFAULT_SCRAMBLE: &str = "R U R' F U F' U' R' F R' U F U'";

/// Works out the state to solve from the words given on the command line:
///
/// - nothing: the solved cube scrambled with [`DEFAULT_SCRAMBLE`].
/// - the path of an existing file: the state written in that file.
/// - anything else: the words themselves, as a state.
///
/// States are 24 facelets separated by whitespace or commas, optionally
/// wrapped in square brackets.
pub fn read_query(words: &[String]) -> anyhow::Result<Cube> {
    match words {
        [] => Ok(Cube::SOLVED.apply_all(parse_moves(DEFAULT_SCRAMBLE)?)),
        [path] if Path::new(path).is_file() => {
            let text = fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
            parse_state(&text).with_context(|| format!("{path} doesn't contain a valid state"))
        }
        words => parse_state(&words.join(" ")),
    }
}

fn parse_state(text: &str) -> anyhow::Result<Cube> {
    let text = text.trim();
    let text = text
        .strip_prefix('[')
        .and_then(|text| text.strip_suffix(']'))
        .unwrap_or(text);
    Ok(text.parse()?)
}
