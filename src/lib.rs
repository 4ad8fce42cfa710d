//! A crate which solves the 2x2x2 cube by meeting in the middle.
//!
//! A database of every state within a few moves of solved is built ahead of
//! time. A query is first rotated so that the corner the restricted moves never
//! touch is in place, then searched forwards breadth first, one layer per
//! round, until it runs into the database. The forward search can be spread
//! between any number of ranks through the [`Collectives`] trait.

mod collective;
mod cube;
mod database;
mod input;
mod normalize;
mod search;
mod solution;

pub use collective::*;
pub use cube::*;
pub use database::*;
pub use input::*;
pub use normalize::*;
pub use search::*;
pub use solution::*;
