//! The forward half of the meet-in-the-middle search, run breadth first in
//! lockstep rounds between any number of ranks.
//!
//! Rank 0 is the coordinator. It owns the frontier and the set of visited
//! states, and each round it splits the frontier between every rank (itself
//! included), then merges what they send back. Every rank runs the same loop:
//!
//! 1. The coordinator broadcasts a [`Decision`].
//! 2. On [`Decision::Search`], the coordinator scatters the frontier.
//! 3. Every rank expands its chunk, checking each new state against the
//!    database.
//! 4. The coordinator gathers the results.

use std::fmt::{self, Display, Formatter};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use log::{debug, info, warn};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    normalize, reconstruct, Collectives, Cube, Database, Move, MoveSet, Rotation, Solution,
};

mod local;

pub use local::*;

/// The rank which coordinates the search.
pub const COORDINATOR: usize = 0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    #[error("search aborted: {0}")]
    Aborted(String),
    #[error("ranks disagreed about the protocol: {0}")]
    Protocol(String),
}

/// What the coordinator tells every rank at the start of a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    /// Expand another layer.
    Search,
    /// A solution has been found.
    Done,
    /// There's nothing left to search.
    Fail,
    /// Something went wrong; every rank should stop with this reason.
    Abort(String),
}

/// A frontier state, along with the moves which reached it from the start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub cube: Cube,
    pub path: Vec<Move>,
}

/// What a rank sends back to the coordinator after expanding its chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Every state generated, in chunk order and then move order.
    pub next: Vec<Task>,
    /// The first state generated which was in the database, joined up with its
    /// chain back to solved.
    pub solution: Option<Vec<Move>>,
    /// How many states were generated.
    pub generated: u64,
}

/// Expands every real task in `chunk` by every move in `moves`, stopping at the
/// first state which is in `database`.
pub fn expand(database: &Database, moves: &[Move], chunk: &[Option<Task>]) -> Report {
    let mut report = Report::default();
    for task in chunk.iter().flatten() {
        for &turn in moves {
            let cube = task.cube.apply(turn);
            report.generated += 1;
            let mut path = Vec::with_capacity(task.path.len() + 1);
            path.extend_from_slice(&task.path);
            path.push(turn);
            if let Some(solution) = reconstruct(database, &cube, &path) {
                // The rest of the layer is useless now.
                report.next.clear();
                report.solution = Some(solution);
                return report;
            }
            report.next.push(Task { cube, path });
        }
    }
    report
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Decide,
    Distribute,
    Collect,
    Terminated,
}

/// How a search which ran to completion ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// The moves which solve the normalized start state.
    Solved(Vec<Move>),
    /// Every state within reach was explored without meeting the database.
    Exhausted,
}

/// The coordinator's side of the search, independent of how it talks to the
/// other ranks.
#[derive(Debug)]
pub struct Coordinator<'a> {
    database: &'a Database,
    max_rounds: Option<usize>,
    phase: Phase,
    frontier: Vec<Task>,
    visited: FxHashSet<Cube>,
    solution: Option<Vec<Move>>,
    rounds: usize,
}

impl<'a> Coordinator<'a> {
    pub fn new(database: &'a Database, max_rounds: Option<usize>) -> Self {
        Self {
            database,
            max_rounds,
            phase: Phase::Init,
            frontier: Vec::new(),
            visited: FxHashSet::default(),
            solution: None,
            rounds: 0,
        }
    }

    /// Sets up the search from a normalized start state, which might already
    /// be in the database.
    ///
    /// Panics unless the coordinator is in [`Phase::Init`].
    pub fn start(&mut self, start: Cube) {
        assert_eq!(self.phase, Phase::Init);
        self.solution = reconstruct(self.database, &start, &[]);
        if self.solution.is_none() {
            self.visited.insert(start);
            self.frontier.push(Task {
                cube: start,
                path: Vec::new(),
            });
        }
        self.phase = Phase::Decide;
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The number of rounds distributed so far.
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    pub fn frontier_len(&self) -> usize {
        self.frontier.len()
    }

    /// Decides what every rank does next. `cancelled` aborts the search.
    ///
    /// Panics unless the coordinator is in [`Phase::Decide`].
    pub fn decide(&mut self, cancelled: bool) -> Decision {
        assert_eq!(self.phase, Phase::Decide);
        let decision = if cancelled {
            Decision::Abort("interrupted".to_owned())
        } else if self.solution.is_some() {
            Decision::Done
        } else if self.frontier.is_empty()
            || self.max_rounds.is_some_and(|max| self.rounds >= max)
        {
            Decision::Fail
        } else {
            Decision::Search
        };
        self.phase = match decision {
            Decision::Search => Phase::Distribute,
            _ => Phase::Terminated,
        };
        decision
    }

    /// Splits the frontier into one equally sized chunk per rank, padding the
    /// end with placeholders.
    ///
    /// Panics unless the coordinator is in [`Phase::Distribute`], i.e. the last
    /// decision was [`Decision::Search`].
    pub fn distribute(&mut self, ranks: usize) -> Vec<Vec<Option<Task>>> {
        assert_eq!(self.phase, Phase::Distribute);
        assert!(ranks > 0);
        self.rounds += 1;
        self.phase = Phase::Collect;

        let mut frontier: Vec<Option<Task>> =
            self.frontier.drain(..).map(Some).collect();
        let padding = (ranks - frontier.len() % ranks) % ranks;
        frontier.resize(frontier.len() + padding, None);
        let chunk_len = frontier.len() / ranks;
        let mut frontier = frontier.into_iter();
        (0..ranks)
            .map(|_| frontier.by_ref().take(chunk_len).collect())
            .collect()
    }

    /// Merges every rank's report, in rank order.
    ///
    /// Panics unless the coordinator is in [`Phase::Collect`], right after
    /// [`Coordinator::distribute`].
    pub fn collect(&mut self, reports: Vec<Report>) {
        assert_eq!(self.phase, Phase::Collect);
        self.phase = Phase::Decide;

        // Lower ranks were given earlier parts of the frontier, so this keeps the
        // result the same as a single rank searching alone.
        self.solution = reports.iter().find_map(|report| report.solution.clone());
        if self.solution.is_some() {
            return;
        }
        for task in reports.into_iter().flat_map(|report| report.next) {
            if self.visited.insert(task.cube) {
                self.frontier.push(task);
            }
        }
    }

    /// How the search ended, once it has.
    pub fn outcome(&self) -> Option<Outcome> {
        if self.phase != Phase::Terminated {
            return None;
        }
        Some(match &self.solution {
            Some(moves) => Outcome::Solved(moves.clone()),
            None => Outcome::Exhausted,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchConfig {
    /// The moves the forward search uses; must match the database's.
    pub moves: MoveSet,
    /// Give up after this many rounds.
    pub max_rounds: Option<usize>,
    /// Checked by the coordinator each round; aborts the search once set.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl SearchConfig {
    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|cancel| cancel.load(Ordering::Relaxed))
    }
}

/// Everything the coordinator knows once the search is over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchReport {
    /// The whole-cube rotations applied to the query before searching.
    pub rotations: Vec<Rotation>,
    pub outcome: Outcome,
    pub rounds: usize,
    /// How many states each rank generated, in rank order.
    pub generated: Vec<u64>,
}

impl SearchReport {
    /// The full solution for the query as it was given, if there is one.
    pub fn solution(&self) -> Option<Solution> {
        match &self.outcome {
            Outcome::Solved(moves) => Some(Solution {
                rotations: self.rotations.clone(),
                moves: moves.clone(),
            }),
            Outcome::Exhausted => None,
        }
    }
}

impl Display for SearchReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.solution() {
            Some(solution) => writeln!(f, "{solution}")?,
            None => writeln!(f, "No solution within reach after {} rounds", self.rounds)?,
        }
        writeln!(f, "Rounds: {}", self.rounds)?;
        writeln!(f, "States generated per rank:")?;
        for (rank, generated) in self.generated.iter().enumerate() {
            writeln!(f, "  rank {rank:>3}: {generated:>10}")?;
        }
        write!(f, "Total: {}", self.generated.iter().sum::<u64>())
    }
}

/// Makes sure every rank has `Ok(value)` before any of them carries on.
///
/// If any rank has an error, every rank returns an error: its own, or
/// [`SearchError::Aborted`] listing the ranks which failed.
pub fn all_ranks_ok<C: Collectives, T>(comm: &C, local: anyhow::Result<T>) -> anyhow::Result<T> {
    let status = local
        .as_ref()
        .err()
        .map(|err| format!("rank {}: {err:#}", comm.rank()));
    let statuses = comm.gather(status, COORDINATOR)?;
    let failures: Vec<String> = comm.broadcast(
        statuses.map(|statuses| statuses.into_iter().flatten().collect()),
        COORDINATOR,
    )?;
    let value = local?;
    if !failures.is_empty() {
        return Err(SearchError::Aborted(failures.join("; ")).into());
    }
    comm.barrier()?;
    Ok(value)
}

/// Loads the database at `path` on every rank.
pub fn open_database<C: Collectives>(
    comm: &C,
    path: &Path,
    moves: &MoveSet,
) -> anyhow::Result<Database> {
    let local = Database::load(path).and_then(|database| {
        database.check_moves(moves)?;
        Ok(database)
    });
    all_ranks_ok(comm, local.map_err(anyhow::Error::from))
}

/// Runs this rank's part of the search.
///
/// `query` is only called on the coordinator, which returns the report; every
/// other rank returns `None`.
pub fn search<C: Collectives>(
    comm: &C,
    database: &Database,
    query: impl FnOnce() -> anyhow::Result<Cube>,
    config: &SearchConfig,
) -> anyhow::Result<Option<SearchReport>> {
    let moves = config.moves.moves();
    let mut rotations = Vec::new();
    let mut coordinator = None;
    if comm.rank() == COORDINATOR {
        match read_start(database, query, config) {
            Ok((start, rotated)) => {
                let mut c = Coordinator::new(database, config.max_rounds);
                c.start(start);
                coordinator = Some(c);
                rotations = rotated;
            }
            Err(err) => {
                warn!("aborting the search: {err:#}");
                comm.broadcast(Some(Decision::Abort(format!("{err:#}"))), COORDINATOR)?;
                return Err(err);
            }
        }
    }

    let mut generated = 0;
    loop {
        let decision = coordinator.as_mut().map(|c| c.decide(config.cancelled()));
        match comm.broadcast(decision, COORDINATOR)? {
            Decision::Search => {}
            Decision::Done | Decision::Fail => break,
            Decision::Abort(reason) => {
                warn!("rank {} stopping: {reason}", comm.rank());
                return Err(SearchError::Aborted(reason).into());
            }
        }

        let chunks = coordinator.as_mut().map(|c| {
            info!(
                "[Round {}] frontier size {}",
                c.rounds() + 1,
                c.frontier_len()
            );
            c.distribute(comm.size())
        });
        let chunk: Vec<Option<Task>> = comm.scatter(chunks, COORDINATOR)?;
        let report = expand(database, &moves, &chunk);
        debug!(
            "rank {} expanded {} states into {}",
            comm.rank(),
            chunk.iter().flatten().count(),
            report.next.len()
        );
        generated += report.generated;
        let reports = comm.gather(report, COORDINATOR)?;
        if let (Some(c), Some(reports)) = (coordinator.as_mut(), reports) {
            c.collect(reports);
        }
    }

    comm.barrier()?;
    let counts = comm.gather(generated, COORDINATOR)?;
    Ok(coordinator.zip(counts).and_then(|(c, generated)| {
        let outcome = c.outcome()?;
        Some(SearchReport {
            rotations,
            outcome,
            rounds: c.rounds(),
            generated,
        })
    }))
}

/// Reads and normalizes the query on the coordinator.
fn read_start(
    database: &Database,
    query: impl FnOnce() -> anyhow::Result<Cube>,
    config: &SearchConfig,
) -> anyhow::Result<(Cube, Vec<Rotation>)> {
    database.check_moves(&config.moves)?;
    let cube = query().context("failed to read the start state")?;
    let (start, rotations) = normalize(cube)?;
    if !rotations.is_empty() {
        info!("normalized the start state with {} rotations", rotations.len());
    }
    Ok((start, rotations))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::{parse_moves, Cube, Database, MoveSet};

    use super::{expand, Coordinator, Decision, Outcome, Phase, Report, Task};

    fn task(moves: &str) -> Task {
        let path = parse_moves(moves).unwrap();
        Task {
            cube: Cube::SOLVED.apply_all(path.iter().copied()),
            path,
        }
    }

    #[test]
    fn already_in_database() {
        let database = Database::generate(2, &MoveSet::restricted(), None);
        let mut coordinator = Coordinator::new(&database, None);
        assert_eq!(coordinator.phase(), Phase::Init);
        coordinator.start(Cube::SOLVED.apply_all(parse_moves("R U").unwrap()));
        assert_eq!(coordinator.decide(false), Decision::Done);
        assert_eq!(coordinator.phase(), Phase::Terminated);
        assert_eq!(
            coordinator.outcome(),
            Some(Outcome::Solved(parse_moves("U' R'").unwrap()))
        );
        assert_eq!(coordinator.rounds(), 0);
    }

    #[test]
    fn padding() {
        let database = Database::generate(0, &MoveSet::restricted(), None);
        let mut coordinator = Coordinator::new(&database, None);
        coordinator.start(Cube::SOLVED.apply_all(parse_moves("R U F").unwrap()));
        assert_eq!(coordinator.decide(false), Decision::Search);
        let chunks = coordinator.distribute(3);
        assert_eq!(coordinator.phase(), Phase::Collect);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|chunk| chunk.len() == 1));
        assert!(chunks[0][0].is_some());
        assert_eq!(chunks[1][0], None);
        assert_eq!(chunks[2][0], None);
    }

    #[test]
    fn even_split() {
        let database = Database::generate(0, &MoveSet::restricted(), None);
        let mut coordinator = Coordinator::new(&database, None);
        coordinator.start(Cube::SOLVED.apply_all(parse_moves("R U F").unwrap()));
        coordinator.decide(false);
        let chunks = coordinator.distribute(1);
        let report = expand(&database, &MoveSet::restricted().moves(), &chunks[0]);
        coordinator.collect(vec![report]);
        assert_eq!(coordinator.frontier_len(), 6);

        assert_eq!(coordinator.decide(false), Decision::Search);
        let chunks = coordinator.distribute(4);
        let lengths: Vec<usize> = chunks.iter().map(Vec::len).collect();
        assert_eq!(lengths, [2, 2, 2, 2]);
        let real: usize = chunks.iter().map(|chunk| chunk.iter().flatten().count()).sum();
        assert_eq!(real, 6);
        // Placeholders only ever go at the end.
        assert!(chunks[3].iter().all(Option::is_none));
    }

    #[test]
    fn duplicates_are_dropped() {
        let database = Database::generate(0, &MoveSet::restricted(), None);
        let mut coordinator = Coordinator::new(&database, None);
        let start = Cube::SOLVED.apply_all(parse_moves("R U F").unwrap());
        coordinator.start(start);
        coordinator.decide(false);
        coordinator.distribute(2);
        let report = |tasks: Vec<Task>| Report {
            next: tasks,
            solution: None,
            generated: 0,
        };
        let back_to_start = Task {
            cube: start,
            path: parse_moves("R R'").unwrap(),
        };
        coordinator.collect(vec![
            report(vec![task("R"), task("U"), back_to_start]),
            report(vec![task("U"), task("F")]),
        ]);
        assert_eq!(coordinator.frontier_len(), 3);
    }

    #[test]
    fn first_rank_wins() {
        let database = Database::generate(0, &MoveSet::restricted(), None);
        let mut coordinator = Coordinator::new(&database, None);
        coordinator.start(Cube::SOLVED.apply_all(parse_moves("R").unwrap()));
        coordinator.decide(false);
        coordinator.distribute(3);
        let report = |solution: Option<&str>| Report {
            next: vec![],
            solution: solution.map(|moves| parse_moves(moves).unwrap()),
            generated: 0,
        };
        coordinator.collect(vec![report(None), report(Some("F")), report(Some("U"))]);
        assert_eq!(coordinator.decide(false), Decision::Done);
        assert_eq!(
            coordinator.outcome(),
            Some(Outcome::Solved(parse_moves("F").unwrap()))
        );
    }

    #[test]
    fn exhausted() {
        let database = Database::generate(0, &MoveSet::restricted(), None);
        let mut coordinator = Coordinator::new(&database, None);
        coordinator.start(Cube::SOLVED.apply_all(parse_moves("R").unwrap()));
        coordinator.decide(false);
        coordinator.distribute(1);
        coordinator.collect(vec![Report::default()]);
        assert_eq!(coordinator.decide(false), Decision::Fail);
        assert_eq!(coordinator.outcome(), Some(Outcome::Exhausted));
    }

    #[test]
    fn round_limit() {
        let database = Database::generate(0, &MoveSet::restricted(), None);
        let mut coordinator = Coordinator::new(&database, Some(0));
        coordinator.start(Cube::SOLVED.apply_all(parse_moves("R").unwrap()));
        assert_eq!(coordinator.decide(false), Decision::Fail);
    }

    #[test]
    fn cancelled() {
        let database = Database::generate(0, &MoveSet::restricted(), None);
        let mut coordinator = Coordinator::new(&database, None);
        coordinator.start(Cube::SOLVED.apply_all(parse_moves("R").unwrap()));
        assert_eq!(
            coordinator.decide(true),
            Decision::Abort("interrupted".to_owned())
        );
        assert_eq!(coordinator.phase(), Phase::Terminated);
    }

    #[test]
    #[should_panic]
    fn distribute_before_decide() {
        let database = Database::generate(0, &MoveSet::restricted(), None);
        let mut coordinator = Coordinator::new(&database, None);
        coordinator.start(Cube::SOLVED.apply_all(parse_moves("R").unwrap()));
        coordinator.distribute(2);
    }

    #[test]
    #[should_panic]
    fn collect_twice() {
        let database = Database::generate(0, &MoveSet::restricted(), None);
        let mut coordinator = Coordinator::new(&database, None);
        coordinator.start(Cube::SOLVED.apply_all(parse_moves("R").unwrap()));
        assert_eq!(coordinator.decide(false), Decision::Search);
        coordinator.distribute(1);
        coordinator.collect(vec![Report::default()]);
        coordinator.collect(vec![Report::default()]);
    }

    #[test]
    fn expand_stops_at_first_hit() {
        let database = Database::generate(1, &MoveSet::restricted(), None);
        let moves = MoveSet::restricted().moves();
        // `R U` is two moves out; `R U U'` is back in the database at depth 1.
        let chunk = vec![Some(task("R U")), None];
        let report = expand(&database, &moves, &chunk);
        assert_eq!(report.solution, Some(parse_moves("R U U' R'").unwrap()));
        assert!(report.next.is_empty());
        assert_eq!(report.generated, 2);

        let report = expand(&database, &moves, &[None, None]);
        assert_eq!(report, Report::default());
    }
}
