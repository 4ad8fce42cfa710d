//! Running every rank of the search inside this process.

use anyhow::{bail, Context};

use super::{search, SearchConfig, SearchReport, COORDINATOR};
use crate::{run_ranks, Cube, Database};

/// Solves `query` with `workers` ranks, each on its own thread. A single worker
/// is a plain breadth-first search.
pub fn solve_local(
    database: &Database,
    query: Cube,
    workers: usize,
    config: &SearchConfig,
) -> anyhow::Result<SearchReport> {
    if workers == 0 {
        bail!("need at least one worker");
    }
    let results = run_ranks(workers, |comm| {
        search(&comm, database, || Ok(query), config)
    })?;

    let mut report = None;
    for (rank, result) in results.into_iter().enumerate() {
        // The coordinator's error is the one worth reporting; the other ranks
        // only know that it told them to stop.
        let result = result.with_context(|| format!("rank {rank} failed"))?;
        if rank == COORDINATOR {
            report = result;
        }
    }
    report.context("the coordinator finished without a report")
}
