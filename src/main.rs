use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use pocket_solver::{
    default_database_path, read_query, solve_local, Database, MoveSet, Outcome, SearchConfig,
};

#[derive(Parser)]
struct Options {
    /// The database to meet; defaults to the one `generate_db` writes.
    #[arg(long)]
    db: Option<PathBuf>,
    /// The number of ranks to split the search between.
    #[arg(long, default_value_t = 1)]
    workers: usize,
    #[arg(long)]
    max_rounds: Option<usize>,
    /// Print the report as JSON.
    #[arg(long)]
    json: bool,
    /// The state to solve, or a file containing it.
    state: Vec<String>,
}

fn main() -> anyhow::Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let options = Options::parse();

    let query = read_query(&options.state)?;
    let path = options.db.unwrap_or_else(default_database_path);
    let start = Instant::now();
    let database = Database::load(&path)?;
    log::info!("loaded {} states in {:?}", database.len(), start.elapsed());

    let cancel = Arc::new(AtomicBool::new(false));
    ctrlc::set_handler({
        let cancel = Arc::clone(&cancel);
        move || cancel.store(true, Ordering::Relaxed)
    })?;

    let config = SearchConfig {
        moves: MoveSet::restricted(),
        max_rounds: options.max_rounds,
        cancel: Some(cancel),
    };
    let report = solve_local(&database, query, options.workers, &config)?;
    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
        println!("Took {:?}", start.elapsed());
    }

    Ok(match report.outcome {
        Outcome::Solved(_) => ExitCode::SUCCESS,
        Outcome::Exhausted => ExitCode::from(2),
    })
}
