use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use pocket_solver::{
    default_database_path, open_database, read_query, search, MoveSet, Outcome, SearchConfig,
};
use pocket_solver_tcp::{TcpCollectives, HUB};

#[derive(Parser)]
struct Options {
    /// This process's rank; rank 0 coordinates.
    #[arg(long)]
    rank: usize,
    /// The total number of ranks.
    #[arg(long)]
    size: usize,
    /// Where rank 0 listens.
    #[arg(long, default_value = "127.0.0.1:7878")]
    addr: String,
    #[arg(long)]
    db: Option<PathBuf>,
    #[arg(long, default_value_t = MoveSet::restricted())]
    faces: MoveSet,
    #[arg(long)]
    max_rounds: Option<usize>,
    /// How many seconds to keep trying to reach rank 0, or for rank 0 to wait
    /// for the others.
    #[arg(long, default_value_t = 30)]
    connect_timeout: u64,
    /// Print the report as JSON.
    #[arg(long)]
    json: bool,
    /// The state to solve, or a file containing it. Only read by rank 0.
    state: Vec<String>,
}

fn main() -> anyhow::Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let options = Options::parse();

    let comm = TcpCollectives::connect(
        &options.addr,
        options.rank,
        options.size,
        Duration::from_secs(options.connect_timeout),
    )?;
    let path = options.db.clone().unwrap_or_else(default_database_path);
    let database = open_database(&comm, &path, &options.faces)?;

    let mut config = SearchConfig {
        moves: options.faces.clone(),
        max_rounds: options.max_rounds,
        cancel: None,
    };
    if options.rank == HUB {
        let cancel = Arc::new(AtomicBool::new(false));
        ctrlc::set_handler({
            let cancel = Arc::clone(&cancel);
            move || cancel.store(true, Ordering::Relaxed)
        })?;
        config.cancel = Some(cancel);
    }

    let Some(report) = search(&comm, &database, || read_query(&options.state), &config)? else {
        return Ok(ExitCode::SUCCESS);
    };
    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }
    Ok(match report.outcome {
        Outcome::Solved(_) => ExitCode::SUCCESS,
        Outcome::Exhausted => ExitCode::from(2),
    })
}
