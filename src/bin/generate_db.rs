//! Builds the database of states near solved that the search meets.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pocket_solver::{default_database_path, Database, MoveSet, DEFAULT_DEPTH};

#[derive(Parser)]
struct Options {
    /// How many moves out from solved to search.
    #[arg(long, default_value_t = DEFAULT_DEPTH)]
    depth: u8,
    /// The faces whose turns are allowed.
    #[arg(long, default_value_t = MoveSet::restricted())]
    faces: MoveSet,
    #[arg(long)]
    out: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let options = Options::parse();
    let path = options.out.unwrap_or_else(default_database_path);

    let progress = ProgressBar::new_spinner().with_style(ProgressStyle::with_template(
        "{elapsed_precise} {spinner} {msg}: {pos} states",
    )?);
    progress.enable_steady_tick(Duration::from_millis(100));
    let start = Instant::now();
    let database = Database::generate(options.depth, &options.faces, Some(&progress));
    progress.finish();

    println!("{}", database.stats());
    database.save(&path)?;
    println!("Wrote {} in {:?}", path.display(), start.elapsed());
    Ok(())
}
