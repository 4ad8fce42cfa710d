//! Prints out what's in a database file.

use std::path::PathBuf;

use clap::Parser;
use pocket_solver::{default_database_path, Database};

#[derive(Parser)]
struct Args {
    path: Option<PathBuf>,
    /// Print the summary as JSON.
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    let Args { path, json } = Args::parse();
    let path = path.unwrap_or_else(default_database_path);
    let database = Database::load(&path)?;
    let stats = database.stats();
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("{}", path.display());
        println!("{stats}");
    }
    Ok(())
}
