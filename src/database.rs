//! The backward half of the meet-in-the-middle search: every state within a
//! fixed number of moves of solved, each with a link back towards solved.

use std::collections::hash_map::Entry as MapEntry;
use std::fmt::{self, Display, Formatter};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use indicatif::ProgressBar;
use log::info;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Cube, Move, MoveSet};

/// Bumped whenever the on-disk layout changes.
pub const FORMAT_VERSION: u32 = 1;

/// The depth the database is built to unless told otherwise.
pub const DEFAULT_DEPTH: u8 = 8;

/// Returns the path the database binaries read and write by default.
pub fn default_database_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("db")
        .join("halfway.postcard")
}

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("database {} not found; build it with `generate_db` first", .path.display())]
    Missing { path: PathBuf },
    #[error("failed to read database {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write database {}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("database could not be decoded")]
    Decode(#[from] postcard::Error),
    #[error("database has format version {found}, expected {FORMAT_VERSION}")]
    Version { found: u32 },
    #[error("database is inconsistent: {0}")]
    Inconsistent(String),
    #[error("database was built with the moves of {found}, but the search uses {expected}")]
    MoveSetMismatch { expected: MoveSet, found: MoveSet },
}

/// The move which produced a state from its parent, one step closer to solved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    pub parent: Cube,
    pub turn: Move,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    /// `None` only for the solved state.
    pub link: Option<Link>,
    /// How many moves this state is from solved.
    pub depth: u8,
}

/// How the database is laid out on disk: a header, then every state in the
/// order it was discovered, so that parents always come before their children.
#[derive(Serialize, Deserialize)]
struct DatabaseFile {
    version: u32,
    max_depth: u8,
    moves: MoveSet,
    records: Vec<(Cube, Option<Link>)>,
}

/// A map from every state within `max_depth` moves of solved to how it was
/// reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Database {
    max_depth: u8,
    moves: MoveSet,
    /// The keys of `entries`, in the order they were discovered.
    order: Vec<Cube>,
    entries: FxHashMap<Cube, Entry>,
}

impl Database {
    /// Builds a database by breadth-first search outwards from solved using only
    /// the moves in `moves`, stopping after `max_depth` moves.
    ///
    /// Each level is expanded in parallel, but states are inserted in frontier
    /// order and then move table order, so the result is the same every time.
    pub fn generate(max_depth: u8, moves: &MoveSet, progress: Option<&ProgressBar>) -> Self {
        let turns = moves.moves();
        let mut order = vec![Cube::SOLVED];
        let mut entries = FxHashMap::default();
        entries.insert(
            Cube::SOLVED,
            Entry {
                link: None,
                depth: 0,
            },
        );

        let mut frontier = vec![Cube::SOLVED];
        for depth in 1..=max_depth {
            let children: Vec<Vec<(Cube, Link)>> = frontier
                .par_iter()
                .map(|&parent| {
                    turns
                        .iter()
                        .map(|&turn| (parent.apply(turn), Link { parent, turn }))
                        .collect()
                })
                .collect();

            let mut next = Vec::new();
            for (state, link) in children.into_iter().flatten() {
                if let MapEntry::Vacant(slot) = entries.entry(state) {
                    slot.insert(Entry {
                        link: Some(link),
                        depth,
                    });
                    order.push(state);
                    next.push(state);
                }
            }

            info!("depth {depth}: {} new states", next.len());
            if let Some(progress) = progress {
                progress.set_message(format!("depth {depth}"));
                progress.set_position(order.len().try_into().unwrap_or(u64::MAX));
            }

            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        Self {
            max_depth,
            moves: moves.clone(),
            order,
            entries,
        }
    }

    pub fn max_depth(&self) -> u8 {
        self.max_depth
    }

    pub fn moves(&self) -> &MoveSet {
        &self.moves
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, cube: &Cube) -> Option<&Entry> {
        self.entries.get(cube)
    }

    pub fn contains(&self, cube: &Cube) -> bool {
        self.entries.contains_key(cube)
    }

    /// Iterates over every state in the order it was discovered.
    pub fn iter(&self) -> impl Iterator<Item = (&Cube, &Entry)> + '_ {
        self.order.iter().map(|cube| (cube, &self.entries[cube]))
    }

    /// Returns an error unless this database was built with `expected`.
    pub fn check_moves(&self, expected: &MoveSet) -> Result<(), DatabaseError> {
        if self.moves != *expected {
            return Err(DatabaseError::MoveSetMismatch {
                expected: expected.clone(),
                found: self.moves.clone(),
            });
        }
        Ok(())
    }

    pub fn stats(&self) -> DatabaseStats {
        let mut per_depth = vec![0; usize::from(self.max_depth) + 1];
        for entry in self.entries.values() {
            per_depth[usize::from(entry.depth)] += 1;
        }
        DatabaseStats {
            max_depth: self.max_depth,
            moves: self.moves.clone(),
            per_depth,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, DatabaseError> {
        let file = DatabaseFile {
            version: FORMAT_VERSION,
            max_depth: self.max_depth,
            moves: self.moves.clone(),
            records: self
                .iter()
                .map(|(&cube, entry)| (cube, entry.link))
                .collect(),
        };
        Ok(postcard::to_stdvec(&file)?)
    }

    /// Decodes a database, checking that every link is real and that following
    /// them from any state leads back to solved.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DatabaseError> {
        let file: DatabaseFile = postcard::from_bytes(bytes)?;
        if file.version != FORMAT_VERSION {
            return Err(DatabaseError::Version {
                found: file.version,
            });
        }

        let mut records = file.records.into_iter();
        match records.next() {
            Some((cube, None)) if cube.is_solved() => {}
            _ => {
                return Err(DatabaseError::Inconsistent(
                    "the first state isn't the solved state".to_owned(),
                ))
            }
        }

        let mut order = vec![Cube::SOLVED];
        let mut entries = FxHashMap::default();
        entries.insert(
            Cube::SOLVED,
            Entry {
                link: None,
                depth: 0,
            },
        );
        for (cube, link) in records {
            let Some(link) = link else {
                return Err(DatabaseError::Inconsistent(format!(
                    "{cube} has no parent"
                )));
            };
            // Since parents always precede their children, this also rules out cycles.
            let Some(parent) = entries.get(&link.parent) else {
                return Err(DatabaseError::Inconsistent(format!(
                    "the parent of {cube} isn't listed before it"
                )));
            };
            if !file.moves.contains(link.turn) {
                return Err(DatabaseError::Inconsistent(format!(
                    "{} isn't one of the moves of {}",
                    link.turn, file.moves
                )));
            }
            if link.parent.apply(link.turn) != cube {
                return Err(DatabaseError::Inconsistent(format!(
                    "applying {} to the parent of {cube} doesn't produce it",
                    link.turn
                )));
            }
            let depth = parent
                .depth
                .checked_add(1)
                .filter(|&depth| depth <= file.max_depth)
                .ok_or_else(|| {
                    DatabaseError::Inconsistent(format!(
                        "{cube} is further than {} moves from solved",
                        file.max_depth
                    ))
                })?;
            match entries.entry(cube) {
                MapEntry::Occupied(_) => {
                    return Err(DatabaseError::Inconsistent(format!(
                        "{cube} is listed twice"
                    )))
                }
                MapEntry::Vacant(slot) => {
                    slot.insert(Entry {
                        link: Some(link),
                        depth,
                    });
                }
            }
            order.push(cube);
        }

        Ok(Self {
            max_depth: file.max_depth,
            moves: file.moves,
            order,
            entries,
        })
    }

    /// Writes the database to `path`.
    pub fn save(&self, path: &Path) -> Result<(), DatabaseError> {
        let write_error = |source| DatabaseError::Write {
            path: path.to_owned(),
            source,
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(write_error)?;
        }
        let bytes = self.to_bytes()?;
        // Initially write to a temporary file so that an interrupted write doesn't
        // leave a truncated database behind.
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, bytes).map_err(write_error)?;
        // Then move it to the real path.
        fs::rename(&tmp_path, path).map_err(write_error)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, DatabaseError> {
        let bytes = fs::read(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                DatabaseError::Missing {
                    path: path.to_owned(),
                }
            } else {
                DatabaseError::Read {
                    path: path.to_owned(),
                    source,
                }
            }
        })?;
        Self::from_bytes(&bytes)
    }
}

/// A summary of what's in a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseStats {
    pub max_depth: u8,
    pub moves: MoveSet,
    /// The number of states at each distance from solved.
    pub per_depth: Vec<usize>,
}

impl DatabaseStats {
    pub fn total(&self) -> usize {
        self.per_depth.iter().sum()
    }
}

impl Display for DatabaseStats {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "Moves: <{}>", self.moves)?;
        writeln!(f, "Depth bound: {}", self.max_depth)?;
        for (depth, count) in self.per_depth.iter().enumerate() {
            writeln!(f, "  depth {depth:>2}: {count:>9} states")?;
        }
        write!(f, "Total: {} states", self.total())
    }
}
