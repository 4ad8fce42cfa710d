//! Collectives between processes, over TCP.
//!
//! Rank 0 is the hub: it listens for every other rank to connect, and all
//! traffic goes through it. Every message is a little-endian `u32` length
//! followed by that many bytes of postcard.

use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use log::{debug, info};
use pocket_solver::{root_chunks, root_value, Collectives, Payload, SearchError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// The rank which every other rank connects to.
pub const HUB: usize = 0;

/// How long to wait between attempts to reach the hub, or to accept a rank.
const RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// The longest message a peer may send.
pub const MAX_FRAME_LEN: usize = 1 << 28;

/// The first thing a rank sends the hub.
#[derive(Debug, Serialize, Deserialize)]
struct Hello {
    rank: usize,
    size: usize,
}

enum Role {
    /// `workers[i]` is the connection to rank `i + 1`.
    Hub { workers: Vec<TcpStream> },
    Worker { hub: TcpStream },
}

pub struct TcpCollectives {
    rank: usize,
    size: usize,
    role: Role,
}

impl TcpCollectives {
    /// Joins a group of `size` ranks as `rank`, either hosting it on `addr` (for
    /// rank 0) or connecting to the host there.
    pub fn connect(
        addr: impl ToSocketAddrs,
        rank: usize,
        size: usize,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        if rank >= size {
            bail!("rank {rank} is out of range for {size} ranks");
        }
        if rank == HUB {
            let listener = TcpListener::bind(addr).context("failed to listen for other ranks")?;
            Self::host(listener, size, timeout)
        } else {
            Self::join(addr, rank, size, timeout)
        }
    }

    /// Waits for the other `size - 1` ranks to connect to `listener`, giving up
    /// once `timeout` runs out.
    pub fn host(listener: TcpListener, size: usize, timeout: Duration) -> anyhow::Result<Self> {
        if size == 0 {
            bail!("need at least one rank");
        }
        info!(
            "waiting for {} ranks on {}",
            size - 1,
            listener.local_addr()?
        );
        listener.set_nonblocking(true)?;
        let deadline = Instant::now() + timeout;
        let mut workers: Vec<Option<TcpStream>> = (1..size).map(|_| None).collect();
        while workers.iter().any(Option::is_none) {
            let (stream, peer) = match listener.accept() {
                Ok(connection) => connection,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        let missing = workers.iter().filter(|slot| slot.is_none()).count();
                        bail!("timed out waiting for {missing} more ranks to connect");
                    }
                    thread::sleep(RETRY_INTERVAL);
                    continue;
                }
                Err(err) => return Err(err).context("failed to accept a rank"),
            };
            stream.set_nonblocking(false)?;
            stream.set_nodelay(true)?;
            let hello: Hello = read_frame(&stream)?;
            if hello.size != size {
                bail!(
                    "{peer} thinks there are {} ranks, but there are {size}",
                    hello.size
                );
            }
            let Some(slot) = hello
                .rank
                .checked_sub(1)
                .and_then(|index| workers.get_mut(index))
            else {
                bail!("{peer} claimed to be rank {}, which is out of range", hello.rank);
            };
            if slot.is_some() {
                bail!("{peer} claimed to be rank {}, which is already taken", hello.rank);
            }
            debug!("rank {} connected from {peer}", hello.rank);
            *slot = Some(stream);
        }
        Ok(Self {
            rank: HUB,
            size,
            role: Role::Hub {
                workers: workers.into_iter().flatten().collect(),
            },
        })
    }

    /// Connects to the hub at `addr` as `rank`, retrying until `timeout` runs out
    /// in case the hub isn't up yet.
    pub fn join(
        addr: impl ToSocketAddrs,
        rank: usize,
        size: usize,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        if rank == HUB || rank >= size {
            bail!("rank {rank} can't join a group of {size} ranks");
        }
        let addrs: Vec<_> = addr.to_socket_addrs()?.collect();
        let deadline = Instant::now() + timeout;
        let hub = loop {
            match TcpStream::connect(addrs.as_slice()) {
                Ok(stream) => break stream,
                Err(err) if Instant::now() < deadline => {
                    debug!("hub not reachable yet: {err}");
                    thread::sleep(RETRY_INTERVAL);
                }
                Err(err) => return Err(err).context("failed to connect to the hub"),
            }
        };
        hub.set_nodelay(true)?;
        write_frame(&hub, &Hello { rank, size })?;
        Ok(Self {
            rank,
            size,
            role: Role::Worker { hub },
        })
    }

    fn check_root(&self, root: usize) -> Result<(), SearchError> {
        if root != HUB {
            return Err(SearchError::Protocol(format!(
                "only rank {HUB} can be the root of a collective over TCP, not rank {root}"
            )));
        }
        Ok(())
    }
}

fn write_frame<T: Serialize>(mut stream: &TcpStream, value: &T) -> anyhow::Result<()> {
    let bytes = postcard::to_stdvec(value)?;
    let len = u32::try_from(bytes.len()).context("message too long to send")?;
    let mut frame = Vec::with_capacity(4 + bytes.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&bytes);
    stream.write_all(&frame)?;
    Ok(())
}

fn read_frame<T: DeserializeOwned>(stream: &TcpStream) -> anyhow::Result<T> {
    read_frame_from(stream)
}

fn read_frame_from<T: DeserializeOwned, R: Read>(mut reader: R) -> anyhow::Result<T> {
    let mut len = [0; 4];
    reader.read_exact(&mut len)?;
    let len = usize::try_from(u32::from_le_bytes(len))?;
    if len > MAX_FRAME_LEN {
        return Err(SearchError::Protocol(format!(
            "peer announced a {len} byte message, more than the limit of {MAX_FRAME_LEN}"
        ))
        .into());
    }
    let mut bytes = vec![0; len];
    reader.read_exact(&mut bytes)?;
    Ok(postcard::from_bytes(&bytes)?)
}

impl Collectives for TcpCollectives {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn broadcast<T: Payload>(&self, value: Option<T>, root: usize) -> anyhow::Result<T> {
        self.check_root(root)?;
        match &self.role {
            Role::Hub { workers } => {
                let value = root_value(value)?;
                for worker in workers {
                    write_frame(worker, &value)?;
                }
                Ok(value)
            }
            Role::Worker { hub } => read_frame(hub),
        }
    }

    fn scatter<T: Payload>(&self, chunks: Option<Vec<T>>, root: usize) -> anyhow::Result<T> {
        self.check_root(root)?;
        match &self.role {
            Role::Hub { workers } => {
                let mut chunks = root_chunks(chunks, self.size)?.into_iter();
                let own = root_value(chunks.next())?;
                for (worker, chunk) in workers.iter().zip(chunks) {
                    write_frame(worker, &chunk)?;
                }
                Ok(own)
            }
            Role::Worker { hub } => read_frame(hub),
        }
    }

    fn gather<T: Payload>(&self, value: T, root: usize) -> anyhow::Result<Option<Vec<T>>> {
        self.check_root(root)?;
        match &self.role {
            Role::Hub { workers } => {
                let mut values = Vec::with_capacity(self.size);
                values.push(value);
                for (i, worker) in workers.iter().enumerate() {
                    let value =
                        read_frame(worker).with_context(|| format!("lost rank {}", i + 1))?;
                    values.push(value);
                }
                Ok(Some(values))
            }
            Role::Worker { hub } => {
                write_frame(hub, &value)?;
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::thread;
    use std::time::{Duration, Instant};

    use pocket_solver::{
        parse_moves, search, solve_local, Collectives, Cube, Database, MoveSet, SearchConfig,
        SearchError,
    };
    use pretty_assertions::assert_eq;

    use super::{read_frame_from, TcpCollectives, MAX_FRAME_LEN};

    const TIMEOUT: Duration = Duration::from_secs(10);

    /// Runs `f` on `size` ranks connected over loopback, returning the results in
    /// rank order.
    fn run_tcp<R: Send>(
        size: usize,
        f: impl Fn(TcpCollectives) -> R + Sync,
    ) -> Vec<R> {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let f = &f;
        thread::scope(|s| {
            let workers: Vec<_> = (1..size)
                .map(|rank| {
                    s.spawn(move || f(TcpCollectives::join(addr, rank, size, TIMEOUT).unwrap()))
                })
                .collect();
            let mut results = vec![f(TcpCollectives::host(listener, size, TIMEOUT).unwrap())];
            results.extend(workers.into_iter().map(|handle| handle.join().unwrap()));
            results
        })
    }

    #[test]
    fn collectives() {
        let results = run_tcp(3, |comm| {
            let word = comm
                .broadcast((comm.rank() == 0).then(|| "cube".to_owned()), 0)
                .unwrap();
            let chunk = comm
                .scatter((comm.rank() == 0).then(|| vec![5u32, 6, 7]), 0)
                .unwrap();
            comm.barrier().unwrap();
            let gathered = comm.gather(chunk * 2, 0).unwrap();
            (word, chunk, gathered)
        });
        assert_eq!(
            results,
            [
                ("cube".to_owned(), 5, Some(vec![10, 12, 14])),
                ("cube".to_owned(), 6, None),
                ("cube".to_owned(), 7, None),
            ]
        );
    }

    #[test]
    fn only_hub_is_root() {
        let results = run_tcp(2, |comm| comm.broadcast(Some(1u8), 1));
        for result in results {
            let error = result.unwrap_err();
            assert!(matches!(
                error.downcast_ref::<SearchError>(),
                Some(SearchError::Protocol(_))
            ));
        }
    }

    #[test]
    fn hub_gives_up_on_missing_ranks() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let start = Instant::now();
        let error = TcpCollectives::host(listener, 3, Duration::from_millis(300))
            .err()
            .expect("no rank ever connected");
        assert!(error.to_string().contains("2 more ranks"), "{error}");
        assert!(start.elapsed() < TIMEOUT);
    }

    #[test]
    fn oversized_frame() {
        let mut frame = u32::MAX.to_le_bytes().to_vec();
        frame.extend_from_slice(&[0; 16]);
        let error = read_frame_from::<Vec<u8>, _>(frame.as_slice()).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<SearchError>(),
            Some(SearchError::Protocol(_))
        ));

        let len = u32::try_from(MAX_FRAME_LEN + 1).unwrap();
        let error = read_frame_from::<Vec<u8>, _>(&len.to_le_bytes()[..]).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<SearchError>(),
            Some(SearchError::Protocol(_))
        ));

        // A frame within the limit is read as usual.
        let mut frame = 2u32.to_le_bytes().to_vec();
        frame.extend_from_slice(&[1, 7]);
        assert_eq!(read_frame_from::<Vec<u8>, _>(frame.as_slice()).unwrap(), [7]);
    }

    #[test]
    fn search_matches_local() {
        let database = Database::generate(3, &MoveSet::restricted(), None);
        let query = Cube::SOLVED.apply_all(parse_moves("R U R' F U F' U' R'").unwrap());
        let config = SearchConfig::default();
        let local = solve_local(&database, query, 3, &config).unwrap();

        let results = run_tcp(3, |comm| search(&comm, &database, || Ok(query), &config));
        let mut results = results.into_iter();
        let report = results.next().unwrap().unwrap().unwrap();
        assert!(results.all(|result| result.unwrap().is_none()));
        assert_eq!(report, local);
    }
}
