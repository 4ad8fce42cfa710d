//! Collectives between threads of one process.

use std::any::Any;
use std::panic;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use log::debug;

use super::{root_chunks, root_value, Collectives, Payload};
use crate::SearchError;

type Envelope = Box<dyn Any + Send>;

/// One rank's endpoint of a full mesh of channels.
pub struct ChannelCollectives {
    rank: usize,
    /// `senders[i]` sends to rank `i`.
    senders: Vec<Sender<Envelope>>,
    /// `receivers[i]` receives from rank `i`.
    receivers: Vec<Receiver<Envelope>>,
}

impl ChannelCollectives {
    /// Creates the endpoints for `size` ranks, in rank order.
    pub fn group(size: usize) -> Vec<Self> {
        let mut senders: Vec<Vec<Sender<Envelope>>> =
            (0..size).map(|_| Vec::with_capacity(size)).collect();
        let mut receivers: Vec<Vec<Receiver<Envelope>>> =
            (0..size).map(|_| Vec::with_capacity(size)).collect();
        for from in 0..size {
            for to in 0..size {
                let (tx, rx) = mpsc::channel();
                senders[from].push(tx);
                receivers[to].push(rx);
            }
        }
        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (senders, receivers))| Self {
                rank,
                senders,
                receivers,
            })
            .collect()
    }

    fn send<T: Payload>(&self, to: usize, value: T) -> Result<(), SearchError> {
        self.senders[to]
            .send(Box::new(value))
            .map_err(|_| SearchError::Protocol(format!("rank {to} hung up")))
    }

    fn recv<T: Payload>(&self, from: usize) -> Result<T, SearchError> {
        let envelope = self.receivers[from]
            .recv()
            .map_err(|_| SearchError::Protocol(format!("rank {from} hung up")))?;
        envelope.downcast::<T>().map(|value| *value).map_err(|_| {
            SearchError::Protocol(format!(
                "rank {from} sent a different message than rank {} expected",
                self.rank
            ))
        })
    }
}

impl Collectives for ChannelCollectives {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.senders.len()
    }

    fn broadcast<T: Payload>(&self, value: Option<T>, root: usize) -> anyhow::Result<T> {
        if self.rank != root {
            return Ok(self.recv(root)?);
        }
        let value = root_value(value)?;
        for rank in (0..self.size()).filter(|&rank| rank != root) {
            self.send(rank, value.clone())?;
        }
        Ok(value)
    }

    fn scatter<T: Payload>(&self, chunks: Option<Vec<T>>, root: usize) -> anyhow::Result<T> {
        if self.rank != root {
            return Ok(self.recv(root)?);
        }
        let mut own = None;
        for (rank, chunk) in root_chunks(chunks, self.size())?.into_iter().enumerate() {
            if rank == root {
                own = Some(chunk);
            } else {
                self.send(rank, chunk)?;
            }
        }
        Ok(root_value(own)?)
    }

    fn gather<T: Payload>(&self, value: T, root: usize) -> anyhow::Result<Option<Vec<T>>> {
        if self.rank != root {
            self.send(root, value)?;
            return Ok(None);
        }
        let mut own = Some(value);
        let mut values = Vec::with_capacity(self.size());
        for rank in 0..self.size() {
            if rank == root {
                values.extend(own.take());
            } else {
                values.push(self.recv(rank)?);
            }
        }
        debug!("gathered {} values on rank {root}", values.len());
        Ok(Some(values))
    }
}

/// Runs `f` once for each of `size` ranks, each on its own thread with its own
/// endpoint, and returns the results in rank order.
pub fn run_ranks<R, F>(size: usize, f: F) -> anyhow::Result<Vec<R>>
where
    R: Send,
    F: Fn(ChannelCollectives) -> R + Sync,
{
    let f = &f;
    thread::scope(|s| {
        let handles = ChannelCollectives::group(size)
            .into_iter()
            .map(|comm| {
                thread::Builder::new()
                    .name(format!("rank {}", comm.rank()))
                    .spawn_scoped(s, move || f(comm))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|payload| panic::resume_unwind(payload))
            })
            .collect())
    })
}
