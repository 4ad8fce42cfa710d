//! The collective operations the distributed search is written against.
//!
//! Every rank takes part in every collective, in the same order. The rank named
//! as `root` supplies the value for `broadcast` and `scatter`, and receives the
//! values of `gather`.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::SearchError;

mod channel;

pub use channel::*;

/// Anything which can be sent between ranks.
pub trait Payload: Serialize + DeserializeOwned + Clone + Send + 'static {}

impl<T: Serialize + DeserializeOwned + Clone + Send + 'static> Payload for T {}

pub trait Collectives {
    /// This rank's index, in `0..self.size()`.
    fn rank(&self) -> usize;

    /// The number of ranks taking part.
    fn size(&self) -> usize;

    /// Sends `value` from `root` to every rank, including itself.
    ///
    /// `value` must be `Some` on `root` and is ignored elsewhere.
    fn broadcast<T: Payload>(&self, value: Option<T>, root: usize) -> anyhow::Result<T>;

    /// Sends `chunks[i]` from `root` to rank `i`.
    ///
    /// `chunks` must be `Some` on `root`, with exactly one chunk per rank, and is
    /// ignored elsewhere.
    fn scatter<T: Payload>(&self, chunks: Option<Vec<T>>, root: usize) -> anyhow::Result<T>;

    /// Collects every rank's `value` on `root`, in rank order. Returns `None`
    /// everywhere else.
    fn gather<T: Payload>(&self, value: T, root: usize) -> anyhow::Result<Option<Vec<T>>>;

    /// Blocks until every rank has reached the barrier.
    fn barrier(&self) -> anyhow::Result<()> {
        const ROOT: usize = 0;
        self.gather((), ROOT)?;
        self.broadcast((self.rank() == ROOT).then_some(()), ROOT)
    }
}

/// Checks the value `root` was given for a `broadcast`.
pub fn root_value<T>(value: Option<T>) -> Result<T, SearchError> {
    value.ok_or_else(|| SearchError::Protocol("the root of a broadcast must supply a value".into()))
}

/// Checks the chunks `root` was given for a `scatter`.
pub fn root_chunks<T>(chunks: Option<Vec<T>>, size: usize) -> Result<Vec<T>, SearchError> {
    let Some(chunks) = chunks else {
        return Err(SearchError::Protocol(
            "the root of a scatter must supply the chunks".into(),
        ));
    };
    if chunks.len() != size {
        return Err(SearchError::Protocol(format!(
            "tried to scatter {} chunks between {size} ranks",
            chunks.len()
        )));
    }
    Ok(chunks)
}
