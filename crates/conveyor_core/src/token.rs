//! Random token minting and the batch uid counter.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Default length for job tokens, resource uids, and group roots.
pub const TOKEN_LEN: usize = 5;

/// Generate a random alphanumeric token of length `n`.
///
/// The token space for the default length is 62^5 (~916 million), large
/// relative to expected graph sizes; callers that require uniqueness
/// within a set must still re-draw on collision.
#[must_use]
pub fn alnum_token(n: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(n)
        .map(char::from)
        .collect()
}

/// Counter for default batch uids.
///
/// Owned by whatever factory constructs batches, so batch construction
/// carries no hidden cross-instance coupling.
#[derive(Debug, Default)]
pub struct BatchCounter {
    next: u64,
}

impl BatchCounter {
    /// Uid prefix shared by every counter-minted batch uid.
    pub const UID_PREFIX: &'static str = "__BATCH__";

    /// Create a new counter starting at zero
    #[must_use]
    pub fn new() -> Self {
        Self { next: 0 }
    }

    /// Mint the next batch uid
    pub fn next_uid(&mut self) -> String {
        let uid = format!("{}{}", Self::UID_PREFIX, self.next);
        self.next += 1;
        uid
    }
}
