#[cfg(test)]
mod memory;
mod rest;

#[cfg(test)]
pub use memory::MemoryStore;
pub use rest::RestStore;

use crate::error::Result;
use crate::models::NewVote;
use async_trait::async_trait;

/// Remote `votes` table. No uniqueness is enforced on `user_agent`; callers
/// check with `find_vote` before inserting.
#[async_trait]
pub trait VoteStore: Send + Sync {
    /// Whether any record carries this fingerprint. Existence only, at most one row is read.
    async fn find_vote(&self, fingerprint: &str) -> Result<bool>;

    /// `option_id` of every stored record, unpaginated.
    async fn option_ids(&self) -> Result<Vec<i64>>;

    async fn insert_vote(&self, vote: NewVote) -> Result<()>;
}
