//! SQLite backend for Kaji team state.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. Every team-state write is
//! serialised through the team's revision counter and announced on the
//! store's [`TeamEventHub`](kaji_core::hub::TeamEventHub) after commit.

mod closing;
mod coordinator;
mod encode;
mod revision;
mod schema;
mod store;
mod tx;

pub mod error;

pub use coordinator::{BEST_EFFORT_ATTEMPTS, Committed, Guard, Mutation};
pub use error::{Error, Result};
pub use store::{Snapshot, SqliteStore};
pub use tx::TeamTx;
