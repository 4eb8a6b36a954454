//! Data-access layer
//!
//! The connection pool, the store backend trait with its MongoDB
//! implementation, the Gateway facade, write queueing, and bulk transfer.

pub mod backend;
pub mod gateway;
pub mod pool;
pub mod queue;
pub mod schemas;
pub mod transfer;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{Backend, MongoBackend, UpdateSummary};
pub use gateway::{
    CreateOutcome, Gateway, PageInfo, PageRequest, ReadOptions, ReadOutcome, ReadSelector,
    UpdateSelector,
};
pub use pool::ConnectionPool;
pub use queue::{FlushReport, QueueConfig, WriteQueue};
pub use transfer::{copy_collection, CopyConfig, CopyReport};
