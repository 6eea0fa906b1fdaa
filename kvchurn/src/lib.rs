//! A synthetic workload generator for the write path of a revisioned key-value store.
//!
//! A run generates a fixed [`KeySet`](keys::KeySet) once, then drives it through a sequence of
//! [`Phase`]s: every key is put once per tick during the create phase, and deleted once per tick
//! during the delete phase. Ticks are paced by a periodic timer, and the outcome of every tick is
//! logged and folded into a [`RunReport`].
//!
//! The store is consumed through the [`KvClient`] trait. [`EtcdClient`](etcd::EtcdClient) talks to
//! etcd's JSON gateway, [`InMemoryStore`](memory::InMemoryStore) serves tests.
//!
//! Per-key failures never stop a run. The process only fails before the first phase, when the
//! configuration is invalid or the store cannot be reached.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod churn;
pub mod cli;
pub mod client;
pub mod config;
pub mod driver;
pub mod error;
pub mod etcd;
pub mod keys;
pub mod memory;
pub mod observability;
pub mod phase;
pub mod report;
pub mod workload;

pub use crate::churn::run;
pub use crate::client::KvClient;
pub use crate::error::{Error, Result};
pub use crate::phase::{Phase, RunReport};
pub use crate::workload::Workload;
