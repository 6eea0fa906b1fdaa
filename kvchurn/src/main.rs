//! Runs create and delete churn against a revisioned key-value store.
//!
//! See the `kvchurn` library for a description of the phases, and [`kvchurn::config`] for all
//! configuration options.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

fn main() -> anyhow::Result<()> {
    kvchurn::cli::execute()
}
