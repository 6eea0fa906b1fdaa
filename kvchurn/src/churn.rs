//! Wires configuration, key generation and the driver into a single run.

use tokio_util::sync::CancellationToken;

use crate::client::KvClient;
use crate::config::Config;
use crate::driver::Driver;
use crate::error::Result;
use crate::keys::KeyGenerator;
use crate::phase::RunReport;
use crate::workload::Workload;

/// Runs all phases enabled in `config` against `client`.
///
/// The key set and the value payload are generated once, before the first phase starts. Unless a
/// seed is configured, a random seed is drawn and logged so that the run can be reproduced.
///
/// # Errors
///
/// Fails only if the configuration does not describe a valid [`Workload`]. Store errors are
/// accounted for in the returned [`RunReport`].
pub async fn run<C: KvClient>(
    config: &Config,
    client: C,
    token: &CancellationToken,
) -> Result<RunReport> {
    let workload = Workload::from_config(config)?;

    let mut generator = match config.seed {
        Some(seed) => KeyGenerator::new(seed),
        None => KeyGenerator::from_entropy(),
    }
    .with_prefix(config.key_prefix.as_str());

    tracing::info!(
        seed = generator.seed(),
        key_count = workload.key_count(),
        key_size = workload.key_size(),
        operations_per_phase = workload.key_count().saturating_mul(config.frequency),
        "generating keys"
    );
    let keys = generator.generate(workload.key_count(), workload.key_size());
    let value = generator.payload(workload.value_size());

    let driver = Driver::with_value(workload, client, keys, value);
    Ok(driver.run(token).await)
}
