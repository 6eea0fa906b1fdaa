//! A module for defining the [`Workload`] a driver executes against a store.

use std::time::Duration;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::phase::Phase;

/// A builder for creating a [`Workload`].
#[derive(Debug)]
pub struct WorkloadBuilder {
    key_count: usize,
    key_size: usize,
    value_size: usize,
    frequency: usize,
    tick_interval: Duration,
    settle_delay: Duration,
    phases: Vec<Phase>,
}

impl WorkloadBuilder {
    /// Number of keys operated on per tick.
    pub fn key_count(mut self, key_count: usize) -> Self {
        self.key_count = key_count;
        self
    }

    /// Length of the random suffix of every key.
    pub fn key_size(mut self, key_size: usize) -> Self {
        self.key_size = key_size;
        self
    }

    /// Size in bytes of the value written by every put.
    pub fn value_size(mut self, value_size: usize) -> Self {
        self.value_size = value_size;
        self
    }

    /// Number of ticks per phase.
    pub fn frequency(mut self, frequency: usize) -> Self {
        self.frequency = frequency;
        self
    }

    /// Period of the tick timer.
    pub fn tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    /// Pause between the create and the delete phase.
    pub fn settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    /// The enabled phases. Order is irrelevant, phases always run in [`Phase::ALL`] order.
    pub fn phases(mut self, phases: impl IntoIterator<Item = Phase>) -> Self {
        self.phases = phases.into_iter().collect();
        self
    }

    /// Creates the workload instance.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidWorkload`] if the tick interval is zero.
    pub fn build(self) -> Result<Workload> {
        if self.tick_interval.is_zero() {
            return Err(Error::InvalidWorkload("tick interval must be non-zero"));
        }

        let phases = Phase::ALL
            .into_iter()
            .filter(|phase| self.phases.contains(phase))
            .collect();

        Ok(Workload {
            key_count: self.key_count,
            key_size: self.key_size,
            value_size: self.value_size,
            frequency: self.frequency,
            tick_interval: self.tick_interval,
            settle_delay: self.settle_delay,
            phases,
        })
    }
}

/// The immutable parameters of a run.
#[derive(Clone, Debug, PartialEq)]
pub struct Workload {
    pub(crate) key_count: usize,
    pub(crate) key_size: usize,
    pub(crate) value_size: usize,
    pub(crate) frequency: usize,
    pub(crate) tick_interval: Duration,
    pub(crate) settle_delay: Duration,
    /// Enabled phases in execution order.
    pub(crate) phases: Vec<Phase>,
}

impl Workload {
    /// Constructs a new workload builder with the reference defaults and all phases enabled.
    pub fn builder() -> WorkloadBuilder {
        WorkloadBuilder {
            key_count: 200,
            key_size: 102_400,
            value_size: 0,
            frequency: 1,
            tick_interval: Duration::from_secs(2),
            settle_delay: Duration::from_secs(5),
            phases: Phase::ALL.to_vec(),
        }
    }

    /// Derives the workload from the run configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let value_size = usize::try_from(config.value_size.as_u64())
            .map_err(|_| Error::InvalidWorkload("value size exceeds addressable memory"))?;

        Self::builder()
            .key_count(config.key_count)
            .key_size(config.key_size)
            .value_size(value_size)
            .frequency(config.frequency)
            .tick_interval(config.tick_interval)
            .settle_delay(config.settle_delay)
            .phases(config.phases())
            .build()
    }

    /// Number of keys operated on per tick.
    pub fn key_count(&self) -> usize {
        self.key_count
    }

    /// Length of the random suffix of every key.
    pub fn key_size(&self) -> usize {
        self.key_size
    }

    /// Size in bytes of the value written by every put.
    pub fn value_size(&self) -> usize {
        self.value_size
    }

    /// Returns whether the given phase is enabled.
    pub fn is_enabled(&self, phase: Phase) -> bool {
        self.phases.contains(&phase)
    }
}
