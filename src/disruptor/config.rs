//! Configuration
//!
//! Serializable description of a ring buffer and its consumers' threading.
//! Every field has a default, so a config file only needs to name what it
//! changes.

use crate::disruptor::{
    is_power_of_two, BlockingWaitStrategy, BusySpinWaitStrategy, DisruptorError,
    LiteBlockingWaitStrategy, ProducerType, Result, SleepingWaitStrategy, ThreadExecutor,
    TimeoutBlockingWaitStrategy, WaitStrategy, YieldingWaitStrategy,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;

/// Wait strategy selection
///
/// Serialized with a `kind` tag, e.g. `{"kind": "sleeping", "retries": 200}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WaitStrategyConfig {
    BusySpin,
    Yielding {
        #[serde(default = "default_spin_tries")]
        spin_tries: u32,
    },
    Sleeping {
        #[serde(default = "default_retries")]
        retries: u32,
        #[serde(default = "default_sleep_nanos")]
        sleep_nanos: u64,
    },
    #[default]
    Blocking,
    LiteBlocking,
    TimeoutBlocking {
        timeout_ms: u64,
    },
}

fn default_spin_tries() -> u32 {
    100
}

fn default_retries() -> u32 {
    200
}

fn default_sleep_nanos() -> u64 {
    100
}

impl WaitStrategyConfig {
    /// Instantiate the configured strategy
    pub fn build(&self) -> Arc<dyn WaitStrategy> {
        match *self {
            WaitStrategyConfig::BusySpin => Arc::new(BusySpinWaitStrategy::new()),
            WaitStrategyConfig::Yielding { spin_tries } => {
                Arc::new(YieldingWaitStrategy::with_spin_tries(spin_tries))
            }
            WaitStrategyConfig::Sleeping {
                retries,
                sleep_nanos,
            } => Arc::new(SleepingWaitStrategy::with_backoff(
                retries,
                Duration::from_nanos(sleep_nanos),
            )),
            WaitStrategyConfig::Blocking => Arc::new(BlockingWaitStrategy::new()),
            WaitStrategyConfig::LiteBlocking => Arc::new(LiteBlockingWaitStrategy::new()),
            WaitStrategyConfig::TimeoutBlocking { timeout_ms } => Arc::new(
                TimeoutBlockingWaitStrategy::new(Duration::from_millis(timeout_ms)),
            ),
        }
    }
}

/// Ring buffer and consumer threading configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisruptorConfig {
    /// Number of slots, a power of two
    pub buffer_size: usize,
    pub producer_type: ProducerType,
    pub wait_strategy: WaitStrategyConfig,
    /// Consumer threads are named `{thread_name_prefix}-{n}`
    pub thread_name_prefix: String,
    /// Pin consumer threads to cores round-robin
    pub pin_to_cores: bool,
}

impl Default for DisruptorConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1024,
            producer_type: ProducerType::default(),
            wait_strategy: WaitStrategyConfig::default(),
            thread_name_prefix: "chainring".to_string(),
            pin_to_cores: false,
        }
    }
}

impl DisruptorConfig {
    /// Check the values serde cannot check
    ///
    /// # Errors
    /// Returns [`DisruptorError::InvalidBufferSize`] or
    /// [`DisruptorError::InvalidConfiguration`].
    pub fn validate(&self) -> Result<()> {
        if !is_power_of_two(self.buffer_size) {
            return Err(DisruptorError::InvalidBufferSize(self.buffer_size));
        }
        if self.thread_name_prefix.is_empty() {
            return Err(DisruptorError::InvalidConfiguration(
                "thread_name_prefix must not be empty".to_string(),
            ));
        }
        if let WaitStrategyConfig::TimeoutBlocking { timeout_ms: 0 } = self.wait_strategy {
            return Err(DisruptorError::InvalidConfiguration(
                "timeout_blocking needs a timeout_ms above zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(DisruptorError::ConfigIo)?;
        Self::from_json_str(&content)
    }

    /// Write the config as pretty-printed JSON
    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .await
            .map_err(DisruptorError::ConfigIo)
    }

    pub fn build_wait_strategy(&self) -> Arc<dyn WaitStrategy> {
        self.wait_strategy.build()
    }

    /// A thread executor following the naming and pinning settings
    pub fn thread_executor(&self) -> ThreadExecutor {
        let executor = ThreadExecutor::new(self.thread_name_prefix.clone());
        if self.pin_to_cores {
            executor.with_core_pinning()
        } else {
            executor
        }
    }
}
