//! Key allocation.
//!
//! Every instance, element instance and job key comes from one injected
//! [`KeyGenerator`]. Keys are unique and strictly increasing for the life of
//! the generator.

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::types::{EngineConfig, KeyGeneratorKind};

/// Highest node id a snowflake key can carry (10 bits).
pub const MAX_NODE_ID: u16 = 1023;

const NODE_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const MAX_SEQUENCE: i64 = (1 << SEQUENCE_BITS) - 1;

/// 2024-01-01T00:00:00Z in milliseconds.
const SNOWFLAKE_EPOCH_MS: i64 = 1_704_067_200_000;

/// Produces unique `i64` keys.
#[cfg_attr(test, mockall::automock)]
pub trait KeyGenerator: Send + Sync {
    fn generate_key(&self) -> i64;
}

/// Atomic counter.
#[derive(Debug)]
pub struct SequentialKeyGenerator {
    next: AtomicI64,
}

impl SequentialKeyGenerator {
    pub fn new(seed: i64) -> Self {
        Self {
            next: AtomicI64::new(seed),
        }
    }
}

impl Default for SequentialKeyGenerator {
    fn default() -> Self {
        Self::new(1)
    }
}

impl KeyGenerator for SequentialKeyGenerator {
    fn generate_key(&self) -> i64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

/// Timestamp | node | sequence keys.
///
/// Layout: 41 bits of milliseconds since 2024-01-01, 10 bits node id,
/// 12 bits per-millisecond sequence. When the clock stalls or steps back the
/// generator keeps counting from its last timestamp, borrowing the next
/// millisecond once the sequence is exhausted.
#[derive(Debug)]
pub struct SnowflakeKeyGenerator {
    node_id: i64,
    state: Mutex<SnowflakeState>,
}

#[derive(Debug, Default)]
struct SnowflakeState {
    last_ms: i64,
    sequence: i64,
}

impl SnowflakeKeyGenerator {
    /// Node ids above [`MAX_NODE_ID`] are masked to 10 bits.
    pub fn new(node_id: u16) -> Self {
        Self {
            node_id: i64::from(node_id & MAX_NODE_ID),
            state: Mutex::new(SnowflakeState::default()),
        }
    }

    fn next_key(&self, now_ms: i64) -> i64 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let elapsed = (now_ms - SNOWFLAKE_EPOCH_MS).max(0);

        if elapsed > state.last_ms {
            state.last_ms = elapsed;
            state.sequence = 0;
        } else if state.sequence < MAX_SEQUENCE {
            state.sequence += 1;
        } else {
            state.last_ms += 1;
            state.sequence = 0;
        }

        (state.last_ms << (NODE_BITS + SEQUENCE_BITS))
            | (self.node_id << SEQUENCE_BITS)
            | state.sequence
    }
}

impl KeyGenerator for SnowflakeKeyGenerator {
    fn generate_key(&self) -> i64 {
        self.next_key(Utc::now().timestamp_millis())
    }
}

/// Build the generator selected by the engine configuration.
pub fn from_config(config: &EngineConfig) -> Box<dyn KeyGenerator> {
    match config.key_generator {
        KeyGeneratorKind::Sequential => Box::new(SequentialKeyGenerator::new(config.key_seed)),
        KeyGeneratorKind::Snowflake => Box::new(SnowflakeKeyGenerator::new(config.node_id)),
    }
}
