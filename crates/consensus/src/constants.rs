//! Protocol-wide numeric constants.

/// Unlock times below this sentinel are heights; above, Unix timestamps.
pub const MAX_BLOCK_NUMBER: u64 = 500_000_000;

pub const MAX_BLOCK_BLOB_SIZE: usize = 500_000_000;
pub const MAX_TX_SIZE: usize = 1_000_000_000;

/// Parent block section size cap for merge-mined major versions.
pub const MAX_PARENT_BLOCK_SIZE: usize = 2048;

pub const COIN: u64 = 100_000_000;

pub const MONEY_SUPPLY: u64 = u64::MAX;
pub const EMISSION_SPEED_FACTOR: u8 = 18;

pub const DIFFICULTY_TARGET_SECONDS: u64 = 120;
pub const DIFFICULTY_WINDOW: usize = 720;
pub const DIFFICULTY_CUT: usize = 60;
pub const DIFFICULTY_LAG: usize = 15;
/// LWMA averaging window for the v4+ calculator.
pub const DIFFICULTY_WINDOW_LWMA: usize = 60;

pub const TIMESTAMP_CHECK_WINDOW: usize = 60;
pub const TIMESTAMP_CHECK_WINDOW_V4: usize = 11;

pub const BLOCK_FUTURE_TIME_LIMIT_SECONDS: u64 = 60 * 60 * 2;
pub const BLOCK_FUTURE_TIME_LIMIT_SECONDS_V4: u64 = 60 * 28;

pub const MINED_MONEY_UNLOCK_WINDOW: u32 = 60;
pub const MINED_MONEY_UNLOCK_WINDOW_V5: u32 = 10;

pub const REWARD_BLOCKS_WINDOW: usize = 100;
pub const GRANTED_FULL_REWARD_ZONE_V1: usize = 20_000;
pub const GRANTED_FULL_REWARD_ZONE_V2: usize = 30_000;
pub const GRANTED_FULL_REWARD_ZONE_V3: usize = 100_000;
pub const COINBASE_BLOB_RESERVED_SIZE: usize = 600;

pub const MAX_BLOCK_SIZE_INITIAL: u64 = 1_000_000;
pub const MAX_BLOCK_SIZE_GROWTH_PER_YEAR: u64 = 100 * 1024;

pub const LOCKED_TX_ALLOWED_DELTA_BLOCKS: u64 = 1;

/// Alternative-chain reorgs at or beyond this length run the timestamp
/// plausibility gate.
pub const POISSON_CHECK_TRIGGER: usize = 10;
/// Main-chain blocks sampled below the common ancestor by the gate.
pub const POISSON_CHECK_DEPTH: usize = 60;
pub const POISSON_LOG_P_REJECT: f64 = -75.0;

pub const GENESIS_NONCE: u32 = 70;
