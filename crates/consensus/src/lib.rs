//! Consensus constants, currency parameters, rewards and checkpoints.

pub mod checkpoints;
pub mod constants;
pub mod money;
pub mod params;
pub mod rewards;
pub mod upgrades;

pub use basalt_crypto::Hash256;
pub use checkpoints::{CheckpointError, Checkpoints};
pub use money::{format_amount, Amount};
pub use params::{Currency, Network};
pub use rewards::{get_block_reward, RewardError};
pub use upgrades::{UpgradeHeights, UPGRADE_HEIGHT_UNDEFINED};
