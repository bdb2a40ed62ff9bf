//! Major-version schedule.
//!
//! The schedule is fully determined by configured upgrade heights: a block
//! at `height` must carry the highest major version whose upgrade height
//! is strictly below it. No voting.

pub const UPGRADE_HEIGHT_UNDEFINED: u32 = u32::MAX;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct UpgradeHeights {
    pub v2: u32,
    pub v3: u32,
    pub v4: u32,
    pub v5: u32,
    pub v6: u32,
}

impl UpgradeHeights {
    pub const fn disabled() -> Self {
        Self {
            v2: UPGRADE_HEIGHT_UNDEFINED,
            v3: UPGRADE_HEIGHT_UNDEFINED,
            v4: UPGRADE_HEIGHT_UNDEFINED,
            v5: UPGRADE_HEIGHT_UNDEFINED,
            v6: UPGRADE_HEIGHT_UNDEFINED,
        }
    }

    pub fn upgrade_height(&self, major_version: u8) -> u32 {
        match major_version {
            2 => self.v2,
            3 => self.v3,
            4 => self.v4,
            5 => self.v5,
            6 => self.v6,
            _ => UPGRADE_HEIGHT_UNDEFINED,
        }
    }

    pub fn major_version_for_height(&self, height: u32) -> u8 {
        for version in (2u8..=6).rev() {
            let upgrade = self.upgrade_height(version);
            if upgrade != UPGRADE_HEIGHT_UNDEFINED && height > upgrade {
                return version;
            }
        }
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_edges() {
        let heights = UpgradeHeights {
            v2: 100,
            v3: 200,
            ..UpgradeHeights::disabled()
        };
        assert_eq!(heights.major_version_for_height(0), 1);
        assert_eq!(heights.major_version_for_height(100), 1);
        assert_eq!(heights.major_version_for_height(101), 2);
        assert_eq!(heights.major_version_for_height(200), 2);
        assert_eq!(heights.major_version_for_height(201), 3);
        assert_eq!(heights.major_version_for_height(5_000_000), 3);
    }

    #[test]
    fn disabled_schedule_stays_v1() {
        let heights = UpgradeHeights::disabled();
        assert_eq!(heights.major_version_for_height(u32::MAX - 1), 1);
    }

    #[test]
    fn gaps_are_allowed() {
        let heights = UpgradeHeights {
            v5: 10,
            ..UpgradeHeights::disabled()
        };
        assert_eq!(heights.major_version_for_height(11), 5);
    }
}
