//! Progression stages.
//!
//! A user's stage is the number of thresholds their direct active
//! downline has reached. Reaching every threshold is the `Top` stage.
//!
//! | Direct active downline | Stage |
//! |------------------------|-------|
//! | 0 - 499 | 0 |
//! | 500 - 1499 | 1 |
//! | 1500 - 6499 | 2 |
//! | 6500 - 16499 | 3 |
//! | 16500 - 36499 | 4 |
//! | 36500+ | top |

use serde::{Serialize, Serializer};

/// Ascending stage thresholds. Reaching a threshold exactly advances.
pub const STAGE_THRESHOLDS: [i64; 5] = [500, 1_500, 6_500, 16_500, 36_500];

/// Number of pool buckets: ten numbered stages plus `Top`.
pub const STAGE_BUCKETS: usize = 11;

/// Progression stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Level(u8),
    Top,
}

impl Stage {
    /// Index into the 11 pool buckets. `Top` is always the last bucket.
    pub fn bucket_index(&self) -> usize {
        match self {
            Stage::Level(level) => usize::from(*level).min(STAGE_BUCKETS - 2),
            Stage::Top => STAGE_BUCKETS - 1,
        }
    }
}

/// Serialized as the level number, or the string `"top"`.
impl Serialize for Stage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Stage::Level(level) => serializer.serialize_u8(*level),
            Stage::Top => serializer.serialize_str("top"),
        }
    }
}

/// Classify a direct active downline count.
pub fn compute_stage(direct_active_downline: i64) -> Stage {
    let reached = STAGE_THRESHOLDS
        .iter()
        .take_while(|threshold| direct_active_downline >= **threshold)
        .count();

    if reached == STAGE_THRESHOLDS.len() {
        Stage::Top
    } else {
        // reached < 5, always fits
        Stage::Level(reached as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_boundaries() {
        assert_eq!(compute_stage(0), Stage::Level(0));
        assert_eq!(compute_stage(499), Stage::Level(0));
        assert_eq!(compute_stage(500), Stage::Level(1));
        assert_eq!(compute_stage(1_499), Stage::Level(1));
        assert_eq!(compute_stage(1_500), Stage::Level(2));
        assert_eq!(compute_stage(6_500), Stage::Level(3));
        assert_eq!(compute_stage(16_499), Stage::Level(3));
        assert_eq!(compute_stage(16_500), Stage::Level(4));
        assert_eq!(compute_stage(36_499), Stage::Level(4));
        assert_eq!(compute_stage(36_500), Stage::Top);
        assert_eq!(compute_stage(1_000_000), Stage::Top);
    }

    #[test]
    fn test_negative_count_is_stage_zero() {
        assert_eq!(compute_stage(-3), Stage::Level(0));
    }

    #[test]
    fn test_bucket_index() {
        assert_eq!(Stage::Level(0).bucket_index(), 0);
        assert_eq!(Stage::Level(4).bucket_index(), 4);
        assert_eq!(Stage::Top.bucket_index(), 10);
    }

    #[test]
    fn test_serialize() {
        assert_eq!(serde_json::to_string(&Stage::Level(2)).unwrap(), "2");
        assert_eq!(serde_json::to_string(&Stage::Top).unwrap(), "\"top\"");
    }
}
