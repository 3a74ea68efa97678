use serde::{Deserialize, Serialize};

use crate::models::test_attempt::TestAttempt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Badge {
    Gold,
    Silver,
    Bronze,
}

impl Badge {
    pub fn for_rank(rank: u32) -> Option<Self> {
        match rank {
            1 => Some(Badge::Gold),
            2 => Some(Badge::Silver),
            3 => Some(Badge::Bronze),
            _ => None,
        }
    }
}

/// Recomputed on every ranking pass; never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub attempt: TestAttempt,
    pub rank: u32,
    pub badge: Option<Badge>,
}
