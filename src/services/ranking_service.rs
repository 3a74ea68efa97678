use std::cmp::Ordering;

use crate::models::leaderboard::{Badge, RankedEntry};
use crate::models::test_attempt::TestAttempt;

/// Standard-competition ("1224") ranks for an already-sorted sequence.
/// An element gets a new rank only when its key differs from the previous
/// element's; the new rank is its 1-based position.
pub fn competition_ranks<T, K, F>(sorted: &[T], key: F) -> Vec<u32>
where
    K: PartialEq,
    F: Fn(&T) -> K,
{
    let mut ranks = Vec::with_capacity(sorted.len());
    let mut previous: Option<K> = None;
    let mut rank = 0u32;
    for (idx, item) in sorted.iter().enumerate() {
        let k = key(item);
        if previous.as_ref() != Some(&k) {
            rank = idx as u32 + 1;
        }
        ranks.push(rank);
        previous = Some(k);
    }
    ranks
}

/// Malformed (inverted) durations rank as zero.
fn duration_millis(attempt: &TestAttempt) -> i64 {
    attempt.duration().map(|d| d.num_milliseconds()).unwrap_or(0)
}

fn compare(a: &TestAttempt, b: &TestAttempt) -> Ordering {
    b.score_percentage
        .cmp(&a.score_percentage)
        .then_with(|| duration_millis(a).cmp(&duration_millis(b)))
        .then_with(|| a.end_time.cmp(&b.end_time))
        .then_with(|| a.id.cmp(&b.id))
}

/// Orders one test's attempts by score (desc) then duration (asc) and
/// assigns shared ranks and medal badges. Ties on (score, duration) share a
/// rank; the display order inside a tie is fixed by end time, then id, so
/// the output does not depend on input order.
pub fn rank_attempts(attempts: &[TestAttempt]) -> Vec<RankedEntry> {
    let mut sorted: Vec<&TestAttempt> = attempts.iter().collect();
    sorted.sort_by(|a, b| compare(a, b));

    let ranks = competition_ranks(&sorted, |a| (a.score_percentage, duration_millis(a)));

    sorted
        .into_iter()
        .zip(ranks)
        .map(|(attempt, rank)| RankedEntry {
            attempt: attempt.clone(),
            rank,
            badge: Badge::for_rank(rank),
        })
        .collect()
}
