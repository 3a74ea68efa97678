use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::models::test_attempt::TestAttempt;
use crate::services::ranking_service::competition_ranks;
use crate::utils::time::{start_of_month, start_of_next_month, start_of_next_week, start_of_week};

pub const AT_RISK_THRESHOLD: f64 = 50.0;
pub const NEEDS_ATTENTION_THRESHOLD: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimeWindow {
    Week,
    #[default]
    Month,
    Lifetime,
}

/// Half-open `[start, end)` range; `None` bounds are open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl WindowRange {
    pub fn unbounded() -> Self {
        Self {
            start: None,
            end: None,
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| ts >= s) && self.end.map_or(true, |e| ts < e)
    }
}

impl TimeWindow {
    /// Calendar range containing `now`, evaluated in `now`'s offset.
    pub fn range(self, now: DateTime<FixedOffset>) -> WindowRange {
        let bounds = match self {
            TimeWindow::Lifetime => return WindowRange::unbounded(),
            TimeWindow::Week => start_of_week(now).zip(start_of_next_week(now)),
            TimeWindow::Month => start_of_month(now).zip(start_of_next_month(now)),
        };
        match bounds {
            Some((start, end)) => WindowRange {
                start: Some(start),
                end: Some(end),
            },
            None => {
                tracing::warn!(window = ?self, %now, "Could not compute window bounds, using lifetime");
                WindowRange::unbounded()
            }
        }
    }
}

/// Attempts submitted (by end time) inside the window.
pub fn filter_window<'a>(
    attempts: &'a [TestAttempt],
    window: TimeWindow,
    now: DateTime<FixedOffset>,
) -> Vec<&'a TestAttempt> {
    let range = window.range(now);
    attempts.iter().filter(|a| range.contains(a.end_time)).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub window: TimeWindow,
    pub submissions: usize,
    pub unique_participants: usize,
    pub mean_score: f64,
    pub mean_duration_seconds: f64,
    pub suspicious_count: usize,
    /// Participants whose mean score is below 50%.
    pub at_risk_participants: usize,
    /// Participants whose mean score is below 30%.
    pub needs_attention_participants: usize,
}

fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Attempts with inverted timestamps are left out of duration means.
fn mean_duration(attempts: &[&TestAttempt]) -> f64 {
    mean(
        attempts
            .iter()
            .filter_map(|a| a.duration())
            .map(|d| d.num_milliseconds() as f64 / 1000.0),
    )
}

fn mean_score(attempts: &[&TestAttempt]) -> f64 {
    mean(attempts.iter().map(|a| a.score_percentage as f64))
}

fn by_participant<'a>(attempts: &[&'a TestAttempt]) -> BTreeMap<&'a str, Vec<&'a TestAttempt>> {
    let mut grouped: BTreeMap<&str, Vec<&TestAttempt>> = BTreeMap::new();
    for a in attempts {
        grouped.entry(a.participant_id.as_str()).or_default().push(a);
    }
    grouped
}

pub fn window_stats(attempts: &[TestAttempt], window: TimeWindow, now: DateTime<FixedOffset>) -> WindowStats {
    let windowed = filter_window(attempts, window, now);
    let participants = by_participant(&windowed);
    let participant_means: Vec<f64> = participants.values().map(|list| mean_score(list)).collect();

    WindowStats {
        window,
        submissions: windowed.len(),
        unique_participants: participants.len(),
        mean_score: mean_score(&windowed),
        mean_duration_seconds: mean_duration(&windowed),
        suspicious_count: windowed.iter().filter(|a| a.is_suspicious).count(),
        at_risk_participants: participant_means.iter().filter(|m| **m < AT_RISK_THRESHOLD).count(),
        needs_attention_participants: participant_means
            .iter()
            .filter(|m| **m < NEEDS_ATTENTION_THRESHOLD)
            .count(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopperEntry {
    pub rank: u32,
    pub participant_id: String,
    pub participant_name: Option<String>,
    pub tests_topped: usize,
    pub mean_score: f64,
    pub mean_duration_seconds: f64,
}

/// Participants who achieved the best score on at least one test inside the
/// window. Everyone tying for a test's maximum tops that test.
pub fn toppers(attempts: &[TestAttempt], window: TimeWindow, now: DateTime<FixedOffset>) -> Vec<TopperEntry> {
    let windowed = filter_window(attempts, window, now);

    let mut best_per_test: BTreeMap<&str, u32> = BTreeMap::new();
    for a in &windowed {
        let best = best_per_test.entry(a.test_id.as_str()).or_insert(a.score_percentage);
        *best = (*best).max(a.score_percentage);
    }

    let mut topped: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for a in &windowed {
        if best_per_test.get(a.test_id.as_str()) == Some(&a.score_percentage) {
            topped
                .entry(a.participant_id.as_str())
                .or_default()
                .insert(a.test_id.as_str());
        }
    }

    let participants = by_participant(&windowed);
    let mut entries: Vec<TopperEntry> = topped
        .into_iter()
        .map(|(participant_id, tests)| {
            let list = participants.get(participant_id).map(Vec::as_slice).unwrap_or(&[]);
            TopperEntry {
                rank: 0,
                participant_id: participant_id.to_string(),
                participant_name: list.iter().rev().find_map(|a| a.participant_name.clone()),
                tests_topped: tests.len(),
                mean_score: mean_score(list),
                mean_duration_seconds: mean_duration(list),
            }
        })
        .collect();

    entries.sort_by(|a, b| {
        b.tests_topped
            .cmp(&a.tests_topped)
            .then_with(|| b.mean_score.total_cmp(&a.mean_score))
            .then_with(|| a.mean_duration_seconds.total_cmp(&b.mean_duration_seconds))
            .then_with(|| a.participant_id.cmp(&b.participant_id))
    });

    let ranks = competition_ranks(&entries, |e| {
        (e.tests_topped, e.mean_score.to_bits(), e.mean_duration_seconds.to_bits())
    });
    for (entry, rank) in entries.iter_mut().zip(ranks) {
        entry.rank = rank;
    }
    entries
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantSummary {
    pub participant_id: String,
    pub attempts: usize,
    pub tests_taken: usize,
    pub mean_score: f64,
    pub best_score: Option<u32>,
    pub mean_duration_seconds: f64,
    pub suspicious_count: usize,
}

pub fn participant_summary(attempts: &[TestAttempt], participant_id: &str) -> ParticipantSummary {
    let own: Vec<&TestAttempt> = attempts
        .iter()
        .filter(|a| a.participant_id == participant_id)
        .collect();
    ParticipantSummary {
        participant_id: participant_id.to_string(),
        attempts: own.len(),
        tests_taken: own.iter().map(|a| a.test_id.as_str()).collect::<BTreeSet<_>>().len(),
        mean_score: mean_score(&own),
        best_score: own.iter().map(|a| a.score_percentage).max(),
        mean_duration_seconds: mean_duration(&own),
        suspicious_count: own.iter().filter(|a| a.is_suspicious).count(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSummary {
    pub test_id: String,
    pub attempts: usize,
    pub unique_participants: usize,
    pub mean_score: f64,
    pub highest_score: Option<u32>,
    pub lowest_score: Option<u32>,
    pub mean_duration_seconds: f64,
}

pub fn test_summary(attempts: &[TestAttempt], test_id: &str) -> TestSummary {
    let own: Vec<&TestAttempt> = attempts.iter().filter(|a| a.test_id == test_id).collect();
    TestSummary {
        test_id: test_id.to_string(),
        attempts: own.len(),
        unique_participants: by_participant(&own).len(),
        mean_score: mean_score(&own),
        highest_score: own.iter().map(|a| a.score_percentage).max(),
        lowest_score: own.iter().map(|a| a.score_percentage).min(),
        mean_duration_seconds: mean_duration(&own),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_attempt::ScoredAnswer;
    use crate::utils::time::from_rfc3339;
    use chrono::Duration;
    use uuid::Uuid;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn at(ts: &str) -> DateTime<FixedOffset> {
        from_rfc3339(ts).unwrap().with_timezone(&utc())
    }

    fn attempt(participant: &str, test: &str, score: u32, secs: i64, end: &str) -> TestAttempt {
        let end_time = from_rfc3339(end).unwrap();
        TestAttempt {
            id: Uuid::new_v4(),
            test_id: test.into(),
            participant_id: participant.into(),
            participant_name: Some(participant.to_uppercase()),
            start_time: end_time - Duration::seconds(secs),
            end_time,
            answers: vec![ScoredAnswer {
                question_id: "q1".into(),
                raw_answer: None,
                is_correct: score > 0,
                points_awarded: 0,
            }],
            points_awarded: 0,
            max_possible_points: 1,
            score_percentage: score,
            is_suspicious: false,
            suspicious_reason: None,
            tab_switches: 0,
            activity_log: Vec::new(),
        }
    }

    #[test]
    fn month_boundary_is_exclusive_of_next_month() {
        let attempts = vec![
            attempt("a", "t1", 80, 60, "2024-01-31T23:59:59Z"),
            attempt("b", "t1", 60, 60, "2024-02-01T00:00:00Z"),
        ];
        let january = window_stats(&attempts, TimeWindow::Month, at("2024-01-15T12:00:00Z"));
        assert_eq!(january.submissions, 1);
        assert_eq!(january.mean_score, 80.0);

        let february = window_stats(&attempts, TimeWindow::Month, at("2024-02-10T12:00:00Z"));
        assert_eq!(february.submissions, 1);
        assert_eq!(february.mean_score, 60.0);
    }

    #[test]
    fn week_window_starts_monday() {
        // 2024-05-12 is a Sunday, 2024-05-13 a Monday.
        let attempts = vec![
            attempt("a", "t1", 70, 60, "2024-05-12T23:00:00Z"),
            attempt("a", "t1", 90, 60, "2024-05-13T08:00:00Z"),
        ];
        let stats = window_stats(&attempts, TimeWindow::Week, at("2024-05-15T09:00:00Z"));
        assert_eq!(stats.submissions, 1);
        assert_eq!(stats.mean_score, 90.0);

        let lifetime = window_stats(&attempts, TimeWindow::Lifetime, at("2024-05-15T09:00:00Z"));
        assert_eq!(lifetime.submissions, 2);
        assert_eq!(lifetime.unique_participants, 1);
    }

    #[test]
    fn risk_counts_use_participant_means() {
        let attempts = vec![
            attempt("strong", "t1", 90, 60, "2024-03-02T10:00:00Z"),
            attempt("weak", "t1", 40, 60, "2024-03-02T10:00:00Z"),
            attempt("weak", "t2", 50, 60, "2024-03-03T10:00:00Z"),
            attempt("struggling", "t1", 20, 60, "2024-03-04T10:00:00Z"),
        ];
        let mut flagged = attempt("struggling", "t2", 10, 60, "2024-03-05T10:00:00Z");
        flagged.is_suspicious = true;
        let mut all = attempts;
        all.push(flagged);

        let stats = window_stats(&all, TimeWindow::Month, at("2024-03-20T00:00:00Z"));
        assert_eq!(stats.submissions, 5);
        assert_eq!(stats.unique_participants, 3);
        assert_eq!(stats.suspicious_count, 1);
        assert_eq!(stats.at_risk_participants, 2);
        assert_eq!(stats.needs_attention_participants, 1);
        assert_eq!(stats.mean_duration_seconds, 60.0);
    }

    #[test]
    fn inverted_durations_are_excluded_from_means() {
        let mut broken = attempt("a", "t1", 50, 60, "2024-03-02T10:00:00Z");
        broken.start_time = broken.end_time + Duration::seconds(10);
        let attempts = vec![broken, attempt("b", "t1", 50, 120, "2024-03-02T10:00:00Z")];
        let stats = window_stats(&attempts, TimeWindow::Lifetime, at("2024-03-20T00:00:00Z"));
        assert_eq!(stats.mean_duration_seconds, 120.0);
        assert_eq!(stats.submissions, 2);
    }

    #[test]
    fn tied_maximums_all_count_as_toppers() {
        let attempts = vec![
            attempt("alice", "t1", 95, 300, "2024-03-02T10:00:00Z"),
            attempt("bob", "t1", 95, 200, "2024-03-02T11:00:00Z"),
            attempt("carol", "t1", 70, 100, "2024-03-02T12:00:00Z"),
        ];
        let list = toppers(&attempts, TimeWindow::Month, at("2024-03-20T00:00:00Z"));
        let ids: Vec<_> = list.iter().map(|t| t.participant_id.as_str()).collect();
        assert_eq!(ids, vec!["bob", "alice"]);
        assert!(list.iter().all(|t| t.tests_topped == 1));
        assert_eq!(list[0].rank, 1);
        assert_eq!(list[1].rank, 2);
        assert_eq!(list[0].participant_name.as_deref(), Some("BOB"));
    }

    #[test]
    fn toppers_order_by_count_then_mean_then_duration() {
        let attempts = vec![
            attempt("alice", "t1", 100, 60, "2024-03-02T10:00:00Z"),
            attempt("alice", "t2", 80, 60, "2024-03-02T10:00:00Z"),
            attempt("bob", "t2", 80, 60, "2024-03-02T10:00:00Z"),
            attempt("bob", "t3", 90, 60, "2024-03-02T10:00:00Z"),
            attempt("carol", "t4", 85, 60, "2024-03-02T10:00:00Z"),
            attempt("dave", "t4", 85, 60, "2024-03-02T10:00:00Z"),
            // outside the window: does not count
            attempt("erin", "t1", 100, 10, "2024-02-02T10:00:00Z"),
        ];
        let list = toppers(&attempts, TimeWindow::Month, at("2024-03-20T00:00:00Z"));
        let summary: Vec<_> = list
            .iter()
            .map(|t| (t.participant_id.as_str(), t.tests_topped, t.rank))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("alice", 2, 1),
                ("bob", 2, 2),
                ("carol", 1, 3),
                ("dave", 1, 3),
            ]
        );
    }

    #[test]
    fn summaries_cover_participant_and_test() {
        let attempts = vec![
            attempt("alice", "t1", 60, 60, "2024-03-02T10:00:00Z"),
            attempt("alice", "t2", 80, 120, "2024-03-03T10:00:00Z"),
            attempt("bob", "t1", 40, 30, "2024-03-03T10:00:00Z"),
        ];
        let alice = participant_summary(&attempts, "alice");
        assert_eq!(alice.attempts, 2);
        assert_eq!(alice.tests_taken, 2);
        assert_eq!(alice.mean_score, 70.0);
        assert_eq!(alice.best_score, Some(80));
        assert_eq!(alice.mean_duration_seconds, 90.0);

        let t1 = test_summary(&attempts, "t1");
        assert_eq!(t1.attempts, 2);
        assert_eq!(t1.unique_participants, 2);
        assert_eq!(t1.highest_score, Some(60));
        assert_eq!(t1.lowest_score, Some(40));

        let nobody = participant_summary(&attempts, "zed");
        assert_eq!(nobody.attempts, 0);
        assert_eq!(nobody.best_score, None);
    }
}
