pub mod activity_log;
pub mod leaderboard;
pub mod pending_submission;
pub mod question;
pub mod results_snapshot;
pub mod test;
pub mod test_attempt;
