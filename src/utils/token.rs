use rand::{distributions::Alphanumeric, thread_rng, Rng};

/// Locally-unique id for queued submissions, e.g. `local-8fJ2kq0ZpX1a`.
pub fn generate_local_id(length: usize) -> String {
    let suffix: String = thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect();
    format!("local-{}", suffix)
}
