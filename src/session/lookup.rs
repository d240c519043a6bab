use std::future::Future;
use std::time::Duration;

/// Result of looking for something on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
    TimedOut,
}

/// Try `candidates` in priority order, each bounded by `per_candidate`, and
/// return the first hit.
///
/// When nothing matches the result is `TimedOut` if any candidate ran out of
/// time, so callers can tell "absent" apart from "too slow to tell".
pub async fn first_match<C, T, F, Fut>(
    candidates: &[C],
    per_candidate: Duration,
    mut attempt: F,
) -> Lookup<T>
where
    F: FnMut(&C) -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let mut timed_out = false;

    for candidate in candidates {
        match tokio::time::timeout(per_candidate, attempt(candidate)).await {
            Ok(Some(value)) => return Lookup::Found(value),
            Ok(None) => {}
            Err(_) => timed_out = true,
        }
    }

    if timed_out {
        Lookup::TimedOut
    } else {
        Lookup::NotFound
    }
}
