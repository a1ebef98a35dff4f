use std::future::Future;
use std::time::Duration;

/// Wait between two attempts of one part.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// `initial` before the first retry, twice as long before each later one, never above `max`.
    Exponential { initial: Duration, max: Duration },
}

impl Backoff {
    /// Wait before retry number `retry`, counting from 1.
    fn delay_before(&self, retry: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { initial, max } => {
                let factor = 1u32 << retry.saturating_sub(1).min(16);
                initial.saturating_mul(factor).min(max)
            }
        }
    }
}

/// Drives `attempt_fn` with a 1-based attempt number until it succeeds, fails with an error
/// `is_retryable` rejects, or `max_attempts` (at least one) have been used up.
pub async fn retry_with_backoff<T, E, F, Fut, R>(
    max_attempts: u32,
    backoff: Backoff,
    description: &str,
    mut attempt_fn: F,
    mut is_retryable: R,
) -> std::result::Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: std::fmt::Display,
    R: FnMut(&E) -> bool,
{
    let budget = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let error = match attempt_fn(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };
        if attempt == budget || !is_retryable(&error) {
            return Err(error);
        }

        let delay = backoff.delay_before(attempt);
        tracing::warn!(
            description,
            attempt,
            budget,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "transient failure, sleeping before next attempt"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::*;

    const FAST: Backoff = Backoff::Fixed(Duration::from_millis(1));

    #[tokio::test]
    async fn first_success_is_returned() {
        let result: Result<i32, String> =
            retry_with_backoff(3, FAST, "op", |_| async { Ok(42) }, |_: &String| true).await;
        assert_eq!(Ok(42), result);
    }

    #[tokio::test]
    async fn later_success_is_returned() {
        let result: Result<u32, String> = retry_with_backoff(
            3,
            FAST,
            "op",
            |attempt| async move {
                if attempt < 3 {
                    Err(format!("fail {attempt}"))
                } else {
                    Ok(attempt)
                }
            },
            |_: &String| true,
        )
        .await;
        assert_eq!(Ok(3), result);
    }

    #[tokio::test]
    async fn last_error_after_budget() {
        let mut calls = 0;
        let result: Result<i32, String> = retry_with_backoff(
            2,
            FAST,
            "op",
            |attempt| {
                calls += 1;
                async move { Err(format!("error {attempt}")) }
            },
            |_: &String| true,
        )
        .await;
        assert_eq!(Err(String::from("error 2")), result);
        assert_eq!(2, calls);
    }

    #[tokio::test]
    async fn zero_budget_runs_once() {
        let mut calls = 0;
        let _: Result<i32, String> = retry_with_backoff(
            0,
            FAST,
            "op",
            |_| {
                calls += 1;
                async { Err(String::from("no")) }
            },
            |_: &String| true,
        )
        .await;
        assert_eq!(1, calls);
    }

    #[tokio::test]
    async fn permanent_error_is_not_repeated() {
        let mut calls = 0;
        let result: Result<i32, String> = retry_with_backoff(
            5,
            FAST,
            "op",
            |attempt| {
                calls += 1;
                async move { Err(format!("error {attempt}")) }
            },
            |e: &String| e != "error 2",
        )
        .await;
        assert_eq!(Err(String::from("error 2")), result);
        assert_eq!(2, calls);
    }

    #[rstest]
    #[case::first(1, 100)]
    #[case::second(2, 200)]
    #[case::capped(3, 300)]
    #[case::far_out(40, 300)]
    fn exponential_delay(#[case] retry: u32, #[case] millis: u64) {
        let backoff = Backoff::Exponential {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(300),
        };
        assert_eq!(Duration::from_millis(millis), backoff.delay_before(retry));
    }

    #[test]
    fn fixed_delay() {
        assert_eq!(Duration::from_millis(1), FAST.delay_before(7));
    }
}
