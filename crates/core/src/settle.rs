//! Wait-for-all join over independent fallible tasks.
//!
//! [`settle_all`] drives every task concurrently, bounds each one by its
//! own timeout, and returns one [`Settled`] per task in input order. A
//! task that fails or times out never affects its siblings, and the join
//! only completes once every task has reached a terminal outcome.

use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::Instant;

/// Terminal outcome of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T, E> {
    Ok(T),
    Err(E),
    /// The task did not finish within its limit and was dropped.
    TimedOut(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled<T, E> {
    pub outcome: Outcome<T, E>,
    pub elapsed: Duration,
}

/// Run all `tasks` concurrently and collect their outcomes in input order.
///
/// Each item pairs a future with its own time limit. A timed-out future is
/// dropped, which aborts whatever I/O it owned.
pub async fn settle_all<F, T, E>(tasks: impl IntoIterator<Item = (F, Duration)>) -> Vec<Settled<T, E>>
where
    F: Future<Output = Result<T, E>>,
{
    let guarded = tasks.into_iter().map(|(task, limit)| async move {
        let start = Instant::now();
        let outcome = match tokio::time::timeout(limit, task).await {
            Ok(Ok(value)) => Outcome::Ok(value),
            Ok(Err(err)) => Outcome::Err(err),
            Err(_) => Outcome::TimedOut(limit),
        };
        Settled {
            outcome,
            elapsed: start.elapsed(),
        }
    });

    join_all(guarded).await
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;

    use super::*;

    type Task = Pin<Box<dyn Future<Output = Result<&'static str, &'static str>> + Send>>;

    fn after(ms: u64, result: Result<&'static str, &'static str>) -> Task {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            result
        })
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_input_order_regardless_of_completion() {
        let settled = settle_all(vec![
            (after(300, Ok("slow")), Duration::from_secs(10)),
            (after(10, Ok("fast")), Duration::from_secs(10)),
        ])
        .await;

        assert_eq!(settled[0].outcome, Outcome::Ok("slow"));
        assert_eq!(settled[1].outcome, Outcome::Ok("fast"));
        assert!(settled[1].elapsed < Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn failures_and_timeouts_do_not_affect_siblings() {
        let start = Instant::now();
        let settled = settle_all(vec![
            (after(5_000, Ok("never")), Duration::from_millis(100)),
            (after(50, Err("boom")), Duration::from_secs(10)),
            (after(200, Ok("done")), Duration::from_secs(10)),
        ])
        .await;

        assert_eq!(settled.len(), 3);
        assert_eq!(
            settled[0].outcome,
            Outcome::TimedOut(Duration::from_millis(100))
        );
        assert_eq!(settled[1].outcome, Outcome::Err("boom"));
        assert_eq!(settled[2].outcome, Outcome::Ok("done"));
        // The join waits for the slowest non-timed-out task, not the timeout.
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(200));
        assert!(waited < Duration::from_millis(5_000));
    }

    #[tokio::test(start_paused = true)]
    async fn tasks_run_concurrently() {
        let start = Instant::now();
        let tasks: Vec<_> = (0..5)
            .map(|_| (after(100, Ok("x")), Duration::from_secs(1)))
            .collect();
        let settled = settle_all(tasks).await;

        assert_eq!(settled.len(), 5);
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn empty_input_settles_immediately() {
        let settled = settle_all(Vec::<(Task, Duration)>::new()).await;
        assert!(settled.is_empty());
    }
}
