use std::future::Future;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Run `pass` every `every` until `shutdown` resolves. Returns the number of
/// passes started.
///
/// Passes never overlap: a pass that outlasts the interval delays the next
/// tick. A failed pass is logged and the loop carries on. Shutdown during a
/// pass drops it where it stands.
pub async fn run_on_interval<F, Fut, S>(every: Duration, shutdown: S, mut pass: F) -> u64
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut passes = 0;

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!(passes, "harvest: shutdown requested");
                break;
            }
            _ = ticker.tick() => {}
        }

        passes += 1;
        let started = Instant::now();
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!(pass = passes, "harvest: shutdown requested mid-pass");
                break;
            }
            result = pass(passes) => match result {
                Ok(()) => info!(
                    pass = passes,
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    next_in_secs = every.as_secs(),
                    "harvest: pass finished"
                ),
                Err(e) => error!(pass = passes, error = %format!("{e:#}"), "harvest: pass failed"),
            },
        }
    }

    passes
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use tokio::sync::oneshot;

    use super::*;

    const TICK: Duration = Duration::from_millis(5);

    /// Shutdown future plus a trigger to pull from inside a pass.
    fn shutdown_signal() -> (impl Future<Output = ()>, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel::<()>();
        (
            async move {
                let _ = rx.await;
            },
            tx,
        )
    }

    #[tokio::test]
    async fn runs_passes_until_shutdown() {
        let (shutdown, tx) = shutdown_signal();
        let mut tx = Some(tx);

        let passes = run_on_interval(TICK, shutdown, |n| {
            let trigger = if n == 3 { tx.take() } else { None };
            async move {
                if let Some(tx) = trigger {
                    let _ = tx.send(());
                }
                Ok(())
            }
        })
        .await;

        assert_eq!(passes, 3);
    }

    #[tokio::test]
    async fn failed_pass_does_not_stop_the_loop() {
        let (shutdown, tx) = shutdown_signal();
        let mut tx = Some(tx);

        let passes = run_on_interval(TICK, shutdown, |n| {
            let trigger = if n == 2 { tx.take() } else { None };
            async move {
                if n == 1 {
                    anyhow::bail!("database unavailable");
                }
                if let Some(tx) = trigger {
                    let _ = tx.send(());
                }
                Ok(())
            }
        })
        .await;

        assert_eq!(passes, 2);
    }

    #[tokio::test]
    async fn passes_never_overlap() {
        let (shutdown, tx) = shutdown_signal();
        let mut tx = Some(tx);
        let running = Arc::new(AtomicBool::new(false));

        let passes = run_on_interval(TICK, shutdown, |n| {
            let running = Arc::clone(&running);
            let trigger = if n == 3 { tx.take() } else { None };
            async move {
                assert!(!running.swap(true, Ordering::SeqCst), "pass {n} overlapped");
                // Outlast several ticks.
                tokio::time::sleep(TICK * 4).await;
                running.store(false, Ordering::SeqCst);
                if let Some(tx) = trigger {
                    let _ = tx.send(());
                }
                Ok(())
            }
        })
        .await;

        assert_eq!(passes, 3);
    }

    #[tokio::test]
    async fn shutdown_before_first_tick_runs_nothing() {
        let passes = run_on_interval(TICK, async {}, |_| async { Ok(()) }).await;
        assert_eq!(passes, 0);
    }
}
