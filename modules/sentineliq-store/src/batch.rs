// Chunked, concurrency-limited writes with settle-all semantics: a failing
// chunk is recorded and the remaining chunks still run.

use std::fmt;
use std::future::Future;

use futures::stream::{self, StreamExt};
use tracing::warn;

/// Aggregate result of a batched write.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Rows the writer reported as written.
    pub written: u64,
    /// Items handed to the writer.
    pub attempted: usize,
    pub batches: usize,
    pub failed_batches: usize,
    /// Items in failed batches.
    pub failed_items: usize,
    pub errors: Vec<String>,
}

impl BatchOutcome {
    pub fn is_clean(&self) -> bool {
        self.failed_batches == 0
    }
}

impl fmt::Display for BatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} written of {} attempted ({} batches, {} failed)",
            self.written, self.attempted, self.batches, self.failed_batches
        )
    }
}

/// Split `items` into `batch_size` chunks and run `write` on at most
/// `concurrency` chunks at a time.
pub async fn write_batched<'a, T, F, Fut, E>(
    items: &'a [T],
    batch_size: usize,
    concurrency: usize,
    write: F,
) -> BatchOutcome
where
    F: Fn(&'a [T]) -> Fut,
    Fut: Future<Output = std::result::Result<u64, E>> + 'a,
    E: fmt::Display,
{
    let batch_size = batch_size.max(1);
    let concurrency = concurrency.max(1);

    let results: Vec<(usize, std::result::Result<u64, E>)> = stream::iter(items.chunks(batch_size))
        .map(|chunk| {
            let len = chunk.len();
            let fut = write(chunk);
            async move { (len, fut.await) }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    let mut outcome = BatchOutcome {
        attempted: items.len(),
        batches: results.len(),
        ..Default::default()
    };

    for (len, result) in results {
        match result {
            Ok(n) => outcome.written += n,
            Err(e) => {
                warn!(batch_len = len, error = %e, "Batch write failed");
                outcome.failed_batches += 1;
                outcome.failed_items += len;
                outcome.errors.push(e.to_string());
            }
        }
    }

    outcome
}
