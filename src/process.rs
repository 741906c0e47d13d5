//! Batch orchestration: walks the app list in fixed-size batches, fetching each
//! app through a [`FetchRecord`] strategy, committing every batch to the sink and
//! then advancing the checkpoint.

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::checkpoint::CheckpointStore;
use crate::clock::{Sleeper, TokioSleeper};
use crate::entity::{Entity, Record};
use crate::sink::CsvSink;
use crate::strategy::FetchRecord;
use crate::{info_time, Error, Result};

/// Which slice of the app list to process and how fast.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub begin: usize,
    /// `None` runs to the end of the list.
    pub end: Option<usize>,
    pub batch_size: usize,
    /// Pause after every request.
    pub pause: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            begin: 0,
            end: None,
            batch_size: 100,
            pause: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub batches_completed: usize,
    pub rows_written: usize,
    /// Checkpoint value after the last committed batch.
    pub checkpoint: u64,
    /// The run stopped early on a cancellation request.
    pub cancelled: bool,
}

/// Splits `[begin, end)` into consecutive batches of at most `batch_size` entries.
pub fn plan_batches(begin: usize, end: usize, batch_size: usize) -> Vec<Range<usize>> {
    (begin..end)
        .step_by(batch_size.max(1))
        .map(|start| start..start.saturating_add(batch_size).min(end))
        .collect()
}

/// Running mean of batch durations.
#[derive(Debug, Default)]
pub struct BatchTimer {
    total: Duration,
    count: u32,
}

impl BatchTimer {
    pub fn record(&mut self, elapsed: Duration) {
        self.total += elapsed;
        self.count += 1;
    }

    pub fn mean(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total / self.count
        }
    }

    pub fn estimate_remaining(&self, batches_left: usize) -> Duration {
        self.mean() * u32::try_from(batches_left).unwrap_or(u32::MAX)
    }
}

/// Formats as `H:MM:SS`, rounded to the nearest second.
pub fn fmt_hms(duration: Duration) -> String {
    let secs = duration.as_secs_f64().round() as u64;
    format!("{}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)
}

pub struct Collector<'a, F: ?Sized, S = TokioSleeper> {
    strategy: &'a F,
    sink: &'a CsvSink,
    checkpoint: &'a CheckpointStore,
    sleeper: S,
    cancel: CancellationToken,
    commit_lock: Arc<Mutex<()>>,
}

impl<'a, F: FetchRecord + ?Sized> Collector<'a, F> {
    pub fn new(strategy: &'a F, sink: &'a CsvSink, checkpoint: &'a CheckpointStore) -> Self {
        Self {
            strategy,
            sink,
            checkpoint,
            sleeper: TokioSleeper,
            cancel: CancellationToken::new(),
            commit_lock: Arc::default(),
        }
    }
}

impl<'a, F: FetchRecord + ?Sized, S: Sleeper> Collector<'a, F, S> {
    pub fn with_sleeper<S2: Sleeper>(self, sleeper: S2) -> Collector<'a, F, S2> {
        Collector {
            strategy: self.strategy,
            sink: self.sink,
            checkpoint: self.checkpoint,
            sleeper,
            cancel: self.cancel,
            commit_lock: self.commit_lock,
        }
    }

    /// Cancellation is only honoured between batches.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Held while a batch is being appended and checkpointed. Whoever needs the files
    /// in a consistent state (a forced shutdown) locks it first.
    pub fn commit_lock(&self) -> Arc<Mutex<()>> {
        Arc::clone(&self.commit_lock)
    }

    /// Reads the checkpoint and gets the sink ready for it: a fresh header when the
    /// checkpoint is 0, otherwise a check that the existing file matches the schema.
    /// Returns the index to resume from.
    pub async fn prepare(&self) -> Result<u64> {
        let index = self.checkpoint.read().await?;
        if index == 0 {
            self.sink.initialize().await?;
            info!(path = ?self.sink.path(), "Starting fresh, sink initialized");
        } else {
            if !self.sink.exists().await {
                return Err(Error::MissingSink {
                    path: self.sink.path().to_path_buf(),
                    checkpoint: index,
                });
            }
            self.sink.verify_header().await?;
            info!(path = ?self.sink.path(), index, "Resuming existing sink");
        }
        Ok(index)
    }

    /// Processes `entities[begin..end]` batch by batch. A batch is appended to the
    /// sink as a whole and only then is the checkpoint moved to its end. Any error
    /// aborts the run with the in-flight batch uncommitted.
    pub async fn run(&self, entities: &[Entity], config: &RunConfig) -> Result<RunSummary> {
        let end = config.end.unwrap_or(entities.len());
        if config.begin > end || end > entities.len() {
            return Err(Error::InvalidRange {
                begin: config.begin,
                end,
                len: entities.len(),
            });
        }
        if config.batch_size == 0 {
            return Err(Error::Config("batch size must be at least 1".into()));
        }

        let stored = self.checkpoint.read().await?;
        if stored != config.begin as u64 {
            warn!(
                begin = config.begin,
                checkpoint = stored,
                "Start index differs from stored checkpoint"
            );
        }

        let start_time = Local::now();
        info_time!("Starting at index {}", config.begin);

        let batches = plan_batches(config.begin, end, config.batch_size);
        let mut timer = BatchTimer::default();
        let mut summary = RunSummary {
            checkpoint: stored,
            ..RunSummary::default()
        };

        for (i, batch) in batches.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!(index = batch.start, "Cancelled, stopping before batch {i}");
                summary.cancelled = true;
                break;
            }
            let batch_start = Local::now();

            let records = self.fetch_batch(entities, batch.clone(), config.pause).await?;
            let commit = self.commit_lock.lock().await;
            let committed_len = self.sink.append_batch(&records).await?;
            if let Err(e) = self.checkpoint.write(batch.end as u64).await {
                warn!(index = batch.end, error = %e, "Checkpoint write failed, dropping batch rows");
                if let Err(rollback) = self.sink.rollback_to(committed_len).await {
                    warn!(error = %rollback, "Sink rollback failed");
                }
                return Err(e);
            }
            drop(commit);

            summary.batches_completed += 1;
            summary.rows_written += records.len();
            summary.checkpoint = batch.end as u64;

            let elapsed = (Local::now() - batch_start).to_std().unwrap_or_default();
            timer.record(elapsed);
            let remaining = timer.estimate_remaining(batches.len() - i - 1);
            info_time!(
                "Exported lines {}-{}. Batch {} time: {} (avg: {}, remaining: {})",
                batch.start,
                batch.end - 1,
                i,
                fmt_hms(elapsed),
                fmt_hms(timer.mean()),
                fmt_hms(remaining)
            );
        }

        info_time!(
            start_time,
            "Processing batches complete. {} apps written",
            summary.rows_written
        );
        Ok(summary)
    }

    async fn fetch_batch(
        &self,
        entities: &[Entity],
        batch: Range<usize>,
        pause: Duration,
    ) -> Result<Vec<Record>> {
        let mut records = Vec::with_capacity(batch.len());
        for (index, entity) in entities[batch.clone()].iter().enumerate() {
            debug!(index = batch.start + index, appid = entity.id, "Current index");
            let record = self.strategy.fetch_record(entity.id, &entity.name).await?;
            records.push(record);
            // keep under the source's polling limit
            self.sleeper.sleep(pause).await;
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batches_cover_range_with_short_tail() {
        assert_eq!(plan_batches(0, 5, 2), vec![0..2, 2..4, 4..5]);
        assert_eq!(plan_batches(3, 9, 3), vec![3..6, 6..9]);
        assert_eq!(plan_batches(4, 4, 10), Vec::<Range<usize>>::new());
        assert_eq!(plan_batches(0, 3, 100), vec![0..3]);
    }

    #[test]
    fn huge_batch_size_does_not_overflow() {
        assert_eq!(plan_batches(1, 5, usize::MAX), vec![1..5]);
        assert_eq!(
            plan_batches(usize::MAX - 3, usize::MAX, 2),
            vec![usize::MAX - 3..usize::MAX - 1, usize::MAX - 1..usize::MAX]
        );
    }

    #[test]
    fn timer_mean_and_estimate() {
        let mut timer = BatchTimer::default();
        assert_eq!(timer.mean(), Duration::ZERO);

        timer.record(Duration::from_secs(4));
        timer.record(Duration::from_secs(6));
        assert_eq!(timer.mean(), Duration::from_secs(5));
        assert_eq!(timer.estimate_remaining(3), Duration::from_secs(15));
        assert_eq!(timer.estimate_remaining(0), Duration::ZERO);
    }

    #[test]
    fn hms_formatting() {
        assert_eq!(fmt_hms(Duration::from_millis(400)), "0:00:00");
        assert_eq!(fmt_hms(Duration::from_millis(59_600)), "0:01:00");
        assert_eq!(fmt_hms(Duration::from_secs(3725)), "1:02:05");
    }
}
