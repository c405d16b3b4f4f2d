//! Windowed batch scheduler.
//!
//! Items are drained from a [`BatchQueue`] in windows of `concurrency`. All
//! items of a window resolve concurrently and the next window starts only
//! once every item of the current one has settled. Per-item errors and
//! panics become [`Failure`] values, so a batch always yields exactly one
//! result per input.
//!
//! With a progress sender attached, every result is also pushed to a
//! [`ProgressStream`] as soon as it settles (completion order); the returned
//! vector keeps input order.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::FuturesUnordered;
use futures::{FutureExt, Stream, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::source::SourceId;

/// A resolvable item.
#[derive(Debug, Clone)]
pub struct WorkItem<T> {
    pub source: SourceId,
    pub input: T,
}

/// Why an item did not produce a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub error: String,
    pub source: SourceId,
}

impl Failure {
    pub fn new(source: SourceId, error: impl Display) -> Self {
        Self {
            error: error.to_string(),
            source,
        }
    }
}

/// Outcome of one item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WorkResult<S> {
    Success(S),
    Failure(Failure),
}

impl<S> WorkResult<S> {
    pub fn is_success(&self) -> bool {
        matches!(self, WorkResult::Success(_))
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            WorkResult::Failure(failure) => Some(failure),
            WorkResult::Success(_) => None,
        }
    }

    pub fn success(&self) -> Option<&S> {
        match self {
            WorkResult::Success(value) => Some(value),
            WorkResult::Failure(_) => None,
        }
    }
}

/// Intake output: either ready to resolve or already failed validation.
#[derive(Debug, Clone)]
pub enum Prepared<T> {
    Ready(WorkItem<T>),
    Rejected(Failure),
}

impl<T> Prepared<T> {
    pub fn source(&self) -> &SourceId {
        match self {
            Prepared::Ready(item) => &item.source,
            Prepared::Rejected(failure) => &failure.source,
        }
    }
}

/// Ready items awaiting resolution, drained front to back.
#[derive(Debug)]
pub struct BatchQueue<T> {
    items: VecDeque<WorkItem<T>>,
    window: usize,
}

impl<T> BatchQueue<T> {
    /// A `window` of zero is treated as one.
    pub fn new(items: impl IntoIterator<Item = WorkItem<T>>, window: usize) -> Self {
        Self {
            items: items.into_iter().collect(),
            window: window.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Take the next window of up to `window` items.
    pub fn next_window(&mut self) -> Option<Vec<WorkItem<T>>> {
        if self.items.is_empty() {
            return None;
        }
        let n = self.window.min(self.items.len());
        Some(self.items.drain(..n).collect())
    }
}

/// Producer half of a progress channel.
#[derive(Debug)]
pub struct ProgressSender<S>(mpsc::UnboundedSender<WorkResult<S>>);

impl<S> Clone for ProgressSender<S> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<S> ProgressSender<S> {
    /// A dropped stream is not an error; progress is best effort.
    fn emit(&self, result: WorkResult<S>) {
        let _ = self.0.send(result);
    }
}

/// Results in completion order. Ends once the batch has finished and every
/// sender is dropped.
#[derive(Debug)]
pub struct ProgressStream<S>(mpsc::UnboundedReceiver<WorkResult<S>>);

impl<S> Stream for ProgressStream<S> {
    type Item = WorkResult<S>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.0.poll_recv(cx)
    }
}

pub fn progress_channel<S>() -> (ProgressSender<S>, ProgressStream<S>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ProgressSender(tx), ProgressStream(rx))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("resolver panicked: {detail}")
}

/// Resolve every ready item in windows of `concurrency`, then append the
/// rejected ones.
///
/// The result has one entry per input: resolver results in input order,
/// followed by rejected items in input order. With `progress` set, each
/// resolver result is emitted as it completes and the rejected items are
/// flushed after the last window.
pub async fn run_batch<T, S, E, F, Fut>(
    items: Vec<Prepared<T>>,
    resolve: F,
    concurrency: usize,
    progress: Option<ProgressSender<S>>,
) -> Vec<WorkResult<S>>
where
    S: Clone,
    E: Display,
    F: Fn(WorkItem<T>) -> Fut,
    Fut: Future<Output = Result<S, E>>,
{
    let total = items.len();
    let mut ready = Vec::new();
    let mut rejected = Vec::new();
    for item in items {
        match item {
            Prepared::Ready(item) => ready.push(item),
            Prepared::Rejected(failure) => rejected.push(failure),
        }
    }

    let mut queue = BatchQueue::new(ready, concurrency);
    let mut results = Vec::with_capacity(total);
    let mut window_index = 0usize;

    tracing::info!(
        ready = queue.len(),
        rejected = rejected.len(),
        concurrency = concurrency.max(1),
        "starting batch"
    );

    while let Some(window) = queue.next_window() {
        window_index += 1;
        tracing::debug!(window = window_index, items = window.len(), "resolving window");

        let mut slots: Vec<Option<WorkResult<S>>> = vec![None; window.len()];
        let mut pending: FuturesUnordered<_> = window
            .into_iter()
            .enumerate()
            .map(|(slot, item)| {
                let source = item.source.clone();
                let fut = AssertUnwindSafe(resolve(item)).catch_unwind();
                async move { (slot, source, fut.await) }
            })
            .collect();

        while let Some((slot, source, outcome)) = pending.next().await {
            let result = match outcome {
                Ok(Ok(value)) => WorkResult::Success(value),
                Ok(Err(err)) => WorkResult::Failure(Failure::new(source, err)),
                Err(payload) => WorkResult::Failure(Failure::new(source, panic_message(payload))),
            };

            if let WorkResult::Failure(failure) = &result {
                tracing::warn!(source = %failure.source, error = %failure.error, "item failed");
            }
            if let Some(progress) = &progress {
                progress.emit(result.clone());
            }
            slots[slot] = Some(result);
        }

        results.extend(slots.into_iter().flatten());
    }

    for failure in rejected {
        let result = WorkResult::Failure(failure);
        if let Some(progress) = &progress {
            progress.emit(result.clone());
        }
        results.push(result);
    }

    tracing::info!(
        total = results.len(),
        failed = results.iter().filter(|r| !r.is_success()).count(),
        "batch finished"
    );
    results
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Output length equals input length, and progress sees every result.
        #[test]
        fn prop_one_result_per_input(
            kinds in prop::collection::vec(0u8..3, 0..20),
            concurrency in 1usize..6,
        ) {
            let items: Vec<Prepared<u8>> = kinds
                .iter()
                .enumerate()
                .map(|(i, kind)| {
                    let source = SourceId::new(i.to_string());
                    if *kind == 2 {
                        Prepared::Rejected(Failure::new(source, "rejected"))
                    } else {
                        Prepared::Ready(WorkItem { source, input: *kind })
                    }
                })
                .collect();

            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let (results, events) = runtime.block_on(async {
                let (tx, stream) = progress_channel();
                let resolve = |item: WorkItem<u8>| async move {
                    if item.input == 0 { Ok(item.source.to_string()) } else { Err("failed") }
                };
                tokio::join!(run_batch(items, resolve, concurrency, Some(tx)), stream.collect::<Vec<_>>())
            });

            prop_assert_eq!(results.len(), kinds.len());
            prop_assert_eq!(events.len(), kinds.len());
            let successes = results.iter().filter(|r| r.is_success()).count();
            prop_assert_eq!(successes, kinds.iter().filter(|k| **k == 0).count());
        }
    }
}
