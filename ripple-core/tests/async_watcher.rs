//! Async Re-validation
//!
//! A watcher's notify callback cannot read the graph, so real callers defer
//! the work: the callback schedules a flush, and the flush reads whatever is
//! pending and re-arms the watcher. These tests drive that loop from a tokio
//! `LocalSet`, since graph handles are not `Send`.

use std::cell::Cell;
use std::rc::Rc;

use ripple_core::{AnySignal, Computed, ComputedState, State, Watcher};
use tokio::sync::mpsc;
use tokio::task::{spawn_local, LocalSet};

/// Watch `targets` and spawn the task that flushes them.
///
/// Every flush refreshes the pending computeds, re-arms, and reports how many
/// computeds it refreshed.
fn spawn_flusher<I>(targets: I) -> (Watcher, mpsc::UnboundedReceiver<usize>)
where
    I: IntoIterator,
    I::Item: Into<AnySignal>,
{
    let (flush_tx, mut flush_rx) = mpsc::unbounded_channel::<()>();
    let (done_tx, done_rx) = mpsc::unbounded_channel();

    let watcher = Watcher::new(move |_| {
        let _ = flush_tx.send(());
    });
    watcher.watch(targets);

    let flusher = watcher.clone();
    spawn_local(async move {
        while flush_rx.recv().await.is_some() {
            let pending = flusher.pending();
            for signal in &pending {
                signal.refresh().expect("refresh failed");
            }
            flusher.rearm();
            if done_tx.send(pending.len()).is_err() {
                break;
            }
        }
    });
    (watcher, done_rx)
}

/// Writes in the same tick coalesce into a single deferred flush.
#[tokio::test(flavor = "current_thread")]
async fn writes_coalesce_into_one_flush() {
    LocalSet::new()
        .run_until(async {
            let count = State::new(1);
            let runs = Rc::new(Cell::new(0));
            let doubled = {
                let (count, runs) = (count.clone(), runs.clone());
                Computed::new(move || {
                    runs.set(runs.get() + 1);
                    Ok(count.get()? * 2)
                })
            };
            assert_eq!(doubled.get(), Ok(2));
            let (_watcher, mut done) = spawn_flusher([&doubled]);

            count.set(2).unwrap();
            count.set(3).unwrap();
            count.set(4).unwrap();
            assert_eq!(runs.get(), 1);

            assert_eq!(done.recv().await, Some(1));
            assert_eq!(runs.get(), 2);
            assert_eq!(doubled.get(), Ok(8));
            assert!(done.try_recv().is_err());
        })
        .await;
}

/// After a flush re-arms, the next write schedules another one.
#[tokio::test(flavor = "current_thread")]
async fn flush_rearms_for_the_next_change() {
    LocalSet::new()
        .run_until(async {
            let count = State::new(0);
            let label = {
                let count = count.clone();
                Computed::new(move || Ok(format!("count = {}", count.get()?)))
            };
            label.get().unwrap();
            let (watcher, mut done) = spawn_flusher([&label]);

            for round in 1..=3 {
                count.set(round).unwrap();
                assert_eq!(done.recv().await, Some(1));
                assert!(watcher.pending().is_empty());
                assert_eq!(label.get().unwrap(), format!("count = {round}"));
            }
        })
        .await;
}

/// A computed that settles to the same value still counts as flushed, but
/// leaves nothing pending behind it.
#[tokio::test(flavor = "current_thread")]
async fn unchanged_results_clear_pending() {
    LocalSet::new()
        .run_until(async {
            let count = State::new(1);
            let parity = {
                let count = count.clone();
                Computed::new(move || Ok(count.get()? % 2))
            };
            let tail_runs = Rc::new(Cell::new(0));
            let described = {
                let (parity, runs) = (parity.clone(), tail_runs.clone());
                Computed::new(move || {
                    runs.set(runs.get() + 1);
                    Ok(if parity.get()? == 0 { "even" } else { "odd" })
                })
            };
            assert_eq!(described.get(), Ok("odd"));
            let (_watcher, mut done) = spawn_flusher([&described]);

            count.set(3).unwrap();
            assert_eq!(described.state(), ComputedState::Pending);
            assert_eq!(done.recv().await, Some(1));
            assert_eq!(described.state(), ComputedState::Clean);
            assert_eq!(tail_runs.get(), 1);
        })
        .await;
}
