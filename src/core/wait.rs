// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Suspend/resume primitive shared by elicitation waits and tool execution.
//!
//! A [`Completer`] is handed to whoever produces the value (an inbound client
//! reply, a spawned tool future) and the matching [`WaitHandle`] suspends the
//! consumer until the value arrives, the deadline passes, or the producer is
//! dropped without completing.

use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;

/// How a wait ended
#[derive(Debug, PartialEq, Eq)]
pub enum WaitOutcome<T> {
    Ready(T),
    TimedOut,
    /// The completer was dropped without a value (producer gone or panicked)
    Abandoned,
}

/// Producing half of a wait
#[derive(Debug)]
pub struct Completer<T> {
    tx: oneshot::Sender<T>,
}

impl<T> Completer<T> {
    /// Hand the value to the waiter. Returns the value back if nobody is waiting anymore.
    pub fn complete(self, value: T) -> Result<(), T> {
        self.tx.send(value)
    }

    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consuming half of a wait
#[derive(Debug)]
pub struct WaitHandle<T> {
    rx: oneshot::Receiver<T>,
}

pub fn wait_pair<T>() -> (Completer<T>, WaitHandle<T>) {
    let (tx, rx) = oneshot::channel();
    (Completer { tx }, WaitHandle { rx })
}

impl<T> WaitHandle<T> {
    /// Suspend the calling task until completion or `limit` elapses.
    pub async fn wait(&mut self, limit: Duration) -> WaitOutcome<T> {
        match tokio::time::timeout(limit, &mut self.rx).await {
            Ok(Ok(value)) => WaitOutcome::Ready(value),
            Ok(Err(_)) => WaitOutcome::Abandoned,
            Err(_) => WaitOutcome::TimedOut,
        }
    }

    /// Non-blocking check, used to settle races after a timeout fired.
    pub fn try_take(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

/// Run `fut` on its own task and wait at most `limit` for its output.
///
/// A panic inside `fut` surfaces as [`WaitOutcome::Abandoned`]. On timeout the
/// task is aborted so nothing keeps running on behalf of a caller that left.
pub async fn spawn_with_deadline<F>(fut: F, limit: Duration) -> WaitOutcome<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let (completer, mut handle) = wait_pair();
    let worker = tokio::spawn(async move {
        let output = fut.await;
        let _ = completer.complete(output);
    });
    let outcome = handle.wait(limit).await;
    if matches!(outcome, WaitOutcome::TimedOut) {
        worker.abort();
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completion_wakes_waiter() {
        let (completer, mut handle) = wait_pair();
        tokio::spawn(async move {
            completer.complete(42).unwrap();
        });
        assert_eq!(handle.wait(Duration::from_secs(1)).await, WaitOutcome::Ready(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_then_late_value_is_still_recoverable() {
        let (completer, mut handle) = wait_pair::<u8>();
        assert_eq!(handle.wait(Duration::from_secs(1)).await, WaitOutcome::TimedOut);
        completer.complete(7).unwrap();
        assert_eq!(handle.try_take(), Some(7));
    }

    #[tokio::test]
    async fn test_dropped_completer_abandons() {
        let (completer, mut handle) = wait_pair::<()>();
        drop(completer);
        assert_eq!(handle.wait(Duration::from_secs(1)).await, WaitOutcome::Abandoned);
    }

    #[tokio::test]
    async fn test_spawned_panic_is_contained() {
        let outcome = spawn_with_deadline(
            async {
                panic!("boom");
            },
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(outcome, WaitOutcome::<()>::Abandoned);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_work_times_out() {
        let outcome = spawn_with_deadline(
            async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                1
            },
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(outcome, WaitOutcome::TimedOut);
    }
}
