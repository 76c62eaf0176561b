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

//! Per-session ordered event delivery.
//!
//! Any number of producers (RPC handlers, timers, task workers) push onto an
//! unbounded queue without blocking; exactly one reader drains it. Pushes are
//! serialized under the channel lock, which also stamps the delivery id, so
//! the drain order is the push order. Closing the channel drops every later
//! push and ends the reader without flushing what is still queued.

use crate::core::models::Event;
use crate::utils::sync::lock;
use futures::Stream;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// What the reader hands to the wire
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Event(Event),
    /// Nothing was pushed for one idle interval
    Keepalive,
}

struct Sender {
    tx: Option<mpsc::UnboundedSender<Event>>,
    next_id: u64,
}

pub struct EventChannel {
    sender: Mutex<Sender>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Event>>>,
    closed: CancellationToken,
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl EventChannel {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            sender: Mutex::new(Sender {
                tx: Some(tx),
                next_id: 0,
            }),
            receiver: Mutex::new(Some(rx)),
            closed: CancellationToken::new(),
        }
    }

    /// Enqueue an event. Returns `false` when the channel is closed and the
    /// event was dropped.
    pub fn push(&self, event: impl Into<Event>) -> bool {
        let mut event = event.into();
        let mut sender = lock(&self.sender);
        let id = sender.next_id + 1;
        let Some(tx) = sender.tx.as_ref() else {
            debug!(method = ?event.message.method, "Dropping event for closed channel");
            return false;
        };
        event.id = Some(id);
        if tx.send(event).is_err() {
            // Reader side already gone; behave as closed.
            return false;
        }
        sender.next_id = id;
        true
    }

    /// Close the channel. Returns `true` for the call that actually closed it.
    pub fn close(&self) -> bool {
        let was_open = lock(&self.sender).tx.take().is_some();
        self.closed.cancel();
        was_open
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Number of events pushed so far
    pub fn pushed(&self) -> u64 {
        lock(&self.sender).next_id
    }

    /// Take the single reader. `None` if it was already taken.
    pub fn take_reader(&self) -> Option<EventReader> {
        lock(&self.receiver).take().map(|rx| EventReader {
            rx,
            closed: self.closed.clone(),
        })
    }
}

/// Exclusive consuming end of an [`EventChannel`]
pub struct EventReader {
    rx: mpsc::UnboundedReceiver<Event>,
    closed: CancellationToken,
}

impl EventReader {
    /// Wait for the next event, yielding [`Delivery::Keepalive`] when nothing
    /// arrives within `idle`. `None` once the channel is closed.
    pub async fn next(&mut self, idle: Duration) -> Option<Delivery> {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => None,
            received = tokio::time::timeout(idle, self.rx.recv()) => match received {
                Ok(Some(event)) => Some(Delivery::Event(event)),
                Ok(None) => None,
                Err(_) => Some(Delivery::Keepalive),
            },
        }
    }

    /// Lazy sequence of deliveries, ending when the channel closes.
    pub fn into_stream(self, idle: Duration) -> impl Stream<Item = Delivery> + Send + 'static {
        futures::stream::unfold(self, move |mut reader| async move {
            reader.next(idle).await.map(|delivery| (delivery, reader))
        })
    }
}
