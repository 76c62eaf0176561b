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

//! Periodic schedulers.
//!
//! Every initialized session gets two timers: a keepalive ping and a status
//! notification. Both are plain tokio tasks that select on the session's
//! shutdown token, so terminating a session stops them at their next poll.
//! A single reaper task sweeps the store for idle sessions.

use crate::config::Config;
use crate::core::constants::methods;
use crate::core::models::JsonRpcMessage;
use crate::session::{Session, SessionStore};
use crate::utils::time;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSettings {
    pub ping_interval: Duration,
    pub status_interval: Duration,
}

impl From<&Config> for TimerSettings {
    fn from(config: &Config) -> Self {
        Self {
            ping_interval: config.ping_interval(),
            status_interval: config.status_interval(),
        }
    }
}

/// Start the keepalive and status timers for `session`. Idempotent: returns
/// `false` if the session already has timers or is terminated.
pub fn start_session_timers(session: &Arc<Session>, settings: TimerSettings) -> bool {
    let handles = vec![
        spawn_periodic(session, settings.ping_interval, send_ping),
        spawn_periodic(session, settings.status_interval, send_status),
    ];
    let attached = session.attach_timers(handles);
    if attached {
        debug!(session_id = %session.id(), "Session timers started");
    }
    attached
}

fn spawn_periodic<F>(session: &Arc<Session>, period: Duration, mut tick: F) -> JoinHandle<()>
where
    F: FnMut(&Session) + Send + 'static,
{
    let token = session.shutdown_token();
    // Weak so a timer never keeps its own session alive.
    let session = Arc::downgrade(session);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    let Some(session) = session.upgrade() else { break };
                    if !session.is_active() {
                        break;
                    }
                    tick(&session);
                }
            }
        }
    })
}

fn send_ping(session: &Session) {
    session.send_ping();
}

fn send_status(session: &Session) {
    let stats = session.stats();
    let count = stats.notifications_sent.load(Ordering::Relaxed) + 1;
    let uptime = session.uptime();
    let params = json!({
        "timestamp": time::now(),
        "session_uptime": uptime.as_secs_f64(),
        "notification_count": count,
        "pings_sent": stats.pings_sent.load(Ordering::Relaxed),
        "pongs_received": stats.pongs_received.load(Ordering::Relaxed),
        "pending_elicitations": session.correlations().len(),
        "message": format!(
            "Server is healthy. Session active for {} seconds",
            uptime.as_secs()
        ),
    });
    if session.push(JsonRpcMessage::notification(methods::SERVER_STATUS, Some(params))) {
        stats.notifications_sent.fetch_add(1, Ordering::Relaxed);
    }
}

/// Single process-wide sweep terminating sessions idle beyond `threshold`.
pub fn spawn_reaper(
    store: Arc<SessionStore>,
    every: Duration,
    threshold: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + every, every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let reaped = store.reap_idle(threshold);
                    if !reaped.is_empty() {
                        info!(count = reaped.len(), "Reaped idle sessions");
                    }
                }
            }
        }
        debug!("Reaper stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::channel::Delivery;
    use futures::StreamExt;

    fn settings() -> TimerSettings {
        TimerSettings {
            ping_interval: Duration::from_secs(10),
            status_interval: Duration::from_secs(30),
        }
    }

    async fn wait_for_timers_to_stop(session: &Session) {
        for _ in 0..50 {
            if session.running_timers() == 0 {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("timers still running after termination");
    }

    #[tokio::test(start_paused = true)]
    async fn test_pings_and_status_are_pushed_on_schedule() {
        let store = SessionStore::new();
        let session = store.create();
        let mut stream = Box::pin(session.drain(Duration::from_secs(600)).unwrap());
        assert!(start_session_timers(&session, settings()));

        let mut methods_seen = Vec::new();
        while methods_seen.len() < 4 {
            if let Some(Delivery::Event(event)) = stream.next().await {
                methods_seen.push((event.message.method.clone().unwrap(), event.message.id));
            }
        }
        assert_eq!(methods_seen[0], ("ping".to_string(), Some(json!("ping-1"))));
        assert_eq!(methods_seen[1], ("ping".to_string(), Some(json!("ping-2"))));
        // At t=30 both timers fire; either order is fine.
        let at_thirty: Vec<&str> = methods_seen[2..].iter().map(|(m, _)| m.as_str()).collect();
        assert!(at_thirty.contains(&"notification/server_status"));
        assert!(at_thirty.contains(&"ping"));
        store.terminate(&session.id());
    }

    #[tokio::test(start_paused = true)]
    async fn test_termination_stops_timers() {
        let store = SessionStore::new();
        let session = store.create();
        assert!(start_session_timers(&session, settings()));
        assert_eq!(session.running_timers(), 2);

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert!(store.terminate(&session.id()));
        wait_for_timers_to_stop(&session).await;

        let pushed = session.events_pushed();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(session.events_pushed(), pushed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timers_start_once() {
        let store = SessionStore::new();
        let session = store.create();
        assert!(start_session_timers(&session, settings()));
        assert!(!start_session_timers(&session, settings()));
        assert_eq!(session.running_timers(), 2);
        store.terminate(&session.id());
        assert!(!start_session_timers(&session, settings()));
    }

    #[tokio::test]
    async fn test_status_counts_only_delivered_notifications() {
        let store = SessionStore::new();
        let session = store.create();
        let mut stream = Box::pin(session.drain(Duration::from_secs(600)).unwrap());

        send_status(&session);
        let Some(Delivery::Event(event)) = stream.next().await else {
            panic!("expected status notification");
        };
        assert_eq!(event.message.params.unwrap()["notification_count"], 1);

        assert!(store.terminate(&session.id()));
        send_status(&session);
        send_ping(&session);
        let stats = session.stats();
        assert_eq!(stats.notifications_sent.load(Ordering::Relaxed), 1);
        assert_eq!(stats.pings_sent.load(Ordering::Relaxed), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_sweeps_and_stops() {
        let store = Arc::new(SessionStore::new());
        let idle = store.create();
        let shutdown = CancellationToken::new();
        let reaper = spawn_reaper(
            store.clone(),
            Duration::from_secs(60),
            Duration::from_secs(300),
            shutdown.clone(),
        );

        let busy = store.create();
        for _ in 0..6 {
            tokio::time::sleep(Duration::from_secs(60)).await;
            busy.touch();
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!idle.is_active());
        assert!(busy.is_active());

        shutdown.cancel();
        reaper.await.unwrap();
    }
}
