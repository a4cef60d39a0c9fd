//! Bridge orchestration.
//!
//! Wires zone status changes through the activity mapper and rate
//! limiter into the presence connection, and coordinates the two
//! connection lifecycles: the media-core connection does not start
//! until the presence side has reached ready at least once.
//!
//! Everything runs on one select loop; the single pending presence
//! retry deadline is the only timer. Nothing escapes this boundary:
//! remote failures become a scheduled retry or a logged no-op.

use anyhow::Result;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::presence::activity::{self, PresenceUpdate};
use crate::presence::rate_limit::RateLimiter;
use crate::presence::{ConnectionState, PresenceConnection};
use crate::tracker::ZoneTracker;
use crate::zones::{CoreEvent, PlaybackState, ZoneStatus};

pub struct Bridge {
    config: Config,
    presence: PresenceConnection,
    tracker: ZoneTracker,
    limiter: RateLimiter,
    shutdown: CancellationToken,
}

impl Bridge {
    pub fn new(config: Config, shutdown: CancellationToken) -> Self {
        let presence = PresenceConnection::discord(config.presence.client_id.clone());
        let tracker = ZoneTracker::new(config.zone.zone_id.clone());
        Self {
            config,
            presence,
            tracker,
            limiter: RateLimiter::default(),
            shutdown,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        self.connect_presence().await;

        loop {
            let retry = self.presence.retry_deadline();
            let retry_sleep = retry.unwrap_or_else(|| {
                // inert deadline; the branch below is disabled anyway
                tokio::time::Instant::now() + Duration::from_secs(86_400)
            });

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("bridge shutting down");
                    break;
                }
                _ = tokio::time::sleep_until(retry_sleep), if retry.is_some() => {
                    self.connect_presence().await;
                }
                event = self.tracker.next_event() => {
                    match event {
                        Some(event) => self.handle_core_event(event).await,
                        None => {
                            warn!("media core event channel closed");
                            break;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Attempt the presence connection; the first ready also starts the
    /// media-core side.
    async fn connect_presence(&mut self) {
        if self.presence.connect().await {
            self.tracker
                .start(&self.config.core, self.shutdown.child_token());
        }
    }

    async fn handle_core_event(&mut self, event: CoreEvent) {
        if let Some(status) = self.tracker.handle_core_event(event) {
            self.publish_status(status).await;
        }
    }

    async fn publish_status(&mut self, status: ZoneStatus) {
        if self.presence.state() != ConnectionState::Ready {
            debug!("presence not ready, skipping zone status");
            return;
        }

        let update = activity::map_status(&status, unix_now());

        // Only playing activities go through the limiter; clears must
        // propagate immediately. A playing zone that mapped to a clear
        // (missing metadata) counts as a stop, not a playing update.
        let rate_limited = matches!(update, PresenceUpdate::Activity(_))
            && matches!(&status, ZoneStatus::Zone(zone) if zone.state == PlaybackState::Playing);
        if rate_limited && !self.limiter.allow(Instant::now()) {
            debug!("playing update dropped by rate limiter");
            return;
        }

        self.presence.publish(update).await;
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
