//! Zone tracking and active-zone selection.
//!
//! `ZoneTracker` owns the media-core side: the zone set, the active
//! zone reference and the lifecycle of the core client task. The
//! selection algorithm runs on every core event:
//!
//! 1. A configured zone id binds directly whenever that zone is present.
//! 2. Otherwise, an unbound reference binds to the first playing zone
//!    in zone-id order.
//! 3. After resolving, a zone that is no longer playing is unbound so
//!    the next event re-selects. This also applies in fixed-zone-id
//!    mode, which forces a re-resolution every cycle.
//! 4. Removal of the active zone is treated as a definitive stop.

use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::CoreConfig;
use crate::core_client;
use crate::presence::ConnectionState;
use crate::zones::{CoreEvent, PlaybackState, PlaybackZone, ZoneStatus};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Tracks the media core's zones and selects the one mirrored into
/// presence.
pub struct ZoneTracker {
    /// Zone id pinned by configuration, if any
    target_zone_id: Option<String>,
    /// Latest snapshot per zone id, owned exclusively by the tracker
    zones: HashMap<String, PlaybackZone>,
    /// Reference into the zone set; names a zone, never owns its data
    active: Option<String>,
    connection: ConnectionState,
    events: Option<mpsc::Receiver<CoreEvent>>,
    started: bool,
    warned_no_zone: bool,
}

impl ZoneTracker {
    pub fn new(target_zone_id: Option<String>) -> Self {
        Self {
            target_zone_id,
            zones: HashMap::new(),
            active: None,
            connection: ConnectionState::Disconnected,
            events: None,
            started: false,
            warned_no_zone: false,
        }
    }

    /// Start the media-core client. Called when the presence side first
    /// reaches ready; subsequent calls are no-ops.
    pub fn start(&mut self, config: &CoreConfig, shutdown: CancellationToken) {
        if self.started {
            return;
        }
        info!("connecting to media core");
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(core_client::run(config.clone(), tx, shutdown));
        self.events = Some(rx);
        self.started = true;
        self.connection = ConnectionState::Connecting;
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    /// Next event from the core subscription. Pends forever until
    /// `start` has been called; returns None once the client task ends.
    pub async fn next_event(&mut self) -> Option<CoreEvent> {
        match self.events.as_mut() {
            Some(rx) => rx.recv().await,
            None => std::future::pending().await,
        }
    }

    /// Process one core event, returning the resolved zone status when
    /// an active zone could be determined.
    pub fn handle_core_event(&mut self, event: CoreEvent) -> Option<ZoneStatus> {
        match event {
            CoreEvent::Paired { core_name } => {
                info!(core = %core_name, "paired with media core");
                self.connection = ConnectionState::Ready;
                None
            }
            CoreEvent::Unpaired => {
                info!("unpaired from media core");
                self.reset();
                None
            }
            CoreEvent::Subscribed { zones } => {
                debug!(count = zones.len(), "zone snapshot received");
                self.zones = zones
                    .into_iter()
                    .map(|zone| (zone.zone_id.clone(), zone))
                    .collect();
                self.resolve()
            }
            CoreEvent::Changed {
                zones_added,
                zones_changed,
                zones_removed,
            } => {
                let active_removed = self
                    .active
                    .as_deref()
                    .is_some_and(|active| zones_removed.iter().any(|id| id == active));

                for zone in zones_added.into_iter().chain(zones_changed) {
                    self.zones.insert(zone.zone_id.clone(), zone);
                }
                for id in &zones_removed {
                    self.zones.remove(id);
                }

                if active_removed {
                    self.active = None;
                    return Some(ZoneStatus::Stopped);
                }
                self.resolve()
            }
        }
    }

    /// Clear all state so a subsequent pairing starts clean.
    fn reset(&mut self) {
        self.zones.clear();
        self.active = None;
        self.connection = ConnectionState::Disconnected;
        self.warned_no_zone = false;
    }

    fn resolve(&mut self) -> Option<ZoneStatus> {
        self.bind_active();

        let Some(active_id) = self.active.clone() else {
            if !self.warned_no_zone {
                info!("no active zone yet, waiting");
                self.warned_no_zone = true;
            }
            return None;
        };
        self.warned_no_zone = false;

        let Some(zone) = self.zones.get(&active_id).cloned() else {
            // Reference points at a zone that is gone from the set
            self.active = None;
            return Some(ZoneStatus::Stopped);
        };

        if zone.state != PlaybackState::Playing {
            // Unbind whenever the zone stops playing, fixed id or not,
            // forcing re-selection on the next event.
            self.active = None;
        }
        Some(ZoneStatus::Zone(zone))
    }

    fn bind_active(&mut self) {
        if let Some(target) = &self.target_zone_id {
            if self.zones.contains_key(target) {
                self.active = Some(target.clone());
            }
        } else if self.active.is_none() {
            let mut ids: Vec<&String> = self.zones.keys().collect();
            ids.sort();
            self.active = ids
                .into_iter()
                .find(|id| self.zones[*id].state == PlaybackState::Playing)
                .cloned();
        }
    }

    #[cfg(test)]
    pub(crate) fn attach_for_tests(&mut self, rx: mpsc::Receiver<CoreEvent>) {
        self.events = Some(rx);
        self.started = true;
        self.connection = ConnectionState::Connecting;
    }
}
