//! Presence service connection lifecycle.
//!
//! `PresenceConnection` owns the single Discord IPC session: connect,
//! login, detect transport loss, retry. The Discord client speaks
//! blocking request/response over a local socket, so there is no closed
//! callback; transport loss surfaces as a failed publish and is handled
//! as the closed transition.

pub mod activity;
pub mod rate_limit;

use anyhow::{anyhow, Result};
use discord_rich_presence::{activity::Activity, activity::Assets, activity::Timestamps};
use discord_rich_presence::{DiscordIpc, DiscordIpcClient};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use self::activity::{PresencePayload, PresenceUpdate};

/// Fixed retry delay; deliberately not exponential.
pub const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Connection state of a remote, one per remote end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
}

/// Transport behind the presence connection.
///
/// Calls are blocking; the connection pushes them through
/// `spawn_blocking`. The mock in tests implements the same seam.
pub trait PresenceTransport: Send {
    /// Open the socket and log in with the fixed client identifier.
    ///
    /// No scope negotiation: requesting elevated scopes forces recurring
    /// re-authorization prompts with no added value here.
    fn connect(&mut self) -> Result<()>;
    fn set_activity(&mut self, payload: &PresencePayload) -> Result<()>;
    fn clear_activity(&mut self) -> Result<()>;
    fn close(&mut self);
}

pub type TransportFactory = Box<dyn Fn() -> Result<Box<dyn PresenceTransport>> + Send>;

/// Discord IPC implementation of the transport seam.
pub struct DiscordTransport {
    client: DiscordIpcClient,
}

impl DiscordTransport {
    pub fn new(client_id: &str) -> Result<Self> {
        let client = DiscordIpcClient::new(client_id).map_err(|e| anyhow!("{e}"))?;
        Ok(Self { client })
    }
}

impl PresenceTransport for DiscordTransport {
    fn connect(&mut self) -> Result<()> {
        self.client.connect().map_err(|e| anyhow!("{e}"))
    }

    fn set_activity(&mut self, payload: &PresencePayload) -> Result<()> {
        let assets = Assets::new()
            .large_image(payload.large_image)
            .large_text(&payload.large_text)
            .small_image(payload.small_image)
            .small_text(payload.small_text);

        let mut act = Activity::new().details(&payload.details).assets(assets);
        if let Some(state) = &payload.state {
            act = act.state(state);
        }
        if let (Some(start), Some(end)) = (payload.start_timestamp, payload.end_timestamp) {
            act = act.timestamps(Timestamps::new().start(start).end(end));
        }

        self.client.set_activity(act).map_err(|e| anyhow!("{e}"))
    }

    fn clear_activity(&mut self) -> Result<()> {
        self.client.clear_activity().map_err(|e| anyhow!("{e}"))
    }

    fn close(&mut self) {
        let _ = self.client.close();
    }
}

/// Owns the lifecycle of the presence session.
pub struct PresenceConnection {
    factory: TransportFactory,
    session: Option<Box<dyn PresenceTransport>>,
    state: ConnectionState,
    /// Single-slot retry timer: re-scheduling replaces the deadline, so
    /// at most one retry is ever pending.
    retry_at: Option<Instant>,
    /// Bumped on every connect; late results from a superseded session
    /// are discarded.
    session_seq: u64,
}

impl PresenceConnection {
    pub fn new(factory: TransportFactory) -> Self {
        Self {
            factory,
            session: None,
            state: ConnectionState::Disconnected,
            retry_at: None,
            session_seq: 0,
        }
    }

    /// Connection backed by the real Discord IPC transport.
    pub fn discord(client_id: String) -> Self {
        Self::new(Box::new(move || {
            let transport = DiscordTransport::new(&client_id)?;
            Ok(Box::new(transport) as Box<dyn PresenceTransport>)
        }))
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Deadline of the pending retry, if one is scheduled.
    pub fn retry_deadline(&self) -> Option<Instant> {
        self.retry_at
    }

    /// Connect (or reconnect) to the presence service.
    ///
    /// Idempotent: an existing session is torn down before the new one
    /// is created, so there is never more than one live session. Returns
    /// true when the session became ready, once per reconnect.
    pub async fn connect(&mut self) -> bool {
        if let Some(mut old) = self.session.take() {
            debug!("tearing down existing presence session");
            let _ = tokio::task::spawn_blocking(move || old.close()).await;
        }

        info!("connecting to presence service");
        self.state = ConnectionState::Connecting;
        self.session_seq += 1;
        let seq = self.session_seq;

        let transport = match (self.factory)() {
            Ok(transport) => transport,
            Err(e) => {
                warn!(error = %e, "failed to create presence session");
                self.state = ConnectionState::Disconnected;
                self.schedule_retry();
                return false;
            }
        };

        let joined = tokio::task::spawn_blocking(move || {
            let mut transport = transport;
            let result = transport.connect();
            (transport, result)
        })
        .await;

        let (transport, login) = match joined {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "presence connect task failed");
                self.state = ConnectionState::Disconnected;
                self.schedule_retry();
                return false;
            }
        };

        self.finish_connect(seq, transport, login).await
    }

    /// Install a finished login attempt, unless a newer connect has
    /// superseded it in the meantime.
    async fn finish_connect(
        &mut self,
        seq: u64,
        transport: Box<dyn PresenceTransport>,
        login: Result<()>,
    ) -> bool {
        if seq != self.session_seq {
            // A newer connect superseded this one while it was in
            // flight; close the orphaned transport instead of leaking
            // its socket to Drop.
            debug!("discarding stale presence connect result");
            let mut stale = transport;
            let _ = tokio::task::spawn_blocking(move || stale.close()).await;
            return false;
        }

        match login {
            Ok(()) => {
                info!("presence session ready");
                self.session = Some(transport);
                self.state = ConnectionState::Ready;
                self.retry_at = None;
                true
            }
            Err(e) => {
                warn!(error = %e, "presence login failed, will retry");
                self.state = ConnectionState::Disconnected;
                self.schedule_retry();
                false
            }
        }
    }

    /// Publish an update. No-op unless the session is ready; a transport
    /// failure transitions to disconnected and schedules a retry.
    pub async fn publish(&mut self, update: PresenceUpdate) {
        if self.state != ConnectionState::Ready {
            debug!("presence not ready, dropping update");
            return;
        }
        let Some(transport) = self.session.take() else {
            self.state = ConnectionState::Disconnected;
            self.schedule_retry();
            return;
        };

        let joined = tokio::task::spawn_blocking(move || {
            let mut transport = transport;
            let result = match &update {
                PresenceUpdate::Activity(payload) => transport.set_activity(payload),
                PresenceUpdate::Clear => transport.clear_activity(),
            };
            (transport, result)
        })
        .await;

        match joined {
            Ok((transport, Ok(()))) => {
                self.session = Some(transport);
            }
            Ok((_, Err(e))) => {
                warn!(error = %e, "presence transport closed");
                self.state = ConnectionState::Disconnected;
                self.schedule_retry();
            }
            Err(e) => {
                warn!(error = %e, "presence publish task failed");
                self.state = ConnectionState::Disconnected;
                self.schedule_retry();
            }
        }
    }

    fn schedule_retry(&mut self) {
        self.retry_at = Some(Instant::now() + RETRY_DELAY);
    }
}


#[cfg(test)]
mod tests {
    use super::testing::mock_connection;
    use super::*;

    fn sample_payload() -> PresencePayload {
        PresencePayload {
            details: "Song".to_string(),
            state: Some("Artist".to_string()),
            start_timestamp: Some(970),
            end_timestamp: Some(1150),
            large_image: "roon-main",
            large_text: "Zone: Living Room".to_string(),
            small_image: "play-symbol",
            small_text: "Roon",
        }
    }

    #[tokio::test]
    async fn test_connect_reaches_ready_and_clears_retry() {
        let (mut conn, _state) = mock_connection();
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        assert!(conn.connect().await);
        assert_eq!(conn.state(), ConnectionState::Ready);
        assert!(conn.retry_deadline().is_none());
    }

    #[tokio::test]
    async fn test_double_connect_yields_one_active_session() {
        let (mut conn, state) = mock_connection();

        assert!(conn.connect().await);
        assert!(conn.connect().await);

        let s = state.lock().unwrap();
        assert_eq!(s.created, 2);
        assert_eq!(s.closed, 1, "first session must be torn down");
        assert_eq!(s.open_sessions, 1, "exactly one live session");
    }

    #[tokio::test]
    async fn test_login_failure_schedules_retry() {
        let (mut conn, state) = mock_connection();
        state.lock().unwrap().fail_connect = true;

        assert!(!conn.connect().await);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(conn.retry_deadline().is_some());
    }

    #[tokio::test]
    async fn test_retry_slot_is_replaced_not_duplicated() {
        let (mut conn, state) = mock_connection();
        state.lock().unwrap().fail_connect = true;

        conn.connect().await;
        let first = conn.retry_deadline().unwrap();

        // A second failure while a retry is pending replaces the deadline
        conn.connect().await;
        let second = conn.retry_deadline().unwrap();
        assert!(second >= first);
    }

    #[tokio::test]
    async fn test_stale_connect_result_is_closed_not_installed() {
        let (mut conn, state) = mock_connection();
        assert!(conn.connect().await);

        // a login that finished for a superseded session must be torn
        // down, leaving the live session untouched
        let mut orphan = (conn.factory)().unwrap();
        orphan.connect().unwrap();
        assert_eq!(state.lock().unwrap().open_sessions, 2);

        let accepted = conn.finish_connect(0, orphan, Ok(())).await;
        assert!(!accepted);
        assert_eq!(conn.state(), ConnectionState::Ready);
        assert_eq!(
            state.lock().unwrap().open_sessions,
            1,
            "orphaned session must be closed"
        );
    }

    #[tokio::test]
    async fn test_publish_is_noop_when_not_ready() {
        let (mut conn, state) = mock_connection();

        conn.publish(PresenceUpdate::Activity(sample_payload())).await;
        conn.publish(PresenceUpdate::Clear).await;

        let s = state.lock().unwrap();
        assert!(s.activities.is_empty());
        assert_eq!(s.clears, 0);
    }

    #[tokio::test]
    async fn test_publish_forwards_activity_and_clear() {
        let (mut conn, state) = mock_connection();
        conn.connect().await;

        conn.publish(PresenceUpdate::Activity(sample_payload())).await;
        conn.publish(PresenceUpdate::Clear).await;

        let s = state.lock().unwrap();
        assert_eq!(s.activities.len(), 1);
        assert_eq!(s.activities[0].details, "Song");
        assert_eq!(s.clears, 1);
    }

    #[tokio::test]
    async fn test_publish_failure_disconnects_and_schedules_retry() {
        let (mut conn, state) = mock_connection();
        conn.connect().await;
        state.lock().unwrap().fail_publish = true;

        conn.publish(PresenceUpdate::Activity(sample_payload())).await;

        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(conn.retry_deadline().is_some());
    }
}
