//! Single-flight credential refresh.
//!
//! When a call fails with an authorization error, [`ApiClient`](crate::ApiClient)
//! asks the [`RefreshCoordinator`] for a fresh access credential. The first
//! caller in a window becomes the *leader* and performs the one refresh call;
//! every caller that arrives while that refresh is in flight becomes a
//! *follower* and is parked on a oneshot channel in a FIFO queue.
//!
//! ```text
//!            first 401                      refresh ok
//!   IDLE ──────────────────▶ REFRESHING ───────────────────▶ IDLE
//!                              │   ▲        store pair, resolve waiters
//!                 later 401s   │   │
//!                 queue here   └───┘        refresh err
//!                                       ───────────────────▶ IDLE
//!                                        clear store, reject waiters,
//!                                        notify SessionObserver
//! ```
//!
//! Exactly one refresh call is made per cycle no matter how many callers
//! join it. The `IDLE → REFRESHING` transition happens under a mutex so the
//! guarantee holds on a multi-threaded runtime as well.
//!
//! A refresh failure is terminal for the cycle: it is not retried, the
//! credential store is cleared and the observer is told the session ended.
//!
//! A cycle only writes to the store if nothing else did while it was in
//! flight. When the user signs out mid-refresh the refreshed pair is
//! discarded and every caller gets [`RefreshError::SignedOut`]; when someone
//! signs in mid-refresh the callers replay with the new credential.
//!
//! If the leader is dropped before settling (a caller-side timeout, say),
//! the parked followers wake up and compete to lead a new cycle.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::credentials::{CredentialPair, CredentialStore};
use crate::secret::Secret;

/// Why a refresh cycle failed. Every caller parked on the cycle receives a
/// clone of the same error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    /// No refresh credential was held when the authorization failure arrived.
    #[error("no refresh credential available")]
    MissingRefreshCredential,

    /// The refresh endpoint answered with a non-success status.
    #[error("refresh rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The refresh endpoint could not be reached.
    #[error("refresh request failed: {message}")]
    Transport { message: String },

    /// The refresh endpoint answered with something other than a credential pair.
    #[error("malformed refresh response: {message}")]
    MalformedResponse { message: String },

    /// The credentials were cleared while the refresh was in flight.
    #[error("signed out while the refresh was in flight")]
    SignedOut,
}

/// Mints a new credential pair from a refresh credential.
#[async_trait]
pub trait CredentialRefresher: Send + Sync {
    async fn refresh(&self, refresh: &Secret) -> Result<CredentialPair, RefreshError>;
}

/// Notified when a refresh cycle fails and the session is over.
///
/// Front ends use this to send the user back to the sign-in entry point.
pub trait SessionObserver: Send + Sync {
    fn session_ended(&self, reason: &RefreshError);
}

/// Default observer: logs the sign-out.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSessionObserver;

impl SessionObserver for LogSessionObserver {
    fn session_ended(&self, reason: &RefreshError) {
        warn!("Session ended, sign in again: {}", reason);
    }
}

type Waiter = oneshot::Sender<Result<Secret, RefreshError>>;

#[derive(Default)]
struct RefreshState {
    refreshing: bool,
    /// Non-empty only while `refreshing`.
    waiters: VecDeque<Waiter>,
}

enum Role {
    Leader,
    Follower(oneshot::Receiver<Result<Secret, RefreshError>>),
}

/// Coordinates credential refresh across concurrent callers.
pub struct RefreshCoordinator {
    credentials: Arc<CredentialStore>,
    observer: Arc<dyn SessionObserver>,
    state: Mutex<RefreshState>,
}

impl RefreshCoordinator {
    pub fn new(credentials: Arc<CredentialStore>, observer: Arc<dyn SessionObserver>) -> Self {
        Self {
            credentials,
            observer,
            state: Mutex::new(RefreshState::default()),
        }
    }

    /// Obtain a fresh access credential after an authorization failure.
    ///
    /// Either performs the refresh (first caller of a cycle) or waits for the
    /// refresh already in flight. Resolves to the new access credential, or
    /// to the cycle's error.
    pub async fn recover(
        &self,
        refresher: &dyn CredentialRefresher,
    ) -> Result<Secret, RefreshError> {
        loop {
            let role = {
                let mut state = self.state.lock();
                if state.refreshing {
                    let (tx, rx) = oneshot::channel();
                    state.waiters.push_back(tx);
                    debug!(queued = state.waiters.len(), "Refresh in flight, queueing caller");
                    Role::Follower(rx)
                } else {
                    state.refreshing = true;
                    Role::Leader
                }
            };

            match role {
                Role::Leader => return self.lead(refresher).await,
                Role::Follower(rx) => match rx.await {
                    Ok(result) => return result,
                    Err(_) => debug!("Refresh leader dropped, joining the next cycle"),
                },
            }
        }
    }

    /// True while a refresh call is in flight.
    pub fn is_refreshing(&self) -> bool {
        self.state.lock().refreshing
    }

    /// Number of callers parked on the current cycle.
    pub fn pending_waiters(&self) -> usize {
        self.state.lock().waiters.len()
    }

    async fn lead(&self, refresher: &dyn CredentialRefresher) -> Result<Secret, RefreshError> {
        let mut guard = CycleGuard {
            coordinator: self,
            settled: false,
        };

        let (refresh, generation) = self.credentials.refresh_at_generation();
        let outcome = match refresh {
            None => Err(RefreshError::MissingRefreshCredential),
            Some(refresh) => {
                debug!("Refreshing access credential");
                refresher
                    .refresh(&refresh)
                    .await
                    .and_then(|pair| Self::complete_pair(pair, refresh))
            }
        };

        guard.settled = true;
        self.settle(outcome, generation)
    }

    /// Reject an empty access credential and keep the current refresh
    /// credential when the server did not rotate it.
    fn complete_pair(
        mut pair: CredentialPair,
        previous_refresh: Secret,
    ) -> Result<CredentialPair, RefreshError> {
        if pair.access.is_blank() {
            return Err(RefreshError::MalformedResponse {
                message: "empty access credential".to_string(),
            });
        }
        if pair.refresh.as_ref().is_none_or(Secret::is_blank) {
            pair.refresh = Some(previous_refresh);
        }
        Ok(pair)
    }

    fn settle(
        &self,
        outcome: Result<CredentialPair, RefreshError>,
        generation: u64,
    ) -> Result<Secret, RefreshError> {
        let mut session_ended = false;
        let result = match outcome {
            Ok(pair) => {
                let access = pair.access.clone();
                if self.credentials.set_pair_if_generation(pair, generation) {
                    Ok(access)
                } else {
                    self.superseded()
                }
            }
            Err(e) => {
                if self.credentials.clear_if_generation(generation) {
                    session_ended = true;
                    Err(e)
                } else {
                    self.superseded()
                }
            }
        };

        let waiters = self.finish_cycle();
        match &result {
            Ok(_) => info!(replays = waiters.len() + 1, "Access credential refreshed"),
            Err(e) => warn!(rejected = waiters.len() + 1, "Credential refresh failed: {}", e),
        }
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }

        if let (true, Err(e)) = (session_ended, &result) {
            self.observer.session_ended(e);
        }
        result
    }

    /// The store was written while the cycle was in flight: its contents win.
    fn superseded(&self) -> Result<Secret, RefreshError> {
        info!("Credentials changed during refresh, discarding the refresh result");
        self.credentials.access().ok_or(RefreshError::SignedOut)
    }

    /// Return to IDLE and hand back the queue, drained.
    fn finish_cycle(&self) -> VecDeque<Waiter> {
        let mut state = self.state.lock();
        state.refreshing = false;
        std::mem::take(&mut state.waiters)
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RefreshCoordinator")
            .field("refreshing", &state.refreshing)
            .field("waiters", &state.waiters.len())
            .finish()
    }
}

/// Returns the coordinator to IDLE if the leader is dropped mid-refresh.
/// Dropping the queued senders wakes followers, which then compete to lead
/// the next cycle.
struct CycleGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            let abandoned = self.coordinator.finish_cycle();
            warn!(abandoned = abandoned.len(), "Refresh leader dropped before settling");
        }
    }
}
