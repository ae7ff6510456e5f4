//! Session state shared by every call from one client.
//!
//! # Design
//! Two credential slots live behind one `parking_lot::RwLock`: the API
//! user's credential from `login`, and an optional sudo credential from
//! `login_user` that acts on behalf of another user. The sudo credential,
//! while present, is the active one. Dispatch takes a cheap `Arc` snapshot
//! under the read lock; login and logout replace slots under the write
//! lock. A call therefore sees either the old credential or the new one,
//! never a mix.
//!
//! Revocation is compare-and-clear: a rejected or logged-out token only
//! clears the slot still holding that token, so a late reply to a call
//! made with an older credential cannot wipe a newer one.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Credentials are treated as expired this long before the backend's
/// stated expiry.
pub const EXPIRY_LAG: Duration = Duration::from_secs(10);

pub const DEFAULT_API_VERSION: &str = "4.0";

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
}

/// An opaque bearer token plus its expiry.
#[derive(Clone)]
pub struct Credential {
    token: String,
    expires_at: Option<Instant>,
}

impl Credential {
    /// `expires_in` is in seconds; zero means no known expiry. A lifetime
    /// too large to represent is treated as no known expiry as well.
    pub fn new(token: impl Into<String>, expires_in: u64) -> Self {
        let expires_at = if expires_in == 0 {
            None
        } else {
            Instant::now().checked_add(Duration::from_secs(expires_in).saturating_sub(EXPIRY_LAG))
        };
        Self {
            token: token.into(),
            expires_at,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn is_active(&self) -> bool {
        self.expires_at.is_none_or(|at| Instant::now() < at)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Default)]
struct Slots {
    primary: Option<Arc<Credential>>,
    sudo: Option<Arc<Credential>>,
}

#[derive(Debug)]
pub struct SessionContext {
    api_version: String,
    slots: RwLock<Slots>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new(DEFAULT_API_VERSION)
    }
}

impl SessionContext {
    pub fn new(api_version: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
            slots: RwLock::new(Slots::default()),
        }
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// Snapshot of the active credential: the sudo credential if one is
    /// live, otherwise the API user's. Expired credentials are dropped and
    /// read as absent.
    pub fn credential(&self) -> Option<Arc<Credential>> {
        self.sudo_credential().or_else(|| self.primary())
    }

    /// Snapshot of the API user's credential, ignoring any sudo credential.
    pub fn primary(&self) -> Option<Arc<Credential>> {
        let current = self.slots.read().primary.clone();
        self.live(current, |slots| &mut slots.primary)
    }

    fn sudo_credential(&self) -> Option<Arc<Credential>> {
        let current = self.slots.read().sudo.clone();
        self.live(current, |slots| &mut slots.sudo)
    }

    fn live(
        &self,
        current: Option<Arc<Credential>>,
        select: impl FnOnce(&mut Slots) -> &mut Option<Arc<Credential>>,
    ) -> Option<Arc<Credential>> {
        match current {
            Some(cred) if cred.is_active() => Some(cred),
            Some(expired) => {
                let mut slots = self.slots.write();
                let slot = select(&mut *slots);
                // Only clear if nobody stored a fresh credential meanwhile.
                if slot.as_ref().is_some_and(|c| Arc::ptr_eq(c, &expired)) {
                    *slot = None;
                    tracing::info!("session credential expired");
                }
                None
            }
            None => None,
        }
    }

    pub fn state(&self) -> SessionState {
        match self.credential() {
            Some(_) => SessionState::Authenticated,
            None => SessionState::Unauthenticated,
        }
    }

    /// Whether calls currently act on behalf of another user.
    pub fn is_sudo(&self) -> bool {
        self.sudo_credential().is_some()
    }

    /// Store the API user's credential. Any sudo credential is dropped.
    pub fn store(&self, credential: Credential) {
        let mut slots = self.slots.write();
        slots.primary = Some(Arc::new(credential));
        slots.sudo = None;
        tracing::info!(api_version = %self.api_version, "session authenticated");
    }

    /// Store a credential acting on behalf of another user. It stays active
    /// until revoked; the API user's credential is kept underneath.
    pub fn store_sudo(&self, credential: Credential) {
        self.slots.write().sudo = Some(Arc::new(credential));
        tracing::info!(api_version = %self.api_version, "sudo session started");
    }

    /// Drop every credential.
    pub fn clear(&self) {
        let mut slots = self.slots.write();
        let had_sudo = slots.sudo.take().is_some();
        if slots.primary.take().is_some() || had_sudo {
            tracing::info!("session credential cleared");
        }
    }

    /// Revoke the credential carrying `token`. Revoking the sudo token
    /// reverts to the API user; revoking the API user's token ends the
    /// whole session. Returns false when no slot holds `token` any more.
    pub fn revoke(&self, token: &str) -> bool {
        let mut slots = self.slots.write();
        if slots.sudo.as_ref().is_some_and(|c| c.token() == token) {
            slots.sudo = None;
            tracing::info!("sudo session ended");
            return true;
        }
        if slots.primary.as_ref().is_some_and(|c| c.token() == token) {
            slots.primary = None;
            slots.sudo = None;
            tracing::info!("session credential cleared");
            return true;
        }
        tracing::debug!("revoked token is no longer held");
        false
    }
}
