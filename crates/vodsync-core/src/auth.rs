//! Credential gate
//!
//! The credential round trip loses the in-memory session: the full
//! configuration is stashed before handing control to the identity
//! provider and restored from the stash when the callback fragment comes
//! back. The gate's phase is session-level and separate from the per-player
//! playback states.

use crate::config::{AuthPrefs, Credentials, SessionConfig};
use crate::error::{Error, Result};
use tracing::info;

/// Session-level credential phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Unauthenticated,
    /// Configuration stashed, waiting for the callback fragment
    AwaitingCredentials,
    Authenticated,
    /// Credentials disabled by preference; media access may be degraded
    Disabled,
}

#[derive(Debug)]
pub struct AuthGate {
    phase: AuthPhase,
    prefs: Option<AuthPrefs>,
    credentials: Option<Credentials>,
    stash: Option<String>,
}

impl AuthGate {
    pub fn new(prefs: Option<AuthPrefs>) -> Self {
        let phase = match prefs {
            Some(AuthPrefs::DisableAuth) => AuthPhase::Disabled,
            _ => AuthPhase::Unauthenticated,
        };
        Self {
            phase,
            prefs,
            credentials: None,
            stash: None,
        }
    }

    pub fn phase(&self) -> AuthPhase {
        self.phase
    }

    pub fn prefs(&self) -> Option<AuthPrefs> {
        self.prefs
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase == AuthPhase::Authenticated
    }

    /// Begin the credential round trip: stash the configuration so it
    /// survives the redirect. Challenging twice without resuming would lose
    /// the first stash, so it is an error.
    pub fn challenge(&mut self, config: &SessionConfig) -> Result<()> {
        if self.phase == AuthPhase::Disabled {
            return Err(Error::CredentialsRequired);
        }
        if self.phase == AuthPhase::AwaitingCredentials {
            return Err(Error::Internal(
                "credential round trip already pending".into(),
            ));
        }
        self.stash = Some(config.to_query());
        self.phase = AuthPhase::AwaitingCredentials;
        info!("session configuration stashed for credential round trip");
        Ok(())
    }

    /// Complete the round trip from the callback fragment, restoring the
    /// stashed configuration.
    pub fn resume(&mut self, fragment: &str) -> Result<SessionConfig> {
        let credentials =
            Credentials::from_fragment(fragment).ok_or(Error::MissingCredentials)?;
        let stash = self
            .stash
            .take()
            .ok_or_else(|| Error::Internal("no stashed configuration to resume".into()))?;
        let config = SessionConfig::from_query(&stash)?;
        self.authenticate(credentials);
        Ok(config)
    }

    /// Accept credentials obtained out of band (persisted token, test setup).
    pub fn authenticate(&mut self, credentials: Credentials) {
        info!("credentials accepted");
        self.credentials = Some(credentials);
        self.phase = AuthPhase::Authenticated;
    }

    /// Drop the current credentials, forcing a new round trip.
    pub fn invalidate(&mut self) {
        self.credentials = None;
        if self.phase == AuthPhase::Authenticated {
            self.phase = AuthPhase::Unauthenticated;
        }
    }
}
