//! Session configuration surface
//!
//! Player definitions, offsets, and the external event reference arrive as a
//! query-string-like key/value set (`playerN`, `offsetplayerN`, `race`,
//! `authPrefs`); credentials arrive in a fragment-delimited block
//! (`access_token`, `client_id`). The whole surface round-trips through
//! `to_query` so the credential gate can stash and restore it.

use crate::error::{Error, Result};
use crate::types::PlayerId;
use serde::{Deserialize, Serialize};
use url::form_urlencoded;
use url::Url;

/// Maximum number of player slots a session accepts
pub const MAX_PLAYERS: usize = 10;

/// One configured player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSpec {
    pub id: PlayerId,
    /// Opaque reference to the underlying playable stream
    pub source: String,
    /// Caller-supplied offset in milliseconds, relative to the alignment epoch
    pub offset_ms: Option<i64>,
}

/// Token persistence preferences carried through the credential round trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthPrefs {
    PersistToken,
    NeverSave,
    AutoRedirect,
    DisableAuth,
}

impl AuthPrefs {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthPrefs::PersistToken => "persistToken",
            AuthPrefs::NeverSave => "neverSave",
            AuthPrefs::AutoRedirect => "autoRedirect",
            AuthPrefs::DisableAuth => "disableAuth",
        }
    }
}

impl std::str::FromStr for AuthPrefs {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "persistToken" => Ok(AuthPrefs::PersistToken),
            "neverSave" => Ok(AuthPrefs::NeverSave),
            "autoRedirect" => Ok(AuthPrefs::AutoRedirect),
            "disableAuth" => Ok(AuthPrefs::DisableAuth),
            other => Err(Error::InvalidConfig(format!(
                "unknown authPrefs value '{other}'"
            ))),
        }
    }
}

/// Full session configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub players: Vec<PlayerSpec>,
    /// External event reference (`category/slug`, or a URL containing one)
    pub event_ref: Option<String>,
    pub auth_prefs: Option<AuthPrefs>,
}

impl SessionConfig {
    /// Parse the query-string configuration surface.
    pub fn from_query(query: &str) -> Result<Self> {
        let query = query.trim_start_matches('?');
        let pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let mut config = SessionConfig::default();
        let lookup = |key: &str| -> Option<&str> {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };

        // Reject player indices past the supported slots rather than
        // silently dropping them.
        for (key, _) in &pairs {
            for prefix in ["offsetplayer", "player"] {
                if let Some(rest) = key.strip_prefix(prefix) {
                    let index: usize = rest.parse().map_err(|_| {
                        Error::InvalidConfig(format!("unparseable player key '{key}'"))
                    })?;
                    if index >= MAX_PLAYERS {
                        return Err(Error::InvalidConfig(format!(
                            "player index {index} exceeds the {MAX_PLAYERS}-player limit"
                        )));
                    }
                    break;
                }
            }
        }

        for index in 0..MAX_PLAYERS {
            let offset_key = format!("offsetplayer{index}");
            let source = match lookup(&format!("player{index}")) {
                Some(s) if !s.is_empty() => s.to_string(),
                _ => {
                    if lookup(&offset_key).is_some() {
                        return Err(Error::InvalidConfig(format!(
                            "{offset_key} given without a player{index} source"
                        )));
                    }
                    continue;
                }
            };

            let offset_ms = match lookup(&offset_key) {
                Some(raw) => Some(raw.parse::<i64>().map_err(|_| {
                    Error::InvalidConfig(format!("unparseable offset '{raw}' for player{index}"))
                })?),
                None => None,
            };

            config.players.push(PlayerSpec {
                id: PlayerId::from_index(index),
                source,
                offset_ms,
            });
        }

        if let Some(race) = lookup("race") {
            config.event_ref = Some(parse_event_ref(race)?);
        }
        if let Some(prefs) = lookup("authPrefs") {
            config.auth_prefs = Some(prefs.parse()?);
        }

        Ok(config)
    }

    /// Serialize back to the query-string surface. `from_query(to_query())`
    /// reproduces the configuration exactly.
    pub fn to_query(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for spec in &self.players {
            serializer.append_pair(spec.id.as_str(), &spec.source);
            if let Some(offset) = spec.offset_ms {
                serializer.append_pair(&format!("offset{}", spec.id), &offset.to_string());
            }
        }
        if let Some(event_ref) = &self.event_ref {
            serializer.append_pair("race", event_ref);
        }
        if let Some(prefs) = self.auth_prefs {
            serializer.append_pair("authPrefs", prefs.as_str());
        }
        serializer.finish()
    }

    /// Parse a full session URL: configuration from the query, credentials
    /// from the fragment.
    pub fn from_url(url: &Url) -> Result<(Self, Option<Credentials>)> {
        let config = Self::from_query(url.query().unwrap_or(""))?;
        let credentials = url.fragment().and_then(Credentials::from_fragment);
        Ok((config, credentials))
    }
}

/// Normalize an event reference to `category/slug`.
///
/// Accepts either a bare id or a URL whose path starts with the id.
pub fn parse_event_ref(input: &str) -> Result<String> {
    let path = match Url::parse(input) {
        Ok(url) => url.path().to_string(),
        Err(_) => input.to_string(),
    };
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() < 2 {
        return Err(Error::InvalidConfig(format!(
            "event reference '{input}' is not category/slug"
        )));
    }
    Ok(format!("{}/{}", segments[0], segments[1]))
}

/// Credential block from the fragment-delimited callback surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    pub client_id: Option<String>,
}

impl Credentials {
    /// Parse `access_token` (required) and `client_id` (optional) from a
    /// URL fragment such as `scope=&access_token=abc&client_id=xyz`.
    pub fn from_fragment(fragment: &str) -> Option<Self> {
        let fragment = fragment.trim_start_matches('#');
        let mut access_token = None;
        let mut client_id = None;
        for (key, value) in form_urlencoded::parse(fragment.as_bytes()) {
            match key.as_ref() {
                "access_token" if !value.is_empty() => access_token = Some(value.into_owned()),
                "client_id" if !value.is_empty() => client_id = Some(value.into_owned()),
                _ => {}
            }
        }
        access_token.map(|access_token| Self {
            access_token,
            client_id,
        })
    }
}
