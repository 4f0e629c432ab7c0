use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthError, TokenExchange};

/// Seconds shaved off the provider-declared token lifetime to absorb clock skew and latency.
pub const EXPIRY_SAFETY_MARGIN_SECS: i64 = 10;

/// Expiry instant for a token of `expires_in` seconds received at `received_at`, less the
/// safety margin.
pub fn token_expiry(
    expires_in: i64,
    received_at: DateTime<Utc>,
) -> Result<DateTime<Utc>, AuthError> {
    expires_in
        .checked_sub(EXPIRY_SAFETY_MARGIN_SECS)
        .and_then(Duration::try_seconds)
        .and_then(|lifetime| received_at.checked_add_signed(lifetime))
        .ok_or(AuthError::InvalidExpiry(expires_in))
}

/// Per-user credential state persisted by the embedding application.
///
/// A record holding a `sign_in_state` but no `id_token` is an in-flight connection flow.
/// The presence of `refresh_token` is what makes a session valid.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_in_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token_expiry: Option<DateTime<Utc>>,
    #[serde(default)]
    pub connections: Vec<String>,
}

impl CredentialRecord {
    /// Build a fresh record from an exchange, replacing every previous field.
    pub fn from_exchange(
        tokens: TokenExchange,
        connections: Vec<String>,
        received_at: DateTime<Utc>,
    ) -> Result<Self, AuthError> {
        let expiry = token_expiry(tokens.expires_in, received_at)?;
        Ok(Self {
            sign_in_state: None,
            refresh_token: Some(tokens.refresh_token),
            id_token: Some(tokens.id_token),
            id_token_expiry: Some(expiry),
            connections,
        })
    }

    /// A refresh token on file is what makes a session usable.
    pub fn has_session(&self) -> bool {
        self.refresh_token.is_some()
    }

    pub fn is_pending_connection(&self) -> bool {
        self.sign_in_state.is_some() && self.id_token.is_none()
    }

    /// Whether the cached id token may be used as-is: present and expiring strictly after `now`.
    pub fn has_live_id_token(&self, now: DateTime<Utc>) -> bool {
        self.id_token.is_some() && matches!(self.id_token_expiry, Some(expiry) if expiry > now)
    }

    /// Whether the id token must be refreshed before it is presented downstream.
    ///
    /// A token already past its expiry (strictly before `now`) needs refreshing, and so does
    /// a token without a recorded expiry or a record without any token.
    pub fn id_token_needs_refresh(&self, now: DateTime<Utc>) -> bool {
        match (&self.id_token, self.id_token_expiry) {
            (Some(_), Some(expiry)) => expiry < now,
            _ => true,
        }
    }

    /// Exact comparison of a presented callback state against the stored one.
    pub fn matches_sign_in_state(&self, presented: &str) -> bool {
        !presented.is_empty() && self.sign_in_state.as_deref() == Some(presented)
    }
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn redact(value: &Option<String>) -> &'static str {
            if value.is_some() {
                "[REDACTED]"
            } else {
                "None"
            }
        }
        f.debug_struct("CredentialRecord")
            .field("sign_in_state", &redact(&self.sign_in_state))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("id_token", &redact(&self.id_token))
            .field("id_token_expiry", &self.id_token_expiry)
            .field("connections", &self.connections)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live_record(expiry: DateTime<Utc>) -> CredentialRecord {
        CredentialRecord {
            refresh_token: Some("rt".into()),
            id_token: Some("id".into()),
            id_token_expiry: Some(expiry),
            ..Default::default()
        }
    }

    #[test]
    fn exchange_applies_safety_margin() {
        let now = Utc::now();
        let record = CredentialRecord::from_exchange(
            TokenExchange {
                id_token: "id1".into(),
                refresh_token: "rt1".into(),
                expires_in: 3600,
            },
            vec!["confluence".into()],
            now,
        )
        .unwrap();
        assert_eq!(record.id_token_expiry, Some(now + Duration::seconds(3590)));
        assert_eq!(record.refresh_token.as_deref(), Some("rt1"));
        assert!(record.sign_in_state.is_none());
    }

    #[test]
    fn out_of_range_lifetime_is_an_error() {
        let now = Utc::now();
        for expires_in in [i64::MAX, i64::MIN, i64::MAX / 1000] {
            let result = CredentialRecord::from_exchange(
                TokenExchange {
                    id_token: "id1".into(),
                    refresh_token: "rt1".into(),
                    expires_in,
                },
                Vec::new(),
                now,
            );
            assert!(
                matches!(result, Err(AuthError::InvalidExpiry(value)) if value == expires_in),
                "expires_in {expires_in} accepted"
            );
        }
    }

    #[test]
    fn short_lifetime_lands_in_the_past() {
        let now = Utc::now();
        assert_eq!(token_expiry(0, now).unwrap(), now - Duration::seconds(10));
    }

    #[test]
    fn expiry_comparisons_are_strict() {
        let now = Utc::now();
        let record = live_record(now);
        assert!(!record.has_live_id_token(now));
        assert!(!record.id_token_needs_refresh(now));

        let future = live_record(now + Duration::minutes(5));
        assert!(future.has_live_id_token(now));
        assert!(!future.id_token_needs_refresh(now));

        let past = live_record(now - Duration::seconds(1));
        assert!(!past.has_live_id_token(now));
        assert!(past.id_token_needs_refresh(now));
    }

    #[test]
    fn token_without_expiry_is_never_reused() {
        let record = CredentialRecord {
            refresh_token: Some("rt".into()),
            id_token: Some("id".into()),
            ..Default::default()
        };
        let now = Utc::now();
        assert!(!record.has_live_id_token(now));
        assert!(record.id_token_needs_refresh(now));
    }

    #[test]
    fn sign_in_state_requires_exact_match() {
        let record = CredentialRecord {
            sign_in_state: Some("abc123".into()),
            ..Default::default()
        };
        assert!(record.is_pending_connection());
        assert!(record.matches_sign_in_state("abc123"));
        assert!(!record.matches_sign_in_state("abc"));
        assert!(!record.matches_sign_in_state("abc1234"));
        assert!(!record.matches_sign_in_state(""));
        assert!(!CredentialRecord::default().matches_sign_in_state(""));
    }

    #[test]
    fn debug_redacts_secrets() {
        let record = CredentialRecord {
            sign_in_state: Some("state-secret".into()),
            refresh_token: Some("refresh-secret".into()),
            id_token: Some("id-secret".into()),
            ..Default::default()
        };
        let rendered = format!("{record:?}");
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let record = CredentialRecord {
            sign_in_state: Some("s".into()),
            ..Default::default()
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json, serde_json::json!({ "signInState": "s", "connections": [] }));
    }
}
