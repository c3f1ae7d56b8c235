// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Session resolution.
//!
//! Turns the credential carried by a request into a [`Principal`], or into
//! a typed reason why there is none. Verification itself belongs to the
//! identity provider; this module decides when to call it, bounds how long
//! it may take, and applies the post-verification policy:
//!
//! - inactive accounts are unauthenticated
//! - roles that may not hold interactive sessions are unauthenticated, and
//!   their sessions are revoked as soon as they are seen

use crate::error::IdentityError;
use crate::permissions::Role;
use crate::request::RequestContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Resolved identity attached to an allowed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub id: String,
    pub role: Role,
    pub active: bool,
}

/// Where a credential was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    Bearer,
    Cookie,
}

/// Raw session credential.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub kind: CredentialKind,
    pub token: String,
}

impl Credential {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            kind: CredentialKind::Bearer,
            token: token.into(),
        }
    }

    pub fn cookie(token: impl Into<String>) -> Self {
        Self {
            kind: CredentialKind::Cookie,
            token: token.into(),
        }
    }
}

// Tokens never reach the logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("kind", &self.kind)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// What the identity provider knows about a valid session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedIdentity {
    pub id: String,
    pub role: Role,
    pub active: bool,
}

/// External identity provider.
///
/// Owns password hashing, token signing and session persistence.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// `Ok(None)` means the credential is invalid or expired.
    async fn verify_session(
        &self,
        credential: &Credential,
    ) -> Result<Option<VerifiedIdentity>, IdentityError>;

    /// Invalidate the session server-side.
    async fn revoke_session(&self, credential: &Credential) -> Result<(), IdentityError>;
}

#[derive(Serialize)]
struct TokenBody<'a> {
    token: &'a str,
    kind: CredentialKind,
}

/// Identity provider reached over HTTP.
///
/// - `POST {base}/sessions/verify` → `200` with a [`VerifiedIdentity`] body,
///   `401`/`404` for an invalid session
/// - `POST {base}/sessions/revoke` → any success, or `404` if already gone
pub struct HttpIdentityProvider {
    base_url: String,
    client: reqwest::Client,
}

impl HttpIdentityProvider {
    /// Create new identity provider client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn verify_session(
        &self,
        credential: &Credential,
    ) -> Result<Option<VerifiedIdentity>, IdentityError> {
        let url = format!("{}/sessions/verify", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&TokenBody {
                token: &credential.token,
                kind: credential.kind,
            })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(Some(response.json().await?))
        } else if status == reqwest::StatusCode::NOT_FOUND
            || status == reqwest::StatusCode::UNAUTHORIZED
        {
            Ok(None)
        } else {
            Err(IdentityError::Status(status.as_u16()))
        }
    }

    async fn revoke_session(&self, credential: &Credential) -> Result<(), IdentityError> {
        let url = format!("{}/sessions/revoke", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&TokenBody {
                token: &credential.token,
                kind: credential.kind,
            })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(IdentityError::Status(status.as_u16()))
        }
    }
}

/// Result of inspecting a request's session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Valid session for an active account with an interactive role
    Resolved(Principal),
    /// No cookie or bearer token present
    NoCredential,
    /// Provider rejected the credential
    Invalid,
    /// Valid session for an inactive account
    Inactive { id: String },
    /// Valid session for a role that may not hold sessions
    DisallowedRole {
        id: String,
        role: Role,
        credential: Credential,
    },
    /// Provider unreachable, slow or misbehaving
    UpstreamFailure(String),
}

impl SessionOutcome {
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            Self::Resolved(p) => Some(p),
            _ => None,
        }
    }

    pub fn into_principal(self) -> Option<Principal> {
        match self {
            Self::Resolved(p) => Some(p),
            _ => None,
        }
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Resolved(_) => "resolved",
            Self::NoCredential => "no_credential",
            Self::Invalid => "invalid",
            Self::Inactive { .. } => "inactive",
            Self::DisallowedRole { .. } => "disallowed_role",
            Self::UpstreamFailure(_) => "upstream_failure",
        }
    }
}

/// Extracts, verifies and normalizes request credentials.
pub struct SessionResolver {
    provider: Arc<dyn IdentityProvider>,
    cookie_name: String,
    timeout: Duration,
}

impl SessionResolver {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        cookie_name: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            cookie_name: cookie_name.into(),
            timeout,
        }
    }

    /// Bearer header first, then the session cookie.
    pub fn extract(&self, request: &RequestContext) -> Option<Credential> {
        if let Some(token) = request.bearer_token() {
            return Some(Credential::bearer(token));
        }
        request.cookie(&self.cookie_name).map(Credential::cookie)
    }

    /// Verify the request's session without side effects.
    pub async fn inspect(&self, request: &RequestContext) -> SessionOutcome {
        let Some(credential) = self.extract(request) else {
            debug!(path = request.path(), "No session credential");
            return SessionOutcome::NoCredential;
        };

        let verified =
            match tokio::time::timeout(self.timeout, self.provider.verify_session(&credential))
                .await
            {
                Ok(Ok(Some(identity))) => identity,
                Ok(Ok(None)) => {
                    info!(kind = ?credential.kind, "Invalid or expired session");
                    return SessionOutcome::Invalid;
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "Identity provider failure");
                    return SessionOutcome::UpstreamFailure(e.to_string());
                }
                Err(_) => {
                    let e = IdentityError::Timeout(self.timeout.as_millis() as u64);
                    warn!(error = %e, "Identity provider timed out");
                    return SessionOutcome::UpstreamFailure(e.to_string());
                }
            };

        if !verified.role.may_hold_session() {
            warn!(
                id = %verified.id,
                role = %verified.role,
                "Session found for role without interactive access"
            );
            return SessionOutcome::DisallowedRole {
                id: verified.id,
                role: verified.role,
                credential,
            };
        }

        if !verified.active {
            info!(id = %verified.id, "Session for inactive account");
            return SessionOutcome::Inactive { id: verified.id };
        }

        debug!(id = %verified.id, role = %verified.role, "Session resolved");
        SessionOutcome::Resolved(Principal {
            id: verified.id,
            role: verified.role,
            active: verified.active,
        })
    }

    /// Revoke a session. Failures are logged and reported as `false`.
    pub async fn revoke(&self, credential: &Credential) -> bool {
        match tokio::time::timeout(self.timeout, self.provider.revoke_session(credential)).await {
            Ok(Ok(())) => {
                info!(kind = ?credential.kind, "Session revoked");
                true
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Session revocation failed");
                false
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "Session revocation timed out");
                false
            }
        }
    }

    /// Resolve the request's principal, revoking disallowed sessions.
    pub async fn resolve(&self, request: &RequestContext) -> Option<Principal> {
        let outcome = self.inspect(request).await;
        if let SessionOutcome::DisallowedRole { credential, .. } = &outcome {
            self.revoke(credential).await;
        }
        outcome.into_principal()
    }
}
