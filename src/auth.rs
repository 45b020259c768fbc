//! Request Authentication
//!
//! API routes identify their caller through an [`IdentityProvider`] that maps
//! a bearer token to a [`Principal`]. The bundled [`StaticTokenIdentity`]
//! serves a fixed token table from configuration; tokens are held only as
//! SHA-256 digests and never logged.
//!
//! Handlers take [`CurrentPrincipal`] to require a caller, or
//! [`MaybePrincipal`] when anonymous access is meaningful.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::app::AppState;
use crate::error::{ApiError, ConfigError, StoreResult};

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// An authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

impl Principal {
    /// A plain user principal
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            role: Role::User,
            org_id: None,
            full_name: None,
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn with_org(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }
}

/// Resolves bearer tokens to principals
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// `Ok(None)` when the token is not recognised
    async fn resolve(&self, token: &str) -> StoreResult<Option<Principal>>;
}

/// A configured token and the principal it authenticates
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    token: String,
    pub principal: Principal,
}

impl TokenGrant {
    pub fn new(token: impl Into<String>, principal: Principal) -> Self {
        Self {
            token: token.into(),
            principal,
        }
    }
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("token", &"<redacted>")
            .field("principal", &self.principal)
            .finish()
    }
}

/// Parse `token:user_id:email[:role[:org_id]]` entries separated by commas.
///
/// An empty role segment keeps the default `user` role, so
/// `tok:u1:a@example.com::org_1` grants a plain user inside `org_1`.
pub fn parse_token_grants(raw: &str) -> Result<Vec<TokenGrant>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let invalid = |message: String| ConfigError::InvalidValue {
                var: "SAASKIT_API_TOKENS",
                message,
            };
            let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
            let (token, user_id, email, role, org_id) = match parts.as_slice() {
                [token, user_id, email] => (*token, *user_id, *email, "", ""),
                [token, user_id, email, role] => (*token, *user_id, *email, *role, ""),
                [token, user_id, email, role, org_id] => {
                    (*token, *user_id, *email, *role, *org_id)
                }
                _ => {
                    return Err(invalid(
                        "expected token:user_id:email[:role[:org_id]]".to_string(),
                    ))
                }
            };
            let role = if role.is_empty() {
                Role::User
            } else {
                role.parse::<Role>().map_err(invalid)?
            };
            if token.is_empty() || user_id.is_empty() {
                return Err(invalid("token and user id cannot be empty".to_string()));
            }
            let mut principal = Principal::new(user_id, email).with_role(role);
            if !org_id.is_empty() {
                principal = principal.with_org(org_id);
            }
            Ok(TokenGrant::new(token, principal))
        })
        .collect()
}

type TokenDigest = [u8; 32];

fn digest_token(token: &str) -> TokenDigest {
    Sha256::digest(token.as_bytes()).into()
}

/// Fixed token table
#[derive(Default)]
pub struct StaticTokenIdentity {
    principals: HashMap<TokenDigest, Principal>,
}

impl fmt::Debug for StaticTokenIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticTokenIdentity")
            .field("tokens", &self.principals.len())
            .finish()
    }
}

impl StaticTokenIdentity {
    pub fn new(grants: impl IntoIterator<Item = TokenGrant>) -> Self {
        let principals = grants
            .into_iter()
            .map(|grant| (digest_token(&grant.token), grant.principal))
            .collect();
        Self { principals }
    }

    /// Add or replace one token
    pub fn with_token(mut self, token: &str, principal: Principal) -> Self {
        self.principals.insert(digest_token(token), principal);
        self
    }

    pub fn len(&self) -> usize {
        self.principals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.principals.is_empty()
    }
}

#[async_trait]
impl IdentityProvider for StaticTokenIdentity {
    async fn resolve(&self, token: &str) -> StoreResult<Option<Principal>> {
        Ok(self.principals.get(&digest_token(token)).cloned())
    }
}

/// Why a request failed to authenticate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    MissingHeader,
    InvalidFormat,
    InvalidToken,
}

impl AuthFailure {
    pub fn message(&self) -> &'static str {
        match self {
            AuthFailure::MissingHeader => "Missing Authorization header",
            AuthFailure::InvalidFormat => "Invalid Authorization format. Expected: Bearer <token>",
            AuthFailure::InvalidToken => "Invalid token",
        }
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthFailure> {
    let header = header.ok_or(AuthFailure::MissingHeader)?;
    let token = header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or(AuthFailure::InvalidFormat)?;
    if token.is_empty() {
        return Err(AuthFailure::InvalidFormat);
    }
    Ok(token)
}

/// Authenticate a request from its `Authorization` header
pub async fn authenticate(
    identity: &dyn IdentityProvider,
    auth_header: Option<&str>,
) -> StoreResult<Result<Principal, AuthFailure>> {
    let token = match bearer_token(auth_header) {
        Ok(token) => token,
        Err(failure) => return Ok(Err(failure)),
    };

    match identity.resolve(token).await? {
        Some(principal) => Ok(Ok(principal)),
        None => {
            warn!("Invalid authentication token attempt");
            Ok(Err(AuthFailure::InvalidToken))
        }
    }
}

async fn principal_from_parts(
    parts: &Parts,
    state: &AppState,
) -> Result<Result<Principal, AuthFailure>, ApiError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    Ok(authenticate(state.identity.as_ref(), header).await?)
}

/// The authenticated caller; rejects with `401` otherwise
#[derive(Debug, Clone)]
pub struct CurrentPrincipal(pub Principal);

#[async_trait]
impl FromRequestParts<AppState> for CurrentPrincipal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match principal_from_parts(parts, state).await? {
            Ok(principal) => Ok(Self(principal)),
            Err(failure) => {
                debug!(reason = failure.message(), "Unauthenticated request");
                Err(ApiError::Unauthorized)
            }
        }
    }
}

/// The caller, if the request authenticated
#[derive(Debug, Clone)]
pub struct MaybePrincipal(pub Option<Principal>);

#[async_trait]
impl FromRequestParts<AppState> for MaybePrincipal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(Self(principal_from_parts(parts, state).await?.ok()))
    }
}
