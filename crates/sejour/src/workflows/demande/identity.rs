use axum::http::HeaderMap;

use super::domain::Caller;
use crate::config::AuthConfig;

/// Resolves the authenticated caller of the current request.
pub trait IdentityProvider: Send + Sync {
    fn current_caller(&self, headers: &HeaderMap) -> Result<Caller, IdentityError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("request carries no authenticated caller ({0} header missing)")]
    MissingCaller(String),
}

/// Trusts the login and authorities headers set by the authentication gateway.
#[derive(Debug, Clone)]
pub struct HeaderIdentityProvider {
    login_header: String,
    authorities_header: String,
    back_office_authority: String,
}

impl HeaderIdentityProvider {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            login_header: config.login_header.clone(),
            authorities_header: config.authorities_header.clone(),
            back_office_authority: config.back_office_authority.clone(),
        }
    }
}

impl Default for HeaderIdentityProvider {
    fn default() -> Self {
        Self {
            login_header: "x-user-login".to_string(),
            authorities_header: "x-user-authorities".to_string(),
            back_office_authority: "ROLE_AGENT".to_string(),
        }
    }
}

impl IdentityProvider for HeaderIdentityProvider {
    fn current_caller(&self, headers: &HeaderMap) -> Result<Caller, IdentityError> {
        let login = headers
            .get(self.login_header.as_str())
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|login| !login.is_empty())
            .ok_or_else(|| IdentityError::MissingCaller(self.login_header.clone()))?;

        let authorities = headers
            .get(self.authorities_header.as_str())
            .and_then(|value| value.to_str().ok())
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|authority| !authority.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Caller::with_authorities(
            login,
            authorities,
            &self.back_office_authority,
        ))
    }
}
