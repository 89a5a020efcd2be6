//! Trigger authentication.
//!
//! The ETL trigger endpoints are guarded by a pluggable strategy so the
//! shared-secret scheme can be swapped for something stronger without
//! touching pipeline logic.

use axum::http::HeaderMap;

use crate::error::{Error, Result};

/// Header carrying the shared secret on trigger requests.
pub const SECRET_HEADER: &str = "x-cron-secret";

pub trait TriggerAuth: Send + Sync {
    /// Authorize a trigger request or fail with `Unauthorized`.
    fn authorize(&self, headers: &HeaderMap) -> Result<()>;
}

/// Shared-secret header check. With no secret configured the triggers are
/// open, which is the development-mode behavior.
pub struct SharedSecretAuth {
    secret: Option<String>,
}

impl SharedSecretAuth {
    pub fn new(secret: Option<String>) -> Self {
        Self { secret }
    }
}

impl TriggerAuth for SharedSecretAuth {
    fn authorize(&self, headers: &HeaderMap) -> Result<()> {
        let Some(expected) = self.secret.as_deref() else {
            return Ok(());
        };
        let presented = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if presented == Some(expected) {
            Ok(())
        } else {
            Err(Error::Unauthorized)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(SECRET_HEADER, value.parse().unwrap());
        headers
    }

    #[test]
    fn test_matching_secret_is_accepted() {
        let auth = SharedSecretAuth::new(Some("s3cret".to_string()));
        assert!(auth.authorize(&headers_with("s3cret")).is_ok());
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let auth = SharedSecretAuth::new(Some("s3cret".to_string()));
        assert!(matches!(
            auth.authorize(&headers_with("guess")),
            Err(Error::Unauthorized)
        ));
    }

    #[test]
    fn test_missing_header_is_rejected() {
        let auth = SharedSecretAuth::new(Some("s3cret".to_string()));
        assert!(matches!(
            auth.authorize(&HeaderMap::new()),
            Err(Error::Unauthorized)
        ));
    }

    #[test]
    fn test_no_configured_secret_leaves_triggers_open() {
        let auth = SharedSecretAuth::new(None);
        assert!(auth.authorize(&HeaderMap::new()).is_ok());
    }
}
