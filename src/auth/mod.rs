//! Who the cache acts for.
//!
//! Mutations that need a signed-in user check the [`Session`] before doing
//! anything; an anonymous session turns them into no-ops.

pub mod credentials;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("credential error: {0}")]
    Credential(#[from] credentials::CredentialError),
    #[error("no access token; set FEDI_ACCESS_TOKEN to use this command")]
    MissingToken,
    #[error("not signed in")]
    NotSignedIn,
}

/// The signed-in account, if there is one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    me: Option<String>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self { me: None }
    }

    pub fn authenticated(account_id: impl Into<String>) -> Self {
        Self {
            me: Some(account_id.into()),
        }
    }

    /// Id of the signed-in account.
    pub fn me(&self) -> Option<&str> {
        self.me.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.me.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_reports_account() {
        assert!(!Session::anonymous().is_authenticated());
        let session = Session::authenticated("42");
        assert!(session.is_authenticated());
        assert_eq!(session.me(), Some("42"));
    }
}
