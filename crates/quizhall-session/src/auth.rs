//! Identity resolution hook.
//!
//! Quizhall does not issue or check credentials. Whatever sits in front of
//! it (an account service, a signed cookie) hands the client a token; the
//! gateway passes that token to an [`Authenticator`] during the handshake
//! and gets back an [`Identity`].

use std::collections::HashMap;

use crate::session::guest_name;
use crate::{Identity, SessionError};

/// Resolves a handshake token into an identity.
///
/// `token` is `None` when the client sent no token at all. Implementations
/// decide whether that means "guest" or "rejected".
///
/// ```rust
/// use quizhall_session::{Authenticator, Identity, SessionError};
///
/// /// Treats the token as the account id and display name.
/// struct EchoAuthenticator;
///
/// impl Authenticator for EchoAuthenticator {
///     async fn authenticate(
///         &self,
///         token: Option<&str>,
///     ) -> Result<Identity, SessionError> {
///         let token = token.ok_or_else(|| {
///             SessionError::AuthFailed("token required".into())
///         })?;
///         Ok(Identity::user(token, token))
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    fn authenticate(
        &self,
        token: Option<&str>,
    ) -> impl std::future::Future<Output = Result<Identity, SessionError>> + Send;
}

/// Lets everyone in as a guest, ignoring any token.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuestAuthenticator;

impl Authenticator for GuestAuthenticator {
    async fn authenticate(
        &self,
        _token: Option<&str>,
    ) -> Result<Identity, SessionError> {
        let display_name = guest_name(&mut rand::rng());
        Ok(Identity {
            display_name,
            user_id: None,
        })
    }
}

/// Maps pre-issued tokens to accounts.
///
/// A missing or empty token yields a guest; an unknown token is rejected.
#[derive(Debug, Clone, Default)]
pub struct TokenAuthenticator {
    accounts: HashMap<String, Identity>,
}

impl TokenAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `token` as belonging to `identity`.
    pub fn with_account(mut self, token: impl Into<String>, identity: Identity) -> Self {
        self.accounts.insert(token.into(), identity);
        self
    }
}

impl Authenticator for TokenAuthenticator {
    async fn authenticate(
        &self,
        token: Option<&str>,
    ) -> Result<Identity, SessionError> {
        match token.map(str::trim).filter(|t| !t.is_empty()) {
            None => {
                let display_name = guest_name(&mut rand::rng());
                Ok(Identity {
                    display_name,
                    user_id: None,
                })
            }
            Some(token) => self
                .accounts
                .get(token)
                .cloned()
                .ok_or_else(|| SessionError::AuthFailed("unknown token".into())),
        }
    }
}
