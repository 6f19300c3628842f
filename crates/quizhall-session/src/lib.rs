//! Session bookkeeping for the Quizhall gateway.
//!
//! 1. **Identity**: turning the handshake token into an [`Identity`]
//!    ([`Authenticator`] trait, [`GuestAuthenticator`],
//!    [`TokenAuthenticator`]).
//! 2. **Session tracking**: which connections are live and which room each
//!    one is in ([`SessionManager`]).
//!
//! ```text
//! Room layer (above)      ← receives the identity with every join
//!     ↕
//! Session layer (here)    ← connection → {identity, room code}
//!     ↕
//! Protocol layer (below)  ← ConnectionId, RoomCode
//! ```

#![allow(async_fn_in_trait)]

mod auth;
mod error;
mod manager;
mod session;

pub use auth::{Authenticator, GuestAuthenticator, TokenAuthenticator};
pub use error::SessionError;
pub use manager::SessionManager;
pub use session::{Identity, Session};
