// Shared domain vocabulary for the Causerie messaging core.

pub mod constants;
pub mod context;
pub mod error;
pub mod identity;
pub mod outcome;
pub mod types;

pub use context::SessionContext;
pub use error::{CoreError, CoreResult};
pub use identity::AuthIdentity;
pub use outcome::Outcome;
pub use types::{CallId, CallKind, CallStatus, ChatId, MessageId, UserId};
