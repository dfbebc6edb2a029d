pub mod actor;
pub mod writer;

use kameo::error::SendError;

use crate::core::ChatError;

pub use actor::*;
pub use writer::*;

/// Flatten a kameo `ask` failure into the crate error, keeping handler errors as-is.
pub(crate) fn actor_error<M>(actor: &'static str) -> impl Fn(SendError<M, ChatError>) -> ChatError {
    move |err| match err {
        SendError::HandlerError(err) => err,
        SendError::ActorNotRunning(_) | SendError::ActorStopped => {
            ChatError::ActorError(format!("{actor} is not running"))
        }
        _ => ChatError::ActorError(format!("{actor} is unavailable")),
    }
}
