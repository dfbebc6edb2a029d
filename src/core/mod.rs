pub mod config;
pub mod frame;
pub mod message;
pub mod pending;
pub mod stomp;
pub mod subscriptions;
pub mod types;

pub use config::*;
pub use frame::*;
pub use message::*;
pub use pending::*;
pub use stomp::{StompCommand, StompFrame};
pub use subscriptions::*;
pub use types::*;
