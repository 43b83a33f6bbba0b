//! Wire model for the event relay: signed events, subscription filters,
//! the JSON-array message protocol and HTTP authorization.

pub mod auth;
mod event;
mod filter;
mod message;

pub use auth::{authorize, AuthError};
pub use event::{index_key, EventError, RelayEvent, TAG_SEPARATOR};
pub use filter::{Filter, FilterError};
pub use message::{ClientMessage, ProtocolError, RelayMessage};
