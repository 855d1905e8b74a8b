//! Message-level connection driver: framing state machine, streaming
//! reader/writer handles, roles, and close-handshake state.

#[allow(clippy::module_inception)]
pub(crate) mod connection;
mod reader;
mod role;
mod state;
mod writer;

pub use connection::{Connection, ControlHandler};
pub use reader::MessageReader;
pub use role::Role;
pub use state::ConnectionState;
pub use writer::MessageWriter;
