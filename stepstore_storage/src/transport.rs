//! Transports.

mod memory_transport;
mod open_state;

pub use memory_transport::MemoryTransport;
pub use open_state::TransportOpenState;
