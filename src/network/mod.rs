//! Network subsystem for UDP audio sync input

pub mod receiver;
pub mod udp;

pub use receiver::{AudioReceiver, ReceiverStats};
pub use udp::create_socket;
