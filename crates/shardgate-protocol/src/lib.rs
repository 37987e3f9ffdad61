pub mod backend;
pub mod binary_row;
pub mod execute;
pub mod frontend;
pub mod messages;
pub mod payload;

pub use binary_row::encode_binary_row;
pub use messages::{CommandPacket, Packet, ServerPacket};
pub use payload::{PacketPayload, PayloadReader};

#[cfg(test)]
mod tests;
