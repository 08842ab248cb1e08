//! Packet I/O and Ethernet/IP/UDP framing.

mod buffer;
mod packet;
mod port;

pub use buffer::{BufferPool, Frame, MAX_FRAME_SIZE};
pub use packet::{PacketInfo, encode_udp_frame, parse_udp_frame};
pub use port::{PacketIo, PnetPort, PortSettings, PortStats, find_interface};

#[cfg(test)]
pub(crate) use packet::tests as packet_tests;
#[cfg(test)]
pub(crate) use port::tests as port_tests;
