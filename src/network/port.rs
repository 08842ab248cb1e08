//! Burst-oriented packet I/O.
//!
//! [`PacketIo`] is the seam between the dispatcher and the NIC. The
//! production [`PnetPort`] sits on a `pnet` datalink channel; tests drive the
//! dispatcher through a scripted mock.

use std::fmt;
use std::io;
use std::time::Duration;

use pnet::datalink::{self, Channel, DataLinkReceiver, DataLinkSender, NetworkInterface};
use tracing::{debug, info, instrument};

use super::buffer::{BufferPool, Frame, MAX_FRAME_SIZE};
use crate::error::{DeviceError, Result};

/// Per-direction port counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortStats {
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_errors: u64,
    pub tx_errors: u64,
    pub rx_dropped: u64,
    pub tx_dropped: u64,
}

impl fmt::Display for PortStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Port statistics:")?;
        writeln!(f, "  RX packets: {}", self.rx_packets)?;
        writeln!(f, "  TX packets: {}", self.tx_packets)?;
        writeln!(f, "  RX bytes:   {}", self.rx_bytes)?;
        writeln!(f, "  TX bytes:   {}", self.tx_bytes)?;
        writeln!(f, "  RX errors:  {}", self.rx_errors)?;
        writeln!(f, "  TX errors:  {}", self.tx_errors)?;
        writeln!(f, "  RX dropped: {}", self.rx_dropped)?;
        write!(f, "  TX dropped: {}", self.tx_dropped)
    }
}

/// Trait for burst packet I/O implementations.
pub trait PacketIo: Send {
    /// Pull up to `max_frames` received frames. May return an empty burst;
    /// never blocks indefinitely.
    fn receive_burst(&mut self, queue_id: u16, max_frames: usize) -> Vec<Frame>;

    /// Submit frames for transmission, in order. Returns how many were
    /// accepted; the rest are dropped, not queued.
    fn transmit_burst(&mut self, queue_id: u16, frames: &[Vec<u8>]) -> usize;

    fn stats(&self) -> PortStats;

    fn reset_stats(&mut self);
}

/// Find a suitable network interface.
///
/// With a name, returns that interface. Otherwise returns the first one that
/// is up, not loopback, and has at least one IP address.
pub fn find_interface(name: Option<&str>) -> Result<NetworkInterface> {
    let interfaces = datalink::interfaces();

    if let Some(name) = name {
        interfaces
            .into_iter()
            .find(|iface| iface.name == name)
            .ok_or_else(|| {
                DeviceError::InterfaceNotFound {
                    name: name.to_owned(),
                }
                .into()
            })
    } else {
        interfaces
            .into_iter()
            .find(|iface| iface.is_up() && !iface.is_loopback() && !iface.ips.is_empty())
            .ok_or_else(|| DeviceError::NoInterface.into())
    }
}

/// Port bring-up settings.
#[derive(Debug, Clone)]
pub struct PortSettings {
    pub buffer_pool_size: usize,
    pub poll_timeout: Duration,
    pub promiscuous: bool,
}

/// Production port on a `pnet` datalink channel. Exposes a single queue, 0.
pub struct PnetPort {
    name: String,
    rx: Box<dyn DataLinkReceiver>,
    tx: Box<dyn DataLinkSender>,
    pool: BufferPool,
    stats: PortStats,
}

impl PnetPort {
    pub const QUEUE_COUNT: u16 = 1;

    /// Bring the port up on `interface`.
    ///
    /// Fails if the link is down or the channel cannot be opened. The read
    /// timeout bounds how long an empty receive burst can take.
    #[instrument(skip_all, fields(interface = %interface.name))]
    pub fn open(interface: &NetworkInterface, settings: &PortSettings) -> Result<Self> {
        if !interface.is_up() {
            return Err(DeviceError::LinkDown {
                name: interface.name.clone(),
            }
            .into());
        }

        let config = datalink::Config {
            read_timeout: Some(settings.poll_timeout),
            promiscuous: settings.promiscuous,
            ..Default::default()
        };

        let (tx, rx) = match datalink::channel(interface, config) {
            Ok(Channel::Ethernet(tx, rx)) => (tx, rx),
            Ok(_) => return Err(DeviceError::UnsupportedChannel.into()),
            Err(err) => return Err(DeviceError::ChannelOpen(err).into()),
        };

        info!(
            mac = ?interface.mac,
            buffers = settings.buffer_pool_size,
            promiscuous = settings.promiscuous,
            "port up"
        );

        Ok(Self {
            name: interface.name.clone(),
            rx,
            tx,
            pool: BufferPool::new(settings.buffer_pool_size),
            stats: PortStats::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn pool(&self) -> &BufferPool {
        &self.pool
    }
}

impl PacketIo for PnetPort {
    fn receive_burst(&mut self, queue_id: u16, max_frames: usize) -> Vec<Frame> {
        let mut burst = Vec::with_capacity(max_frames);
        if queue_id >= Self::QUEUE_COUNT {
            return burst;
        }

        while burst.len() < max_frames {
            match self.rx.next() {
                Ok(bytes) => {
                    if bytes.len() > MAX_FRAME_SIZE {
                        self.stats.rx_errors += 1;
                        continue;
                    }
                    let Some(frame) = self.pool.frame_from(bytes) else {
                        self.stats.rx_dropped += 1;
                        continue;
                    };
                    self.stats.rx_packets += 1;
                    self.stats.rx_bytes += bytes.len() as u64;
                    burst.push(frame);
                }
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
                    ) =>
                {
                    break;
                }
                Err(err) => {
                    self.stats.rx_errors += 1;
                    debug!(port = %self.name, "receive failed: {err}");
                    break;
                }
            }
        }

        burst
    }

    fn transmit_burst(&mut self, queue_id: u16, frames: &[Vec<u8>]) -> usize {
        let mut sent = 0;
        if queue_id < Self::QUEUE_COUNT {
            for frame in frames {
                match self.tx.send_to(frame, None) {
                    Some(Ok(())) => {
                        sent += 1;
                        self.stats.tx_packets += 1;
                        self.stats.tx_bytes += frame.len() as u64;
                    }
                    Some(Err(err)) => {
                        self.stats.tx_errors += 1;
                        debug!(port = %self.name, "send failed: {err}");
                        break;
                    }
                    None => {
                        self.stats.tx_errors += 1;
                        break;
                    }
                }
            }
        }

        self.stats.tx_dropped += (frames.len() - sent) as u64;
        sent
    }

    fn stats(&self) -> PortStats {
        self.stats
    }

    fn reset_stats(&mut self) {
        self.stats = PortStats::default();
    }
}
