//! Ethernet/IP/UDP framing.
//!
//! Decodes received frames down to their UDP payload and encodes payloads
//! back into complete Ethernet frames with valid checksums, for both IPv4 and
//! IPv6.

// Encoded frames are bounded by MAX_FRAME_SIZE, so usize -> u16 never truncates.
#![allow(clippy::cast_possible_truncation)]

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use pnet::packet::ethernet::{EtherType, EtherTypes, EthernetPacket, MutableEthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::{self, Ipv4Flags, Ipv4Packet, MutableIpv4Packet};
use pnet::packet::ipv6::{Ipv6Packet, MutableIpv6Packet};
use pnet::packet::udp::{self, MutableUdpPacket, UdpPacket};
use pnet::util::MacAddr;

use super::buffer::MAX_FRAME_SIZE;
use crate::error::{EncodeError, ParseError};

pub const ETHERNET_HEADER_SIZE: usize = 14;
pub const IPV4_HEADER_SIZE: usize = 20;
pub const IPV6_HEADER_SIZE: usize = 40;
pub const UDP_HEADER_SIZE: usize = 8;

const DEFAULT_HOP_LIMIT: u8 = 64;

/// Addressing of a UDP datagram, as seen on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacketInfo {
    pub source_mac: MacAddr,
    pub dest_mac: MacAddr,
    pub source_ip: IpAddr,
    pub dest_ip: IpAddr,
    pub source_port: u16,
    pub dest_port: u16,
}

impl PacketInfo {
    /// The addressing of a reply: every source/destination pair swapped.
    pub fn reversed(&self) -> Self {
        Self {
            source_mac: self.dest_mac,
            dest_mac: self.source_mac,
            source_ip: self.dest_ip,
            dest_ip: self.source_ip,
            source_port: self.dest_port,
            dest_port: self.source_port,
        }
    }
}

const fn malformed(layer: &'static str) -> ParseError {
    ParseError::Malformed { layer }
}

/// Split an Ethernet frame into its UDP addressing and payload.
///
/// Frames that are not UDP over IPv4/IPv6, or that are IPv4 fragments, yield
/// [`ParseError::NotDns`]. Truncated or inconsistent headers yield
/// [`ParseError::Malformed`]. Trailing Ethernet padding is ignored.
pub fn parse_udp_frame(frame: &[u8]) -> Result<(PacketInfo, &[u8]), ParseError> {
    let ethernet = EthernetPacket::new(frame).ok_or(malformed("ethernet"))?;
    let network = &frame[ETHERNET_HEADER_SIZE..];

    let (source_ip, dest_ip, udp_start, udp_end) = match ethernet.get_ethertype() {
        EtherTypes::Ipv4 => {
            let ip = Ipv4Packet::new(network).ok_or(malformed("ipv4"))?;
            if ip.get_next_level_protocol() != IpNextHeaderProtocols::Udp {
                return Err(ParseError::NotDns);
            }
            if ip.get_flags() & Ipv4Flags::MoreFragments != 0 || ip.get_fragment_offset() != 0 {
                return Err(ParseError::NotDns);
            }
            let header_len = usize::from(ip.get_header_length()) * 4;
            let total_len = usize::from(ip.get_total_length());
            if header_len < IPV4_HEADER_SIZE || total_len < header_len || total_len > network.len()
            {
                return Err(malformed("ipv4"));
            }
            (
                IpAddr::V4(ip.get_source()),
                IpAddr::V4(ip.get_destination()),
                ETHERNET_HEADER_SIZE + header_len,
                ETHERNET_HEADER_SIZE + total_len,
            )
        }
        EtherTypes::Ipv6 => {
            let ip = Ipv6Packet::new(network).ok_or(malformed("ipv6"))?;
            if ip.get_next_header() != IpNextHeaderProtocols::Udp {
                return Err(ParseError::NotDns);
            }
            let total_len = IPV6_HEADER_SIZE + usize::from(ip.get_payload_length());
            if total_len > network.len() {
                return Err(malformed("ipv6"));
            }
            (
                IpAddr::V6(ip.get_source()),
                IpAddr::V6(ip.get_destination()),
                ETHERNET_HEADER_SIZE + IPV6_HEADER_SIZE,
                ETHERNET_HEADER_SIZE + total_len,
            )
        }
        _ => return Err(ParseError::NotDns),
    };

    let udp = UdpPacket::new(&frame[udp_start..udp_end]).ok_or(malformed("udp"))?;
    let udp_len = usize::from(udp.get_length());
    if udp_len < UDP_HEADER_SIZE || udp_start + udp_len > udp_end {
        return Err(malformed("udp"));
    }

    let info = PacketInfo {
        source_mac: ethernet.get_source(),
        dest_mac: ethernet.get_destination(),
        source_ip,
        dest_ip,
        source_port: udp.get_source(),
        dest_port: udp.get_destination(),
    };

    Ok((info, &frame[udp_start + UDP_HEADER_SIZE..udp_start + udp_len]))
}

/// Build a complete Ethernet frame carrying `payload` as described by `info`.
///
/// To answer a received datagram, pass [`PacketInfo::reversed`].
pub fn encode_udp_frame(info: &PacketInfo, payload: &[u8]) -> Result<Vec<u8>, EncodeError> {
    match (info.source_ip, info.dest_ip) {
        (IpAddr::V4(src), IpAddr::V4(dst)) => encode_ipv4(info, src, dst, payload),
        (IpAddr::V6(src), IpAddr::V6(dst)) => encode_ipv6(info, src, dst, payload),
        _ => Err(EncodeError::MixedAddressFamilies),
    }
}

fn allocate(ip_header_len: usize, payload_len: usize) -> Result<Vec<u8>, EncodeError> {
    let len = ETHERNET_HEADER_SIZE + ip_header_len + UDP_HEADER_SIZE + payload_len;
    if len > MAX_FRAME_SIZE {
        return Err(EncodeError::FrameTooLarge {
            len,
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(vec![0u8; len])
}

fn encode_ipv4(
    info: &PacketInfo,
    src: Ipv4Addr,
    dst: Ipv4Addr,
    payload: &[u8],
) -> Result<Vec<u8>, EncodeError> {
    let mut frame = allocate(IPV4_HEADER_SIZE, payload.len())?;
    let ip_len = frame.len() - ETHERNET_HEADER_SIZE;

    write_udp(
        &mut frame[ETHERNET_HEADER_SIZE + IPV4_HEADER_SIZE..],
        info,
        payload,
        |segment| udp::ipv4_checksum(segment, &src, &dst),
    )?;

    {
        let mut ip = MutableIpv4Packet::new(&mut frame[ETHERNET_HEADER_SIZE..])
            .ok_or(EncodeError::Frame("IPv4"))?;
        ip.set_version(4);
        ip.set_header_length(5);
        ip.set_total_length(ip_len as u16);
        ip.set_flags(Ipv4Flags::DontFragment);
        ip.set_ttl(DEFAULT_HOP_LIMIT);
        ip.set_next_level_protocol(IpNextHeaderProtocols::Udp);
        ip.set_source(src);
        ip.set_destination(dst);
        let checksum = ipv4::checksum(&ip.to_immutable());
        ip.set_checksum(checksum);
    }

    write_ethernet(&mut frame, info, EtherTypes::Ipv4)?;
    Ok(frame)
}

fn encode_ipv6(
    info: &PacketInfo,
    src: Ipv6Addr,
    dst: Ipv6Addr,
    payload: &[u8],
) -> Result<Vec<u8>, EncodeError> {
    let mut frame = allocate(IPV6_HEADER_SIZE, payload.len())?;
    let udp_len = UDP_HEADER_SIZE + payload.len();

    write_udp(
        &mut frame[ETHERNET_HEADER_SIZE + IPV6_HEADER_SIZE..],
        info,
        payload,
        |segment| udp::ipv6_checksum(segment, &src, &dst),
    )?;

    {
        let mut ip = MutableIpv6Packet::new(&mut frame[ETHERNET_HEADER_SIZE..])
            .ok_or(EncodeError::Frame("IPv6"))?;
        ip.set_version(6);
        ip.set_payload_length(udp_len as u16);
        ip.set_next_header(IpNextHeaderProtocols::Udp);
        ip.set_hop_limit(DEFAULT_HOP_LIMIT);
        ip.set_source(src);
        ip.set_destination(dst);
    }

    write_ethernet(&mut frame, info, EtherTypes::Ipv6)?;
    Ok(frame)
}

fn write_udp(
    segment: &mut [u8],
    info: &PacketInfo,
    payload: &[u8],
    checksum: impl FnOnce(&UdpPacket<'_>) -> u16,
) -> Result<(), EncodeError> {
    let mut udp = MutableUdpPacket::new(segment).ok_or(EncodeError::Frame("UDP"))?;
    udp.set_source(info.source_port);
    udp.set_destination(info.dest_port);
    udp.set_length((UDP_HEADER_SIZE + payload.len()) as u16);
    udp.set_payload(payload);
    let sum = checksum(&udp.to_immutable());
    udp.set_checksum(sum);
    Ok(())
}

fn write_ethernet(
    frame: &mut [u8],
    info: &PacketInfo,
    ethertype: EtherType,
) -> Result<(), EncodeError> {
    let mut ethernet = MutableEthernetPacket::new(frame).ok_or(EncodeError::Frame("Ethernet"))?;
    ethernet.set_source(info.source_mac);
    ethernet.set_destination(info.dest_mac);
    ethernet.set_ethertype(ethertype);
    Ok(())
}
