/*!
Parsing and construction of the frames the controller applications and the
switch pipeline have to look into: Ethernet (with an optional 802.1Q tag),
ARP, IPv4 with its TCP/UDP ports, and LLDP discovery frames.
*/

use byteorder::{ByteOrder, NetworkEndian};

use std::error;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

pub const ETH_TYPE_IPV4: u16 = 0x0800;
pub const ETH_TYPE_ARP: u16 = 0x0806;
pub const ETH_TYPE_VLAN: u16 = 0x8100;
pub const ETH_TYPE_LLDP: u16 = 0x88cc;

pub const IP_PROTO_ICMP: u8 = 1;
pub const IP_PROTO_TCP: u8 = 6;
pub const IP_PROTO_UDP: u8 = 17;

const ETH_HEADER_LEN: usize = 14;
const VLAN_TAG_LEN: usize = 4;
const ARP_LEN: usize = 28;
const IPV4_MIN_HEADER_LEN: usize = 20;

/// A 48-bit hardware address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);
    pub const ZERO: MacAddr = MacAddr([0; 6]);
    /// Nearest-bridge group address LLDP frames are sent to.
    pub const LLDP_MULTICAST: MacAddr = MacAddr([0x01, 0x80, 0xc2, 0x00, 0x00, 0x0e]);

    /// Takes the lower 48 bits of `value`, e.g. of an OpenFlow datapath id.
    pub fn from_u64(value: u64) -> MacAddr {
        let mut bytes = [0; 8];
        NetworkEndian::write_u64(&mut bytes, value);
        let mut mac = [0; 6];
        mac.copy_from_slice(&bytes[2..]);
        MacAddr(mac)
    }

    pub fn to_u64(&self) -> u64 {
        let mut bytes = [0; 8];
        bytes[2..].copy_from_slice(&self.0);
        NetworkEndian::read_u64(&bytes)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == MacAddr::BROADCAST
    }

    fn read(bytes: &[u8]) -> MacAddr {
        let mut mac = [0; 6];
        mac.copy_from_slice(&bytes[..6]);
        MacAddr(mac)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// A hardware address string that is not six hex octets
#[derive(Debug, PartialEq)]
pub struct ParseMacError(pub String);

impl fmt::Display for ParseMacError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "'{}' is not a hardware address", self.0)
    }
}

impl error::Error for ParseMacError {
    fn description(&self) -> &str {
        "hardware address parser error"
    }
}

impl FromStr for MacAddr {
    type Err = ParseMacError;

    fn from_str(s: &str) -> Result<MacAddr, Self::Err> {
        let parts: Vec<_> = s.split(|c| c == ':' || c == '-').collect();
        if parts.len() != 6 {
            return Err(ParseMacError(s.to_owned()));
        }
        let mut mac = [0; 6];
        for (byte, part) in mac.iter_mut().zip(parts) {
            *byte = u8::from_str_radix(part, 16).map_err(|_| ParseMacError(s.to_owned()))?;
        }
        Ok(MacAddr(mac))
    }
}

/// An 802.1Q tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VlanTag {
    pub vid: u16,
    pub pcp: u8,
}

/// An Ethernet II frame, the payload kept as raw bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ethernet {
    pub dst: MacAddr,
    pub src: MacAddr,
    pub vlan: Option<VlanTag>,
    pub ether_type: u16,
    pub payload: Vec<u8>,
}

impl Ethernet {
    pub fn new(dst: MacAddr, src: MacAddr, ether_type: u16, payload: Vec<u8>) -> Ethernet {
        Ethernet {
            dst,
            src,
            vlan: None,
            ether_type,
            payload,
        }
    }

    /// Returns `None` for frames too short to carry an Ethernet header.
    pub fn parse(buf: &[u8]) -> Option<Ethernet> {
        if buf.len() < ETH_HEADER_LEN {
            return None;
        }
        let dst = MacAddr::read(&buf[0..6]);
        let src = MacAddr::read(&buf[6..12]);
        let typ = NetworkEndian::read_u16(&buf[12..14]);
        if typ == ETH_TYPE_VLAN {
            if buf.len() < ETH_HEADER_LEN + VLAN_TAG_LEN {
                return None;
            }
            let tci = NetworkEndian::read_u16(&buf[14..16]);
            Some(Ethernet {
                dst,
                src,
                vlan: Some(VlanTag {
                    vid: tci & 0x0fff,
                    pcp: (tci >> 13) as u8,
                }),
                ether_type: NetworkEndian::read_u16(&buf[16..18]),
                payload: buf[18..].to_vec(),
            })
        }
        else {
            Some(Ethernet {
                dst,
                src,
                vlan: None,
                ether_type: typ,
                payload: buf[14..].to_vec(),
            })
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(ETH_HEADER_LEN + VLAN_TAG_LEN + self.payload.len());
        bytes.extend_from_slice(&self.dst.0);
        bytes.extend_from_slice(&self.src.0);
        if let Some(tag) = self.vlan {
            let tci = (u16::from(tag.pcp & 0x07) << 13) | (tag.vid & 0x0fff);
            push_u16(&mut bytes, ETH_TYPE_VLAN);
            push_u16(&mut bytes, tci);
        }
        push_u16(&mut bytes, self.ether_type);
        bytes.extend_from_slice(&self.payload);
        bytes
    }
}

fn push_u16(bytes: &mut Vec<u8>, value: u16) {
    let mut buf = [0; 2];
    NetworkEndian::write_u16(&mut buf, value);
    bytes.extend_from_slice(&buf);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpOp {
    Request,
    Reply,
}

/// An Ethernet/IPv4 ARP packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arp {
    pub op: ArpOp,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

impl Arp {
    pub fn parse(buf: &[u8]) -> Option<Arp> {
        if buf.len() < ARP_LEN {
            return None;
        }
        let htype = NetworkEndian::read_u16(&buf[0..2]);
        let ptype = NetworkEndian::read_u16(&buf[2..4]);
        if htype != 1 || ptype != ETH_TYPE_IPV4 || buf[4] != 6 || buf[5] != 4 {
            return None;
        }
        let op = match NetworkEndian::read_u16(&buf[6..8]) {
            1 => ArpOp::Request,
            2 => ArpOp::Reply,
            _ => return None,
        };
        Some(Arp {
            op,
            sender_mac: MacAddr::read(&buf[8..14]),
            sender_ip: Ipv4Addr::from(NetworkEndian::read_u32(&buf[14..18])),
            target_mac: MacAddr::read(&buf[18..24]),
            target_ip: Ipv4Addr::from(NetworkEndian::read_u32(&buf[24..28])),
        })
    }

    /// Parses the ARP packet carried by an Ethernet frame.
    pub fn from_frame(frame: &Ethernet) -> Option<Arp> {
        if frame.ether_type == ETH_TYPE_ARP {
            Arp::parse(&frame.payload)
        }
        else {
            None
        }
    }

    pub fn request(sender_mac: MacAddr, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Arp {
        Arp {
            op: ArpOp::Request,
            sender_mac,
            sender_ip,
            target_mac: MacAddr::ZERO,
            target_ip,
        }
    }

    /// The reply `owner` would send to this request.
    pub fn reply_from(&self, owner: MacAddr) -> Arp {
        Arp {
            op: ArpOp::Reply,
            sender_mac: owner,
            sender_ip: self.target_ip,
            target_mac: self.sender_mac,
            target_ip: self.sender_ip,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(ARP_LEN);
        push_u16(&mut bytes, 1);
        push_u16(&mut bytes, ETH_TYPE_IPV4);
        bytes.extend_from_slice(&[6, 4]);
        push_u16(
            &mut bytes,
            match self.op {
                ArpOp::Request => 1,
                ArpOp::Reply => 2,
            },
        );
        bytes.extend_from_slice(&self.sender_mac.0);
        bytes.extend_from_slice(&self.sender_ip.octets());
        bytes.extend_from_slice(&self.target_mac.0);
        bytes.extend_from_slice(&self.target_ip.octets());
        bytes
    }

    /// Wraps the packet in an Ethernet frame. Requests are broadcast.
    pub fn to_frame(&self) -> Ethernet {
        let dst = match self.op {
            ArpOp::Request => MacAddr::BROADCAST,
            ArpOp::Reply => self.target_mac,
        };
        Ethernet::new(dst, self.sender_mac, ETH_TYPE_ARP, self.to_bytes())
    }
}

/// The IPv4 header fields an OpenFlow 1.0 match looks at,
/// plus the transport ports for TCP and UDP (ICMP type/code for ICMP)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Summary {
    pub tos: u8,
    pub proto: u8,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub tp_src: u16,
    pub tp_dst: u16,
}

impl Ipv4Summary {
    pub fn parse(buf: &[u8]) -> Option<Ipv4Summary> {
        if buf.len() < IPV4_MIN_HEADER_LEN || buf[0] >> 4 != 4 {
            return None;
        }
        let ihl = usize::from(buf[0] & 0x0f) * 4;
        if ihl < IPV4_MIN_HEADER_LEN || buf.len() < ihl {
            return None;
        }
        let proto = buf[9];
        let frag_offset = NetworkEndian::read_u16(&buf[6..8]) & 0x1fff;
        let l4 = &buf[ihl..];
        let (tp_src, tp_dst) = match proto {
            IP_PROTO_TCP | IP_PROTO_UDP if frag_offset == 0 && l4.len() >= 4 => (
                NetworkEndian::read_u16(&l4[0..2]),
                NetworkEndian::read_u16(&l4[2..4]),
            ),
            IP_PROTO_ICMP if frag_offset == 0 && l4.len() >= 2 => {
                (u16::from(l4[0]), u16::from(l4[1]))
            }
            _ => (0, 0),
        };
        Some(Ipv4Summary {
            tos: buf[1] & 0xfc,
            proto,
            src: Ipv4Addr::from(NetworkEndian::read_u32(&buf[12..16])),
            dst: Ipv4Addr::from(NetworkEndian::read_u32(&buf[16..20])),
            tp_src,
            tp_dst,
        })
    }
}

/// Header checksum over the first `ihl` bytes of `header`.
fn ipv4_checksum(header: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    for (i, chunk) in header.chunks(2).enumerate() {
        if i == 5 {
            continue;
        }
        let word = if chunk.len() == 2 {
            NetworkEndian::read_u16(chunk)
        }
        else {
            u16::from(chunk[0]) << 8
        };
        sum += u32::from(word);
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

/// In-place rewrites of an IPv4 packet, used by the set-nw/set-tp actions.
/// Packets that are not IPv4 are left untouched.
pub fn rewrite_ipv4(buf: &mut [u8], field: Ipv4Field) {
    if Ipv4Summary::parse(buf).is_none() {
        return;
    }
    let ihl = usize::from(buf[0] & 0x0f) * 4;
    let proto = buf[9];
    match field {
        Ipv4Field::Src(ip) => buf[12..16].copy_from_slice(&ip.octets()),
        Ipv4Field::Dst(ip) => buf[16..20].copy_from_slice(&ip.octets()),
        Ipv4Field::Tos(tos) => buf[1] = (tos & 0xfc) | (buf[1] & 0x03),
        Ipv4Field::TpSrc(port) | Ipv4Field::TpDst(port) => {
            if (proto != IP_PROTO_TCP && proto != IP_PROTO_UDP) || buf.len() < ihl + 4 {
                return;
            }
            let offset = match field {
                Ipv4Field::TpSrc(_) => ihl,
                _ => ihl + 2,
            };
            NetworkEndian::write_u16(&mut buf[offset..offset + 2], port);
        }
    }
    let checksum = ipv4_checksum(&buf[..ihl]);
    NetworkEndian::write_u16(&mut buf[10..12], checksum);
}

/// A single IPv4 or transport field to rewrite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ipv4Field {
    Src(Ipv4Addr),
    Dst(Ipv4Addr),
    Tos(u8),
    TpSrc(u16),
    TpDst(u16),
}

/// Builds a minimal IPv4 packet (no options) around `payload`.
pub fn ipv4_packet(src: Ipv4Addr, dst: Ipv4Addr, proto: u8, payload: &[u8]) -> Vec<u8> {
    let total_len = (IPV4_MIN_HEADER_LEN + payload.len()) as u16;
    let mut bytes = Vec::with_capacity(usize::from(total_len));
    bytes.extend_from_slice(&[0x45, 0]);
    push_u16(&mut bytes, total_len);
    bytes.extend_from_slice(&[0, 0, 0x40, 0, 64, proto, 0, 0]);
    bytes.extend_from_slice(&src.octets());
    bytes.extend_from_slice(&dst.octets());
    let checksum = ipv4_checksum(&bytes);
    NetworkEndian::write_u16(&mut bytes[10..12], checksum);
    bytes.extend_from_slice(payload);
    bytes
}

const LLDP_TLV_END: u8 = 0;
const LLDP_TLV_CHASSIS_ID: u8 = 1;
const LLDP_TLV_PORT_ID: u8 = 2;
const LLDP_TLV_TTL: u8 = 3;
const LLDP_CHASSIS_SUBTYPE_MAC: u8 = 4;
const LLDP_PORT_SUBTYPE_LOCAL: u8 = 7;

/// The mandatory TLVs of an LLDP data unit as the discovery application uses them:
/// the chassis is identified by its MAC address and the port by its OpenFlow number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lldp {
    pub chassis_id: MacAddr,
    pub port_id: u16,
    pub ttl: u16,
}

impl Lldp {
    fn push_tlv(bytes: &mut Vec<u8>, typ: u8, value: &[u8]) {
        let header = (u16::from(typ) << 9) | (value.len() as u16 & 0x01ff);
        push_u16(bytes, header);
        bytes.extend_from_slice(value);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![];
        let mut chassis = vec![LLDP_CHASSIS_SUBTYPE_MAC];
        chassis.extend_from_slice(&self.chassis_id.0);
        Lldp::push_tlv(&mut bytes, LLDP_TLV_CHASSIS_ID, &chassis);
        let mut port = vec![LLDP_PORT_SUBTYPE_LOCAL, 0, 0];
        NetworkEndian::write_u16(&mut port[1..], self.port_id);
        Lldp::push_tlv(&mut bytes, LLDP_TLV_PORT_ID, &port);
        let mut ttl = [0; 2];
        NetworkEndian::write_u16(&mut ttl, self.ttl);
        Lldp::push_tlv(&mut bytes, LLDP_TLV_TTL, &ttl);
        Lldp::push_tlv(&mut bytes, LLDP_TLV_END, &[]);
        bytes
    }

    pub fn to_frame(&self, src: MacAddr) -> Ethernet {
        Ethernet::new(MacAddr::LLDP_MULTICAST, src, ETH_TYPE_LLDP, self.to_bytes())
    }

    /// Walks the TLV list; unknown TLVs are skipped, missing mandatory ones give `None`.
    pub fn parse(buf: &[u8]) -> Option<Lldp> {
        let mut chassis_id = None;
        let mut port_id = None;
        let mut ttl = None;
        let mut rest = buf;
        while rest.len() >= 2 {
            let header = NetworkEndian::read_u16(&rest[0..2]);
            let typ = (header >> 9) as u8;
            let len = usize::from(header & 0x01ff);
            if rest.len() < 2 + len {
                return None;
            }
            let value = &rest[2..2 + len];
            match typ {
                LLDP_TLV_END => break,
                LLDP_TLV_CHASSIS_ID if len == 7 && value[0] == LLDP_CHASSIS_SUBTYPE_MAC => {
                    chassis_id = Some(MacAddr::read(&value[1..]));
                }
                LLDP_TLV_PORT_ID if len == 3 && value[0] == LLDP_PORT_SUBTYPE_LOCAL => {
                    port_id = Some(NetworkEndian::read_u16(&value[1..3]));
                }
                LLDP_TLV_TTL if len == 2 => ttl = Some(NetworkEndian::read_u16(value)),
                _ => {}
            }
            rest = &rest[2 + len..];
        }
        Some(Lldp {
            chassis_id: chassis_id?,
            port_id: port_id?,
            ttl: ttl?,
        })
    }

    pub fn from_frame(frame: &Ethernet) -> Option<Lldp> {
        if frame.ether_type == ETH_TYPE_LLDP {
            Lldp::parse(&frame.payload)
        }
        else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_from_datapath_id() {
        let mac = MacAddr::from_u64(0xabcd_0011_2233_4455);
        assert_eq!(MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]), mac);
        assert_eq!(0x0011_2233_4455, mac.to_u64());
        assert_eq!("00:11:22:33:44:55", mac.to_string());
    }

    #[test]
    fn mac_from_str() {
        let mac: MacAddr = "0a:0B:0c:0d:0e:0f".parse().unwrap();
        assert_eq!(MacAddr([10, 11, 12, 13, 14, 15]), mac);
        assert!("0a:0b:0c".parse::<MacAddr>().is_err());
        assert!("0a:0b:0c:0d:0e:0f:10".parse::<MacAddr>().is_err());
    }

    #[test]
    fn vlan_tagged_frame() {
        let mut frame = Ethernet::new(MacAddr([1; 6]), MacAddr([2; 6]), ETH_TYPE_IPV4, vec![9, 9]);
        frame.vlan = Some(VlanTag { vid: 42, pcp: 5 });
        let bytes = frame.to_bytes();
        assert_eq!(20, bytes.len());
        assert_eq!(&[0x81, 0x00, 0xa0, 0x2a, 0x08, 0x00], &bytes[12..18]);
        assert_eq!(Some(frame), Ethernet::parse(&bytes));
    }

    #[test]
    fn arp_request_and_reply() {
        let ip1 = Ipv4Addr::new(10, 0, 0, 1);
        let ip2 = Ipv4Addr::new(10, 0, 0, 2);
        let req = Arp::request(MacAddr([1; 6]), ip1, ip2);
        let frame = req.to_frame();
        assert!(frame.dst.is_broadcast());
        let parsed = Ethernet::parse(&frame.to_bytes()).unwrap();
        assert_eq!(Some(req.clone()), Arp::from_frame(&parsed));

        let reply = req.reply_from(MacAddr([2; 6]));
        assert_eq!(ArpOp::Reply, reply.op);
        assert_eq!(ip2, reply.sender_ip);
        assert_eq!(MacAddr([1; 6]), reply.to_frame().dst);
    }

    #[test]
    fn ipv4_summary_and_rewrite() {
        let mut udp = vec![];
        push_u16(&mut udp, 1234);
        push_u16(&mut udp, 53);
        udp.extend_from_slice(&[0, 8, 0, 0]);
        let src = Ipv4Addr::new(10, 0, 0, 1);
        let dst = Ipv4Addr::new(10, 0, 0, 2);
        let mut pkt = ipv4_packet(src, dst, IP_PROTO_UDP, &udp);
        let sum = Ipv4Summary::parse(&pkt).unwrap();
        assert_eq!((src, dst, 1234, 53), (sum.src, sum.dst, sum.tp_src, sum.tp_dst));
        assert_eq!(ipv4_checksum(&pkt[..20]), NetworkEndian::read_u16(&pkt[10..12]));

        rewrite_ipv4(&mut pkt, Ipv4Field::Dst(Ipv4Addr::new(192, 0, 2, 1)));
        rewrite_ipv4(&mut pkt, Ipv4Field::TpDst(5353));
        let sum = Ipv4Summary::parse(&pkt).unwrap();
        assert_eq!(Ipv4Addr::new(192, 0, 2, 1), sum.dst);
        assert_eq!(5353, sum.tp_dst);
        assert_eq!(ipv4_checksum(&pkt[..20]), NetworkEndian::read_u16(&pkt[10..12]));
    }

    #[test]
    fn lldp_frame() {
        let lldp = Lldp {
            chassis_id: MacAddr([0, 0, 0, 0, 0, 7]),
            port_id: 3,
            ttl: 120,
        };
        let frame = lldp.to_frame(MacAddr([0, 0, 0, 0, 0, 7]));
        let parsed = Ethernet::parse(&frame.to_bytes()).unwrap();
        assert_eq!(MacAddr::LLDP_MULTICAST, parsed.dst);
        assert_eq!(Some(lldp), Lldp::from_frame(&parsed));
        assert_eq!(None, Lldp::parse(&[0x02, 0x07]));
    }
}
