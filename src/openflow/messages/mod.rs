/*!
The OpenFlow 1.0 message primitives

This is based on the openflow.h from OpenFlow Switch Specification 1.0.0.
The type names are changed to align with the Rust conventions.
Every body keeps the field order of its C struct; explicit padding is not
stored but always written as zeros.
*/

pub mod deserialize;
pub mod serialize;

use openflow::actions::ActionList;
use openflow::error::Error;
use packet::MacAddr;

use std::fmt;
use std::net::Ipv4Addr;

impl OfpErrorMsg {
    fn first_64_bytes(request: &[u8]) -> Vec<u8> {
        let end = if request.len() < 64 { request.len() } else { 64 };
        request[..end].to_vec()
    }

    /// Constructs the error message reporting `error`.
    /// `request` is the offending message (header included) of which
    /// at most the first 64 bytes are echoed back.
    pub fn new(error: &Error, request: &[u8]) -> OfpErrorMsg {
        let (typ, code) = error.type_and_code();
        let data = match *error {
            Error::HelloFailed => b"No compatible version".to_vec(),
            _ => Self::first_64_bytes(request),
        };
        OfpErrorMsg {
            typ: typ as u16,
            code,
            data,
        }
    }

    /// Constructs a Hello Failed error
    pub fn new_hello_failed() -> OfpErrorMsg {
        OfpErrorMsg::new(&Error::HelloFailed, &[])
    }

    /// Checks if this `OfpErrorMsg` describes the flow table being full
    pub fn check_table_full(&self) -> bool {
        self.typ == OfpErrorType::FlowModFailed as u16
            && self.code == OfpFlowModFailedCode::AllTablesFull as u16
    }
}

impl fmt::Display for OfpErrorMsg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match OfpErrorType::from_u16(self.typ) {
            Some(typ) => write!(f, "OpenFlow Error: {:?}, code({})", typ, self.code),
            None => write!(f, "OpenFlow Error: type({}), code({})", self.typ, self.code),
        }
    }
}

/* Copyright (c) 2008 The Board of Trustees of The Leland Stanford Junior
 * University
 *
 * We are making the OpenFlow specification and associated documentation
 * (Software) available for public use and benefit with the expectation
 * that others will use, modify and enhance the Software and contribute
 * those enhancements back to the community. However, since we would
 * like to make the Software available for broadest use, with as few
 * restrictions as possible permission is hereby granted, free of
 * charge, to any person obtaining a copy of this Software to deal in
 * the Software under the copyrights without restriction, including
 * without limitation the rights to use, copy, modify, merge, publish,
 * distribute, sublicense, and/or sell copies of the Software, and to
 * permit persons to whom the Software is furnished to do so, subject to
 * the following conditions:
 *
 * The above copyright notice and this permission notice shall be
 * included in all copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND,
 * EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF
 * MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
 * NONINFRINGEMENT.  IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS
 * BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN
 * ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
 * CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
 * SOFTWARE.
 *
 * The name and trademarks of copyright holder(s) may NOT be used in
 * advertising or publicity pertaining to the Software or any
 * derivatives without specific, written prior permission.
 */

/// Version number:
/// Non-experimental versions released: 0x01
/// Experimental versions released: 0x81 -- 0x99
pub const OFP_VERSION: u8 = 0x01;

/// The IANA-unassigned port OpenFlow 1.0 switches connect to.
pub const OFP_TCP_PORT: u16 = 6633;

/// Largest message the 16 bit header length can describe
pub const OFP_MAX_MESSAGE_LEN: usize = 0xffff;

pub const OFP_MAX_TABLE_NAME_LEN: usize = 32;
pub const OFP_MAX_PORT_NAME_LEN: usize = 16;
pub const DESC_STR_LEN: usize = 256;
pub const SERIAL_NUM_LEN: usize = 32;

/// Default number of bytes of a table-miss packet sent to the controller.
pub const OFP_DEFAULT_MISS_SEND_LEN: u16 = 128;

/* Port numbering. Physical ports are numbered starting from 1. */
/// Maximum number of physical switch ports.
pub const OFPP_MAX: u16 = 0xff00;
/// Send the packet out the input port. This virtual port must be explicitly
/// used in order to send back out of the input port.
pub const OFPP_IN_PORT: u16 = 0xfff8;
/// Perform actions in flow table. NB: This can only be the destination port
/// for packet-out messages.
pub const OFPP_TABLE: u16 = 0xfff9;
/// Process with normal L2/L3 switching.
pub const OFPP_NORMAL: u16 = 0xfffa;
/// All physical ports except input port and those disabled by STP.
pub const OFPP_FLOOD: u16 = 0xfffb;
/// All physical ports except input port.
pub const OFPP_ALL: u16 = 0xfffc;
/// Send to controller.
pub const OFPP_CONTROLLER: u16 = 0xfffd;
/// Local openflow "port".
pub const OFPP_LOCAL: u16 = 0xfffe;
/// Not associated with a physical port.
pub const OFPP_NONE: u16 = 0xffff;

/// A message's type, the most fundamental to
/// distinguish information between messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfpType {
    /* Immutable messages. */
    /// Symmetric message
    Hello = 0,
    /// Symmetric message
    Error = 1,
    /// Symmetric message
    EchoRequest = 2,
    /// Symmetric message
    EchoReply = 3,
    /// Symmetric message
    Vendor = 4,

    /* Switch configuration messages. */
    /// Controller/switch message
    FeaturesRequest = 5,
    /// Controller/switch message
    FeaturesReply = 6,
    /// Controller/switch message
    GetConfigRequest = 7,
    /// Controller/switch message
    GetConfigReply = 8,
    /// Controller/switch message
    SetConfig = 9,

    /* Asynchronous messages. */
    /// Async message
    PacketIn = 10,
    /// Async message
    FlowRemoved = 11,
    /// Async message
    PortStatus = 12,

    /* Controller command messages. */
    /// Controller/switch message
    PacketOut = 13,
    /// Controller/switch message
    FlowMod = 14,
    /// Controller/switch message
    PortMod = 15,

    /* Statistics messages. */
    /// Controller/switch message
    StatsRequest = 16,
    /// Controller/switch message
    StatsReply = 17,

    /* Barrier messages. */
    /// Controller/switch message
    BarrierRequest = 18,
    /// Controller/switch message
    BarrierReply = 19,

    /* Queue Configuration messages. */
    /// Controller/switch message
    QueueGetConfigRequest = 20,
    /// Controller/switch message
    QueueGetConfigReply = 21,
}

impl OfpType {
    pub fn from_u8(typ: u8) -> Option<OfpType> {
        let t = match typ {
            0 => OfpType::Hello,
            1 => OfpType::Error,
            2 => OfpType::EchoRequest,
            3 => OfpType::EchoReply,
            4 => OfpType::Vendor,
            5 => OfpType::FeaturesRequest,
            6 => OfpType::FeaturesReply,
            7 => OfpType::GetConfigRequest,
            8 => OfpType::GetConfigReply,
            9 => OfpType::SetConfig,
            10 => OfpType::PacketIn,
            11 => OfpType::FlowRemoved,
            12 => OfpType::PortStatus,
            13 => OfpType::PacketOut,
            14 => OfpType::FlowMod,
            15 => OfpType::PortMod,
            16 => OfpType::StatsRequest,
            17 => OfpType::StatsReply,
            18 => OfpType::BarrierRequest,
            19 => OfpType::BarrierReply,
            20 => OfpType::QueueGetConfigRequest,
            21 => OfpType::QueueGetConfigReply,
            _ => return None,
        };
        Some(t)
    }
}

/// Header on all OpenFlow packets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OfpHeader {
    /// OFP_VERSION.
    version: u8,
    /// This packet's OfpType.
    typ: u8,
    /// This packet's length including this OfpHeader.
    length: u16,
    /// Transaction id associated with this packet.
    /// Replies use the same id as was in the request
    /// to facilitate pairing.
    xid: u32,
}

impl OfpHeader {
    /// Gets the packet's OpenFlow version
    pub fn version(&self) -> u8 {
        self.version
    }
    /// Gets this packet's `OfpType`'s numerical respresentation.
    pub fn typ(&self) -> u8 {
        self.typ
    }
    /// Gets the advertised length, header included
    pub fn length(&self) -> usize {
        self.length as usize
    }
    /// Gets the packet's transaction id
    pub fn xid(&self) -> u32 {
        self.xid
    }
}

/// Port behavior, either a physical port or one of the reserved ports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PseudoPort {
    Physical(u16),
    InPort,
    Table,
    Normal,
    Flood,
    All,
    Controller,
    Local,
    None,
}

impl From<u16> for PseudoPort {
    fn from(port: u16) -> PseudoPort {
        match port {
            OFPP_IN_PORT => PseudoPort::InPort,
            OFPP_TABLE => PseudoPort::Table,
            OFPP_NORMAL => PseudoPort::Normal,
            OFPP_FLOOD => PseudoPort::Flood,
            OFPP_ALL => PseudoPort::All,
            OFPP_CONTROLLER => PseudoPort::Controller,
            OFPP_LOCAL => PseudoPort::Local,
            OFPP_NONE => PseudoPort::None,
            p => PseudoPort::Physical(p),
        }
    }
}

impl From<PseudoPort> for u16 {
    fn from(port: PseudoPort) -> u16 {
        match port {
            PseudoPort::Physical(p) => p,
            PseudoPort::InPort => OFPP_IN_PORT,
            PseudoPort::Table => OFPP_TABLE,
            PseudoPort::Normal => OFPP_NORMAL,
            PseudoPort::Flood => OFPP_FLOOD,
            PseudoPort::All => OFPP_ALL,
            PseudoPort::Controller => OFPP_CONTROLLER,
            PseudoPort::Local => OFPP_LOCAL,
            PseudoPort::None => OFPP_NONE,
        }
    }
}

/* Flags to indicate behavior of the physical port. */
/// Port is administratively down.
pub const OFPPC_PORT_DOWN: u32 = 1 << 0;
/// Disable 802.1D spanning tree on port.
pub const OFPPC_NO_STP: u32 = 1 << 1;
/// Drop all packets except 802.1D spanning tree packets.
pub const OFPPC_NO_RECV: u32 = 1 << 2;
/// Drop received 802.1D STP packets.
pub const OFPPC_NO_RECV_STP: u32 = 1 << 3;
/// Do not include this port when flooding.
pub const OFPPC_NO_FLOOD: u32 = 1 << 4;
/// Drop packets forwarded to port.
pub const OFPPC_NO_FWD: u32 = 1 << 5;
/// Do not send packet-in msgs for port.
pub const OFPPC_NO_PACKET_IN: u32 = 1 << 6;

/// No physical link present.
pub const OFPPS_LINK_DOWN: u32 = 1 << 0;

/* Features of physical ports available in a datapath. */
pub const OFPPF_10MB_FD: u32 = 1 << 1;
pub const OFPPF_100MB_FD: u32 = 1 << 3;
pub const OFPPF_1GB_FD: u32 = 1 << 5;
pub const OFPPF_COPPER: u32 = 1 << 7;

/// Description of a physical port.
#[derive(Debug, Clone, PartialEq)]
pub struct PhyPort {
    pub port_no: u16,
    pub hw_addr: MacAddr,
    /// Null-terminated on the wire, at most 15 significant bytes.
    pub name: String,
    /// Bitmap of OFPPC_* flags.
    pub config: u32,
    /// Bitmap of OFPPS_* flags.
    pub state: u32,
    /* Bitmaps of OFPPF_* that describe features. All bits zeroed if
     * unsupported or unavailable. */
    /// Current features.
    pub curr: u32,
    /// Features being advertised by the port.
    pub advertised: u32,
    /// Features supported by the port.
    pub supported: u32,
    /// Features advertised by peer.
    pub peer: u32,
}

impl PhyPort {
    /// A copper gigabit port with the link up
    pub fn new(port_no: u16, hw_addr: MacAddr, name: &str) -> PhyPort {
        PhyPort {
            port_no,
            hw_addr,
            name: name.to_owned(),
            config: 0,
            state: 0,
            curr: OFPPF_1GB_FD | OFPPF_COPPER,
            advertised: 0,
            supported: OFPPF_100MB_FD | OFPPF_1GB_FD | OFPPF_COPPER,
            peer: 0,
        }
    }

    pub fn is_link_down(&self) -> bool {
        self.state & OFPPS_LINK_DOWN != 0
    }
}

/* Capabilities supported by the datapath. */
pub const OFPC_FLOW_STATS: u32 = 1 << 0;
pub const OFPC_TABLE_STATS: u32 = 1 << 1;
pub const OFPC_PORT_STATS: u32 = 1 << 2;
pub const OFPC_STP: u32 = 1 << 3;
pub const OFPC_IP_REASM: u32 = 1 << 5;
pub const OFPC_QUEUE_STATS: u32 = 1 << 6;
pub const OFPC_ARP_MATCH_IP: u32 = 1 << 7;

/// Switch features.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchFeatures {
    /// Datapath unique ID. The lower 48-bits are for
    /// a MAC address, while the upper 16-bits are
    /// implementer-defined.
    pub datapath_id: u64,
    /// Max packets buffered at once.
    pub n_buffers: u32,
    /// Number of tables supported by datapath.
    pub n_tables: u8,
    /// Bitmap of support OFPC_* capabilities.
    pub capabilities: u32,
    /// Bitmap of supported (1 << OfpActionType).
    pub actions: u32,
    /// Port definitions. The number of ports is inferred from the
    /// length field in the header.
    pub ports: Vec<PhyPort>,
}

/// Switch configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwitchConfig {
    /// OFPC_FRAG_* flags.
    pub flags: u16,
    /// Max bytes of new flow that datapath should send to the controller.
    pub miss_send_len: u16,
}

/// No special handling for fragments.
pub const OFPC_FRAG_NORMAL: u16 = 0;

impl Default for SwitchConfig {
    fn default() -> Self {
        SwitchConfig {
            flags: OFPC_FRAG_NORMAL,
            miss_send_len: OFP_DEFAULT_MISS_SEND_LEN,
        }
    }
}

/* Flow wildcards. */
/// Switch input port.
pub const OFPFW_IN_PORT: u32 = 1 << 0;
/// VLAN id.
pub const OFPFW_DL_VLAN: u32 = 1 << 1;
/// Ethernet source address.
pub const OFPFW_DL_SRC: u32 = 1 << 2;
/// Ethernet destination address.
pub const OFPFW_DL_DST: u32 = 1 << 3;
/// Ethernet frame type.
pub const OFPFW_DL_TYPE: u32 = 1 << 4;
/// IP protocol.
pub const OFPFW_NW_PROTO: u32 = 1 << 5;
/// TCP/UDP source port.
pub const OFPFW_TP_SRC: u32 = 1 << 6;
/// TCP/UDP destination port.
pub const OFPFW_TP_DST: u32 = 1 << 7;
/// IP source address wildcard bit count. 0 is exact match, 1 ignores the LSB,
/// 2 ignores the 2 least-significant bits, ..., 32 and higher wildcard the
/// entire field.
pub const OFPFW_NW_SRC_SHIFT: u32 = 8;
pub const OFPFW_NW_SRC_MASK: u32 = 0x3f << OFPFW_NW_SRC_SHIFT;
pub const OFPFW_NW_SRC_ALL: u32 = 32 << OFPFW_NW_SRC_SHIFT;
/// IP destination address wildcard bit count. Same format as source.
pub const OFPFW_NW_DST_SHIFT: u32 = 14;
pub const OFPFW_NW_DST_MASK: u32 = 0x3f << OFPFW_NW_DST_SHIFT;
pub const OFPFW_NW_DST_ALL: u32 = 32 << OFPFW_NW_DST_SHIFT;
/// VLAN priority.
pub const OFPFW_DL_VLAN_PCP: u32 = 1 << 20;
/// IP ToS (DSCP field, 6 bits).
pub const OFPFW_NW_TOS: u32 = 1 << 21;
/// Wildcard all fields.
pub const OFPFW_ALL: u32 = (1 << 22) - 1;

/// The VLAN id is 12 bits, so we can use the entire 16 bits to indicate
/// special conditions. All ones indicates that no VLAN id was set.
pub const OFP_VLAN_NONE: u16 = 0xffff;

/// Fields to match against flows.
///
/// Fields whose wildcard bit is set are "don't care". The codec always reads
/// and writes all 40 bytes; `matches` and `covers` honor the wildcards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OfpMatch {
    /// Wildcard fields.
    pub wildcards: u32,
    /// Input switch port.
    pub in_port: u16,
    /// Ethernet source address.
    pub dl_src: MacAddr,
    /// Ethernet destination address.
    pub dl_dst: MacAddr,
    /// Input VLAN id.
    pub dl_vlan: u16,
    /// Input VLAN priority.
    pub dl_vlan_pcp: u8,
    /// Ethernet frame type.
    pub dl_type: u16,
    /// IP ToS (actually DSCP field, 6 bits).
    pub nw_tos: u8,
    /// IP protocol or lower 8 bits of ARP opcode.
    pub nw_proto: u8,
    /// IP source address.
    pub nw_src: Ipv4Addr,
    /// IP destination address.
    pub nw_dst: Ipv4Addr,
    /// TCP/UDP source port.
    pub tp_src: u16,
    /// TCP/UDP destination port.
    pub tp_dst: u16,
}

fn nw_mask(wildcard_bits: u32) -> u32 {
    if wildcard_bits >= 32 {
        0
    }
    else {
        !0u32 << wildcard_bits
    }
}

impl OfpMatch {
    /// The universal match: every field is wildcarded.
    pub fn match_all() -> OfpMatch {
        OfpMatch {
            wildcards: OFPFW_ALL,
            in_port: 0,
            dl_src: MacAddr::ZERO,
            dl_dst: MacAddr::ZERO,
            dl_vlan: 0,
            dl_vlan_pcp: 0,
            dl_type: 0,
            nw_tos: 0,
            nw_proto: 0,
            nw_src: Ipv4Addr::new(0, 0, 0, 0),
            nw_dst: Ipv4Addr::new(0, 0, 0, 0),
            tp_src: 0,
            tp_dst: 0,
        }
    }

    pub fn in_port(mut self, port: u16) -> OfpMatch {
        self.in_port = port;
        self.wildcards &= !OFPFW_IN_PORT;
        self
    }

    pub fn dl_src(mut self, mac: MacAddr) -> OfpMatch {
        self.dl_src = mac;
        self.wildcards &= !OFPFW_DL_SRC;
        self
    }

    pub fn dl_dst(mut self, mac: MacAddr) -> OfpMatch {
        self.dl_dst = mac;
        self.wildcards &= !OFPFW_DL_DST;
        self
    }

    pub fn dl_type(mut self, typ: u16) -> OfpMatch {
        self.dl_type = typ;
        self.wildcards &= !OFPFW_DL_TYPE;
        self
    }

    pub fn nw_proto(mut self, proto: u8) -> OfpMatch {
        self.nw_proto = proto;
        self.wildcards &= !OFPFW_NW_PROTO;
        self
    }

    /// Matches the source address exactly.
    pub fn nw_src(mut self, ip: Ipv4Addr) -> OfpMatch {
        self.nw_src = ip;
        self.wildcards &= !OFPFW_NW_SRC_MASK;
        self
    }

    /// Matches the destination address exactly.
    pub fn nw_dst(mut self, ip: Ipv4Addr) -> OfpMatch {
        self.nw_dst = ip;
        self.wildcards &= !OFPFW_NW_DST_MASK;
        self
    }

    /// Number of ignored least-significant source address bits, capped at 32.
    pub fn nw_src_wildcard_bits(&self) -> u32 {
        let bits = (self.wildcards & OFPFW_NW_SRC_MASK) >> OFPFW_NW_SRC_SHIFT;
        if bits > 32 { 32 } else { bits }
    }

    /// Number of ignored least-significant destination address bits, capped at 32.
    pub fn nw_dst_wildcard_bits(&self) -> u32 {
        let bits = (self.wildcards & OFPFW_NW_DST_MASK) >> OFPFW_NW_DST_SHIFT;
        if bits > 32 { 32 } else { bits }
    }

    fn is_wild(&self, flag: u32) -> bool {
        self.wildcards & flag != 0
    }

    /// Tests a packet's search key (constructed with no wildcards) against this match.
    pub fn matches(&self, key: &OfpMatch) -> bool {
        let src_mask = nw_mask(self.nw_src_wildcard_bits());
        let dst_mask = nw_mask(self.nw_dst_wildcard_bits());
        (self.is_wild(OFPFW_IN_PORT) || self.in_port == key.in_port)
            && (self.is_wild(OFPFW_DL_SRC) || self.dl_src == key.dl_src)
            && (self.is_wild(OFPFW_DL_DST) || self.dl_dst == key.dl_dst)
            && (self.is_wild(OFPFW_DL_VLAN) || self.dl_vlan == key.dl_vlan)
            && (self.is_wild(OFPFW_DL_VLAN_PCP) || self.dl_vlan_pcp == key.dl_vlan_pcp)
            && (self.is_wild(OFPFW_DL_TYPE) || self.dl_type == key.dl_type)
            && (self.is_wild(OFPFW_NW_TOS) || self.nw_tos == key.nw_tos)
            && (self.is_wild(OFPFW_NW_PROTO) || self.nw_proto == key.nw_proto)
            && (u32::from(self.nw_src) & src_mask) == (u32::from(key.nw_src) & src_mask)
            && (u32::from(self.nw_dst) & dst_mask) == (u32::from(key.nw_dst) & dst_mask)
            && (self.is_wild(OFPFW_TP_SRC) || self.tp_src == key.tp_src)
            && (self.is_wild(OFPFW_TP_DST) || self.tp_dst == key.tp_dst)
    }

    /// Tests whether `other` is at least as specific as this match and agrees with
    /// it on every field this match cares about. This is how non-strict
    /// flow-mod modify and delete commands select their entries.
    pub fn covers(&self, other: &OfpMatch) -> bool {
        let covered = |flag: u32, same: bool| self.is_wild(flag) || (!other.is_wild(flag) && same);
        let src_bits = self.nw_src_wildcard_bits();
        let dst_bits = self.nw_dst_wildcard_bits();
        covered(OFPFW_IN_PORT, self.in_port == other.in_port)
            && covered(OFPFW_DL_SRC, self.dl_src == other.dl_src)
            && covered(OFPFW_DL_DST, self.dl_dst == other.dl_dst)
            && covered(OFPFW_DL_VLAN, self.dl_vlan == other.dl_vlan)
            && covered(OFPFW_DL_VLAN_PCP, self.dl_vlan_pcp == other.dl_vlan_pcp)
            && covered(OFPFW_DL_TYPE, self.dl_type == other.dl_type)
            && covered(OFPFW_NW_TOS, self.nw_tos == other.nw_tos)
            && covered(OFPFW_NW_PROTO, self.nw_proto == other.nw_proto)
            && covered(OFPFW_TP_SRC, self.tp_src == other.tp_src)
            && covered(OFPFW_TP_DST, self.tp_dst == other.tp_dst)
            && other.nw_src_wildcard_bits() <= src_bits
            && (u32::from(self.nw_src) & nw_mask(src_bits))
                == (u32::from(other.nw_src) & nw_mask(src_bits))
            && other.nw_dst_wildcard_bits() <= dst_bits
            && (u32::from(self.nw_dst) & nw_mask(dst_bits))
                == (u32::from(other.nw_dst) & nw_mask(dst_bits))
    }

    /// A copy with every wildcarded field zeroed, so that two matches selecting
    /// the same packets compare equal.
    pub fn normalized(&self) -> OfpMatch {
        let mut m = *self;
        m.wildcards &= OFPFW_ALL;
        if m.is_wild(OFPFW_IN_PORT) {
            m.in_port = 0;
        }
        if m.is_wild(OFPFW_DL_SRC) {
            m.dl_src = MacAddr::ZERO;
        }
        if m.is_wild(OFPFW_DL_DST) {
            m.dl_dst = MacAddr::ZERO;
        }
        if m.is_wild(OFPFW_DL_VLAN) {
            m.dl_vlan = 0;
        }
        if m.is_wild(OFPFW_DL_VLAN_PCP) {
            m.dl_vlan_pcp = 0;
        }
        if m.is_wild(OFPFW_DL_TYPE) {
            m.dl_type = 0;
        }
        if m.is_wild(OFPFW_NW_TOS) {
            m.nw_tos = 0;
        }
        if m.is_wild(OFPFW_NW_PROTO) {
            m.nw_proto = 0;
        }
        if m.is_wild(OFPFW_TP_SRC) {
            m.tp_src = 0;
        }
        if m.is_wild(OFPFW_TP_DST) {
            m.tp_dst = 0;
        }
        let src_bits = m.nw_src_wildcard_bits();
        let dst_bits = m.nw_dst_wildcard_bits();
        m.wildcards = (m.wildcards & !(OFPFW_NW_SRC_MASK | OFPFW_NW_DST_MASK))
            | (src_bits << OFPFW_NW_SRC_SHIFT)
            | (dst_bits << OFPFW_NW_DST_SHIFT);
        m.nw_src = Ipv4Addr::from(u32::from(m.nw_src) & nw_mask(src_bits));
        m.nw_dst = Ipv4Addr::from(u32::from(m.nw_dst) & nw_mask(dst_bits));
        m
    }

    /// Identical wildcards and identical values in every field that is not wildcarded.
    pub fn strict_eq(&self, other: &OfpMatch) -> bool {
        self.normalized() == other.normalized()
    }
}

/* ## --------------------------- ## */
/* ## OpenFlow Flow Modification. ## */
/* ## --------------------------- ## */

/// The command that is embedded in a flow mod message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfpFlowModCommand {
    /// New flow.
    Add = 0,
    /// Modify all matching flows.
    Modify = 1,
    /// Modify entry strictly matching wildcards and priority.
    ModifyStrict = 2,
    /// Delete all matching flows.
    Delete = 3,
    /// Delete entry strictly matching wildcards and priority.
    DeleteStrict = 4,
}

impl OfpFlowModCommand {
    pub fn from_u16(cmd: u16) -> Option<OfpFlowModCommand> {
        match cmd {
            0 => Some(OfpFlowModCommand::Add),
            1 => Some(OfpFlowModCommand::Modify),
            2 => Some(OfpFlowModCommand::ModifyStrict),
            3 => Some(OfpFlowModCommand::Delete),
            4 => Some(OfpFlowModCommand::DeleteStrict),
            _ => None,
        }
    }
}

/// Value used in `idle_timeout` and `hard_timeout` to indicate that the entry is permanent.
pub const OFP_FLOW_PERMANENT: u16 = 0;

/// By default, choose a priority in the middle.
pub const OFP_DEFAULT_PRIORITY: u16 = 0x8000;

/// A reserved buffer ID to express that no buffer is assigned
pub const OFP_NO_BUFFER: u32 = 0xffff_ffff;

/* Flow mod flags. */
/// Send flow removed message when flow expires or is deleted.
pub const OFPFF_SEND_FLOW_REM: u16 = 1 << 0;
/// Check for overlapping entries first.
pub const OFPFF_CHECK_OVERLAP: u16 = 1 << 1;
/// Remark this is for emergency.
pub const OFPFF_EMERG: u16 = 1 << 2;

/// Flow setup and teardown (controller -> datapath).
#[derive(Debug, Clone, PartialEq)]
pub struct OfpFlowMod {
    /// Fields to match.
    pub match_fields: OfpMatch,
    /// Opaque controller-issued identifier.
    pub cookie: u64,
    /// One of OfpFlowModCommand.
    pub command: OfpFlowModCommand,
    /// Idle time before discarding (seconds).
    pub idle_timeout: u16,
    /// Max time before discarding (seconds).
    pub hard_timeout: u16,
    /// Priority level of flow entry.
    pub priority: u16,
    /// Buffered packet to apply to (or OFP_NO_BUFFER).
    /// Not meaningful for OfpFlowModCommand::Delete*.
    pub buffer_id: u32,
    /// For OfpFlowModCommand::Delete* commands, require
    /// matching entries to include this as an output port.
    /// A value of OFPP_NONE indicates no restriction.
    pub out_port: u16,
    /// Bitmap of OFPFF_* flags.
    pub flags: u16,
    /// The action length is inferred from the length field in the header.
    pub actions: ActionList,
}

impl OfpFlowMod {
    /// Constructs a permanent, unbuffered `OfpFlowMod` with the given fields.
    pub fn new(
        command: OfpFlowModCommand,
        match_fields: OfpMatch,
        priority: u16,
        actions: ActionList,
    ) -> OfpFlowMod {
        OfpFlowMod {
            match_fields,
            cookie: 0,
            command,
            idle_timeout: OFP_FLOW_PERMANENT,
            hard_timeout: OFP_FLOW_PERMANENT,
            priority,
            buffer_id: OFP_NO_BUFFER,
            out_port: OFPP_NONE,
            flags: 0,
            actions,
        }
    }
}

/// Why a flow was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfpFlowRemovedReason {
    /// Flow idle time exceeded idle_timeout.
    IdleTimeout = 0,
    /// Time exceeded hard_timeout.
    HardTimeout = 1,
    /// Evicted by a DELETE flow mod.
    Delete = 2,
}

impl OfpFlowRemovedReason {
    pub fn from_u8(reason: u8) -> Option<OfpFlowRemovedReason> {
        match reason {
            0 => Some(OfpFlowRemovedReason::IdleTimeout),
            1 => Some(OfpFlowRemovedReason::HardTimeout),
            2 => Some(OfpFlowRemovedReason::Delete),
            _ => None,
        }
    }
}

/// Flow removed (datapath -> controller).
#[derive(Debug, Clone, PartialEq)]
pub struct OfpFlowRemoved {
    /// Description of fields.
    pub match_fields: OfpMatch,
    /// Opaque controller-issued identifier.
    pub cookie: u64,
    /// Priority level of flow entry.
    pub priority: u16,
    pub reason: OfpFlowRemovedReason,
    /// Time flow was alive in seconds.
    pub duration_sec: u32,
    /// Time flow was alive in nanoseconds beyond duration_sec.
    pub duration_nsec: u32,
    /// Idle timeout from original flow mod.
    pub idle_timeout: u16,
    pub packet_count: u64,
    pub byte_count: u64,
}

/// Why is this packet being sent to the controller?
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfpPacketInReason {
    /// No matching flow.
    NoMatch = 0,
    /// Action explicitly output to controller.
    Action = 1,
}

/// Packet received on port (datapath -> controller).
#[derive(Debug, Clone, PartialEq)]
pub struct OfpPacketIn {
    /// ID assigned by datapath.
    pub buffer_id: u32,
    /// Full length of frame.
    pub total_len: u16,
    /// Port on which frame was received.
    pub in_port: u16,
    pub reason: OfpPacketInReason,
    /// Ethernet frame, truncated to the miss_send_len or max_len in effect.
    pub data: Vec<u8>,
}

/// What changed about the physical port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfpPortReason {
    /// The port was added.
    Add = 0,
    /// The port was removed.
    Delete = 1,
    /// Some attribute of the port has changed.
    Modify = 2,
}

/// A physical port has changed in the datapath
#[derive(Debug, Clone, PartialEq)]
pub struct OfpPortStatus {
    pub reason: OfpPortReason,
    pub desc: PhyPort,
}

/// Send packet (controller -> datapath).
#[derive(Debug, Clone, PartialEq)]
pub struct OfpPacketOut {
    /// ID assigned by datapath (OFP_NO_BUFFER if none).
    pub buffer_id: u32,
    /// Packet's input port (OFPP_NONE if none).
    pub in_port: u16,
    pub actions: ActionList,
    /// Packet data. Only meaningful if buffer_id == OFP_NO_BUFFER.
    pub data: Vec<u8>,
}

/// Modify behavior of the physical port
#[derive(Debug, Clone, PartialEq)]
pub struct OfpPortMod {
    pub port_no: u16,
    /// The hardware address is not configurable. This is used to
    /// sanity-check the request, so it must be the same as returned in an
    /// PhyPort struct.
    pub hw_addr: MacAddr,
    /// Bitmap of OFPPC_* flags.
    pub config: u32,
    /// Bitmap of OFPPC_* flags to be changed.
    pub mask: u32,
    /// Bitmap of OFPPF_*. Zero all bits to prevent any action taking place.
    pub advertise: u32,
}

/* ## ----------------- ## */
/* ## OpenFlow Statistics. ## */
/* ## ----------------- ## */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfpStatsType {
    /// Description of this OpenFlow switch.
    Desc = 0,
    /// Individual flow statistics.
    Flow = 1,
    /// Aggregate flow statistics.
    Aggregate = 2,
    /// Flow table statistics.
    Table = 3,
    /// Physical port statistics.
    Port = 4,
    /// Queue statistics for a port.
    Queue = 5,
    /// Vendor extension.
    Vendor = 0xffff,
}

/// More replies to follow.
pub const OFPSF_REPLY_MORE: u16 = 1 << 0;

/// Body for flow and aggregate stats requests.
#[derive(Debug, Clone, PartialEq)]
pub struct OfpFlowStatsRequest {
    /// Fields to match.
    pub match_fields: OfpMatch,
    /// ID of table to read (from OfpTableStats), 0xff for all tables.
    pub table_id: u8,
    /// Require matching entries to include this as an output port.
    /// A value of OFPP_NONE indicates no restriction.
    pub out_port: u16,
}

/// All tables.
pub const OFPTT_ALL: u8 = 0xff;

#[derive(Debug, Clone, PartialEq)]
pub enum OfpStatsRequestBody {
    Desc,
    Flow(OfpFlowStatsRequest),
    Aggregate(OfpFlowStatsRequest),
    Table,
    /// OFPP_NONE for all ports.
    Port { port_no: u16 },
    Queue { port_no: u16, queue_id: u32 },
    Vendor { vendor: u32, body: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OfpStatsRequest {
    pub flags: u16,
    pub body: OfpStatsRequestBody,
}

/// Description of this OpenFlow switch. Strings are null-terminated on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct OfpDescStats {
    /// Manufacturer description.
    pub mfr_desc: String,
    /// Hardware description.
    pub hw_desc: String,
    /// Software description.
    pub sw_desc: String,
    /// Serial number.
    pub serial_num: String,
    /// Human readable description of datapath.
    pub dp_desc: String,
}

/// Body of reply to a flow stats request.
#[derive(Debug, Clone, PartialEq)]
pub struct OfpFlowStats {
    /// ID of table flow came from.
    pub table_id: u8,
    /// Description of fields.
    pub match_fields: OfpMatch,
    /// Time flow has been alive in seconds.
    pub duration_sec: u32,
    /// Time flow has been alive in nanoseconds beyond duration_sec.
    pub duration_nsec: u32,
    /// Priority of the entry. Only meaningful when this is not an exact-match entry.
    pub priority: u16,
    /// Number of seconds idle before expiration.
    pub idle_timeout: u16,
    /// Number of seconds before expiration.
    pub hard_timeout: u16,
    /// Opaque controller-issued identifier.
    pub cookie: u64,
    /// Number of packets in flow.
    pub packet_count: u64,
    /// Number of bytes in flow.
    pub byte_count: u64,
    pub actions: ActionList,
}

/// Body of reply to an aggregate stats request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OfpAggregateStats {
    /// Number of packets in flows.
    pub packet_count: u64,
    /// Number of bytes in flows.
    pub byte_count: u64,
    /// Number of flows.
    pub flow_count: u32,
}

/// Body of reply to a table stats request.
#[derive(Debug, Clone, PartialEq)]
pub struct OfpTableStats {
    /// Identifier of table. Lower numbered tables are consulted first.
    pub table_id: u8,
    pub name: String,
    /// Bitmap of OFPFW_* wildcards that are supported by the table.
    pub wildcards: u32,
    /// Max number of entries supported.
    pub max_entries: u32,
    /// Number of active entries.
    pub active_count: u32,
    /// Number of packets looked up in table.
    pub lookup_count: u64,
    /// Number of packets that hit table.
    pub matched_count: u64,
}

/// Body of reply to a port stats request. If a counter is unsupported,
/// set the field to all ones.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OfpPortStats {
    pub port_no: u16,
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_dropped: u64,
    pub tx_dropped: u64,
    pub rx_errors: u64,
    pub tx_errors: u64,
    pub rx_frame_err: u64,
    pub rx_over_err: u64,
    pub rx_crc_err: u64,
    pub collisions: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OfpQueueStats {
    pub port_no: u16,
    pub queue_id: u32,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub tx_errors: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OfpStatsReplyBody {
    Desc(OfpDescStats),
    Flow(Vec<OfpFlowStats>),
    Aggregate(OfpAggregateStats),
    Table(Vec<OfpTableStats>),
    Port(Vec<OfpPortStats>),
    Queue(Vec<OfpQueueStats>),
    Vendor { vendor: u32, body: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OfpStatsReply {
    pub flags: u16,
    pub body: OfpStatsReplyBody,
}

/* ## -------------- ## */
/* ## OpenFlow Errors. ## */
/* ## -------------- ## */

/// Values for 'type' in `OfpErrorMsg`. These values are immutable: they will
/// not change in future versions of the protocol (although new values may be added).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfpErrorType {
    /// Hello protocol failed.
    HelloFailed = 0,
    /// Request was not understood.
    BadRequest = 1,
    /// Error in action description.
    BadAction = 2,
    /// Problem modifying flow entry.
    FlowModFailed = 3,
    /// Port mod request failed.
    PortModFailed = 4,
    /// Queue operation failed.
    QueueOpFailed = 5,
}

impl OfpErrorType {
    pub fn from_u16(typ: u16) -> Option<OfpErrorType> {
        match typ {
            0 => Some(OfpErrorType::HelloFailed),
            1 => Some(OfpErrorType::BadRequest),
            2 => Some(OfpErrorType::BadAction),
            3 => Some(OfpErrorType::FlowModFailed),
            4 => Some(OfpErrorType::PortModFailed),
            5 => Some(OfpErrorType::QueueOpFailed),
            _ => None,
        }
    }
}

/// `OfpErrorMsg` 'code' values for `OfpErrorType::HelloFailed`.
///
/// 'data' contains an ASCII text string that may give failure details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfpHelloFailedCode {
    /// No compatible version.
    Incompatible = 0,
    /// Permissions error.
    Eperm = 1,
}

/// `OfpErrorMsg` 'code' values for `OfpErrorType::BadRequest`.
///
/// 'data' contains at least the first 64 bytes of the failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfpBadRequestCode {
    /// ofp_header.version not supported.
    BadVersion = 0,
    /// ofp_header.type not supported.
    BadType = 1,
    /// ofp_stats_request.type not supported.
    BadStat = 2,
    /// Vendor not supported (in ofp_vendor_header or ofp_stats_request or ofp_stats_reply).
    BadVendor = 3,
    /// Vendor subtype not supported.
    BadSubtype = 4,
    /// Permissions error.
    Eperm = 5,
    /// Wrong request length for type.
    BadLen = 6,
    /// Specified buffer has already been used.
    BufferEmpty = 7,
    /// Specified buffer does not exist.
    BufferUnknown = 8,
}

/// `OfpErrorMsg` 'code' values for `OfpErrorType::BadAction`.
///
/// 'data' contains at least the first 64 bytes of the failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfpBadActionCode {
    /// Unknown action type.
    BadType = 0,
    /// Length problem in actions.
    BadLen = 1,
    /// Unknown vendor id specified.
    BadVendor = 2,
    /// Unknown action type for vendor id.
    BadVendorType = 3,
    /// Problem validating output action.
    BadOutPort = 4,
    /// Bad action argument.
    BadArgument = 5,
    /// Permissions error.
    Eperm = 6,
    /// Can't handle this many actions.
    TooMany = 7,
    /// Problem validating output queue.
    BadQueue = 8,
}

/// `OfpErrorMsg` 'code' values for `OfpErrorType::FlowModFailed`.
///
/// 'data' contains at least the first 64 bytes of the failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfpFlowModFailedCode {
    /// Flow not added because of full tables.
    AllTablesFull = 0,
    /// Attempted to add overlapping flow with CHECK_OVERLAP flag set.
    Overlap = 1,
    /// Permissions error.
    Eperm = 2,
    /// Flow not added because of non-zero idle/hard timeout.
    BadEmergTimeout = 3,
    /// Unknown command.
    BadCommand = 4,
    /// Unsupported action list - cannot process in the order specified.
    Unsupported = 5,
}

/// `OfpErrorMsg` 'code' values for `OfpErrorType::PortModFailed`.
///
/// 'data' contains at least the first 64 bytes of the failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfpPortModFailedCode {
    /// Specified port does not exist.
    BadPort = 0,
    /// Specified hardware address is wrong.
    BadHwAddr = 1,
}

/// Error message (datapath -> controller).
#[derive(Debug, Clone, PartialEq)]
pub struct OfpErrorMsg {
    pub typ: u16,
    pub code: u16,
    /// Variable-length data. Interpreted based on the type and code. No padding.
    pub data: Vec<u8>,
}

/// An OpenFlow 1.0 message: the body selected by the header's type.
/// Symmetric messages without a body carry nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Hello,
    Error(OfpErrorMsg),
    EchoRequest(Vec<u8>),
    EchoReply(Vec<u8>),
    FeaturesRequest,
    FeaturesReply(SwitchFeatures),
    GetConfigRequest,
    GetConfigReply(SwitchConfig),
    SetConfig(SwitchConfig),
    PacketIn(OfpPacketIn),
    FlowRemoved(OfpFlowRemoved),
    PortStatus(OfpPortStatus),
    PacketOut(OfpPacketOut),
    FlowMod(OfpFlowMod),
    PortMod(OfpPortMod),
    StatsRequest(OfpStatsRequest),
    StatsReply(OfpStatsReply),
    BarrierRequest,
    BarrierReply,
}

impl Message {
    /// Gets the `OfpType` this message is sent with
    pub fn typ(&self) -> OfpType {
        match *self {
            Message::Hello => OfpType::Hello,
            Message::Error(_) => OfpType::Error,
            Message::EchoRequest(_) => OfpType::EchoRequest,
            Message::EchoReply(_) => OfpType::EchoReply,
            Message::FeaturesRequest => OfpType::FeaturesRequest,
            Message::FeaturesReply(_) => OfpType::FeaturesReply,
            Message::GetConfigRequest => OfpType::GetConfigRequest,
            Message::GetConfigReply(_) => OfpType::GetConfigReply,
            Message::SetConfig(_) => OfpType::SetConfig,
            Message::PacketIn(_) => OfpType::PacketIn,
            Message::FlowRemoved(_) => OfpType::FlowRemoved,
            Message::PortStatus(_) => OfpType::PortStatus,
            Message::PacketOut(_) => OfpType::PacketOut,
            Message::FlowMod(_) => OfpType::FlowMod,
            Message::PortMod(_) => OfpType::PortMod,
            Message::StatsRequest(_) => OfpType::StatsRequest,
            Message::StatsReply(_) => OfpType::StatsReply,
            Message::BarrierRequest => OfpType::BarrierRequest,
            Message::BarrierReply => OfpType::BarrierReply,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> OfpMatch {
        OfpMatch {
            wildcards: 0,
            in_port: 3,
            dl_src: MacAddr([0, 0, 0, 0, 0, 1]),
            dl_dst: MacAddr([0, 0, 0, 0, 0, 2]),
            dl_vlan: OFP_VLAN_NONE,
            dl_vlan_pcp: 0,
            dl_type: 0x0800,
            nw_tos: 0,
            nw_proto: 17,
            nw_src: Ipv4Addr::new(10, 0, 0, 1),
            nw_dst: Ipv4Addr::new(10, 0, 0, 2),
            tp_src: 1000,
            tp_dst: 53,
        }
    }

    #[test]
    fn match_all_is_universal() {
        assert!(OfpMatch::match_all().matches(&key()));
        let mut odd = key();
        odd.dl_type = 0x88cc;
        odd.in_port = 0xfffe;
        assert!(OfpMatch::match_all().matches(&odd));
    }

    #[test]
    fn exact_fields_must_agree() {
        let m = OfpMatch::match_all().dl_type(0x0800).nw_dst(Ipv4Addr::new(10, 0, 0, 2));
        assert!(m.matches(&key()));
        let mut other = key();
        other.nw_dst = Ipv4Addr::new(10, 0, 0, 3);
        assert!(!m.matches(&other));
    }

    #[test]
    fn nw_prefix_wildcards() {
        let mut m = OfpMatch::match_all().nw_src(Ipv4Addr::new(10, 0, 0, 0));
        m.wildcards |= 8 << OFPFW_NW_SRC_SHIFT;
        assert_eq!(8, m.nw_src_wildcard_bits());
        assert!(m.matches(&key()));
        let mut other = key();
        other.nw_src = Ipv4Addr::new(10, 0, 1, 1);
        assert!(!m.matches(&other));
    }

    #[test]
    fn covers_selects_more_specific_entries() {
        let filter = OfpMatch::match_all().dl_type(0x0800);
        let entry = OfpMatch::match_all().dl_type(0x0800).in_port(3);
        assert!(filter.covers(&entry));
        assert!(!entry.covers(&filter));
        assert!(OfpMatch::match_all().covers(&filter));
    }

    #[test]
    fn strict_eq_ignores_wildcarded_values() {
        let mut a = OfpMatch::match_all().in_port(1);
        let b = OfpMatch::match_all().in_port(1);
        a.tp_dst = 80;
        assert!(a.strict_eq(&b));
        assert!(!a.strict_eq(&b.in_port(2)));
    }

    #[test]
    fn pseudo_ports() {
        assert_eq!(PseudoPort::Flood, PseudoPort::from(0xfffb));
        assert_eq!(PseudoPort::Physical(7), PseudoPort::from(7));
        assert_eq!(0xfffd, u16::from(PseudoPort::Controller));
    }

    #[test]
    fn error_msg_echoes_64_bytes() {
        let request = vec![7; 100];
        let msg = OfpErrorMsg::new(&Error::BadAction(OfpBadActionCode::BadOutPort), &request);
        assert_eq!(OfpErrorType::BadAction as u16, msg.typ);
        assert_eq!(4, msg.code);
        assert_eq!(64, msg.data.len());
        assert!(!msg.check_table_full());
        let full = OfpErrorMsg::new(&Error::FlowModFailed(OfpFlowModFailedCode::AllTablesFull), &[]);
        assert!(full.check_table_full());
    }
}
