/*!
All serialization and construction routines for the OpenFlow message primitives

Use the trait `Serialize` for every primitive that is written to a stream,
whether it is a whole message body or only a part of one. `Message` puts the
header in front of a body.
*/

use byteorder::{NetworkEndian, WriteBytesExt};
use openflow::messages::*;
use std::io;
use std::io::Write;

impl OfpHeader {
    /// Constructs an `OfpHeader` for a message of `length` bytes, header included
    pub fn new(typ: OfpType, length: usize, xid: u32) -> OfpHeader {
        OfpHeader {
            version: OFP_VERSION,
            typ: typ as u8,
            length: length as u16,
            xid,
        }
    }

    /// Returns the fixed header length of 8 (in byte)
    pub fn header_length() -> usize {
        8
    }

    /// Returns the body length in byte
    pub fn body_length(&self) -> usize {
        (self.length as usize).saturating_sub(OfpHeader::header_length())
    }

    /// Serializes this header on the given stream
    pub fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_all(&[self.version, self.typ])?;
        stream.write_u16::<NetworkEndian>(self.length)?;
        stream.write_u32::<NetworkEndian>(self.xid)
    }
}

/// To be implemented by all OpenFlow message parts that are sent.
pub trait Serialize {
    /// The exact number of bytes `serialize` writes
    fn serialized_size(&self) -> usize;

    /// Serializes with network byte order, padding with zeros
    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()>;
}

/// Writes `n` zero bytes
pub fn write_padding<S: Write>(stream: &mut S, n: usize) -> io::Result<()> {
    stream.write_all(&vec![0; n])
}

/// Writes `s` as a null-terminated string into a field of `width` bytes.
/// Longer strings are truncated so the terminator always fits.
pub fn write_fixed_string<S: Write>(stream: &mut S, s: &str, width: usize) -> io::Result<()> {
    let bytes = s.as_bytes();
    let len = if bytes.len() < width { bytes.len() } else { width - 1 };
    stream.write_all(&bytes[..len])?;
    write_padding(stream, width - len)
}

impl Serialize for OfpMatch {
    fn serialized_size(&self) -> usize {
        40
    }

    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u32::<NetworkEndian>(self.wildcards)?;
        stream.write_u16::<NetworkEndian>(self.in_port)?;
        stream.write_all(&self.dl_src.octets())?;
        stream.write_all(&self.dl_dst.octets())?;
        stream.write_u16::<NetworkEndian>(self.dl_vlan)?;
        stream.write_u8(self.dl_vlan_pcp)?;
        write_padding(stream, 1)?;
        stream.write_u16::<NetworkEndian>(self.dl_type)?;
        stream.write_u8(self.nw_tos)?;
        stream.write_u8(self.nw_proto)?;
        write_padding(stream, 2)?;
        stream.write_u32::<NetworkEndian>(self.nw_src.into())?;
        stream.write_u32::<NetworkEndian>(self.nw_dst.into())?;
        stream.write_u16::<NetworkEndian>(self.tp_src)?;
        stream.write_u16::<NetworkEndian>(self.tp_dst)
    }
}

impl Serialize for PhyPort {
    fn serialized_size(&self) -> usize {
        48
    }

    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u16::<NetworkEndian>(self.port_no)?;
        stream.write_all(&self.hw_addr.octets())?;
        write_fixed_string(stream, &self.name, OFP_MAX_PORT_NAME_LEN)?;
        stream.write_u32::<NetworkEndian>(self.config)?;
        stream.write_u32::<NetworkEndian>(self.state)?;
        stream.write_u32::<NetworkEndian>(self.curr)?;
        stream.write_u32::<NetworkEndian>(self.advertised)?;
        stream.write_u32::<NetworkEndian>(self.supported)?;
        stream.write_u32::<NetworkEndian>(self.peer)
    }
}

impl Serialize for SwitchFeatures {
    fn serialized_size(&self) -> usize {
        24 + 48 * self.ports.len()
    }

    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u64::<NetworkEndian>(self.datapath_id)?;
        stream.write_u32::<NetworkEndian>(self.n_buffers)?;
        stream.write_u8(self.n_tables)?;
        write_padding(stream, 3)?;
        stream.write_u32::<NetworkEndian>(self.capabilities)?;
        stream.write_u32::<NetworkEndian>(self.actions)?;
        for port in &self.ports {
            port.serialize(stream)?;
        }
        Ok(())
    }
}

impl Serialize for SwitchConfig {
    fn serialized_size(&self) -> usize {
        4
    }

    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u16::<NetworkEndian>(self.flags)?;
        stream.write_u16::<NetworkEndian>(self.miss_send_len)
    }
}

impl Serialize for OfpFlowMod {
    fn serialized_size(&self) -> usize {
        64 + self.actions.serialized_size()
    }

    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        self.match_fields.serialize(stream)?;
        stream.write_u64::<NetworkEndian>(self.cookie)?;
        stream.write_u16::<NetworkEndian>(self.command as u16)?;
        stream.write_u16::<NetworkEndian>(self.idle_timeout)?;
        stream.write_u16::<NetworkEndian>(self.hard_timeout)?;
        stream.write_u16::<NetworkEndian>(self.priority)?;
        stream.write_u32::<NetworkEndian>(self.buffer_id)?;
        stream.write_u16::<NetworkEndian>(self.out_port)?;
        stream.write_u16::<NetworkEndian>(self.flags)?;
        self.actions.serialize_all(stream)
    }
}

impl Serialize for OfpFlowRemoved {
    fn serialized_size(&self) -> usize {
        80
    }

    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        self.match_fields.serialize(stream)?;
        stream.write_u64::<NetworkEndian>(self.cookie)?;
        stream.write_u16::<NetworkEndian>(self.priority)?;
        stream.write_u8(self.reason as u8)?;
        write_padding(stream, 1)?;
        stream.write_u32::<NetworkEndian>(self.duration_sec)?;
        stream.write_u32::<NetworkEndian>(self.duration_nsec)?;
        stream.write_u16::<NetworkEndian>(self.idle_timeout)?;
        write_padding(stream, 2)?;
        stream.write_u64::<NetworkEndian>(self.packet_count)?;
        stream.write_u64::<NetworkEndian>(self.byte_count)
    }
}

impl Serialize for OfpPacketIn {
    fn serialized_size(&self) -> usize {
        10 + self.data.len()
    }

    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u32::<NetworkEndian>(self.buffer_id)?;
        stream.write_u16::<NetworkEndian>(self.total_len)?;
        stream.write_u16::<NetworkEndian>(self.in_port)?;
        stream.write_u8(self.reason as u8)?;
        write_padding(stream, 1)?;
        stream.write_all(&self.data)
    }
}

impl Serialize for OfpPortStatus {
    fn serialized_size(&self) -> usize {
        56
    }

    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u8(self.reason as u8)?;
        write_padding(stream, 7)?;
        self.desc.serialize(stream)
    }
}

impl Serialize for OfpPacketOut {
    fn serialized_size(&self) -> usize {
        8 + self.actions.serialized_size() + self.data.len()
    }

    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u32::<NetworkEndian>(self.buffer_id)?;
        stream.write_u16::<NetworkEndian>(self.in_port)?;
        stream.write_u16::<NetworkEndian>(self.actions.serialized_size() as u16)?;
        self.actions.serialize_all(stream)?;
        stream.write_all(&self.data)
    }
}

impl Serialize for OfpPortMod {
    fn serialized_size(&self) -> usize {
        24
    }

    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u16::<NetworkEndian>(self.port_no)?;
        stream.write_all(&self.hw_addr.octets())?;
        stream.write_u32::<NetworkEndian>(self.config)?;
        stream.write_u32::<NetworkEndian>(self.mask)?;
        stream.write_u32::<NetworkEndian>(self.advertise)?;
        write_padding(stream, 4)
    }
}

impl Serialize for OfpErrorMsg {
    fn serialized_size(&self) -> usize {
        4 + self.data.len()
    }

    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u16::<NetworkEndian>(self.typ)?;
        stream.write_u16::<NetworkEndian>(self.code)?;
        stream.write_all(&self.data)
    }
}

impl Serialize for OfpFlowStatsRequest {
    fn serialized_size(&self) -> usize {
        44
    }

    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        self.match_fields.serialize(stream)?;
        stream.write_u8(self.table_id)?;
        write_padding(stream, 1)?;
        stream.write_u16::<NetworkEndian>(self.out_port)
    }
}

impl OfpStatsRequestBody {
    pub fn typ(&self) -> OfpStatsType {
        match *self {
            OfpStatsRequestBody::Desc => OfpStatsType::Desc,
            OfpStatsRequestBody::Flow(_) => OfpStatsType::Flow,
            OfpStatsRequestBody::Aggregate(_) => OfpStatsType::Aggregate,
            OfpStatsRequestBody::Table => OfpStatsType::Table,
            OfpStatsRequestBody::Port { .. } => OfpStatsType::Port,
            OfpStatsRequestBody::Queue { .. } => OfpStatsType::Queue,
            OfpStatsRequestBody::Vendor { .. } => OfpStatsType::Vendor,
        }
    }
}

impl Serialize for OfpStatsRequest {
    fn serialized_size(&self) -> usize {
        4 + match self.body {
            OfpStatsRequestBody::Desc | OfpStatsRequestBody::Table => 0,
            OfpStatsRequestBody::Flow(ref r) | OfpStatsRequestBody::Aggregate(ref r) => {
                r.serialized_size()
            }
            OfpStatsRequestBody::Port { .. } | OfpStatsRequestBody::Queue { .. } => 8,
            OfpStatsRequestBody::Vendor { ref body, .. } => 4 + body.len(),
        }
    }

    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u16::<NetworkEndian>(self.body.typ() as u16)?;
        stream.write_u16::<NetworkEndian>(self.flags)?;
        match self.body {
            OfpStatsRequestBody::Desc | OfpStatsRequestBody::Table => Ok(()),
            OfpStatsRequestBody::Flow(ref r) | OfpStatsRequestBody::Aggregate(ref r) => {
                r.serialize(stream)
            }
            OfpStatsRequestBody::Port { port_no } => {
                stream.write_u16::<NetworkEndian>(port_no)?;
                write_padding(stream, 6)
            }
            OfpStatsRequestBody::Queue { port_no, queue_id } => {
                stream.write_u16::<NetworkEndian>(port_no)?;
                write_padding(stream, 2)?;
                stream.write_u32::<NetworkEndian>(queue_id)
            }
            OfpStatsRequestBody::Vendor { vendor, ref body } => {
                stream.write_u32::<NetworkEndian>(vendor)?;
                stream.write_all(body)
            }
        }
    }
}

impl Serialize for OfpDescStats {
    fn serialized_size(&self) -> usize {
        4 * DESC_STR_LEN + SERIAL_NUM_LEN
    }

    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        write_fixed_string(stream, &self.mfr_desc, DESC_STR_LEN)?;
        write_fixed_string(stream, &self.hw_desc, DESC_STR_LEN)?;
        write_fixed_string(stream, &self.sw_desc, DESC_STR_LEN)?;
        write_fixed_string(stream, &self.serial_num, SERIAL_NUM_LEN)?;
        write_fixed_string(stream, &self.dp_desc, DESC_STR_LEN)
    }
}

impl Serialize for OfpFlowStats {
    fn serialized_size(&self) -> usize {
        88 + self.actions.serialized_size()
    }

    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u16::<NetworkEndian>(self.serialized_size() as u16)?;
        stream.write_u8(self.table_id)?;
        write_padding(stream, 1)?;
        self.match_fields.serialize(stream)?;
        stream.write_u32::<NetworkEndian>(self.duration_sec)?;
        stream.write_u32::<NetworkEndian>(self.duration_nsec)?;
        stream.write_u16::<NetworkEndian>(self.priority)?;
        stream.write_u16::<NetworkEndian>(self.idle_timeout)?;
        stream.write_u16::<NetworkEndian>(self.hard_timeout)?;
        write_padding(stream, 6)?;
        stream.write_u64::<NetworkEndian>(self.cookie)?;
        stream.write_u64::<NetworkEndian>(self.packet_count)?;
        stream.write_u64::<NetworkEndian>(self.byte_count)?;
        self.actions.serialize_all(stream)
    }
}

impl Serialize for OfpAggregateStats {
    fn serialized_size(&self) -> usize {
        24
    }

    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u64::<NetworkEndian>(self.packet_count)?;
        stream.write_u64::<NetworkEndian>(self.byte_count)?;
        stream.write_u32::<NetworkEndian>(self.flow_count)?;
        write_padding(stream, 4)
    }
}

impl Serialize for OfpTableStats {
    fn serialized_size(&self) -> usize {
        64
    }

    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u8(self.table_id)?;
        write_padding(stream, 3)?;
        write_fixed_string(stream, &self.name, OFP_MAX_TABLE_NAME_LEN)?;
        stream.write_u32::<NetworkEndian>(self.wildcards)?;
        stream.write_u32::<NetworkEndian>(self.max_entries)?;
        stream.write_u32::<NetworkEndian>(self.active_count)?;
        stream.write_u64::<NetworkEndian>(self.lookup_count)?;
        stream.write_u64::<NetworkEndian>(self.matched_count)
    }
}

impl Serialize for OfpPortStats {
    fn serialized_size(&self) -> usize {
        104
    }

    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u16::<NetworkEndian>(self.port_no)?;
        write_padding(stream, 6)?;
        for counter in &[
            self.rx_packets,
            self.tx_packets,
            self.rx_bytes,
            self.tx_bytes,
            self.rx_dropped,
            self.tx_dropped,
            self.rx_errors,
            self.tx_errors,
            self.rx_frame_err,
            self.rx_over_err,
            self.rx_crc_err,
            self.collisions,
        ] {
            stream.write_u64::<NetworkEndian>(*counter)?;
        }
        Ok(())
    }
}

impl Serialize for OfpQueueStats {
    fn serialized_size(&self) -> usize {
        32
    }

    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u16::<NetworkEndian>(self.port_no)?;
        write_padding(stream, 2)?;
        stream.write_u32::<NetworkEndian>(self.queue_id)?;
        stream.write_u64::<NetworkEndian>(self.tx_bytes)?;
        stream.write_u64::<NetworkEndian>(self.tx_packets)?;
        stream.write_u64::<NetworkEndian>(self.tx_errors)
    }
}

fn sum_sizes<T: Serialize>(parts: &[T]) -> usize {
    parts.iter().map(|p| p.serialized_size()).sum()
}

fn serialize_all<T: Serialize, S: Write>(parts: &[T], stream: &mut S) -> io::Result<()> {
    for part in parts {
        part.serialize(stream)?;
    }
    Ok(())
}

impl OfpStatsReplyBody {
    pub fn typ(&self) -> OfpStatsType {
        match *self {
            OfpStatsReplyBody::Desc(_) => OfpStatsType::Desc,
            OfpStatsReplyBody::Flow(_) => OfpStatsType::Flow,
            OfpStatsReplyBody::Aggregate(_) => OfpStatsType::Aggregate,
            OfpStatsReplyBody::Table(_) => OfpStatsType::Table,
            OfpStatsReplyBody::Port(_) => OfpStatsType::Port,
            OfpStatsReplyBody::Queue(_) => OfpStatsType::Queue,
            OfpStatsReplyBody::Vendor { .. } => OfpStatsType::Vendor,
        }
    }
}

impl Serialize for OfpStatsReply {
    fn serialized_size(&self) -> usize {
        4 + match self.body {
            OfpStatsReplyBody::Desc(ref d) => d.serialized_size(),
            OfpStatsReplyBody::Flow(ref f) => sum_sizes(f),
            OfpStatsReplyBody::Aggregate(ref a) => a.serialized_size(),
            OfpStatsReplyBody::Table(ref t) => sum_sizes(t),
            OfpStatsReplyBody::Port(ref p) => sum_sizes(p),
            OfpStatsReplyBody::Queue(ref q) => sum_sizes(q),
            OfpStatsReplyBody::Vendor { ref body, .. } => 4 + body.len(),
        }
    }

    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u16::<NetworkEndian>(self.body.typ() as u16)?;
        stream.write_u16::<NetworkEndian>(self.flags)?;
        match self.body {
            OfpStatsReplyBody::Desc(ref d) => d.serialize(stream),
            OfpStatsReplyBody::Flow(ref f) => serialize_all(f, stream),
            OfpStatsReplyBody::Aggregate(ref a) => a.serialize(stream),
            OfpStatsReplyBody::Table(ref t) => serialize_all(t, stream),
            OfpStatsReplyBody::Port(ref p) => serialize_all(p, stream),
            OfpStatsReplyBody::Queue(ref q) => serialize_all(q, stream),
            OfpStatsReplyBody::Vendor { vendor, ref body } => {
                stream.write_u32::<NetworkEndian>(vendor)?;
                stream.write_all(body)
            }
        }
    }
}

impl Message {
    fn body_length(&self) -> usize {
        match *self {
            Message::Hello
            | Message::FeaturesRequest
            | Message::GetConfigRequest
            | Message::BarrierRequest
            | Message::BarrierReply => 0,
            Message::EchoRequest(ref data) | Message::EchoReply(ref data) => data.len(),
            Message::Error(ref b) => b.serialized_size(),
            Message::FeaturesReply(ref b) => b.serialized_size(),
            Message::GetConfigReply(ref b) | Message::SetConfig(ref b) => b.serialized_size(),
            Message::PacketIn(ref b) => b.serialized_size(),
            Message::FlowRemoved(ref b) => b.serialized_size(),
            Message::PortStatus(ref b) => b.serialized_size(),
            Message::PacketOut(ref b) => b.serialized_size(),
            Message::FlowMod(ref b) => b.serialized_size(),
            Message::PortMod(ref b) => b.serialized_size(),
            Message::StatsRequest(ref b) => b.serialized_size(),
            Message::StatsReply(ref b) => b.serialized_size(),
        }
    }

    /// The length advertised in the header, header included
    pub fn serialized_size(&self) -> usize {
        OfpHeader::header_length() + self.body_length()
    }

    /// Constructs the header this message is sent with
    pub fn header(&self, xid: u32) -> OfpHeader {
        OfpHeader::new(self.typ(), self.serialized_size(), xid)
    }

    /// Serializes this message with network byte order.
    /// The xid is used as its header's transaction id.
    /// Messages that do not fit the 16 bit length field are refused before
    /// anything is written.
    pub fn serialize<S: Write>(&self, stream: &mut S, xid: u32) -> io::Result<()> {
        let size = self.serialized_size();
        if size > OFP_MAX_MESSAGE_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{:?} of {} bytes exceeds the length field", self.typ(), size),
            ));
        }
        self.header(xid).serialize(stream)?;
        match *self {
            Message::Hello
            | Message::FeaturesRequest
            | Message::GetConfigRequest
            | Message::BarrierRequest
            | Message::BarrierReply => Ok(()),
            Message::EchoRequest(ref data) | Message::EchoReply(ref data) => stream.write_all(data),
            Message::Error(ref b) => b.serialize(stream),
            Message::FeaturesReply(ref b) => b.serialize(stream),
            Message::GetConfigReply(ref b) | Message::SetConfig(ref b) => b.serialize(stream),
            Message::PacketIn(ref b) => b.serialize(stream),
            Message::FlowRemoved(ref b) => b.serialize(stream),
            Message::PortStatus(ref b) => b.serialize(stream),
            Message::PacketOut(ref b) => b.serialize(stream),
            Message::FlowMod(ref b) => b.serialize(stream),
            Message::PortMod(ref b) => b.serialize(stream),
            Message::StatsRequest(ref b) => b.serialize(stream),
            Message::StatsReply(ref b) => b.serialize(stream),
        }
    }

    /// Serializes into a fresh buffer
    pub fn marshal(&self, xid: u32) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.serialized_size());
        self.serialize(&mut buf, xid)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openflow::actions::{Action, ActionList};
    use packet::MacAddr;
    use std::net::Ipv4Addr;

    #[test]
    fn hello_header() {
        assert_eq!(vec![1, 0, 0, 8, 0, 0, 0, 42], Message::Hello.marshal(42).unwrap());
    }

    #[test]
    fn echo_reply_body_serialization() {
        let testee = Message::EchoReply(vec![1, 2, 3, 4]);
        let ser = testee.marshal(0x01020304).unwrap();
        assert_eq!(vec![1, 3, 0, 12, 1, 2, 3, 4, 1, 2, 3, 4], ser);
        assert_eq!(12, testee.header(1).length());
    }

    #[test]
    fn refuses_messages_beyond_length_field() {
        let fits = Message::EchoRequest(vec![0; OFP_MAX_MESSAGE_LEN - 8]);
        assert_eq!(OFP_MAX_MESSAGE_LEN, fits.marshal(1).unwrap().len());

        let mut buf = vec![];
        let too_long = Message::EchoRequest(vec![0; OFP_MAX_MESSAGE_LEN - 7]);
        let err = too_long.serialize(&mut buf, 1).unwrap_err();
        assert_eq!(io::ErrorKind::InvalidData, err.kind());
        assert!(buf.is_empty());
    }

    #[test]
    fn match_serialization() {
        let testee = OfpMatch::match_all()
            .in_port(1)
            .dl_type(0x0800)
            .nw_dst(Ipv4Addr::new(10, 0, 0, 2));
        let mut ser = vec![];
        testee.serialize(&mut ser).unwrap();
        assert_eq!(40, ser.len());
        assert_eq!(&[0x00, 0x30, 0x3f, 0xee], &ser[0..4]);
        assert_eq!(&[0, 1], &ser[4..6]);
        assert_eq!(&[0x08, 0x00], &ser[22..24]);
        assert_eq!(&[10, 0, 0, 2], &ser[32..36]);
    }

    #[test]
    fn fixed_strings_are_truncated() {
        let mut ser = vec![];
        write_fixed_string(&mut ser, "abcdefghijklmnopqrstuvwxyz", 16).unwrap();
        assert_eq!(16, ser.len());
        assert_eq!(b"abcdefghijklmno\0", &ser[..]);
    }

    #[test]
    fn flow_mod_sizes() {
        let actions = ActionList::from(vec![
            Action::SetDlSrc(MacAddr::BROADCAST),
            Action::output(PseudoPort::Physical(2)),
        ]);
        let flow_mod = OfpFlowMod::new(
            OfpFlowModCommand::Add,
            OfpMatch::match_all(),
            OFP_DEFAULT_PRIORITY,
            actions,
        );
        let msg = Message::FlowMod(flow_mod);
        assert_eq!(8 + 64 + 24, msg.serialized_size());
        let ser = msg.marshal(7).unwrap();
        assert_eq!(msg.serialized_size(), ser.len());
        assert_eq!(&[0, 96], &ser[2..4]);
        // command, idle, hard, priority
        assert_eq!(&[0, 0, 0, 0, 0, 0, 0x80, 0], &ser[56..64]);
        assert_eq!(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff], &ser[64..70]);
    }

    #[test]
    fn packet_out_advertises_actions_len() {
        let out = OfpPacketOut {
            buffer_id: OFP_NO_BUFFER,
            in_port: OFPP_NONE,
            actions: ActionList::from(vec![Action::output(PseudoPort::Table)]),
            data: vec![0xaa; 60],
        };
        let ser = Message::PacketOut(out).marshal(1).unwrap();
        assert_eq!(8 + 8 + 8 + 60, ser.len());
        assert_eq!(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0, 8], &ser[8..16]);
        assert_eq!(&[0, 0, 0, 8, 0xff, 0xf9, 0, 0], &ser[16..24]);
    }

    #[test]
    fn stats_sizes() {
        let desc = OfpStatsReply {
            flags: 0,
            body: OfpStatsReplyBody::Desc(OfpDescStats {
                mfr_desc: "mfr".to_owned(),
                hw_desc: "hw".to_owned(),
                sw_desc: "sw".to_owned(),
                serial_num: "1".to_owned(),
                dp_desc: "dp".to_owned(),
            }),
        };
        assert_eq!(4 + 1056, desc.serialized_size());
        let port = OfpStatsReply {
            flags: 0,
            body: OfpStatsReplyBody::Port(vec![OfpPortStats::default(); 2]),
        };
        assert_eq!(4 + 208, port.serialized_size());
        let mut ser = vec![];
        port.serialize(&mut ser).unwrap();
        assert_eq!(port.serialized_size(), ser.len());
        let req = OfpStatsRequest {
            flags: 0,
            body: OfpStatsRequestBody::Flow(OfpFlowStatsRequest {
                match_fields: OfpMatch::match_all(),
                table_id: OFPTT_ALL,
                out_port: OFPP_NONE,
            }),
        };
        assert_eq!(48, req.serialized_size());
    }
}
