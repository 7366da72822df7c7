/*!
All deserialization routines for the OpenFlow message primitives

The header uses a special deserialization because its size is known.
Use the trait `Deserialize` for message bodies. Parts that only occur inside
a body (match, port description, stats entries) are read from a cursor.
*/

use byteorder::{ByteOrder, NetworkEndian, ReadBytesExt};
use openflow::actions::ActionList;
use openflow::error::{Error, Result};
use openflow::messages::*;
use packet::MacAddr;

use std::io;
use std::io::{Cursor, Read};
use std::net::Ipv4Addr;

impl OfpHeader {
    /// Deserializes an OpenFlow header
    pub fn deserialize(bytes: &[u8; 8]) -> OfpHeader {
        OfpHeader {
            version: bytes[0],
            typ: bytes[1],
            length: NetworkEndian::read_u16(&bytes[2..4]),
            xid: NetworkEndian::read_u32(&bytes[4..]),
        }
    }

    /// Deserializes the header at the front of `bytes`, `None` if there are
    /// fewer than 8 bytes
    pub fn peek(bytes: &[u8]) -> Option<OfpHeader> {
        if bytes.len() < OfpHeader::header_length() {
            return None;
        }
        let mut hbuf = [0; 8];
        hbuf.copy_from_slice(&bytes[..8]);
        Some(OfpHeader::deserialize(&hbuf))
    }
}

/// To be implemented by all OpenFlow message bodies that are received.
pub trait Deserialize {
    /// The type to deserialize
    type R;

    /// Deserialize the bytes buffer
    /// Fails on providing a too small or too large buffer
    fn deserialize(bytes: &[u8]) -> Result<Self::R> {
        if Self::min_length() > bytes.len() || Self::max_length() < bytes.len() {
            return Err(Error::BadRequest(OfpBadRequestCode::BadLen));
        }
        Self::deserialize_len_ok(bytes)
    }

    /// Deserializes the byte buffer (network byte order)
    /// Implementers can rely on the bytes buffer's size to be greater or equal Self::min_length()
    fn deserialize_len_ok(bytes: &[u8]) -> Result<Self::R>;

    /// The minimum length of the message body in bytes
    fn min_length() -> usize;

    /// The maximum length of the message body in bytes
    /// May not return a value greater than 0xFFF7
    /// If Self::R is fixed size, you probably have to
    /// override this implementation.
    fn max_length() -> usize {
        0xffff - OfpHeader::header_length()
    }
}

fn read_mac<R: Read>(r: &mut R) -> io::Result<MacAddr> {
    let mut mac = [0; 6];
    r.read_exact(&mut mac)?;
    Ok(MacAddr(mac))
}

fn read_ipv4<R: Read>(r: &mut R) -> io::Result<Ipv4Addr> {
    Ok(Ipv4Addr::from(r.read_u32::<NetworkEndian>()?))
}

fn skip<R: Read>(r: &mut R, n: usize) -> io::Result<()> {
    let mut pad = vec![0; n];
    r.read_exact(&mut pad)
}

/// Reads a null-terminated string from a field of `width` bytes
fn read_fixed_string<R: Read>(r: &mut R, width: usize) -> io::Result<String> {
    let mut buf = vec![0; width];
    r.read_exact(&mut buf)?;
    let end = buf.iter().position(|&b| b == 0).unwrap_or(width);
    Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
}

fn remaining(cursor: &Cursor<&[u8]>) -> usize {
    cursor.get_ref().len() - cursor.position() as usize
}

impl OfpMatch {
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<OfpMatch> {
        let wildcards = r.read_u32::<NetworkEndian>()?;
        let in_port = r.read_u16::<NetworkEndian>()?;
        let dl_src = read_mac(r)?;
        let dl_dst = read_mac(r)?;
        let dl_vlan = r.read_u16::<NetworkEndian>()?;
        let dl_vlan_pcp = r.read_u8()?;
        skip(r, 1)?;
        let dl_type = r.read_u16::<NetworkEndian>()?;
        let nw_tos = r.read_u8()?;
        let nw_proto = r.read_u8()?;
        skip(r, 2)?;
        Ok(OfpMatch {
            wildcards,
            in_port,
            dl_src,
            dl_dst,
            dl_vlan,
            dl_vlan_pcp,
            dl_type,
            nw_tos,
            nw_proto,
            nw_src: read_ipv4(r)?,
            nw_dst: read_ipv4(r)?,
            tp_src: r.read_u16::<NetworkEndian>()?,
            tp_dst: r.read_u16::<NetworkEndian>()?,
        })
    }
}

impl PhyPort {
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<PhyPort> {
        Ok(PhyPort {
            port_no: r.read_u16::<NetworkEndian>()?,
            hw_addr: read_mac(r)?,
            name: read_fixed_string(r, OFP_MAX_PORT_NAME_LEN)?,
            config: r.read_u32::<NetworkEndian>()?,
            state: r.read_u32::<NetworkEndian>()?,
            curr: r.read_u32::<NetworkEndian>()?,
            advertised: r.read_u32::<NetworkEndian>()?,
            supported: r.read_u32::<NetworkEndian>()?,
            peer: r.read_u32::<NetworkEndian>()?,
        })
    }
}

impl Deserialize for OfpErrorMsg {
    type R = OfpErrorMsg;

    fn deserialize_len_ok(bytes: &[u8]) -> Result<Self::R> {
        let typ = NetworkEndian::read_u16(&bytes[0..2]);
        let code = NetworkEndian::read_u16(&bytes[2..4]);
        Ok(OfpErrorMsg {
            typ,
            code,
            data: bytes[4..].to_vec(),
        })
    }

    fn min_length() -> usize {
        4
    }
}

impl Deserialize for SwitchFeatures {
    type R = SwitchFeatures;

    fn deserialize_len_ok(bytes: &[u8]) -> Result<Self::R> {
        if (bytes.len() - 24) % 48 != 0 {
            return Err(Error::BadRequest(OfpBadRequestCode::BadLen));
        }
        let mut c = Cursor::new(bytes);
        let datapath_id = c.read_u64::<NetworkEndian>()?;
        let n_buffers = c.read_u32::<NetworkEndian>()?;
        let n_tables = c.read_u8()?;
        skip(&mut c, 3)?;
        let capabilities = c.read_u32::<NetworkEndian>()?;
        let actions = c.read_u32::<NetworkEndian>()?;
        let mut ports = vec![];
        while remaining(&c) > 0 {
            ports.push(PhyPort::read_from(&mut c)?);
        }
        Ok(SwitchFeatures {
            datapath_id,
            n_buffers,
            n_tables,
            capabilities,
            actions,
            ports,
        })
    }

    fn min_length() -> usize {
        24
    }
}

impl Deserialize for SwitchConfig {
    type R = SwitchConfig;

    fn deserialize_len_ok(bytes: &[u8]) -> Result<Self::R> {
        Ok(SwitchConfig {
            flags: NetworkEndian::read_u16(&bytes[0..2]),
            miss_send_len: NetworkEndian::read_u16(&bytes[2..4]),
        })
    }

    fn min_length() -> usize {
        4
    }

    fn max_length() -> usize {
        4
    }
}

impl Deserialize for OfpPacketIn {
    type R = OfpPacketIn;

    fn deserialize_len_ok(bytes: &[u8]) -> Result<Self::R> {
        let reason = match bytes[8] {
            0 => OfpPacketInReason::NoMatch,
            1 => OfpPacketInReason::Action,
            _ => return Err(Error::BadRequest(OfpBadRequestCode::BadType)),
        };
        Ok(OfpPacketIn {
            buffer_id: NetworkEndian::read_u32(&bytes[0..4]),
            total_len: NetworkEndian::read_u16(&bytes[4..6]),
            in_port: NetworkEndian::read_u16(&bytes[6..8]),
            reason,
            data: bytes[10..].to_vec(),
        })
    }

    fn min_length() -> usize {
        10
    }
}

impl Deserialize for OfpFlowRemoved {
    type R = OfpFlowRemoved;

    fn deserialize_len_ok(bytes: &[u8]) -> Result<Self::R> {
        let mut c = Cursor::new(bytes);
        let match_fields = OfpMatch::read_from(&mut c)?;
        let cookie = c.read_u64::<NetworkEndian>()?;
        let priority = c.read_u16::<NetworkEndian>()?;
        let reason = OfpFlowRemovedReason::from_u8(c.read_u8()?)
            .ok_or(Error::BadRequest(OfpBadRequestCode::BadType))?;
        skip(&mut c, 1)?;
        let duration_sec = c.read_u32::<NetworkEndian>()?;
        let duration_nsec = c.read_u32::<NetworkEndian>()?;
        let idle_timeout = c.read_u16::<NetworkEndian>()?;
        skip(&mut c, 2)?;
        Ok(OfpFlowRemoved {
            match_fields,
            cookie,
            priority,
            reason,
            duration_sec,
            duration_nsec,
            idle_timeout,
            packet_count: c.read_u64::<NetworkEndian>()?,
            byte_count: c.read_u64::<NetworkEndian>()?,
        })
    }

    fn min_length() -> usize {
        80
    }

    fn max_length() -> usize {
        80
    }
}

impl Deserialize for OfpPortStatus {
    type R = OfpPortStatus;

    fn deserialize_len_ok(bytes: &[u8]) -> Result<Self::R> {
        let reason = match bytes[0] {
            0 => OfpPortReason::Add,
            1 => OfpPortReason::Delete,
            2 => OfpPortReason::Modify,
            _ => return Err(Error::BadRequest(OfpBadRequestCode::BadType)),
        };
        let mut c = Cursor::new(&bytes[8..]);
        Ok(OfpPortStatus {
            reason,
            desc: PhyPort::read_from(&mut c)?,
        })
    }

    fn min_length() -> usize {
        56
    }

    fn max_length() -> usize {
        56
    }
}

impl Deserialize for OfpPacketOut {
    type R = OfpPacketOut;

    fn deserialize_len_ok(bytes: &[u8]) -> Result<Self::R> {
        let actions_len = NetworkEndian::read_u16(&bytes[6..8]) as usize;
        if 8 + actions_len > bytes.len() {
            return Err(Error::BadRequest(OfpBadRequestCode::BadLen));
        }
        Ok(OfpPacketOut {
            buffer_id: NetworkEndian::read_u32(&bytes[0..4]),
            in_port: NetworkEndian::read_u16(&bytes[4..6]),
            actions: ActionList::deserialize_all(&bytes[8..], actions_len)?,
            data: bytes[8 + actions_len..].to_vec(),
        })
    }

    fn min_length() -> usize {
        8
    }
}

impl Deserialize for OfpFlowMod {
    type R = OfpFlowMod;

    fn deserialize_len_ok(bytes: &[u8]) -> Result<Self::R> {
        let mut c = Cursor::new(bytes);
        let match_fields = OfpMatch::read_from(&mut c)?;
        let cookie = c.read_u64::<NetworkEndian>()?;
        let command = OfpFlowModCommand::from_u16(c.read_u16::<NetworkEndian>()?)
            .ok_or(Error::FlowModFailed(OfpFlowModFailedCode::BadCommand))?;
        Ok(OfpFlowMod {
            match_fields,
            cookie,
            command,
            idle_timeout: c.read_u16::<NetworkEndian>()?,
            hard_timeout: c.read_u16::<NetworkEndian>()?,
            priority: c.read_u16::<NetworkEndian>()?,
            buffer_id: c.read_u32::<NetworkEndian>()?,
            out_port: c.read_u16::<NetworkEndian>()?,
            flags: c.read_u16::<NetworkEndian>()?,
            actions: ActionList::deserialize_all(&bytes[64..], bytes.len() - 64)?,
        })
    }

    fn min_length() -> usize {
        64
    }
}

impl Deserialize for OfpPortMod {
    type R = OfpPortMod;

    fn deserialize_len_ok(bytes: &[u8]) -> Result<Self::R> {
        let mut c = Cursor::new(bytes);
        Ok(OfpPortMod {
            port_no: c.read_u16::<NetworkEndian>()?,
            hw_addr: read_mac(&mut c)?,
            config: c.read_u32::<NetworkEndian>()?,
            mask: c.read_u32::<NetworkEndian>()?,
            advertise: c.read_u32::<NetworkEndian>()?,
        })
    }

    fn min_length() -> usize {
        24
    }

    fn max_length() -> usize {
        24
    }
}

impl OfpFlowStatsRequest {
    fn read_from<R: Read>(r: &mut R) -> io::Result<OfpFlowStatsRequest> {
        let match_fields = OfpMatch::read_from(r)?;
        let table_id = r.read_u8()?;
        skip(r, 1)?;
        Ok(OfpFlowStatsRequest {
            match_fields,
            table_id,
            out_port: r.read_u16::<NetworkEndian>()?,
        })
    }
}

impl Deserialize for OfpStatsRequest {
    type R = OfpStatsRequest;

    fn deserialize_len_ok(bytes: &[u8]) -> Result<Self::R> {
        let typ = NetworkEndian::read_u16(&bytes[0..2]);
        let flags = NetworkEndian::read_u16(&bytes[2..4]);
        let mut c = Cursor::new(&bytes[4..]);
        let body = match typ {
            t if t == OfpStatsType::Desc as u16 => OfpStatsRequestBody::Desc,
            t if t == OfpStatsType::Flow as u16 => {
                OfpStatsRequestBody::Flow(OfpFlowStatsRequest::read_from(&mut c)?)
            }
            t if t == OfpStatsType::Aggregate as u16 => {
                OfpStatsRequestBody::Aggregate(OfpFlowStatsRequest::read_from(&mut c)?)
            }
            t if t == OfpStatsType::Table as u16 => OfpStatsRequestBody::Table,
            t if t == OfpStatsType::Port as u16 => {
                let port_no = c.read_u16::<NetworkEndian>()?;
                skip(&mut c, 6)?;
                OfpStatsRequestBody::Port { port_no }
            }
            t if t == OfpStatsType::Queue as u16 => {
                let port_no = c.read_u16::<NetworkEndian>()?;
                skip(&mut c, 2)?;
                OfpStatsRequestBody::Queue {
                    port_no,
                    queue_id: c.read_u32::<NetworkEndian>()?,
                }
            }
            t if t == OfpStatsType::Vendor as u16 => OfpStatsRequestBody::Vendor {
                vendor: c.read_u32::<NetworkEndian>()?,
                body: bytes[8..].to_vec(),
            },
            _ => return Err(Error::BadRequest(OfpBadRequestCode::BadStat)),
        };
        Ok(OfpStatsRequest { flags, body })
    }

    fn min_length() -> usize {
        4
    }
}

impl OfpFlowStats {
    /// Reads one variable length entry, the first two bytes being its length
    fn deserialize_entry(bytes: &[u8]) -> Result<(OfpFlowStats, usize)> {
        if bytes.len() < 88 {
            return Err(Error::BadRequest(OfpBadRequestCode::BadLen));
        }
        let length = NetworkEndian::read_u16(&bytes[0..2]) as usize;
        if length < 88 || length > bytes.len() {
            return Err(Error::BadRequest(OfpBadRequestCode::BadLen));
        }
        let mut c = Cursor::new(&bytes[2..88]);
        let table_id = c.read_u8()?;
        skip(&mut c, 1)?;
        let match_fields = OfpMatch::read_from(&mut c)?;
        let duration_sec = c.read_u32::<NetworkEndian>()?;
        let duration_nsec = c.read_u32::<NetworkEndian>()?;
        let priority = c.read_u16::<NetworkEndian>()?;
        let idle_timeout = c.read_u16::<NetworkEndian>()?;
        let hard_timeout = c.read_u16::<NetworkEndian>()?;
        skip(&mut c, 6)?;
        let stats = OfpFlowStats {
            table_id,
            match_fields,
            duration_sec,
            duration_nsec,
            priority,
            idle_timeout,
            hard_timeout,
            cookie: c.read_u64::<NetworkEndian>()?,
            packet_count: c.read_u64::<NetworkEndian>()?,
            byte_count: c.read_u64::<NetworkEndian>()?,
            actions: ActionList::deserialize_all(&bytes[88..length], length - 88)?,
        };
        Ok((stats, length))
    }
}

fn read_desc(c: &mut Cursor<&[u8]>) -> io::Result<OfpDescStats> {
    Ok(OfpDescStats {
        mfr_desc: read_fixed_string(c, DESC_STR_LEN)?,
        hw_desc: read_fixed_string(c, DESC_STR_LEN)?,
        sw_desc: read_fixed_string(c, DESC_STR_LEN)?,
        serial_num: read_fixed_string(c, SERIAL_NUM_LEN)?,
        dp_desc: read_fixed_string(c, DESC_STR_LEN)?,
    })
}

fn read_table_stats(c: &mut Cursor<&[u8]>) -> io::Result<OfpTableStats> {
    let table_id = c.read_u8()?;
    skip(c, 3)?;
    Ok(OfpTableStats {
        table_id,
        name: read_fixed_string(c, OFP_MAX_TABLE_NAME_LEN)?,
        wildcards: c.read_u32::<NetworkEndian>()?,
        max_entries: c.read_u32::<NetworkEndian>()?,
        active_count: c.read_u32::<NetworkEndian>()?,
        lookup_count: c.read_u64::<NetworkEndian>()?,
        matched_count: c.read_u64::<NetworkEndian>()?,
    })
}

fn read_port_stats(c: &mut Cursor<&[u8]>) -> io::Result<OfpPortStats> {
    let port_no = c.read_u16::<NetworkEndian>()?;
    skip(c, 6)?;
    Ok(OfpPortStats {
        port_no,
        rx_packets: c.read_u64::<NetworkEndian>()?,
        tx_packets: c.read_u64::<NetworkEndian>()?,
        rx_bytes: c.read_u64::<NetworkEndian>()?,
        tx_bytes: c.read_u64::<NetworkEndian>()?,
        rx_dropped: c.read_u64::<NetworkEndian>()?,
        tx_dropped: c.read_u64::<NetworkEndian>()?,
        rx_errors: c.read_u64::<NetworkEndian>()?,
        tx_errors: c.read_u64::<NetworkEndian>()?,
        rx_frame_err: c.read_u64::<NetworkEndian>()?,
        rx_over_err: c.read_u64::<NetworkEndian>()?,
        rx_crc_err: c.read_u64::<NetworkEndian>()?,
        collisions: c.read_u64::<NetworkEndian>()?,
    })
}

fn read_queue_stats(c: &mut Cursor<&[u8]>) -> io::Result<OfpQueueStats> {
    let port_no = c.read_u16::<NetworkEndian>()?;
    skip(c, 2)?;
    Ok(OfpQueueStats {
        port_no,
        queue_id: c.read_u32::<NetworkEndian>()?,
        tx_bytes: c.read_u64::<NetworkEndian>()?,
        tx_packets: c.read_u64::<NetworkEndian>()?,
        tx_errors: c.read_u64::<NetworkEndian>()?,
    })
}

/// Reads fixed size entries until the cursor is exhausted
fn read_entries<T, F>(c: &mut Cursor<&[u8]>, size: usize, read: F) -> Result<Vec<T>>
where
    F: Fn(&mut Cursor<&[u8]>) -> io::Result<T>,
{
    if remaining(c) % size != 0 {
        return Err(Error::BadRequest(OfpBadRequestCode::BadLen));
    }
    let mut entries = vec![];
    while remaining(c) > 0 {
        entries.push(read(c)?);
    }
    Ok(entries)
}

impl Deserialize for OfpStatsReply {
    type R = OfpStatsReply;

    fn deserialize_len_ok(bytes: &[u8]) -> Result<Self::R> {
        let typ = NetworkEndian::read_u16(&bytes[0..2]);
        let flags = NetworkEndian::read_u16(&bytes[2..4]);
        let rest = &bytes[4..];
        let mut c = Cursor::new(rest);
        let body = match typ {
            t if t == OfpStatsType::Desc as u16 => OfpStatsReplyBody::Desc(read_desc(&mut c)?),
            t if t == OfpStatsType::Flow as u16 => {
                let mut flows = vec![];
                let mut consumed = 0;
                while consumed < rest.len() {
                    let (stats, len) = OfpFlowStats::deserialize_entry(&rest[consumed..])?;
                    flows.push(stats);
                    consumed += len;
                }
                OfpStatsReplyBody::Flow(flows)
            }
            t if t == OfpStatsType::Aggregate as u16 => {
                let packet_count = c.read_u64::<NetworkEndian>()?;
                let byte_count = c.read_u64::<NetworkEndian>()?;
                let flow_count = c.read_u32::<NetworkEndian>()?;
                skip(&mut c, 4)?;
                OfpStatsReplyBody::Aggregate(OfpAggregateStats {
                    packet_count,
                    byte_count,
                    flow_count,
                })
            }
            t if t == OfpStatsType::Table as u16 => {
                OfpStatsReplyBody::Table(read_entries(&mut c, 64, read_table_stats)?)
            }
            t if t == OfpStatsType::Port as u16 => {
                OfpStatsReplyBody::Port(read_entries(&mut c, 104, read_port_stats)?)
            }
            t if t == OfpStatsType::Queue as u16 => {
                OfpStatsReplyBody::Queue(read_entries(&mut c, 32, read_queue_stats)?)
            }
            t if t == OfpStatsType::Vendor as u16 => OfpStatsReplyBody::Vendor {
                vendor: c.read_u32::<NetworkEndian>()?,
                body: bytes[8..].to_vec(),
            },
            _ => return Err(Error::BadRequest(OfpBadRequestCode::BadStat)),
        };
        Ok(OfpStatsReply { flags, body })
    }

    fn min_length() -> usize {
        4
    }
}

impl Message {
    /// Deserializes the message at the front of `bytes`.
    /// Returns its transaction id, the message and the number of bytes consumed.
    /// Fails with `Error::Incomplete` if the buffer ends before the message does.
    pub fn deserialize(bytes: &[u8]) -> Result<(u32, Message, usize)> {
        let header = match OfpHeader::peek(bytes) {
            Some(header) => header,
            None => {
                return Err(Error::Incomplete(OfpHeader::header_length() - bytes.len()));
            }
        };
        let length = header.length();
        if length < OfpHeader::header_length() {
            return Err(Error::BadRequest(OfpBadRequestCode::BadLen));
        }
        if bytes.len() < length {
            return Err(Error::Incomplete(length - bytes.len()));
        }
        let body = &bytes[OfpHeader::header_length()..length];
        let message = Message::deserialize_body(&header, body)?;
        Ok((header.xid(), message, length))
    }

    /// Deserializes the body of a message with the given header
    pub fn deserialize_body(header: &OfpHeader, body: &[u8]) -> Result<Message> {
        let typ = match OfpType::from_u8(header.typ()) {
            Some(typ) => typ,
            None => return Err(Error::BadRequest(OfpBadRequestCode::BadType)),
        };
        // Hello elements of newer versions are ignored
        if typ == OfpType::Hello {
            return Ok(Message::Hello);
        }
        if header.version() != OFP_VERSION {
            return Err(Error::BadRequest(OfpBadRequestCode::BadVersion));
        }
        let msg = match typ {
            OfpType::Hello => Message::Hello,
            OfpType::Error => Message::Error(OfpErrorMsg::deserialize(body)?),
            OfpType::EchoRequest => Message::EchoRequest(body.to_vec()),
            OfpType::EchoReply => Message::EchoReply(body.to_vec()),
            OfpType::Vendor => return Err(Error::BadRequest(OfpBadRequestCode::BadVendor)),
            OfpType::FeaturesRequest => Message::FeaturesRequest,
            OfpType::FeaturesReply => Message::FeaturesReply(SwitchFeatures::deserialize(body)?),
            OfpType::GetConfigRequest => Message::GetConfigRequest,
            OfpType::GetConfigReply => Message::GetConfigReply(SwitchConfig::deserialize(body)?),
            OfpType::SetConfig => Message::SetConfig(SwitchConfig::deserialize(body)?),
            OfpType::PacketIn => Message::PacketIn(OfpPacketIn::deserialize(body)?),
            OfpType::FlowRemoved => Message::FlowRemoved(OfpFlowRemoved::deserialize(body)?),
            OfpType::PortStatus => Message::PortStatus(OfpPortStatus::deserialize(body)?),
            OfpType::PacketOut => Message::PacketOut(OfpPacketOut::deserialize(body)?),
            OfpType::FlowMod => Message::FlowMod(OfpFlowMod::deserialize(body)?),
            OfpType::PortMod => Message::PortMod(OfpPortMod::deserialize(body)?),
            OfpType::StatsRequest => Message::StatsRequest(OfpStatsRequest::deserialize(body)?),
            OfpType::StatsReply => Message::StatsReply(OfpStatsReply::deserialize(body)?),
            OfpType::BarrierRequest => Message::BarrierRequest,
            OfpType::BarrierReply => Message::BarrierReply,
            OfpType::QueueGetConfigRequest | OfpType::QueueGetConfigReply => {
                return Err(Error::BadRequest(OfpBadRequestCode::BadType));
            }
        };
        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openflow::actions::Action;

    fn sample_match() -> OfpMatch {
        OfpMatch {
            wildcards: OFPFW_NW_TOS | (32 << OFPFW_NW_SRC_SHIFT),
            in_port: 0xff00,
            dl_src: MacAddr::BROADCAST,
            dl_dst: MacAddr([0, 1, 2, 3, 4, 5]),
            dl_vlan: 0xffff,
            dl_vlan_pcp: 7,
            dl_type: 0x0806,
            nw_tos: 0,
            nw_proto: 0xff,
            nw_src: Ipv4Addr::new(0, 0, 0, 0),
            nw_dst: Ipv4Addr::new(255, 255, 255, 255),
            tp_src: 0,
            tp_dst: 0xffff,
        }
    }

    fn sample_port(no: u16) -> PhyPort {
        let mut port = PhyPort::new(no, MacAddr([2, 0, 0, 0, 0, no as u8]), "eth-port");
        port.config = OFPPC_NO_FLOOD;
        port.state = OFPPS_LINK_DOWN;
        port
    }

    fn assert_wire_stable(msg: Message) {
        let bytes = msg.marshal(0xffff_ffff).unwrap();
        assert_eq!(msg.serialized_size(), bytes.len());
        let (xid, parsed, consumed) = Message::deserialize(&bytes).unwrap();
        assert_eq!(0xffff_ffff, xid);
        assert_eq!(bytes.len(), consumed);
        assert_eq!(msg, parsed);
    }

    #[test]
    fn header_deserialization() {
        let bytes = [1, 14, 0x52, 0x34, 0x12, 0x34, 0x56, 0x78];
        let header = OfpHeader::deserialize(&bytes);
        assert_eq!(1, header.version());
        assert_eq!(OfpType::FlowMod as u8, header.typ());
        assert_eq!(0x5234, header.length());
        assert_eq!(0x12345678, header.xid());
    }

    #[test]
    fn min_lengths() {
        assert_eq!(24, SwitchFeatures::min_length());
        assert_eq!(4, OfpErrorMsg::min_length());
        assert_eq!(64, OfpFlowMod::min_length());
        assert_eq!(80, OfpFlowRemoved::max_length());
        assert_eq!(0xFFF7, OfpErrorMsg::max_length());
    }

    #[test]
    fn every_message_survives_the_wire() {
        let actions = ActionList::from(vec![
            Action::SetVlanVid(10),
            Action::output(PseudoPort::Physical(OFPP_MAX)),
        ]);
        let messages = vec![
            Message::Hello,
            Message::Error(OfpErrorMsg {
                typ: 1,
                code: 6,
                data: vec![1, 0, 0, 8, 0, 0, 0, 0],
            }),
            Message::EchoRequest(vec![]),
            Message::EchoReply(vec![9; 3]),
            Message::FeaturesRequest,
            Message::FeaturesReply(SwitchFeatures {
                datapath_id: 0xffff_0000_0000_0001,
                n_buffers: 256,
                n_tables: 1,
                capabilities: OFPC_FLOW_STATS | OFPC_PORT_STATS,
                actions: 0xfff,
                ports: vec![sample_port(1), sample_port(2)],
            }),
            Message::GetConfigRequest,
            Message::GetConfigReply(SwitchConfig::default()),
            Message::SetConfig(SwitchConfig {
                flags: 0,
                miss_send_len: 0xffff,
            }),
            Message::PacketIn(OfpPacketIn {
                buffer_id: OFP_NO_BUFFER,
                total_len: 64,
                in_port: 3,
                reason: OfpPacketInReason::Action,
                data: vec![0xab; 64],
            }),
            Message::FlowRemoved(OfpFlowRemoved {
                match_fields: sample_match(),
                cookie: u64::max_value(),
                priority: 0,
                reason: OfpFlowRemovedReason::Delete,
                duration_sec: u32::max_value(),
                duration_nsec: 999_999_999,
                idle_timeout: 0xffff,
                packet_count: 0,
                byte_count: u64::max_value(),
            }),
            Message::PortStatus(OfpPortStatus {
                reason: OfpPortReason::Modify,
                desc: sample_port(7),
            }),
            Message::PacketOut(OfpPacketOut {
                buffer_id: 12,
                in_port: OFPP_CONTROLLER,
                actions: actions.clone(),
                data: vec![],
            }),
            Message::FlowMod(OfpFlowMod {
                match_fields: sample_match(),
                cookie: 1,
                command: OfpFlowModCommand::DeleteStrict,
                idle_timeout: 10,
                hard_timeout: 30,
                priority: 0xffff,
                buffer_id: 0,
                out_port: 2,
                flags: OFPFF_SEND_FLOW_REM | OFPFF_CHECK_OVERLAP,
                actions: actions.clone(),
            }),
            Message::PortMod(OfpPortMod {
                port_no: 1,
                hw_addr: MacAddr([2, 0, 0, 0, 0, 1]),
                config: OFPPC_NO_FLOOD,
                mask: OFPPC_NO_FLOOD,
                advertise: 0,
            }),
            Message::StatsRequest(OfpStatsRequest {
                flags: 0,
                body: OfpStatsRequestBody::Aggregate(OfpFlowStatsRequest {
                    match_fields: OfpMatch::match_all(),
                    table_id: OFPTT_ALL,
                    out_port: OFPP_NONE,
                }),
            }),
            Message::StatsRequest(OfpStatsRequest {
                flags: 0,
                body: OfpStatsRequestBody::Queue {
                    port_no: OFPP_ALL,
                    queue_id: 0xffff_ffff,
                },
            }),
            Message::StatsReply(OfpStatsReply {
                flags: OFPSF_REPLY_MORE,
                body: OfpStatsReplyBody::Flow(vec![
                    OfpFlowStats {
                        table_id: 0,
                        match_fields: sample_match(),
                        duration_sec: 1,
                        duration_nsec: 2,
                        priority: 3,
                        idle_timeout: 4,
                        hard_timeout: 5,
                        cookie: 6,
                        packet_count: 7,
                        byte_count: 8,
                        actions: actions.clone(),
                    },
                    OfpFlowStats {
                        table_id: 0,
                        match_fields: OfpMatch::match_all(),
                        duration_sec: 0,
                        duration_nsec: 0,
                        priority: 0,
                        idle_timeout: 0,
                        hard_timeout: 0,
                        cookie: 0,
                        packet_count: 0,
                        byte_count: 0,
                        actions: ActionList::new(),
                    },
                ]),
            }),
            Message::StatsReply(OfpStatsReply {
                flags: 0,
                body: OfpStatsReplyBody::Table(vec![OfpTableStats {
                    table_id: 0,
                    name: "classifier".to_owned(),
                    wildcards: OFPFW_ALL,
                    max_entries: 1024,
                    active_count: 3,
                    lookup_count: 100,
                    matched_count: 90,
                }]),
            }),
            Message::StatsReply(OfpStatsReply {
                flags: 0,
                body: OfpStatsReplyBody::Aggregate(OfpAggregateStats {
                    packet_count: 1,
                    byte_count: 2,
                    flow_count: 3,
                }),
            }),
            Message::BarrierRequest,
            Message::BarrierReply,
        ];
        for msg in messages {
            assert_wire_stable(msg);
        }
    }

    #[test]
    fn incomplete_messages_report_missing_bytes() {
        let bytes = Message::EchoRequest(vec![1, 2, 3, 4]).marshal(1).unwrap();
        match Message::deserialize(&bytes[..5]) {
            Err(Error::Incomplete(3)) => {}
            other => panic!("unexpected {:?}", other),
        }
        match Message::deserialize(&bytes[..10]) {
            Err(Error::Incomplete(2)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn trailing_bytes_are_not_consumed() {
        let mut bytes = Message::BarrierRequest.marshal(5).unwrap();
        bytes.extend_from_slice(&Message::Hello.marshal(6).unwrap());
        let (xid, msg, consumed) = Message::deserialize(&bytes).unwrap();
        assert_eq!((5, Message::BarrierRequest, 8), (xid, msg, consumed));
    }

    #[test]
    fn protocol_violations() {
        let mut bytes = Message::FeaturesRequest.marshal(1).unwrap();
        bytes[0] = 4;
        match Message::deserialize(&bytes) {
            Err(Error::BadRequest(OfpBadRequestCode::BadVersion)) => {}
            other => panic!("unexpected {:?}", other),
        }
        bytes[0] = 1;
        bytes[1] = 99;
        match Message::deserialize(&bytes) {
            Err(Error::BadRequest(OfpBadRequestCode::BadType)) => {}
            other => panic!("unexpected {:?}", other),
        }
        let features = Message::FeaturesReply(SwitchFeatures {
            datapath_id: 1,
            n_buffers: 0,
            n_tables: 1,
            capabilities: 0,
            actions: 0,
            ports: vec![],
        });
        let mut bytes = features.marshal(1).unwrap();
        bytes.extend_from_slice(&[0; 8]);
        bytes[3] += 8;
        match Message::deserialize(&bytes) {
            Err(Error::BadRequest(OfpBadRequestCode::BadLen)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn newer_hello_is_accepted() {
        let mut bytes = Message::Hello.marshal(3).unwrap();
        bytes[0] = 4;
        let (_, msg, _) = Message::deserialize(&bytes).unwrap();
        assert_eq!(Message::Hello, msg);
    }
}
