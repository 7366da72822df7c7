/*!
OpenFlow 1.0 actions

An `ActionList` is the ordered action sequence carried by flow mods, packet
outs and flow stats. Every action is a multiple of 8 bytes long on the wire.
*/

use byteorder::{ByteOrder, NetworkEndian, WriteBytesExt};
use openflow::error::{Error, Result};
use openflow::messages::PseudoPort;
use openflow::messages::OfpBadActionCode;
use openflow::messages::serialize::{write_padding, Serialize};
use packet::MacAddr;

use std::io;
use std::io::Write;
use std::net::Ipv4Addr;
use std::slice;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfpActionType {
    /// Output to switch port.
    Output = 0,
    /// Set the 802.1q VLAN id.
    SetVlanVid = 1,
    /// Set the 802.1q priority.
    SetVlanPcp = 2,
    /// Strip the 802.1q header.
    StripVlan = 3,
    /// Ethernet source address.
    SetDlSrc = 4,
    /// Ethernet destination address.
    SetDlDst = 5,
    /// IP source address.
    SetNwSrc = 6,
    /// IP destination address.
    SetNwDst = 7,
    /// IP ToS (DSCP field, 6 bits).
    SetNwTos = 8,
    /// TCP/UDP source port.
    SetTpSrc = 9,
    /// TCP/UDP destination port.
    SetTpDst = 10,
    /// Output to queue.
    Enqueue = 11,
    Vendor = 0xffff,
}

impl OfpActionType {
    pub fn from_u16(typ: u16) -> Option<OfpActionType> {
        let t = match typ {
            0 => OfpActionType::Output,
            1 => OfpActionType::SetVlanVid,
            2 => OfpActionType::SetVlanPcp,
            3 => OfpActionType::StripVlan,
            4 => OfpActionType::SetDlSrc,
            5 => OfpActionType::SetDlDst,
            6 => OfpActionType::SetNwSrc,
            7 => OfpActionType::SetNwDst,
            8 => OfpActionType::SetNwTos,
            9 => OfpActionType::SetTpSrc,
            10 => OfpActionType::SetTpDst,
            11 => OfpActionType::Enqueue,
            0xffff => OfpActionType::Vendor,
            _ => return None,
        };
        Some(t)
    }

    /// Fixed wire size of the action, `None` for the variable sized vendor action
    fn fixed_length(&self) -> Option<usize> {
        match *self {
            OfpActionType::SetDlSrc | OfpActionType::SetDlDst | OfpActionType::Enqueue => Some(16),
            OfpActionType::Vendor => None,
            _ => Some(8),
        }
    }
}

/// A single forwarding action
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// `max_len` is the number of bytes to send to the controller, 0 means all.
    Output { port: PseudoPort, max_len: u16 },
    SetVlanVid(u16),
    SetVlanPcp(u8),
    StripVlan,
    SetDlSrc(MacAddr),
    SetDlDst(MacAddr),
    SetNwSrc(Ipv4Addr),
    SetNwDst(Ipv4Addr),
    SetNwTos(u8),
    SetTpSrc(u16),
    SetTpDst(u16),
    Enqueue { port: u16, queue_id: u32 },
    /// `body` is padded to a multiple of 8 bytes when serialized.
    Vendor { vendor: u32, body: Vec<u8> },
}

impl Action {
    /// Output to a port without truncation
    pub fn output(port: PseudoPort) -> Action {
        Action::Output { port, max_len: 0 }
    }

    pub fn typ(&self) -> OfpActionType {
        match *self {
            Action::Output { .. } => OfpActionType::Output,
            Action::SetVlanVid(_) => OfpActionType::SetVlanVid,
            Action::SetVlanPcp(_) => OfpActionType::SetVlanPcp,
            Action::StripVlan => OfpActionType::StripVlan,
            Action::SetDlSrc(_) => OfpActionType::SetDlSrc,
            Action::SetDlDst(_) => OfpActionType::SetDlDst,
            Action::SetNwSrc(_) => OfpActionType::SetNwSrc,
            Action::SetNwDst(_) => OfpActionType::SetNwDst,
            Action::SetNwTos(_) => OfpActionType::SetNwTos,
            Action::SetTpSrc(_) => OfpActionType::SetTpSrc,
            Action::SetTpDst(_) => OfpActionType::SetTpDst,
            Action::Enqueue { .. } => OfpActionType::Enqueue,
            Action::Vendor { .. } => OfpActionType::Vendor,
        }
    }

    /// Deserializes one action from the front of `bytes`.
    /// Returns the action and the number of bytes it occupied.
    fn deserialize(bytes: &[u8]) -> Result<(Action, usize)> {
        if bytes.len() < 8 {
            return Err(Error::BadAction(OfpBadActionCode::BadLen));
        }
        let raw_type = NetworkEndian::read_u16(&bytes[0..2]);
        let len = NetworkEndian::read_u16(&bytes[2..4]) as usize;
        let typ = OfpActionType::from_u16(raw_type)
            .ok_or(Error::BadAction(OfpBadActionCode::BadType))?;
        let len_ok = match typ.fixed_length() {
            Some(fixed) => len == fixed,
            None => len >= 8 && len % 8 == 0,
        };
        if !len_ok || len > bytes.len() {
            return Err(Error::BadAction(OfpBadActionCode::BadLen));
        }
        let b = &bytes[..len];
        let action = match typ {
            OfpActionType::Output => Action::Output {
                port: PseudoPort::from(NetworkEndian::read_u16(&b[4..6])),
                max_len: NetworkEndian::read_u16(&b[6..8]),
            },
            OfpActionType::SetVlanVid => Action::SetVlanVid(NetworkEndian::read_u16(&b[4..6])),
            OfpActionType::SetVlanPcp => Action::SetVlanPcp(b[4]),
            OfpActionType::StripVlan => Action::StripVlan,
            OfpActionType::SetDlSrc => Action::SetDlSrc(mac_at(&b[4..10])),
            OfpActionType::SetDlDst => Action::SetDlDst(mac_at(&b[4..10])),
            OfpActionType::SetNwSrc => {
                Action::SetNwSrc(Ipv4Addr::from(NetworkEndian::read_u32(&b[4..8])))
            }
            OfpActionType::SetNwDst => {
                Action::SetNwDst(Ipv4Addr::from(NetworkEndian::read_u32(&b[4..8])))
            }
            OfpActionType::SetNwTos => Action::SetNwTos(b[4]),
            OfpActionType::SetTpSrc => Action::SetTpSrc(NetworkEndian::read_u16(&b[4..6])),
            OfpActionType::SetTpDst => Action::SetTpDst(NetworkEndian::read_u16(&b[4..6])),
            OfpActionType::Enqueue => Action::Enqueue {
                port: NetworkEndian::read_u16(&b[4..6]),
                queue_id: NetworkEndian::read_u32(&b[12..16]),
            },
            OfpActionType::Vendor => Action::Vendor {
                vendor: NetworkEndian::read_u32(&b[4..8]),
                body: b[8..].to_vec(),
            },
        };
        Ok((action, len))
    }
}

fn mac_at(b: &[u8]) -> MacAddr {
    let mut mac = [0; 6];
    mac.copy_from_slice(&b[..6]);
    MacAddr(mac)
}

impl Serialize for Action {
    fn serialized_size(&self) -> usize {
        match *self {
            Action::Vendor { ref body, .. } => 8 + (body.len() + 7) / 8 * 8,
            ref a => a.typ().fixed_length().unwrap_or(8),
        }
    }

    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u16::<NetworkEndian>(self.typ() as u16)?;
        stream.write_u16::<NetworkEndian>(self.serialized_size() as u16)?;
        match *self {
            Action::Output { port, max_len } => {
                stream.write_u16::<NetworkEndian>(port.into())?;
                stream.write_u16::<NetworkEndian>(max_len)
            }
            Action::SetVlanVid(vid) => {
                stream.write_u16::<NetworkEndian>(vid)?;
                write_padding(stream, 2)
            }
            Action::SetVlanPcp(pcp) | Action::SetNwTos(pcp) => {
                stream.write_u8(pcp)?;
                write_padding(stream, 3)
            }
            Action::StripVlan => write_padding(stream, 4),
            Action::SetDlSrc(mac) | Action::SetDlDst(mac) => {
                stream.write_all(&mac.octets())?;
                write_padding(stream, 6)
            }
            Action::SetNwSrc(ip) | Action::SetNwDst(ip) => {
                stream.write_u32::<NetworkEndian>(ip.into())
            }
            Action::SetTpSrc(port) | Action::SetTpDst(port) => {
                stream.write_u16::<NetworkEndian>(port)?;
                write_padding(stream, 2)
            }
            Action::Enqueue { port, queue_id } => {
                stream.write_u16::<NetworkEndian>(port)?;
                write_padding(stream, 6)?;
                stream.write_u32::<NetworkEndian>(queue_id)
            }
            Action::Vendor { vendor, ref body } => {
                stream.write_u32::<NetworkEndian>(vendor)?;
                stream.write_all(body)?;
                write_padding(stream, (body.len() + 7) / 8 * 8 - body.len())
            }
        }
    }
}

/// An ordered list of actions, executed front to back
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActionList {
    actions: Vec<Action>,
}

impl ActionList {
    pub fn new() -> ActionList {
        ActionList { actions: vec![] }
    }

    pub fn append(&mut self, action: Action) -> &mut ActionList {
        self.actions.push(action);
        self
    }

    /// The first action of the given type
    pub fn by_type(&self, typ: OfpActionType) -> Option<&Action> {
        self.actions.iter().find(|a| a.typ() == typ)
    }

    pub fn iter(&self) -> slice::Iter<Action> {
        self.actions.iter()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Checks whether any output action sends packets to `port`.
    /// This is how flow mod deletes and flow stats filter by `out_port`.
    pub fn outputs_to(&self, port: u16) -> bool {
        self.actions.iter().any(|a| match *a {
            Action::Output { port: p, .. } => u16::from(p) == port,
            Action::Enqueue { port: p, .. } => p == port,
            _ => false,
        })
    }

    pub fn serialize_all<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        for action in &self.actions {
            action.serialize(stream)?;
        }
        Ok(())
    }

    /// Decodes actions from `bytes` until `total_len` bytes are consumed.
    pub fn deserialize_all(bytes: &[u8], total_len: usize) -> Result<ActionList> {
        if total_len > bytes.len() {
            return Err(Error::BadAction(OfpBadActionCode::BadLen));
        }
        let mut list = ActionList::new();
        let mut consumed = 0;
        while consumed < total_len {
            let (action, len) = Action::deserialize(&bytes[consumed..total_len])?;
            list.actions.push(action);
            consumed += len;
        }
        Ok(list)
    }
}

impl Serialize for ActionList {
    fn serialized_size(&self) -> usize {
        self.actions.iter().map(|a| a.serialized_size()).sum()
    }

    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        self.serialize_all(stream)
    }
}

impl From<Vec<Action>> for ActionList {
    fn from(actions: Vec<Action>) -> Self {
        ActionList { actions }
    }
}

impl<'a> IntoIterator for &'a ActionList {
    type Item = &'a Action;
    type IntoIter = slice::Iter<'a, Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.iter()
    }
}
