use controller::{ConnId, SyncId};
use openflow::error::Error;
use openflow::messages::*;
use openflow::{gen_xid, MessageBuffer, Outbox};
use packet::MacAddr;

use std::collections::{BTreeMap, HashMap, HashSet};

/// Handshake progress of a switch connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchState {
    /// Accepted, nothing sent yet
    Connecting,
    /// Our Hello is out, waiting for it to come back
    HelloSent,
    /// Waiting for the features reply
    FeaturesRequested,
    /// Chassis id known and registered in the topology
    Operational,
    Closed,
}

/// What a switch connection reports to the controller core
#[derive(Debug, Clone, PartialEq)]
pub enum SwitchEvent {
    /// The handshake completed
    Operational(SwitchFeatures),
    PacketIn(OfpPacketIn),
    /// A barrier belonging to a sync round was answered
    BarrierReply(SyncId),
    PortStatus(OfpPortStatus),
    FlowRemoved(OfpFlowRemoved),
    StatsReply(OfpStatsReply),
    Error(OfpErrorMsg),
}

/// The controller side proxy of one switch connection
#[derive(Debug)]
pub struct OfSwitch {
    conn: ConnId,
    state: SwitchState,
    hello_xid: u32,
    features_xid: u32,
    miss_send_len: u16,
    chassis_id: Option<MacAddr>,
    ports: BTreeMap<u16, PhyPort>,
    /// Ports the controller must not flood to
    no_flood: HashSet<u16>,
    barriers: HashMap<u32, SyncId>,
    rx: MessageBuffer,
    outbox: Outbox,
}

impl OfSwitch {
    pub fn new(conn: ConnId, miss_send_len: u16) -> OfSwitch {
        OfSwitch {
            conn,
            state: SwitchState::Connecting,
            hello_xid: 0,
            features_xid: 0,
            miss_send_len,
            chassis_id: None,
            ports: BTreeMap::new(),
            no_flood: HashSet::new(),
            barriers: HashMap::new(),
            rx: MessageBuffer::new(),
            outbox: Outbox::new(),
        }
    }

    pub fn conn(&self) -> ConnId {
        self.conn
    }

    pub fn state(&self) -> SwitchState {
        self.state
    }

    pub fn is_operational(&self) -> bool {
        self.state == SwitchState::Operational
    }

    /// Known once the switch is operational
    pub fn chassis_id(&self) -> Option<MacAddr> {
        self.chassis_id
    }

    pub fn ports(&self) -> Vec<&PhyPort> {
        self.ports.values().collect()
    }

    pub fn port(&self, port_no: u16) -> Option<&PhyPort> {
        self.ports.get(&port_no)
    }

    pub fn flood_enabled(&self, port_no: u16) -> bool {
        !self.no_flood.contains(&port_no)
    }

    /// Returns true if the flag changed
    pub fn set_flood(&mut self, port_no: u16, enabled: bool) -> bool {
        if enabled {
            self.no_flood.remove(&port_no)
        }
        else {
            self.no_flood.insert(port_no)
        }
    }

    /// Opens the handshake by sending a Hello
    pub fn connect(&mut self) {
        self.hello_xid = gen_xid();
        let xid = self.hello_xid;
        self.outbox.push(&Message::Hello, xid);
        self.state = SwitchState::HelloSent;
    }

    pub fn close(&mut self) {
        info!("Closing connection {:?}", self.conn);
        self.state = SwitchState::Closed;
        self.barriers.clear();
    }

    /// Queues a message with a fresh transaction id and returns the id
    pub fn send(&mut self, message: &Message) -> u32 {
        let xid = gen_xid();
        self.outbox.push(message, xid);
        xid
    }

    /// Sends a barrier request answering to the sync round `sync`
    pub fn send_barrier(&mut self, sync: SyncId) {
        let xid = self.send(&Message::BarrierRequest);
        self.barriers.insert(xid, sync);
    }

    pub fn has_pending_barriers(&self) -> bool {
        !self.barriers.is_empty()
    }

    pub fn poll_output(&mut self) -> Option<Vec<u8>> {
        self.outbox.pop()
    }

    pub fn drain_output(&mut self) -> Vec<Vec<u8>> {
        self.outbox.drain()
    }

    /// Consumes bytes from the switch. Returns what the controller core
    /// has to act on, in the order the messages arrived.
    pub fn receive(&mut self, bytes: &[u8]) -> Vec<SwitchEvent> {
        let mut events = vec![];
        if self.state == SwitchState::Closed {
            warn!("Ignoring {} bytes on closed connection {:?}", bytes.len(), self.conn);
            return events;
        }
        self.rx.extend(bytes);
        while let Some(frame) = self.rx.next_frame() {
            let header = match OfpHeader::peek(&frame) {
                Some(header) => header,
                None => continue,
            };
            debug!("Incoming message on {:?}: {:?}", self.conn, header);
            match Message::deserialize(&frame) {
                Ok((xid, message, _)) => {
                    if let Some(event) = self.handle_message(&header, xid, message) {
                        events.push(event);
                    }
                }
                Err(e) => {
                    warn!("Malformed message of type {} from {:?}: {}", header.typ(), self.conn, e);
                    let error = OfpErrorMsg::new(&e, &frame);
                    self.outbox.push(&Message::Error(error), header.xid());
                }
            }
            if self.state == SwitchState::Closed {
                break;
            }
        }
        events
    }

    fn handle_message(&mut self, header: &OfpHeader, xid: u32, message: Message) -> Option<SwitchEvent> {
        trace!("Incoming message body: {:?}", message);
        match message {
            Message::Hello => {
                if header.version() < OFP_VERSION {
                    error!(
                        "The switch on {:?} supports only OpenFlow protocol version {:x}",
                        self.conn,
                        header.version()
                    );
                    let error = OfpErrorMsg::new(&Error::HelloFailed, &[]);
                    self.outbox.push(&Message::Error(error), xid);
                    self.close();
                }
                else if self.state == SwitchState::HelloSent && xid == self.hello_xid {
                    // our own Hello came back
                    self.features_xid = self.send(&Message::FeaturesRequest);
                    self.state = SwitchState::FeaturesRequested;
                }
                else {
                    self.outbox.push(&Message::Hello, xid);
                }
                None
            }
            Message::EchoRequest(data) => {
                self.outbox.push(&Message::EchoReply(data), xid);
                None
            }
            Message::EchoReply(_) => None,
            Message::FeaturesReply(features) => {
                if xid != self.features_xid || self.chassis_id.is_some() {
                    warn!("Ignoring unsolicited features reply {} on {:?}", xid, self.conn);
                    return None;
                }
                let chassis_id = MacAddr::from_u64(features.datapath_id);
                info!(
                    "The switch on {:?} identified itself with datapath id {:016x}",
                    self.conn, features.datapath_id
                );
                self.chassis_id = Some(chassis_id);
                self.ports = features.ports.iter().map(|p| (p.port_no, p.clone())).collect();
                self.state = SwitchState::Operational;
                let config = SwitchConfig {
                    flags: OFPC_FRAG_NORMAL,
                    miss_send_len: self.miss_send_len,
                };
                self.send(&Message::SetConfig(config));
                Some(SwitchEvent::Operational(features))
            }
            Message::Error(error) => {
                if error.check_table_full() {
                    error!("The flow table of {:?} is full: {}", self.conn, error);
                }
                else {
                    warn!("{:?} reported {}", self.conn, error);
                    debug!("Full error message: {:?}", error);
                }
                Some(SwitchEvent::Error(error))
            }
            other => {
                if self.state != SwitchState::Operational {
                    warn!(
                        "Ignoring {:?} message on {:?} in state {:?}",
                        other.typ(),
                        self.conn,
                        self.state
                    );
                    return None;
                }
                self.handle_operational(xid, other)
            }
        }
    }

    fn handle_operational(&mut self, xid: u32, message: Message) -> Option<SwitchEvent> {
        match message {
            Message::PacketIn(packet_in) => Some(SwitchEvent::PacketIn(packet_in)),
            Message::BarrierReply => match self.barriers.remove(&xid) {
                Some(sync) => Some(SwitchEvent::BarrierReply(sync)),
                None => {
                    debug!("Barrier reply {} is not part of a sync round", xid);
                    None
                }
            },
            Message::PortStatus(status) => {
                info!(
                    "Port {} of {:?}: {:?}",
                    status.desc.port_no, self.conn, status.reason
                );
                match status.reason {
                    OfpPortReason::Delete => {
                        self.ports.remove(&status.desc.port_no);
                        self.no_flood.remove(&status.desc.port_no);
                    }
                    OfpPortReason::Add | OfpPortReason::Modify => {
                        self.ports.insert(status.desc.port_no, status.desc.clone());
                    }
                }
                Some(SwitchEvent::PortStatus(status))
            }
            Message::FlowRemoved(removed) => {
                debug!(
                    "Flow {:?} removed from {:?}: {:?}",
                    removed.match_fields, self.conn, removed.reason
                );
                Some(SwitchEvent::FlowRemoved(removed))
            }
            Message::StatsReply(reply) => Some(SwitchEvent::StatsReply(reply)),
            Message::GetConfigReply(config) => {
                debug!("{:?} runs with {:?}", self.conn, config);
                None
            }
            other => {
                warn!("Ignoring unexpected {:?} message on {:?}", other.typ(), self.conn);
                None
            }
        }
    }
}
