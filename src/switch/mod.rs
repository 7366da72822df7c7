/*!
The switch side of an OpenFlow 1.0 control channel.

`OpenflowClient` terminates the channel on a real flow table: it answers the
handshake, materializes flow mods, runs received frames through the table and
turns misses and to-controller actions into packet-in messages. It does no
I/O itself. Control channel bytes go in through `receive` and come out through
`poll_output`, data plane frames go in through `receive_frame` and come out
through `poll_transmit`. Time is driven by `tick`.
*/

pub mod buffers;
pub mod flow_table;

use openflow::actions::{Action, ActionList};
use openflow::error::{Error, Result};
use openflow::messages::serialize::Serialize;
use openflow::messages::*;
use openflow::{gen_xid, MessageBuffer, Outbox};
use packet::{rewrite_ipv4, Ethernet, Ipv4Field, MacAddr, VlanTag, ETH_TYPE_IPV4};
use sched::Scheduler;
use switch::buffers::PacketBuffers;
use switch::flow_table::{extract_key, FlowTable};

use std::cmp;
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

/// Period of the flow expiry and port state sweep
pub const SWEEP_INTERVAL_SECS: u64 = 1;

pub const DEFAULT_MAX_FLOWS: usize = 1024;
pub const DEFAULT_N_BUFFERS: usize = 256;

/// Every action type up to and including Enqueue
const SUPPORTED_ACTIONS: u32 = (1 << 12) - 1;

/// Room left for stats bodies in a single reply
const MAX_STATS_BODY: usize = OFP_MAX_MESSAGE_LEN - 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SwitchTimer {
    Sweep,
}

#[derive(Debug)]
struct SwitchPort {
    desc: PhyPort,
    stats: OfpPortStats,
    /// Port state as last announced to the controller
    reported_state: u32,
}

impl SwitchPort {
    fn new(desc: PhyPort) -> SwitchPort {
        let stats = OfpPortStats {
            port_no: desc.port_no,
            ..Default::default()
        };
        let reported_state = desc.state;
        SwitchPort {
            desc,
            stats,
            reported_state,
        }
    }

    fn forwards(&self) -> bool {
        self.desc.config & (OFPPC_PORT_DOWN | OFPPC_NO_FWD) == 0 && !self.desc.is_link_down()
    }

    fn receives(&self) -> bool {
        self.desc.config & (OFPPC_PORT_DOWN | OFPPC_NO_RECV) == 0 && !self.desc.is_link_down()
    }
}

/// Applies `edit` to the parsed frame. Frames that do not parse stay as they are.
fn edit_frame<F: FnOnce(&mut Ethernet)>(frame: &mut Vec<u8>, edit: F) {
    if let Some(mut eth) = Ethernet::parse(frame) {
        edit(&mut eth);
        *frame = eth.to_bytes();
    }
}

fn edit_ipv4(frame: &mut Vec<u8>, field: Ipv4Field) {
    edit_frame(frame, |eth| {
        if eth.ether_type == ETH_TYPE_IPV4 {
            rewrite_ipv4(&mut eth.payload, field);
        }
    });
}

/// An OpenFlow 1.0 datapath with a single flow table
#[derive(Debug)]
pub struct OpenflowClient {
    datapath_id: u64,
    ports: BTreeMap<u16, SwitchPort>,
    config: SwitchConfig,
    table: FlowTable,
    buffers: PacketBuffers,
    desc: OfpDescStats,
    rx: MessageBuffer,
    outbox: Outbox,
    transmit: VecDeque<(u16, Vec<u8>)>,
    timers: Scheduler<SwitchTimer>,
}

impl OpenflowClient {
    pub fn new(datapath_id: u64, ports: Vec<PhyPort>, now: Duration) -> OpenflowClient {
        OpenflowClient::with_limits(datapath_id, ports, DEFAULT_MAX_FLOWS, DEFAULT_N_BUFFERS, now)
    }

    pub fn with_limits(
        datapath_id: u64,
        ports: Vec<PhyPort>,
        max_flows: usize,
        n_buffers: usize,
        now: Duration,
    ) -> OpenflowClient {
        let mut timers = Scheduler::new();
        timers.schedule_after(now, Duration::from_secs(SWEEP_INTERVAL_SECS), SwitchTimer::Sweep);
        OpenflowClient {
            datapath_id,
            ports: ports
                .into_iter()
                .map(|p| (p.port_no, SwitchPort::new(p)))
                .collect(),
            config: SwitchConfig::default(),
            table: FlowTable::new(max_flows),
            buffers: PacketBuffers::new(n_buffers),
            desc: OfpDescStats {
                mfr_desc: "ofroute".to_owned(),
                hw_desc: "software datapath".to_owned(),
                sw_desc: env!("CARGO_PKG_VERSION").to_owned(),
                serial_num: "None".to_owned(),
                dp_desc: format!("datapath {:016x}", datapath_id),
            },
            rx: MessageBuffer::new(),
            outbox: Outbox::new(),
            transmit: VecDeque::new(),
            timers,
        }
    }

    pub fn datapath_id(&self) -> u64 {
        self.datapath_id
    }

    pub fn chassis_id(&self) -> MacAddr {
        MacAddr::from_u64(self.datapath_id)
    }

    pub fn config(&self) -> SwitchConfig {
        self.config
    }

    pub fn flow_table(&self) -> &FlowTable {
        &self.table
    }

    pub fn port(&self, port_no: u16) -> Option<&PhyPort> {
        self.ports.get(&port_no).map(|p| &p.desc)
    }

    pub fn port_stats(&self, port_no: u16) -> Option<&OfpPortStats> {
        self.ports.get(&port_no).map(|p| &p.stats)
    }

    pub fn buffered_packets(&self) -> usize {
        self.buffers.len()
    }

    /// Serialized control messages for the controller
    pub fn poll_output(&mut self) -> Option<Vec<u8>> {
        self.outbox.pop()
    }

    pub fn drain_output(&mut self) -> Vec<Vec<u8>> {
        self.outbox.drain()
    }

    /// Frames leaving the datapath with their egress port
    pub fn poll_transmit(&mut self) -> Option<(u16, Vec<u8>)> {
        self.transmit.pop_front()
    }

    pub fn drain_transmit(&mut self) -> Vec<(u16, Vec<u8>)> {
        self.transmit.drain(..).collect()
    }

    /// The time `tick` should be called next
    pub fn next_timeout(&mut self) -> Option<Duration> {
        self.timers.next_due()
    }

    fn send(&mut self, message: &Message, xid: u32) {
        self.outbox.push(message, xid);
    }

    /// Adds a port and announces it to the controller
    pub fn add_port(&mut self, desc: PhyPort) {
        info!("Adding port {} ({})", desc.port_no, desc.name);
        let status = OfpPortStatus {
            reason: OfpPortReason::Add,
            desc: desc.clone(),
        };
        self.ports.insert(desc.port_no, SwitchPort::new(desc));
        self.send(&Message::PortStatus(status), gen_xid());
    }

    /// Removes a port and announces it to the controller
    pub fn remove_port(&mut self, port_no: u16) -> Option<PhyPort> {
        let port = self.ports.remove(&port_no)?;
        info!("Removing port {}", port_no);
        let status = OfpPortStatus {
            reason: OfpPortReason::Delete,
            desc: port.desc.clone(),
        };
        self.send(&Message::PortStatus(status), gen_xid());
        Some(port.desc)
    }

    /// Changes the link state of a port. The controller learns about it
    /// on the next sweep. Returns false for unknown ports.
    pub fn set_link_state(&mut self, port_no: u16, up: bool) -> bool {
        match self.ports.get_mut(&port_no) {
            Some(port) => {
                if up {
                    port.desc.state &= !OFPPS_LINK_DOWN;
                }
                else {
                    port.desc.state |= OFPPS_LINK_DOWN;
                }
                true
            }
            None => false,
        }
    }

    /// Runs due timers
    pub fn tick(&mut self, now: Duration) {
        while let Some((at, timer)) = self.timers.pop_due(now) {
            match timer {
                SwitchTimer::Sweep => {
                    self.sweep(now);
                    let next = at + Duration::from_secs(SWEEP_INTERVAL_SECS);
                    self.timers.schedule_at(next, SwitchTimer::Sweep);
                }
            }
        }
    }

    fn sweep(&mut self, now: Duration) {
        for (entry, reason) in self.table.expire(now) {
            debug!("Flow {:?} expired: {:?}", entry.match_fields, reason);
            if entry.flags & OFPFF_SEND_FLOW_REM != 0 {
                let removed = entry.to_removed(reason, now);
                self.send(&Message::FlowRemoved(removed), gen_xid());
            }
        }

        let mut changed = vec![];
        for port in self.ports.values_mut() {
            if port.desc.state != port.reported_state {
                port.reported_state = port.desc.state;
                changed.push(port.desc.clone());
            }
        }
        for desc in changed {
            info!(
                "Link on port {} is {}",
                desc.port_no,
                if desc.is_link_down() { "down" } else { "up" }
            );
            let status = OfpPortStatus {
                reason: OfpPortReason::Modify,
                desc,
            };
            self.send(&Message::PortStatus(status), gen_xid());
        }
    }

    /// Consumes bytes from the control channel. Incomplete messages are kept
    /// until the rest arrives.
    pub fn receive(&mut self, bytes: &[u8], now: Duration) {
        self.rx.extend(bytes);
        while let Some(frame) = self.rx.next_frame() {
            self.handle_frame(&frame, now);
        }
    }

    fn handle_frame(&mut self, frame: &[u8], now: Duration) {
        let header = match OfpHeader::peek(frame) {
            Some(header) => header,
            None => return,
        };
        debug!("Incoming message: {:?}", header);
        let result = Message::deserialize(frame)
            .and_then(|(xid, message, _)| self.handle_message(&header, xid, message, now));
        if let Err(e) = result {
            warn!("Rejecting message {} of type {}: {}", header.xid(), header.typ(), e);
            let error = OfpErrorMsg::new(&e, frame);
            self.send(&Message::Error(error), header.xid());
        }
    }

    fn handle_message(
        &mut self,
        header: &OfpHeader,
        xid: u32,
        message: Message,
        now: Duration,
    ) -> Result<()> {
        trace!("Incoming message body: {:?}", message);
        match message {
            Message::Hello => {
                if header.version() < OFP_VERSION {
                    return Err(Error::HelloFailed);
                }
                self.send(&Message::Hello, xid);
            }
            Message::EchoRequest(data) => self.send(&Message::EchoReply(data), xid),
            Message::EchoReply(_) => trace!("Echo reply {}", xid),
            Message::FeaturesRequest => {
                let features = self.features();
                self.send(&Message::FeaturesReply(features), xid);
            }
            Message::GetConfigRequest => {
                let config = self.config;
                self.send(&Message::GetConfigReply(config), xid);
            }
            Message::SetConfig(config) => {
                debug!("New switch config: {:?}", config);
                self.config = config;
            }
            Message::PacketOut(po) => self.packet_out(po, now)?,
            Message::FlowMod(fm) => self.flow_mod(fm, now)?,
            Message::PortMod(pm) => self.port_mod(&pm)?,
            Message::StatsRequest(req) => self.stats(req, xid, now)?,
            // Messages are handled in order, so everything before is applied
            Message::BarrierRequest => self.send(&Message::BarrierReply, xid),
            Message::Error(error) => warn!("Controller reported {}", error),
            other => warn!("Ignoring unexpected {:?} message", other.typ()),
        }
        Ok(())
    }

    fn features(&self) -> SwitchFeatures {
        SwitchFeatures {
            datapath_id: self.datapath_id,
            n_buffers: self.buffers.capacity() as u32,
            n_tables: 1,
            capabilities: OFPC_FLOW_STATS | OFPC_TABLE_STATS | OFPC_PORT_STATS | OFPC_ARP_MATCH_IP,
            actions: SUPPORTED_ACTIONS,
            ports: self.ports.values().map(|p| p.desc.clone()).collect(),
        }
    }

    fn check_output(&self, port: PseudoPort, in_port: Option<u16>, from_packet_out: bool) -> Result<()> {
        let valid = match port {
            PseudoPort::Physical(p) => self.ports.contains_key(&p) && in_port != Some(p),
            PseudoPort::Table => from_packet_out,
            PseudoPort::Normal | PseudoPort::None => false,
            PseudoPort::InPort
            | PseudoPort::Flood
            | PseudoPort::All
            | PseudoPort::Controller
            | PseudoPort::Local => true,
        };
        if valid {
            Ok(())
        }
        else {
            Err(Error::BadAction(OfpBadActionCode::BadOutPort))
        }
    }

    /// `in_port` is the input port a flow is bound to, if it is not wildcarded
    fn check_actions(&self, actions: &ActionList, in_port: Option<u16>, from_packet_out: bool) -> Result<()> {
        for action in actions {
            match *action {
                Action::Output { port, .. } => self.check_output(port, in_port, from_packet_out)?,
                Action::Enqueue { port, .. } => {
                    self.check_output(PseudoPort::Physical(port), in_port, from_packet_out)?
                }
                Action::SetVlanVid(vid) if vid > 0x0fff => {
                    return Err(Error::BadAction(OfpBadActionCode::BadArgument))
                }
                Action::SetVlanPcp(pcp) if pcp > 7 => {
                    return Err(Error::BadAction(OfpBadActionCode::BadArgument))
                }
                Action::SetNwTos(tos) if tos & 0x03 != 0 => {
                    return Err(Error::BadAction(OfpBadActionCode::BadArgument))
                }
                Action::Vendor { .. } => return Err(Error::BadAction(OfpBadActionCode::BadVendor)),
                _ => {}
            }
        }
        Ok(())
    }

    fn check_flow_mod(&self, fm: &OfpFlowMod) -> Result<()> {
        match fm.command {
            OfpFlowModCommand::Delete | OfpFlowModCommand::DeleteStrict => return Ok(()),
            _ => {}
        }
        if fm.flags & OFPFF_EMERG != 0 && (fm.idle_timeout != 0 || fm.hard_timeout != 0) {
            return Err(Error::FlowModFailed(OfpFlowModFailedCode::BadEmergTimeout));
        }
        let in_port = if fm.match_fields.wildcards & OFPFW_IN_PORT == 0 {
            Some(fm.match_fields.in_port)
        }
        else {
            None
        };
        self.check_actions(&fm.actions, in_port, false)
    }

    fn flow_mod(&mut self, fm: OfpFlowMod, now: Duration) -> Result<()> {
        let result = self.check_flow_mod(&fm).and_then(|_| self.apply_flow_mod(&fm, now));
        if result.is_err() && fm.buffer_id != OFP_NO_BUFFER && self.buffers.take(fm.buffer_id).is_some() {
            debug!("Freed buffer {} of a rejected flow mod", fm.buffer_id);
        }
        result?;

        let deleting = match fm.command {
            OfpFlowModCommand::Delete | OfpFlowModCommand::DeleteStrict => true,
            _ => false,
        };
        if !deleting && fm.buffer_id != OFP_NO_BUFFER {
            match self.buffers.take(fm.buffer_id) {
                Some(packet) => self.execute(packet.in_port, packet.data, &fm.actions, now),
                None => warn!("Flow mod refers to unknown buffer {}", fm.buffer_id),
            }
        }
        Ok(())
    }

    fn apply_flow_mod(&mut self, fm: &OfpFlowMod, now: Duration) -> Result<()> {
        match fm.command {
            OfpFlowModCommand::Add => {
                self.table.add(fm, now).map_err(Error::FlowModFailed)?;
            }
            OfpFlowModCommand::Modify | OfpFlowModCommand::ModifyStrict => {
                let strict = fm.command == OfpFlowModCommand::ModifyStrict;
                if self.table.modify(fm, strict) == 0 {
                    self.table.add(fm, now).map_err(Error::FlowModFailed)?;
                }
            }
            OfpFlowModCommand::Delete | OfpFlowModCommand::DeleteStrict => {
                let strict = fm.command == OfpFlowModCommand::DeleteStrict;
                let removed = self.table.delete(&fm.match_fields, fm.priority, fm.out_port, strict);
                debug!("Deleted {} flow entries", removed.len());
                for entry in removed {
                    if entry.flags & OFPFF_SEND_FLOW_REM != 0 {
                        let msg = entry.to_removed(OfpFlowRemovedReason::Delete, now);
                        self.send(&Message::FlowRemoved(msg), gen_xid());
                    }
                }
            }
        }
        Ok(())
    }

    fn packet_out(&mut self, po: OfpPacketOut, now: Duration) -> Result<()> {
        if let Err(e) = self.check_actions(&po.actions, None, true) {
            if po.buffer_id != OFP_NO_BUFFER {
                self.buffers.take(po.buffer_id);
            }
            return Err(e);
        }
        if po.buffer_id == OFP_NO_BUFFER {
            self.execute(po.in_port, po.data, &po.actions, now);
            return Ok(());
        }
        match self.buffers.take(po.buffer_id) {
            Some(packet) => {
                self.execute(packet.in_port, packet.data, &po.actions, now);
                Ok(())
            }
            None => {
                warn!("Packet out refers to unknown buffer {}", po.buffer_id);
                Err(Error::BadRequest(OfpBadRequestCode::BufferUnknown))
            }
        }
    }

    fn port_mod(&mut self, pm: &OfpPortMod) -> Result<()> {
        let port = match self.ports.get_mut(&pm.port_no) {
            Some(port) => port,
            None => return Err(Error::PortModFailed(OfpPortModFailedCode::BadPort)),
        };
        if port.desc.hw_addr != pm.hw_addr {
            return Err(Error::PortModFailed(OfpPortModFailedCode::BadHwAddr));
        }
        port.desc.config = (port.desc.config & !pm.mask) | (pm.config & pm.mask);
        if pm.advertise != 0 {
            port.desc.advertised = pm.advertise;
        }
        info!("Port {} config is now {:#x}", pm.port_no, port.desc.config);
        Ok(())
    }

    fn stats(&mut self, req: OfpStatsRequest, xid: u32, now: Duration) -> Result<()> {
        let body = match req.body {
            OfpStatsRequestBody::Desc => OfpStatsReplyBody::Desc(self.desc.clone()),
            OfpStatsRequestBody::Flow(r) => {
                let flows = if r.table_id == 0 || r.table_id == OFPTT_ALL {
                    self.table.flow_stats(&r.match_fields, r.out_port, now)
                }
                else {
                    vec![]
                };
                self.send_stats(flows, OfpStatsReplyBody::Flow, xid);
                return Ok(());
            }
            OfpStatsRequestBody::Aggregate(r) => {
                OfpStatsReplyBody::Aggregate(self.table.aggregate_stats(&r.match_fields, r.out_port))
            }
            OfpStatsRequestBody::Table => OfpStatsReplyBody::Table(vec![self.table.table_stats()]),
            OfpStatsRequestBody::Port { port_no } => {
                let stats = self
                    .ports
                    .values()
                    .filter(|p| port_no == OFPP_NONE || p.desc.port_no == port_no)
                    .map(|p| p.stats)
                    .collect();
                self.send_stats(stats, OfpStatsReplyBody::Port, xid);
                return Ok(());
            }
            OfpStatsRequestBody::Queue { .. } => OfpStatsReplyBody::Queue(vec![]),
            OfpStatsRequestBody::Vendor { .. } => {
                return Err(Error::BadRequest(OfpBadRequestCode::BadVendor))
            }
        };
        self.send(&Message::StatsReply(OfpStatsReply { flags: 0, body }), xid);
        Ok(())
    }

    /// Splits statistics over as many replies as the length field allows.
    /// All but the last reply carry `OFPSF_REPLY_MORE`.
    fn send_stats<T: Serialize>(&mut self, stats: Vec<T>, body: fn(Vec<T>) -> OfpStatsReplyBody, xid: u32) {
        let mut chunks: Vec<Vec<T>> = vec![vec![]];
        let mut size = 0;
        for item in stats {
            let item_size = item.serialized_size();
            if size + item_size > MAX_STATS_BODY {
                chunks.push(vec![]);
                size = 0;
            }
            size += item_size;
            if let Some(chunk) = chunks.last_mut() {
                chunk.push(item);
            }
        }
        let last = chunks.len() - 1;
        for (i, chunk) in chunks.into_iter().enumerate() {
            let reply = OfpStatsReply {
                flags: if i < last { OFPSF_REPLY_MORE } else { 0 },
                body: body(chunk),
            };
            self.send(&Message::StatsReply(reply), xid);
        }
    }

    /// Takes a frame off the wire on `in_port` and runs it through the datapath
    pub fn receive_frame(&mut self, in_port: u16, frame: Vec<u8>, now: Duration) {
        let accepted = match self.ports.get_mut(&in_port) {
            Some(port) => {
                if port.receives() {
                    port.stats.rx_packets += 1;
                    port.stats.rx_bytes += frame.len() as u64;
                    true
                }
                else {
                    port.stats.rx_dropped += 1;
                    false
                }
            }
            None => {
                warn!("Frame received on unknown port {}", in_port);
                false
            }
        };
        if accepted {
            self.process(in_port, frame, now);
        }
    }

    fn process(&mut self, in_port: u16, frame: Vec<u8>, now: Duration) {
        let key = extract_key(&frame, in_port);
        match self.table.lookup(&key, frame.len(), now) {
            Some(actions) => {
                trace!("Frame from port {} hit a flow: {:?}", in_port, actions);
                self.execute(in_port, frame, &actions, now);
            }
            None => {
                let silenced = self
                    .ports
                    .get(&in_port)
                    .map_or(false, |p| p.desc.config & OFPPC_NO_PACKET_IN != 0);
                if silenced {
                    debug!("Dropping a table miss from port {}", in_port);
                }
                else {
                    let miss_send_len = self.config.miss_send_len;
                    self.packet_in(in_port, frame, OfpPacketInReason::NoMatch, miss_send_len);
                }
            }
        }
    }

    /// Applies `actions` in order; rewrites affect every output after them
    fn execute(&mut self, in_port: u16, mut frame: Vec<u8>, actions: &ActionList, now: Duration) {
        for action in actions {
            match *action {
                Action::Output { port, max_len } => self.output(in_port, &frame, port, max_len, now),
                Action::Enqueue { port, .. } => {
                    self.output(in_port, &frame, PseudoPort::Physical(port), 0, now)
                }
                Action::SetVlanVid(vid) => edit_frame(&mut frame, |eth| {
                    let pcp = eth.vlan.map_or(0, |tag| tag.pcp);
                    eth.vlan = Some(VlanTag { vid, pcp });
                }),
                Action::SetVlanPcp(pcp) => edit_frame(&mut frame, |eth| {
                    let vid = eth.vlan.map_or(0, |tag| tag.vid);
                    eth.vlan = Some(VlanTag { vid, pcp });
                }),
                Action::StripVlan => edit_frame(&mut frame, |eth| eth.vlan = None),
                Action::SetDlSrc(mac) => edit_frame(&mut frame, |eth| eth.src = mac),
                Action::SetDlDst(mac) => edit_frame(&mut frame, |eth| eth.dst = mac),
                Action::SetNwSrc(ip) => edit_ipv4(&mut frame, Ipv4Field::Src(ip)),
                Action::SetNwDst(ip) => edit_ipv4(&mut frame, Ipv4Field::Dst(ip)),
                Action::SetNwTos(tos) => edit_ipv4(&mut frame, Ipv4Field::Tos(tos)),
                Action::SetTpSrc(tp) => edit_ipv4(&mut frame, Ipv4Field::TpSrc(tp)),
                Action::SetTpDst(tp) => edit_ipv4(&mut frame, Ipv4Field::TpDst(tp)),
                Action::Vendor { vendor, .. } => debug!("Skipping vendor {} action", vendor),
            }
        }
    }

    fn output(&mut self, in_port: u16, frame: &[u8], port: PseudoPort, max_len: u16, now: Duration) {
        match port {
            PseudoPort::Physical(p) => {
                if p == in_port {
                    debug!("Not sending a frame back out of its input port {}", p);
                }
                else {
                    self.send_on_port(p, frame);
                }
            }
            PseudoPort::InPort => self.send_on_port(in_port, frame),
            PseudoPort::Table => self.process(in_port, frame.to_vec(), now),
            PseudoPort::Flood | PseudoPort::All => {
                let flood = port == PseudoPort::Flood;
                let targets: Vec<u16> = self
                    .ports
                    .values()
                    .filter(|p| p.desc.port_no != in_port)
                    .filter(|p| !flood || p.desc.config & OFPPC_NO_FLOOD == 0)
                    .map(|p| p.desc.port_no)
                    .collect();
                for target in targets {
                    self.send_on_port(target, frame);
                }
            }
            PseudoPort::Controller => {
                self.packet_in(in_port, frame.to_vec(), OfpPacketInReason::Action, max_len)
            }
            PseudoPort::Normal | PseudoPort::Local | PseudoPort::None => {
                debug!("Dropping a frame sent to {:?}", port)
            }
        }
    }

    fn send_on_port(&mut self, port_no: u16, frame: &[u8]) {
        match self.ports.get_mut(&port_no) {
            Some(port) => {
                if port.forwards() {
                    port.stats.tx_packets += 1;
                    port.stats.tx_bytes += frame.len() as u64;
                    self.transmit.push_back((port_no, frame.to_vec()));
                }
                else {
                    port.stats.tx_dropped += 1;
                }
            }
            None => warn!("Cannot send a frame out of unknown port {}", port_no),
        }
    }

    /// Buffers the frame and sends its head to the controller.
    /// A `max_len` of 0 sends the whole frame, as does a switch out of buffers.
    fn packet_in(&mut self, in_port: u16, frame: Vec<u8>, reason: OfpPacketInReason, max_len: u16) {
        let total_len = frame.len();
        let limit = usize::from(max_len);
        let buffer_id = self.buffers.store(in_port, frame.clone());
        let data = if buffer_id == OFP_NO_BUFFER || limit == 0 || limit >= total_len {
            frame
        }
        else {
            frame[..limit].to_vec()
        };
        let packet_in = OfpPacketIn {
            buffer_id,
            total_len: cmp::min(total_len, usize::from(u16::max_value())) as u16,
            in_port,
            reason,
            data,
        };
        self.send(&Message::PacketIn(packet_in), gen_xid());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packet::{ipv4_packet, IP_PROTO_UDP};
    use std::net::Ipv4Addr;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn client() -> OpenflowClient {
        let ports = (1..4)
            .map(|i| PhyPort::new(i, MacAddr([0, 0, 0, 0, 1, i as u8]), &format!("eth{}", i)))
            .collect();
        OpenflowClient::new(0x0000_0a0b_0c0d_0e0f, ports, secs(0))
    }

    fn output(client: &mut OpenflowClient) -> Vec<(u32, Message)> {
        client
            .drain_output()
            .iter()
            .map(|bytes| {
                let (xid, msg, len) = Message::deserialize(bytes).unwrap();
                assert_eq!(bytes.len(), len);
                (xid, msg)
            })
            .collect()
    }

    fn udp_frame() -> Vec<u8> {
        let ip = ipv4_packet(
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
            IP_PROTO_UDP,
            &[0, 53, 0, 53, 0, 8, 0, 0],
        );
        Ethernet::new(MacAddr([0, 0, 0, 0, 0, 2]), MacAddr([0, 0, 0, 0, 0, 1]), ETH_TYPE_IPV4, ip)
            .to_bytes()
    }

    fn forward(port: u16) -> ActionList {
        ActionList::from(vec![Action::output(PseudoPort::Physical(port))])
    }

    #[test]
    fn answers_handshake() {
        let mut c = client();
        c.receive(&Message::Hello.marshal(7).unwrap(), secs(0));
        c.receive(&Message::FeaturesRequest.marshal(8).unwrap(), secs(0));
        let out = output(&mut c);
        assert_eq!((7, Message::Hello), out[0]);
        match out[1] {
            (8, Message::FeaturesReply(ref f)) => {
                assert_eq!(0x0000_0a0b_0c0d_0e0f, f.datapath_id);
                assert_eq!(vec![1, 2, 3], f.ports.iter().map(|p| p.port_no).collect::<Vec<_>>());
            }
            ref other => panic!("unexpected {:?}", other),
        }
        assert_eq!(MacAddr([0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f]), c.chassis_id());
    }

    #[test]
    fn reassembles_fragmented_requests() {
        let mut c = client();
        let mut bytes = Message::EchoRequest(vec![1, 2, 3, 4]).marshal(3).unwrap();
        bytes.extend(Message::BarrierRequest.marshal(4).unwrap());
        for chunk in bytes.chunks(5) {
            c.receive(chunk, secs(0));
        }
        assert_eq!(
            vec![(3, Message::EchoReply(vec![1, 2, 3, 4])), (4, Message::BarrierReply)],
            output(&mut c)
        );
    }

    #[test]
    fn miss_then_buffered_flow_mod() {
        let mut c = client();
        c.receive_frame(1, udp_frame(), secs(0));
        let buffer_id = match output(&mut c).pop() {
            Some((_, Message::PacketIn(pi))) => {
                assert_eq!(OfpPacketInReason::NoMatch, pi.reason);
                assert_eq!(1, pi.in_port);
                assert_eq!(udp_frame().len(), usize::from(pi.total_len));
                assert_eq!(usize::from(OFP_DEFAULT_MISS_SEND_LEN).min(udp_frame().len()), pi.data.len());
                pi.buffer_id
            }
            other => panic!("unexpected {:?}", other),
        };

        let mut fm = OfpFlowMod::new(
            OfpFlowModCommand::Add,
            OfpMatch::match_all().in_port(1).dl_type(ETH_TYPE_IPV4),
            OFP_DEFAULT_PRIORITY,
            forward(2),
        );
        fm.buffer_id = buffer_id;
        c.receive(&Message::FlowMod(fm).marshal(9).unwrap(), secs(0));
        assert!(output(&mut c).is_empty());
        assert_eq!(vec![(2, udp_frame())], c.drain_transmit());
        assert_eq!(0, c.buffered_packets());

        // the flow now handles the traffic itself
        c.receive_frame(1, udp_frame(), secs(1));
        assert!(output(&mut c).is_empty());
        assert_eq!(vec![(2, udp_frame())], c.drain_transmit());
        assert_eq!(2, c.port_stats(2).unwrap().tx_packets);
        assert_eq!(2, c.port_stats(1).unwrap().rx_packets);
    }

    #[test]
    fn rejects_output_to_own_in_port() {
        let mut c = client();
        c.receive_frame(1, udp_frame(), secs(0));
        let buffer_id = match output(&mut c).pop() {
            Some((_, Message::PacketIn(pi))) => pi.buffer_id,
            other => panic!("unexpected {:?}", other),
        };
        let mut fm = OfpFlowMod::new(
            OfpFlowModCommand::Add,
            OfpMatch::match_all().in_port(1),
            OFP_DEFAULT_PRIORITY,
            forward(1),
        );
        fm.buffer_id = buffer_id;
        let request = Message::FlowMod(fm).marshal(5).unwrap();
        c.receive(&request, secs(0));
        match output(&mut c).pop() {
            Some((5, Message::Error(e))) => {
                assert_eq!(OfpErrorType::BadAction as u16, e.typ);
                assert_eq!(OfpBadActionCode::BadOutPort as u16, e.code);
                assert_eq!(&request[..64], &e.data[..]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(c.flow_table().is_empty());
        assert_eq!(0, c.buffered_packets());
    }

    #[test]
    fn flood_honours_no_flood() {
        let mut c = client();
        let pm = OfpPortMod {
            port_no: 3,
            hw_addr: MacAddr([0, 0, 0, 0, 1, 3]),
            config: OFPPC_NO_FLOOD,
            mask: OFPPC_NO_FLOOD,
            advertise: 0,
        };
        c.receive(&Message::PortMod(pm).marshal(1).unwrap(), secs(0));
        let po = OfpPacketOut {
            buffer_id: OFP_NO_BUFFER,
            in_port: 1,
            actions: ActionList::from(vec![Action::output(PseudoPort::Flood)]),
            data: udp_frame(),
        };
        c.receive(&Message::PacketOut(po).marshal(2).unwrap(), secs(0));
        assert!(output(&mut c).is_empty());
        assert_eq!(vec![(2, udp_frame())], c.drain_transmit());
    }

    #[test]
    fn port_mod_checks_hw_addr() {
        let mut c = client();
        let pm = OfpPortMod {
            port_no: 3,
            hw_addr: MacAddr([0, 0, 0, 0, 1, 9]),
            config: OFPPC_NO_FLOOD,
            mask: OFPPC_NO_FLOOD,
            advertise: 0,
        };
        c.receive(&Message::PortMod(pm).marshal(1).unwrap(), secs(0));
        match output(&mut c).pop() {
            Some((1, Message::Error(e))) => {
                assert_eq!(OfpErrorType::PortModFailed as u16, e.typ);
                assert_eq!(OfpPortModFailedCode::BadHwAddr as u16, e.code);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(0, c.port(3).unwrap().config);
    }

    #[test]
    fn packet_out_to_table_runs_the_pipeline() {
        let mut c = client();
        let fm = OfpFlowMod::new(
            OfpFlowModCommand::Add,
            OfpMatch::match_all().dl_type(ETH_TYPE_IPV4),
            OFP_DEFAULT_PRIORITY,
            ActionList::from(vec![
                Action::SetDlDst(MacAddr([0, 0, 0, 0, 0, 9])),
                Action::output(PseudoPort::Physical(3)),
            ]),
        );
        c.receive(&Message::FlowMod(fm).marshal(1).unwrap(), secs(0));
        let po = OfpPacketOut {
            buffer_id: OFP_NO_BUFFER,
            in_port: 1,
            actions: ActionList::from(vec![Action::output(PseudoPort::Table)]),
            data: udp_frame(),
        };
        c.receive(&Message::PacketOut(po).marshal(2).unwrap(), secs(0));
        let sent = c.drain_transmit();
        assert_eq!(1, sent.len());
        assert_eq!(3, sent[0].0);
        assert_eq!(MacAddr([0, 0, 0, 0, 0, 9]), Ethernet::parse(&sent[0].1).unwrap().dst);
    }

    #[test]
    fn table_output_is_rejected_in_flow_mods() {
        let mut c = client();
        let fm = OfpFlowMod::new(
            OfpFlowModCommand::Add,
            OfpMatch::match_all(),
            OFP_DEFAULT_PRIORITY,
            ActionList::from(vec![Action::output(PseudoPort::Table)]),
        );
        c.receive(&Message::FlowMod(fm).marshal(1).unwrap(), secs(0));
        match output(&mut c).pop() {
            Some((1, Message::Error(e))) => assert_eq!(OfpBadActionCode::BadOutPort as u16, e.code),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn sweep_expires_flows_once() {
        let mut c = client();
        let mut fm = OfpFlowMod::new(
            OfpFlowModCommand::Add,
            OfpMatch::match_all(),
            OFP_DEFAULT_PRIORITY,
            forward(2),
        );
        fm.hard_timeout = 3;
        fm.flags = OFPFF_SEND_FLOW_REM;
        c.receive(&Message::FlowMod(fm).marshal(1).unwrap(), secs(0));
        c.tick(secs(2));
        assert_eq!(1, c.flow_table().len());
        assert!(output(&mut c).is_empty());
        c.tick(secs(3));
        assert!(c.flow_table().is_empty());
        match output(&mut c).as_slice() {
            [(_, Message::FlowRemoved(ref removed))] => {
                assert_eq!(OfpFlowRemovedReason::HardTimeout, removed.reason);
                assert_eq!(3, removed.duration_sec);
            }
            other => panic!("unexpected {:?}", other),
        }
        c.tick(secs(10));
        assert!(output(&mut c).is_empty());
    }

    #[test]
    fn delete_reports_removed_flows() {
        let mut c = client();
        let mut fm = OfpFlowMod::new(
            OfpFlowModCommand::Add,
            OfpMatch::match_all().in_port(1),
            OFP_DEFAULT_PRIORITY,
            forward(2),
        );
        fm.flags = OFPFF_SEND_FLOW_REM;
        c.receive(&Message::FlowMod(fm).marshal(1).unwrap(), secs(0));
        let delete = OfpFlowMod::new(
            OfpFlowModCommand::Delete,
            OfpMatch::match_all(),
            0,
            ActionList::new(),
        );
        c.receive(&Message::FlowMod(delete).marshal(2).unwrap(), secs(1));
        assert!(c.flow_table().is_empty());
        match output(&mut c).pop() {
            Some((_, Message::FlowRemoved(removed))) => {
                assert_eq!(OfpFlowRemovedReason::Delete, removed.reason)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn link_changes_are_reported_once() {
        let mut c = client();
        assert!(c.set_link_state(2, false));
        assert!(output(&mut c).is_empty());
        c.tick(secs(1));
        match output(&mut c).as_slice() {
            [(_, Message::PortStatus(ref status))] => {
                assert_eq!(OfpPortReason::Modify, status.reason);
                assert_eq!(2, status.desc.port_no);
                assert!(status.desc.is_link_down());
            }
            other => panic!("unexpected {:?}", other),
        }
        c.tick(secs(2));
        assert!(output(&mut c).is_empty());

        c.receive_frame(2, udp_frame(), secs(2));
        assert!(output(&mut c).is_empty());
        assert_eq!(1, c.port_stats(2).unwrap().rx_dropped);
    }

    #[test]
    fn stats_replies() {
        let mut c = client();
        let req = OfpStatsRequest {
            flags: 0,
            body: OfpStatsRequestBody::Port { port_no: OFPP_NONE },
        };
        c.receive(&Message::StatsRequest(req).marshal(4).unwrap(), secs(0));
        let req = OfpStatsRequest {
            flags: 0,
            body: OfpStatsRequestBody::Vendor { vendor: 1, body: vec![] },
        };
        c.receive(&Message::StatsRequest(req).marshal(5).unwrap(), secs(0));
        let out = output(&mut c);
        match out[0] {
            (4, Message::StatsReply(OfpStatsReply { body: OfpStatsReplyBody::Port(ref ports), .. })) => {
                assert_eq!(3, ports.len())
            }
            ref other => panic!("unexpected {:?}", other),
        }
        match out[1] {
            (5, Message::Error(ref e)) => assert_eq!(OfpBadRequestCode::BadVendor as u16, e.code),
            ref other => panic!("unexpected {:?}", other),
        }
    }

    fn buffer_ids(client: &mut OpenflowClient) -> Vec<u32> {
        output(client)
            .into_iter()
            .filter_map(|(_, msg)| match msg {
                Message::PacketIn(pi) => Some(pi.buffer_id),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn packet_out_to_evicted_buffer_fails() {
        let ports = (1..3)
            .map(|i| PhyPort::new(i, MacAddr([0, 0, 0, 0, 1, i as u8]), &format!("eth{}", i)))
            .collect();
        let mut c = OpenflowClient::with_limits(1, ports, DEFAULT_MAX_FLOWS, 2, secs(0));
        for _ in 0..3 {
            c.receive_frame(1, udp_frame(), secs(0));
        }
        let ids = buffer_ids(&mut c);
        assert_eq!(3, ids.len());
        assert_eq!(2, c.buffered_packets());

        let po = OfpPacketOut {
            buffer_id: ids[0],
            in_port: 1,
            actions: forward(2),
            data: vec![],
        };
        c.receive(&Message::PacketOut(po).marshal(6).unwrap(), secs(0));
        match output(&mut c).as_slice() {
            [(6, Message::Error(ref e))] => {
                assert_eq!(OfpErrorType::BadRequest as u16, e.typ);
                assert_eq!(OfpBadRequestCode::BufferUnknown as u16, e.code);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(c.drain_transmit().is_empty());

        // the session goes on and the newest buffer is still there
        let po = OfpPacketOut {
            buffer_id: ids[2],
            in_port: 1,
            actions: forward(2),
            data: vec![],
        };
        c.receive(&Message::PacketOut(po).marshal(7).unwrap(), secs(0));
        assert!(output(&mut c).is_empty());
        assert_eq!(vec![(2, udp_frame())], c.drain_transmit());
    }

    #[test]
    fn flow_stats_span_several_replies() {
        let mut c = client();
        for i in 0..800u16 {
            let fm = OfpFlowMod::new(
                OfpFlowModCommand::Add,
                OfpMatch::match_all()
                    .dl_type(ETH_TYPE_IPV4)
                    .nw_dst(Ipv4Addr::new(10, 1, (i >> 8) as u8, i as u8)),
                OFP_DEFAULT_PRIORITY,
                forward(2),
            );
            c.receive(&Message::FlowMod(fm).marshal(1).unwrap(), secs(0));
        }
        let req = OfpStatsRequest {
            flags: 0,
            body: OfpStatsRequestBody::Flow(OfpFlowStatsRequest {
                match_fields: OfpMatch::match_all(),
                table_id: OFPTT_ALL,
                out_port: OFPP_NONE,
            }),
        };
        c.receive(&Message::StatsRequest(req).marshal(9).unwrap(), secs(0));
        let replies: Vec<_> = output(&mut c)
            .into_iter()
            .map(|(xid, msg)| match msg {
                Message::StatsReply(reply) => {
                    assert_eq!(9, xid);
                    reply
                }
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert!(replies.len() > 1);
        let (last, rest) = replies.split_last().unwrap();
        assert!(rest.iter().all(|r| r.flags & OFPSF_REPLY_MORE != 0));
        assert_eq!(0, last.flags & OFPSF_REPLY_MORE);
        let flows: usize = replies
            .iter()
            .map(|r| match r.body {
                OfpStatsReplyBody::Flow(ref flows) => flows.len(),
                ref other => panic!("unexpected {:?}", other),
            })
            .sum();
        assert_eq!(800, flows);
    }

    #[test]
    fn port_stats_of_many_ports_keep_framing() {
        let ports = (1..701)
            .map(|i: u16| PhyPort::new(i, MacAddr([0, 0, 0, 1, (i >> 8) as u8, i as u8]), &format!("eth{}", i)))
            .collect();
        let mut c = OpenflowClient::new(1, ports, secs(0));
        let req = OfpStatsRequest {
            flags: 0,
            body: OfpStatsRequestBody::Port { port_no: OFPP_NONE },
        };
        c.receive(&Message::StatsRequest(req).marshal(4).unwrap(), secs(0));
        let out = c.drain_output();
        assert!(out.len() > 1);
        let mut ports = 0;
        for (i, bytes) in out.iter().enumerate() {
            assert_eq!(bytes.len(), OfpHeader::peek(bytes).unwrap().length());
            let (xid, msg, _) = Message::deserialize(bytes).unwrap();
            assert_eq!(4, xid);
            match msg {
                Message::StatsReply(ref reply) => {
                    assert_eq!(i + 1 < out.len(), reply.flags & OFPSF_REPLY_MORE != 0);
                    match reply.body {
                        OfpStatsReplyBody::Port(ref stats) => ports += stats.len(),
                        ref other => panic!("unexpected {:?}", other),
                    }
                }
                ref other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(700, ports);
    }
}
