/*!
The controller: switch connections, the topology graph and the applications.

`ControllerCore` owns everything the applications share: the proxies of all
switch connections, the topology and the pending barrier sync rounds. Its
helpers build and send flow mods and packet outs. `Controller` wraps the core
together with the applications, which it consults in ascending priority order
for every packet-in until one of them claims the packet.

Notifications raised while an application runs (a host got installed, a sync
round completed, ...) are queued and delivered to all applications once the
current one is done.
*/

pub mod apps;
mod of_switch;

pub use self::of_switch::{OfSwitch, SwitchEvent, SwitchState};

use conf::Conf;
use controller::apps::{App, ArpHandler, LldpHandler, RoutingHandler};
use openflow::actions::{Action, ActionList};
use openflow::messages::*;
use packet::{Ethernet, MacAddr};
use sched::Scheduler;
use topology::{Topology, VertexId};

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::net::Ipv4Addr;
use std::time::Duration;

/// Identifies a control connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(pub u32);

/// Identifies a barrier sync round over all switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SyncId(u64);

/// Where a host is attached to the fabric
#[derive(Debug, Clone, PartialEq)]
pub struct HostAttachment {
    pub mac: MacAddr,
    pub addresses: Vec<Ipv4Addr>,
    /// The access switch
    pub conn: ConnId,
    /// The port of the access switch the host is behind
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq)]
enum AppEvent {
    InitSwitch(ConnId),
    HostInstalled(HostAttachment),
    HostUninstalled(HostAttachment),
    SyncCompleted(SyncId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControllerTimer {
    Refresh,
}

#[derive(Debug)]
pub struct ControllerCore {
    conf: Conf,
    topology: Topology,
    switches: BTreeMap<ConnId, OfSwitch>,
    syncs: HashMap<SyncId, HashSet<ConnId>>,
    next_sync: u64,
    events: VecDeque<AppEvent>,
    now: Duration,
}

impl ControllerCore {
    fn new(conf: Conf, now: Duration) -> ControllerCore {
        ControllerCore {
            conf,
            topology: Topology::new(),
            switches: BTreeMap::new(),
            syncs: HashMap::new(),
            next_sync: 0,
            events: VecDeque::new(),
            now,
        }
    }

    pub fn conf(&self) -> &Conf {
        &self.conf
    }

    /// The time of the event being handled
    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn topology_mut(&mut self) -> &mut Topology {
        &mut self.topology
    }

    pub fn switch(&self, conn: ConnId) -> Option<&OfSwitch> {
        self.switches.get(&conn)
    }

    pub fn operational_switches(&self) -> Vec<ConnId> {
        self.switches
            .values()
            .filter(|sw| sw.is_operational())
            .map(|sw| sw.conn())
            .collect()
    }

    /// The topology vertex of an operational switch
    pub fn switch_vertex(&self, conn: ConnId) -> Option<VertexId> {
        let chassis_id = self.switches.get(&conn)?.chassis_id()?;
        self.topology.lookup_vertex(&chassis_id)
    }

    /// The connection of a switch vertex
    pub fn vertex_conn(&self, vertex: VertexId) -> Option<ConnId> {
        self.topology.vertex(vertex)?.conn()
    }

    /// Checks whether `port` of the switch is a discovered switch-to-switch link
    pub fn is_switch_link(&self, conn: ConnId, port: u16) -> bool {
        self.switch_vertex(conn)
            .map_or(false, |v| self.topology.is_switch_link(v, port))
    }

    fn send(&mut self, conn: ConnId, message: &Message) -> bool {
        match self.switches.get_mut(&conn) {
            Some(sw) if sw.is_operational() => {
                sw.send(message);
                true
            }
            _ => {
                debug!("Not sending {:?} to {:?}, it is not operational", message.typ(), conn);
                false
            }
        }
    }

    pub fn send_flow_mod(&mut self, conn: ConnId, flow_mod: OfpFlowMod) -> bool {
        debug!(
            "{:?} flow {:?} on {:?}",
            flow_mod.command, flow_mod.match_fields, conn
        );
        self.send(conn, &Message::FlowMod(flow_mod))
    }

    pub fn send_packet_out(
        &mut self,
        conn: ConnId,
        buffer_id: u32,
        in_port: u16,
        actions: ActionList,
        data: Vec<u8>,
    ) -> bool {
        let packet_out = OfpPacketOut {
            buffer_id,
            in_port,
            actions,
            data: if buffer_id == OFP_NO_BUFFER { data } else { vec![] },
        };
        self.send(conn, &Message::PacketOut(packet_out))
    }

    /// Sends `data` out of every flood-enabled port of every switch
    /// except the port it came in on
    pub fn flood_packet(&mut self, origin: ConnId, in_port: u16, data: &[u8]) {
        for conn in self.operational_switches() {
            let actions: Vec<Action> = match self.switches.get(&conn) {
                Some(sw) => sw
                    .ports()
                    .iter()
                    .map(|p| p.port_no)
                    .filter(|&p| p < OFPP_MAX && sw.flood_enabled(p) && !(conn == origin && p == in_port))
                    .map(|p| Action::output(PseudoPort::Physical(p)))
                    .collect(),
                None => continue,
            };
            if actions.is_empty() {
                continue;
            }
            trace!("Flooding {} bytes out of {} ports of {:?}", data.len(), actions.len(), conn);
            self.send_packet_out(conn, OFP_NO_BUFFER, OFPP_NONE, ActionList::from(actions), data.to_vec());
        }
    }

    /// Sends a barrier to every operational switch. `SyncCompleted` is raised
    /// once all of them have answered.
    pub fn start_sync(&mut self) -> SyncId {
        let sync = SyncId(self.next_sync);
        self.next_sync += 1;
        let mut waiting = HashSet::new();
        for sw in self.switches.values_mut().filter(|sw| sw.is_operational()) {
            sw.send_barrier(sync);
            waiting.insert(sw.conn());
        }
        debug!("Sync round {:?} waits for {} switches", sync, waiting.len());
        if waiting.is_empty() {
            self.events.push_back(AppEvent::SyncCompleted(sync));
        }
        else {
            self.syncs.insert(sync, waiting);
        }
        sync
    }

    fn barrier_reply(&mut self, conn: ConnId, sync: SyncId) {
        let done = match self.syncs.get_mut(&sync) {
            Some(waiting) => {
                waiting.remove(&conn);
                waiting.is_empty()
            }
            None => false,
        };
        if done {
            debug!("Sync round {:?} completed", sync);
            self.syncs.remove(&sync);
            self.events.push_back(AppEvent::SyncCompleted(sync));
        }
    }

    /// Stops flooding through `port` of the switch, both in the
    /// controller's own floods and in the switch's
    pub fn disable_flood(&mut self, conn: ConnId, port: u16) {
        let port_mod = match self.switches.get_mut(&conn) {
            Some(sw) => {
                let hw_addr = match sw.port(port) {
                    Some(desc) => desc.hw_addr,
                    None => {
                        warn!("Cannot disable flooding on unknown port {} of {:?}", port, conn);
                        return;
                    }
                };
                if !sw.set_flood(port, false) {
                    return;
                }
                OfpPortMod {
                    port_no: port,
                    hw_addr,
                    config: OFPPC_NO_FLOOD,
                    mask: OFPPC_NO_FLOOD,
                    advertise: 0,
                }
            }
            None => return,
        };
        info!("Disabling flooding on port {} of {:?}", port, conn);
        self.send(conn, &Message::PortMod(port_mod));
    }

    /// Where a host vertex is attached, if it still is
    pub fn attachment(&self, host: VertexId) -> Option<HostAttachment> {
        let vertex = self.topology.vertex(host)?;
        if !vertex.is_leaf() {
            return None;
        }
        for adj in self.topology.edges_from(host) {
            let conn = match self.vertex_conn(adj.destination) {
                Some(conn) => conn,
                None => continue,
            };
            let back = self
                .topology
                .find_edge(adj.destination, host)
                .and_then(|e| self.topology.edge(e));
            if let Some(back) = back {
                return Some(HostAttachment {
                    mac: vertex.mac,
                    addresses: vertex.addresses().to_vec(),
                    conn,
                    port: back.port,
                });
            }
        }
        None
    }

    /// Binds a host to `port` of a switch and announces it as installed.
    /// A host seen behind another port before is uninstalled first.
    pub fn install_host(&mut self, conn: ConnId, port: u16, mac: MacAddr, ip: Ipv4Addr) -> Option<VertexId> {
        let switch = self.switch_vertex(conn)?;
        if let Some(existing) = self.topology.lookup_vertex(&mac) {
            if !self.topology.vertex(existing).map_or(false, |v| v.is_leaf()) {
                warn!("{} claims the address of a switch", mac);
                return None;
            }
            match self.attachment(existing) {
                Some(ref att) if att.conn == conn && att.port == port => {
                    if att.addresses.contains(&ip) {
                        return Some(existing);
                    }
                }
                Some(_) => {
                    info!("Host {} moved to port {} of {:?}", mac, port, conn);
                    self.uninstall_host(&mac);
                }
                None => {}
            }
        }
        if let Some(owner) = self.topology.lookup_vertex_by_address(&ip) {
            let previous = self.topology.vertex(owner).map(|v| v.mac);
            if let Some(previous) = previous {
                if previous != mac {
                    info!("{} moved from {} to {}", ip, previous, mac);
                    self.uninstall_host(&previous);
                }
            }
        }

        let host = self.topology.add_host(mac);
        self.topology.bind_address(host, ip);
        self.topology.add_edge(switch, host, port);
        self.topology.add_edge(host, switch, 0);
        info!("Installed host {} ({}) behind port {} of {:?}", mac, ip, port, conn);
        if let Some(att) = self.attachment(host) {
            self.events.push_back(AppEvent::HostInstalled(att));
        }
        Some(host)
    }

    /// Removes a host from the topology and announces it as uninstalled
    pub fn uninstall_host(&mut self, mac: &MacAddr) -> bool {
        let host = match self.topology.lookup_vertex(mac) {
            Some(host) => host,
            None => return false,
        };
        if !self.topology.vertex(host).map_or(false, |v| v.is_leaf()) {
            return false;
        }
        let att = self.attachment(host);
        self.topology.remove_vertex(mac);
        info!("Uninstalled host {}", mac);
        if let Some(att) = att {
            self.events.push_back(AppEvent::HostUninstalled(att));
        }
        true
    }

    /// Uninstalls every host behind `port` of the switch
    pub fn uninstall_hosts_behind(&mut self, conn: ConnId, port: u16) {
        let switch = match self.switch_vertex(conn) {
            Some(switch) => switch,
            None => return,
        };
        let hosts: Vec<MacAddr> = self
            .topology
            .neighbours_via(switch, port)
            .into_iter()
            .filter_map(|v| self.topology.vertex(v))
            .filter(|v| v.is_leaf())
            .map(|v| v.mac)
            .collect();
        for mac in hosts {
            self.uninstall_host(&mac);
        }
    }

    fn new_switch(&mut self, conn: ConnId, features: &SwitchFeatures) {
        let chassis_id = MacAddr::from_u64(features.datapath_id);
        let vertex = self.topology.add_switch(chassis_id, conn);
        info!(
            "Switch {} with {} ports joined as vertex {:?}",
            chassis_id,
            features.ports.len(),
            vertex
        );
        self.events.push_back(AppEvent::InitSwitch(conn));
    }

    fn port_status(&mut self, conn: ConnId, status: &OfpPortStatus) {
        let gone = status.reason == OfpPortReason::Delete
            || status.desc.is_link_down()
            || status.desc.config & OFPPC_PORT_DOWN != 0;
        if gone {
            self.uninstall_hosts_behind(conn, status.desc.port_no);
        }
    }

    fn remove_switch(&mut self, conn: ConnId) {
        let mut sw = match self.switches.remove(&conn) {
            Some(sw) => sw,
            None => return,
        };
        sw.close();
        if let Some(chassis_id) = sw.chassis_id() {
            let vertex = self
                .topology
                .lookup_vertex(&chassis_id)
                .filter(|&v| self.vertex_conn(v) == Some(conn));
            if let Some(vertex) = vertex {
                let hosts: Vec<MacAddr> = self
                    .topology
                    .edges_from(vertex)
                    .filter_map(|adj| self.topology.vertex(adj.destination))
                    .filter(|v| v.is_leaf())
                    .map(|v| v.mac)
                    .collect();
                for mac in hosts {
                    self.uninstall_host(&mac);
                }
                self.topology.remove_vertex(&chassis_id);
                info!("Switch {} left the topology", chassis_id);
            }
        }

        let mut completed = vec![];
        for (&sync, waiting) in &mut self.syncs {
            if waiting.remove(&conn) && waiting.is_empty() {
                completed.push(sync);
            }
        }
        for sync in completed {
            self.syncs.remove(&sync);
            self.events.push_back(AppEvent::SyncCompleted(sync));
        }
    }
}

/// The controller with its applications
#[derive(Debug)]
pub struct Controller {
    core: ControllerCore,
    apps: Vec<App>,
    timers: Scheduler<ControllerTimer>,
    next_conn: u32,
}

impl Controller {
    /// A controller running the ARP, LLDP and routing applications
    pub fn new(conf: Conf, now: Duration) -> Controller {
        let apps = vec![
            App::Arp(ArpHandler::new()),
            App::Lldp(LldpHandler::new(conf.discovery.ttl)),
            App::Routing(RoutingHandler::new(conf.routing)),
        ];
        Controller::with_apps(conf, apps, now)
    }

    pub fn with_apps(conf: Conf, mut apps: Vec<App>, now: Duration) -> Controller {
        apps.sort_by_key(|app| app.priority());
        let mut timers = Scheduler::new();
        timers.schedule_after(now, conf.discovery.interval, ControllerTimer::Refresh);
        Controller {
            core: ControllerCore::new(conf, now),
            apps,
            timers,
            next_conn: 0,
        }
    }

    pub fn core(&self) -> &ControllerCore {
        &self.core
    }

    pub fn topology(&self) -> &Topology {
        &self.core.topology
    }

    pub fn apps(&self) -> &[App] {
        &self.apps
    }

    pub fn switch(&self, conn: ConnId) -> Option<&OfSwitch> {
        self.core.switches.get(&conn)
    }

    pub fn connections(&self) -> Vec<ConnId> {
        self.core.switches.keys().cloned().collect()
    }

    /// Registers a new switch connection and says Hello
    pub fn connect(&mut self) -> ConnId {
        let conn = ConnId(self.next_conn);
        self.next_conn += 1;
        let mut sw = OfSwitch::new(conn, self.core.conf.switch.miss_send_len);
        sw.connect();
        info!("New switch connection {:?}", conn);
        self.core.switches.insert(conn, sw);
        conn
    }

    /// Drops a switch connection and everything learned through it
    pub fn disconnect(&mut self, conn: ConnId, now: Duration) {
        self.core.now = now;
        self.core.remove_switch(conn);
        self.dispatch_app_events();
    }

    /// Consumes bytes received on a switch connection
    pub fn receive(&mut self, conn: ConnId, bytes: &[u8], now: Duration) {
        self.core.now = now;
        let events = match self.core.switches.get_mut(&conn) {
            Some(sw) => sw.receive(bytes),
            None => {
                warn!("Received {} bytes on unknown connection {:?}", bytes.len(), conn);
                return;
            }
        };
        for event in events {
            self.handle_switch_event(conn, event);
            self.dispatch_app_events();
        }
    }

    /// Runs due timers
    pub fn tick(&mut self, now: Duration) {
        self.core.now = now;
        while let Some((at, timer)) = self.timers.pop_due(now) {
            match timer {
                ControllerTimer::Refresh => {
                    for app in &mut self.apps {
                        app.refresh(&mut self.core);
                    }
                    let next = at + self.core.conf.discovery.interval;
                    self.timers.schedule_at(next, ControllerTimer::Refresh);
                }
            }
            self.dispatch_app_events();
        }
    }

    /// The time `tick` should be called next
    pub fn next_timeout(&mut self) -> Option<Duration> {
        self.timers.next_due()
    }

    /// The next message to write to a switch connection
    pub fn poll_output(&mut self, conn: ConnId) -> Option<Vec<u8>> {
        self.core.switches.get_mut(&conn).and_then(|sw| sw.poll_output())
    }

    pub fn drain_output(&mut self, conn: ConnId) -> Vec<Vec<u8>> {
        self.core
            .switches
            .get_mut(&conn)
            .map_or_else(Vec::new, |sw| sw.drain_output())
    }

    fn handle_switch_event(&mut self, conn: ConnId, event: SwitchEvent) {
        match event {
            SwitchEvent::Operational(features) => self.core.new_switch(conn, &features),
            SwitchEvent::PacketIn(packet_in) => self.packet_in(conn, &packet_in),
            SwitchEvent::BarrierReply(sync) => self.core.barrier_reply(conn, sync),
            SwitchEvent::PortStatus(status) => self.core.port_status(conn, &status),
            SwitchEvent::FlowRemoved(_) | SwitchEvent::StatsReply(_) | SwitchEvent::Error(_) => {}
        }
    }

    fn packet_in(&mut self, conn: ConnId, packet_in: &OfpPacketIn) {
        let frame = match Ethernet::parse(&packet_in.data) {
            Some(frame) => frame,
            None => {
                warn!("Packet in from {:?} does not carry an Ethernet frame", conn);
                return;
            }
        };
        for app in &mut self.apps {
            if app.receive_from_switch(&mut self.core, conn, packet_in.in_port, packet_in.buffer_id, &frame) {
                trace!("Packet from {:?} port {} claimed by {}", conn, packet_in.in_port, app.name());
                return;
            }
        }
        debug!(
            "No application claimed the packet from {:?} port {}, dropping it",
            conn, packet_in.in_port
        );
    }

    fn dispatch_app_events(&mut self) {
        while let Some(event) = self.core.events.pop_front() {
            trace!("Delivering {:?}", event);
            for app in &mut self.apps {
                match event {
                    AppEvent::InitSwitch(conn) => app.init_switch(&mut self.core, conn),
                    AppEvent::HostInstalled(ref host) => app.host_installed(&mut self.core, host),
                    AppEvent::HostUninstalled(ref host) => app.host_uninstalled(&mut self.core, host),
                    AppEvent::SyncCompleted(sync) => app.sync_completed(&mut self.core, sync),
                }
            }
        }
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::time::Duration;

    /// Drives a new connection through the handshake. Port `n` gets the
    /// hardware address `02:00:00:00:<dpid>:<n>`.
    pub fn operational(ctl: &mut Controller, dpid: u64, ports: &[u16]) -> ConnId {
        let conn = ctl.connect();
        let hello_xid = Message::deserialize(&ctl.drain_output(conn)[0]).unwrap().0;
        ctl.receive(conn, &Message::Hello.marshal(hello_xid).unwrap(), Duration::from_secs(0));
        let features_xid = Message::deserialize(&ctl.drain_output(conn)[0]).unwrap().0;
        let features = SwitchFeatures {
            datapath_id: dpid,
            n_buffers: 0,
            n_tables: 1,
            capabilities: 0,
            actions: 0,
            ports: ports
                .iter()
                .map(|&n| PhyPort::new(n, MacAddr([2, 0, 0, 0, dpid as u8, n as u8]), "eth"))
                .collect(),
        };
        ctl.receive(conn, &Message::FeaturesReply(features).marshal(features_xid).unwrap(), Duration::from_secs(0));
        conn
    }

    pub fn messages(ctl: &mut Controller, conn: ConnId) -> Vec<Message> {
        ctl.drain_output(conn)
            .iter()
            .map(|bytes| Message::deserialize(bytes).unwrap().1)
            .collect()
    }

    pub fn packet_in(ctl: &mut Controller, conn: ConnId, in_port: u16, buffer_id: u32, frame: &Ethernet) {
        packet_in_at(ctl, conn, in_port, buffer_id, frame, Duration::from_secs(1));
    }

    pub fn packet_in_at(
        ctl: &mut Controller,
        conn: ConnId,
        in_port: u16,
        buffer_id: u32,
        frame: &Ethernet,
        now: Duration,
    ) {
        let data = frame.to_bytes();
        let pi = OfpPacketIn {
            buffer_id,
            total_len: data.len() as u16,
            in_port,
            reason: OfpPacketInReason::NoMatch,
            data,
        };
        ctl.receive(conn, &Message::PacketIn(pi).marshal(1).unwrap(), now);
    }

    pub fn packet_outs(messages: Vec<Message>) -> Vec<OfpPacketOut> {
        messages
            .into_iter()
            .filter_map(|m| match m {
                Message::PacketOut(po) => Some(po),
                _ => None,
            })
            .collect()
    }

    pub fn flow_mods(messages: Vec<Message>) -> Vec<OfpFlowMod> {
        messages
            .into_iter()
            .filter_map(|m| match m {
                Message::FlowMod(fm) => Some(fm),
                _ => None,
            })
            .collect()
    }
}
