/*!
Shortest path routing of IPv4 traffic

Every host the controller learns gets a delivery flow on its access switch.
A packet that misses those flows is routed along the shortest path through
the topology: every switch-to-switch hop on the path gets a flow towards
the destination. The triggering packet is held back until a barrier round
confirms that all switches applied the new flows and is then sent through
the flow table of the switch it came from.

Destinations outside of the configured network, or not known at all, are
routed to the gateway host, in which case the last hop is programmed too.
*/

use conf::Routing;
use controller::{ConnId, ControllerCore, HostAttachment, SyncId};
use controller::apps::trap_flow;
use openflow::actions::{Action, ActionList};
use openflow::messages::*;
use packet::{Ethernet, Ipv4Summary, ETH_TYPE_IPV4};

use std::collections::HashMap;
use std::net::Ipv4Addr;

/// A packet waiting for a sync round to complete
#[derive(Debug, Clone, PartialEq)]
struct Release {
    origin: ConnId,
    in_port: u16,
    buffer_id: u32,
    data: Vec<u8>,
}

#[derive(Debug)]
pub struct RoutingHandler {
    conf: Routing,
    pending: HashMap<SyncId, Release>,
}

fn delivery_match(ip: Ipv4Addr) -> OfpMatch {
    OfpMatch::match_all().dl_type(ETH_TYPE_IPV4).nw_dst(ip)
}

impl RoutingHandler {
    pub fn new(conf: Routing) -> RoutingHandler {
        RoutingHandler {
            conf,
            pending: HashMap::new(),
        }
    }

    /// Packets waiting for their path to be confirmed
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn init_switch(&mut self, core: &mut ControllerCore, conn: ConnId) {
        core.send_flow_mod(conn, trap_flow(ETH_TYPE_IPV4, 0));
    }

    pub fn host_installed(&mut self, core: &mut ControllerCore, host: &HostAttachment) {
        for &ip in &host.addresses {
            let actions = ActionList::from(vec![Action::output(PseudoPort::Physical(host.port))]);
            let fm = OfpFlowMod::new(OfpFlowModCommand::Add, delivery_match(ip), self.conf.priority, actions);
            core.send_flow_mod(host.conn, fm);
        }
    }

    pub fn host_uninstalled(&mut self, core: &mut ControllerCore, host: &HostAttachment) {
        for &ip in &host.addresses {
            let fm = OfpFlowMod::new(
                OfpFlowModCommand::DeleteStrict,
                delivery_match(ip),
                self.conf.priority,
                ActionList::new(),
            );
            core.send_flow_mod(host.conn, fm);
        }
    }

    pub fn sync_completed(&mut self, core: &mut ControllerCore, sync: SyncId) {
        if let Some(release) = self.pending.remove(&sync) {
            debug!("Path confirmed, releasing the packet from port {}", release.in_port);
            release_packet(core, release);
        }
    }

    pub fn receive_from_switch(
        &mut self,
        core: &mut ControllerCore,
        origin: ConnId,
        in_port: u16,
        buffer_id: u32,
        frame: &Ethernet,
    ) -> bool {
        if frame.ether_type != ETH_TYPE_IPV4 {
            return false;
        }
        let ip = match Ipv4Summary::parse(&frame.payload) {
            Some(ip) => ip,
            None => {
                debug!("Malformed IPv4 packet from port {} of {:?}", in_port, origin);
                return false;
            }
        };

        let src = {
            let topology = core.topology();
            topology
                .lookup_vertex_by_address(&ip.src)
                .or_else(|| topology.lookup_vertex(&frame.src))
                .and_then(|v| topology.vertex(v))
                .map(|v| v.mac)
        };
        let src = match src {
            Some(src) => src,
            None => {
                debug!("Source {} is unknown", ip.src);
                return false;
            }
        };

        let (dst, via_gateway) = {
            let topology = core.topology();
            let direct = if self.conf.is_external(ip.dst) {
                None
            }
            else {
                topology.lookup_vertex_by_address(&ip.dst)
            };
            match direct {
                Some(v) => (topology.vertex(v).map(|v| v.mac), false),
                None => (
                    self.conf
                        .gateway
                        .and_then(|gw| topology.lookup_vertex_by_address(&gw))
                        .and_then(|v| topology.vertex(v))
                        .map(|v| v.mac),
                    true,
                ),
            }
        };
        let dst = match dst {
            Some(dst) => dst,
            None => {
                debug!("Destination {} is unknown and there is no gateway", ip.dst);
                return false;
            }
        };

        let path = core.topology().find_shortest_path(&src, &dst);
        if path.is_empty() {
            debug!("No path from {} to {}", src, dst);
            return false;
        }

        let mut programmed = 0;
        for adj in &path {
            let conn = match core.vertex_conn(adj.origin) {
                Some(conn) => conn,
                None => continue,
            };
            let to_switch = core.vertex_conn(adj.destination).is_some();
            if !to_switch && !via_gateway {
                continue;
            }
            let actions = ActionList::from(vec![Action::output(PseudoPort::Physical(adj.port))]);
            let mut fm = OfpFlowMod::new(OfpFlowModCommand::Add, delivery_match(ip.dst), self.conf.priority, actions);
            fm.idle_timeout = self.conf.idle_timeout;
            if core.send_flow_mod(conn, fm) {
                programmed += 1;
            }
        }

        let release = Release {
            origin,
            in_port,
            buffer_id,
            data: frame.to_bytes(),
        };
        if programmed == 0 {
            release_packet(core, release);
        }
        else {
            let sync = core.start_sync();
            info!(
                "Routing {} to {} over {} hops, waiting for {:?}",
                ip.src,
                ip.dst,
                path.len(),
                sync
            );
            self.pending.insert(sync, release);
        }
        true
    }
}

fn release_packet(core: &mut ControllerCore, release: Release) {
    let actions = ActionList::from(vec![Action::output(PseudoPort::Table)]);
    core.send_packet_out(release.origin, release.buffer_id, release.in_port, actions, release.data);
}
