use controller::{ConnId, ControllerCore, HostAttachment};
use controller::apps::trap_flow;
use openflow::actions::{Action, ActionList};
use openflow::messages::*;
use packet::{Arp, ArpOp, Ethernet, MacAddr, ETH_TYPE_ARP};

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Duration;

const TRAP_PRIORITY: u16 = 0xfff0;

/// A request for an address nobody has claimed yet
#[derive(Debug, Clone, PartialEq)]
struct PendingRequest {
    origin: ConnId,
    in_port: u16,
    requester_mac: MacAddr,
    requester_ip: Ipv4Addr,
    since: Duration,
}

/// Learns where hosts are from their ARP traffic and answers requests
/// for known addresses on their behalf
#[derive(Debug, Default)]
pub struct ArpHandler {
    pending: HashMap<Ipv4Addr, Vec<PendingRequest>>,
}

impl ArpHandler {
    pub fn new() -> ArpHandler {
        ArpHandler::default()
    }

    /// Number of requesters waiting for `ip`
    pub fn pending_for(&self, ip: &Ipv4Addr) -> usize {
        self.pending.get(ip).map_or(0, |p| p.len())
    }

    pub fn init_switch(&mut self, core: &mut ControllerCore, conn: ConnId) {
        core.send_flow_mod(conn, trap_flow(ETH_TYPE_ARP, TRAP_PRIORITY));
    }

    pub fn host_uninstalled(&mut self, host: &HostAttachment) {
        for requests in self.pending.values_mut() {
            requests.retain(|r| r.requester_mac != host.mac);
        }
        self.pending.retain(|_, requests| !requests.is_empty());
    }

    pub fn receive_from_switch(
        &mut self,
        core: &mut ControllerCore,
        origin: ConnId,
        in_port: u16,
        _buffer_id: u32,
        frame: &Ethernet,
    ) -> bool {
        let arp = match Arp::from_frame(frame) {
            Some(arp) => arp,
            None => return false,
        };
        if core.is_switch_link(origin, in_port) {
            trace!("Dropping ARP from the switch link on port {} of {:?}", in_port, origin);
            return true;
        }

        if arp.sender_ip != Ipv4Addr::new(0, 0, 0, 0) {
            core.install_host(origin, in_port, arp.sender_mac, arp.sender_ip);
        }

        match arp.op {
            ArpOp::Request if arp.sender_ip == arp.target_ip => {
                trace!("Gratuitous ARP from {}", arp.sender_mac);
            }
            ArpOp::Request => self.request(core, origin, in_port, frame, &arp),
            ArpOp::Reply => self.reply(core, &arp),
        }
        true
    }

    fn request(&mut self, core: &mut ControllerCore, origin: ConnId, in_port: u16, frame: &Ethernet, arp: &Arp) {
        let target = core
            .topology()
            .lookup_vertex_by_address(&arp.target_ip)
            .and_then(|v| core.topology().vertex(v))
            .filter(|v| v.is_leaf())
            .map(|v| v.mac);

        match target {
            Some(target_mac) => {
                debug!("Answering who-has {} for {} with {}", arp.target_ip, arp.sender_ip, target_mac);
                let reply = arp.reply_from(target_mac).to_frame().to_bytes();
                let actions = ActionList::from(vec![Action::output(PseudoPort::InPort)]);
                core.send_packet_out(origin, OFP_NO_BUFFER, in_port, actions, reply);
            }
            None => {
                let request = PendingRequest {
                    origin,
                    in_port,
                    requester_mac: arp.sender_mac,
                    requester_ip: arp.sender_ip,
                    since: core.now(),
                };
                let requests = self.pending.entry(arp.target_ip).or_insert_with(Vec::new);
                let known = requests
                    .iter()
                    .any(|r| r.requester_mac == request.requester_mac && r.requester_ip == request.requester_ip);
                if !known {
                    requests.push(request);
                }
                debug!("{} is unknown, flooding the request from {}", arp.target_ip, arp.sender_ip);
                core.flood_packet(origin, in_port, &frame.to_bytes());
            }
        }
    }

    fn reply(&mut self, core: &mut ControllerCore, arp: &Arp) {
        if let Some(requests) = self.pending.remove(&arp.sender_ip) {
            for request in requests {
                debug!(
                    "Resolving the request of {} for {} after {:?}",
                    request.requester_ip,
                    arp.sender_ip,
                    core.now().checked_sub(request.since).unwrap_or_default()
                );
                let reply = Arp::request(request.requester_mac, request.requester_ip, arp.sender_ip)
                    .reply_from(arp.sender_mac)
                    .to_frame()
                    .to_bytes();
                let actions = ActionList::from(vec![Action::output(PseudoPort::Physical(request.in_port))]);
                core.send_packet_out(request.origin, OFP_NO_BUFFER, OFPP_NONE, actions, reply);
            }
            return;
        }

        let destination = core
            .topology()
            .lookup_vertex(&arp.target_mac)
            .and_then(|v| core.attachment(v));
        match destination {
            Some(att) => {
                let actions = ActionList::from(vec![Action::output(PseudoPort::Physical(att.port))]);
                core.send_packet_out(att.conn, OFP_NO_BUFFER, OFPP_NONE, actions, arp.to_frame().to_bytes());
            }
            None => debug!("Nobody waits for the reply from {}", arp.sender_ip),
        }
    }
}
