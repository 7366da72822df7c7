use controller::{ConnId, ControllerCore};
use controller::apps::trap_flow;
use openflow::actions::{Action, ActionList};
use openflow::messages::*;
use packet::{Ethernet, Lldp, MacAddr, ETH_TYPE_LLDP};
use topology::Adjacency;

const TRAP_PRIORITY: u16 = 0xfff0;

/// Discovers switch-to-switch links by sending LLDP frames out of every
/// switch port and listening for them on the other side
#[derive(Debug)]
pub struct LldpHandler {
    ttl: u16,
}

impl LldpHandler {
    pub fn new(ttl: u16) -> LldpHandler {
        LldpHandler { ttl }
    }

    pub fn init_switch(&mut self, core: &mut ControllerCore, conn: ConnId) {
        core.send_flow_mod(conn, trap_flow(ETH_TYPE_LLDP, TRAP_PRIORITY));
        self.probe(core, conn);
    }

    pub fn refresh(&mut self, core: &mut ControllerCore) {
        for conn in core.operational_switches() {
            self.probe(core, conn);
        }
    }

    fn probe(&self, core: &mut ControllerCore, conn: ConnId) {
        let (chassis_id, ports): (MacAddr, Vec<(u16, MacAddr)>) = match core.switch(conn) {
            Some(sw) => match sw.chassis_id() {
                Some(chassis_id) => (
                    chassis_id,
                    sw.ports()
                        .iter()
                        .filter(|p| p.port_no < OFPP_MAX)
                        .map(|p| (p.port_no, p.hw_addr))
                        .collect(),
                ),
                None => return,
            },
            None => return,
        };
        trace!("Sending LLDP out of {} ports of {}", ports.len(), chassis_id);
        for (port_no, hw_addr) in ports {
            let lldp = Lldp {
                chassis_id,
                port_id: port_no,
                ttl: self.ttl,
            };
            let actions = ActionList::from(vec![Action::output(PseudoPort::Physical(port_no))]);
            core.send_packet_out(conn, OFP_NO_BUFFER, OFPP_NONE, actions, lldp.to_frame(hw_addr).to_bytes());
        }
    }

    pub fn receive_from_switch(
        &mut self,
        core: &mut ControllerCore,
        origin: ConnId,
        in_port: u16,
        frame: &Ethernet,
    ) -> bool {
        let lldp = match Lldp::from_frame(frame) {
            Some(lldp) => lldp,
            None => return false,
        };
        let local = match core.switch_vertex(origin) {
            Some(local) => local,
            None => return true,
        };
        let peer = core
            .topology()
            .lookup_vertex(&lldp.chassis_id)
            .and_then(|v| core.vertex_conn(v).map(|c| (v, c)));
        let (peer, peer_conn) = match peer {
            Some(peer) => peer,
            None => {
                warn!("LLDP from unknown chassis {} on port {} of {:?}", lldp.chassis_id, in_port, origin);
                return true;
            }
        };
        if peer == local {
            warn!("Port {} of {:?} loops back to itself", in_port, origin);
            return true;
        }

        let new_link = core.topology().find_edge(local, peer).is_none();
        if new_link {
            core.uninstall_hosts_behind(origin, in_port);
        }
        let adj = Adjacency {
            origin: local,
            destination: peer,
            port: in_port,
            weight: 1,
        };
        core.topology_mut().add_adjacency(adj);
        core.topology_mut().add_adjacency(adj.invert(lldp.port_id));
        core.disable_flood(origin, in_port);
        core.disable_flood(peer_conn, lldp.port_id);
        if new_link {
            info!(
                "Link between port {} of {:?} and port {} of {}",
                in_port, origin, lldp.port_id, lldp.chassis_id
            );
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conf::Conf;
    use controller::Controller;
    use controller::test_support::*;
    use openflow::messages::Message;
    use std::time::Duration;

    fn lldp_in(ctl: &mut Controller, conn: ConnId, in_port: u16, lldp: &Lldp) {
        packet_in(ctl, conn, in_port, OFP_NO_BUFFER, &lldp.to_frame(MacAddr([2, 0, 0, 0, 0, 9])));
    }

    fn chassis(dpid: u64, port_id: u16) -> Lldp {
        Lldp {
            chassis_id: MacAddr::from_u64(dpid),
            port_id,
            ttl: 120,
        }
    }

    #[test]
    fn probes_every_port_on_init() {
        let mut ctl = Controller::new(Conf::default(), Duration::from_secs(0));
        let conn = operational(&mut ctl, 1, &[1, 2]);
        let outs = packet_outs(messages(&mut ctl, conn));
        let probes: Vec<Lldp> = outs
            .iter()
            .filter_map(|po| Ethernet::parse(&po.data).and_then(|f| Lldp::from_frame(&f)))
            .collect();
        assert_eq!(vec![chassis(1, 1), chassis(1, 2)], probes);
        assert!(outs[0].actions.outputs_to(1));
        assert_eq!(MacAddr([2, 0, 0, 0, 1, 1]), Ethernet::parse(&outs[0].data).unwrap().src);
    }

    #[test]
    fn refresh_probes_again() {
        let mut ctl = Controller::new(Conf::default(), Duration::from_secs(0));
        let conn = operational(&mut ctl, 1, &[1, 2]);
        messages(&mut ctl, conn);
        ctl.tick(Duration::from_secs(4));
        assert!(messages(&mut ctl, conn).is_empty());
        ctl.tick(Duration::from_secs(5));
        assert_eq!(2, packet_outs(messages(&mut ctl, conn)).len());
        assert_eq!(Some(Duration::from_secs(10)), ctl.next_timeout());
    }

    #[test]
    fn discovers_links_and_stops_flooding() {
        let mut ctl = Controller::new(Conf::default(), Duration::from_secs(0));
        let s1 = operational(&mut ctl, 1, &[1, 2]);
        let s2 = operational(&mut ctl, 2, &[1, 2]);
        messages(&mut ctl, s1);
        messages(&mut ctl, s2);

        lldp_in(&mut ctl, s1, 2, &chassis(2, 1));

        let v1 = ctl.topology().lookup_vertex(&MacAddr::from_u64(1)).unwrap();
        let v2 = ctl.topology().lookup_vertex(&MacAddr::from_u64(2)).unwrap();
        let there = ctl.topology().find_edge(v1, v2).and_then(|e| ctl.topology().edge(e)).unwrap();
        let back = ctl.topology().find_edge(v2, v1).and_then(|e| ctl.topology().edge(e)).unwrap();
        assert_eq!(2, there.port);
        assert_eq!(1, back.port);
        assert!(ctl.core().is_switch_link(s1, 2));
        assert!(ctl.core().is_switch_link(s2, 1));
        assert!(!ctl.core().is_switch_link(s1, 1));

        let port_mods: Vec<OfpPortMod> = messages(&mut ctl, s1)
            .into_iter()
            .filter_map(|m| match m {
                Message::PortMod(pm) => Some(pm),
                _ => None,
            })
            .collect();
        assert_eq!(1, port_mods.len());
        assert_eq!(2, port_mods[0].port_no);
        assert_eq!(MacAddr([2, 0, 0, 0, 1, 2]), port_mods[0].hw_addr);
        assert_eq!(OFPPC_NO_FLOOD, port_mods[0].config & port_mods[0].mask);
        assert!(!ctl.switch(s1).unwrap().flood_enabled(2));
        assert!(!ctl.switch(s2).unwrap().flood_enabled(1));
        assert_eq!(1, messages(&mut ctl, s2).len());

        lldp_in(&mut ctl, s1, 2, &chassis(2, 1));
        assert!(messages(&mut ctl, s1).is_empty());
    }

    #[test]
    fn ignores_unknown_chassis() {
        let mut ctl = Controller::new(Conf::default(), Duration::from_secs(0));
        let s1 = operational(&mut ctl, 1, &[1, 2]);
        messages(&mut ctl, s1);
        lldp_in(&mut ctl, s1, 1, &chassis(7, 1));
        assert_eq!(1, ctl.topology().len());
        assert!(ctl.switch(s1).unwrap().flood_enabled(1));
        assert!(messages(&mut ctl, s1).is_empty());
    }
}
