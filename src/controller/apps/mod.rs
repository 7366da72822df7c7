//! Controller applications
//!
//! The set of applications is closed. The controller asks them in ascending
//! priority order to handle a packet-in; the first one returning `true` claims
//! the packet. Notifications go to all of them.

mod arp;
mod lldp;
mod routing;

pub use self::arp::ArpHandler;
pub use self::lldp::LldpHandler;
pub use self::routing::RoutingHandler;

use controller::{ConnId, ControllerCore, HostAttachment, SyncId};
use openflow::actions::{Action, ActionList};
use openflow::messages::*;
use packet::Ethernet;

#[derive(Debug)]
pub enum App {
    Arp(ArpHandler),
    Lldp(LldpHandler),
    Routing(RoutingHandler),
}

impl App {
    pub fn name(&self) -> &'static str {
        match *self {
            App::Arp(_) => "arp",
            App::Lldp(_) => "lldp",
            App::Routing(_) => "routing",
        }
    }

    /// Lower values are asked first
    pub fn priority(&self) -> u16 {
        match *self {
            App::Arp(_) => 250,
            App::Lldp(_) => 250,
            App::Routing(_) => 750,
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
        match *self {
            App::Arp(ref mut app) => app.receive_from_switch(core, origin, in_port, buffer_id, frame),
            App::Lldp(ref mut app) => app.receive_from_switch(core, origin, in_port, frame),
            App::Routing(ref mut app) => app.receive_from_switch(core, origin, in_port, buffer_id, frame),
        }
    }

    pub fn init_switch(&mut self, core: &mut ControllerCore, conn: ConnId) {
        match *self {
            App::Arp(ref mut app) => app.init_switch(core, conn),
            App::Lldp(ref mut app) => app.init_switch(core, conn),
            App::Routing(ref mut app) => app.init_switch(core, conn),
        }
    }

    pub fn host_installed(&mut self, core: &mut ControllerCore, host: &HostAttachment) {
        if let App::Routing(ref mut app) = *self {
            app.host_installed(core, host);
        }
    }

    pub fn host_uninstalled(&mut self, core: &mut ControllerCore, host: &HostAttachment) {
        match *self {
            App::Arp(ref mut app) => app.host_uninstalled(host),
            App::Routing(ref mut app) => app.host_uninstalled(core, host),
            App::Lldp(_) => {}
        }
    }

    pub fn sync_completed(&mut self, core: &mut ControllerCore, sync: SyncId) {
        if let App::Routing(ref mut app) = *self {
            app.sync_completed(core, sync);
        }
    }

    /// Periodic work
    pub fn refresh(&mut self, core: &mut ControllerCore) {
        if let App::Lldp(ref mut app) = *self {
            app.refresh(core);
        }
    }
}

/// A flow sending every frame of an ether type to the controller
fn trap_flow(dl_type: u16, priority: u16) -> OfpFlowMod {
    let mut actions = ActionList::new();
    actions.append(Action::Output {
        port: PseudoPort::Controller,
        max_len: 0xffff,
    });
    OfpFlowMod::new(
        OfpFlowModCommand::Add,
        OfpMatch::match_all().dl_type(dl_type),
        priority,
        actions,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priorities_order_routing_last() {
        let mut apps = vec![
            App::Routing(RoutingHandler::new(Default::default())),
            App::Arp(ArpHandler::new()),
            App::Lldp(LldpHandler::new(120)),
        ];
        apps.sort_by_key(|app| app.priority());
        let names: Vec<&str> = apps.iter().map(|app| app.name()).collect();
        assert_eq!(vec!["arp", "lldp", "routing"], names);
    }

    #[test]
    fn trap_sends_whole_frames() {
        let fm = trap_flow(0x0806, 100);
        assert_eq!(OfpFlowModCommand::Add, fm.command);
        assert_eq!(0x0806, fm.match_fields.dl_type);
        assert_eq!(0, fm.match_fields.wildcards & OFPFW_DL_TYPE);
        assert!(fm.actions.outputs_to(OFPP_CONTROLLER));
    }
}
