/*!
An OpenFlow 1.0 controller and switch agent.

The `openflow` module holds the wire codec. `switch` is the switch side of
the protocol with its flow table, `controller` the controller side with the
topology discovery, ARP and routing applications. Both agents are sans-IO:
they consume bytes, queue the bytes to send and are driven by a virtual
clock, so the daemon and the tests can wire them to whatever transport.
*/

extern crate byteorder;
extern crate ipnetwork;
extern crate ini;
#[macro_use]
extern crate log;
extern crate rand;

pub mod conf;
pub mod controller;
pub mod openflow;
pub mod packet;
pub mod sched;
pub mod switch;
pub mod topology;
