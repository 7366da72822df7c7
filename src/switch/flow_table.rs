/*!
A single OpenFlow 1.0 flow table

Lookups prefer exact-match entries over wildcarded ones. Among wildcarded
entries the highest priority wins, and entries of equal priority are tried in
insertion order. Timeouts are enforced by `expire`, which the switch calls on
its sweep tick.
*/

use openflow::actions::ActionList;
use openflow::messages::*;
use packet::{Arp, ArpOp, Ethernet, Ipv4Summary, ETH_TYPE_ARP, ETH_TYPE_IPV4};

use std::net::Ipv4Addr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct FlowEntry {
    pub match_fields: OfpMatch,
    pub cookie: u64,
    pub priority: u16,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    /// OFPFF_* flags of the flow mod that created the entry
    pub flags: u16,
    pub actions: ActionList,
    pub created: Duration,
    pub last_used: Duration,
    pub packet_count: u64,
    pub byte_count: u64,
    seq: u64,
}

impl FlowEntry {
    fn new(fm: &OfpFlowMod, now: Duration, seq: u64) -> FlowEntry {
        FlowEntry {
            match_fields: fm.match_fields,
            cookie: fm.cookie,
            priority: fm.priority,
            idle_timeout: fm.idle_timeout,
            hard_timeout: fm.hard_timeout,
            flags: fm.flags,
            actions: fm.actions.clone(),
            created: now,
            last_used: now,
            packet_count: 0,
            byte_count: 0,
            seq,
        }
    }

    /// Entries without any wildcard
    pub fn is_exact(&self) -> bool {
        self.match_fields.wildcards & OFPFW_ALL == 0
    }

    /// The reason this entry has to go at `now`, if any.
    /// The hard timeout takes precedence.
    pub fn expiry(&self, now: Duration) -> Option<OfpFlowRemovedReason> {
        let hard = Duration::from_secs(u64::from(self.hard_timeout));
        let idle = Duration::from_secs(u64::from(self.idle_timeout));
        if self.hard_timeout > 0 && now >= self.created + hard {
            Some(OfpFlowRemovedReason::HardTimeout)
        }
        else if self.idle_timeout > 0 && now >= self.last_used + idle {
            Some(OfpFlowRemovedReason::IdleTimeout)
        }
        else {
            None
        }
    }

    fn age(&self, now: Duration) -> Duration {
        if now > self.created {
            now - self.created
        }
        else {
            Duration::from_secs(0)
        }
    }

    pub fn to_stats(&self, now: Duration) -> OfpFlowStats {
        let age = self.age(now);
        OfpFlowStats {
            table_id: 0,
            match_fields: self.match_fields,
            duration_sec: age.as_secs() as u32,
            duration_nsec: age.subsec_nanos(),
            priority: self.priority,
            idle_timeout: self.idle_timeout,
            hard_timeout: self.hard_timeout,
            cookie: self.cookie,
            packet_count: self.packet_count,
            byte_count: self.byte_count,
            actions: self.actions.clone(),
        }
    }

    pub fn to_removed(&self, reason: OfpFlowRemovedReason, now: Duration) -> OfpFlowRemoved {
        let age = self.age(now);
        OfpFlowRemoved {
            match_fields: self.match_fields,
            cookie: self.cookie,
            priority: self.priority,
            reason,
            duration_sec: age.as_secs() as u32,
            duration_nsec: age.subsec_nanos(),
            idle_timeout: self.idle_timeout,
            packet_count: self.packet_count,
            byte_count: self.byte_count,
        }
    }

    fn selected_by(&self, filter: &OfpMatch, priority: u16, out_port: u16, strict: bool) -> bool {
        let matched = if strict {
            self.priority == priority && self.match_fields.strict_eq(filter)
        }
        else {
            filter.covers(&self.match_fields)
        };
        matched && (out_port == OFPP_NONE || self.actions.outputs_to(out_port))
    }
}

fn nw_overlap(a: Ipv4Addr, a_bits: u32, b: Ipv4Addr, b_bits: u32) -> bool {
    let bits = if a_bits > b_bits { a_bits } else { b_bits };
    if bits >= 32 {
        return true;
    }
    let mask = !0u32 << bits;
    u32::from(a) & mask == u32::from(b) & mask
}

/// Checks whether a packet could match both `a` and `b`
fn overlaps(a: &OfpMatch, b: &OfpMatch) -> bool {
    let may_share = |flag: u32, same: bool| a.wildcards & flag != 0 || b.wildcards & flag != 0 || same;
    may_share(OFPFW_IN_PORT, a.in_port == b.in_port)
        && may_share(OFPFW_DL_SRC, a.dl_src == b.dl_src)
        && may_share(OFPFW_DL_DST, a.dl_dst == b.dl_dst)
        && may_share(OFPFW_DL_VLAN, a.dl_vlan == b.dl_vlan)
        && may_share(OFPFW_DL_VLAN_PCP, a.dl_vlan_pcp == b.dl_vlan_pcp)
        && may_share(OFPFW_DL_TYPE, a.dl_type == b.dl_type)
        && may_share(OFPFW_NW_TOS, a.nw_tos == b.nw_tos)
        && may_share(OFPFW_NW_PROTO, a.nw_proto == b.nw_proto)
        && may_share(OFPFW_TP_SRC, a.tp_src == b.tp_src)
        && may_share(OFPFW_TP_DST, a.tp_dst == b.tp_dst)
        && nw_overlap(a.nw_src, a.nw_src_wildcard_bits(), b.nw_src, b.nw_src_wildcard_bits())
        && nw_overlap(a.nw_dst, a.nw_dst_wildcard_bits(), b.nw_dst, b.nw_dst_wildcard_bits())
}

/// Builds the search key of a frame received on `in_port`: every field set,
/// no wildcards. Fields the frame does not carry stay zero.
pub fn extract_key(frame: &[u8], in_port: u16) -> OfpMatch {
    let mut key = OfpMatch::match_all();
    key.wildcards = 0;
    key.in_port = in_port;
    key.dl_vlan = OFP_VLAN_NONE;
    let eth = match Ethernet::parse(frame) {
        Some(eth) => eth,
        None => return key,
    };
    key.dl_src = eth.src;
    key.dl_dst = eth.dst;
    if let Some(tag) = eth.vlan {
        key.dl_vlan = tag.vid;
        key.dl_vlan_pcp = tag.pcp;
    }
    key.dl_type = eth.ether_type;
    match eth.ether_type {
        ETH_TYPE_IPV4 => {
            if let Some(ip) = Ipv4Summary::parse(&eth.payload) {
                key.nw_tos = ip.tos;
                key.nw_proto = ip.proto;
                key.nw_src = ip.src;
                key.nw_dst = ip.dst;
                key.tp_src = ip.tp_src;
                key.tp_dst = ip.tp_dst;
            }
        }
        ETH_TYPE_ARP => {
            if let Some(arp) = Arp::parse(&eth.payload) {
                key.nw_proto = match arp.op {
                    ArpOp::Request => 1,
                    ArpOp::Reply => 2,
                };
                key.nw_src = arp.sender_ip;
                key.nw_dst = arp.target_ip;
            }
        }
        _ => {}
    }
    key
}

#[derive(Debug)]
pub struct FlowTable {
    entries: Vec<FlowEntry>,
    max_entries: usize,
    next_seq: u64,
    lookup_count: u64,
    matched_count: u64,
}

impl FlowTable {
    pub fn new(max_entries: usize) -> FlowTable {
        FlowTable {
            entries: vec![],
            max_entries,
            next_seq: 0,
            lookup_count: 0,
            matched_count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[FlowEntry] {
        &self.entries
    }

    /// The entry a packet with the given key hits, without touching any counter
    pub fn find(&self, key: &OfpMatch) -> Option<&FlowEntry> {
        self.best_match(key).map(|i| &self.entries[i])
    }

    fn best_match(&self, key: &OfpMatch) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, entry) in self.entries.iter().enumerate() {
            if !entry.match_fields.matches(key) {
                continue;
            }
            best = match best {
                None => Some(i),
                Some(b) => {
                    let current = &self.entries[b];
                    let better = match (entry.is_exact(), current.is_exact()) {
                        (true, false) => true,
                        (false, true) => false,
                        _ => {
                            entry.priority > current.priority
                                || (entry.priority == current.priority && entry.seq < current.seq)
                        }
                    };
                    if better { Some(i) } else { Some(b) }
                }
            };
        }
        best
    }

    /// Looks up a packet of `len` bytes, accounting it to the entry it hits.
    /// Returns the actions to apply.
    pub fn lookup(&mut self, key: &OfpMatch, len: usize, now: Duration) -> Option<ActionList> {
        self.lookup_count += 1;
        let i = self.best_match(key)?;
        self.matched_count += 1;
        let entry = &mut self.entries[i];
        entry.packet_count += 1;
        entry.byte_count += len as u64;
        entry.last_used = now;
        Some(entry.actions.clone())
    }

    /// Inserts the entry described by an add flow mod.
    /// An entry with identical match and priority is replaced.
    pub fn add(&mut self, fm: &OfpFlowMod, now: Duration) -> Result<(), OfpFlowModFailedCode> {
        let identical = self.entries.iter().position(|e| {
            e.priority == fm.priority && e.match_fields.strict_eq(&fm.match_fields)
        });
        if fm.flags & OFPFF_CHECK_OVERLAP != 0 {
            let clash = self.entries.iter().enumerate().any(|(i, e)| {
                Some(i) != identical && e.priority == fm.priority
                    && overlaps(&e.match_fields, &fm.match_fields)
            });
            if clash {
                return Err(OfpFlowModFailedCode::Overlap);
            }
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        match identical {
            Some(i) => {
                debug!("Replacing flow entry {:?}", self.entries[i].match_fields);
                let old_seq = self.entries[i].seq;
                self.entries[i] = FlowEntry::new(fm, now, old_seq);
            }
            None => {
                if self.entries.len() >= self.max_entries {
                    return Err(OfpFlowModFailedCode::AllTablesFull);
                }
                self.entries.push(FlowEntry::new(fm, now, seq));
            }
        }
        Ok(())
    }

    /// Replaces the actions of the selected entries, keeping their counters.
    /// Returns the number of entries modified.
    pub fn modify(&mut self, fm: &OfpFlowMod, strict: bool) -> usize {
        let mut modified = 0;
        for entry in &mut self.entries {
            if entry.selected_by(&fm.match_fields, fm.priority, OFPP_NONE, strict) {
                entry.actions = fm.actions.clone();
                entry.cookie = fm.cookie;
                modified += 1;
            }
        }
        modified
    }

    /// Removes and returns the selected entries.
    /// `out_port` restricts the selection to entries outputting there,
    /// OFPP_NONE means no restriction.
    pub fn delete(&mut self, filter: &OfpMatch, priority: u16, out_port: u16, strict: bool) -> Vec<FlowEntry> {
        let (removed, kept): (Vec<FlowEntry>, Vec<FlowEntry>) = self
            .entries
            .drain(..)
            .partition(|e| e.selected_by(filter, priority, out_port, strict));
        self.entries = kept;
        removed
    }

    /// Removes and returns every entry whose timeout has passed
    pub fn expire(&mut self, now: Duration) -> Vec<(FlowEntry, OfpFlowRemovedReason)> {
        let mut expired = vec![];
        let mut kept = vec![];
        for entry in self.entries.drain(..) {
            match entry.expiry(now) {
                Some(reason) => expired.push((entry, reason)),
                None => kept.push(entry),
            }
        }
        self.entries = kept;
        expired
    }

    /// Statistics of the entries `filter` covers
    pub fn flow_stats(&self, filter: &OfpMatch, out_port: u16, now: Duration) -> Vec<OfpFlowStats> {
        self.entries
            .iter()
            .filter(|e| e.selected_by(filter, 0, out_port, false))
            .map(|e| e.to_stats(now))
            .collect()
    }

    pub fn aggregate_stats(&self, filter: &OfpMatch, out_port: u16) -> OfpAggregateStats {
        let mut stats = OfpAggregateStats {
            packet_count: 0,
            byte_count: 0,
            flow_count: 0,
        };
        for e in self.entries.iter().filter(|e| e.selected_by(filter, 0, out_port, false)) {
            stats.packet_count += e.packet_count;
            stats.byte_count += e.byte_count;
            stats.flow_count += 1;
        }
        stats
    }

    pub fn table_stats(&self) -> OfpTableStats {
        OfpTableStats {
            table_id: 0,
            name: "classifier".to_owned(),
            wildcards: OFPFW_ALL,
            max_entries: self.max_entries as u32,
            active_count: self.entries.len() as u32,
            lookup_count: self.lookup_count,
            matched_count: self.matched_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openflow::actions::Action;
    use packet::{ipv4_packet, MacAddr, IP_PROTO_UDP};

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn flow(m: OfpMatch, priority: u16, port: u16) -> OfpFlowMod {
        OfpFlowMod::new(
            OfpFlowModCommand::Add,
            m,
            priority,
            ActionList::from(vec![Action::output(PseudoPort::Physical(port))]),
        )
    }

    fn udp_frame(dst: Ipv4Addr) -> Vec<u8> {
        let ip = ipv4_packet(Ipv4Addr::new(10, 0, 0, 1), dst, IP_PROTO_UDP, &[0, 7, 0, 9, 0, 8, 0, 0]);
        Ethernet::new(MacAddr([2, 0, 0, 0, 0, 2]), MacAddr([2, 0, 0, 0, 0, 1]), ETH_TYPE_IPV4, ip).to_bytes()
    }

    fn out_port(actions: Option<ActionList>) -> Option<PseudoPort> {
        actions.and_then(|a| match a.iter().next() {
            Some(&Action::Output { port, .. }) => Some(port),
            _ => None,
        })
    }

    #[test]
    fn key_extraction() {
        let key = extract_key(&udp_frame(Ipv4Addr::new(10, 0, 0, 2)), 4);
        assert_eq!(0, key.wildcards);
        assert_eq!(4, key.in_port);
        assert_eq!(ETH_TYPE_IPV4, key.dl_type);
        assert_eq!(OFP_VLAN_NONE, key.dl_vlan);
        assert_eq!(IP_PROTO_UDP, key.nw_proto);
        assert_eq!(Ipv4Addr::new(10, 0, 0, 2), key.nw_dst);
        assert_eq!((7, 9), (key.tp_src, key.tp_dst));
        let arp = Arp::request(MacAddr([2, 0, 0, 0, 0, 1]), Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 3));
        let key = extract_key(&arp.to_frame().to_bytes(), 1);
        assert_eq!(ETH_TYPE_ARP, key.dl_type);
        assert_eq!(1, key.nw_proto);
        assert_eq!(Ipv4Addr::new(10, 0, 0, 3), key.nw_dst);
    }

    #[test]
    fn universal_match_hits_any_key() {
        let mut table = FlowTable::new(8);
        table.add(&flow(OfpMatch::match_all(), 0, 1), secs(0)).unwrap();
        for frame in &[udp_frame(Ipv4Addr::new(1, 2, 3, 4)), vec![1, 2, 3]] {
            let key = extract_key(frame, 9);
            assert!(table.lookup(&key, frame.len(), secs(1)).is_some());
        }
        assert_eq!(2, table.entries()[0].packet_count);
    }

    #[test]
    fn priority_then_insertion_order() {
        let mut table = FlowTable::new(8);
        let ip = OfpMatch::match_all().dl_type(ETH_TYPE_IPV4);
        table.add(&flow(OfpMatch::match_all(), 10, 1), secs(0)).unwrap();
        table.add(&flow(ip.in_port(3), 20, 2), secs(0)).unwrap();
        table.add(&flow(ip, 20, 3), secs(0)).unwrap();
        let key = extract_key(&udp_frame(Ipv4Addr::new(10, 0, 0, 2)), 3);
        assert_eq!(Some(PseudoPort::Physical(2)), out_port(table.lookup(&key, 0, secs(0))));
        let key = extract_key(&udp_frame(Ipv4Addr::new(10, 0, 0, 2)), 4);
        assert_eq!(Some(PseudoPort::Physical(3)), out_port(table.lookup(&key, 0, secs(0))));
    }

    #[test]
    fn exact_match_beats_priority() {
        let mut table = FlowTable::new(8);
        let frame = udp_frame(Ipv4Addr::new(10, 0, 0, 2));
        let key = extract_key(&frame, 1);
        table.add(&flow(OfpMatch::match_all(), 0xffff, 1), secs(0)).unwrap();
        table.add(&flow(key, 0, 2), secs(0)).unwrap();
        assert_eq!(Some(PseudoPort::Physical(2)), out_port(table.lookup(&key, 0, secs(0))));
    }

    #[test]
    fn identical_add_replaces() {
        let mut table = FlowTable::new(1);
        let m = OfpMatch::match_all().dl_type(ETH_TYPE_ARP);
        table.add(&flow(m, 5, 1), secs(0)).unwrap();
        let mut key = extract_key(&[], 0);
        key.dl_type = ETH_TYPE_ARP;
        assert!(table.lookup(&key, 0, secs(0)).is_some());
        assert_eq!(1, table.entries()[0].packet_count);
        table.add(&flow(m, 5, 2), secs(1)).unwrap();
        assert_eq!(1, table.len());
        assert_eq!(0, table.entries()[0].packet_count);
        assert_eq!(Err(OfpFlowModFailedCode::AllTablesFull), table.add(&flow(m, 6, 2), secs(1)));
    }

    #[test]
    fn check_overlap() {
        let mut table = FlowTable::new(8);
        table.add(&flow(OfpMatch::match_all().in_port(1), 5, 2), secs(0)).unwrap();
        let mut clash = flow(OfpMatch::match_all().dl_type(ETH_TYPE_IPV4), 5, 3);
        clash.flags = OFPFF_CHECK_OVERLAP;
        assert_eq!(Err(OfpFlowModFailedCode::Overlap), table.add(&clash, secs(0)));
        let mut disjoint = flow(OfpMatch::match_all().in_port(2), 5, 3);
        disjoint.flags = OFPFF_CHECK_OVERLAP;
        assert_eq!(Ok(()), table.add(&disjoint, secs(0)));
    }

    #[test]
    fn modify_and_delete() {
        let mut table = FlowTable::new(8);
        let ip = OfpMatch::match_all().dl_type(ETH_TYPE_IPV4);
        table.add(&flow(ip.in_port(1), 5, 2), secs(0)).unwrap();
        table.add(&flow(ip.in_port(2), 6, 3), secs(0)).unwrap();
        table.add(&flow(OfpMatch::match_all().dl_type(ETH_TYPE_ARP), 5, 3), secs(0)).unwrap();

        let strict = flow(ip.in_port(1), 6, 9);
        assert_eq!(0, table.modify(&strict, true));
        assert_eq!(2, table.modify(&flow(ip, 0, 9), false));

        let removed = table.delete(&OfpMatch::match_all(), 0, 3, false);
        assert_eq!(1, removed.len());
        assert_eq!(ETH_TYPE_ARP, removed[0].match_fields.dl_type);
        let removed = table.delete(&ip.in_port(2), 6, OFPP_NONE, true);
        assert_eq!(1, removed.len());
        assert_eq!(1, table.len());
        assert!(table.entries()[0].actions.outputs_to(9));
    }

    #[test]
    fn timeouts() {
        let mut table = FlowTable::new(8);
        let mut hard = flow(OfpMatch::match_all().in_port(1), 1, 2);
        hard.hard_timeout = 5;
        let mut idle = flow(OfpMatch::match_all().in_port(2), 1, 1);
        idle.idle_timeout = 2;
        table.add(&hard, secs(0)).unwrap();
        table.add(&idle, secs(0)).unwrap();

        assert!(table.expire(secs(1)).is_empty());
        table.lookup(&extract_key(&[], 2), 60, secs(1));
        assert!(table.expire(secs(2)).is_empty());
        let expired = table.expire(secs(3));
        assert_eq!(1, expired.len());
        assert_eq!(OfpFlowRemovedReason::IdleTimeout, expired[0].1);
        assert_eq!(60, expired[0].0.byte_count);
        assert!(table.find(&extract_key(&[], 1)).is_some());
        let expired = table.expire(secs(5));
        assert_eq!(OfpFlowRemovedReason::HardTimeout, expired[0].1);
        assert!(table.is_empty());
    }

    #[test]
    fn stats() {
        let mut table = FlowTable::new(8);
        table.add(&flow(OfpMatch::match_all().in_port(1), 1, 2), secs(0)).unwrap();
        table.add(&flow(OfpMatch::match_all().in_port(2), 1, 1), secs(0)).unwrap();
        table.lookup(&extract_key(&[], 1), 100, secs(1));
        let stats = table.flow_stats(&OfpMatch::match_all(), OFPP_NONE, Duration::from_millis(2500));
        assert_eq!(2, stats.len());
        assert_eq!(2, stats[0].duration_sec);
        assert_eq!(500_000_000, stats[0].duration_nsec);
        let agg = table.aggregate_stats(&OfpMatch::match_all(), 2);
        assert_eq!((1, 100, 1), (agg.packet_count, agg.byte_count, agg.flow_count));
        let t = table.table_stats();
        assert_eq!((2, 1, 1), (t.active_count, t.lookup_count, t.matched_count));
    }
}
