/*!
The controller's view of the network

Vertices are hosts, servers and switches keyed by their hardware address.
Adjacencies are directed edges carrying the egress port on their origin.
The graph never adds the reverse of an edge by itself.

Vertices and edges live in arenas and refer to each other by index. Removing
a vertex leaves a tombstone, so indices are never reused and edges pointing
at a removed vertex simply lead nowhere.
*/

use controller::ConnId;
use packet::MacAddr;

use std::collections::HashMap;
use std::net::Ipv4Addr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(usize);

/// What a host vertex knows about the end system behind it
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HostInfo {
    /// Name of the access or multicast profile in use
    pub profile: String,
    /// Whether the host's session is up
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VertexKind {
    Host(HostInfo),
    Server(HostInfo),
    /// A switch, reachable through the control connection
    Switch(ConnId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    /// The chassis id for switches
    pub mac: MacAddr,
    pub kind: VertexKind,
    edges: Vec<EdgeId>,
    addresses: Vec<Ipv4Addr>,
}

impl Vertex {
    fn new(mac: MacAddr, kind: VertexKind) -> Vertex {
        Vertex {
            mac,
            kind,
            edges: vec![],
            addresses: vec![],
        }
    }

    /// End systems are leaves, switches are not
    pub fn is_leaf(&self) -> bool {
        match self.kind {
            VertexKind::Host(_) | VertexKind::Server(_) => true,
            VertexKind::Switch(_) => false,
        }
    }

    pub fn conn(&self) -> Option<ConnId> {
        match self.kind {
            VertexKind::Switch(conn) => Some(conn),
            _ => None,
        }
    }

    pub fn edges(&self) -> &[EdgeId] {
        &self.edges
    }

    pub fn addresses(&self) -> &[Ipv4Addr] {
        &self.addresses
    }
}

/// A directed edge, `port` being the egress port on `origin`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adjacency {
    pub origin: VertexId,
    pub destination: VertexId,
    pub port: u16,
    pub weight: u32,
}

impl Adjacency {
    /// The edge in the opposite direction, leaving `destination` through `port`
    pub fn invert(&self, port: u16) -> Adjacency {
        Adjacency {
            origin: self.destination,
            destination: self.origin,
            port,
            weight: self.weight,
        }
    }
}

#[derive(Debug, Default)]
pub struct Topology {
    vertices: Vec<Option<Vertex>>,
    by_mac: HashMap<MacAddr, VertexId>,
    edges: Vec<Adjacency>,
}

impl Topology {
    pub fn new() -> Topology {
        Topology::default()
    }

    fn upsert(&mut self, mac: MacAddr, kind: VertexKind) -> VertexId {
        if let Some(&id) = self.by_mac.get(&mac) {
            return id;
        }
        let id = VertexId(self.vertices.len());
        debug!("New vertex {} for {}", id.0, mac);
        self.vertices.push(Some(Vertex::new(mac, kind)));
        self.by_mac.insert(mac, id);
        id
    }

    /// Returns the existing vertex if `mac` is already known
    pub fn add_host(&mut self, mac: MacAddr) -> VertexId {
        self.upsert(mac, VertexKind::Host(HostInfo::default()))
    }

    /// Returns the existing vertex if `mac` is already known
    pub fn add_server(&mut self, mac: MacAddr) -> VertexId {
        self.upsert(mac, VertexKind::Server(HostInfo::default()))
    }

    /// Adds the switch with the given chassis id.
    /// A known switch is rebound to the connection it is reachable through now.
    pub fn add_switch(&mut self, chassis_id: MacAddr, conn: ConnId) -> VertexId {
        let id = self.upsert(chassis_id, VertexKind::Switch(conn));
        if let Some(vertex) = self.vertex_mut(id) {
            if let VertexKind::Switch(ref mut c) = vertex.kind {
                *c = conn;
            }
        }
        id
    }

    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        self.vertices.get(id.0).and_then(|v| v.as_ref())
    }

    pub fn vertex_mut(&mut self, id: VertexId) -> Option<&mut Vertex> {
        self.vertices.get_mut(id.0).and_then(|v| v.as_mut())
    }

    pub fn lookup_vertex(&self, mac: &MacAddr) -> Option<VertexId> {
        self.by_mac.get(mac).cloned()
    }

    /// Finds the vertex an address is bound to by scanning all vertices
    pub fn lookup_vertex_by_address(&self, ip: &Ipv4Addr) -> Option<VertexId> {
        self.live_vertices()
            .find(|&(_, v)| v.addresses.contains(ip))
            .map(|(id, _)| id)
    }

    /// Binds a network layer address to a vertex
    pub fn bind_address(&mut self, id: VertexId, ip: Ipv4Addr) {
        if let Some(vertex) = self.vertex_mut(id) {
            if !vertex.addresses.contains(&ip) {
                vertex.addresses.push(ip);
            }
        }
    }

    /// Removes the vertex from the lookup map.
    /// Edges of other vertices pointing at it are left in place.
    pub fn remove_vertex(&mut self, mac: &MacAddr) -> Option<Vertex> {
        let id = self.by_mac.remove(mac)?;
        debug!("Removing vertex {} for {}", id.0, mac);
        self.vertices.get_mut(id.0).and_then(|v| v.take())
    }

    pub fn live_vertices<'a>(&'a self) -> Box<Iterator<Item = (VertexId, &'a Vertex)> + 'a> {
        Box::new(
            self.vertices
                .iter()
                .enumerate()
                .filter_map(|(i, v)| v.as_ref().map(|v| (VertexId(i), v))),
        )
    }

    pub fn len(&self) -> usize {
        self.by_mac.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_mac.is_empty()
    }

    pub fn find_edge(&self, from: VertexId, to: VertexId) -> Option<EdgeId> {
        let vertex = self.vertex(from)?;
        vertex
            .edges
            .iter()
            .find(|&&e| self.edges[e.0].destination == to)
            .cloned()
    }

    /// Adds an edge of weight 1 leaving `from` through `port`.
    /// An existing edge between the same vertices is returned unchanged.
    pub fn add_edge(&mut self, from: VertexId, to: VertexId, port: u16) -> Option<EdgeId> {
        self.add_adjacency(Adjacency {
            origin: from,
            destination: to,
            port,
            weight: 1,
        })
    }

    /// Adds `adj` unless its origin already has an edge to the same destination.
    /// `None` if either end is not in the graph.
    pub fn add_adjacency(&mut self, adj: Adjacency) -> Option<EdgeId> {
        self.vertex(adj.destination)?;
        self.vertex(adj.origin)?;
        if let Some(existing) = self.find_edge(adj.origin, adj.destination) {
            return Some(existing);
        }
        let id = EdgeId(self.edges.len());
        self.edges.push(adj);
        if let Some(vertex) = self.vertex_mut(adj.origin) {
            vertex.edges.push(id);
        }
        Some(id)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Adjacency> {
        self.edges.get(id.0)
    }

    /// Edges leaving `from`, including those that lead to removed vertices
    pub fn edges_from<'a>(&'a self, from: VertexId) -> Box<Iterator<Item = &'a Adjacency> + 'a> {
        match self.vertex(from) {
            Some(vertex) => Box::new(vertex.edges.iter().map(move |e| &self.edges[e.0])),
            None => Box::new(None::<&Adjacency>.into_iter()),
        }
    }

    /// Live vertices reached from `from` through `port`
    pub fn neighbours_via(&self, from: VertexId, port: u16) -> Vec<VertexId> {
        self.edges_from(from)
            .filter(|adj| adj.port == port && self.vertex(adj.destination).is_some())
            .map(|adj| adj.destination)
            .collect()
    }

    /// Checks whether `port` of switch `from` is a confirmed link to another switch
    pub fn is_switch_link(&self, from: VertexId, port: u16) -> bool {
        self.neighbours_via(from, port)
            .iter()
            .any(|&v| self.vertex(v).map_or(false, |v| !v.is_leaf()))
    }

    /// Dijkstra over the live vertices.
    /// Returns the edges from `from` to `to` in order, empty if either is
    /// unknown or `to` cannot be reached.
    pub fn find_shortest_path(&self, from: &MacAddr, to: &MacAddr) -> Vec<Adjacency> {
        let (src, dst) = match (self.lookup_vertex(from), self.lookup_vertex(to)) {
            (Some(src), Some(dst)) => (src.0, dst.0),
            _ => return vec![],
        };
        let n = self.vertices.len();
        let mut dist = vec![u64::max_value(); n];
        let mut prev: Vec<Option<EdgeId>> = vec![None; n];
        let mut visited = vec![false; n];
        dist[src] = 0;

        loop {
            let mut closest: Option<usize> = None;
            for v in 0..n {
                if visited[v] || self.vertices[v].is_none() || dist[v] == u64::max_value() {
                    continue;
                }
                if closest.map_or(true, |c| dist[v] < dist[c]) {
                    closest = Some(v);
                }
            }
            let u = match closest {
                Some(u) => u,
                None => break,
            };
            if u == dst {
                break;
            }
            visited[u] = true;
            let origin = match self.vertices[u] {
                Some(ref vertex) => vertex,
                None => continue,
            };
            for &e in &origin.edges {
                let adj = &self.edges[e.0];
                let v = adj.destination.0;
                if v >= n || self.vertices[v].is_none() {
                    continue;
                }
                let alt = dist[u] + u64::from(adj.weight);
                if alt < dist[v] {
                    dist[v] = alt;
                    prev[v] = Some(e);
                }
            }
        }

        let mut path = vec![];
        let mut current = dst;
        while let Some(e) = prev[current] {
            let adj = self.edges[e.0];
            path.push(adj);
            current = adj.origin.0;
        }
        path.reverse();
        if path.first().map(|adj| adj.origin.0) != Some(src) {
            return vec![];
        }
        path
    }
}
