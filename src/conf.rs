/*!
A parser for an INI file with the following structure:

```ini
[Connection]
uri=tcp:192.0.2.1:6633

[Discovery]
; seconds between two LLDP probe rounds
interval=5
; TTL advertised in the probes
ttl=120

[Routing]
; destinations outside of this network are sent to the gateway
network=192.0.2.0/24
gateway=192.0.2.254
; 0 installs permanent flows
idle_timeout=60
priority=32768

[Switch]
miss_send_len=128
```

Every section and key is optional.
*/

use openflow::messages::{OFP_DEFAULT_MISS_SEND_LEN, OFP_DEFAULT_PRIORITY, OFP_TCP_PORT};

use ini::ini;
use ini::Ini;

use ipnetwork::Ipv4Network;

use std::error;
use std::fmt;
use std::io;
use std::net::*;
use std::str::FromStr;
use std::time::Duration;

const CONN_SECTION: &str = "Connection";
const URI_KEY: &str = "uri";

const DISCOVERY_SECTION: &str = "Discovery";
const INTERVAL_KEY: &str = "interval";
const TTL_KEY: &str = "ttl";

const ROUTING_SECTION: &str = "Routing";
const NETWORK_KEY: &str = "network";
const GATEWAY_KEY: &str = "gateway";
const IDLE_TIMEOUT_KEY: &str = "idle_timeout";
const PRIORITY_KEY: &str = "priority";

const SWITCH_SECTION: &str = "Switch";
const MISS_SEND_LEN_KEY: &str = "miss_send_len";

const DEFAULT_DISCOVERY_SECS: u64 = 5;
const DEFAULT_LLDP_TTL: u16 = 120;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Ini(ini::Error),
    InvalidValue(&'static str, &'static str, String),
    InvalidUri,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref e) => write!(f, "{}", e),
            Error::Ini(ref e) => write!(f, "{}", e),
            Error::InvalidValue(s, k, ref e) => {
                write!(f, "The INI [{}] section has an invalid '{}' value: {}", s, k, e)
            }
            Error::InvalidUri => write!(f, "The OpenFlow Connection URI from INI file is invalid"),
        }
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Io(ioe) => ioe,
            _ => io::Error::new(io::ErrorKind::InvalidData, e),
        }
    }
}
impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}
impl From<ini::ParseError> for Error {
    fn from(e: ini::ParseError) -> Self {
        Error::Ini(ini::Error::Parse(e))
    }
}

impl error::Error for Error {
    fn description(&self) -> &str {
        "INI configuration parser error"
    }
}

trait Section {
    type S;

    fn from_ini(conf: &Ini) -> Result<Self::S, Error>;
}

/// Parses the value of `key` if it is present
fn parse_entry<T>(conf: &Ini, section: &'static str, key: &'static str) -> Result<Option<T>, Error>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match conf.get_from(Some(section), key) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|e: T::Err| Error::InvalidValue(section, key, format!("'{}': {}", value, e))),
        None => Ok(None),
    }
}

#[derive(Debug, PartialEq)]
enum ConnectionProtocol {
    Tcp,
}
impl FromStr for ConnectionProtocol {
    type Err = Error;

    fn from_str(proto: &str) -> Result<ConnectionProtocol, Self::Err> {
        match proto {
            "tcp" => Ok(ConnectionProtocol::Tcp),
            _ => Err(Error::InvalidUri),
        }
    }
}

/// Where the controller listens for switches
#[derive(Debug, PartialEq)]
pub struct OfConnection {
    proto: ConnectionProtocol,
    pub socket: SocketAddr,
}

impl Section for OfConnection {
    type S = OfConnection;

    fn from_ini(conf: &Ini) -> Result<Self::S, Error> {
        debug!("Reading [{}] section", CONN_SECTION);

        match conf.get_from(Some(CONN_SECTION), URI_KEY) {
            Some(uri) => OfConnection::from_str(uri),
            None => Ok(OfConnection::default()),
        }
    }
}

impl FromStr for OfConnection {
    type Err = Error;

    fn from_str(conn: &str) -> Result<OfConnection, Self::Err> {
        let def_port = OFP_TCP_PORT.to_string();
        let mut conn_split: Vec<_> = conn.split(':').collect();
        if conn_split.len() == 2 {
            conn_split.push(&def_port);
        }
        if conn_split.len() == 3 {
            let joined = &format!("{}:{}", conn_split[1], conn_split[2]);
            if let Ok(socket) = SocketAddr::from_str(joined) {
                let connection = OfConnection {
                    proto: ConnectionProtocol::from_str(conn_split[0])?,
                    socket,
                };
                debug!("Got {:?}", connection);
                return Ok(connection);
            }
        }
        Err(Error::InvalidUri)
    }
}

impl Default for OfConnection {
    fn default() -> Self {
        let socket_v4 = SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), OFP_TCP_PORT);
        OfConnection {
            proto: ConnectionProtocol::Tcp,
            socket: SocketAddr::V4(socket_v4),
        }
    }
}

/// LLDP topology discovery settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Discovery {
    pub interval: Duration,
    pub ttl: u16,
}

impl Default for Discovery {
    fn default() -> Self {
        Discovery {
            interval: Duration::from_secs(DEFAULT_DISCOVERY_SECS),
            ttl: DEFAULT_LLDP_TTL,
        }
    }
}

impl Section for Discovery {
    type S = Discovery;

    fn from_ini(conf: &Ini) -> Result<Self::S, Error> {
        debug!("Reading [{}] section", DISCOVERY_SECTION);

        let mut discovery = Discovery::default();
        if let Some(secs) = parse_entry::<u64>(conf, DISCOVERY_SECTION, INTERVAL_KEY)? {
            if secs == 0 {
                let e = "the interval must be positive".to_owned();
                return Err(Error::InvalidValue(DISCOVERY_SECTION, INTERVAL_KEY, e));
            }
            discovery.interval = Duration::from_secs(secs);
        }
        if let Some(ttl) = parse_entry(conf, DISCOVERY_SECTION, TTL_KEY)? {
            discovery.ttl = ttl;
        }

        debug!("Got {:?}", discovery);
        Ok(discovery)
    }
}

/// Settings of the flows the routing application installs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Routing {
    pub network: Option<Ipv4Network>,
    pub gateway: Option<Ipv4Addr>,
    pub idle_timeout: u16,
    pub priority: u16,
}

impl Default for Routing {
    fn default() -> Self {
        Routing {
            network: None,
            gateway: None,
            idle_timeout: 0,
            priority: OFP_DEFAULT_PRIORITY,
        }
    }
}

impl Routing {
    /// Whether `ip` has to be reached through the gateway
    pub fn is_external(&self, ip: Ipv4Addr) -> bool {
        self.network.map_or(false, |net| !net.contains(ip))
    }
}

impl Section for Routing {
    type S = Routing;

    fn from_ini(conf: &Ini) -> Result<Self::S, Error> {
        debug!("Reading [{}] section", ROUTING_SECTION);

        let defaults = Routing::default();
        let routing = Routing {
            network: parse_entry(conf, ROUTING_SECTION, NETWORK_KEY)?,
            gateway: parse_entry(conf, ROUTING_SECTION, GATEWAY_KEY)?,
            idle_timeout: parse_entry(conf, ROUTING_SECTION, IDLE_TIMEOUT_KEY)?
                .unwrap_or(defaults.idle_timeout),
            priority: parse_entry(conf, ROUTING_SECTION, PRIORITY_KEY)?.unwrap_or(defaults.priority),
        };

        debug!("Got {:?}", routing);
        Ok(routing)
    }
}

/// What the controller configures on every switch after the handshake
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwitchSettings {
    pub miss_send_len: u16,
}

impl Default for SwitchSettings {
    fn default() -> Self {
        SwitchSettings {
            miss_send_len: OFP_DEFAULT_MISS_SEND_LEN,
        }
    }
}

impl Section for SwitchSettings {
    type S = SwitchSettings;

    fn from_ini(conf: &Ini) -> Result<Self::S, Error> {
        debug!("Reading [{}] section", SWITCH_SECTION);

        let settings = SwitchSettings {
            miss_send_len: parse_entry(conf, SWITCH_SECTION, MISS_SEND_LEN_KEY)?
                .unwrap_or(OFP_DEFAULT_MISS_SEND_LEN),
        };

        debug!("Got {:?}", settings);
        Ok(settings)
    }
}

/// The whole controller configuration
#[derive(Debug, Default, PartialEq)]
pub struct Conf {
    pub connection: OfConnection,
    pub discovery: Discovery,
    pub routing: Routing,
    pub switch: SwitchSettings,
}

impl Conf {
    fn from_ini(conf: &Ini) -> Result<Conf, Error> {
        Ok(Conf {
            connection: OfConnection::from_ini(conf)?,
            discovery: Discovery::from_ini(conf)?,
            routing: Routing::from_ini(conf)?,
            switch: SwitchSettings::from_ini(conf)?,
        })
    }
}

impl FromStr for Conf {
    type Err = Error;

    fn from_str(ini: &str) -> Result<Conf, Self::Err> {
        Conf::from_ini(&Ini::load_from_str(ini)?)
    }
}

pub fn parse_file(path: &str) -> Result<Conf, Error> {
    info!("Reading INI file {}", path);

    let conf = match Ini::load_from_file(path) {
        Ok(i) => i,
        Err(e) => {
            return Err(Error::Ini(e));
        }
    };
    Conf::from_ini(&conf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(Conf::default(), Conf::from_str("").unwrap());
    }

    #[test]
    fn parses_all_sections() {
        let conf = Conf::from_str(
            "[Connection]\nuri=tcp:0.0.0.0\n\
             [Discovery]\ninterval=2\nttl=10\n\
             [Routing]\nnetwork=10.0.0.0/8\ngateway=10.0.0.254\nidle_timeout=30\npriority=100\n\
             [Switch]\nmiss_send_len=0\n",
        ).unwrap();
        assert_eq!("0.0.0.0:6633".parse::<SocketAddr>().unwrap(), conf.connection.socket);
        assert_eq!(Duration::from_secs(2), conf.discovery.interval);
        assert_eq!(10, conf.discovery.ttl);
        assert_eq!(Some(Ipv4Addr::new(10, 0, 0, 254)), conf.routing.gateway);
        assert_eq!(30, conf.routing.idle_timeout);
        assert_eq!(100, conf.routing.priority);
        assert_eq!(0, conf.switch.miss_send_len);
        assert!(conf.routing.is_external(Ipv4Addr::new(192, 0, 2, 1)));
        assert!(!conf.routing.is_external(Ipv4Addr::new(10, 1, 2, 3)));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Conf::from_str("[Connection]\nuri=udp:127.0.0.1:1\n").is_err());
        assert!(Conf::from_str("[Routing]\nnetwork=10.0.0.0/33\n").is_err());
        assert!(Conf::from_str("[Discovery]\ninterval=0\n").is_err());
        assert!(Conf::from_str("[Switch]\nmiss_send_len=-1\n").is_err());
    }

    #[test]
    fn connection_uri() {
        let conn = OfConnection::from_str("tcp:192.0.2.1:6653").unwrap();
        assert_eq!("192.0.2.1:6653".parse::<SocketAddr>().unwrap(), conn.socket);
        assert!(OfConnection::from_str("tcp").is_err());
    }
}
