/*!
The ofroute controller daemon.

Switches connect over TCP. The controller discovers the links between them
with LLDP, learns hosts from their ARP traffic and installs shortest path
flows for IPv4 traffic between the hosts.
You can use mininet as a test network. To spawn a linear topology of three
switches, each with one host, you can run:

```sh
# mn --controller remote,port=6633 --topo linear,3 --switch ovs,protocols=OpenFlow10
```
*/

#[macro_use]
extern crate clap;
#[macro_use]
extern crate log;
extern crate ofroute;
extern crate simple_logger;

#[cfg(unix)]
extern crate log_panics;
#[cfg(unix)]
extern crate syslog;
#[cfg(unix)]
extern crate libc;

use ofroute::conf;
use ofroute::conf::Conf;
use ofroute::controller::{ConnId, Controller};

use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::io::prelude::*;
use std::net::{Shutdown, TcpListener, TcpStream};
use std::process::exit;
use std::sync::mpsc;
use std::sync::mpsc::{RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

const TICK_MILLIS: u64 = 100;
const READ_BUF_LEN: usize = 4096;

/// What the network threads report to the controller thread
enum NetEvent {
    Accepted(TcpStream),
    Data(ConnId, Vec<u8>),
    Closed(ConnId),
}

/// Accepts switch connections forever
fn accept_switches(listener: TcpListener, tx: Sender<NetEvent>) {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                if tx.send(NetEvent::Accepted(stream)).is_err() {
                    return;
                }
            }
            Err(e) => warn!("Accepting a connection failed: {}", e),
        }
    }
}

/// Forwards everything read from a switch to the controller thread
fn read_switch(conn: ConnId, mut stream: TcpStream, tx: Sender<NetEvent>) {
    let mut buf = [0; READ_BUF_LEN];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(NetEvent::Data(conn, buf[..n].to_vec())).is_err() {
                    return;
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("Reading from {:?} failed: {}", conn, e);
                break;
            }
        }
    }
    let _ = tx.send(NetEvent::Closed(conn));
}

/// Owns the controller and all writing halves of the switch connections
struct Daemon {
    controller: Controller,
    streams: HashMap<ConnId, TcpStream>,
    started: Instant,
    tx: Sender<NetEvent>,
}

impl Daemon {
    fn now(&self) -> Duration {
        self.started.elapsed()
    }

    fn accepted(&mut self, stream: TcpStream) -> io::Result<()> {
        let addr = stream.peer_addr()?;
        let reader = stream.try_clone()?;
        let conn = self.controller.connect();
        info!("Connection from {} is {:?}", addr, conn);
        let tx = self.tx.clone();
        thread::spawn(move || read_switch(conn, reader, tx));
        self.streams.insert(conn, stream);
        Ok(())
    }

    fn closed(&mut self, conn: ConnId) {
        if let Some(stream) = self.streams.remove(&conn) {
            let _ = stream.shutdown(Shutdown::Both);
        }
        let now = self.now();
        self.controller.disconnect(conn, now);
    }

    /// Writes everything the controller queued. Broken connections are closed.
    fn flush(&mut self) {
        let mut broken = vec![];
        for conn in self.controller.connections() {
            let stream = match self.streams.get_mut(&conn) {
                Some(stream) => stream,
                None => continue,
            };
            for bytes in self.controller.drain_output(conn) {
                if let Err(e) = stream.write_all(&bytes) {
                    error!("Writing to {:?} failed: {}", conn, e);
                    broken.push(conn);
                    break;
                }
            }
        }
        for conn in broken {
            self.closed(conn);
        }
    }

    fn handle(&mut self, event: NetEvent) {
        match event {
            NetEvent::Accepted(stream) => {
                if let Err(e) = self.accepted(stream) {
                    error!("Cannot serve the new connection: {}", e);
                }
            }
            NetEvent::Data(conn, bytes) => {
                trace!("{} bytes from {:?}", bytes.len(), conn);
                let now = self.now();
                self.controller.receive(conn, &bytes, now);
            }
            NetEvent::Closed(conn) => {
                info!("{:?} closed its connection", conn);
                self.closed(conn);
            }
        }
    }

    /// Runs the controller loop, ticking the timers every `TICK_MILLIS`
    fn run(conf: Conf) -> io::Result<()> {
        let listener = TcpListener::bind(conf.connection.socket)?;
        info!("Listening on {}", listener.local_addr()?);

        let (tx, rx) = mpsc::channel();
        let accept_tx = tx.clone();
        thread::spawn(move || accept_switches(listener, accept_tx));

        let started = Instant::now();
        let mut daemon = Daemon {
            controller: Controller::new(conf, Duration::from_secs(0)),
            streams: HashMap::new(),
            started,
            tx,
        };
        let tick = Duration::from_millis(TICK_MILLIS);
        loop {
            match rx.recv_timeout(tick) {
                Ok(event) => daemon.handle(event),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "inter-thread communication failed",
                    ));
                }
            }
            let now = daemon.now();
            daemon.controller.tick(now);
            daemon.flush();
        }
    }
}

/// Reads command line arguments and calls the corresponding functions.
fn handle_cli_args() -> io::Result<()> {
    #[cfg(unix)]
    let unix_opts =
        "-p, --pid <file> 'Daemonizes the process and writes a PID file'
        -s, --syslog      'Logs via syslog'
        ";
    #[cfg(not(unix))]
    let unix_opts = "";

    let usage = &format!(
        "{}-v...          'Repeat to set the level of verbosity'
        -c, --conf [ini]  'The INI configuration file'"
    , unix_opts);
    let matches = app_from_crate!().args_from_usage(usage).get_matches();

    let log_lvl = match matches.occurrences_of("v") {
        0 => log::Level::Error,
        1 => log::Level::Warn,
        2 => log::Level::Info,
        3 => log::Level::Debug,
        _ => log::Level::Trace,
    };

    if matches.is_present("syslog") {
        #[cfg(unix)] {
            syslog::init(syslog::Facility::LOG_USER, log_lvl.to_level_filter(), Some(crate_name!()))
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
            log_panics::init();
        }
    }
    else {
        simple_logger::init_with_level(log_lvl)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    }

    let conf = match matches.value_of("conf") {
        Some(path) => conf::parse_file(path)?,
        None => {
            info!("No configuration file given, using the defaults");
            Conf::default()
        }
    };

    #[cfg(unix)] {
        if let Some(pid_path) = matches.value_of("pid") {
            let pid = unsafe { libc::fork() };
            if pid < 0 {
                return Err(io::Error::last_os_error());
            }
            else if pid > 0 {
                // exit the parent process
                exit(0);
            }
            let mut file = File::create(pid_path)?;
            write!(file, "{}", unsafe { libc::getpid() })?;
        }
    }

    Daemon::run(conf)
}

/// Entry function with top level error handling.
fn main() {
    if let Err(e) = handle_cli_args() {
        error!("{}", e);
        exit(1);
    }
}
