use std::collections::HashMap as Map;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use structopt::StructOpt;

use kvpaxos::external::{Client, Request, Response};

mod command;
mod server;

use crate::command::{Command, Execution};
use crate::server::Server;

#[derive(StructOpt)]
#[structopt(name = "harness")]
struct Opt {
    /// Path to the kvstore-server binary
    #[structopt(short = "s", long = "server")]
    server: PathBuf,

    /// JSON script to play
    #[structopt(short = "f", long = "file")]
    file: PathBuf,

    /// Attempts to reach a server's client port
    #[structopt(long = "retries", default_value = "50")]
    retries: usize,

    /// Log verbosity, also passed on to servers (-v, -vv, -vvv)
    #[structopt(short = "v", parse(from_occurrences))]
    verbose: u8,
}

/// Client port of server `id`, if it is a valid port number.
fn client_port(base_port: u16, id: usize) -> Option<u16> {
    base_port.checked_add(u16::try_from(id).ok()?)
}

/// State of one script run.
struct Harness {
    opt: Opt,
    servers: Map<usize, Server>,
    addrs: Map<usize, SocketAddr>,
    connections: Map<usize, Client>,
    failures: usize,
}

impl Harness {
    fn new(opt: Opt) -> Self {
        Harness {
            opt,
            servers: Map::default(),
            addrs: Map::default(),
            connections: Map::default(),
            failures: 0,
        }
    }

    /// Connection to server `id`, dialed on first use. Servers only accept
    /// clients once their cluster is resolved, so dialing retries.
    async fn client(&mut self, id: usize) -> Option<&mut Client> {
        if !self.connections.contains_key(&id) {
            let addr = match self.addrs.get(&id) {
            | Some(addr) => *addr,
            | None => {
                println!("[ERROR]: server {} was never started", id);
                return None;
            }
            };
            let mut attempt = 0;
            let client = loop {
                attempt += 1;
                match Client::connect(addr).await {
                | Ok(client) => break client,
                | Err(error) if attempt >= self.opt.retries => {
                    println!("[ERROR]: could not connect to server {} at {}: {}", id, addr, error);
                    return None;
                }
                | Err(_) => tokio::time::sleep(Duration::from_millis(200)).await,
                }
            };
            self.connections.insert(id, client);
        }
        self.connections.get_mut(&id)
    }

    async fn call(&mut self, id: usize, request: Request) -> Option<Response> {
        let client = self.client(id).await?;
        match client.call(request).await {
        | Ok(response) => {
            println!("Server {} responded: {}", id, response);
            Some(response)
        }
        | Err(error) => {
            println!("[ERROR]: server {} failed: {}", id, error);
            self.connections.remove(&id);
            None
        }
        }
    }

    async fn execute(&mut self, command: Command) {
        println!("Executing command {:?}", command);
        match command {
        | Command::Start { id, count, base_port, failures } => {
            let port = match client_port(base_port, id) {
            | Some(port) => port,
            | None => {
                println!("[ERROR]: server {} does not fit above base port {}", id, base_port);
                self.failures += 1;
                return;
            }
            };
            match Server::new(&self.opt.server, id, port, count, failures, self.opt.verbose) {
            | Ok(server) => {
                self.servers.insert(id, server);
                self.addrs.insert(id, SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port));
            }
            | Err(error) => {
                println!("[ERROR]: could not spawn server {}: {}", id, error);
                self.failures += 1;
            }
            }
        }
        | Command::Put { id, key, value } => {
            self.call(id, Request::Put { key, value }).await;
        }
        | Command::Get { id, key } => {
            self.call(id, Request::Get { key }).await;
        }
        | Command::Delete { id, key } => {
            self.call(id, Request::Delete { key }).await;
        }
        | Command::Reset { id } => {
            self.call(id, Request::Reset).await;
        }
        | Command::Crash { id } => {
            self.connections.remove(&id);
            self.servers.remove(&id);
        }
        | Command::Sleep { ms } => {
            tokio::time::sleep(Duration::from_millis(ms)).await
        }
        | Command::Expect { id, key, value } => {
            let actual = match self.call(id, Request::Get { key: key.clone() }).await {
            | Some(Response::Value { value, .. }) => Some(value),
            | Some(Response::NotFound { .. }) => None,
            | _ => {
                println!("[FAIL]: server {} could not read {}", id, key);
                self.failures += 1;
                return;
            }
            };
            if actual != value {
                println!("[FAIL]: server {} read {:?} for {}, expected {:?}", id, actual, key, value);
                self.failures += 1;
            }
        }
        }
    }
}

#[tokio::main]
async fn main() {
    let opt = Opt::from_args();
    if let Err(error) = kvstore::init_logging(opt.verbose) {
        eprintln!("failed to install logger: {}", error);
    }

    let execution: Execution = match std::fs::File::open(&opt.file)
        .map_err(|error| error.to_string())
        .and_then(|file| serde_json::from_reader(file).map_err(|error| error.to_string()))
    {
    | Ok(execution) => execution,
    | Err(error) => {
        log::error!("could not load {}: {}", opt.file.display(), error);
        std::process::exit(2);
    }
    };

    let mut harness = Harness::new(opt);
    for command in execution.0 {
        harness.execute(command).await;
    }

    let failures = harness.failures;
    drop(harness);
    if failures > 0 {
        println!("{} expectation(s) failed", failures);
        std::process::exit(1);
    }
}
