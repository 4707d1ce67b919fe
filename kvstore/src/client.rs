use std::io::Write;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use structopt::StructOpt;
use tokio::io::{AsyncBufReadExt, BufReader};

use kvpaxos::external::{Client, Request};

#[derive(Debug, PartialEq, Eq)]
enum Command {
    /// Connect to the given server
    Connect {
        addr: SocketAddr,
    },

    /// Disconnect from the current server
    Disconnect,

    Get {
        key: String,
    },

    Put {
        key: String,
        value: String,
    },

    Delete {
        key: String,
    },

    /// Clear Paxos state across the cluster
    Reset,

    Help,
}

fn usage() {
    println!(
        "{}{}{}{}{}{}{}{}{}",
        "--------------------------------------------------------------------\n",
        "Possible commands:\n",
        "connect <ADDR>    | c <ADDR>        -- Connect to server at <ADDR> or port\n",
        "disconnect        | x               -- Disconnect from current server\n",
        "get <KEY>         | g <KEY>         -- Read <KEY> from current server\n",
        "put <KEY> <VALUE> | p <KEY> <VALUE> -- Write <KEY> through the cluster\n",
        "delete <KEY>      | d <KEY>         -- Delete <KEY> through the cluster\n",
        "reset             | r               -- Start a new paxos run\n",
        "--------------------------------------------------------------------",
    );
}

/// Accepts a full socket address, or a bare port on the loopback interface.
fn parse_addr(raw: &str) -> Option<SocketAddr> {
    raw.parse::<SocketAddr>()
        .ok()
        .or_else(|| raw.parse::<u16>().ok().map(|port| SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)))
}

impl std::str::FromStr for Command {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut iter = s.split_whitespace();
        let command = match iter.next() {
        | Some("help") | Some("h") => Command::Help,
        | Some("reset") | Some("r") => Command::Reset,
        | Some("disconnect") | Some("x") => Command::Disconnect,
        | Some("connect") | Some("c") => {
            let addr = iter.next().and_then(parse_addr).ok_or(())?;
            Command::Connect { addr }
        }
        | Some("get") | Some("g") => {
            let key = iter.next().ok_or(())?.to_owned();
            Command::Get { key }
        }
        | Some("delete") | Some("d") => {
            let key = iter.next().ok_or(())?.to_owned();
            Command::Delete { key }
        }
        | Some("put") | Some("p") => {
            let key = iter.next().ok_or(())?.to_owned();
            let value = iter.collect::<Vec<_>>().join(" ");
            if value.is_empty() {
                return Err(());
            }
            Command::Put { key, value }
        }
        | _ => return Err(()),
        };
        Ok(command)
    }
}

/// Scripted warm-up: five writes, five reads, five deletes, two writes.
fn prepopulate() -> Vec<Request> {
    let mut requests = Vec::new();
    for index in 1..=5 {
        requests.push(Request::Put { key: format!("Key{}", index), value: format!("Value{}", index) });
    }
    for index in 1..=5 {
        requests.push(Request::Get { key: format!("Key{}", index) });
    }
    for index in 1..=5 {
        requests.push(Request::Delete { key: format!("Key{}", index) });
    }
    for index in 1..=2 {
        requests.push(Request::Put { key: format!("Key{}", index), value: format!("Value{}", index) });
    }
    requests
}

async fn send(client: &mut Option<Client>, request: Request) {
    let connection = match client.as_mut() {
    | Some(connection) => connection,
    | None => {
        println!("[ERROR]: not connected to a server");
        return;
    }
    };
    match connection.call(request).await {
    | Ok(response) => println!("[RESPONSE]: {}", response),
    | Err(error) => {
        println!("[ERROR]: {}", error);
        *client = None;
    }
    }
}

async fn connect(addr: SocketAddr) -> Option<Client> {
    match Client::connect(addr).await {
    | Ok(client) => {
        println!("[RESPONSE]: connected to server at {}", addr);
        Some(client)
    }
    | Err(error) => {
        println!("[ERROR]: failed to connect to server at {}: {}", addr, error);
        None
    }
    }
}

async fn run(opt: Opt) {
    let mut client = match opt.addr {
    | Some(addr) => connect(addr).await,
    | None => None,
    };

    if opt.prepopulate {
        for request in prepopulate() {
            send(&mut client, request).await;
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    // Main interaction loop
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let line = match lines.next_line().await {
        | Ok(Some(line)) => line,
        | Ok(None) => break,
        | Err(error) => {
            log::error!("failed to read input: {}", error);
            break;
        }
        };

        if line.trim().is_empty() {
            continue;
        }

        let command = match line.parse::<Command>() {
        | Ok(command) => command,
        | Err(()) => {
            println!("[ERROR]: could not parse command");
            continue
        }
        };

        match command {
        | Command::Connect { addr } => client = connect(addr).await,
        | Command::Disconnect => client = None,
        | Command::Get { key } => send(&mut client, Request::Get { key }).await,
        | Command::Put { key, value } => send(&mut client, Request::Put { key, value }).await,
        | Command::Delete { key } => send(&mut client, Request::Delete { key }).await,
        | Command::Reset => send(&mut client, Request::Reset).await,
        | Command::Help => usage(),
        }
    }
}

#[derive(StructOpt)]
#[structopt(name = "kvstore-client")]
struct Opt {
    /// Server to connect to on startup
    #[structopt(short = "a", long = "addr", parse(try_from_str = parse_socket))]
    addr: Option<SocketAddr>,

    /// Run the warm-up script before reading commands
    #[structopt(long = "prepopulate")]
    prepopulate: bool,

    /// Log verbosity (-v, -vv, -vvv)
    #[structopt(short = "v", parse(from_occurrences))]
    verbose: u8,
}

fn parse_socket(raw: &str) -> Result<SocketAddr, String> {
    parse_addr(raw).ok_or_else(|| format!("invalid address {}", raw))
}

#[tokio::main]
async fn main() {
    let opt = Opt::from_args();
    if let Err(error) = kvstore::init_logging(opt.verbose) {
        eprintln!("failed to install logger: {}", error);
    }
    run(opt).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_and_aliases() {
        assert_eq!("c 8001".parse(), Ok(Command::Connect { addr: "127.0.0.1:8001".parse().unwrap() }));
        assert_eq!("connect 10.0.0.2:9000".parse(), Ok(Command::Connect { addr: "10.0.0.2:9000".parse().unwrap() }));
        assert_eq!("p Key1 hello world".parse(), Ok(Command::Put { key: "Key1".into(), value: "hello world".into() }));
        assert_eq!("d Key1".parse(), Ok(Command::Delete { key: "Key1".into() }));
        assert_eq!("x".parse(), Ok(Command::Disconnect));
        assert_eq!("put Key1".parse::<Command>(), Err(()));
        assert_eq!("launch".parse::<Command>(), Err(()));
    }

    #[test]
    fn warm_up_script_shape() {
        let script = prepopulate();
        assert_eq!(script.len(), 17);
        assert_eq!(script[0], Request::Put { key: "Key1".into(), value: "Value1".into() });
        assert_eq!(script[14], Request::Delete { key: "Key5".into() });
        assert_eq!(script[16], Request::Put { key: "Key2".into(), value: "Value2".into() });
    }
}
