use std::net::SocketAddr;
use std::time::Duration;

use structopt::StructOpt;

use kvpaxos::{FailureConfig, RegistryConfig};

#[derive(StructOpt)]
#[structopt(name = "kvstore-server")]
struct Opt {
    /// Index of this server in the cluster, starting from zero
    #[structopt(short = "i", long = "id")]
    id: usize,

    /// Port to listen on for client requests
    #[structopt(short = "p", long = "port")]
    port: u16,

    /// Total number of servers
    #[structopt(short = "c", long = "count")]
    count: usize,

    /// Comma-separated peer address of every server, in index order.
    /// Defaults to 127.0.0.1 with consecutive ports from 20000.
    #[structopt(long = "peers", use_delimiter = true)]
    peers: Vec<SocketAddr>,

    /// Timeout between servers
    #[structopt(short = "t", long = "timeout", default_value = "1s", parse(try_from_str = kvstore::parse_duration))]
    timeout: Duration,

    /// Wait before the first simulated failure draw
    #[structopt(long = "failure-delay", default_value = "15s", parse(try_from_str = kvstore::parse_duration))]
    failure_delay: Duration,

    /// Time between simulated failure draws
    #[structopt(long = "failure-interval", default_value = "15s", parse(try_from_str = kvstore::parse_duration))]
    failure_interval: Duration,

    /// Chance that a draw takes the acceptor down
    #[structopt(long = "failure-probability", default_value = "0.2")]
    failure_probability: f64,

    /// Seed for the failure simulator
    #[structopt(long = "seed")]
    seed: Option<u64>,

    /// Disable the failure simulator
    #[structopt(long = "no-failures")]
    no_failures: bool,

    /// Attempts to reach each peer at startup
    #[structopt(long = "retries", default_value = "5")]
    retries: usize,

    /// Pause between attempts to reach a peer
    #[structopt(long = "backoff", default_value = "2s", parse(try_from_str = kvstore::parse_duration))]
    backoff: Duration,

    /// Log verbosity (-v, -vv, -vvv)
    #[structopt(short = "v", parse(from_occurrences))]
    verbose: u8,
}

impl Opt {
    fn failures(&self) -> FailureConfig {
        if self.no_failures {
            return FailureConfig::disabled();
        }
        let failures = FailureConfig::default()
            .with_delay(self.failure_delay)
            .with_interval(self.failure_interval)
            .with_probability(self.failure_probability);
        match self.seed {
        | Some(seed) => failures.with_seed(seed),
        | None => failures,
        }
    }

    fn config(&self) -> kvpaxos::Config {
        let mut config = kvpaxos::Config::new(self.id, self.port, self.count)
            .with_timeout(self.timeout)
            .with_failures(self.failures())
            .with_registry(RegistryConfig::default().with_retries(self.retries).with_backoff(self.backoff));
        if !self.peers.is_empty() {
            config = config.with_peers(self.peers.clone());
        }
        config
    }
}

#[tokio::main]
async fn main() {
    let opt = Opt::from_args();
    if let Err(error) = kvstore::init_logging(opt.verbose) {
        eprintln!("failed to install logger: {}", error);
    }

    let running = match opt.config().run().await {
    | Ok(running) => running,
    | Err(error) => {
        log::error!("failed to start: {}", error);
        std::process::exit(1);
    }
    };

    log::info!("serving clients on {}", running.client_addr());
    if let Err(error) = tokio::signal::ctrl_c().await {
        log::error!("failed to wait for shutdown signal: {}", error);
    }
    log::info!("shutting down");
    drop(running);
}
