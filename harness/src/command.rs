use serde_derive::{Serialize, Deserialize};

#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug)]
pub struct Execution(pub Vec<Command>);

#[derive(Serialize, Deserialize)]
#[serde(tag = "type")]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Start a server listening for clients on `base_port + id`
    Start {
        id: usize,
        count: usize,
        base_port: u16,

        /// Keep the failure simulator running
        #[serde(default)]
        failures: bool,
    },

    /// Send a PUT request to the specified server
    Put {
        id: usize,
        key: String,
        value: String,
    },

    /// Send a GET request to the specified server
    Get {
        id: usize,
        key: String,
    },

    /// Send a DELETE request to the specified server
    Delete {
        id: usize,
        key: String,
    },

    /// Ask the specified server to clear Paxos state cluster-wide
    Reset {
        id: usize,
    },

    /// Crash the specified server
    Crash {
        id: usize,
    },

    /// Sleep the test harness for `ms` milliseconds
    Sleep {
        ms: u64,
    },

    /// Check what the specified server reads for `key`; `null` means missing
    Expect {
        id: usize,
        key: String,
        value: Option<String>,
    },
}
