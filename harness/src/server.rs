use std::path::Path;
use std::process::{Child, Command};

/// Server child process, killed when dropped.
pub struct Server(Child);

impl Server {
    pub fn new(
        path: &Path,
        id: usize,
        port: u16,
        count: usize,
        failures: bool,
        verbose: u8,
    ) -> std::io::Result<Self> {
        let id = id.to_string();
        let port = port.to_string();
        let count = count.to_string();
        let mut command = Command::new(path);
        if verbose > 0 {
            let verbosity = "-".to_string() + &"v".repeat(verbose as usize);
            command.arg(&verbosity);
        }
        if !failures {
            command.arg("--no-failures");
        }
        command.args(&["-i", &id])
            .args(&["-p", &port])
            .args(&["-c", &count])
            .spawn()
            .map(Server)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.0.kill().ok();
        self.0.wait().ok();
    }
}
