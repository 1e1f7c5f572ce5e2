//! Network-layer fault injection via `iptables` (C9, network fault variant)

use tokio::process::Command;
use tracing::{event, instrument, Level};

use crate::error::Error;

const CHAIN: &str = "OUTPUT";
const COMMENT: &str = "disruptor-network-drop";

/// A network-drop fault installed as a temporary `iptables` rule
pub struct NetworkDrop {
    port: Option<u16>,
    protocol: String,
}

impl NetworkDrop {
    /// Build a network-drop fault for a port/protocol pair
    ///
    /// # Arguments
    ///
    /// * `port` - The port to drop traffic for; `None` drops every port
    /// * `protocol` - `tcp`, `udp`, `icmp`, or `all`
    #[must_use]
    pub fn new(port: Option<u16>, protocol: &str) -> Self {
        NetworkDrop {
            port,
            protocol: protocol.to_owned(),
        }
    }

    fn rule_args(&self, action: &str) -> Vec<String> {
        let mut args = vec![
            action.to_owned(),
            CHAIN.to_owned(),
            "-m".to_owned(),
            "comment".to_owned(),
            "--comment".to_owned(),
            COMMENT.to_owned(),
        ];
        if self.protocol != "all" && self.protocol != "icmp" {
            args.push("-p".to_owned());
            args.push(self.protocol.clone());
            if let Some(port) = self.port {
                args.push("--dport".to_owned());
                args.push(port.to_string());
            }
        } else if self.protocol == "icmp" {
            args.push("-p".to_owned());
            args.push("icmp".to_owned());
        }
        args.push("-j".to_owned());
        args.push("DROP".to_owned());
        args
    }

    /// Install the drop rule
    #[instrument(name = "NetworkDrop::install", skip_all, err(Debug))]
    pub async fn install(&self) -> Result<(), Error> {
        self.run(&self.rule_args("-A")).await
    }

    /// Remove the drop rule; safe to call even if it was never installed
    #[instrument(name = "NetworkDrop::revert", skip_all, err(Debug))]
    pub async fn revert(&self) -> Result<(), Error> {
        self.run(&self.rule_args("-D")).await
    }

    async fn run(&self, args: &[String]) -> Result<(), Error> {
        event!(Level::INFO, args = args.join(" "), "running iptables");
        let output = Command::new("iptables").args(args).output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            return Err(Error::IpTables(stderr));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_args_include_port_and_protocol() {
        let drop = NetworkDrop::new(Some(443), "tcp");
        let args = drop.rule_args("-A");
        assert!(args.contains(&"-p".to_string()));
        assert!(args.contains(&"tcp".to_string()));
        assert!(args.contains(&"--dport".to_string()));
        assert!(args.contains(&"443".to_string()));
        assert!(args.contains(&"-j".to_string()));
        assert!(args.contains(&"DROP".to_string()));
    }

    #[test]
    fn rule_args_for_all_protocol_has_no_protocol_filter() {
        let drop = NetworkDrop::new(None, "all");
        let args = drop.rule_args("-A");
        assert!(!args.contains(&"-p".to_string()));
        assert!(!args.contains(&"--dport".to_string()));
    }

    #[test]
    fn revert_uses_delete_flag() {
        let drop = NetworkDrop::new(Some(53), "udp");
        let args = drop.rule_args("-D");
        assert_eq!(args[0], "-D");
    }
}
