use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mxprobe_lib::{EngineConfig, TransportMode};

#[derive(Parser)]
#[command(name = "mxprobe-cli", version, about = "Verify the mail exchangers of a domain")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Option<Commands>,

    /// format: human|json|ndjson|csv
    #[arg(long, global = true, default_value = "human")]
    pub format: String,

    /// write report to file (JSON/NDJSON/CSV per --format)
    #[arg(long, global = true)]
    pub out: Option<String>,

    /// transport: direct|proxy|disabled (overrides MXPROBE_TRANSPORT)
    #[arg(long, global = true)]
    pub transport: Option<String>,

    /// base URL of the SMTP probe proxy
    #[arg(long = "proxy-endpoint", global = true)]
    pub proxy_endpoint: Option<String>,

    /// RBL zone to query (repeatable, replaces the defaults)
    #[arg(long = "rbl", global = true)]
    pub rbl: Vec<String>,

    /// EHLO name and MAIL FROM domain
    #[arg(long, global = true)]
    pub identity: Option<String>,

    /// per-connection timeout (ms)
    #[arg(long = "timeout-ms", global = true)]
    pub timeout_ms: Option<u64>,

    /// upper bound for one domain (ms, 0 disables)
    #[arg(long = "deadline-ms", global = true)]
    pub deadline_ms: Option<u64>,

    /// log filter when RUST_LOG is unset
    #[arg(long = "log-level", global = true, default_value = "warn")]
    pub log_level: String,

    /// log format: text|json
    #[arg(long = "log-format", global = true, default_value = "text")]
    pub log_format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Probe, RBL-check and score every exchanger
    Verify {
        domains: Vec<String>,
        /// read domains from stdin (one per line)
        #[arg(long)]
        stdin: bool,
    },
    /// Show MX hosts and addresses without probing
    List {
        domains: Vec<String>,
        /// read domains from stdin (one per line)
        #[arg(long)]
        stdin: bool,
    },
    /// Load the TLD and disposable-domain reference lists
    Lists {
        /// domains to look up in the loaded lists
        domains: Vec<String>,
    },
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn clap_command() -> clap::Command {
        <Self as clap::CommandFactory>::command()
    }

    /// Environment first, flags on top.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = EngineConfig::from_env().context("read configuration from environment")?;
        self.apply(&mut config)?;
        Ok(config)
    }

    fn apply(&self, config: &mut EngineConfig) -> Result<()> {
        if let Some(transport) = &self.transport {
            config.transport = transport
                .parse::<TransportMode>()
                .map_err(anyhow::Error::msg)?;
        }
        if let Some(endpoint) = &self.proxy_endpoint {
            config.proxy_endpoint = Some(endpoint.trim().to_string());
        }
        if !self.rbl.is_empty() {
            *config = std::mem::take(config).with_rbl_providers(self.rbl.iter().cloned());
        }
        if let Some(identity) = &self.identity {
            config.probe_identity = identity.trim().to_string();
        }
        if let Some(ms) = self.timeout_ms {
            config.direct_timeout = Duration::from_millis(ms);
            config.proxy_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.deadline_ms {
            config.aggregate_deadline = (ms > 0).then(|| Duration::from_millis(ms));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        <Cli as Parser>::try_parse_from(args).expect("valid arguments")
    }

    #[test]
    fn flags_override_defaults() {
        let cli = parse(&[
            "mxprobe-cli",
            "verify",
            "example.com",
            "--transport",
            "proxy",
            "--proxy-endpoint",
            "http://127.0.0.1:8080",
            "--rbl",
            "zen.spamhaus.org",
            "--deadline-ms",
            "0",
            "--timeout-ms",
            "2500",
        ]);
        let mut config = EngineConfig::default();
        cli.apply(&mut config).expect("apply");

        assert_eq!(config.transport, TransportMode::Proxy);
        assert_eq!(config.proxy_endpoint.as_deref(), Some("http://127.0.0.1:8080"));
        assert_eq!(config.rbl_providers, vec!["zen.spamhaus.org"]);
        assert_eq!(config.aggregate_deadline, None);
        assert_eq!(config.direct_timeout, Duration::from_millis(2500));
        assert!(matches!(cli.cmd, Some(Commands::Verify { ref domains, stdin: false }) if domains == &["example.com"]));
    }

    #[test]
    fn unknown_transport_is_rejected() {
        let cli = parse(&["mxprobe-cli", "--transport", "smoke-signals", "list", "example.com"]);
        let mut config = EngineConfig::default();
        assert!(cli.apply(&mut config).is_err());
    }
}
