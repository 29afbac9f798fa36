//! Entry point for `apns-mock`.
//!
//! Parses CLI arguments, loads TLS material and runs the accept loop.  All
//! protocol work is delegated to the library; `main.rs` owns only process
//! setup (logging, argument parsing).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use apns_mock::simulator::{DEFAULT_MAX_PAYLOAD_LEN, DEFAULT_TOKEN_LEN};
use apns_mock::{tls, FaultConfig, PolicyKind, ProcessConfig, Server};

/// Mock push-notification gateway for exercising provider clients.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Address to listen on.
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    /// PEM certificate chain.
    #[arg(long, default_value = "cert.pem")]
    cert: PathBuf,

    /// PEM private key.
    #[arg(long, default_value = "key.pem")]
    key: PathBuf,

    /// Serve plain TCP instead of TLS.
    #[arg(long)]
    plain: bool,

    /// Minimum artificial delay before each reply, in milliseconds.
    #[arg(long, default_value_t = 0)]
    min_delay_ms: u64,

    /// Maximum artificial delay before each reply, in milliseconds.
    #[arg(long, default_value_t = 0)]
    max_delay_ms: u64,

    /// How replies are computed.
    #[arg(long, value_enum, default_value_t = PolicyArg::Bounds)]
    policy: PolicyArg,

    /// Status sequence replayed by `--policy scripted`, e.g. `5,0,7`.
    #[arg(long, value_delimiter = ',')]
    statuses: Vec<u8>,

    /// Payloads longer than this get status 7.
    #[arg(long, default_value_t = DEFAULT_MAX_PAYLOAD_LEN)]
    max_payload: usize,

    /// Device tokens of any other length get status 5.
    #[arg(long, default_value_t = DEFAULT_TOKEN_LEN)]
    token_len: usize,

    /// Probability of withholding a successful reply.
    #[arg(long)]
    withhold_rate: Option<f64>,

    /// Probability of replacing the status with a random error (1..=8).
    #[arg(long)]
    error_rate: Option<f64>,

    /// Probability of replying 255 and closing the connection.
    #[arg(long)]
    disconnect_rate: Option<f64>,

    /// Start from the classic misbehaving-gateway fault mix; explicit rates
    /// still override it.
    #[arg(long)]
    chaos: bool,

    /// Seed per-connection RNGs for reproducible delays and faults.
    #[arg(long)]
    seed: Option<u64>,

    /// Accept any token/payload length in formats 0 and 1.
    #[arg(long)]
    unbounded_legacy: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PolicyArg {
    /// Check payload and token lengths.
    Bounds,
    /// Replay `--statuses`.
    Scripted,
}

impl Cli {
    fn policy(&self) -> PolicyKind {
        match self.policy {
            PolicyArg::Bounds => PolicyKind::BoundsCheck {
                max_payload_len: self.max_payload,
                token_len: self.token_len,
            },
            PolicyArg::Scripted => PolicyKind::Scripted(self.statuses.clone()),
        }
    }

    fn faults(&self) -> FaultConfig {
        let mut faults = if self.chaos {
            FaultConfig::chaos()
        } else {
            FaultConfig::default()
        };
        if let Some(rate) = self.withhold_rate {
            faults.withhold_rate = rate;
        }
        if let Some(rate) = self.error_rate {
            faults.error_rate = rate;
        }
        if let Some(rate) = self.disconnect_rate {
            faults.disconnect_rate = rate;
        }
        faults
    }

    fn process_config(&self) -> Result<ProcessConfig> {
        let mut config = ProcessConfig::new()
            .with_delay(
                Duration::from_millis(self.min_delay_ms),
                Duration::from_millis(self.max_delay_ms),
            )
            .with_faults(self.faults())
            .with_legacy_bounds(!self.unbounded_legacy);
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    let config = cli.process_config()?;

    let acceptor = if cli.plain {
        None
    } else {
        let server_config = tls::load_server_config(&cli.cert, &cli.key)
            .context("loading TLS certificate and key")?;
        Some(tls::acceptor(server_config))
    };

    let policy = cli.policy();
    log::info!("reply policy: {policy:?}; delay {:?}", config.delay);

    let server = Server::bind(cli.listen, acceptor, policy.factory(), config)
        .await
        .with_context(|| format!("binding {}", cli.listen))?;
    server.run().await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("apns-mock").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_match_the_classic_gateway() {
        let cli = parse(&[]);
        assert_eq!(cli.listen, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(cli.cert, PathBuf::from("cert.pem"));
        assert!(!cli.plain);
        assert_eq!(cli.policy(), PolicyKind::default());
        let config = cli.process_config().unwrap();
        assert!(config.faults.is_disabled());
        assert!(config.legacy_bounds);
    }

    #[test]
    fn scripted_statuses_are_comma_separated() {
        let cli = parse(&["--policy", "scripted", "--statuses", "5,0,7"]);
        assert_eq!(cli.policy(), PolicyKind::Scripted(vec![5, 0, 7]));
    }

    #[test]
    fn explicit_rate_overrides_chaos() {
        let cli = parse(&["--chaos", "--withhold-rate", "0"]);
        let faults = cli.faults();
        assert_eq!(faults.withhold_rate, 0.0);
        assert_eq!(faults.disconnect_rate, FaultConfig::chaos().disconnect_rate);
    }

    #[test]
    fn inverted_delays_are_rejected() {
        let cli = parse(&["--min-delay-ms", "10", "--max-delay-ms", "5"]);
        assert!(cli.process_config().is_err());
    }
}
