use anyhow::{Context, bail};
use clap::Parser;
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};
use tracing_subscriber::filter::LevelFilter;

/// Runtime configuration for the `bmcd-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file in the working directory is loaded first), with defaults
/// suitable for running behind a Prometheus scraper.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "bmcd-server",
    version,
    about = "gRPC front-end for baseboard management controllers"
)]
pub struct CliArgs {
    /// TCP port the gRPC listener binds on all interfaces.
    ///
    /// Environment variable: `PORT`
    #[arg(long, env = "PORT", default_value_t = String::from("9090"))]
    pub port: String,

    /// Address the Prometheus `/metrics` endpoint listens on.
    ///
    /// Either `host:port` or `:port`, the latter meaning all interfaces.
    ///
    /// Environment variable: `METRICS_LISTEN_ADDR`
    #[arg(long, env = "METRICS_LISTEN_ADDR", default_value_t = String::from(":8080"))]
    pub metrics_listen_addr: String,

    /// Log verbosity: `off`, `error`, `warn`, `info`, `debug` or `trace`.
    ///
    /// `RUST_LOG` directives, when set, refine this default.
    ///
    /// Environment variable: `LOG_LEVEL`
    #[arg(long, env = "LOG_LEVEL", default_value_t = String::from("info"))]
    pub log_level: String,
}

/// Validated, immutable server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub rpc_addr: SocketAddr,
    pub metrics_addr: SocketAddr,
    pub log_level: LevelFilter,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let port: u16 = args
            .port
            .parse()
            .with_context(|| format!("PORT ({:?}) is not a valid TCP port", args.port))?;

        let metrics_addr = parse_listen_addr(&args.metrics_listen_addr)
            .with_context(|| format!("invalid METRICS_LISTEN_ADDR {:?}", args.metrics_listen_addr))?;

        let log_level: LevelFilter = match args.log_level.parse() {
            Ok(level) => level,
            Err(_) => bail!(
                "LOG_LEVEL ({:?}) must be one of off, error, warn, info, debug, trace",
                args.log_level
            ),
        };

        Ok(Self {
            rpc_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
            metrics_addr,
            log_level,
        })
    }
}

/// Parses `host:port`, or `:port` meaning every IPv4 interface.
fn parse_listen_addr(value: &str) -> anyhow::Result<SocketAddr> {
    if let Some(port) = value.strip_prefix(':') {
        let port: u16 = port.parse().context("port is not a valid TCP port")?;
        return Ok(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)));
    }
    if let Ok(addr) = value.parse() {
        return Ok(addr);
    }
    value
        .to_socket_addrs()
        .context("address could not be resolved")?
        .next()
        .context("address resolved to nothing")
}
