/*!
 * hubbridge command line
 *
 * Runs the bridge for every configured gateway until interrupted, or
 * inspects a single gateway.
 *
 * ```bash
 * hubbridge --config hubbridge.toml
 * hubbridge --config hubbridge.toml show-config
 * hubbridge enumerate 192.168.1.20 --model lumi.gateway.acn01
 * ```
 */
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use hubbridge_core::config::{Config, ConfigBuilder, GatewayConfig};
use hubbridge_core::logging;
use hubbridge_gateway::provision::enumerate;
use hubbridge_gateway::shell::{ShellProfile, ShellTimeouts};
use hubbridge_gateway::{
    HostEvent, ReconnectSupervisor, ShellConnector, ShellSession, SupervisorSettings,
    TelnetConnector, TransportConnector,
};

const ENV_PREFIX: &str = "HUBBRIDGE";

#[derive(Parser, Debug)]
#[command(name = "hubbridge")]
#[command(about = "Local bridge for Zigbee hub gateways")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "hubbridge.toml")]
    config: PathBuf,

    /// Log filter, overrides the configured level
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Supervise every configured gateway (the default)
    Run,

    /// Print the effective configuration as TOML
    ShowConfig,

    /// Log into one gateway and list the devices it knows about
    Enumerate {
        /// Gateway address
        host: String,

        /// Gateway model, used to pick the shell login
        #[arg(long, default_value = "")]
        model: String,

        /// Shell password
        #[arg(long)]
        password: Option<String>,
    },
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    ConfigBuilder::new()
        .with_config_file(&args.config)
        .with_environment_prefix(ENV_PREFIX)
        .build()
        .with_context(|| format!("loading {}", args.config.display()))
}

fn init_logging(args: &Args, config: &Config) -> anyhow::Result<()> {
    match &args.log_level {
        Some(filter) => logging::init_with_filter(filter)?,
        None => logging::init_from_config(&config.logging)?,
    }
    Ok(())
}

#[cfg(feature = "mqtt")]
fn transport_connector(config: &Config) -> anyhow::Result<Arc<dyn TransportConnector>> {
    Ok(Arc::new(hubbridge_gateway::MqttConnector::new(
        config.general.app_name.clone(),
        std::time::Duration::from_secs(config.bridge.mqtt_keep_alive_secs),
        config.bridge.connect_timeout(),
    )))
}

#[cfg(not(feature = "mqtt"))]
fn transport_connector(_config: &Config) -> anyhow::Result<Arc<dyn TransportConnector>> {
    bail!("built without a pub/sub transport; enable the mqtt feature")
}

async fn run(config: Config) -> anyhow::Result<()> {
    if config.gateways.is_empty() {
        bail!("no gateways configured");
    }

    let shell: Arc<dyn ShellConnector> =
        Arc::new(TelnetConnector::new(config.bridge.connect_timeout()));
    let supervisor = ReconnectSupervisor::new(
        SupervisorSettings::from(&config.bridge),
        shell,
        transport_connector(&config)?,
    );

    supervisor.start(&config.gateways).await?;
    let mut events = supervisor.hosts().subscribe();

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("waiting for ctrl-c")?;
                info!("Received ctrl-c signal, shutting down");
                break;
            }
            event = events.recv() => match event {
                Ok(HostEvent { host, state }) => info!("{} is {}", host, state),
                Err(RecvError::Lagged(n)) => warn!("Missed {} gateway state change(s)", n),
                Err(RecvError::Closed) => break,
            },
        }
    }

    supervisor.stop().await;
    Ok(())
}

async fn enumerate_one(config: &Config, gateway: GatewayConfig) -> anyhow::Result<()> {
    let connector = TelnetConnector::new(config.bridge.connect_timeout());
    let timeouts = ShellTimeouts {
        login: config.bridge.login_timeout(),
        command: config.bridge.command_timeout(),
    };
    let profile = ShellProfile::for_model(&gateway.model, gateway.password.as_deref());
    let mut shell = ShellSession::open(
        &connector,
        &gateway.host,
        gateway.shell_port,
        profile,
        timeouts,
    )
    .await?;

    let topology = enumerate(&mut shell, &gateway.topology, &gateway.model).await;
    shell.close().await;
    let topology = topology?;

    println!(
        "{} {} ({:?})",
        topology.coordinator.id, topology.coordinator.model, topology.schema
    );
    for child in &topology.children {
        println!(
            "  {} {} {}{}",
            child.id,
            child.model,
            child.mac,
            if child.online { "" } else { " offline" }
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_logging(&args, &config)?;
    info!("hubbridge {}", hubbridge_gateway::VERSION);

    match args.command {
        None | Some(Commands::Run) => run(config).await,
        Some(Commands::ShowConfig) => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Some(Commands::Enumerate {
            host,
            model,
            password,
        }) => {
            let mut gateway = config
                .gateways
                .iter()
                .find(|g| g.host == host)
                .cloned()
                .unwrap_or_else(|| GatewayConfig::new(host.clone()));
            if !model.is_empty() {
                gateway.model = model;
            }
            if password.is_some() {
                gateway.password = password;
            }
            if gateway.model.is_empty() {
                warn!("No model given for {}, assuming a hub login", host);
            }
            enumerate_one(&config, gateway).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_args_default_to_run() {
        let args = Args::parse_from(["hubbridge"]);
        assert!(args.command.is_none());
        assert_eq!(args.config, PathBuf::from("hubbridge.toml"));

        let args = Args::parse_from(["hubbridge", "enumerate", "10.0.0.2", "--model", "g2h"]);
        match args.command {
            Some(Commands::Enumerate { host, model, .. }) => {
                assert_eq!(host, "10.0.0.2");
                assert_eq!(model, "g2h");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_load_config_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[[gateways]]\nhost = \"10.0.0.2\"\nmodel = \"lumi.gateway.acn01\"\n"
        )
        .unwrap();

        let args = Args::parse_from(["hubbridge", "--config", file.path().to_str().unwrap()]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.gateways.len(), 1);
        assert_eq!(config.gateways[0].shell_port, 23);
    }
}
