use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use fleetsim_config::{FleetsimConfig, SinkMode, Transport};
use fleetsim_core::taxonomy::{MachineKind, Taxonomy};
use fleetsim_engine::{cancel_pair, DispatchLoop};
use fleetsim_sink::build_sinks;
use fleetsim_telemetry::{EventLogger, MetricsRecorder};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "fleetsim", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Simulate the fleet and deliver telemetry
    Run(RunArgs),
    /// Print the built-in sensor and machine catalog
    Catalog,
    /// Print the effective configuration after layering and validation
    CheckConfig(ConfigArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Configuration file; `config/fleetsim.yaml` and `FLEETSIM_*` otherwise
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Seconds between cycles
    #[arg(long)]
    pub interval: Option<u64>,
    /// Total run time in seconds (0 runs until Ctrl-C)
    #[arg(long)]
    pub duration: Option<u64>,
    /// Seed for reproducible runs
    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long)]
    pub mixers: Option<usize>,
    #[arg(long)]
    pub cnc: Option<usize>,
    #[arg(long)]
    pub hydraulic: Option<usize>,
    #[arg(long)]
    pub conveyor: Option<usize>,
    #[arg(long)]
    pub pump: Option<usize>,

    /// Platform host
    #[arg(long)]
    pub host: Option<String>,
    /// Platform port
    #[arg(long)]
    pub port: Option<u16>,
    /// Fleet-wide access token
    #[arg(long)]
    pub token: Option<String>,
    /// JSON file mapping device ids to access tokens
    #[arg(long)]
    pub tokens_file: Option<PathBuf>,
    /// Deliver over HTTPS instead of MQTT
    #[arg(long)]
    pub https: bool,
    /// Only write the local telemetry log
    #[arg(long)]
    pub local_only: bool,
    /// Also write the local telemetry log when delivering remotely
    #[arg(long)]
    pub save_local: bool,
    /// Print Prometheus metrics on shutdown
    #[arg(long)]
    pub print_metrics: bool,
}

impl RunArgs {
    /// Layers the flags over a loaded configuration.
    pub fn apply(&self, config: &mut FleetsimConfig) {
        let simulation = &mut config.simulation;
        if let Some(interval) = self.interval {
            simulation.interval_secs = interval;
        }
        if let Some(duration) = self.duration {
            simulation.duration_secs = duration;
        }
        if self.seed.is_some() {
            simulation.seed = self.seed;
        }
        for (kind, count) in [
            (MachineKind::Mixer, self.mixers),
            (MachineKind::CncMachine, self.cnc),
            (MachineKind::HydraulicPress, self.hydraulic),
            (MachineKind::ConveyorSystem, self.conveyor),
            (MachineKind::PumpSystem, self.pump),
        ] {
            if let Some(count) = count {
                simulation.set_count(kind, count);
            }
        }

        let sink = &mut config.sink;
        if let Some(host) = &self.host {
            sink.host = host.clone();
        }
        if let Some(port) = self.port {
            sink.port = port;
        }
        if self.token.is_some() {
            sink.token = self.token.clone();
        }
        if self.tokens_file.is_some() {
            sink.tokens_file = self.tokens_file.clone();
        }
        if self.https {
            sink.transport = Transport::Https;
        }
        if self.save_local {
            sink.save_local = true;
        }
        if let Some(mode) = self.resolve_mode() {
            sink.mode = mode;
        }
    }

    /// `--local-only` wins, then a tokens file, then a token. `None` keeps
    /// the configured mode.
    fn resolve_mode(&self) -> Option<SinkMode> {
        if self.local_only {
            Some(SinkMode::LocalOnly)
        } else if self.tokens_file.is_some() {
            Some(SinkMode::MultiToken)
        } else if self.token.is_some() {
            Some(SinkMode::SingleToken)
        } else {
            None
        }
    }
}

fn load_config(args: &ConfigArgs) -> anyhow::Result<FleetsimConfig> {
    let config = match &args.config {
        Some(path) => FleetsimConfig::load_from_path(path),
        None => FleetsimConfig::load(),
    };
    config.context("failed to load configuration")
}

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_simulation(args).await,
        Commands::Catalog => print_catalog(),
        Commands::CheckConfig(args) => check_config(&args),
    }
}

async fn run_simulation(args: RunArgs) -> anyhow::Result<()> {
    let mut config = load_config(&args.config)?;
    args.apply(&mut config);
    EventLogger::init(&config.telemetry);
    config
        .validate_all()
        .context("invalid configuration after applying flags")?;

    let metrics = Arc::new(MetricsRecorder::new().context("failed to register metrics")?);
    let sinks = build_sinks(&config.sink).context("failed to build telemetry sinks")?;
    let mut engine = DispatchLoop::from_config(&config, sinks)?;
    if config.telemetry.metrics_enabled {
        engine = engine.with_metrics(metrics.clone());
    }

    let (handle, signal) = cancel_pair();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, stopping after the current cycle");
                handle.cancel();
            }
            Err(e) => error!("Unable to listen for Ctrl-C: {}", e),
        }
    });

    let summary = engine.start(signal).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if args.print_metrics {
        if config.telemetry.metrics_enabled {
            print!("{}", metrics.gather_metrics()?);
        } else {
            warn!("Metrics are disabled in the configuration");
        }
    }
    Ok(())
}

fn print_catalog() -> anyhow::Result<()> {
    let taxonomy = Taxonomy::standard()?;
    for machine in taxonomy.machines() {
        println!("{} ({} sensors)", machine.kind, machine.sensors.len());
        for kind in &machine.sensors {
            let spec = taxonomy
                .sensor(*kind)
                .with_context(|| format!("{kind} has no sensor spec"))?;
            if spec.binary {
                println!("  {:<30} binary", kind.as_str());
            } else {
                println!(
                    "  {:<30} {:>9} .. {:<9} {}",
                    kind.as_str(),
                    spec.min,
                    spec.max,
                    spec.unit
                );
            }
        }
    }
    Ok(())
}

fn check_config(args: &ConfigArgs) -> anyhow::Result<()> {
    let config = load_config(args)?;
    print!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(args: &[&str]) -> RunArgs {
        let mut argv = vec!["fleetsim", "run"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Run(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn flags_override_simulation_settings() {
        let args = parse(&[
            "--interval", "2", "--duration", "60", "--seed", "7", "--mixers", "1", "--pump", "0",
        ]);
        let mut config = FleetsimConfig::default();
        args.apply(&mut config);

        assert_eq!(config.simulation.interval_secs, 2);
        assert_eq!(config.simulation.duration_secs, 60);
        assert_eq!(config.simulation.seed, Some(7));
        let plan = config.simulation.fleet_plan().unwrap();
        assert_eq!(plan["MIXER"], 1);
        assert_eq!(plan["PUMP_SYSTEM"], 0);
        assert_eq!(plan["CNC_MACHINE"], 10);
        config.validate_all().unwrap();
    }

    #[test]
    fn local_only_wins_over_tokens() {
        let args = parse(&["--local-only", "--token", "abc", "--tokens-file", "t.json"]);
        let mut config = FleetsimConfig::default();
        args.apply(&mut config);
        assert_eq!(config.sink.mode, SinkMode::LocalOnly);
    }

    #[test]
    fn tokens_file_wins_over_token() {
        let args = parse(&["--token", "abc", "--tokens-file", "t.json"]);
        let mut config = FleetsimConfig::default();
        args.apply(&mut config);
        assert_eq!(config.sink.mode, SinkMode::MultiToken);
        assert_eq!(config.sink.tokens_file, Some(PathBuf::from("t.json")));
    }

    #[test]
    fn token_selects_single_token_over_https() {
        let args = parse(&["--token", "abc", "--https", "--host", "iot.example.com", "--port", "443"]);
        let mut config = FleetsimConfig::default();
        args.apply(&mut config);
        assert_eq!(config.sink.mode, SinkMode::SingleToken);
        assert_eq!(config.sink.transport, Transport::Https);
        assert_eq!(config.sink.host, "iot.example.com");
        assert_eq!(config.sink.port, 443);
        config.validate_all().unwrap();
    }

    #[test]
    fn no_credential_flags_keep_configured_mode() {
        let args = parse(&[]);
        let mut config = FleetsimConfig::default();
        config.sink.mode = SinkMode::SingleToken;
        config.sink.token = Some("from-file".into());
        args.apply(&mut config);
        assert_eq!(config.sink.mode, SinkMode::SingleToken);
        assert_eq!(config.sink.token.as_deref(), Some("from-file"));
    }

    #[test]
    fn config_file_is_loaded_before_flags() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "simulation:\n  interval_secs: 9\n  seed: 3").unwrap();
        let args = parse(&["--config", file.path().to_str().unwrap(), "--seed", "4"]);

        let mut config = load_config(&args.config).unwrap();
        assert_eq!(config.simulation.interval_secs, 9);
        args.apply(&mut config);
        assert_eq!(config.simulation.seed, Some(4));
    }

    #[test]
    fn missing_config_file_is_reported() {
        let args = ConfigArgs {
            config: Some(PathBuf::from("/nonexistent/fleetsim.yaml")),
        };
        let err = load_config(&args).unwrap_err();
        assert!(format!("{err:#}").contains("not found"));
    }

    #[test]
    fn subcommands_parse() {
        assert!(matches!(
            Cli::try_parse_from(["fleetsim", "catalog"]).unwrap().command,
            Commands::Catalog
        ));
        assert!(matches!(
            Cli::try_parse_from(["fleetsim", "check-config", "-c", "x.yaml"])
                .unwrap()
                .command,
            Commands::CheckConfig(ConfigArgs { config: Some(_) })
        ));
    }
}
