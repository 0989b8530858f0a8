use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use navlink_core::command::{CommandConfig, CommandEngine};
use navlink_core::doctor as core_doctor;
use navlink_core::heartbeat::{HeartbeatConfig, HeartbeatEmitter, HeartbeatMonitor};
use navlink_core::telemetry::{TelemetryConfig, TelemetryFuser};
use navlink_core::worker::{
    command_worker, heartbeat_receiver_worker, heartbeat_sender_worker, telemetry_worker,
    WorkerController,
};
use navlink_fc::autodetect::{autodetect_fc, default_candidate_bauds, default_candidate_devs, AutodetectResult};
use navlink_fc::mav::FcLink;
use navlink_fc::{FcConfig, MessageKind};
use navlink_proto::command::CommandOutput;
use navlink_proto::event::{EventKind, LinkEvent};

use std::future::Future;
use tokio::sync::mpsc;

#[derive(Debug, Parser)]
#[command(name = "navlink", version, about = "navlink - MAVLink telemetry/command pipeline")]
struct Cli {
    #[arg(long)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the config file.
    Doctor,
    /// Run the telemetry, heartbeat and command workers until Ctrl-C.
    Run {
        /// Print events as JSON lines.
        #[arg(long)]
        json: bool,
    },
    Fc { #[command(subcommand)] cmd: FcCmd },
}

#[derive(Debug, Subcommand)]
enum FcCmd {
    /// Probe serial ports/bauds for MAVLink heartbeats.
    Autodetect,
}

#[derive(Debug, serde::Deserialize)]
struct Config {
    fc: FcConfig,
    telemetry: TelemetryConfig,
    heartbeat: HeartbeatConfig,
    command: CommandConfig,
    #[serde(default)]
    workers: WorkersCfg,
}

#[derive(Debug, serde::Deserialize)]
struct WorkersCfg {
    queue_capacity: usize,
}

impl Default for WorkersCfg {
    fn default() -> Self {
        Self { queue_capacity: 16 }
    }
}

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).context("read config")?;
    Ok(toml::from_str(&s).context("parse config toml")?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg)?,
        Command::Run { json } => run(&cfg, json).await?,
        Command::Fc { cmd } => fc_cmd(&cfg, cmd)?,
    }
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");

    core_doctor::check_telemetry(&cfg.telemetry)?;
    core_doctor::check_heartbeat(&cfg.heartbeat)?;
    core_doctor::check_command(&cfg.command)?;
    core_doctor::check_queue_capacity(cfg.workers.queue_capacity)?;

    let fc = &cfg.fc;
    if let Some(url) = &fc.url {
        anyhow::ensure!(!url.is_empty(), "fc.url empty");
    } else if fc.autodetect {
        info!("doctor: fc autodetect enabled (OK)");
    } else {
        anyhow::ensure!(fc.serial_dev.as_ref().map(|s| !s.is_empty()).unwrap_or(false), "fc.serial_dev missing");
        anyhow::ensure!(fc.baud.unwrap_or(0) > 0, "fc.baud invalid");
    }

    info!("doctor: OK");
    Ok(())
}

fn fc_cmd(cfg: &Config, cmd: FcCmd) -> Result<()> {
    match cmd {
        FcCmd::Autodetect => {
            let res = run_fc_autodetect(&cfg.fc)?;
            if let Some((dev, baud)) = res.chosen {
                println!("CHOSEN: {} @ {}", dev, baud);
            } else {
                println!("CHOSEN: none");
            }
            for p in res.probes {
                println!("probe dev={} baud={} hb={} {}ms note={}", p.dev, p.baud, p.hb_seen, p.elapsed_ms, p.note);
            }
            Ok(())
        }
    }
}

async fn run(cfg: &Config, json: bool) -> Result<()> {
    info!("run: starting");

    let link = open_link(&cfg.fc).context("FC open")?;

    // Build every component first: a bad config stops here, before any worker starts.
    let fuser = TelemetryFuser::from_config(
        link.handle(&[MessageKind::LocalPositionNed, MessageKind::Attitude]),
        &cfg.telemetry,
    )
    .context("telemetry config")?;
    let monitor = HeartbeatMonitor::from_config(link.handle(&[MessageKind::Heartbeat]), &cfg.heartbeat)
        .context("heartbeat config")?;
    let emitter = HeartbeatEmitter::new(link.handle(&[]));
    let engine = CommandEngine::new(link.handle(&[]), &cfg.command).context("command config")?;
    let hb_period = monitor.period();

    let cap = cfg.workers.queue_capacity.max(1);
    let (snap_tx, snap_rx) = mpsc::channel(cap);
    let (live_tx, mut live_rx) = mpsc::channel(cap);
    let (cmd_tx, mut cmd_rx) = mpsc::channel(cap);

    let ctl = WorkerController::new();
    let workers = vec![
        {
            let sig = ctl.signals();
            tokio::task::spawn_blocking(move || telemetry_worker(fuser, snap_tx, sig))
        },
        {
            let sig = ctl.signals();
            tokio::task::spawn_blocking(move || heartbeat_receiver_worker(monitor, live_tx, sig))
        },
        {
            let sig = ctl.signals();
            tokio::task::spawn_blocking(move || heartbeat_sender_worker(emitter, hb_period, sig))
        },
        {
            let sig = ctl.signals();
            tokio::task::spawn_blocking(move || command_worker(engine, snap_rx, cmd_tx, sig))
        },
    ];

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("run: ctrl-c handler failed: {}", e);
        }
        info!("run: stopping workers");
    };
    let drained = pump_events(&mut live_rx, &mut cmd_rx, &ctl, shutdown, |kind, msg| emit(json, kind, msg)).await;
    if drained {
        warn!("run: all worker queues closed");
    }

    ctl.request_exit();
    // closing the receivers unblocks producers stuck on a full queue
    drop(live_rx);
    drop(cmd_rx);
    for w in workers {
        w.await.context("worker task")?;
    }
    info!("run: done");
    Ok(())
}

/// Forward worker output to `sink` until `shutdown` completes or every queue
/// closes. Returns `true` in the latter case. Liveness is forwarded on change only.
async fn pump_events(
    live_rx: &mut mpsc::Receiver<bool>,
    cmd_rx: &mut mpsc::Receiver<CommandOutput>,
    ctl: &WorkerController,
    shutdown: impl Future<Output = ()>,
    mut sink: impl FnMut(EventKind, String),
) -> bool {
    tokio::pin!(shutdown);
    let mut pause_sig = PauseSignal::new();
    let mut last_verdict = None;
    let mut paused = false;
    let (mut live_open, mut cmd_open) = (true, true);

    while live_open || cmd_open {
        tokio::select! {
            _ = &mut shutdown => return false,
            _ = pause_sig.recv() => {
                paused = !paused;
                if paused { ctl.pause(); } else { ctl.resume(); }
                info!("run: workers {}", if paused { "paused" } else { "resumed" });
            }
            verdict = live_rx.recv(), if live_open => match verdict {
                Some(connected) if last_verdict != Some(connected) => {
                    last_verdict = Some(connected);
                    let msg = if connected { "LINK: connected" } else { "LINK: disconnected" };
                    sink(EventKind::Liveness, msg.to_string());
                }
                Some(_) => {}
                None => live_open = false,
            },
            out = cmd_rx.recv(), if cmd_open => match out {
                Some(out) => sink(EventKind::Command, out.to_string()),
                None => cmd_open = false,
            },
        }
    }
    true
}

/// SIGUSR1 toggles pause on unix; elsewhere this never fires.
struct PauseSignal {
    #[cfg(unix)]
    inner: Option<tokio::signal::unix::Signal>,
}

impl PauseSignal {
    fn new() -> Self {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let inner = signal(SignalKind::user_defined1())
                .map_err(|e| warn!("run: SIGUSR1 pause toggle unavailable: {}", e))
                .ok();
            Self { inner }
        }
        #[cfg(not(unix))]
        {
            Self {}
        }
    }

    async fn recv(&mut self) {
        #[cfg(unix)]
        if let Some(s) = self.inner.as_mut() {
            if s.recv().await.is_some() {
                return;
            }
        }
        std::future::pending::<()>().await
    }
}

fn emit(json: bool, kind: EventKind, msg: String) {
    if json {
        let ev = LinkEvent {
            ts_unix_ms: (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64,
            kind,
            msg,
        };
        match serde_json::to_string(&ev) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("run: event encode failed: {}", e),
        }
    } else {
        println!("{}", msg);
    }
}

fn run_fc_autodetect(fc: &FcConfig) -> Result<AutodetectResult> {
    let devs = fc.candidate_devs.clone().unwrap_or_else(default_candidate_devs);
    let bauds = fc.candidate_bauds.clone().unwrap_or_else(default_candidate_bauds);
    let to_ms = fc.heartbeat_timeout_ms.unwrap_or(1500);
    let timeout = std::time::Duration::from_millis(to_ms);

    autodetect_fc(devs, bauds, timeout, fc.sys_id, fc.comp_id)
}

fn open_link(fc: &FcConfig) -> Result<FcLink> {
    if let Some(url) = &fc.url {
        return FcLink::connect(url, fc.sys_id, fc.comp_id);
    }
    if fc.autodetect {
        let res = run_fc_autodetect(fc)?;
        if let (Some((dev, baud)), Some(link)) = (res.chosen, res.link) {
            info!("run: using {} @ {}", dev, baud);
            return Ok(link);
        }
        anyhow::bail!("fc autodetect failed: no heartbeat found");
    }
    let dev = fc.serial_dev.clone().context("fc.serial_dev missing (autodetect=false)")?;
    let baud = fc.baud.context("fc.baud missing (autodetect=false)")?;
    FcLink::open(&dev, baud, fc.sys_id, fc.comp_id)
}
