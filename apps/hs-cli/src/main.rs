use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::net::UdpSocket;
use std::thread;
use std::time::{Duration, Instant};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{info, warn};

use datagram_transport::{ListenerState, MockSender, MockSocket};
use device_registry::{load_config_file, DeviceEvent, HandsetService, ServiceConfig};
use handset_protocol as proto;
use handset_protocol::{
    ButtonStates, DataPacket, DeviceId, Info, Quat, SessionInfo, TouchPoint, Touches, Vec3,
};

#[derive(Parser, Debug)]
#[command(
    name = "hs",
    version,
    about = "Handset link CLI",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decode one payload and print the packet as JSON
    Decode {
        /// Payload text; a literal `\n` separates sub-messages. Reads stdin when omitted
        text: Option<String>,
        /// Read the payload from a file instead
        #[arg(long, conflicts_with = "text")]
        file: Option<String>,
        /// Pretty-print the JSON
        #[arg(long, action = ArgAction::SetTrue)]
        pretty: bool,
    },
    /// Send one payload as a single datagram
    Send {
        /// Destination host:port
        #[arg(long, default_value = "127.0.0.1:3010")]
        to: String,
        /// Payload text; a literal `\n` separates sub-messages
        text: String,
    },
    /// Stream a synthetic handset to a listener
    Simulate {
        /// Destination host:port
        #[arg(long, default_value = "127.0.0.1:3010")]
        to: String,
        /// Device id carried in the info group
        #[arg(long, default_value_t = 0)]
        id: i16,
        /// Device-reported name
        #[arg(long, default_value = "hs-sim")]
        name: String,
        /// Session id; a random one is generated when omitted
        #[arg(long)]
        session: Option<String>,
        /// Packets per second
        #[arg(long, default_value_t = 60.0)]
        rate_hz: f64,
        /// Number of packets to send
        #[arg(long, default_value_t = 600)]
        count: u64,
        /// Print datagrams instead of sending them
        #[arg(long, action = ArgAction::SetTrue)]
        dry_run: bool,
    },
    /// Run the polling driver in the foreground and print device events
    Listen {
        /// YAML service config
        #[arg(long)]
        config: Option<String>,
        /// Override the UDP port
        #[arg(long)]
        port: Option<u16>,
        /// Override the disconnect timeout
        #[arg(long)]
        timeout_secs: Option<f64>,
        /// Stop after this many seconds
        #[arg(long)]
        duration_secs: Option<f64>,
        /// Print device snapshots at this interval (0 disables)
        #[arg(long, default_value_t = 1000)]
        snapshot_ms: u64,
        /// Also append events as JSON lines to this file
        #[arg(long)]
        to: Option<String>,
        /// Feed the driver from an in-process simulator instead of UDP
        #[arg(long, action = ArgAction::SetTrue)]
        mock: bool,
    },
}

fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Decode { text, file, pretty } => {
            decode_payload(text.as_deref(), file.as_deref(), pretty)
        }
        Commands::Send { to, text } => send_payload(&to, &text),
        Commands::Simulate {
            to,
            id,
            name,
            session,
            rate_hz,
            count,
            dry_run,
        } => {
            let sim = Simulator::new(DeviceId(id), name, session);
            simulate(sim, &to, rate_hz, count, dry_run)
        }
        Commands::Listen {
            config,
            port,
            timeout_secs,
            duration_secs,
            snapshot_ms,
            to,
            mock,
        } => {
            let mut cfg = match config {
                Some(path) => load_config_file(path)?,
                None => ServiceConfig::default(),
            };
            if let Some(p) = port {
                cfg.port = p;
            }
            if let Some(t) = timeout_secs {
                cfg.disconnect_timeout_secs = t;
            }
            listen(cfg, duration_secs, snapshot_ms, to.as_deref(), mock)
        }
    }
}

fn setup_tracing() {
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn unescape(text: &str) -> String {
    text.replace("\\n", "\n")
}

fn decode_payload(text: Option<&str>, file: Option<&str>, pretty: bool) -> Result<()> {
    let raw = match (text, file) {
        (Some(t), _) => unescape(t),
        (None, Some(path)) => {
            fs::read_to_string(path).with_context(|| format!("reading payload: {path}"))?
        }
        (None, None) => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading payload from stdin")?;
            buf
        }
    };
    let packet = proto::decode(&raw);
    let json = if pretty {
        serde_json::to_string_pretty(&packet)?
    } else {
        serde_json::to_string(&packet)?
    };
    println!("{json}");
    Ok(())
}

fn send_payload(to: &str, text: &str) -> Result<()> {
    let socket = UdpSocket::bind(("0.0.0.0", 0)).context("binding sender socket")?;
    let payload = unescape(text);
    let n = socket
        .send_to(payload.as_bytes(), to)
        .with_context(|| format!("sending to {to}"))?;
    info!(to, bytes = n, "sent datagram");
    Ok(())
}

fn packet_interval(rate_hz: f64) -> Result<Duration> {
    if !(rate_hz.is_finite() && rate_hz > 0.0) {
        return Err(anyhow::anyhow!("--rate-hz must be positive, got {rate_hz}"));
    }
    Duration::try_from_secs_f64(1.0 / rate_hz).context("invalid --rate-hz")
}

fn simulate(mut sim: Simulator, to: &str, rate_hz: f64, count: u64, dry_run: bool) -> Result<()> {
    let interval = packet_interval(rate_hz)?;
    let socket = if dry_run {
        None
    } else {
        Some(UdpSocket::bind(("0.0.0.0", 0)).context("binding sender socket")?)
    };
    info!(
        id = %sim.id,
        session = %sim.session,
        count,
        "simulating handset"
    );
    for _ in 0..count {
        let datagram = proto::encode(&sim.next_packet());
        match &socket {
            Some(s) => {
                s.send_to(datagram.as_bytes(), to)
                    .with_context(|| format!("sending to {to}"))?;
            }
            None => println!("{datagram}\n"),
        }
        thread::sleep(interval);
    }
    info!(sent = count, "simulation finished");
    Ok(())
}

#[derive(Serialize)]
struct EventRecord<'a> {
    at: String,
    #[serde(flatten)]
    event: &'a DeviceEvent,
}

fn listen(
    cfg: ServiceConfig,
    duration_secs: Option<f64>,
    snapshot_ms: u64,
    to: Option<&str>,
    mock: bool,
) -> Result<()> {
    let mut writer = match to {
        Some(path) => Some(BufWriter::new(
            File::create(path).with_context(|| format!("creating {path}"))?,
        )),
        None => None,
    };
    let run_for = duration_secs
        .map(Duration::try_from_secs_f64)
        .transpose()
        .context("invalid --duration-secs")?;

    let mut svc = HandsetService::new(cfg)?;
    let feeder = if mock {
        let (socket, sender) = MockSocket::new();
        svc.start_with(socket)?;
        let sim = Simulator::new(DeviceId(0), "hs-mock".to_string(), None);
        Some(thread::spawn(move || feed_mock(sim, sender)))
    } else {
        let addr = svc.start()?;
        info!(%addr, "waiting for handsets");
        None
    };

    let started = Instant::now();
    let snapshot_every = Duration::from_millis(snapshot_ms);
    let mut last_snapshot = started;
    loop {
        let now = Instant::now();
        if run_for.is_some_and(|d| now.duration_since(started) >= d) {
            break;
        }
        if svc.listener_state() != ListenerState::Running {
            warn!(state = %svc.listener_state(), "listener is no longer running");
            break;
        }
        svc.poll(now);
        for event in svc.drain_events() {
            let record = EventRecord {
                at: OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
                event: &event,
            };
            let line = serde_json::to_string(&record)?;
            println!("{line}");
            if let Some(w) = writer.as_mut() {
                w.write_all(line.as_bytes())?;
                w.write_all(b"\n")?;
            }
        }
        if !snapshot_every.is_zero() && now.duration_since(last_snapshot) >= snapshot_every {
            for device in svc.devices() {
                println!("{}", serde_json::to_string(&device.snapshot(now))?);
            }
            last_snapshot = now;
        }
        thread::sleep(svc.config().poll_interval());
    }

    svc.stop();
    if let Some(handle) = feeder {
        if handle.join().is_err() {
            warn!("mock feeder thread panicked");
        }
    }
    if let Some(mut w) = writer {
        w.flush()?;
    }
    Ok(())
}

fn feed_mock(mut sim: Simulator, sender: MockSender) {
    let interval = Duration::from_millis(16);
    loop {
        let datagram = proto::encode(&sim.next_packet());
        // the listener dropped its end
        if sender.send(datagram).is_err() {
            break;
        }
        thread::sleep(interval);
    }
}

/// Synthetic handset: slow yaw, one finger circling, volume-up toggling every two seconds.
struct Simulator {
    id: DeviceId,
    name: String,
    session: String,
    sequence: i64,
    started: Instant,
}

const CANVAS_W: f32 = 1080.0;
const CANVAS_H: f32 = 1920.0;

impl Simulator {
    fn new(id: DeviceId, name: String, session: Option<String>) -> Self {
        Self {
            id,
            name,
            session: session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            sequence: 0,
            started: Instant::now(),
        }
    }

    fn next_packet(&mut self) -> DataPacket {
        self.sequence += 1;
        let t = self.started.elapsed().as_secs_f32();
        let finger = TouchPoint::pressed_at(
            CANVAS_W * 0.5 + 300.0 * (t * 2.0).cos(),
            CANVAS_H * 0.5 + 300.0 * (t * 2.0).sin(),
        );
        DataPacket::default()
            .with_info(Info {
                id: self.id,
                device_time: f64::from(t),
                session: Some(SessionInfo {
                    device_id: self.name.clone(),
                    session_id: self.session.clone(),
                    sequence: self.sequence,
                }),
            })
            .with_rotation(Quat::from_axis_angle(Vec3::new(0.0, 1.0, 0.0), t * 0.5))
            .with_acceleration(Vec3::new(0.0, -9.81, 0.0))
            .with_touches(Touches {
                points: vec![finger],
                width: CANVAS_W,
                height: CANVAS_H,
            })
            .with_buttons(ButtonStates {
                volume_up: (t as u64 / 2) % 2 == 1,
                volume_down: false,
            })
    }
}
