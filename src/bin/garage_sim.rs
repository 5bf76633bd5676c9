//! Garage simulator - stands in for the garage hardware on port 5050
//!
//! Accepts `.`-terminated commands, acknowledges with `OK` and answers `GS.`
//! with the current simulated state. Beams and occupancy are set from the
//! command line so entry/exit flows can be exercised without hardware.

use clap::Parser;
use garage_control::domain::types::{GarageState, LightState, MAX_SPOTS};
use garage_control::io::protocol::{self, Command};
use garage_control::io::GARAGE_PORT;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Garage simulator - fake garage hardware for local testing
#[derive(Parser, Debug)]
#[command(name = "garage-sim", version, about)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = GARAGE_PORT)]
    port: u16,

    /// Number of parking spots
    #[arg(short, long, default_value_t = 4)]
    capacity: usize,

    /// Initial occupancy pattern, one 0/1 per spot (e.g. 0010)
    #[arg(long, default_value = "")]
    occupied: String,

    /// Report a vehicle waiting at the entry beam
    #[arg(long)]
    entry_beam: bool,

    /// Report a vehicle waiting at the exit beam
    #[arg(long)]
    exit_beam: bool,
}

/// Simulated hardware state, mutated by incoming commands
struct Sim {
    state: GarageState,
}

impl Sim {
    fn new(args: &Args) -> Self {
        // 1-based light positions must fit inside the scratch array
        let capacity = args.capacity.min(MAX_SPOTS - 1);
        let mut state = GarageState {
            entry_gate: Some(false),
            exit_gate: Some(false),
            entry_beam: Some(args.entry_beam),
            exit_beam: Some(args.exit_beam),
            entry_light: Some(LightState::Red),
            exit_light: Some(LightState::Red),
            ..GarageState::default()
        };
        for spot in 0..capacity {
            // Spot lights live at 1-based positions, occupancy at 0-based
            state.spot_lights[spot + 1] = Some(0);
            let occupied = args.occupied.as_bytes().get(spot) == Some(&b'1');
            state.occupied[spot] = Some(occupied as u8);
        }
        Self { state }
    }

    /// Apply one command and produce the reply line
    fn apply(&mut self, cmd: &Command) -> String {
        match cmd {
            Command::SetEntryGate(open) => self.state.entry_gate = Some(*open),
            Command::SetExitGate(open) => self.state.exit_gate = Some(*open),
            Command::SetEntryLight(light) => self.state.entry_light = Some(*light),
            Command::SetExitLight(light) => self.state.exit_light = Some(*light),
            Command::SetSpotLights(lights) => {
                for (spot, on) in lights.iter().enumerate() {
                    if spot + 1 < MAX_SPOTS {
                        self.state.spot_lights[spot + 1] = Some(*on as u8);
                    }
                }
            }
            Command::GetState => return protocol::encode_state_update(&self.state),
        }
        protocol::OK.to_string()
    }
}

async fn handle_client(mut socket: TcpStream, sim: Arc<Mutex<Sim>>) -> std::io::Result<()> {
    let mut buf = [0u8; 256];
    let mut pending = String::new();
    loop {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        pending.push_str(&String::from_utf8_lossy(&buf[..n]));

        // Commands are `.`-terminated with no newline
        while let Some(pos) = pending.find('.') {
            let raw: String = pending.drain(..=pos).collect();
            let reply = match Command::parse(&raw) {
                Some(cmd) => {
                    info!(command = %raw.trim(), "sim_command");
                    sim.lock().apply(&cmd)
                }
                None => {
                    warn!(command = %raw.trim(), "sim_command_unparseable");
                    "ERR".to_string()
                }
            };
            socket.write_all(format!("{}\n", reply).as_bytes()).await?;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();
    let sim = Arc::new(Mutex::new(Sim::new(&args)));

    let listener = TcpListener::bind(("0.0.0.0", args.port)).await?;
    info!(port = %args.port, capacity = %args.capacity, "garage_sim_listening");

    loop {
        let (socket, peer) = listener.accept().await?;
        info!(peer = %peer, "sim_client_connected");
        let sim = sim.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_client(socket, sim).await {
                warn!(error = %e, "sim_client_error");
            }
            info!("sim_client_disconnected");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> Args {
        Args {
            port: GARAGE_PORT,
            capacity: 4,
            occupied: "0010".to_string(),
            entry_beam: true,
            exit_beam: false,
        }
    }

    #[test]
    fn test_initial_state_from_args() {
        let sim = Sim::new(&args());
        assert_eq!(sim.state.entry_beam, Some(true));
        assert_eq!(sim.state.occupied[2], Some(1));
        assert_eq!(sim.state.occupied[0], Some(0));
        assert_eq!(sim.state.spot_lights[1], Some(0));
    }

    #[test]
    fn test_commands_mutate_state_and_ack() {
        let mut sim = Sim::new(&args());
        assert_eq!(sim.apply(&Command::SetEntryGate(true)), "OK");
        assert_eq!(sim.state.entry_gate, Some(true));

        assert_eq!(sim.apply(&Command::SetSpotLights(vec![true, false, false, false])), "OK");
        assert_eq!(sim.state.spot_lights[1], Some(1));

        let reply = sim.apply(&Command::GetState);
        let decoded = protocol::decode_state_update(&reply).unwrap();
        assert_eq!(decoded.entry_gate, Some(true));
        assert!(decoded.vehicle_at_entry());
    }
}
