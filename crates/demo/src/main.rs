use std::collections::VecDeque;

use anyhow::Result;
use clap::Parser;
use glam::Vec3;

use strafe::{
    BoundDataRegistry, BoundKind, BoundSet, BoundSlotId, BoundValue, ChannelId, EntityId,
    InputFlags, MoveInput, Pose, PredictionEngine, RecipientRole, ReconciliationEngine,
    ReplayEngine, ReplicationChannel, Simulation, SmoothingEngine, StateAssembler, SyncConfig,
    WireState,
};

#[derive(Parser, Debug)]
#[command(name = "demo", about = "Prediction/reconciliation loopback demo")]
struct Args {
    /// Number of client ticks to simulate
    #[arg(long, default_value_t = 300)]
    ticks: u32,

    /// Client tick interval in milliseconds
    #[arg(long, default_value_t = 20)]
    tick_ms: u32,

    /// One-way network delay in milliseconds
    #[arg(long, default_value_t = 80)]
    latency_ms: u32,

    /// Make the client's movement logic disagree with the server's, forcing
    /// corrections and replays
    #[arg(long, default_value_t = false)]
    divergent: bool,
}

/// Kinematic movement driven by the input vector, with a bound sprint flag
/// doubling the speed. Deterministic, so client and server agree exactly.
struct DemoSim {
    sprint: BoundSlotId,
    speed: f32,
}

impl Simulation for DemoSim {
    fn simulate(
        &mut self,
        pose: &mut Pose,
        bound: &mut BoundSet,
        input: &MoveInput,
        delta_time: f32,
        _iteration: u32,
        _sub_stepped: bool,
    ) {
        let sprinting = bound.get(self.sprint) == Some(BoundValue::Bool(true));
        let speed = if sprinting { self.speed * 2.0 } else { self.speed };
        pose.velocity = input.input_vector * speed;
        pose.location += pose.velocity * delta_time;
    }
}

/// One-way delivery queue with a fixed latency.
struct Link {
    latency: f32,
    in_flight: VecDeque<(f32, Vec<u8>)>,
}

impl Link {
    fn new(latency: f32) -> Self {
        Self {
            latency,
            in_flight: VecDeque::new(),
        }
    }

    fn send(&mut self, now: f32, bytes: Vec<u8>) {
        self.in_flight.push_back((now + self.latency, bytes));
    }

    fn deliver(&mut self, now: f32) -> Vec<Vec<u8>> {
        let mut delivered = Vec::new();
        while let Some((due, _)) = self.in_flight.front() {
            if *due <= now {
                delivered.push(self.in_flight.pop_front().unwrap().1);
            } else {
                break;
            }
        }
        delivered
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut registry = BoundDataRegistry::new();
    let sprint = registry
        .bind("sprint", BoundKind::Bool, true, true, true, 0.05)
        .expect("fresh registry has a free bool slot");

    let config = SyncConfig::default();
    config.validate()?;

    let mut client_sim = DemoSim {
        sprint,
        speed: if args.divergent { 110.0 } else { 100.0 },
    };
    let mut server_sim = DemoSim {
        sprint,
        speed: 100.0,
    };

    let mut prediction = PredictionEngine::new(config.clone());
    let mut replay = ReplayEngine::new(config.clone(), registry.clone());
    let mut client_assembler = StateAssembler::new(registry.clone(), config.quantize);
    let mut client_pose = Pose::default();
    let mut client_bound = registry.empty_set();

    let mut server = ReconciliationEngine::new(EntityId(1), config.clone(), registry.clone());
    let mut autonomous_channel =
        ReplicationChannel::new(ChannelId(1), RecipientRole::AutonomousProxy, &registry);
    let mut simulated_channel =
        ReplicationChannel::new(ChannelId(2), RecipientRole::SimulatedProxy, &registry);

    let mut observer_assembler = StateAssembler::new(registry.clone(), config.quantize);
    let mut observer = SmoothingEngine::new(config.clone(), registry.clone());

    let mut uplink = Link::new(args.latency_ms as f32 / 1000.0);
    let mut downlink = Link::new(args.latency_ms as f32 / 1000.0);
    let mut observer_link = Link::new(args.latency_ms as f32 / 1000.0);

    let tick_interval = args.tick_ms as f32 / 1000.0;
    let mut uplink_bytes = 0usize;
    let mut downlink_bytes = 0usize;
    let mut smooth_samples = 0u32;
    let mut extrapolated_samples = 0u32;

    log::info!(
        "running {} ticks at {} ms with {} ms one-way latency",
        args.ticks,
        args.tick_ms,
        args.latency_ms
    );

    for tick in 0..args.ticks {
        let now = 1.0 + tick as f32 * tick_interval;

        // Sprint in bursts so the bound flag exercises force-update holds.
        let sprinting = (tick / 50) % 2 == 1;
        client_bound.set(&registry, sprint, BoundValue::Bool(sprinting))?;

        let input = MoveInput {
            input_vector: Vec3::new(1.0, 0.0, 0.0),
            flags: InputFlags::empty(),
        };
        prediction.tick(&mut client_sim, &mut client_pose, &mut client_bound, input, now);
        if let Some(batch) = prediction.flush(now) {
            let bytes = batch.to_bytes()?;
            uplink_bytes += bytes.len();
            uplink.send(now, bytes);
        }

        // Server consumes whatever arrived this tick.
        for bytes in uplink.deliver(now) {
            let outcome = server.receive_batch(&bytes, &mut server_sim, &mut [], now)?;
            if let Some(state) = outcome.autonomous_state {
                let wire = autonomous_channel.encode_state(
                    &state,
                    &config.state_wire,
                    &registry,
                    config.optimize_traffic,
                    config.min_rep_hold_time,
                    config.full_serialization_interval,
                    now,
                );
                let bytes = wire.to_bytes()?;
                downlink_bytes += bytes.len();
                downlink.send(now, bytes);
            }
            if let Some(state) = outcome.simulated_state {
                let wire = simulated_channel.encode_state(
                    &state,
                    &config.state_wire,
                    &registry,
                    config.optimize_traffic,
                    config.min_rep_hold_time,
                    config.full_serialization_interval,
                    now,
                );
                observer_link.send(now, wire.to_bytes()?);
            }
        }

        // Client applies authoritative states.
        for bytes in downlink.deliver(now) {
            let wire = WireState::from_bytes(&bytes)?;
            if let Some(state) = client_assembler.assemble(&wire)? {
                let outcome = replay.handle_state(
                    &state,
                    prediction.queue_mut(),
                    &mut client_pose,
                    &mut client_bound,
                    &mut client_sim,
                    &mut [],
                );
                if outcome.replayed {
                    log::debug!(
                        "tick {}: replayed {} moves after state at {:.3}",
                        tick,
                        outcome.moves_replayed,
                        state.timestamp
                    );
                }
            }
        }

        // An observer smooths the entity it does not control.
        for bytes in observer_link.deliver(now) {
            let wire = WireState::from_bytes(&bytes)?;
            if let Some(state) = observer_assembler.assemble(&wire)? {
                observer.push_state(state);
            }
        }
        if let Some(result) = observer.tick(now) {
            smooth_samples += 1;
            if result.extrapolated {
                extrapolated_samples += 1;
            }
        }
    }

    let server_pose = server.pose();
    log::info!(
        "client at x={:.2}, server at x={:.2}, drift {:.3}",
        client_pose.location.x,
        server_pose.location.x,
        (client_pose.location.x - server_pose.location.x).abs()
    );
    log::info!(
        "replays: {}, invalid moves: {}, dropped moves: {}",
        replay.replays(),
        server.invalid_moves(),
        prediction.queue().dropped_moves()
    );
    log::info!(
        "uplink {} bytes, downlink {} bytes over {} ticks",
        uplink_bytes,
        downlink_bytes,
        args.ticks
    );
    log::info!(
        "observer produced {} smooth samples ({} extrapolated)",
        smooth_samples,
        extrapolated_samples
    );

    Ok(())
}
