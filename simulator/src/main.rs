use anyhow::Context;
use clap::Parser;
use gui_bridge::bridge::{gui_bind_address, GuiBridge};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::WorkflowConfig;
use workflow::runner::Runner;

mod generator;
mod gui_bridge;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Planner stand-in and replay driver for the drone visualizer")]
struct Args {
    /// Generate one calculation, sample it and replay it headlessly
    #[arg(long, default_value_t = false)]
    offline: bool,
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    #[arg(long, default_value_t = 3)]
    drones: usize,
    #[arg(long, default_value_t = 2)]
    deliveries: usize,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Playback multiplier for headless replays (clamped to 0.5..=5)
    #[arg(long, default_value_t = 1.0)]
    speed: f64,
    /// Keep the planner bridge alive for the visualizer
    #[arg(long, default_value_t = false)]
    serve: bool,
    #[arg(long)]
    bind: Option<SocketAddr>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let workflow_config = if let Some(path) = args.workflow {
        WorkflowConfig::load(path)?
    } else {
        let config = WorkflowConfig::from_args(args.drones, args.deliveries, args.seed, args.speed);
        config.validate()?;
        config
    };

    let runner = Arc::new(Runner::new(workflow_config));
    let gui_bridge = GuiBridge::new(runner.clone());

    if args.offline {
        let result = runner.execute()?;

        println!(
            "Offline run -> drones {}, waypoints {}, cost {:.2}, events {}, marker refreshes {}, updates {}",
            result.plan.drone_paths.len(),
            result.plan.waypoint_count(),
            result.plan.total_cost,
            result.sampling.events,
            result.sampling.refreshes,
            result.replay.updates
        );
        println!(
            "  airspace: {} service points, {} restricted areas",
            result.context.service_points.len(),
            result.context.restricted_areas.len()
        );
        for drone in &result.replay.drones {
            println!(
                "  {} legs={} trail={} completed={}",
                drone.drone_id, drone.legs, drone.trail_len, drone.completed
            );
        }

        gui_bridge.publish(&result)?;
        gui_bridge.publish_status("Offline replay results ready.");

        let report = format!(
            "drones={} waypoints={} events={} markers={} updates={} virtual_ms={}\n",
            result.plan.drone_paths.len(),
            result.plan.waypoint_count(),
            result.sampling.events,
            result.sampling.final_markers,
            result.replay.updates,
            result.replay.elapsed_ms
        );
        let report_path = PathBuf::from("tools/data/offline_replay.log");
        if let Some(parent) = report_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&report_path)
            .with_context(|| format!("opening {}", report_path.display()))?;
        file.write_all(report.as_bytes())?;
    }
    if args.serve {
        gui_bridge.serve(args.bind.unwrap_or_else(gui_bind_address))?;
        gui_bridge.publish_status("Planner bridge running (Ctrl+C to stop)...");
        let runtime = TokioBuilder::new_current_thread()
            .enable_all()
            .build()
            .context("creating runtime for signal handling")?;
        runtime.block_on(async {
            signal::ctrl_c().await.context("awaiting Ctrl+C to exit")?;
            Ok::<(), anyhow::Error>(())
        })?;
    }

    Ok(())
}
