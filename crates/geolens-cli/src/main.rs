//! `geolens` – headless session replay.
//!
//! Reads an agent directory dump (JSON array of agent records), starts a
//! session on the simulated renderer and walks the observer north, printing
//! what is in range and what is placed after every step.
//!
//! ```bash
//! geolens agents.json --steps 20 --step-m 5
//! geolens agents.json --lat 40.7128 --lon -74.0060 --config ./geolens.toml
//! geolens agents.json --heading 90
//! ```
//!
//! Ctrl-C ends the session cleanly before the walk is over.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use geolens_kernel::StaticProbe;
use geolens_perception::geo::offset;
use geolens_perception::transform::{Vec3, camera_relative, heading_rotation};
use geolens_runtime::{SessionConfig, SessionController, config};
use geolens_scene::sim::{SimBackend, SimLoader};
use geolens_types::{AgentRecord, GeoLensError, GeoPoint, Orientation, SessionPhase};
use tracing::warn;

// ─────────────────────────────────────────────────────────────────────────────
// CLI arguments
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "geolens")]
#[command(about = "Replay a walk through geo-anchored agents")]
#[command(version)]
struct Args {
    /// JSON file holding an array of agent records
    agents: PathBuf,

    /// Number of steps to walk
    #[arg(long, default_value_t = 10)]
    steps: u32,

    /// Metres walked north per step
    #[arg(long, default_value_t = 10.0)]
    step_m: f64,

    /// Pause between steps in milliseconds
    #[arg(long, default_value_t = 250)]
    interval_ms: u64,

    /// Starting latitude (defaults to 100 m south of the first agent)
    #[arg(long, requires = "lon", allow_negative_numbers = true)]
    lat: Option<f64>,

    /// Starting longitude
    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    lon: Option<f64>,

    /// Device heading as an alpha reading (degrees counter-clockwise from north)
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    heading: f64,

    /// Config file (defaults to ~/.geolens/config.toml)
    #[arg(short, long, env = "GEOLENS_CONFIG")]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let _guard = geolens_runtime::init_tracing("geolens");
    let args = Args::parse();

    print_banner();

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – ending session …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler");
    }

    let cfg = load_config(args.config.as_deref());

    let agents = match load_agents(&args.agents) {
        Ok(agents) => agents,
        Err(e) => {
            println!("{}: {}", "Agent file error".red(), e);
            return ExitCode::FAILURE;
        }
    };
    println!(
        "  Loaded {} agent(s) from {}",
        agents.len(),
        args.agents.display().to_string().bold()
    );

    let start = match (args.lat, args.lon) {
        (Some(lat), Some(lon)) => GeoPoint::new(lat, lon),
        _ => default_start(&agents),
    };

    // Single-threaded: loads and updates interleave on one thread.
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            println!("{}: {}", "Runtime error".red(), e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(walk(&args, cfg, agents, start, shutdown)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("{}: {}", "Session error".red(), e);
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Walk
// ─────────────────────────────────────────────────────────────────────────────

async fn walk(
    args: &Args,
    cfg: SessionConfig,
    agents: Vec<AgentRecord>,
    start: GeoPoint,
    shutdown: Arc<AtomicBool>,
) -> Result<(), GeoLensError> {
    let mut session = SessionController::new(
        cfg,
        Box::new(StaticProbe::headless()),
        Box::new(SimBackend::new()),
        Arc::new(SimLoader::with_default_catalog()),
    );
    println!("  Session {}", session.session_id().to_string().dimmed());

    self::start(&mut session, 1280, 720, args.heading)?;
    session.update_agents(agents);

    for step in 0..=args.steps {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        let north_m = f64::from(step) * args.step_m;
        session.update_location(offset(&start, 0.0, north_m));
        session.settle().await;
        print_step(step, north_m, &session);
        tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
    }

    session.end();
    let state = session.state();
    println!();
    println!("  {} {}", "Final state:".bold(), phase_label(state.phase));
    match serde_json::to_string_pretty(&state) {
        Ok(json) => println!("{json}"),
        Err(e) => warn!(error = %e, "failed to serialise session state"),
    }
    Ok(())
}

/// Initialise the session and point the device.  A failed initialisation
/// still releases the renderer before the error is returned.
fn start(
    session: &mut SessionController,
    width: u32,
    height: u32,
    heading: f64,
) -> Result<(), GeoLensError> {
    if let Err(e) = session.initialize(width, height) {
        session.end();
        return Err(e);
    }
    session.update_orientation(Orientation {
        alpha: heading,
        ..Orientation::default()
    });
    Ok(())
}

/// The closest placed agent and where it sits relative to the camera
/// (+x right, +z ahead).
fn nearest_in_view(session: &SessionController) -> Option<(String, Vec3)> {
    let alpha = session
        .observer()
        .and_then(|o| o.orientation)
        .map_or(0.0, |o| o.alpha);
    session
        .scene()
        .placed_objects()
        .min_by(|a, b| a.distance_m().total_cmp(&b.distance_m()))
        .map(|obj| {
            let seen = camera_relative(obj.local_position(), heading_rotation(alpha));
            (obj.agent_id().to_string(), seen)
        })
}

fn print_step(step: u32, north_m: f64, session: &SessionController) {
    let state = session.state();
    let in_range: Vec<String> = session.in_range().into_iter().map(|a| a.id).collect();
    let placed: Vec<String> = session.placed_ids().into_iter().collect();
    let heading = session
        .observer()
        .and_then(|o| o.orientation)
        .map_or(0.0, |o| o.compass_heading_deg());
    let nearest = match nearest_in_view(session) {
        Some((id, seen)) => format!("{id} ({:+.1} right, {:+.1} ahead)", seen.x, seen.z),
        None => "-".to_string(),
    };
    println!(
        "  [{:>3}] +{:>6.1} m  {}  facing {:>5.1}°  in range: {}  placed: {}  nearest: {}  ({} tris, {} draws)",
        step,
        north_m,
        phase_label(state.phase),
        heading,
        format_ids(&in_range).green(),
        format_ids(&placed).cyan(),
        nearest.bold(),
        state.render_stats.triangles,
        state.render_stats.draw_calls,
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn load_config(path: Option<&Path>) -> SessionConfig {
    let loaded = match path {
        Some(p) => config::load_from(p),
        None => config::load(),
    };
    match loaded {
        Ok(Some(cfg)) => cfg,
        Ok(None) => {
            println!("  No config file found; using defaults.");
            SessionConfig::default()
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            SessionConfig::default()
        }
    }
}

fn load_agents(path: &Path) -> Result<Vec<AgentRecord>, String> {
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    serde_json::from_str(&raw).map_err(|e| format!("failed to parse {}: {e}", path.display()))
}

/// 100 m south of the first agent, or the null island with no agents.
fn default_start(agents: &[AgentRecord]) -> GeoPoint {
    agents
        .first()
        .map(|a| offset(&a.location, 0.0, -100.0))
        .unwrap_or_else(|| GeoPoint::new(0.0, 0.0))
}

fn format_ids(ids: &[String]) -> String {
    if ids.is_empty() {
        "-".to_string()
    } else {
        ids.join(",")
    }
}

fn phase_label(phase: SessionPhase) -> colored::ColoredString {
    let label = phase.to_string();
    match phase {
        SessionPhase::Active => label.green(),
        SessionPhase::Error => label.red(),
        SessionPhase::Ended => label.dimmed(),
        SessionPhase::Idle | SessionPhase::Initializing => label.yellow(),
    }
}

fn print_banner() {
    println!();
    println!("  {} {}", "geolens".bold().cyan(), format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
    println!("  Geo-anchored AR session replay");
    println!();
}
