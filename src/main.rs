use std::{
    fs,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use clap::{Parser, Subcommand};
use log::{error, info, warn};
use wisp::{
    EngineConfig, FileBasedStorage, GhostDataSource, GhostProfile, GhostType, LiveSession,
    RunSession, SessionEvent, WispError,
    comparison::RaceResult,
    ghost::FileGhostSource,
    persistence::{PersistenceWorker, SavedRunGhostSource, SavedRunId},
    session::{RunSummary, Ticker, replay::replay},
    tracking::{
        ChannelLocationProvider, LocationUpdate, MockLocationProvider, PermissionState,
        provider::read_fixes,
    },
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    /// Engine config file, defaults to the one in the user config directory
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Race a recorded run against a ghost, as fast as possible
    Replay {
        /// Fix recording in JSON Lines format
        #[arg(short, long)]
        fixes: PathBuf,

        #[command(flatten)]
        ghost: GhostArgs,

        /// Store the finished run
        #[arg(short, long, default_value_t = false)]
        save: bool,

        /// Write the recorded route as GeoJSON
        #[arg(long)]
        geojson: Option<PathBuf>,
    },
    /// Race a recorded run against a ghost on the wall clock
    Live {
        #[arg(short, long)]
        fixes: PathBuf,

        #[command(flatten)]
        ghost: GhostArgs,

        /// Playback speed multiplier
        #[arg(long, default_value_t = 1.)]
        speed: f64,

        #[arg(short, long, default_value_t = false)]
        save: bool,
    },
    /// Describe a ghost profile
    Ghost {
        #[command(flatten)]
        ghost: GhostArgs,
    },
    /// Write an even-paced goal ghost
    Goal {
        #[arg(long)]
        name: String,
        /// Target distance in meters
        #[arg(long)]
        distance: f64,
        /// Target time in seconds
        #[arg(long)]
        duration: f64,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Turn an activity summary (encoded polyline and moving time) into a ghost
    Activity {
        #[arg(long)]
        name: String,
        #[arg(long)]
        polyline: String,
        #[arg(long)]
        moving_time: f64,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// List or delete stored runs
    Runs {
        #[arg(long)]
        delete: Option<String>,
    },
}

#[derive(clap::Args, Debug)]
#[group(required = true, multiple = false)]
struct GhostArgs {
    /// Ghost profile JSON file
    #[arg(short, long)]
    ghost: Option<PathBuf>,

    /// Id of a stored run to race against
    #[arg(long)]
    past_run: Option<String>,
}

impl GhostArgs {
    fn load(&self) -> Result<GhostProfile, WispError> {
        match (&self.ghost, &self.past_run) {
            (Some(path), _) => FileGhostSource::new(path).load_ghost(),
            (None, Some(id)) => SavedRunGhostSource::new(
                FileBasedStorage::new_default()?,
                SavedRunId::from(id.as_str()),
            )
            .load_ghost(),
            (None, None) => Err(WispError::GhostSourceError {
                reason: "no ghost given".to_string(),
            }),
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, WispError> {
    match path {
        Some(path) => EngineConfig::from_file(path),
        None => Ok(EngineConfig::from_local_file().unwrap_or_default()),
    }
}

fn print_result(result: &RaceResult, summary: &RunSummary) {
    println!(
        "{} against '{}': {:+.1} s, {:.2} km ({:.0}% of the ghost's distance)",
        result.status,
        summary.ghost_name,
        result.time_difference,
        result.distance_completed / 1000.,
        result.completion_percentage * 100.
    );
    if let Some(pace) = summary.average_pace_s_per_km {
        println!(
            "Moving time {:.0} s, average pace {}:{:02} /km",
            summary.moving_time_s,
            (pace / 60.).floor() as u64,
            (pace % 60.).round() as u64
        );
    }
    for split in &result.split_comparisons {
        println!(
            "  {:>6.0} m  {:>7.1} s  ghost {:>7.1} s  {:+.1} s",
            split.distance_mark,
            split.user_split_time,
            split.ghost_split_time,
            split.difference()
        );
    }
}

fn replay_command(
    config: EngineConfig,
    fixes: &Path,
    ghost: GhostProfile,
    save: bool,
    geojson: Option<&Path>,
) -> Result<(), WispError> {
    let mut provider = MockLocationProvider::from_file(fixes)?;
    let mut session = RunSession::new(config);
    let Some(result) = replay(&mut session, ghost, &mut provider)? else {
        warn!("Replay produced no result");
        return Ok(());
    };
    print_result(&result, &session.summary());

    if let Some(path) = geojson {
        let content = serde_json::to_string_pretty(&session.route().to_geojson())
            .map_err(|e| WispError::SerializeError { source: e })?;
        fs::write(path, content).map_err(|e| WispError::StorageIOError { source: e })?;
        info!("Route written to {:?}", path);
    }
    if save {
        let mut storage = FileBasedStorage::new_default()?;
        let id = session.save(&mut storage)?;
        println!("Saved as {}", id);
    }
    Ok(())
}

fn live_command(
    config: EngineConfig,
    fixes: &Path,
    ghost: GhostProfile,
    speed: f64,
    save: bool,
) -> Result<(), WispError> {
    let speed = if speed > 0. { speed } else { 1. };
    let fixes = read_fixes(fixes)?;
    let (platform, provider) = ChannelLocationProvider::new(PermissionState::WhenInUse);
    let ticker = Ticker::new(config.tick_interval().div_f64(speed));
    let countdown = config.tick_interval().mul_f64(config.countdown_ticks as f64 / speed);
    let split_unit_m = config.split_unit_m;
    let ghost_name = ghost.name.clone();

    let mut live = LiveSession::new(config);
    if save {
        live = live.with_persistence(PersistenceWorker::spawn(Box::new(
            FileBasedStorage::new_default()?,
        )));
    }
    let handle = live.start(ghost, provider, ticker)?;

    // plays the recording back in real time once the countdown is over
    thread::spawn(move || {
        thread::sleep(countdown);
        let mut previous: Option<f64> = None;
        for fix in fixes {
            if let Some(previous) = previous {
                let wait = ((fix.timestamp - previous) / speed).max(0.);
                thread::sleep(Duration::from_secs_f64(wait));
            }
            previous = Some(fix.timestamp);
            if platform.send(LocationUpdate::Fix(fix)).is_err() {
                break;
            }
        }
    });

    let mut stopping = false;
    for event in handle.events().iter() {
        match event {
            SessionEvent::CountdownTick { remaining } if remaining > 0 => println!("{}...", remaining),
            SessionEvent::PhaseChanged { to, .. } => info!("Session {}", to),
            SessionEvent::Comparison(sample) => println!(
                "{:>6.0} s  {:>7.0} m  ghost {:>7.0} m  {} by {:.1} s",
                sample.moving_time,
                sample.user_distance,
                sample.ghost_distance_at_same_time,
                sample.ahead_or_behind,
                sample.gap_seconds.abs()
            ),
            SessionEvent::Degraded(reason) => warn!("Recording degraded: {:?}", reason),
            SessionEvent::Finished(result) => {
                let snapshot = handle.snapshot();
                let summary = RunSummary::new(
                    ghost_name.as_str(),
                    &snapshot.route,
                    snapshot.state.elapsed_time,
                    snapshot.state.moving_time,
                    split_unit_m,
                );
                print_result(&result, &summary);
                if save {
                    handle.save()?;
                } else {
                    break;
                }
            }
            SessionEvent::Saved(id) => {
                println!("Saved as {}", id);
                break;
            }
            SessionEvent::SaveFailed { reason } => {
                error!("Could not save run: {}", reason);
                break;
            }
            _ => {}
        }
        // a recording cannot recover from a lost provider, end the run instead
        let snapshot = handle.snapshot();
        if !stopping && snapshot.state.degraded.is_some() && snapshot.state.phase.is_live() {
            stopping = true;
            handle.stop()?;
        }
    }

    handle.shutdown()?;
    Ok(())
}

fn describe_ghost(ghost: &GhostProfile, split_unit_m: f64) {
    println!(
        "{} ({}): {:.2} km in {:.0} s, {:.0} s/km",
        ghost.name,
        ghost.ghost_type,
        ghost.target_distance / 1000.,
        ghost.target_duration,
        ghost.average_pace() * 1000.
    );
    for split in ghost.schedule(split_unit_m) {
        println!(
            "  {:>6.0} m  {:>7.1} s",
            split.distance_mark, split.cumulative_target_time
        );
    }
}

fn write_ghost(ghost: &GhostProfile, output: &Path) -> Result<(), WispError> {
    let content =
        serde_json::to_string_pretty(ghost).map_err(|e| WispError::SerializeError { source: e })?;
    fs::write(output, content).map_err(|e| WispError::StorageIOError { source: e })?;
    println!("Ghost written to {}", output.display());
    Ok(())
}

fn runs_command(delete: Option<&str>) -> Result<(), WispError> {
    let mut storage = FileBasedStorage::new_default()?;
    if let Some(id) = delete {
        return storage.delete_run(&SavedRunId::from(id));
    }
    for id in storage.list_runs()? {
        match storage.load_run(&id)? {
            Some(run) => println!(
                "{}  {:>7.2} km  {:>6.0} s  {} vs '{}'",
                id,
                run.summary.distance_m / 1000.,
                run.summary.moving_time_s,
                run.result.status,
                run.summary.ghost_name
            ),
            None => warn!("Run {} disappeared while listing", id),
        }
    }
    Ok(())
}

fn run(cli: &Args) -> Result<(), WispError> {
    let config = load_config(cli.config.as_deref())?;
    match &cli.command {
        Commands::Replay {
            fixes,
            ghost,
            save,
            geojson,
        } => replay_command(config, fixes, ghost.load()?, *save, geojson.as_deref()),
        Commands::Live {
            fixes,
            ghost,
            speed,
            save,
        } => live_command(config, fixes, ghost.load()?, *speed, *save),
        Commands::Ghost { ghost } => {
            describe_ghost(&ghost.load()?, config.split_unit_m);
            Ok(())
        }
        Commands::Goal {
            name,
            distance,
            duration,
            output,
        } => write_ghost(
            &GhostProfile::from_target_pace(name.as_str(), *distance, *duration, config.split_unit_m)?,
            output,
        ),
        Commands::Activity {
            name,
            polyline,
            moving_time,
            output,
        } => write_ghost(
            &GhostProfile::from_polyline_activity(
                GhostType::StravaFriend,
                name.as_str(),
                polyline,
                *moving_time,
            )?,
            output,
        ),
        Commands::Runs { delete } => runs_command(delete.as_deref()),
    }
}

fn main() {
    #[cfg(debug_assertions)]
    colog::init();

    let cli = Args::parse();
    if let Err(e) = ctrlc::set_handler(move || {
        println!("Exiting...");
        std::process::exit(0);
    }) {
        warn!("Could not set Ctrl-C handler: {}", e);
    }

    if let Err(e) = run(&cli) {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
