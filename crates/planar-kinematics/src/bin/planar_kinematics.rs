//! planar-kinematics CLI: calibrate cameras, map pixels onto a plane and
//! measure the motion of a tracked object.

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, LevelFilter};
use nalgebra::Point2;
use planar_kinematics::calib::CalibrationProfile;
use planar_kinematics::io::list_images;
use planar_kinematics::motion::{
    CancellationToken, FrameRange, FrameRate, FrameSource, KinematicsEstimator, LengthUnit,
};
use planar_kinematics::core::PatternSize;
use planar_kinematics::plane::PlaneTransformer;
use planar_kinematics::track::{
    BackgroundParams, BlobParams, CircleParams, ContourParams, LocatorKind, ObjectTracker,
};
use planar_kinematics::{
    calibrate_images, init_logging, load_gray, workflow, write_dense_map_file,
    write_kinematics_file, AnalysisConfig, CalibrateConfig, ImageSequenceSource,
    JsonProfileStore, ProfileStore,
};
use std::path::{Path, PathBuf};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "planar-kinematics")]
#[command(about = "Camera calibration, plane mapping and object kinematics from monocular video")]
#[command(version)]
struct Cli {
    /// Profile database (JSON, keyed by camera name).
    #[arg(long, global = true, default_value = "calibration_db.json")]
    db: PathBuf,

    /// More log output (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Calibrate a camera from chessboard images and save its profile.
    Calibrate(CalibrateArgs),

    /// Inspect or delete saved profiles.
    #[command(subcommand)]
    Profiles(ProfilesCommand),

    /// Fit the plane homography on a reference image and map pixels.
    Homography(HomographyArgs),

    /// Write the world coordinates of every pixel of a reference image.
    Map(MapArgs),

    /// Track an object through a frame sequence and report its kinematics.
    Analyze(AnalyzeArgs),
}

#[derive(Subcommand)]
enum ProfilesCommand {
    /// List profile names.
    List,
    /// Print one profile as JSON.
    Show { name: String },
    /// Delete a profile.
    Remove { name: String },
}

#[derive(Debug, Args)]
struct CalibrateArgs {
    /// Profile name to save under.
    #[arg(long)]
    name: String,

    /// Inner corners per column.
    #[arg(long)]
    rows: usize,

    /// Inner corners per row.
    #[arg(long)]
    cols: usize,

    /// Side of one square in the unit later used for analysis.
    #[arg(long)]
    square_size: f64,

    /// Optional JSON CalibrateConfig.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Calibration images, or directories of images.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
}

#[derive(Debug, Args)]
struct ReferenceArgs {
    /// Saved camera profile.
    #[arg(long)]
    profile: String,

    /// Image showing the pattern on the measurement plane.
    #[arg(long)]
    image: PathBuf,

    /// Optional JSON AnalysisConfig.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct HomographyArgs {
    #[command(flatten)]
    reference: ReferenceArgs,

    /// Undistorted pixel to map, `x,y`. Repeatable.
    #[arg(long = "pixel", value_parser = parse_point)]
    pixels: Vec<Point2<f64>>,

    /// Length of the printed axes, in squares.
    #[arg(long, default_value_t = 2.0)]
    axes: f64,
}

#[derive(Debug, Args)]
struct MapArgs {
    #[command(flatten)]
    reference: ReferenceArgs,

    /// Output text file with `x y X Y` lines.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LocatorArg {
    Blob,
    Circle,
    Contour,
    Background,
}

impl LocatorArg {
    fn to_kind(self) -> LocatorKind {
        match self {
            Self::Blob => LocatorKind::Blob(BlobParams::default()),
            Self::Circle => LocatorKind::Circle(CircleParams::default()),
            Self::Contour => LocatorKind::Contour(ContourParams::default()),
            Self::Background => LocatorKind::BackgroundSubtraction(BackgroundParams::default()),
        }
    }
}

#[derive(Debug, Args)]
struct AnalyzeArgs {
    #[command(flatten)]
    reference: ReferenceArgs,

    /// Directory of frames, processed in file-name order.
    #[arg(long)]
    frames: PathBuf,

    /// Capture frame rate of the sequence.
    #[arg(long)]
    fps: f64,

    /// First frame index.
    #[arg(long, default_value_t = 0)]
    start: usize,

    /// Last frame index (inclusive). Defaults to the last frame.
    #[arg(long)]
    end: Option<usize>,

    /// Locator override; the config's locator parameters are used otherwise.
    #[arg(long, value_enum)]
    locator: Option<LocatorArg>,

    /// Unit of the profile's square size (mm, cm, m).
    #[arg(long)]
    square_unit: Option<LengthUnit>,

    /// Output unit (mm, cm, m).
    #[arg(long)]
    unit: Option<LengthUnit>,

    /// Leave the speed after a gap undefined instead of pairing the sample
    /// with the last valid one.
    #[arg(long)]
    no_bridge_gaps: bool,

    /// Text export of the samples.
    #[arg(long)]
    out: Option<PathBuf>,

    /// JSON export of the full report.
    #[arg(long)]
    json: Option<PathBuf>,
}

fn parse_point(s: &str) -> Result<Point2<f64>, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected `x,y`, got `{s}`"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid coordinate `{v}`: {e}"))
    };
    Ok(Point2::new(parse(x)?, parse(y)?))
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn try_main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    });

    let mut store = JsonProfileStore::new(&cli.db);
    match cli.command {
        Commands::Calibrate(args) => run_calibrate(&mut store, &args),
        Commands::Profiles(cmd) => run_profiles(&mut store, cmd),
        Commands::Homography(args) => run_homography(&store, &args),
        Commands::Map(args) => run_map(&store, &args),
        Commands::Analyze(args) => run_analyze(&store, &args),
    }
}

fn load_profile(store: &JsonProfileStore, name: &str) -> CliResult<CalibrationProfile> {
    store
        .load(name)?
        .ok_or_else(|| format!("no profile named {name:?} in {}", store.path().display()).into())
}

fn load_analysis_config(path: Option<&Path>) -> CliResult<AnalysisConfig> {
    Ok(match path {
        Some(path) => AnalysisConfig::load_json(path)?,
        None => AnalysisConfig::default(),
    })
}

// ── calibrate ──────────────────────────────────────────────────────────

fn run_calibrate(store: &mut JsonProfileStore, args: &CalibrateArgs) -> CliResult<()> {
    if store.load(&args.name)?.is_some() {
        return Err(format!("profile {:?} already exists; remove it first", args.name).into());
    }
    let config = match &args.config {
        Some(path) => CalibrateConfig::load_json(path)?,
        None => CalibrateConfig::default(),
    };

    let mut paths = Vec::new();
    for input in &args.inputs {
        if input.is_dir() {
            paths.extend(list_images(input)?);
        } else {
            paths.push(input.clone());
        }
    }
    info!("calibrating {:?} from {} images", args.name, paths.len());

    let pattern = PatternSize::new(args.rows, args.cols);
    let run = calibrate_images(&paths, pattern, args.square_size, &config)?;
    for (path, reason) in &run.skipped {
        println!("skipped {}: {reason}", path.display());
    }

    let result = &run.result;
    println!(
        "views {}  rms {:.4} px  evaluations {}{}",
        run.used.len(),
        result.rms,
        result.iterations,
        if result.converged { "" } else { " (not converged)" }
    );
    let k = result.camera.intrinsics;
    let d = result.camera.distortion.to_coefs();
    println!("fx {:.3}  fy {:.3}  cx {:.3}  cy {:.3}", k.fx, k.fy, k.cx, k.cy);
    println!(
        "dist [{:.6}, {:.6}, {:.6}, {:.6}, {:.6}]",
        d[0], d[1], d[2], d[3], d[4]
    );
    for (path, view) in run.used.iter().zip(&result.views) {
        println!(
            "  {}: rms {:.4} px, max {:.4} px",
            path.display(),
            view.rms,
            view.max_error
        );
    }

    store.save(&result.to_profile(args.name.clone()))?;
    println!("saved profile {:?} to {}", args.name, store.path().display());
    Ok(())
}

// ── profiles ───────────────────────────────────────────────────────────

fn run_profiles(store: &mut JsonProfileStore, cmd: ProfilesCommand) -> CliResult<()> {
    match cmd {
        ProfilesCommand::List => {
            for name in store.names()? {
                println!("{name}");
            }
        }
        ProfilesCommand::Show { name } => {
            let profile = load_profile(store, &name)?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        ProfilesCommand::Remove { name } => {
            store.remove(&name)?;
            println!("removed profile {name:?}");
        }
    }
    Ok(())
}

// ── homography / map ───────────────────────────────────────────────────

fn reference_plane(
    store: &JsonProfileStore,
    args: &ReferenceArgs,
) -> CliResult<(CalibrationProfile, AnalysisConfig, PlaneTransformer)> {
    let profile = load_profile(store, &args.profile)?;
    let config = load_analysis_config(args.config.as_deref())?;
    let plane = workflow::plane_from_reference_file(&profile, &args.image, &config)?;
    Ok((profile, config, plane))
}

fn run_homography(store: &JsonProfileStore, args: &HomographyArgs) -> CliResult<()> {
    let (profile, config, plane) = reference_plane(store, &args.reference)?;
    let h = plane.homography()?.h;
    println!("H (world -> pixel):");
    for r in 0..3 {
        println!("  {:14.6e} {:14.6e} {:14.6e}", h[(r, 0)], h[(r, 1)], h[(r, 2)]);
    }
    println!("condition number {:.3e}", plane.condition_number()?);

    let axes = plane.coordinate_axes(args.axes)?;
    println!(
        "axes: origin ({:.2}, {:.2})  x ({:.2}, {:.2})  y ({:.2}, {:.2})",
        axes.origin.x, axes.origin.y, axes.x_axis.x, axes.x_axis.y, axes.y_axis.x, axes.y_axis.y
    );

    let scale = workflow::profile_scale(&profile, &config);
    for p in &args.pixels {
        let w = plane.pixel_to_world(*p)?;
        println!(
            "pixel ({:.2}, {:.2}) -> grid ({:.4}, {:.4}) -> ({:.4}, {:.4}) {}",
            p.x,
            p.y,
            w.x,
            w.y,
            scale.grid_to_output(w.x),
            scale.grid_to_output(w.y),
            scale.output_unit
        );
    }
    if let [a, b] = args.pixels.as_slice() {
        let d = plane.world_distance(*a, *b)?;
        println!("distance {:.4} {}", scale.grid_to_output(d), scale.output_unit);
    }
    Ok(())
}

fn run_map(store: &JsonProfileStore, args: &MapArgs) -> CliResult<()> {
    let (_, _, plane) = reference_plane(store, &args.reference)?;
    let img = load_gray(&args.reference.image)?;
    let map = plane.dense_map(img.width, img.height)?;
    write_dense_map_file(&args.out, &map)?;
    println!(
        "wrote {}x{} map to {}",
        map.width,
        map.height,
        args.out.display()
    );
    Ok(())
}

// ── analyze ────────────────────────────────────────────────────────────

fn run_analyze(store: &JsonProfileStore, args: &AnalyzeArgs) -> CliResult<()> {
    let (profile, mut config, plane) = reference_plane(store, &args.reference)?;
    if let Some(locator) = args.locator {
        config.tracker.locator = locator.to_kind();
    }
    if let Some(unit) = args.square_unit {
        config.square_unit = unit;
    }
    if let Some(unit) = args.unit {
        config.output_unit = unit;
    }
    if args.no_bridge_gaps {
        config.kinematics.bridge_gaps = false;
    }

    let mut source = ImageSequenceSource::open(&args.frames, None)?;
    let end = args
        .end
        .unwrap_or_else(|| source.frame_count().saturating_sub(1));
    let range = FrameRange::new(args.start, end);
    info!(
        "analyzing frames {}..={} with the {} locator",
        range.start,
        range.end,
        config.tracker.locator.name()
    );

    let report = KinematicsEstimator::new(config.kinematics.clone()).estimate_with_progress(
        &mut source,
        range,
        FrameRate::Fixed(args.fps),
        &plane,
        ObjectTracker::new(config.tracker.clone()),
        workflow::profile_scale(&profile, &config),
        &CancellationToken::new(),
        |p| {
            if p.processed % 100 == 0 {
                info!("{}/{} frames", p.processed, p.total);
            }
        },
    )?;

    let s = &report.summary;
    let unit = report.unit;
    let fmt = |v: Option<f64>| v.map_or_else(|| "undefined".to_string(), |v| format!("{v:.4}"));
    println!("frames {}  with position {}", s.frames, s.valid_positions);
    println!("mean speed {} {unit}/s", fmt(s.mean_speed));
    println!("mean acceleration {} {unit}/s^2", fmt(s.mean_acceleration));
    println!("path length {} {unit}", fmt(s.path_length));
    println!("net displacement {} {unit}", fmt(s.net_displacement));

    if let Some(path) = &args.out {
        write_kinematics_file(path, &report)?;
        println!("wrote samples to {}", path.display());
    }
    if let Some(path) = &args.json {
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        println!("wrote report to {}", path.display());
    }
    Ok(())
}
