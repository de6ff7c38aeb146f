//! trashrack CLI: rectify trash-rack frames and measure obstructions from
//! precomputed segmentation and depth.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use trashrack::io::{load_class_mask, load_depth, load_rgb, write_class_mask};
use trashrack::rectify::rectify;
use trashrack::volume::MapDepth;
use trashrack::{measure_obstructions, DetectionsFile, PipelineConfig, RectifyReport};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "trashrack")]
#[command(about = "Rectify trash-rack images and estimate obstruction area and volume")]
#[command(version)]
struct Cli {
    /// Log level; the TRASHRACK_LOG environment variable takes precedence.
    #[arg(long, global = true, value_enum, default_value_t = LogLevelArg::Info)]
    log_level: LogLevelArg,

    /// Emit JSON logs (requires the `tracing` feature).
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevelArg {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LevelFilter {
    fn from(v: LogLevelArg) -> Self {
        match v {
            LogLevelArg::Off => LevelFilter::Off,
            LogLevelArg::Error => LevelFilter::Error,
            LogLevelArg::Warn => LevelFilter::Warn,
            LogLevelArg::Info => LevelFilter::Info,
            LogLevelArg::Debug => LevelFilter::Debug,
            LogLevelArg::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Rectify a frame so every grid cell and column has its physical width.
    Rectify(RectifyArgs),

    /// Measure obstructions on a rectified frame.
    Metrics(MetricsArgs),

    /// Print the default pipeline configuration as JSON.
    DefaultConfig,
}

#[derive(Debug, Clone, Args)]
struct RectifyArgs {
    /// Input frame.
    #[arg(long)]
    image: PathBuf,

    /// Detections of the input frame (JSON with `classes` and `detections`).
    #[arg(long)]
    detections: PathBuf,

    /// Class mask of the input frame (8-bit PNG of class codes).
    #[arg(long)]
    mask: Option<PathBuf>,

    /// Pipeline configuration (JSON). Defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the horizontal resolution in meters per pixel.
    #[arg(long)]
    x_res: Option<f64>,

    /// Rectified frame output path.
    #[arg(long)]
    out: PathBuf,

    /// Rectified class mask output path (requires --mask).
    #[arg(long, requires = "mask")]
    mask_out: Option<PathBuf>,

    /// Scale and section layout output path (JSON).
    #[arg(long)]
    report: PathBuf,
}

#[derive(Debug, Clone, Args)]
struct MetricsArgs {
    /// Rectified frame.
    #[arg(long)]
    image: PathBuf,

    /// Class mask of the rectified frame (8-bit PNG of class codes).
    #[arg(long)]
    mask: PathBuf,

    /// Detections of the rectified frame (JSON).
    #[arg(long)]
    detections: PathBuf,

    /// Relative depth of the rectified frame (8- or 16-bit grayscale).
    #[arg(long)]
    depth: PathBuf,

    /// Report written by `trashrack rectify` (provides the scale).
    #[arg(long)]
    scale: PathBuf,

    /// Pipeline configuration (JSON).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Metrics output path (JSON).
    #[arg(long)]
    out: PathBuf,
}

fn load_config(path: Option<&PathBuf>) -> CliResult<PipelineConfig> {
    Ok(match path {
        Some(p) => PipelineConfig::load_json(p)?,
        None => PipelineConfig::default(),
    })
}

fn run_rectify(args: RectifyArgs) -> CliResult<()> {
    let mut cfg = load_config(args.config.as_ref())?;
    if let Some(x_res) = args.x_res {
        cfg.params.x_res = x_res;
    }
    let p = &cfg.params;

    let image = load_rgb(&args.image)?;
    let dets = DetectionsFile::load_json(&args.detections)?;
    let mask = args.mask.as_ref().map(load_class_mask).transpose()?;

    let columns = dets.boxes_of(&p.column_class);
    let structures = dets.boxes_of(&p.structure_class);
    log::info!(
        "{}: {} column and {} structure boxes",
        args.image.display(),
        columns.len(),
        structures.len()
    );

    let out = rectify(
        &image,
        mask.as_ref(),
        &columns,
        &structures,
        p.barrier,
        p.x_res,
    )?;

    out.image.save(&args.out)?;
    if let (Some(path), Some(mask)) = (args.mask_out.as_ref(), out.mask.as_ref()) {
        write_class_mask(mask, path)?;
    }
    RectifyReport {
        scale: out.scale,
        plan: out.plan,
    }
    .write_json(&args.report)?;

    println!(
        "rectified {} -> {} ({}x{}, x_res={:.4} m/px, y_res={:.4} m/px)",
        args.image.display(),
        args.out.display(),
        out.image.width(),
        out.image.height(),
        out.scale.x_res,
        out.scale.y_res
    );
    Ok(())
}

fn run_metrics(args: MetricsArgs) -> CliResult<()> {
    let cfg = load_config(args.config.as_ref())?;
    let image = load_rgb(&args.image)?;
    let mask = load_class_mask(&args.mask)?;
    let dets = DetectionsFile::load_json(&args.detections)?;
    let depth_map = load_depth(&args.depth)?;
    if (depth_map.width as u32, depth_map.height as u32) != image.dimensions() {
        return Err(format!(
            "depth map is {}x{}, rectified frame is {}x{}",
            depth_map.width,
            depth_map.height,
            image.width(),
            image.height()
        )
        .into());
    }
    let depth = MapDepth::new(depth_map);
    let scale = RectifyReport::load_json(&args.scale)?.scale;

    let report = measure_obstructions(
        &image,
        &mask,
        &dets.classes,
        &dets.detections,
        scale,
        &depth,
        &cfg.params,
    )?;
    report.write_json(&args.out)?;

    println!(
        "{} obstructions, {:.2} m2, {:.2} m3 -> {}",
        report.obstructions.len(),
        report.total_area_m2(),
        report.total_volume_m3(),
        args.out.display()
    );
    Ok(())
}

fn init_logging(cli: &Cli) {
    #[cfg(feature = "tracing")]
    {
        trashrack::core::init_tracing(cli.json_logs);
        log::set_max_level(cli.log_level.into());
    }
    #[cfg(not(feature = "tracing"))]
    {
        if cli.json_logs {
            eprintln!("--json-logs needs the `tracing` feature; using plain logs");
        }
        if let Err(err) = trashrack::core::init_from_env(cli.log_level.into()) {
            eprintln!("logger already installed: {err}");
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    let result = match cli.command {
        Commands::Rectify(args) => run_rectify(args),
        Commands::Metrics(args) => run_metrics(args),
        Commands::DefaultConfig => serde_json::to_string_pretty(&PipelineConfig::default())
            .map(|json| println!("{json}"))
            .map_err(CliError::from),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
