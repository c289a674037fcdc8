//! turnscore CLI — timing tables, scale listing, simulated runs and playback.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use clap::{Args, Parser, Subcommand, ValueEnum};
use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use tracing_subscriber::EnvFilter;

use turnscore::{
    Chord, ChordSink, Frame, FrameSource, Recording, RecordingMetadata, RoiMode, RotationState,
    ScanRegion, TurnscoreConfig, TurntablePipeline, SECTOR_COUNT,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "turnscore")]
#[command(about = "Turn a camera-observed rotating turntable into note events")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print rotation timing and sector frame spans.
    Timing {
        /// Turntable speed in revolutions per minute.
        #[arg(long, default_value_t = 2.5)]
        rpm: f64,
        /// Camera frame rate.
        #[arg(long, default_value_t = 30.0)]
        fps: f64,
    },

    /// List builtin and configured scales.
    Scales {
        /// Optional JSON configuration with custom scale definitions.
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Rotate a still disc image to simulate a camera and run the pipeline.
    Simulate(SimulateArgs),

    /// Play back a recorded session or a panorama image.
    Play(PlayArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RoiModeArg {
    Rectangular,
    Radial,
}

impl From<RoiModeArg> for RoiMode {
    fn from(arg: RoiModeArg) -> Self {
        match arg {
            RoiModeArg::Rectangular => RoiMode::Rectangular,
            RoiModeArg::Radial => RoiMode::Radial,
        }
    }
}

#[derive(Debug, Clone, Args)]
struct SimulateArgs {
    /// Still image of the disc, rotated about its centre.
    #[arg(long)]
    disc: PathBuf,

    /// Number of frames to synthesize.
    #[arg(long, default_value_t = 720)]
    frames: u64,

    /// Simulated frame rate.
    #[arg(long, default_value_t = 30.0)]
    fps: f64,

    /// Simulated platter speed (defaults to the configured nominal rpm).
    #[arg(long)]
    rpm: Option<f64>,

    /// JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Record one rotation into this session directory.
    #[arg(long)]
    record_dir: Option<PathBuf>,

    /// Scan region geometry.
    #[arg(long, value_enum, default_value_t = RoiModeArg::Rectangular)]
    roi_mode: RoiModeArg,

    /// Estimate rpm from the frames instead of trusting the nominal value.
    #[arg(long)]
    detect_rpm: bool,
}

#[derive(Debug, Clone, Args)]
struct PlayArgs {
    /// Session directory containing score.json.
    #[arg(long, conflicts_with = "panorama", required_unless_present = "panorama")]
    session: Option<PathBuf>,

    /// Panorama image (one profile per column).
    #[arg(long)]
    panorama: Option<PathBuf>,

    /// Number of frames to play.
    #[arg(long, default_value_t = 720)]
    frames: u64,

    /// Frame rate for panorama playback; one column is played per frame.
    #[arg(long, default_value_t = 30.0)]
    fps: f64,

    /// Scan geometry the panorama was captured with.
    #[arg(long, value_enum, default_value_t = RoiModeArg::Rectangular)]
    roi_mode: RoiModeArg,

    /// JSON configuration file (mapping and scale for panorama playback).
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Timing { rpm, fps } => run_timing(rpm, fps),
        Commands::Scales { config } => run_scales(config.as_deref()),
        Commands::Simulate(args) => run_simulate(&args),
        Commands::Play(args) => run_play(&args),
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> CliResult<TurnscoreConfig> {
    match path {
        Some(p) => {
            tracing::info!("Loading config: {}", p.display());
            Ok(TurnscoreConfig::from_json_file(p)?)
        }
        None => Ok(TurnscoreConfig::default()),
    }
}

// ── sources and sinks ──────────────────────────────────────────────────

/// Synthetic camera: the disc image rotated by `rpm` at `fps`.
struct RotatingDiscSource {
    disc: RgbImage,
    fps: f64,
    deg_per_frame: f64,
    next: u64,
    total: u64,
}

impl FrameSource for RotatingDiscSource {
    fn next_frame(&mut self) -> Option<Frame> {
        if self.next >= self.total {
            return None;
        }
        let index = self.next;
        self.next += 1;
        let theta = (index as f64 * self.deg_per_frame).rem_euclid(360.0).to_radians();
        let img = rotate_about_center(
            &self.disc,
            theta as f32,
            Interpolation::Bilinear,
            Rgb([0, 0, 0]),
        );
        Some(Frame::rgb(index, img))
    }

    fn fps(&self) -> f64 {
        self.fps
    }
}

/// Frame indices only; playback ignores pixels.
struct TickSource {
    fps: f64,
    next: u64,
    total: u64,
}

impl FrameSource for TickSource {
    fn next_frame(&mut self) -> Option<Frame> {
        if self.next >= self.total {
            return None;
        }
        let index = self.next;
        self.next += 1;
        Some(Frame::gray(index, image::GrayImage::new(1, 1)))
    }

    fn fps(&self) -> f64 {
        self.fps
    }
}

/// One JSON object per emitted chord on stdout.
struct JsonLinesSink {
    out: std::io::Stdout,
    emitted: u64,
}

impl ChordSink for JsonLinesSink {
    fn emit(&mut self, chord: &Chord) {
        let line = serde_json::json!({ "index": self.emitted, "notes": chord });
        self.emitted += 1;
        let written = serde_json::to_string(&line)
            .map_err(CliError::from)
            .and_then(|s| writeln!(self.out.lock(), "{}", s).map_err(CliError::from));
        if let Err(e) = written {
            tracing::warn!("dropping chord: {}", e);
        }
    }
}

// ── timing ─────────────────────────────────────────────────────────────

fn run_timing(rpm: f64, fps: f64) -> CliResult<()> {
    let st = RotationState::new(rpm, fps)?;
    println!("turnscore timing");
    println!("  rpm:                 {}", st.rpm());
    println!("  fps:                 {}", st.fps());
    println!("  rotation period:     {:.3} s", st.period());
    println!("  sector period:       {:.3} s", st.sector_period());
    println!("  frames per rotation: {}", st.frames_per_rotation());
    println!("  frames per sector:   {}", st.frames_per_sector());
    println!("  degrees per frame:   {:.4}", st.degrees_per_frame());
    for sector in 0..SECTOR_COUNT as u8 {
        let span = st.sector_frame_span(sector);
        println!(
            "  sector {:>2}: frames [{}, {})  {:>5.1}°",
            sector,
            span.start,
            span.end,
            sector as f64 * turnscore::SECTOR_DEG
        );
    }
    Ok(())
}

// ── scales ─────────────────────────────────────────────────────────────

fn run_scales(config: Option<&Path>) -> CliResult<()> {
    let cfg = load_config(config)?;
    let lib = &cfg.scales;
    for name in lib.names() {
        let marker = if name == lib.default_scale { "*" } else { " " };
        match lib.resolve(&name) {
            Ok(scale) => println!(
                "{} {:<12} {:>3} pitches  [{}..={}]",
                marker,
                name,
                scale.pitches.len(),
                scale.pitches.first().copied().unwrap_or(0),
                scale.pitches.last().copied().unwrap_or(0)
            ),
            Err(e) => println!("{} {:<12} invalid: {}", marker, name, e),
        }
    }
    Ok(())
}

// ── simulate ───────────────────────────────────────────────────────────

fn run_simulate(args: &SimulateArgs) -> CliResult<()> {
    let mut config = load_config(args.config.as_deref())?;
    if args.detect_rpm {
        config.rotation.detect_rpm = true;
    }
    if let Some(dir) = &args.record_dir {
        config.recorder.record = true;
        config.recorder.session_dir = Some(dir.clone());
    }

    tracing::info!("Loading disc image: {}", args.disc.display());
    let disc = image::open(&args.disc)
        .map_err(|e| -> CliError {
            format!("Failed to open image {}: {}", args.disc.display(), e).into()
        })?
        .to_rgb8();
    let (w, h) = disc.dimensions();
    tracing::info!("Disc size: {}x{}", w, h);

    let rpm = args.rpm.unwrap_or(config.rotation.nominal_rpm);
    let region = match args.roi_mode {
        RoiModeArg::Rectangular => ScanRegion::default_rectangular(w, h),
        RoiModeArg::Radial => ScanRegion::default_radial(w, h, 0, 20),
    };
    let mut source = RotatingDiscSource {
        disc,
        fps: args.fps,
        deg_per_frame: 360.0 * rpm / (60.0 * args.fps),
        next: 0,
        total: args.frames,
    };
    let mut pipeline = TurntablePipeline::new(config, source.fps(), region)?;
    let mut sink = JsonLinesSink {
        out: std::io::stdout(),
        emitted: 0,
    };
    let stats = pipeline.run(&mut source, &mut sink, &AtomicBool::new(false))?;

    tracing::info!(
        "{} chords, {} notes, {} scan errors, final rpm {:.3}",
        stats.chords_emitted,
        stats.notes_emitted,
        stats.scan_errors,
        pipeline.rotation().rpm()
    );
    if args.record_dir.is_some() && stats.rotations_recorded == 0 {
        tracing::warn!("source ended before a full rotation; nothing recorded");
    }
    Ok(())
}

// ── play ───────────────────────────────────────────────────────────────

fn run_play(args: &PlayArgs) -> CliResult<()> {
    let config = load_config(args.config.as_deref())?;
    let recording = match (&args.session, &args.panorama) {
        (Some(dir), _) => {
            tracing::info!("Loading session: {}", dir.display());
            Recording::load_session(dir)?
        }
        (None, Some(path)) => {
            tracing::info!("Loading panorama: {}", path.display());
            // Placeholder rpm; the panorama width sets the rotation length.
            let rotation = RotationState::new(config.rotation.nominal_rpm, args.fps)?;
            let scale = config.scales.active()?;
            let metadata = RecordingMetadata::new(&rotation, scale, args.roi_mode.into());
            Recording::load_panorama(metadata, path)?
        }
        (None, None) => return Err("either --session or --panorama is required".into()),
    };

    let fps = recording.metadata.fps;
    let region = ScanRegion::default_rectangular(1, 1);
    let mut pipeline = TurntablePipeline::new(config, fps, region)?;
    pipeline.enter_playback(recording)?;

    let mut source = TickSource {
        fps,
        next: 0,
        total: args.frames,
    };
    let mut sink = JsonLinesSink {
        out: std::io::stdout(),
        emitted: 0,
    };
    let stats = pipeline.run(&mut source, &mut sink, &AtomicBool::new(false))?;
    tracing::info!(
        "played {} frames, {} notes",
        stats.chords_emitted,
        stats.notes_emitted
    );
    Ok(())
}
