use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use camera_calib::core::ImageSize;
use camera_calib::{
    chessboard, spawn_worker, CalibrationConfig, CalibrationResult, ChessboardDetector, CornerFinder, CornerInput,
    ImageSequenceSource, ParameterStore, RectificationMap, WorkerEvent,
};
use clap::{Parser, Subcommand};
use log::LevelFilter;

/// Single-camera chessboard calibration.
#[derive(Debug, Parser)]
#[command(author, version, about = "Chessboard camera calibration and undistortion")]
struct Cli {
    /// Optional path to a JSON CalibrationConfig. Defaults are used if omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "info")]
    log_level: LevelFilter,

    /// Shorthand for `--log-level debug`.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Inner corners per row.
    #[arg(long, global = true)]
    columns: Option<u32>,

    /// Inner corners per column.
    #[arg(long, global = true)]
    rows: Option<u32>,

    /// Square edge length in board units.
    #[arg(long, global = true)]
    square_size: Option<f32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Collect board views, solve intrinsics and write both stores.
    Calibrate {
        /// Directory holding `left1.bmp`, `left2.bmp`, ...
        #[arg(long, required_unless_present = "use_stored_corners")]
        images: Option<PathBuf>,

        /// Reuse the corner store instead of detecting boards.
        #[arg(long)]
        use_stored_corners: bool,

        /// Number of views to collect.
        #[arg(long)]
        image_count: Option<usize>,

        /// Consecutive detections required before a view is accepted.
        #[arg(long)]
        debounce_frames: Option<u32>,

        /// Corner store path.
        #[arg(long)]
        corners: Option<PathBuf>,

        /// Parameter store path.
        #[arg(long)]
        intrinsics: Option<PathBuf>,
    },
    /// Detect the board in one image.
    Detect {
        image: PathBuf,

        /// Write the frame with the detected grid drawn on it.
        #[arg(long)]
        overlay: Option<PathBuf>,
    },
    /// Undistort one image with a stored camera model.
    Rectify {
        /// Parameter store path.
        #[arg(long)]
        params: PathBuf,
        input: PathBuf,
        output: PathBuf,
    },
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        LevelFilter::Debug.max(cli.log_level)
    } else {
        cli.log_level
    };
    init_logging(level);

    let mut config = match &cli.config {
        Some(path) => CalibrationConfig::load_json(path)?,
        None => CalibrationConfig::default(),
    };
    if let Some(c) = cli.columns {
        config.pattern.columns = c;
    }
    if let Some(r) = cli.rows {
        config.pattern.rows = r;
    }
    if let Some(s) = cli.square_size {
        config.pattern.square_size = s;
    }

    match cli.command {
        Command::Calibrate {
            images,
            use_stored_corners,
            image_count,
            debounce_frames,
            corners,
            intrinsics,
        } => {
            if let Some(n) = image_count {
                config.image_count = n;
            }
            if let Some(d) = debounce_frames {
                config.debounce_frames = d;
            }
            if let Some(p) = corners {
                config.corners_path = p;
            }
            if let Some(p) = intrinsics {
                config.intrinsics_path = p;
            }
            let input = if use_stored_corners {
                CornerInput::Stored
            } else {
                let dir = images.ok_or("--images is required without --use-stored-corners")?;
                let source = ImageSequenceSource::new(dir)?;
                // Files are read back to back, so the operator pause has no use.
                config.capture_pause_ms = 0;
                config.frame_size = first_frame_size(&source)?;
                CornerInput::Frames(Box::new(source))
            };
            let result = run_calibration(config, input)?;
            print_result(&result);
        }
        Command::Detect { image, overlay } => {
            config.validate()?;
            detect_one(&config, &image, overlay.as_deref())?;
        }
        Command::Rectify { params, input, output } => {
            rectify_one(&params, &input, &output)?;
        }
    }
    Ok(())
}

fn init_logging(level: LevelFilter) {
    #[cfg(feature = "tracing")]
    camera_calib::init_tracing(false, level);
    #[cfg(not(feature = "tracing"))]
    {
        let _ = camera_calib::init_with_level(level);
    }
}

fn first_frame_size(source: &ImageSequenceSource) -> Result<ImageSize, Box<dyn Error>> {
    let first = image::open(source.frame_path(0))?;
    Ok(ImageSize::new(first.width(), first.height()))
}

fn run_calibration(config: CalibrationConfig, input: CornerInput) -> Result<CalibrationResult, Box<dyn Error>> {
    let finder: Arc<dyn CornerFinder> = Arc::new(ChessboardDetector::new(config.chessboard.clone()));
    let worker = spawn_worker(config, finder, input)?;

    let mut outcome = None;
    while let Some(event) = worker.next_blocking() {
        match event {
            WorkerEvent::Progress { accepted, total } => log::info!("{accepted}/{total} views"),
            WorkerEvent::Warning(msg) => eprintln!("warning: {msg}"),
            WorkerEvent::Calibrated { result, .. } => {
                outcome = Some(Ok(*result));
                break;
            }
            WorkerEvent::Failed(e) => {
                outcome = Some(Err(e));
                break;
            }
            WorkerEvent::Cancelled => break,
            WorkerEvent::PhaseChanged(_) | WorkerEvent::Captured { .. } => {}
        }
    }
    worker.join();

    match outcome {
        Some(Ok(result)) => Ok(result),
        Some(Err(e)) => Err(e.into()),
        None => Err("calibration was cancelled".into()),
    }
}

fn print_result(result: &CalibrationResult) {
    let k = &result.camera.intrinsics;
    let d = &result.camera.distortion;
    println!("views:       {}", result.extrinsics.len());
    println!("fx fy:       {:.4} {:.4}", k.fx, k.fy);
    println!("cx cy:       {:.4} {:.4}", k.cx, k.cy);
    println!(
        "distortion:  k1={:.6} k2={:.6} p1={:.6} p2={:.6} k3={:.6}",
        d.k1, d.k2, d.p1, d.p2, d.k3
    );
    println!("rms error:   {:.4} px", result.reprojection_error);
}

fn detect_one(config: &CalibrationConfig, path: &Path, overlay: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let img = image::open(path)?.to_luma8();
    let detector = ChessboardDetector::new(config.chessboard.clone());
    let found = detector.detect(&img, &config.pattern);

    let corners: &[_] = match &found {
        Ok(points) => {
            println!("found {} corners", points.len());
            for (i, p) in points.iter().enumerate() {
                println!("{i:4} {:.3} {:.3}", p.x, p.y);
            }
            points.as_slice()
        }
        Err(e) => {
            println!("{e}");
            &[]
        }
    };

    if let Some(out) = overlay {
        let mut annotated = img.clone();
        chessboard::draw_chessboard_corners(&mut annotated, &config.pattern, corners, found.is_ok());
        annotated.save(out)?;
        println!("wrote overlay to {}", out.display());
    }
    Ok(())
}

fn rectify_one(params: &Path, input: &Path, output: &Path) -> Result<(), Box<dyn Error>> {
    let camera = ParameterStore::new(params).load()?;
    let img = image::open(input)?.to_luma8();
    let map = RectificationMap::build(&camera, ImageSize::new(img.width(), img.height()));
    let out = map.apply(&chessboard::gray_view(&img))?;
    let out = image::GrayImage::from_raw(out.width as u32, out.height as u32, out.data)
        .ok_or("rectified buffer does not match its size")?;
    out.save(output)?;
    println!("wrote {}", output.display());
    Ok(())
}
