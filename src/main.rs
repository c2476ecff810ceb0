use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use rayon::prelude::*;

use fluoro_quant_lib::config::{BackgroundModel, DespeckleShape, PipelineConfig, StageOrder, Task};
use fluoro_quant_lib::image_io::{get_image_files_in_dir, load_image};
use fluoro_quant_lib::output::{write_report_csv, write_report_json};
use fluoro_quant_lib::pipeline::run_with_provider;
use fluoro_quant_lib::roi::{CsvRois, RoiProvider, WholeImage};

/// Command-line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about = "FluoroQuant - Fluorescence Microscopy Quantification")]
struct Args {
    /// Path to input image or directory of images
    #[clap(short, long)]
    input: PathBuf,

    /// Path to output CSV (or directory when the input is a directory)
    #[clap(short, long)]
    output: PathBuf,

    /// Path to a TOML configuration file
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Measurement to run
    #[clap(long, value_enum)]
    task: Option<TaskArg>,

    /// Apply Otsu thresholding
    #[clap(long = "apply_otsu")]
    apply_otsu: bool,

    /// Apply background subtraction
    #[clap(long = "apply_bg_subtraction", conflicts_with = "no_bg_sub")]
    apply_bg_subtraction: bool,

    /// Skip background subtraction
    #[clap(long = "no-bg-sub")]
    no_bg_sub: bool,

    /// Median window for despeckling [config default: 20]
    #[clap(long = "despeckle_radius")]
    despeckle_radius: Option<i32>,

    /// Disk radius for background estimation [config default: 20]
    #[clap(long = "rolling_radius")]
    rolling_radius: Option<i32>,

    /// Fixed threshold instead of Otsu
    #[clap(long = "manual-threshold")]
    manual_threshold: Option<i32>,

    /// BrdU-positive detection threshold [config default: 100]
    #[clap(long = "brdu-threshold")]
    brdu_threshold: Option<i32>,

    /// Order of the threshold and background stages
    #[clap(long = "stage-order", value_enum)]
    stage_order: Option<StageOrderArg>,

    /// Background estimator [default: closing for roi, median for regions]
    #[clap(long = "background-model", value_enum)]
    background_model: Option<BackgroundModelArg>,

    /// Gaussian smoothing sigma applied right before thresholding
    #[clap(long = "smooth-sigma")]
    smooth_sigma: Option<f32>,

    /// Median window shape
    #[clap(long = "despeckle-shape", value_enum)]
    despeckle_shape: Option<DespeckleShapeArg>,

    /// CSV file with x,y,width,height rectangles (default: whole image)
    #[clap(long)]
    rois: Option<PathBuf>,

    /// Also write the full report as JSON
    #[clap(long)]
    report: Option<PathBuf>,

    /// Write the effective configuration to this TOML file
    #[clap(long = "save-config")]
    save_config: Option<PathBuf>,

    /// Enable debug logging
    #[clap(short, long)]
    debug: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TaskArg {
    Roi,
    Regions,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StageOrderArg {
    ThresholdFirst,
    BackgroundFirst,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackgroundModelArg {
    Closing,
    Opening,
    Median,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DespeckleShapeArg {
    Disk,
    Square,
}

impl Args {
    /// Load the config file (if any) and apply command-line overrides
    fn resolve_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_file(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(task) = self.task {
            config.task = match task {
                TaskArg::Roi => Task::Roi,
                TaskArg::Regions => Task::Regions,
            };
        }

        if self.apply_otsu {
            config.apply_otsu = true;
        }

        if self.no_bg_sub {
            config.apply_bg_subtraction = false;
        } else if self.apply_bg_subtraction {
            config.apply_bg_subtraction = true;
        }

        if let Some(radius) = self.despeckle_radius {
            config.despeckle_radius = radius;
        }

        if let Some(radius) = self.rolling_radius {
            config.rolling_radius = radius;
        }

        if self.manual_threshold.is_some() {
            config.manual_threshold = self.manual_threshold;
        }

        if let Some(threshold) = self.brdu_threshold {
            config.brdu_threshold = threshold;
        }

        if let Some(order) = self.stage_order {
            config.stage_order = match order {
                StageOrderArg::ThresholdFirst => StageOrder::ThresholdFirst,
                StageOrderArg::BackgroundFirst => StageOrder::BackgroundFirst,
            };
        }

        if let Some(model) = self.background_model {
            config.background_model = Some(match model {
                BackgroundModelArg::Closing => BackgroundModel::Closing,
                BackgroundModelArg::Opening => BackgroundModel::Opening,
                BackgroundModelArg::Median => BackgroundModel::Median,
            });
        }

        if self.smooth_sigma.is_some() {
            config.smooth_sigma = self.smooth_sigma;
        }

        if let Some(shape) = self.despeckle_shape {
            config.despeckle_shape = match shape {
                DespeckleShapeArg::Disk => DespeckleShape::Disk,
                DespeckleShapeArg::Square => DespeckleShape::Square,
            };
        }

        Ok(config)
    }

    fn roi_provider(&self) -> Box<dyn RoiProvider + Sync> {
        match &self.rois {
            Some(path) => Box::new(CsvRois::new(path)),
            None => Box::new(WholeImage),
        }
    }
}

/// Load, process and export one image
fn process_file(
    input: &Path,
    csv_path: &Path,
    json_path: Option<&Path>,
    config: &PipelineConfig,
    provider: &(dyn RoiProvider + Sync),
) -> anyhow::Result<()> {
    let image = load_image(input).with_context(|| format!("loading {}", input.display()))?;
    let report = run_with_provider(&image, config, provider)
        .with_context(|| format!("processing {}", input.display()))?;

    write_report_csv(&report, csv_path)?;
    if let Some(json_path) = json_path {
        write_report_json(&report, json_path)?;
    }

    Ok(())
}

/// Main function
fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    let level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    // Load configuration; reject bad parameters before touching any image
    let config = args.resolve_config()?;
    config.validate()?;

    if let Some(path) = &args.save_config {
        config.save_to_file(path)?;
        log::info!("Configuration saved to '{}'", path.display());
    }

    let provider = args.roi_provider();
    let start_time = Instant::now();

    if args.input.is_file() {
        log::info!("Processing single file: {}", args.input.display());
        process_file(&args.input, &args.output, args.report.as_deref(), &config, provider.as_ref())?;
    } else if args.input.is_dir() {
        // Batch mode: one CSV (and optional JSON) per image inside the output directory
        log::info!("Processing directory: {}", args.input.display());
        let files = get_image_files_in_dir(&args.input)?;
        log::info!("Found {} image file(s)", files.len());

        let run_one = |path: &PathBuf| -> anyhow::Result<()> {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("image");
            let csv_path = args.output.join(format!("{}.csv", stem));
            let json_path = args.report.as_ref().map(|dir| dir.join(format!("{}.json", stem)));
            log::info!("Processing: {}", path.display());
            process_file(path, &csv_path, json_path.as_deref(), &config, provider.as_ref())
        };

        let failures: Vec<anyhow::Error> = if config.use_parallel {
            files.par_iter().map(run_one).filter_map(|r| r.err()).collect()
        } else {
            files.iter().map(run_one).filter_map(|r| r.err()).collect()
        };

        for failure in &failures {
            log::error!("{:#}", failure);
        }

        if !failures.is_empty() {
            bail!("{} of {} image(s) failed", failures.len(), files.len());
        }
    } else {
        bail!("Invalid input path: {}", args.input.display());
    }

    let elapsed = start_time.elapsed();
    log::info!("Processing completed in {:.2} seconds", elapsed.as_secs_f64());

    Ok(())
}
