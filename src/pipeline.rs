// src/pipeline.rs - Per-channel stage sequencing and report aggregation

use image::GrayImage;
use imageproc::filter::gaussian_blur_f32;
use rayon::prelude::*;
use serde::Serialize;

use crate::channels::{decompose, Channel};
use crate::config::{BackgroundModel, DespeckleShape, IntensityScaling, PipelineConfig, StageOrder, Task};
use crate::despeckle::{despeckle, effective_despeckle_size};
use crate::errors::{FluoroQuantError, Result};
use crate::image_io::RawImage;
use crate::intensity::{count_oversaturated, normalize, OversaturationCounts};
use crate::morphology::subtract_background;
use crate::regions::{count_regions, label_regions, RegionProperties};
use crate::roi::{measure_rois, Rectangle, RoiMeasurement, RoiProvider};
use crate::threshold::{apply_threshold, threshold, ThresholdMode};

/// One optional transform applied after normalization
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Stage {
    Smooth { sigma: f32 },
    Threshold(ThresholdMode),
    SubtractBackground { radius: i32, model: BackgroundModel },
    Despeckle { size: u32, shape: DespeckleShape },
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Smooth { .. } => "smooth",
            Stage::Threshold(ThresholdMode::Otsu) => "otsu",
            Stage::Threshold(ThresholdMode::Manual(_)) => "manual-threshold",
            Stage::SubtractBackground { .. } => "background",
            Stage::Despeckle { .. } => "despeckle",
        }
    }

    pub fn is_threshold(&self) -> bool {
        matches!(self, Stage::Threshold(_))
    }

    /// Apply the stage, returning the output and the threshold level if one was used
    pub fn apply(&self, image: &GrayImage) -> Result<(GrayImage, Option<u8>)> {
        match *self {
            Stage::Smooth { sigma } => Ok((gaussian_blur_f32(image, sigma), None)),
            Stage::Threshold(mode) => {
                let (level, mask) = threshold(image, mode);
                Ok((mask, Some(level)))
            }
            Stage::SubtractBackground { radius, model } => {
                Ok((subtract_background(image, radius, model)?, None))
            }
            Stage::Despeckle { size, shape } => Ok((despeckle(image, size, shape), None)),
        }
    }

    /// Add this stage's saturated-pixel count to the matching counter.
    /// Smoothing has no counter of its own.
    fn record(&self, counts: &mut OversaturationCounts, output: &GrayImage) {
        let saturated = count_oversaturated(output);
        match self {
            Stage::Smooth { .. } => {}
            Stage::Threshold(_) => counts.threshold += saturated,
            Stage::SubtractBackground { .. } => counts.background += saturated,
            Stage::Despeckle { .. } => counts.despeckle += saturated,
        }
    }
}

/// Build the ordered stage list for a run.
///
/// The threshold stage is present when Otsu is requested, a manual level is
/// given (manual wins) or the task counts regions, which always thresholds.
/// Optional smoothing runs right before the threshold. Despeckling always
/// closes the sequence.
pub fn build_stages(config: &PipelineConfig) -> Vec<Stage> {
    let wants_otsu = config.apply_otsu || config.task == Task::Regions;
    let threshold = match (config.manual_level(), wants_otsu) {
        (Some(level), _) => Some(Stage::Threshold(ThresholdMode::Manual(level))),
        (None, true) => Some(Stage::Threshold(ThresholdMode::Otsu)),
        (None, false) => None,
    };
    let smooth = config.smooth_sigma.map(|sigma| Stage::Smooth { sigma });
    let thresholding: Vec<Stage> = smooth.into_iter().chain(threshold).collect();

    let background: Vec<Stage> = config
        .apply_bg_subtraction
        .then_some(Stage::SubtractBackground {
            radius: config.rolling_radius,
            model: config.background_model(),
        })
        .into_iter()
        .collect();

    let (first, second) = match config.stage_order {
        StageOrder::ThresholdFirst => (thresholding, background),
        StageOrder::BackgroundFirst => (background, thresholding),
    };

    let despeckle = Stage::Despeckle {
        size: effective_despeckle_size(config.despeckle_radius.max(0) as u32),
        shape: config.despeckle_shape,
    };

    first.into_iter().chain(second).chain(std::iter::once(despeckle)).collect()
}

/// Everything a channel pass needs, fixed once per run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelinePlan {
    pub stages: Vec<Stage>,
    pub scaling: IntensityScaling,
    pub task: Task,
    pub brdu_level: u8,
}

impl PipelinePlan {
    /// Validate the configuration and fix the stage list.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            stages: build_stages(config),
            scaling: config.intensity_scaling,
            task: config.task,
            brdu_level: config.brdu_level(),
        })
    }

    fn has_threshold(&self) -> bool {
        self.stages.iter().any(Stage::is_threshold)
    }
}

/// Measurements from a single channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ChannelMeasurements {
    Roi(Vec<RoiMeasurement>),
    Regions(Vec<RegionProperties>),
}

/// Immutable result of processing one channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelOutcome {
    pub channel: usize,
    pub counts: OversaturationCounts,
    pub measurements: ChannelMeasurements,
    /// Level chosen by the threshold stage, if it ran
    pub threshold_level: Option<u8>,
    /// Regions in the BrdU mask (region task only)
    pub brdu_positive: usize,
    /// Set when the channel was skipped after a processing error
    pub skipped: bool,
}

impl ChannelOutcome {
    /// Zero/empty outcome for a channel that could not be processed
    fn skipped(channel: usize, task: Task, rois: &[Rectangle]) -> Self {
        let measurements = match task {
            Task::Roi => ChannelMeasurements::Roi(
                rois.iter()
                    .enumerate()
                    .map(|(i, _)| RoiMeasurement { index: i + 1, roi: i + 1, channel, area: 0 })
                    .collect(),
            ),
            Task::Regions => ChannelMeasurements::Regions(Vec::new()),
        };

        Self {
            channel,
            counts: OversaturationCounts::default(),
            measurements,
            threshold_level: None,
            brdu_positive: 0,
            skipped: true,
        }
    }
}

/// Run the plan over one channel. Pure: reads only its arguments.
pub fn process_channel(
    index: usize,
    channel: &Channel,
    bit_depth: u8,
    plan: &PipelinePlan,
    rois: &[Rectangle],
) -> Result<ChannelOutcome> {
    let (width, height) = channel.dimensions();
    if width == 0 || height == 0 {
        return Err(FluoroQuantError::Processing(format!(
            "channel {} has zero area ({}x{})",
            index, width, height
        )));
    }

    // Step 1: 8-bit normalization
    let normalized = normalize(channel, bit_depth, plan.scaling);
    let mut counts = OversaturationCounts {
        raw: count_oversaturated(&normalized),
        ..OversaturationCounts::default()
    };

    // Step 2: optional threshold / background stages, then despeckle
    let mut current = normalized.clone();
    let mut threshold_level = None;
    for stage in &plan.stages {
        let (output, level) = stage.apply(&current)?;
        stage.record(&mut counts, &output);
        threshold_level = threshold_level.or(level);
        log::debug!(
            "channel {}: {} -> {} saturated pixel(s)",
            index,
            stage.name(),
            count_oversaturated(&output)
        );
        current = output;
    }

    if let Some(level) = threshold_level {
        log::debug!("channel {}: threshold level {}", index, level);
    }

    // Step 3: measurement
    let (measurements, brdu_positive) = match plan.task {
        Task::Roi => (ChannelMeasurements::Roi(measure_rois(&current, rois, index)), 0),
        Task::Regions => {
            let regions = label_regions(&current);
            let brdu = brdu_positive(&normalized, &current, plan)?;
            (ChannelMeasurements::Regions(regions), brdu)
        }
    };

    Ok(ChannelOutcome {
        channel: index,
        counts,
        measurements,
        threshold_level,
        brdu_positive,
        skipped: false,
    })
}

/// Count BrdU-positive regions on the background-suppressed, despeckled
/// intensity image. The primary mask is never modified.
fn brdu_positive(normalized: &GrayImage, processed: &GrayImage, plan: &PipelinePlan) -> Result<usize> {
    let intensity = if plan.has_threshold() {
        let mut current = normalized.clone();
        for stage in plan.stages.iter().filter(|s| !s.is_threshold()) {
            current = stage.apply(&current)?.0;
        }
        current
    } else {
        processed.clone()
    };

    Ok(count_regions(&apply_threshold(&intensity, plan.brdu_level)))
}

/// One region with the channel it came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionMeasurement {
    pub channel: usize,
    #[serde(flatten)]
    pub region: RegionProperties,
}

/// Report-wide measurement list
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "task", content = "rows", rename_all = "snake_case")]
pub enum Measurements {
    Roi(Vec<RoiMeasurement>),
    Regions(Vec<RegionMeasurement>),
}

impl Measurements {
    pub fn len(&self) -> usize {
        match self {
            Measurements::Roi(rows) => rows.len(),
            Measurements::Regions(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Aggregate result of a run, handed to the exporter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub oversaturation: OversaturationCounts,
    pub measurements: Measurements,
    /// Total regions across channels (region task)
    pub cell_count: usize,
    /// Total BrdU-positive regions across channels (region task)
    pub brdu_positive: usize,
    /// Channels skipped after processing errors
    pub skipped_channels: Vec<usize>,
    /// Number of channels the report covers
    pub channel_count: usize,
}

impl Report {
    /// Reduce per-channel outcomes, in channel order, into one report.
    pub fn from_outcomes(task: Task, outcomes: Vec<ChannelOutcome>) -> Self {
        let oversaturation = outcomes.iter().map(|o| o.counts).sum();
        let brdu_positive = outcomes.iter().map(|o| o.brdu_positive).sum();
        let skipped_channels = outcomes.iter().filter(|o| o.skipped).map(|o| o.channel).collect();
        let channel_count = outcomes.len();

        let mut roi_rows = Vec::new();
        let mut region_rows = Vec::new();
        for outcome in outcomes {
            match outcome.measurements {
                ChannelMeasurements::Roi(rows) => roi_rows.extend(rows),
                ChannelMeasurements::Regions(regions) => region_rows.extend(
                    regions
                        .into_iter()
                        .map(|region| RegionMeasurement { channel: outcome.channel, region }),
                ),
            }
        }

        let cell_count = region_rows.len();
        let measurements = match task {
            Task::Roi => {
                for (i, row) in roi_rows.iter_mut().enumerate() {
                    row.index = i + 1;
                }
                Measurements::Roi(roi_rows)
            }
            Task::Regions => Measurements::Regions(region_rows),
        };

        Self {
            oversaturation,
            measurements,
            cell_count,
            brdu_positive,
            skipped_channels,
            channel_count,
        }
    }
}

/// Run the whole pipeline over an image with already-selected rectangles.
///
/// Configuration is validated before any pixel is touched. Processing
/// errors are confined to their channel; any other error aborts the run.
pub fn run_pipeline(image: &RawImage, config: &PipelineConfig, rois: &[Rectangle]) -> Result<Report> {
    let plan = PipelinePlan::from_config(config)?;
    let channels = match decompose(image) {
        Ok(channels) => channels,
        Err(e) if !e.is_fatal() => {
            log::warn!("Nothing to measure: {}", e);
            return Ok(Report::from_outcomes(plan.task, Vec::new()));
        }
        Err(e) => return Err(e),
    };

    log::info!(
        "Processing {} channel(s) of {}x{} with stages [{}]",
        channels.len(),
        image.width,
        image.height,
        plan.stages.iter().map(Stage::name).collect::<Vec<_>>().join(" -> ")
    );

    let run = |(index, channel): (usize, &Channel)| {
        process_channel(index, channel, image.bit_depth, &plan, rois)
    };

    let results: Vec<Result<ChannelOutcome>> = if config.use_parallel {
        channels.par_iter().enumerate().map(run).collect()
    } else {
        channels.iter().enumerate().map(run).collect()
    };

    let mut outcomes = Vec::with_capacity(results.len());
    for (index, result) in results.into_iter().enumerate() {
        match result {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) if !e.is_fatal() => {
                log::warn!("Skipping channel {}: {}", index, e);
                outcomes.push(ChannelOutcome::skipped(index, plan.task, rois));
            }
            Err(e) => return Err(e),
        }
    }

    let report = Report::from_outcomes(plan.task, outcomes);
    log_summary(&report, plan.task);

    Ok(report)
}

/// Select rectangles with a provider, then run the pipeline.
pub fn run_with_provider(
    image: &RawImage,
    config: &PipelineConfig,
    provider: &dyn RoiProvider,
) -> Result<Report> {
    config.validate()?;
    let rois = match config.task {
        Task::Roi => provider.select(image)?,
        Task::Regions => Vec::new(),
    };
    run_pipeline(image, config, &rois)
}

fn log_summary(report: &Report, task: Task) {
    let counts = &report.oversaturation;
    log::info!(
        "Total oversaturated pixels: raw {}, after threshold {}, after background {}, after despeckle {}",
        counts.raw, counts.threshold, counts.background, counts.despeckle
    );

    match task {
        Task::Roi => log::info!("ROI measurements: {}", report.measurements.len()),
        Task::Regions => {
            log::info!("Total cells counted: {}", report.cell_count);
            log::info!("BrdU-positive cells counted: {}", report.brdu_positive);
        }
    }

    if !report.skipped_channels.is_empty() {
        log::warn!("Skipped channel(s): {:?}", report.skipped_channels);
    }
}
