// src/config.rs - Run parameters for the fluorescence quantification pipeline

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::errors::{FluoroQuantError, Result};

/// Largest accepted background or despeckle radius
pub const MAX_RADIUS: i32 = 1024;

/// Configuration for one pipeline run
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Binarize each channel with an automatic Otsu threshold
    #[serde(default)]
    pub apply_otsu: bool,

    #[serde(default = "default_apply_bg_subtraction")]
    pub apply_bg_subtraction: bool,

    /// Requested median window size; normalized to an odd value >= 3
    #[serde(default = "default_despeckle_radius")]
    pub despeckle_radius: i32,

    /// Radius of the disk used to estimate background
    #[serde(default = "default_rolling_radius")]
    pub rolling_radius: i32,

    /// Fixed threshold; overrides Otsu when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_threshold: Option<i32>,

    #[serde(default = "default_brdu_threshold")]
    pub brdu_threshold: i32,

    #[serde(default)]
    pub stage_order: StageOrder,

    #[serde(default)]
    pub task: Task,

    /// Background estimator; unset means the task's default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_model: Option<BackgroundModel>,

    /// Gaussian sigma for smoothing right before thresholding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smooth_sigma: Option<f32>,

    #[serde(default)]
    pub despeckle_shape: DespeckleShape,

    #[serde(default)]
    pub intensity_scaling: IntensityScaling,

    #[serde(default = "default_parallel")]
    pub use_parallel: bool,
}

/// Relative order of the two optional stages
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageOrder {
    /// threshold -> background subtraction -> despeckle
    #[default]
    ThresholdFirst,
    /// background subtraction -> threshold -> despeckle
    BackgroundFirst,
}

/// Which measurement closes the pipeline
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    /// Positive-pixel counts inside rectangles
    #[default]
    Roi,
    /// Connected-component labeling (cell counting). Always thresholds.
    Regions,
}

impl Task {
    pub fn default_background_model(self) -> BackgroundModel {
        match self {
            Task::Roi => BackgroundModel::Closing,
            Task::Regions => BackgroundModel::Median,
        }
    }
}

/// How the background estimate is computed before subtraction
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundModel {
    /// Grayscale closing (dilation then erosion)
    Closing,
    /// Grayscale opening (erosion then dilation), i.e. a white top-hat
    Opening,
    /// Square median of side `2 * radius + 1`
    Median,
}

/// Shape of the median window.
///
/// `Disk` is the default even though a square window is the classic choice:
/// a 3x3 square median erodes the corners of a 3x3 block, while the
/// diameter-3 disk (a cross) keeps it whole.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DespeckleShape {
    #[default]
    Disk,
    Square,
}

/// Conversion applied when mapping a channel to 8 bits
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum IntensityScaling {
    /// Absolute value, rounded and saturated to [0, 255]
    #[default]
    Absolute,
    /// Rescale the native bit depth to [0, 255] before saturating
    BitDepth,
}

fn default_apply_bg_subtraction() -> bool {
    true
}

fn default_despeckle_radius() -> i32 {
    20
}

fn default_rolling_radius() -> i32 {
    20
}

fn default_brdu_threshold() -> i32 {
    100
}

fn default_parallel() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            apply_otsu: false,
            apply_bg_subtraction: default_apply_bg_subtraction(),
            despeckle_radius: default_despeckle_radius(),
            rolling_radius: default_rolling_radius(),
            manual_threshold: None,
            brdu_threshold: default_brdu_threshold(),
            stage_order: StageOrder::default(),
            task: Task::default(),
            background_model: None,
            smooth_sigma: None,
            despeckle_shape: DespeckleShape::default(),
            intensity_scaling: IntensityScaling::default(),
            use_parallel: default_parallel(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            FluoroQuantError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;

        toml::from_str(&content).map_err(|source| FluoroQuantError::ConfigLoad {
            source,
            path: path.to_path_buf(),
        })
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            FluoroQuantError::Config(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, content)?;

        Ok(())
    }

    /// Validate configuration. Runs before any image is touched.
    pub fn validate(&self) -> Result<()> {
        if self.rolling_radius <= 0 {
            return Err(FluoroQuantError::Config(
                "rolling_radius must be > 0".to_string(),
            ));
        }

        if self.despeckle_radius <= 0 {
            return Err(FluoroQuantError::Config(
                "despeckle_radius must be > 0".to_string(),
            ));
        }

        for (name, radius) in [("rolling_radius", self.rolling_radius), ("despeckle_radius", self.despeckle_radius)] {
            if radius > MAX_RADIUS {
                return Err(FluoroQuantError::Config(format!(
                    "{} must be <= {}, got {}",
                    name, MAX_RADIUS, radius
                )));
            }
        }

        if let Some(sigma) = self.smooth_sigma {
            if !(sigma.is_finite() && sigma > 0.0) {
                return Err(FluoroQuantError::Config(format!(
                    "smooth_sigma must be a positive number, got {}",
                    sigma
                )));
            }
        }

        if let Some(threshold) = self.manual_threshold {
            if !(0..=255).contains(&threshold) {
                return Err(FluoroQuantError::Config(format!(
                    "manual_threshold must be within [0, 255], got {}",
                    threshold
                )));
            }
        }

        if !(0..=255).contains(&self.brdu_threshold) {
            return Err(FluoroQuantError::Config(format!(
                "brdu_threshold must be within [0, 255], got {}",
                self.brdu_threshold
            )));
        }

        Ok(())
    }

    /// Manual threshold as a pixel level. Only meaningful after `validate`.
    pub fn manual_level(&self) -> Option<u8> {
        self.manual_threshold.map(|t| t.clamp(0, 255) as u8)
    }

    /// Background estimator in effect for this run
    pub fn background_model(&self) -> BackgroundModel {
        self.background_model.unwrap_or_else(|| self.task.default_background_model())
    }

    pub fn brdu_level(&self) -> u8 {
        self.brdu_threshold.clamp(0, 255) as u8
    }
}
