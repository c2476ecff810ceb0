// src/lib.rs - Library interface for FluoroQuant

pub mod channels;
pub mod config;
pub mod despeckle;
pub mod errors;
pub mod image_io;
pub mod image_utils;
pub mod intensity;
pub mod morphology;
pub mod output;
pub mod pipeline;
pub mod regions;
pub mod roi;
pub mod threshold;

// Re-export commonly used types and functions
pub use errors::{FluoroQuantError, Result};
pub use config::{BackgroundModel, DespeckleShape, IntensityScaling, PipelineConfig, StageOrder, Task};
pub use image_io::{RawImage, SampleLayout, load_image};
pub use pipeline::{run_pipeline, run_with_provider, Measurements, Report, Stage};

// Re-export the per-stage operations
pub use channels::{decompose, Channel};
pub use intensity::{count_oversaturated, normalize, OversaturationCounts};
pub use morphology::subtract_background;
pub use threshold::{apply_threshold, otsu_level, ThresholdMode};
pub use despeckle::{despeckle, effective_despeckle_size};
pub use regions::{count_regions, label_regions, RegionProperties};
pub use roi::{measure_rois, CsvRois, Rectangle, RoiMeasurement, RoiProvider, StaticRois, WholeImage};
