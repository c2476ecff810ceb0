use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use csv::Writer;

use crate::errors::Result;
use crate::pipeline::{Measurements, RegionMeasurement, Report};
use crate::roi::RoiMeasurement;

/// Header for ROI quantification tasks
pub const ROI_HEADER: [&str; 2] = ["ROI Index", "Area"];

/// Header for region analysis tasks
pub const REGION_HEADER: [&str; 4] = ["Label", "Area", "Centroid X", "Centroid Y"];

/// Region header for multi-channel reports, where labels restart per channel
pub const MULTI_CHANNEL_REGION_HEADER: [&str; 5] = ["Channel", "Label", "Area", "Centroid X", "Centroid Y"];

/// Write ROI rows as `ROI Index,Area`
pub fn write_roi_csv<W: Write>(rows: &[RoiMeasurement], writer: W) -> Result<()> {
    let mut writer = Writer::from_writer(writer);
    writer.write_record(ROI_HEADER)?;

    for row in rows {
        writer.write_record(&[row.index.to_string(), row.area.to_string()])?;
    }

    writer.flush()?;
    Ok(())
}

/// Write region rows as `Label,Area,Centroid X,Centroid Y`.
///
/// Centroid X is the column and Centroid Y the row. With `with_channel` set
/// every row is prefixed by its source channel.
pub fn write_region_csv<W: Write>(rows: &[RegionMeasurement], with_channel: bool, writer: W) -> Result<()> {
    let mut writer = Writer::from_writer(writer);
    if with_channel {
        writer.write_record(MULTI_CHANNEL_REGION_HEADER)?;
    } else {
        writer.write_record(REGION_HEADER)?;
    }

    for row in rows {
        let region = &row.region;
        let mut record = Vec::with_capacity(5);
        if with_channel {
            record.push(row.channel.to_string());
        }
        record.extend([
            region.label.to_string(),
            region.area.to_string(),
            format!("{:.6}", region.centroid_col),
            format!("{:.6}", region.centroid_row),
        ]);
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

/// Write the report's measurements with the schema matching its task
pub fn write_measurements<W: Write>(report: &Report, writer: W) -> Result<()> {
    match &report.measurements {
        Measurements::Roi(rows) => write_roi_csv(rows, writer),
        Measurements::Regions(rows) => write_region_csv(rows, report.channel_count > 1, writer),
    }
}

/// Write the report's measurements to a CSV file, creating parent directories
pub fn write_report_csv<P: AsRef<Path>>(report: &Report, path: P) -> Result<()> {
    let path = path.as_ref();
    create_parent_dir(path)?;
    write_measurements(report, File::create(path)?)?;
    log::info!("Measurements saved to '{}'", path.display());
    Ok(())
}

/// Serialize the full report (counters, measurements, counts) as JSON
pub fn write_report_json<P: AsRef<Path>>(report: &Report, path: P) -> Result<()> {
    let path = path.as_ref();
    create_parent_dir(path)?;
    serde_json::to_writer_pretty(File::create(path)?, report)?;
    log::info!("Report saved to '{}'", path.display());
    Ok(())
}

fn create_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intensity::OversaturationCounts;
    use crate::regions::RegionProperties;

    fn report(measurements: Measurements) -> Report {
        Report {
            oversaturation: OversaturationCounts::default(),
            measurements,
            cell_count: 0,
            brdu_positive: 0,
            skipped_channels: Vec::new(),
            channel_count: 1,
        }
    }

    #[test]
    fn roi_schema() {
        let rows = vec![
            RoiMeasurement { index: 1, roi: 1, channel: 0, area: 9 },
            RoiMeasurement { index: 2, roi: 1, channel: 1, area: 0 },
        ];
        let mut buffer = Vec::new();
        write_measurements(&report(Measurements::Roi(rows)), &mut buffer).unwrap();
        assert_eq!(String::from_utf8(buffer).unwrap(), "ROI Index,Area\n1,9\n2,0\n");
    }

    #[test]
    fn region_schema_puts_column_first() {
        let rows = vec![RegionMeasurement {
            channel: 0,
            region: RegionProperties { label: 1, area: 4, centroid_row: 4.5, centroid_col: 1.5 },
        }];
        let mut buffer = Vec::new();
        write_measurements(&report(Measurements::Regions(rows)), &mut buffer).unwrap();
        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            "Label,Area,Centroid X,Centroid Y\n1,4,1.500000,4.500000\n"
        );
    }

    #[test]
    fn multi_channel_regions_carry_channel_column() {
        let rows = vec![
            RegionMeasurement {
                channel: 0,
                region: RegionProperties { label: 1, area: 4, centroid_row: 1.0, centroid_col: 2.0 },
            },
            RegionMeasurement {
                channel: 1,
                region: RegionProperties { label: 1, area: 2, centroid_row: 3.5, centroid_col: 0.0 },
            },
        ];
        let mut multi = report(Measurements::Regions(rows));
        multi.channel_count = 2;

        let mut buffer = Vec::new();
        write_measurements(&multi, &mut buffer).unwrap();
        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            "Channel,Label,Area,Centroid X,Centroid Y\n0,1,4,2.000000,1.000000\n1,1,2,0.000000,3.500000\n"
        );
    }

    #[test]
    fn empty_report_still_has_header() {
        let mut buffer = Vec::new();
        write_measurements(&report(Measurements::Regions(Vec::new())), &mut buffer).unwrap();
        assert_eq!(String::from_utf8(buffer).unwrap(), "Label,Area,Centroid X,Centroid Y\n");
    }

    #[test]
    fn report_serializes_to_json() {
        let value = serde_json::to_value(report(Measurements::Roi(Vec::new()))).unwrap();
        assert_eq!(value["measurements"]["task"], "roi");
        assert_eq!(value["oversaturation"]["despeckle"], 0);
    }
}
