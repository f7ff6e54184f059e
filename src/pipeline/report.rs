use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};

use crate::gait::PhaseLabel;

pub const CSV_HEADER: [&str; 8] = [
    "Time [s]",
    "Phase",
    "Hip Angle (R)",
    "Knee Angle (R)",
    "Ankle Angle (R)",
    "Hip Angle (L)",
    "Knee Angle (L)",
    "Ankle Angle (L)",
];

pub const CSV_MEDIA_TYPE: &str = "text/csv";

/// One row of the per-frame angle table.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRecord {
    pub timestamp: f64,
    pub phase: PhaseLabel,
    /// Hip, knee, ankle.
    pub right: [i32; 3],
    pub left: [i32; 3],
}

impl FrameRecord {
    fn fields(&self) -> Vec<String> {
        let mut fields = Vec::with_capacity(CSV_HEADER.len());
        fields.push(self.timestamp.to_string());
        fields.push(escape(self.phase.as_str()));
        fields.extend(self.right.iter().chain(self.left.iter()).map(i32::to_string));
        fields
    }
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Streams the angle table to disk, header first.
pub struct CsvReportWriter {
    writer: BufWriter<File>,
    rows: usize,
}

impl CsvReportWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("failed to create csv {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", CSV_HEADER.join(",")).context("failed to write csv header")?;
        Ok(Self { writer, rows: 0 })
    }

    pub fn write_row(&mut self, record: &FrameRecord) -> Result<()> {
        writeln!(self.writer, "{}", record.fields().join(","))
            .with_context(|| format!("failed to write csv row {}", self.rows))?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn finish(mut self) -> Result<usize> {
        self.writer.flush().context("failed to flush csv")?;
        Ok(self.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gait::GaitPhase;

    #[test]
    fn writes_header_then_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis.csv");

        let mut report = CsvReportWriter::create(&path).unwrap();
        report
            .write_row(&FrameRecord {
                timestamp: 0.0,
                phase: PhaseLabel::NoPerson,
                right: [0; 3],
                left: [0; 3],
            })
            .unwrap();
        report
            .write_row(&FrameRecord {
                timestamp: 0.5,
                phase: PhaseLabel::Phase(GaitPhase::MidStance),
                right: [170, 5, 95],
                left: [160, 20, 100],
            })
            .unwrap();
        assert_eq!(report.finish().unwrap(), 2);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(
            lines[0],
            "Time [s],Phase,Hip Angle (R),Knee Angle (R),Ankle Angle (R),Hip Angle (L),Knee Angle (L),Ankle Angle (L)"
        );
        assert_eq!(lines[1], "0,NO PERSON,0,0,0,0,0,0");
        assert_eq!(lines[2], "0.5,MID-STANCE,170,5,95,160,20,100");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn unmapped_labels_are_quoted_when_needed() {
        let record = FrameRecord {
            timestamp: 1.0,
            phase: PhaseLabel::Unmapped("SWING, LATE \"B\"".into()),
            right: [0; 3],
            left: [0; 3],
        };
        assert_eq!(record.fields()[1], "\"SWING, LATE \"\"B\"\"\"");
    }
}
