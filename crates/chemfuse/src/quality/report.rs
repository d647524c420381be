//! Per-kind quality summaries.

use serde::Serialize;

use crate::model::{QualityFlag, RecordKind};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KindQuality {
    pub total: usize,
    pub valid: usize,
    pub suspect: usize,
    pub invalid: usize,
    pub valid_rate: f64,
}

impl KindQuality {
    fn add(&mut self, flag: QualityFlag) {
        self.total += 1;
        match flag {
            QualityFlag::Valid => self.valid += 1,
            QualityFlag::Suspect => self.suspect += 1,
            QualityFlag::Invalid => self.invalid += 1,
        }
        self.valid_rate = self.valid as f64 / self.total as f64;
    }
}

/// Flag counts for one batch of records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityReport {
    pub photophysics: KindQuality,
    pub device: KindQuality,
}

impl QualityReport {
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = (RecordKind, QualityFlag)>,
    {
        let mut report = Self::default();
        for (kind, flag) in records {
            match kind {
                RecordKind::Photophysics => report.photophysics.add(flag),
                RecordKind::Device => report.device.add(flag),
            }
        }
        report
    }

    pub fn total(&self) -> usize {
        self.photophysics.total + self.device.total
    }
}
