use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EpochRecord {
    /// 1-based epoch number.
    pub epoch: usize,
    pub train_loss: f32,
    pub val_loss: f32,
}

/// Per-epoch losses in training order. Append-only.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrainingHistory {
    records: Vec<EpochRecord>,
}

impl TrainingHistory {
    pub fn push(&mut self, record: EpochRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[EpochRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn train_losses(&self) -> Vec<f32> {
        self.records.iter().map(|r| r.train_loss).collect()
    }

    pub fn val_losses(&self) -> Vec<f32> {
        self.records.iter().map(|r| r.val_loss).collect()
    }
}
