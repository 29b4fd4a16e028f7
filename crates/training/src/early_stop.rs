//! Validation-loss early stopping.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochVerdict {
    /// New best validation loss; checkpoint the weights.
    Improved,
    /// No improvement for `wait` consecutive epochs, still under patience.
    Stalled { wait: usize },
    /// Patience exhausted.
    Stop,
}

#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    min_delta: f32,
    best: f32,
    wait: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize, min_delta: f32) -> Self {
        Self {
            patience,
            min_delta: min_delta.abs(),
            best: f32::INFINITY,
            wait: 0,
        }
    }

    /// Record one epoch's validation loss. NaN never counts as an improvement.
    pub fn update(&mut self, val_loss: f32) -> EpochVerdict {
        if val_loss < self.best - self.min_delta {
            self.best = val_loss;
            self.wait = 0;
            return EpochVerdict::Improved;
        }
        self.wait += 1;
        if self.wait >= self.patience {
            EpochVerdict::Stop
        } else {
            EpochVerdict::Stalled { wait: self.wait }
        }
    }

    pub fn best(&self) -> Option<f32> {
        self.best.is_finite().then_some(self.best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_after_patience_epochs_without_improvement() {
        let mut stop = EarlyStopping::new(5, 0.0);
        assert_eq!(stop.update(10.0), EpochVerdict::Improved);
        assert_eq!(stop.update(8.0), EpochVerdict::Improved);
        for wait in 1..5 {
            assert_eq!(stop.update(9.0), EpochVerdict::Stalled { wait });
        }
        assert_eq!(stop.update(8.0), EpochVerdict::Stop);
        assert_eq!(stop.best(), Some(8.0));
    }

    #[test]
    fn improvement_resets_the_counter() {
        let mut stop = EarlyStopping::new(2, 0.0);
        stop.update(5.0);
        assert_eq!(stop.update(6.0), EpochVerdict::Stalled { wait: 1 });
        assert_eq!(stop.update(4.0), EpochVerdict::Improved);
        assert_eq!(stop.update(4.5), EpochVerdict::Stalled { wait: 1 });
        assert_eq!(stop.update(4.5), EpochVerdict::Stop);
    }

    #[test]
    fn min_delta_and_nan_do_not_improve() {
        let mut stop = EarlyStopping::new(3, 0.5);
        stop.update(5.0);
        assert_eq!(stop.update(4.8), EpochVerdict::Stalled { wait: 1 });
        assert_eq!(stop.update(f32::NAN), EpochVerdict::Stalled { wait: 2 });
        assert_eq!(stop.best(), Some(5.0));
    }
}
