//! Training metrics tracking.

use serde::{Deserialize, Serialize};

/// Loss history of a training run, in normalised range units.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub epochs_completed: usize,
    pub loss_history: Vec<f64>,
    pub val_loss_history: Vec<f64>,
    /// 1-based epoch with the lowest validation loss.
    pub best_epoch: Option<usize>,
    pub best_loss: Option<f64>,
    pub total_training_time_secs: f64,
}

impl TrainingMetrics {
    pub fn record_epoch(&mut self, loss: f64, val_loss: Option<f64>) {
        self.loss_history.push(loss);
        if let Some(vl) = val_loss {
            self.val_loss_history.push(vl);
        }
        self.epochs_completed += 1;

        let check_loss = val_loss.unwrap_or(loss);
        if self.best_loss.is_none_or(|best| check_loss < best) {
            self.best_loss = Some(check_loss);
            self.best_epoch = Some(self.epochs_completed);
        }
    }

    /// Loss the stopping criteria look at: validation when available.
    pub fn monitored_loss(&self) -> Option<f64> {
        self.val_loss_history
            .last()
            .or(self.loss_history.last())
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_metrics() {
        let mut metrics = TrainingMetrics::default();
        metrics.record_epoch(0.5, Some(0.6));
        metrics.record_epoch(0.3, Some(0.4));
        metrics.record_epoch(0.2, Some(0.45));
        assert_eq!(metrics.epochs_completed, 3);
        assert_eq!(metrics.best_epoch, Some(2));
        assert_eq!(metrics.best_loss, Some(0.4));
        assert_eq!(metrics.monitored_loss(), Some(0.45));
    }

    #[test]
    fn test_nan_never_becomes_best() {
        let mut metrics = TrainingMetrics::default();
        metrics.record_epoch(0.5, Some(0.5));
        metrics.record_epoch(f64::NAN, Some(f64::NAN));
        assert_eq!(metrics.best_epoch, Some(1));
    }
}
