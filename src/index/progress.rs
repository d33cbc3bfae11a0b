/// Progress of a multi-step index operation, reported in `step_percent` increments
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressIndicator {
    max: usize,
    value: usize,
    step_percent: usize,
    last_reported: usize,   // Percent at last change
    finished: bool,
}

impl ProgressIndicator {
    pub fn new(max: usize, step_percent: usize) -> Self {
        ProgressIndicator {
            max,
            value: 0,
            step_percent: step_percent.max(1),
            last_reported: 0,
            finished: false,
        }
    }

    pub fn set_value(&mut self, value: usize) {
        self.value = value.min(self.max);
    }

    pub fn value(&self) -> usize {
        self.value
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn percent(&self) -> usize {
        if self.max == 0 {
            100
        } else {
            self.value * 100 / self.max
        }
    }

    /// True once per `step_percent` of progress
    pub fn changed(&mut self) -> bool {
        let percent = self.percent();
        if percent >= self.last_reported + self.step_percent {
            self.last_reported = percent - percent % self.step_percent;
            true
        } else {
            false
        }
    }

    pub fn finish(&mut self) {
        self.value = self.max;
        self.finished = true;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Receives progress while an index operation runs
pub trait ProgressObserver {
    fn progress(&self, indicator: &ProgressIndicator);
}

impl<F: Fn(&ProgressIndicator)> ProgressObserver for F {
    fn progress(&self, indicator: &ProgressIndicator) {
        self(indicator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn changes_once_per_step() {
        let mut progress = ProgressIndicator::new(200, 5);
        let mut changes = 0;
        for i in 1..=200 {
            progress.set_value(i);
            if progress.changed() {
                changes += 1;
            }
        }
        assert_eq!(changes, 20);
    }

    #[test]
    fn small_totals_report_every_step() {
        let mut progress = ProgressIndicator::new(3, 5);
        progress.set_value(1);
        assert!(progress.changed());
        assert!(!progress.changed());
        progress.finish();
        assert!(progress.is_finished());
        assert_eq!(progress.percent(), 100);
    }
}
