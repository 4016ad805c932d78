//! Fixed-step simulation clock in whole seconds.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    now: u64,
    step: u64,
    end: u64,
    iteration: u64,
}

impl Timer {
    pub fn new(start_s: u64, step_s: u64, end_s: u64) -> Self {
        Self {
            now: start_s,
            step: step_s,
            end: end_s,
            iteration: 0,
        }
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    /// Ticks completed so far.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn running(&self) -> bool {
        self.now < self.end
    }

    pub fn advance(&mut self) {
        self.now = self.now.saturating_add(self.step);
        self.iteration += 1;
    }
}
