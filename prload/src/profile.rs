use prload_core::Stage;
use std::fmt;
use std::time::Duration;

/// Where a run is within its stage profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    RampingUp,
    Steady,
    RampingDown,
    Drained,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::RampingUp => "ramping up",
            Phase::Steady => "steady",
            Phase::RampingDown => "ramping down",
            Phase::Drained => "drained",
        };
        f.write_str(name)
    }
}

/// Staged concurrency profile.
///
/// Each stage moves linearly from the previous stage's target (0 for the first stage) to its
/// own target over its duration. Zero-length stages jump straight to their target.
#[derive(Debug, Clone)]
pub struct Profile {
    stages: Vec<Stage>,
}

struct Position<'a> {
    from: usize,
    stage: &'a Stage,
    offset: Duration,
}

impl Profile {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    fn locate(&self, elapsed: Duration) -> Option<Position<'_>> {
        let mut start = Duration::ZERO;
        let mut from = 0;
        for stage in &self.stages {
            let end = start + stage.duration;
            if elapsed < end {
                return Some(Position {
                    from,
                    stage,
                    offset: elapsed - start,
                });
            }
            start = end;
            from = stage.target;
        }
        None
    }

    /// Interpolated target concurrency. 0 once the profile has elapsed.
    pub fn target_at(&self, elapsed: Duration) -> f64 {
        match self.locate(elapsed) {
            Some(Position {
                from,
                stage,
                offset,
            }) => {
                let progress = offset.as_secs_f64() / stage.duration.as_secs_f64();
                from as f64 + (stage.target as f64 - from as f64) * progress
            }
            None => 0.,
        }
    }

    /// Number of virtual users that should be active at `elapsed`.
    pub fn concurrency_at(&self, elapsed: Duration) -> usize {
        self.target_at(elapsed).round().max(0.) as usize
    }

    pub fn phase_at(&self, elapsed: Duration) -> Phase {
        match self.locate(elapsed) {
            Some(Position { from, stage, .. }) if stage.target > from => Phase::RampingUp,
            Some(Position { from, stage, .. }) if stage.target < from => Phase::RampingDown,
            Some(_) => Phase::Steady,
            None => Phase::Drained,
        }
    }
}
