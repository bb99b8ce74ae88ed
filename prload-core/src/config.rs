use crate::{
    ConfigError, DEFAULT_LATENCY_CEILING, DEFAULT_MAX_ERROR_RATE, DEFAULT_MEMBERS_PER_TEAM,
    DEFAULT_P95_THRESHOLD, DEFAULT_STAGES, DEFAULT_TEAM_COUNT,
};
use std::fmt;
use std::num::{NonZeroU32, NonZeroU64};
use std::str::FromStr;
use std::time::Duration;

/// A time window with a target number of concurrent virtual users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: usize,
}

impl Stage {
    pub fn new(duration: Duration, target: usize) -> Self {
        Self { duration, target }
    }

    /// Parses a comma separated list such as `30s:5,5m:5,30s:0`.
    pub fn parse_list(s: &str) -> Result<Vec<Stage>, ConfigError> {
        s.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Stage::from_str)
            .collect()
    }
}

impl FromStr for Stage {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (duration, target) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| ConfigError::InvalidStage(s.to_string()))?;

        let duration = humantime::parse_duration(duration.trim())?;
        let target = target
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidStage(s.to_string()))?;

        Ok(Stage { duration, target })
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            humantime::format_duration(self.duration),
            self.target
        )
    }
}

/// Size of the fixture created during setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Population {
    pub teams: usize,
    pub members_per_team: usize,
}

impl Default for Population {
    fn default() -> Self {
        Self {
            teams: DEFAULT_TEAM_COUNT,
            members_per_team: DEFAULT_MEMBERS_PER_TEAM,
        }
    }
}

/// Pass/fail limits evaluated once the run has finished.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Overall p95 response time must be strictly below this.
    pub p95_latency: Duration,
    /// Overall error rate must be strictly below this.
    pub max_error_rate: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            p95_latency: DEFAULT_P95_THRESHOLD,
            max_error_rate: DEFAULT_MAX_ERROR_RATE,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RunConfig {
    pub stages: Vec<Stage>,
    pub population: Population,
    pub thresholds: Thresholds,
    pub latency_ceiling: Duration,
    /// Stop starting iterations once this many have been started.
    pub max_iterations: Option<NonZeroU64>,
    /// Cap on iterations started per second across all virtual users.
    pub max_rps: Option<NonZeroU32>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            stages: default_stages(),
            population: Population::default(),
            thresholds: Thresholds::default(),
            latency_ceiling: DEFAULT_LATENCY_CEILING,
            max_iterations: None,
            max_rps: None,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stages.is_empty() {
            return Err(ConfigError::NoStages);
        }

        if self.stages.iter().all(|s| s.duration.is_zero()) {
            return Err(ConfigError::EmptyProfile);
        }

        if self.population.teams == 0 || self.population.members_per_team == 0 {
            return Err(ConfigError::EmptyPopulation);
        }

        let rate = self.thresholds.max_error_rate;
        if !(0. ..=1.).contains(&rate) {
            return Err(ConfigError::InvalidErrorRate(rate));
        }

        if self.thresholds.p95_latency.is_zero() {
            return Err(ConfigError::ZeroDuration("P95 latency threshold"));
        }

        if self.latency_ceiling.is_zero() {
            return Err(ConfigError::ZeroDuration("Latency ceiling"));
        }

        Ok(())
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }
}

fn default_stages() -> Vec<Stage> {
    vec![
        Stage::new(Duration::from_secs(30), 5),
        Stage::new(Duration::from_secs(5 * 60), 5),
        Stage::new(Duration::from_secs(30), 0),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_stage() {
        let stage: Stage = "30s:5".parse().unwrap();
        assert_eq!(stage, Stage::new(Duration::from_secs(30), 5));

        let stage: Stage = " 1m 30s : 12 ".parse().unwrap();
        assert_eq!(stage, Stage::new(Duration::from_secs(90), 12));
    }

    #[test]
    fn parse_stage_rejects_garbage() {
        assert!(matches!(
            "30s".parse::<Stage>(),
            Err(ConfigError::InvalidStage(_))
        ));
        assert!(matches!(
            "30s:many".parse::<Stage>(),
            Err(ConfigError::InvalidStage(_))
        ));
        assert!(matches!(
            "soon:5".parse::<Stage>(),
            Err(ConfigError::InvalidDuration(_))
        ));
    }

    #[test]
    fn default_stages_match_literal() {
        let parsed = Stage::parse_list(DEFAULT_STAGES).unwrap();
        assert_eq!(parsed, RunConfig::default().stages);
        assert_eq!(
            RunConfig::default().total_duration(),
            Duration::from_secs(6 * 60)
        );
    }

    #[test]
    fn validate() {
        assert!(RunConfig::default().validate().is_ok());

        let config = RunConfig {
            stages: vec![],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::NoStages)));

        let config = RunConfig {
            stages: vec![Stage::new(Duration::ZERO, 3)],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::EmptyProfile)));

        let config = RunConfig {
            population: Population {
                teams: 0,
                members_per_team: 10,
            },
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyPopulation)
        ));

        let config = RunConfig {
            thresholds: Thresholds {
                max_error_rate: 1.5,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidErrorRate(_))
        ));

        let config = RunConfig {
            thresholds: Thresholds {
                p95_latency: Duration::ZERO,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroDuration(_))
        ));

        let config = RunConfig {
            latency_ceiling: Duration::ZERO,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "Latency ceiling must be greater than zero");
    }

    #[test]
    fn stage_display_roundtrips() {
        let stage = Stage::new(Duration::from_secs(300), 5);
        assert_eq!(stage.to_string(), "5m:5");
        assert_eq!(stage.to_string().parse::<Stage>().unwrap(), stage);
    }
}
