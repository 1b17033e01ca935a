use latmesh_graph::Layout;
use latmesh_trace::TraceSettings;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Public resolvers probed when no seeds are given.
pub const DEFAULT_SEEDS: [&str; 3] = ["1.1.1.1", "8.8.8.8", "9.9.9.9"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid duration: {0:?} (expected e.g. 90s, 5m, 2h, 1d)")]
    InvalidDuration(String),
    #[error("unknown update mode: {0} (expected fixed or dynamic)")]
    UnknownUpdateMode(String),
}

/// When the live map is redrawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Every `interval`, whatever happened in between.
    Fixed { interval: Duration },
    /// After every `count` successful traces.
    Dynamic { count: u64 },
}

impl UpdateMode {
    /// Build a mode from CLI-style parts. `event` is accepted as an alias of
    /// `dynamic`.
    pub fn from_parts(mode: &str, interval_secs: f64, count: u64) -> Result<Self, ConfigError> {
        match mode.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(UpdateMode::Fixed {
                interval: Duration::try_from_secs_f64(interval_secs.max(0.01))
                    .map_err(|_| ConfigError::InvalidDuration(interval_secs.to_string()))?,
            }),
            "dynamic" | "event" => Ok(UpdateMode::Dynamic {
                count: count.max(1),
            }),
            other => Err(ConfigError::UnknownUpdateMode(other.to_string())),
        }
    }
}

impl Default for UpdateMode {
    fn default() -> Self {
        UpdateMode::Fixed {
            interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub seeds: Vec<String>,
    pub prefix: u8,
    /// Cap on addresses drawn from each seed's network; `None` or `Some(0)`
    /// enumerates everything.
    pub max_per_seed: Option<usize>,
    pub workers: usize,
    /// Per-worker probe rate; clamped to at least 0.001.
    pub pps: f64,
    pub hop_timeout: Duration,
    pub max_hops: u32,
    pub save_base: PathBuf,
    pub display: bool,
    pub layout: Layout,
    pub update_mode: UpdateMode,
    pub duration: Option<Duration>,
    /// Zero stops the scan before any worker runs.
    pub max_traces: Option<u64>,
    pub revisit_probability: f64,
    pub dequeue_timeout: Duration,
    pub handle_signals: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            seeds: Vec::new(),
            prefix: 16,
            max_per_seed: Some(4096),
            workers: 5,
            pps: 1.0,
            hop_timeout: Duration::from_secs(1),
            max_hops: 30,
            save_base: PathBuf::from("internet_map"),
            display: true,
            layout: Layout::Radial,
            update_mode: UpdateMode::default(),
            duration: None,
            max_traces: None,
            revisit_probability: 0.02,
            dequeue_timeout: Duration::from_secs(1),
            handle_signals: true,
        }
    }
}

impl ScanConfig {
    /// Configured seeds, or [`DEFAULT_SEEDS`] when none were given.
    pub fn effective_seeds(&self) -> Vec<String> {
        if self.seeds.is_empty() {
            DEFAULT_SEEDS.iter().map(|s| s.to_string()).collect()
        } else {
            self.seeds.clone()
        }
    }

    pub fn trace_settings(&self) -> TraceSettings {
        TraceSettings {
            max_hops: self.max_hops,
            hop_timeout: self.hop_timeout,
        }
    }

    pub fn effective_pps(&self) -> f64 {
        self.pps.max(0.001)
    }
}

/// Parse `90s`, `5m`, `2h`, `1d` or a bare number of seconds.
pub fn parse_duration(expr: &str) -> Result<Duration, ConfigError> {
    let trimmed = expr.trim();
    let invalid = || ConfigError::InvalidDuration(expr.to_string());
    if trimmed.is_empty() {
        return Err(invalid());
    }

    let (amount, scale) = match trimmed.char_indices().last() {
        Some((idx, unit)) if unit.is_ascii_alphabetic() => {
            let scale = match unit.to_ascii_lowercase() {
                's' => 1.0,
                'm' => 60.0,
                'h' => 3600.0,
                'd' => 86400.0,
                _ => return Err(invalid()),
            };
            (&trimmed[..idx], scale)
        }
        _ => (trimmed, 1.0),
    };

    let amount: f64 = amount.trim().parse().map_err(|_| invalid())?;
    if !amount.is_finite() || amount < 0.0 {
        return Err(invalid());
    }
    Duration::try_from_secs_f64(amount * scale).map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_accept_units_and_bare_seconds() {
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86400));
        assert_eq!(parse_duration(" 30 ").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("1.5m").unwrap(), Duration::from_secs(90));
    }

    #[test]
    fn bad_durations_are_rejected() {
        for expr in ["", "   ", "m", "5w", "abc", "-5s", "nanm"] {
            assert!(
                matches!(parse_duration(expr), Err(ConfigError::InvalidDuration(_))),
                "{expr:?} should not parse"
            );
        }
    }

    #[test]
    fn update_modes_from_cli_parts() {
        assert_eq!(
            UpdateMode::from_parts("fixed", 2.0, 5).unwrap(),
            UpdateMode::Fixed {
                interval: Duration::from_secs(2)
            }
        );
        assert_eq!(
            UpdateMode::from_parts("event", 1.0, 0).unwrap(),
            UpdateMode::Dynamic { count: 1 }
        );
        assert!(matches!(
            UpdateMode::from_parts("sometimes", 1.0, 5),
            Err(ConfigError::UnknownUpdateMode(_))
        ));
    }

    #[test]
    fn empty_seed_list_falls_back_to_defaults() {
        let config = ScanConfig::default();
        assert_eq!(config.effective_seeds(), vec!["1.1.1.1", "8.8.8.8", "9.9.9.9"]);
        let config = ScanConfig {
            seeds: vec!["192.0.2.1".into()],
            pps: 0.0,
            ..ScanConfig::default()
        };
        assert_eq!(config.effective_seeds(), vec!["192.0.2.1"]);
        assert_eq!(config.effective_pps(), 0.001);
    }
}
