//! Engine tuning and server configuration from environment.

use std::{env, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

/// Candidate generation settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound K on returned routes.
    pub max_candidates: usize,
    /// Alternatives longer than this multiple of the shortest path are dropped.
    pub detour_factor: f64,
    /// Cost multiplier applied per previous use of an edge.
    pub penalty_factor: f64,
    /// No two consecutive route points are further apart than this.
    pub max_segment_m: f64,
    /// How far a requested location may be from the network.
    pub max_snap_distance_m: f64,
    pub shade: ShadeConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_candidates: 3,
            detour_factor: 1.6,
            penalty_factor: 2.0,
            max_segment_m: 25.0,
            max_snap_distance_m: 500.0,
            shade: ShadeConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShadeConfig {
    /// Shade fraction for segments without obstruction data.
    pub baseline_shade: f64,
    pub sample_spacing_m: f64,
    pub ray_step_m: f64,
    pub max_shadow_reach_m: f64,
    /// Light blocked by tree canopy when a record does not say otherwise.
    pub canopy_opacity: f64,
}

impl Default for ShadeConfig {
    fn default() -> Self {
        Self {
            baseline_shade: 0.0,
            sample_spacing_m: 5.0,
            ray_step_m: 2.0,
            max_shadow_reach_m: 400.0,
            canopy_opacity: 0.8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub request_timeout: Duration,
    pub engine: EngineConfig,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let mut engine = EngineConfig::default();
        engine.max_candidates = parse_env("SHADEPATH_MAX_CANDIDATES")
            .filter(|k: &usize| *k > 0)
            .unwrap_or(engine.max_candidates);
        engine.shade.baseline_shade = parse_env("SHADEPATH_BASELINE_SHADE")
            .map(|v: f64| v.clamp(0.0, 1.0))
            .unwrap_or(engine.shade.baseline_shade);

        Self {
            bind_addr: parse_env("SHADEPATH_BIND")
                .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8080))),
            data_dir: env::var("SHADEPATH_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("backend/data/vancouver")),
            request_timeout: Duration::from_millis(
                parse_env("SHADEPATH_TIMEOUT_MS").unwrap_or(5_000),
            ),
            engine,
        }
    }
}

fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("ignoring unparsable {key}={raw:?}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.max_candidates, 3);
        assert_eq!(config.detour_factor, 1.6);
        assert_eq!(config.shade.baseline_shade, 0.0);
    }

    #[test]
    fn unparsable_values_fall_back() {
        // Unique key so parallel tests cannot interfere.
        env::set_var("SHADEPATH_TEST_PARSE_ENV", "not-a-number");
        assert_eq!(parse_env::<u64>("SHADEPATH_TEST_PARSE_ENV"), None);
        env::set_var("SHADEPATH_TEST_PARSE_ENV", " 42 ");
        assert_eq!(parse_env::<u64>("SHADEPATH_TEST_PARSE_ENV"), Some(42));
        assert_eq!(parse_env::<u64>("SHADEPATH_TEST_UNSET_KEY"), None);
    }
}
