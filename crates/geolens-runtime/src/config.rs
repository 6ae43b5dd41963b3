//! Session configuration – reads/writes `~/.geolens/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use geolens_scene::SceneConfig;
use geolens_types::{DEFAULT_VISIBILITY_RADIUS_M, GeoLensError};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Budget and behaviour of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Agents further than this (metres) get no 3-D representation.
    #[serde(default = "default_render_distance")]
    pub render_distance_m: f64,

    /// Maximum number of concurrently placed agents.
    #[serde(default = "default_max_objects")]
    pub max_objects: usize,

    /// In-range radius for agents without their own `visibilityRadius`.
    #[serde(default = "default_visibility_radius")]
    pub default_visibility_radius_m: f64,

    /// Drive the camera from device orientation when the host supports it.
    #[serde(default = "default_true")]
    pub orientation_tracking: bool,

    /// Cosmetic per-agent position jitter.  `0` disables it.
    #[serde(default)]
    pub jitter_amplitude_m: f64,

    /// Model loads slower than this fall back to a placeholder.  `0` waits
    /// forever.
    #[serde(default = "default_load_timeout_ms")]
    pub load_timeout_ms: u64,
}

fn default_render_distance() -> f64 {
    100.0
}
fn default_max_objects() -> usize {
    10
}
fn default_visibility_radius() -> f64 {
    DEFAULT_VISIBILITY_RADIUS_M
}
fn default_true() -> bool {
    true
}
fn default_load_timeout_ms() -> u64 {
    15_000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            render_distance_m: default_render_distance(),
            max_objects: default_max_objects(),
            default_visibility_radius_m: default_visibility_radius(),
            orientation_tracking: default_true(),
            jitter_amplitude_m: 0.0,
            load_timeout_ms: default_load_timeout_ms(),
        }
    }
}

impl SessionConfig {
    /// Replace unusable values with defaults.
    ///
    /// Distances must be finite and non-negative; a bad jitter amplitude
    /// disables jitter.
    pub fn validated(mut self) -> Self {
        if !is_distance(self.render_distance_m) {
            warn!(value = self.render_distance_m, "invalid render distance; using default");
            self.render_distance_m = default_render_distance();
        }
        if !is_distance(self.default_visibility_radius_m) {
            warn!(
                value = self.default_visibility_radius_m,
                "invalid visibility radius; using default"
            );
            self.default_visibility_radius_m = default_visibility_radius();
        }
        if !is_distance(self.jitter_amplitude_m) {
            self.jitter_amplitude_m = 0.0;
        }
        self
    }

    pub fn load_timeout(&self) -> Option<Duration> {
        (self.load_timeout_ms > 0).then(|| Duration::from_millis(self.load_timeout_ms))
    }

    /// The slice of this config the scene manager needs.
    pub fn scene_config(&self) -> SceneConfig {
        SceneConfig {
            render_distance_m: self.render_distance_m,
            max_objects: self.max_objects,
            load_timeout: self.load_timeout(),
        }
    }
}

fn is_distance(v: f64) -> bool {
    v.is_finite() && v >= 0.0
}

/// Return the path to `~/.geolens/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".geolens").join("config.toml")
}

/// Load the config from `~/.geolens/config.toml`.
pub fn load() -> Result<Option<SessionConfig>, GeoLensError> {
    load_from(&config_path())
}

/// Load the config from `path`.  Returns `None` if the file does not exist.
///
/// Environment overrides are applied and the result is validated.
pub fn load_from(path: &Path) -> Result<Option<SessionConfig>, GeoLensError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        GeoLensError::Config(format!("failed to read config at {}: {e}", path.display()))
    })?;
    let mut cfg: SessionConfig = toml::from_str(&raw)
        .map_err(|e| GeoLensError::Config(format!("failed to parse config: {e}")))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg.validated()))
}

/// Apply `GEOLENS_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `GEOLENS_RENDER_DISTANCE` | `render_distance_m` |
/// | `GEOLENS_MAX_OBJECTS` | `max_objects` |
/// | `GEOLENS_ORIENTATION` | `orientation_tracking` (`true`/`false`) |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut SessionConfig) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

/// Apply overrides from an arbitrary variable lookup.
pub fn apply_overrides(cfg: &mut SessionConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("GEOLENS_RENDER_DISTANCE")
        && let Ok(distance) = v.parse::<f64>()
    {
        cfg.render_distance_m = distance;
    }
    if let Some(v) = lookup("GEOLENS_MAX_OBJECTS")
        && let Ok(max) = v.parse::<usize>()
    {
        cfg.max_objects = max;
    }
    if let Some(v) = lookup("GEOLENS_ORIENTATION")
        && let Ok(enabled) = v.parse::<bool>()
    {
        cfg.orientation_tracking = enabled;
    }
}

/// Save the config to `~/.geolens/config.toml`.
pub fn save(cfg: &SessionConfig) -> Result<(), GeoLensError> {
    save_to(cfg, &config_path())
}

/// Save the config to `path`, creating the parent directory if necessary.
pub fn save_to(cfg: &SessionConfig, path: &Path) -> Result<(), GeoLensError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            GeoLensError::Config(format!("failed to create config directory: {e}"))
        })?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| GeoLensError::Config(format!("failed to serialize config: {e}")))?;
    fs::write(path, raw).map_err(|e| {
        GeoLensError::Config(format!("failed to write config at {}: {e}", path.display()))
    })
}
