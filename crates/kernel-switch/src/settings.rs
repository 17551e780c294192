//! Settings that affect kernel switching.
//!
//! Stored as JSON in the user's config directory:
//! - macOS: ~/Library/Application Support/runt/kernel-switch.json
//! - Linux: ~/.config/runt/kernel-switch.json
//! - Windows: C:\Users\<User>\AppData\Roaming\runt\kernel-switch.json
//!
//! `RUNT_KERNEL_SWITCH_SETTINGS` overrides the location.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

/// Default time to wait for a kernel to start.
pub const DEFAULT_LAUNCH_TIMEOUT_MS: u64 = 60_000;

/// Where notebooks get their Jupyter server from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ServerType {
    /// Kernels are launched on this machine
    #[default]
    Local,
    /// Kernels run on a remote Jupyter server
    Remote,
}

impl std::fmt::Display for ServerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerType::Local => write!(f, "local"),
            ServerType::Remote => write!(f, "remote"),
        }
    }
}

impl std::str::FromStr for ServerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(ServerType::Local),
            "remote" => Ok(ServerType::Remote),
            other => Err(format!("unknown server type: {other}")),
        }
    }
}

/// Settings scoped to a notebook or a folder of notebooks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ResourceSettings {
    /// Notebook file or folder the override applies to
    pub path: PathBuf,

    /// Launch timeout for kernels of notebooks under `path`
    #[serde(default, deserialize_with = "deserialize_optional_millis")]
    #[schemars(with = "Option<u64>")]
    pub jupyter_launch_timeout_ms: Option<u64>,
}

/// Kernel switch settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SwitchSettings {
    /// How long to wait for a kernel to start, in milliseconds
    #[serde(
        default = "default_launch_timeout_ms",
        deserialize_with = "deserialize_millis"
    )]
    #[schemars(with = "u64")]
    pub jupyter_launch_timeout_ms: u64,

    /// Server type assumed for sessions that have no kernel yet
    #[serde(default)]
    pub jupyter_server_type: ServerType,

    /// Per-notebook or per-folder overrides
    #[serde(default)]
    pub resource_overrides: Vec<ResourceSettings>,
}

fn default_launch_timeout_ms() -> u64 {
    DEFAULT_LAUNCH_TIMEOUT_MS
}

/// Accept both `60000` and `"60000"`; hand-edited settings files use either.
fn deserialize_millis<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de;

    struct MillisVisitor;

    impl<'de> de::Visitor<'de> for MillisVisitor {
        type Value = u64;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a number of milliseconds or a numeric string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<u64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<u64, E> {
            u64::try_from(v).map_err(|_| E::custom("timeout must not be negative"))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<u64, E> {
            if v.is_finite() && v >= 0.0 {
                Ok(v as u64)
            } else {
                Err(E::custom("timeout must be a non-negative number"))
            }
        }

        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<u64, E> {
            v.trim().parse().map_err(E::custom)
        }
    }

    deserializer.deserialize_any(MillisVisitor)
}

fn deserialize_optional_millis<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "deserialize_millis")] u64);

    let value: Option<Wrapper> = Option::deserialize(deserializer)?;
    Ok(value.map(|Wrapper(ms)| ms))
}

impl Default for SwitchSettings {
    fn default() -> Self {
        Self {
            jupyter_launch_timeout_ms: DEFAULT_LAUNCH_TIMEOUT_MS,
            jupyter_server_type: ServerType::Local,
            resource_overrides: vec![],
        }
    }
}

impl SwitchSettings {
    /// Whether sessions without a kernel should be treated as local launches.
    pub fn is_local_launch(&self) -> bool {
        self.jupyter_server_type == ServerType::Local
    }

    /// Effective launch timeout for a notebook.
    ///
    /// The most specific override whose path contains `resource` wins;
    /// otherwise the global value applies. Zero means "unset".
    pub fn launch_timeout_for(&self, resource: Option<&Path>) -> Duration {
        let global = match self.jupyter_launch_timeout_ms {
            0 => DEFAULT_LAUNCH_TIMEOUT_MS,
            ms => ms,
        };

        let scoped = resource.and_then(|path| {
            self.resource_overrides
                .iter()
                .filter(|o| path.starts_with(&o.path))
                .filter_map(|o| {
                    o.jupyter_launch_timeout_ms
                        .filter(|ms| *ms > 0)
                        .map(|ms| (o.path.components().count(), ms))
                })
                .max_by_key(|(depth, _)| *depth)
                .map(|(_, ms)| ms)
        });

        Duration::from_millis(scoped.unwrap_or(global))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Get the path to the settings file
pub fn settings_path() -> PathBuf {
    if let Ok(path) = std::env::var("RUNT_KERNEL_SWITCH_SETTINGS") {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("runt")
        .join("kernel-switch.json")
}

/// Load settings from disk, returning defaults if the file doesn't exist
pub fn load_settings() -> SwitchSettings {
    load_settings_from(&settings_path())
}

/// Load settings from a specific file, returning defaults if it is missing
/// or can't be parsed.
pub fn load_settings_from(path: &Path) -> SwitchSettings {
    if !path.exists() {
        debug!("[settings] No settings file at {}, using defaults", path.display());
        return SwitchSettings::default();
    }

    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("[settings] Failed to read {}: {}", path.display(), e);
            return SwitchSettings::default();
        }
    };

    match serde_json::from_str(&contents) {
        Ok(settings) => settings,
        Err(e) => {
            warn!("[settings] Failed to parse {}: {}", path.display(), e);
            SwitchSettings::default()
        }
    }
}

/// Save settings to disk
pub fn save_settings(settings: &SwitchSettings) -> Result<(), SettingsError> {
    save_settings_to(&settings_path(), settings)
}

pub fn save_settings_to(path: &Path, settings: &SwitchSettings) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, format!("{json}\n"))?;
    Ok(())
}

/// JSON schema for the settings file.
pub fn settings_json_schema() -> serde_json::Value {
    schemars::schema_for!(SwitchSettings).to_value()
}
