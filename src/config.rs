use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const CONFIG_SCHEMA_VERSION: u32 = 1;
const DEFAULT_CONTEXT_FILL_DENOMINATOR: usize = 160;
const DEFAULT_CONTEXT_WARN_THRESHOLD: usize = 80;
const DEFAULT_REBOOT_RISK_THRESHOLD: usize = 12;
pub const WORKSPACE_STORAGE_DIR: &str = "workspaceStorage";
pub const SESSIONS_SUBDIR: &str = "chatSessions";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QhoamiConfig {
    pub schema_version: u32,
    /// Editor user-data directory; auto-detected when unset.
    pub appdata_path: Option<String>,
    pub editor_flavor: EditorFlavor,
    pub roles: RolePolicy,
    pub probe: ProbePolicy,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EditorFlavor {
    #[default]
    Auto,
    Insiders,
    Stable,
}

impl EditorFlavor {
    fn dir_name(self) -> &'static str {
        match self {
            Self::Insiders | Self::Auto => "Code - Insiders",
            Self::Stable => "Code",
        }
    }
}

/// Lower bounds of the role ranges a title tag is mapped onto.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RolePolicy {
    pub overseer_tag: f64,
    pub infrastructure_min: f64,
    pub quester_min: f64,
    pub specialist_min: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProbePolicy {
    /// Requests since the last reboot that count as a full context.
    pub context_fill_denominator: usize,
    pub context_warn_threshold: usize,
    /// Reboot count at which a session is flagged for wrap-up.
    pub reboot_risk_threshold: usize,
}

impl Default for QhoamiConfig {
    fn default() -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION,
            appdata_path: None,
            editor_flavor: EditorFlavor::Auto,
            roles: RolePolicy::default(),
            probe: ProbePolicy::default(),
        }
    }
}

impl Default for RolePolicy {
    fn default() -> Self {
        Self {
            overseer_tag: 0.0,
            infrastructure_min: 0.1,
            quester_min: 0.5,
            specialist_min: 1.0,
        }
    }
}

impl RolePolicy {
    fn is_valid(&self) -> bool {
        let bounds = [
            self.overseer_tag,
            self.infrastructure_min,
            self.quester_min,
            self.specialist_min,
        ];
        bounds.iter().all(|bound| bound.is_finite())
            && bounds.windows(2).all(|pair| pair[0] <= pair[1])
    }
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self {
            context_fill_denominator: DEFAULT_CONTEXT_FILL_DENOMINATOR,
            context_warn_threshold: DEFAULT_CONTEXT_WARN_THRESHOLD,
            reboot_risk_threshold: DEFAULT_REBOOT_RISK_THRESHOLD,
        }
    }
}

impl QhoamiConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut parsed: QhoamiConfig = serde_json::from_str(&raw)
            .with_context(|| format!("invalid JSON in {}", path.display()))?;
        if parsed.normalize_and_migrate() {
            debug!(path = %path.display(), "normalized config values");
        }
        Ok(parsed)
    }

    /// Reads the config file if there is one. The file is never created.
    pub fn load_or_default() -> Self {
        let path = config_path();
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => config,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "falling back to default config");
                Self::default()
            }
        }
    }

    /// Editor user-data directory: `QHOAMI_APPDATA`, then the config file,
    /// then the platform default.
    pub fn appdata_path(&self) -> PathBuf {
        if let Some(custom) = env_path("QHOAMI_APPDATA") {
            return custom;
        }
        if let Some(configured) = self.appdata_path.as_deref() {
            return PathBuf::from(configured);
        }
        default_appdata_path(self.editor_flavor)
    }

    fn normalize_and_migrate(&mut self) -> bool {
        let mut changed = false;

        if self.schema_version < CONFIG_SCHEMA_VERSION {
            self.schema_version = CONFIG_SCHEMA_VERSION;
            changed = true;
        }

        if self
            .appdata_path
            .as_deref()
            .is_some_and(|path| path.trim().is_empty())
        {
            self.appdata_path = None;
            changed = true;
        }

        if !self.roles.is_valid() {
            self.roles = RolePolicy::default();
            changed = true;
        }

        let defaults = ProbePolicy::default();
        if self.probe.context_fill_denominator == 0 {
            self.probe.context_fill_denominator = defaults.context_fill_denominator;
            changed = true;
        }
        if self.probe.context_warn_threshold == 0 {
            self.probe.context_warn_threshold = defaults.context_warn_threshold;
            changed = true;
        }
        if self.probe.reboot_risk_threshold == 0 {
            self.probe.reboot_risk_threshold = defaults.reboot_risk_threshold;
            changed = true;
        }

        changed
    }
}

pub fn qhoami_home() -> PathBuf {
    if let Some(custom) = env_path("QHOAMI_HOME") {
        return custom;
    }

    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("qhoami")
}

pub fn config_path() -> PathBuf {
    qhoami_home().join("config.json")
}

/// `<platform config dir>/<editor>/User`. `Auto` prefers Insiders and falls
/// back to stable when only that one is installed.
pub fn default_appdata_path(flavor: EditorFlavor) -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    let preferred = base.join(flavor.dir_name()).join("User");
    if flavor == EditorFlavor::Auto && !preferred.exists() {
        let stable = base.join(EditorFlavor::Stable.dir_name()).join("User");
        if stable.exists() {
            return stable;
        }
    }
    preferred
}

pub fn workspace_storage_path(appdata: &Path) -> PathBuf {
    appdata.join(WORKSPACE_STORAGE_DIR)
}

fn env_path(name: &str) -> Option<PathBuf> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_policy() {
        let cfg = QhoamiConfig::default();
        assert_eq!(cfg.roles.infrastructure_min, 0.1);
        assert_eq!(cfg.roles.quester_min, 0.5);
        assert_eq!(cfg.roles.specialist_min, 1.0);
        assert_eq!(cfg.probe.context_fill_denominator, 160);
        assert_eq!(cfg.probe.context_warn_threshold, 80);
        assert_eq!(cfg.probe.reboot_risk_threshold, 12);
    }

    #[test]
    fn migration_repairs_invalid_values() {
        let mut cfg = QhoamiConfig {
            schema_version: 0,
            appdata_path: Some("  ".to_string()),
            editor_flavor: EditorFlavor::Stable,
            roles: RolePolicy {
                quester_min: 2.0,
                ..RolePolicy::default()
            },
            probe: ProbePolicy {
                context_fill_denominator: 0,
                ..ProbePolicy::default()
            },
        };

        assert!(cfg.normalize_and_migrate());
        assert_eq!(cfg.schema_version, CONFIG_SCHEMA_VERSION);
        assert_eq!(cfg.appdata_path, None);
        assert_eq!(cfg.roles, RolePolicy::default());
        assert_eq!(cfg.probe.context_fill_denominator, 160);
        assert_eq!(cfg.editor_flavor, EditorFlavor::Stable);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let tmp = tempfile::TempDir::new().expect("temp dir");
        let path = tmp.path().join("config.json");
        fs::write(
            &path,
            r#"{"appdata_path":"/data/Code/User","probe":{"context_warn_threshold":40}}"#,
        )
        .expect("write config");

        let cfg = QhoamiConfig::load(&path).expect("load");
        assert_eq!(cfg.appdata_path.as_deref(), Some("/data/Code/User"));
        assert_eq!(cfg.probe.context_warn_threshold, 40);
        assert_eq!(cfg.probe.context_fill_denominator, 160);
        assert_eq!(cfg.roles, RolePolicy::default());
    }

    #[test]
    fn invalid_json_is_an_error() {
        let tmp = tempfile::TempDir::new().expect("temp dir");
        let path = tmp.path().join("config.json");
        fs::write(&path, "{").expect("write config");
        assert!(QhoamiConfig::load(&path).is_err());
    }

    #[test]
    fn storage_path_is_under_appdata() {
        assert_eq!(
            workspace_storage_path(Path::new("/u")),
            PathBuf::from("/u").join("workspaceStorage")
        );
    }
}
