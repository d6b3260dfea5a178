// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Capsule Configuration Types
//
// Defines the configuration schema for the capsule engine:
// - capsule root and id policy
// - shared install path and linked directories
// - storage blueprint and storage root
// - console command used by call()

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

use crate::domain::capsule::HashPolicy;
use crate::domain::path_resolver::PathResolver;
use crate::domain::provisioning::{default_link_names, LinkSpec, StrategyKind};

/// Top-level configuration document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CapsuleSettings {
    #[serde(default)]
    pub capsule: CapsuleConfig,

    #[serde(default)]
    pub provisioning: ProvisioningConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CapsuleConfig {
    /// Root of all capsules
    #[serde(default = "default_root_path")]
    pub root_path: PathBuf,

    /// Link farm when true, full copy when false
    #[serde(default = "default_true")]
    pub use_symlinks: bool,

    #[serde(default)]
    pub hash_policy: HashPolicy,

    /// Insert a `<cluster_id>` directory between root and capsule id
    #[serde(default = "default_true")]
    pub partition_by_cluster: bool,

    /// Program prefix for console commands (e.g. "php artisan")
    #[serde(default = "default_console_command")]
    pub console_command: String,

    /// DB_DRIVER used when the instance record carries none
    #[serde(default = "default_database_driver")]
    pub database_driver: String,

    #[serde(default)]
    pub instance: InstanceConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

impl Default for CapsuleConfig {
    fn default() -> Self {
        Self {
            root_path: default_root_path(),
            use_symlinks: true,
            hash_policy: HashPolicy::default(),
            partition_by_cluster: true,
            console_command: default_console_command(),
            database_driver: default_database_driver(),
            instance: InstanceConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InstanceConfig {
    /// Shared application tree on this host
    #[serde(default = "default_install_path")]
    pub install_path: PathBuf,

    /// Directories exposed in each capsule, in order
    #[serde(default = "default_link_names")]
    pub symlinks: Vec<String>,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            install_path: default_install_path(),
            symlinks: default_link_names(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StorageConfig {
    /// Storage subdirectories pre-created for every instance
    #[serde(default = "default_blueprint")]
    pub blueprint: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            blueprint: default_blueprint(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProvisioningConfig {
    /// Root of all per-instance persistent storage
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            storage_root: default_storage_root(),
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_root_path() -> PathBuf {
    PathBuf::from("/data/capsules")
}

fn default_install_path() -> PathBuf {
    PathBuf::from("/var/www/launchpad")
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("/data/storage")
}

fn default_console_command() -> String {
    "php artisan".to_string()
}

fn default_database_driver() -> String {
    "mysql".to_string()
}

fn default_blueprint() -> Vec<String> {
    ["app", "databases", "framework", "framework/sessions", "framework/views", "logs"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl CapsuleSettings {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings = serde_yaml::from_str(&content)?;
        Ok(settings)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let settings = serde_yaml::from_str(yaml)?;
        Ok(settings)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Discover configuration file using precedence order
    /// 1. CAPSULE_CONFIG_PATH environment variable
    /// 2. ./capsule-config.yaml (working directory)
    /// 3. ~/.capsule/config.yaml (user home)
    /// 4. /etc/capsule/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("CAPSULE_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./capsule-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".capsule").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/capsule/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(explicit_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must exist and parse
        if let Some(path) = explicit_path {
            tracing::info!("Loading capsule configuration from explicit path: {:?}", path);
            let mut settings = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load capsule config at {:?}: {}", path, e)
            })?;
            settings.apply_env_overrides();
            return Ok(settings);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading capsule configuration from discovered path: {:?}", config_path);
            let mut settings = Self::from_yaml_file(config_path)?;
            settings.apply_env_overrides();
            Ok(settings)
        } else {
            tracing::warn!("No capsule configuration found in standard locations. Using defaults.");
            let mut settings = Self::default();
            settings.apply_env_overrides();
            Ok(settings)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("DFE_CAPSULE_ROOT_PATH") {
            tracing::info!("Environment override: DFE_CAPSULE_ROOT_PATH={}", val);
            self.capsule.root_path = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("DFE_INSTANCE_INSTALL_PATH") {
            tracing::info!("Environment override: DFE_INSTANCE_INSTALL_PATH={}", val);
            self.capsule.instance.install_path = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("DFE_STORAGE_ROOT") {
            tracing::info!("Environment override: DFE_STORAGE_ROOT={}", val);
            self.provisioning.storage_root = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("DFE_CAPSULE_USE_SYMLINKS") {
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => {
                    tracing::info!("Environment override: DFE_CAPSULE_USE_SYMLINKS=true");
                    self.capsule.use_symlinks = true;
                }
                "false" | "0" | "no" | "off" => {
                    tracing::info!("Environment override: DFE_CAPSULE_USE_SYMLINKS=false");
                    self.capsule.use_symlinks = false;
                }
                _ => {
                    tracing::warn!(
                        "Invalid value for DFE_CAPSULE_USE_SYMLINKS: '{}'. Expected true/false. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        require_absolute("capsule.root-path", &self.capsule.root_path)?;
        require_absolute("capsule.instance.install-path", &self.capsule.instance.install_path)?;
        require_absolute("provisioning.storage-root", &self.provisioning.storage_root)?;

        if self.capsule.root_path.parent().is_none() {
            anyhow::bail!("capsule.root-path cannot be the filesystem root");
        }

        if self.capsule.console_command.trim().is_empty() {
            anyhow::bail!("capsule.console-command cannot be empty");
        }

        for name in &self.capsule.instance.symlinks {
            if name.is_empty() || name.contains('/') || name == "." || name == ".." {
                anyhow::bail!("Invalid entry in capsule.instance.symlinks: '{}'", name);
            }
        }

        for segment in &self.capsule.storage.blueprint {
            let path = Path::new(segment);
            if segment.is_empty()
                || path.is_absolute()
                || path.components().any(|c| c == Component::ParentDir)
            {
                anyhow::bail!("Invalid entry in capsule.storage.blueprint: '{}'", segment);
            }
        }

        Ok(())
    }

    pub fn link_spec(&self) -> LinkSpec {
        LinkSpec::new(self.capsule.instance.symlinks.clone())
    }

    pub fn strategy_kind(&self) -> StrategyKind {
        StrategyKind::from_use_symlinks(self.capsule.use_symlinks)
    }

    pub fn path_resolver(&self) -> PathResolver {
        PathResolver::new(
            self.capsule.root_path.clone(),
            self.capsule.hash_policy,
            self.capsule.partition_by_cluster,
        )
    }
}

fn require_absolute(name: &str, path: &Path) -> anyhow::Result<()> {
    if path.as_os_str().is_empty() {
        anyhow::bail!("{} cannot be empty", name);
    }
    if !path.is_absolute() {
        anyhow::bail!("{} must be an absolute path, got {:?}", name, path);
    }
    Ok(())
}
