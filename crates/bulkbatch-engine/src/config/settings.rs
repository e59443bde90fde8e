//! Engine configuration for the assembly process.

use serde::Deserialize;

/// Engine configuration loaded from environment variables.
///
/// Environment variables are prefixed with `BULKBATCH_`:
/// - `BULKBATCH_PROFILES`: Comma-separated active profiles (default: none)
/// - `BULKBATCH_RUN_ID_PROFILE`: Profile that enables the run-id incrementer (default: "local")
/// - `BULKBATCH_JOB_ROOT`: Dotted key under which job files nest the job (default: "bulk.batch-job")
/// - `BULKBATCH_FAIL_ON_ORPHANS`: Turn unused-component warnings into errors (default: false)
/// - `BULKBATCH_LOG_FORMAT`: "text" or "json" (default: "text")
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Active operational profiles
    #[serde(default)]
    pub profiles: Vec<String>,

    /// Profile gating the run-id incrementer
    #[serde(default = "default_run_id_profile")]
    pub run_id_profile: String,

    /// Dotted key path of the job inside a job file
    #[serde(default = "default_job_root")]
    pub job_root: String,

    /// Fail assembly when registered components are never referenced
    #[serde(default)]
    pub fail_on_orphans: bool,

    /// Log output format for binaries
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_run_id_profile() -> String {
    "local".to_string()
}

fn default_job_root() -> String {
    "bulk.batch-job".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables are prefixed with `BULKBATCH_`.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("BULKBATCH_").from_env::<EngineConfig>()
    }

    pub fn is_profile_active(&self, profile: &str) -> bool {
        self.profiles.iter().any(|p| p.trim() == profile)
    }

    /// Whether the run-id incrementer should be attached to assembled jobs.
    pub fn run_id_incrementer_enabled(&self) -> bool {
        self.is_profile_active(&self.run_id_profile)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            profiles: Vec::new(),
            run_id_profile: default_run_id_profile(),
            job_root: default_job_root(),
            fail_on_orphans: false,
            log_format: default_log_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.profiles.is_empty());
        assert_eq!(config.run_id_profile, "local");
        assert_eq!(config.job_root, "bulk.batch-job");
        assert!(!config.fail_on_orphans);
        assert!(!config.run_id_incrementer_enabled());
    }

    #[test]
    fn test_run_id_gate_follows_profiles() {
        let config = EngineConfig {
            profiles: vec!["dev".to_string(), " local".to_string()],
            ..EngineConfig::default()
        };
        assert!(config.is_profile_active("dev"));
        assert!(config.run_id_incrementer_enabled());

        let config = EngineConfig {
            profiles: vec!["prod".to_string()],
            ..EngineConfig::default()
        };
        assert!(!config.run_id_incrementer_enabled());
    }

    #[test]
    fn test_from_env_reads_prefixed_values() {
        std::env::set_var("BULKBATCH_FAIL_ON_ORPHANS", "true");
        std::env::set_var("BULKBATCH_RUN_ID_PROFILE", "nightly");
        let config = EngineConfig::from_env().unwrap();
        assert!(config.fail_on_orphans);
        assert_eq!(config.run_id_profile, "nightly");
        std::env::remove_var("BULKBATCH_FAIL_ON_ORPHANS");
        std::env::remove_var("BULKBATCH_RUN_ID_PROFILE");
    }
}
