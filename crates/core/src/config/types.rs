use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub starter: StarterConfig,
}

/// Script starter configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StarterConfig {
    /// Root of the directory tree searched for scripts.
    #[serde(default = "default_directory")]
    pub directory: PathBuf,

    /// Where scripts are launched. Selects the default pattern, command and chdir.
    #[serde(default)]
    pub backend: Backend,

    /// Filename wildcard (overrides the backend preset).
    #[serde(default)]
    pub pattern: Option<String>,

    /// Launch command template, `{}` is replaced by the script path
    /// (overrides the backend preset).
    #[serde(default)]
    pub command: Option<String>,

    /// Spawn each script from its own directory (overrides the backend preset).
    #[serde(default)]
    pub chdir: Option<bool>,

    /// How many scripts may run at once: `true`, `false` or a positive integer.
    #[serde(default)]
    pub parallel: Concurrency,

    /// Launch scripts again even if they already finished.
    #[serde(default)]
    pub rerun: bool,

    /// Log ignored scripts at info level instead of debug.
    #[serde(default)]
    pub verbose: bool,

    /// Sleep between polls when no child changed state (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Sleep after every successful launch (milliseconds).
    #[serde(default)]
    pub post_start_wait_ms: u64,
}

impl StarterConfig {
    /// Effective filename wildcard.
    pub fn pattern(&self) -> &str {
        self.pattern
            .as_deref()
            .unwrap_or_else(|| self.backend.default_pattern())
    }

    /// Effective launch command template.
    pub fn command(&self) -> &str {
        self.command
            .as_deref()
            .unwrap_or_else(|| self.backend.default_command())
    }

    /// Effective working-directory policy.
    pub fn chdir(&self) -> bool {
        self.chdir.unwrap_or_else(|| self.backend.default_chdir())
    }

    /// Configuration preset for a backend with everything else at its default.
    pub fn for_backend(backend: Backend) -> Self {
        Self {
            backend,
            ..Default::default()
        }
    }
}

impl Default for StarterConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            backend: Backend::default(),
            pattern: None,
            command: None,
            chdir: None,
            parallel: Concurrency::default(),
            rerun: false,
            verbose: false,
            poll_interval_ms: default_poll_interval(),
            post_start_wait_ms: 0,
        }
    }
}

/// Default experiments directory, relative to the working directory.
pub const DEFAULT_EXPERIMENTS_DIRECTORY: &str = "experiments";

fn default_directory() -> PathBuf {
    PathBuf::from(".").join(DEFAULT_EXPERIMENTS_DIRECTORY)
}

fn default_poll_interval() -> u64 {
    500
}

/// Launch backends
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Run scripts directly as local processes.
    #[default]
    Local,
    /// Submit scripts with `sbatch`.
    Slurm,
    /// Submit scripts with `qsub`.
    Torque,
}

impl Backend {
    pub fn default_pattern(self) -> &'static str {
        match self {
            Backend::Local => "*.sh",
            Backend::Slurm => "*.slurm",
            Backend::Torque => "*.torque",
        }
    }

    pub fn default_command(self) -> &'static str {
        match self {
            Backend::Local => "{}",
            Backend::Slurm => "sbatch {}",
            Backend::Torque => "qsub {}",
        }
    }

    /// Batch submitters resolve relative paths in the job script against the
    /// submission directory, so they are started from the script's directory.
    pub fn default_chdir(self) -> bool {
        !matches!(self, Backend::Local)
    }
}

/// Concurrency ceiling policy.
///
/// Written in TOML as `parallel = false` (serial), `parallel = true`
/// (unbounded) or `parallel = N` with `N >= 1` (bounded).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "RawConcurrency", into = "RawConcurrency")]
pub enum Concurrency {
    /// One script at a time, each run to completion before the next starts.
    Serial,
    /// At most `n` scripts at a time.
    Bounded(NonZeroUsize),
    /// Every eligible script is started immediately.
    #[default]
    Unbounded,
}

impl Concurrency {
    /// Bounded policy from a plain integer. Rejects zero and negatives.
    pub fn bounded(n: i64) -> Result<Self, String> {
        usize::try_from(n)
            .ok()
            .and_then(NonZeroUsize::new)
            .map(Concurrency::Bounded)
            .ok_or_else(|| format!("number of parallel processes must be larger than 0, got {n}"))
    }

    /// Maximum number of simultaneously active children for a run with
    /// `eligible` launch candidates. Never zero.
    pub fn ceiling(&self, eligible: usize) -> usize {
        match self {
            Concurrency::Serial => 1,
            Concurrency::Bounded(n) => n.get(),
            Concurrency::Unbounded => eligible.max(1),
        }
    }
}

/// Wire shape of [`Concurrency`]: a boolean or an integer.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(untagged)]
enum RawConcurrency {
    Flag(bool),
    Count(i64),
}

impl TryFrom<RawConcurrency> for Concurrency {
    type Error = String;

    fn try_from(raw: RawConcurrency) -> Result<Self, Self::Error> {
        match raw {
            RawConcurrency::Flag(true) => Ok(Concurrency::Unbounded),
            RawConcurrency::Flag(false) => Ok(Concurrency::Serial),
            RawConcurrency::Count(n) => Concurrency::bounded(n),
        }
    }
}

impl From<Concurrency> for RawConcurrency {
    fn from(value: Concurrency) -> Self {
        match value {
            Concurrency::Serial => RawConcurrency::Flag(false),
            Concurrency::Bounded(n) => RawConcurrency::Count(n.get() as i64),
            Concurrency::Unbounded => RawConcurrency::Flag(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.starter.directory, PathBuf::from("./experiments"));
        assert_eq!(config.starter.backend, Backend::Local);
        assert_eq!(config.starter.parallel, Concurrency::Unbounded);
        assert_eq!(config.starter.poll_interval_ms, 500);
        assert!(!config.starter.rerun);
    }

    #[test]
    fn test_parallel_false_is_serial() {
        let config: StarterConfig = toml::from_str("parallel = false").unwrap();
        assert_eq!(config.parallel, Concurrency::Serial);
        assert_eq!(config.parallel.ceiling(10), 1);
    }

    #[test]
    fn test_parallel_true_is_unbounded() {
        let config: StarterConfig = toml::from_str("parallel = true").unwrap();
        assert_eq!(config.parallel, Concurrency::Unbounded);
        assert_eq!(config.parallel.ceiling(7), 7);
        assert_eq!(config.parallel.ceiling(0), 1);
    }

    #[test]
    fn test_parallel_integer_is_bounded() {
        let config: StarterConfig = toml::from_str("parallel = 3").unwrap();
        assert_eq!(config.parallel, Concurrency::bounded(3).unwrap());
        assert_eq!(config.parallel.ceiling(10), 3);
    }

    #[test]
    fn test_parallel_rejects_zero_and_negative() {
        assert!(toml::from_str::<StarterConfig>("parallel = 0").is_err());
        assert!(toml::from_str::<StarterConfig>("parallel = -2").is_err());
    }

    #[test]
    fn test_parallel_rejects_other_types() {
        assert!(toml::from_str::<StarterConfig>("parallel = \"four\"").is_err());
        assert!(toml::from_str::<StarterConfig>("parallel = 2.5").is_err());
    }

    #[test]
    fn test_concurrency_serializes_back_to_wire_shape() {
        let config = StarterConfig {
            parallel: Concurrency::bounded(4).unwrap(),
            ..Default::default()
        };
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("parallel = 4"));
    }

    #[test]
    fn test_backend_presets() {
        let slurm = StarterConfig::for_backend(Backend::Slurm);
        assert_eq!(slurm.pattern(), "*.slurm");
        assert_eq!(slurm.command(), "sbatch {}");
        assert!(slurm.chdir());

        let torque = StarterConfig::for_backend(Backend::Torque);
        assert_eq!(torque.pattern(), "*.torque");
        assert_eq!(torque.command(), "qsub {}");

        let local = StarterConfig::default();
        assert_eq!(local.pattern(), "*.sh");
        assert_eq!(local.command(), "{}");
        assert!(!local.chdir());
    }

    #[test]
    fn test_overrides_take_precedence_over_backend() {
        let toml = r#"
backend = "slurm"
pattern = "run_*.slurm"
chdir = false
"#;
        let config: StarterConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.pattern(), "run_*.slurm");
        assert_eq!(config.command(), "sbatch {}");
        assert!(!config.chdir());
    }
}
