pub mod config;
pub mod discovery;
pub mod lock;
pub mod sidecar;
pub mod starter;
pub mod status;
pub mod supervisor;
pub mod testing;

pub use config::{
    load_config, load_config_from_env, load_config_from_str, validate_config, Backend,
    Concurrency, Config, ConfigError, StarterConfig,
};
pub use discovery::{discover_scripts, DiscoveryError, ScriptDiscoverer, WildcardPattern};
pub use lock::{LockError, LockGuard, LockManager};
pub use starter::{
    count_pending, count_scripts, list_scripts, RunReport, ScriptEntry, ScriptOutcome,
    ScriptResult, ScriptStarter, SkipReason, SkippedScript, StarterError,
};
pub use status::{ScriptStatus, StatusError, StatusRecord, StatusSnapshot, StatusStore};
pub use supervisor::{ExitOutcome, LaunchCommand, ProcessExit, ProcessSupervisor, SupervisorError};
