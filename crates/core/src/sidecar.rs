//! Files kept next to each script.

use std::path::{Path, PathBuf};

/// Suffix of the append-only status log, `<script>.status`.
pub const STATUS_SUFFIX: &str = ".status";

/// Suffix of the advisory lock file, `<script>.lock`.
pub const LOCK_SUFFIX: &str = ".lock";

/// `script` with `suffix` appended to its full file name.
pub fn sidecar_path(script: &Path, suffix: &str) -> PathBuf {
    let mut path = script.as_os_str().to_owned();
    path.push(suffix);
    PathBuf::from(path)
}

/// Whether `file_name` names a status log or lock file.
pub fn is_sidecar(file_name: &str) -> bool {
    file_name.ends_with(STATUS_SUFFIX) || file_name.ends_with(LOCK_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sidecar_path_appends_to_file_name() {
        let script = Path::new("/exp/rep_1/run.sh");
        assert_eq!(
            sidecar_path(script, STATUS_SUFFIX),
            PathBuf::from("/exp/rep_1/run.sh.status")
        );
        assert_eq!(
            sidecar_path(script, LOCK_SUFFIX),
            PathBuf::from("/exp/rep_1/run.sh.lock")
        );
    }

    #[test]
    fn test_is_sidecar() {
        assert!(is_sidecar("run.sh.status"));
        assert!(is_sidecar("run.sh.lock"));
        assert!(!is_sidecar("run.sh"));
    }
}
