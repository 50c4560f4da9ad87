//! Launch command templates.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::SupervisorError;

/// Placeholder replaced by the script path.
pub const PLACEHOLDER: &str = "{}";

/// A command line template such as `sbatch {}` or `{}`.
///
/// The template is split on whitespace before substitution, so a script path
/// containing spaces is still passed as a single argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    tokens: Vec<String>,
}

/// Everything needed to spawn one script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: OsString,
    pub args: Vec<OsString>,
    /// Working directory for the child, the script's directory.
    pub current_dir: Option<PathBuf>,
}

impl LaunchCommand {
    pub fn parse(template: &str) -> Result<Self, SupervisorError> {
        let tokens: Vec<String> = template.split_whitespace().map(str::to_string).collect();

        if tokens.is_empty() {
            return Err(SupervisorError::InvalidCommand {
                template: template.to_string(),
                reason: "command is empty".to_string(),
            });
        }
        if !tokens.iter().any(|t| t.contains(PLACEHOLDER)) {
            return Err(SupervisorError::InvalidCommand {
                template: template.to_string(),
                reason: format!("command must contain the script placeholder {PLACEHOLDER}"),
            });
        }

        Ok(Self { tokens })
    }

    /// Builds the command line for `script`.
    ///
    /// The child always runs in the script's directory. With `chdir` it
    /// receives `./<file name>`; otherwise it receives the absolute script
    /// path.
    pub fn build(&self, script: &Path, chdir: bool) -> CommandLine {
        let script = std::path::absolute(script).unwrap_or_else(|_| script.to_path_buf());
        let current_dir = script.parent().map(Path::to_path_buf);

        let target = match (chdir, script.file_name()) {
            (true, Some(name)) if current_dir.is_some() => {
                Path::new(".").join(name).into_os_string()
            }
            _ => script.as_os_str().to_owned(),
        };

        let mut words = self.tokens.iter().map(|token| substitute(token, &target));
        // parse() guarantees at least one token.
        let program = words.next().unwrap_or_default();

        CommandLine {
            program,
            args: words.collect(),
            current_dir,
        }
    }
}

fn substitute(token: &str, target: &std::ffi::OsStr) -> OsString {
    let mut out = OsString::new();
    let mut parts = token.split(PLACEHOLDER);
    if let Some(first) = parts.next() {
        out.push(first);
    }
    for part in parts {
        out.push(target);
        out.push(part);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_execution() {
        let cmd = LaunchCommand::parse("{}").unwrap();
        let line = cmd.build(Path::new("/exp/rep 1/run.sh"), false);
        assert_eq!(line.program, OsString::from("/exp/rep 1/run.sh"));
        assert!(line.args.is_empty());
        assert_eq!(line.current_dir, Some(PathBuf::from("/exp/rep 1")));
    }

    #[test]
    fn test_submission_command_with_chdir() {
        let cmd = LaunchCommand::parse("sbatch {}").unwrap();
        let line = cmd.build(Path::new("/exp/rep_1/run.slurm"), true);
        assert_eq!(line.program, OsString::from("sbatch"));
        assert_eq!(line.args, vec![OsString::from("./run.slurm")]);
        assert_eq!(line.current_dir, Some(PathBuf::from("/exp/rep_1")));
    }

    #[test]
    fn test_placeholder_inside_token() {
        let cmd = LaunchCommand::parse("qsub -o {}.out {}").unwrap();
        let line = cmd.build(Path::new("/exp/job.torque"), false);
        assert_eq!(
            line.args,
            vec![
                OsString::from("-o"),
                OsString::from("/exp/job.torque.out"),
                OsString::from("/exp/job.torque"),
            ]
        );
    }

    #[test]
    fn test_path_with_spaces_stays_one_argument() {
        let cmd = LaunchCommand::parse("sh {}").unwrap();
        let line = cmd.build(Path::new("/my experiments/run.sh"), false);
        assert_eq!(line.args.len(), 1);
    }

    #[test]
    fn test_invalid_templates() {
        assert!(LaunchCommand::parse("").is_err());
        assert!(LaunchCommand::parse("   ").is_err());
        assert!(LaunchCommand::parse("sbatch").is_err());
    }
}
