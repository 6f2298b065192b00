use std::path::{Path, PathBuf};

use crate::shell::ShellKind;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Open the three stores in order and print their status
    Boot,
    /// Interactive shell over one store format
    Shell(ShellKind),
}

/// Base paths are given without suffix; each format appends its own.
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) command: Command,
    pub(crate) params_path: PathBuf,
    pub(crate) db_path: PathBuf,
    pub(crate) log_path: PathBuf,
    /// `-quiet`: no I/O wait markers between boot phases
    pub(crate) quiet: bool,
    /// `-skip`: no I/O wait marker before the first phase
    pub(crate) skip_intro: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            command: Command::Boot,
            params_path: PathBuf::from("db/params"),
            db_path: PathBuf::from("db/nav"),
            log_path: PathBuf::from("db/log"),
            quiet: false,
            skip_intro: false,
        }
    }
}

impl Config {
    /// Build a config from command-line arguments (program name excluded).
    ///
    /// ```text
    /// mmstore [boot] [-quiet] [-skip] [-ppath=BASE] [-dpath=BASE] [-lpath=BASE]
    /// mmstore shell list|table|array
    /// ```
    pub fn from_args<I: IntoIterator<Item = String>>(args: I) -> Result<Self> {
        let mut config = Config::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            if let Some(path) = arg.strip_prefix("-ppath=") {
                config.params_path = PathBuf::from(path);
            } else if let Some(path) = arg.strip_prefix("-dpath=") {
                config.db_path = PathBuf::from(path);
            } else if let Some(path) = arg.strip_prefix("-lpath=") {
                config.log_path = PathBuf::from(path);
            } else if arg == "-quiet" {
                config.quiet = true;
            } else if arg == "-skip" {
                config.skip_intro = true;
            } else if arg == "boot" {
                config.command = Command::Boot;
            } else if arg == "shell" {
                let kind = args.next().ok_or_else(|| {
                    Error::InvalidArgument("shell needs one of: list, table, array".to_string())
                })?;
                config.command = Command::Shell(kind.parse()?);
            } else {
                return Err(Error::InvalidArgument(format!("Unknown argument {}", arg)));
            }
        }

        Ok(config)
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn params_path(&self) -> &Path {
        &self.params_path
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn quiet(&self) -> bool {
        self.quiet
    }

    pub fn skip_intro(&self) -> bool {
        self.skip_intro
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_args(Vec::new()).unwrap();
        assert_eq!(config.command(), Command::Boot);
        assert_eq!(config.params_path(), Path::new("db/params"));
        assert_eq!(config.db_path(), Path::new("db/nav"));
        assert_eq!(config.log_path(), Path::new("db/log"));
        assert!(!config.quiet());
        assert!(!config.skip_intro());
    }

    #[test]
    fn test_quiet_flags() {
        let config = Config::from_args(args(&["-quiet"])).unwrap();
        assert!(config.quiet());
        assert!(!config.skip_intro());

        let config = Config::from_args(args(&["-skip", "boot", "-quiet"])).unwrap();
        assert_eq!(config.command(), Command::Boot);
        assert!(config.quiet());
        assert!(config.skip_intro());
    }

    #[test]
    fn test_path_overrides() {
        let config = Config::from_args(args(&["-ppath=/tmp/p", "-dpath=nav", "-lpath=x/log"])).unwrap();
        assert_eq!(config.params_path(), Path::new("/tmp/p"));
        assert_eq!(config.db_path(), Path::new("nav"));
        assert_eq!(config.log_path(), Path::new("x/log"));
    }

    #[test]
    fn test_shell_command() {
        let config = Config::from_args(args(&["shell", "table"])).unwrap();
        assert_eq!(config.command(), Command::Shell(ShellKind::StrTable));

        assert!(matches!(Config::from_args(args(&["shell"])), Err(Error::InvalidArgument(_))));
        assert!(matches!(Config::from_args(args(&["shell", "tree"])), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_unknown_argument() {
        assert!(matches!(Config::from_args(args(&["-quieter"])), Err(Error::InvalidArgument(_))));
        assert!(matches!(Config::from_args(args(&["--quiet"])), Err(Error::InvalidArgument(_))));
    }
}
