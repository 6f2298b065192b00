pub mod boot;
pub mod config;
mod error;
pub mod shell;
pub mod storage;

use std::io;

pub use error::{Error, Result};
pub use storage::{BlockList, BlockRef, DiskArray, MappedRegion, StrTable};

use config::{Command, Config};

/// Run the command selected by `config` against the process's stdin/stdout.
pub fn run(config: &Config) -> Result<()> {
    match config.command() {
        Command::Boot => boot::run(config, &mut io::stdout().lock()),
        Command::Shell(kind) => shell::run(kind, io::stdin().lock(), &mut io::stdout().lock()),
    }
}
