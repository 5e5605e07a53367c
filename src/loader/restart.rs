//! Hard reload: full host-process restart.
//!
//! Incremental reload cannot invalidate identity-sensitive references a
//! unit may retain across executions; restarting the process in place
//! (same executable, same arguments) is the strictly stronger form of
//! reload. Irreversible and fire-and-forget from the engine's point of
//! view.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Command;

/// Seam for the restart side effect; tests substitute a recording double.
pub trait Restarter {
    /// Restart the host process. Returns only on failure.
    fn restart(&mut self) -> Result<(), std::io::Error>;
}

/// Re-executes the current process image with its original arguments.
#[derive(Debug)]
pub struct ExecRestarter {
    exe: PathBuf,
    args: Vec<OsString>,
}

impl ExecRestarter {
    /// Capture the current invocation for later re-execution.
    pub fn from_current_process() -> Result<Self, std::io::Error> {
        Ok(Self {
            exe: std::env::current_exe()?,
            args: std::env::args_os().skip(1).collect(),
        })
    }
}

impl Restarter for ExecRestarter {
    #[cfg(unix)]
    fn restart(&mut self) -> Result<(), std::io::Error> {
        use std::os::unix::process::CommandExt;
        crate::log_event!("loader", "hard reload", "{}", self.exe.display());
        // exec replaces the process image and only returns on failure
        Err(Command::new(&self.exe).args(&self.args).exec())
    }

    #[cfg(not(unix))]
    fn restart(&mut self) -> Result<(), std::io::Error> {
        crate::log_event!("loader", "hard reload", "{}", self.exe.display());
        Command::new(&self.exe).args(&self.args).spawn()?;
        std::process::exit(0);
    }
}
