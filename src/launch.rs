use std::{
    ffi::OsStr,
    process::{Command, Stdio},
    thread,
};

use tracing::{debug, warn};

use crate::facade;

/// Launches processes that outlive no terminal and leave no zombie behind.
///
/// The child gets null stdio and its own process group, and a background
/// thread waits for it so the exit status is always collected.
#[derive(Debug, Default, Clone, Copy)]
pub struct Detached;

impl facade::Launch for Detached {
    fn launch(&self, program: &OsStr, args: &[&OsStr]) -> bool {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!("failed to launch {:?}: {}", program, err);
                return false;
            }
        };
        debug!("launched {:?} as pid {}", program, child.id());
        let reaper = thread::Builder::new()
            .name(format!("reap-{}", child.id()))
            .spawn(move || {
                if let Err(err) = child.wait() {
                    warn!("failed to reap child: {}", err);
                }
            });
        if let Err(err) = reaper {
            // child keeps running, only its exit status is lost
            warn!("failed to spawn reaper thread: {}", err);
        }
        true
    }
}
