use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, PoisonError};

use gantry_core::inhibitor::NoopInhibitor;
use gantry_core::platform::HostOs;
use gantry_core::ports::DisplayInhibitor;
use gantry_core::wrappers::resolve_wrapper_executable;

/// Holds a helper process for as long as the display must stay awake:
/// `systemd-inhibit` on Linux, `caffeinate` on macOS.
pub struct HelperInhibitor {
    program: String,
    args: Vec<String>,
    child: Mutex<Option<Child>>,
}

impl HelperInhibitor {
    fn new(program: String, args: &[&str]) -> Self {
        Self {
            program,
            args: args.iter().map(|arg| arg.to_string()).collect(),
            child: Mutex::new(None),
        }
    }
}

impl DisplayInhibitor for HelperInhibitor {
    fn inhibit(&self) -> Result<(), String> {
        let mut child = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        if child.is_some() {
            return Ok(());
        }

        let spawned = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| format!("failed to start {}: {err}", self.program))?;
        *child = Some(spawned);
        Ok(())
    }

    fn uninhibit(&self) {
        let mut child = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(mut running) = child.take() {
            let _ = running.kill();
            let _ = running.wait();
        }
    }
}

impl Drop for HelperInhibitor {
    fn drop(&mut self) {
        self.uninhibit();
    }
}

pub fn host_inhibitor(os: HostOs) -> Arc<dyn DisplayInhibitor> {
    let helper = match os {
        HostOs::Linux => resolve_wrapper_executable("systemd-inhibit").map(|program| {
            HelperInhibitor::new(
                program,
                &[
                    "--what=idle:sleep",
                    "--who=gantry",
                    "--why=Game running",
                    "--mode=block",
                    "sleep",
                    "infinity",
                ],
            )
        }),
        HostOs::MacOs => resolve_wrapper_executable("caffeinate")
            .map(|program| HelperInhibitor::new(program, &["-d", "-i"])),
        HostOs::Windows => None,
    };

    match helper {
        Some(helper) => Arc::new(helper),
        None => Arc::new(NoopInhibitor),
    }
}
