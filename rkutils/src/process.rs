use sysinfo::{Pid, Process, System};
use tracing::{debug, warn};

/// Information about a running process matched by name.
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub pid: u32,
    pub process_name: String,
    pub owner: String,
}

/// Lists every process whose executable name is exactly `name`.
pub fn find_processes_by_name(name: &str) -> Vec<ProcessInfo> {
    let mut system = System::new_all();
    system.refresh_processes();

    system
        .processes_by_exact_name(name)
        .map(build_process_info)
        .collect()
}

/// Force-terminates every process named `name`, except the calling process.
///
/// Returns the number of processes that accepted the kill signal.
pub fn terminate_processes_by_name(name: &str) -> usize {
    let mut system = System::new_all();
    system.refresh_processes();

    let own_pid = Pid::from_u32(std::process::id());
    let mut killed = 0;

    for process in system.processes_by_exact_name(name) {
        if process.pid() == own_pid {
            continue;
        }
        let info = build_process_info(process);
        if process.kill() {
            debug!(
                pid = info.pid,
                name = info.process_name.as_str(),
                owner = info.owner.as_str(),
                "Killed stray process"
            );
            killed += 1;
        } else {
            warn!(
                pid = info.pid,
                name = info.process_name.as_str(),
                "Failed to kill stray process"
            );
        }
    }

    killed
}

fn build_process_info(process: &Process) -> ProcessInfo {
    let owner = process
        .user_id()
        .and_then(|uid| {
            users::get_user_by_uid(**uid).map(|user| user.name().to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "unknown".to_string());

    ProcessInfo {
        pid: process.pid().as_u32(),
        process_name: process.name().to_string(),
        owner,
    }
}
