use serde::Serialize;
use std::sync::Mutex;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind, Users};

use crate::error::ScanError;

/// Accounts whose processes are never candidates for tracking.
pub const EXCLUDED_USERS: &[&str] = &[
    "СИСТЕМА",
    "SYSTEM",
    "LOCAL SERVICE",
    "NETWORK SERVICE",
    "DWM-1",
    "UMFD-1",
    "UMFD-0",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessEntry {
    pub name: String,
    pub pid: u32,
}

/// One snapshot of the OS process table per call.
pub trait ProcessScanner: Send + Sync {
    /// All user processes, sorted by pid.
    fn snapshot(&self) -> Result<Vec<ProcessEntry>, ScanError>;

    /// Executable name of `pid`, if it is still alive.
    fn process_name(&self, pid: u32) -> Option<String>;
}

pub fn is_excluded_user(name: &str) -> bool {
    EXCLUDED_USERS.iter().any(|u| u.eq_ignore_ascii_case(name))
}

/// Whether a process owned by `owner` is a tracking candidate. An owner the
/// OS would not disclose (elevated or protected processes) counts as a user.
pub fn is_candidate(owner: Option<&str>) -> bool {
    owner.map_or(true, |name| !is_excluded_user(name))
}

/// [`ProcessScanner`] backed by `sysinfo`.
pub struct SysinfoScanner {
    sys: Mutex<System>,
    users: Mutex<Users>,
}

impl SysinfoScanner {
    pub fn new() -> Self {
        Self {
            sys: Mutex::new(System::new()),
            users: Mutex::new(Users::new_with_refreshed_list()),
        }
    }
}

impl ProcessScanner for SysinfoScanner {
    fn snapshot(&self) -> Result<Vec<ProcessEntry>, ScanError> {
        let mut sys = self.sys.lock().unwrap_or_else(|e| e.into_inner());
        sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::new().with_user(UpdateKind::OnlyIfNotSet),
        );
        if sys.processes().is_empty() {
            return Err(ScanError::EmptyTable);
        }

        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        users.refresh_list();

        let mut entries: Vec<ProcessEntry> = sys
            .processes()
            .iter()
            .filter_map(|(pid, p)| {
                let owner = p.user_id().and_then(|uid| users.get_user_by_id(uid));
                if !is_candidate(owner.map(|u| u.name())) {
                    return None;
                }
                Some(ProcessEntry {
                    name: p.name().to_string_lossy().into_owned(),
                    pid: pid.as_u32(),
                })
            })
            .collect();
        entries.sort_by_key(|e| e.pid);
        Ok(entries)
    }

    fn process_name(&self, pid: u32) -> Option<String> {
        let mut sys = self.sys.lock().unwrap_or_else(|e| e.into_inner());
        let pid = Pid::from_u32(pid);
        sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), false);
        sys.process(pid)
            .map(|p| p.name().to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_accounts_are_excluded() {
        assert!(is_excluded_user("SYSTEM"));
        assert!(is_excluded_user("Local Service"));
        assert!(is_excluded_user("СИСТЕМА"));
        assert!(is_excluded_user("UMFD-0"));
        assert!(!is_excluded_user("alice"));
    }

    #[test]
    fn unknown_owner_is_still_a_candidate() {
        assert!(is_candidate(None));
        assert!(is_candidate(Some("alice")));
        assert!(!is_candidate(Some("NETWORK SERVICE")));
    }

    #[test]
    fn sysinfo_scanner_sees_this_process() {
        let scanner = SysinfoScanner::new();
        let own_pid = std::process::id();
        let name = scanner.process_name(own_pid);
        assert!(name.is_some());
    }

    #[test]
    fn snapshot_is_sorted_by_pid() {
        let scanner = SysinfoScanner::new();
        if let Ok(entries) = scanner.snapshot() {
            assert!(entries.windows(2).all(|w| w[0].pid <= w[1].pid));
        }
    }
}
