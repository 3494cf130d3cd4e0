/// Foreground window resolution.
///
/// On Windows this asks `GetForegroundWindow` for the focused window and maps
/// it to its owning pid, and walks the top-level windows with `EnumWindows`
/// to find a process's caption.
///
/// On other platforms both lookups report `ForegroundError::Unavailable`, so
/// the poller still works when exactly one tracked process is running.
use crate::error::ForegroundError;

pub trait ForegroundResolver: Send + Sync {
    /// Pid owning the window that currently has input focus.
    fn foreground_pid(&self) -> Result<u32, ForegroundError>;

    /// Caption of the first visible, titled top-level window owned by `pid`.
    fn window_title(&self, pid: u32) -> Result<String, ForegroundError>;
}

/// The platform resolver.
pub struct OsForeground;

impl ForegroundResolver for OsForeground {
    fn foreground_pid(&self) -> Result<u32, ForegroundError> {
        imp::foreground_pid()
    }

    fn window_title(&self, pid: u32) -> Result<String, ForegroundError> {
        imp::window_title(pid)
    }
}

// ── Windows implementation ────────────────────────────────────────────────────

#[cfg(windows)]
mod imp {
    use windows::Win32::Foundation::{BOOL, HWND, LPARAM};
    use windows::Win32::UI::WindowsAndMessaging::{
        EnumWindows, GetForegroundWindow, GetWindowTextW, GetWindowThreadProcessId,
        IsWindowVisible,
    };

    use crate::error::ForegroundError;

    pub fn foreground_pid() -> Result<u32, ForegroundError> {
        let hwnd = unsafe { GetForegroundWindow() };
        if hwnd.0 == 0 {
            return Err(ForegroundError::Unavailable("no window has focus".into()));
        }
        let mut pid: u32 = 0;
        unsafe { GetWindowThreadProcessId(hwnd, Some(&mut pid)) };
        if pid == 0 {
            return Err(ForegroundError::Unavailable(
                "focused window has no owning process".into(),
            ));
        }
        Ok(pid)
    }

    struct TitleSearch {
        pid: u32,
        title: Option<String>,
    }

    unsafe extern "system" fn enum_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
        let search = &mut *(lparam.0 as *mut TitleSearch);
        if !IsWindowVisible(hwnd).as_bool() {
            return BOOL(1);
        }
        let mut owner: u32 = 0;
        GetWindowThreadProcessId(hwnd, Some(&mut owner));
        if owner != search.pid {
            return BOOL(1);
        }
        let mut buf = [0u16; 512];
        let len = GetWindowTextW(hwnd, &mut buf);
        if len <= 0 {
            return BOOL(1);
        }
        search.title = Some(String::from_utf16_lossy(&buf[..len as usize]));
        BOOL(0) // stop enumeration
    }

    pub fn window_title(pid: u32) -> Result<String, ForegroundError> {
        let mut search = TitleSearch { pid, title: None };
        // EnumWindows reports an error when the callback stops early; the
        // search result is what matters.
        let _ = unsafe {
            EnumWindows(
                Some(enum_callback),
                LPARAM(&mut search as *mut TitleSearch as isize),
            )
        };
        search.title.ok_or(ForegroundError::NoWindow(pid))
    }
}

// ── Other platforms ───────────────────────────────────────────────────────────

#[cfg(not(windows))]
mod imp {
    use crate::error::ForegroundError;

    pub fn foreground_pid() -> Result<u32, ForegroundError> {
        Err(ForegroundError::Unavailable(
            "foreground lookup is only implemented on Windows".into(),
        ))
    }

    pub fn window_title(_pid: u32) -> Result<String, ForegroundError> {
        Err(ForegroundError::Unavailable(
            "window captions are only available on Windows".into(),
        ))
    }
}
