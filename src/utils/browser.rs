//! Open a URL in the default browser.
//!
//! Used by the CLI authorization prompt. On WSL the Windows browser is used.

use std::process::{Command, Stdio};
use tracing::debug;

/// Whether we run inside WSL (`/proc/version` mentions Microsoft).
fn is_wsl() -> bool {
    std::fs::read_to_string("/proc/version")
        .map(|version| {
            let version = version.to_lowercase();
            version.contains("microsoft") || version.contains("wsl")
        })
        .unwrap_or(false)
}

/// Launchers to try, in order, for this platform.
fn launchers(url: &str, wsl: bool) -> Vec<Command> {
    let mut commands = Vec::new();

    // `cmd /c start` would split the URL at `&`; the protocol handler takes it whole
    if cfg!(target_os = "windows") {
        let mut cmd = Command::new("rundll32");
        cmd.args(["url.dll,FileProtocolHandler", url]);
        commands.push(cmd);
    } else if cfg!(target_os = "macos") {
        let mut cmd = Command::new("open");
        cmd.arg(url);
        commands.push(cmd);
    } else if wsl {
        let mut wslview = Command::new("wslview");
        wslview.arg(url);
        commands.push(wslview);

        // Run from C:\ so Windows does not warn about UNC paths
        let mut cmd = Command::new("rundll32.exe");
        cmd.current_dir("/mnt/c/")
            .args(["url.dll,FileProtocolHandler", url])
            .stderr(Stdio::null());
        commands.push(cmd);
    } else {
        let mut cmd = Command::new("xdg-open");
        cmd.arg(url);
        commands.push(cmd);
    }

    commands
}

/// Open `url` in the default browser. Returns false when no launcher started.
pub fn open_browser(url: &str) -> bool {
    for mut command in launchers(url, is_wsl()) {
        match command.spawn() {
            Ok(_) => return true,
            Err(e) => debug!(
                "[Browser] {:?} failed: {}",
                command.get_program(),
                e
            ),
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launchers_pass_url() {
        let url = "https://api.example.com/v1/oauth/authorize?client_id=x";
        let commands = launchers(url, false);

        assert!(!commands.is_empty());
        assert!(commands
            .iter()
            .all(|cmd| cmd.get_args().any(|arg| arg == url)));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_wsl_prefers_wslview() {
        let commands = launchers("https://example.com", true);
        assert_eq!(commands[0].get_program(), "wslview");
        assert_eq!(commands[1].get_program(), "rundll32.exe");
    }

    #[test]
    fn test_query_string_stays_one_argument() {
        let url = "https://api.example.com/v1/oauth/authorize?client_id=x&response_type=code&state=s";
        for wsl in [false, true] {
            for cmd in launchers(url, wsl) {
                let args: Vec<_> = cmd.get_args().collect();
                assert_eq!(args.last().copied(), Some(std::ffi::OsStr::new(url)));
                assert!(args.iter().all(|arg| *arg != "start"));
                assert_ne!(cmd.get_program(), "cmd");
                assert_ne!(cmd.get_program(), "cmd.exe");
            }
        }
    }
}
