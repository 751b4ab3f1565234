//! Opportunistic shellouts to well-known local CLIs (`pdftotext`).
//!
//! Goals:
//! - **Opportunistic**: use tools when present.
//! - **Bounded**: timeouts + output caps to avoid hangs/huge output.
//! - **Quiet**: the child's stderr is discarded so tool chatter never reaches our stdout.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

pub fn which(bin: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path) {
        let cand = dir.join(bin);
        if cand.is_file() {
            return Some(cand);
        }
        if cfg!(windows) {
            let cand = dir.join(format!("{bin}.exe"));
            if cand.is_file() {
                return Some(cand);
            }
        }
    }
    None
}

pub fn has(bin: &str) -> bool {
    which(bin).is_some()
}

/// Run a command and capture stdout (bounded) with a coarse timeout.
///
/// stdout is drained on a helper thread so a chatty child cannot block on a full pipe.
pub fn run_stdout_bounded(
    mut cmd: Command,
    timeout: Duration,
    max_stdout_bytes: usize,
) -> Result<Vec<u8>, &'static str> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            "shellout_tool_not_found"
        } else {
            "shellout_spawn_failed"
        }
    })?;

    let stdout = child.stdout.take().ok_or("shellout_no_stdout")?;
    let reader = std::thread::spawn(move || {
        let mut stdout = stdout;
        let mut out = Vec::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = stdout.read(&mut buf)?;
            if n == 0 {
                return Ok::<_, std::io::Error>(out);
            }
            // Keep draining past the cap so the child never blocks on a full pipe.
            let room = max_stdout_bytes.saturating_sub(out.len());
            out.extend_from_slice(&buf[..n.min(room)]);
        }
    });

    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().map_err(|_| "shellout_wait_failed")? {
            if !status.success() {
                return Err("shellout_nonzero_exit");
            }
            break;
        }
        if start.elapsed() > timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err("shellout_timeout");
        }
        std::thread::sleep(Duration::from_millis(25));
    }

    reader
        .join()
        .map_err(|_| "shellout_read_failed")?
        .map_err(|_| "shellout_read_failed")
}

pub fn write_temp_file(bytes: &[u8], suffix: &str) -> Result<tempfile::NamedTempFile, &'static str> {
    let mut tmp = tempfile::Builder::new()
        .prefix("pdfscope-")
        .suffix(suffix)
        .tempfile()
        .map_err(|_| "shellout_tempfile_failed")?;
    use std::io::Write;
    tmp.write_all(bytes)
        .map_err(|_| "shellout_tempfile_write_failed")?;
    Ok(tmp)
}

/// One page of text via poppler's `pdftotext`.
pub fn pdftotext_page(
    pdf: &Path,
    page: u32,
    timeout: Duration,
    max_bytes: usize,
) -> Result<String, &'static str> {
    let mut cmd = Command::new("pdftotext");
    let page = page.to_string();
    cmd.args(["-f", &page, "-l", &page, "-layout", "-nopgbrk", "-enc", "UTF-8"])
        .arg(pdf)
        .arg("-");
    let out = run_stdout_bounded(cmd, timeout, max_bytes)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tool_is_reported_not_panicked() {
        let cmd = Command::new("pdfscope-definitely-not-a-real-binary");
        assert_eq!(
            run_stdout_bounded(cmd, Duration::from_secs(1), 1024),
            Err("shellout_tool_not_found")
        );
        assert!(!has("pdfscope-definitely-not-a-real-binary"));
    }

    #[cfg(unix)]
    #[test]
    fn stdout_is_capped() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "printf 'abcdefghij'"]);
        let out = run_stdout_bounded(cmd, Duration::from_secs(5), 4).unwrap();
        assert_eq!(out, b"abcd");
    }

    #[cfg(unix)]
    #[test]
    fn slow_child_times_out() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 5"]);
        assert_eq!(
            run_stdout_bounded(cmd, Duration::from_millis(100), 16),
            Err("shellout_timeout")
        );
    }

    #[test]
    fn temp_file_keeps_suffix_and_bytes() {
        let tmp = write_temp_file(b"%PDF-1.4", ".pdf").unwrap();
        assert!(tmp.path().to_string_lossy().ends_with(".pdf"));
        assert_eq!(std::fs::read(tmp.path()).unwrap(), b"%PDF-1.4");
    }
}
