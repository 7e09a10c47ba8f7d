//! Loaded driver probes
//!
//! Infers the active graphics module from X server logs and the active
//! wireless driver from syslog. Both probes are best effort: unreadable or
//! missing logs simply produce an empty string.

use regex::Regex;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

fn xorg_module_regex() -> &'static Regex {
    static XORG_MODULE: OnceLock<Regex> = OnceLock::new();
    XORG_MODULE.get_or_init(|| {
        Regex::new(r"(?i)([a-z]*)\(\d+\):\s+depth.*framebuffer").expect("xorg pattern is valid")
    })
}

fn nm_driver_regex() -> &'static Regex {
    static NM_DRIVER: OnceLock<Regex> = OnceLock::new();
    NM_DRIVER.get_or_init(|| {
        Regex::new(r"(?i)\(wlan\d\):.*driver:\s*'([a-z0-9\-]*)").expect("nm pattern is valid")
    })
}

fn legacy_stack_regex() -> &'static Regex {
    static LEGACY_STACK: OnceLock<Regex> = OnceLock::new();
    LEGACY_STACK.get_or_init(|| Regex::new(r"(?i)ieee.*implement").expect("legacy pattern is valid"))
}

/// Reads X server and syslog files below `log_dir`.
#[derive(Debug, Clone)]
pub(crate) struct LoadedDriverProbe {
    log_dir: PathBuf,
    banner_bytes: usize,
}

impl LoadedDriverProbe {
    pub(crate) fn new(log_dir: impl Into<PathBuf>, banner_bytes: usize) -> Self {
        Self {
            log_dir: log_dir.into(),
            banner_bytes,
        }
    }

    /// Graphics module named in the banner of the first matching `Xorg.*.log*`.
    pub(crate) fn graphics_driver(&self) -> String {
        for path in self.logs_matching(is_xorg_log) {
            let banner = match read_prefix(&path, self.banner_bytes) {
                Ok(bytes) => decode_dropping_invalid(&bytes),
                Err(err) => {
                    debug!(path = %path.display(), error = %err, "skipping unreadable X log");
                    continue;
                }
            };

            if let Some(caps) = xorg_module_regex().captures(&banner) {
                let module = caps[1].to_lowercase();
                debug!(path = %path.display(), %module, "graphics module found");
                return module;
            }
        }

        String::new()
    }

    /// Wireless driver from the most recent matching syslog line.
    ///
    /// Every uncompressed `syslog*` file is scanned (sorted by name) until one
    /// yields a match. A NetworkManager `(wlanN): ... driver: 'x'` line gives
    /// the driver name; otherwise an `ieee ... implement` line from the legacy
    /// stack is returned verbatim as an opaque marker.
    pub(crate) fn wireless_driver(&self) -> String {
        for path in self.logs_matching(is_plain_syslog) {
            let content = match fs::read(&path) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(err) => {
                    debug!(path = %path.display(), error = %err, "skipping unreadable syslog");
                    continue;
                }
            };

            if let Some(driver) = wireless_driver_in(&content) {
                debug!(path = %path.display(), %driver, "wireless driver found");
                return driver;
            }
        }

        String::new()
    }

    fn logs_matching(&self, wanted: fn(&str) -> bool) -> Vec<PathBuf> {
        let entries = match fs::read_dir(&self.log_dir) {
            Ok(entries) => entries,
            Err(err) => {
                debug!(dir = %self.log_dir.display(), error = %err, "log directory unavailable");
                return Vec::new();
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .flatten()
            .filter(|entry| wanted(&entry.file_name().to_string_lossy()))
            .map(|entry| entry.path())
            .collect();
        paths.sort();
        paths
    }
}

fn wireless_driver_in(content: &str) -> Option<String> {
    content.lines().rev().find_map(|line| {
        if let Some(caps) = nm_driver_regex().captures(line) {
            Some(caps[1].to_string())
        } else {
            legacy_stack_regex()
                .find(line)
                .map(|m| m.as_str().to_string())
        }
    })
}

/// `Xorg.*.log*`
fn is_xorg_log(name: &str) -> bool {
    name.strip_prefix("Xorg.")
        .is_some_and(|rest| rest.contains(".log"))
}

/// `syslog*`, compressed rotations excluded
fn is_plain_syslog(name: &str) -> bool {
    name.starts_with("syslog") && !name.ends_with(".gz")
}

fn read_prefix(path: &Path, limit: usize) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(limit);
    File::open(path)?.take(limit as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

/// UTF-8 decode that drops invalid byte sequences instead of substituting.
fn decode_dropping_invalid(bytes: &[u8]) -> String {
    bytes.utf8_chunks().map(|chunk| chunk.valid()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &[u8]) {
        fs::write(dir.path().join(name), content).unwrap();
    }

    #[test]
    fn xorg_and_syslog_name_patterns() {
        assert!(is_xorg_log("Xorg.0.log"));
        assert!(is_xorg_log("Xorg.0.log.old"));
        assert!(is_xorg_log("Xorg.1.log"));
        assert!(!is_xorg_log("Xorg.log"));
        assert!(!is_xorg_log("kern.log"));

        assert!(is_plain_syslog("syslog"));
        assert!(is_plain_syslog("syslog.1"));
        assert!(!is_plain_syslog("syslog.2.gz"));
        assert!(!is_plain_syslog("messages"));
    }

    #[test]
    fn invalid_bytes_are_dropped() {
        assert_eq!(decode_dropping_invalid(b"nv\x80idia"), "nvidia");
        assert_eq!(decode_dropping_invalid(b"\xff\xfe"), "");
    }

    #[test]
    fn graphics_driver_from_first_matching_log() {
        let dir = TempDir::new().unwrap();
        write(&dir, "Xorg.0.log", b"X.Org X Server 1.16.4\nRelease Date");
        write(&dir, "Xorg.1.log", b"NVIDIA(0): Depth 24, framebuffer bpp 32\n");
        write(&dir, "Xorg.2.log", b"intel(0): depth 24, framebuffer bpp 32\n");

        let probe = LoadedDriverProbe::new(dir.path(), 64);
        assert_eq!(probe.graphics_driver(), "nvidia");
    }

    #[test]
    fn graphics_banner_read_is_bounded() {
        let dir = TempDir::new().unwrap();
        write(&dir, "Xorg.0.log", b"radeon(0): depth 24, framebuffer bpp 32\n");

        assert_eq!(LoadedDriverProbe::new(dir.path(), 20).graphics_driver(), "");
        assert_eq!(LoadedDriverProbe::new(dir.path(), 64).graphics_driver(), "radeon");
    }

    #[test]
    fn graphics_banner_survives_binary_garbage() {
        let dir = TempDir::new().unwrap();
        write(&dir, "Xorg.0.log", b"\x80fglrx(0): depth 24, \xfeframebuffer\n");

        let probe = LoadedDriverProbe::new(dir.path(), 64);
        assert_eq!(probe.graphics_driver(), "fglrx");
    }

    #[test]
    fn missing_log_dir_yields_empty() {
        let probe = LoadedDriverProbe::new("/nonexistent/ddm-logs", 20);
        assert_eq!(probe.graphics_driver(), "");
        assert_eq!(probe.wireless_driver(), "");
    }

    #[test]
    fn wireless_driver_prefers_most_recent_line() {
        let log = "\
Jan 1 10:00:00 host NetworkManager[1]: <info> (wlan0): driver: 'b43' ...
Jan 1 11:00:00 host NetworkManager[1]: <info> (wlan0): new 802.11 WiFi device (driver: 'wl' ifindex: 3)
Jan 1 11:00:01 host kernel: unrelated line
";
        assert_eq!(wireless_driver_in(log), Some("wl".to_string()));
    }

    #[test]
    fn wireless_legacy_stack_is_an_opaque_marker() {
        let log = "Jan 1 host kernel: ieee80211 phy0: does not implement the request\n";
        assert_eq!(
            wireless_driver_in(log),
            Some("ieee80211 phy0: does not implement".to_string())
        );
    }

    #[test]
    fn wireless_scan_continues_past_files_without_match() {
        let dir = TempDir::new().unwrap();
        write(&dir, "syslog", b"Jan 2 host kernel: nothing here\n");
        write(&dir, "syslog.1", b"Jan 1 host NetworkManager: (wlan1): driver: 'brcmsmac'\n");
        write(&dir, "syslog.2.gz", b"(wlan0): driver: 'compressed'\n");

        let probe = LoadedDriverProbe::new(dir.path(), 20);
        assert_eq!(probe.wireless_driver(), "brcmsmac");
    }

    #[test]
    fn wireless_scan_stops_at_first_matching_file() {
        let dir = TempDir::new().unwrap();
        write(&dir, "syslog", b"(wlan0): driver: 'wl'\n");
        write(&dir, "syslog.1", b"(wlan0): driver: 'b43'\n");

        let probe = LoadedDriverProbe::new(dir.path(), 20);
        assert_eq!(probe.wireless_driver(), "wl");
    }
}
