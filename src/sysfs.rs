//! Shared sysfs probe/write helper (§6.5, §7 kind 4).
//!
//! Used by both the TKLock input-policy machine (C7, §4.4.11) and the
//! charging evaluator (C9) to write a short ASCII literal to a
//! write-only control file discovered by probing a fixed candidate path
//! list. Grounded on the teacher's "probe once, disable silently on
//! failure" capability-detection discipline (`drivers/hw_init.rs`:
//! peripheral init that logs once and continues in a degraded mode
//! rather than propagating a hard failure up the stack).

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::warn;

use crate::error::SysfsError;

/// A control file discovered once from a list of candidate paths, then
/// reused. Once discovery fails, every subsequent write is a silent
/// no-op after the first warning (§7: "disable the corresponding
/// feature path silently after one warning").
pub struct SysfsControl {
    label: &'static str,
    candidates: Vec<PathBuf>,
    discovered: Option<PathBuf>,
    warned: bool,
}

impl SysfsControl {
    pub fn new(label: &'static str, candidates: Vec<PathBuf>) -> Self {
        Self {
            label,
            candidates,
            discovered: None,
            warned: false,
        }
    }

    /// Probe the candidate list for the first path that exists and is
    /// writable. Idempotent; re-running after a prior failure retries
    /// discovery (a file may appear after a driver loads later).
    pub fn discover(&mut self) {
        if self.discovered.is_some() {
            return;
        }
        for candidate in &self.candidates {
            if OpenOptions::new().write(true).open(candidate).is_ok() {
                self.discovered = Some(candidate.clone());
                return;
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.discovered.is_some()
    }

    fn path(&self) -> Option<&Path> {
        self.discovered.as_deref()
    }

    /// Truncate-then-write `value` as whole-file ASCII content (§6.5).
    /// Failure disables the control silently after a single warning;
    /// the caller's next evaluation sees `is_available() == false` and
    /// treats the feature as unavailable rather than retrying.
    pub fn write(&mut self, value: &str) -> Result<(), SysfsError> {
        self.discover();
        let Some(path) = self.path() else {
            if !self.warned {
                warn!("sysfs '{}': no candidate path was writable", self.label);
                self.warned = true;
            }
            return Err(SysfsError::NotDiscovered);
        };
        let result = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(path)
            .and_then(|mut f| f.write_all(value.as_bytes()));
        if let Err(e) = result {
            if !self.warned {
                warn!(
                    "sysfs '{}': write to {} failed: {}, disabling",
                    self.label,
                    path.display(),
                    e
                );
                self.warned = true;
            }
            self.discovered = None;
            return Err(SysfsError::WriteFailed(path.display().to_string(), e.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_candidates_yield_not_discovered() {
        let mut ctl = SysfsControl::new(
            "test",
            vec![PathBuf::from("/nonexistent/a"), PathBuf::from("/nonexistent/b")],
        );
        assert!(matches!(ctl.write("1"), Err(SysfsError::NotDiscovered)));
        assert!(!ctl.is_available());
    }

    #[test]
    fn writes_whole_file_truncated() {
        let dir = std::env::temp_dir().join(format!("mce-sysfs-test-{}", std::process::id()));
        std::fs::write(&dir, "stale-content-longer-than-new").unwrap();
        let mut ctl = SysfsControl::new("test", vec![dir.clone()]);
        ctl.write("1").unwrap();
        let content = std::fs::read_to_string(&dir).unwrap();
        assert_eq!(content, "1");
        std::fs::remove_file(&dir).ok();
    }
}
