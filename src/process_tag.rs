//! Process identity attached to `Pid` records.
//!
//! Looking up the process name is a syscall, which a real-time writer must
//! not pay for on every `%p`. The tag is resolved once per process and
//! shared by every writer.

use std::fmt;
use lazy_static::lazy_static;

/// Longest process name the kernel reports, without the terminator.
pub const MAX_NAME_LEN: usize = 15;

lazy_static! {
    /// Tag of the current process, resolved on first use.
    static ref PROCESS_TAG: ProcessTag = ProcessTag::resolve();
}

/// A pid and a raw, unterminated process name.
///
/// # Examples
///
/// ```
/// # use event_trace::process_tag::ProcessTag;
/// let tag = ProcessTag::new(42, b"mixer");
/// let payload = tag.encode();
/// assert_eq!(ProcessTag::decode(&payload), Some(tag));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessTag {
    pid: i32,
    name: Vec<u8>,
}

impl ProcessTag {
    pub fn new(pid: i32, name: &[u8]) -> Self {
        let len = name.len().min(MAX_NAME_LEN);
        Self {
            pid,
            name: name[..len].to_vec(),
        }
    }

    /// The cached tag of the running process.
    pub fn current() -> &'static ProcessTag {
        &PROCESS_TAG
    }

    fn resolve() -> Self {
        Self::new(std::process::id() as i32, &process_name())
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn name(&self) -> &[u8] {
        &self.name
    }

    /// Wire payload: little-endian pid followed by the name bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.name.len());
        out.extend_from_slice(&self.pid.to_le_bytes());
        out.extend_from_slice(&self.name);
        out
    }

    pub fn decode(payload: &[u8]) -> Option<Self> {
        let pid = i32::from_le_bytes(payload.get(..4)?.try_into().ok()?);
        Some(Self {
            pid,
            name: payload[4..].to_vec(),
        })
    }
}

impl fmt::Display for ProcessTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<PID: {}, name: {}>", self.pid, String::from_utf8_lossy(&self.name))
    }
}

#[cfg(target_os = "linux")]
fn process_name() -> Vec<u8> {
    let mut buf = [0u8; MAX_NAME_LEN + 1];
    // SAFETY: PR_GET_NAME writes at most 16 bytes, NUL included, into `buf`.
    let rc = unsafe { libc::prctl(libc::PR_GET_NAME, buf.as_mut_ptr() as libc::c_ulong, 0, 0, 0) };
    if rc != 0 {
        return Vec::new();
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(MAX_NAME_LEN);
    buf[..len].to_vec()
}

#[cfg(not(target_os = "linux"))]
fn process_name() -> Vec<u8> {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .map(|s| s.into_bytes())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_is_cached() {
        let first = ProcessTag::current();
        let second = ProcessTag::current();
        assert!(std::ptr::eq(first, second));
        assert_eq!(first.pid(), std::process::id() as i32);
        assert!(first.name().len() <= MAX_NAME_LEN);
    }

    #[test]
    fn test_name_truncated() {
        let tag = ProcessTag::new(1, b"a-very-long-process-name");
        assert_eq!(tag.name(), b"a-very-long-pro");
    }

    #[test]
    fn test_display() {
        assert_eq!(ProcessTag::new(7, b"audio").to_string(), "<PID: 7, name: audio>");
    }

    #[test]
    fn test_decode_short() {
        assert_eq!(ProcessTag::decode(&[1, 2]), None);
        assert_eq!(ProcessTag::decode(&[1, 0, 0, 0]), Some(ProcessTag::new(1, b"")));
    }
}
