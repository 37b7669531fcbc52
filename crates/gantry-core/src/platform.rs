use std::process::Command;

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum HostOs {
    Linux,
    MacOs,
    Windows,
}

impl HostOs {
    pub const fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else {
            Self::Linux
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::MacOs => "macos",
            Self::Windows => "windows",
        }
    }
}

/// Operating system facts the verifier gates on.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct HostInfo {
    pub os: HostOs,
    pub os_major_version: Option<u32>,
}

impl HostInfo {
    pub const fn new(os: HostOs, os_major_version: Option<u32>) -> Self {
        Self {
            os,
            os_major_version,
        }
    }

    pub fn detect() -> Self {
        let os = HostOs::current();
        let os_major_version = match os {
            HostOs::MacOs => macos_major_version(),
            _ => None,
        };
        Self::new(os, os_major_version)
    }
}

fn macos_major_version() -> Option<u32> {
    let output = Command::new("sw_vers").arg("-productVersion").output().ok()?;
    if !output.status.success() {
        return None;
    }
    parse_major_version(&String::from_utf8_lossy(&output.stdout))
}

pub fn parse_major_version(raw: &str) -> Option<u32> {
    raw.trim().split('.').next()?.trim().parse::<u32>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_major_version_reads_leading_component() {
        assert_eq!(parse_major_version("14.4.1\n"), Some(14));
        assert_eq!(parse_major_version("13"), Some(13));
        assert_eq!(parse_major_version(""), None);
        assert_eq!(parse_major_version("sonoma"), None);
    }
}
