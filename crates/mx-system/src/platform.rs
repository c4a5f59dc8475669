//! Platform probing.
//!
//! Platform identifiers use the conventional runtime spelling (`darwin`,
//! `linux`, `openbsd`, `sunos5`, `win32`, `cygwin`). Matching is by prefix so
//! versioned identifiers such as `openbsd7` or `linux2` are recognised.

use std::fmt;

use crate::error::{Result, SystemError};

/// Canonical operating system identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    Darwin,
    Linux,
    OpenBsd,
    Solaris,
    Windows,
    Cygwin,
}

impl Os {
    /// Resolve a platform identifier. Prefixes are tried in a fixed order and
    /// there is no fallback.
    pub fn from_platform(platform: &str) -> Result<Os> {
        if is_darwin(platform) {
            Ok(Os::Darwin)
        } else if is_linux(platform) {
            Ok(Os::Linux)
        } else if is_openbsd(platform) {
            Ok(Os::OpenBsd)
        } else if is_sunos(platform) {
            Ok(Os::Solaris)
        } else if is_windows(platform) {
            Ok(Os::Windows)
        } else if is_cygwin(platform) {
            Ok(Os::Cygwin)
        } else {
            Err(SystemError::UnsupportedPlatform(platform.to_string()))
        }
    }

    /// Canonical name
    pub fn name(self) -> &'static str {
        match self {
            Os::Darwin => "darwin",
            Os::Linux => "linux",
            Os::OpenBsd => "openbsd",
            Os::Solaris => "solaris",
            Os::Windows => "windows",
            Os::Cygwin => "cygwin",
        }
    }

    pub fn is_windows(self) -> bool {
        self == Os::Windows
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Platform identifier of the running binary.
pub fn current_platform() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        "linux" | "android" => "linux",
        "openbsd" => "openbsd",
        "solaris" | "illumos" => "sunos5",
        "windows" => "win32",
        other => other,
    }
}

/// Canonical OS of the running binary.
pub fn get_os() -> Result<Os> {
    Os::from_platform(current_platform())
}

pub fn is_darwin(platform: &str) -> bool {
    platform.starts_with("darwin")
}

pub fn is_linux(platform: &str) -> bool {
    platform.starts_with("linux")
}

pub fn is_openbsd(platform: &str) -> bool {
    platform.starts_with("openbsd")
}

pub fn is_sunos(platform: &str) -> bool {
    platform.starts_with("sunos")
}

pub fn is_windows(platform: &str) -> bool {
    platform.starts_with("win32")
}

pub fn is_cygwin(platform: &str) -> bool {
    platform.starts_with("cygwin")
}

/// Whether ANSI color sequences are honoured by terminals on `platform`.
pub fn supports_ansi(platform: &str) -> bool {
    is_linux(platform) || platform == "darwin" || platform.starts_with("freebsd")
}

/// Number of CPUs available, clamped to `cap` when one is configured.
pub fn cpu_count(cap: Option<usize>) -> usize {
    let cpus = num_cpus::get();
    match cap {
        Some(cap) if cap > 0 => cpus.min(cap),
        _ => cpus,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_platforms() {
        let cases = [
            ("darwin", Os::Darwin),
            ("linux", Os::Linux),
            ("linux2", Os::Linux),
            ("openbsd7", Os::OpenBsd),
            ("sunos5", Os::Solaris),
            ("win32", Os::Windows),
            ("cygwin", Os::Cygwin),
        ];
        for (platform, expected) in cases {
            assert_eq!(Os::from_platform(platform).unwrap(), expected, "{platform}");
        }
    }

    #[test]
    fn test_canonical_names() {
        assert_eq!(Os::Solaris.name(), "solaris");
        assert_eq!(Os::Windows.to_string(), "windows");
        assert_eq!(Os::OpenBsd.to_string(), "openbsd");
    }

    #[test]
    fn test_unknown_platform_is_an_error() {
        for platform in ["freebsd13", "haiku", "", "Linux"] {
            match Os::from_platform(platform) {
                Err(SystemError::UnsupportedPlatform(p)) => assert_eq!(p, platform),
                other => panic!("expected error for {platform:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_current_platform_resolves() {
        let os = get_os().unwrap();
        if cfg!(target_os = "linux") {
            assert_eq!(os, Os::Linux);
        }
        if cfg!(target_os = "macos") {
            assert_eq!(os, Os::Darwin);
        }
        if cfg!(windows) {
            assert_eq!(os, Os::Windows);
        }
    }

    #[test]
    fn test_supports_ansi() {
        assert!(supports_ansi("linux"));
        assert!(supports_ansi("darwin"));
        assert!(!supports_ansi("win32"));
        assert!(!supports_ansi("cygwin"));
    }

    #[test]
    fn test_cpu_count_cap() {
        let all = cpu_count(None);
        assert!(all >= 1);
        assert_eq!(cpu_count(Some(1)), 1);
        assert_eq!(cpu_count(Some(all + 16)), all);
        assert_eq!(cpu_count(Some(0)), all);
    }
}
