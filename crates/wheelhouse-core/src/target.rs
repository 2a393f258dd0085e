//! Resolution targets: a platform plus a Python 3 interpreter version.

use std::fmt;
use std::str::FromStr;

use wheelhouse_util::errors::WheelhouseError;

use crate::marker::MarkerEnvironment;
use crate::version::Version;

/// CPU architecture of a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Arch {
    X86,
    X86_64,
    Aarch64,
}

/// Operating system of a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Os {
    Linux,
    Windows,
    Darwin,
}

impl Arch {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "x86_64" | "amd64" => Some(Self::X86_64),
            "x86" | "i686" => Some(Self::X86),
            "aarch64" | "arm64" => Some(Self::Aarch64),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::X86 => "x86",
            Self::X86_64 => "x86_64",
            Self::Aarch64 => "aarch64",
        }
    }
}

impl Os {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "linux" => Some(Self::Linux),
            "windows" | "windows64" => Some(Self::Windows),
            "darwin" | "macos" => Some(Self::Darwin),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Windows => "windows",
            Self::Darwin => "darwin",
        }
    }
}

/// A platform such as `x86_64-linux` or `aarch64-darwin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Platform {
    pub arch: Arch,
    pub os: Os,
}

impl Platform {
    pub fn new(arch: Arch, os: Os) -> Self {
        Self { arch, os }
    }

    /// Parse `<arch>-<os>`.
    pub fn parse(tag: &str) -> Result<Self, WheelhouseError> {
        let unknown = || WheelhouseError::Config {
            message: format!("unsupported platform `{tag}` (expected <arch>-<os>, e.g. x86_64-linux)"),
        };
        let (arch, os) = tag.trim().split_once('-').ok_or_else(unknown)?;
        Ok(Self {
            arch: Arch::parse(arch).ok_or_else(unknown)?,
            os: Os::parse(os).ok_or_else(unknown)?,
        })
    }

    /// Value of `platform.machine()` on this platform.
    fn machine(self) -> &'static str {
        match (self.os, self.arch) {
            (Os::Windows, Arch::X86_64) => "AMD64",
            (Os::Windows, Arch::X86) => "x86",
            (Os::Windows, Arch::Aarch64) => "ARM64",
            (Os::Darwin, Arch::X86_64) => "x86_64",
            (Os::Darwin, Arch::X86) => "i386",
            (Os::Darwin, Arch::Aarch64) => "arm64",
            (Os::Linux, Arch::X86_64) => "x86_64",
            (Os::Linux, Arch::X86) => "i686",
            (Os::Linux, Arch::Aarch64) => "aarch64",
        }
    }

    /// Whether a wheel platform tag (`manylinux2014_x86_64`, `win_amd64`,
    /// `macosx_11_0_arm64`, `any`, ...) runs on this platform.
    pub fn supports_tag(self, tag: &str) -> bool {
        if tag == "any" {
            return true;
        }
        match self.os {
            Os::Linux => {
                let machine = self.machine();
                tag.strip_prefix("linux_") == Some(machine)
                    || (tag.starts_with("manylinux")
                        && tag.strip_suffix(machine).is_some_and(|p| p.ends_with('_')))
            }
            Os::Windows => {
                let expected = match self.arch {
                    Arch::X86_64 => "win_amd64",
                    Arch::X86 => "win32",
                    Arch::Aarch64 => "win_arm64",
                };
                tag == expected
            }
            Os::Darwin => {
                if !tag.starts_with("macosx_") {
                    return false;
                }
                let suffixes: &[&str] = match self.arch {
                    Arch::X86_64 => &["_x86_64", "_intel", "_universal", "_universal2"],
                    Arch::Aarch64 => &["_arm64", "_universal2"],
                    Arch::X86 => &["_i386", "_intel", "_universal"],
                };
                suffixes.iter().any(|s| tag.ends_with(s))
            }
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.arch.as_str(), self.os.as_str())
    }
}

impl FromStr for Platform {
    type Err = WheelhouseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A Python 3 interpreter version, `3.<minor>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PythonVersion {
    pub minor: u32,
}

impl PythonVersion {
    pub fn new(minor: u32) -> Self {
        Self { minor }
    }

    /// As a PEP 440 version, for `requires_python` checks.
    pub fn as_version(self) -> Version {
        Version::from_release(&[3, u64::from(self.minor), 0])
    }

    /// Whether a wheel built for interpreter tag `python` with ABI tag `abi`
    /// loads into this interpreter.
    pub fn supports(self, python: &str, abi: &str) -> bool {
        let minor_of = |tag: &str, prefix: &str| -> Option<u32> {
            tag.strip_prefix(prefix)?.parse().ok()
        };
        let own_cp = format!("cp3{}", self.minor);
        match abi {
            "none" => {
                python == "py3"
                    || python == own_cp
                    || minor_of(python, "py3").is_some_and(|m| m <= self.minor)
            }
            "abi3" => minor_of(python, "cp3").is_some_and(|m| m <= self.minor),
            _ => {
                python == own_cp
                    && abi
                        .strip_prefix(own_cp.as_str())
                        .is_some_and(|flags| flags.is_empty() || flags == "m" || flags == "d")
            }
        }
    }
}

impl fmt::Display for PythonVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "3.{}", self.minor)
    }
}

impl FromStr for PythonVersion {
    type Err = WheelhouseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .strip_prefix("3.")
            .and_then(|minor| minor.parse().ok())
            .map(Self::new)
            .ok_or_else(|| WheelhouseError::Config {
                message: format!("unsupported Python version `{s}` (expected 3.<minor>)"),
            })
    }
}

/// One (platform, interpreter) pair the closure is computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Target {
    pub platform: Platform,
    pub python: PythonVersion,
}

impl Target {
    pub fn new(platform: Platform, python: PythonVersion) -> Self {
        Self { platform, python }
    }

    /// Marker variable values for this target, as CPython would report them.
    pub fn marker_environment(&self) -> MarkerEnvironment {
        let (sys_platform, platform_system, os_name) = match self.platform.os {
            Os::Linux => ("linux", "Linux", "posix"),
            Os::Windows => ("win32", "Windows", "nt"),
            Os::Darwin => ("darwin", "Darwin", "posix"),
        };
        MarkerEnvironment {
            python_version: self.python.to_string(),
            python_full_version: format!("{}.0", self.python),
            implementation_name: "cpython".into(),
            platform_python_implementation: "CPython".into(),
            os_name: os_name.into(),
            sys_platform: sys_platform.into(),
            platform_system: platform_system.into(),
            platform_machine: self.platform.machine().into(),
            platform_release: String::new(),
            platform_version: String::new(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-py{}", self.platform, self.python)
    }
}
