//! Versioning of the binary contract between generated code and hosts.
//!
//! Generated units embed the version string they were produced against. A host accepts
//! a unit only if `MAJOR.MINOR` agree and both sides are either release builds or the same
//! development snapshot.
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::fmt::Display;

pub const VERSION_MAJOR: u32 = 2018;
pub const VERSION_MINOR: u32 = 1;
pub const VERSION_MAINTENANCE: u32 = 0;
pub const VERSION_RELEASE: bool = false;

/// Suffix appended to the version string of non-release builds.
pub const DEVELOPMENT_SUFFIX: &str = ".dev0";

macro_rules! version_string {
    ($major:literal, $minor:literal, $maintenance:literal) => {
        concat!(stringify!($major), ".", stringify!($minor), ".", stringify!($maintenance))
    };
}

const RELEASE_VERSION_STRING: &str = version_string!(2018, 1, 0);
const DEVELOPMENT_VERSION_STRING: &str = concat!(version_string!(2018, 1, 0), ".dev0");

/// The interface version this crate implements.
pub const VERSION: Version = Version {
    major: VERSION_MAJOR,
    minor: VERSION_MINOR,
    maintenance: VERSION_MAINTENANCE,
    release: VERSION_RELEASE,
};

/// Returns the human-readable version string, e.g. `2018.1.0.dev0`.
pub fn version_string() -> &'static str {
    if VERSION_RELEASE {
        RELEASE_VERSION_STRING
    } else {
        DEVELOPMENT_VERSION_STRING
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub maintenance: u32,
    pub release: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// The string is not of the form `MAJOR.MINOR.MAINTENANCE[.dev0]`.
    Malformed(String),
    /// `MAJOR.MINOR` of the two sides differ.
    Incompatible { host: Version, generated: Version },
    /// One side is a development build and the other is not.
    ReleaseMismatch { host: Version, generated: Version },
}

impl Display for VersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionError::Malformed(string) => write!(f, "Malformed version string \"{}\".", string),
            VersionError::Incompatible { host, generated } => write!(
                f,
                "Generated code version {} is incompatible with host version {}.",
                generated, host
            ),
            VersionError::ReleaseMismatch { host, generated } => write!(
                f,
                "Refusing to mix development and release builds (host {}, generated {}).",
                host, generated
            ),
        }
    }
}

impl Error for VersionError {}

impl Version {
    pub fn parse(string: &str) -> Result<Self, VersionError> {
        let malformed = || VersionError::Malformed(string.to_string());
        let (numbers, release) = match string.strip_suffix(DEVELOPMENT_SUFFIX) {
            Some(numbers) => (numbers, false),
            None => (string, true),
        };
        let parts: Vec<u32> = numbers
            .split('.')
            .map(|part| part.parse::<u32>().map_err(|_| malformed()))
            .collect::<Result<_, _>>()?;
        match parts.as_slice() {
            &[major, minor, maintenance] => Ok(Self {
                major,
                minor,
                maintenance,
                release,
            }),
            _ => Err(malformed()),
        }
    }

    /// Checks whether generated code built against `generated` may be loaded by a host
    /// built against `self`.
    pub fn check_compatible(&self, generated: &Version) -> Result<(), VersionError> {
        if (self.major, self.minor) != (generated.major, generated.minor) {
            Err(VersionError::Incompatible {
                host: *self,
                generated: *generated,
            })
        } else if self.release != generated.release {
            Err(VersionError::ReleaseMismatch {
                host: *self,
                generated: *generated,
            })
        } else {
            Ok(())
        }
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.maintenance)?;
        if !self.release {
            write!(f, "{}", DEVELOPMENT_SUFFIX)?;
        }
        Ok(())
    }
}

/// Checks the version string embedded in a generated unit against [`VERSION`].
pub fn ensure_compatible(generated_version: &str) -> Result<(), VersionError> {
    let generated = Version::parse(generated_version)?;
    VERSION.check_compatible(&generated)
}
