//! Capabilities self-reported by the CMake binary.
//!
//! `cmake -E capabilities` prints a JSON document describing the build
//! tool: its version triple and the generators it can drive. Parsing is
//! a pure function over that text so it can be exercised without
//! spawning anything.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CapabilityInfo {
    /// Zero means the version is unknown (probe never succeeded).
    pub version_major: u32,
    pub version_minor: u32,
    pub version_patch: u32,
    /// Generator names in the order the tool reported them.
    pub generators: Vec<String>,
}

impl CapabilityInfo {
    pub fn is_known(&self) -> bool {
        self.version_major != 0
    }

    pub fn version_string(&self) -> String {
        format!(
            "{}.{}.{}",
            self.version_major, self.version_minor, self.version_patch
        )
    }
}

// Wire shape of the capabilities document. Unknown fields are ignored,
// so newer tool versions with extra keys still parse.
#[derive(Deserialize)]
struct RawCapabilities {
    version: RawVersion,
    #[serde(default)]
    generators: Vec<RawGenerator>,
}

#[derive(Deserialize)]
struct RawVersion {
    #[serde(default)]
    major: u32,
    #[serde(default)]
    minor: u32,
    #[serde(default)]
    patch: u32,
}

#[derive(Deserialize)]
struct RawGenerator {
    name: String,
}

/// Parse the tool's capability report.
///
/// Returns `None` when the text is not a well-formed capabilities
/// document, e.g. because the probing process was killed before it
/// finished writing. Deterministic: the same input always yields the
/// same result.
pub fn parse_capabilities(raw: &str) -> Option<CapabilityInfo> {
    let parsed: RawCapabilities = serde_json::from_str(raw).ok()?;
    Some(CapabilityInfo {
        version_major: parsed.version.major,
        version_minor: parsed.version.minor,
        version_patch: parsed.version.patch,
        generators: parsed.generators.into_iter().map(|g| g.name).collect(),
    })
}
