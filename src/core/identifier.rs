use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::error::IdentifierError;

static ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9A-Fa-f]{2}(?::[0-9A-Fa-f]{2}){5}$|^[0-9A-Fa-f]{2}(?:-[0-9A-Fa-f]{2}){5}$")
        .expect("static regex")
});

/// A validated six-octet hardware address, stored as `AA:BB:CC:DD:EE:FF`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentifier(String);

impl DeviceIdentifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Form used in PulseAudio/PipeWire sink names: `AA_BB_CC_DD_EE_FF`.
    pub fn sink_fragment(&self) -> String {
        self.0.replace(':', "_")
    }
}

impl FromStr for DeviceIdentifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !ADDRESS_RE.is_match(s) {
            return Err(IdentifierError {
                input: s.to_string(),
            });
        }
        Ok(Self(s.replace('-', ":").to_ascii_uppercase()))
    }
}

impl fmt::Display for DeviceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
