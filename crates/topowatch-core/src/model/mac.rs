// ── MAC address normalisation ──
//
// Discovery backends report MACs in whatever shape the device firmware
// uses. Project devices always store the upper-case dash form
// (AA-BB-CC-DD-EE-FF) so equality checks are plain string compares.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// MAC address, normalized to upper-case dash-separated format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress(String);

impl MacAddress {
    /// Parse any common format: colon-separated, dash-separated,
    /// dotted (Cisco style) or bare hex.
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, CoreError> {
        let raw = raw.as_ref();
        let hex: String = raw
            .chars()
            .filter(|c| !matches!(c, ':' | '-' | '.'))
            .collect();

        if hex.len() != 12 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CoreError::ValidationFailed {
                message: format!("invalid MAC address: {raw}"),
            });
        }

        let upper = hex.to_ascii_uppercase();
        let pairs: Vec<&str> = (0..6).filter_map(|i| upper.get(i * 2..i * 2 + 2)).collect();
        Ok(Self(pairs.join("-")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MacAddress {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MacAddress {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_colons_and_case() {
        let mac = MacAddress::parse("00:90:e8:aa:bb:cc").unwrap();
        assert_eq!(mac.as_str(), "00-90-E8-AA-BB-CC");
    }

    #[test]
    fn normalizes_cisco_dotted() {
        let mac: MacAddress = "0090.e8aa.bbcc".parse().unwrap();
        assert_eq!(mac.to_string(), "00-90-E8-AA-BB-CC");
    }

    #[test]
    fn rejects_short_or_non_hex() {
        assert!(MacAddress::parse("00:90:e8").is_err());
        assert!(MacAddress::parse("zz:90:e8:aa:bb:cc").is_err());
        assert!(MacAddress::parse("").is_err());
    }
}
