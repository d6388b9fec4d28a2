// ── SFP link view ──

use serde::{Deserialize, Serialize};

/// A current link whose both ends carry an optical transceiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SfpLink {
    pub link_id: i64,
    pub source: SfpPort,
    pub target: SfpPort,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SfpPort {
    pub device_id: i64,
    pub device_ip: String,
    pub interface_id: i64,
    pub interface_name: String,
    pub model_name: String,
    pub serial_number: String,
    pub rx_power: String,
    pub rx_power_limit: Vec<String>,
    pub tx_power: String,
    pub tx_power_limit: Vec<String>,
    pub temperature_c: String,
    pub temperature_f: String,
    pub temperature_limit_c: String,
    pub temperature_limit_f: String,
    pub voltage: String,
    pub wavelength: String,
}

/// Convert a Celsius reading to Fahrenheit with one decimal.
///
/// Readings that are not numbers yield `None`.
pub fn celsius_to_fahrenheit(celsius: &str) -> Option<String> {
    let c: f64 = celsius.trim().parse().ok()?;
    Some(format!("{:.1}", c * 9.0 / 5.0 + 32.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_numeric_readings() {
        assert_eq!(celsius_to_fahrenheit("0").as_deref(), Some("32.0"));
        assert_eq!(celsius_to_fahrenheit(" 41.5 ").as_deref(), Some("106.7"));
        assert_eq!(celsius_to_fahrenheit("-40").as_deref(), Some("-40.0"));
        assert_eq!(celsius_to_fahrenheit("n/a"), None);
        assert_eq!(celsius_to_fahrenheit(""), None);
    }
}
