//! Distance subsystem configuration.
//!
//! The surrounding application owns config-file I/O; this module only defines
//! the typed section handed to [`DistanceReader::new`](crate::DistanceReader).

use serde::{Deserialize, Deserializer};

/// Configuration for one distance reader.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DistanceConfig {
    /// Master switch. When false the reader never touches the bus.
    pub enabled: bool,
    /// I2C bus number, i.e. the N in `/dev/i2c-N`.
    pub bus: u8,
    /// Bus address probed by the raw register fallback. Accepts an integer
    /// or a string such as `"0x29"`.
    #[serde(deserialize_with = "de_address")]
    pub address: u8,
}

impl Default for DistanceConfig {
    fn default() -> Self {
        DistanceConfig {
            enabled: true,
            bus: 1,
            address: 0x29,
        }
    }
}

fn de_address<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u8),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Text(s) => {
            let s = s.trim();
            let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => u8::from_str_radix(hex, 16),
                None => s.parse::<u8>(),
            };
            parsed.map_err(|_| serde::de::Error::custom(format!("invalid bus address: {s:?}")))
        }
    }
}
