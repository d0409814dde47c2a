use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning knobs of a [`Flasher`](super::Flasher).
///
/// Timeouts are given in milliseconds in serialized form. Missing fields take
/// their default value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlasherConfig {
    /// Upper bound for the `Init()` routine.
    #[serde(with = "millis")]
    pub init_timeout: Duration,
    /// Upper bound for the `UnInit()` routine.
    #[serde(with = "millis")]
    pub uninit_timeout: Duration,
    /// How long to wait for the core to halt before loading the algorithm.
    #[serde(with = "millis")]
    pub halt_timeout: Duration,
    /// Read back every programmed range and compare it with the source.
    pub verify: bool,
    /// Read back the algorithm image after writing it to RAM.
    pub verify_load: bool,
}

impl Default for FlasherConfig {
    fn default() -> Self {
        Self {
            init_timeout: Duration::from_secs(2),
            uninit_timeout: Duration::from_secs(2),
            halt_timeout: Duration::from_millis(100),
            verify: false,
            verify_load: true,
        }
    }
}

impl FlasherConfig {
    /// Parses a configuration from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
