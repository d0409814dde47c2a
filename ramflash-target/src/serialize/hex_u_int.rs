use super::serialize_u_int::SerializeUnsignedInt;
use super::unsigned_int::UnsignedInt;
use serde::{Deserialize, Deserializer, Serializer};

pub(crate) fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: std::fmt::LowerHex + SerializeUnsignedInt,
{
    // Addresses are easier to read as hex in YAML and friends.
    if serializer.is_human_readable() {
        serializer.serialize_str(&format!("{value:#x}"))
    } else {
        value.serialize_int(serializer)
    }
}

pub(crate) fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<u64>,
{
    UnsignedInt::deserialize(deserializer).map(|UnsignedInt(value)| value)
}
