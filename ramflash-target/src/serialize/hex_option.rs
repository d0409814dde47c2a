use super::serialize_u_int::SerializeUnsignedInt;
use super::unsigned_int::UnsignedInt;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub(crate) fn serialize<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Serialize + std::fmt::LowerHex + SerializeUnsignedInt,
{
    match value {
        Some(value) if serializer.is_human_readable() => {
            serializer.serialize_some(format!("{value:#x}").as_str())
        }
        Some(value) => serializer.serialize_some(value),
        None => serializer.serialize_none(),
    }
}

pub(crate) fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<u64>,
{
    let value = Option::<UnsignedInt<T>>::deserialize(deserializer)?;
    Ok(value.map(|UnsignedInt(value)| value))
}
