use super::unsigned_int::UnsignedInt;
use serde::{ser::SerializeStruct, Deserialize, Deserializer, Serializer};
use std::ops::Range;

pub(crate) fn serialize<S>(range: &Range<u64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let human_readable = serializer.is_human_readable();
    let mut state = serializer.serialize_struct("Range", 2)?;
    if human_readable {
        state.serialize_field("start", format!("{:#x}", range.start).as_str())?;
        state.serialize_field("end", format!("{:#x}", range.end).as_str())?;
    } else {
        state.serialize_field("start", &range.start)?;
        state.serialize_field("end", &range.end)?;
    }
    state.end()
}

#[derive(Deserialize)]
#[serde(rename = "Range", deny_unknown_fields)]
struct HexRange {
    start: UnsignedInt<u64>,
    end: UnsignedInt<u64>,
}

pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Range<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let HexRange {
        start: UnsignedInt(start),
        end: UnsignedInt(end),
    } = HexRange::deserialize(deserializer)?;

    Ok(start..end)
}
