use super::unsigned_int::UnsignedInt;
use jep106::JEP106Code;
use serde::{ser::SerializeStruct, Deserialize, Deserializer, Serializer};

pub(crate) fn serialize<S>(code: &Option<JEP106Code>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match code {
        Some(code) => serializer.serialize_some(&Jep106Hex(*code)),
        None => serializer.serialize_none(),
    }
}

pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Option<JEP106Code>, D::Error>
where
    D: Deserializer<'de>,
{
    let code = Option::<Jep106Fields>::deserialize(deserializer)?;

    Ok(code.map(
        |Jep106Fields {
             id: UnsignedInt(id),
             cc: UnsignedInt(cc),
         }| JEP106Code { id, cc },
    ))
}

struct Jep106Hex(JEP106Code);

impl serde::Serialize for Jep106Hex {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let human_readable = serializer.is_human_readable();
        let mut state = serializer.serialize_struct("JEP106Code", 2)?;
        if human_readable {
            state.serialize_field("id", format!("{:#x}", self.0.id).as_str())?;
            state.serialize_field("cc", format!("{:#x}", self.0.cc).as_str())?;
        } else {
            state.serialize_field("id", &self.0.id)?;
            state.serialize_field("cc", &self.0.cc)?;
        }
        state.end()
    }
}

#[derive(Deserialize)]
#[serde(rename = "JEP106Code", deny_unknown_fields)]
struct Jep106Fields {
    id: UnsignedInt<u8>,
    cc: UnsignedInt<u8>,
}
