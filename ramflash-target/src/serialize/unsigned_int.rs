use serde::de::{self, Deserialize, Deserializer, Unexpected, Visitor};
use std::fmt;
use std::marker::PhantomData;

/// An unsigned integer which human readable formats may also give as string.
///
/// Strings starting with `0x` are read as hex, so the output of the hex
/// serializers reads back.
pub(crate) struct UnsignedInt<T>(pub(crate) T);

impl<'de, T: TryFrom<u64>> Deserialize<'de> for UnsignedInt<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let visitor = UnsignedIntVisitor(PhantomData);

        if deserializer.is_human_readable() {
            deserializer.deserialize_any(visitor)
        } else {
            deserializer.deserialize_u64(visitor)
        }
    }
}

struct UnsignedIntVisitor<T>(PhantomData<T>);

impl<'de, T: TryFrom<u64>> Visitor<'de> for UnsignedIntVisitor<T> {
    type Value = UnsignedInt<T>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(
            formatter,
            "an unsigned {}-bit integer or a string holding one",
            std::mem::size_of::<T>() * 8
        )
    }

    fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        T::try_from(value)
            .map(UnsignedInt)
            .map_err(|_| E::invalid_value(Unexpected::Unsigned(value), &self))
    }

    fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        match u64::try_from(value) {
            Ok(value) => self.visit_u64(value),
            Err(_) => Err(E::invalid_value(Unexpected::Signed(value), &self)),
        }
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        let trimmed = value.trim();
        let parsed = match trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => trimmed.parse(),
        };

        match parsed {
            Ok(parsed) => self.visit_u64(parsed),
            Err(_) => Err(E::invalid_value(Unexpected::Str(value), &self)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case("0x3fc80000", 0x3fc8_0000; "unquoted hex")]
    #[test_case("'0x3fc80000'", 0x3fc8_0000; "quoted hex")]
    #[test_case("'0X1F'", 0x1f; "upper case prefix")]
    #[test_case("4096", 4096; "decimal")]
    #[test_case("'4096'", 4096; "quoted decimal")]
    fn reads_numbers_and_strings(yaml: &str, expected: u64) {
        let UnsignedInt(value) = serde_yaml::from_str::<UnsignedInt<u64>>(yaml).unwrap();

        assert_eq!(value, expected);
    }

    #[test_case("'0x100'"; "too large")]
    #[test_case("-1"; "negative")]
    #[test_case("'flash'"; "not a number")]
    fn rejects_invalid_bytes(yaml: &str) {
        assert!(serde_yaml::from_str::<UnsignedInt<u8>>(yaml).is_err());
    }
}
