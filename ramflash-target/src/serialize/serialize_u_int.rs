use serde::Serializer;

/// Constrains the hex serializers to unsigned integers, so that non-human-readable
/// formats still receive the plain number.
pub trait SerializeUnsignedInt {
    fn serialize_int<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer;
}

macro_rules! impl_serialize_unsigned_int {
    ($($ty:ty => $method:ident),* $(,)?) => {
        $(
            impl SerializeUnsignedInt for $ty {
                fn serialize_int<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
                where
                    S: Serializer,
                {
                    serializer.$method(*self)
                }
            }
        )*
    };
}

impl_serialize_unsigned_int! {
    u8 => serialize_u8,
    u16 => serialize_u16,
    u32 => serialize_u32,
    u64 => serialize_u64,
}
