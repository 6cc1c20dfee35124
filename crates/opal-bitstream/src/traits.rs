use crate::error::Result;
use crate::stream::BitStream;

/// Trait for types that can be read from a [`BitStream`].
pub trait FromStream: Sized {
    /// Reads an instance of `Self` from the stream.
    fn read(stream: &mut BitStream) -> Result<Self>;
}

/// Trait for types that can be written to a [`BitStream`].
pub trait ToStream {
    /// Writes this instance to the stream.
    fn write(&self, stream: &mut BitStream) -> Result<()>;
}

macro_rules! impl_primitive_from {
    ($($ty:ty => $method:ident),* $(,)?) => {
        $(
            impl FromStream for $ty {
                #[inline]
                fn read(stream: &mut BitStream) -> Result<Self> {
                    stream.$method()
                }
            }
        )*
    };
}

macro_rules! impl_primitive_to {
    ($($ty:ty => $method:ident),* $(,)?) => {
        $(
            impl ToStream for $ty {
                #[inline]
                fn write(&self, stream: &mut BitStream) -> Result<()> {
                    stream.$method(*self);
                    Ok(())
                }
            }
        )*
    };
}

impl_primitive_from! {
    u8 => read_u8, i8 => read_i8,
    u16 => read_u16, i16 => read_i16,
    u32 => read_u32, i32 => read_i32,
    u64 => read_u64, i64 => read_i64,
    bool => read_bool,
}

impl_primitive_to! {
    u8 => write_u8, i8 => write_i8,
    u16 => write_u16, i16 => write_i16,
    u32 => write_u32, i32 => write_i32,
    u64 => write_u64, i64 => write_i64,
    bool => write_bool,
}

impl FromStream for String {
    #[inline]
    fn read(stream: &mut BitStream) -> Result<Self> {
        stream.read_string()
    }
}

impl ToStream for String {
    #[inline]
    fn write(&self, stream: &mut BitStream) -> Result<()> {
        stream.write_string(self)
    }
}

impl ToStream for &str {
    #[inline]
    fn write(&self, stream: &mut BitStream) -> Result<()> {
        stream.write_string(self)
    }
}
