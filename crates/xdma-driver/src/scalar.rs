//! Fixed-width scalar access
//!
//! Every register and single-datum transfer is 1, 2, 4 or 8 bytes wide. The
//! width is a property of the Rust type: only types implementing the sealed
//! [`Scalar`] trait can be used, so a 16-byte register is rejected by the
//! compiler. Runtime widths (CLI flags, PIO buffer lengths) go through
//! [`Width::from_bytes`].

use crate::error::{Result, XdmaError};
use bytemuck::Pod;
use std::fmt::Debug;

/// Supported access widths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Width {
    /// 1 byte
    W8,
    /// 2 bytes
    W16,
    /// 4 bytes
    W32,
    /// 8 bytes
    W64,
}

impl Width {
    /// Width in bytes
    pub const fn bytes(self) -> usize {
        match self {
            Self::W8 => 1,
            Self::W16 => 2,
            Self::W32 => 4,
            Self::W64 => 8,
        }
    }

    /// Map a byte count onto a width
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedWidth` for anything but 1, 2, 4 or 8.
    pub const fn from_bytes(bytes: usize) -> Result<Self> {
        match bytes {
            1 => Ok(Self::W8),
            2 => Ok(Self::W16),
            4 => Ok(Self::W32),
            8 => Ok(Self::W64),
            width => Err(XdmaError::UnsupportedWidth { width }),
        }
    }

    /// Interpret the first `self.bytes()` of `raw` as a native-endian integer
    pub(crate) fn decode(self, raw: &[u8; 8]) -> u64 {
        match self {
            Self::W8 => u64::from(raw[0]),
            Self::W16 => u64::from(u16::from_ne_bytes([raw[0], raw[1]])),
            Self::W32 => u64::from(u32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]])),
            Self::W64 => u64::from_ne_bytes(*raw),
        }
    }

    /// Inverse of [`Width::decode`]; upper bits of `bits` are dropped
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn encode(self, bits: u64) -> [u8; 8] {
        let mut raw = [0u8; 8];
        match self {
            Self::W8 => raw[0] = bits as u8,
            Self::W16 => raw[..2].copy_from_slice(&(bits as u16).to_ne_bytes()),
            Self::W32 => raw[..4].copy_from_slice(&(bits as u32).to_ne_bytes()),
            Self::W64 => raw = bits.to_ne_bytes(),
        }
        raw
    }
}

impl std::fmt::Display for Width {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-bit", self.bytes() * 8)
    }
}

mod private {
    pub trait Sealed {}
}

/// A value that fits one register / one fixed-width access.
///
/// `to_bits`/`from_bits` move the value through a `u64` carrier without
/// changing its bit pattern, so signed and floating-point registers work as
/// well as unsigned ones.
pub trait Scalar: Pod + Default + PartialEq + Debug + Send + Sync + private::Sealed {
    /// Access width of this type
    const WIDTH: Width;

    /// Raw bit pattern, zero-extended
    fn to_bits(self) -> u64;

    /// Rebuild from a bit pattern, keeping the low `WIDTH` bits
    fn from_bits(bits: u64) -> Self;
}

macro_rules! impl_scalar_int {
    ($($ty:ty => $unsigned:ty, $width:ident);* $(;)?) => {$(
        impl private::Sealed for $ty {}

        impl Scalar for $ty {
            const WIDTH: Width = Width::$width;

            #[allow(clippy::cast_sign_loss)]
            fn to_bits(self) -> u64 {
                u64::from(self as $unsigned)
            }

            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            fn from_bits(bits: u64) -> Self {
                bits as $unsigned as $ty
            }
        }
    )*};
}

impl_scalar_int! {
    u8 => u8, W8;
    u16 => u16, W16;
    u32 => u32, W32;
    u64 => u64, W64;
    i8 => u8, W8;
    i16 => u16, W16;
    i32 => u32, W32;
    i64 => u64, W64;
}

impl private::Sealed for f32 {}

impl Scalar for f32 {
    const WIDTH: Width = Width::W32;

    fn to_bits(self) -> u64 {
        u64::from(f32::to_bits(self))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn from_bits(bits: u64) -> Self {
        f32::from_bits(bits as u32)
    }
}

impl private::Sealed for f64 {}

impl Scalar for f64 {
    const WIDTH: Width = Width::W64;

    fn to_bits(self) -> u64 {
        f64::to_bits(self)
    }

    fn from_bits(bits: u64) -> Self {
        f64::from_bits(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_from_bytes() {
        assert_eq!(Width::from_bytes(1).unwrap(), Width::W8);
        assert_eq!(Width::from_bytes(8).unwrap(), Width::W64);
        for bad in [0, 3, 5, 16] {
            assert!(matches!(
                Width::from_bytes(bad),
                Err(XdmaError::UnsupportedWidth { width }) if width == bad
            ));
        }
    }

    #[test]
    fn widths_match_type_sizes() {
        assert_eq!(u8::WIDTH.bytes(), std::mem::size_of::<u8>());
        assert_eq!(i16::WIDTH.bytes(), std::mem::size_of::<i16>());
        assert_eq!(f32::WIDTH.bytes(), std::mem::size_of::<f32>());
        assert_eq!(u64::WIDTH.bytes(), std::mem::size_of::<u64>());
    }

    #[test]
    fn signed_values_keep_their_bit_pattern() {
        assert_eq!((-1i8).to_bits(), 0xFF);
        assert_eq!(i8::from_bits(0xFF), -1);
        assert_eq!(i32::from_bits((-5i32).to_bits()), -5);
        let bits = <f32 as Scalar>::to_bits(1.5);
        assert_eq!(<f32 as Scalar>::from_bits(bits), 1.5);
    }

    #[test]
    fn encode_decode_truncates_to_width() {
        let raw = Width::W16.encode(0x1234_5678);
        assert_eq!(Width::W16.decode(&raw), 0x5678);
        let raw = Width::W64.encode(u64::MAX);
        assert_eq!(Width::W64.decode(&raw), u64::MAX);
    }
}
