//! Fixed-width scalar byte conversion with explicit byte order.
//!
//! The wire is big-endian. Conversion goes through the host's native layout
//! and reverses the bytes whenever the requested order differs from the host,
//! so the swap is visible (and testable) instead of hidden in the host order.

/// Largest scalar handled by [`Scalar`].
pub const MAX_SCALAR_SIZE: usize = 8;

/// Byte order of a scalar on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

impl Endian {
    /// Byte order of the machine running this code.
    pub const HOST: Endian = if cfg!(target_endian = "little") {
        Endian::Little
    } else {
        Endian::Big
    };

    /// Whether bytes must be reversed to convert between host order and `self`.
    pub fn needs_swap(self) -> bool {
        self != Self::HOST
    }
}

/// A fixed-width value that can be copied to and from native-order bytes.
pub trait Scalar: Copy + Sized {
    const SIZE: usize;

    /// Writes native-order bytes into `out`, which is exactly `SIZE` long.
    fn write_native(self, out: &mut [u8]);

    /// Reads a value from native-order bytes, exactly `SIZE` long.
    fn read_native(bytes: &[u8]) -> Self;
}

macro_rules! impl_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Scalar for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn write_native(self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_ne_bytes());
                }

                #[inline]
                fn read_native(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_ne_bytes(raw)
                }
            }
        )*
    };
}

impl_scalar!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

/// Encodes `value` into the first `T::SIZE` bytes of `out` using `endian`.
///
/// # Panics
/// Panics if `out` is shorter than `T::SIZE`.
#[inline]
pub fn encode<T: Scalar>(value: T, endian: Endian, out: &mut [u8]) {
    let out = &mut out[..T::SIZE];
    value.write_native(out);
    if endian.needs_swap() {
        out.reverse();
    }
}

/// Decodes a value from the first `T::SIZE` bytes of `bytes` using `endian`.
///
/// # Panics
/// Panics if `bytes` is shorter than `T::SIZE`.
#[inline]
pub fn decode<T: Scalar>(bytes: &[u8], endian: Endian) -> T {
    let mut raw = [0u8; MAX_SCALAR_SIZE];
    let raw = &mut raw[..T::SIZE];
    raw.copy_from_slice(&bytes[..T::SIZE]);
    if endian.needs_swap() {
        raw.reverse();
    }
    T::read_native(raw)
}
