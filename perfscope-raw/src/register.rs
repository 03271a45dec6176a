//! Typed configuration words
//!
//! perf_event `config` values for uncore and interconnect PMUs are packed
//! bitfields. [`ConfigLayout`] gives them a structured representation that
//! converts losslessly to and from the raw 64-bit word handed to the kernel.

/// Trait for bit-packed configuration words
///
/// # Example
///
/// ```ignore
/// use perfscope_raw::register::ConfigLayout;
///
/// #[derive(Debug, Default)]
/// struct RawEvent {
///     event: u16,
///     filter: u8,
/// }
///
/// impl ConfigLayout for RawEvent {
///     fn to_config(&self) -> u64 {
///         (self.event as u64) | ((self.filter as u64) << 16)
///     }
///
///     fn from_config(value: u64) -> Self {
///         Self {
///             event: (value & 0xFFFF) as u16,
///             filter: ((value >> 16) & 0xFF) as u8,
///         }
///     }
/// }
/// ```
pub trait ConfigLayout: Sized {
    /// Pack this layout into the raw `perf_event_attr.config` value
    fn to_config(&self) -> u64;

    /// Unpack a raw `perf_event_attr.config` value
    fn from_config(value: u64) -> Self;

    /// Validate that every field fits its bitfield
    ///
    /// Returns `Ok(())` if valid, or an error message if invalid.
    fn validate(&self) -> Result<(), &'static str> {
        Ok(())
    }
}

/// Extract `width` bits of `value` starting at bit `shift`.
#[inline]
pub fn field(value: u64, shift: u32, width: u32) -> u64 {
    (value >> shift) & mask(width)
}

/// Place the low `width` bits of `value` at bit `shift`.
#[inline]
pub fn place(value: u64, shift: u32, width: u32) -> u64 {
    (value & mask(width)) << shift
}

#[inline]
fn mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_place_truncates_to_width() {
        assert_eq!(place(0x1FF, 16, 8), 0xFF << 16);
        assert_eq!(place(1, 31, 1), 0x8000_0000);
    }

    #[test]
    fn test_field_extracts_bits() {
        let value = 0x0000_1234_80AB_0005u64;
        assert_eq!(field(value, 0, 16), 0x0005);
        assert_eq!(field(value, 16, 8), 0xAB);
        assert_eq!(field(value, 31, 1), 1);
        assert_eq!(field(value, 32, 16), 0x1234);
    }
}
