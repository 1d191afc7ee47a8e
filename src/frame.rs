//! Module: frame
//!
//! Purpose: Decode a completed 24-bit caliper frame into a signed physical value.
//!
//! Frame layout (bit 0 is the first bit clocked out by the caliper):
//! ```text
//!  23   22..21   20     19 ........................ 0
//! [unit][  --  ][sign][           magnitude           ]
//! ```
//!
//! - unit: 0 = millimeters (0.01 mm steps), 1 = inches (0.0005 in steps)
//! - sign: 1 = negative
//!
//! Safety: Safe. Pure functions, no state, no I/O.

/// Number of clock cycles in one frame.
pub const FRAME_BITS: u8 = 24;

/// Mask of the bits a frame can occupy.
pub const FRAME_MASK: u32 = 0x00FF_FFFF;

/// Mask of the magnitude field (bits 0-19).
pub const MAGNITUDE_MASK: u32 = 0x000F_FFFF;

const SIGN_BIT: u32 = 20;
const UNIT_BIT: u32 = 23;

/// Counts per millimeter (0.01 mm resolution).
const MM_DIVISOR: f64 = 100.0;

/// Counts per inch (0.0005 in resolution).
const INCH_DIVISOR: f64 = 2000.0;

/// Measurement unit reported by the caliper.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unit {
    Millimeters,
    Inches,
}

impl Unit {
    /// Short unit suffix for display.
    pub fn as_str(self) -> &'static str {
        match self {
            Unit::Millimeters => "mm",
            Unit::Inches => "in",
        }
    }

    /// Smallest step the caliper can report in this unit.
    pub fn resolution(self) -> f64 {
        1.0 / self.divisor()
    }

    /// Decimal places needed to show one resolution step.
    pub fn decimals(self) -> usize {
        match self {
            Unit::Millimeters => 2,
            Unit::Inches => 4,
        }
    }

    fn divisor(self) -> f64 {
        match self {
            Unit::Millimeters => MM_DIVISOR,
            Unit::Inches => INCH_DIVISOR,
        }
    }
}

impl core::fmt::Display for Unit {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw 24-bit frame as shifted in by the edge handler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RawFrame(u32);

impl RawFrame {
    /// Wrap a raw sample. Bits above 23 are discarded.
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw & FRAME_MASK)
    }

    /// Build a frame from its fields. Magnitude is truncated to 20 bits.
    pub const fn from_parts(unit: Unit, magnitude: u32, negative: bool) -> Self {
        let mut raw = magnitude & MAGNITUDE_MASK;
        if negative {
            raw |= 1 << SIGN_BIT;
        }
        if let Unit::Inches = unit {
            raw |= 1 << UNIT_BIT;
        }
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn unit(self) -> Unit {
        if (self.0 >> UNIT_BIT) & 1 == 1 {
            Unit::Inches
        } else {
            Unit::Millimeters
        }
    }

    #[inline]
    pub const fn magnitude(self) -> u32 {
        self.0 & MAGNITUDE_MASK
    }

    #[inline]
    pub const fn is_negative(self) -> bool {
        (self.0 >> SIGN_BIT) & 1 == 1
    }

    /// Decode into unit and signed value.
    #[inline]
    pub fn decode(self) -> Measurement {
        decode(self.0)
    }
}

impl From<u32> for RawFrame {
    fn from(raw: u32) -> Self {
        Self::new(raw)
    }
}

/// Decoded value of one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Measurement {
    pub unit: Unit,
    pub value: f64,
}

/// Decode a raw 24-bit sample.
///
/// Every input is valid: a garbage frame decodes to a meaningless but
/// finite value. Bits above 23 are ignored.
pub fn decode(raw: u32) -> Measurement {
    let frame = RawFrame::new(raw);
    let unit = frame.unit();

    let mut counts = frame.magnitude() as f64;
    if frame.is_negative() {
        counts = -counts;
    }

    Measurement {
        unit,
        value: counts / unit.divisor(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_frame() {
        let m = decode(0x000000);
        assert_eq!(m.unit, Unit::Millimeters);
        assert_eq!(m.value, 0.0);
    }

    #[test]
    fn test_negative_millimeters() {
        // bit20 set, magnitude 100
        let m = decode(0x100064);
        assert_eq!(m.unit, Unit::Millimeters);
        assert!((m.value - (-1.0)).abs() < 1e-9);
    }

    #[test]
    fn test_inches() {
        // bit23 set, magnitude 200
        let m = decode(0x8000C8);
        assert_eq!(m.unit, Unit::Inches);
        assert!((m.value - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_reserved_bits_ignored() {
        // bits 21-22 and anything above 23 do not affect the value
        assert_eq!(decode(0x600064), decode(0x000064));
        assert_eq!(decode(0xFF00_0064), decode(0x0000_0064));
    }

    #[test]
    fn test_full_scale() {
        let m = decode(MAGNITUDE_MASK);
        assert!((m.value - 10485.75).abs() < 1e-9);
    }

    #[test]
    fn test_from_parts_layout() {
        let f = RawFrame::from_parts(Unit::Inches, 200, true);
        assert_eq!(f.raw(), 0x9000C8);
        assert_eq!(f.unit(), Unit::Inches);
        assert_eq!(f.magnitude(), 200);
        assert!(f.is_negative());
    }
}
