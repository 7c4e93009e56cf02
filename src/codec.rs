use crate::prelude::*;

/// Divisors that appear in the register maps. Anything else is a table bug.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum Divisor {
    One = 1,
    Ten = 10,
    Hundred = 100,
    Thousand = 1000,
}

impl Divisor {
    pub fn as_f64(self) -> f64 {
        f64::from(self as u16)
    }
}

/// Where the high word of a 32-bit value lives.
///
/// The inverter's cumulative counters are stored low word first (`Epv1_all L`
/// at 40, `Epv1_all H` at 41), so `LowFirst` is the common case.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WordOrder {
    LowFirst,
    HighFirst,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Width {
    Single,
    Pair(WordOrder),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signedness {
    Unsigned,
    Signed,
}

/// Static description of how one field is read out of a register block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScaleDescriptor {
    Scaled {
        address: u16,
        divisor: Divisor,
        width: Width,
        signedness: Signedness,
    },
    /// `bits` wide field starting at bit `shift` of a single word.
    Packed { address: u16, shift: u8, bits: u8 },
}

impl ScaleDescriptor {
    pub const fn u16(address: u16, divisor: Divisor) -> Self {
        Self::Scaled {
            address,
            divisor,
            width: Width::Single,
            signedness: Signedness::Unsigned,
        }
    }

    pub const fn i16(address: u16, divisor: Divisor) -> Self {
        Self::Scaled {
            address,
            divisor,
            width: Width::Single,
            signedness: Signedness::Signed,
        }
    }

    /// 32-bit counter, low word at `address`, high word at `address + 1`.
    pub const fn u32_le(address: u16, divisor: Divisor) -> Self {
        Self::Scaled {
            address,
            divisor,
            width: Width::Pair(WordOrder::LowFirst),
            signedness: Signedness::Unsigned,
        }
    }

    pub const fn u32_be(address: u16, divisor: Divisor) -> Self {
        Self::Scaled {
            address,
            divisor,
            width: Width::Pair(WordOrder::HighFirst),
            signedness: Signedness::Unsigned,
        }
    }

    pub const fn packed(address: u16, shift: u8, bits: u8) -> Self {
        Self::Packed {
            address,
            shift,
            bits,
        }
    }

    pub const fn address(&self) -> u16 {
        match self {
            Self::Scaled { address, .. } | Self::Packed { address, .. } => *address,
        }
    }
}

/// Decode one field. `None` means a word the field needs was never read,
/// which is different from a word that was read as zero.
pub fn decode(raw: &RegisterBlock, descriptor: &ScaleDescriptor) -> Option<f64> {
    match *descriptor {
        ScaleDescriptor::Scaled {
            address,
            divisor,
            width,
            signedness,
        } => {
            let value = match width {
                Width::Single => {
                    let word = raw.get(address)?;
                    match signedness {
                        Signedness::Unsigned => f64::from(word),
                        Signedness::Signed => f64::from(word as i16),
                    }
                }
                Width::Pair(order) => {
                    let first = raw.get(address)?;
                    let second = raw.get(address.checked_add(1)?)?;
                    let combined = combine_pair(first, second, order);
                    match signedness {
                        Signedness::Unsigned => f64::from(combined),
                        Signedness::Signed => f64::from(combined as i32),
                    }
                }
            };
            Some(value / divisor.as_f64())
        }
        ScaleDescriptor::Packed {
            address,
            shift,
            bits,
        } => raw.get(address).map(|word| f64::from(unpack(word, shift, bits))),
    }
}

/// `first` is the word at the lower address.
pub fn combine_pair(first: u16, second: u16, order: WordOrder) -> u32 {
    let (high, low) = match order {
        WordOrder::LowFirst => (second, first),
        WordOrder::HighFirst => (first, second),
    };
    (u32::from(high) << 16) | u32::from(low)
}

fn mask(bits: u8) -> u16 {
    if bits >= 16 {
        u16::MAX
    } else {
        (1u16 << bits) - 1
    }
}

pub fn unpack(word: u16, shift: u8, bits: u8) -> u16 {
    if shift >= 16 {
        return 0;
    }
    (word >> shift) & mask(bits)
}

/// Inverse of `unpack`: writes `value` into the field, leaving other bits alone.
pub fn pack(word: u16, value: u16, shift: u8, bits: u8) -> u16 {
    if shift >= 16 {
        return word;
    }
    let field = mask(bits) << shift;
    (word & !field) | ((value << shift) & field)
}

pub fn round(value: f64, decimals: u32) -> f64 {
    let factor = 10_f64.powi(decimals as i32);
    (value * factor).round() / factor
}
