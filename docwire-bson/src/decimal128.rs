//! IEEE 754-2008 decimal128 values (BID encoding).
//!
//! The codecs treat decimals as 16 opaque bytes. The string conversions here
//! exist for extended JSON, which carries decimals in their textual form.
//! No arithmetic is performed.
//!
//! Canonical encodings survive a round trip through text bit-for-bit.
//! Non-canonical encodings (coefficients above 10^34 - 1, NaN payloads and
//! signs, signalling NaNs) print as their canonical equivalent, so the text
//! form alone loses them; [`Decimal128::is_canonical`] tells the two apart.

use crate::error::BsonError;
use std::fmt;
use std::str::FromStr;

const EXPONENT_BIAS: i64 = 6176;
const MAX_EXPONENT: i64 = 6111;
const MIN_EXPONENT: i64 = -6176;
const MAX_DIGITS: usize = 34;
const MAX_COEFFICIENT: u128 = 9_999_999_999_999_999_999_999_999_999_999;

const SIGN_BIT: u128 = 1 << 127;
const COEFFICIENT_MASK: u128 = (1 << 113) - 1;
const INFINITY_BITS: u128 = 0x7800_0000_0000_0000 << 64;
const NAN_BITS: u128 = 0x7C00_0000_0000_0000 << 64;

/// A 128-bit decimal stored as its little-endian wire bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decimal128([u8; 16]);

impl Decimal128 {
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 16] {
        self.0
    }

    fn from_bits(bits: u128) -> Self {
        Self(bits.to_le_bytes())
    }

    fn bits(&self) -> u128 {
        u128::from_le_bytes(self.0)
    }

    pub fn nan() -> Self {
        Self::from_bits(NAN_BITS)
    }

    pub fn infinity(negative: bool) -> Self {
        let sign = if negative { SIGN_BIT } else { 0 };
        Self::from_bits(INFINITY_BITS | sign)
    }

    /// Returns whether the bytes are exactly what parsing this value's
    /// string form produces.
    pub fn is_canonical(&self) -> bool {
        self.to_string()
            .parse::<Decimal128>()
            .map_or(false, |parsed| parsed == *self)
    }

    /// Builds a finite value from its parts.
    fn from_parts(negative: bool, coefficient: u128, exponent: i64) -> Self {
        let sign = if negative { SIGN_BIT } else { 0 };
        let biased = (exponent + EXPONENT_BIAS) as u128;
        Self::from_bits(sign | (biased << 113) | coefficient)
    }
}

impl fmt::Display for Decimal128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bits = self.bits();
        let negative = bits & SIGN_BIT != 0;
        let combination = (bits >> 122) & 0x1F;

        let (biased, coefficient) = if combination >> 3 == 0b11 {
            match combination {
                0b11110 => {
                    return f.write_str(if negative { "-Infinity" } else { "Infinity" })
                }
                0b11111 => return f.write_str("NaN"),
                // Implied leading bits push the coefficient past 10^34.
                _ => (((bits >> 111) & 0x3FFF) as i64, 0),
            }
        } else {
            let coefficient = bits & COEFFICIENT_MASK;
            let coefficient = if coefficient > MAX_COEFFICIENT {
                0
            } else {
                coefficient
            };
            (((bits >> 113) & 0x3FFF) as i64, coefficient)
        };

        let exponent = biased - EXPONENT_BIAS;
        let digits = coefficient.to_string();
        let scientific_exponent = digits.len() as i64 - 1 + exponent;

        if negative {
            f.write_str("-")?;
        }

        if exponent > 0 || scientific_exponent < -6 {
            f.write_str(&digits[..1])?;
            if digits.len() > 1 {
                write!(f, ".{}", &digits[1..])?;
            }
            write!(f, "E{:+}", scientific_exponent)
        } else if exponent == 0 {
            f.write_str(&digits)
        } else {
            let radix = digits.len() as i64 + exponent;
            if radix > 0 {
                let (int, frac) = digits.split_at(radix as usize);
                write!(f, "{}.{}", int, frac)
            } else {
                write!(f, "0.{}{}", "0".repeat((-radix) as usize), digits)
            }
        }
    }
}

impl fmt::Debug for Decimal128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Decimal128({})", self)
    }
}

impl FromStr for Decimal128 {
    type Err = BsonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid =
            |reason: &str| BsonError::InvalidDecimal128(format!("{:?}: {}", s, reason));

        let (negative, body) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            _ => (false, s),
        };

        let lower = body.to_ascii_lowercase();
        if lower == "inf" || lower == "infinity" {
            return Ok(Self::infinity(negative));
        }
        if lower == "nan" {
            return Ok(Self::nan());
        }

        let (mantissa, exp_part) = match body.find(|c: char| c == 'e' || c == 'E') {
            Some(pos) => (&body[..pos], Some(&body[pos + 1..])),
            None => (body, None),
        };

        let mut digits = String::with_capacity(mantissa.len());
        let mut fraction_len: i64 = 0;
        let mut seen_point = false;
        for c in mantissa.chars() {
            match c {
                '0'..='9' => {
                    digits.push(c);
                    if seen_point {
                        fraction_len += 1;
                    }
                }
                '.' if !seen_point => seen_point = true,
                _ => return Err(invalid("unexpected character")),
            }
        }
        if digits.is_empty() {
            return Err(invalid("no digits"));
        }

        let mut exponent: i64 = match exp_part {
            Some(e) => {
                // Anything longer cannot land inside the exponent range.
                if e.is_empty() || e.len() > 8 {
                    return Err(invalid("bad exponent"));
                }
                e.parse().map_err(|_| invalid("bad exponent"))?
            }
            None => 0,
        };
        exponent -= fraction_len;

        let mut digits = digits.trim_start_matches('0').to_string();
        if digits.is_empty() {
            digits.push('0');
        }
        let is_zero = digits == "0";

        while digits.len() > MAX_DIGITS && digits.ends_with('0') {
            digits.pop();
            exponent += 1;
        }
        if digits.len() > MAX_DIGITS {
            return Err(invalid("more than 34 significant digits"));
        }

        if is_zero {
            exponent = exponent.clamp(MIN_EXPONENT, MAX_EXPONENT);
        } else {
            while exponent > MAX_EXPONENT && digits.len() < MAX_DIGITS {
                digits.push('0');
                exponent -= 1;
            }
            while exponent < MIN_EXPONENT && digits.len() > 1 && digits.ends_with('0') {
                digits.pop();
                exponent += 1;
            }
            if !(MIN_EXPONENT..=MAX_EXPONENT).contains(&exponent) {
                return Err(invalid("exponent out of range"));
            }
        }

        let coefficient: u128 = digits.parse().map_err(|_| invalid("bad coefficient"))?;
        Ok(Self::from_parts(negative, coefficient, exponent))
    }
}
