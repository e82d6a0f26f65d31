use std::fmt;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum QuantityError {
    #[error("unable to parse quantity {0:?}")]
    Parse(String),

    #[error("quantity overflow computing {0:?}")]
    Overflow(String),
}

/// Scale applied to the stored integer: one unit is 10^9 nano-units.
const NANO: i128 = 1_000_000_000;

/// Serialization family of a quantity, preserved across addition the same
/// way apimachinery preserves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    BinarySi,
    DecimalSi,
    DecimalExponent,
}

/// An exact resource quantity: an i128 count of nano-units plus the format it
/// was parsed from. Addition is integer addition, so summing across many
/// nodes never drifts the way floating point would.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedQuantity {
    nano: i128,
    format: Format,
}

impl ParsedQuantity {
    pub fn zero() -> Self {
        Self {
            nano: 0,
            format: Format::DecimalSi,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.nano == 0
    }

    /// Parses the apimachinery quantity grammar: decimal digits with an
    /// optional fraction, followed by a binary suffix (Ki..Ei), a decimal SI
    /// suffix (n..E) or a decimal exponent (e6). Values finer than one
    /// nano-unit are rounded up, matching upstream behavior.
    pub fn parse(text: &str) -> Result<Self, QuantityError> {
        let err = || QuantityError::Parse(text.to_string());
        let s = text.trim();
        let (negative, s) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };

        let int_end = s
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(s.len());
        let int_part = &s[..int_end];
        let mut suffix = &s[int_end..];

        let mut frac_part = "";
        if let Some(rest) = suffix.strip_prefix('.') {
            let frac_end = rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len());
            frac_part = &rest[..frac_end];
            suffix = &rest[frac_end..];
        }
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(err());
        }

        let digits = format!("{int_part}{frac_part}");
        let mantissa: i128 = digits.parse().map_err(|_| err())?;
        let frac_len = frac_part.len() as i32;

        let (format, mantissa, exp10) = match suffix {
            "" => (Format::DecimalSi, mantissa, 0),
            "Ki" => (Format::BinarySi, shift(mantissa, 10, &err)?, 0),
            "Mi" => (Format::BinarySi, shift(mantissa, 20, &err)?, 0),
            "Gi" => (Format::BinarySi, shift(mantissa, 30, &err)?, 0),
            "Ti" => (Format::BinarySi, shift(mantissa, 40, &err)?, 0),
            "Pi" => (Format::BinarySi, shift(mantissa, 50, &err)?, 0),
            "Ei" => (Format::BinarySi, shift(mantissa, 60, &err)?, 0),
            "n" => (Format::DecimalSi, mantissa, -9),
            "u" => (Format::DecimalSi, mantissa, -6),
            "m" => (Format::DecimalSi, mantissa, -3),
            "k" => (Format::DecimalSi, mantissa, 3),
            "M" => (Format::DecimalSi, mantissa, 6),
            "G" => (Format::DecimalSi, mantissa, 9),
            "T" => (Format::DecimalSi, mantissa, 12),
            "P" => (Format::DecimalSi, mantissa, 15),
            "E" => (Format::DecimalSi, mantissa, 18),
            exp if exp.starts_with('e') || exp.starts_with('E') => {
                let exponent: i32 = exp[1..].parse().map_err(|_| err())?;
                (Format::DecimalExponent, mantissa, exponent)
            }
            _ => return Err(err()),
        };

        let nano = scale(mantissa, exp10 + 9 - frac_len).ok_or_else(err)?;
        Ok(Self {
            nano: if negative { -nano } else { nano },
            format,
        })
    }

    /// Exact sum. The result keeps the left operand's format unless the left
    /// operand is zero, in which case the right operand's format wins.
    pub fn add(self, other: Self) -> Result<Self, QuantityError> {
        let nano = self
            .nano
            .checked_add(other.nano)
            .ok_or_else(|| QuantityError::Overflow(format!("{self} + {other}")))?;
        let format = if self.nano == 0 {
            other.format
        } else {
            self.format
        };
        Ok(Self { nano, format })
    }
}

fn shift(mantissa: i128, bits: u32, err: &impl Fn() -> QuantityError) -> Result<i128, QuantityError> {
    mantissa.checked_mul(1i128 << bits).ok_or_else(err)
}

/// mantissa * 10^exp10 with checked arithmetic; negative exponents round up.
fn scale(mantissa: i128, exp10: i32) -> Option<i128> {
    if exp10 >= 0 {
        mantissa.checked_mul(10i128.checked_pow(exp10 as u32)?)
    } else {
        let divisor = 10i128.checked_pow(exp10.unsigned_abs())?;
        let ceiling = mantissa.checked_add(divisor - 1)?;
        Some(ceiling / divisor)
    }
}

impl TryFrom<&Quantity> for ParsedQuantity {
    type Error = QuantityError;

    fn try_from(quantity: &Quantity) -> Result<Self, Self::Error> {
        Self::parse(&quantity.0)
    }
}

impl From<ParsedQuantity> for Quantity {
    fn from(parsed: ParsedQuantity) -> Self {
        Quantity(parsed.to_string())
    }
}

impl fmt::Display for ParsedQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nano == 0 {
            return f.write_str("0");
        }
        if self.nano < 0 {
            f.write_str("-")?;
        }
        let nano = self.nano.unsigned_abs() as i128;
        match self.format {
            Format::BinarySi if nano % NANO == 0 => {
                let units = nano / NANO;
                for (suffix, bits) in [("Ei", 60), ("Pi", 50), ("Ti", 40), ("Gi", 30), ("Mi", 20), ("Ki", 10)] {
                    if units % (1i128 << bits) == 0 {
                        return write!(f, "{}{}", units >> bits, suffix);
                    }
                }
                write!(f, "{units}")
            }
            Format::DecimalExponent => {
                let (mantissa, exp10) = strip_tens(nano);
                match exp10 {
                    0 => write!(f, "{mantissa}"),
                    e if e > 0 => write!(f, "{mantissa}e{e}"),
                    _ => write_decimal_si(f, mantissa, exp10),
                }
            }
            _ => {
                let (mantissa, exp10) = strip_tens(nano);
                write_decimal_si(f, mantissa, exp10)
            }
        }
    }
}

/// Removes trailing decimal zeros; returns (mantissa, power of ten) with the
/// stored nano scale already folded in.
fn strip_tens(nano: i128) -> (i128, i32) {
    let mut mantissa = nano;
    let mut exp10 = -9;
    while mantissa % 10 == 0 {
        mantissa /= 10;
        exp10 += 1;
    }
    (mantissa, exp10)
}

fn write_decimal_si(f: &mut fmt::Formatter<'_>, mantissa: i128, exp10: i32) -> fmt::Result {
    for (exp, suffix) in [
        (18, "E"),
        (15, "P"),
        (12, "T"),
        (9, "G"),
        (6, "M"),
        (3, "k"),
        (0, ""),
        (-3, "m"),
        (-6, "u"),
        (-9, "n"),
    ] {
        if exp <= exp10 {
            return write!(f, "{}{}", mantissa * 10i128.pow((exp10 - exp) as u32), suffix);
        }
    }
    write!(f, "{mantissa}")
}
