//! Kubernetes quantity parsing and canonical formatting
//!
//! Quantities arrive as strings (`"500m"`, `"4Gi"`, `"1e3"`). Values are held
//! as `mantissa * 10^scale * 2^pow2` in integers so milli-unit extraction is
//! exact; results saturate at the `i64` bounds like the API server's
//! `MilliValue()` / `Value()`.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use thiserror::Error;

/// Longest mantissa accepted, in digits. Keeps every intermediate in `i128`.
const MAX_MANTISSA_DIGITS: usize = 30;

/// Decimal scales past this bound already saturate (or round to within one
/// unit of zero) for any accepted mantissa, so they are clamped here.
const MAX_SCALE: i64 = 128;

const DECIMAL_SUFFIXES: &[(&str, i32)] = &[
    ("n", -9),
    ("u", -6),
    ("m", -3),
    ("", 0),
    ("k", 3),
    ("M", 6),
    ("G", 9),
    ("T", 12),
    ("P", 15),
    ("E", 18),
];

const BINARY_SUFFIXES: &[(&str, u32)] = &[
    ("Ki", 10),
    ("Mi", 20),
    ("Gi", 30),
    ("Ti", 40),
    ("Pi", 50),
    ("Ei", 60),
];

/// Errors from parsing a quantity string
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QuantityError {
    /// The string is empty
    #[error("empty quantity")]
    Empty,
    /// No digits before the suffix
    #[error("quantity '{0}' has no numeric part")]
    MissingNumber(String),
    /// Unrecognized suffix
    #[error("quantity '{quantity}' has unknown suffix '{suffix}'")]
    UnknownSuffix {
        /// Full input
        quantity: String,
        /// The offending suffix
        suffix: String,
    },
    /// Too many digits to represent exactly
    #[error("quantity '{0}' has too many digits")]
    TooPrecise(String),
}

/// A parsed quantity: `mantissa * 10^scale * 2^pow2`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedQuantity {
    mantissa: i128,
    scale: i32,
    pow2: u32,
}

impl ParsedQuantity {
    /// Parse a quantity string
    pub fn parse(input: &str) -> Result<Self, QuantityError> {
        if input.is_empty() {
            return Err(QuantityError::Empty);
        }

        let (negative, rest) = match input.as_bytes()[0] {
            b'-' => (true, &input[1..]),
            b'+' => (false, &input[1..]),
            _ => (false, input),
        };

        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, suffix) = rest.split_at(number_len);

        let (whole, fraction) = match number.split_once('.') {
            Some((w, f)) => (w, f),
            None => (number, ""),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(QuantityError::MissingNumber(input.to_string()));
        }
        if fraction.contains('.') {
            return Err(QuantityError::MissingNumber(input.to_string()));
        }

        let digits = format!("{whole}{fraction}");
        let significant = digits.trim_start_matches('0');
        if significant.len() > MAX_MANTISSA_DIGITS {
            return Err(QuantityError::TooPrecise(input.to_string()));
        }
        let mut mantissa: i128 = if significant.is_empty() {
            0
        } else {
            significant
                .parse()
                .map_err(|_| QuantityError::MissingNumber(input.to_string()))?
        };
        if negative {
            mantissa = -mantissa;
        }

        let (suffix_scale, pow2) =
            parse_suffix(suffix).ok_or_else(|| QuantityError::UnknownSuffix {
                quantity: input.to_string(),
                suffix: suffix.to_string(),
            })?;

        let fraction_len = i64::try_from(fraction.len()).unwrap_or(i64::MAX);
        let scale = i64::from(suffix_scale)
            .saturating_sub(fraction_len)
            .clamp(-MAX_SCALE, MAX_SCALE);

        Ok(Self {
            mantissa,
            scale: scale as i32,
            pow2,
        })
    }

    /// `ceil(q * 1000)`, saturating
    pub fn milli_value(&self) -> i64 {
        self.scaled_ceil(3)
    }

    /// `ceil(q)`, saturating
    pub fn value(&self) -> i64 {
        self.scaled_ceil(0)
    }

    /// True if the quantity is exactly zero
    pub fn is_zero(&self) -> bool {
        self.mantissa == 0
    }

    /// `ceil(q * 10^shift)` clamped into `i64`
    fn scaled_ceil(&self, shift: i32) -> i64 {
        if self.mantissa == 0 {
            return 0;
        }
        let saturated = if self.mantissa > 0 { i64::MAX } else { i64::MIN };

        let Some(numerator) = 1i128
            .checked_shl(self.pow2)
            .and_then(|p| self.mantissa.checked_mul(p))
        else {
            return saturated;
        };

        let exp = self.scale.saturating_add(shift);
        let result = if exp >= 0 {
            match 10i128
                .checked_pow(exp as u32)
                .and_then(|p| numerator.checked_mul(p))
            {
                Some(v) => v,
                None => return saturated,
            }
        } else {
            match 10i128.checked_pow((-exp) as u32) {
                Some(d) => ceil_div(numerator, d),
                // |numerator| < 10^38 < d: the true value is in (-1, 1)
                None => i128::from(numerator > 0),
            }
        };

        result.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }
}

fn ceil_div(n: i128, d: i128) -> i128 {
    let q = n / d;
    if n % d != 0 && n > 0 {
        q + 1
    } else {
        q
    }
}

fn parse_suffix(suffix: &str) -> Option<(i32, u32)> {
    if let Some((_, scale)) = DECIMAL_SUFFIXES.iter().find(|(s, _)| *s == suffix) {
        return Some((*scale, 0));
    }
    if let Some((_, pow2)) = BINARY_SUFFIXES.iter().find(|(s, _)| *s == suffix) {
        return Some((0, *pow2));
    }
    // Decimal exponent: e3, E-2, e+6
    let exponent = suffix.strip_prefix('e').or_else(|| suffix.strip_prefix('E'))?;
    let digits = exponent.trim_start_matches(['+', '-']);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    exponent.parse::<i32>().ok().map(|e| (e, 0))
}

/// Parse a `Quantity`
pub fn parse(quantity: &Quantity) -> Result<ParsedQuantity, QuantityError> {
    ParsedQuantity::parse(&quantity.0)
}

/// Render a whole-unit value in canonical DecimalSI form (`4000` -> `"4k"`)
pub fn decimal_quantity(value: i64) -> Quantity {
    Quantity(format_decimal(value as i128))
}

/// Render a milli-unit value in canonical DecimalSI form
/// (`1500` -> `"1500m"`, `4000` -> `"4"`)
pub fn milli_quantity(milli: i64) -> Quantity {
    if milli % 1000 == 0 {
        decimal_quantity(milli / 1000)
    } else {
        Quantity(format!("{milli}m"))
    }
}

/// Render a whole-unit value in canonical BinarySI form
/// (`1073741824` -> `"1Gi"`, `4000` -> `"4000"`)
pub fn binary_quantity(value: i64) -> Quantity {
    // Small magnitudes render as DecimalSI, as the API server does
    if value > -1024 && value < 1024 {
        return decimal_quantity(value);
    }
    let mut mantissa = value as i128;
    let mut used = "";
    for (suffix, _) in BINARY_SUFFIXES {
        if mantissa % 1024 != 0 {
            break;
        }
        mantissa /= 1024;
        used = suffix;
    }
    Quantity(format!("{mantissa}{used}"))
}

fn format_decimal(value: i128) -> String {
    // "", k, M, G, T, P, E
    let positive = &DECIMAL_SUFFIXES[3..];
    let mut mantissa = value;
    let mut idx = 0;
    while mantissa != 0 && mantissa % 1000 == 0 && idx + 1 < positive.len() {
        mantissa /= 1000;
        idx += 1;
    }
    format!("{}{}", mantissa, positive[idx].0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(s: &str) -> ParsedQuantity {
        ParsedQuantity::parse(s).unwrap_or_else(|e| panic!("{s}: {e}"))
    }

    #[test]
    fn cpu_quantities_to_milli() {
        assert_eq!(q("500m").milli_value(), 500);
        assert_eq!(q("1.5").milli_value(), 1500);
        assert_eq!(q("2").milli_value(), 2000);
        assert_eq!(q("0.1").milli_value(), 100);
        assert_eq!(q(".5").milli_value(), 500);
    }

    #[test]
    fn binary_suffixes() {
        assert_eq!(q("1Ki").value(), 1024);
        assert_eq!(q("1Gi").value(), 1 << 30);
        assert_eq!(q("1Gi").milli_value(), (1i64 << 30) * 1000);
        assert_eq!(q("1.5Gi").value(), 3 << 29);
    }

    #[test]
    fn decimal_suffixes_and_exponents() {
        assert_eq!(q("1k").value(), 1000);
        assert_eq!(q("2M").value(), 2_000_000);
        assert_eq!(q("1e3").value(), 1000);
        assert_eq!(q("5E-1").milli_value(), 500);
        assert_eq!(q("100n").milli_value(), 1);
        assert_eq!(q("1u").value(), 1);
    }

    #[test]
    fn values_round_up() {
        assert_eq!(q("1.0001").value(), 2);
        assert_eq!(q("0.0001").milli_value(), 1);
        assert_eq!(q("-1.5").value(), -1);
    }

    #[test]
    fn saturates_instead_of_overflowing() {
        assert_eq!(q("100E").milli_value(), i64::MAX);
        assert_eq!(q("-100E").milli_value(), i64::MIN);
        assert_eq!(q("1e40").value(), i64::MAX);
    }

    #[test]
    fn extreme_exponents_saturate() {
        assert_eq!(q("1e2147483647").milli_value(), i64::MAX);
        assert_eq!(q("1e2147483647").value(), i64::MAX);
        assert_eq!(q("-1e2147483647").milli_value(), i64::MIN);
        assert_eq!(q("1.5e-2147483648").milli_value(), 1);
        assert_eq!(q("1.5e-2147483648").value(), 1);
        assert_eq!(q("-1.5e-2147483648").milli_value(), 0);
        assert_eq!(q("1Ei").milli_value(), i64::MAX);
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(ParsedQuantity::parse(""), Err(QuantityError::Empty));
        assert!(matches!(
            ParsedQuantity::parse("Gi"),
            Err(QuantityError::MissingNumber(_))
        ));
        assert!(matches!(
            ParsedQuantity::parse("10Xi"),
            Err(QuantityError::UnknownSuffix { .. })
        ));
        assert!(ParsedQuantity::parse("1.2.3").is_err());
        assert!(ParsedQuantity::parse("1e").is_err());
    }

    #[test]
    fn zero_is_zero() {
        assert!(q("0").is_zero());
        assert!(q("0Gi").is_zero());
        assert_eq!(q("000.000").milli_value(), 0);
    }

    #[test]
    fn milli_formatting() {
        assert_eq!(milli_quantity(4000).0, "4");
        assert_eq!(milli_quantity(1500).0, "1500m");
        assert_eq!(milli_quantity(1).0, "1m");
        assert_eq!(milli_quantity(0).0, "0");
        assert_eq!(milli_quantity(2_000_000).0, "2k");
    }

    #[test]
    fn binary_formatting() {
        assert_eq!(binary_quantity(4000).0, "4000");
        assert_eq!(binary_quantity(1 << 30).0, "1Gi");
        assert_eq!(binary_quantity(3 << 29).0, "1536Mi");
        assert_eq!(binary_quantity(1000).0, "1k");
        assert_eq!(binary_quantity(0).0, "0");
    }

    #[test]
    fn formatted_quantities_parse_back() {
        for milli in [0i64, 1, 999, 1500, 4000, 123_456_789] {
            assert_eq!(parse(&milli_quantity(milli)).map(|p| p.milli_value()), Ok(milli));
        }
        for bytes in [0i64, 1023, 4000, 1 << 20, (1 << 30) * 1000] {
            assert_eq!(parse(&binary_quantity(bytes)).map(|p| p.value()), Ok(bytes));
        }
    }
}
