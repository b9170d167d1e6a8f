//! Kubernetes resource quantities (`500m`, `1Gi`, `1e3`).
//!
//! The API server canonicalises quantities on write, so `1024Mi` comes back as
//! `1Gi`. Two quantities are compared by value, kept as an exact fraction over a
//! power of ten.

/// Exact value of a quantity: `numerator / 10^scale`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Exact {
    numerator: i128,
    scale: u32,
}

impl Exact {
    fn same_value(self, other: Self) -> Option<bool> {
        let (a, b) = if self.scale >= other.scale {
            (self, other)
        } else {
            (other, self)
        };
        let widened = b
            .numerator
            .checked_mul(10i128.checked_pow(a.scale - b.scale)?)?;
        Some(a.numerator == widened)
    }
}

/// Suffix multiplier as `(factor, power of ten)`; the power may be negative
fn suffix(suffix: &str) -> Option<(i128, i32)> {
    let binary = |shift: u32| Some((1i128 << shift, 0));
    match suffix {
        "" => Some((1, 0)),
        "n" => Some((1, -9)),
        "u" => Some((1, -6)),
        "m" => Some((1, -3)),
        "k" => Some((1, 3)),
        "M" => Some((1, 6)),
        "G" => Some((1, 9)),
        "T" => Some((1, 12)),
        "P" => Some((1, 15)),
        "E" => Some((1, 18)),
        "Ki" => binary(10),
        "Mi" => binary(20),
        "Gi" => binary(30),
        "Ti" => binary(40),
        "Pi" => binary(50),
        "Ei" => binary(60),
        exponent => {
            let digits = exponent
                .strip_prefix('e')
                .or_else(|| exponent.strip_prefix('E'))?;
            Some((1, digits.parse::<i32>().ok()?))
        }
    }
}

fn parse(text: &str) -> Option<Exact> {
    let text = text.trim();
    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let number_len = unsigned
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(unsigned.len());
    let (number, unit) = unsigned.split_at(number_len);

    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    let digits = format!("{whole}{fraction}");
    let mut numerator = digits.parse::<i128>().ok()?.checked_mul(if negative { -1 } else { 1 })?;
    let mut scale = i64::try_from(fraction.len()).ok()?;

    let (factor, power) = suffix(unit)?;
    numerator = numerator.checked_mul(factor)?;
    scale -= i64::from(power);
    if scale < 0 {
        numerator = numerator.checked_mul(10i128.checked_pow(u32::try_from(-scale).ok()?)?)?;
        scale = 0;
    }

    Some(Exact {
        numerator,
        scale: u32::try_from(scale).ok()?,
    })
}

/// Whether two quantity strings denote the same amount
///
/// Text that does not parse as a quantity is compared verbatim.
#[must_use]
pub fn same_quantity(expected: &str, current: &str) -> bool {
    if expected == current {
        return true;
    }
    match (parse(expected), parse(current)) {
        (Some(expected), Some(current)) => expected.same_value(current).unwrap_or(false),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_forms_are_equal() {
        assert!(same_quantity("1024Mi", "1Gi"));
        assert!(same_quantity("500m", "0.5"));
        assert!(same_quantity("1000m", "1"));
        assert!(same_quantity("1k", "1000"));
        assert!(same_quantity("1e3", "1k"));
        assert!(same_quantity("0.5Gi", "512Mi"));
        assert!(same_quantity("100m", "0.1"));
    }

    #[test]
    fn test_different_amounts_differ() {
        assert!(!same_quantity("1Gi", "1G"));
        assert!(!same_quantity("500m", "0.6"));
        assert!(!same_quantity("2Gi", "1Gi"));
        assert!(!same_quantity("-1", "1"));
    }

    #[test]
    fn test_unparsable_text_compares_verbatim() {
        assert!(same_quantity("lots", "lots"));
        assert!(!same_quantity("lots", "1"));
        assert!(!same_quantity("1Xi", "1"));
        assert!(!same_quantity(".", "0"));
    }
}
