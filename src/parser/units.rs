use std::sync::LazyLock;

use regex::Regex;

use super::fields::FieldSpec;

static ELEVATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]*),([0-9]*)'").unwrap());
// Optional second component is inches written under the feet glyph once a
// trailing `"` has been substituted: 7'6" -> 7'6', 7' 6" -> 7' 6'.
static FEET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]*\.?[0-9]*)'(?:\s*([0-9]+(?:\.[0-9]+)?)')?").unwrap()
});
static INCHES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"^([0-9]*\.?[0-9]*)""#).unwrap());
static DEGREES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]+(?:\.[0-9]+)?)\s*°?").unwrap());

const INCHES_PER_FOOT: f64 = 12.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Feet,
    Inches,
    Degrees,
}

impl Unit {
    pub fn glyph(self) -> char {
        match self {
            Unit::Feet => '\'',
            Unit::Inches => '"',
            Unit::Degrees => '°',
        }
    }

    pub fn from_glyph(c: char) -> Option<Self> {
        match c {
            '\'' => Some(Unit::Feet),
            '"' => Some(Unit::Inches),
            '°' => Some(Unit::Degrees),
            _ => None,
        }
    }

    fn is_length(self) -> bool {
        matches!(self, Unit::Feet | Unit::Inches)
    }
}

/// Parse a scraped magnitude into the field's canonical unit.
///
/// When the trailing glyph is a length unit other than the canonical one, the
/// glyph is substituted first and the magnitude parsed under the substituted
/// glyph is then scaled by 12. Degrees never take that branch.
pub fn normalize(raw: &str, field: &FieldSpec) -> Option<f64> {
    let raw = raw.trim();
    if !raw.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    let canonical = field.unit?;
    let scraped = raw.chars().last().and_then(Unit::from_glyph);

    let mismatch = match scraped {
        Some(unit) => canonical.is_length() && unit.is_length() && unit != canonical,
        None => false,
    };

    let text = match scraped {
        Some(unit) if mismatch => raw.replace(unit.glyph(), &canonical.glyph().to_string()),
        _ => raw.to_string(),
    };

    let magnitude = if field.is_elevation() {
        parse_thousands(&text)?
    } else {
        parse_magnitude(&text, canonical)?
    };

    Some(if mismatch {
        magnitude * INCHES_PER_FOOT
    } else {
        magnitude
    })
}

fn parse_thousands(text: &str) -> Option<f64> {
    let caps = ELEVATION_RE.captures(text)?;
    let thousands: f64 = caps[1].parse().ok()?;
    let remainder: f64 = caps[2].parse().ok()?;
    Some(thousands * 1000.0 + remainder)
}

fn parse_magnitude(text: &str, unit: Unit) -> Option<f64> {
    match unit {
        Unit::Feet => {
            let caps = FEET_RE.captures(text)?;
            let feet: f64 = caps[1].parse().ok()?;
            let inches = match caps.get(2) {
                Some(m) => m.as_str().parse::<f64>().ok()?,
                None => 0.0,
            };
            Some(feet + inches / INCHES_PER_FOOT)
        }
        Unit::Inches => INCHES_RE.captures(text)?[1].parse().ok(),
        Unit::Degrees => DEGREES_RE.captures(text)?[1].parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::fields::FieldSpec;

    fn spec(name: &'static str, unit: Unit) -> FieldSpec {
        FieldSpec::numeric(name, unit)
    }

    #[test]
    fn no_digit_is_absent() {
        for raw in ["", "Unknown", "'", "N/A\"", "°"] {
            assert_eq!(normalize(raw, &spec("Depth", Unit::Inches)), None, "{raw:?}");
        }
    }

    #[test]
    fn elevation_thousands() {
        assert_eq!(normalize("7,500'", &spec("Elevation", Unit::Feet)), Some(7500.0));
        assert_eq!(normalize(" 10,250' ", &spec("Elevation", Unit::Feet)), Some(10250.0));
    }

    #[test]
    fn elevation_without_comma_is_absent() {
        assert_eq!(normalize("7500'", &spec("Elevation", Unit::Feet)), None);
    }

    #[test]
    fn feet_and_inches_under_feet_field() {
        // `"` is substituted by `'`, 7'6' parses as 7.5 and is then scaled.
        assert_eq!(normalize("7'6\"", &spec("Width", Unit::Feet)), Some(90.0));
    }

    #[test]
    fn feet_and_inches_separated_by_space() {
        assert_eq!(normalize("7' 6\"", &spec("Width", Unit::Feet)), Some(90.0));
        assert_eq!(normalize("12'  3\"", &spec("Width", Unit::Feet)), Some(147.0));
    }

    #[test]
    fn canonical_units_pass_through() {
        assert_eq!(normalize("150'", &spec("Width", Unit::Feet)), Some(150.0));
        assert_eq!(normalize("18\"", &spec("Depth", Unit::Inches)), Some(18.0));
        assert_eq!(normalize("2.5\"", &spec("New Snow Depth", Unit::Inches)), Some(2.5));
        assert_eq!(normalize("38°", &spec("Slope Angle", Unit::Degrees)), Some(38.0));
    }

    #[test]
    fn feet_given_for_inches_field() {
        assert_eq!(normalize("2'", &spec("Depth", Unit::Inches)), Some(24.0));
        assert_eq!(normalize("1.5'", &spec("Depth", Unit::Inches)), Some(18.0));
    }

    #[test]
    fn degrees_never_convert() {
        assert_eq!(normalize("35", &spec("Slope Angle", Unit::Degrees)), Some(35.0));
        assert_eq!(normalize("35'", &spec("Slope Angle", Unit::Degrees)), Some(35.0));
    }

    #[test]
    fn unit_less_length_is_absent() {
        assert_eq!(normalize("12", &spec("Depth", Unit::Inches)), None);
    }
}
