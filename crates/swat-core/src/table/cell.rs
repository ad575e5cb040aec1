use crate::common::serialization::format_shortest_f64;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// One typed value of a tabular file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Integer(i64),
    Real(f64),
    Text(String),
    Missing,
}

impl Cell {
    /// Types a trimmed token. Numeric tokens with a decimal point, exponent or
    /// non-finite marker are reals; other numeric tokens are integers.
    pub fn parse(token: &str) -> Self {
        let token = token.trim();
        if token.is_empty() {
            return Self::Missing;
        }
        let lowered = token.to_ascii_lowercase();
        let real_marker = lowered.contains('.')
            || lowered.contains('e')
            || lowered.contains("inf")
            || lowered.contains("nan");
        if !real_marker {
            if let Ok(value) = token.parse::<i64>() {
                return Self::Integer(value);
            }
        }
        if looks_numeric(&lowered) {
            if let Ok(value) = token.parse::<f64>() {
                return Self::Real(value);
            }
        }
        Self::Text(token.to_string())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(value) => Some(*value as f64),
            Self::Real(value) => Some(*value),
            Self::Text(_) | Self::Missing => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::Real(value) if value.fract() == 0.0 && value.is_finite() => Some(*value as i64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    pub const fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Text written to a tabular file; missing cells render empty.
    pub fn render(&self) -> String {
        match self {
            Self::Integer(value) => value.to_string(),
            Self::Real(value) => format_shortest_f64(*value),
            Self::Text(value) => value.clone(),
            Self::Missing => String::new(),
        }
    }

    /// Compares a cell against a filter value given as text.
    pub fn matches_text(&self, expected: &str) -> bool {
        match self {
            Self::Text(value) => value == expected,
            Self::Missing => expected.is_empty(),
            numeric => {
                let parsed = Cell::parse(expected);
                match (numeric.as_f64(), parsed.as_f64()) {
                    (Some(left), Some(right)) => left == right,
                    _ => numeric.render() == expected,
                }
            }
        }
    }
}

fn looks_numeric(lowered: &str) -> bool {
    let body = lowered.trim_start_matches(['+', '-']);
    matches!(body, "inf" | "infinity" | "nan")
        || body
            .chars()
            .all(|character| character.is_ascii_digit() || matches!(character, '.' | 'e' | '+' | '-'))
}

impl Display for Cell {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::Cell;

    #[test]
    fn tokens_are_typed_by_numeric_markers() {
        assert_eq!(Cell::parse("12"), Cell::Integer(12));
        assert_eq!(Cell::parse("-3"), Cell::Integer(-3));
        assert_eq!(Cell::parse("12.0"), Cell::Real(12.0));
        assert_eq!(Cell::parse("1e3"), Cell::Real(1000.0));
        assert_eq!(Cell::parse("  hru001 "), Cell::Text("hru001".to_string()));
        assert_eq!(Cell::parse("infil"), Cell::Text("infil".to_string()));
        assert_eq!(Cell::parse("   "), Cell::Missing);
        assert!(matches!(Cell::parse("nan"), Cell::Real(value) if value.is_nan()));
    }

    #[test]
    fn rendering_reparses_to_the_same_cell() {
        for token in ["0.05", "1200.0", "-7", "1e+16", "agrl", "0.00012345"] {
            let cell = Cell::parse(token);
            assert_eq!(Cell::parse(&cell.render()), cell, "token {token}");
        }
        assert_eq!(Cell::Missing.render(), "");
    }

    #[test]
    fn filter_matching_compares_numbers_numerically() {
        assert!(Cell::Integer(3).matches_text("3"));
        assert!(Cell::Real(3.0).matches_text("3"));
        assert!(Cell::Text("B".to_string()).matches_text("B"));
        assert!(!Cell::Text("B".to_string()).matches_text("b"));
    }
}
