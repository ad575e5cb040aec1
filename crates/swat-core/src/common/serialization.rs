use crate::domain::{SwatError, SwatResult};
use std::fs;
use std::path::Path;

/// Shortest round-trip rendering of a float. Integral values keep a trailing
/// `.0`; magnitudes outside `1e-4 ..= 1e16` switch to `d.ddde+XX`.
pub fn format_shortest_f64(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }

    let (negative, digits, exponent) = decompose(&format!("{value:e}"));
    let sign = if negative { "-" } else { "" };

    if (-4..16).contains(&exponent) {
        if exponent >= 0 {
            let integer_len = exponent as usize + 1;
            if digits.len() <= integer_len {
                let zeros = "0".repeat(integer_len - digits.len());
                format!("{sign}{digits}{zeros}.0")
            } else {
                format!(
                    "{sign}{}.{}",
                    &digits[..integer_len],
                    &digits[integer_len..]
                )
            }
        } else {
            let zeros = "0".repeat((-exponent - 1) as usize);
            format!("{sign}0.{zeros}{digits}")
        }
    } else {
        let mantissa = if digits.len() > 1 {
            format!("{}.{}", &digits[..1], &digits[1..])
        } else {
            digits
        };
        format!("{sign}{mantissa}{}", exponent_suffix(exponent))
    }
}

/// `{:.Ne}` with a signed, two-digit exponent (`1.234568e+19`).
pub fn format_scientific_f64(value: f64, precision: usize) -> String {
    if !value.is_finite() {
        return format_shortest_f64(value);
    }
    let rendered = format!("{value:.precision$e}");
    match rendered.split_once('e') {
        Some((mantissa, exponent)) => match exponent.parse::<i32>() {
            Ok(exponent) => format!("{mantissa}{}", exponent_suffix(exponent)),
            Err(_) => rendered,
        },
        None => rendered,
    }
}

fn exponent_suffix(exponent: i32) -> String {
    let sign = if exponent < 0 { '-' } else { '+' };
    format!("e{sign}{:02}", exponent.unsigned_abs())
}

fn decompose(scientific: &str) -> (bool, String, i32) {
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific, "0"));
    let negative = mantissa.starts_with('-');
    let digits = mantissa.chars().filter(char::is_ascii_digit).collect();
    (negative, digits, exponent.parse().unwrap_or(0))
}

pub fn normalize_text_artifact(content: &str) -> String {
    let mut normalized = content.replace("\r\n", "\n").replace('\r', "\n");
    if !normalized.is_empty() && !normalized.ends_with('\n') {
        normalized.push('\n');
    }
    normalized
}

pub fn read_text_artifact(path: &Path, placeholder: &'static str) -> SwatResult<String> {
    let bytes = fs::read(path).map_err(|source| {
        SwatError::io_system(
            placeholder,
            format!("failed to read '{}': {}", path.display(), source),
        )
    })?;
    // SWAT+ inputs are latin-1; decode byte-per-char instead of rejecting them.
    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(error) => error.into_bytes().into_iter().map(char::from).collect(),
    })
}

pub fn write_text_artifact(path: &Path, content: &str, placeholder: &'static str) -> SwatResult<()> {
    fs::write(path, normalize_text_artifact(content)).map_err(|source| {
        SwatError::io_system(
            placeholder,
            format!("failed to write '{}': {}", path.display(), source),
        )
    })
}

/// Writes `content` unchanged, for edits that must leave the rest of a file
/// byte-identical.
pub fn write_text_verbatim(path: &Path, content: &str, placeholder: &'static str) -> SwatResult<()> {
    fs::write(path, content).map_err(|source| {
        SwatError::io_system(
            placeholder,
            format!("failed to write '{}': {}", path.display(), source),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::{
        format_scientific_f64, format_shortest_f64, normalize_text_artifact, read_text_artifact,
        write_text_artifact,
    };
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn shortest_float_keeps_decimal_suffix() {
        assert_eq!(format_shortest_f64(3.14159265359), "3.14159265359");
        assert_eq!(format_shortest_f64(0.00012345), "0.00012345");
        assert_eq!(format_shortest_f64(-50.0), "-50.0");
        assert_eq!(format_shortest_f64(1200.0), "1200.0");
        assert_eq!(format_shortest_f64(0.1), "0.1");
        assert_eq!(format_shortest_f64(0.0), "0.0");
    }

    #[test]
    fn shortest_float_switches_to_exponent_outside_fixed_range() {
        assert_eq!(format_shortest_f64(1e16), "1e+16");
        assert_eq!(format_shortest_f64(1.5e-7), "1.5e-07");
        assert_eq!(format_shortest_f64(-2.25e21), "-2.25e+21");
        assert_eq!(format_shortest_f64(123456789012345.0), "123456789012345.0");
    }

    #[test]
    fn scientific_float_uses_signed_two_digit_exponent() {
        assert_eq!(format_scientific_f64(1.2345678e19, 6), "1.234568e+19");
        assert_eq!(format_scientific_f64(0.1234567890123456, 6), "1.234568e-01");
    }

    #[test]
    fn text_artifacts_use_canonical_line_endings() {
        assert_eq!(normalize_text_artifact("alpha\r\nbeta\rgamma"), "alpha\nbeta\ngamma\n");

        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("time.sim");
        write_text_artifact(&path, "a\r\nb", "IO.TEST").expect("write should succeed");
        assert_eq!(fs::read(&path).expect("file should exist"), b"a\nb\n");
    }

    #[test]
    fn latin1_bytes_are_decoded_per_byte() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("soils.sol");
        fs::write(&path, [b'c', 0xE9, b'\n']).expect("fixture should be written");
        let text = read_text_artifact(&path, "IO.TEST").expect("read should succeed");
        assert_eq!(text, "c\u{e9}\n");
    }
}
