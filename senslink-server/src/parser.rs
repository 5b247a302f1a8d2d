//! Serial line grammar.
//!
//! Two line forms arrive from the device, newline-terminated:
//!
//! ```text
//! *H*_<name>_<pin,pin,...>_<payload>     (header / discovery announcement)
//! <name>:<v1>,<v2>,...                   (data)
//! ```
//!
//! A line is a header only if it begins with the literal `*H*_` prefix;
//! everything else is a data candidate. Value parsing is lenient: each comma
//! token may carry a `label:` prefix and a trailing unit suffix
//! (`temp:25.5C` parses as `25.5`). A line yielding no numeric value at all
//! is a parse failure and is dropped by the caller.

use once_cell::sync::Lazy;
use regex::Regex;

/// Literal prefix that classifies a line as a header.
pub const HEADER_PREFIX: &str = "*H*_";

// Header: *H*_<name>_<pins>_<payload>. The payload may itself contain
// underscores, so only the first two separators after the prefix split.
static HEADER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\*H\*_([^_]+)_([^_]+)_(.*)$").unwrap());

// Leading numeric portion of a value token, after label/unit stripping.
static VALUE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[+-]?(?:\d+\.?\d*|\.\d+)").unwrap());

/// A classified serial line.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    /// Discovery announcement carrying name, pin list, and initial payload.
    Header {
        name: String,
        pins: Vec<String>,
        payload: String,
    },

    /// Telemetry update for an already (or implicitly) known sensor.
    Data { name: String, values: Vec<f64> },
}

/// Classify and parse one line.
///
/// Returns `None` for empty lines and for lines matching neither grammar
/// form (grammar mismatch or no numeric token found); the caller decides
/// whether that warrants a log entry.
pub fn parse_line(line: &str) -> Option<ParsedLine> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if line.starts_with(HEADER_PREFIX) {
        parse_header(line)
    } else {
        parse_data(line)
    }
}

fn parse_header(line: &str) -> Option<ParsedLine> {
    let caps = HEADER_REGEX.captures(line)?;

    let name = caps.get(1)?.as_str().trim();
    if name.is_empty() {
        return None;
    }

    let pins: Vec<String> = caps
        .get(2)?
        .as_str()
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();

    let payload = caps.get(3)?.as_str().trim().to_string();

    Some(ParsedLine::Header {
        name: name.to_string(),
        pins,
        payload,
    })
}

fn parse_data(line: &str) -> Option<ParsedLine> {
    let (name, rest) = line.split_once(':')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let values: Vec<f64> = rest.split(',').filter_map(parse_value_token).collect();
    if values.is_empty() {
        return None;
    }

    Some(ParsedLine::Data {
        name: name.to_string(),
        values,
    })
}

/// Lenient numeric token parsing.
///
/// Strips an optional leading `label:`, then parses the longest leading
/// numeric run, discarding any trailing unit suffix. Returns `None` when no
/// number is present.
pub fn parse_value_token(token: &str) -> Option<f64> {
    let token = token.trim();
    let value = match token.split_once(':') {
        Some((_, v)) => v.trim(),
        None => token,
    };

    let matched = VALUE_REGEX.find(value)?;
    matched.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(line: &str) -> (String, Vec<String>, String) {
        match parse_line(line) {
            Some(ParsedLine::Header {
                name,
                pins,
                payload,
            }) => (name, pins, payload),
            other => panic!("expected header, got {:?}", other),
        }
    }

    fn data(line: &str) -> (String, Vec<f64>) {
        match parse_line(line) {
            Some(ParsedLine::Data { name, values }) => (name, values),
            other => panic!("expected data, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_temperature_header() {
        let (name, pins, payload) = header("*H*_temperature_A0_temp:25.5C");
        assert_eq!(name, "temperature");
        assert_eq!(pins, vec!["A0"]);
        assert_eq!(payload, "temp:25.5C");
    }

    #[test]
    fn test_parse_accelerometer_header() {
        let (name, pins, payload) = header("*H*_accelerometer_A1,D2,D3_x:0.02,y:-0.01,z:9.81");
        assert_eq!(name, "accelerometer");
        assert_eq!(pins, vec!["A1", "D2", "D3"]);
        assert_eq!(payload, "x:0.02,y:-0.01,z:9.81");
    }

    #[test]
    fn test_header_payload_keeps_underscores() {
        let (_, _, payload) = header("*H*_relay_D4_state_raw:1");
        assert_eq!(payload, "state_raw:1");
    }

    #[test]
    fn test_header_missing_sections_is_rejected() {
        assert_eq!(parse_line("*H*_temperature_A0"), None);
        assert_eq!(parse_line("*H*_"), None);
    }

    #[test]
    fn test_parse_single_value_data() {
        let (name, values) = data("temperature:25.6");
        assert_eq!(name, "temperature");
        assert_eq!(values, vec![25.6]);
    }

    #[test]
    fn test_parse_multi_value_data() {
        let (name, values) = data("accelerometer:0.03,-0.02,9.80");
        assert_eq!(name, "accelerometer");
        assert_eq!(values, vec![0.03, -0.02, 9.80]);
    }

    #[test]
    fn test_data_with_labels_and_units() {
        let (_, values) = data("accelerometer:x:0.02,y:-0.01,z:9.81");
        assert_eq!(values, vec![0.02, -0.01, 9.81]);

        let (_, values) = data("temperature:temp:25.5C");
        assert_eq!(values, vec![25.5]);
    }

    #[test]
    fn test_data_token_count_preserved() {
        let (_, values) = data("gps:latitude:42.360100,longitude:-71.058900,altitude:10.4");
        assert_eq!(values.len(), 3);
        assert_eq!(values, vec![42.3601, -71.0589, 10.4]);
    }

    #[test]
    fn test_missing_separator_is_parse_failure() {
        assert_eq!(parse_line("temperature25.6"), None);
    }

    #[test]
    fn test_no_numeric_token_is_parse_failure() {
        assert_eq!(parse_line("temperature:hot"), None);
        assert_eq!(parse_line("temperature:"), None);
    }

    #[test]
    fn test_empty_line_ignored() {
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("   \r"), None);
    }

    #[test]
    fn test_value_token_variants() {
        assert_eq!(parse_value_token("temp:25.5C"), Some(25.5));
        assert_eq!(parse_value_token("25.6"), Some(25.6));
        assert_eq!(parse_value_token("-0.01"), Some(-0.01));
        assert_eq!(parse_value_token("pressure:1013.25hPa"), Some(1013.25));
        assert_eq!(parse_value_token(" .5 "), Some(0.5));
        assert_eq!(parse_value_token("signal_strength:-35"), Some(-35.0));
        assert_eq!(parse_value_token("label:"), None);
        assert_eq!(parse_value_token("C25"), None);
        assert_eq!(parse_value_token(""), None);
    }
}
