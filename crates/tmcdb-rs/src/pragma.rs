// crates/tmcdb-rs/src/pragma.rs

//! The pragma mini-language: tokenizing annotation text into ordered
//! `(key, value)` pairs and normalizing the recognized value grammars
//! (I/O direction, update and archive rates, array selectors, index
//! formats).
//!
//! Normalizers return a plain detail string on failure; callers attach the
//! chain context before surfacing it.

use crate::error::TmcDbError;

/// I/O direction synonyms mapping to read-write.
const IO_OUTPUT: &[&str] = &["output", "io", "o", "rw"];
/// I/O direction synonyms mapping to read-only.
const IO_INPUT: &[&str] = &["input", "i", "ro"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoDirection {
    Input,
    Output,
}

impl IoDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            IoDirection::Input => "input",
            IoDirection::Output => "output",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMethod {
    Poll,
    Notify,
}

/// A normalized `update:` directive.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRate {
    pub seconds: f64,
    pub frequency: f64,
    pub method: UpdateMethod,
}

impl Default for UpdateRate {
    fn default() -> Self {
        UpdateRate {
            seconds: 1.0,
            frequency: 1.0,
            method: UpdateMethod::Poll,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveMethod {
    Scan,
    Monitor,
}

impl ArchiveMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveMethod::Scan => "scan",
            ArchiveMethod::Monitor => "monitor",
        }
    }
}

/// A normalized `archive:` directive.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveSettings {
    pub seconds: f64,
    pub frequency: f64,
    pub method: ArchiveMethod,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        ArchiveSettings {
            seconds: 1.0,
            frequency: 1.0,
            method: ArchiveMethod::Scan,
        }
    }
}

/// Unwrap `{attribute 'pytmc' := ' ... '}` framing, if present.
///
/// Fails only when the framing is present but unbalanced; bare pragma text
/// passes through untouched.
fn strip_attribute_framing<'a>(text: &'a str, path: &str) -> Result<&'a str, TmcDbError> {
    let trimmed = text.trim();
    if !trimmed.starts_with('{') {
        return Ok(text);
    }

    let unbalanced = |detail: &str| TmcDbError::MalformedPragma {
        path: path.to_string(),
        detail: detail.to_string(),
    };

    let inner = trimmed
        .strip_suffix('}')
        .ok_or_else(|| unbalanced("attribute framing is missing the closing brace"))?;
    let inner = &inner[1..];
    let assign = inner
        .find(":=")
        .ok_or_else(|| unbalanced("attribute framing is missing `:=`"))?;
    let value = inner[assign + 2..].trim();
    if value.len() < 2 || !value.starts_with('\'') || !value.ends_with('\'') {
        return Err(unbalanced("attribute value is not single-quoted"));
    }
    Ok(&value[1..value.len() - 1])
}

/// Split pragma text into ordered `(key, value)` pairs.
///
/// Semicolons are equivalent to newlines; each non-empty line splits at its
/// first `:`. Whitespace around the split is trimmed, internal whitespace
/// in values is preserved.
pub fn parse_pragma(text: &str, path: &str) -> Result<Vec<(String, String)>, TmcDbError> {
    let body = strip_attribute_framing(text, path)?;

    let mut pairs = Vec::new();
    for line in body.split(['\n', '\r', ';']) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let colon = line.find(':').ok_or_else(|| TmcDbError::MalformedPragma {
            path: path.to_string(),
            detail: format!("line without a `key: value` separator: {line:?}"),
        })?;
        let key = line[..colon].trim();
        if key.is_empty() || key.contains(char::is_whitespace) {
            return Err(TmcDbError::MalformedPragma {
                path: path.to_string(),
                detail: format!("invalid pragma key in line {line:?}"),
            });
        }
        let value = line[colon + 1..].trim();
        pairs.push((key.to_string(), value.to_string()));
    }
    Ok(pairs)
}

/// Inverse of [`parse_pragma`] on the ordered-pair representation.
pub fn serialize_pragma(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| {
            if value.is_empty() {
                format!("{key}:")
            } else {
                format!("{key}: {value}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split the first whitespace run of a `field:` value into the field name
/// and its setting.
pub fn split_field(value: &str) -> (String, String) {
    let value = value.trim();
    match value.find(char::is_whitespace) {
        Some(idx) => (
            value[..idx].to_string(),
            value[idx..].trim_start().to_string(),
        ),
        None => (value.to_string(), String::new()),
    }
}

/// Map an `io:` synonym to its canonical direction.
pub fn normalize_io(io: &str) -> Result<IoDirection, String> {
    let io = io.trim().to_ascii_lowercase();
    if IO_OUTPUT.contains(&io.as_str()) {
        Ok(IoDirection::Output)
    } else if IO_INPUT.contains(&io.as_str()) {
        Ok(IoDirection::Input)
    } else {
        Err(format!("invalid I/O specifier {io:?}"))
    }
}

/// Parse `<rate>{s|Hz}` into `(seconds, frequency)`.
fn parse_rate(text: &str) -> Result<(f64, f64, &str), String> {
    let digits = text
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(text.len());
    let rate: f64 = text[..digits]
        .parse()
        .map_err(|_| format!("invalid rate in {text:?}"))?;
    if rate <= 0.0 {
        return Err(format!("rate must be positive in {text:?}"));
    }

    let rest = text[digits..].trim_start();
    if let Some(rest) = rest.strip_prefix("hz") {
        Ok((1.0 / rate, rate, rest))
    } else if let Some(rest) = rest.strip_prefix('s') {
        Ok((rate, 1.0 / rate, rest))
    } else {
        Err(format!("missing `s` or `Hz` unit in {text:?}"))
    }
}

/// Parse an `update:` value, e.g. `1s`, `10Hz notify`, `.5 s poll`.
pub fn parse_update_rate(update: &str) -> Result<UpdateRate, String> {
    let update = update.trim().to_ascii_lowercase();
    if update.is_empty() {
        return Ok(UpdateRate::default());
    }

    let (seconds, frequency, rest) = parse_rate(&update)?;
    let method = match rest.trim() {
        "" | "poll" => UpdateMethod::Poll,
        "notify" => UpdateMethod::Notify,
        other => return Err(format!("invalid update method {other:?}")),
    };

    Ok(UpdateRate {
        seconds,
        frequency,
        method,
    })
}

/// Parse an `archive:` value, e.g. `1s`, `10s monitor`, or `no` to disable
/// archiving entirely.
pub fn parse_archive_settings(archive: &str) -> Result<Option<ArchiveSettings>, String> {
    let archive = archive.trim().to_ascii_lowercase();
    if archive == "no" {
        return Ok(None);
    }
    if archive.is_empty() {
        return Ok(Some(ArchiveSettings::default()));
    }

    let (seconds, frequency, rest) = parse_rate(&archive)?;
    let method = match rest.trim() {
        "" | "scan" => ArchiveMethod::Scan,
        "monitor" => ArchiveMethod::Monitor,
        other => return Err(format!("invalid archive method {other:?}")),
    };

    Ok(Some(ArchiveSettings {
        seconds,
        frequency,
        method,
    }))
}

/// Expand an `array:` selector into the selected indices.
///
/// The grammar is a comma list of `N`, `N..M`, `N..`, `..M`, and
/// `N..M..step`; bounds are inclusive and every index must fall within the
/// declared dimensions. An empty selector selects the full range.
pub fn parse_array_selector(selector: &str, bounds: (i64, i64)) -> Result<Vec<i64>, String> {
    let (low, high) = bounds;
    let selector = selector.trim();
    if selector.is_empty() {
        return Ok((low..=high).collect());
    }

    let mut indices = Vec::new();
    for element in selector.split(',') {
        let element = element.trim();
        if !element.contains("..") {
            let index: i64 = element
                .parse()
                .map_err(|_| format!("invalid array index {element:?}"))?;
            push_checked(&mut indices, index, low, high)?;
            continue;
        }

        let parts: Vec<&str> = element.split("..").collect();
        if parts.len() > 3 {
            return Err(format!("invalid array range {element:?}"));
        }
        let parse_part = |part: &str| -> Result<Option<i64>, String> {
            let part = part.trim();
            if part.is_empty() {
                return Ok(None);
            }
            part.parse()
                .map(Some)
                .map_err(|_| format!("invalid array bound {part:?}"))
        };

        let from = parse_part(parts[0])?.unwrap_or(low);
        let to = parse_part(parts.get(1).copied().unwrap_or(""))?.unwrap_or(high);
        let step = parse_part(parts.get(2).copied().unwrap_or(""))?.unwrap_or(1);
        if step <= 0 {
            return Err(format!("invalid array step in {element:?}"));
        }

        let mut index = from;
        while index <= to {
            push_checked(&mut indices, index, low, high)?;
            index += step;
        }
    }
    Ok(indices)
}

fn push_checked(indices: &mut Vec<i64>, index: i64, low: i64, high: i64) -> Result<(), String> {
    if index < low || index > high {
        return Err(format!(
            "array index {index} out of bounds {low}..{high}"
        ));
    }
    indices.push(index);
    Ok(())
}

/// Apply an `expand:` format (printf-style `%d` with optional zero/width,
/// e.g. `:%.2d`) to an array index.
pub fn expand_format(format: &str, index: i64) -> Result<String, String> {
    let percent = format
        .find('%')
        .ok_or_else(|| format!("expand format {format:?} has no `%` directive"))?;
    let prefix = &format[..percent];
    let rest = &format[percent + 1..];

    let rest = rest.strip_prefix(['.', '0']).unwrap_or(rest);
    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let width: usize = if digits_end == 0 {
        1
    } else {
        rest[..digits_end]
            .parse()
            .map_err(|_| format!("invalid width in expand format {format:?}"))?
    };
    let suffix = rest[digits_end..]
        .strip_prefix('d')
        .ok_or_else(|| format!("expand format {format:?} must end its directive with `d`"))?;

    Ok(format!("{prefix}{index:0width$}{suffix}"))
}

/// Default index format for unrolled arrays. The width auto-sizes to the
/// largest selected index, with a floor of two digits.
pub fn auto_expand_format(max_index: i64) -> String {
    let width = if max_index <= 0 {
        2
    } else {
        max_index.to_string().len() + 1
    };
    format!(":%.{width}d")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_lines_and_semicolons() {
        let parsed = parse_pragma("pv: TEST:SCALE; io: i\nupdate: 1s poll", "x").unwrap();
        assert_eq!(
            parsed,
            pairs(&[("pv", "TEST:SCALE"), ("io", "i"), ("update", "1s poll")])
        );
    }

    #[test]
    fn test_parse_preserves_internal_whitespace() {
        let parsed = parse_pragma("field: DESC My long description", "x").unwrap();
        assert_eq!(parsed, pairs(&[("field", "DESC My long description")]));
        let (name, setting) = split_field(&parsed[0].1);
        assert_eq!(name, "DESC");
        assert_eq!(setting, "My long description");
    }

    #[test]
    fn test_attribute_framing() {
        let framed = "{attribute 'pytmc' := 'pv: A; io: i'}";
        let parsed = parse_pragma(framed, "x").unwrap();
        assert_eq!(parsed, pairs(&[("pv", "A"), ("io", "i")]));

        for bad in [
            "{attribute 'pytmc' := 'pv: A'",
            "{attribute 'pytmc' = 'pv: A'}",
            "{attribute 'pytmc' := pv: A}",
        ] {
            assert!(matches!(
                parse_pragma(bad, "x"),
                Err(TmcDbError::MalformedPragma { .. })
            ));
        }
    }

    #[test]
    fn test_line_without_separator_is_malformed() {
        assert!(matches!(
            parse_pragma("pv TEST", "x"),
            Err(TmcDbError::MalformedPragma { .. })
        ));
    }

    #[test]
    fn test_serialize_round_trip() {
        let original = pairs(&[
            ("pv", "TEST:A"),
            ("io", "io"),
            ("field", "DESC a b  c"),
            ("archive_fields", ""),
        ]);
        let reparsed = parse_pragma(&serialize_pragma(&original), "x").unwrap();
        assert_eq!(original, reparsed);
    }

    #[test]
    fn test_normalize_io() {
        for synonym in ["i", "input", "ro"] {
            assert_eq!(normalize_io(synonym), Ok(IoDirection::Input));
        }
        for synonym in ["o", "output", "rw", "io"] {
            assert_eq!(normalize_io(synonym), Ok(IoDirection::Output));
        }
        assert!(normalize_io("sideways").is_err());
    }

    #[test]
    fn test_parse_update_rate() {
        let update = parse_update_rate("10Hz notify").unwrap();
        assert_eq!(update.method, UpdateMethod::Notify);
        assert!((update.seconds - 0.1).abs() < 1e-9);
        assert!((update.frequency - 10.0).abs() < 1e-9);

        let update = parse_update_rate("2 s").unwrap();
        assert_eq!(update.method, UpdateMethod::Poll);
        assert!((update.seconds - 2.0).abs() < 1e-9);

        assert_eq!(parse_update_rate(""), Ok(UpdateRate::default()));
        assert!(parse_update_rate("fast").is_err());
        assert!(parse_update_rate("1s sometimes").is_err());
    }

    #[test]
    fn test_parse_archive_settings() {
        assert_eq!(parse_archive_settings("no"), Ok(None));
        let archive = parse_archive_settings("0.5s monitor").unwrap().unwrap();
        assert_eq!(archive.method, ArchiveMethod::Monitor);
        assert!((archive.seconds - 0.5).abs() < 1e-9);

        let archive = parse_archive_settings("2Hz").unwrap().unwrap();
        assert_eq!(archive.method, ArchiveMethod::Scan);
        assert!((archive.seconds - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_array_selector() {
        assert_eq!(parse_array_selector("", (0, 3)).unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(
            parse_array_selector("0..1, 99", (0, 100)).unwrap(),
            vec![0, 1, 99]
        );
        assert_eq!(parse_array_selector("2..", (0, 4)).unwrap(), vec![2, 3, 4]);
        assert_eq!(parse_array_selector("..1", (0, 4)).unwrap(), vec![0, 1]);
        assert_eq!(
            parse_array_selector("0..4..2", (0, 4)).unwrap(),
            vec![0, 2, 4]
        );
        assert!(parse_array_selector("7", (0, 4)).is_err());
        assert!(parse_array_selector("a", (0, 4)).is_err());
    }

    #[test]
    fn test_expand_format() {
        assert_eq!(expand_format(":%.2d", 5).unwrap(), ":05");
        assert_eq!(expand_format(":%.3d", 99).unwrap(), ":099");
        assert_eq!(expand_format("_%d_", 7).unwrap(), "_7_");
        assert!(expand_format("plain", 1).is_err());
    }

    #[test]
    fn test_auto_expand_width() {
        assert_eq!(auto_expand_format(5), ":%.2d");
        assert_eq!(auto_expand_format(99), ":%.3d");
        assert_eq!(auto_expand_format(0), ":%.2d");
    }
}
