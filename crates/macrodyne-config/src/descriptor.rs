//! INI-style descriptor file reader.
//!
//! Only the section named by the device label is interpreted:
//!
//! ```text
//! [SHELBY]
//! StationName = SHELBY
//! IdCode = 1690
//! NominalFrequency = 60
//! PhasorCount = 2
//! Phasor1 = VA,V
//! Phasor2 = IA,I
//! Frequency = Line frequency
//! DigitalCount = 1
//! Digital1 = Breaker status
//! ```
//!
//! Section names and keys are case-insensitive; `;` and `#` start comments.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use tracing::{debug, trace};

use crate::error::{ConfigError, Result};
use crate::model::{DigitalDefinition, NominalFrequency, PhasorDefinition, PhasorKind};

/// Device section of a descriptor file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorSection {
    pub station_name: Option<String>,
    pub id_code: Option<u16>,
    pub nominal_frequency: Option<NominalFrequency>,
    pub frequency_label: Option<String>,
    pub phasors: Vec<PhasorDefinition>,
    pub digitals: Vec<DigitalDefinition>,
}

/// Read `path` and parse the section named `label`.
pub fn load_section(path: &Path, label: &str, max_size: usize) -> Result<DescriptorSection> {
    let io_error = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = std::fs::File::open(path).map_err(io_error)?;
    let size = file.metadata().map_err(io_error)?.len();
    if size > max_size as u64 {
        return Err(ConfigError::TooLarge {
            path: path.to_path_buf(),
            size,
            max: max_size,
        });
    }

    let read_limit = u64::try_from(max_size.saturating_add(1)).unwrap_or(u64::MAX);
    let mut contents = String::new();
    file.take(read_limit)
        .read_to_string(&mut contents)
        .map_err(io_error)?;
    if contents.len() > max_size {
        return Err(ConfigError::TooLarge {
            path: path.to_path_buf(),
            size: contents.len() as u64,
            max: max_size,
        });
    }

    let section = parse_section(&contents, label)?;
    debug!(
        ?path,
        label,
        phasors = section.phasors.len(),
        digitals = section.digitals.len(),
        "loaded descriptor section"
    );
    Ok(section)
}

/// Parse the section named `label` out of descriptor text.
pub fn parse_section(contents: &str, label: &str) -> Result<DescriptorSection> {
    let wanted = label.trim().to_ascii_lowercase();
    let mut entries: HashMap<String, (usize, String)> = HashMap::new();
    let mut in_section = false;
    let mut found = false;

    for (index, raw) in contents.lines().enumerate() {
        let line_no = index + 1;
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix('[') {
            let name = rest.strip_suffix(']').ok_or_else(|| ConfigError::InvalidEntry {
                line: line_no,
                message: format!("unterminated section header {line:?}"),
            })?;
            in_section = name.trim().to_ascii_lowercase() == wanted;
            found |= in_section;
            continue;
        }
        if !in_section {
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| ConfigError::InvalidEntry {
            line: line_no,
            message: format!("expected key = value, got {line:?}"),
        })?;
        entries.insert(
            key.trim().to_ascii_lowercase(),
            (line_no, value.trim().to_string()),
        );
    }

    if !found {
        return Err(ConfigError::SectionNotFound(label.to_string()));
    }
    build_section(&entries)
}

fn strip_comment(line: &str) -> &str {
    match line.find([';', '#']) {
        Some(pos) => &line[..pos],
        None => line,
    }
}

fn build_section(entries: &HashMap<String, (usize, String)>) -> Result<DescriptorSection> {
    let mut section = DescriptorSection {
        station_name: entries.get("stationname").map(|(_, value)| value.clone()),
        frequency_label: entries.get("frequency").map(|(_, value)| value.clone()),
        ..DescriptorSection::default()
    };

    if let Some((line, value)) = entries.get("idcode") {
        section.id_code = Some(parse_number(*line, "IdCode", value)?);
    }

    if let Some((line, value)) = entries.get("nominalfrequency") {
        let hz: u8 = parse_number(*line, "NominalFrequency", value)?;
        section.nominal_frequency =
            Some(NominalFrequency::from_hz(hz).ok_or_else(|| ConfigError::InvalidEntry {
                line: *line,
                message: format!("nominal frequency must be 50 or 60, got {hz}"),
            })?);
    }

    let phasor_count = count(entries, "phasorcount", "PhasorCount")?;
    for n in 1..=phasor_count {
        let key = format!("phasor{n}");
        let (line, value) = entries
            .get(&key)
            .ok_or_else(|| ConfigError::MissingEntry(format!("Phasor{n}")))?;
        section.phasors.push(parse_phasor(*line, value)?);
    }

    let digital_count = count(entries, "digitalcount", "DigitalCount")?;
    for n in 1..=digital_count {
        let key = format!("digital{n}");
        let (_, value) = entries
            .get(&key)
            .ok_or_else(|| ConfigError::MissingEntry(format!("Digital{n}")))?;
        section.digitals.push(DigitalDefinition::new(value.clone()));
    }

    for key in entries.keys() {
        if !is_known_key(key) {
            trace!(key = %key, "ignoring unknown descriptor key");
        }
    }

    Ok(section)
}

fn count(entries: &HashMap<String, (usize, String)>, key: &str, name: &str) -> Result<usize> {
    match entries.get(key) {
        Some((line, value)) => parse_number(*line, name, value),
        None => Ok(0),
    }
}

fn parse_number<T: std::str::FromStr>(line: usize, name: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| ConfigError::InvalidEntry {
        line,
        message: format!("{name} must be a number, got {value:?}"),
    })
}

fn parse_phasor(line: usize, value: &str) -> Result<PhasorDefinition> {
    let (label, kind) = match value.rsplit_once(',') {
        Some((label, kind)) => (label.trim(), kind.trim()),
        None => (value.trim(), "V"),
    };
    let kind = kind
        .parse::<PhasorKind>()
        .map_err(|message| ConfigError::InvalidEntry { line, message })?;
    Ok(PhasorDefinition::new(label, kind))
}

fn is_known_key(key: &str) -> bool {
    const FIXED: [&str; 6] = [
        "stationname",
        "idcode",
        "nominalfrequency",
        "phasorcount",
        "frequency",
        "digitalcount",
    ];
    let numbered = |prefix: &str| {
        key.strip_prefix(prefix)
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
    };
    FIXED.contains(&key) || numbered("phasor") || numbered("digital")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "\
; shared descriptor
[OTHER]
StationName = WRONG

[Shelby]
stationname = SHELBY   ; trailing comment
IdCode = 77
NominalFrequency = 50
PhasorCount = 2
Phasor1 = Bus A voltage, V
Phasor2 = Line 1 current,i
Frequency = Bus frequency
DigitalCount = 1
Digital1 = Breaker
# unknown keys are tolerated
Vendor = Macrodyne
";

    #[test]
    fn parses_named_section_case_insensitively() {
        let section = parse_section(SAMPLE, "SHELBY").unwrap();
        assert_eq!(section.station_name.as_deref(), Some("SHELBY"));
        assert_eq!(section.id_code, Some(77));
        assert_eq!(section.nominal_frequency, Some(NominalFrequency::Hz50));
        assert_eq!(section.frequency_label.as_deref(), Some("Bus frequency"));
        assert_eq!(
            section.phasors,
            vec![
                PhasorDefinition::new("Bus A voltage", PhasorKind::Voltage),
                PhasorDefinition::new("Line 1 current", PhasorKind::Current),
            ]
        );
        assert_eq!(section.digitals, vec![DigitalDefinition::new("Breaker")]);
    }

    #[test]
    fn missing_section_is_reported() {
        let err = parse_section(SAMPLE, "NOPE").unwrap_err();
        assert!(matches!(err, ConfigError::SectionNotFound(name) if name == "NOPE"));
    }

    #[test]
    fn missing_channel_entry_is_reported() {
        let text = "[A]\nPhasorCount = 2\nPhasor1 = VA,V\n";
        let err = parse_section(text, "A").unwrap_err();
        assert!(matches!(err, ConfigError::MissingEntry(key) if key == "Phasor2"));
    }

    #[test]
    fn bad_values_carry_line_numbers() {
        let text = "[A]\nPhasorCount = 1\nPhasor1 = VA,X\n";
        assert!(matches!(
            parse_section(text, "A"),
            Err(ConfigError::InvalidEntry { line: 3, .. })
        ));

        let text = "[A]\n\nNominalFrequency = 55\n";
        assert!(matches!(
            parse_section(text, "A"),
            Err(ConfigError::InvalidEntry { line: 3, .. })
        ));

        let text = "[A\n";
        assert!(matches!(
            parse_section(text, "A"),
            Err(ConfigError::InvalidEntry { line: 1, .. })
        ));
    }

    #[test]
    fn load_enforces_size_limit() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        assert!(load_section(file.path(), "shelby", 64 * 1024).is_ok());
        assert!(matches!(
            load_section(file.path(), "shelby", 16),
            Err(ConfigError::TooLarge { max: 16, .. })
        ));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.ini");
        assert!(matches!(
            load_section(&path, "A", 1024),
            Err(ConfigError::Io { .. })
        ));
    }
}
