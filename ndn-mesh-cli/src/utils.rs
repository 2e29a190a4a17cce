//! Utility functions for the ndn-mesh CLI

use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;

/// Format a duration as a human-readable string
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();

    if total_secs < 60 {
        format!("{}.{:03}s", total_secs, duration.subsec_millis())
    } else if total_secs < 3600 {
        format!("{}m {}s", total_secs / 60, total_secs % 60)
    } else {
        let hours = total_secs / 3600;
        let mins = (total_secs % 3600) / 60;
        format!("{}h {}m {}s", hours, mins, total_secs % 60)
    }
}

/// Parse hex text, ignoring whitespace and an optional `0x` prefix
pub fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let digits = compact
        .strip_prefix("0x")
        .or_else(|| compact.strip_prefix("0X"))
        .unwrap_or(&compact);
    hex::decode(digits).context("Invalid hex payload")
}

/// Read a payload given either as hex or as a raw file
pub fn read_payload(hex: Option<&str>, file: Option<&Path>) -> Result<Vec<u8>> {
    match (hex, file) {
        (Some(text), _) => parse_hex(text),
        (None, Some(path)) => std::fs::read(path)
            .with_context(|| format!("Failed to read payload from {}", path.display())),
        (None, None) => anyhow::bail!("Either --hex or --file must be given"),
    }
}

/// Print a section header in the CLI output
pub fn print_header(title: &str) {
    let separator = "=".repeat(title.len());
    println!("\n{}", title);
    println!("{}", separator);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.500s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1h 2m 3s");
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("0x68 04\n69").unwrap(), vec![0x68, 0x04, 0x69]);
        assert!(parse_hex("6").is_err());
        assert!(parse_hex("zz").is_err());
    }

    #[test]
    fn test_read_payload_needs_a_source() {
        assert!(read_payload(None, None).is_err());
    }
}
