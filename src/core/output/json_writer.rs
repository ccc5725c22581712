//! Context pack JSON writer and reader.

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

use tracing::{debug, warn};

use crate::core::pack::{SCHEMA_VERSION, UniversalContextPack, schema_major};
use crate::error::{CtxpackError, Result};

/// Writes a pack to `output_path` as pretty JSON.
pub fn write_json(pack: &UniversalContextPack, output_path: impl AsRef<Path>) -> Result<()> {
    let output_path = output_path.as_ref();
    let json = to_json(pack)?;
    let mut file = File::create(output_path)?;
    file.write_all(json.as_bytes())?;
    debug!(path = %output_path.display(), bytes = json.len(), "wrote context pack");
    Ok(())
}

/// Converts a pack to a pretty JSON string.
///
/// Same format as `write_json`, but returns a String instead of writing to file.
pub fn to_json(pack: &UniversalContextPack) -> Result<String> {
    Ok(serde_json::to_string_pretty(pack)?)
}

/// Parses a pack previously produced by [`to_json`].
///
/// # Errors
///
/// Returns [`CtxpackError::Validation`] if the pack was written by an
/// incompatible schema major version or breaks a pack invariant. A newer or
/// older minor version is accepted with a warning.
pub fn from_json(json: &str) -> Result<UniversalContextPack> {
    let pack: UniversalContextPack = serde_json::from_str(json)?;
    check_version(&pack.version)?;
    pack.validate()?;
    Ok(pack)
}

/// Reads and validates a pack from `input_path`.
pub fn read_json(input_path: impl AsRef<Path>) -> Result<UniversalContextPack> {
    let input_path = input_path.as_ref();
    let reader = BufReader::new(File::open(input_path)?);
    let pack: UniversalContextPack = serde_json::from_reader(reader)?;
    check_version(&pack.version)?;
    pack.validate()?;
    debug!(path = %input_path.display(), projects = pack.projects.len(), "read context pack");
    Ok(pack)
}

fn check_version(version: &str) -> Result<()> {
    let current = schema_major(SCHEMA_VERSION);
    match schema_major(version) {
        None => Err(CtxpackError::validation(format!(
            "pack version '{version}' is not a semantic version"
        ))),
        Some(major) if Some(major) != current => Err(CtxpackError::validation(format!(
            "pack schema {version} is incompatible with {SCHEMA_VERSION}"
        ))),
        Some(_) => {
            if version != SCHEMA_VERSION {
                warn!(found = version, expected = SCHEMA_VERSION, "pack schema version differs");
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pack::{ProjectBrief, ProjectStatus};
    use chrono::{TimeZone, Utc};
    use tempfile::NamedTempFile;

    fn sample_pack() -> UniversalContextPack {
        let ts = Utc.with_ymd_and_hms(2024, 6, 15, 12, 30, 0).unwrap();
        let mut pack = UniversalContextPack::new("chatgpt", ts).with_projects(vec![
            ProjectBrief::new("Rust CLI", 0.8, ts)
                .with_description("A parser")
                .with_tech(["Rust", "clap"])
                .with_status(ProjectStatus::Paused)
                .with_conversation("c1"),
        ]);
        pack.user_profile.role = Some("developer".to_string());
        pack.metadata.insert("custom".to_string(), serde_json::json!({"nested": [1, 2]}));
        pack
    }

    #[test]
    fn test_to_json_round_trip() {
        let pack = sample_pack();
        let json = to_json(&pack).unwrap();
        assert!(json.contains(r#""current_status": "paused""#));
        assert_eq!(from_json(&json).unwrap(), pack);
    }

    #[test]
    fn test_write_and_read_json() {
        let pack = sample_pack();
        let temp_file = NamedTempFile::new().unwrap();
        write_json(&pack, temp_file.path()).unwrap();
        assert_eq!(read_json(temp_file.path()).unwrap(), pack);
    }

    #[test]
    fn test_major_mismatch_rejected() {
        let mut pack = sample_pack();
        pack.version = "2.0.0".to_string();
        let json = serde_json::to_string(&pack).unwrap();
        let err = from_json(&json).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("incompatible"));
    }

    #[test]
    fn test_minor_mismatch_accepted() {
        let mut pack = sample_pack();
        pack.version = "1.4.2".to_string();
        let json = serde_json::to_string(&pack).unwrap();
        assert_eq!(from_json(&json).unwrap().version, "1.4.2");
    }

    #[test]
    fn test_invalid_score_rejected() {
        let mut pack = sample_pack();
        pack.projects[0].relevance_score = 1.5;
        let json = serde_json::to_string(&pack).unwrap();
        assert!(from_json(&json).unwrap_err().is_validation());
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(from_json("{not json"), Err(CtxpackError::Json(_))));
    }
}
