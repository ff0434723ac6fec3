//! Loading the simulation payload for `duet run`.
use std::path::Path;

use duet_core::SimulationConfig;

/// Reads a JSON `SimulationConfig` from `path`, or the built-in scenario when
/// no path is given. Optional fields take their serde defaults.
pub fn load(path: Option<&Path>) -> Result<SimulationConfig, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(SimulationConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    let config: SimulationConfig = serde_json::from_str(&raw)
        .map_err(|e| format!("invalid simulation config in {}: {e}", path.display()))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use duet_core::AgentRole;
    use std::io::Write as _;

    fn write(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write");
        file
    }

    #[test]
    fn no_path_uses_default_scenario() {
        let config = load(None).expect("default");
        assert_eq!(config, SimulationConfig::default());
    }

    #[test]
    fn reads_config_from_file() {
        let mut expected = SimulationConfig::default();
        expected.max_turns = 4;
        expected.first_speaker = AgentRole::Sim;
        let file = write(&serde_json::to_string(&expected).expect("json"));

        let config = load(Some(file.path())).expect("config");
        assert_eq!(config, expected);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = SimulationConfig::default();
        config.max_turns = 500;
        let file = write(&serde_json::to_string(&config).expect("json"));

        let err = load(Some(file.path())).expect_err("too many turns");
        assert!(err.to_string().contains("500"), "{err}");
    }

    #[test]
    fn malformed_json_names_the_file() {
        let file = write("{ not json");
        let err = load(Some(file.path())).expect_err("malformed");
        assert!(err.to_string().contains("invalid simulation config"));
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().expect("dir");
        let err = load(Some(&dir.path().join("absent.json"))).expect_err("missing");
        assert!(err.to_string().contains("failed to read"));
    }
}
