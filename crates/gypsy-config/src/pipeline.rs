//! Pipeline YAML parsing.

use crate::{ConfigError, ConfigResult};
use gypsy_core::Pipeline;

/// Parse a pipeline definition from YAML text.
///
/// ```yaml
/// name: demo
/// container: ubuntu:24.04
/// materials:
///   - type: github
///     uri: ranjib/gypsy
///     metadata:
///       branch: main
/// scripts:
///   - command: make
///     cwd: /src
/// artifacts:
///   - name: report.txt
///     path: /root/report.txt
/// ```
pub fn parse_pipeline(yaml: &str) -> ConfigResult<Pipeline> {
    let pipeline: Pipeline = serde_yml::from_str(yaml)?;
    validate(&pipeline)?;
    Ok(pipeline)
}

/// Render a pipeline back to YAML.
pub fn render_pipeline(pipeline: &Pipeline) -> ConfigResult<String> {
    Ok(serde_yml::to_string(pipeline)?)
}

fn validate(pipeline: &Pipeline) -> ConfigResult<()> {
    if pipeline.name.trim().is_empty() {
        return Err(ConfigError::MissingField("name".to_string()));
    }
    if pipeline.name.contains('/') {
        return Err(ConfigError::invalid("name", "must not contain '/'"));
    }
    if pipeline.container.trim().is_empty() {
        return Err(ConfigError::MissingField("container".to_string()));
    }

    for (i, material) in pipeline.materials.iter().enumerate() {
        if material.material_type.is_empty() {
            return Err(ConfigError::MissingField(format!("materials[{}].type", i)));
        }
        if material.uri.is_empty() {
            return Err(ConfigError::MissingField(format!("materials[{}].uri", i)));
        }
    }

    for (i, script) in pipeline.scripts.iter().enumerate() {
        if script.command.trim().is_empty() {
            return Err(ConfigError::MissingField(format!("scripts[{}].command", i)));
        }
    }

    let mut seen = std::collections::HashSet::new();
    for artifact in &pipeline.artifacts {
        if artifact.name.is_empty() || artifact.path.is_empty() {
            return Err(ConfigError::invalid(
                "artifacts",
                "name and path are required",
            ));
        }
        if !seen.insert(artifact.name.as_str()) {
            return Err(ConfigError::invalid(
                "artifacts",
                format!("duplicate artifact '{}'", artifact.name),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gypsy_core::{Material, Script};

    #[test]
    fn test_parse_simple_pipeline() {
        let yaml = r#"
name: demo
container: ubuntu
scripts:
  - command: echo hi
  - command: "false"
"#;
        let pipeline = parse_pipeline(yaml).unwrap();
        assert_eq!(pipeline.name, "demo");
        assert_eq!(pipeline.container, "ubuntu");
        assert_eq!(pipeline.scripts.len(), 2);
        assert_eq!(pipeline.scripts[1].command, "false");
        assert!(pipeline.materials.is_empty());
        assert!(pipeline.artifacts.is_empty());
    }

    #[test]
    fn test_parse_full_pipeline() {
        let yaml = r#"
name: gypsy
container: rust-base
materials:
  - type: github
    uri: ranjib/gypsy
    metadata:
      branch: main
scripts:
  - command: cargo build
    cwd: /src
artifacts:
  - name: report.txt
    path: /root/report.txt
"#;
        let pipeline = parse_pipeline(yaml).unwrap();
        assert_eq!(pipeline.materials[0].material_type, "github");
        assert_eq!(pipeline.materials[0].branch(), "main");
        assert_eq!(pipeline.scripts[0].working_dir(), "/src");
        assert_eq!(pipeline.artifacts[0].path, "/root/report.txt");
    }

    #[test]
    fn test_round_trip() {
        let pipeline = Pipeline::new("demo", "ubuntu")
            .with_material(Material::new("github", "ranjib/gypsy").with_metadata("branch", "dev"))
            .with_script(Script::new("echo hi"))
            .with_script(Script::new("make").in_dir("/src"))
            .with_artifact("report.txt", "/root/report.txt");

        let yaml = render_pipeline(&pipeline).unwrap();
        let parsed = parse_pipeline(&yaml).unwrap();
        assert_eq!(parsed, pipeline);
    }

    #[test]
    fn test_missing_container() {
        let err = parse_pipeline("name: demo\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(f) if f == "container"));
    }

    #[test]
    fn test_empty_command_rejected() {
        let yaml = "name: demo\ncontainer: ubuntu\nscripts:\n  - command: ''\n";
        let err = parse_pipeline(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(f) if f == "scripts[0].command"));
    }

    #[test]
    fn test_duplicate_artifact_rejected() {
        let yaml = r#"
name: demo
container: ubuntu
artifacts:
  - name: a
    path: /a
  - name: a
    path: /b
"#;
        assert!(matches!(
            parse_pipeline(yaml),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_malformed_yaml() {
        assert!(matches!(
            parse_pipeline("name: [unterminated"),
            Err(ConfigError::Yaml(_))
        ));
    }
}
