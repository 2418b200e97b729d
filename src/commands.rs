//! CLI commands for R-Droid previews
//!
//! Inspection commands over an opened [`PreviewSession`]. Each command
//! renders its report as text for the caller to print.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use anyhow::{Context, Result};
use r_droid_rclass::{BinaryClassProvider, ClassSummary};
use r_droid_resources::ResourceType;
use tracing::info;

use crate::session::PreviewSession;

/// Parse `@string/title`, `string/title` or `@android:color/white`
pub fn parse_resource_reference(text: &str) -> Result<(ResourceType, String)> {
    let reference = text.trim().trim_start_matches(['@', '?']);
    let (type_name, name) = reference
        .split_once('/')
        .ok_or_else(|| anyhow::anyhow!("Expected a resource like @string/name, got '{}'", text))?;
    let type_name = type_name.rsplit(':').next().unwrap_or(type_name);
    let resource_type = ResourceType::from_name(type_name)
        .ok_or_else(|| anyhow::anyhow!("Unknown resource type '{}'", type_name))?;
    if name.is_empty() {
        return Err(anyhow::anyhow!("Missing resource name in '{}'", text));
    }
    Ok((resource_type, name.to_string()))
}

fn parse_type(name: &str) -> Result<ResourceType> {
    ResourceType::from_name(name).ok_or_else(|| anyhow::anyhow!("Unknown resource type '{}'", name))
}

/// Resolve one resource for a device configuration
pub struct ResolveCommand {
    pub module: Option<String>,
    pub resource: String,
    pub qualifiers: Option<String>,
}

impl ResolveCommand {
    pub fn execute(&self, session: &PreviewSession) -> Result<String> {
        let module = session.module_or_default(self.module.as_deref())?;
        let (resource_type, name) = parse_resource_reference(&self.resource)?;
        let config = session.runtime_config(self.qualifiers.as_deref())?;

        info!("Resolving @{}/{} in {} for [{}]", resource_type, name, module, config);
        let report = match session.resolve(module, resource_type, &name, &config)? {
            Some(item) => {
                let qualifiers = if item.config.is_default() {
                    "default".to_string()
                } else {
                    item.config.to_string()
                };
                format!(
                    "{} [{}] = {}\n  from {}:{}\n",
                    item.url(),
                    qualifiers,
                    item.value.display_value(),
                    item.locator.file.display(),
                    item.locator.line
                )
            }
            None => format!("@{}/{} not found for [{}]\n", resource_type, name, config),
        };
        Ok(report)
    }
}

/// Print the ids of a module's resources
pub struct IdsCommand {
    pub module: Option<String>,
    pub resource_type: Option<String>,
    pub json: bool,
}

impl IdsCommand {
    pub fn execute(&self, session: &PreviewSession) -> Result<String> {
        let module = session.module_or_default(self.module.as_deref())?;
        let build = session.prepare(module)?;
        let repository = &build.repository;

        let types = match &self.resource_type {
            Some(name) => vec![parse_type(name)?],
            None => repository.types(),
        };

        let ids = session.manager().ids();
        let mut entries: BTreeMap<String, String> = BTreeMap::new();
        let mut report = String::new();
        for resource_type in types {
            if resource_type == ResourceType::Styleable {
                continue;
            }
            for name in repository.names_of_type(resource_type) {
                let id = ids.id_for(resource_type, &name);
                entries.insert(format!("{}/{}", resource_type, name), id.to_string());
                writeln!(report, "{} @{}/{}", id, resource_type, name)?;
            }
        }

        if self.json {
            return Ok(serde_json::to_string_pretty(&entries)? + "\n");
        }
        Ok(report)
    }
}

/// Print the names of one resource type
pub struct NamesCommand {
    pub module: Option<String>,
    pub resource_type: String,
}

impl NamesCommand {
    pub fn execute(&self, session: &PreviewSession) -> Result<String> {
        let module = session.module_or_default(self.module.as_deref())?;
        let resource_type = parse_type(&self.resource_type)?;
        let names = session.manager().names_of_type(module, resource_type)?;

        let mut report = String::new();
        for name in names {
            writeln!(report, "{}", name)?;
        }
        Ok(report)
    }
}

/// Print the locales a module's resources are translated to
pub struct LocalesCommand {
    pub module: Option<String>,
}

impl LocalesCommand {
    pub fn execute(&self, session: &PreviewSession) -> Result<String> {
        let mut report = String::new();
        match &self.module {
            Some(module) => {
                let build = session.prepare(module)?;
                for locale in build.repository.locales() {
                    match &locale.region {
                        Some(region) => writeln!(report, "{}-{}", locale.language, region)?,
                        None => writeln!(report, "{}", locale.language)?,
                    }
                }
            }
            None => {
                for language in session.languages() {
                    writeln!(report, "{}", language)?;
                }
            }
        }
        Ok(report)
    }
}

/// Generate R classes and print or write them
pub struct RClassCommand {
    pub module: Option<String>,
    /// Binary name of one class to describe, e.g. `com.example.R$string`
    pub class: Option<String>,
    /// Directory receiving the `.class` files
    pub output: Option<PathBuf>,
}

impl RClassCommand {
    pub fn execute(&self, session: &PreviewSession) -> Result<String> {
        let module = session.module_or_default(self.module.as_deref())?;
        let build = session.prepare(module)?;
        let provider = session.class_provider();

        let class_names = match &self.class {
            Some(name) => vec![name.clone()],
            None => {
                let outer = format!("{}.R", build.package);
                let mut names = vec![outer.clone()];
                names.extend(
                    build
                        .repository
                        .types()
                        .iter()
                        .map(|ty| format!("{}${}", outer, ty.name())),
                );
                names
            }
        };

        let mut report = String::new();
        for class_name in &class_names {
            let Some(bytes) = provider.find_class_bytes(class_name)? else {
                writeln!(report, "{}: not an R class of this project", class_name)?;
                continue;
            };

            if let Some(output) = &self.output {
                let path = output.join(format!("{}.class", class_name.replace('.', "/")));
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create {:?}", parent))?;
                }
                std::fs::write(&path, &bytes).with_context(|| format!("Failed to write {:?}", path))?;
                writeln!(report, "{} -> {} ({} bytes)", class_name, path.display(), bytes.len())?;
                continue;
            }

            let summary = ClassSummary::parse(&bytes)
                .with_context(|| format!("Generated class {} does not parse", class_name))?;
            writeln!(report, "{} ({} bytes, {} fields)", class_name, bytes.len(), summary.fields.len())?;
            if self.class.is_some() {
                let arrays = summary.static_int_arrays()?;
                for field in &summary.fields {
                    match (field.constant, arrays.get(&field.name)) {
                        (Some(value), _) => writeln!(report, "  int {} = {:#x}", field.name, value)?,
                        (None, Some(values)) => {
                            let values: Vec<String> = values.iter().map(|v| format!("{:#x}", v)).collect();
                            writeln!(report, "  int[] {} = {{ {} }}", field.name, values.join(", "))?
                        }
                        (None, None) => writeln!(report, "  {} {}", field.descriptor, field.name)?,
                    }
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use r_droid_core::AppConfig;

    fn session(root: &Path) -> PreviewSession {
        fs::create_dir_all(root.join("res/values")).unwrap();
        fs::create_dir_all(root.join("res/values-fr")).unwrap();
        fs::write(
            root.join("rdroid.toml"),
            "name = \"cli\"\n\n[[modules]]\nname = \"app\"\npackage = \"com.example\"\nresource_dirs = [\"res\"]\n",
        )
        .unwrap();
        fs::write(
            root.join("res/values/values.xml"),
            r#"<resources><string name="title">Title</string><color name="accent">#ff0000</color></resources>"#,
        )
        .unwrap();
        fs::write(
            root.join("res/values-fr/values.xml"),
            r#"<resources><string name="title">Titre</string></resources>"#,
        )
        .unwrap();
        PreviewSession::open(root, AppConfig::default()).unwrap()
    }

    #[test]
    fn test_parse_resource_reference() {
        assert_eq!(
            parse_resource_reference("@string/title").unwrap(),
            (ResourceType::String, "title".to_string())
        );
        assert_eq!(
            parse_resource_reference("color/accent").unwrap(),
            (ResourceType::Color, "accent".to_string())
        );
        assert_eq!(
            parse_resource_reference("?android:attr/textColor").unwrap(),
            (ResourceType::Attr, "textColor".to_string())
        );
        assert!(parse_resource_reference("title").is_err());
        assert!(parse_resource_reference("@bogus/title").is_err());
        assert!(parse_resource_reference("@string/").is_err());
    }

    #[test]
    fn test_resolve_command() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());

        let command = ResolveCommand {
            module: None,
            resource: "@string/title".into(),
            qualifiers: Some("fr".into()),
        };
        let report = command.execute(&session).unwrap();
        assert!(report.starts_with("@string/title [fr] = Titre"), "{}", report);

        let command = ResolveCommand {
            module: None,
            resource: "@string/missing".into(),
            qualifiers: None,
        };
        assert!(command.execute(&session).unwrap().contains("not found"));
    }

    #[test]
    fn test_ids_and_names_commands() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());

        let ids = IdsCommand {
            module: Some("app".into()),
            resource_type: None,
            json: true,
        }
        .execute(&session)
        .unwrap();
        let parsed: BTreeMap<String, String> = serde_json::from_str(&ids).unwrap();
        assert_eq!(parsed["string/title"], "0x7f140000");
        assert!(parsed["color/accent"].starts_with("0x7f"));

        let names = NamesCommand {
            module: None,
            resource_type: "string".into(),
        }
        .execute(&session)
        .unwrap();
        assert_eq!(names, "title\n");

        let locales = LocalesCommand { module: None }.execute(&session).unwrap();
        assert_eq!(locales, "fr\n");
    }

    #[test]
    fn test_rclass_command_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());
        let output = dir.path().join("out");

        let report = RClassCommand {
            module: None,
            class: None,
            output: Some(output.clone()),
        }
        .execute(&session)
        .unwrap();
        assert_eq!(report.lines().count(), 3);
        assert!(output.join("com/example/R.class").is_file());
        assert!(output.join("com/example/R$string.class").is_file());

        let described = RClassCommand {
            module: None,
            class: Some("com.example.R$string".into()),
            output: None,
        }
        .execute(&session)
        .unwrap();
        assert!(described.contains("int title = 0x7f140000"), "{}", described);
    }
}
