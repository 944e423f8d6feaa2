//! Cloud assembly output: rendered templates plus a manifest describing them.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::compose::SynthesizedStack;
use crate::error::SynthError;

/// Manifest schema version.
pub const MANIFEST_VERSION: &str = "1.0";

/// Manifest file name inside the output directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Template rendering format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TemplateFormat {
    #[default]
    Json,
    Yaml,
}

impl TemplateFormat {
    /// File extension without the dot.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
        }
    }
}

impl fmt::Display for TemplateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for TemplateFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            other => Err(format!("unknown template format '{other}' (expected json or yaml)")),
        }
    }
}

/// `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub generated_at: DateTime<Utc>,
    pub stacks: BTreeMap<String, ManifestEntry>,
}

/// One stack in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// `aws://<account>/<region>`.
    pub environment: String,
    pub template_file: String,
    pub production: bool,
    pub resource_count: usize,
    pub outputs: Vec<String>,
}

/// Paths written by [`write_assembly`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyFiles {
    pub template: PathBuf,
    pub manifest: PathBuf,
}

/// Write `<out_dir>/<stack>.template.<ext>` and `<out_dir>/manifest.json`.
///
/// # Errors
/// Returns [`SynthError::Output`] if the directory or files cannot be written.
pub fn write_assembly(
    out_dir: &Path,
    stack: &SynthesizedStack,
    format: TemplateFormat,
) -> Result<AssemblyFiles, SynthError> {
    std::fs::create_dir_all(out_dir).map_err(|source| SynthError::Output {
        path: out_dir.to_path_buf(),
        source,
    })?;

    let template_file = format!("{}.template.{}", stack.name, format.extension());
    let rendered = match format {
        TemplateFormat::Json => stack.template.to_json()?,
        TemplateFormat::Yaml => stack.template.to_yaml()?,
    };
    let template_path = out_dir.join(&template_file);
    write_file(&template_path, &rendered)?;

    let manifest = Manifest {
        version: MANIFEST_VERSION.to_string(),
        generated_at: Utc::now(),
        stacks: BTreeMap::from([(
            stack.name.clone(),
            ManifestEntry {
                environment: stack.environment.label(),
                template_file,
                production: stack.production,
                resource_count: stack.template.resources().count(),
                outputs: stack.template.outputs().map(|(id, _)| id.to_string()).collect(),
            },
        )]),
    };
    let manifest_path = out_dir.join(MANIFEST_FILE);
    write_file(&manifest_path, &serde_json::to_string_pretty(&manifest)?)?;

    info!(
        template = %template_path.display(),
        manifest = %manifest_path.display(),
        "Wrote cloud assembly"
    );

    Ok(AssemblyFiles {
        template: template_path,
        manifest: manifest_path,
    })
}

fn write_file(path: &Path, contents: &str) -> Result<(), SynthError> {
    std::fs::write(path, contents).map_err(|source| SynthError::Output {
        path: path.to_path_buf(),
        source,
    })
}
