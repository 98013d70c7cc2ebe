// src/sys/detect.rs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{RecipeError, Result};

const ADMIN_BUNDLE_PACKAGE: &str = "kunstmaan/admin-bundle";

/// Closed set of stacks the recipe knows how to deploy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    Symfony,
    Kunstmaan,
    CraftCms,
    Laravel,
}

/// Path conventions of one stack, relative to the project root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProjectPaths {
    pub dump_dir: &'static str,
    pub public_dir: &'static str,
}

impl ProjectType {
    pub fn paths(self) -> ProjectPaths {
        let (dump_dir, public_dir) = match self {
            ProjectType::Symfony | ProjectType::Kunstmaan => ("var", "public"),
            ProjectType::CraftCms => ("storage", "web"),
            ProjectType::Laravel => ("storage", "public"),
        };
        ProjectPaths { dump_dir, public_dir }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProjectType::Symfony => "symfony",
            ProjectType::Kunstmaan => "kunstmaan",
            ProjectType::CraftCms => "craftcms",
            ProjectType::Laravel => "laravel",
        }
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The project's `composer.json`, reduced to the presence of package names.
#[derive(Debug, Default, Deserialize)]
pub struct ComposerManifest {
    #[serde(default)]
    require: BTreeMap<String, serde_json::Value>,
    #[serde(default, rename = "require-dev")]
    require_dev: BTreeMap<String, serde_json::Value>,
}

impl ComposerManifest {
    /// Loads `<dir>/composer.json`. A missing manifest is an empty one.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join("composer.json");
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&raw).map_err(|source| RecipeError::Manifest { path, source })
    }

    pub fn has_package(&self, package: &str) -> bool {
        self.require.contains_key(package) || self.require_dev.contains_key(package)
    }
}

/// Probes marker files in `cwd`, first match wins:
/// `bin/console` + `src/Kernel.php` (Symfony, or Kunstmaan when the admin
/// bundle is required), then `craft`, then `artisan`.
pub fn detect(cwd: &Path, manifest: &ComposerManifest) -> Result<ProjectType> {
    if cwd.join("bin/console").exists() && cwd.join("src/Kernel.php").exists() {
        if manifest.has_package(ADMIN_BUNDLE_PACKAGE) {
            return Ok(ProjectType::Kunstmaan);
        }
        return Ok(ProjectType::Symfony);
    }
    if cwd.join("craft").exists() {
        return Ok(ProjectType::CraftCms);
    }
    if cwd.join("artisan").exists() {
        return Ok(ProjectType::Laravel);
    }
    Err(RecipeError::UnknownProjectType {
        dir: PathBuf::from(cwd),
    })
}
