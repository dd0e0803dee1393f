//! Schema file discovery
//!
//! Locations are tried in order: the `--schema` flag, the `prisma.schema`
//! key of `package.json`, `./prisma/schema.prisma`, then `./schema.prisma`.
//! Relative paths are resolved against the working directory.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::CliError;

/// Message when no location yields a schema file
pub const SCHEMA_NOT_FOUND: &str =
    "Could not find a schema.prisma file that is required for this command.\n\
     You can either provide it with --schema, set it as `prisma.schema` in your package.json \
     or put it into the default location ./prisma/schema.prisma \
     https://pris.ly/d/prisma-schema-location";

const DEFAULT_LOCATIONS: [&str; 2] = ["prisma/schema.prisma", "schema.prisma"];

/// A located and loaded schema file
#[derive(Debug, Clone)]
pub struct SchemaFile {
    path: PathBuf,
    display_path: PathBuf,
    contents: String,
}

impl SchemaFile {
    fn load(cwd: &Path, path: PathBuf) -> Result<Self, CliError> {
        let contents = std::fs::read_to_string(&path)?;
        let display_path = path
            .strip_prefix(cwd)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.clone());

        Ok(Self {
            path,
            display_path,
            contents,
        })
    }

    /// Absolute path of the schema file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path relative to the working directory, for diagnostics
    pub fn display_path(&self) -> &Path {
        &self.display_path
    }

    /// Directory containing the schema file
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }
}

#[derive(Debug, Deserialize)]
struct PackageJson {
    prisma: Option<PrismaSection>,
}

#[derive(Debug, Deserialize)]
struct PrismaSection {
    schema: Option<String>,
}

/// Joins `path` onto `cwd`, dropping `.` components
fn resolve(cwd: &Path, path: &Path) -> PathBuf {
    cwd.join(path).components().collect()
}

fn from_package_json(cwd: &Path) -> Result<Option<PathBuf>, CliError> {
    let manifest = cwd.join("package.json");
    if !manifest.is_file() {
        return Ok(None);
    }

    let raw = std::fs::read_to_string(&manifest)?;
    let package: PackageJson = match serde_json::from_str(&raw) {
        Ok(package) => package,
        Err(e) => {
            log::warn!("ignoring unparsable {}: {}", manifest.display(), e);
            return Ok(None);
        }
    };

    let Some(schema) = package.prisma.and_then(|p| p.schema) else {
        return Ok(None);
    };

    let path = resolve(cwd, Path::new(&schema));
    if !path.is_file() {
        return Err(CliError::ConfigNotFound(format!(
            "Provided schema path `{}` from `package.json` doesn't exist.",
            schema
        )));
    }
    Ok(Some(path))
}

/// Locates and reads the schema file
///
/// # Errors
///
/// [`CliError::ConfigNotFound`] when an explicitly named file is missing or
/// no default location has one.
pub fn discover(cwd: &Path, explicit: Option<&Path>) -> Result<SchemaFile, CliError> {
    if let Some(explicit) = explicit {
        let path = resolve(cwd, explicit);
        if !path.is_file() {
            return Err(CliError::ConfigNotFound(format!(
                "Provided --schema at {} doesn't exist.",
                explicit.display()
            )));
        }
        return SchemaFile::load(cwd, path);
    }

    if let Some(path) = from_package_json(cwd)? {
        return SchemaFile::load(cwd, path);
    }

    for location in DEFAULT_LOCATIONS {
        let path = cwd.join(location);
        if path.is_file() {
            return SchemaFile::load(cwd, path);
        }
    }

    Err(CliError::ConfigNotFound(SCHEMA_NOT_FOUND.to_string()))
}
