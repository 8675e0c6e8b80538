use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::model::calendar::BaseCalendar;
use crate::model::config::{EngineConfig, LibraryConfig, ProjectInfo};
use crate::model::library::TemplateSet;
use crate::model::template::{Template, TemplateError, TemplateRecord};

/// Error type for library I/O operations
#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("not a cadence library: no cadence/ directory found")]
    NotALibrary,
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse config.toml: {0}")]
    ConfigParseError(#[from] toml::de::Error),
    #[error("could not serialize config.toml: {0}")]
    ConfigSerializeError(#[from] toml::ser::Error),
    #[error("could not parse library.json: {0}")]
    DataParseError(#[from] serde_json::Error),
    #[error(transparent)]
    InvalidRecord(#[from] TemplateError),
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

/// On-disk shape of cadence/library.json: flat template records plus the
/// calendar map. The engine never sees this encoding — records are run
/// through the template factory on load.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LibraryFile {
    #[serde(default)]
    pub templates: Vec<TemplateRecord>,
    #[serde(default)]
    pub calendar: BaseCalendar,
}

/// A fully loaded cadence library
#[derive(Debug)]
pub struct Library {
    /// Root directory (parent of `cadence/`)
    pub root: PathBuf,
    /// Path to the `cadence/` directory
    pub cadence_dir: PathBuf,
    pub config: LibraryConfig,
    pub templates: TemplateSet,
    pub calendar: BaseCalendar,
}

/// Discover the library by walking up from the given directory,
/// looking for a `cadence/` subdirectory with a config file.
pub fn discover_library(start: &Path) -> Result<PathBuf, LibraryError> {
    let mut current = start.to_path_buf();
    loop {
        let cadence_dir = current.join("cadence");
        if cadence_dir.is_dir() && cadence_dir.join("config.toml").exists() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(LibraryError::NotALibrary);
        }
    }
}

/// Load a complete library from the given root directory.
pub fn load_library(root: &Path) -> Result<Library, LibraryError> {
    let cadence_dir = root.join("cadence");
    if !cadence_dir.is_dir() {
        return Err(LibraryError::NotALibrary);
    }

    let config_path = cadence_dir.join("config.toml");
    let config_text = fs::read_to_string(&config_path).map_err(|e| LibraryError::ReadError {
        path: config_path.clone(),
        source: e,
    })?;
    let config: LibraryConfig = toml::from_str(&config_text)?;

    let data_path = cadence_dir.join("library.json");
    let file: LibraryFile = if data_path.exists() {
        let data_text = fs::read_to_string(&data_path).map_err(|e| LibraryError::ReadError {
            path: data_path.clone(),
            source: e,
        })?;
        serde_json::from_str(&data_text)?
    } else {
        LibraryFile::default()
    };

    let templates = file
        .templates
        .into_iter()
        .map(Template::from_record)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Library {
        root: root.to_path_buf(),
        cadence_dir,
        config,
        templates: TemplateSet::from_templates(templates),
        calendar: file.calendar,
    })
}

/// Save templates and calendar back to cadence/library.json
pub fn save_library(
    cadence_dir: &Path,
    templates: &TemplateSet,
    calendar: &BaseCalendar,
) -> Result<(), LibraryError> {
    let file = LibraryFile {
        templates: templates.iter().map(|t| t.to_record()).collect(),
        calendar: calendar.clone(),
    };
    let content = serde_json::to_string_pretty(&file)?;
    atomic_write(&cadence_dir.join("library.json"), content.as_bytes())?;
    Ok(())
}

/// Create a fresh library at `root`: the cadence/ directory, a config file,
/// and an empty library.json.
pub fn init_library(root: &Path, name: &str) -> Result<(), LibraryError> {
    let cadence_dir = root.join("cadence");
    fs::create_dir_all(&cadence_dir)?;

    let config = LibraryConfig {
        project: ProjectInfo {
            name: name.to_string(),
        },
        engine: EngineConfig::default(),
    };
    let config_text = toml::to_string_pretty(&config)?;
    atomic_write(&cadence_dir.join("config.toml"), config_text.as_bytes())?;

    let empty = serde_json::to_string_pretty(&LibraryFile::default())?;
    atomic_write(&cadence_dir.join("library.json"), empty.as_bytes())?;
    Ok(())
}

/// Write `content` to `path` atomically using a temp file + rename.
pub fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
