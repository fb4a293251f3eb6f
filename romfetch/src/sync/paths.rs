use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("name is empty")]
    Empty,
    #[error("name {0:?} is not a single path component")]
    NotSingleComponent(String),
    #[error("mapping target {0:?} must be relative")]
    Absolute(PathBuf),
}

/// Joins a remote file name onto a local folder. Names that could escape the
/// folder (separators, `.`/`..`) are rejected.
pub fn local_file_path(dir: &Path, name: &str) -> Result<PathBuf, PathError> {
    if name.is_empty() {
        return Err(PathError::Empty);
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == name => Ok(dir.join(part)),
        _ => Err(PathError::NotSingleComponent(name.to_string())),
    }
}

/// Resolves a mapping target under the ROM root. Parent components are
/// allowed (`../splashscreens`) but absolute targets are not.
pub fn target_dir_for(root: &Path, relative: &Path) -> Result<PathBuf, PathError> {
    if relative.as_os_str().is_empty() {
        return Err(PathError::Empty);
    }
    if relative.is_absolute() || relative.has_root() {
        return Err(PathError::Absolute(relative.to_path_buf()));
    }
    let mut out = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => continue,
            Component::ParentDir => out.push(".."),
            Component::RootDir | Component::Prefix(_) => {
                return Err(PathError::Absolute(relative.to_path_buf()));
            }
        }
    }
    Ok(out)
}
