use std::io::{Error, ErrorKind};
use std::path::Path;

/// Creates `fs_path` together with its missing parents. An existing directory is fine,
/// an existing file is not.
pub fn ensure_directory(fs_path: &Path) -> Result<(), Error> {
    if !fs_path.exists() {
        if let Err(e) = std::fs::create_dir_all(fs_path) {
            if e.kind() == ErrorKind::AlreadyExists {
                return Ok(());
            }
            return Err(e);
        }
    } else if !fs_path.is_dir() {
        // use ErrorKind::NotADirectory when it becomes stable
        return Err(Error::new(
            ErrorKind::Other,
            format!("{} should be a directory", fs_path.display()),
        ));
    }
    Ok(())
}

/// Makes sure the directory that will hold `file_path` exists.
pub fn ensure_parent_directory(file_path: &Path) -> Result<(), Error> {
    match file_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_directory(parent),
        _ => Ok(()),
    }
}
