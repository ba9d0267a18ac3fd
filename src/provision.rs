use crate::error::PathError;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    Created,
    Existing,
}

/// Makes sure `dest` exists as a directory.
///
/// Existing directories are left exactly as they are. A freshly created
/// directory is opened up to every principal.
pub fn ensure(dest: &Path) -> Result<Provisioned, PathError> {
    validate(dest)?;

    match fs::metadata(dest) {
        Ok(meta) if meta.is_dir() => {
            debug!("destination exists: {}", dest.display());
            return Ok(Provisioned::Existing);
        }
        Ok(_) => {
            return Err(PathError::unsupported(dest, "exists and is not a directory"));
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(PathError::from_io(dest, e)),
    }

    fs::create_dir_all(dest).map_err(|e| PathError::from_io(dest, e))?;
    grant_full_access(dest).map_err(|e| PathError::from_io(dest, e))?;
    info!("created destination {}", dest.display());
    Ok(Provisioned::Created)
}

fn validate(dest: &Path) -> Result<(), PathError> {
    if dest.as_os_str().is_empty() {
        return Err(PathError::unsupported(dest, "empty path"));
    }
    if dest.as_os_str().to_string_lossy().contains('\0') {
        return Err(PathError::unsupported(dest, "contains a NUL byte"));
    }
    Ok(())
}

#[cfg(unix)]
fn grant_full_access(dest: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    // Set explicitly so the process umask does not narrow it.
    fs::set_permissions(dest, fs::Permissions::from_mode(0o777))
}

#[cfg(not(unix))]
fn grant_full_access(dest: &Path) -> io::Result<()> {
    let mut perms = fs::metadata(dest)?.permissions();
    #[allow(clippy::permissions_set_readonly_false)]
    perms.set_readonly(false);
    fs::set_permissions(dest, perms)
}
