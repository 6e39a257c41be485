use crate::domain::model::StreamType;
use crate::utils::error::{MulticamError, Result};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Looks up `tool` on `PATH` the way `which` does.
pub fn find_on_path(tool: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    find_in_dirs(tool, std::env::split_paths(&path))
}

pub fn find_in_dirs<I>(tool: &str, dirs: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    if Path::new(tool).components().count() > 1 {
        let candidate = PathBuf::from(tool);
        return is_executable(&candidate).then_some(candidate);
    }

    dirs.into_iter()
        .flat_map(|dir| executable_names(tool).map(move |name| dir.join(name)))
        .find(|candidate| is_executable(candidate))
}

fn executable_names(tool: &str) -> impl Iterator<Item = String> + '_ {
    let suffixes: &[&str] = if cfg!(windows) { &["", ".exe"] } else { &[""] };
    suffixes.iter().map(move |suffix| format!("{}{}", tool, suffix))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// External programs a backend needs before any camera is opened.
pub fn required_tools(stream_type: StreamType) -> &'static [&'static str] {
    match stream_type {
        StreamType::Ffmpeg => &["ffmpeg"],
        StreamType::Gstreamer => &["gst-launch-1.0"],
        StreamType::Synthetic => &[],
    }
}

pub fn check_backend(stream_type: StreamType) -> Result<Vec<PathBuf>> {
    required_tools(stream_type)
        .iter()
        .map(|tool| {
            let found = find_on_path(tool).ok_or_else(|| MulticamError::ToolNotFound {
                tool: tool.to_string(),
            })?;
            tracing::info!("✅ Found {} at {}", tool, found.display());
            Ok(found)
        })
        .collect()
}

pub fn display_name(path: &Path) -> &str {
    path.file_name().and_then(OsStr::to_str).unwrap_or("?")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[cfg(unix)]
    fn make_executable(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_find_in_dirs_requires_exec_bit() {
        let dir = TempDir::new().unwrap();
        let tool = dir.path().join("ffmpeg");
        fs::write(&tool, "#!/bin/sh\n").unwrap();

        assert!(find_in_dirs("ffmpeg", vec![dir.path().to_path_buf()]).is_none());

        make_executable(&tool);
        let found = find_in_dirs("ffmpeg", vec![dir.path().to_path_buf()]).unwrap();
        assert_eq!(display_name(&found), "ffmpeg");
    }

    #[test]
    fn test_missing_tool() {
        let dir = TempDir::new().unwrap();
        assert!(find_in_dirs("gst-launch-1.0", vec![dir.path().to_path_buf()]).is_none());
    }

    #[test]
    fn test_synthetic_needs_no_tools() {
        assert!(required_tools(StreamType::Synthetic).is_empty());
        assert!(check_backend(StreamType::Synthetic).unwrap().is_empty());
    }
}
