//! Where staged files live locally and where they land remotely.

use filetime::FileTime;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Staging location of a source file: `<root>/<category>/<file name>`.
pub fn staging_path(root: &Path, category: &str, source_path: &str) -> PathBuf {
    let name = source_path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(source_path);
    root.join(category).join(name)
}

/// `/`-separated path of a staged file relative to the staging root it was
/// placed under. Falls back to the bare file name when `local_path` is not
/// below `root`.
pub fn remote_relative_path(root: &Path, local_path: &Path) -> String {
    match local_path.strip_prefix(root) {
        Ok(relative) => relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    }
}

/// Set both access and modification time of `path` to `mtime` (Unix seconds).
pub fn preserve_mtime(path: &Path, mtime: i64) -> io::Result<()> {
    let time = FileTime::from_unix_time(mtime, 0);
    filetime::set_file_times(path, time, time)
}

/// Move a file, creating the target directory. Tries a rename first and
/// falls back to copy + remove when the rename fails (e.g. across filesystems).
pub fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)?;
    fs::remove_file(from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_staging_path_uses_category_and_base_name() {
        let root = Path::new("/home/u/FetchSync");
        assert_eq!(
            staging_path(root, "Videos", "/sdcard/Oculus/VideoShots/2024/clip.mp4"),
            PathBuf::from("/home/u/FetchSync/Videos/clip.mp4")
        );
    }

    #[test]
    fn test_remote_relative_path() {
        let root = Path::new("/home/u/FetchSync");
        assert_eq!(
            remote_relative_path(root, Path::new("/home/u/FetchSync/Videos/clip.mp4")),
            "Videos/clip.mp4"
        );
        assert_eq!(
            remote_relative_path(root, Path::new("/elsewhere/clip.mp4")),
            "clip.mp4"
        );
    }

    #[test]
    fn test_preserve_mtime() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.jpg");
        fs::write(&file, b"x").unwrap();

        preserve_mtime(&file, 1_600_000_000).unwrap();

        let metadata = fs::metadata(&file).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&metadata).unix_seconds(), 1_600_000_000);
    }

    #[test]
    fn test_preserve_mtime_missing_file() {
        assert!(preserve_mtime(Path::new("/nonexistent/dir/a.jpg"), 1).is_err());
    }

    #[test]
    fn test_move_file_creates_parent() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("tmp/a.jpg");
        fs::create_dir_all(from.parent().unwrap()).unwrap();
        fs::write(&from, b"abc").unwrap();
        let to = dir.path().join("keep/Photos/a.jpg");

        move_file(&from, &to).unwrap();

        assert!(!from.exists());
        assert_eq!(fs::read(&to).unwrap(), b"abc");
    }
}
