//! Filesystem helpers for moving bundles around without following symlinks.
//!
//! Framework bundles rely on relative symlinks (`Versions/Current`), so copies
//! recreate links instead of dereferencing them.

use std::fs;
use std::io;
use std::path::Path;

/// Copy a file, symlink or directory tree from `src` to `dst`.
pub fn copy_recursive(src: &Path, dst: &Path) -> io::Result<()> {
  let metadata = fs::symlink_metadata(src)?;
  let file_type = metadata.file_type();

  if file_type.is_symlink() {
    let target = fs::read_link(src)?;
    copy_symlink(src, &target, dst)
  } else if file_type.is_dir() {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
      let entry = entry?;
      copy_recursive(&entry.path(), &dst.join(entry.file_name()))?;
    }
    Ok(())
  } else {
    fs::copy(src, dst).map(|_| ())
  }
}

#[cfg(unix)]
fn copy_symlink(_src: &Path, target: &Path, dst: &Path) -> io::Result<()> {
  std::os::unix::fs::symlink(target, dst)
}

#[cfg(windows)]
fn copy_symlink(src: &Path, target: &Path, dst: &Path) -> io::Result<()> {
  // Creating links needs elevated rights on Windows; fall back to a deep copy.
  let resolved = src.parent().map(|p| p.join(target)).unwrap_or_else(|| target.to_path_buf());
  if resolved.is_dir() {
    copy_recursive(&resolved, dst)
  } else {
    fs::copy(&resolved, dst).map(|_| ())
  }
}

/// Copy every entry of `src` into `dst`, skipping top-level names in `exclude`.
pub fn copy_dir_contents(src: &Path, dst: &Path, exclude: &[&str]) -> io::Result<()> {
  fs::create_dir_all(dst)?;
  for entry in fs::read_dir(src)? {
    let entry = entry?;
    let name = entry.file_name();
    if name.to_str().is_some_and(|n| exclude.contains(&n)) {
      continue;
    }
    copy_recursive(&entry.path(), &dst.join(&name))?;
  }
  Ok(())
}

/// Remove a file, symlink or directory tree. Missing paths are not an error.
pub fn remove_path(path: &Path) -> io::Result<()> {
  match fs::symlink_metadata(path) {
    Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(path),
    Ok(_) => fs::remove_file(path),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    Err(e) => Err(e),
  }
}

/// Leave `dir` as an empty directory, wiping anything already there.
pub fn reset_dir(dir: &Path) -> io::Result<()> {
  remove_path(dir)?;
  fs::create_dir_all(dir)
}

/// Total size in bytes of regular files below `path`.
pub fn dir_size(path: &Path) -> u64 {
  walkdir::WalkDir::new(path)
    .into_iter()
    .filter_map(Result::ok)
    .filter(|e| e.file_type().is_file())
    .filter_map(|e| e.metadata().ok())
    .map(|m| m.len())
    .sum()
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn copies_nested_tree() {
    let temp = TempDir::new().unwrap();
    let src = temp.path().join("src");
    fs::create_dir_all(src.join("Core.framework/Headers")).unwrap();
    fs::write(src.join("Core.framework/Headers/Core.h"), "header").unwrap();

    let dst = temp.path().join("dst");
    copy_recursive(&src, &dst).unwrap();

    assert_eq!(fs::read_to_string(dst.join("Core.framework/Headers/Core.h")).unwrap(), "header");
  }

  #[test]
  #[cfg(unix)]
  fn keeps_symlinks_as_links() {
    let temp = TempDir::new().unwrap();
    let src = temp.path().join("Core.framework");
    fs::create_dir_all(src.join("Versions/A")).unwrap();
    fs::write(src.join("Versions/A/Core"), "bin").unwrap();
    std::os::unix::fs::symlink("A", src.join("Versions/Current")).unwrap();

    let dst = temp.path().join("copy.framework");
    copy_recursive(&src, &dst).unwrap();

    let link = dst.join("Versions/Current");
    assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
    assert_eq!(fs::read_link(&link).unwrap(), Path::new("A"));
  }

  #[test]
  fn contents_copy_honors_exclusions() {
    let temp = TempDir::new().unwrap();
    let src = temp.path().join("bundle");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("libLogger.a"), "lib").unwrap();
    fs::write(src.join(".marker"), "{}").unwrap();

    let dst = temp.path().join("out");
    copy_dir_contents(&src, &dst, &[".marker"]).unwrap();

    assert!(dst.join("libLogger.a").exists());
    assert!(!dst.join(".marker").exists());
  }

  #[test]
  fn reset_dir_empties_existing_directory() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("Logger");
    fs::create_dir_all(dir.join("stale")).unwrap();
    fs::write(dir.join("stale/old.a"), "old").unwrap();

    reset_dir(&dir).unwrap();

    assert!(dir.is_dir());
    assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
  }

  #[test]
  fn remove_missing_path_is_ok() {
    let temp = TempDir::new().unwrap();
    assert!(remove_path(&temp.path().join("nothing")).is_ok());
  }

  #[test]
  fn dir_size_sums_files() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("sub")).unwrap();
    fs::write(temp.path().join("a"), "12345").unwrap();
    fs::write(temp.path().join("sub/b"), "123").unwrap();
    assert_eq!(dir_size(temp.path()), 8);
  }
}
