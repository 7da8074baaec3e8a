//! Target path normalization.
//!
//! The workflow mutates exactly one path inside the working tree. Targets are
//! reduced to a clean relative form here so that the applicator, git and the
//! rollback step all agree on which file they touch.

use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    #[error("target path is empty")]
    Empty,
    #[error("target {0} is outside the working tree")]
    OutsideRoot(PathBuf),
    #[error("target {0} names the working tree root, not a file")]
    IsRoot(PathBuf),
    #[error("target {0} is inside the .git directory")]
    InsideGitDir(PathBuf),
}

/// Reduce `target` to a path relative to `root`.
///
/// Absolute targets must start with `root`. `.` components are dropped and `..`
/// components may not climb above the root.
pub fn normalize_target(root: &Path, target: &Path) -> Result<PathBuf, TargetError> {
    if target.as_os_str().is_empty() {
        return Err(TargetError::Empty);
    }

    let relative = if target.is_absolute() {
        target
            .strip_prefix(root)
            .map_err(|_| TargetError::OutsideRoot(target.to_path_buf()))?
    } else {
        target
    };

    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in relative.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => parts.push(part),
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(TargetError::OutsideRoot(target.to_path_buf()));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(TargetError::OutsideRoot(target.to_path_buf()));
            }
        }
    }

    if parts.is_empty() {
        return Err(TargetError::IsRoot(target.to_path_buf()));
    }
    if parts[0] == ".git" {
        return Err(TargetError::InsideGitDir(target.to_path_buf()));
    }

    Ok(parts.iter().collect())
}

/// Render a normalized relative path with `/` separators, as git expects in revspecs.
pub fn git_path(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_simple_relative_path() {
        let out = normalize_target(Path::new("/repo"), Path::new("src/lib.rs")).expect("ok");
        assert_eq!(out, PathBuf::from("src/lib.rs"));
    }

    #[test]
    fn strips_root_from_absolute_target() {
        let out =
            normalize_target(Path::new("/repo"), Path::new("/repo/components/a.tsx")).expect("ok");
        assert_eq!(out, PathBuf::from("components/a.tsx"));
    }

    #[test]
    fn collapses_dot_and_inner_parent_components() {
        let out = normalize_target(Path::new("/repo"), Path::new("./src/../lib/./x.rs")).expect("ok");
        assert_eq!(out, PathBuf::from("lib/x.rs"));
    }

    #[test]
    fn rejects_escape_through_parent() {
        let err = normalize_target(Path::new("/repo"), Path::new("../other/x.rs")).unwrap_err();
        assert!(matches!(err, TargetError::OutsideRoot(_)));
    }

    #[test]
    fn rejects_absolute_path_elsewhere() {
        let err = normalize_target(Path::new("/repo"), Path::new("/etc/passwd")).unwrap_err();
        assert!(matches!(err, TargetError::OutsideRoot(_)));
    }

    #[test]
    fn rejects_root_and_empty() {
        assert_eq!(
            normalize_target(Path::new("/repo"), Path::new("")),
            Err(TargetError::Empty)
        );
        assert!(matches!(
            normalize_target(Path::new("/repo"), Path::new("a/..")),
            Err(TargetError::IsRoot(_))
        ));
    }

    #[test]
    fn rejects_git_internals() {
        let err = normalize_target(Path::new("/repo"), Path::new(".git/config")).unwrap_err();
        assert!(matches!(err, TargetError::InsideGitDir(_)));
    }

    #[test]
    fn git_path_uses_forward_slashes() {
        assert_eq!(git_path(Path::new("a/b/c.rs")), "a/b/c.rs");
    }
}
