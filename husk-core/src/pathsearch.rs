//! `$PATH` lookup for external commands.

use std::path::{Path, PathBuf};

/// Returns whether the given path is executable by the current user.
pub(crate) fn is_executable(path: &Path) -> bool {
    nix::unistd::access(path, nix::unistd::AccessFlags::X_OK).is_ok()
}

/// Searches the given colon-delimited path list for an executable with the
/// given name; returns the first match.
pub(crate) fn search(paths: &str, name: &str) -> Option<PathBuf> {
    search_all(paths, name).into_iter().next()
}

/// Searches the given colon-delimited path list for all executables with the
/// given name, in path order.
pub(crate) fn search_all(paths: &str, name: &str) -> Vec<PathBuf> {
    let mut found = vec![];

    for dir in paths.split(':') {
        if dir.is_empty() {
            continue;
        }

        let candidate = Path::new(dir).join(name);
        if candidate.is_file() && is_executable(candidate.as_path()) {
            found.push(candidate);
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_standard_utilities() {
        // `sh` is required to exist on any Unix worth targeting.
        let found = search("/usr/bin:/bin", "sh");
        assert!(found.is_some());
    }

    #[test]
    fn missing_commands_are_not_found() {
        assert!(search("/usr/bin:/bin", "definitely-not-a-real-command-xyz").is_none());
    }
}
