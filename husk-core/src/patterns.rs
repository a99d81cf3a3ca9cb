//! Shell patterns: glob matching and pathname expansion.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use crate::error::Error;

/// One piece of a pattern: text to interpret as a glob, or literal text that
/// must match exactly (it came from a quoted region).
#[derive(Clone, Debug)]
pub(crate) enum PatternPiece {
    /// Glob-interpreted text.
    Pattern(String),
    /// Literal text.
    Literal(String),
}

impl PatternPiece {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pattern(s) | Self::Literal(s) => s,
        }
    }
}

type PatternWord = Vec<PatternPiece>;

/// Options controlling pathname expansion.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct FilenameExpansionOptions {
    /// Whether dot files require an explicit leading dot in the pattern.
    pub require_dot_in_pattern_to_match_dot_files: bool,
    /// Whether `**` components match recursively.
    pub enable_globstar: bool,
}

/// A shell pattern assembled from expansion pieces.
#[derive(Clone, Debug, Default)]
pub struct Pattern {
    pieces: PatternWord,
    extended_globbing: bool,
}

impl From<PatternWord> for Pattern {
    fn from(pieces: PatternWord) -> Self {
        Self {
            pieces,
            ..Self::default()
        }
    }
}

impl From<&str> for Pattern {
    fn from(value: &str) -> Self {
        Self {
            pieces: vec![PatternPiece::Pattern(value.to_owned())],
            ..Self::default()
        }
    }
}

impl From<String> for Pattern {
    fn from(value: String) -> Self {
        Self {
            pieces: vec![PatternPiece::Pattern(value)],
            ..Self::default()
        }
    }
}

impl Pattern {
    /// Enables or disables extended globbing for this pattern.
    #[must_use]
    pub const fn set_extended_globbing(mut self, value: bool) -> Self {
        self.extended_globbing = value;
        self
    }

    /// Returns whether the pattern is empty.
    pub fn is_empty(&self) -> bool {
        self.pieces.iter().all(|p| p.as_str().is_empty())
    }

    /// Returns the concatenated text of the pattern.
    pub(crate) fn concatenated(&self) -> String {
        self.pieces.iter().map(|p| p.as_str()).collect()
    }

    /// Converts the pattern to a regular-expression string, optionally
    /// anchored on either side.
    pub(crate) fn to_regex_str(
        &self,
        anchor_start: bool,
        anchor_end: bool,
    ) -> Result<String, Error> {
        let mut regex_str = String::new();

        if anchor_start {
            regex_str.push('^');
        }

        // Quoted pieces are escaped so they can travel through the same
        // translator as the glob text.
        let mut merged = String::new();
        for piece in &self.pieces {
            match piece {
                PatternPiece::Pattern(s) => merged.push_str(s),
                PatternPiece::Literal(s) => {
                    for c in s.chars() {
                        merged.push('\\');
                        merged.push(c);
                    }
                }
            }
        }

        regex_str.push_str(
            husk_parser::pattern::pattern_to_regex_str(merged.as_str(), self.extended_globbing)?
                .as_str(),
        );

        if anchor_end {
            regex_str.push('$');
        }

        Ok(regex_str)
    }

    /// Compiles the pattern into a regex.
    pub(crate) fn to_regex(
        &self,
        anchor_start: bool,
        anchor_end: bool,
    ) -> Result<fancy_regex::Regex, Error> {
        let regex_str = self.to_regex_str(anchor_start, anchor_end)?;
        tracing::debug!(target: "patterns", "pattern '{:?}' => regex '{regex_str}'", self.pieces);
        Ok(crate::regexes::compile(regex_str.as_str())?)
    }

    /// Returns whether the pattern matches the entire given string.
    pub fn exactly_matches(&self, value: &str) -> Result<bool, Error> {
        let regex = self.to_regex(true, true)?;
        Ok(regex.is_match(value)?)
    }

    /// Returns whether the pattern contains any glob metacharacters.
    pub(crate) fn requires_expansion(&self) -> bool {
        self.pieces.iter().any(|piece| {
            matches!(piece, PatternPiece::Pattern(_))
                && husk_parser::pattern::pattern_has_glob_metachars(
                    piece.as_str(),
                    self.extended_globbing,
                )
        })
    }

    /// Expands the pattern against the filesystem, returning matching paths
    /// (relative to `working_dir` where applicable), sorted per directory.
    pub(crate) fn expand(
        &self,
        working_dir: &Path,
        options: &FilenameExpansionOptions,
    ) -> Result<Vec<String>, Error> {
        if self.is_empty() {
            return Ok(vec![]);
        }

        if !self.requires_expansion() {
            return Ok(vec![self.concatenated()]);
        }

        // Split the pattern into path components, preserving the piece kinds.
        let mut components: Vec<PatternWord> = vec![];
        for piece in &self.pieces {
            let mut split: VecDeque<_> = piece
                .as_str()
                .split('/')
                .map(|s| match piece {
                    PatternPiece::Pattern(_) => PatternPiece::Pattern(s.to_owned()),
                    PatternPiece::Literal(_) => PatternPiece::Literal(s.to_owned()),
                })
                .collect();

            if let Some(first) = split.pop_front() {
                if let Some(last_component) = components.last_mut() {
                    last_component.push(first);
                } else {
                    components.push(vec![first]);
                }
            }

            while let Some(piece) = split.pop_front() {
                components.push(vec![piece]);
            }
        }

        let is_absolute = components
            .first()
            .is_some_and(|c| c.iter().all(|piece| piece.as_str().is_empty()));

        let prefix_to_remove;
        let mut paths_so_far = if is_absolute {
            prefix_to_remove = None;
            vec![PathBuf::from("/")]
        } else {
            let mut working_dir_str = working_dir.to_string_lossy().to_string();
            if !working_dir_str.ends_with('/') {
                working_dir_str.push('/');
            }
            prefix_to_remove = Some(working_dir_str);
            vec![working_dir.to_path_buf()]
        };

        for component in components {
            let subpattern =
                Pattern::from(component).set_extended_globbing(self.extended_globbing);

            // A `**` component recurses; handled separately from plain
            // component matching.
            if options.enable_globstar && subpattern.concatenated() == "**" {
                let current = std::mem::take(&mut paths_so_far);
                for path in current {
                    paths_so_far.push(path.clone());
                    collect_dirs_recursively(path.as_path(), &mut paths_so_far);
                }
                continue;
            }

            if !subpattern.requires_expansion() {
                let flattened = subpattern.concatenated();
                for path in &mut paths_so_far {
                    path.push(flattened.as_str());
                }
                continue;
            }

            let subpattern_starts_with_dot = subpattern
                .pieces
                .first()
                .is_some_and(|piece| piece.as_str().starts_with('.'));
            let allow_dot_files =
                !options.require_dot_in_pattern_to_match_dot_files || subpattern_starts_with_dot;

            let regex = subpattern.to_regex(true, true)?;

            let current = std::mem::take(&mut paths_so_far);
            for path in current {
                let mut matches: Vec<_> = path
                    .read_dir()
                    .map_or_else(|_| vec![], |dir| dir.flatten().collect())
                    .into_iter()
                    .filter(|entry| {
                        let file_name = entry.file_name().to_string_lossy().to_string();
                        if file_name.starts_with('.') && !allow_dot_files {
                            return false;
                        }
                        regex.is_match(file_name.as_str()).unwrap_or(false)
                    })
                    .map(|entry| entry.path())
                    .collect();

                matches.sort();
                paths_so_far.append(&mut matches);
            }
        }

        let results = paths_so_far
            .into_iter()
            .filter_map(|path| {
                // Components appended blindly may name nonexistent paths.
                if !path.exists() && path.symlink_metadata().is_err() {
                    return None;
                }

                let path_str = path.to_string_lossy();
                let mut path_ref = path_str.as_ref();

                if let Some(prefix) = &prefix_to_remove {
                    path_ref = path_ref.strip_prefix(prefix.as_str()).unwrap_or(path_ref);
                }

                Some(path_ref.to_owned())
            })
            .collect();

        Ok(results)
    }
}

fn collect_dirs_recursively(path: &Path, results: &mut Vec<PathBuf>) {
    if let Ok(entries) = path.read_dir() {
        let mut dirs: Vec<_> = entries
            .flatten()
            .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
            .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
            .map(|e| e.path())
            .collect();
        dirs.sort();

        for dir in dirs {
            results.push(dir.clone());
            collect_dirs_recursively(dir.as_path(), results);
        }
    }
}

/// Removes the largest prefix of `s` matching the pattern.
pub(crate) fn remove_largest_matching_prefix<'a>(
    s: &'a str,
    pattern: &Option<Pattern>,
) -> Result<&'a str, Error> {
    if let Some(pattern) = pattern {
        for (idx, _) in s.char_indices().rev() {
            let end = idx + s[idx..].chars().next().map_or(1, char::len_utf8);
            if pattern.exactly_matches(&s[..end])? {
                return Ok(&s[end..]);
            }
        }
        if pattern.exactly_matches("")? {
            return Ok(s);
        }
    }
    Ok(s)
}

/// Removes the smallest prefix of `s` matching the pattern.
pub(crate) fn remove_smallest_matching_prefix<'a>(
    s: &'a str,
    pattern: &Option<Pattern>,
) -> Result<&'a str, Error> {
    if let Some(pattern) = pattern {
        for (idx, c) in s.char_indices() {
            let end = idx + c.len_utf8();
            if pattern.exactly_matches(&s[..end])? {
                return Ok(&s[end..]);
            }
        }
    }
    Ok(s)
}

/// Removes the largest suffix of `s` matching the pattern.
pub(crate) fn remove_largest_matching_suffix<'a>(
    s: &'a str,
    pattern: &Option<Pattern>,
) -> Result<&'a str, Error> {
    if let Some(pattern) = pattern {
        for (idx, _) in s.char_indices() {
            if pattern.exactly_matches(&s[idx..])? {
                return Ok(&s[..idx]);
            }
        }
    }
    Ok(s)
}

/// Removes the smallest suffix of `s` matching the pattern.
pub(crate) fn remove_smallest_matching_suffix<'a>(
    s: &'a str,
    pattern: &Option<Pattern>,
) -> Result<&'a str, Error> {
    if let Some(pattern) = pattern {
        for (idx, _) in s.char_indices().rev() {
            if pattern.exactly_matches(&s[idx..])? {
                return Ok(&s[..idx]);
            }
        }
    }
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pattern(s: &str) -> Option<Pattern> {
        Some(Pattern::from(s).set_extended_globbing(true))
    }

    #[test]
    fn exact_matching() {
        assert!(Pattern::from("a*c").exactly_matches("abc").unwrap());
        assert!(Pattern::from("a?c").exactly_matches("abc").unwrap());
        assert!(!Pattern::from("a?c").exactly_matches("abdc").unwrap());
        assert!(Pattern::from("[ab]x").exactly_matches("ax").unwrap());
    }

    #[test]
    fn extglob_matching() {
        let p = Pattern::from("+(ab)").set_extended_globbing(true);
        assert!(p.exactly_matches("abab").unwrap());
        assert!(!p.exactly_matches("").unwrap());

        let p = Pattern::from("!(x)").set_extended_globbing(true);
        assert!(p.exactly_matches("y").unwrap());
        assert!(!p.exactly_matches("x").unwrap());
    }

    #[test]
    fn prefix_suffix_removal() {
        assert_eq!(
            remove_largest_matching_prefix("a/b/c", &pattern("*/")).unwrap(),
            "c"
        );
        assert_eq!(
            remove_smallest_matching_prefix("a/b/c", &pattern("*/")).unwrap(),
            "b/c"
        );
        assert_eq!(
            remove_largest_matching_suffix("a.tar.gz", &pattern(".*")).unwrap(),
            "a"
        );
        assert_eq!(
            remove_smallest_matching_suffix("a.tar.gz", &pattern(".*")).unwrap(),
            "a.tar"
        );
        assert_eq!(
            remove_smallest_matching_suffix("abc", &pattern("x*")).unwrap(),
            "abc"
        );
    }

    #[test]
    fn filename_expansion() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["alpha.txt", "beta.txt", "gamma.log", ".hidden.txt"] {
            std::fs::write(dir.path().join(name), "x").unwrap();
        }

        let options = FilenameExpansionOptions {
            require_dot_in_pattern_to_match_dot_files: true,
            enable_globstar: false,
        };

        let results = Pattern::from("*.txt").expand(dir.path(), &options).unwrap();
        assert_eq!(results, ["alpha.txt", "beta.txt"]);

        let results = Pattern::from(".*.txt").expand(dir.path(), &options).unwrap();
        assert_eq!(results, [".hidden.txt"]);

        let results = Pattern::from("*.missing")
            .expand(dir.path(), &options)
            .unwrap();
        assert!(results.is_empty());
    }
}
