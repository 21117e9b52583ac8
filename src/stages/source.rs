//! Source stages: single items, files, URLs, and file-system walks.

use std::fs::File;
use std::io::BufReader;
use std::path::{self, Path, PathBuf};

use glob::Pattern;
use tracing::debug;
use walkdir::WalkDir;

use super::Lines;
use crate::error::{PipelineError, Result};
use crate::stage::{Deferred, Source, Transform};
use crate::stream::Stream;

fn echo_body<T: 'static>(item: T) -> Result<Stream<T>> {
    Ok(Stream::from_items(std::iter::once(item)))
}

/// Yield `item` once.
pub fn echo<T: 'static>(item: T) -> Result<Stream<T>> {
    Source::new("echo", echo_body::<T>).open(item)
}

fn cat_body(path: PathBuf) -> Result<Stream<String>> {
    let file = File::open(&path)
        .map_err(|e| PipelineError::resource("cat", format!("open {}", path.display()), e))?;
    debug!(path = %path.display(), "opened file");
    Ok(Stream::from_results(Lines::new(BufReader::new(file), "cat")))
}

const CAT: Source<PathBuf, String> = Source::new("cat", cat_body);

/// Read a file line by line, keeping line endings.
///
/// The file is opened immediately and closed when the stream ends or is
/// dropped.
pub fn cat(path: impl AsRef<Path>) -> Result<Stream<String>> {
    CAT.open(path.as_ref().to_path_buf())
}

fn curl_body(url: String) -> Result<Stream<String>> {
    let response = ureq::get(&url).call().map_err(|e| PipelineError::Network {
        url: url.clone(),
        source: Box::new(e),
    })?;
    debug!(%url, status = response.status(), "connected");
    let reader = BufReader::new(response.into_reader());
    Ok(Stream::from_results(Lines::new(reader, "curl")))
}

const CURL: Source<String, String> = Source::new("curl", curl_body);

/// Fetch a URL and yield the body line by line.
///
/// The connection closes when the stream ends, fails, or is dropped.
pub fn curl(url: &str) -> Result<Stream<String>> {
    CURL.open(url.to_string())
}

/// Split `pattern` into its absolute base directory and file-name glob.
fn split_pattern(pattern: &str) -> Result<(PathBuf, Pattern)> {
    let full = path::absolute(pattern)
        .map_err(|e| PipelineError::resource("expand", format!("resolve {pattern}"), e))?;
    let name = full
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            PipelineError::configuration("expand", format!("no file pattern in {pattern:?}"))
        })?;
    let glob = Pattern::new(name).map_err(|source| PipelineError::InvalidGlob {
        stage: "expand".to_string(),
        source,
    })?;
    let base = full.parent().map(Path::to_path_buf).unwrap_or_else(|| full.clone());
    Ok((base, glob))
}

fn walk(base: PathBuf, glob: Pattern) -> impl Iterator<Item = Result<PathBuf>> {
    // A base directory that does not exist holds no matches.
    let root = base.is_dir().then_some(base);
    root.into_iter().flat_map(move |base| {
        let glob = glob.clone();
        WalkDir::new(base)
            .sort_by_file_name()
            .into_iter()
            .filter_map(move |entry| match entry {
                Ok(entry) => {
                    let matched = entry.file_type().is_file()
                        && glob.matches(&entry.file_name().to_string_lossy());
                    matched.then(|| Ok(entry.into_path()))
                }
                Err(source) => Some(Err(PipelineError::Walk {
                    stage: "expand".to_string(),
                    source,
                })),
            })
    })
}

fn expand_body(patterns: Vec<String>) -> Result<Stream<PathBuf>> {
    let specs = patterns
        .iter()
        .map(|p| split_pattern(p))
        .collect::<Result<Vec<_>>>()?;
    Ok(Stream::from_results(
        specs.into_iter().flat_map(|(base, glob)| walk(base, glob)),
    ))
}

const EXPAND: Source<Vec<String>, PathBuf> = Source::new("expand", expand_body);

/// Yield absolute paths of files matching each `dir/glob` pattern,
/// searching `dir` and all of its subdirectories.
///
/// Patterns are checked up front; the walk itself happens as items are
/// pulled. No patterns means no paths.
pub fn expand<I, S>(patterns: I) -> Result<Stream<PathBuf>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    EXPAND.open(patterns.into_iter().map(Into::into).collect())
}

fn dir_file_body<T: AsRef<Path> + 'static>(
    upstream: Stream<T>,
    _: (),
) -> Stream<(PathBuf, String)> {
    upstream.try_map(|item| {
        let full = path::absolute(item.as_ref()).map_err(|e| PipelineError::io("dir_file", e))?;
        let name = full
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = full.parent().map(Path::to_path_buf).unwrap_or_else(|| full.clone());
        Ok((dir, name))
    })
}

/// Split each path into its absolute directory and file name.
pub fn dir_file<T: AsRef<Path> + 'static>() -> Deferred<(), T, (PathBuf, String)> {
    Transform::new("dir_file", dir_file_body::<T>).defer(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::stages::{grep, head};
    use crate::stream::StageState;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_echo() {
        assert_eq!(echo(1).unwrap().collect_items().unwrap(), vec![1]);
        assert_eq!(echo("hello").unwrap().collect_items().unwrap(), vec!["hello"]);
    }

    #[test]
    fn test_cat_reads_lines_with_newlines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("words.txt");
        fs::write(&path, "cat\ndog\ncab").unwrap();

        let lines = cat(&path).unwrap().collect_items().unwrap();
        assert_eq!(lines, vec!["cat\n", "dog\n", "cab"]);
    }

    #[test]
    fn test_cat_missing_file_is_resource_error() {
        let dir = tempdir().unwrap();
        let err = cat(dir.path().join("missing.txt")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resource);
    }

    #[test]
    fn test_cat_into_grep() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("words.txt");
        fs::write(&path, "cat\ndog\ncab\n").unwrap();

        let out = (cat(&path).unwrap() | grep("^ca").unwrap() | head(Some(1)))
            .collect_items()
            .unwrap();
        assert_eq!(out, vec!["cat\n"]);
    }

    #[cfg(target_os = "linux")]
    fn open_handles_to(path: &Path) -> usize {
        let target = fs::canonicalize(path).unwrap();
        fs::read_dir("/proc/self/fd")
            .unwrap()
            .filter_map(|entry| fs::read_link(entry.ok()?.path()).ok())
            .filter(|link| *link == target)
            .count()
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_cat_abandoned_releases_handle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("many.txt");
        fs::write(&path, "one\ntwo\nthree\n").unwrap();

        let mut lines = cat(&path).unwrap();
        assert_eq!(lines.next().unwrap().unwrap(), "one\n");
        assert_eq!(open_handles_to(&path), 1);

        drop(lines);
        assert_eq!(open_handles_to(&path), 0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_cat_exhausted_releases_handle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("one.txt");
        fs::write(&path, "only\n").unwrap();

        let mut lines = cat(&path).unwrap();
        assert!(lines.next().is_some());
        assert!(lines.next().is_none());
        assert_eq!(lines.state(), StageState::Done);
        assert_eq!(open_handles_to(&path), 0);
    }

    #[test]
    fn test_expand_walks_subdirectories() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("a.rs"), "").unwrap();
        fs::write(dir.path().join("b.txt"), "").unwrap();
        fs::write(dir.path().join("nested").join("c.rs"), "").unwrap();

        let pattern = dir.path().join("*.rs");
        let found = expand([pattern.to_string_lossy()]).unwrap().collect_items().unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.rs", "c.rs"]);
        assert!(found.iter().all(|p| p.is_absolute()));
    }

    #[test]
    fn test_expand_no_patterns() {
        let found = expand(Vec::<String>::new()).unwrap().collect_items().unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_expand_bad_glob() {
        let err = expand(["/tmp/[z-a"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StageConfiguration);
    }

    #[test]
    fn test_dir_file() {
        let out = (Stream::from_items(vec!["/tmp/x/notes.txt"]) | dir_file())
            .collect_items()
            .unwrap();
        assert_eq!(out, vec![(PathBuf::from("/tmp/x"), "notes.txt".to_string())]);
    }
}
