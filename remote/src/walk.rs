//! Depth-first traversal shared by the directory-backed filesystems.
//!
//! Entries of each directory are visited in lexical order, each directory is yielded before its
//! contents, the root itself is never yielded and symlinks are not followed. A failure to read an
//! entry or a directory becomes an error record; the walk then moves on to the next sibling.

use futures::StreamExt;

use crate::fs::{PathRecord, RecordStream};

enum Step {
    /// list the children of this directory
    Expand(std::path::PathBuf),
    /// yield this entry (and expand it if it is a directory)
    Visit(std::path::PathBuf),
}

struct Walk {
    side: common::Side,
    physical_root: std::path::PathBuf,
    logical_root: std::path::PathBuf,
    stack: Vec<Step>,
}

fn under(base: &std::path::Path, rel: &std::path::Path) -> std::path::PathBuf {
    if rel.as_os_str().is_empty() {
        base.to_path_buf()
    } else {
        base.join(rel)
    }
}

async fn read_sorted(dir: &std::path::Path) -> std::io::Result<Vec<std::ffi::OsString>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut names = vec![];
    while let Some(entry) = entries.next_entry().await? {
        names.push(entry.file_name());
    }
    names.sort();
    Ok(names)
}

impl Walk {
    async fn next_record(&mut self) -> Option<PathRecord> {
        while let Some(step) = self.stack.pop() {
            match step {
                Step::Visit(rel) => {
                    let logical = under(&self.logical_root, &rel);
                    let physical = under(&self.physical_root, &rel);
                    return match tokio::fs::symlink_metadata(&physical).await {
                        Ok(metadata) => {
                            if metadata.is_dir() {
                                self.stack.push(Step::Expand(rel));
                            }
                            Some(PathRecord::found(logical))
                        }
                        Err(error) => {
                            let error = common::Error::from_io(
                                self.side,
                                &logical,
                                "could not stat",
                                error,
                            );
                            Some(PathRecord::failed(logical, error))
                        }
                    };
                }
                Step::Expand(rel) => {
                    let physical = under(&self.physical_root, &rel);
                    match read_sorted(&physical).await {
                        Ok(names) => {
                            self.stack.extend(
                                names
                                    .into_iter()
                                    .rev()
                                    .map(|name| Step::Visit(rel.join(name))),
                            );
                        }
                        Err(error) => {
                            let logical = under(&self.logical_root, &rel);
                            tracing::debug!("cannot read directory {:?}: {}", &logical, &error);
                            let error = common::Error::from_io(
                                self.side,
                                &logical,
                                "cannot read directory",
                                error,
                            );
                            return Some(PathRecord::failed(logical, error));
                        }
                    }
                }
            }
        }
        None
    }
}

/// Walks the tree stored at `physical_root`, reporting paths rebased onto `logical_root`.
pub fn walk(
    side: common::Side,
    physical_root: std::path::PathBuf,
    logical_root: std::path::PathBuf,
) -> RecordStream {
    let state = Walk {
        side,
        physical_root,
        logical_root,
        stack: vec![Step::Expand(std::path::PathBuf::new())],
    };
    futures::stream::unfold(state, |mut state| async move {
        let record = state.next_record().await?;
        Some((record, state))
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tracing_test::traced_test;

    fn setup() -> anyhow::Result<tempfile::TempDir> {
        // root
        // |- b.txt
        // |- a
        //    |- 1.txt
        //    |- sub
        //       |- 2.txt
        // |- c (empty)
        let tmp_dir = tempfile::tempdir()?;
        let root = tmp_dir.path();
        std::fs::write(root.join("b.txt"), "b")?;
        std::fs::create_dir_all(root.join("a").join("sub"))?;
        std::fs::write(root.join("a").join("1.txt"), "1")?;
        std::fs::write(root.join("a").join("sub").join("2.txt"), "2")?;
        std::fs::create_dir(root.join("c"))?;
        Ok(tmp_dir)
    }

    #[tokio::test]
    #[traced_test]
    async fn depth_first_lexical_order() -> anyhow::Result<()> {
        let tmp_dir = setup()?;
        let records: Vec<_> = walk(
            common::Side::Remote,
            tmp_dir.path().to_path_buf(),
            "/srv".into(),
        )
        .collect()
        .await;
        let paths: Vec<_> = records
            .into_iter()
            .map(|record| record.into_result().map_err(anyhow::Error::from))
            .collect::<anyhow::Result<_>>()?;
        let expected: Vec<std::path::PathBuf> = [
            "/srv/a",
            "/srv/a/1.txt",
            "/srv/a/sub",
            "/srv/a/sub/2.txt",
            "/srv/b.txt",
            "/srv/c",
        ]
        .iter()
        .map(std::path::PathBuf::from)
        .collect();
        assert_eq!(paths, expected);
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn unreadable_directory_does_not_stop_walk() -> anyhow::Result<()> {
        let tmp_dir = setup()?;
        let locked = tmp_dir.path().join("a");
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000))?;
        if std::fs::read_dir(&locked).is_ok() {
            // running with privileges that bypass permission checks
            std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755))?;
            return Ok(());
        }
        let records: Vec<_> = walk(
            common::Side::Local,
            tmp_dir.path().to_path_buf(),
            tmp_dir.path().to_path_buf(),
        )
        .collect()
        .await;
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755))?;
        let errors = records.iter().filter(|record| record.error.is_some()).count();
        assert_eq!(errors, 1);
        // "a" itself is still reported, followed by its listing failure, then the siblings
        let found: Vec<_> = records
            .iter()
            .filter(|record| record.error.is_none())
            .map(|record| record.path.clone())
            .collect();
        assert_eq!(
            found,
            vec![
                tmp_dir.path().join("a"),
                tmp_dir.path().join("b.txt"),
                tmp_dir.path().join("c"),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn missing_root_yields_one_error() {
        let records: Vec<_> = walk(
            common::Side::Remote,
            "/definitely/not/here".into(),
            "/missing".into(),
        )
        .collect()
        .await;
        assert_eq!(records.len(), 1);
        assert!(matches!(
            records[0].error,
            Some(common::Error::NotFound { .. })
        ));
    }
}
