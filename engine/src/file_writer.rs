// Copyright 2026 The sbkgen Authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Staged output writer. Files are accumulated fully in memory and only
//! land on disk when they differ from what is already there, so a
//! regeneration with unchanged inputs touches no timestamps and
//! downstream incremental builds stay quiet.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Unchanged,
}

/// A fully generated output file, relative to the output root.
#[derive(Debug, Clone)]
pub struct GeneratedFile {
    pub relative_path: PathBuf,
    pub content: String,
}

impl GeneratedFile {
    pub fn new(relative_path: impl Into<PathBuf>, content: String) -> Self {
        GeneratedFile {
            relative_path: relative_path.into(),
            content,
        }
    }
}

/// Commit one staged file under `root`, replacing the target only when
/// content differs.
pub fn commit(root: &Path, file: &GeneratedFile) -> io::Result<WriteOutcome> {
    let target = root.join(&file.relative_path);
    if let Ok(existing) = fs::read(&target) {
        if existing == file.content.as_bytes() {
            log::debug!("unchanged: {}", target.display());
            return Ok(WriteOutcome::Unchanged);
        }
    }
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&target, file.content.as_bytes())?;
    log::info!("wrote {}", target.display());
    Ok(WriteOutcome::Written)
}

/// Commit a batch; returns how many files were actually (re)written.
pub fn commit_all(root: &Path, files: &[GeneratedFile]) -> io::Result<usize> {
    let mut written = 0;
    for file in files {
        if commit(root, file)? == WriteOutcome::Written {
            written += 1;
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_commit_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let file = GeneratedFile::new("pkg/point_wrapper.cpp", "// generated\n".to_string());
        assert_eq!(
            commit(dir.path(), &file).unwrap(),
            WriteOutcome::Written
        );
        let mtime = fs::metadata(dir.path().join("pkg/point_wrapper.cpp"))
            .unwrap()
            .modified()
            .unwrap();
        assert_eq!(
            commit(dir.path(), &file).unwrap(),
            WriteOutcome::Unchanged
        );
        let mtime_after = fs::metadata(dir.path().join("pkg/point_wrapper.cpp"))
            .unwrap()
            .modified()
            .unwrap();
        assert_eq!(mtime, mtime_after);
    }

    #[test]
    fn changed_content_is_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = GeneratedFile::new("a.h", "one\n".to_string());
        commit(dir.path(), &file).unwrap();
        file.content = "two\n".to_string();
        assert_eq!(commit(dir.path(), &file).unwrap(), WriteOutcome::Written);
        assert_eq!(
            fs::read_to_string(dir.path().join("a.h")).unwrap(),
            "two\n"
        );
    }
}
