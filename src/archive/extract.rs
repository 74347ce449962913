//! Zip extraction and model file search.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ArkError, Result};

/// Extract every entry of the zip at `archive` into `dest`, overwriting.
///
/// Runs on the blocking pool: `ZipFile` readers are not `Send` and the
/// work is plain synchronous I/O.
pub async fn extract_zip(archive: &Path, dest: &Path) -> Result<()> {
    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || extract_zip_blocking(&archive, &dest))
        .await
        .map_err(|e| ArkError::Archive(format!("Extraction task failed: {}", e)))?
}

fn extract_zip_blocking(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| {
        ArkError::Archive(format!(
            "Failed to open '{}' as zip: {}",
            archive_path.display(),
            e
        ))
    })?;
    fs::create_dir_all(dest)?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| ArkError::Archive(format!("Bad zip entry {}: {}", i, e)))?;

        // Strip leading '/' and reject '..'
        let name = entry.name().to_string();
        let safe_name = name.trim_start_matches('/');
        if safe_name.contains("..") {
            return Err(ArkError::Archive(format!(
                "Zip contains path traversal: {}",
                safe_name
            )));
        }
        if safe_name.is_empty() {
            continue;
        }

        let out_path = dest.join(safe_name);
        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
        } else {
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = fs::File::create(&out_path)?;
            std::io::copy(&mut entry, &mut out)?;
        }
    }
    debug!(entries = archive.len(), dest = %dest.display(), "Archive extracted");
    Ok(())
}

/// Depth-first search under `dir` for the first file ending in `.{extension}`.
///
/// Matching is case-insensitive, entries are visited in name order and
/// symlinks are skipped. A missing `dir` yields `None`.
pub fn find_model_file(dir: &Path, extension: &str) -> Result<Option<PathBuf>> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let suffix = format!(".{}", extension.trim_start_matches('.').to_ascii_lowercase());

    let mut entries = fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let ft = entry.file_type()?;
        if ft.is_symlink() {
            continue;
        }
        if ft.is_dir() {
            if let Some(found) = find_model_file(&path, extension)? {
                return Ok(Some(found));
            }
        } else if ft.is_file()
            && entry
                .file_name()
                .to_string_lossy()
                .to_ascii_lowercase()
                .ends_with(&suffix)
        {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

/// Try each of `search_dirs` under `root` in order; first match wins.
pub fn locate_model(
    root: &Path,
    search_dirs: &[String],
    extension: &str,
) -> Result<Option<PathBuf>> {
    for sub in search_dirs {
        if let Some(found) = find_model_file(&root.join(sub), extension)? {
            debug!(path = %found.display(), folder = %sub, "Found model file");
            return Ok(Some(found));
        }
    }
    Ok(None)
}

#[cfg(test)]
pub(crate) fn build_test_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    use std::io::{Cursor, Write};
    let mut archive = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    for (name, body) in entries {
        if name.ends_with('/') {
            archive.add_directory(*name, options).unwrap();
        } else {
            archive.start_file(*name, options).unwrap();
            archive.write_all(body).unwrap();
        }
    }
    archive.finish().unwrap().into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dirs(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn write_zip(tmp: &TempDir, entries: &[(&str, &[u8])]) -> PathBuf {
        let path = tmp.path().join("model.zip");
        fs::write(&path, build_test_zip(entries)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_extract_nested_entries() {
        let tmp = TempDir::new().unwrap();
        let zip = write_zip(
            &tmp,
            &[
                ("rgb/", b""),
                ("rgb/mesh/model.glb", b"glb-bytes"),
                ("pbr/textures/albedo.png", b"png"),
            ],
        );
        let out = tmp.path().join("extracted");
        extract_zip(&zip, &out).await.unwrap();
        assert_eq!(
            fs::read(out.join("rgb/mesh/model.glb")).unwrap(),
            b"glb-bytes"
        );
        assert!(out.join("pbr/textures/albedo.png").is_file());
    }

    #[tokio::test]
    async fn test_extract_overwrites_existing() {
        let tmp = TempDir::new().unwrap();
        let zip = write_zip(&tmp, &[("rgb/a.glb", b"new")]);
        let out = tmp.path().join("extracted");
        fs::create_dir_all(out.join("rgb")).unwrap();
        fs::write(out.join("rgb/a.glb"), b"old").unwrap();
        extract_zip(&zip, &out).await.unwrap();
        assert_eq!(fs::read(out.join("rgb/a.glb")).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_extract_rejects_traversal() {
        let tmp = TempDir::new().unwrap();
        let zip = write_zip(&tmp, &[("../evil.glb", b"x")]);
        let err = extract_zip(&zip, &tmp.path().join("extracted"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("path traversal"));
        assert!(!tmp.path().join("evil.glb").exists());
    }

    #[tokio::test]
    async fn test_extract_non_zip_is_archive_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("model.zip");
        fs::write(&path, b"<html>not found</html>").unwrap();
        let err = extract_zip(&path, &tmp.path().join("out"))
            .await
            .unwrap_err();
        assert!(matches!(err, ArkError::Archive(_)));
    }

    #[test]
    fn test_find_model_file_recursive_case_insensitive() {
        let tmp = TempDir::new().unwrap();
        let deep = tmp.path().join("a/b/c");
        fs::create_dir_all(&deep).unwrap();
        fs::write(deep.join("notes.txt"), b"").unwrap();
        fs::write(deep.join("MODEL.GLB"), b"").unwrap();
        let found = find_model_file(tmp.path(), "glb").unwrap();
        assert_eq!(found, Some(deep.join("MODEL.GLB")));
    }

    #[test]
    fn test_find_model_file_missing_dir_is_none() {
        let tmp = TempDir::new().unwrap();
        assert!(find_model_file(&tmp.path().join("nope"), "glb")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_find_model_file_no_match() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("model.obj"), b"").unwrap();
        fs::write(tmp.path().join("glb"), b"").unwrap();
        assert!(find_model_file(tmp.path(), "glb").unwrap().is_none());
    }

    #[test]
    fn test_find_model_file_is_deterministic() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.glb"), b"").unwrap();
        fs::write(tmp.path().join("a.glb"), b"").unwrap();
        let found = find_model_file(tmp.path(), ".glb").unwrap();
        assert_eq!(found, Some(tmp.path().join("a.glb")));
    }

    #[test]
    fn test_locate_prefers_rgb_over_pbr() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("rgb/x")).unwrap();
        fs::create_dir_all(tmp.path().join("pbr")).unwrap();
        fs::write(tmp.path().join("pbr/model.glb"), b"").unwrap();
        fs::write(tmp.path().join("rgb/x/model.glb"), b"").unwrap();
        let found = locate_model(tmp.path(), &dirs(&["rgb", "pbr"]), "glb").unwrap();
        assert_eq!(found, Some(tmp.path().join("rgb/x/model.glb")));
    }

    #[test]
    fn test_locate_falls_back_to_pbr() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("rgb")).unwrap();
        fs::create_dir_all(tmp.path().join("pbr")).unwrap();
        fs::write(tmp.path().join("rgb/preview.png"), b"").unwrap();
        fs::write(tmp.path().join("pbr/model.glb"), b"").unwrap();
        let found = locate_model(tmp.path(), &dirs(&["rgb", "pbr"]), "glb").unwrap();
        assert_eq!(found, Some(tmp.path().join("pbr/model.glb")));
    }

    #[test]
    fn test_locate_ignores_files_outside_search_dirs() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("model.glb"), b"").unwrap();
        let found = locate_model(tmp.path(), &dirs(&["rgb", "pbr"]), "glb").unwrap();
        assert!(found.is_none());
    }
}
