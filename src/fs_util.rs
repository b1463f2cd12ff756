use std::fs;
use std::io::{self, Read};

use camino::{Utf8Path, Utf8PathBuf};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use zip::ZipArchive;

use crate::error::CurateError;

/// Recursively lists files under `root`, sorted by path so that a run is
/// deterministic regardless of directory-entry order on disk.
pub fn walk_files_sorted(root: &Utf8Path) -> Result<Vec<Utf8PathBuf>, CurateError> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = fs::read_dir(dir.as_std_path())
            .map_err(|err| CurateError::Filesystem(format!("read dir {dir}: {err}")))?;
        for entry in entries {
            let entry = entry.map_err(|err| CurateError::Filesystem(err.to_string()))?;
            let path = Utf8PathBuf::from_path_buf(entry.path())
                .map_err(|path| CurateError::Filesystem(format!("non-UTF-8 path: {path:?}")))?;
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

pub fn ensure_dir(dir: &Utf8Path) -> Result<(), CurateError> {
    fs::create_dir_all(dir.as_std_path())
        .map_err(|err| CurateError::Filesystem(format!("create dir {dir}: {err}")))
}

/// Copies `source` to `dest` through a temp file in the destination
/// directory, so a killed run never leaves a half-written image behind.
pub fn copy_file_atomic(source: &Utf8Path, dest: &Utf8Path) -> Result<(), CurateError> {
    let parent = dest
        .parent()
        .ok_or_else(|| CurateError::Filesystem("invalid destination path".to_string()))?;
    ensure_dir(parent)?;
    let temp = tempfile::Builder::new()
        .prefix("bids-curate")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| CurateError::Filesystem(err.to_string()))?;
    fs::copy(source.as_std_path(), temp.path())
        .map_err(|err| CurateError::Filesystem(format!("copy {source}: {err}")))?;
    if dest.as_std_path().exists() {
        fs::remove_file(dest.as_std_path())
            .map_err(|err| CurateError::Filesystem(err.to_string()))?;
    }
    temp.persist(dest.as_std_path())
        .map_err(|err| CurateError::Filesystem(err.to_string()))?;
    Ok(())
}

pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), CurateError> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(tmp_path.as_std_path(), content)
        .map_err(|err| CurateError::Filesystem(format!("write {path}: {err}")))?;
    fs::rename(tmp_path.as_std_path(), path.as_std_path())
        .map_err(|err| CurateError::Filesystem(err.to_string()))?;
    Ok(())
}

/// Copies a bare `.nii` image to a gzip-compressed `.nii.gz` destination.
pub fn gzip_copy(source: &Utf8Path, dest: &Utf8Path) -> Result<(), CurateError> {
    let parent = dest
        .parent()
        .ok_or_else(|| CurateError::Filesystem("invalid destination path".to_string()))?;
    ensure_dir(parent)?;
    let mut input = fs::File::open(source.as_std_path())
        .map_err(|err| CurateError::Filesystem(format!("open {source}: {err}")))?;
    let temp = tempfile::Builder::new()
        .prefix("bids-curate")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| CurateError::Filesystem(err.to_string()))?;
    let mut encoder = GzEncoder::new(&temp, Compression::default());
    io::copy(&mut input, &mut encoder)
        .map_err(|err| CurateError::Filesystem(format!("compress {source}: {err}")))?;
    encoder
        .finish()
        .map_err(|err| CurateError::Filesystem(err.to_string()))?;
    if dest.as_std_path().exists() {
        fs::remove_file(dest.as_std_path())
            .map_err(|err| CurateError::Filesystem(err.to_string()))?;
    }
    temp.persist(dest.as_std_path())
        .map_err(|err| CurateError::Filesystem(err.to_string()))?;
    Ok(())
}

/// Extracts a per-subject zip archive under `target_dir`, returning the
/// number of files written. Directory entries are implied by their files, so
/// only regular entries are unpacked.
pub fn extract_zip(zip_path: &Utf8Path, target_dir: &Utf8Path) -> Result<usize, CurateError> {
    let file = fs::File::open(zip_path.as_std_path())
        .map_err(|err| CurateError::Filesystem(format!("open zip {zip_path}: {err}")))?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| CurateError::Filesystem(err.to_string()))?;

    let mut extracted = 0;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| CurateError::Filesystem(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        let rel = entry.enclosed_name().ok_or_else(|| {
            CurateError::Filesystem(format!("entry escapes archive root in {zip_path}"))
        })?;
        let dest = target_dir.as_std_path().join(rel);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|err| CurateError::Filesystem(err.to_string()))?;
        }
        let mut out =
            fs::File::create(&dest).map_err(|err| CurateError::Filesystem(err.to_string()))?;
        io::copy(&mut entry, &mut out)
            .map_err(|err| CurateError::Filesystem(format!("unpack {zip_path}: {err}")))?;
        extracted += 1;
    }
    Ok(extracted)
}

/// Extracts a per-subject `.tar.gz` archive under `target_dir`. `tar` guards
/// against entries escaping the target on its own.
pub fn extract_tar_gz(tar_path: &Utf8Path, target_dir: &Utf8Path) -> Result<(), CurateError> {
    let file = fs::File::open(tar_path.as_std_path())
        .map_err(|err| CurateError::Filesystem(format!("open archive {tar_path}: {err}")))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    archive
        .unpack(target_dir.as_std_path())
        .map_err(|err| CurateError::Filesystem(format!("unpack {tar_path}: {err}")))
}

/// Reads a JSON metadata file, tolerating the one-site quirk of non-UTF-8
/// sidecars: UTF-8 first, Latin-1 fallback.
pub fn read_json_lenient(path: &Utf8Path) -> Result<serde_json::Value, CurateError> {
    let mut bytes = Vec::new();
    fs::File::open(path.as_std_path())
        .and_then(|mut file| file.read_to_end(&mut bytes))
        .map_err(|err| CurateError::Filesystem(format!("read {path}: {err}")))?;
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => err.as_bytes().iter().map(|&b| b as char).collect(),
    };
    serde_json::from_str(&text).map_err(|err| CurateError::MetadataDecode {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

pub fn write_json_pretty(path: &Utf8Path, value: &serde_json::Value) -> Result<(), CurateError> {
    let mut content =
        serde_json::to_vec_pretty(value).map_err(|err| CurateError::Filesystem(err.to_string()))?;
    content.push(b'\n');
    write_bytes_atomic(path, &content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_is_sorted_and_recursive() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        fs::create_dir_all(root.join("b/deep").as_std_path()).unwrap();
        fs::write(root.join("b/deep/y.nii").as_std_path(), b"y").unwrap();
        fs::write(root.join("a.nii").as_std_path(), b"a").unwrap();

        let files = walk_files_sorted(&root).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.nii"));
        assert!(files[1].ends_with("b/deep/y.nii"));
    }

    #[test]
    fn gzip_copy_writes_gzip_magic() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let source = root.join("image.nii");
        let dest = root.join("image.nii.gz");
        fs::write(source.as_std_path(), b"not really a nifti").unwrap();

        gzip_copy(&source, &dest).unwrap();
        let bytes = fs::read(dest.as_std_path()).unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn lenient_json_accepts_latin1() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let path = root.join("sidecar.json");
        // "Zürich" with a Latin-1 encoded u-umlaut (0xFC)
        fs::write(
            path.as_std_path(),
            b"{\"InstitutionName\": \"Z\xfcrich\"}".to_vec(),
        )
        .unwrap();

        let value = read_json_lenient(&path).unwrap();
        assert_eq!(value["InstitutionName"], "Zürich");
    }
}
