// src/kitchen/archive.rs

//! Source archive extraction

use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tar::Archive;
use tracing::debug;

/// Gzip magic bytes
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Extract a `.tar.gz` or plain `.tar` archive into `dest`
///
/// The compression is detected from the leading bytes rather than the file
/// name, since release URLs often end in a bare tag. Returns the source root:
/// the single top-level directory when the archive has one (the common
/// `name-1.0.0/` layout), otherwise `dest` itself.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<PathBuf> {
    let unpack_err = |reason: String| Error::Unpack {
        archive: archive.to_path_buf(),
        reason,
    };

    let mut file = File::open(archive).map_err(|e| unpack_err(e.to_string()))?;
    let mut magic = [0u8; 2];
    let gzipped = match file.read_exact(&mut magic) {
        Ok(()) => magic == GZIP_MAGIC,
        Err(_) => return Err(unpack_err("archive is empty or truncated".to_string())),
    };
    file.seek(SeekFrom::Start(0))?;

    fs::create_dir_all(dest)?;
    let reader: Box<dyn Read> = if gzipped {
        Box::new(GzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    let mut tar = Archive::new(reader);
    tar.set_preserve_permissions(true);
    tar.unpack(dest).map_err(|e| unpack_err(e.to_string()))?;

    let root = source_root(dest)?;
    debug!(
        "Extracted {} ({}) to {}",
        archive.display(),
        if gzipped { "gzip" } else { "tar" },
        root.display()
    );
    Ok(root)
}

/// Descend into a lone top-level directory
fn source_root(dest: &Path) -> Result<PathBuf> {
    let mut entries = fs::read_dir(dest)?.collect::<std::io::Result<Vec<_>>>()?;
    if entries.is_empty() {
        return Err(Error::Unpack {
            archive: dest.to_path_buf(),
            reason: "archive contains no files".to_string(),
        });
    }
    if entries.len() == 1 && entries[0].file_type()?.is_dir() {
        if let Some(entry) = entries.pop() {
            return Ok(entry.path());
        }
    }
    Ok(dest.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    fn tar_bytes(files: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, path, content.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        use std::io::Write;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_extract_gzip_with_single_root() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("v1.0.0");
        fs::write(
            &archive,
            gzip(&tar_bytes(&[("gwt-1.0.0/main.go", "package main\n"), ("gwt-1.0.0/go.mod", "module gwt\n")])),
        )
        .unwrap();

        let root = extract_archive(&archive, &dir.path().join("src")).unwrap();
        assert_eq!(root, dir.path().join("src/gwt-1.0.0"));
        assert_eq!(fs::read_to_string(root.join("main.go")).unwrap(), "package main\n");
    }

    #[test]
    fn test_extract_plain_tar_flat() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("source.tar");
        fs::write(&archive, tar_bytes(&[("main.go", "x"), ("go.mod", "y")])).unwrap();

        let dest = dir.path().join("src");
        let root = extract_archive(&archive, &dest).unwrap();
        assert_eq!(root, dest);
        assert!(root.join("go.mod").exists());
    }

    #[test]
    fn test_extract_garbage_is_unpack_error() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.tar.gz");
        fs::write(&archive, [0x1f, 0x8b, 0x00, 0x01, 0x02]).unwrap();

        let err = extract_archive(&archive, &dir.path().join("src")).unwrap_err();
        assert!(matches!(err, Error::Unpack { .. }));
    }

    #[test]
    fn test_extract_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("empty.tar");
        fs::write(&archive, b"").unwrap();
        assert!(extract_archive(&archive, &dir.path().join("src")).is_err());
    }
}
