//! Chart archive packaging and inspection
//!
//! Chart archives are gzipped tarballs with every file under a top-level
//! directory named after the chart (`mychart/Chart.yaml`, ...).

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tar::{Archive, Builder, Header};
use walkdir::WalkDir;

use crate::chart::{CHART_FILE, ChartMetadata};
use crate::error::{CoreError, Result};

/// Extension used for chart archives
pub const ARCHIVE_EXTENSION: &str = "tgz";

/// Canonical archive file name for a chart version
#[must_use]
pub fn archive_file_name(name: &str, version: &str) -> String {
    format!("{}-{}.{}", name, version, ARCHIVE_EXTENSION)
}

/// Whether a path looks like a chart archive
pub fn is_archive(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == ARCHIVE_EXTENSION)
}

/// Package a chart directory into a `.tgz` archive
///
/// Entries are added in sorted order with a zero mtime so packaging the same
/// directory twice yields identical bytes. Hidden files are skipped.
pub fn package_chart(chart_dir: &Path, output: &Path) -> Result<ChartMetadata> {
    let metadata = ChartMetadata::load(chart_dir)?;

    let file = File::create(output)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);

    let walker = WalkDir::new(chart_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));

    for entry in walker {
        let entry = entry.map_err(|e| CoreError::Archive {
            message: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(chart_dir)
            .map_err(|e| CoreError::Archive {
                message: e.to_string(),
            })?;
        let archive_path = Path::new(&metadata.name).join(rel);
        let content = std::fs::read(entry.path())?;
        add_bytes_to_archive(&mut builder, &archive_path, &content)?;
    }

    let encoder = builder.into_inner()?;
    encoder.finish()?;

    Ok(metadata)
}

/// Read `Chart.yaml` out of a chart archive on disk
pub fn read_chart_metadata(archive_path: &Path) -> Result<ChartMetadata> {
    let file = File::open(archive_path)?;
    metadata_from_reader(file)
}

/// Read `Chart.yaml` out of an in-memory chart archive
pub fn read_chart_metadata_from_bytes(data: &[u8]) -> Result<ChartMetadata> {
    metadata_from_reader(std::io::Cursor::new(data))
}

fn metadata_from_reader<R: Read>(reader: R) -> Result<ChartMetadata> {
    let mut archive = Archive::new(GzDecoder::new(reader));

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();

        // Only the top-level chart's metadata, not a bundled subchart's
        let is_chart_file = path.components().count() == 2 && path.ends_with(CHART_FILE);
        if is_chart_file {
            let mut content = String::new();
            entry.read_to_string(&mut content)?;
            return ChartMetadata::from_yaml(&content);
        }
    }

    Err(CoreError::Archive {
        message: format!("{} not found in archive", CHART_FILE),
    })
}

fn add_bytes_to_archive<W: Write>(
    builder: &mut Builder<W>,
    archive_path: &Path,
    content: &[u8],
) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_cksum();

    builder.append_data(&mut header, archive_path, content)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_chart(dir: &Path, name: &str, version: &str) {
        std::fs::create_dir_all(dir.join("templates")).unwrap();
        std::fs::write(
            dir.join(CHART_FILE),
            format!("apiVersion: v1\nname: {}\nversion: {}\n", name, version),
        )
        .unwrap();
        std::fs::write(dir.join("values.yaml"), "replicas: 1\n").unwrap();
        std::fs::write(
            dir.join("templates").join("service.yaml"),
            "apiVersion: v1\nkind: Service\n",
        )
        .unwrap();
    }

    #[test]
    fn test_archive_file_name() {
        assert_eq!(archive_file_name("reqtest", "0.1.0"), "reqtest-0.1.0.tgz");
        assert!(is_archive(Path::new("charts/reqtest-0.1.0.tgz")));
        assert!(!is_archive(Path::new("charts/reqtest")));
        assert!(!is_archive(Path::new("charts/reqtest-0.1.0.tar")));
    }

    #[test]
    fn test_package_and_read_metadata() {
        let temp = TempDir::new().unwrap();
        let chart_dir = temp.path().join("reqtest");
        create_test_chart(&chart_dir, "reqtest", "0.1.0");

        let output = temp.path().join("reqtest-0.1.0.tgz");
        let meta = package_chart(&chart_dir, &output).unwrap();
        assert_eq!(meta.name, "reqtest");

        let read = read_chart_metadata(&output).unwrap();
        assert_eq!(read.name, "reqtest");
        assert_eq!(read.version, "0.1.0");

        let bytes = std::fs::read(&output).unwrap();
        assert_eq!(read_chart_metadata_from_bytes(&bytes).unwrap(), read);
    }

    #[test]
    fn test_packaging_is_reproducible() {
        let temp = TempDir::new().unwrap();
        let chart_dir = temp.path().join("reqtest");
        create_test_chart(&chart_dir, "reqtest", "0.1.0");

        let first = temp.path().join("first.tgz");
        let second = temp.path().join("second.tgz");
        package_chart(&chart_dir, &first).unwrap();
        package_chart(&chart_dir, &second).unwrap();

        assert_eq!(std::fs::read(first).unwrap(), std::fs::read(second).unwrap());
    }

    #[test]
    fn test_hidden_files_skipped() {
        let temp = TempDir::new().unwrap();
        let chart_dir = temp.path().join("reqtest");
        create_test_chart(&chart_dir, "reqtest", "0.1.0");
        std::fs::write(chart_dir.join(".secret"), "nope").unwrap();

        let output = temp.path().join("out.tgz");
        package_chart(&chart_dir, &output).unwrap();

        let mut archive = Archive::new(GzDecoder::new(File::open(&output).unwrap()));
        let paths: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
            .collect();

        assert!(paths.contains(&"reqtest/Chart.yaml".to_string()));
        assert!(paths.contains(&"reqtest/templates/service.yaml".to_string()));
        assert!(!paths.iter().any(|p| p.contains(".secret")));
    }

    #[test]
    fn test_missing_chart_yaml_in_archive() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("broken.tgz");

        let encoder = GzEncoder::new(File::create(&output).unwrap(), Compression::default());
        let mut builder = Builder::new(encoder);
        add_bytes_to_archive(&mut builder, Path::new("broken/values.yaml"), b"a: 1\n").unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        assert!(matches!(
            read_chart_metadata(&output),
            Err(CoreError::Archive { .. })
        ));
    }
}
