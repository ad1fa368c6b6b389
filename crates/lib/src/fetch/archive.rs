//! Source archive extraction.
//!
//! Supports `.tar.gz`/`.tgz`, `.tar.xz`/`.txz`, `.tar`, and `.zip`. When every entry sits under
//! one top-level directory (the usual `name-version/` layout) that directory
//! is stripped, so the destination itself becomes the source root.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::{debug, info, warn};
use xz2::read::XzDecoder;

use super::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
  TarGz,
  TarXz,
  Tar,
  Zip,
}

impl ArchiveKind {
  pub fn from_path(path: &Path) -> Option<Self> {
    let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
      Some(Self::TarGz)
    } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
      Some(Self::TarXz)
    } else if name.ends_with(".tar") {
      Some(Self::Tar)
    } else if name.ends_with(".zip") {
      Some(Self::Zip)
    } else {
      None
    }
  }
}

/// Order tried when the file name does not reveal the format.
const FALLBACK_CHAIN: &[ArchiveKind] = &[ArchiveKind::TarGz, ArchiveKind::Tar, ArchiveKind::Zip];

/// Extract `archive_path` into `dest` and return the source root.
pub fn extract_archive(archive_path: &Path, dest: &Path) -> Result<PathBuf, FetchError> {
  fs::create_dir_all(dest)?;

  if let Some(kind) = ArchiveKind::from_path(archive_path) {
    unpack(kind, archive_path, dest)?;
  } else {
    let mut last_error = None;
    for &kind in FALLBACK_CHAIN {
      match unpack(kind, archive_path, dest) {
        Ok(()) => {
          last_error = None;
          break;
        }
        Err(e) => {
          warn!(archive = %archive_path.display(), format = ?kind, error = %e, "extraction attempt failed");
          clear_dir(dest)?;
          last_error = Some(e);
        }
      }
    }
    if let Some(e) = last_error {
      return Err(e);
    }
  }

  info!(archive = %archive_path.display(), dest = %dest.display(), "unpacked archive");
  Ok(dest.to_path_buf())
}

fn unpack(kind: ArchiveKind, archive_path: &Path, dest: &Path) -> Result<(), FetchError> {
  debug!(archive = %archive_path.display(), format = ?kind, "unpacking");
  let extract_err = |e: std::io::Error| FetchError::Extract {
    path: archive_path.to_path_buf(),
    message: e.to_string(),
  };

  match kind {
    ArchiveKind::TarGz => {
      let strip = tar_strip_prefix(|| Ok(GzDecoder::new(BufReader::new(File::open(archive_path)?))))
        .map_err(extract_err)?;
      let reader = GzDecoder::new(BufReader::new(File::open(archive_path)?));
      unpack_tar(reader, dest, strip).map_err(extract_err)
    }
    ArchiveKind::TarXz => {
      let strip = tar_strip_prefix(|| Ok(XzDecoder::new(BufReader::new(File::open(archive_path)?))))
        .map_err(extract_err)?;
      let reader = XzDecoder::new(BufReader::new(File::open(archive_path)?));
      unpack_tar(reader, dest, strip).map_err(extract_err)
    }
    ArchiveKind::Tar => {
      let strip = tar_strip_prefix(|| Ok(BufReader::new(File::open(archive_path)?))).map_err(extract_err)?;
      let reader = BufReader::new(File::open(archive_path)?);
      unpack_tar(reader, dest, strip).map_err(extract_err)
    }
    ArchiveKind::Zip => unpack_zip(archive_path, dest),
  }
}

/// The single top-level directory shared by every entry, if there is one.
fn common_root<'a>(paths: impl Iterator<Item = &'a Path>) -> Option<PathBuf> {
  let mut root: Option<PathBuf> = None;
  let mut any_nested = false;
  for path in paths {
    let mut components = path.components().filter(|c| !matches!(c, Component::CurDir));
    let first = match components.next() {
      Some(Component::Normal(first)) => PathBuf::from(first),
      _ => return None,
    };
    if components.next().is_some() {
      any_nested = true;
    }
    match &root {
      None => root = Some(first),
      Some(existing) if *existing == first => {}
      Some(_) => return None,
    }
  }
  root.filter(|_| any_nested)
}

fn tar_strip_prefix<R: Read>(open: impl Fn() -> std::io::Result<R>) -> std::io::Result<Option<PathBuf>> {
  let mut archive = Archive::new(open()?);
  let mut paths = Vec::new();
  for entry in archive.entries()? {
    let entry = entry?;
    if matches!(
      entry.header().entry_type(),
      tar::EntryType::XGlobalHeader | tar::EntryType::XHeader
    ) {
      continue;
    }
    paths.push(entry.path()?.into_owned());
  }
  Ok(common_root(paths.iter().map(PathBuf::as_path)))
}

/// Relative path under `dest`, or `None` for the stripped root itself and
/// for entries that would escape `dest`.
fn relative_target(path: &Path, strip: Option<&Path>) -> Option<PathBuf> {
  let rel = match strip {
    Some(prefix) => path
      .components()
      .filter(|c| !matches!(c, Component::CurDir))
      .skip(prefix.components().count())
      .collect::<PathBuf>(),
    None => path.to_path_buf(),
  };
  if rel.as_os_str().is_empty() {
    return None;
  }
  if rel.components().any(|c| !matches!(c, Component::Normal(_) | Component::CurDir)) {
    warn!(entry = %path.display(), "skipping archive entry outside destination");
    return None;
  }
  Some(rel)
}

fn unpack_tar<R: Read>(reader: R, dest: &Path, strip: Option<PathBuf>) -> std::io::Result<()> {
  let mut archive = Archive::new(reader);
  for entry in archive.entries()? {
    let mut entry = entry?;
    if matches!(
      entry.header().entry_type(),
      tar::EntryType::XGlobalHeader | tar::EntryType::XHeader
    ) {
      continue;
    }
    let path = entry.path()?.into_owned();
    let Some(rel) = relative_target(&path, strip.as_deref()) else {
      continue;
    };

    let dest_path = dest.join(rel);
    if let Some(parent) = dest_path.parent() {
      fs::create_dir_all(parent)?;
    }
    entry.unpack(&dest_path)?;
  }
  Ok(())
}

fn unpack_zip(archive_path: &Path, dest: &Path) -> Result<(), FetchError> {
  let zip_err = |e: zip::result::ZipError| FetchError::Extract {
    path: archive_path.to_path_buf(),
    message: e.to_string(),
  };

  let file = File::open(archive_path)?;
  let mut archive = zip::ZipArchive::new(BufReader::new(file)).map_err(zip_err)?;

  let names: Vec<PathBuf> = (0..archive.len())
    .filter_map(|i| archive.by_index(i).ok().and_then(|f| f.enclosed_name()))
    .collect();
  let strip = common_root(names.iter().map(PathBuf::as_path));

  for i in 0..archive.len() {
    let mut file = archive.by_index(i).map_err(zip_err)?;
    let Some(path) = file.enclosed_name() else {
      warn!(entry = %file.name(), "skipping zip entry outside destination");
      continue;
    };
    let Some(rel) = relative_target(&path, strip.as_deref()) else {
      continue;
    };
    let dest_path = dest.join(rel);

    if file.is_dir() {
      fs::create_dir_all(&dest_path)?;
      continue;
    }
    if let Some(parent) = dest_path.parent() {
      fs::create_dir_all(parent)?;
    }
    let mut outfile = File::create(&dest_path)?;
    std::io::copy(&mut file, &mut outfile)?;

    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      if let Some(mode) = file.unix_mode() {
        fs::set_permissions(&dest_path, fs::Permissions::from_mode(mode))?;
      }
    }
  }
  Ok(())
}

fn clear_dir(dir: &Path) -> Result<(), FetchError> {
  for entry in fs::read_dir(dir)? {
    let path = entry?.path();
    if path.is_dir() {
      fs::remove_dir_all(&path)?;
    } else {
      fs::remove_file(&path)?;
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use flate2::Compression;
  use flate2::write::GzEncoder;
  use std::io::Write;
  use tempfile::TempDir;
  use tracing_test::traced_test;

  fn append(builder: &mut tar::Builder<impl Write>, path: &str, content: &[u8]) {
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o755);
    header.set_cksum();
    builder.append_data(&mut header, path, content).unwrap();
  }

  fn write_tar_gz(path: &Path, entries: &[(&str, &[u8])]) {
    let encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, content) in entries {
      append(&mut builder, name, content);
    }
    builder.into_inner().unwrap().finish().unwrap();
  }

  #[test]
  fn detects_kind_from_extension() {
    assert_eq!(ArchiveKind::from_path(Path::new("a-1.0.tar.gz")), Some(ArchiveKind::TarGz));
    assert_eq!(ArchiveKind::from_path(Path::new("a-1.0.TGZ")), Some(ArchiveKind::TarGz));
    assert_eq!(ArchiveKind::from_path(Path::new("gnutls-3.6.2.tar.xz")), Some(ArchiveKind::TarXz));
    assert_eq!(ArchiveKind::from_path(Path::new("a.txz")), Some(ArchiveKind::TarXz));
    assert_eq!(ArchiveKind::from_path(Path::new("a.tar")), Some(ArchiveKind::Tar));
    assert_eq!(ArchiveKind::from_path(Path::new("a.zip")), Some(ArchiveKind::Zip));
    assert_eq!(ArchiveKind::from_path(Path::new("download?dl=1")), None);
  }

  #[test]
  fn strips_single_top_level_directory() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("gnutls-3.6.2.tar.gz");
    write_tar_gz(
      &archive,
      &[
        ("gnutls-3.6.2/configure", b"#!/bin/sh\n"),
        ("gnutls-3.6.2/lib/gnutls.h", b"/* header */"),
      ],
    );

    let dest = temp.path().join("src");
    let root = extract_archive(&archive, &dest).unwrap();

    assert_eq!(root, dest);
    assert!(dest.join("configure").is_file());
    assert!(dest.join("lib/gnutls.h").is_file());
  }

  #[test]
  fn extracts_tar_xz() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("gnutls-3.6.2.tar.xz");
    let encoder = xz2::write::XzEncoder::new(File::create(&archive).unwrap(), 6);
    let mut builder = tar::Builder::new(encoder);
    append(&mut builder, "gnutls-3.6.2/configure", b"#!/bin/sh\n");
    append(&mut builder, "gnutls-3.6.2/COPYING", b"LGPL");
    builder.into_inner().unwrap().finish().unwrap();

    let dest = temp.path().join("src");
    let root = extract_archive(&archive, &dest).unwrap();

    assert_eq!(root, dest);
    assert!(dest.join("configure").is_file());
    assert_eq!(fs::read_to_string(dest.join("COPYING")).unwrap(), "LGPL");
  }

  #[test]
  fn keeps_flat_archives_intact() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("flat.tar.gz");
    write_tar_gz(&archive, &[("configure", b"#!/bin/sh\n"), ("Makefile.in", b"all:\n")]);

    let dest = temp.path().join("src");
    extract_archive(&archive, &dest).unwrap();

    assert!(dest.join("configure").is_file());
    assert!(dest.join("Makefile.in").is_file());
  }

  #[test]
  fn unknown_extension_falls_back_to_tar_gz() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("download_dl=1");
    write_tar_gz(&archive, &[("pkg-1.0/configure", b"#!/bin/sh\n")]);

    let dest = temp.path().join("src");
    extract_archive(&archive, &dest).unwrap();
    assert!(dest.join("configure").is_file());
  }

  #[test]
  fn unknown_extension_falls_back_to_plain_tar() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("blob");
    let mut builder = tar::Builder::new(File::create(&archive).unwrap());
    append(&mut builder, "pkg-1.0/configure", b"#!/bin/sh\n");
    builder.into_inner().unwrap().flush().unwrap();

    let dest = temp.path().join("src");
    extract_archive(&archive, &dest).unwrap();
    assert!(dest.join("configure").is_file());
  }

  #[test]
  fn extracts_zip() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("pkg.zip");
    let mut writer = zip::ZipWriter::new(File::create(&archive).unwrap());
    writer
      .start_file("pkg-1.0/configure", zip::write::SimpleFileOptions::default())
      .unwrap();
    writer.write_all(b"#!/bin/sh\n").unwrap();
    writer.finish().unwrap();

    let dest = temp.path().join("src");
    extract_archive(&archive, &dest).unwrap();
    assert!(dest.join("configure").is_file());
  }

  #[test]
  fn garbage_fails_after_every_attempt() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("garbage");
    fs::write(&archive, b"definitely not an archive").unwrap();

    let result = extract_archive(&archive, &temp.path().join("src"));
    assert!(matches!(result, Err(FetchError::Extract { .. })));
  }

  #[test]
  #[traced_test]
  fn each_failed_attempt_is_logged() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("garbage");
    fs::write(&archive, b"definitely not an archive").unwrap();

    assert!(extract_archive(&archive, &temp.path().join("src")).is_err());

    assert!(logs_contain("format=TarGz"));
    assert!(logs_contain("format=Zip"));
    logs_assert(|lines: &[&str]| {
      let attempts = lines.iter().filter(|l| l.contains("extraction attempt failed")).count();
      if attempts == FALLBACK_CHAIN.len() {
        Ok(())
      } else {
        Err(format!("expected {} failed attempts, saw {attempts}", FALLBACK_CHAIN.len()))
      }
    });
  }
}
