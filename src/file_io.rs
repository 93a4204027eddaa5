//! Loading and saving scenes from disk.
//!
//! A container file starts with a [`FileHeader`], followed by the name of the
//! format used for the payload and the payload itself:
//!
//! ```text
//! format_name_size: u64, payload_size: u64
//! format_name_size bytes of UTF-8 format name
//! payload_size bytes of payload
//! ```
//!
//! Raw files hold only the payload; the caller names the format.

use crate::wire::{self, ByteReader};
use crate::*;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FileHeader {
    pub format_name_size: u64,
    pub payload_size: u64,
}

impl FileHeader {
    pub const SIZE: usize = 16;
}

fn file_error(path: &Path, message: impl std::fmt::Display) -> GvoxError {
    GvoxError::new(
        ErrorType::FailedToLoadFile,
        format!("{}: {message}", path.display()),
    )
}

/// Splits a container into its format name and payload.
fn split_container<'a>(path: &Path, bytes: &'a [u8]) -> Result<(&'a str, &'a [u8]), GvoxError> {
    let mut reader = ByteReader::new(bytes);
    let corrupt = |_: GvoxError| file_error(path, "truncated container");
    let header = FileHeader {
        format_name_size: reader.u64().map_err(corrupt)?,
        payload_size: reader.u64().map_err(corrupt)?,
    };
    let expected = header
        .format_name_size
        .checked_add(header.payload_size)
        .filter(|&len| len == reader.remaining() as u64);
    if expected.is_none() {
        return Err(file_error(
            path,
            format!(
                "container declares {} + {} bytes but holds {}",
                header.format_name_size,
                header.payload_size,
                reader.remaining()
            ),
        ));
    }
    let name = reader
        .take(header.format_name_size as usize)
        .map_err(corrupt)?;
    let name = std::str::from_utf8(name).map_err(|e| file_error(path, e))?;
    let payload = reader.take(header.payload_size as usize).map_err(corrupt)?;
    Ok((name, payload))
}

impl Context {
    /// Adds a directory that relative paths are looked up in. The most
    /// recently pushed directory is searched first.
    pub fn push_root_path(&mut self, path: impl AsRef<Path>) {
        self.root_paths.push(path.as_ref().to_path_buf());
    }

    pub fn pop_root_path(&mut self) -> Option<PathBuf> {
        self.root_paths.pop()
    }

    /// Path of an existing file: the first root containing `path`, or `path`
    /// itself.
    fn find_path(&self, path: &Path) -> PathBuf {
        if path.is_relative() {
            for root in self.root_paths.iter().rev() {
                let candidate = root.join(path);
                if candidate.is_file() {
                    return candidate;
                }
            }
        }
        path.to_path_buf()
    }

    /// Path a new file is written to: inside the most recent root, if any.
    fn output_path(&self, path: &Path) -> PathBuf {
        match self.root_paths.last() {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }

    fn read_file(&self, path: &Path) -> Result<(PathBuf, Vec<u8>), GvoxError> {
        let path = self.find_path(path);
        let bytes = fs::read(&path).map_err(|e| file_error(&path, e))?;
        Ok((path, bytes))
    }

    fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<(), GvoxError> {
        let path = self.output_path(path);
        log::debug!("writing {} bytes to {}", bytes.len(), path.display());
        fs::write(&path, bytes).map_err(|e| file_error(&path, e))
    }

    fn load_header_impl(&self, path: &Path) -> Result<FileHeader, GvoxError> {
        let (path, bytes) = self.read_file(path)?;
        let mut reader = ByteReader::new(&bytes);
        let corrupt = |_: GvoxError| file_error(&path, "truncated container header");
        Ok(FileHeader {
            format_name_size: reader.u64().map_err(corrupt)?,
            payload_size: reader.u64().map_err(corrupt)?,
        })
    }

    fn load_impl(&mut self, path: &Path) -> Result<Scene, GvoxError> {
        let (path, bytes) = self.read_file(path)?;
        let (format, payload) = split_container(&path, &bytes)?;
        self.parse_impl(&Payload::from_slice(payload), format)
    }

    fn load_from_raw_impl(&mut self, path: &Path, src_format: &str) -> Result<Scene, GvoxError> {
        let (_, bytes) = self.read_file(path)?;
        self.parse_impl(&Payload::from(bytes), src_format)
    }

    fn save_impl(&mut self, scene: &Scene, path: &Path, dst_format: &str) -> Result<(), GvoxError> {
        let payload = self.serialize_impl(scene, dst_format)?;
        let mut bytes =
            Vec::with_capacity(FileHeader::SIZE + dst_format.len() + payload.as_bytes().len());
        wire::put_u64(&mut bytes, dst_format.len() as u64);
        wire::put_u64(&mut bytes, payload.size());
        bytes.extend_from_slice(dst_format.as_bytes());
        bytes.extend_from_slice(payload.as_bytes());
        self.write_file(path, &bytes)
    }

    fn save_as_raw_impl(
        &mut self,
        scene: &Scene,
        path: &Path,
        dst_format: &str,
    ) -> Result<(), GvoxError> {
        let payload = self.serialize_impl(scene, dst_format)?;
        self.write_file(path, payload.as_bytes())
    }

    pub fn load_header(&mut self, path: impl AsRef<Path>) -> Result<FileHeader, GvoxError> {
        let result = self.load_header_impl(path.as_ref());
        self.record(result)
    }

    /// Loads a container file written by [`Context::save`].
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<Scene, GvoxError> {
        let result = self.load_impl(path.as_ref());
        self.record(result)
    }

    /// Loads a bare payload file, decoding it with `src_format`.
    pub fn load_from_raw(
        &mut self,
        path: impl AsRef<Path>,
        src_format: &str,
    ) -> Result<Scene, GvoxError> {
        let result = self.load_from_raw_impl(path.as_ref(), src_format);
        self.record(result)
    }

    /// Writes `scene` as a container file, recording `dst_format` in its header.
    pub fn save(
        &mut self,
        scene: &Scene,
        path: impl AsRef<Path>,
        dst_format: &str,
    ) -> Result<(), GvoxError> {
        let result = self.save_impl(scene, path.as_ref(), dst_format);
        self.record(result)
    }

    /// Writes only the payload, without a container header.
    pub fn save_as_raw(
        &mut self,
        scene: &Scene,
        path: impl AsRef<Path>,
        dst_format: &str,
    ) -> Result<(), GvoxError> {
        let result = self.save_as_raw_impl(scene, path.as_ref(), dst_format);
        self.record(result)
    }
}
