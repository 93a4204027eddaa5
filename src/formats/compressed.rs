use super::raw;
use crate::*;
use flate2::bufread::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use std::io::{self, Read, Write};

/// Largest `gvox_raw` payload a compressed stream may inflate to, unless the
/// handler was built with another limit.
pub const DEFAULT_MAX_INFLATED_SIZE: u64 = 1 << 30;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Stream {
    Zlib,
    Gzip,
}

impl Stream {
    fn compress(self, level: Compression, bytes: &[u8]) -> io::Result<Vec<u8>> {
        match self {
            Stream::Zlib => {
                let mut encoder = ZlibEncoder::new(Vec::new(), level);
                encoder.write_all(bytes)?;
                encoder.finish()
            }
            Stream::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), level);
                encoder.write_all(bytes)?;
                encoder.finish()
            }
        }
    }

    /// Inflates exactly one stream. Bytes after its end and output beyond
    /// `limit` are both rejected.
    fn decompress(self, bytes: &[u8], limit: u64) -> Result<Vec<u8>, GvoxError> {
        let corrupt =
            |e: io::Error| GvoxError::invalid_format(format!("{self:?} stream is corrupt: {e}"));
        let cap = limit.saturating_add(1);
        let mut out = Vec::new();
        let rest = match self {
            Stream::Zlib => {
                let mut decoder = ZlibDecoder::new(bytes);
                (&mut decoder)
                    .take(cap)
                    .read_to_end(&mut out)
                    .map_err(corrupt)?;
                decoder.into_inner()
            }
            Stream::Gzip => {
                let mut decoder = GzDecoder::new(bytes);
                (&mut decoder)
                    .take(cap)
                    .read_to_end(&mut out)
                    .map_err(corrupt)?;
                decoder.into_inner()
            }
        };
        if out.len() as u64 > limit {
            return Err(GvoxError::invalid_format(format!(
                "{self:?} stream inflates past {limit} bytes"
            )));
        }
        if !rest.is_empty() {
            return Err(GvoxError::invalid_format(format!(
                "{} trailing bytes after {self:?} stream",
                rest.len()
            )));
        }
        Ok(out)
    }

    fn create_payload(self, level: Compression, scene: &Scene) -> Result<Payload, GvoxError> {
        self.compress(level, &raw::encode(scene))
            .map(Payload::from)
            .map_err(|e| GvoxError::invalid_format(format!("{self:?} compression failed: {e}")))
    }

    fn parse_payload(self, limit: u64, payload: &Payload) -> Result<Scene, GvoxError> {
        raw::decode(&self.decompress(payload.as_bytes(), limit)?)
    }
}

/// [`GvoxRaw`](super::GvoxRaw) data inside a zlib stream.
#[derive(Copy, Clone, Debug)]
pub struct Zlib {
    level: Compression,
    max_inflated_size: u64,
}

impl Zlib {
    /// Handler compressing at `level`, from 0 (store) to 9 (best).
    pub fn with_level(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
            max_inflated_size: DEFAULT_MAX_INFLATED_SIZE,
        }
    }

    /// Caps how large a parsed stream may inflate to.
    pub fn with_max_inflated_size(self, max_inflated_size: u64) -> Self {
        Self {
            max_inflated_size,
            ..self
        }
    }
}

impl NamedFormat for Zlib {
    fn name() -> &'static str {
        "zlib"
    }
}

impl FormatDescriptor for Zlib {
    type Handler = Self;
}

impl FormatHandler for Zlib {
    fn create() -> Result<Self, GvoxError> {
        Ok(Self {
            level: Compression::default(),
            max_inflated_size: DEFAULT_MAX_INFLATED_SIZE,
        })
    }

    fn create_payload(&mut self, scene: &Scene) -> Result<Payload, GvoxError> {
        Stream::Zlib.create_payload(self.level, scene)
    }

    fn parse_payload(&mut self, payload: &Payload) -> Result<Scene, GvoxError> {
        Stream::Zlib.parse_payload(self.max_inflated_size, payload)
    }
}

/// [`GvoxRaw`](super::GvoxRaw) data inside a gzip stream.
#[derive(Copy, Clone, Debug)]
pub struct Gzip {
    level: Compression,
    max_inflated_size: u64,
}

impl Gzip {
    /// Handler compressing at `level`, from 0 (store) to 9 (best).
    pub fn with_level(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
            max_inflated_size: DEFAULT_MAX_INFLATED_SIZE,
        }
    }

    /// Caps how large a parsed stream may inflate to.
    pub fn with_max_inflated_size(self, max_inflated_size: u64) -> Self {
        Self {
            max_inflated_size,
            ..self
        }
    }
}

impl NamedFormat for Gzip {
    fn name() -> &'static str {
        "gzip"
    }
}

impl FormatDescriptor for Gzip {
    type Handler = Self;
}

impl FormatHandler for Gzip {
    fn create() -> Result<Self, GvoxError> {
        Ok(Self {
            level: Compression::default(),
            max_inflated_size: DEFAULT_MAX_INFLATED_SIZE,
        })
    }

    fn create_payload(&mut self, scene: &Scene) -> Result<Payload, GvoxError> {
        Stream::Gzip.create_payload(self.level, scene)
    }

    fn parse_payload(&mut self, payload: &Payload) -> Result<Scene, GvoxError> {
        Stream::Gzip.parse_payload(self.max_inflated_size, payload)
    }
}
