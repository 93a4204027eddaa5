//! The built-in formats.
//!
//! Every format here is also available by name through
//! [`Context::load_format`](crate::Context::load_format), and is loaded
//! automatically the first time a context is asked to parse or serialize
//! with it.

mod compressed;
mod packed;
mod palette;
mod raw;

pub use compressed::{Gzip, Zlib, DEFAULT_MAX_INFLATED_SIZE};
pub use packed::GvoxU32;
pub use palette::{GvoxPalette, CHUNK_EDGE, INDEX_BITS, PALETTE_CAPACITY};
pub use raw::GvoxRaw;

use crate::{FormatLoaderInfo, NamedFormat};

/// Names of all formats that can be loaded without registration.
pub const BUILTIN_FORMATS: &[&str] = &[
    "gvox_raw",
    "gvox_u32",
    "gvox_u32_palette",
    "zlib",
    "gzip",
];

/// Registration record of the built-in format called `name`.
pub(crate) fn builtin(name: &str) -> Option<FormatLoaderInfo> {
    let info = match name {
        n if n == GvoxRaw::name() => FormatLoaderInfo::of::<GvoxRaw>(),
        n if n == GvoxU32::name() => FormatLoaderInfo::of::<GvoxU32>(),
        n if n == GvoxPalette::name() => FormatLoaderInfo::of::<GvoxPalette>(),
        n if n == Zlib::name() => FormatLoaderInfo::of::<Zlib>(),
        n if n == Gzip::name() => FormatLoaderInfo::of::<Gzip>(),
        _ => return None,
    };
    Some(info)
}
