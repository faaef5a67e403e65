//! Readers and writers for the on-disk module formats.
//!
//! The rewrite engine only sees the [`Module`] symbol model; a codec turns a
//! file into that model and writes the mutated model back out.

mod cil;
mod json;

pub use cil::CilCodec;
pub use json::JsonCodec;

use std::path::Path;

use crate::core::Module;
use crate::error::Result;

/// Trait that all module codecs must implement
pub trait ModuleCodec {
    /// Parse the module stored at `path`
    fn read(&self, path: &Path) -> Result<Module>;

    /// Encode `module` to `path`, replacing any existing file
    fn write(&self, module: &Module, path: &Path) -> Result<()>;

    /// Get the format name
    fn format_name(&self) -> &str;
}

/// Pick the codec for a file: JSON symbol documents by extension, CIL images otherwise
pub fn codec_for(path: &Path) -> Box<dyn ModuleCodec> {
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        Box::new(JsonCodec)
    } else {
        Box::new(CilCodec)
    }
}
