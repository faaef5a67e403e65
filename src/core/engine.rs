// src/core/engine.rs
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::{
    BodyStripper, EventBackingFieldFilter, OutputResolver, OutputSpec, OutputTarget,
    RewriteReport, TypeTreeFlattener, VisibilityRewriter,
};
use crate::codec::codec_for;
use crate::config::Config;
use crate::error::{PublicizerError, Result};

/// Result of publicizing one input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputReport {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Codec used for both reading and writing
    pub format: String,
    pub rewrite: RewriteReport,
    pub stripped_bodies: usize,
    /// SHA-256 of the written output, lowercase hex
    pub sha256: String,
}

/// Runs the read, rewrite, strip and write pipeline for single inputs
pub struct Engine {
    resolver: OutputResolver,
    strip_bodies: bool,
    exclude_event_backing_fields: bool,
}

impl Engine {
    pub fn new(config: &Config) -> Self {
        Self {
            resolver: OutputResolver::from_config(&config.output),
            strip_bodies: config.rewrite.strip_bodies,
            exclude_event_backing_fields: config.rewrite.exclude_event_backing_fields,
        }
    }

    /// Where the publicized copy of `input` goes
    pub fn target(&self, input: &Path, output: Option<&OutputSpec>) -> Result<OutputTarget> {
        self.resolver.resolve(input, output)
    }

    /// Publicize `input` and write the result where `output` (or the defaults) say
    pub fn process(&self, input: &Path, output: Option<&OutputSpec>) -> Result<InputReport> {
        if !input.is_file() {
            return Err(PublicizerError::NotFound {
                path: input.to_path_buf(),
            });
        }

        let codec = codec_for(input);
        info!("Reading {} as {}", input.display(), codec.format_name());
        let mut module = codec.read(input)?;

        let order = TypeTreeFlattener::flatten(&module);
        debug!("Flattened {} types of {}", order.len(), module.name);

        let filter = if self.exclude_event_backing_fields {
            EventBackingFieldFilter::from_types(&module, &order)
        } else {
            EventBackingFieldFilter::disabled()
        };
        debug!("{} event names guard their backing fields", filter.event_count());

        let rewrite = VisibilityRewriter::rewrite(&mut module, &order, &filter);
        rewrite.log();

        let stripped_bodies = if self.strip_bodies {
            let stripped = BodyStripper::strip(&mut module, &order);
            info!("Stripped {} method bodies.", stripped);
            stripped
        } else {
            0
        };

        let target = self.target(input, output)?;
        target.ensure_dir()?;
        let path = target.path();
        info!("Saving {}", path.display());
        codec.write(&module, &path)?;

        let written = std::fs::read(&path).map_err(|e| PublicizerError::write(&path, e))?;
        let sha256 = format!("{:x}", Sha256::digest(&written));

        Ok(InputReport {
            input: input.to_path_buf(),
            output: path,
            format: codec.format_name().to_string(),
            rewrite,
            stripped_bodies,
            sha256,
        })
    }
}
