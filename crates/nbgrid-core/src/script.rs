//! On-start provisioning scripts and their transport encoding.
//!
//! The control plane accepts lifecycle scripts as base64 text. Two script
//! shapes exist: one that syncs every artifact under an object-store prefix
//! to the instance, and one that carries a single workload inline so no
//! object-store round trip is needed at submit time.

use std::io::Write;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::write::GzEncoder;

use crate::error::ScriptError;

/// Where notebooks land on the instance.
pub const DEFAULT_LOCAL_PATH: &str = "/home/ec2-user/SageMaker/";

/// Upper bound on the encoded script length accepted by the control plane.
pub const MAX_ENCODED_SCRIPT_LEN: usize = 16384;

/// Heredoc terminator for inline workloads. Cannot occur in base64 output.
const EMBED_MARKER: &str = "NBGRID_WORKLOAD";

/// A shell script run by the instance on every start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningScript(String);

impl ProvisioningScript {
    /// Wrap raw script text.
    pub fn new(content: impl Into<String>) -> Self {
        Self(content.into())
    }

    /// Script that recursively syncs `s3://{bucket}/{prefix}` to `local_path`.
    pub fn sync_from_store(bucket: &str, prefix: &str, local_path: &str) -> Self {
        Self(format!(
            r#"#!/bin/bash
set -e

# Variables
S3_BUCKET={bucket}
S3_KEY_PREFIX={prefix}
LOCAL_PATH={local_path}

# Download all notebooks from the object store
aws s3 sync "s3://$S3_BUCKET/$S3_KEY_PREFIX" "$LOCAL_PATH"
"#,
            bucket = shell_quote(bucket),
            prefix = shell_quote(prefix.trim_end_matches('/')),
            local_path = shell_quote(local_path),
        ))
    }

    /// Script that writes `content` to `{local_path}/{file_name}`.
    ///
    /// The payload is gzipped before base64 so typical notebooks (mostly
    /// JSON) fit under [`MAX_ENCODED_SCRIPT_LEN`] once the script itself is
    /// encoded.
    pub fn embed_workload(
        file_name: &str,
        content: &[u8],
        local_path: &str,
    ) -> Result<Self, ScriptError> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(content)?;
        let encoded = STANDARD.encode(encoder.finish()?);

        let mut body = String::with_capacity(encoded.len() + encoded.len() / 76 + 1);
        for chunk in encoded.as_bytes().chunks(76) {
            // base64 output is ASCII, so every chunk is valid UTF-8.
            body.push_str(std::str::from_utf8(chunk).unwrap_or_default());
            body.push('\n');
        }

        Ok(Self(format!(
            r#"#!/bin/bash
set -e

LOCAL_PATH={local_path}
mkdir -p "$LOCAL_PATH"
base64 -d <<'{EMBED_MARKER}' | gunzip > "$LOCAL_PATH"/{file_name}
{body}{EMBED_MARKER}
"#,
            local_path = shell_quote(local_path),
            file_name = shell_quote(file_name),
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Transport encoding required by the control plane.
    pub fn encode(&self) -> String {
        STANDARD.encode(self.0.as_bytes())
    }

    /// Inverse of [`ProvisioningScript::encode`].
    pub fn decode(encoded: &str) -> Result<Self, ScriptError> {
        let bytes = STANDARD.decode(encoded.trim())?;
        Ok(Self(String::from_utf8(bytes)?))
    }
}

/// Quote a value for POSIX shells using single quotes.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r#"'\''"#))
}
