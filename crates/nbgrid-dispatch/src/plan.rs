//! Job planning: classification, profile lookup, and resource naming.

use std::collections::HashMap;

use tracing::debug;

use nbgrid_core::{Job, ProfileTable};

use crate::classifier::Classifier;
use crate::error::{DispatchError, DispatchResult};

/// Longest name the control plane accepts for instances and lifecycle configs.
pub const MAX_NAME_LEN: usize = 63;

const LIFECYCLE_SUFFIX: &str = "-lc";

/// Instance name for a workload: `{prefix}-{stem}`.
///
/// The stem is the file name without its extension, lowercased, with every
/// run of other characters collapsed to one hyphen. The name is cut short
/// enough that the derived lifecycle-config name also fits the limit.
pub fn instance_name(prefix: &str, identifier: &str) -> DispatchResult<String> {
    let file_name = identifier.rsplit('/').next().unwrap_or(identifier);
    let stem = match file_name.rfind('.') {
        Some(dot) if dot > 0 => &file_name[..dot],
        _ => file_name,
    };
    let stem = sanitize(stem);
    if stem.is_empty() {
        return Err(DispatchError::InvalidIdentifier(identifier.to_string()));
    }

    let prefix = sanitize(prefix);
    let mut name = if prefix.is_empty() {
        stem
    } else {
        format!("{prefix}-{stem}")
    };
    name.truncate(MAX_NAME_LEN - LIFECYCLE_SUFFIX.len());
    Ok(name.trim_end_matches('-').to_string())
}

pub fn lifecycle_config_name(instance_name: &str) -> String {
    format!("{instance_name}{LIFECYCLE_SUFFIX}")
}

/// Plan one job per identifier, in input order.
///
/// When two identifiers derive the same instance name, the earlier one keeps
/// it and the later one fails with [`DispatchError::DuplicateInstanceName`].
pub fn plan_jobs<'a>(
    identifiers: impl IntoIterator<Item = &'a str>,
    classifier: &Classifier,
    profiles: &ProfileTable,
    prefix: &str,
) -> Vec<DispatchResult<Job>> {
    let mut taken: HashMap<String, String> = HashMap::new();

    identifiers
        .into_iter()
        .map(|identifier| {
            let name = instance_name(prefix, identifier)?;
            if let Some(first) = taken.get(&name) {
                return Err(DispatchError::DuplicateInstanceName {
                    identifier: identifier.to_string(),
                    instance_name: name,
                    first: first.clone(),
                });
            }
            taken.insert(name.clone(), identifier.to_string());

            let category = classifier.classify(identifier);
            let profile = profiles.resolve(category).clone();
            debug!(%identifier, %category, instance = %name, "planned job");
            Ok(Job {
                identifier: identifier.to_string(),
                category,
                profile,
                lifecycle_config_name: lifecycle_config_name(&name),
                instance_name: name,
            })
        })
        .collect()
}

fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_end_matches('-').to_string()
}
