//! Execution engine requirements checking implementation.

use std::process::Command;

use serde_json::Value;
use tracing::debug;

use crate::engine::ExecutionConfig;
use crate::error::{Result, SystemRequirementsError};

/// Minimum supported nbconvert version (major, minor).
///
/// nbconvert 6 is the first release that executes through nbclient.
pub const MIN_NBCONVERT_VERSION: (u32, u32) = (6, 0);

/// Results of all engine requirements checks.
#[derive(Debug, Clone)]
pub struct EngineRequirements {
    /// nbconvert version string (e.g., "7.16.4")
    pub nbconvert_version: String,
    /// Parsed nbconvert major version
    pub nbconvert_major: u32,
    /// Parsed nbconvert minor version
    pub nbconvert_minor: u32,
    /// Installed kernel names, if they could be listed
    pub kernels: Vec<String>,
}

impl EngineRequirements {
    /// Returns true if a kernel with this name is installed.
    #[must_use]
    pub fn has_kernel(&self, name: &str) -> bool {
        self.kernels.iter().any(|k| k == name)
    }
}

/// Check all engine requirements and return detailed results.
///
/// Returns `Ok(EngineRequirements)` with all check results, or
/// `Err` with the first failing requirement. A configured kernel that is not
/// installed is only logged, since kernels can be provisioned lazily.
pub fn check_all(config: &ExecutionConfig) -> Result<EngineRequirements> {
    let (nbconvert_version, nbconvert_major, nbconvert_minor) = check_nbconvert(config)?;
    let reqs = EngineRequirements {
        nbconvert_version,
        nbconvert_major,
        nbconvert_minor,
        kernels: list_kernels(config),
    };

    if let Some(kernel) = &config.kernel_name {
        if !reqs.has_kernel(kernel) {
            tracing::warn!(%kernel, available = ?reqs.kernels, "Configured kernel is not installed");
        }
    }

    Ok(reqs)
}

/// Check that `jupyter nbconvert` runs and is recent enough.
///
/// # Returns
///
/// Tuple of (version_string, major, minor) on success.
///
/// # Errors
///
/// Returns error if the launcher is missing, nbconvert is unavailable, or
/// its version is below [`MIN_NBCONVERT_VERSION`].
pub fn check_nbconvert(config: &ExecutionConfig) -> Result<(String, u32, u32)> {
    let output = Command::new(&config.jupyter_command)
        .args(["nbconvert", "--version"])
        .output()
        .map_err(|e| SystemRequirementsError::JupyterMissing {
            command: config.jupyter_command.clone(),
            source: e,
        })?;

    if !output.status.success() {
        return Err(SystemRequirementsError::NbconvertUnavailable {
            command: config.jupyter_command.clone(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
        .into());
    }

    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let (major, minor) = parse_version(&version)?;
    debug!(%version, "Found nbconvert");

    if !version_at_least((major, minor), MIN_NBCONVERT_VERSION) {
        return Err(SystemRequirementsError::NbconvertTooOld {
            found: version,
            required: format!("{}.{}", MIN_NBCONVERT_VERSION.0, MIN_NBCONVERT_VERSION.1),
        }
        .into());
    }

    Ok((version, major, minor))
}

/// Lists installed kernels through `jupyter kernelspec list --json`.
///
/// Returns an empty list if the listing fails.
#[must_use]
pub fn list_kernels(config: &ExecutionConfig) -> Vec<String> {
    match Command::new(&config.jupyter_command)
        .args(["kernelspec", "list", "--json"])
        .output()
    {
        Ok(output) if output.status.success() => {
            parse_kernelspecs(&String::from_utf8_lossy(&output.stdout))
        }
        Ok(output) => {
            debug!(status = ?output.status, "kernelspec listing failed");
            Vec::new()
        }
        Err(e) => {
            debug!(error = %e, "kernelspec listing failed");
            Vec::new()
        }
    }
}

/// Extracts kernel names from `jupyter kernelspec list --json` output.
#[must_use]
pub fn parse_kernelspecs(json: &str) -> Vec<String> {
    serde_json::from_str::<Value>(json)
        .ok()
        .and_then(|v| {
            v.get("kernelspecs")
                .and_then(Value::as_object)
                .map(|specs| specs.keys().cloned().collect())
        })
        .unwrap_or_default()
}

fn version_at_least(found: (u32, u32), required: (u32, u32)) -> bool {
    found.0 > required.0 || (found.0 == required.0 && found.1 >= required.1)
}

/// Parse a version string into (major, minor).
fn parse_version(version: &str) -> Result<(u32, u32)> {
    let unparsable = || SystemRequirementsError::UnparsableVersion {
        output: version.to_string(),
    };

    let mut parts = version.split('.');
    let major = parts
        .next()
        .and_then(|p| p.trim().parse::<u32>().ok())
        .ok_or_else(unparsable)?;

    // Minor version might carry a suffix like "0rc1", extract just the number
    let minor = parts
        .next()
        .and_then(|p| p.split(|c: char| !c.is_ascii_digit()).next())
        .and_then(|p| p.parse::<u32>().ok())
        .ok_or_else(unparsable)?;

    Ok((major, minor))
}
