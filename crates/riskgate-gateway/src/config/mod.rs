//! Gateway config loader (strict parsing) and the admission rules file.

pub mod schema;

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use riskgate_core::error::{Result, RiskGateError};

use crate::admission::AdmissionRule;

pub use schema::{AdmissionSection, GatewayConfig, ServerSection};

pub fn load_from_file(path: &str) -> Result<GatewayConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| RiskGateError::Internal(format!("read config failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<GatewayConfig> {
    let cfg: GatewayConfig = serde_yaml::from_str(s)
        .map_err(|e| RiskGateError::BadRequest(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Read a JSON rule list. `None` when the file does not exist yet.
pub fn load_rules_file(path: impl AsRef<Path>) -> Result<Option<Vec<AdmissionRule>>> {
    let path = path.as_ref();
    let s = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(RiskGateError::Internal(format!(
                "read rules file {} failed: {e}",
                path.display()
            )))
        }
    };
    let rules = serde_json::from_str(&s)
        .map_err(|e| RiskGateError::BadRequest(format!("invalid rules file {}: {e}", path.display())))?;
    Ok(Some(rules))
}

/// Write the rule list via a temp file + rename so readers never see a
/// partial file.
pub async fn save_rules_file(path: impl AsRef<Path>, rules: &[AdmissionRule]) -> Result<()> {
    let path = path.as_ref();
    let body = serde_json::to_vec_pretty(rules)
        .map_err(|e| RiskGateError::Internal(format!("encode rules failed: {e}")))?;

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, body)
        .await
        .map_err(|e| RiskGateError::Internal(format!("write {} failed: {e}", tmp.display())))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| RiskGateError::Internal(format!("replace {} failed: {e}", path.display())))?;
    Ok(())
}
