use std::net::SocketAddr;

use serde::Deserialize;
use riskgate_core::error::{Result, RiskGateError};

use crate::admission::store::prepare_rules;
use crate::admission::AdmissionRule;
use crate::decision::{FusionPolicy, RuleSetConfig};
use crate::persistence::PersistenceConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub version: u32,

    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub admission: AdmissionSection,

    #[serde(default)]
    pub orchestrator: FusionPolicy,

    #[serde(default)]
    pub rules: RuleSetConfig,

    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(RiskGateError::UnsupportedVersion);
        }

        self.server.validate()?;
        self.admission.validate()?;
        self.orchestrator.validate()?;
        self.rules.validate()?;
        self.persistence.validate()?;

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Admission resource key guarding the evaluate endpoint.
    #[serde(default = "default_resource")]
    pub resource: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            resource: default_resource(),
        }
    }
}

impl ServerSection {
    pub fn validate(&self) -> Result<()> {
        if self.listen.parse::<SocketAddr>().is_err() {
            return Err(RiskGateError::BadRequest(format!(
                "server.listen must be a socket address (got {})",
                self.listen
            )));
        }
        if self.resource.trim().is_empty() {
            return Err(RiskGateError::BadRequest("server.resource must not be empty".into()));
        }
        Ok(())
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_resource() -> String {
    "/v1/transactions/evaluate".into()
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdmissionSection {
    #[serde(default)]
    pub rules: Vec<AdmissionRule>,

    /// JSON rule list. Overrides `rules` at startup when present and is
    /// rewritten on every admin change.
    #[serde(default)]
    pub rules_file: Option<String>,
}

impl AdmissionSection {
    pub fn validate(&self) -> Result<()> {
        prepare_rules(self.rules.clone())?;
        if matches!(&self.rules_file, Some(p) if p.trim().is_empty()) {
            return Err(RiskGateError::BadRequest("admission.rules_file must not be empty".into()));
        }
        Ok(())
    }
}
