use crate::engine::planner::EndpointSpec;
use swarm_common::IdentityConfig;

/// Fixed fields stamped into every record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityFormat {
    pub type_tag: String,
    pub label: String,
    pub service_code: String,
}

impl Default for IdentityFormat {
    fn default() -> Self {
        Self::from(&IdentityConfig::default())
    }
}

impl From<&IdentityConfig> for IdentityFormat {
    fn from(cfg: &IdentityConfig) -> Self {
        Self {
            type_tag: cfg.type_tag.clone(),
            label: cfg.label.clone(),
            service_code: cfg.service_code.clone(),
        }
    }
}

impl IdentityFormat {
    /// Two lines: the type tag, then `<label> <index+1>:<port>:<service code>`.
    pub fn record(&self, spec: &EndpointSpec) -> String {
        format!(
            "{}\n{} {}:{}:{}",
            self.type_tag,
            self.label,
            spec.index + 1,
            spec.port,
            self.service_code
        )
    }
}

/// Rendered listing text. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityListing {
    text: String,
    records: usize,
}

impl IdentityListing {
    /// Records appear in the order of `endpoints`, separated by a newline,
    /// with no trailing newline.
    pub fn build(endpoints: &[EndpointSpec], format: &IdentityFormat) -> Self {
        let text = endpoints
            .iter()
            .map(|spec| format.record(spec))
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            text,
            records: endpoints.len(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn records(&self) -> usize {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }
}
