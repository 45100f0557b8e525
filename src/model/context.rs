//! Request context handed to the pipeline by the hosting platform.

use serde::{Deserialize, Serialize};

/// The slice of the platform's invocation context the pipeline reads.
///
/// Only opaque identifiers are carried; nothing here is PII.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    /// Individual account identifier.
    #[serde(default)]
    pub account_id: String,
    /// Instance/site identifier. Doubles as the organization identifier.
    pub cloud_id: String,
    /// Module-local identifier (e.g. the panel the request came from).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_id: Option<String>,
    /// License metadata, present on scheduled invocations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<License>,
}

impl Context {
    pub fn new(account_id: impl Into<String>, cloud_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            cloud_id: cloud_id.into(),
            local_id: None,
            license: None,
        }
    }

    pub fn with_license(mut self, license: License) -> Self {
        self.license = Some(license);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct License {
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub is_evaluation: Option<bool>,
}
