//! Supplier Aggregate

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::Validate;

use crate::store::Entity;

/// Supplier as returned to clients. The stored API key is never read back
/// out of the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Supplier {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub contact_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub api_endpoint: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub notes: Option<String>,
    /// Free-form dropshipping settings, replaced as a whole on update.
    #[serde(default, skip_serializing_if = "Option::is_none")] pub settings: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for Supplier {
    const COLLECTION: &'static str = "suppliers";
}

/// What the dropshipping client needs to reach a supplier, key included.
/// Read from the same documents as [`Supplier`] but never sent to clients.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplierLink {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub api_endpoint: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub is_active: bool,
}

impl Entity for SupplierLink {
    const COLLECTION: &'static str = "suppliers";
}

impl fmt::Debug for SupplierLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupplierLink")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("api_endpoint", &self.api_endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("is_active", &self.is_active)
            .finish()
    }
}

/// Body of `PUT /api/suppliers/:id/settings`.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct SupplierSettings {
    pub settings: Map<String, Value>,
}

/// Body of `POST /api/suppliers`. New suppliers start active.
#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSupplier {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")] pub contact_name: Option<String>,
    #[validate(email)]
    #[serde(skip_serializing_if = "Option::is_none")] pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")] pub phone: Option<String>,
    #[validate(url)]
    #[serde(skip_serializing_if = "Option::is_none")] pub website: Option<String>,
    #[validate(url)]
    #[serde(skip_serializing_if = "Option::is_none")] pub api_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")] pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")] pub notes: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool { true }

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SupplierPatch {
    #[validate(length(min = 1, max = 200))]
    #[serde(skip_serializing_if = "Option::is_none")] pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")] pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")] pub contact_name: Option<String>,
    #[validate(email)]
    #[serde(skip_serializing_if = "Option::is_none")] pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")] pub phone: Option<String>,
    #[validate(url)]
    #[serde(skip_serializing_if = "Option::is_none")] pub website: Option<String>,
    #[validate(url)]
    #[serde(skip_serializing_if = "Option::is_none")] pub api_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")] pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")] pub is_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")] pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_api_key_is_not_echoed() {
        let stored = json!({"id": "s1", "name": "Acme", "apiKey": "sk_live", "isActive": true});
        let supplier: Supplier = serde_json::from_value(stored).unwrap();
        let out = serde_json::to_value(&supplier).unwrap();
        assert!(out.get("apiKey").is_none());
        assert_eq!(out["name"], json!("Acme"));
    }

    #[test]
    fn test_create_defaults_active_and_keeps_key_for_storage() {
        let body: CreateSupplier = serde_json::from_value(json!({"name": "Acme", "apiKey": "k"})).unwrap();
        assert!(body.is_active);
        assert_eq!(serde_json::to_value(&body).unwrap()["apiKey"], json!("k"));
    }

    #[test]
    fn test_link_reads_the_key_but_debug_hides_it() {
        let stored = json!({"id": "s1", "name": "Acme", "apiEndpoint": "https://acme.test/api", "apiKey": "sk_live"});
        let link: SupplierLink = serde_json::from_value(stored).unwrap();
        assert_eq!(link.api_key.as_deref(), Some("sk_live"));
        let debug = format!("{link:?}");
        assert!(!debug.contains("sk_live"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_settings_round_trip_on_the_record() {
        let stored = json!({"id": "s1", "name": "Acme", "settings": {"autoSync": true, "markup": 20}});
        let supplier: Supplier = serde_json::from_value(stored).unwrap();
        assert_eq!(serde_json::to_value(&supplier).unwrap()["settings"], json!({"autoSync": true, "markup": 20}));
    }

    #[test]
    fn test_rejects_bad_email() {
        let body: CreateSupplier = serde_json::from_value(json!({"name": "Acme", "email": "nope"})).unwrap();
        assert!(body.validate().is_err());
    }
}
