use serde::{Deserialize, Serialize};

/// Tenant record owned by the application's clinic administration. The
/// gateway only reads it, apart from seeding at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClinicConfig {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub username: String,
    /// `<hex iv>:<hex ciphertext>` as produced by the secret codec.
    #[serde(default)]
    pub encrypted_password: String,
    #[serde(default)]
    pub is_default: bool,
}
