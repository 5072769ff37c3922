use super::ConnectionPool;
use crate::config::PacsConfig;
use crate::models::ClinicConfig;
use crate::security::SecretCodec;
use crate::storage::ClinicStore;
use base64::Engine;
use http::HeaderValue;
use std::sync::Arc;

/// Upstream endpoint for one request: where to go, how to authenticate, and
/// which pooled client to use. Never persisted.
#[derive(Clone)]
pub struct ResolvedTarget {
    /// Tenant the request was scoped to, as asked for by the caller.
    pub clinic_id: Option<String>,
    pub base_url: String,
    pub username: String,
    password: String,
    pub auth_header: Option<HeaderValue>,
    pub client: reqwest::Client,
}

impl std::fmt::Debug for ResolvedTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedTarget")
            .field("clinic_id", &self.clinic_id)
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl ResolvedTarget {
    pub fn new(
        clinic_id: Option<String>,
        base_url: &str,
        username: &str,
        password: &str,
        client: reqwest::Client,
    ) -> Self {
        Self {
            clinic_id,
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            auth_header: basic_auth_header(username, password),
            client,
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Absolute upstream URL for a root-relative path (query included).
    pub fn url(&self, path_and_query: &str) -> String {
        if path_and_query.starts_with('/') {
            format!("{}{}", self.base_url, path_and_query)
        } else {
            format!("{}/{}", self.base_url, path_and_query)
        }
    }

    /// Request builder with the Basic-Auth header applied.
    pub fn request(&self, method: reqwest::Method, path_and_query: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, self.url(path_and_query));
        match &self.auth_header {
            Some(auth) => builder.header(http::header::AUTHORIZATION, auth.clone()),
            None => builder,
        }
    }
}

fn basic_auth_header(username: &str, password: &str) -> Option<HeaderValue> {
    if username.is_empty() {
        return None;
    }
    let encoded =
        base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", username, password));
    HeaderValue::from_str(&format!("Basic {}", encoded))
        .ok()
        .map(|mut v| {
            v.set_sensitive(true);
            v
        })
}

/// Turns an optional clinic id into a [`ResolvedTarget`].
///
/// Never fails: an unknown clinic, a clinic without a URL, a store error or an
/// undecryptable password all degrade to the default clinic, then to the
/// process-wide `[pacs]` settings.
pub struct ConfigResolver {
    defaults: PacsConfig,
    clinics: Arc<dyn ClinicStore>,
    codec: Arc<SecretCodec>,
    pool: ConnectionPool,
}

impl ConfigResolver {
    pub fn new(
        defaults: PacsConfig,
        clinics: Arc<dyn ClinicStore>,
        codec: Arc<SecretCodec>,
        pool: ConnectionPool,
    ) -> Self {
        Self {
            defaults,
            clinics,
            codec,
            pool,
        }
    }

    pub async fn resolve(&self, clinic_id: Option<&str>) -> ResolvedTarget {
        let clinic_id = clinic_id.map(str::trim).filter(|id| !id.is_empty());
        if let Some(id) = clinic_id {
            match self.clinics.find_clinic(id).await {
                Ok(Some(clinic)) => {
                    if let Some(target) = self.clinic_target(&clinic, id) {
                        return target;
                    }
                }
                Ok(None) => tracing::warn!(clinic_id = id, "Unknown clinic, using default PACS"),
                Err(e) => {
                    tracing::error!(clinic_id = id, "Clinic lookup failed, using default PACS: {}", e)
                }
            }
        }
        self.fallback_target(clinic_id).await
    }

    /// The clinic marked default, else the `[pacs]` settings. The caller's
    /// tenant id is kept so cached responses stay scoped to it.
    async fn fallback_target(&self, clinic_id: Option<&str>) -> ResolvedTarget {
        match self.clinics.default_clinic().await {
            Ok(Some(clinic)) => {
                if let Some(mut target) = self.clinic_target(&clinic, &clinic.id) {
                    target.clinic_id = clinic_id.map(str::to_string);
                    return target;
                }
            }
            Ok(None) => {}
            Err(e) => tracing::error!("Default clinic lookup failed: {}", e),
        }
        self.default_target(clinic_id)
    }

    fn clinic_target(&self, clinic: &ClinicConfig, scope: &str) -> Option<ResolvedTarget> {
        if clinic.url.trim().is_empty() {
            tracing::debug!(clinic_id = %clinic.id, "Clinic has no PACS url, using default PACS");
            return None;
        }

        let password = if clinic.encrypted_password.is_empty() {
            String::new()
        } else {
            match self.codec.decrypt(&clinic.encrypted_password) {
                Some(password) => password,
                None => {
                    tracing::error!(
                        clinic_id = %clinic.id,
                        "Could not decrypt clinic PACS password, using default PACS"
                    );
                    return None;
                }
            }
        };

        Some(ResolvedTarget::new(
            Some(scope.to_string()),
            &clinic.url,
            &clinic.username,
            &password,
            self.pool.client_for(&clinic.url),
        ))
    }

    fn default_target(&self, clinic_id: Option<&str>) -> ResolvedTarget {
        ResolvedTarget::new(
            clinic_id.map(str::to_string),
            &self.defaults.url,
            &self.defaults.username,
            &self.defaults.password,
            self.pool.client_for(&self.defaults.url),
        )
    }
}
