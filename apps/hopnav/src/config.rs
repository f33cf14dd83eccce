use crate::args::CliArgs;
use hop_net::HttpClientConfig;
use hop_net::TrustStoreMode;
use hop_router::NavigatorOptions;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// `hopnav` TOML file. Every table and key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub(crate) struct HopnavConfig {
    pub navigator: NavigatorOptions,
    pub http: HttpSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub(crate) struct HttpSection {
    pub connect_timeout_secs: u64,
    pub max_redirects: usize,
    pub trust_store: String,
    pub user_agent: Option<String>,
    pub max_body_bytes: usize,
}

impl Default for HttpSection {
    fn default() -> Self {
        let defaults = HttpClientConfig::default();
        Self {
            connect_timeout_secs: defaults.connect_timeout.as_secs(),
            max_redirects: defaults.max_redirects,
            trust_store: "webpki".to_owned(),
            user_agent: None,
            max_body_bytes: defaults.max_body_bytes,
        }
    }
}

impl HopnavConfig {
    pub(crate) fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|error| format!("failed to read config `{}`: {error}", path.display()))?;
        Self::parse(&content)
            .map_err(|error| format!("failed to parse config `{}`: {error}", path.display()))
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Command-line flags win over the file.
    pub(crate) fn apply_flags(mut self, args: &CliArgs) -> Self {
        let navigator = &mut self.navigator;
        navigator.verbose_logging |= args.verbose;
        navigator.prefetch &= !args.no_prefetch;
        navigator.use_native_transitions |= args.transitions;
        navigator.single_flight |= args.single_flight;
        if let Some(mode) = &args.trust_store {
            self.http.trust_store = mode.clone();
        }
        self
    }

    pub(crate) fn http_client(&self) -> Result<HttpClientConfig, String> {
        let trust_store = TrustStoreMode::from_name(&self.http.trust_store).ok_or_else(|| {
            format!(
                "unsupported trust store `{}` (expected: webpki|os)",
                self.http.trust_store
            )
        })?;

        let mut config = HttpClientConfig {
            connect_timeout: Duration::from_secs(self.http.connect_timeout_secs.max(1)),
            max_redirects: self.http.max_redirects,
            trust_store,
            max_body_bytes: self.http.max_body_bytes.max(1),
            ..HttpClientConfig::default()
        };
        if let Some(user_agent) = &self.http.user_agent {
            config.user_agent = user_agent.clone();
        }
        Ok(config)
    }
}
