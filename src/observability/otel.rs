use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::config::TracingBackendConfig;

/// OTLP exporter settings that send the agent runtime's own telemetry to the
/// tracing backend's OTLP ingest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtlpExporterSettings {
    pub endpoint: String,
    pub headers: String,
}

impl OtlpExporterSettings {
    pub fn for_backend(config: &TracingBackendConfig) -> Self {
        let token = STANDARD.encode(format!("{}:{}", config.public_key, config.secret_key));
        Self {
            endpoint: format!("{}/api/public/otel", config.host.trim_end_matches('/')),
            headers: format!("Authorization=Basic {}", token),
        }
    }

    /// `export` lines for a POSIX shell.
    pub fn to_shell_exports(&self) -> String {
        format!(
            "export OTEL_EXPORTER_OTLP_ENDPOINT='{}'\nexport OTEL_EXPORTER_OTLP_HEADERS='{}'\n",
            self.endpoint, self.headers
        )
    }
}
