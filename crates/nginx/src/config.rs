use std::fmt;
use std::str::FromStr;

use crate::certbot::CertificatePaths;
use crate::error::Error;

static STREAM_TEMPLATE: &str = include_str!("../templates/stream.conf");
static STREAM_TLS_TEMPLATE: &str = include_str!("../templates/stream-tls.conf");

/// A broker node the proxy forwards to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Backend {
    /// Hostname or address.
    pub host: String,

    /// Port.
    pub port: u16,
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidBackend(s.to_string());

        let (host, port) = s.trim().rsplit_once(':').ok_or_else(invalid)?;
        let port = port.parse().map_err(|_| invalid())?;

        if host.is_empty() || !is_config_safe(host) {
            return Err(invalid());
        }

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Inputs for the generated stream config.
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// Static backend list. Changing it needs a new apply.
    pub backends: Vec<Backend>,

    /// TLS material. Plain TCP if `None`.
    pub certificates: Option<CertificatePaths>,

    /// Public domain of the cluster. Names the upstream.
    pub domain: String,

    /// Port the proxy listens on.
    pub listen_port: u16,
}

impl StreamConfig {
    /// Renders the nginx config.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if there are no backends or a value would
    /// break out of its directive.
    pub fn render(&self) -> Result<String, Error> {
        if self.backends.is_empty() {
            return Err(Error::Config("at least one backend is required".to_string()));
        }

        if self.domain.is_empty() || !is_config_safe(&self.domain) {
            return Err(Error::Config(format!("invalid domain {:?}", self.domain)));
        }

        let backends = self
            .backends
            .iter()
            .map(|backend| format!("        server {backend} max_fails=3 fail_timeout=10s;"))
            .collect::<Vec<_>>()
            .join("\n");

        let config = match &self.certificates {
            Some(certificates) => {
                let certificate = certificates.certificate.to_string_lossy();
                let private_key = certificates.private_key.to_string_lossy();

                if !is_config_safe(&certificate) || !is_config_safe(&private_key) {
                    return Err(Error::Config("invalid certificate path".to_string()));
                }

                STREAM_TLS_TEMPLATE
                    .replace("{certificate}", &certificate)
                    .replace("{private_key}", &private_key)
            }
            None => STREAM_TEMPLATE.to_string(),
        };

        Ok(config
            .replace("{upstream}", &self.upstream_name())
            .replace("{listen_port}", &self.listen_port.to_string())
            .replace("{backends}", &backends))
    }

    fn upstream_name(&self) -> String {
        let name: String = self
            .domain
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();

        format!("warren_{name}")
    }
}

fn is_config_safe(value: &str) -> bool {
    !value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, ';' | '{' | '}' | '#' | '"' | '\''))
}
