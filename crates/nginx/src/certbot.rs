use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info};
use warren_process::{ManagedApplication, run_to_completion};

use crate::error::Error;
use crate::locate;

/// Where certbot keeps the current certificate of each domain.
pub const LETSENCRYPT_LIVE_DIR: &str = "/etc/letsencrypt/live";

/// Certificate and key files for a domain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificatePaths {
    /// Full certificate chain.
    pub certificate: PathBuf,

    /// Private key.
    pub private_key: PathBuf,
}

impl CertificatePaths {
    /// The files certbot maintains for `domain` under `live_dir`.
    #[must_use]
    pub fn under(live_dir: &Path, domain: &str) -> Self {
        let dir = live_dir.join(domain);

        Self {
            certificate: dir.join("fullchain.pem"),
            private_key: dir.join("privkey.pem"),
        }
    }

    /// The files certbot maintains for `domain` in the default location.
    #[must_use]
    pub fn letsencrypt(domain: &str) -> Self {
        Self::under(Path::new(LETSENCRYPT_LIVE_DIR), domain)
    }

    /// Checks that both files exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CertificateMissing`] naming the first missing file.
    pub async fn verify(&self) -> Result<(), Error> {
        for path in [&self.certificate, &self.private_key] {
            if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                return Err(Error::CertificateMissing(path.clone()));
            }
        }

        Ok(())
    }
}

/// Application struct for a one-shot certbot run
struct CertbotApp {
    args: Vec<String>,
    executable: String,
}

#[async_trait]
impl ManagedApplication for CertbotApp {
    fn args(&self) -> Vec<String> {
        self.args.clone()
    }

    fn executable(&self) -> &str {
        &self.executable
    }

    fn handle_stdout(&self, line: &str) {
        info!(target: "certbot", "{}", line);
    }

    fn handle_stderr(&self, line: &str) {
        // certbot writes its progress to stderr
        info!(target: "certbot", "{}", line);
    }

    fn name(&self) -> &str {
        "certbot"
    }
}

/// Options for configuring `Certbot`.
pub struct CertbotOptions {
    /// Directory holding `certbot`. Looked up on `PATH` if `None`.
    pub bin_dir: Option<PathBuf>,

    /// Domain to obtain a certificate for.
    pub domain: String,

    /// Contact email for the ACME account.
    pub email: String,

    /// Where certbot places live certificates.
    pub live_dir: PathBuf,

    /// Time limit for the certbot run.
    pub time_limit: Duration,
}

/// Obtains certificates by running certbot with its nginx plugin.
pub struct Certbot {
    domain: String,
    email: String,
    executable: PathBuf,
    live_dir: PathBuf,
    time_limit: Duration,
}

impl Certbot {
    /// Creates a new instance of `Certbot`.
    ///
    /// # Errors
    ///
    /// Returns an error if certbot cannot be located or the domain or email
    /// is empty.
    pub fn new(
        CertbotOptions {
            bin_dir,
            domain,
            email,
            live_dir,
            time_limit,
        }: CertbotOptions,
    ) -> Result<Self, Error> {
        if domain.trim().is_empty() {
            return Err(Error::Config("certificate domain is empty".to_string()));
        }

        if !email.contains('@') {
            return Err(Error::Config(format!("invalid contact email {email:?}")));
        }

        Ok(Self {
            domain,
            email,
            executable: locate(bin_dir.as_deref(), "certbot")?,
            live_dir,
            time_limit,
        })
    }

    /// Arguments passed to certbot.
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        vec![
            "certonly".to_string(),
            "--nginx".to_string(),
            "--non-interactive".to_string(),
            "--agree-tos".to_string(),
            "-m".to_string(),
            self.email.clone(),
            "-d".to_string(),
            self.domain.clone(),
        ]
    }

    /// Runs certbot and returns the paths of the certificate it produced.
    ///
    /// # Errors
    ///
    /// Returns an error if certbot fails or does not produce both files.
    pub async fn obtain(&self) -> Result<CertificatePaths, Error> {
        info!("requesting certificate for {}", self.domain);

        let app = CertbotApp {
            args: self.args(),
            executable: self.executable.to_string_lossy().to_string(),
        };

        let output = run_to_completion(&app, self.time_limit).await?;

        if !output.success() {
            error!("certbot exited with {}", output.status);
            return Err(Error::CertbotFailed(
                output
                    .combined()
                    .lines()
                    .rev()
                    .map(str::trim)
                    .find(|line| !line.is_empty())
                    .unwrap_or("no output")
                    .to_string(),
            ));
        }

        let paths = CertificatePaths::under(&self.live_dir, &self.domain);
        paths.verify().await?;

        info!(
            "certificate for {} available at {}",
            self.domain,
            paths.certificate.display()
        );

        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letsencrypt_paths() {
        let paths = CertificatePaths::letsencrypt("mq.example.com");

        assert_eq!(
            paths.certificate,
            PathBuf::from("/etc/letsencrypt/live/mq.example.com/fullchain.pem")
        );
        assert_eq!(
            paths.private_key,
            PathBuf::from("/etc/letsencrypt/live/mq.example.com/privkey.pem")
        );
    }

    #[test]
    fn test_rejects_bad_email() {
        let result = Certbot::new(CertbotOptions {
            bin_dir: None,
            domain: "mq.example.com".to_string(),
            email: "ops".to_string(),
            live_dir: PathBuf::from(LETSENCRYPT_LIVE_DIR),
            time_limit: Duration::from_secs(60),
        });

        assert!(matches!(result, Err(Error::Config(_))));
    }
}
