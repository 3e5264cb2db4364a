//! Generates and applies the nginx stream config that load-balances broker
//! nodes, and obtains its TLS certificate with certbot.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod certbot;
mod config;
mod error;
mod proxy;

pub use certbot::{Certbot, CertbotOptions, CertificatePaths, LETSENCRYPT_LIVE_DIR};
pub use config::{Backend, StreamConfig};
pub use error::Error;
pub use proxy::{DEFAULT_CONFIG_PATH, NginxProxy, NginxProxyOptions};

use std::path::{Path, PathBuf};

fn locate(bin_dir: Option<&Path>, binary: &'static str) -> Result<PathBuf, Error> {
    match bin_dir {
        Some(dir) => {
            let path = dir.join(binary);
            if path.exists() {
                Ok(path)
            } else {
                Err(Error::BinaryNotFound(binary))
            }
        }
        None => which::which(binary).map_err(|_| Error::BinaryNotFound(binary)),
    }
}
