#![forbid(unsafe_code)]

//! Verification context: configuration, collaborators and the opener.
//!
//! [`Opener::new`] validates a [`Conf`] once; the resulting opener can then
//! open any number of containers, concurrently if the caller wishes.

use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use bdoc_asice::{BufferPool, Limits};
use bdoc_core::{Error, Result, ServiceError};
use bdoc_keys::{loader, Cert};
use serde::Deserialize;

use crate::container::Container;
use crate::freshness::{OcspChecker, TspChecker};

/// BDOC signature profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Profile {
    /// Basic electronic signature.
    #[serde(rename = "BES")]
    Bes,
    /// Time-mark: OCSP response bound to the signature through its nonce.
    #[serde(rename = "TM")]
    Tm,
    /// Time-stamp: RFC 3161 token over the signature value plus OCSP.
    #[serde(rename = "TS")]
    Ts,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Bes => "BES",
            Profile::Tm => "TM",
            Profile::Ts => "TS",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "BES" => Ok(Profile::Bes),
            "TM" => Ok(Profile::Tm),
            "TS" => Ok(Profile::Ts),
            _ => Err(Error::Config(format!("unsupported profile {s:?}"))),
        }
    }
}

/// OCSP client settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OcspConf {
    pub url: String,
    /// PEM certificates of trusted responders.
    #[serde(default)]
    pub responders: Vec<String>,
}

/// TSP client settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TspConf {
    pub url: String,
    /// PEM certificates of trusted timestamp signers.
    #[serde(default)]
    pub signers: Vec<String>,
    /// Maximum difference in seconds between the token's time and the
    /// signing time.
    #[serde(default)]
    pub delay_time: u64,
    /// Times a failed request is retried.
    #[serde(default)]
    pub retry: u32,
}

/// Container verification settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Conf {
    /// Maximum size of the whole archive in bytes.
    #[serde(default)]
    pub bdoc_size: u64,
    /// Maximum decompressed size of a single member in bytes.
    #[serde(default)]
    pub file_size: u64,
    /// PEM certificates of trusted roots.
    #[serde(default)]
    pub roots: Vec<String>,
    /// PEM certificates of untrusted intermediates.
    #[serde(default)]
    pub intermediates: Vec<String>,
    pub profile: Profile,
    pub ocsp: Option<OcspConf>,
    pub tsp: Option<TspConf>,
}

impl Conf {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::Config(e.to_string()))
    }

    /// Read a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }
}

/// Parsed `[ocsp]` section handed to the OCSP connector.
#[derive(Debug, Clone)]
pub struct OcspSettings {
    pub url: String,
    /// Trusted responders, matched by name against the response.
    pub responders: Vec<Cert>,
}

/// Parsed `[tsp]` section handed to the TSP connector.
#[derive(Debug, Clone)]
pub struct TspSettings {
    pub url: String,
    pub signers: Vec<Cert>,
    /// Maximum difference between the token's time and the signing time.
    pub delay: Duration,
    /// Times a failed request is retried.
    pub retry: u32,
}

pub type OcspConnect =
    dyn Fn(&OcspSettings) -> std::result::Result<Arc<dyn OcspChecker>, ServiceError> + Send + Sync;
pub type TspConnect =
    dyn Fn(&TspSettings) -> std::result::Result<Arc<dyn TspChecker>, ServiceError> + Send + Sync;

/// Builds the OCSP and TSP clients from the configured settings.
///
/// The opener calls each connector once, at construction, with the parsed
/// section of [`Conf`] so that the client sees the configured URL, trusted
/// certificates and retry policy.
#[derive(Clone, Default)]
pub struct Services {
    ocsp: Option<Arc<OcspConnect>>,
    tsp: Option<Arc<TspConnect>>,
}

impl Services {
    pub fn with_ocsp<F>(mut self, connect: F) -> Self
    where
        F: Fn(&OcspSettings) -> std::result::Result<Arc<dyn OcspChecker>, ServiceError>
            + Send
            + Sync
            + 'static,
    {
        self.ocsp = Some(Arc::new(connect));
        self
    }

    pub fn with_tsp<F>(mut self, connect: F) -> Self
    where
        F: Fn(&TspSettings) -> std::result::Result<Arc<dyn TspChecker>, ServiceError>
            + Send
            + Sync
            + 'static,
    {
        self.tsp = Some(Arc::new(connect));
        self
    }

    pub fn has_ocsp(&self) -> bool {
        self.ocsp.is_some()
    }

    pub fn has_tsp(&self) -> bool {
        self.tsp.is_some()
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("ocsp", &self.ocsp.is_some())
            .field("tsp", &self.tsp.is_some())
            .finish()
    }
}

/// Opens and verifies containers under one validated configuration.
pub struct Opener {
    pub(crate) limits: Limits,
    pub(crate) roots: Vec<Cert>,
    pub(crate) intermediates: Vec<Cert>,
    pub(crate) profile: Profile,
    pub(crate) ocsp: Option<Arc<dyn OcspChecker>>,
    pub(crate) tsp: Option<Arc<dyn TspChecker>>,
    pool: Arc<BufferPool>,
}

impl fmt::Debug for Opener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Opener")
            .field("limits", &self.limits)
            .field("roots", &self.roots.len())
            .field("intermediates", &self.intermediates.len())
            .field("profile", &self.profile)
            .field("ocsp", &self.ocsp.is_some())
            .field("tsp", &self.tsp.is_some())
            .finish_non_exhaustive()
    }
}

impl Opener {
    /// Validate `conf` and build an opener using the shared buffer pool.
    pub fn new(conf: &Conf, services: Services) -> Result<Self> {
        Self::with_pool(conf, services, BufferPool::shared())
    }

    pub fn with_pool(conf: &Conf, services: Services, pool: Arc<BufferPool>) -> Result<Self> {
        if conf.bdoc_size == 0 {
            return Err(Error::UnconfiguredBdocSize);
        }
        if conf.file_size == 0 {
            return Err(Error::UnconfiguredFileSize);
        }
        if conf.roots.is_empty() {
            return Err(Error::UnconfiguredRoots);
        }
        let roots = loader::load_pem_pool(&conf.roots).map_err(|e| Error::RootsParse(Box::new(e)))?;
        let intermediates = loader::load_pem_pool(&conf.intermediates)
            .map_err(|e| Error::IntermediatesParse(Box::new(e)))?;

        let mut opener = Self {
            limits: Limits {
                archive: conf.bdoc_size,
                file: conf.file_size,
            },
            roots,
            intermediates,
            profile: conf.profile,
            ocsp: None,
            tsp: None,
            pool,
        };

        if matches!(conf.profile, Profile::Tm | Profile::Ts) {
            let (Some(ocsp_conf), Some(connect)) = (&conf.ocsp, &services.ocsp) else {
                return Err(Error::UnconfiguredOcsp {
                    profile: conf.profile.to_string(),
                });
            };
            let settings = OcspSettings {
                url: ocsp_conf.url.clone(),
                responders: loader::load_pem_pool(&ocsp_conf.responders)
                    .map_err(|e| Error::ResponderParse(Box::new(e)))?,
            };
            log::debug!(
                "connecting OCSP client to {:?} with {} responders",
                settings.url,
                settings.responders.len()
            );
            opener.ocsp = Some(connect(&settings).map_err(Error::OcspConnect)?);
        }

        if conf.profile == Profile::Ts {
            let (Some(tsp_conf), Some(connect)) = (&conf.tsp, &services.tsp) else {
                return Err(Error::UnconfiguredTsp {
                    profile: conf.profile.to_string(),
                });
            };
            let settings = TspSettings {
                url: tsp_conf.url.clone(),
                signers: loader::load_pem_pool(&tsp_conf.signers)
                    .map_err(|e| Error::TspSignerParse(Box::new(e)))?,
                delay: Duration::from_secs(tsp_conf.delay_time),
                retry: tsp_conf.retry,
            };
            log::debug!(
                "connecting TSP client to {:?} with {} signers, delay {:?}, {} retries",
                settings.url,
                settings.signers.len(),
                settings.delay,
                settings.retry
            );
            opener.tsp = Some(connect(&settings).map_err(Error::TspConnect)?);
        }

        log::debug!(
            "opener ready: profile {}, {} roots, {} intermediates",
            opener.profile,
            opener.roots.len(),
            opener.intermediates.len()
        );
        Ok(opener)
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    /// Read, parse and verify a container.
    ///
    /// Either every signature verifies under the configured profile and a
    /// [`Container`] is returned, or the first failure is.
    pub fn open<R: Read>(&self, reader: R) -> Result<Container> {
        crate::container::open(self, reader, &self.pool)
    }
}
