// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Implements the configuration file.

use std::fmt::{self, Write};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use base64::Engine;
use log::Level::Debug;
use log::{debug, log_enabled};
use paste::paste;
use serde::{de, Deserialize};

use quandary_resolv::message::tsig::{Algorithm, HmacKey};
use quandary_resolv::name::Name;
use quandary_resolv::resolver::{ResolverConfig, DEFAULT_PORT, DEFAULT_RETRIES, DEFAULT_TIMEOUT};
use quandary_resolv::update::MemoryKeyStore;

use crate::args::{Args, ServerAddr};

////////////////////////////////////////////////////////////////////////
// CONFIGURATION LOADING                                              //
////////////////////////////////////////////////////////////////////////

/// Loads the configuration from the file given by `path`.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let raw_config = fs::read(path.as_ref()).context("failed to read the configuration file")?;
    let config: Config =
        toml::from_slice(&raw_config).context("failed to parse the configuration file")?;
    Ok(config)
}

/// Loads the configuration named on the command line, if any, and
/// applies the command-line overrides to it.
pub fn load(args: &Args) -> Result<Config> {
    let mut config = match args.config {
        Some(ref path) => {
            debug!("Loading the configuration from {}.", path.display());
            load_from_path(path)?
        }
        None => Config::default(),
    };

    if !args.servers.is_empty() {
        config.servers = args.servers.iter().copied().map(ConfigServer).collect();
    }
    if args.tcp {
        config.tcp = true;
    }
    if let Some(timeout) = args.timeout {
        config.timeout = timeout;
    }
    if let Some(retries) = args.retries {
        config.retries = retries;
    }
    log_config_summary(&config);
    Ok(config)
}

/// Summarizes the configuration in the log, if the debug log level is
/// enabled.
fn log_config_summary(config: &Config) {
    if !log_enabled!(Debug) {
        return;
    }

    let mut message = format!(
        "Configuration loaded:\n\
         Timeout:  {} s\n\
         Retries:  {}\n\
         TCP:      {}\n\
         Rotate:   {}\n\
         Servers:  ",
        config.timeout,
        config.retries,
        if config.tcp { "always" } else { "on truncation" },
        config.rotate,
    );
    if config.servers.is_empty() {
        message.push_str("default");
    } else {
        for server in &config.servers {
            write!(message, "\n  {}", server.0.socket_addr(config.port)).unwrap();
        }
    }
    write!(message, "\nKeys:     {}", config.keys.len()).unwrap();
    for key in &config.keys {
        write!(
            message,
            "\n  {} for {} ({})",
            key.name.0,
            key.zone.0,
            key.algorithm.0.name()
        )
        .unwrap();
    }
    debug!("{}", message);
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION FILE STRUCTURE                                       //
////////////////////////////////////////////////////////////////////////

/// The complete configuration file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub servers: Vec<ConfigServer>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default)]
    pub tcp: bool,
    #[serde(default)]
    pub persistent_tcp: bool,
    #[serde(default)]
    pub rotate: bool,
    #[serde(default)]
    pub insecure_source: bool,
    #[serde(default)]
    pub ignore_truncation: bool,
    #[serde(default = "default_ttl")]
    pub default_ttl: u32,
    #[serde(default)]
    pub keys: Vec<KeyConfig>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

fn default_retries() -> u32 {
    DEFAULT_RETRIES
}

fn default_ttl() -> u32 {
    3600
}

impl Default for Config {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            port: default_port(),
            timeout: default_timeout(),
            retries: default_retries(),
            tcp: false,
            persistent_tcp: false,
            rotate: false,
            insecure_source: false,
            ignore_truncation: false,
            default_ttl: default_ttl(),
            keys: Vec::new(),
        }
    }
}

impl Config {
    /// Builds the resolver configuration. Without any servers, the
    /// resolver's default server is kept.
    pub fn resolver_config(&self) -> ResolverConfig {
        let mut resolver_config = ResolverConfig {
            port: self.port,
            timeout: Duration::from_secs(self.timeout),
            retries: self.retries,
            use_tcp: self.tcp,
            persistent_tcp: self.persistent_tcp,
            rotate: self.rotate,
            insecure_source: self.insecure_source,
            ignore_truncation: self.ignore_truncation,
            ..Default::default()
        };
        if !self.servers.is_empty() {
            resolver_config.servers = self
                .servers
                .iter()
                .map(|server| server.0.socket_addr(self.port))
                .collect();
        }
        resolver_config
    }

    /// Builds the key store from the configured keys.
    pub fn key_store(&self) -> Result<MemoryKeyStore> {
        let mut keys = MemoryKeyStore::new();
        for key_config in &self.keys {
            let key = HmacKey::new(
                key_config.name.0.clone(),
                key_config.algorithm.0,
                &key_config.secret.0 .0,
            )
            .map_err(|e| anyhow!("invalid key {}: {}", key_config.name.0, e))?;
            if keys.insert(key_config.zone.0.clone(), key).is_some() {
                return Err(anyhow!("more than one key for zone {}", key_config.zone.0));
            }
        }
        Ok(keys)
    }
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION SECTION: KEYS                                        //
////////////////////////////////////////////////////////////////////////

/// The configuration of a TSIG key used to sign updates to a zone.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyConfig {
    pub zone: ConfigName,
    pub name: ConfigName,
    #[serde(default = "default_algorithm")]
    pub algorithm: ConfigAlgorithm,
    pub secret: ConfigSecret,
}

fn default_algorithm() -> ConfigAlgorithm {
    ConfigAlgorithm(Algorithm::HmacSha256)
}

/// A base64-encoded key secret.
#[derive(Clone)]
pub struct Secret(pub Vec<u8>);

impl FromStr for Secret {
    type Err = base64::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        base64::engine::general_purpose::STANDARD
            .decode(s)
            .map(Secret)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Secret({} octets)", self.0.len())
    }
}

////////////////////////////////////////////////////////////////////////
// WRAPPERS OVER LIBRARY TYPES FOR SERDE                              //
////////////////////////////////////////////////////////////////////////

/// Generates a deserializable `ConfigX` structure wrapping an `X` type,
/// using its [`FromStr`] implementation.
macro_rules! make_serde_wrapper {
    ($wrapper:ident, $over:ty, $description:literal) => {
        /// A macro-generated deserializable wrapper.
        #[derive(Clone, Debug)]
        pub struct $wrapper(pub $over);

        impl<'de> Deserialize<'de> for $wrapper {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: de::Deserializer<'de>,
            {
                deserializer.deserialize_str(paste! { [<$wrapper Visitor>] })
            }
        }

        paste! {
            /// A macro-generated [`Visitor`](de::Visitor).
            #[derive(Debug)]
            struct [<$wrapper Visitor>];
        }

        impl<'de> de::Visitor<'de> for paste! { [<$wrapper Visitor>] } {
            type Value = $wrapper;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str($description)
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                value
                    .parse()
                    .map($wrapper)
                    .map_err(|e| E::custom(format!("invalid {}: {}", $description, e)))
            }
        }
    };
}

make_serde_wrapper!(ConfigName, Name, "domain name");
make_serde_wrapper!(ConfigServer, ServerAddr, "server address");
make_serde_wrapper!(ConfigAlgorithm, Algorithm, "TSIG algorithm");
make_serde_wrapper!(ConfigSecret, Secret, "base64 key secret");

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
        servers = ["192.0.2.53", "[2001:db8::53]:5353"]
        timeout = 2
        rotate = true

        [[keys]]
        zone = "quandary.test."
        name = "update.key."
        secret = "dG9wc2VjcmV0"
    "#;

    #[test]
    fn config_file_is_parsed_with_defaults() {
        let config: Config = toml::from_str(CONFIG).unwrap();
        let resolver_config = config.resolver_config();
        assert_eq!(
            resolver_config.servers,
            vec![
                "192.0.2.53:53".parse().unwrap(),
                "[2001:db8::53]:5353".parse().unwrap()
            ]
        );
        assert_eq!(resolver_config.timeout, Duration::from_secs(2));
        assert_eq!(resolver_config.retries, DEFAULT_RETRIES);
        assert!(resolver_config.rotate);
        assert_eq!(config.default_ttl, 3600);

        let keys = config.key_store().unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(config.keys[0].secret.0 .0, b"topsecret");
        assert_eq!(config.keys[0].algorithm.0, Algorithm::HmacSha256);
    }

    #[test]
    fn unknown_fields_and_bad_values_are_rejected() {
        assert!(toml::from_str::<Config>("colour = true").is_err());
        assert!(toml::from_str::<Config>("servers = [\"nowhere\"]").is_err());
        assert!(toml::from_str::<Config>(
            "[[keys]]\nzone = \"a.\"\nname = \"k.\"\nsecret = \"!!\""
        )
        .is_err());
    }
}
