use std::net::SocketAddr;

use gatelog_types::CountryDenylist;
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Namespace prepended to every requested name. Leading `/` is ignored.
    pub prefix: String,
    pub forbidden_countries: CountryDenylist,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            prefix: String::new(),
            forbidden_countries: CountryDenylist::default(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> ServerResult<()> {
        if self.prefix.split('/').any(|seg| seg == "..") {
            return Err(ServerError::Config(format!(
                "prefix must not contain '..': {}",
                self.prefix
            )));
        }
        Ok(())
    }
}
