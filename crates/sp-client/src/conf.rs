//! Configuration files
//!
//! `properties/` lists the `.conf` files of a namespace; each file is a
//! collection of stanzas under `configs/conf-<name>/`.

use std::ops::{Deref, DerefMut};

use sp_binding::{encode_segment, AtomEntry, Namespace, Params};
use tracing::info;

use crate::collection::{Collection, Item, ListOptions};
use crate::endpoint::Endpoint;
use crate::entity::Entity;
use crate::error::{ClientError, Result};
use crate::service::Service;

pub const PROPERTIES_PATH: &str = "properties/";

fn conf_path(name: &str) -> String {
    format!("configs/conf-{}/", encode_segment(name))
}

/// All configuration files visible in a namespace
#[derive(Debug, Clone)]
pub struct Configurations {
    service: Service,
    namespace: Namespace,
}

impl Configurations {
    pub fn new(service: Service) -> Self {
        Self {
            service,
            namespace: Namespace::default(),
        }
    }

    pub fn in_namespace(mut self, namespace: Namespace) -> Self {
        self.namespace = namespace;
        self
    }

    fn file(&self, name: &str) -> ConfigurationFile {
        ConfigurationFile {
            name: name.to_string(),
            stanzas: Collection::new(self.service.clone(), conf_path(name)).in_namespace(self.namespace.clone()),
        }
    }

    /// Names of the configuration files, as handles
    pub async fn list(&self) -> Result<Vec<ConfigurationFile>> {
        let response = self
            .service
            .context()
            .get(PROPERTIES_PATH, &self.namespace, ListOptions::default().to_params())
            .await?;
        Ok(response
            .atom()?
            .entries
            .iter()
            .map(|entry| self.file(&entry.title))
            .collect())
    }

    pub async fn get(&self, name: &str) -> Result<ConfigurationFile> {
        let path = format!("{}{}", PROPERTIES_PATH, encode_segment(name));
        match self.service.context().get(&path, &self.namespace, Params::new()).await {
            Ok(_) => Ok(self.file(name)),
            Err(e) if e.is_not_found() => Err(ClientError::not_found("Configuration file", name)),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn contains(&self, name: &str) -> Result<bool> {
        match self.get(name).await {
            Ok(_) => Ok(true),
            Err(ClientError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create an empty configuration file. An existing file is returned
    /// as is.
    pub async fn create(&self, name: &str) -> Result<ConfigurationFile> {
        if name.is_empty() {
            return Err(ClientError::invalid_argument("configuration file name is empty"));
        }
        self.service
            .context()
            .post(PROPERTIES_PATH, &self.namespace, Params::new().with("__conf", name))
            .await?;
        info!(name = %name, "Created configuration file");
        Ok(self.file(name))
    }
}

/// One `.conf` file: a collection of stanzas
#[derive(Debug, Clone)]
pub struct ConfigurationFile {
    name: String,
    stanzas: Collection<Stanza>,
}

impl ConfigurationFile {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stanzas(&self) -> &Collection<Stanza> {
        &self.stanzas
    }

    pub async fn list(&self) -> Result<Vec<Stanza>> {
        self.stanzas.list_all().await
    }

    pub async fn get(&self, stanza: &str) -> Result<Stanza> {
        self.stanzas.get(stanza).await
    }

    pub async fn contains(&self, stanza: &str) -> Result<bool> {
        self.stanzas.contains(stanza).await
    }

    pub async fn create(&self, stanza: &str, params: Params) -> Result<Stanza> {
        self.stanzas.create(stanza, params).await
    }

    pub async fn delete(&self, stanza: &str) -> Result<()> {
        self.stanzas.delete(stanza).await
    }
}

#[derive(Debug, Clone)]
pub struct Stanza {
    entity: Entity,
}

impl Item for Stanza {
    fn from_entry(service: &Service, entry: AtomEntry) -> Result<Self> {
        Ok(Self {
            entity: Entity::from_entry(service.clone(), entry)?,
        })
    }
}

impl Deref for Stanza {
    type Target = Entity;

    fn deref(&self) -> &Entity {
        &self.entity
    }
}

impl DerefMut for Stanza {
    fn deref_mut(&mut self) -> &mut Entity {
        &mut self.entity
    }
}

impl Stanza {
    /// Write key/value pairs into the stanza and reload it.
    pub async fn submit(&mut self, params: Params) -> Result<()> {
        Endpoint::post(&self.entity, "", params).await?;
        self.entity.refresh().await?;
        Ok(())
    }

    pub fn into_entity(self) -> Entity {
        self.entity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conf_path() {
        assert_eq!(conf_path("props"), "configs/conf-props/");
        assert_eq!(conf_path("my conf"), "configs/conf-my%20conf/");
    }
}
