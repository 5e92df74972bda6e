//! Collection
//!
//! A listing endpoint (`saved/searches/`, `data/indexes/`, ...) whose
//! entries are loaded as items of type `T`.

use std::marker::PhantomData;

use async_trait::async_trait;
use sp_binding::{encode_segment, AtomEntry, Namespace, Params, Response};
use tracing::debug;

use crate::endpoint::{join_path, Endpoint};
use crate::entity::{single_entry, Entity, EntityState};
use crate::error::{ClientError, Result};
use crate::service::Service;

/// Something a collection can hand out for each of its entries.
pub trait Item: Sized + Send {
    fn from_entry(service: &Service, entry: AtomEntry) -> Result<Self>;
}

impl Item for Entity {
    fn from_entry(service: &Service, entry: AtomEntry) -> Result<Self> {
        Entity::from_entry(service.clone(), entry)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortMode {
    Auto,
    Alpha,
    AlphaCase,
    Num,
}

/// Paging, filtering and sorting for `list`
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Maximum entries; 0 returns all of them
    pub count: Option<u32>,
    pub offset: Option<u32>,
    pub search: Option<String>,
    pub sort_key: Option<String>,
    pub sort_dir: Option<SortDir>,
    pub sort_mode: Option<SortMode>,
}

impl ListOptions {
    pub fn count(count: u32) -> Self {
        Self {
            count: Some(count),
            ..Self::default()
        }
    }

    pub fn to_params(&self) -> Params {
        Params::new()
            .with("count", self.count.unwrap_or(0))
            .with_opt("offset", self.offset)
            .with_opt("search", self.search.as_deref())
            .with_opt("sort_key", self.sort_key.as_deref())
            .with_opt(
                "sort_dir",
                self.sort_dir.map(|d| match d {
                    SortDir::Asc => "asc",
                    SortDir::Desc => "desc",
                }),
            )
            .with_opt(
                "sort_mode",
                self.sort_mode.map(|m| match m {
                    SortMode::Auto => "auto",
                    SortMode::Alpha => "alpha",
                    SortMode::AlphaCase => "alpha_case",
                    SortMode::Num => "num",
                }),
            )
    }
}

#[derive(Debug)]
pub struct Collection<T = Entity> {
    service: Service,
    path: String,
    namespace: Namespace,
    _item: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            path: self.path.clone(),
            namespace: self.namespace.clone(),
            _item: PhantomData,
        }
    }
}

impl<T: Item> Collection<T> {
    pub fn new(service: Service, path: impl Into<String>) -> Self {
        Self {
            service,
            path: path.into(),
            namespace: Namespace::default(),
            _item: PhantomData,
        }
    }

    /// Same collection, viewed from another namespace
    pub fn in_namespace(mut self, namespace: Namespace) -> Self {
        self.namespace = namespace;
        self
    }

    pub async fn list(&self, options: &ListOptions) -> Result<Vec<T>> {
        let response = Endpoint::get(self, "", options.to_params()).await?;
        self.load_items(&response)
    }

    pub async fn list_all(&self) -> Result<Vec<T>> {
        self.list(&ListOptions::default()).await
    }

    /// Page through the collection `pagesize` entries at a time.
    pub fn pages(&self, pagesize: u32) -> Pages<'_, T> {
        Pages {
            collection: self,
            pagesize: pagesize.max(1),
            offset: 0,
            done: false,
        }
    }

    /// Look an item up by name in this collection's namespace.
    ///
    /// With wildcard namespaces the same name may exist in several apps;
    /// that is an `AmbiguousReference` error.
    pub async fn get(&self, name: &str) -> Result<T> {
        self.get_in(name, &self.namespace).await
    }

    pub async fn get_in(&self, name: &str, namespace: &Namespace) -> Result<T> {
        let path = join_path(&self.path, &encode_segment(name));
        let response = match self.service.context().get(&path, namespace, Params::new()).await {
            Ok(response) => response,
            Err(e) if e.is_not_found() => return Err(ClientError::not_found(&self.path, name)),
            Err(e) => return Err(e.into()),
        };
        let entry = single_entry(&response, name)?;
        T::from_entry(&self.service, entry)
    }

    pub async fn contains(&self, name: &str) -> Result<bool> {
        match self.get(name).await {
            Ok(_) => Ok(true),
            Err(ClientError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create an item. The service usually answers with the new entry;
    /// when it does not, the item is fetched by name.
    pub async fn create(&self, name: &str, params: Params) -> Result<T> {
        let mut form = Params::new().with("name", name);
        form.extend(params);
        let response = Endpoint::post(self, "", form).await?;

        match response.atom().ok().and_then(|feed| feed.entries.into_iter().next()) {
            Some(entry) => T::from_entry(&self.service, entry),
            None => {
                debug!(path = %self.path, name = %name, "Create reply had no entry, fetching");
                self.get(name).await
            }
        }
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        self.delete_in(name, &self.namespace).await
    }

    pub async fn delete_in(&self, name: &str, namespace: &Namespace) -> Result<()> {
        let path = join_path(&self.path, &encode_segment(name));
        match self.service.context().delete(&path, namespace, Params::new()).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Err(ClientError::not_found(&self.path, name)),
            Err(e) => Err(e.into()),
        }
    }

    /// Access and field metadata for new items (`_new` entry)
    pub async fn itemmeta(&self) -> Result<EntityState> {
        let response = Endpoint::get(self, "_new", Params::new()).await?;
        Ok(EntityState::from_entry(single_entry(&response, "_new")?))
    }

    fn load_items(&self, response: &Response) -> Result<Vec<T>> {
        response
            .atom()?
            .entries
            .into_iter()
            .map(|entry| T::from_entry(&self.service, entry))
            .collect()
    }
}

#[async_trait]
impl<T: Item> Endpoint for Collection<T> {
    fn service(&self) -> &Service {
        &self.service
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn namespace(&self) -> Namespace {
        self.namespace.clone()
    }
}

/// Page cursor returned by [`Collection::pages`]
pub struct Pages<'a, T> {
    collection: &'a Collection<T>,
    pagesize: u32,
    offset: u32,
    done: bool,
}

impl<T: Item> Pages<'_, T> {
    /// Next page, or `None` once a short page has been returned
    pub async fn next_page(&mut self) -> Result<Option<Vec<T>>> {
        if self.done {
            return Ok(None);
        }

        let options = ListOptions {
            count: Some(self.pagesize),
            offset: Some(self.offset),
            ..ListOptions::default()
        };
        let items = self.collection.list(&options).await?;

        self.offset += items.len() as u32;
        if (items.len() as u32) < self.pagesize {
            self.done = true;
        }
        if items.is_empty() {
            return Ok(None);
        }
        Ok(Some(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_options_params() {
        let options = ListOptions {
            count: Some(10),
            offset: Some(20),
            search: Some("disabled=0".to_string()),
            sort_key: Some("name".to_string()),
            sort_dir: Some(SortDir::Desc),
            sort_mode: Some(SortMode::AlphaCase),
        };
        assert_eq!(
            options.to_params().encode(),
            "count=10&offset=20&search=disabled%3D0&sort_key=name&sort_dir=desc&sort_mode=alpha_case"
        );
    }

    #[test]
    fn test_default_list_returns_everything() {
        assert_eq!(ListOptions::default().to_params().encode(), "count=0");
    }
}
