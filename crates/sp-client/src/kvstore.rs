//! KV store
//!
//! Collection definitions live under `storage/collections/config/`; their
//! documents under `storage/collections/data/<collection>/`. Document calls
//! speak JSON both ways.

use std::ops::{Deref, DerefMut};

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sp_binding::{encode_segment, AtomEntry, Namespace, Params, RequestSpec, Response};
use tracing::{debug, info};

use crate::collection::{Collection, Item, ListOptions};
use crate::endpoint::Endpoint;
use crate::entity::Entity;
use crate::error::{ClientError, Result};
use crate::service::Service;

pub const KVSTORE_CONFIG_PATH: &str = "storage/collections/config/";
pub const KVSTORE_DATA_PATH: &str = "storage/collections/data/";

/// Values that are not already strings are sent as JSON text.
fn json_param(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The KV store collection definitions of a namespace
#[derive(Debug, Clone)]
pub struct KvStoreCollections {
    collection: Collection<KvStoreCollection>,
}

impl KvStoreCollections {
    pub fn new(service: Service) -> Self {
        Self {
            collection: Collection::new(service, KVSTORE_CONFIG_PATH),
        }
    }

    pub fn in_namespace(self, namespace: Namespace) -> Self {
        Self {
            collection: self.collection.in_namespace(namespace),
        }
    }

    /// Define a collection.
    ///
    /// `accelerated_fields` maps index names to their field spec (e.g.
    /// `{"name": 1}`); `fields` maps field names to types (`string`,
    /// `number`, `bool`, `time`, `array`, `cidr`).
    pub async fn create(
        &self,
        name: &str,
        accelerated_fields: &[(&str, Value)],
        fields: &[(&str, &str)],
        params: Params,
    ) -> Result<KvStoreCollection> {
        let mut form = Params::new();
        for (index, spec) in accelerated_fields {
            form.push(format!("accelerated_fields.{}", index), json_param(spec));
        }
        for (field, kind) in fields {
            form.push(format!("field.{}", field), kind);
        }
        form.extend(params);

        let collection = self.collection.create(name, form).await?;
        info!(name = %name, "Created KV store collection");
        Ok(collection)
    }

    pub async fn list(&self, options: &ListOptions) -> Result<Vec<KvStoreCollection>> {
        self.collection.list(options).await
    }

    pub async fn get(&self, name: &str) -> Result<KvStoreCollection> {
        self.collection.get(name).await
    }

    pub async fn contains(&self, name: &str) -> Result<bool> {
        self.collection.contains(name).await
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        self.collection.delete(name).await
    }
}

#[derive(Debug, Clone)]
pub struct KvStoreCollection {
    entity: Entity,
}

impl Item for KvStoreCollection {
    fn from_entry(service: &Service, entry: AtomEntry) -> Result<Self> {
        Ok(Self {
            entity: Entity::from_entry(service.clone(), entry)?,
        })
    }
}

impl Deref for KvStoreCollection {
    type Target = Entity;

    fn deref(&self) -> &Entity {
        &self.entity
    }
}

impl DerefMut for KvStoreCollection {
    fn deref_mut(&mut self) -> &mut Entity {
        &mut self.entity
    }
}

impl KvStoreCollection {
    /// Documents of this collection, addressed in the collection's own
    /// namespace.
    pub fn data(&self) -> KvStoreData {
        KvStoreData {
            service: self.entity.service().clone(),
            path: format!("{}{}/", KVSTORE_DATA_PATH, encode_segment(self.entity.name())),
            namespace: Endpoint::namespace(&self.entity),
        }
    }

    /// Set one accelerated field; non-string specs are sent as JSON.
    pub async fn update_index(&mut self, name: &str, value: &Value) -> Result<()> {
        let params = Params::new().with(format!("index.{}", name), json_param(value));
        Endpoint::post(&self.entity, "", params).await?;
        self.entity.refresh().await?;
        Ok(())
    }

    /// Set one field type.
    pub async fn update_field(&mut self, name: &str, kind: &str) -> Result<()> {
        let params = Params::new().with(format!("field.{}", name), kind);
        Endpoint::post(&self.entity, "", params).await?;
        self.entity.refresh().await?;
        Ok(())
    }

    pub fn into_entity(self) -> Entity {
        self.entity
    }
}

/// Filter, projection and paging for [`KvStoreData::query`]
#[derive(Debug, Clone, Default)]
pub struct KvQuery {
    /// Mongo-style filter document
    pub query: Option<Value>,
    /// Comma-separated projection, `name,age` or `name:0`
    pub fields: Option<String>,
    /// `field[:1|:-1]`, comma-separated
    pub sort: Option<String>,
    pub limit: Option<u32>,
    pub skip: Option<u32>,
    pub shared: Option<bool>,
}

impl KvQuery {
    pub fn filter(query: Value) -> Self {
        Self {
            query: Some(query),
            ..Self::default()
        }
    }

    pub fn to_params(&self) -> Params {
        Params::new()
            .with_opt("query", self.query.as_ref().map(json_param))
            .with_opt("fields", self.fields.as_deref())
            .with_opt("sort", self.sort.as_deref())
            .with_opt("limit", self.limit)
            .with_opt("skip", self.skip)
            .with_opt("shared", self.shared)
    }
}

/// Documents of one KV store collection
#[derive(Debug, Clone)]
pub struct KvStoreData {
    service: Service,
    path: String,
    namespace: Namespace,
}

impl KvStoreData {
    pub fn path(&self) -> &str {
        &self.path
    }

    fn spec(&self, method: Method, segment: &str, mut params: Params) -> RequestSpec {
        params.set("output_mode", "json");
        RequestSpec::new(method, format!("{}{}", self.path, segment))
            .namespace(self.namespace.clone())
            .params(params)
    }

    async fn send(&self, spec: RequestSpec) -> Result<Response> {
        debug!(method = %spec.method, path = %spec.path, "KV store request");
        Ok(self.service.context().send(spec).await?)
    }

    async fn send_json<T: DeserializeOwned>(&self, spec: RequestSpec) -> Result<T> {
        let response = self.send(spec).await?;
        Ok(serde_json::from_slice(&response.body)?)
    }

    /// Documents matching `query`
    pub async fn query(&self, query: &KvQuery) -> Result<Vec<Value>> {
        self.send_json(self.spec(Method::GET, "", query.to_params())).await
    }

    pub async fn query_by_id(&self, id: &str) -> Result<Value> {
        let spec = self.spec(Method::GET, &encode_segment(id), Params::new());
        match self.send_json(spec).await {
            Err(e) if e.status() == Some(404) => Err(ClientError::not_found("KV store document", id)),
            other => other,
        }
    }

    /// Insert one document; the reply carries its `_key`.
    pub async fn insert(&self, document: &Value) -> Result<Value> {
        let spec = self.spec(Method::POST, "", Params::new()).json_body(document)?;
        self.send_json(spec).await
    }

    /// Replace the document stored under `id`.
    pub async fn update(&self, id: &str, document: &Value) -> Result<Value> {
        let spec = self
            .spec(Method::POST, &encode_segment(id), Params::new())
            .json_body(document)?;
        self.send_json(spec).await
    }

    /// Delete the documents matching `query`, or every document when
    /// `query` is `None`.
    pub async fn delete(&self, query: Option<&Value>) -> Result<()> {
        let params = Params::new().with_opt("query", query.map(json_param));
        self.send(self.spec(Method::DELETE, "", params)).await?;
        Ok(())
    }

    pub async fn delete_by_id(&self, id: &str) -> Result<()> {
        self.send(self.spec(Method::DELETE, &encode_segment(id), Params::new()))
            .await?;
        Ok(())
    }

    /// Run several queries in one request; one result list per query.
    pub async fn batch_find(&self, queries: &[Value]) -> Result<Vec<Vec<Value>>> {
        if queries.is_empty() {
            return Err(ClientError::invalid_argument("batch_find needs at least one query"));
        }
        let spec = self
            .spec(Method::POST, "batch_find", Params::new())
            .json_body(&Value::Array(queries.to_vec()))?;
        self.send_json(spec).await
    }

    /// Insert or replace several documents; returns their keys.
    pub async fn batch_save(&self, documents: &[Value]) -> Result<Vec<String>> {
        if documents.is_empty() {
            return Err(ClientError::invalid_argument("batch_save needs at least one document"));
        }
        let spec = self
            .spec(Method::POST, "batch_save", Params::new())
            .json_body(&Value::Array(documents.to_vec()))?;
        self.send_json(spec).await
    }
}
