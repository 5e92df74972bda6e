//! Search Service Client
//!
//! Object model over the REST API:
//! - Service: authenticated entry point, server info and version detection
//! - Endpoint / Entity / Collection: generic resources and listings
//! - Jobs / Job: search job creation, polling, control and result reads
//! - SavedSearches: dispatch, history, alerts and suppression
//! - Configurations: `.conf` files and their stanzas
//! - KvStoreCollections: KV store definitions and document CRUD

pub mod collection;
pub mod conf;
pub mod endpoint;
pub mod entity;
pub mod error;
pub mod job;
pub mod kvstore;
pub mod saved_search;
pub mod service;

pub use collection::{Collection, Item, ListOptions, Pages, SortDir, SortMode};
pub use conf::{ConfigurationFile, Configurations, Stanza};
pub use endpoint::Endpoint;
pub use entity::{Access, Entity, EntityState, Fields};
pub use error::ClientError;
pub use job::{Job, Jobs, SearchApi};
pub use kvstore::{KvQuery, KvStoreCollection, KvStoreCollections, KvStoreData};
pub use saved_search::{SavedSearch, SavedSearches};
pub use service::{Service, SplunkVersion};

// Re-export the binding types callers need alongside the object model
pub use sp_binding::{Context, Namespace, Params, Sharing};
pub use sp_config::ClientConfig;

pub type Result<T> = std::result::Result<T, ClientError>;
