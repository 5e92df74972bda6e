//! Search Service HTTP Binding
//!
//! Low-level access to the service's REST API:
//! - Context: authenticated request/response with autologin and retries
//! - Params / abspath: query encoding and namespace-aware path composition
//! - xml: a small element tree over quick-xml for ad-hoc XML replies
//! - atom: Atom feed loading, including the `s:dict`/`s:list` content model

pub mod atom;
pub mod context;
pub mod error;
pub mod url;
pub mod xml;

pub use atom::{load_feed, AtomEntry, AtomFeed};
pub use context::{Context, ContextBuilder, RequestSpec, Response};
pub use error::{BindingError, HttpError};
pub use url::{abspath, encode_segment, Params};
pub use xml::XmlElement;

pub use sp_common::{Namespace, Sharing};

pub type Result<T> = std::result::Result<T, BindingError>;
