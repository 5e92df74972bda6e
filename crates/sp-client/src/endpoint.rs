//! Endpoint
//!
//! Anything addressable by a REST path: requests take a segment relative
//! to the endpoint's own path and are sent in the endpoint's namespace.

use async_trait::async_trait;
use sp_binding::{Namespace, Params, Response};

use crate::error::Result;
use crate::service::Service;

#[async_trait]
pub trait Endpoint: Send + Sync {
    fn service(&self) -> &Service;

    /// Path of the endpoint, relative (`saved/searches/`) or absolute
    fn path(&self) -> &str;

    fn namespace(&self) -> Namespace {
        Namespace::default()
    }

    async fn get(&self, segment: &str, params: Params) -> Result<Response> {
        let path = join_path(self.path(), segment);
        Ok(self.service().context().get(&path, &self.namespace(), params).await?)
    }

    async fn post(&self, segment: &str, params: Params) -> Result<Response> {
        let path = join_path(self.path(), segment);
        Ok(self.service().context().post(&path, &self.namespace(), params).await?)
    }

    async fn delete(&self, segment: &str, params: Params) -> Result<Response> {
        let path = join_path(self.path(), segment);
        Ok(self.service().context().delete(&path, &self.namespace(), params).await?)
    }
}

/// `base` + `/` + `segment`; an empty segment addresses `base` itself.
pub fn join_path(base: &str, segment: &str) -> String {
    if segment.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), segment.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("saved/searches/", "foo"), "saved/searches/foo");
        assert_eq!(join_path("saved/searches", "foo"), "saved/searches/foo");
        assert_eq!(join_path("search/jobs/1.2/", ""), "search/jobs/1.2/");
        assert_eq!(join_path("/servicesNS/a/b/x", "control"), "/servicesNS/a/b/x/control");
    }
}
