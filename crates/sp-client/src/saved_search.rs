//! Saved searches
//!
//! Stored queries that can be dispatched on demand or run on a schedule and
//! fire alerts.

use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use serde_json::Value;
use sp_binding::{abspath, encode_segment, AtomEntry, Namespace, Params};
use tracing::info;

use crate::collection::{Collection, Item, ListOptions};
use crate::endpoint::Endpoint;
use crate::entity::{single_entry, value_is_true, Entity, EntityState};
use crate::error::{ClientError, Result};
use crate::job::Job;
use crate::service::Service;

pub const SAVED_SEARCHES_PATH: &str = "saved/searches/";
pub const FIRED_ALERTS_PATH: &str = "alerts/fired_alerts/";

/// The `saved/searches` collection
#[derive(Debug, Clone)]
pub struct SavedSearches {
    collection: Collection<SavedSearch>,
}

impl SavedSearches {
    pub fn new(service: Service) -> Self {
        Self {
            collection: Collection::new(service, SAVED_SEARCHES_PATH),
        }
    }

    pub fn in_namespace(self, namespace: Namespace) -> Self {
        Self {
            collection: self.collection.in_namespace(namespace),
        }
    }

    pub async fn create(&self, name: &str, search: &str, params: Params) -> Result<SavedSearch> {
        let mut form = Params::new().with("search", search);
        form.extend(params);
        let saved = self.collection.create(name, form).await?;
        info!(name = %name, "Created saved search");
        Ok(saved)
    }

    pub async fn list(&self, options: &ListOptions) -> Result<Vec<SavedSearch>> {
        self.collection.list(options).await
    }

    pub async fn get(&self, name: &str) -> Result<SavedSearch> {
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
pub struct SavedSearch {
    entity: Entity,
}

impl Item for SavedSearch {
    fn from_entry(service: &Service, entry: AtomEntry) -> Result<Self> {
        Ok(Self {
            entity: Entity::from_entry(service.clone(), entry)?,
        })
    }
}

impl Deref for SavedSearch {
    type Target = Entity;

    fn deref(&self) -> &Entity {
        &self.entity
    }
}

impl DerefMut for SavedSearch {
    fn deref_mut(&mut self) -> &mut Entity {
        &mut self.entity
    }
}

impl SavedSearch {
    pub fn search(&self) -> Option<&str> {
        self.entity.get_str("search")
    }

    /// Run the saved search now.
    pub async fn dispatch(&self, params: Params) -> Result<Job> {
        let output_mode = params.get("output_mode").map(str::to_string);
        let response = Endpoint::post(&self.entity, "dispatch", params).await?;

        let sid = if output_mode.as_deref() == Some("json") {
            let body: Value = response.json()?;
            body["sid"].as_str().map(str::to_string)
        } else {
            response.xml()?.find("sid").map(|sid| sid.text().to_string())
        }
        .filter(|sid| !sid.is_empty())
        .ok_or_else(|| ClientError::incomplete("dispatch reply carried no sid"))?;

        info!(name = %self.name(), sid = %sid, "Dispatched saved search");
        let api = self.entity.service().search_api().await?;
        Ok(Job::new(self.entity.service().clone(), api, &sid))
    }

    /// Jobs previously started from this saved search
    pub async fn history(&self) -> Result<Vec<Job>> {
        let response = Endpoint::get(&self.entity, "history", Params::new()).await?;
        let service = self.entity.service();
        let api = service.search_api().await?;

        Ok(response
            .atom()?
            .entries
            .into_iter()
            .filter(|entry| !entry.title.is_empty())
            .map(|entry| Job::new(service.clone(), api, &entry.title))
            .collect())
    }

    /// Alert groups fired by this search; only scheduled searches have them.
    pub fn fired_alerts(&self) -> Result<Collection<Entity>> {
        if !self.entity.get_bool("is_scheduled") {
            return Err(ClientError::invalid_argument(
                "unscheduled saved searches have no alerts",
            ));
        }
        let path = abspath(
            &format!("{}{}", FIRED_ALERTS_PATH, encode_segment(self.name())),
            &Endpoint::namespace(&self.entity),
        );
        Ok(Collection::new(self.entity.service().clone(), path))
    }

    /// Mark the fired alerts as handled.
    pub async fn acknowledge(&mut self) -> Result<()> {
        Endpoint::post(&self.entity, "acknowledge", Params::new()).await?;
        self.entity.refresh().await?;
        Ok(())
    }

    /// Number of alerts fired, from the last state read
    pub fn alert_count(&self) -> u64 {
        match self.entity.get("triggered_alert_count") {
            Some(Value::String(s)) => s.parse().unwrap_or(0),
            Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
            _ => 0,
        }
    }

    /// Times the scheduler will run this search between `earliest` and
    /// `latest` (time modifiers such as `now` and `+1h`).
    pub async fn scheduled_times(&self, earliest: &str, latest: &str) -> Result<Vec<DateTime<Utc>>> {
        let params = Params::new()
            .with("earliest_time", earliest)
            .with("latest_time", latest);
        let response = Endpoint::get(&self.entity, "scheduled_times", params).await?;
        let state = EntityState::from_entry(single_entry(&response, self.name())?);

        let times = match state.content.get("scheduled_times") {
            Some(Value::Array(items)) => items.iter().filter_map(epoch).collect(),
            Some(value) => epoch(value).into_iter().collect(),
            None => Vec::new(),
        };
        Ok(times)
    }

    /// Suppress alerting for `expiration` (e.g. `2h`).
    pub async fn suppress(&mut self, expiration: &str) -> Result<()> {
        Endpoint::post(&self.entity, "suppress", Params::new().with("expiration", expiration)).await?;
        self.entity.refresh().await?;
        Ok(())
    }

    /// Seconds of suppression left; 0 when not suppressed.
    pub async fn suppressed(&self) -> Result<u64> {
        let response = Endpoint::get(&self.entity, "suppress", Params::new()).await?;
        let state = EntityState::from_entry(single_entry(&response, self.name())?);

        if !state.content.get("suppressed").map(value_is_true).unwrap_or(false) {
            return Ok(0);
        }
        Ok(state
            .content
            .get("expiration")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0))
    }

    pub async fn unsuppress(&mut self) -> Result<()> {
        Endpoint::post(&self.entity, "suppress", Params::new().with("expiration", 0)).await?;
        self.entity.refresh().await?;
        Ok(())
    }

    /// Update attributes, always sending a search string (the current one
    /// unless `search` is given).
    pub async fn update_search(&mut self, search: Option<&str>, params: Params) -> Result<()> {
        let search = match search {
            Some(search) => search.to_string(),
            None => self
                .search()
                .map(str::to_string)
                .ok_or_else(|| ClientError::incomplete("saved search has no search string"))?,
        };
        let mut form = Params::new().with("search", search);
        form.extend(params);
        self.entity.update(form).await
    }

    pub fn into_entity(self) -> Entity {
        self.entity
    }
}

fn epoch(value: &Value) -> Option<DateTime<Utc>> {
    let secs = match value {
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        Value::Number(n) => n.as_i64()?,
        _ => return None,
    };
    DateTime::from_timestamp(secs, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_epoch_values() {
        assert_eq!(epoch(&json!("1700000000")).map(|t| t.timestamp()), Some(1_700_000_000));
        assert_eq!(epoch(&json!(1700000060)).map(|t| t.timestamp()), Some(1_700_000_060));
        assert!(epoch(&json!("soon")).is_none());
    }
}
