//! Search jobs
//!
//! `Jobs` creates and lists jobs; a `Job` polls its status and reads its
//! output. Servers from 9.0.2 on serve the `search/v2/jobs` endpoints, where
//! result reads are POSTs.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Map, Value};
use sp_binding::{encode_segment, AtomEntry, Namespace, Params, Response};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::collection::ListOptions;
use crate::endpoint::{join_path, Endpoint};
use crate::entity::{single_entry, EntityState};
use crate::error::{ClientError, Result};
use crate::service::Service;

/// Generation of the jobs REST API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchApi {
    /// `search/jobs/`, results read with GET
    V1,
    /// `search/v2/jobs/`, results read with POST
    V2,
}

impl SearchApi {
    pub fn jobs_path(&self) -> &'static str {
        match self {
            SearchApi::V1 => "search/jobs/",
            SearchApi::V2 => "search/v2/jobs/",
        }
    }
}

/// The `search/jobs` collection
#[derive(Debug, Clone)]
pub struct Jobs {
    service: Service,
}

impl Jobs {
    pub fn new(service: Service) -> Self {
        Self { service }
    }

    async fn path(&self) -> Result<&'static str> {
        Ok(self.service.search_api().await?.jobs_path())
    }

    /// Start an asynchronous job and return it without waiting.
    pub async fn create(&self, query: &str, params: Params) -> Result<Job> {
        if params.get("exec_mode") == Some("oneshot") {
            return Err(ClientError::invalid_argument(
                "cannot specify exec_mode=oneshot; use the oneshot method instead",
            ));
        }
        let output_mode = params.get("output_mode").map(str::to_string);

        let mut form = Params::new().with("search", query);
        form.extend(params);
        let response = self
            .service
            .context()
            .post(self.path().await?, &Namespace::default(), form)
            .await?;

        let sid = load_sid(&response, output_mode.as_deref())?;
        info!(sid = %sid, "Created search job");
        self.get_stub(&sid).await
    }

    /// Run a blocking search and return its results body.
    pub async fn oneshot(&self, query: &str, params: Params) -> Result<Bytes> {
        if params.contains("exec_mode") {
            return Err(ClientError::invalid_argument("cannot specify an exec_mode to oneshot"));
        }
        let mut form = Params::new()
            .with("search", query)
            .with("exec_mode", "oneshot")
            .with("segmentation", "none");
        form.extend(params);

        let response = self
            .service
            .context()
            .post(self.path().await?, &Namespace::default(), form)
            .await?;
        Ok(response.body)
    }

    /// Stream results of a search as it runs; returns the whole export body.
    pub async fn export(&self, query: &str, params: Params) -> Result<Bytes> {
        if params.contains("exec_mode") {
            return Err(ClientError::invalid_argument("cannot specify an exec_mode to export"));
        }
        let mut form = Params::new().with("search", query).with("segmentation", "none");
        form.extend(params);

        let path = join_path(self.path().await?, "export");
        let response = self
            .service
            .context()
            .post(&path, &Namespace::default(), form)
            .await?;
        Ok(response.body)
    }

    /// Look a job up by sid and load its status.
    pub async fn get(&self, sid: &str) -> Result<Job> {
        let mut job = self.get_stub(sid).await?;
        match job.refresh().await {
            Ok(_) => Ok(job),
            Err(e) if e.status() == Some(404) => Err(ClientError::not_found("Job", sid)),
            Err(e) => Err(e),
        }
    }

    pub async fn list(&self, options: &ListOptions) -> Result<Vec<Job>> {
        let api = self.service.search_api().await?;
        let response = self
            .service
            .context()
            .get(api.jobs_path(), &Namespace::default(), options.to_params())
            .await?;

        response
            .atom()?
            .entries
            .into_iter()
            .map(|entry| Job::from_entry(self.service.clone(), api, entry))
            .collect()
    }

    async fn get_stub(&self, sid: &str) -> Result<Job> {
        let api = self.service.search_api().await?;
        Ok(Job::new(self.service.clone(), api, sid))
    }
}

/// sid from a job-creation reply, XML by default or JSON on request
fn load_sid(response: &Response, output_mode: Option<&str>) -> Result<String> {
    let sid = if output_mode == Some("json") {
        let body: Value = response.json()?;
        body["sid"].as_str().map(str::to_string)
    } else {
        response.xml()?.find("sid").map(|sid| sid.text().to_string())
    };

    sid.filter(|sid| !sid.is_empty())
        .ok_or_else(|| ClientError::incomplete("job creation reply carried no sid"))
}

#[derive(Debug, Clone)]
pub struct Job {
    service: Service,
    api: SearchApi,
    sid: String,
    path: String,
    state: Option<EntityState>,
}

impl Job {
    pub fn new(service: Service, api: SearchApi, sid: &str) -> Self {
        let path = format!("{}{}", api.jobs_path(), encode_segment(sid));
        Self {
            service,
            api,
            sid: sid.to_string(),
            path,
            state: None,
        }
    }

    fn from_entry(service: Service, api: SearchApi, entry: AtomEntry) -> Result<Self> {
        let state = EntityState::from_entry(entry);
        let sid = state
            .content
            .get("sid")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| state.title.clone());
        if sid.is_empty() {
            return Err(ClientError::incomplete("job entry carried no sid"));
        }

        let mut job = Self::new(service, api, &sid);
        job.state = Some(state);
        Ok(job)
    }

    pub fn sid(&self) -> &str {
        &self.sid
    }

    /// Last status read, if any
    pub fn state(&self) -> Option<&EntityState> {
        self.state.as_ref()
    }

    pub fn content(&self) -> Option<&Map<String, Value>> {
        self.state.as_ref().map(|state| &state.content)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.content()?.get(key)?.as_str()
    }

    /// Reload the job status. Returns false while the server answers 204,
    /// which it does until the job has been registered.
    pub async fn refresh(&mut self) -> Result<bool> {
        let response = Endpoint::get(&*self, "", Params::new()).await?;
        if response.status == 204 {
            debug!(sid = %self.sid, "Job status not available yet");
            return Ok(false);
        }
        let entry = single_entry(&response, &self.sid)?;
        self.state = Some(EntityState::from_entry(entry));
        Ok(true)
    }

    /// True once the job has left the `QUEUED` and `PARSING` states.
    pub async fn is_ready(&mut self) -> Result<bool> {
        if !self.refresh().await? {
            return Ok(false);
        }
        Ok(!matches!(self.get_str("dispatchState"), None | Some("QUEUED") | Some("PARSING")))
    }

    pub async fn is_done(&mut self) -> Result<bool> {
        if !self.is_ready().await? {
            return Ok(false);
        }
        Ok(self.get_str("isDone") == Some("1"))
    }

    /// Poll until the job is done or `timeout` passes.
    pub async fn wait(&mut self, poll_interval: Duration, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        loop {
            if self.is_done().await? {
                debug!(sid = %self.sid, elapsed = ?started.elapsed(), "Job done");
                return Ok(());
            }
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(ClientError::Timeout {
                    sid: self.sid.clone(),
                    elapsed,
                });
            }
            tokio::time::sleep(poll_interval.min(timeout - elapsed)).await;
        }
    }

    async fn control(&self, action: &str, extra: Params) -> Result<()> {
        let mut form = Params::new().with("action", action);
        form.extend(extra);
        Endpoint::post(self, "control", form).await?;
        debug!(sid = %self.sid, action = %action, "Job control");
        Ok(())
    }

    /// Stop the job and remove it. A job that is already gone is fine.
    pub async fn cancel(&self) -> Result<()> {
        match self.control("cancel", Params::new()).await {
            Err(e) if e.status() == Some(404) => Ok(()),
            other => other,
        }
    }

    pub async fn finalize(&self) -> Result<()> {
        self.control("finalize", Params::new()).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.control("pause", Params::new()).await
    }

    pub async fn unpause(&self) -> Result<()> {
        self.control("unpause", Params::new()).await
    }

    /// Reset the job's time to live.
    pub async fn touch(&self) -> Result<()> {
        self.control("touch", Params::new()).await
    }

    pub async fn set_ttl(&self, ttl: Duration) -> Result<()> {
        self.control("setttl", Params::new().with("ttl", ttl.as_secs())).await
    }

    /// Priority from 0 (lowest) to 10
    pub async fn set_priority(&self, priority: u8) -> Result<()> {
        if priority > 10 {
            return Err(ClientError::invalid_argument("priority must be between 0 and 10"));
        }
        self.control("setpriority", Params::new().with("priority", priority)).await
    }

    pub async fn enable_preview(&self) -> Result<()> {
        self.control("enablepreview", Params::new()).await
    }

    pub async fn disable_preview(&self) -> Result<()> {
        self.control("disablepreview", Params::new()).await
    }

    async fn read(&self, segment: &str, params: Params) -> Result<Bytes> {
        let response = match self.api {
            SearchApi::V1 => Endpoint::get(self, segment, params).await?,
            SearchApi::V2 => Endpoint::post(self, segment, params).await?,
        };
        Ok(response.body)
    }

    /// Final results body (XML unless `output_mode` says otherwise)
    pub async fn results(&self, params: Params) -> Result<Bytes> {
        self.read("results", params).await
    }

    /// Results so far of a job that is still running
    pub async fn preview(&self, params: Params) -> Result<Bytes> {
        self.read("results_preview", params).await
    }

    pub async fn events(&self, mut params: Params) -> Result<Bytes> {
        params.set_default("segmentation", "none");
        self.read("events", params).await
    }

    pub async fn searchlog(&self, params: Params) -> Result<Bytes> {
        Ok(Endpoint::get(self, "search.log", params).await?.body)
    }

    /// Field summary of the job's events
    pub async fn summary(&self, params: Params) -> Result<Bytes> {
        Ok(Endpoint::get(self, "summary", params).await?.body)
    }

    /// Event distribution over time
    pub async fn timeline(&self, params: Params) -> Result<Bytes> {
        Ok(Endpoint::get(self, "timeline", params).await?.body)
    }
}

#[async_trait]
impl Endpoint for Job {
    fn service(&self) -> &Service {
        &self.service
    }

    fn path(&self) -> &str {
        &self.path
    }
}
