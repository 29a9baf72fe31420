use std::{
    future::Future,
    io,
    pin::Pin,
    sync::{Arc, OnceLock},
    time::Duration,
};

use ensemble_scenario::CapabilityRef;
use futures::StreamExt;
use serde_json::{Value as Json, json};
use url::Url;

use crate::{Backend, CapabilityValue, Error};

/// Looks capabilities up in a PuppetDB-compatible resource endpoint.
///
/// A capability `Sql[one]` produced in environment `production` is the resource of type `Sql`
/// and title `one` tagged `producer:production`.
#[derive(Clone, Debug)]
pub struct HttpBackend {
    base: Url,
    client: Arc<OnceLock<reqwest::Client>>,
    options: HttpBackendOptions,
}

impl HttpBackend {
    pub fn new(base: Url) -> Self {
        Self::with_options(base, HttpBackendOptions::default())
    }

    pub fn with_options(base: Url, options: HttpBackendOptions) -> Self {
        Self {
            base,
            client: Arc::new(OnceLock::new()),
            options,
        }
    }

    fn client(&self) -> Result<&reqwest::Client, Error> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let mut builder = reqwest::Client::builder()
            .connect_timeout(self.options.connect_timeout)
            .timeout(self.options.request_timeout);
        if let Some(read_timeout) = self.options.read_timeout {
            builder = builder.read_timeout(read_timeout);
        }
        let client = builder.build()?;
        Ok(self.client.get_or_init(|| client))
    }

    /// `{base}/v3/resources?query=...` for one capability.
    pub fn query_url(&self, environment: &str, capability: &CapabilityRef) -> Result<Url, Error> {
        let query = json!([
            "and",
            ["=", "type", capability.kind()],
            ["=", "title", capability.name()],
            ["=", "tag", format!("producer:{environment}")],
        ]);

        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidBaseUrl {
                url: self.base.clone(),
            })?
            .pop_if_empty()
            .extend(["v3", "resources"]);
        url.query_pairs_mut()
            .clear()
            .append_pair("query", &query.to_string());
        Ok(url)
    }

    async fn lookup(
        &self,
        environment: &str,
        capability: &CapabilityRef,
    ) -> Result<Option<CapabilityValue>, Error> {
        let url = self.query_url(environment, capability)?;
        let res = self
            .client()?
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?
            .error_for_status()?;

        let max_body_bytes = self.options.max_body_bytes;
        if let Some(content_length) = res.content_length()
            && content_length > max_body_bytes as u64
        {
            return Err(Error::ResponseTooLarge {
                url,
                size: content_length,
                max_bytes: max_body_bytes,
            });
        }

        let mut body = Vec::new();
        let mut stream = res.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if body.len() + chunk.len() > max_body_bytes {
                return Err(Error::ResponseTooLarge {
                    url,
                    size: (body.len() + chunk.len()) as u64,
                    max_bytes: max_body_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        let body: Json = serde_json::from_slice(&body)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        parse_resources(&url, environment, capability, body)
    }
}

impl Backend for HttpBackend {
    fn find<'a>(
        &'a self,
        environment: &'a str,
        capability: &'a CapabilityRef,
    ) -> Pin<Box<dyn Future<Output = Result<Option<CapabilityValue>, Error>> + Send + 'a>> {
        Box::pin(self.lookup(environment, capability))
    }
}

/// The endpoint answers with an array of resources; only those carrying parameters count.
fn parse_resources(
    url: &Url,
    environment: &str,
    capability: &CapabilityRef,
    body: Json,
) -> Result<Option<CapabilityValue>, Error> {
    let resources = match body {
        Json::Array(resources) => resources,
        other => {
            return Err(Error::UnexpectedResponse {
                url: url.clone(),
                message: format!("expected an array of resources, got `{other}`"),
            });
        }
    };

    let mut matches = resources
        .into_iter()
        .filter_map(|resource| match resource {
            Json::Object(mut resource) => match resource.remove("parameters") {
                Some(Json::Object(parameters)) => Some((resource, parameters)),
                _ => None,
            },
            _ => None,
        })
        .collect::<Vec<_>>();

    if matches.len() > 1 {
        return Err(Error::AmbiguousCapability {
            capability: capability.clone(),
            environment: environment.to_string(),
            count: matches.len(),
        });
    }

    Ok(matches.pop().map(|(resource, parameters)| CapabilityValue {
        capability: capability.clone(),
        environment: environment.to_string(),
        component: None,
        node: resource
            .get("certname")
            .and_then(Json::as_str)
            .map(str::to_string),
        parameters,
    }))
}

#[derive(Clone, Debug)]
pub struct HttpBackendOptions {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub read_timeout: Option<Duration>,
    pub max_body_bytes: usize,
}

impl Default for HttpBackendOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            read_timeout: Some(Duration::from_secs(30)),
            max_body_bytes: 1024 * 1024,
        }
    }
}
