use std::{future::Future, path::PathBuf, pin::Pin};

use ensemble_scenario::{CapabilityRef, EnvironmentReport};

use crate::{Backend, CapabilityValue, Error, MemoryBackend};

/// Reads capabilities from an environment report written by an earlier compile.
///
/// The report is read on every lookup; the registry cache keeps repeated lookups cheap.
#[derive(Clone, Debug)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<EnvironmentReport, Error> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        EnvironmentReport::from_json(&text).map_err(|source| Error::InvalidReport {
            path: self.path.clone(),
            source,
        })
    }
}

impl Backend for FileBackend {
    fn find<'a>(
        &'a self,
        environment: &'a str,
        capability: &'a CapabilityRef,
    ) -> Pin<Box<dyn Future<Output = Result<Option<CapabilityValue>, Error>> + Send + 'a>> {
        Box::pin(async move {
            let report = self.load().await?;
            if report.environment != environment {
                return Ok(None);
            }
            Ok(MemoryBackend::from_report(&report)
                .get(environment, capability)
                .cloned())
        })
    }
}
