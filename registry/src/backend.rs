use std::{future::Future, pin::Pin};

use ensemble_scenario::CapabilityRef;

use crate::{CapabilityValue, Error};

/// One source of capability values.
///
/// `Ok(None)` means the backend does not know the capability, so the next backend in the chain
/// is asked. Errors mean the backend could not answer at all.
pub trait Backend: Send + Sync {
    fn find<'a>(
        &'a self,
        environment: &'a str,
        capability: &'a CapabilityRef,
    ) -> Pin<Box<dyn Future<Output = Result<Option<CapabilityValue>, Error>> + Send + 'a>>;
}
