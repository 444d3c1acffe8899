use std::sync::Arc;

use domain::{Backend, Forseer};

/// Cheaply cloneable handle to the `Forseer` service shared by every request
#[derive(Clone, Debug)]
pub struct ForseerHandle {
    inner: Arc<Forseer>,
}

impl ForseerHandle {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            inner: Arc::new(Forseer::new(backend)),
        }
    }

    pub fn forseer(&self) -> &Forseer {
        &self.inner
    }
}
