use crate::errors::PostbackError;
use crate::loader::load_mappings;
use crate::metrics_defs::{
    MAPPING_LOAD_DURATION, MAPPING_LOAD_ROWS, POSTBACK_ACCEPTED, POSTBACK_REJECTED,
};
use crate::resolver::resolve;
use crate::store::{BoxError, Store};
use crate::translator::{Params, translate};
use crate::writer::write;
use bytes::Bytes;
use hyper::body::Body;
use shared::{counter, histogram};
use std::sync::Arc;
use std::time::Instant;

/// Entry point for both request paths. Holds no state besides the store handle.
#[derive(Clone)]
pub struct Postback {
    store: Arc<dyn Store>,
}

impl Postback {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Postback { store }
    }

    /// Resolves the mapping for `source`, translates `params` through it and
    /// stores the resulting record.
    pub async fn consume(&self, source: &str, params: &Params) -> Result<(), PostbackError> {
        let result = self.try_consume(source, params).await;

        match &result {
            Ok(()) => counter!(POSTBACK_ACCEPTED).increment(1),
            Err(e) => counter!(POSTBACK_REJECTED, "reason" => e.kind()).increment(1),
        }
        result
    }

    async fn try_consume(&self, source: &str, params: &Params) -> Result<(), PostbackError> {
        let mapping = resolve(self.store.as_ref(), source).await?;
        let fields = translate(&mapping, params)?;
        write(self.store.as_ref(), fields, source).await
    }

    pub async fn load_mappings<B>(&self, payload: B) -> Result<u64, PostbackError>
    where
        B: Body<Data = Bytes> + Send + Unpin + 'static,
        B::Error: Into<BoxError>,
    {
        let start = Instant::now();
        let result = load_mappings(self.store.as_ref(), payload).await;

        let status = match &result {
            Ok(rows) => {
                histogram!(MAPPING_LOAD_ROWS).record(*rows as f64);
                "ok"
            }
            Err(e) => e.kind(),
        };
        histogram!(MAPPING_LOAD_DURATION, "status" => status).record(start.elapsed().as_secs_f64());
        result
    }

    pub fn is_ready(&self) -> bool {
        self.store.is_ready()
    }
}
