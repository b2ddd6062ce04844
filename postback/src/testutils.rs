use crate::schema::Mapping;
use crate::store::MemoryStore;
use bytes::Bytes;
use hyper::body::{Body, Frame};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Memory store holding the `aff1` mapping: uid / clickid / goal.
pub fn aff1_store(bulk_load: bool) -> MemoryStore {
    let store = MemoryStore::new(bulk_load);
    store.insert_mapping(Mapping::new("aff1", "uid", "clickid", "goal"));
    store
}

/// Body yielding each chunk as a separate data frame.
pub struct ChunkedBody {
    chunks: VecDeque<Bytes>,
}

impl ChunkedBody {
    pub fn new(chunks: &[&'static str]) -> Self {
        ChunkedBody {
            chunks: chunks.iter().map(|chunk| Bytes::from(*chunk)).collect(),
        }
    }
}

impl Body for ChunkedBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Poll::Ready(self.chunks.pop_front().map(|chunk| Ok(Frame::data(chunk))))
    }
}
