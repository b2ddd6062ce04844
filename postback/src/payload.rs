//! Body adapters used to feed a bulk load without collecting it.

use crate::store::BoxError;
use bytes::Bytes;
use hyper::body::{Body, Frame};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tokio::fs::File;
use tokio::io::{AsyncRead, ReadBuf};

const CHUNK_SIZE: usize = 64 * 1024;

/// Yields `head` first, then every frame of `rest`.
pub(crate) struct Replay<B> {
    head: Option<Bytes>,
    rest: B,
}

impl<B> Replay<B> {
    pub(crate) fn new(head: Bytes, rest: B) -> Self {
        Replay {
            head: Some(head),
            rest,
        }
    }
}

impl<B> Body for Replay<B>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        if let Some(head) = self.head.take() {
            return Poll::Ready(Some(Ok(Frame::data(head))));
        }

        Pin::new(&mut self.rest)
            .poll_frame(cx)
            .map(|frame| frame.map(|result| result.map_err(Into::into)))
    }
}

/// Reads a file in fixed-size chunks.
pub struct FileBody {
    file: File,
    buf: Box<[u8]>,
}

impl FileBody {
    pub fn new(file: File) -> Self {
        FileBody {
            file,
            buf: vec![0; CHUNK_SIZE].into_boxed_slice(),
        }
    }
}

impl Body for FileBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;
        let mut read_buf = ReadBuf::new(&mut this.buf);

        match ready!(Pin::new(&mut this.file).poll_read(cx, &mut read_buf)) {
            Ok(()) if read_buf.filled().is_empty() => Poll::Ready(None),
            Ok(()) => Poll::Ready(Some(Ok(Frame::data(Bytes::copy_from_slice(
                read_buf.filled(),
            ))))),
            Err(e) => Poll::Ready(Some(Err(e))),
        }
    }
}
