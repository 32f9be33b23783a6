use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, Stream};

use crate::error::TransportError;

pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// One live duplex link carrying JSON text frames.
///
/// The stream ending (or yielding an error) means the link is gone.
pub struct Link {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Link {
    pub fn new<Si, St>(sink: Si, stream: St) -> Self
    where
        Si: Sink<String, Error = TransportError> + Send + 'static,
        St: Stream<Item = Result<String, TransportError>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link").finish_non_exhaustive()
    }
}

/// Something that can produce a fresh [`Link`] on demand.
///
/// The connection manager calls `connect` once per attempt and never holds
/// more than one link at a time.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn connect(&self) -> Result<Link, TransportError>;

    /// Human-readable target for logs.
    fn describe(&self) -> String;
}
