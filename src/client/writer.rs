//! Streaming object upload.
//!
//! Writing an object is a three-step exchange: open a chunked PUT, stream
//! the content, then store the metadata separately once the connector has
//! acknowledged the data. [`ObjectWriter`] holds the in-flight request;
//! chunks written by the caller are fed to it through a channel-backed
//! body while the request task drives the upload concurrently.

use std::io;

use bytes::Bytes;
use futures_channel::mpsc;
use futures_util::SinkExt;
use tokio::task::JoinHandle;

use crate::client::{drain_connection, unexpected_http_status, Metadata, SproxydClient};
use crate::endpoint::Endpoint;
use crate::error::{SproxydError, SproxydResult};

// Chunks buffered between the caller and the request task.
const CHANNEL_DEPTH: usize = 8;

impl SproxydClient {
    /// Open a streaming upload for `name`. The returned writer owns one
    /// endpoint for the whole upload; dropping it before
    /// [`ObjectWriter::finish`] aborts the transfer.
    pub fn put_object(&self, name: &str) -> SproxydResult<ObjectWriter> {
        let endpoint = self.get_next_endpoint()?;
        let url = endpoint.object_url(name);
        tracing::debug!(url = %url, "put_object stream open");

        let (tx, rx) = mpsc::channel::<Result<Bytes, io::Error>>(CHANNEL_DEPTH);
        let request = self
            .inner
            .http
            .put(&url)
            .body(reqwest::Body::wrap_stream(rx))
            .send();

        Ok(ObjectWriter {
            client: self.clone(),
            endpoint,
            name: name.to_string(),
            tx,
            response: Some(tokio::spawn(request)),
            uploaded: 0,
        })
    }
}

/// Write context for one object upload.
pub struct ObjectWriter {
    client: SproxydClient,
    endpoint: Endpoint,
    name: String,
    tx: mpsc::Sender<Result<Bytes, io::Error>>,
    response: Option<JoinHandle<Result<reqwest::Response, reqwest::Error>>>,
    uploaded: u64,
}

impl ObjectWriter {
    /// Write one chunk, returning the total bytes written so far.
    pub async fn write(&mut self, chunk: impl Into<Bytes>) -> SproxydResult<u64> {
        let chunk = chunk.into();
        self.uploaded += chunk.len() as u64;
        if self.tx.send(Ok(chunk)).await.is_err() {
            // The request ended before the body was complete; surface the
            // real cause instead of a bare channel error.
            let err = match self.await_response().await {
                Ok(response) => {
                    unexpected_http_status("put_object", &self.endpoint, response).await
                }
                Err(err) => err,
            };
            return Err(err);
        }
        Ok(self.uploaded)
    }

    /// Finalize the upload: close the body, require a 200 from the
    /// connector, then store `metadata` (with the object name folded in)
    /// via `put_meta`. Returns the total bytes uploaded.
    pub async fn finish(mut self, metadata: &Metadata) -> SproxydResult<u64> {
        self.tx.close_channel();
        let response = self.await_response().await?;
        match response.status().as_u16() {
            200 => drain_connection(response, &self.endpoint).await,
            _ => {
                return Err(unexpected_http_status("put_object", &self.endpoint, response).await)
            }
        }

        let mut metadata = metadata.clone();
        if let Some(object) = metadata.as_object_mut() {
            object.insert(
                "name".to_string(),
                serde_json::Value::String(self.name.clone()),
            );
        }
        self.client.put_meta(&self.name, &metadata).await?;

        tracing::debug!(name = %self.name, bytes = self.uploaded, "object stored");
        Ok(self.uploaded)
    }

    /// Bytes handed to the connector so far.
    pub fn uploaded(&self) -> u64 {
        self.uploaded
    }

    async fn await_response(&mut self) -> SproxydResult<reqwest::Response> {
        let handle = self
            .response
            .take()
            .expect("object upload response consumed twice");
        match handle.await {
            Ok(result) => result.map_err(|e| SproxydError::from_transport(&self.endpoint, e)),
            Err(e) => panic!("object upload task failed: {e}"),
        }
    }
}

impl Drop for ObjectWriter {
    fn drop(&mut self) {
        if let Some(handle) = self.response.take() {
            // Abandoned before finish: poison the body stream so the
            // connector sees an aborted upload rather than a short object.
            let _ = self
                .tx
                .try_send(Err(io::Error::other("upload abandoned")));
            handle.abort();
            tracing::debug!(name = %self.name, "object upload abandoned");
        }
    }
}

impl std::fmt::Debug for ObjectWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectWriter")
            .field("endpoint", &self.endpoint)
            .field("name", &self.name)
            .field("uploaded", &self.uploaded)
            .finish_non_exhaustive()
    }
}
