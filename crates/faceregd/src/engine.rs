use facereg_core::{
    recognize_frame, FaceEmbeddingProvider, FaceRegistry, MatchResult, MultiFacePolicy, ProviderError,
    RegistryError,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("embedding provider: {0}")]
    Provider(#[from] ProviderError),
    #[error("engine thread exited")]
    ChannelClosed,
    #[error("engine did not answer within {0:?}")]
    Timeout(Duration),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// A reference photo on its way into the known-faces directory.
#[derive(Debug)]
pub struct Upload {
    pub name: String,
    pub original_filename: String,
    pub bytes: Vec<u8>,
}

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    Recognize {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<Vec<MatchResult>, EngineError>>,
    },
    Register {
        upload: Upload,
        reply: oneshot::Sender<Result<String, EngineError>>,
    },
    Delete {
        filename: String,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Rebuild {
        reply: oneshot::Sender<Result<usize, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    timeout: Duration,
}

impl EngineHandle {
    /// Detect and identify every face in an encoded frame.
    pub async fn recognize(&self, image: Vec<u8>) -> Result<Vec<MatchResult>, EngineError> {
        self.call(|reply| EngineRequest::Recognize { image, reply }).await
    }

    /// Store a reference photo and rebuild. Returns the stored filename.
    pub async fn register(&self, upload: Upload) -> Result<String, EngineError> {
        self.call(|reply| EngineRequest::Register { upload, reply }).await
    }

    /// Remove a reference photo and rebuild.
    pub async fn delete(&self, filename: String) -> Result<(), EngineError> {
        self.call(|reply| EngineRequest::Delete { filename, reply }).await
    }

    /// Rebuild the registry from disk. Returns the number of known faces.
    pub async fn rebuild(&self) -> Result<usize, EngineError> {
        self.call(|reply| EngineRequest::Rebuild { reply }).await
    }

    async fn call<T>(
        &self,
        request: impl FnOnce(oneshot::Sender<Result<T, EngineError>>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        // Queueing counts against the deadline too.
        let exchange = async {
            self.tx
                .send(request(reply_tx))
                .await
                .map_err(|_| EngineError::ChannelClosed)?;
            reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
        };
        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout(self.timeout)),
        }
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the provider, so model inference never blocks the async
/// runtime and directory writes are serialized with rebuilds. The registry
/// is loaded once before the thread starts; a failed initial load is logged
/// and the engine still starts with an empty set.
pub fn spawn_engine<P>(
    mut provider: P,
    registry: Arc<FaceRegistry>,
    policy: MultiFacePolicy,
    timeout: Duration,
) -> Result<EngineHandle, EngineError>
where
    P: FaceEmbeddingProvider + 'static,
{
    match registry.rebuild(&mut provider) {
        Ok(count) => tracing::info!(count, dir = %registry.dir().display(), "known faces loaded"),
        Err(err) => tracing::error!(
            error = %err,
            dir = %registry.dir().display(),
            "initial load of known faces failed; starting with none"
        ),
    }

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(16);

    std::thread::Builder::new()
        .name("facereg-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Recognize { image, reply } => {
                        let result = run_recognize(&mut provider, &registry, &image);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Register { upload, reply } => {
                        let result = registry
                            .register(
                                &mut provider,
                                &upload.name,
                                &upload.original_filename,
                                &upload.bytes,
                                policy,
                            )
                            .map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Delete { filename, reply } => {
                        let result = registry.delete(&mut provider, &filename).map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Rebuild { reply } => {
                        let result = registry.rebuild(&mut provider).map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx, timeout })
}

fn run_recognize(
    provider: &mut dyn FaceEmbeddingProvider,
    registry: &FaceRegistry,
    bytes: &[u8],
) -> Result<Vec<MatchResult>, EngineError> {
    let frame = image::load_from_memory(bytes)?;
    Ok(recognize_frame(provider, registry, &frame)?)
}
