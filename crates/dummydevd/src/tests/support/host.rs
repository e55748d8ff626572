//! In-process stand-in for the node agent's registration service.

use std::collections::VecDeque;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::Mutex;
use tokio::net::UnixListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnixListenerStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

use dummydev_api::v1beta1::registration_server::{Registration, RegistrationServer};
use dummydev_api::v1beta1::{Empty, RegisterRequest};

#[derive(Clone, Default)]
struct HostService {
    requests: Arc<Mutex<Vec<RegisterRequest>>>,
    failures: Arc<Mutex<VecDeque<Status>>>,
}

#[tonic::async_trait]
impl Registration for HostService {
    async fn register(
        &self,
        request: Request<RegisterRequest>,
    ) -> Result<Response<Empty>, Status> {
        self.requests.lock().push(request.into_inner());
        let failure = self.failures.lock().pop_front();
        match failure {
            Some(status) => Err(status),
            None => Ok(Response::new(Empty {})),
        }
    }
}

/// Registration server listening on a unix socket.
pub struct FakeHost {
    path: Utf8PathBuf,
    service: HostService,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<(), tonic::transport::Error>>>,
}

impl FakeHost {
    /// Serves on `path`, answering the first calls with `failures` in order
    /// and accepting every call after that.
    pub fn start(path: &Utf8Path, failures: Vec<Status>) -> Self {
        let service = HostService {
            requests: Arc::default(),
            failures: Arc::new(Mutex::new(failures.into())),
        };
        let listener = UnixListener::bind(path.as_std_path()).expect("bind host socket");
        let (shutdown, signal) = oneshot::channel::<()>();
        let router = Server::builder().add_service(RegistrationServer::new(service.clone()));
        let task = tokio::spawn(async move {
            router
                .serve_with_incoming_shutdown(UnixListenerStream::new(listener), async move {
                    signal.await.unwrap_or(());
                })
                .await
        });
        Self {
            path: path.to_path_buf(),
            service,
            shutdown: Some(shutdown),
            task: Some(task),
        }
    }

    /// Socket path the host listens on.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Registration requests received so far.
    pub fn requests(&self) -> Vec<RegisterRequest> {
        self.service.requests.lock().clone()
    }

    /// Stops serving.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            shutdown.send(()).unwrap_or(());
        }
        if let Some(task) = self.task.take() {
            task.await.expect("host task").expect("host server");
        }
    }
}
