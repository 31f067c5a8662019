//! Container runtime abstraction for testability.
//!
//! The [`ContainerRuntime`] trait covers the runtime calls the probe engine
//! and the scanner make: pull, create, start, wait, logs and removal of
//! containers and images. Production code uses [`BollardRuntime`]; tests use
//! the recording `MockRuntime` (unit tests, or the `test-util` feature).
//!
//! # Error mapping
//!
//! - **404 responses**: `ScannerError::NotFound`
//! - **Socket/transport failures**: `ScannerError::DockerConnection` (fatal)
//! - **Everything else**: `ScannerError::DockerApi`
//!
//! A non-zero exit code reported by `wait` is not an error: many version
//! commands exit non-zero after printing their version.

use std::future::Future;
use std::sync::Arc;

use bollard::errors::Error as BollardError;
use futures::{StreamExt, TryStreamExt};
use tracing::debug;

use crate::error::ScannerError;

#[cfg(any(test, feature = "test-util"))]
use std::collections::{HashMap, HashSet};
#[cfg(any(test, feature = "test-util"))]
use std::sync::Mutex;
#[cfg(any(test, feature = "test-util"))]
use std::sync::atomic::{AtomicU64, Ordering};

/// Validates a container ID before it is sent to the runtime.
///
/// IDs are 1-64 hex characters (full ID or prefix).
fn validate_container_id(id: &str) -> Result<(), ScannerError> {
    if id.is_empty() || id.len() > 64 {
        return Err(ScannerError::DockerApi(format!(
            "invalid container ID: length {} (must be 1-64)",
            id.len()
        )));
    }
    if !id.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ScannerError::DockerApi(
            "invalid container ID: contains non-hex characters".to_owned(),
        ));
    }
    Ok(())
}

/// Container runtime operations.
///
/// The trait is `Send + Sync + 'static` so one runtime can be shared by all
/// scan workers.
pub trait ContainerRuntime: Send + Sync + 'static {
    /// Checks runtime connectivity.
    fn ping(&self) -> impl Future<Output = Result<(), ScannerError>> + Send;

    /// Pulls `repository:tag`. Pulling an image that is already present is a no-op.
    fn pull_image(
        &self,
        repository: &str,
        tag: &str,
    ) -> impl Future<Output = Result<(), ScannerError>> + Send;

    /// Creates a container from `image` with `entrypoint` as its command.
    ///
    /// TTY and stdin are enabled so that interactive-style binaries still
    /// print their output. Returns the container ID.
    fn create_container(
        &self,
        image: &str,
        entrypoint: &[String],
    ) -> impl Future<Output = Result<String, ScannerError>> + Send;

    /// Starts a created container.
    ///
    /// # Errors
    ///
    /// `ScannerError::DockerApi` when the entrypoint cannot be executed
    /// (for example, the binary does not exist in the image).
    fn start_container(&self, id: &str) -> impl Future<Output = Result<(), ScannerError>> + Send;

    /// Waits for the container to exit and returns its exit code.
    fn wait_container(&self, id: &str) -> impl Future<Output = Result<i64, ScannerError>> + Send;

    /// Reads combined stdout and stderr as text.
    fn container_logs(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<String, ScannerError>> + Send;

    /// Force-removes a container.
    fn remove_container(&self, id: &str)
    -> impl Future<Output = Result<(), ScannerError>> + Send;

    /// Force-removes an image from local storage.
    fn remove_image(&self, image: &str) -> impl Future<Output = Result<(), ScannerError>> + Send;
}

fn map_bollard(context: &str, err: BollardError) -> ScannerError {
    match err {
        BollardError::DockerResponseServerError {
            status_code: 404,
            message,
        } => ScannerError::NotFound(format!("{context}: {message}")),
        BollardError::IOError { .. }
        | BollardError::RequestTimeoutError
        | BollardError::SocketNotFoundError(_) => {
            ScannerError::DockerConnection(format!("{context}: {err}"))
        }
        other => ScannerError::DockerApi(format!("{context}: {other}")),
    }
}

/// Production runtime backed by `bollard`.
///
/// Internally uses `Arc<bollard::Docker>` for sharing across tasks.
pub struct BollardRuntime {
    docker: Arc<bollard::Docker>,
}

impl BollardRuntime {
    /// Connects using the platform's default local socket.
    pub fn connect_local() -> Result<Self, ScannerError> {
        let docker = bollard::Docker::connect_with_local_defaults().map_err(|e| {
            ScannerError::DockerConnection(format!("failed to connect to docker: {e}"))
        })?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }

    /// Connects using a specific socket path.
    pub fn connect_with_socket(socket_path: &str) -> Result<Self, ScannerError> {
        let docker =
            bollard::Docker::connect_with_socket(socket_path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| {
                    ScannerError::DockerConnection(format!(
                        "failed to connect to docker at {socket_path}: {e}"
                    ))
                })?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }

    /// Connects to `socket_path`, or to the local default when it is empty.
    pub fn connect(socket_path: &str) -> Result<Self, ScannerError> {
        if socket_path.is_empty() {
            Self::connect_local()
        } else {
            Self::connect_with_socket(socket_path)
        }
    }
}

impl ContainerRuntime for BollardRuntime {
    async fn ping(&self) -> Result<(), ScannerError> {
        self.docker
            .ping()
            .await
            .map_err(|e| ScannerError::DockerConnection(format!("ping failed: {e}")))?;
        Ok(())
    }

    async fn pull_image(&self, repository: &str, tag: &str) -> Result<(), ScannerError> {
        use bollard::image::CreateImageOptions;

        let options = CreateImageOptions::<String> {
            from_image: repository.to_owned(),
            tag: tag.to_owned(),
            ..Default::default()
        };

        let progress: Vec<_> = self
            .docker
            .create_image(Some(options), None, None)
            .try_collect()
            .await
            .map_err(|e| map_bollard(&format!("pull {repository}:{tag}"), e))?;

        debug!(repository, tag, steps = progress.len(), "image pulled");
        Ok(())
    }

    async fn create_container(
        &self,
        image: &str,
        entrypoint: &[String],
    ) -> Result<String, ScannerError> {
        use bollard::container::{Config, CreateContainerOptions};

        let config = Config::<String> {
            image: Some(image.to_owned()),
            entrypoint: Some(entrypoint.to_vec()),
            tty: Some(true),
            open_stdin: Some(true),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await
            .map_err(|e| map_bollard(&format!("create container from {image}"), e))?;
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), ScannerError> {
        validate_container_id(id)?;

        use bollard::container::StartContainerOptions;

        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| map_bollard(&format!("start {id}"), e))
    }

    async fn wait_container(&self, id: &str) -> Result<i64, ScannerError> {
        validate_container_id(id)?;

        use bollard::container::WaitContainerOptions;

        let mut stream = self
            .docker
            .wait_container(id, None::<WaitContainerOptions<String>>);

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports a non-zero exit as an error
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(map_bollard(&format!("wait {id}"), e)),
            None => Err(ScannerError::DockerApi(format!(
                "wait {id}: stream ended without status"
            ))),
        }
    }

    async fn container_logs(&self, id: &str) -> Result<String, ScannerError> {
        validate_container_id(id)?;

        use bollard::container::LogsOptions;

        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            ..Default::default()
        };

        let chunks: Vec<_> = self
            .docker
            .logs(id, Some(options))
            .try_collect()
            .await
            .map_err(|e| map_bollard(&format!("logs {id}"), e))?;

        let mut bytes = Vec::new();
        for chunk in chunks {
            bytes.extend_from_slice(&chunk.into_bytes());
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn remove_container(&self, id: &str) -> Result<(), ScannerError> {
        validate_container_id(id)?;

        use bollard::container::RemoveContainerOptions;

        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| map_bollard(&format!("remove container {id}"), e))
    }

    async fn remove_image(&self, image: &str) -> Result<(), ScannerError> {
        use bollard::image::RemoveImageOptions;

        self.docker
            .remove_image(
                image,
                Some(RemoveImageOptions {
                    force: true,
                    ..Default::default()
                }),
                None,
            )
            .await
            .map_err(|e| map_bollard(&format!("remove image {image}"), e))?;
        Ok(())
    }
}

/// 런타임 호출 기록
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Pull(String),
    Create { id: String, command: String },
    Start(String),
    Wait(String),
    Logs(String),
    RemoveContainer(String),
    RemoveImage(String),
}

/// 테스트용 Mock 런타임
///
/// 명령 문자열(entrypoint를 공백으로 이은 값)별로 출력, 실행 실패, wait/logs
/// 실패, 멈춤을 설정할 수 있고 모든 호출을 기록합니다. 통합 테스트에서는
/// `test-util` feature로 사용합니다.
#[cfg(any(test, feature = "test-util"))]
#[derive(Default)]
pub struct MockRuntime {
    outputs: HashMap<String, String>,
    missing: HashSet<String>,
    hanging: HashSet<String>,
    wait_errors: HashSet<String>,
    logs_errors: HashSet<String>,
    disconnected: bool,
    missing_image: bool,
    calls: Mutex<Vec<RuntimeCall>>,
    entrypoints: Mutex<Vec<Vec<String>>>,
    next_id: AtomicU64,
    commands: Mutex<HashMap<String, String>>,
}

#[cfg(any(test, feature = "test-util"))]
impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// `command` 실행 시 출력할 텍스트를 설정합니다.
    pub fn with_output(mut self, command: &str, output: &str) -> Self {
        self.outputs.insert(command.to_owned(), output.to_owned());
        self
    }

    /// `command`의 start가 실패하도록 설정합니다.
    pub fn with_missing(mut self, command: &str) -> Self {
        self.missing.insert(command.to_owned());
        self
    }

    /// `command`의 wait가 끝나지 않도록 설정합니다.
    pub fn with_hanging(mut self, command: &str) -> Self {
        self.hanging.insert(command.to_owned());
        self
    }

    /// `command`의 wait가 API 에러를 반환하도록 설정합니다.
    pub fn with_wait_error(mut self, command: &str) -> Self {
        self.wait_errors.insert(command.to_owned());
        self
    }

    /// `command`의 logs 조회가 API 에러를 반환하도록 설정합니다.
    pub fn with_logs_error(mut self, command: &str) -> Self {
        self.logs_errors.insert(command.to_owned());
        self
    }

    /// 모든 호출이 연결 실패를 반환하도록 설정합니다.
    pub fn disconnected(mut self) -> Self {
        self.disconnected = true;
        self
    }

    /// remove_image가 NotFound를 반환하도록 설정합니다.
    pub fn with_missing_image(mut self) -> Self {
        self.missing_image = true;
        self
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        lock(&self.calls).clone()
    }

    /// create에 전달된 entrypoint (호출 순서)
    pub fn entrypoints(&self) -> Vec<Vec<String>> {
        lock(&self.entrypoints).clone()
    }

    /// 생성된 컨테이너 ID
    pub fn created(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RuntimeCall::Create { id, .. } => Some(id),
                _ => None,
            })
            .collect()
    }

    /// 삭제된 컨테이너 ID
    pub fn removed(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RuntimeCall::RemoveContainer(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// pull된 `repository:tag`
    pub fn pulled(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RuntimeCall::Pull(image) => Some(image),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: RuntimeCall) -> Result<(), ScannerError> {
        lock(&self.calls).push(call);
        if self.disconnected {
            return Err(ScannerError::DockerConnection("mock socket closed".to_owned()));
        }
        Ok(())
    }

    fn command_of(&self, id: &str) -> String {
        lock(&self.commands).get(id).cloned().unwrap_or_default()
    }
}

#[cfg(any(test, feature = "test-util"))]
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(any(test, feature = "test-util"))]
impl ContainerRuntime for MockRuntime {
    async fn ping(&self) -> Result<(), ScannerError> {
        if self.disconnected {
            return Err(ScannerError::DockerConnection("mock socket closed".to_owned()));
        }
        Ok(())
    }

    async fn pull_image(&self, repository: &str, tag: &str) -> Result<(), ScannerError> {
        self.record(RuntimeCall::Pull(format!("{repository}:{tag}")))
    }

    async fn create_container(
        &self,
        _image: &str,
        entrypoint: &[String],
    ) -> Result<String, ScannerError> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = format!("{:012x}", 0xc0ffee_000000u64 + n);
        let command = entrypoint.join(" ");
        self.record(RuntimeCall::Create {
            id: id.clone(),
            command: command.clone(),
        })?;
        lock(&self.entrypoints).push(entrypoint.to_vec());
        lock(&self.commands).insert(id.clone(), command);
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), ScannerError> {
        validate_container_id(id)?;
        self.record(RuntimeCall::Start(id.to_owned()))?;
        if self.missing.contains(&self.command_of(id)) {
            return Err(ScannerError::DockerApi(
                "executable file not found in $PATH".to_owned(),
            ));
        }
        Ok(())
    }

    async fn wait_container(&self, id: &str) -> Result<i64, ScannerError> {
        self.record(RuntimeCall::Wait(id.to_owned()))?;
        let command = self.command_of(id);
        if self.hanging.contains(&command) {
            std::future::pending::<()>().await;
        }
        if self.wait_errors.contains(&command) {
            return Err(ScannerError::DockerApi(format!("wait {id}: container vanished")));
        }
        Ok(0)
    }

    async fn container_logs(&self, id: &str) -> Result<String, ScannerError> {
        self.record(RuntimeCall::Logs(id.to_owned()))?;
        let command = self.command_of(id);
        if self.logs_errors.contains(&command) {
            return Err(ScannerError::DockerApi(format!("logs {id}: stream closed")));
        }
        Ok(self.outputs.get(&command).cloned().unwrap_or_default())
    }

    async fn remove_container(&self, id: &str) -> Result<(), ScannerError> {
        validate_container_id(id)?;
        self.record(RuntimeCall::RemoveContainer(id.to_owned()))
    }

    async fn remove_image(&self, image: &str) -> Result<(), ScannerError> {
        self.record(RuntimeCall::RemoveImage(image.to_owned()))?;
        if self.missing_image {
            return Err(ScannerError::NotFound(format!("image {image}")));
        }
        Ok(())
    }
}
