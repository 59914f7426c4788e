//! Container image build and push through the docker CLI
//!
//! `docker.image_build` builds the context into a local image and records its
//! content-addressed id. `docker.image_push` tags that image with the
//! repository URI, pushes it, and records the digest-pinned reference the
//! task definition runs. Registry credentials come from the local docker
//! configuration.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use quay_core::provider::{BoxFuture, Provider, ProviderError, ProviderResult};
use quay_core::resource::{Resource, ResourceId, State, Value};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::schemas::docker::{IMAGE_BUILD, IMAGE_PUSH};

/// Default timeout for a single docker invocation; builds and pushes can be slow
pub const DEFAULT_DOCKER_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Captured result of a finished process
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Runs external programs
pub trait CommandRunner: Send + Sync {
    fn run<'a>(&'a self, program: &'a str, args: &'a [String])
    -> BoxFuture<'a, Result<CommandOutput>>;
}

/// Production `CommandRunner`: tokio processes, killed when the timeout fires
pub struct TokioCommandRunner {
    timeout: Duration,
}

impl TokioCommandRunner {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn run_with_timeout(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;

        let mut stdout_handle = child.stdout.take();
        let mut stderr_handle = child.stderr.take();

        tokio::select! {
            result = async {
                let (status, stdout, stderr) = tokio::join!(
                    child.wait(),
                    async {
                        let mut buf = Vec::new();
                        if let Some(ref mut h) = stdout_handle {
                            let _ = h.read_to_end(&mut buf).await;
                        }
                        buf
                    },
                    async {
                        let mut buf = Vec::new();
                        if let Some(ref mut h) = stderr_handle {
                            let _ = h.read_to_end(&mut buf).await;
                        }
                        buf
                    },
                );
                let status = status.with_context(|| format!("waiting for {program}"))?;
                Ok(CommandOutput {
                    success: status.success(),
                    stdout: String::from_utf8_lossy(&stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&stderr).into_owned(),
                })
            } => result,
            () = tokio::time::sleep(self.timeout) => {
                let _ = child.kill().await;
                bail!("{program} timed out after {}s", self.timeout.as_secs())
            }
        }
    }
}

impl Default for TokioCommandRunner {
    fn default() -> Self {
        Self::new(DEFAULT_DOCKER_TIMEOUT)
    }
}

impl CommandRunner for TokioCommandRunner {
    fn run<'a>(
        &'a self,
        program: &'a str,
        args: &'a [String],
    ) -> BoxFuture<'a, Result<CommandOutput>> {
        Box::pin(self.run_with_timeout(program, args))
    }
}

/// Content hash of a build context: every file path and its bytes, in path order
///
/// `.git` directories are skipped.
pub fn hash_build_context(dir: &Path) -> Result<String> {
    let mut files = Vec::new();
    collect_files(dir, dir, &mut files)
        .with_context(|| format!("reading build context {}", dir.display()))?;
    files.sort();

    let mut hasher = Sha256::new();
    for relative in &files {
        let bytes = std::fs::read(dir.join(relative))
            .with_context(|| format!("reading {}", relative))?;
        hasher.update(relative.as_bytes());
        hasher.update([0u8]);
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(&bytes);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            if entry.file_name() == ".git" {
                continue;
            }
            collect_files(root, &path, out)?;
        } else if file_type.is_file()
            && let Ok(relative) = path.strip_prefix(root)
        {
            // Forward slashes keep the hash stable across platforms
            let parts: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            out.push(parts.join("/"));
        }
    }
    Ok(())
}

fn required_string<'a>(resource: &'a Resource, name: &str) -> ProviderResult<&'a str> {
    resource
        .attributes
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ProviderError::new(format!("Attribute '{}' must be a string", name))
                .for_resource(resource.id.clone())
        })
}

fn command_error(id: &ResourceId, error: anyhow::Error) -> ProviderError {
    ProviderError::new(format!("{:#}", error)).for_resource(id.clone())
}

/// Repository part of `registry/repo:tag`: the tag follows the last '/'
fn repository_of(destination: &str) -> &str {
    let name_start = destination.rfind('/').map_or(0, |i| i + 1);
    match destination[name_start..].rfind(':') {
        Some(i) => &destination[..name_start + i],
        None => destination,
    }
}

/// Provider for container images, driven through a [`CommandRunner`]
pub struct ImageProvider<R: CommandRunner> {
    runner: R,
    docker: String,
}

impl ImageProvider<TokioCommandRunner> {
    pub fn new() -> Self {
        Self::with_runner(TokioCommandRunner::default())
    }
}

impl Default for ImageProvider<TokioCommandRunner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: CommandRunner> ImageProvider<R> {
    pub fn with_runner(runner: R) -> Self {
        Self {
            runner,
            docker: "docker".to_string(),
        }
    }

    /// Run docker, failing with its stderr when it exits unsuccessfully
    async fn docker(&self, args: Vec<String>) -> Result<String> {
        log::debug!("docker {}", args.join(" "));
        let output = self.runner.run(&self.docker, &args).await?;
        if !output.success {
            bail!(
                "docker {} failed: {}",
                args.first().map(String::as_str).unwrap_or_default(),
                output.stderr.trim()
            );
        }
        Ok(output.stdout.trim().to_string())
    }

    async fn image_id(&self, reference: &str) -> Result<String> {
        self.docker(vec![
            "image".to_string(),
            "inspect".to_string(),
            "--format".to_string(),
            "{{.Id}}".to_string(),
            reference.to_string(),
        ])
        .await
    }

    async fn build(&self, resource: &Resource) -> ProviderResult<State> {
        let context = required_string(resource, "context")?;
        let platform = required_string(resource, "platform")?;
        let tag = required_string(resource, "tag")?;

        let mut args = vec![
            "build".to_string(),
            "--platform".to_string(),
            platform.to_string(),
            "--tag".to_string(),
            tag.to_string(),
        ];
        if let Some(Value::Map(build_args)) = resource.attributes.get("build_args") {
            let mut keys: Vec<&String> = build_args.keys().collect();
            keys.sort();
            for key in keys {
                if let Some(value) = build_args[key].as_str() {
                    args.push("--build-arg".to_string());
                    args.push(format!("{}={}", key, value));
                }
            }
        }
        args.push(context.to_string());

        log::info!("building {} from {}", tag, context);
        self.docker(args)
            .await
            .map_err(|e| command_error(&resource.id, e))?;
        let image_id = self
            .image_id(tag)
            .await
            .map_err(|e| command_error(&resource.id, e))?;

        let attributes = HashMap::from([("image_id".to_string(), Value::string(&image_id))]);
        Ok(State::existing(resource.id.clone(), attributes).with_identifier(image_id))
    }

    async fn push(&self, resource: &Resource) -> ProviderResult<State> {
        let source = required_string(resource, "source_image")?;
        let destination = required_string(resource, "destination")?;

        let image_uri = self
            .push_image(source, destination)
            .await
            .map_err(|e| command_error(&resource.id, e))?;
        Ok(push_state(resource.id.clone(), &image_uri))
    }

    /// Tag and push, returning the `repository@digest` reference
    async fn push_image(&self, source: &str, destination: &str) -> Result<String> {
        self.docker(vec![
            "tag".to_string(),
            source.to_string(),
            destination.to_string(),
        ])
        .await?;
        log::info!("pushing {}", destination);
        self.docker(vec!["push".to_string(), destination.to_string()])
            .await?;

        let output = self
            .docker(vec![
                "image".to_string(),
                "inspect".to_string(),
                "--format".to_string(),
                "{{json .RepoDigests}}".to_string(),
                destination.to_string(),
            ])
            .await?;
        let digests: Vec<String> = serde_json::from_str(&output)
            .with_context(|| format!("unexpected RepoDigests output: {}", output))?;

        let prefix = format!("{}@", repository_of(destination));
        digests
            .into_iter()
            .find(|d| d.starts_with(&prefix))
            .with_context(|| format!("no digest recorded for {}", destination))
    }

    async fn read_image(&self, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        if id.resource_type == IMAGE_PUSH {
            let args = vec![
                "manifest".to_string(),
                "inspect".to_string(),
                identifier.to_string(),
            ];
            return match self.docker(args).await {
                Ok(_) => Ok(push_state(id.clone(), identifier)),
                Err(e) => {
                    log::debug!("{} not found: {:#}", identifier, e);
                    Ok(State::not_found(id.clone()))
                }
            };
        }

        match self.image_id(identifier).await {
            Ok(image_id) => {
                let attributes = HashMap::from([("image_id".to_string(), Value::string(&image_id))]);
                Ok(State::existing(id.clone(), attributes).with_identifier(image_id))
            }
            Err(e) => {
                log::debug!("{} not found: {:#}", identifier, e);
                Ok(State::not_found(id.clone()))
            }
        }
    }

    async fn remove(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        // Pushed images are cleaned up with the repository
        if id.resource_type == IMAGE_PUSH {
            return Ok(());
        }
        let args = vec![
            "image".to_string(),
            "rm".to_string(),
            "--force".to_string(),
            identifier.to_string(),
        ];
        if let Err(e) = self.docker(args).await {
            log::warn!("could not remove local image {}: {:#}", identifier, e);
        }
        Ok(())
    }
}

fn push_state(id: ResourceId, image_uri: &str) -> State {
    let digest = image_uri
        .rsplit_once('@')
        .map(|(_, digest)| digest)
        .unwrap_or_default();
    let attributes = HashMap::from([
        ("image_uri".to_string(), Value::string(image_uri)),
        ("digest".to_string(), Value::string(digest)),
    ]);
    State::existing(id, attributes).with_identifier(image_uri)
}

impl<R: CommandRunner> Provider for ImageProvider<R> {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn handles(&self, resource_type: &str) -> bool {
        resource_type == IMAGE_BUILD || resource_type == IMAGE_PUSH
    }

    fn read(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.read_image(&id, &identifier).await })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move {
            match resource.id.resource_type.as_str() {
                IMAGE_BUILD => self.build(&resource).await,
                IMAGE_PUSH => self.push(&resource).await,
                other => Err(ProviderError::new(format!("Unknown resource type: {}", other))
                    .for_resource(resource.id.clone())),
            }
        })
    }

    /// Only the push's local source tag can change in place, and it has no
    /// effect on the pushed image
    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        _to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let state = State::existing(id.clone(), from.attributes.clone()).with_identifier(identifier);
        Box::pin(async move { Ok(state) })
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.remove(&id, &identifier).await })
    }
}
