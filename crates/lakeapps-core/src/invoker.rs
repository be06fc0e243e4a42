//! Dual-Path Invoker: runs one logical operation under each credential mode
//!
//! Each path walks `Idle → Resolving → Connecting → Executing` and ends in
//! `Succeeded` or `Failed`. Failures are caught per path and folded into a
//! [`QueryResult`], so one path can never block or corrupt the other.

use crate::context::RequestContext;
use crate::credential::{AuthMode, Credential, CredentialResolver};
use crate::data_model::{DualResult, QueryResult, QueryStatus, Tabular};
use crate::error::AppError;
use crate::locator::ResourceLocator;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Turns a resolved credential into a connected client for a target.
///
/// The returned client is owned by the invoker for the duration of a single
/// path and dropped when that path finishes, whatever the outcome.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    type Client: Send + Sync;

    async fn connect(
        &self,
        credential: &Credential,
        target: &ResourceLocator,
    ) -> Result<Self::Client, AppError>;
}

/// A logical operation runnable under either credential mode.
#[async_trait]
pub trait Operation<C>: Send + Sync {
    /// Stable id (ex: "sql.table_query")
    fn id(&self) -> &'static str;

    /// What the operation reads from, for result messages.
    fn subject(&self) -> String;

    /// Where to connect. Fails before any network activity when the
    /// operation's input or configuration is incomplete.
    fn target(&self) -> Result<ResourceLocator, AppError>;

    async fn execute(&self, client: &C) -> Result<Tabular, AppError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathState {
    Idle,
    Resolving,
    Connecting,
    Executing,
    Succeeded,
    Failed,
}

impl PathState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PathState::Succeeded | PathState::Failed)
    }
}

/// Tracks one path's transitions. Created fresh for every invocation.
struct PathRun {
    mode: AuthMode,
    trace: Vec<PathState>,
    started: Instant,
}

impl PathRun {
    fn start(mode: AuthMode) -> Self {
        Self {
            mode,
            trace: vec![PathState::Idle],
            started: Instant::now(),
        }
    }

    fn enter(&mut self, state: PathState) {
        debug_assert!(
            !self.current().is_terminal(),
            "path already finished in {:?}",
            self.current()
        );
        self.trace.push(state);
    }

    fn current(&self) -> PathState {
        *self.trace.last().unwrap_or(&PathState::Idle)
    }

    fn finish(mut self, mut result: QueryResult) -> QueryResult {
        let terminal = if result.status == QueryStatus::Error {
            PathState::Failed
        } else {
            PathState::Succeeded
        };
        self.enter(terminal);
        result.mode = self.mode;
        result.trace = self.trace;
        result.latency_ms = self.started.elapsed().as_millis() as u64;
        result
    }
}

pub struct DualPathInvoker<F> {
    resolver: CredentialResolver,
    factory: F,
}

impl<F: ClientFactory> DualPathInvoker<F> {
    pub fn new(resolver: CredentialResolver, factory: F) -> Self {
        Self { resolver, factory }
    }

    pub fn resolver(&self) -> &CredentialResolver {
        &self.resolver
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Runs `op` under a single mode.
    pub async fn invoke<O>(&self, ctx: &RequestContext, mode: AuthMode, op: &O) -> QueryResult
    where
        O: Operation<F::Client> + ?Sized,
    {
        let mut run = PathRun::start(mode);
        let outcome = self.drive(&mut run, ctx, op).await;

        let result = match outcome {
            Ok(data) => QueryResult::from_tabular(mode, op.id(), &op.subject(), data),
            Err(err) => {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    operation = op.id(),
                    %mode,
                    failed_in = ?run.current(),
                    error = %err,
                    "path failed"
                );
                QueryResult::from_error(mode, op.id(), &err)
            }
        };
        let result = run.finish(result);

        tracing::info!(
            request_id = %ctx.request_id,
            operation = op.id(),
            %mode,
            status = ?result.status,
            rows = result.rows.len(),
            latency_ms = result.latency_ms,
            "path finished"
        );
        result
    }

    /// Runs `op` under both modes concurrently.
    pub async fn invoke_both<O>(&self, ctx: &RequestContext, op: &O) -> DualResult
    where
        O: Operation<F::Client> + ?Sized,
    {
        let (service_principal, on_behalf_of) = tokio::join!(
            self.invoke(ctx, AuthMode::ServicePrincipal, op),
            self.invoke(ctx, AuthMode::OnBehalfOf, op),
        );
        DualResult {
            service_principal,
            on_behalf_of,
        }
    }

    async fn drive<O>(
        &self,
        run: &mut PathRun,
        ctx: &RequestContext,
        op: &O,
    ) -> Result<Tabular, AppError>
    where
        O: Operation<F::Client> + ?Sized,
    {
        run.enter(PathState::Resolving);
        let credential = self.resolver.resolve(ctx, run.mode)?;
        let target = op.target()?;

        run.enter(PathState::Connecting);
        let client = self.factory.connect(&credential, &target).await?;

        run.enter(PathState::Executing);
        let data = op.execute(&client).await;
        drop(client);
        data
    }
}
