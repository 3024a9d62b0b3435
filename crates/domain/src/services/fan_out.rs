//! Bounded concurrent reads with fail-fast cancellation.
//!
//! All tasks start at once and share one cancellation token. The first error
//! cancels every task still in flight and is returned; there is no partial
//! success.

use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// A boxed task for [`fan_out`].
pub type FanOutTask<T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send>>;

/// Runs `tasks` concurrently and returns their results in task order.
pub async fn fan_out<T, E>(tasks: Vec<FanOutTask<T, E>>) -> Result<Vec<T>, E>
where
    T: Send + 'static,
    E: From<JoinError> + Send + 'static,
{
    let token = CancellationToken::new();
    let mut set = JoinSet::new();
    let total = tasks.len();

    for (index, task) in tasks.into_iter().enumerate() {
        let token = token.clone();
        set.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => (index, None),
                result = task => (index, Some(result)),
            }
        });
    }

    let mut results: Vec<Option<T>> = (0..total).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, Some(Ok(value)))) => results[index] = Some(value),
            Ok((_, Some(Err(err)))) => {
                token.cancel();
                set.abort_all();
                return Err(err);
            }
            Ok((_, None)) => {}
            Err(err) if err.is_cancelled() => {}
            Err(err) => {
                token.cancel();
                set.abort_all();
                return Err(err.into());
            }
        }
    }

    Ok(results.into_iter().flatten().collect())
}

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("Cluster request failed: {0}")]
    Request(String),

    #[error("Cluster task failed: {0}")]
    Task(#[from] JoinError),
}

/// A role or cluster role binding, reduced to what usage checks need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleBinding {
    pub name: String,
    /// `None` for cluster role bindings.
    pub namespace: Option<String>,
    pub role_name: String,
}

/// Read access to the RBAC objects of a cluster behind an edge endpoint.
#[async_trait]
pub trait ClusterReader: Send + Sync {
    async fn roles(&self) -> Result<Vec<String>, ClusterError>;
    async fn role_bindings(&self) -> Result<Vec<RoleBinding>, ClusterError>;
    async fn cluster_role_bindings(&self) -> Result<Vec<RoleBinding>, ClusterError>;
}

enum Listing {
    Roles(Vec<String>),
    Bindings(Vec<RoleBinding>),
}

/// Whether `role` exists and is referenced by any role or cluster role binding.
pub async fn role_in_use<R>(reader: std::sync::Arc<R>, role: &str) -> Result<bool, ClusterError>
where
    R: ClusterReader + ?Sized + 'static,
{
    let roles_reader = reader.clone();
    let bindings_reader = reader.clone();
    let cluster_reader = reader;

    let tasks: Vec<FanOutTask<Listing, ClusterError>> = vec![
        Box::pin(async move { roles_reader.roles().await.map(Listing::Roles) }),
        Box::pin(async move { bindings_reader.role_bindings().await.map(Listing::Bindings) }),
        Box::pin(async move {
            cluster_reader
                .cluster_role_bindings()
                .await
                .map(Listing::Bindings)
        }),
    ];

    let mut exists = false;
    let mut referenced = false;
    for listing in fan_out(tasks).await? {
        match listing {
            Listing::Roles(roles) => exists = roles.iter().any(|r| r == role),
            Listing::Bindings(bindings) => {
                referenced |= bindings.iter().any(|b| b.role_name == role)
            }
        }
    }

    tracing::debug!(role, exists, referenced, "Role usage checked");
    Ok(exists && referenced)
}
