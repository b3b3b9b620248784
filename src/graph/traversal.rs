//! Bounded BFS over the relation graph.
//!
//! Each query walks the graph level by level from its root. A per-query
//! visited set gates task creation, so cycles, self-loops and diamonds
//! enqueue every entity at most once. Queries run on a bounded pool of
//! spawned tasks under a timeout watchdog.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt, TryStreamExt};
use tokio::sync::Semaphore;

use crate::cache::transaction::TransactionContext;
use crate::cache::CachedLookup;
use crate::config::TraversalConfig;
use crate::entity::EntityRef;
use crate::graph::{GraphQuery, Relation, RelationKey};
use crate::{RelgraphError, Result};

/// Lifecycle of one traversal query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalState {
    Pending,
    Running,
    Done,
    TimedOut,
    Failed,
}

impl fmt::Display for TraversalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TraversalState::Pending => "PENDING",
            TraversalState::Running => "RUNNING",
            TraversalState::Done => "DONE",
            TraversalState::TimedOut => "TIMED_OUT",
            TraversalState::Failed => "FAILED",
        })
    }
}

#[derive(Clone)]
pub struct TraversalEngine {
    lookup: CachedLookup,
    permits: Arc<Semaphore>,
    timeout: Duration,
    fetch_parallelism: usize,
}

impl TraversalEngine {
    pub fn new(lookup: CachedLookup, config: &TraversalConfig) -> Self {
        Self {
            lookup,
            permits: Arc::new(Semaphore::new(config.max_concurrent_queries.max(1))),
            timeout: Duration::from_millis(config.timeout_ms),
            fetch_parallelism: config.fetch_parallelism.max(1),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `query` and return the collected edges, deduplicated by key.
    ///
    /// Filters are not applied here. The whole query, including the wait
    /// for a worker slot, is bounded by the configured timeout; on expiry
    /// the walk is aborted and nothing it collected is returned.
    pub async fn traverse(&self, query: &GraphQuery) -> Result<Vec<Relation>> {
        if query.max_level <= 0 {
            return Ok(Vec::new());
        }

        let root = query.root;
        log::debug!("Traversal from {} {}", root, TraversalState::Pending);

        let walk = Walk {
            lookup: self.lookup.clone(),
            query: query.clone(),
            fetch_parallelism: self.fetch_parallelism,
        };
        let permits = self.permits.clone();
        let context = TransactionContext::capture();

        let mut handle = tokio::spawn(context.run(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| RelgraphError::TraversalFailed("traversal pool is closed".to_string()))?;
            log::debug!("Traversal from {} {}", root, TraversalState::Running);
            walk.run().await
        }));

        match tokio::time::timeout(self.timeout, &mut handle).await {
            Ok(Ok(Ok(relations))) => {
                log::debug!(
                    "Traversal from {} {} with {} relations",
                    root,
                    TraversalState::Done,
                    relations.len()
                );
                Ok(relations)
            }
            Ok(Ok(Err(e))) => {
                log::debug!("Traversal from {} {}: {}", root, TraversalState::Failed, e);
                Err(e)
            }
            Ok(Err(join_err)) => {
                log::debug!("Traversal from {} {}: {}", root, TraversalState::Failed, join_err);
                Err(RelgraphError::TraversalFailed(join_err.to_string()))
            }
            Err(_) => {
                handle.abort();
                let timeout_ms = self.timeout.as_millis() as u64;
                log::warn!(
                    "Traversal from {} {} after {}ms",
                    root,
                    TraversalState::TimedOut,
                    timeout_ms
                );
                Err(RelgraphError::TraversalTimeout { root, timeout_ms })
            }
        }
    }
}

/// Pending visit of one entity. `carried` is the edge that reached it,
/// kept only in last-level-only mode.
struct Task {
    node: EntityRef,
    carried: Option<Relation>,
}

struct Walk {
    lookup: CachedLookup,
    query: GraphQuery,
    fetch_parallelism: usize,
}

impl Walk {
    async fn run(self) -> Result<Vec<Relation>> {
        let direction = self.query.direction;
        let group = self.query.type_group;
        let last_only = self.query.fetch_last_level_only;
        let max_level = i64::from(self.query.max_level);
        let lookup = &self.lookup;

        let mut visited: HashSet<EntityRef> = HashSet::from([self.query.root]);
        let mut collected: HashSet<RelationKey> = HashSet::new();
        let mut result = Vec::new();
        let mut collect = |edge: Relation| {
            if collected.insert(edge.key()) {
                result.push(edge);
            }
        };

        let mut frontier = vec![Task {
            node: self.query.root,
            carried: None,
        }];
        let mut level: i64 = 1;

        while !frontier.is_empty() {
            let fetched: Vec<(Task, Vec<Relation>)> = stream::iter(frontier)
                .map(|task| async move {
                    let edges = lookup.find(&task.node, direction, group).await?;
                    Ok::<_, RelgraphError>((task, edges))
                })
                .buffered(self.fetch_parallelism)
                .try_collect()
                .await?;

            let mut next = Vec::new();
            for (task, edges) in fetched {
                if last_only && edges.is_empty() {
                    if let Some(carried) = task.carried {
                        collect(carried);
                    }
                    continue;
                }
                for edge in edges {
                    let neighbor = edge.neighbor(direction);
                    if level < max_level && visited.insert(neighbor) {
                        next.push(Task {
                            node: neighbor,
                            carried: last_only.then(|| edge.clone()),
                        });
                    }
                    if !last_only || level == max_level {
                        collect(edge);
                    }
                }
            }

            log::trace!("Level {} done, {} entities queued", level, next.len());
            frontier = next;
            level += 1;
        }

        Ok(result)
    }
}
