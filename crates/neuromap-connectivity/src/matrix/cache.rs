// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Cache of connections decoded from device memory

use ahash::AHashMap;

use crate::types::{Connection, ProjectionId};

/// Which partition of a projection a cached list came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    Undelayed,
    Delayed,
}

/// Decoded connections per (projection, partition)
///
/// Entries live until [`invalidate`](Self::invalidate) is called; a new run
/// on the device must always be followed by an invalidation.
#[derive(Debug, Default)]
pub struct ConnectionCache {
    entries: AHashMap<(ProjectionId, Partition), Vec<Connection>>,
}

impl ConnectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, projection: ProjectionId, partition: Partition) -> Option<&[Connection]> {
        self.entries
            .get(&(projection, partition))
            .map(|connections| connections.as_slice())
    }

    pub fn insert(
        &mut self,
        projection: ProjectionId,
        partition: Partition,
        connections: Vec<Connection>,
    ) {
        self.entries.insert((projection, partition), connections);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn invalidate(&mut self) {
        self.entries.clear();
    }
}
