use std::{collections::BTreeMap, sync::Arc};

use super::{DeleteFile, DeleteKind, ManifestError, SequenceNumber, Snapshot, SnapshotId};
use crate::{
    partition::{PartitionSpec, SpecId},
    schema::TableSchema,
};

/// Immutable table state behind the store's current pointer.
///
/// Every change produces a new value; readers keep whatever `Arc` they loaded.
#[derive(Clone, Debug)]
pub struct TableMetadata {
    name: Arc<str>,
    schema: Arc<TableSchema>,
    specs: Vec<Arc<PartitionSpec>>,
    default_spec_id: SpecId,
    properties: BTreeMap<String, String>,
    snapshots: Vec<Arc<Snapshot>>,
    current_snapshot_id: Option<SnapshotId>,
    last_snapshot_id: SnapshotId,
    last_sequence_number: SequenceNumber,
    version: u64,
}

impl TableMetadata {
    /// Metadata of a freshly created table with no snapshot.
    pub fn new(
        name: impl Into<Arc<str>>,
        schema: TableSchema,
        spec: PartitionSpec,
        properties: BTreeMap<String, String>,
    ) -> Self {
        Self {
            name: name.into(),
            schema: Arc::new(schema),
            default_spec_id: spec.spec_id(),
            specs: vec![Arc::new(spec)],
            properties,
            snapshots: Vec::new(),
            current_snapshot_id: None,
            last_snapshot_id: 0,
            last_sequence_number: 0,
            version: 0,
        }
    }

    /// Table name.
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// Table schema.
    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    /// Every spec the table has used.
    pub fn specs(&self) -> &[Arc<PartitionSpec>] {
        &self.specs
    }

    /// Spec with `spec_id`.
    pub fn spec(&self, spec_id: SpecId) -> Result<&Arc<PartitionSpec>, ManifestError> {
        self.specs
            .iter()
            .find(|spec| spec.spec_id() == spec_id)
            .ok_or(ManifestError::UnknownSpec(spec_id))
    }

    /// Spec used for new writes.
    pub fn default_spec(&self) -> Result<&Arc<PartitionSpec>, ManifestError> {
        self.spec(self.default_spec_id)
    }

    /// Whether the equality delete `file` applies outside its own partition.
    ///
    /// True when it was written under an unpartitioned spec. Commits reject
    /// files whose spec is unknown, so an unknown spec never matches.
    pub fn is_global_delete(&self, file: &DeleteFile) -> bool {
        matches!(file.kind, DeleteKind::Equality { .. })
            && self
                .spec(file.spec_id)
                .is_ok_and(|spec| spec.is_unpartitioned())
    }

    /// Table properties.
    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Property value for `key`.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Snapshot history in commit order.
    pub fn snapshots(&self) -> &[Arc<Snapshot>] {
        &self.snapshots
    }

    /// Current snapshot id, `None` before the first commit.
    pub fn current_snapshot_id(&self) -> Option<SnapshotId> {
        self.current_snapshot_id
    }

    /// Current snapshot.
    pub fn current_snapshot(&self) -> Option<&Arc<Snapshot>> {
        self.current_snapshot_id.and_then(|id| self.snapshot(id))
    }

    /// Snapshot with `snapshot_id`.
    pub fn snapshot(&self, snapshot_id: SnapshotId) -> Option<&Arc<Snapshot>> {
        self.snapshots
            .iter()
            .find(|snapshot| snapshot.snapshot_id == snapshot_id)
    }

    /// Id the next snapshot must use.
    pub fn next_snapshot_id(&self) -> SnapshotId {
        self.last_snapshot_id + 1
    }

    /// Sequence number the next commit must use.
    pub fn next_sequence_number(&self) -> SequenceNumber {
        self.last_sequence_number + 1
    }

    /// Metadata version, bumped by every change.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Snapshots committed after `base`, newest first.
    ///
    /// Walks parent links from the current snapshot. Fails when `base` is not
    /// an ancestor of the current snapshot.
    pub fn snapshots_since(
        &self,
        base: Option<SnapshotId>,
    ) -> Result<Vec<Arc<Snapshot>>, ManifestError> {
        let mut newer = Vec::new();
        let mut cursor = self.current_snapshot_id;
        while cursor != base {
            let Some(id) = cursor else {
                return Err(ManifestError::NotAncestor(base));
            };
            let snapshot = self
                .snapshot(id)
                .ok_or(ManifestError::UnknownSnapshot(id))?;
            newer.push(Arc::clone(snapshot));
            cursor = snapshot.parent_id;
        }
        Ok(newer)
    }

    /// New metadata with `snapshot` committed on top of the current one.
    pub fn with_snapshot(&self, snapshot: Snapshot) -> Result<Self, ManifestError> {
        if snapshot.parent_id != self.current_snapshot_id {
            return Err(ManifestError::Invariant("snapshot parent is not current"));
        }
        if snapshot.snapshot_id <= self.last_snapshot_id
            || snapshot.sequence_number <= self.last_sequence_number
        {
            return Err(ManifestError::Invariant(
                "snapshot id and sequence number must increase",
            ));
        }
        let mut next = self.clone();
        next.last_snapshot_id = snapshot.snapshot_id;
        next.last_sequence_number = snapshot.sequence_number;
        next.current_snapshot_id = Some(snapshot.snapshot_id);
        next.snapshots.push(Arc::new(snapshot));
        next.version += 1;
        Ok(next)
    }

    /// New metadata that writes with `spec`, reusing an existing spec with the same layout.
    pub fn with_default_spec(&self, spec: PartitionSpec) -> Self {
        let mut next = self.clone();
        match self.specs.iter().find(|known| known.same_layout(&spec)) {
            Some(known) => next.default_spec_id = known.spec_id(),
            None => {
                next.default_spec_id = spec.spec_id();
                next.specs.push(Arc::new(spec));
            }
        }
        next.version += 1;
        next
    }

    /// Id for a spec that is not yet registered.
    pub fn next_spec_id(&self) -> SpecId {
        self.specs
            .iter()
            .map(|spec| spec.spec_id())
            .max()
            .map_or(0, |id| id + 1)
    }

    /// New metadata with a property set.
    pub fn with_property(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.properties.insert(key.into(), value.into());
        next.version += 1;
        next
    }
}
