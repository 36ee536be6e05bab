//! Delete configuration: table properties with per-call overrides.

use std::{collections::BTreeMap, fmt, str::FromStr, sync::Arc};

use thiserror::Error;

use crate::{io::TargetFileSize, pruning::PrunerKind, schema::TableSchema};

/// Isolation level checked when a delete commits.
pub const DELETE_ISOLATION_LEVEL: &str = "write.delete.isolation-level";
/// Strategy used for row-level deletes.
pub const DELETE_MODE: &str = "write.delete.mode";
/// Matched-row fraction above which the adaptive mode rewrites a file.
pub const DELETE_ADAPTIVE_RATIO: &str = "write.delete.adaptive-ratio";
/// Target size of rewritten data files.
pub const TARGET_FILE_SIZE_BYTES: &str = "write.target-file-size-bytes";
/// Upper bound on rows per rewritten data file.
pub const SPLIT_SIZE_ROWS: &str = "write.split-size-rows";
/// Pruner used to pick candidate files.
pub const DELETE_PRUNER: &str = "write.delete.pruner";
/// Comma separated key columns for equality deletes.
pub const DELETE_EQUALITY_COLUMNS: &str = "write.delete.equality-columns";
/// Number of retries after the first commit attempt.
pub const COMMIT_NUM_RETRIES: &str = "commit.retry.num-retries";

const DEFAULT_ADAPTIVE_RATIO: f64 = 0.5;
const DEFAULT_NUM_RETRIES: u32 = 4;

/// Errors raised while resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A property holds a value that cannot be parsed.
    #[error("invalid value `{value}` for `{key}`: {reason}")]
    InvalidValue {
        /// Property name.
        key: &'static str,
        /// Offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
    /// Equality delete columns name a column missing from the schema.
    #[error("equality delete column `{0}` does not exist")]
    UnknownColumn(String),
}

/// Conflict detection strictness applied at commit time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum IsolationLevel {
    /// Fails when a concurrent commit added data the predicate could match.
    #[default]
    Serializable,
    /// Fails only when a concurrent commit touched files this delete read.
    Snapshot,
}

impl IsolationLevel {
    /// Property value naming this level.
    pub fn as_str(self) -> &'static str {
        match self {
            IsolationLevel::Serializable => "serializable",
            IsolationLevel::Snapshot => "snapshot",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IsolationLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "serializable" => Ok(IsolationLevel::Serializable),
            "snapshot" => Ok(IsolationLevel::Snapshot),
            other => Err(format!("unknown isolation level `{other}`")),
        }
    }
}

/// How rows are removed from files that are only partly deleted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DeleteMode {
    /// Rewrite affected files without the deleted rows.
    #[default]
    CopyOnWrite,
    /// Record deleted rows in delete files, leaving data files untouched.
    MergeOnRead,
    /// Choose per file by the fraction of rows deleted.
    Adaptive,
}

impl DeleteMode {
    /// Property value naming this mode.
    pub fn as_str(self) -> &'static str {
        match self {
            DeleteMode::CopyOnWrite => "copy-on-write",
            DeleteMode::MergeOnRead => "merge-on-read",
            DeleteMode::Adaptive => "adaptive",
        }
    }
}

impl fmt::Display for DeleteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeleteMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "copy-on-write" => Ok(DeleteMode::CopyOnWrite),
            "merge-on-read" => Ok(DeleteMode::MergeOnRead),
            "adaptive" => Ok(DeleteMode::Adaptive),
            other => Err(format!("unknown delete mode `{other}`")),
        }
    }
}

/// Per-call overrides of the table's delete properties.
///
/// Unset options fall back to table properties, then to defaults.
#[derive(Clone, Debug, Default)]
pub struct DeleteOptions {
    pub(crate) isolation_level: Option<IsolationLevel>,
    pub(crate) mode: Option<DeleteMode>,
    pub(crate) adaptive_ratio: Option<f64>,
    pub(crate) target_file_size_bytes: Option<u64>,
    pub(crate) split_size_rows: Option<usize>,
    pub(crate) pruner: Option<PrunerKind>,
    pub(crate) equality_columns: Option<Vec<Arc<str>>>,
    pub(crate) num_retries: Option<u32>,
}

impl DeleteOptions {
    /// Isolation level checked at commit.
    pub fn isolation_level(self, isolation_level: IsolationLevel) -> Self {
        DeleteOptions {
            isolation_level: Some(isolation_level),
            ..self
        }
    }

    /// Strategy for partly deleted files.
    pub fn mode(self, mode: DeleteMode) -> Self {
        DeleteOptions {
            mode: Some(mode),
            ..self
        }
    }

    /// Matched-row fraction at which adaptive mode rewrites a file.
    pub fn adaptive_ratio(self, adaptive_ratio: f64) -> Self {
        DeleteOptions {
            adaptive_ratio: Some(adaptive_ratio),
            ..self
        }
    }

    /// Target size of rewritten files.
    pub fn target_file_size_bytes(self, target_file_size_bytes: u64) -> Self {
        DeleteOptions {
            target_file_size_bytes: Some(target_file_size_bytes),
            ..self
        }
    }

    /// Row cap per rewritten file.
    pub fn split_size_rows(self, split_size_rows: usize) -> Self {
        DeleteOptions {
            split_size_rows: Some(split_size_rows),
            ..self
        }
    }

    /// Pruner selecting candidate files.
    pub fn pruner(self, pruner: PrunerKind) -> Self {
        DeleteOptions {
            pruner: Some(pruner),
            ..self
        }
    }

    /// Key columns for equality deletes.
    pub fn equality_columns<I, S>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        DeleteOptions {
            equality_columns: Some(columns.into_iter().map(Into::into).collect()),
            ..self
        }
    }

    /// Retries after the first commit attempt.
    pub fn num_retries(self, num_retries: u32) -> Self {
        DeleteOptions {
            num_retries: Some(num_retries),
            ..self
        }
    }
}

/// Effective delete settings for one operation.
#[derive(Clone, Debug, PartialEq)]
pub struct DeleteConfig {
    /// Isolation level checked at commit.
    pub isolation_level: IsolationLevel,
    /// Row-level delete strategy.
    pub mode: DeleteMode,
    /// Adaptive mode threshold in `[0, 1]`.
    pub adaptive_ratio: f64,
    /// Output sizing for rewritten files.
    pub sizing: TargetFileSize,
    /// Candidate file selection.
    pub pruner: PrunerKind,
    /// Key columns for equality deletes; empty disables them.
    pub equality_columns: Vec<Arc<str>>,
    /// Retries after the first attempt.
    pub num_retries: u32,
}

fn parse<T>(
    properties: &BTreeMap<String, String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    properties
        .get(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|err: T::Err| ConfigError::InvalidValue {
                    key,
                    value: value.clone(),
                    reason: err.to_string(),
                })
        })
        .transpose()
}

impl DeleteConfig {
    /// Resolves `options` over the table `properties`.
    pub fn resolve(
        schema: &TableSchema,
        properties: &BTreeMap<String, String>,
        options: &DeleteOptions,
    ) -> Result<Self, ConfigError> {
        let defaults = TargetFileSize::default();
        let adaptive_ratio = match options.adaptive_ratio {
            Some(ratio) => ratio,
            None => parse(properties, DELETE_ADAPTIVE_RATIO)?.unwrap_or(DEFAULT_ADAPTIVE_RATIO),
        };
        if !(0.0..=1.0).contains(&adaptive_ratio) {
            return Err(ConfigError::InvalidValue {
                key: DELETE_ADAPTIVE_RATIO,
                value: adaptive_ratio.to_string(),
                reason: "ratio must lie within [0, 1]".into(),
            });
        }
        let split_rows = match options.split_size_rows {
            Some(rows) => rows,
            None => parse(properties, SPLIT_SIZE_ROWS)?.unwrap_or(defaults.split_rows),
        };
        if split_rows == 0 {
            return Err(ConfigError::InvalidValue {
                key: SPLIT_SIZE_ROWS,
                value: split_rows.to_string(),
                reason: "must be positive".into(),
            });
        }
        let equality_columns = match &options.equality_columns {
            Some(columns) => columns.clone(),
            None => properties
                .get(DELETE_EQUALITY_COLUMNS)
                .map(|value| {
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|name| !name.is_empty())
                        .map(Arc::from)
                        .collect()
                })
                .unwrap_or_default(),
        };
        if let Some(missing) = equality_columns
            .iter()
            .find(|name| schema.index_of(name).is_none())
        {
            return Err(ConfigError::UnknownColumn(missing.to_string()));
        }

        Ok(Self {
            isolation_level: match options.isolation_level {
                Some(level) => level,
                None => parse(properties, DELETE_ISOLATION_LEVEL)?.unwrap_or_default(),
            },
            mode: match options.mode {
                Some(mode) => mode,
                None => parse(properties, DELETE_MODE)?.unwrap_or_default(),
            },
            adaptive_ratio,
            sizing: TargetFileSize {
                target_bytes: match options.target_file_size_bytes {
                    Some(bytes) => bytes,
                    None => {
                        parse(properties, TARGET_FILE_SIZE_BYTES)?.unwrap_or(defaults.target_bytes)
                    }
                },
                split_rows,
            },
            pruner: match options.pruner {
                Some(pruner) => pruner,
                None => parse(properties, DELETE_PRUNER)?.unwrap_or_default(),
            },
            equality_columns,
            num_retries: match options.num_retries {
                Some(retries) => retries,
                None => parse(properties, COMMIT_NUM_RETRIES)?.unwrap_or(DEFAULT_NUM_RETRIES),
            },
        })
    }

    /// Total commit attempts, the first one included.
    pub fn max_attempts(&self) -> u32 {
        self.num_retries.saturating_add(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, DataType};

    fn schema() -> TableSchema {
        TableSchema::new(vec![Column::new("id", DataType::Int64)]).unwrap()
    }

    fn properties(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_without_properties() {
        let config =
            DeleteConfig::resolve(&schema(), &BTreeMap::new(), &DeleteOptions::default()).unwrap();
        assert_eq!(config.isolation_level, IsolationLevel::Serializable);
        assert_eq!(config.mode, DeleteMode::CopyOnWrite);
        assert_eq!(config.pruner, PrunerKind::Metrics);
        assert_eq!(config.max_attempts(), 5);
        assert!(config.equality_columns.is_empty());
    }

    #[test]
    fn options_override_properties() {
        let props = properties(&[
            (DELETE_ISOLATION_LEVEL, "snapshot"),
            (DELETE_MODE, "merge-on-read"),
            (DELETE_EQUALITY_COLUMNS, "id"),
            (COMMIT_NUM_RETRIES, "1"),
        ]);
        let config = DeleteConfig::resolve(
            &schema(),
            &props,
            &DeleteOptions::default().mode(DeleteMode::Adaptive),
        )
        .unwrap();
        assert_eq!(config.isolation_level, IsolationLevel::Snapshot);
        assert_eq!(config.mode, DeleteMode::Adaptive);
        assert_eq!(config.equality_columns, vec![Arc::<str>::from("id")]);
        assert_eq!(config.max_attempts(), 2);
    }

    #[test]
    fn rejects_bad_values() {
        let props = properties(&[(DELETE_MODE, "rewrite-everything")]);
        assert!(matches!(
            DeleteConfig::resolve(&schema(), &props, &DeleteOptions::default()),
            Err(ConfigError::InvalidValue { key: DELETE_MODE, .. })
        ));
        assert!(matches!(
            DeleteConfig::resolve(
                &schema(),
                &BTreeMap::new(),
                &DeleteOptions::default().equality_columns(["dep"])
            ),
            Err(ConfigError::UnknownColumn(column)) if column == "dep"
        ));
    }
}
