//! Output schema reconciliation.
//!
//! Each sink destination gets one ordered column list, established from
//! the first batch written to it (or adopted from an existing file header)
//! and then kept fixed. Field sets vary between datasets and ticks, so the
//! reconciler decides what happens when a batch carries unseen fields.

use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::str::FromStr;

use tracing::{debug, info};

use crate::parser::{IDENTITY_FIELDS, MetricRecord};

/// What to do when a batch contains fields missing from a committed schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchemaPolicy {
    /// Keep the schema and drop the new fields from output.
    #[default]
    Drop,
    /// Refuse the batch with `SchemaError::Drift`.
    Fail,
    /// Establish a new schema from the batch; the sink starts a new
    /// destination.
    Rotate,
}

impl FromStr for SchemaPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "drop" => Ok(SchemaPolicy::Drop),
            "fail" => Ok(SchemaPolicy::Fail),
            "rotate" => Ok(SchemaPolicy::Rotate),
            other => Err(format!(
                "unknown schema policy '{}' (expected drop, fail or rotate)",
                other
            )),
        }
    }
}

impl std::fmt::Display for SchemaPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SchemaPolicy::Drop => "drop",
            SchemaPolicy::Fail => "fail",
            SchemaPolicy::Rotate => "rotate",
        };
        f.write_str(name)
    }
}

/// Schema reconciliation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// A batch carried fields the committed schema does not have.
    Drift { sink: String, fields: Vec<String> },
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaError::Drift { sink, fields } => write!(
                f,
                "schema of {} is fixed, batch has new fields: {}",
                sink,
                fields.join(", ")
            ),
        }
    }
}

impl std::error::Error for SchemaError {}

/// Ordered, de-duplicated column list of one destination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<String>,
}

impl Schema {
    /// Builds a schema from an explicit column list (e.g. an existing CSV
    /// header), keeping the first occurrence of repeated names.
    pub fn from_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let fields = columns
            .into_iter()
            .map(Into::into)
            .filter(|name: &String| seen.insert(name.clone()))
            .collect();
        Self { fields }
    }

    /// Orders a field set: identity columns first in their fixed order,
    /// then every other field lexicographically.
    pub fn establish(field_set: &BTreeSet<String>) -> Self {
        let identity = IDENTITY_FIELDS
            .iter()
            .filter(|name| field_set.contains(**name))
            .map(|name| name.to_string());
        let rest = field_set
            .iter()
            .filter(|name| !IDENTITY_FIELDS.contains(&name.as_str()))
            .cloned();
        Self {
            fields: identity.chain(rest).collect(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f == name)
    }

    /// Projects a record onto the schema: one value per column, empty for
    /// missing fields. Fields outside the schema are left out.
    pub fn project<'r>(&self, record: &'r MetricRecord) -> Vec<&'r str> {
        self.fields
            .iter()
            .map(|name| record.get(name).unwrap_or(""))
            .collect()
    }
}

/// Union of the field names of a batch.
pub fn field_union<'r, I>(records: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'r MetricRecord>,
{
    records
        .into_iter()
        .flat_map(|r| r.field_names())
        .map(str::to_string)
        .collect()
}

/// Outcome of `SchemaReconciler::resolve`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<'a> {
    /// The existing schema applies unchanged.
    Committed(&'a Schema),
    /// First schema for this sink; the destination needs a header.
    Established(&'a Schema),
    /// The schema was replaced; the destination must start over.
    Rotated(&'a Schema),
}

impl<'a> Resolution<'a> {
    pub fn schema(&self) -> &'a Schema {
        match *self {
            Resolution::Committed(s) | Resolution::Established(s) | Resolution::Rotated(s) => s,
        }
    }
}

/// Per-sink schema cache. One instance per pipeline; nothing is global.
#[derive(Debug, Default)]
pub struct SchemaReconciler {
    policy: SchemaPolicy,
    committed: HashMap<String, Schema>,
    reported_drops: HashSet<(String, String)>,
}

impl SchemaReconciler {
    pub fn new(policy: SchemaPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Committed schema of a sink, if any.
    pub fn committed(&self, sink_id: &str) -> Option<&Schema> {
        self.committed.get(sink_id)
    }

    /// Commits a schema read back from an existing destination. Does
    /// nothing if the sink already has one.
    pub fn adopt(&mut self, sink_id: &str, schema: Schema) -> &Schema {
        self.committed
            .entry(sink_id.to_string())
            .or_insert_with(|| {
                debug!("adopting {} existing columns for {}", schema.len(), sink_id);
                schema
            })
    }

    /// Returns the schema to write `records` with, committing one on first
    /// use.
    pub fn resolve<'r, I>(&mut self, sink_id: &str, records: I) -> Result<Resolution<'_>, SchemaError>
    where
        I: IntoIterator<Item = &'r MetricRecord>,
    {
        let union = field_union(records);

        match self.committed.entry(sink_id.to_string()) {
            Entry::Vacant(slot) => {
                let schema = slot.insert(Schema::establish(&union));
                info!("schema for {}: {} columns", sink_id, schema.len());
                Ok(Resolution::Established(schema))
            }
            Entry::Occupied(slot) => {
                let unseen: Vec<String> = union
                    .iter()
                    .filter(|name| !slot.get().contains(name))
                    .cloned()
                    .collect();
                if unseen.is_empty() {
                    return Ok(Resolution::Committed(slot.into_mut()));
                }

                match self.policy {
                    SchemaPolicy::Drop => {
                        for field in unseen {
                            let key = (sink_id.to_string(), field);
                            if !self.reported_drops.contains(&key) {
                                debug!("{}: dropping field '{}' not in schema", sink_id, key.1);
                                self.reported_drops.insert(key);
                            }
                        }
                        Ok(Resolution::Committed(slot.into_mut()))
                    }
                    SchemaPolicy::Fail => Err(SchemaError::Drift {
                        sink: sink_id.to_string(),
                        fields: unseen,
                    }),
                    SchemaPolicy::Rotate => {
                        let schema = slot.into_mut();
                        *schema = Schema::establish(&union);
                        info!(
                            "schema for {} rotated: {} new fields, {} columns",
                            sink_id,
                            unseen.len(),
                            schema.len()
                        );
                        Ok(Resolution::Rotated(schema))
                    }
                }
            }
        }
    }
}
