//! Type-safe ID generation and management.
//!
//! Every entity in the data model (§3) is addressed through a generic,
//! prefixed `Id<T>` rather than a bare `Uuid` or `String`, so that an
//! `AgentId` can never be accidentally passed where a `WorkflowId` is
//! expected.

use schemars::JsonSchema;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Display};
use std::marker::PhantomData;
use std::str::FromStr;
use uuid::Uuid;

/// A type-safe ID with a consistent prefix and UUID.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id<T> {
    uuid: Uuid,
    _phantom: PhantomData<T>,
}

impl<T: IdType> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", T::PREFIX, self.uuid)
    }
}

/// Trait for types that can be used as ID markers.
pub trait IdType: Send + Sync + 'static {
    /// The prefix for this ID type (e.g. "agent" for agents, "wf" for workflows).
    const PREFIX: &'static str;
}

/// Errors that can occur when working with IDs.
#[derive(Debug, thiserror::Error)]
pub enum IdError {
    #[error("invalid ID format: expected prefix '{expected}', got '{actual}'")]
    InvalidPrefix { expected: String, actual: String },

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid ID format: {0}")]
    InvalidFormat(String),
}

impl<T: IdType> Id<T> {
    /// Create a new ID with a generated UUID.
    pub fn generate() -> Self {
        Self {
            uuid: Uuid::new_v4(),
            _phantom: PhantomData,
        }
    }

    /// Create an ID from a specific UUID (useful for tests or migrations).
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self {
            uuid,
            _phantom: PhantomData,
        }
    }

    /// Parse an ID from a string.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        let parts: Vec<&str> = s.splitn(2, '_').collect();
        if parts.len() != 2 {
            return Err(IdError::InvalidFormat(
                "ID must be in format 'prefix_uuid'".to_string(),
            ));
        }

        let [prefix, uuid_str] = [parts[0], parts[1]];

        if prefix != T::PREFIX {
            return Err(IdError::InvalidPrefix {
                expected: T::PREFIX.to_string(),
                actual: prefix.to_string(),
            });
        }

        let uuid = Uuid::parse_str(uuid_str)?;

        Ok(Self {
            uuid,
            _phantom: PhantomData,
        })
    }

    /// Get the UUID part.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Get the prefix for this ID type.
    pub fn prefix(&self) -> &'static str {
        T::PREFIX
    }

    /// Create a nil/empty ID (all zeros).
    pub fn nil() -> Self {
        Self {
            uuid: Uuid::nil(),
            _phantom: PhantomData,
        }
    }

    /// Check if this is a nil/empty ID.
    pub fn is_nil(&self) -> bool {
        self.uuid.is_nil()
    }
}

impl<T: IdType> Default for Id<T> {
    fn default() -> Self {
        Self::generate()
    }
}

impl<T: IdType> Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", T::PREFIX, self.uuid)
    }
}

impl<T: IdType> FromStr for Id<T> {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<T: IdType> From<Id<T>> for String {
    fn from(id: Id<T>) -> Self {
        id.to_string()
    }
}

impl<T: IdType> AsRef<Uuid> for Id<T> {
    fn as_ref(&self) -> &Uuid {
        &self.uuid
    }
}

impl<T: IdType> Serialize for Id<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}_{}", T::PREFIX, self.uuid()))
    }
}

impl<'de, T: IdType> Deserialize<'de> for Id<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(IdVisitor(PhantomData))
    }
}

struct IdVisitor<T>(PhantomData<T>);

impl<'de, T: IdType> Visitor<'de> for IdVisitor<T> {
    type Value = Id<T>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "a string with the format 'prefix_UUID'")
    }

    fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Id::parse(s).map_err(de::Error::custom)
    }
}

impl<T: IdType> JsonSchema for Id<T> {
    fn schema_name() -> std::borrow::Cow<'static, str> {
        std::borrow::Cow::Owned(format!("{}Id", T::PREFIX))
    }

    fn json_schema(generator: &mut schemars::SchemaGenerator) -> schemars::Schema {
        String::json_schema(generator)
    }
}

/// Macro to define new ID types with minimal boilerplate.
#[macro_export]
macro_rules! define_id_type {
    ($type_name:ident, $prefix:expr) => {
        /// Marker type for the ID.
        #[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
        pub struct $type_name;

        impl $crate::id::IdType for $type_name {
            const PREFIX: &'static str = $prefix;
        }
    };
}

define_id_type!(AgentIdType, "agent");
define_id_type!(GroupIdType, "group");
define_id_type!(VotingIdType, "vote");
define_id_type!(PatternIdType, "pat");
define_id_type!(WorkflowIdType, "wf");
define_id_type!(StepIdType, "step");
define_id_type!(ExecutionIdType, "exec");
define_id_type!(ScheduleIdType, "sched");
define_id_type!(DecisionIdType, "dec");
define_id_type!(ReportIdType, "rpt");
define_id_type!(TaskIdType, "task");

/// Identifies a single agent in the swarm.
pub type AgentId = Id<AgentIdType>;
/// Identifies a swarm/group of coordinating agents.
pub type GroupId = Id<GroupIdType>;
/// Identifies a voting round.
pub type VotingId = Id<VotingIdType>;
/// Identifies a pattern in the pattern store.
pub type PatternId = Id<PatternIdType>;
/// Identifies a workflow definition.
pub type WorkflowId = Id<WorkflowIdType>;
/// Identifies a step within a workflow (unique within that workflow only).
pub type StepId = Id<StepIdType>;
/// Identifies one execution (run) of a workflow.
pub type ExecutionId = Id<ExecutionIdType>;
/// Identifies a schedule entry.
pub type ScheduleId = Id<ScheduleIdType>;
/// Identifies a Queen decision, including ones pending HITL approval.
pub type DecisionId = Id<DecisionIdType>;
/// Identifies a report produced by an agent.
pub type ReportId = Id<ReportIdType>;
/// Identifies a unit of work handed to an agent's task queue.
pub type TaskId = Id<TaskIdType>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_unique_prefixed_ids() {
        let a = AgentId::generate();
        let b = AgentId::generate();
        assert_ne!(a, b);
        assert_eq!(a.prefix(), "agent");
        assert!(b.to_string().starts_with("agent_"));
    }

    #[test]
    fn round_trips_through_display_and_parse() {
        let id = WorkflowId::generate();
        let s = id.to_string();
        let parsed = WorkflowId::parse(&s).unwrap();
        assert_eq!(id, parsed);

        assert!(GroupId::parse(&s).is_err());
        assert!(WorkflowId::parse("garbage").is_err());
    }

    #[test]
    fn serializes_as_prefixed_string() {
        let id = PatternId::generate();
        let json = serde_json::to_string(&id).unwrap();
        assert!(json.contains("pat_"));
        let back: PatternId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn nil_id_is_recognizable() {
        let nil = AgentId::nil();
        assert!(nil.is_nil());
        assert_eq!(nil.to_string(), "agent_00000000-0000-0000-0000-000000000000");
    }
}
