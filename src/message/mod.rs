//! Notification messages describing a single policy mutation.
//!
//! A [`Message`] is a plain value: it is built right before it is published
//! and dropped once encoded, and on the receiving side it only lives for the
//! duration of a dispatch. Fields that do not apply to the message's
//! [`UpdateType`] stay at their zero value and are left off the wire.

pub mod codec;

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// The kind of policy mutation a message announces.
///
/// Serialized with the `UpdateFor...` names other watcher implementations put
/// on the wire. The short names are accepted when reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UpdateType {
    /// Bare "something changed" signal.
    #[default]
    #[serde(rename = "Update", alias = "Ping")]
    Ping,
    /// A single rule was added.
    #[serde(rename = "UpdateForAddPolicy", alias = "AddPolicy")]
    AddPolicy,
    /// A single rule was removed.
    #[serde(rename = "UpdateForRemovePolicy", alias = "RemovePolicy")]
    RemovePolicy,
    /// Every rule matching a field filter was removed.
    #[serde(rename = "UpdateForRemoveFilteredPolicy", alias = "RemoveFilteredPolicy")]
    RemoveFilteredPolicy,
    /// The whole policy was saved.
    #[serde(rename = "UpdateForSavePolicy", alias = "SavePolicy")]
    SavePolicy,
    /// A batch of rules was added.
    #[serde(rename = "UpdateForAddPolicies", alias = "AddPolicies")]
    AddPolicies,
    /// A batch of rules was removed.
    #[serde(rename = "UpdateForRemovePolicies", alias = "RemovePolicies")]
    RemovePolicies,
    /// One rule was replaced by another.
    #[serde(rename = "UpdateForUpdatePolicy", alias = "UpdatePolicy")]
    UpdatePolicy,
    /// A batch of rules was replaced by another batch.
    #[serde(rename = "UpdateForUpdatePolicies", alias = "UpdatePolicies")]
    UpdatePolicies,
}

impl UpdateType {
    /// Every mutation kind, in declaration order.
    pub const ALL: [UpdateType; 9] = [
        UpdateType::Ping,
        UpdateType::AddPolicy,
        UpdateType::RemovePolicy,
        UpdateType::RemoveFilteredPolicy,
        UpdateType::SavePolicy,
        UpdateType::AddPolicies,
        UpdateType::RemovePolicies,
        UpdateType::UpdatePolicy,
        UpdateType::UpdatePolicies,
    ];

    /// Wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateType::Ping => "Update",
            UpdateType::AddPolicy => "UpdateForAddPolicy",
            UpdateType::RemovePolicy => "UpdateForRemovePolicy",
            UpdateType::RemoveFilteredPolicy => "UpdateForRemoveFilteredPolicy",
            UpdateType::SavePolicy => "UpdateForSavePolicy",
            UpdateType::AddPolicies => "UpdateForAddPolicies",
            UpdateType::RemovePolicies => "UpdateForRemovePolicies",
            UpdateType::UpdatePolicy => "UpdateForUpdatePolicy",
            UpdateType::UpdatePolicies => "UpdateForUpdatePolicies",
        }
    }
}

impl fmt::Display for UpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One broadcastable policy change.
///
/// # Examples
///
/// ```rust
/// use policy_watcher::message::{Message, UpdateType};
///
/// let msg = Message::add_policy("node-a", "p", "p", vec!["alice".into(), "data1".into()]);
/// assert_eq!(msg.method, UpdateType::AddPolicy);
/// assert_eq!(msg.new_rule, vec!["alice", "data1"]);
/// assert!(msg.old_rules.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Which mutation occurred.
    pub method: UpdateType,

    /// Origin id of the publishing watcher.
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "String::is_empty")]
    pub id: String,

    /// Policy section, e.g. `p` or `g`.
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "String::is_empty")]
    pub sec: String,

    /// Policy type within the section.
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "String::is_empty")]
    pub ptype: String,

    /// Rule removed or replaced.
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub old_rule: Vec<String>,

    /// Batch form of `old_rule`.
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub old_rules: Vec<Vec<String>>,

    /// Rule added or the replacement rule.
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub new_rule: Vec<String>,

    /// Batch form of `new_rule`.
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub new_rules: Vec<Vec<String>>,

    /// First column matched by a filtered removal.
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "is_zero")]
    pub field_index: i32,

    /// Values matched by a filtered removal, starting at `field_index`.
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub field_values: Vec<String>,
}

fn is_zero(value: &i32) -> bool {
    *value == 0
}

// Older JSON writers emit `null` for unset arrays and strings.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Message {
    /// Create an empty message of the given kind.
    pub fn new(method: UpdateType, origin: impl Into<String>) -> Self {
        Self {
            method,
            id: origin.into(),
            ..Self::default()
        }
    }

    /// Set the section and policy type.
    pub fn with_section(mut self, sec: impl Into<String>, ptype: impl Into<String>) -> Self {
        self.sec = sec.into();
        self.ptype = ptype.into();
        self
    }

    /// Announce a single added rule.
    pub fn add_policy(
        origin: impl Into<String>,
        sec: impl Into<String>,
        ptype: impl Into<String>,
        rule: Vec<String>,
    ) -> Self {
        let mut msg = Self::new(UpdateType::AddPolicy, origin).with_section(sec, ptype);
        msg.new_rule = rule;
        msg
    }

    /// Announce a single removed rule.
    pub fn remove_policy(
        origin: impl Into<String>,
        sec: impl Into<String>,
        ptype: impl Into<String>,
        rule: Vec<String>,
    ) -> Self {
        let mut msg = Self::new(UpdateType::RemovePolicy, origin).with_section(sec, ptype);
        msg.new_rule = rule;
        msg
    }

    /// Announce a filtered removal.
    pub fn remove_filtered_policy(
        origin: impl Into<String>,
        sec: impl Into<String>,
        ptype: impl Into<String>,
        field_index: i32,
        field_values: Vec<String>,
    ) -> Self {
        let mut msg = Self::new(UpdateType::RemoveFilteredPolicy, origin).with_section(sec, ptype);
        msg.field_index = field_index;
        msg.field_values = field_values;
        msg
    }

    /// Announce that the whole policy was saved.
    pub fn save_policy(origin: impl Into<String>) -> Self {
        Self::new(UpdateType::SavePolicy, origin)
    }

    /// Announce a batch of added rules.
    pub fn add_policies(
        origin: impl Into<String>,
        sec: impl Into<String>,
        ptype: impl Into<String>,
        rules: Vec<Vec<String>>,
    ) -> Self {
        let mut msg = Self::new(UpdateType::AddPolicies, origin).with_section(sec, ptype);
        msg.new_rules = rules;
        msg
    }

    /// Announce a batch of removed rules.
    pub fn remove_policies(
        origin: impl Into<String>,
        sec: impl Into<String>,
        ptype: impl Into<String>,
        rules: Vec<Vec<String>>,
    ) -> Self {
        let mut msg = Self::new(UpdateType::RemovePolicies, origin).with_section(sec, ptype);
        msg.new_rules = rules;
        msg
    }

    /// Announce that `old_rule` was replaced by `new_rule`.
    pub fn update_policy(
        origin: impl Into<String>,
        sec: impl Into<String>,
        ptype: impl Into<String>,
        old_rule: Vec<String>,
        new_rule: Vec<String>,
    ) -> Self {
        let mut msg = Self::new(UpdateType::UpdatePolicy, origin).with_section(sec, ptype);
        msg.old_rule = old_rule;
        msg.new_rule = new_rule;
        msg
    }

    /// Announce that `old_rules` were replaced by `new_rules`.
    pub fn update_policies(
        origin: impl Into<String>,
        sec: impl Into<String>,
        ptype: impl Into<String>,
        old_rules: Vec<Vec<String>>,
        new_rules: Vec<Vec<String>>,
    ) -> Self {
        let mut msg = Self::new(UpdateType::UpdatePolicies, origin).with_section(sec, ptype);
        msg.old_rules = old_rules;
        msg.new_rules = new_rules;
        msg
    }

    /// Whether this message was published by the watcher with the given id.
    ///
    /// The subscriber loop never filters on origin, so a watcher receives its
    /// own publishes. Callbacks that want to skip those can check here.
    pub fn is_from(&self, origin: &str) -> bool {
        !self.id.is_empty() && self.id == origin
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from '{}'", self.method, self.id)?;
        if !self.sec.is_empty() || !self.ptype.is_empty() {
            write!(f, " [{}.{}]", self.sec, self.ptype)?;
        }
        if !self.old_rule.is_empty() {
            write!(f, " old={:?}", self.old_rule)?;
        }
        if !self.old_rules.is_empty() {
            write!(f, " old_rules={:?}", self.old_rules)?;
        }
        if !self.new_rule.is_empty() {
            write!(f, " new={:?}", self.new_rule)?;
        }
        if !self.new_rules.is_empty() {
            write!(f, " new_rules={:?}", self.new_rules)?;
        }
        if !self.field_values.is_empty() {
            write!(f, " field_index={} field_values={:?}", self.field_index, self.field_values)?;
        }
        Ok(())
    }
}
