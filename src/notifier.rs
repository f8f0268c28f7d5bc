//! The interface a policy engine uses to talk to its watcher.

use crate::core::Watcher;
use crate::notify::Callback;
use async_trait::async_trait;

/// Change announcements a policy engine makes after mutating its policy,
/// plus the callback hook it uses to hear about peers' changes.
///
/// Engines hold a `Box<dyn Notifier>` or `Arc<dyn Notifier>` so the
/// transport can be swapped. None of the announcements report failure.
///
/// # Examples
///
/// ```rust
/// use policy_watcher::prelude::*;
///
/// async fn remove_alice(notifier: &dyn Notifier) {
///     notifier
///         .update_for_remove_filtered_policy("p", "p", 0, vec!["alice".to_string()])
///         .await;
/// }
/// ```
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Install a callback, replacing any previous one of the same shape.
    fn set_callback(&self, callback: Callback);

    /// Announce an unspecified policy change.
    async fn update(&self);

    /// Announce an added rule.
    async fn update_for_add_policy(&self, sec: &str, ptype: &str, rule: Vec<String>);

    /// Announce a removed rule.
    async fn update_for_remove_policy(&self, sec: &str, ptype: &str, rule: Vec<String>);

    /// Announce a filtered removal.
    async fn update_for_remove_filtered_policy(
        &self,
        sec: &str,
        ptype: &str,
        field_index: i32,
        field_values: Vec<String>,
    );

    /// Announce that the whole policy was saved.
    async fn update_for_save_policy(&self);

    /// Announce a batch of added rules.
    async fn update_for_add_policies(&self, sec: &str, ptype: &str, rules: Vec<Vec<String>>);

    /// Announce a batch of removed rules.
    async fn update_for_remove_policies(&self, sec: &str, ptype: &str, rules: Vec<Vec<String>>);

    /// Announce a replaced rule.
    async fn update_for_update_policy(
        &self,
        sec: &str,
        ptype: &str,
        old_rule: Vec<String>,
        new_rule: Vec<String>,
    );

    /// Announce a batch of replaced rules.
    async fn update_for_update_policies(
        &self,
        sec: &str,
        ptype: &str,
        old_rules: Vec<Vec<String>>,
        new_rules: Vec<Vec<String>>,
    );

    /// Stop listening for peer changes.
    async fn close(&self);
}

#[async_trait]
impl Notifier for Watcher {
    fn set_callback(&self, callback: Callback) {
        Watcher::set_callback(self, callback);
    }

    async fn update(&self) {
        Watcher::update(self).await;
    }

    async fn update_for_add_policy(&self, sec: &str, ptype: &str, rule: Vec<String>) {
        Watcher::update_for_add_policy(self, sec, ptype, rule).await;
    }

    async fn update_for_remove_policy(&self, sec: &str, ptype: &str, rule: Vec<String>) {
        Watcher::update_for_remove_policy(self, sec, ptype, rule).await;
    }

    async fn update_for_remove_filtered_policy(
        &self,
        sec: &str,
        ptype: &str,
        field_index: i32,
        field_values: Vec<String>,
    ) {
        Watcher::update_for_remove_filtered_policy(self, sec, ptype, field_index, field_values).await;
    }

    async fn update_for_save_policy(&self) {
        Watcher::update_for_save_policy(self).await;
    }

    async fn update_for_add_policies(&self, sec: &str, ptype: &str, rules: Vec<Vec<String>>) {
        Watcher::update_for_add_policies(self, sec, ptype, rules).await;
    }

    async fn update_for_remove_policies(&self, sec: &str, ptype: &str, rules: Vec<Vec<String>>) {
        Watcher::update_for_remove_policies(self, sec, ptype, rules).await;
    }

    async fn update_for_update_policy(
        &self,
        sec: &str,
        ptype: &str,
        old_rule: Vec<String>,
        new_rule: Vec<String>,
    ) {
        Watcher::update_for_update_policy(self, sec, ptype, old_rule, new_rule).await;
    }

    async fn update_for_update_policies(
        &self,
        sec: &str,
        ptype: &str,
        old_rules: Vec<Vec<String>>,
        new_rules: Vec<Vec<String>>,
    ) {
        Watcher::update_for_update_policies(self, sec, ptype, old_rules, new_rules).await;
    }

    async fn close(&self) {
        Watcher::close(self).await;
    }
}
