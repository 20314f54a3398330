//! Lifecycle hooks fired around get/set/delete.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CacheError;

// == Hook Point ==
/// Where in an operation a hook fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPoint {
    BeforeGet,
    AfterGet,
    BeforeSet,
    AfterSet,
    BeforeDelete,
    AfterDelete,
}

impl HookPoint {
    pub const ALL: [HookPoint; 6] = [
        HookPoint::BeforeGet,
        HookPoint::AfterGet,
        HookPoint::BeforeSet,
        HookPoint::AfterSet,
        HookPoint::BeforeDelete,
        HookPoint::AfterDelete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HookPoint::BeforeGet => "before_get",
            HookPoint::AfterGet => "after_get",
            HookPoint::BeforeSet => "before_set",
            HookPoint::AfterSet => "after_set",
            HookPoint::BeforeDelete => "before_delete",
            HookPoint::AfterDelete => "after_delete",
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookPoint {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HookPoint::ALL
            .into_iter()
            .find(|point| point.as_str() == s)
            .ok_or_else(|| CacheError::Configuration(format!("unknown hook point '{}'", s)))
    }
}

// == Hook ==
/// Callback receiving the key and, where one exists, the value.
pub type HookFn<M> = Arc<dyn Fn(&str, Option<&M>) + Send + Sync>;

/// A callback bound to one trigger point.
pub struct Hook<M> {
    point: HookPoint,
    callback: HookFn<M>,
}

impl<M> Hook<M> {
    pub fn new<F>(point: HookPoint, callback: F) -> Self
    where
        F: Fn(&str, Option<&M>) + Send + Sync + 'static,
    {
        Self {
            point,
            callback: Arc::new(callback),
        }
    }

    pub fn point(&self) -> HookPoint {
        self.point
    }

    pub fn call(&self, key: &str, value: Option<&M>) {
        (self.callback)(key, value)
    }
}

impl<M> Clone for Hook<M> {
    fn clone(&self) -> Self {
        Self {
            point: self.point,
            callback: Arc::clone(&self.callback),
        }
    }
}

impl<M> fmt::Debug for Hook<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook").field("point", &self.point).finish()
    }
}

// == Hook Registry ==
/// Ordered list of hooks.
///
/// Every hook registered for a trigger point fires, in registration order.
/// Callbacks run synchronously on the caller's task; a slow or panicking
/// callback stalls or unwinds the calling operation.
pub struct Hooks<M> {
    hooks: Vec<Hook<M>>,
}

impl<M> Hooks<M> {
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Builder-style registration.
    pub fn with<F>(mut self, point: HookPoint, callback: F) -> Self
    where
        F: Fn(&str, Option<&M>) + Send + Sync + 'static,
    {
        self.push(Hook::new(point, callback));
        self
    }

    pub fn push(&mut self, hook: Hook<M>) {
        self.hooks.push(hook);
    }

    /// Invokes every hook registered for `point`.
    pub fn fire(&self, point: HookPoint, key: &str, value: Option<&M>) {
        for hook in self.hooks.iter().filter(|h| h.point == point) {
            hook.call(key, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Hook<M>> {
        self.hooks.iter()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl<M> Default for Hooks<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Clone for Hooks<M> {
    fn clone(&self) -> Self {
        Self {
            hooks: self.hooks.clone(),
        }
    }
}

impl<M> fmt::Debug for Hooks<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.hooks.iter()).finish()
    }
}

impl<M> From<Vec<Hook<M>>> for Hooks<M> {
    fn from(hooks: Vec<Hook<M>>) -> Self {
        Self { hooks }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_fire_only_matching_point() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let hooks: Hooks<String> = Hooks::new().with(HookPoint::AfterSet, move |key, value| {
            log.lock()
                .unwrap()
                .push(format!("{}={}", key, value.cloned().unwrap_or_default()));
        });

        hooks.fire(HookPoint::BeforeSet, "users", Some(&"ignored".to_string()));
        hooks.fire(HookPoint::AfterSet, "users", Some(&"John".to_string()));

        assert_eq!(*seen.lock().unwrap(), vec!["users=John".to_string()]);
    }

    #[test]
    fn test_fire_all_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::clone(&seen);
        let second = Arc::clone(&seen);
        let hooks: Hooks<u32> = Hooks::new()
            .with(HookPoint::BeforeDelete, move |_, _| first.lock().unwrap().push(1))
            .with(HookPoint::BeforeDelete, move |_, _| second.lock().unwrap().push(2));

        hooks.fire(HookPoint::BeforeDelete, "k", None);

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_hook_point_names() {
        for point in HookPoint::ALL {
            assert_eq!(point.as_str().parse::<HookPoint>().unwrap(), point);
        }
        assert_eq!(HookPoint::BeforeGet.to_string(), "before_get");
        assert!("during_get".parse::<HookPoint>().is_err());
    }

    #[test]
    fn test_clone_shares_callbacks() {
        let hooks: Hooks<u8> = Hooks::new().with(HookPoint::AfterGet, |_, _| {});
        let cloned = hooks.clone();
        assert_eq!(cloned.len(), 1);
        assert_eq!(cloned.iter().next().unwrap().point(), HookPoint::AfterGet);
    }
}
