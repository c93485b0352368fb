use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use uuid::Uuid;

/// Set to `false` to keep a transaction out of the undo history.
pub const ADD_TO_HISTORY: &str = "addToHistory";
/// Carries the [`Meta`] of the transaction a plugin-appended transaction
/// was produced for.
pub const APPENDED_TRANSACTION: &str = "appendedTransaction";
/// Number of trailing history items that foreign edits were rebased under.
pub const REBASED: &str = "rebased";
/// Identifier of the input composition a transaction belongs to.
pub const COMPOSITION: &str = "composition";

/// Identifies a plugin and its state field.
///
/// Keys compare by id only, so two keys made with the same name are still
/// distinct.
#[derive(Debug, Clone)]
pub struct PluginKey {
    name: Cow<'static, str>,
    id: Uuid,
}

impl PluginKey {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self::with_id(name, Uuid::new_v4())
    }

    pub fn with_id(name: impl Into<Cow<'static, str>>, id: Uuid) -> Self {
        Self { name: name.into(), id }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl PartialEq for PluginKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PluginKey {}

impl Hash for PluginKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for PluginKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}${}", self.name, self.id)
    }
}

/// Key of a transaction metadata entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MetaKey {
    Name(Cow<'static, str>),
    Plugin(PluginKey),
}

impl From<&'static str> for MetaKey {
    fn from(name: &'static str) -> Self {
        MetaKey::Name(Cow::Borrowed(name))
    }
}

impl From<String> for MetaKey {
    fn from(name: String) -> Self {
        MetaKey::Name(Cow::Owned(name))
    }
}

impl From<PluginKey> for MetaKey {
    fn from(key: PluginKey) -> Self {
        MetaKey::Plugin(key)
    }
}

impl From<&PluginKey> for MetaKey {
    fn from(key: &PluginKey) -> Self {
        MetaKey::Plugin(key.clone())
    }
}

/// Open map of transaction metadata. Values are shared, so cloning the map
/// is cheap.
#[derive(Clone, Default)]
pub struct Meta(HashMap<MetaKey, Arc<dyn Any + Send + Sync>>);

impl Meta {
    pub fn set<T: Any + Send + Sync>(&mut self, key: impl Into<MetaKey>, value: T) {
        self.0.insert(key.into(), Arc::new(value));
    }

    /// The value under `key`, if there is one of type `T`.
    pub fn get<T: Any>(&self, key: impl Into<MetaKey>) -> Option<&T> {
        self.0.get(&key.into()).and_then(|value| (**value).downcast_ref::<T>())
    }

    pub fn contains(&self, key: impl Into<MetaKey>) -> bool {
        self.0.contains_key(&key.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Debug for Meta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}
