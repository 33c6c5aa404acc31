//! Tag registry for network flavors.
//!
//! Every [`NetTag`] maps to a constructor closure producing an empty group
//! of that flavor. Registration happens once at setup; lookups during
//! grouping are infallible for registered tags and a hard error otherwise.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::group::NetworkGroup;
use crate::id::NetTag;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FactoryError {
    #[error("no group constructor registered for tag {0:?}")]
    UnknownTag(NetTag),
    #[error("tag {0:?} already has a registered constructor")]
    DuplicateTag(NetTag),
}

type GroupCtor = Box<dyn Fn() -> Box<dyn NetworkGroup>>;

/// Maps tags to group constructors.
#[derive(Default)]
pub struct GroupFactory {
    ctors: HashMap<NetTag, GroupCtor>,
}

impl GroupFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor for a tag. Each tag registers exactly once.
    pub fn register<F>(&mut self, tag: NetTag, ctor: F) -> Result<(), FactoryError>
    where
        F: Fn() -> Box<dyn NetworkGroup> + 'static,
    {
        if self.ctors.contains_key(&tag) {
            return Err(FactoryError::DuplicateTag(tag));
        }
        self.ctors.insert(tag, Box::new(ctor));
        Ok(())
    }

    /// Build an empty group for a tag.
    pub fn create(&self, tag: NetTag) -> Result<Box<dyn NetworkGroup>, FactoryError> {
        let ctor = self.ctors.get(&tag).ok_or(FactoryError::UnknownTag(tag))?;
        Ok(ctor())
    }

    pub fn is_registered(&self, tag: NetTag) -> bool {
        self.ctors.contains_key(&tag)
    }
}

impl fmt::Debug for GroupFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<NetTag> = self.ctors.keys().copied().collect();
        tags.sort();
        f.debug_struct("GroupFactory").field("tags", &tags).finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
