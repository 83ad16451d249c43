use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Result;
use crate::session::Item;

/// Answers "is there already a child called `name` under `parent_id`".
///
/// Only used to reconcile uploads whose last response did not carry the
/// finished item.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn find_child(&self, drive_id: &str, parent_id: &str, name: &str) -> Result<Option<Item>>;
}

/// One page of a children listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ChildList {
    #[serde(default)]
    pub value: Vec<Item>,
}

impl ChildList {
    /// Names on the drive are case-insensitive.
    pub fn find(self, name: &str) -> Option<Item> {
        let name = name.to_lowercase();
        self.value
            .into_iter()
            .find(|item| item.name.as_deref().map(str::to_lowercase).as_deref() == Some(name.as_str()))
    }
}
