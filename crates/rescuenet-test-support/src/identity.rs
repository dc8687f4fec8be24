//! Fixed identity directory.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use rescuenet_core::error::DomainError;
use rescuenet_core::identity::{Actor, IdentityDirectory};
use uuid::Uuid;

/// Resolves only the actors registered with it.
#[derive(Debug, Default)]
pub struct StaticIdentityDirectory {
    actors: Mutex<HashMap<Uuid, Actor>>,
}

impl StaticIdentityDirectory {
    /// Creates a directory knowing `actors`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn new(actors: impl IntoIterator<Item = Actor>) -> Self {
        let directory = Self::default();
        for actor in actors {
            directory.register(actor);
        }
        directory
    }

    /// Registers one more actor.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn register(&self, actor: Actor) {
        self.actors.lock().unwrap().insert(actor.user_id(), actor);
    }
}

#[async_trait]
impl IdentityDirectory for StaticIdentityDirectory {
    async fn resolve(&self, user_id: Uuid) -> Result<Option<Actor>, DomainError> {
        Ok(self.actors.lock().unwrap().get(&user_id).copied())
    }
}
