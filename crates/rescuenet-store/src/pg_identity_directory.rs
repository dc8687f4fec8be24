//! `PostgreSQL` implementation of the `IdentityDirectory` trait.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use rescuenet_core::error::DomainError;
use rescuenet_core::identity::{Actor, IdentityDirectory};

use crate::database_error;

/// Resolves callers from the `users` table.
#[derive(Debug, Clone)]
pub struct PgIdentityDirectory {
    pool: PgPool,
}

impl PgIdentityDirectory {
    /// Creates a new `PgIdentityDirectory`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    role: String,
    station_id: Option<Uuid>,
}

fn actor_from_row(user_id: Uuid, row: UserRow) -> Result<Actor, DomainError> {
    match (row.role.as_str(), row.station_id) {
        ("citizen", _) => Ok(Actor::Citizen { user_id }),
        ("ambulance_driver", _) => Ok(Actor::AmbulanceDriver { user_id }),
        ("fire_driver", _) => Ok(Actor::FireDriver { user_id }),
        ("police_officer", Some(station_id)) => Ok(Actor::PoliceOfficer {
            user_id,
            station_id,
        }),
        ("police_officer", None) => Err(DomainError::Infrastructure(format!(
            "police officer {user_id} has no station"
        ))),
        (other, _) => Err(DomainError::Infrastructure(format!(
            "user {user_id} has unknown role {other}"
        ))),
    }
}

#[async_trait]
impl IdentityDirectory for PgIdentityDirectory {
    async fn resolve(&self, user_id: Uuid) -> Result<Option<Actor>, DomainError> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT role, station_id FROM users WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(database_error)?;

        row.map(|row| actor_from_row(user_id, row)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(role: &str, station_id: Option<Uuid>) -> UserRow {
        UserRow {
            role: role.to_owned(),
            station_id,
        }
    }

    #[test]
    fn test_officer_row_carries_station() {
        let user_id = Uuid::new_v4();
        let station_id = Uuid::new_v4();

        let actor = actor_from_row(user_id, row("police_officer", Some(station_id))).unwrap();

        assert_eq!(
            actor,
            Actor::PoliceOfficer {
                user_id,
                station_id
            }
        );
    }

    #[test]
    fn test_officer_without_station_is_rejected() {
        let result = actor_from_row(Uuid::new_v4(), row("police_officer", None));

        assert!(matches!(result, Err(DomainError::Infrastructure(_))));
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let result = actor_from_row(Uuid::new_v4(), row("dispatcher", None));

        assert!(matches!(result, Err(DomainError::Infrastructure(_))));
    }
}
