// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed desk and agent directories.
//!
//! List-valued columns (`allowed_domains`, `apps`) hold JSON arrays.

use async_trait::async_trait;
use deskline_core::{
    AgentDirectory, AgentRecord, DeskConfig, DeskDirectory, DesklineError, DutyStatus, Role,
};
use rusqlite::{OptionalExtension, params};
use tracing::info;

use crate::database::{Database, map_tr_err};

/// Raw `agents` row before enum and JSON decoding.
struct AgentRow {
    username: String,
    role: String,
    status: String,
    active: bool,
    apps: String,
}

impl AgentRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            username: row.get(0)?,
            role: row.get(1)?,
            status: row.get(2)?,
            active: row.get(3)?,
            apps: row.get(4)?,
        })
    }

    fn decode(self) -> Result<AgentRecord, DesklineError> {
        let role = self.role.parse::<Role>().map_err(DesklineError::storage)?;
        let status = self
            .status
            .parse::<DutyStatus>()
            .map_err(DesklineError::storage)?;
        let apps = serde_json::from_str(&self.apps).map_err(DesklineError::storage)?;
        Ok(AgentRecord {
            username: self.username,
            role,
            status,
            active: self.active,
            apps,
        })
    }
}

/// Desk and agent tables in the relay database.
#[derive(Clone)]
pub struct SqliteDirectory {
    db: Database,
}

impl SqliteDirectory {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn upsert_desk(&self, desk: &DeskConfig) -> Result<(), DesklineError> {
        let desk = desk.clone();
        let domains = serde_json::to_string(&desk.allowed_domains).map_err(DesklineError::storage)?;
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO desks (app_id, name, logo, allowed_domains, welcome_msg, contact, enabled)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(app_id) DO UPDATE SET
                        name = excluded.name,
                        logo = excluded.logo,
                        allowed_domains = excluded.allowed_domains,
                        welcome_msg = excluded.welcome_msg,
                        contact = excluded.contact,
                        enabled = excluded.enabled,
                        updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                    params![
                        desk.app_id,
                        desk.name,
                        desk.logo,
                        domains,
                        desk.welcome_msg,
                        desk.contact,
                        desk.enabled,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    pub async fn upsert_agent(&self, agent: &AgentRecord) -> Result<(), DesklineError> {
        let username = agent.username.clone();
        let role = agent.role.as_ref().to_string();
        let status = agent.status.as_ref().to_string();
        let active = agent.active;
        let apps = serde_json::to_string(&agent.apps).map_err(DesklineError::storage)?;
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO agents (username, role, status, active, apps)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(username) DO UPDATE SET
                        role = excluded.role,
                        status = excluded.status,
                        active = excluded.active,
                        apps = excluded.apps,
                        updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                    params![username, role, status, active, apps],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Upserts every configured desk and agent. Existing rows not named in
    /// the lists are left untouched.
    pub async fn seed(
        &self,
        desks: &[DeskConfig],
        agents: &[AgentRecord],
    ) -> Result<(), DesklineError> {
        for desk in desks {
            self.upsert_desk(desk).await?;
        }
        for agent in agents {
            self.upsert_agent(agent).await?;
        }
        info!(desks = desks.len(), agents = agents.len(), "directory seeded");
        Ok(())
    }
}

#[async_trait]
impl DeskDirectory for SqliteDirectory {
    async fn desk(&self, app_id: &str) -> Result<Option<DeskConfig>, DesklineError> {
        let app_id = app_id.to_string();
        let row = self
            .db
            .connection()
            .call(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT app_id, name, logo, allowed_domains, welcome_msg, contact, enabled
                         FROM desks WHERE app_id = ?1",
                        params![app_id],
                        |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, String>(1)?,
                                row.get::<_, String>(2)?,
                                row.get::<_, String>(3)?,
                                row.get::<_, String>(4)?,
                                row.get::<_, String>(5)?,
                                row.get::<_, bool>(6)?,
                            ))
                        },
                    )
                    .optional()?;
                Ok(row)
            })
            .await
            .map_err(map_tr_err)?;

        let Some((app_id, name, logo, domains, welcome_msg, contact, enabled)) = row else {
            return Ok(None);
        };
        let allowed_domains = serde_json::from_str(&domains).map_err(DesklineError::storage)?;
        Ok(Some(DeskConfig {
            app_id,
            name,
            logo,
            allowed_domains,
            welcome_msg,
            contact,
            enabled,
        }))
    }
}

#[async_trait]
impl AgentDirectory for SqliteDirectory {
    async fn list_agents(
        &self,
        role: Role,
        status: DutyStatus,
        active: bool,
    ) -> Result<Vec<AgentRecord>, DesklineError> {
        let role = role.as_ref().to_string();
        let status = status.as_ref().to_string();
        let rows = self
            .db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT username, role, status, active, apps FROM agents
                     WHERE role = ?1 AND status = ?2 AND active = ?3
                     ORDER BY username",
                )?;
                let rows = stmt
                    .query_map(params![role, status, active], AgentRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(map_tr_err)?;
        rows.into_iter().map(AgentRow::decode).collect()
    }

    async fn agent(&self, username: &str) -> Result<Option<AgentRecord>, DesklineError> {
        let username = username.to_string();
        let row = self
            .db
            .connection()
            .call(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT username, role, status, active, apps FROM agents
                         WHERE username = ?1",
                        params![username],
                        AgentRow::from_row,
                    )
                    .optional()?;
                Ok(row)
            })
            .await
            .map_err(map_tr_err)?;
        row.map(AgentRow::decode).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup() -> (SqliteDirectory, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (SqliteDirectory::new(db), dir)
    }

    fn agent(name: &str, role: Role, status: DutyStatus, active: bool) -> AgentRecord {
        AgentRecord {
            username: name.into(),
            role,
            status,
            active,
            apps: vec!["shop1".into()],
        }
    }

    #[tokio::test]
    async fn desk_round_trip_and_update() {
        let (dir, _tmp) = setup().await;
        let mut desk = DeskConfig {
            app_id: "shop1".into(),
            name: "Shop One".into(),
            logo: String::new(),
            allowed_domains: vec!["shop.example.com".into(), "*.example.org".into()],
            welcome_msg: "Hi!".into(),
            contact: String::new(),
            enabled: true,
        };
        dir.upsert_desk(&desk).await.unwrap();
        assert_eq!(dir.desk("shop1").await.unwrap().unwrap(), desk);

        desk.enabled = false;
        dir.upsert_desk(&desk).await.unwrap();
        assert!(!dir.desk("shop1").await.unwrap().unwrap().enabled);
        assert!(dir.desk("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_agents_filters() {
        let (dir, _tmp) = setup().await;
        dir.seed(
            &[],
            &[
                agent("bob", Role::Agent, DutyStatus::OnDuty, true),
                agent("carol", Role::Agent, DutyStatus::Away, true),
                agent("dave", Role::Agent, DutyStatus::OnDuty, false),
                agent("root", Role::Admin, DutyStatus::OnDuty, true),
            ],
        )
        .await
        .unwrap();

        let on_duty = dir
            .list_agents(Role::Agent, DutyStatus::OnDuty, true)
            .await
            .unwrap();
        let names: Vec<_> = on_duty.iter().map(|a| a.username.as_str()).collect();
        assert_eq!(names, ["bob"]);

        let carol = dir.agent("carol").await.unwrap().unwrap();
        assert_eq!(carol.status, DutyStatus::Away);
        assert_eq!(carol.apps, vec!["shop1".to_string()]);
        assert!(dir.agent("nobody").await.unwrap().is_none());
    }
}
