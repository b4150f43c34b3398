//! Scouter accounts, scores, badges and certificates

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::UserStoreError;
use crate::ingest::ScoreLedger;

/// Version of the JSON stored in `users.badges`
pub const BADGE_SCHEMA_VERSION: i64 = 1;

/// Badges granted automatically when the lifetime score reaches a threshold
pub const MILESTONES: [(i64, &str); 5] = [
    (1, "Rookie"),
    (10, "Novice"),
    (50, "Scouter"),
    (100, "Pro"),
    (500, "Enthusiast"),
];

type Result<T> = std::result::Result<T, UserStoreError>;

/// Authorization level attached to a certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Scouter,
    Admin,
    Super,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Scouter => "scouter",
            Role::Admin => "admin",
            Role::Super => "super",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::Super)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UserStoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "scouter" => Ok(Role::Scouter),
            "admin" => Ok(Role::Admin),
            "super" => Ok(Role::Super),
            other => Err(UserStoreError::UnknownRole(other.to_string())),
        }
    }
}

/// How a score modification applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreChange {
    Increase,
    Decrease,
    /// Replace the current score; lifetime score is unchanged
    Set,
}

/// Leaderboard ordering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaderboardKind {
    #[default]
    Score,
    Life,
    High,
}

impl LeaderboardKind {
    fn column(&self) -> &'static str {
        match self {
            LeaderboardKind::Score => "score",
            LeaderboardKind::Life => "life_score",
            LeaderboardKind::High => "high_score",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Description", default)]
    pub description: String,
}

impl Badge {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
        }
    }
}

/// Public view of one user
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserInfo {
    pub username: String,
    pub display_name: String,
    pub score: i64,
    pub life_score: i64,
    pub high_score: i64,
    pub badges: Vec<Badge>,
}

type UserRow = (String, String, i64, i64, i64, String, i64);

const USER_COLUMNS: &str =
    "username, display_name, score, life_score, high_score, badges, badge_schema";

fn decode_badges(username: &str, schema: i64, raw: &str) -> Result<Vec<Badge>> {
    if schema != BADGE_SCHEMA_VERSION {
        return Err(UserStoreError::BadgeSchema {
            username: username.to_string(),
            found: schema,
            expected: BADGE_SCHEMA_VERSION,
        });
    }
    serde_json::from_str(raw).map_err(|source| UserStoreError::BadgeDecode {
        username: username.to_string(),
        source,
    })
}

fn user_info_from_row(row: UserRow) -> Result<UserInfo> {
    let (username, display_name, score, life_score, high_score, badges, schema) = row;
    let badges = decode_badges(&username, schema, &badges)?;
    Ok(UserInfo {
        username,
        display_name,
        score,
        life_score,
        high_score,
        badges,
    })
}

/// SQLite-backed user store
#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// UUID of `username`, creating the user on first sight
    pub async fn ensure_user(&self, username: &str) -> Result<Uuid> {
        let existing: Option<String> = sqlx::query_scalar("SELECT uuid FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(uuid) = existing {
            if let Ok(uuid) = Uuid::parse_str(&uuid) {
                return Ok(uuid);
            }
        }

        let uuid = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO users (uuid, username, display_name, badges, badge_schema)
             VALUES (?, ?, ?, '[]', ?)
             ON CONFLICT(username) DO NOTHING",
        )
        .bind(uuid.to_string())
        .bind(username)
        .bind(username)
        .bind(BADGE_SCHEMA_VERSION)
        .execute(&self.pool)
        .await?;

        let stored: String = sqlx::query_scalar("SELECT uuid FROM users WHERE username = ?")
            .bind(username)
            .fetch_one(&self.pool)
            .await?;
        info!(username = %username, "Created user");
        Ok(Uuid::parse_str(&stored).unwrap_or(uuid))
    }

    pub async fn user_info(&self, username: &str) -> Result<UserInfo> {
        let query = format!("SELECT {} FROM users WHERE username = ?", USER_COLUMNS);
        let row: Option<UserRow> = sqlx::query_as(&query)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => user_info_from_row(row),
            None => Err(UserStoreError::UserNotFound(username.to_string())),
        }
    }

    /// Apply a score change, then raise the high score and grant any
    /// milestone badges the new lifetime score has earned
    pub async fn modify_score(&self, username: &str, change: ScoreChange, by: i64) -> Result<UserInfo> {
        self.ensure_user(username).await?;

        let mut tx = self.pool.begin().await?;
        let update = match change {
            ScoreChange::Increase => {
                "UPDATE users SET score = score + ?1, life_score = life_score + ?1 WHERE username = ?2"
            }
            ScoreChange::Decrease => {
                "UPDATE users SET score = score - ?1, life_score = life_score - ?1 WHERE username = ?2"
            }
            ScoreChange::Set => "UPDATE users SET score = ?1 WHERE username = ?2",
        };
        sqlx::query(update)
            .bind(by)
            .bind(username)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE users SET high_score = score WHERE username = ? AND score > high_score")
            .bind(username)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!(username = %username, change = ?change, by, "Modified score");

        let info = self.user_info(username).await?;
        let mut granted = false;
        for (threshold, name) in MILESTONES {
            if info.life_score >= threshold {
                let badge = Badge::new(name, format!("Lifetime score of {}", threshold));
                granted |= self.add_badge(username, badge).await?;
            }
        }

        if granted {
            self.user_info(username).await
        } else {
            Ok(info)
        }
    }

    /// Add a badge unless one with the same id is already held
    ///
    /// Returns whether the badge was added.
    pub async fn add_badge(&self, username: &str, badge: Badge) -> Result<bool> {
        self.ensure_user(username).await?;

        let mut tx = self.pool.begin().await?;
        let (raw, schema): (String, i64) =
            sqlx::query_as("SELECT badges, badge_schema FROM users WHERE username = ?")
                .bind(username)
                .fetch_one(&mut *tx)
                .await?;

        let mut badges = decode_badges(username, schema, &raw)?;
        if badges.iter().any(|b| b.id == badge.id) {
            return Ok(false);
        }

        info!(username = %username, badge = %badge.id, "Granted badge");
        badges.push(badge);
        let encoded = serde_json::to_string(&badges).map_err(|source| UserStoreError::BadgeDecode {
            username: username.to_string(),
            source,
        })?;

        sqlx::query("UPDATE users SET badges = ?, badge_schema = ? WHERE username = ?")
            .bind(encoded)
            .bind(BADGE_SCHEMA_VERSION)
            .bind(username)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    pub async fn leaderboard(&self, kind: LeaderboardKind) -> Result<Vec<UserInfo>> {
        let query = format!(
            "SELECT {} FROM users ORDER BY {} DESC, username ASC",
            USER_COLUMNS,
            kind.column()
        );
        let rows: Vec<UserRow> = sqlx::query_as(&query).fetch_all(&self.pool).await?;
        rows.into_iter().map(user_info_from_row).collect()
    }

    /// Issue a new certificate for `username`
    pub async fn issue_certificate(&self, username: &str, role: Role) -> Result<String> {
        self.ensure_user(username).await?;

        let certificate = Uuid::new_v4().simple().to_string();
        sqlx::query(
            "INSERT INTO certificates (certificate, username, role, issued_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&certificate)
        .bind(username)
        .bind(role.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        info!(username = %username, role = %role, "Issued certificate");
        Ok(certificate)
    }

    /// Role granted by `certificate`, `None` when unknown
    pub async fn verify_certificate(&self, certificate: &str) -> Result<Option<Role>> {
        let role: Option<String> = sqlx::query_scalar("SELECT role FROM certificates WHERE certificate = ?")
            .bind(certificate)
            .fetch_optional(&self.pool)
            .await?;

        role.map(|r| r.parse()).transpose()
    }
}

#[async_trait]
impl ScoreLedger for UserStore {
    async fn credit(&self, scouter: &str, points: i64) -> Result<()> {
        self.modify_score(scouter, ScoreChange::Increase, points).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_in_memory_pool;

    async fn store() -> UserStore {
        UserStore::new(init_in_memory_pool().await.unwrap())
    }

    #[tokio::test]
    async fn test_ensure_user_is_stable() {
        let store = store().await;
        let first = store.ensure_user("ada").await.unwrap();
        let second = store.ensure_user("ada").await.unwrap();
        assert_eq!(first, second);

        let info = store.user_info("ada").await.unwrap();
        assert_eq!(info.display_name, "ada");
        assert_eq!(info.score, 0);
        assert!(info.badges.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let store = store().await;
        assert!(matches!(
            store.user_info("ghost").await,
            Err(UserStoreError::UserNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_increase_moves_life_and_high_score() {
        let store = store().await;
        store.modify_score("ada", ScoreChange::Increase, 5).await.unwrap();
        let info = store.modify_score("ada", ScoreChange::Decrease, 2).await.unwrap();

        assert_eq!(info.score, 3);
        assert_eq!(info.life_score, 3);
        assert_eq!(info.high_score, 5);
    }

    #[tokio::test]
    async fn test_set_leaves_life_score() {
        let store = store().await;
        store.modify_score("ada", ScoreChange::Increase, 4).await.unwrap();
        let info = store.modify_score("ada", ScoreChange::Set, 20).await.unwrap();

        assert_eq!(info.score, 20);
        assert_eq!(info.life_score, 4);
        assert_eq!(info.high_score, 20);
    }

    #[tokio::test]
    async fn test_milestone_badges() {
        let store = store().await;
        let info = store.modify_score("ada", ScoreChange::Increase, 10).await.unwrap();
        let ids: Vec<&str> = info.badges.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["Rookie", "Novice"]);

        let info = store.modify_score("ada", ScoreChange::Increase, 1).await.unwrap();
        assert_eq!(info.badges.len(), 2);
    }

    #[tokio::test]
    async fn test_add_badge_is_idempotent() {
        let store = store().await;
        assert!(store.add_badge("ada", Badge::new("Helper", "Helped")).await.unwrap());
        assert!(!store.add_badge("ada", Badge::new("Helper", "Again")).await.unwrap());

        let info = store.user_info("ada").await.unwrap();
        assert_eq!(info.badges, vec![Badge::new("Helper", "Helped")]);
    }

    #[tokio::test]
    async fn test_badge_schema_mismatch_is_error() {
        let store = store().await;
        store.ensure_user("ada").await.unwrap();
        sqlx::query("UPDATE users SET badge_schema = 99 WHERE username = 'ada'")
            .execute(&store.pool)
            .await
            .unwrap();

        assert!(matches!(
            store.user_info("ada").await,
            Err(UserStoreError::BadgeSchema { found: 99, .. })
        ));
    }

    #[tokio::test]
    async fn test_leaderboard_orders() {
        let store = store().await;
        store.modify_score("ada", ScoreChange::Increase, 5).await.unwrap();
        store.modify_score("bo", ScoreChange::Increase, 8).await.unwrap();
        store.modify_score("bo", ScoreChange::Set, 1).await.unwrap();

        let by_score: Vec<String> = store
            .leaderboard(LeaderboardKind::Score)
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(by_score, vec!["ada", "bo"]);

        let by_life: Vec<String> = store
            .leaderboard(LeaderboardKind::Life)
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(by_life, vec!["bo", "ada"]);
    }

    #[tokio::test]
    async fn test_certificates() {
        let store = store().await;
        let cert = store.issue_certificate("ada", Role::Admin).await.unwrap();

        assert_eq!(store.verify_certificate(&cert).await.unwrap(), Some(Role::Admin));
        assert_eq!(store.verify_certificate("bogus").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ledger_credit() {
        let store = store().await;
        store.credit("ada", 1).await.unwrap();
        assert_eq!(store.user_info("ada").await.unwrap().score, 1);
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert!("guest".parse::<Role>().is_err());
        assert!(Role::Super.is_admin());
        assert!(!Role::Scouter.is_admin());
    }
}
