use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;

use crate::error::{AccountError, AccountResult};
use crate::users::query::{ReadOp, UserFilter, UserPatch};
use crate::users::repo_types::{User, UserRow};

/// Persistence for user records.
///
/// `insert` and `update` write one record by id. Every other method is a
/// [`ReadOp`] and must honour the filter's visibility scope and password
/// selection. Every write bumps `version`.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: &User) -> AccountResult<()>;
    /// Overwrites the record if its stored version still equals
    /// `user.version`, otherwise fails with [`AccountError::WriteConflict`].
    /// A `None` password keeps the stored hash.
    async fn update(&self, user: &User) -> AccountResult<()>;
    async fn find_one(&self, filter: &UserFilter) -> AccountResult<Option<User>>;
    async fn find_many(&self, filter: &UserFilter) -> AccountResult<Vec<User>>;
    async fn count(&self, filter: &UserFilter) -> AccountResult<i64>;
    async fn update_many(&self, filter: &UserFilter, patch: &UserPatch) -> AccountResult<u64>;
}

const SELECT_WITH_PASSWORD: &str = r#"
    SELECT id, name, last_name, email, career, semester, photo, role, password, active,
           password_changed_at, password_reset_token, password_reset_expires, created_at,
           version
    FROM users"#;

const SELECT_WITHOUT_PASSWORD: &str = r#"
    SELECT id, name, last_name, email, career, semester, photo, role, NULL::text AS password,
           active, password_changed_at, password_reset_token, password_reset_expires, created_at,
           version
    FROM users"#;

fn push_conditions(qb: &mut QueryBuilder<'_, Postgres>, filter: &UserFilter, op: ReadOp) {
    qb.push(" WHERE TRUE");
    if filter.visibility_applies(op) {
        qb.push(" AND active IS DISTINCT FROM FALSE");
    }
    if let Some(id) = filter.id() {
        qb.push(" AND id = ").push_bind(id);
    }
    if let Some(email) = filter.email() {
        qb.push(" AND lower(email) = ").push_bind(email.to_owned());
    }
    if let Some(digest) = filter.reset_token() {
        qb.push(" AND password_reset_token = ").push_bind(digest.to_owned());
    }
    if let Some(role) = filter.role() {
        qb.push(" AND role = ").push_bind(role.as_str());
    }
}

fn select(filter: &UserFilter, op: ReadOp) -> QueryBuilder<'static, Postgres> {
    let base = if filter.selects_password() {
        SELECT_WITH_PASSWORD
    } else {
        SELECT_WITHOUT_PASSWORD
    };
    let mut qb = QueryBuilder::new(base);
    push_conditions(&mut qb, filter, op);
    qb
}

fn write_error(e: sqlx::Error, what: &'static str) -> AccountError {
    match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AccountError::Conflict { field: "email" }
        }
        other => AccountError::Store(anyhow::Error::new(other).context(what)),
    }
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: &User) -> AccountResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, last_name, email, career, semester, photo, role,
                               password, active, password_changed_at, password_reset_token,
                               password_reset_expires, created_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.career)
        .bind(user.semester)
        .bind(&user.photo)
        .bind(user.role.as_str())
        .bind(&user.password)
        .bind(user.active)
        .bind(user.password_changed_at)
        .bind(&user.password_reset_token)
        .bind(user.password_reset_expires)
        .bind(user.created_at)
        .bind(user.version)
        .execute(&self.db)
        .await
        .map_err(|e| write_error(e, "insert user"))?;
        debug!(user_id = %user.id, "user inserted");
        Ok(())
    }

    async fn update(&self, user: &User) -> AccountResult<()> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET name = $2, last_name = $3, email = $4, career = $5, semester = $6,
                   photo = $7, role = $8, password = COALESCE($9, password), active = $10,
                   password_changed_at = $11, password_reset_token = $12,
                   password_reset_expires = $13, version = version + 1
             WHERE id = $1 AND version = $14
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.career)
        .bind(user.semester)
        .bind(&user.photo)
        .bind(user.role.as_str())
        .bind(&user.password)
        .bind(user.active)
        .bind(user.password_changed_at)
        .bind(&user.password_reset_token)
        .bind(user.password_reset_expires)
        .bind(user.version)
        .execute(&self.db)
        .await
        .map_err(|e| write_error(e, "update user"))?;

        if res.rows_affected() == 0 {
            let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
                .bind(user.id)
                .fetch_one(&self.db)
                .await
                .context("check user exists")?;
            return Err(if exists {
                debug!(user_id = %user.id, version = user.version, "stale user write");
                AccountError::WriteConflict
            } else {
                AccountError::NotFound
            });
        }
        Ok(())
    }

    async fn find_one(&self, filter: &UserFilter) -> AccountResult<Option<User>> {
        let mut qb = select(filter, ReadOp::FindOne);
        qb.push(" LIMIT 1");
        let row = qb
            .build_query_as::<UserRow>()
            .fetch_optional(&self.db)
            .await
            .context("find user")?;
        Ok(row.map(User::try_from).transpose()?)
    }

    async fn find_many(&self, filter: &UserFilter) -> AccountResult<Vec<User>> {
        let mut qb = select(filter, ReadOp::FindMany);
        qb.push(" ORDER BY created_at ASC");
        let rows = qb
            .build_query_as::<UserRow>()
            .fetch_all(&self.db)
            .await
            .context("list users")?;
        let users = rows
            .into_iter()
            .map(User::try_from)
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(users)
    }

    async fn count(&self, filter: &UserFilter) -> AccountResult<i64> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM users");
        push_conditions(&mut qb, filter, ReadOp::Count);
        let n = qb
            .build_query_scalar::<i64>()
            .fetch_one(&self.db)
            .await
            .context("count users")?;
        Ok(n)
    }

    async fn update_many(&self, filter: &UserFilter, patch: &UserPatch) -> AccountResult<u64> {
        if patch.is_empty() {
            return Ok(0);
        }
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE users SET ");
        {
            let mut set = qb.separated(", ");
            if let Some(active) = patch.active {
                set.push("active = ").push_bind_unseparated(active);
            }
            if let Some(role) = patch.role {
                set.push("role = ").push_bind_unseparated(role.as_str());
            }
            set.push("version = version + 1");
        }
        push_conditions(&mut qb, filter, ReadOp::UpdateMany);
        let res = qb
            .build()
            .execute(&self.db)
            .await
            .map_err(|e| write_error(e, "update users"))?;
        Ok(res.rows_affected())
    }
}
