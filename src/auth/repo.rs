use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    auth::repo_types::{NewUser, ProfileChanges, User, UserRow},
    db::{map_db_error, PgStore},
    error::StoreResult,
};

/// Persistent storage for accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new account. Email, phone, license and one-time code are unique.
    async fn create(&self, user: NewUser) -> StoreResult<User>;

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Whether a passenger already holds this one-time code.
    async fn code_taken(&self, code: i32) -> StoreResult<bool>;

    /// Apply the given changes and return the updated account, or `None`
    /// when no account has this id.
    async fn update_profile(&self, id: Uuid, changes: ProfileChanges)
        -> StoreResult<Option<User>>;
}

const USER_COLUMNS: &str =
    "id, name, email, phone, password_hash, role, license, otp, created_at, updated_at";

#[async_trait]
impl UserStore for PgStore {
    async fn create(&self, user: NewUser) -> StoreResult<User> {
        let role = user.kind.role();
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (id, name, email, phone, password_hash, role, license, otp)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.password_hash)
        .bind(role)
        .bind(user.kind.license())
        .bind(user.kind.one_time_code())
        .fetch_one(&self.db)
        .await
        .map_err(map_db_error)?;
        row.try_into()
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(map_db_error)?;
        row.map(User::try_from).transpose()
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .map_err(map_db_error)?;
        row.map(User::try_from).transpose()
    }

    async fn code_taken(&self, code: i32) -> StoreResult<bool> {
        let taken: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE otp = $1)")
                .bind(code)
                .fetch_one(&self.db)
                .await
                .map_err(map_db_error)?;
        Ok(taken)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        changes: ProfileChanges,
    ) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
               SET name = COALESCE($2, name),
                   password_hash = COALESCE($3, password_hash),
                   license = CASE WHEN role = 'rider' THEN COALESCE($4, license) ELSE license END,
                   updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(changes.name)
        .bind(changes.password_hash)
        .bind(changes.license)
        .fetch_optional(&self.db)
        .await
        .map_err(map_db_error)?;
        row.map(User::try_from).transpose()
    }
}
