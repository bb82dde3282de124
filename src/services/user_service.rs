use serde::Deserialize;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{info, warn};
use uuid::Uuid;

use super::{conflict_on_unique, ensure, ServiceError};
use crate::auth::permissions::{self, Actor};
use crate::auth::{hash_password, verify_missing_account, verify_password};
use crate::database::manager::DatabaseManager;
use crate::database::models::user::{User, USER_COLUMNS};
use crate::database::pagination::{Page, PageQuery, SortDirection, SortSpec};
use crate::types::Role;
use crate::validation::{clean_optional, contains_pattern, normalize_email, patch_optional, Validator};

const USER_SORT: SortSpec = SortSpec {
    fields: &[("created_at", "created_at"), ("email", "email"), ("name", "name"), ("role", "role")],
    default_column: "created_at",
    default_direction: SortDirection::Desc,
};

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub name: String,
    pub role: Option<Role>,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub title: Option<String>,
    pub avatar_url: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

/// Fields a user may change on their own account
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub title: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub q: Option<String>,
}

pub struct UserService {
    pool: PgPool,
}

impl UserService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect() -> Result<Self, ServiceError> {
        Ok(Self::new(DatabaseManager::pool().await?))
    }

    /// Self-registration always yields a buyer account
    pub async fn register(&self, mut input: NewUser) -> Result<User, ServiceError> {
        input.role = Some(Role::Buyer);
        self.insert(input).await
    }

    /// Admin-side account creation with an explicit role
    pub async fn create(&self, actor: &Actor, input: NewUser) -> Result<User, ServiceError> {
        ensure(permissions::can_manage_users(actor), "create users")?;
        let user = self.insert(input).await?;
        info!("User {} created {} account {}", actor.id, user.role, user.email);
        Ok(user)
    }

    /// Create a user without a permission check (CLI bootstrap)
    pub async fn insert(&self, input: NewUser) -> Result<User, ServiceError> {
        let email = normalize_email(&input.email);
        let name = input.name.trim().to_string();
        Validator::new()
            .email("email", &email)
            .password("password", &input.password)
            .required("name", &name)
            .max_len("name", &name, 200)
            .finish()?;

        let password_hash = hash_password(&input.password)?;
        let role = input.role.unwrap_or(Role::Buyer);

        let sql = format!(
            "INSERT INTO users (id, email, password_hash, role, name, company, phone, title)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {}",
            USER_COLUMNS
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(&email)
            .bind(&password_hash)
            .bind(role.as_str())
            .bind(&name)
            .bind(clean_optional(input.company))
            .bind(clean_optional(input.phone))
            .bind(clean_optional(input.title))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| conflict_on_unique(e, "A user with this email already exists"))
    }

    /// Check credentials; every failure looks the same to the caller
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User, ServiceError> {
        let email = normalize_email(email);
        let denied = || ServiceError::Unauthorized("Invalid email or password".to_string());

        let user = match self.find_by_email(&email).await? {
            Some(user) => user,
            None => {
                verify_missing_account(password);
                warn!("Login failed: unknown email {}", email);
                return Err(denied());
            }
        };

        if !verify_password(password, &user.password_hash) {
            warn!("Login failed: bad password for {}", email);
            return Err(denied());
        }
        if !user.is_active {
            warn!("Login failed: inactive account {}", email);
            return Err(denied());
        }

        info!("User {} logged in", user.email);
        Ok(user)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, ServiceError> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        Ok(sqlx::query_as::<_, User>(&sql).bind(id).fetch_optional(&self.pool).await?)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        let sql = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(normalize_email(email))
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn require(&self, id: Uuid) -> Result<User, ServiceError> {
        self.find_by_id(id).await?.ok_or_else(|| ServiceError::not_found("User"))
    }

    pub async fn get(&self, actor: &Actor, id: Uuid) -> Result<User, ServiceError> {
        ensure(permissions::can_view_user(actor, id), "view this user")?;
        self.require(id).await
    }

    pub async fn list(&self, actor: &Actor, filter: &UserFilter, page: &PageQuery) -> Result<Page<User>, ServiceError> {
        ensure(permissions::can_manage_users(actor), "list users")?;
        let pagination = page.resolve(&USER_SORT)?;

        let push_filters = |builder: &mut QueryBuilder<'_, Postgres>| {
            builder.push(" WHERE 1=1");
            if let Some(role) = filter.role {
                builder.push(" AND role = ").push_bind(role.as_str());
            }
            if let Some(q) = filter.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
                let pattern = contains_pattern(q);
                builder.push(" AND (email ILIKE ").push_bind(pattern.clone());
                builder.push(" OR name ILIKE ").push_bind(pattern);
                builder.push(")");
            }
        };

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users");
        push_filters(&mut count);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM users", USER_COLUMNS));
        push_filters(&mut select);
        pagination.push_to(&mut select);
        let users = select.build_query_as::<User>().fetch_all(&self.pool).await?;

        Ok(Page::new(users, total, &pagination))
    }

    pub async fn update(&self, actor: &Actor, id: Uuid, update: UserUpdate) -> Result<User, ServiceError> {
        ensure(permissions::can_manage_users(actor), "update users")?;
        let mut user = self.require(id).await?;

        if actor.id == id {
            if matches!(update.role, Some(role) if role != user.role) {
                return Err(ServiceError::Conflict("You cannot change your own role".to_string()));
            }
            if update.is_active == Some(false) {
                return Err(ServiceError::Conflict("You cannot deactivate your own account".to_string()));
            }
        }

        if let Some(role) = update.role {
            user.role = role;
        }
        if let Some(is_active) = update.is_active {
            user.is_active = is_active;
        }
        self.apply_profile(
            &mut user,
            ProfileUpdate {
                name: update.name,
                company: update.company,
                phone: update.phone,
                title: update.title,
                avatar_url: update.avatar_url,
            },
        )?;

        let saved = self.save(&user).await?;
        info!("User {} updated account {}", actor.id, saved.email);
        Ok(saved)
    }

    pub async fn update_profile(&self, actor: &Actor, update: ProfileUpdate) -> Result<User, ServiceError> {
        let mut user = self.require(actor.id).await?;
        self.apply_profile(&mut user, update)?;
        self.save(&user).await
    }

    fn apply_profile(&self, user: &mut User, update: ProfileUpdate) -> Result<(), ServiceError> {
        if let Some(name) = update.name {
            user.name = name.trim().to_string();
        }
        patch_optional(&mut user.company, update.company);
        patch_optional(&mut user.phone, update.phone);
        patch_optional(&mut user.title, update.title);
        patch_optional(&mut user.avatar_url, update.avatar_url);

        Validator::new()
            .required("name", &user.name)
            .max_len("name", &user.name, 200)
            .optional_url("avatar_url", user.avatar_url.as_deref())
            .finish()?;
        Ok(())
    }

    async fn save(&self, user: &User) -> Result<User, ServiceError> {
        let sql = format!(
            "UPDATE users
             SET role = $2, name = $3, company = $4, phone = $5, title = $6, avatar_url = $7,
                 is_active = $8, updated_at = now()
             WHERE id = $1
             RETURNING {}",
            USER_COLUMNS
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(user.id)
            .bind(user.role.as_str())
            .bind(&user.name)
            .bind(&user.company)
            .bind(&user.phone)
            .bind(&user.title)
            .bind(&user.avatar_url)
            .bind(user.is_active)
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn change_password(&self, actor: &Actor, current: &str, new_password: &str) -> Result<(), ServiceError> {
        let user = self.require(actor.id).await?;
        if !verify_password(current, &user.password_hash) {
            return Err(ServiceError::Unauthorized("Current password is incorrect".to_string()));
        }
        Validator::new().password("new_password", new_password).finish()?;
        self.set_password(user.id, new_password).await?;
        info!("User {} changed password", user.email);
        Ok(())
    }

    pub async fn set_password(&self, id: Uuid, password: &str) -> Result<(), ServiceError> {
        let hash = hash_password(password)?;
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, actor: &Actor, id: Uuid) -> Result<(), ServiceError> {
        ensure(permissions::can_manage_users(actor), "delete users")?;
        if actor.id == id {
            return Err(ServiceError::Conflict("You cannot delete your own account".to_string()));
        }

        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("User"));
        }
        info!("User {} deleted account {}", actor.id, id);
        Ok(())
    }

    /// Role and active flag by email (CLI)
    pub async fn set_role_and_status(&self, email: &str, role: Option<Role>, is_active: Option<bool>) -> Result<User, ServiceError> {
        let mut user = self
            .find_by_email(email)
            .await?
            .ok_or_else(|| ServiceError::not_found("User"))?;
        if let Some(role) = role {
            user.role = role;
        }
        if let Some(is_active) = is_active {
            user.is_active = is_active;
        }
        self.save(&user).await
    }

    pub async fn list_all(&self) -> Result<Vec<User>, ServiceError> {
        let sql = format!("SELECT {} FROM users ORDER BY created_at", USER_COLUMNS);
        Ok(sqlx::query_as::<_, User>(&sql).fetch_all(&self.pool).await?)
    }
}
