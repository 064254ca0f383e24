//! Postgres-backed store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use super::{RefreshTokenRepo, SacramentRepo, Store, StoreResult, StoreTx, UserRepo};
use crate::lineage::SacramentKind;
use crate::models::{
    BaptismDetails, CommunionDetails, ConfirmationDetails, HolyOrderDetails, Lineage,
    MarriageDetails, NewRefreshToken, NewSacrament, NewUser, RefreshToken, SacramentDetails,
    SacramentRecord, User,
};

/// Store backed by a Postgres connection pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

const USER_COLUMNS: &str = "id, username, password_hash, display_name, role, created_at";

#[async_trait]
impl UserRepo for PgTx {
    async fn find_user_by_username(&mut self, username: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM app_users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(user)
    }

    async fn find_user_by_id(&mut self, id: i64) -> StoreResult<Option<User>> {
        let user = sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM app_users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(user)
    }

    async fn insert_user(&mut self, user: NewUser) -> StoreResult<User> {
        let user = sqlx::query_as(&format!(
            r#"
            INSERT INTO app_users (username, password_hash, display_name, role)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.display_name)
        .bind(&user.role)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(user)
    }
}

#[async_trait]
impl RefreshTokenRepo for PgTx {
    async fn find_refresh_token_for_update(
        &mut self,
        token_hash: &str,
    ) -> StoreResult<Option<RefreshToken>> {
        let token = sqlx::query_as(
            r#"
            SELECT id, user_id, token_hash, issued_at, expires_at
            FROM refresh_tokens
            WHERE token_hash = $1
            FOR UPDATE
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(token)
    }

    async fn insert_refresh_token(&mut self, token: NewRefreshToken) -> StoreResult<RefreshToken> {
        let token = sqlx::query_as(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, issued_at, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, token_hash, issued_at, expires_at
            "#,
        )
        .bind(token.user_id)
        .bind(&token.token_hash)
        .bind(token.issued_at)
        .bind(token.expires_at)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(token)
    }

    async fn delete_refresh_token(&mut self, token_hash: &str) -> StoreResult<u64> {
        let rows_affected = sqlx::query("DELETE FROM refresh_tokens WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&mut *self.tx)
            .await?
            .rows_affected();
        Ok(rows_affected)
    }

    async fn delete_refresh_tokens_for_user(&mut self, user_id: i64) -> StoreResult<u64> {
        let rows_affected = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *self.tx)
            .await?
            .rows_affected();
        Ok(rows_affected)
    }

    async fn delete_refresh_tokens_expired_before(
        &mut self,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let rows_affected = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < $1")
            .bind(cutoff)
            .execute(&mut *self.tx)
            .await?
            .rows_affected();
        Ok(rows_affected)
    }
}

// ============================================================================
// Sacrament tables
// ============================================================================

#[derive(sqlx::FromRow)]
struct BaptismRow {
    id: i64,
    #[sqlx(flatten)]
    details: BaptismDetails,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct CommunionRow {
    id: i64,
    baptism_id: i64,
    #[sqlx(flatten)]
    details: CommunionDetails,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ConfirmationRow {
    id: i64,
    baptism_id: i64,
    communion_id: i64,
    #[sqlx(flatten)]
    details: ConfirmationDetails,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct MarriageRow {
    id: i64,
    baptism_id: i64,
    communion_id: i64,
    confirmation_id: i64,
    #[sqlx(flatten)]
    details: MarriageDetails,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct HolyOrderRow {
    id: i64,
    baptism_id: i64,
    communion_id: i64,
    confirmation_id: i64,
    #[sqlx(flatten)]
    details: HolyOrderDetails,
    created_at: DateTime<Utc>,
}

impl From<BaptismRow> for SacramentRecord {
    fn from(row: BaptismRow) -> Self {
        SacramentRecord {
            id: row.id,
            lineage: Lineage::default(),
            details: SacramentDetails::Baptism(row.details),
            created_at: row.created_at,
        }
    }
}

impl From<CommunionRow> for SacramentRecord {
    fn from(row: CommunionRow) -> Self {
        SacramentRecord {
            id: row.id,
            lineage: Lineage {
                baptism_id: Some(row.baptism_id),
                ..Lineage::default()
            },
            details: SacramentDetails::FirstHolyCommunion(row.details),
            created_at: row.created_at,
        }
    }
}

impl From<ConfirmationRow> for SacramentRecord {
    fn from(row: ConfirmationRow) -> Self {
        SacramentRecord {
            id: row.id,
            lineage: Lineage {
                baptism_id: Some(row.baptism_id),
                communion_id: Some(row.communion_id),
                confirmation_id: None,
            },
            details: SacramentDetails::Confirmation(row.details),
            created_at: row.created_at,
        }
    }
}

impl From<MarriageRow> for SacramentRecord {
    fn from(row: MarriageRow) -> Self {
        SacramentRecord {
            id: row.id,
            lineage: Lineage {
                baptism_id: Some(row.baptism_id),
                communion_id: Some(row.communion_id),
                confirmation_id: Some(row.confirmation_id),
            },
            details: SacramentDetails::Marriage(row.details),
            created_at: row.created_at,
        }
    }
}

impl From<HolyOrderRow> for SacramentRecord {
    fn from(row: HolyOrderRow) -> Self {
        SacramentRecord {
            id: row.id,
            lineage: Lineage {
                baptism_id: Some(row.baptism_id),
                communion_id: Some(row.communion_id),
                confirmation_id: Some(row.confirmation_id),
            },
            details: SacramentDetails::HolyOrder(row.details),
            created_at: row.created_at,
        }
    }
}

const BAPTISM_COLUMNS: &str = "id, baptism_name, surname, gender, date_of_birth, fathers_name, \
     mothers_name, sponsor_names, parish_id, address, parish_address, parent_address, created_at";
const COMMUNION_COLUMNS: &str =
    "id, baptism_id, communion_date, officiating_priest, parish, created_at";
const CONFIRMATION_COLUMNS: &str =
    "id, baptism_id, communion_id, confirmation_date, officiating_bishop, parish, created_at";
const MARRIAGE_COLUMNS: &str = "id, baptism_id, communion_id, confirmation_id, partners_name, \
     marriage_date, officiating_priest, parish, created_at";
const HOLY_ORDER_COLUMNS: &str = "id, baptism_id, communion_id, confirmation_id, \
     ordination_date, order_type, officiating_bishop, parish_id, created_at";

fn table_of(kind: SacramentKind) -> (&'static str, &'static str) {
    match kind {
        SacramentKind::Baptism => ("baptisms", BAPTISM_COLUMNS),
        SacramentKind::FirstHolyCommunion => ("first_holy_communions", COMMUNION_COLUMNS),
        SacramentKind::Confirmation => ("confirmations", CONFIRMATION_COLUMNS),
        SacramentKind::Marriage => ("marriages", MARRIAGE_COLUMNS),
        SacramentKind::HolyOrder => ("holy_orders", HOLY_ORDER_COLUMNS),
    }
}

/// Column referencing the predecessor, for kinds that have one
fn predecessor_column(kind: SacramentKind) -> Option<&'static str> {
    match kind.rule().predecessor? {
        SacramentKind::Baptism => Some("baptism_id"),
        SacramentKind::FirstHolyCommunion => Some("communion_id"),
        SacramentKind::Confirmation => Some("confirmation_id"),
        SacramentKind::Marriage | SacramentKind::HolyOrder => None,
    }
}

impl PgTx {
    /// Runs `sql` (one bind: `id`) against the table of `kind`.
    async fn fetch_one_of(
        &mut self,
        kind: SacramentKind,
        sql: &str,
        id: i64,
    ) -> StoreResult<Option<SacramentRecord>> {
        let conn = &mut *self.tx;
        let record = match kind {
            SacramentKind::Baptism => sqlx::query_as::<_, BaptismRow>(sql)
                .bind(id)
                .fetch_optional(conn)
                .await?
                .map(SacramentRecord::from),
            SacramentKind::FirstHolyCommunion => sqlx::query_as::<_, CommunionRow>(sql)
                .bind(id)
                .fetch_optional(conn)
                .await?
                .map(SacramentRecord::from),
            SacramentKind::Confirmation => sqlx::query_as::<_, ConfirmationRow>(sql)
                .bind(id)
                .fetch_optional(conn)
                .await?
                .map(SacramentRecord::from),
            SacramentKind::Marriage => sqlx::query_as::<_, MarriageRow>(sql)
                .bind(id)
                .fetch_optional(conn)
                .await?
                .map(SacramentRecord::from),
            SacramentKind::HolyOrder => sqlx::query_as::<_, HolyOrderRow>(sql)
                .bind(id)
                .fetch_optional(conn)
                .await?
                .map(SacramentRecord::from),
        };
        Ok(record)
    }
}

/// Lineage column value required by an insert
fn lineage_id(lineage: &Lineage, kind: SacramentKind) -> StoreResult<i64> {
    lineage.id_of(kind).ok_or_else(|| {
        super::StoreError::Database(format!("missing {} reference in lineage", kind))
    })
}

#[async_trait]
impl SacramentRepo for PgTx {
    async fn find_sacrament(
        &mut self,
        kind: SacramentKind,
        id: i64,
    ) -> StoreResult<Option<SacramentRecord>> {
        let (table, columns) = table_of(kind);
        let sql = format!("SELECT {columns} FROM {table} WHERE id = $1");
        self.fetch_one_of(kind, &sql, id).await
    }

    async fn lock_sacrament(
        &mut self,
        kind: SacramentKind,
        id: i64,
    ) -> StoreResult<Option<SacramentRecord>> {
        let (table, columns) = table_of(kind);
        let sql = format!("SELECT {columns} FROM {table} WHERE id = $1 FOR UPDATE");
        self.fetch_one_of(kind, &sql, id).await
    }

    async fn find_successor(
        &mut self,
        kind: SacramentKind,
        predecessor_id: i64,
    ) -> StoreResult<Option<SacramentRecord>> {
        let Some(column) = predecessor_column(kind) else {
            return Ok(None);
        };
        let (table, columns) = table_of(kind);
        let sql = format!("SELECT {columns} FROM {table} WHERE {column} = $1");
        self.fetch_one_of(kind, &sql, predecessor_id).await
    }

    async fn insert_sacrament(&mut self, record: NewSacrament) -> StoreResult<SacramentRecord> {
        let lineage = record.lineage;
        let conn = &mut *self.tx;

        let inserted: SacramentRecord = match record.details {
            SacramentDetails::Baptism(d) => sqlx::query_as::<_, BaptismRow>(&format!(
                r#"
                INSERT INTO baptisms (baptism_name, surname, gender, date_of_birth, fathers_name,
                    mothers_name, sponsor_names, parish_id, address, parish_address, parent_address)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                RETURNING {BAPTISM_COLUMNS}
                "#
            ))
            .bind(&d.baptism_name)
            .bind(&d.surname)
            .bind(&d.gender)
            .bind(d.date_of_birth)
            .bind(&d.fathers_name)
            .bind(&d.mothers_name)
            .bind(&d.sponsor_names)
            .bind(d.parish_id)
            .bind(&d.address)
            .bind(&d.parish_address)
            .bind(&d.parent_address)
            .fetch_one(conn)
            .await?
            .into(),
            SacramentDetails::FirstHolyCommunion(d) => {
                sqlx::query_as::<_, CommunionRow>(&format!(
                    r#"
                    INSERT INTO first_holy_communions (baptism_id, communion_date,
                        officiating_priest, parish)
                    VALUES ($1, $2, $3, $4)
                    RETURNING {COMMUNION_COLUMNS}
                    "#
                ))
                .bind(lineage_id(&lineage, SacramentKind::Baptism)?)
                .bind(d.communion_date)
                .bind(&d.officiating_priest)
                .bind(&d.parish)
                .fetch_one(conn)
                .await?
                .into()
            }
            SacramentDetails::Confirmation(d) => {
                sqlx::query_as::<_, ConfirmationRow>(&format!(
                    r#"
                    INSERT INTO confirmations (baptism_id, communion_id, confirmation_date,
                        officiating_bishop, parish)
                    VALUES ($1, $2, $3, $4, $5)
                    RETURNING {CONFIRMATION_COLUMNS}
                    "#
                ))
                .bind(lineage_id(&lineage, SacramentKind::Baptism)?)
                .bind(lineage_id(&lineage, SacramentKind::FirstHolyCommunion)?)
                .bind(d.confirmation_date)
                .bind(&d.officiating_bishop)
                .bind(&d.parish)
                .fetch_one(conn)
                .await?
                .into()
            }
            SacramentDetails::Marriage(d) => sqlx::query_as::<_, MarriageRow>(&format!(
                r#"
                INSERT INTO marriages (baptism_id, communion_id, confirmation_id, partners_name,
                    marriage_date, officiating_priest, parish)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING {MARRIAGE_COLUMNS}
                "#
            ))
            .bind(lineage_id(&lineage, SacramentKind::Baptism)?)
            .bind(lineage_id(&lineage, SacramentKind::FirstHolyCommunion)?)
            .bind(lineage_id(&lineage, SacramentKind::Confirmation)?)
            .bind(&d.partners_name)
            .bind(d.marriage_date)
            .bind(&d.officiating_priest)
            .bind(&d.parish)
            .fetch_one(conn)
            .await?
            .into(),
            SacramentDetails::HolyOrder(d) => sqlx::query_as::<_, HolyOrderRow>(&format!(
                r#"
                INSERT INTO holy_orders (baptism_id, communion_id, confirmation_id,
                    ordination_date, order_type, officiating_bishop, parish_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING {HOLY_ORDER_COLUMNS}
                "#
            ))
            .bind(lineage_id(&lineage, SacramentKind::Baptism)?)
            .bind(lineage_id(&lineage, SacramentKind::FirstHolyCommunion)?)
            .bind(lineage_id(&lineage, SacramentKind::Confirmation)?)
            .bind(d.ordination_date)
            .bind(&d.order_type)
            .bind(&d.officiating_bishop)
            .bind(d.parish_id)
            .fetch_one(conn)
            .await?
            .into(),
        };

        Ok(inserted)
    }
}
