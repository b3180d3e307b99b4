use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{BatchWrite, CommitReport, EventStore, StoreError, StoreResult, WriteBatch};
use crate::models::event::EventRow;
use crate::models::user::UserRow;
use crate::models::{
    Event, EventChanges, EventStatus, ExpiredEvent, Guest, NewEvent, Organization, User,
};

const EVENT_COLUMNS: &str = "id, name, description, location, date, image_url, organization_id, \
     status, guest_count, created_at, updated_at";

#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!()
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Internal(format!("migration failed: {}", e)))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn adjust_counter<'e, E>(executor: E, organization_id: Uuid, delta: i32) -> StoreResult<bool>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        "UPDATE organizations \
         SET active_events_count = GREATEST(active_events_count + $2, 0), updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(organization_id)
    .bind(delta)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn fetch_event(&self, id: Uuid) -> StoreResult<Option<Event>> {
        let row: Option<EventRow> =
            sqlx::query_as(&format!("SELECT {} FROM events WHERE id = $1", EVENT_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(Event::try_from).transpose()
    }

    async fn insert_event(&self, event: NewEvent) -> StoreResult<Event> {
        let mut tx = self.pool.begin().await?;

        let row: EventRow = sqlx::query_as(&format!(
            "INSERT INTO events \
             (id, name, description, location, date, image_url, organization_id, status, \
              guest_count, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, $9, $9) \
             RETURNING {}",
            EVENT_COLUMNS
        ))
        .bind(event.id)
        .bind(&event.name)
        .bind(&event.description)
        .bind(&event.location)
        .bind(event.date)
        .bind(&event.image_url)
        .bind(event.organization_id)
        .bind(EventStatus::Active.as_str())
        .bind(event.created_at)
        .fetch_one(&mut *tx)
        .await?;

        if !adjust_counter(&mut *tx, event.organization_id, 1).await? {
            tx.rollback().await?;
            return Err(StoreError::FailedPrecondition(format!(
                "organization {} does not exist",
                event.organization_id
            )));
        }

        tx.commit().await?;
        Event::try_from(row)
    }

    async fn update_event(
        &self,
        id: Uuid,
        changes: EventChanges,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Event>> {
        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new("UPDATE events SET updated_at = ");
        query.push_bind(at);

        if let Some(name) = changes.name {
            query.push(", name = ").push_bind(name);
        }
        if let Some(description) = changes.description {
            query.push(", description = ").push_bind(description);
        }
        if let Some(location) = changes.location {
            query.push(", location = ").push_bind(location);
        }
        if let Some(date) = changes.date {
            query.push(", date = ").push_bind(date);
        }
        if let Some(image_url) = changes.image_url {
            query.push(", image_url = ").push_bind(image_url);
        }

        query.push(" WHERE id = ").push_bind(id);
        query.push(" RETURNING ").push(EVENT_COLUMNS);

        let row: Option<EventRow> = query
            .build_query_as()
            .fetch_optional(&self.pool)
            .await?;

        row.map(Event::try_from).transpose()
    }

    async fn list_active_events(
        &self,
        organization_id: Uuid,
        before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> StoreResult<Vec<Event>> {
        let rows: Vec<EventRow> = sqlx::query_as(&format!(
            "SELECT {} FROM events \
             WHERE organization_id = $1 AND status = $2 \
               AND ($3::timestamptz IS NULL OR created_at < $3) \
             ORDER BY created_at DESC \
             LIMIT $4",
            EVENT_COLUMNS
        ))
        .bind(organization_id)
        .bind(EventStatus::Active.as_str())
        .bind(before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Event::try_from).collect()
    }

    async fn event_created_at(&self, id: Uuid) -> StoreResult<Option<DateTime<Utc>>> {
        let created_at: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT created_at FROM events WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(created_at)
    }

    async fn find_expired_events(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<ExpiredEvent>> {
        let rows: Vec<ExpiredEvent> = sqlx::query_as(
            "SELECT id, organization_id FROM events \
             WHERE status = $1 AND date < $2 \
             ORDER BY date ASC \
             LIMIT $3",
        )
        .bind(EventStatus::Active.as_str())
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<CommitReport> {
        let mut report = CommitReport::default();
        if batch.is_empty() {
            return Ok(report);
        }

        let mut tx = self.pool.begin().await?;

        for write in batch.writes() {
            match *write {
                BatchWrite::FinishEvent { event_id, at } => {
                    let result = sqlx::query(
                        "UPDATE events SET status = $2, updated_at = $3 \
                         WHERE id = $1 AND status = $4",
                    )
                    .bind(event_id)
                    .bind(EventStatus::Finished.as_str())
                    .bind(at)
                    .bind(EventStatus::Active.as_str())
                    .execute(&mut *tx)
                    .await?;

                    if result.rows_affected() != 1 {
                        tx.rollback().await?;
                        return Err(StoreError::Conflict(format!(
                            "event {} is no longer active",
                            event_id
                        )));
                    }
                }
                BatchWrite::AdjustActiveEvents {
                    organization_id,
                    delta,
                } => {
                    if !adjust_counter(&mut *tx, organization_id, delta).await? {
                        report.missing_organizations.push(organization_id);
                        continue;
                    }
                }
            }
            report.writes_applied += 1;
        }

        tx.commit().await?;
        Ok(report)
    }

    async fn adjust_active_events(&self, organization_id: Uuid, delta: i32) -> StoreResult<bool> {
        adjust_counter(&self.pool, organization_id, delta).await
    }

    async fn fetch_organization(&self, id: Uuid) -> StoreResult<Option<Organization>> {
        let org = sqlx::query_as(
            "SELECT id, name, owner_id, active_events_count, total_promoters, total_teams, \
             created_at, updated_at FROM organizations WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(org)
    }

    async fn insert_organization(&self, organization: Organization) -> StoreResult<bool> {
        let result = sqlx::query(
            "INSERT INTO organizations \
             (id, name, owner_id, active_events_count, total_promoters, total_teams, \
              created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(organization.id)
        .bind(&organization.name)
        .bind(organization.owner_id)
        .bind(organization.active_events_count)
        .bind(organization.total_promoters)
        .bind(organization.total_teams)
        .bind(organization.created_at)
        .bind(organization.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_guest(&self, event_id: Uuid, email: &str) -> StoreResult<Option<Guest>> {
        let guest = sqlx::query_as(
            "SELECT id, event_id, name, email, created_at FROM guests \
             WHERE event_id = $1 AND email = $2",
        )
        .bind(event_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(guest)
    }

    async fn insert_guest(&self, guest: Guest) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO guests (id, event_id, name, email, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(guest.id)
        .bind(guest.event_id)
        .bind(&guest.name)
        .bind(&guest.email)
        .bind(guest.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE events SET guest_count = guest_count + 1 WHERE id = $1")
            .bind(guest.event_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_guests(&self, event_id: Uuid) -> StoreResult<Vec<Guest>> {
        let guests = sqlx::query_as(
            "SELECT id, event_id, name, email, created_at FROM guests \
             WHERE event_id = $1 ORDER BY created_at DESC",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(guests)
    }

    async fn fetch_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, name, role, organization_id, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn insert_user(
        &self,
        user: User,
        owned_organization: Option<Organization>,
    ) -> StoreResult<()> {
        // Dropping the transaction on an early return rolls it back.
        let mut tx = self.pool.begin().await?;

        if let Some(org) = &owned_organization {
            sqlx::query(
                "INSERT INTO organizations \
                 (id, name, owner_id, active_events_count, total_promoters, total_teams, \
                  created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(org.id)
            .bind(&org.name)
            .bind(org.owner_id)
            .bind(org.active_events_count)
            .bind(org.total_promoters)
            .bind(org.total_teams)
            .bind(org.created_at)
            .bind(org.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "INSERT INTO users (id, email, name, role, organization_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.role.as_str())
        .bind(user.organization_id)
        .bind(user.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
