//! Database service for fee-service.

use crate::error::FeeError;
use crate::models::{
    AnnualAttribution, AnnualAttributionRow, AnnualChargeKey, ConflictReport, CreateAdjustment,
    FeeAdjustment, FeeAdjustmentRow, FeeStructure, FeeStructureRow, LineItem, LineItemRow,
    ListStructuresFilter, NewFeeStructure, UpdateAdjustment,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::{apply_conflict_policy, FeeStore, StructureBatch};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const STRUCTURE_SELECT: &str = r#"
    SELECT s.structure_id, s.lineage_id, s.campus_id, s.academic_year_id, s.term_id,
           s.structure_name, s.strategy, s.version, s.created_utc, s.deactivated_utc,
           NOT EXISTS (
               SELECT 1 FROM fee_structures n
               WHERE n.lineage_id = s.lineage_id AND n.version > s.version
           ) AS is_latest_version
    FROM fee_structures s
    WHERE ($1::uuid IS NULL OR s.structure_id = $1)
      AND ($2::uuid IS NULL OR s.lineage_id = $2)
      AND ($3::uuid IS NULL OR s.campus_id = $3)
      AND ($4::uuid IS NULL OR s.academic_year_id = $4)
      AND ($5::uuid IS NULL OR EXISTS (
               SELECT 1 FROM fee_structure_classes c
               WHERE c.structure_id = s.structure_id AND c.class_id = $5
          ))
    ORDER BY s.created_utc, s.version, s.structure_id
"#;

const ADJUSTMENT_COLUMNS: &str = "adjustment_id, student_id, term_id, adjustment_type, adjustment_value, reason, created_utc, updated_utc";

/// Which structures to load. Unset fields do not filter.
#[derive(Debug, Default)]
struct StructureQuery {
    structure_id: Option<Uuid>,
    lineage_id: Option<Uuid>,
    campus_id: Option<Uuid>,
    academic_year_id: Option<Uuid>,
    class_id: Option<Uuid>,
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "fee-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn connection(&self) -> Result<sqlx::pool::PoolConnection<sqlx::Postgres>, FeeError> {
        self.pool
            .acquire()
            .await
            .map_err(|e| FeeError::from_sqlx("Failed to acquire connection", e))
    }

    async fn begin_serializable(&self) -> Result<sqlx::Transaction<'static, sqlx::Postgres>, FeeError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| FeeError::from_sqlx("Failed to begin transaction", e))?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(|e| FeeError::from_sqlx("Failed to set isolation level", e))?;
        Ok(tx)
    }
}

// =========================================================================
// Structure helpers
// =========================================================================

async fn load_structures(
    conn: &mut PgConnection,
    query: StructureQuery,
) -> Result<Vec<FeeStructure>, FeeError> {
    let rows = sqlx::query_as::<_, FeeStructureRow>(STRUCTURE_SELECT)
        .bind(query.structure_id)
        .bind(query.lineage_id)
        .bind(query.campus_id)
        .bind(query.academic_year_id)
        .bind(query.class_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| FeeError::from_sqlx("Failed to load fee structures", e))?;

    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<Uuid> = rows.iter().map(|r| r.structure_id).collect();

    let class_rows = sqlx::query_as::<_, (Uuid, Uuid)>(
        r#"
        SELECT structure_id, class_id
        FROM fee_structure_classes
        WHERE structure_id = ANY($1)
        ORDER BY structure_id, position
        "#,
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| FeeError::from_sqlx("Failed to load structure classes", e))?;

    let supersession_rows = sqlx::query_as::<_, (Uuid, Uuid)>(
        r#"
        SELECT structure_id, superseded_lineage_id
        FROM fee_structure_supersessions
        WHERE structure_id = ANY($1)
        ORDER BY structure_id, position
        "#,
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| FeeError::from_sqlx("Failed to load supersessions", e))?;

    let item_rows = sqlx::query_as::<_, LineItemRow>(
        r#"
        SELECT structure_id, name, amount, display_order, is_annual, is_one_off
        FROM fee_line_items
        WHERE structure_id = ANY($1)
        ORDER BY structure_id, display_order
        "#,
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| FeeError::from_sqlx("Failed to load line items", e))?;

    let mut classes: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for (structure_id, class_id) in class_rows {
        classes.entry(structure_id).or_default().push(class_id);
    }
    let mut supersedes: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for (structure_id, lineage_id) in supersession_rows {
        supersedes.entry(structure_id).or_default().push(lineage_id);
    }
    let mut items: HashMap<Uuid, Vec<LineItem>> = HashMap::new();
    for row in item_rows {
        items.entry(row.structure_id).or_default().push(row.into());
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let id = row.structure_id;
            row.into_structure(
                classes.remove(&id).unwrap_or_default(),
                supersedes.remove(&id).unwrap_or_default(),
                items.remove(&id).unwrap_or_default(),
            )
        })
        .collect())
}

async fn insert_structure(
    conn: &mut PgConnection,
    structure: NewFeeStructure,
) -> Result<FeeStructure, FeeError> {
    let structure_id = Uuid::new_v4();

    let created_utc = sqlx::query_scalar::<_, DateTime<Utc>>(
        r#"
        INSERT INTO fee_structures (structure_id, lineage_id, campus_id, academic_year_id, term_id, structure_name, strategy, version)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING created_utc
        "#,
    )
    .bind(structure_id)
    .bind(structure.lineage_id)
    .bind(structure.campus_id)
    .bind(structure.academic_year_id)
    .bind(structure.term_id)
    .bind(&structure.structure_name)
    .bind(structure.strategy.as_str())
    .bind(structure.version)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            FeeError::Transaction(anyhow::anyhow!(
                "Version {} of lineage {} already exists",
                structure.version,
                structure.lineage_id
            ))
        }
        _ => FeeError::from_sqlx("Failed to insert fee structure", e),
    })?;

    for (position, class_id) in structure.class_ids.iter().enumerate() {
        sqlx::query(
            "INSERT INTO fee_structure_classes (structure_id, class_id, position) VALUES ($1, $2, $3)",
        )
        .bind(structure_id)
        .bind(class_id)
        .bind(position as i32)
        .execute(&mut *conn)
        .await
        .map_err(|e| FeeError::from_sqlx("Failed to insert structure class", e))?;
    }

    for (position, lineage_id) in structure.supersedes.iter().enumerate() {
        sqlx::query(
            "INSERT INTO fee_structure_supersessions (structure_id, superseded_lineage_id, position) VALUES ($1, $2, $3)",
        )
        .bind(structure_id)
        .bind(lineage_id)
        .bind(position as i32)
        .execute(&mut *conn)
        .await
        .map_err(|e| FeeError::from_sqlx("Failed to insert supersession", e))?;
    }

    for item in &structure.line_items {
        sqlx::query(
            r#"
            INSERT INTO fee_line_items (structure_id, name, amount, display_order, is_annual, is_one_off)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(structure_id)
        .bind(item.name())
        .bind(item.amount())
        .bind(item.display_order())
        .bind(item.is_annual())
        .bind(item.is_one_off())
        .execute(&mut *conn)
        .await
        .map_err(|e| FeeError::from_sqlx("Failed to insert line item", e))?;
    }

    Ok(structure.into_structure(structure_id, created_utc))
}

// =========================================================================
// FeeStore
// =========================================================================

#[async_trait]
impl FeeStore for Database {
    #[instrument(skip(self, batch), fields(structures = batch.structures.len()))]
    async fn create_structures(
        &self,
        batch: StructureBatch,
    ) -> Result<(Vec<FeeStructure>, ConflictReport), FeeError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_structures"])
            .start_timer();

        let (campus_id, academic_year_id) = match batch.structures.first() {
            Some(first) => (first.campus_id, first.academic_year_id),
            None => return Ok((Vec::new(), ConflictReport::default())),
        };

        let mut tx = self.begin_serializable().await?;

        let existing = load_structures(
            &mut *tx,
            StructureQuery {
                campus_id: Some(campus_id),
                academic_year_id: Some(academic_year_id),
                ..Default::default()
            },
        )
        .await?;

        let (planned, report) = apply_conflict_policy(batch, &existing)?;

        let mut created = Vec::with_capacity(planned.len());
        for structure in planned {
            created.push(insert_structure(&mut *tx, structure).await?);
        }

        tx.commit()
            .await
            .map_err(|e| FeeError::from_sqlx("Failed to commit fee structures", e))?;

        timer.observe_duration();
        info!(
            count = created.len(),
            overridden = !report.is_empty(),
            "Fee structures created"
        );

        Ok((created, report))
    }

    #[instrument(skip(self, structure), fields(lineage_id = %structure.lineage_id, version = structure.version))]
    async fn append_version(&self, structure: NewFeeStructure) -> Result<FeeStructure, FeeError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["append_version"])
            .start_timer();

        let mut tx = self.begin_serializable().await?;

        let current = sqlx::query_scalar::<_, Option<i32>>(
            "SELECT MAX(version) FROM fee_structures WHERE lineage_id = $1",
        )
        .bind(structure.lineage_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| FeeError::from_sqlx("Failed to read lineage version", e))?
        .unwrap_or(0);

        if current != structure.version - 1 {
            return Err(FeeError::Transaction(anyhow::anyhow!(
                "lineage {} is at version {}, cannot append version {}",
                structure.lineage_id,
                current,
                structure.version
            )));
        }

        let created = insert_structure(&mut *tx, structure).await?;

        tx.commit()
            .await
            .map_err(|e| FeeError::from_sqlx("Failed to commit version", e))?;

        timer.observe_duration();
        info!(structure_id = %created.structure_id, "Fee structure version appended");

        Ok(created)
    }

    #[instrument(skip(self))]
    async fn get_structure(&self, structure_id: Uuid) -> Result<FeeStructure, FeeError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_structure"])
            .start_timer();

        let mut conn = self.connection().await?;
        let structure = load_structures(
            &mut *conn,
            StructureQuery {
                structure_id: Some(structure_id),
                ..Default::default()
            },
        )
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| FeeError::not_found("fee structure", structure_id))?;

        timer.observe_duration();
        Ok(structure)
    }

    #[instrument(skip(self, filter))]
    async fn list_structures(
        &self,
        filter: &ListStructuresFilter,
    ) -> Result<Vec<FeeStructure>, FeeError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_structures"])
            .start_timer();

        let mut conn = self.connection().await?;
        let structures = load_structures(
            &mut *conn,
            StructureQuery {
                campus_id: filter.campus_id,
                academic_year_id: filter.academic_year_id,
                class_id: filter.class_id,
                ..Default::default()
            },
        )
        .await?;

        timer.observe_duration();
        Ok(structures.into_iter().filter(|s| filter.matches(s)).collect())
    }

    #[instrument(skip(self))]
    async fn structure_history(&self, lineage_id: Uuid) -> Result<Vec<FeeStructure>, FeeError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["structure_history"])
            .start_timer();

        let mut conn = self.connection().await?;
        let mut versions = load_structures(
            &mut *conn,
            StructureQuery {
                lineage_id: Some(lineage_id),
                ..Default::default()
            },
        )
        .await?;
        versions.sort_by_key(|s| s.version);

        timer.observe_duration();
        Ok(versions)
    }

    #[instrument(skip(self))]
    async fn deactivate_structure(&self, structure_id: Uuid) -> Result<FeeStructure, FeeError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["deactivate_structure"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE fee_structures
            SET deactivated_utc = COALESCE(deactivated_utc, NOW())
            WHERE structure_id = $1
            "#,
        )
        .bind(structure_id)
        .execute(&self.pool)
        .await
        .map_err(|e| FeeError::from_sqlx("Failed to deactivate fee structure", e))?;

        timer.observe_duration();

        if result.rows_affected() == 0 {
            return Err(FeeError::not_found("fee structure", structure_id));
        }
        info!(structure_id = %structure_id, "Fee structure deactivated");

        self.get_structure(structure_id).await
    }

    #[instrument(skip(self, input), fields(student_id = %input.student_id, term_id = %input.term_id))]
    async fn create_adjustment(&self, input: CreateAdjustment) -> Result<FeeAdjustment, FeeError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_adjustment"])
            .start_timer();

        let row = sqlx::query_as::<_, FeeAdjustmentRow>(&format!(
            r#"
            INSERT INTO fee_adjustments (adjustment_id, student_id, term_id, adjustment_type, adjustment_value, reason)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            ADJUSTMENT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(input.student_id)
        .bind(input.term_id)
        .bind(input.adjustment_type.as_str())
        .bind(input.adjustment_value)
        .bind(input.reason.trim())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                FeeError::AdjustmentExists {
                    student_id: input.student_id,
                    term_id: input.term_id,
                }
            }
            _ => FeeError::from_sqlx("Failed to create adjustment", e),
        })?;

        timer.observe_duration();
        info!(adjustment_id = %row.adjustment_id, "Fee adjustment created");

        Ok(row.into())
    }

    #[instrument(skip(self, input))]
    async fn update_adjustment(
        &self,
        adjustment_id: Uuid,
        input: UpdateAdjustment,
    ) -> Result<FeeAdjustment, FeeError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_adjustment"])
            .start_timer();

        let row = sqlx::query_as::<_, FeeAdjustmentRow>(&format!(
            r#"
            UPDATE fee_adjustments
            SET adjustment_type = $2, adjustment_value = $3, reason = $4, updated_utc = NOW()
            WHERE adjustment_id = $1
            RETURNING {}
            "#,
            ADJUSTMENT_COLUMNS
        ))
        .bind(adjustment_id)
        .bind(input.adjustment_type.as_str())
        .bind(input.adjustment_value)
        .bind(input.reason.trim())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| FeeError::from_sqlx("Failed to update adjustment", e))?
        .ok_or_else(|| FeeError::not_found("fee adjustment", adjustment_id))?;

        timer.observe_duration();

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn get_adjustment(
        &self,
        student_id: Uuid,
        term_id: Uuid,
    ) -> Result<Option<FeeAdjustment>, FeeError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_adjustment"])
            .start_timer();

        let row = sqlx::query_as::<_, FeeAdjustmentRow>(&format!(
            "SELECT {} FROM fee_adjustments WHERE student_id = $1 AND term_id = $2",
            ADJUSTMENT_COLUMNS
        ))
        .bind(student_id)
        .bind(term_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| FeeError::from_sqlx("Failed to get adjustment", e))?;

        timer.observe_duration();

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, charges), fields(charges = charges.len()))]
    async fn claim_annual_charges(
        &self,
        student_id: Uuid,
        academic_year_id: Uuid,
        term_id: Uuid,
        charges: &[AnnualChargeKey],
    ) -> Result<Vec<AnnualAttribution>, FeeError> {
        if charges.is_empty() {
            return Ok(Vec::new());
        }
        let timer = DB_QUERY_DURATION
            .with_label_values(&["claim_annual_charges"])
            .start_timer();

        let kinds: Vec<String> = charges.iter().map(|c| c.item_kind.as_str().to_string()).collect();
        let names: Vec<String> = charges.iter().map(|c| c.item_name.clone()).collect();

        sqlx::query(
            r#"
            INSERT INTO annual_charge_attributions
                (student_id, academic_year_id, item_kind, item_name, term_id)
            SELECT $1, $2, c.item_kind, c.item_name, $3
            FROM UNNEST($4::text[], $5::text[]) AS c(item_kind, item_name)
            ON CONFLICT (student_id, academic_year_id, item_kind, item_name) DO NOTHING
            "#,
        )
        .bind(student_id)
        .bind(academic_year_id)
        .bind(term_id)
        .bind(&kinds)
        .bind(&names)
        .execute(&self.pool)
        .await
        .map_err(|e| FeeError::from_sqlx("Failed to claim annual charges", e))?;

        let rows = sqlx::query_as::<_, AnnualAttributionRow>(
            r#"
            SELECT a.student_id, a.academic_year_id, a.item_kind, a.item_name, a.term_id, a.created_utc
            FROM annual_charge_attributions a
            JOIN UNNEST($3::text[], $4::text[]) AS c(item_kind, item_name)
              ON a.item_kind = c.item_kind AND a.item_name = c.item_name
            WHERE a.student_id = $1 AND a.academic_year_id = $2
            ORDER BY a.item_kind, a.item_name
            "#,
        )
        .bind(student_id)
        .bind(academic_year_id)
        .bind(&kinds)
        .bind(&names)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| FeeError::from_sqlx("Failed to load annual charge attributions", e))?;

        if rows.len() != charges.len() {
            return Err(FeeError::Database(anyhow::anyhow!(
                "Expected {} annual charge attributions for student {}, found {}",
                charges.len(),
                student_id,
                rows.len()
            )));
        }

        timer.observe_duration();
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
