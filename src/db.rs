//! Database layer: migrations and queries.

use std::collections::HashMap;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::errors::{ApiError, Result};
use crate::models::{
    Contribution, ContributorPreview, FundingRound, ParticipationRef, ParticipationRow,
    TokenPrice, VerifiedProject,
};

/// Contributors shown on each explorer card.
const PREVIEW_CONTRIBUTORS: usize = 3;

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    // Make sure the file is created if it doesn't exist yet.
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };
    let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

// ─────────────────────────────────────────────────────────
// Explorer reads
// ─────────────────────────────────────────────────────────

/// The approved candidate set for the explorer, project and round columns
/// joined flat. Archived projects are kept here; the explorer drops them
/// after shuffling. The ORDER BY pins a stable base ranking so a given
/// seed always sees the same input order.
pub async fn list_verified_participations(pool: &SqlitePool) -> Result<Vec<VerifiedProject>> {
    let rows = sqlx::query_as::<_, ParticipationRow>(
        r#"
        SELECT pr.id, pr.status, pr.amount_raise,
               r.id AS round_id, r.round_name, r.color_scheme, r.active,
               r.start_time, r.end_time,
               p.id AS project_id, p.name AS project_name, p.short_description,
               p.logo, p.project_link, p.industry,
               u.username AS owner_username, p.is_archive
        FROM   project_rounds pr
        JOIN   rounds r   ON r.id = pr.round_id
        JOIN   projects p ON p.id = pr.project_id
        JOIN   users u    ON u.id = p.owner_id
        WHERE  pr.status = 'APPROVED'
        ORDER  BY pr.created_at ASC, pr.id ASC
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(VerifiedProject::from).collect())
}

/// Up to three distinct contributors per project, for the explorer cards.
/// Keyed by project id; projects without contributions are absent.
pub async fn contributor_previews(
    pool: &SqlitePool,
    project_ids: &[String],
) -> Result<HashMap<String, Vec<ContributorPreview>>> {
    let mut previews: HashMap<String, Vec<ContributorPreview>> = HashMap::new();
    if project_ids.is_empty() {
        return Ok(previews);
    }

    let placeholders = (1..=project_ids.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        r#"
        SELECT c.project_id, u.username, u.profile_picture
        FROM   (SELECT project_id, user_id, MIN(id) AS first_id
                FROM contributions
                GROUP BY project_id, user_id) d
        JOIN   contributions c ON c.id = d.first_id
        JOIN   users u         ON u.id = c.user_id
        WHERE  c.project_id IN ({placeholders})
        ORDER  BY c.id ASC
        "#
    );

    let mut query = sqlx::query_as::<_, (String, String, Option<String>)>(&sql);
    for id in project_ids {
        query = query.bind(id);
    }
    let rows = query.fetch_all(pool).await?;

    for (project_id, username, profile_picture) in rows {
        let entry = previews.entry(project_id).or_default();
        if entry.len() < PREVIEW_CONTRIBUTORS {
            entry.push(ContributorPreview {
                username,
                profile_picture,
            });
        }
    }
    Ok(previews)
}

/// All distinct contributors of a project, earliest donation first.
pub async fn contributors_for_project(
    pool: &SqlitePool,
    project_id: &str,
) -> Result<Vec<ContributorPreview>> {
    let rows = sqlx::query_as::<_, ContributorPreview>(
        r#"
        SELECT u.username, u.profile_picture
        FROM   (SELECT user_id, MIN(id) AS first_id
                FROM contributions
                WHERE project_id = ?1
                GROUP BY user_id) d
        JOIN   contributions c ON c.id = d.first_id
        JOIN   users u         ON u.id = c.user_id
        ORDER  BY c.id ASC
        "#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ─────────────────────────────────────────────────────────
// Round schedule
// ─────────────────────────────────────────────────────────

/// Fetch the full round schedule, earliest start first.
pub async fn list_rounds(pool: &SqlitePool) -> Result<Vec<FundingRound>> {
    let rows = sqlx::query_as::<_, FundingRound>(
        r#"
        SELECT id, round_name, color_scheme, start_time, end_time, active
        FROM   rounds
        ORDER  BY start_time ASC, id ASC
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ─────────────────────────────────────────────────────────
// Contribution writes
// ─────────────────────────────────────────────────────────

/// Lookup used to validate a donation target.
pub async fn get_participation(pool: &SqlitePool, id: &str) -> Result<Option<ParticipationRef>> {
    let row = sqlx::query_as::<_, ParticipationRef>(
        "SELECT id, project_id, status FROM project_rounds WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub struct NewContribution<'a> {
    pub project_round_id: &'a str,
    pub project_id: &'a str,
    pub user_id: &'a str,
    pub amount: f64,
    pub token: &'a str,
    pub usd_amount: f64,
    pub matching_pool_share: i64,
    pub tx_signature: &'a str,
}

/// Insert a donation and recompute the participation's raised total inside
/// one transaction, so the rollup can never drift from the ledger.
pub async fn insert_contribution(
    pool: &SqlitePool,
    new: &NewContribution<'_>,
) -> Result<Contribution> {
    let mut tx = pool.begin().await?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO contributions
            (project_round_id, project_id, user_id, amount, token, usd_amount,
             matching_pool_share, tx_signature)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        RETURNING id
        "#,
    )
    .bind(new.project_round_id)
    .bind(new.project_id)
    .bind(new.user_id)
    .bind(new.amount)
    .bind(new.token)
    .bind(new.usd_amount)
    .bind(new.matching_pool_share)
    .bind(new.tx_signature)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => ApiError::Validation(
            "a contribution with this transaction signature already exists".to_string(),
        ),
        _ => ApiError::Database(e),
    })?;

    sqlx::query(
        r#"
        UPDATE project_rounds
        SET    amount_raise = (SELECT COALESCE(SUM(usd_amount), 0)
                               FROM contributions
                               WHERE project_round_id = ?1)
        WHERE  id = ?1
        "#,
    )
    .bind(new.project_round_id)
    .execute(&mut *tx)
    .await?;

    let stored = sqlx::query_as::<_, Contribution>(
        r#"
        SELECT id, project_round_id, project_id, user_id, amount, token,
               usd_amount, matching_pool_share, tx_signature, created_at
        FROM   contributions
        WHERE  id = ?1
        "#,
    )
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(stored)
}

// ─────────────────────────────────────────────────────────
// Token price cache
// ─────────────────────────────────────────────────────────

/// Persist a batch of fetched prices, replacing any previous quote.
pub async fn upsert_prices(pool: &SqlitePool, prices: &[TokenPrice]) -> Result<usize> {
    let mut count = 0usize;
    for price in prices {
        let rows_affected = sqlx::query(
            r#"
            INSERT INTO token_prices (token, usd, fetched_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(token) DO UPDATE
                SET usd = excluded.usd, fetched_at = excluded.fetched_at
            "#,
        )
        .bind(&price.token)
        .bind(price.usd)
        .bind(price.fetched_at)
        .execute(pool)
        .await?
        .rows_affected();

        count += rows_affected as usize;
    }
    Ok(count)
}

/// Most recent cached quote for a price-feed id.
pub async fn latest_price(pool: &SqlitePool, token: &str) -> Result<Option<TokenPrice>> {
    let row = sqlx::query_as::<_, TokenPrice>(
        "SELECT token, usd, fetched_at FROM token_prices WHERE token = ?1",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ApprovalStatus;

    /// A single-connection in-memory pool; one connection keeps every
    /// query on the same memory database.
    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("migrations");
        pool
    }

    async fn exec(pool: &SqlitePool, sql: &str) {
        sqlx::query(sql).execute(pool).await.expect(sql);
    }

    /// Two users, two projects (one archived), two rounds, three
    /// participations (one pending).
    async fn seed(pool: &SqlitePool) {
        exec(pool, "INSERT INTO users VALUES ('u1', 'alice', 'alice.png', 0)").await;
        exec(pool, "INSERT INTO users VALUES ('u2', 'bob', NULL, 0)").await;
        exec(pool, "INSERT INTO users VALUES ('u3', 'carol', 'carol.png', 0)").await;
        exec(pool, "INSERT INTO users VALUES ('u4', 'dave', NULL, 0)").await;
        exec(
            pool,
            r#"INSERT INTO projects VALUES
               ('p1', 'Orbit', 'A DeFi thing', 'orbit.png', 'https://orbit.xyz',
                '[{"label":"DeFi","value":"defi","colorScheme":"teal"}]', 'u1', 0, 0)"#,
        )
        .await;
        exec(
            pool,
            r#"INSERT INTO projects VALUES
               ('p2', 'Mural', 'An NFT thing', 'mural.png', NULL,
                '[{"label":"NFT","value":"nft","colorScheme":"purple"}]', 'u2', 1, 0)"#,
        )
        .await;
        exec(
            pool,
            "INSERT INTO rounds VALUES ('r1', 'Genesis', 'teal', 100, 200, 1)",
        )
        .await;
        exec(
            pool,
            "INSERT INTO rounds VALUES ('r2', 'Hackathon', 'purple', 300, 400, 0)",
        )
        .await;
        exec(
            pool,
            "INSERT INTO project_rounds VALUES ('j1', 'p1', 'r1', 'APPROVED', 0, 0)",
        )
        .await;
        exec(
            pool,
            "INSERT INTO project_rounds VALUES ('j2', 'p2', 'r1', 'APPROVED', 0, 1)",
        )
        .await;
        exec(
            pool,
            "INSERT INTO project_rounds VALUES ('j3', 'p1', 'r2', 'PENDING', 0, 2)",
        )
        .await;
    }

    fn contribution<'a>(user_id: &'a str, sig: &'a str, usd: f64) -> NewContribution<'a> {
        NewContribution {
            project_round_id: "j1",
            project_id: "p1",
            user_id,
            amount: 1.0,
            token: "sol",
            usd_amount: usd,
            matching_pool_share: 10,
            tx_signature: sig,
        }
    }

    #[tokio::test]
    async fn verified_join_returns_approved_with_nested_shape() {
        let pool = test_pool().await;
        seed(&pool).await;

        let items = list_verified_participations(&pool).await.unwrap();
        // pending j3 excluded, archived p2 still present at this layer
        assert_eq!(items.len(), 2);

        let first = &items[0];
        assert_eq!(first.id, "j1");
        assert_eq!(first.status, ApprovalStatus::Approved);
        assert_eq!(first.funding_round.id, "r1");
        assert_eq!(first.funding_round.round_name, "Genesis");
        assert_eq!(first.project.id, "p1");
        assert_eq!(first.project.owner.username, "alice");
        assert!(!first.project.is_archive);
        assert!(first.project.industry.contains("defi"));
        assert!(items[1].project.is_archive);
    }

    #[tokio::test]
    async fn contribution_insert_recomputes_raised_total() {
        let pool = test_pool().await;
        seed(&pool).await;

        let stored = insert_contribution(&pool, &contribution("u1", "sig-1", 120.0))
            .await
            .unwrap();
        assert_eq!(stored.project_id, "p1");
        assert_eq!(stored.usd_amount, 120.0);
        assert!(stored.created_at > 0);

        insert_contribution(&pool, &contribution("u2", "sig-2", 80.0))
            .await
            .unwrap();

        let raised: (f64,) =
            sqlx::query_as("SELECT amount_raise FROM project_rounds WHERE id = 'j1'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(raised.0, 200.0);
    }

    #[tokio::test]
    async fn duplicate_signature_is_a_validation_error() {
        let pool = test_pool().await;
        seed(&pool).await;

        insert_contribution(&pool, &contribution("u1", "sig-dup", 10.0))
            .await
            .unwrap();
        let err = insert_contribution(&pool, &contribution("u2", "sig-dup", 10.0))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn previews_are_distinct_and_capped_at_three() {
        let pool = test_pool().await;
        seed(&pool).await;

        // four donors, alice twice
        for (user, sig) in [
            ("u1", "s1"),
            ("u1", "s2"),
            ("u2", "s3"),
            ("u3", "s4"),
            ("u4", "s5"),
        ] {
            insert_contribution(&pool, &contribution(user, sig, 5.0))
                .await
                .unwrap();
        }

        let ids = vec!["p1".to_string()];
        let previews = contributor_previews(&pool, &ids).await.unwrap();
        let p1 = previews.get("p1").unwrap();
        assert_eq!(p1.len(), 3);
        assert_eq!(p1[0].username, "alice");
        assert_eq!(p1[1].username, "bob");
        assert_eq!(p1[2].username, "carol");

        let all = contributors_for_project(&pool, "p1").await.unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[3].username, "dave");
    }

    #[tokio::test]
    async fn previews_empty_input_short_circuits() {
        let pool = test_pool().await;
        let previews = contributor_previews(&pool, &[]).await.unwrap();
        assert!(previews.is_empty());
    }

    #[tokio::test]
    async fn rounds_are_ordered_by_start() {
        let pool = test_pool().await;
        seed(&pool).await;

        let rounds = list_rounds(&pool).await.unwrap();
        assert_eq!(rounds.len(), 2);
        assert_eq!(rounds[0].id, "r1");
        assert!(rounds[0].active);
        assert_eq!(rounds[1].id, "r2");
        assert_eq!(rounds[1].start_time, 300);
    }

    #[tokio::test]
    async fn price_upsert_replaces_previous_quote() {
        let pool = test_pool().await;

        let first = TokenPrice {
            token: "solana".to_string(),
            usd: 150.0,
            fetched_at: 1,
        };
        upsert_prices(&pool, &[first]).await.unwrap();
        let second = TokenPrice {
            token: "solana".to_string(),
            usd: 160.0,
            fetched_at: 2,
        };
        upsert_prices(&pool, &[second]).await.unwrap();

        let quote = latest_price(&pool, "solana").await.unwrap().unwrap();
        assert_eq!(quote.usd, 160.0);
        assert_eq!(quote.fetched_at, 2);
        assert!(latest_price(&pool, "usd-coin").await.unwrap().is_none());
    }
}
