//! Knowledge atom repository implementation.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, warn};
use uuid::Uuid;

use faultline_core::{
    defaults, AtomCategory, AtomHit, AtomRepository, Citation, Difficulty, Error, KnowledgeAtom,
    Result, RetrievalStage, SafetyLevel,
};

use crate::pool::map_pool_error;

/// PostgreSQL implementation of [`AtomRepository`] backed by pgvector.
pub struct PgAtomRepository {
    pool: Pool<Postgres>,
    dimension: usize,
}

impl PgAtomRepository {
    /// Create a new PgAtomRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            dimension: defaults::EMBED_DIMENSION,
        }
    }

    /// Override the store's fixed embedding dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// The store's fixed embedding dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn hit_from_row(row: sqlx::postgres::PgRow, stage: RetrievalStage) -> AtomHit {
        AtomHit {
            atom_id: row.get("id"),
            score: row.get::<f64, _>("score") as f32,
            title: row.get("title"),
            summary: row.get("summary"),
            category: AtomCategory::parse_or_general(row.get("category")),
            safety: SafetyLevel::parse_or_info(row.get("safety")),
            citation: Citation {
                source_id: row.get("source_id"),
                page: row.get("citation_page"),
                offset: row.get("citation_offset"),
            },
            stage,
        }
    }
}

#[async_trait]
impl AtomRepository for PgAtomRepository {
    async fn upsert(&self, atom: &KnowledgeAtom) -> Result<Uuid> {
        atom.validate()?;

        let embedding = atom.embedding.as_ref().ok_or_else(|| {
            Error::Validation(format!("atom {} has no embedding", atom.id))
        })?;
        if embedding.as_slice().len() != self.dimension {
            return Err(Error::Validation(format!(
                "embedding dimension {} does not match store dimension {}",
                embedding.as_slice().len(),
                self.dimension
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO knowledge_atom
                (id, title, summary, body, category, difficulty, safety,
                 keywords, source_id, citation_page, citation_offset,
                 quality_score, embedding, created_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, 1)
            ON CONFLICT (id) DO UPDATE SET
                title = EXCLUDED.title,
                summary = EXCLUDED.summary,
                body = EXCLUDED.body,
                category = EXCLUDED.category,
                difficulty = EXCLUDED.difficulty,
                safety = EXCLUDED.safety,
                keywords = EXCLUDED.keywords,
                quality_score = EXCLUDED.quality_score,
                embedding = EXCLUDED.embedding,
                version = knowledge_atom.version + 1
            "#,
        )
        .bind(atom.id)
        .bind(&atom.title)
        .bind(&atom.summary)
        .bind(&atom.body)
        .bind(atom.category.as_str())
        .bind(atom.difficulty.as_str())
        .bind(atom.safety.as_str())
        .bind(&atom.keywords)
        .bind(&atom.citation.source_id)
        .bind(atom.citation.page)
        .bind(atom.citation.offset)
        .bind(atom.quality_score)
        .bind(embedding)
        .bind(atom.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_pool_error)?;

        debug!(
            subsystem = "db",
            component = "atoms",
            op = "upsert",
            atom_id = %atom.id,
            "Upserted knowledge atom"
        );
        Ok(atom.id)
    }

    async fn fetch(&self, id: Uuid) -> Result<KnowledgeAtom> {
        let row = sqlx::query(
            r#"
            SELECT id, title, summary, body, category, difficulty, safety,
                   keywords, source_id, citation_page, citation_offset,
                   quality_score, embedding, created_at, version
            FROM knowledge_atom
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_pool_error)?
        .ok_or(Error::AtomNotFound(id))?;

        Ok(KnowledgeAtom {
            id: row.get("id"),
            title: row.get("title"),
            summary: row.get("summary"),
            body: row.get("body"),
            category: AtomCategory::parse_or_general(row.get("category")),
            difficulty: Difficulty::parse_or_intermediate(row.get("difficulty")),
            safety: SafetyLevel::parse_or_info(row.get("safety")),
            keywords: row.get("keywords"),
            citation: Citation {
                source_id: row.get("source_id"),
                page: row.get("citation_page"),
                offset: row.get("citation_offset"),
            },
            quality_score: row.get("quality_score"),
            embedding: row.get("embedding"),
            created_at: row.get("created_at"),
            version: row.get("version"),
        })
    }

    async fn find_similar(
        &self,
        query_vec: &Vector,
        limit: i64,
        category: Option<AtomCategory>,
    ) -> Result<Vec<AtomHit>> {
        let category_clause = if category.is_some() {
            "AND category = $3"
        } else {
            ""
        };

        let sql = format!(
            r#"
            SELECT id, title, summary, category, safety,
                   source_id, citation_page, citation_offset,
                   1.0 - (embedding <=> $1::vector) AS score
            FROM knowledge_atom
            WHERE embedding IS NOT NULL {}
            ORDER BY embedding <=> $1::vector
            LIMIT $2
            "#,
            category_clause
        );

        let mut q = sqlx::query(&sql).bind(query_vec).bind(limit);
        if let Some(cat) = category {
            q = q.bind(cat.as_str());
        }

        let rows = q.fetch_all(&self.pool).await.map_err(map_pool_error)?;

        let stage = if category.is_some() {
            RetrievalStage::DomainFilter
        } else {
            RetrievalStage::Semantic
        };
        Ok(rows
            .into_iter()
            .map(|row| Self::hit_from_row(row, stage))
            .collect())
    }

    async fn keyword_search(&self, query: &str, limit: i64) -> Result<Vec<AtomHit>> {
        // Field-weighted FTS: title (A) > summary/keywords (B) > body (C).
        let rows = sqlx::query(
            r#"
            SELECT id, title, summary, category, safety,
                   source_id, citation_page, citation_offset,
                   ts_rank(
                       setweight(to_tsvector('english', title), 'A') ||
                       setweight(to_tsvector('english', summary), 'B') ||
                       setweight(to_tsvector('english', array_to_string(keywords, ' ')), 'B') ||
                       setweight(to_tsvector('english', body), 'C'),
                       websearch_to_tsquery('english', $1),
                       32
                   )::float8 AS score
            FROM knowledge_atom
            WHERE to_tsvector('english',
                      title || ' ' || summary || ' ' || body || ' ' ||
                      array_to_string(keywords, ' '))
                  @@ websearch_to_tsquery('english', $1)
            ORDER BY score DESC
            LIMIT $2
            "#,
        )
        .bind(query)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_pool_error)?;

        Ok(rows
            .into_iter()
            .map(|row| Self::hit_from_row(row, RetrievalStage::Keyword))
            .collect())
    }

    async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM knowledge_atom")
            .fetch_one(&self.pool)
            .await
            .map_err(map_pool_error)?;
        Ok(row.get("count"))
    }

    async fn health_check(&self) -> Result<bool> {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => Ok(true),
            Err(e) => {
                warn!(
                    subsystem = "db",
                    component = "atoms",
                    op = "health_check",
                    error = %e,
                    "Knowledge store unreachable"
                );
                Ok(false)
            }
        }
    }
}
