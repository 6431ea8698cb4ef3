use rusqlite::params;
use sa_domain::models::{GuideEntry, LearningProgress, ProgressStatus};
use sa_domain::{Error, Result};

use crate::{map_err, Store};

const SELECT_COLS: &str = "id, slug, title, category, difficulty, body, excerpt, tags_json";

impl Store {
    /// Insert a guide if its slug is not already present — seeding is
    /// idempotent so it can run on every startup.
    pub fn guide_seed(&self, guide: &GuideEntry) -> Result<()> {
        let tags_json = serde_json::to_string(&guide.tags)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO guides (id, slug, title, category, difficulty, body, excerpt, tags_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(slug) DO NOTHING",
                params![
                    guide.id,
                    guide.slug,
                    guide.title,
                    guide.category,
                    guide.difficulty,
                    guide.body,
                    guide.excerpt,
                    tags_json,
                ],
            )
            .map_err(map_err)?;
            Ok(())
        })
    }

    pub fn guide_get_by_slug(&self, slug: &str) -> Result<Option<GuideEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!("SELECT {SELECT_COLS} FROM guides WHERE slug = ?1"))
                .map_err(map_err)?;
            let mut rows = stmt.query(params![slug]).map_err(map_err)?;
            match rows.next().map_err(map_err)? {
                Some(row) => Ok(Some(row_to_guide(row)?)),
                None => Ok(None),
            }
        })
    }

    pub fn guide_all(&self) -> Result<Vec<GuideEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!("SELECT {SELECT_COLS} FROM guides ORDER BY slug"))
                .map_err(map_err)?;
            let rows = stmt
                .query_map([], |row| Ok(row_to_guide(row)))
                .map_err(map_err)?;
            let mut out = Vec::new();
            for r in rows {
                out.push(r.map_err(map_err)??);
            }
            Ok(out)
        })
    }

    pub fn guide_progress_upsert(
        &self,
        guide_id: &str,
        session_id: &str,
        status: ProgressStatus,
        step_index: u32,
    ) -> Result<LearningProgress> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO guide_progress (guide_id, session_id, status, step_index)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(guide_id, session_id) DO UPDATE SET
                    status = excluded.status,
                    step_index = excluded.step_index",
                params![guide_id, session_id, status.as_str(), step_index],
            )
            .map_err(map_err)?;
            Ok(LearningProgress {
                guide_id: guide_id.to_string(),
                session_id: session_id.to_string(),
                status,
                step_index,
            })
        })
    }

    pub fn guide_progress_get(
        &self,
        guide_id: &str,
        session_id: &str,
    ) -> Result<Option<LearningProgress>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT status, step_index FROM guide_progress WHERE guide_id = ?1 AND session_id = ?2",
                    params![guide_id, session_id],
                    |row| {
                        let status: String = row.get(0)?;
                        let step_index: u32 = row.get(1)?;
                        Ok((status, step_index))
                    },
                )
                .ok();
            let Some((status, step_index)) = row else {
                return Ok(None);
            };
            let status = ProgressStatus::parse(&status)
                .ok_or_else(|| Error::Internal(format!("bad progress status {status}")))?;
            Ok(Some(LearningProgress {
                guide_id: guide_id.to_string(),
                session_id: session_id.to_string(),
                status,
                step_index,
            }))
        })
    }
}


fn row_to_guide(row: &rusqlite::Row) -> Result<GuideEntry> {
    let tags_json: String = row.get(7).map_err(map_err)?;
    Ok(GuideEntry {
        id: row.get(0).map_err(map_err)?,
        slug: row.get(1).map_err(map_err)?,
        title: row.get(2).map_err(map_err)?,
        category: row.get(3).map_err(map_err)?,
        difficulty: row.get(4).map_err(map_err)?,
        body: row.get(5).map_err(map_err)?,
        excerpt: row.get(6).map_err(map_err)?,
        tags: serde_json::from_str(&tags_json)?,
    })
}
