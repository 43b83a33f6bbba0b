use chrono::Utc;
use sqlx::Row;

use crate::database::Database;

/// Metadata recorded for an uploaded file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRecord {
    pub cid: String,
    pub content_type: String,
    pub alt: Option<String>,
    /// usage hint supplied by the uploader (e.g. `avatar`), not a MIME type
    pub media_type: Option<String>,
    pub sha256: String,
    pub size: i64,
    pub created_at: i64,
}

impl Database {
    /// Record (or refresh the metadata of) uploaded content
    pub async fn insert_content(&self, record: &ContentRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO content (cid, content_type, alt, media_type, sha256, size, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(cid) DO UPDATE SET
                content_type = excluded.content_type,
                alt = excluded.alt,
                media_type = excluded.media_type
            "#,
        )
        .bind(&record.cid)
        .bind(&record.content_type)
        .bind(&record.alt)
        .bind(&record.media_type)
        .bind(&record.sha256)
        .bind(record.size)
        .bind(record.created_at)
        .execute(&**self)
        .await?;
        Ok(())
    }

    pub async fn get_content(&self, cid: &str) -> Result<Option<ContentRecord>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT cid, content_type, alt, media_type, sha256, size, created_at
            FROM content
            WHERE cid = ?
            "#,
        )
        .bind(cid)
        .fetch_optional(&**self)
        .await?;

        row.map(|r| {
            Ok(ContentRecord {
                cid: r.try_get("cid")?,
                content_type: r.try_get("content_type")?,
                alt: r.try_get("alt")?,
                media_type: r.try_get("media_type")?,
                sha256: r.try_get("sha256")?,
                size: r.try_get("size")?,
                created_at: r.try_get("created_at")?,
            })
        })
        .transpose()
    }

    /// Mark `pubkey` as an owner of `cid`, refreshing the timestamp if it
    /// already was one
    pub async fn add_owner(&self, cid: &str, pubkey: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO content_owners (cid, pubkey, ts)
            VALUES (?, ?, ?)
            ON CONFLICT(cid, pubkey) DO UPDATE SET ts = excluded.ts
            "#,
        )
        .bind(cid)
        .bind(pubkey)
        .bind(Utc::now().to_rfc3339())
        .execute(&**self)
        .await?;
        Ok(())
    }

    pub async fn owners(&self, cid: &str) -> Result<Vec<String>, sqlx::Error> {
        let rows = sqlx::query("SELECT pubkey FROM content_owners WHERE cid = ? ORDER BY pubkey")
            .bind(cid)
            .fetch_all(&**self)
            .await?;
        rows.iter().map(|r| r.try_get("pubkey")).collect()
    }

    /// Drop `pubkey` from the owners of `cid` and return how many owners
    /// remain
    pub async fn remove_owner(&self, cid: &str, pubkey: &str) -> Result<i64, sqlx::Error> {
        let mut tx = self.begin().await?;
        sqlx::query("DELETE FROM content_owners WHERE cid = ? AND pubkey = ?")
            .bind(cid)
            .bind(pubkey)
            .execute(&mut *tx)
            .await?;
        let remaining: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM content_owners WHERE cid = ?")
                .bind(cid)
                .fetch_one(&mut *tx)
                .await?;
        tx.commit().await?;
        Ok(remaining)
    }

    /// Forget `cid` and its owners. Returns `false` if nothing was recorded.
    pub async fn delete_content(&self, cid: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM content WHERE cid = ?")
            .bind(cid)
            .execute(&**self)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(cid: &str) -> ContentRecord {
        ContentRecord {
            cid: cid.into(),
            content_type: "image/png".into(),
            alt: Some("a cat".into()),
            media_type: None,
            sha256: "00".repeat(32),
            size: 42,
            created_at: 1_700_000_000,
        }
    }

    #[tokio::test]
    async fn test_content_round_trip() {
        let db = Database::in_memory().await.unwrap();
        db.insert_content(&record("bafy")).await.unwrap();
        assert_eq!(db.get_content("bafy").await.unwrap(), Some(record("bafy")));
        assert_eq!(db.get_content("other").await.unwrap(), None);

        let mut updated = record("bafy");
        updated.content_type = "text/plain".into();
        updated.media_type = Some("avatar".into());
        db.insert_content(&updated).await.unwrap();
        assert_eq!(db.get_content("bafy").await.unwrap(), Some(updated));
    }

    #[tokio::test]
    async fn test_ownership_counts() {
        let db = Database::in_memory().await.unwrap();
        db.insert_content(&record("bafy")).await.unwrap();
        db.add_owner("bafy", "alice").await.unwrap();
        db.add_owner("bafy", "bob").await.unwrap();
        db.add_owner("bafy", "bob").await.unwrap();
        assert_eq!(db.owners("bafy").await.unwrap(), vec!["alice", "bob"]);

        assert_eq!(db.remove_owner("bafy", "alice").await.unwrap(), 1);
        assert_eq!(db.remove_owner("bafy", "alice").await.unwrap(), 1);
        assert_eq!(db.remove_owner("bafy", "bob").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_cascades_to_owners() {
        let db = Database::in_memory().await.unwrap();
        db.insert_content(&record("bafy")).await.unwrap();
        db.add_owner("bafy", "alice").await.unwrap();
        assert!(db.delete_content("bafy").await.unwrap());
        assert!(!db.delete_content("bafy").await.unwrap());
        assert!(db.owners("bafy").await.unwrap().is_empty());
    }
}
