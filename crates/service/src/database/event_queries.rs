use std::collections::HashSet;

use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use common::prelude::{Filter, RelayEvent};
use common::relay::index_key;

use crate::database::Database;

const SELECT_EVENTS: &str =
    "SELECT id, pubkey, created_at, kind, tags, content, sig FROM events WHERE 1 = 1";

impl Database {
    /// Store an event and its tag index. Returns `false` if an event with
    /// the same id was already stored.
    pub async fn insert_event(&self, event: &RelayEvent) -> Result<bool, sqlx::Error> {
        let tags =
            serde_json::to_string(&event.tags).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

        let mut tx = self.begin().await?;
        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO events (id, pubkey, created_at, kind, tags, content, sig)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.id)
        .bind(&event.pubkey)
        .bind(event.created_at)
        .bind(i64::from(event.kind))
        .bind(tags)
        .bind(&event.content)
        .bind(&event.sig)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if !inserted {
            return Ok(false);
        }

        for tag in event.indexed_tags() {
            sqlx::query("INSERT OR IGNORE INTO event_tags (event_id, tag) VALUES (?, ?)")
                .bind(&event.id)
                .bind(tag)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(true)
    }

    pub async fn get_event(&self, id: &str) -> Result<Option<RelayEvent>, sqlx::Error> {
        let mut query = QueryBuilder::<Sqlite>::new(SELECT_EVENTS);
        query.push(" AND id = ").push_bind(id);
        query
            .build()
            .fetch_optional(&**self)
            .await?
            .map(|row| event_from_row(&row))
            .transpose()
    }

    /// Run every filter and union the results in filter order, dropping
    /// events already returned by an earlier filter. Within a filter events
    /// come newest first, ties broken by id.
    pub async fn query_events(&self, filters: &[Filter]) -> Result<Vec<RelayEvent>, sqlx::Error> {
        let mut seen = HashSet::new();
        let mut events = Vec::new();

        for filter in filters {
            if filter.is_unsatisfiable() {
                continue;
            }
            let mut query = filter_query(filter);
            let rows = query.build().fetch_all(&**self).await?;
            for row in rows {
                let event = event_from_row(&row)?;
                if seen.insert(event.id.clone()) {
                    events.push(event);
                }
            }
        }
        Ok(events)
    }
}

fn push_in<'a, T>(query: &mut QueryBuilder<'a, Sqlite>, column: &str, values: T)
where
    T: IntoIterator,
    T::Item: 'a + sqlx::Encode<'a, Sqlite> + sqlx::Type<Sqlite> + Send,
{
    query.push(format!(" AND {} IN (", column));
    let mut separated = query.separated(", ");
    for value in values {
        separated.push_bind(value);
    }
    separated.push_unseparated(")");
}

fn filter_query(filter: &Filter) -> QueryBuilder<'_, Sqlite> {
    let mut query = QueryBuilder::new(SELECT_EVENTS);

    if let Some(ids) = &filter.ids {
        push_in(&mut query, "id", ids.iter().map(String::as_str));
    }
    if let Some(authors) = &filter.authors {
        push_in(&mut query, "pubkey", authors.iter().map(String::as_str));
    }
    if let Some(kinds) = &filter.kinds {
        push_in(&mut query, "kind", kinds.iter().map(|kind| i64::from(*kind)));
    }
    if let Some(since) = filter.since {
        query.push(" AND created_at >= ").push_bind(since);
    }
    if let Some(until) = filter.until {
        query.push(" AND created_at <= ").push_bind(until);
    }
    for (name, values) in &filter.tags {
        query.push(" AND id IN (SELECT event_id FROM event_tags WHERE tag IN (");
        let mut separated = query.separated(", ");
        for value in values {
            separated.push_bind(index_key(name, value));
        }
        separated.push_unseparated("))");
    }

    query.push(" ORDER BY created_at DESC, id ASC");
    if let Some(limit) = filter.limit {
        query
            .push(" LIMIT ")
            .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
    }
    query
}

fn event_from_row(row: &SqliteRow) -> Result<RelayEvent, sqlx::Error> {
    let tags: String = row.try_get("tags")?;
    let tags = serde_json::from_str(&tags).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    let kind: i64 = row.try_get("kind")?;
    let kind = u32::try_from(kind).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    Ok(RelayEvent {
        id: row.try_get("id")?,
        pubkey: row.try_get("pubkey")?,
        created_at: row.try_get("created_at")?,
        kind,
        tags,
        content: row.try_get("content")?,
        sig: row.try_get("sig")?,
    })
}
