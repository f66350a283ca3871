use rusqlite::{OptionalExtension, Row, params, params_from_iter};

use super::{Store, parse_text};
use crate::error::CalShareResult;
use crate::event::{Event, EventDraft, EventListing, EventType};
use crate::role::Role;

const EVENT_COLUMNS: &str = "e.id, e.name, e.content, e.start_at, e.end_at, e.color, e.type";

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    Ok(Event {
        id: row.get("id")?,
        name: row.get("name")?,
        content: row.get("content")?,
        start_at: row.get("start_at")?,
        end_at: row.get("end_at")?,
        color: row.get("color")?,
        kind: parse_text(row.get("type")?)?,
    })
}

impl Store {
    /// Create an event inside a calendar.
    ///
    /// In one transaction: the event row, the creator's admin membership,
    /// the link to the calendar, and a guest membership for every other
    /// confirmed member of the calendar. Either all of it lands or none.
    pub fn create_event(
        &self,
        calendar_id: i64,
        creator_id: i64,
        draft: &EventDraft,
        color: &str,
    ) -> CalShareResult<(Event, usize)> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO events (name, content, start_at, end_at, color, type)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                draft.name,
                draft.content,
                draft.start_at,
                draft.end_at,
                color,
                draft.kind.as_str(),
            ],
        )?;
        let id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO user_events (user_id, event_id, role, is_confirmed) VALUES (?1, ?2, ?3, 1)",
            params![creator_id, id, Role::Admin.as_str()],
        )?;
        tx.execute(
            "INSERT INTO calendar_events (calendar_id, event_id) VALUES (?1, ?2)",
            [calendar_id, id],
        )?;
        let guests = tx.execute(
            "INSERT OR IGNORE INTO user_events (user_id, event_id, role)
             SELECT user_id, ?1, 'guest' FROM user_calendars
             WHERE calendar_id = ?2 AND user_id != ?3 AND is_confirmed = 1",
            [id, calendar_id, creator_id],
        )?;

        tx.commit()?;

        let event = Event {
            id,
            name: draft.name.clone(),
            content: draft.content.clone(),
            start_at: draft.start_at,
            end_at: draft.end_at,
            color: color.to_string(),
            kind: draft.kind,
        };
        Ok((event, guests))
    }

    pub fn find_event(&self, id: i64) -> CalShareResult<Option<Event>> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events e WHERE e.id = ?1");
        let event = self.conn().query_row(&sql, [id], event_from_row).optional()?;
        Ok(event)
    }

    /// Overwrite an event's fields. A draft without a color keeps the current one.
    pub fn update_event(&self, id: i64, draft: &EventDraft) -> CalShareResult<Option<Event>> {
        let updated = self.conn().execute(
            "UPDATE events SET name = ?1, content = ?2, start_at = ?3, end_at = ?4,
             color = COALESCE(?5, color), type = ?6 WHERE id = ?7",
            params![
                draft.name,
                draft.content,
                draft.start_at,
                draft.end_at,
                draft.color,
                draft.kind.as_str(),
                id,
            ],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        self.find_event(id)
    }

    /// Delete the event row; memberships and calendar links cascade.
    pub fn delete_event(&self, id: i64) -> CalShareResult<bool> {
        let deleted = self.conn().execute("DELETE FROM events WHERE id = ?1", [id])?;
        Ok(deleted > 0)
    }

    /// A guest leaves an event they reached through `calendar_id`.
    ///
    /// Drops the user's membership and, when no other member of that
    /// calendar still belongs to the event, the calendar's link to it, so
    /// later members of the calendar are not enrolled into it. Returns
    /// whether the link was removed.
    pub fn leave_event(&self, user_id: i64, event_id: i64, calendar_id: i64) -> CalShareResult<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM user_events WHERE user_id = ?1 AND event_id = ?2",
            [user_id, event_id],
        )?;
        let unlinked = tx.execute(
            "DELETE FROM calendar_events
             WHERE calendar_id = ?1 AND event_id = ?2
               AND NOT EXISTS (SELECT 1 FROM user_events ue
                               JOIN user_calendars uc ON uc.user_id = ue.user_id
                               WHERE ue.event_id = ?2 AND uc.calendar_id = ?1)",
            [calendar_id, event_id],
        )?;
        tx.commit()?;
        Ok(unlinked > 0)
    }

    /// Link an event into a calendar. Returns `false` if the link already existed.
    pub fn link_event_to_calendar(&self, calendar_id: i64, event_id: i64) -> CalShareResult<bool> {
        let inserted = self.conn().execute(
            "INSERT OR IGNORE INTO calendar_events (calendar_id, event_id) VALUES (?1, ?2)",
            [calendar_id, event_id],
        )?;
        Ok(inserted > 0)
    }

    pub fn event_calendar_ids(&self, event_id: i64) -> CalShareResult<Vec<i64>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT calendar_id FROM calendar_events WHERE event_id = ?1 ORDER BY calendar_id",
        )?;
        let ids = stmt
            .query_map([event_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    /// Events the user has a confirmed membership on that are linked to any
    /// of `calendar_ids`, optionally restricted to `types`.
    ///
    /// An event linked into several of the requested calendars is reported
    /// once, under the lowest calendar id.
    pub fn events_for_user(
        &self,
        user_id: i64,
        calendar_ids: &[i64],
        types: &[EventType],
    ) -> CalShareResult<Vec<EventListing>> {
        if calendar_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut values: Vec<rusqlite::types::Value> = vec![user_id.into()];
        let calendar_placeholders = calendar_ids
            .iter()
            .map(|id| {
                values.push((*id).into());
                format!("?{}", values.len())
            })
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!(
            "SELECT {EVENT_COLUMNS}, MIN(ce.calendar_id) AS calendar_id, m.role AS role
             FROM events e
             JOIN user_events m ON m.event_id = e.id AND m.user_id = ?1 AND m.is_confirmed = 1
             JOIN calendar_events ce ON ce.event_id = e.id
             WHERE ce.calendar_id IN ({calendar_placeholders})"
        );
        if !types.is_empty() {
            let type_placeholders = types
                .iter()
                .map(|t| {
                    values.push(t.as_str().to_string().into());
                    format!("?{}", values.len())
                })
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(" AND e.type IN ({type_placeholders})"));
        }
        sql.push_str(" GROUP BY e.id ORDER BY e.start_at, e.id");

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let events = stmt
            .query_map(params_from_iter(values), |row| {
                Ok(EventListing {
                    event: event_from_row(row)?,
                    calendar_id: row.get("calendar_id")?,
                    role: parse_text(row.get("role")?)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(events)
    }
}
