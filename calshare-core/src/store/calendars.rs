use chrono::Utc;
use rusqlite::{OptionalExtension, Row, params, params_from_iter};

use super::{Store, parse_text};
use crate::calendar::{Calendar, CalendarUpdate, CalendarWithRole, NewCalendar};
use crate::constants::DEFAULT_CALENDAR_COLOR;
use crate::error::CalShareResult;
use crate::role::Role;

fn calendar_from_row(row: &Row<'_>) -> rusqlite::Result<Calendar> {
    Ok(Calendar {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        color: row.get("color")?,
    })
}

impl Store {
    /// Create a calendar with `owner_id` as its confirmed admin.
    pub fn create_calendar(&self, owner_id: i64, new: &NewCalendar) -> CalShareResult<Calendar> {
        let color = new.color.as_deref().unwrap_or(DEFAULT_CALENDAR_COLOR);

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO calendars (name, description, color, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![new.name, new.description, color, Utc::now()],
        )?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO user_calendars (user_id, calendar_id, role, is_confirmed)
             VALUES (?1, ?2, ?3, 1)",
            params![owner_id, id, Role::Admin.as_str()],
        )?;
        tx.commit()?;

        Ok(Calendar {
            id,
            name: new.name.clone(),
            description: new.description.clone(),
            color: color.to_string(),
        })
    }

    pub fn find_calendar(&self, id: i64) -> CalShareResult<Option<Calendar>> {
        let calendar = self
            .conn()
            .query_row(
                "SELECT id, name, description, color FROM calendars WHERE id = ?1",
                [id],
                calendar_from_row,
            )
            .optional()?;
        Ok(calendar)
    }

    pub fn update_calendar(
        &self,
        id: i64,
        update: &CalendarUpdate,
    ) -> CalShareResult<Option<Calendar>> {
        let updated = self.conn().execute(
            "UPDATE calendars SET name = ?1, description = ?2, color = ?3 WHERE id = ?4",
            params![update.name, update.description, update.color, id],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        self.find_calendar(id)
    }

    /// Delete a calendar together with the events that live only in it.
    ///
    /// Events also linked into another calendar survive and just lose this
    /// link. Membership and link rows go through `ON DELETE CASCADE`.
    pub fn delete_calendar(&self, id: i64) -> CalShareResult<Option<Calendar>> {
        let Some(calendar) = self.find_calendar(id)? else {
            return Ok(None);
        };

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let events = tx.execute(
            "DELETE FROM events WHERE id IN
             (SELECT ce.event_id FROM calendar_events ce
              WHERE ce.calendar_id = ?1
                AND NOT EXISTS (SELECT 1 FROM calendar_events o
                                WHERE o.event_id = ce.event_id AND o.calendar_id != ?1))",
            [id],
        )?;
        tx.execute("DELETE FROM calendars WHERE id = ?1", [id])?;
        tx.commit()?;

        tracing::debug!(calendar_id = id, events, "calendar deleted");
        Ok(Some(calendar))
    }

    /// Calendars the user is a confirmed member of, optionally restricted to
    /// the given roles, each tagged with the user's role.
    pub fn calendars_for_user(
        &self,
        user_id: i64,
        roles: &[Role],
    ) -> CalShareResult<Vec<CalendarWithRole>> {
        let mut sql = String::from(
            "SELECT c.id, c.name, c.description, c.color, m.role
             FROM calendars c JOIN user_calendars m ON m.calendar_id = c.id
             WHERE m.user_id = ?1 AND m.is_confirmed = 1",
        );
        if !roles.is_empty() {
            let placeholders = (0..roles.len())
                .map(|i| format!("?{}", i + 2))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(" AND m.role IN ({placeholders})"));
        }
        sql.push_str(" ORDER BY c.id");

        let mut values: Vec<rusqlite::types::Value> = vec![user_id.into()];
        values.extend(roles.iter().map(|r| r.as_str().to_string().into()));

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let calendars = stmt
            .query_map(params_from_iter(values), |row| {
                Ok(CalendarWithRole {
                    calendar: calendar_from_row(row)?,
                    role: parse_text(row.get("role")?)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(calendars)
    }

    /// Ids of every calendar the user is a confirmed member of.
    pub fn confirmed_calendar_ids(&self, user_id: i64) -> CalShareResult<Vec<i64>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT calendar_id FROM user_calendars
             WHERE user_id = ?1 AND is_confirmed = 1 ORDER BY calendar_id",
        )?;
        let ids = stmt
            .query_map([user_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }
}
