use rusqlite::{OptionalExtension, params};

use super::{Store, parse_text};
use crate::error::CalShareResult;
use crate::membership::{Member, Membership, ResourceKind};
use crate::role::Role;

impl Store {
    /// The user's membership row on a calendar or event, if any.
    pub fn find_membership(
        &self,
        kind: ResourceKind,
        user_id: i64,
        resource_id: i64,
    ) -> CalShareResult<Option<Membership>> {
        let sql = format!(
            "SELECT role, is_confirmed FROM {table} WHERE user_id = ?1 AND {column} = ?2",
            table = kind.table(),
            column = kind.column(),
        );

        let membership = self
            .conn()
            .query_row(&sql, [user_id, resource_id], |row| {
                Ok(Membership {
                    user_id,
                    kind,
                    resource_id,
                    role: parse_text(row.get(0)?)?,
                    is_confirmed: row.get(1)?,
                })
            })
            .optional()?;
        Ok(membership)
    }

    pub fn insert_membership(
        &self,
        kind: ResourceKind,
        user_id: i64,
        resource_id: i64,
        role: Role,
        is_confirmed: bool,
    ) -> CalShareResult<Membership> {
        let sql = format!(
            "INSERT INTO {table} (user_id, {column}, role, is_confirmed) VALUES (?1, ?2, ?3, ?4)",
            table = kind.table(),
            column = kind.column(),
        );
        self.conn().execute(
            &sql,
            params![user_id, resource_id, role.as_str(), is_confirmed],
        )?;

        Ok(Membership {
            user_id,
            kind,
            resource_id,
            role,
            is_confirmed,
        })
    }

    /// Flip a membership to confirmed. Returns `false` when no such row exists.
    /// Confirmation is one-way; confirming an already confirmed row is a no-op.
    pub fn confirm_membership(
        &self,
        kind: ResourceKind,
        user_id: i64,
        resource_id: i64,
    ) -> CalShareResult<bool> {
        let sql = format!(
            "UPDATE {table} SET is_confirmed = 1 WHERE user_id = ?1 AND {column} = ?2",
            table = kind.table(),
            column = kind.column(),
        );
        let updated = self.conn().execute(&sql, [user_id, resource_id])?;
        Ok(updated > 0)
    }

    #[cfg(test)]
    pub(crate) fn delete_membership(
        &self,
        kind: ResourceKind,
        user_id: i64,
        resource_id: i64,
    ) -> CalShareResult<bool> {
        let sql = format!(
            "DELETE FROM {table} WHERE user_id = ?1 AND {column} = ?2",
            table = kind.table(),
            column = kind.column(),
        );
        let deleted = self.conn().execute(&sql, [user_id, resource_id])?;
        Ok(deleted > 0)
    }

    /// Everyone holding a membership on the resource except `excluding`.
    pub fn members(
        &self,
        kind: ResourceKind,
        resource_id: i64,
        excluding: i64,
    ) -> CalShareResult<Vec<Member>> {
        let sql = format!(
            "SELECT u.id, u.login, u.email, m.role, m.is_confirmed
             FROM users u JOIN {table} m ON m.user_id = u.id
             WHERE m.{column} = ?1 AND u.id != ?2
             ORDER BY u.id",
            table = kind.table(),
            column = kind.column(),
        );

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let members = stmt
            .query_map([resource_id, excluding], |row| {
                Ok(Member {
                    id: row.get(0)?,
                    login: row.get(1)?,
                    email: row.get(2)?,
                    role: parse_text(row.get(3)?)?,
                    is_confirmed: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(members)
    }

    /// The lowest-id calendar on which the user holds `role`.
    pub fn first_calendar_with_role(&self, user_id: i64, role: Role) -> CalShareResult<Option<i64>> {
        let id = self
            .conn()
            .query_row(
                "SELECT calendar_id FROM user_calendars
                 WHERE user_id = ?1 AND role = ?2
                 ORDER BY calendar_id LIMIT 1",
                params![user_id, role.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Enroll the user as a guest on every event currently linked to the
    /// calendar. Runs as a single transaction and skips events the user is
    /// already a member of, so replaying it is harmless. Returns the number
    /// of memberships created.
    pub fn enroll_guest_in_calendar_events(
        &self,
        user_id: i64,
        calendar_id: i64,
    ) -> CalShareResult<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let created = tx.execute(
            "INSERT OR IGNORE INTO user_events (user_id, event_id, role)
             SELECT ?1, event_id, 'guest' FROM calendar_events WHERE calendar_id = ?2",
            [user_id, calendar_id],
        )?;
        tx.commit()?;
        Ok(created)
    }
}
