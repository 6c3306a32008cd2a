use oxpager_common::types::TeamMember;
use rusqlite::{params, Row};

use crate::codec::text;
use crate::error::Result;
use crate::store::StoreView;

fn row_to_member(row: &Row<'_>) -> rusqlite::Result<TeamMember> {
    Ok(TeamMember {
        team_id: row.get(0)?,
        user_id: row.get(1)?,
        role: text(row, 2)?,
    })
}

impl StoreView<'_> {
    /// Adds a member or changes their role.
    pub fn upsert_team_member(&self, member: &TeamMember) -> Result<()> {
        self.conn().execute(
            "INSERT INTO team_members (team_id, user_id, role) VALUES (?1, ?2, ?3)
             ON CONFLICT(team_id, user_id) DO UPDATE SET role = excluded.role",
            params![&member.team_id, &member.user_id, member.role.as_str()],
        )?;
        Ok(())
    }

    pub fn team_members(&self) -> Result<Vec<TeamMember>> {
        let mut stmt = self.conn().prepare_cached(
            "SELECT team_id, user_id, role FROM team_members ORDER BY team_id, user_id",
        )?;
        let rows = stmt.query_map([], row_to_member)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}
