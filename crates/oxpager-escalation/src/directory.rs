use oxpager_common::types::TeamRole;
use std::collections::HashMap;

/// User id that acts on behalf of the service (auto-acknowledge, sweeps).
/// It is never looked up in a directory.
pub const SYSTEM_USER: &str = "system";

/// Team membership as provided by the surrounding application.
pub trait TeamDirectory: Send + Sync {
    /// The user's role in the team, or `None` if they are not a member.
    fn role_of(&self, team_id: &str, user_id: &str) -> Option<TeamRole>;

    /// Whether the user is a member with at least `min_role`.
    fn has_role(&self, team_id: &str, user_id: &str, min_role: TeamRole) -> bool {
        self.role_of(team_id, user_id)
            .is_some_and(|role| role >= min_role)
    }
}

/// A fixed membership table, loaded from configuration.
///
/// # Examples
///
/// ```
/// use oxpager_escalation::directory::{StaticTeamDirectory, TeamDirectory};
/// use oxpager_common::types::TeamRole;
///
/// let mut dir = StaticTeamDirectory::default();
/// dir.insert("payments", "alice", TeamRole::Admin);
/// assert!(dir.has_role("payments", "alice", TeamRole::Member));
/// assert!(!dir.has_role("payments", "bob", TeamRole::Viewer));
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticTeamDirectory {
    teams: HashMap<String, HashMap<String, TeamRole>>,
}

impl StaticTeamDirectory {
    pub fn insert(&mut self, team_id: &str, user_id: &str, role: TeamRole) {
        self.teams
            .entry(team_id.to_string())
            .or_default()
            .insert(user_id.to_string(), role);
    }

    pub fn team_count(&self) -> usize {
        self.teams.len()
    }
}

impl TeamDirectory for StaticTeamDirectory {
    fn role_of(&self, team_id: &str, user_id: &str) -> Option<TeamRole> {
        self.teams.get(team_id)?.get(user_id).copied()
    }
}
