use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::UserSession;
use crate::models::{CoachLevel, Role};
use crate::services::ServiceError;

/// The set of coaches whose data a session may read.
///
/// Every read in notes, recommendations, profiles, and calendar filters
/// through one of these. Athletes resolve to an empty coach set; their reads
/// go through rows addressed to them instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoachScope {
    All,
    Coaches(Vec<Uuid>),
}

impl CoachScope {
    pub fn contains(&self, coach_id: Uuid) -> bool {
        match self {
            CoachScope::All => true,
            CoachScope::Coaches(ids) => ids.contains(&coach_id),
        }
    }

    /// Ids for a `coach_id = ANY($n)` filter. `None` means unrestricted.
    pub fn as_filter(&self) -> Option<&[Uuid]> {
        match self {
            CoachScope::All => None,
            CoachScope::Coaches(ids) => Some(ids),
        }
    }
}

/// Pure half of scope resolution: which coach ids a coach of the given level
/// may see. `supervised` is the set of coaches reporting to this one.
pub fn scope_for(
    role: Role,
    level: Option<CoachLevel>,
    self_id: Uuid,
    supervised: Vec<Uuid>,
) -> CoachScope {
    match (role, level) {
        (Role::Coach, Some(CoachLevel::SuperAdmin)) => CoachScope::All,
        (Role::Coach, Some(CoachLevel::Principal)) => {
            let mut ids = supervised;
            ids.push(self_id);
            CoachScope::Coaches(ids)
        }
        (Role::Coach, _) => CoachScope::Coaches(vec![self_id]),
        (Role::Athlete, _) => CoachScope::Coaches(Vec::new()),
    }
}

/// Resolve the session's coach scope, looking up supervised coaches for
/// principals.
pub async fn resolve_coach_scope(
    db: &PgPool,
    session: &UserSession,
) -> Result<CoachScope, ServiceError> {
    let supervised = match (session.role, session.coach_level) {
        (Role::Coach, Some(CoachLevel::Principal)) => {
            sqlx::query_scalar::<_, Uuid>("SELECT id FROM profiles WHERE supervisor_id = $1")
                .bind(session.user_id)
                .fetch_all(db)
                .await?
        }
        _ => Vec::new(),
    };

    Ok(scope_for(
        session.role,
        session.coach_level,
        session.user_id,
        supervised,
    ))
}

/// Whether an athlete's data falls inside the given coach scope. An athlete
/// with no assigned coach is visible only to super admins.
pub async fn athlete_in_scope(
    db: &PgPool,
    scope: &CoachScope,
    athlete_id: Uuid,
) -> Result<bool, ServiceError> {
    let row = sqlx::query_as::<_, (Role, Option<Uuid>)>(
        "SELECT role, coach_id FROM profiles WHERE id = $1",
    )
    .bind(athlete_id)
    .fetch_optional(db)
    .await?;

    let Some((role, coach_id)) = row else {
        return Ok(false);
    };
    if role != Role::Athlete {
        return Ok(false);
    }

    Ok(match scope {
        CoachScope::All => true,
        CoachScope::Coaches(ids) => coach_id.map_or(false, |c| ids.contains(&c)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn super_admin_sees_everything() {
        let scope = scope_for(
            Role::Coach,
            Some(CoachLevel::SuperAdmin),
            Uuid::new_v4(),
            vec![],
        );
        assert_eq!(scope, CoachScope::All);
        assert!(scope.contains(Uuid::new_v4()));
        assert!(scope.as_filter().is_none());
    }

    #[test]
    fn principal_sees_self_and_supervised() {
        let me = Uuid::new_v4();
        let junior_a = Uuid::new_v4();
        let junior_b = Uuid::new_v4();
        let outsider = Uuid::new_v4();

        let scope = scope_for(
            Role::Coach,
            Some(CoachLevel::Principal),
            me,
            vec![junior_a, junior_b],
        );

        assert!(scope.contains(me));
        assert!(scope.contains(junior_a));
        assert!(scope.contains(junior_b));
        assert!(!scope.contains(outsider));
        assert_eq!(scope.as_filter().unwrap().len(), 3);
    }

    #[test]
    fn junior_sees_only_self() {
        let me = Uuid::new_v4();
        let scope = scope_for(Role::Coach, Some(CoachLevel::Junior), me, vec![]);

        assert!(scope.contains(me));
        assert!(!scope.contains(Uuid::new_v4()));
        assert_eq!(scope.as_filter().unwrap(), &[me]);
    }

    #[test]
    fn principal_with_no_juniors_still_sees_self() {
        let me = Uuid::new_v4();
        let scope = scope_for(Role::Coach, Some(CoachLevel::Principal), me, vec![]);
        assert_eq!(scope, CoachScope::Coaches(vec![me]));
    }

    #[test]
    fn athlete_resolves_to_empty_scope() {
        let me = Uuid::new_v4();
        let scope = scope_for(Role::Athlete, None, me, vec![]);
        assert_eq!(scope, CoachScope::Coaches(vec![]));
        assert!(!scope.contains(me));
    }
}
