use uuid::Uuid;

use coachboard::models::{CoachLevel, Role};
use coachboard::services::permissions::{scope_for, CoachScope};

#[test]
fn visibility_narrows_down_the_hierarchy() {
    let super_admin = Uuid::new_v4();
    let principal = Uuid::new_v4();
    let junior = Uuid::new_v4();

    let admin_scope = scope_for(Role::Coach, Some(CoachLevel::SuperAdmin), super_admin, vec![]);
    let principal_scope = scope_for(
        Role::Coach,
        Some(CoachLevel::Principal),
        principal,
        vec![junior],
    );
    let junior_scope = scope_for(Role::Coach, Some(CoachLevel::Junior), junior, vec![]);

    // super admin sees the whole tree
    assert!(admin_scope.contains(principal));
    assert!(admin_scope.contains(junior));

    // principal sees itself and its juniors, not the admin
    assert!(principal_scope.contains(principal));
    assert!(principal_scope.contains(junior));
    assert!(!principal_scope.contains(super_admin));

    // junior sees only itself
    assert!(junior_scope.contains(junior));
    assert!(!junior_scope.contains(principal));
    assert!(!junior_scope.contains(super_admin));
}

#[test]
fn scope_filter_shape_matches_query_usage() {
    let me = Uuid::new_v4();

    let unrestricted = scope_for(Role::Coach, Some(CoachLevel::SuperAdmin), me, vec![]);
    assert!(unrestricted.as_filter().is_none());

    let restricted = scope_for(Role::Coach, Some(CoachLevel::Junior), me, vec![]);
    assert_eq!(restricted.as_filter().unwrap(), &[me]);
}

#[test]
fn coach_without_level_behaves_as_junior() {
    let me = Uuid::new_v4();
    let scope = scope_for(Role::Coach, None, me, vec![]);
    assert_eq!(scope, CoachScope::Coaches(vec![me]));
}
