use uuid::Uuid;

use coachboard::auth::{extract_bearer_token, JwtService};
use coachboard::models::{CoachLevel, Role};

#[test]
fn session_round_trips_coach_hierarchy_fields() {
    let jwt = JwtService::new("integration-secret");
    let user_id = Uuid::new_v4();

    for (role, level) in [
        (Role::Athlete, None),
        (Role::Coach, Some(CoachLevel::Junior)),
        (Role::Coach, Some(CoachLevel::Principal)),
        (Role::Coach, Some(CoachLevel::SuperAdmin)),
    ] {
        let token = jwt
            .create_access_token(user_id, "user@example.com", role, level)
            .unwrap();
        let session = jwt.extract_user_session(&token).unwrap();

        assert_eq!(session.user_id, user_id);
        assert_eq!(session.role, role);
        assert_eq!(session.coach_level, level);
        assert_eq!(
            session.is_super_admin(),
            level == Some(CoachLevel::SuperAdmin)
        );
    }
}

#[test]
fn tampered_tokens_are_rejected() {
    let jwt = JwtService::new("integration-secret");
    let token = jwt
        .create_access_token(Uuid::new_v4(), "x@example.com", Role::Athlete, None)
        .unwrap();

    let mut tampered = token.clone();
    tampered.pop();
    tampered.push(if token.ends_with('A') { 'B' } else { 'A' });

    assert!(jwt.validate_token(&tampered).is_err());
}

#[test]
fn bearer_header_parsing_matches_middleware_expectations() {
    assert_eq!(extract_bearer_token("Bearer abc.def.ghi").unwrap(), "abc.def.ghi");
    assert!(extract_bearer_token("bearer abc").is_err());
    assert!(extract_bearer_token("Basic abc").is_err());
    assert!(extract_bearer_token("Bearer ").is_err());
}
