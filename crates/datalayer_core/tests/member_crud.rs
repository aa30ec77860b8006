use datalayer_core::db::open_db_in_memory;
use datalayer_core::{
    Entity, Item, Member, MemberRepository, RepoError, Team, UnitOfWork, ValidationError,
};
use uuid::Uuid;

#[test]
fn save_assigns_identifier_and_find_returns_equal_member() {
    let conn = open_db_in_memory().unwrap();
    let uow = UnitOfWork::begin(&conn).unwrap();
    let members = uow.repository::<Member>();

    let saved = members.save(Member::new("MemberA")).unwrap();
    let id = saved.id.unwrap();
    let found = members.find_by_id(&id).unwrap().unwrap();

    assert_eq!(found.id, saved.id);
    assert_eq!(found.username, "MemberA");
    assert_eq!(found, saved);
}

#[test]
fn basic_crud() {
    let conn = open_db_in_memory().unwrap();
    let uow = UnitOfWork::begin(&conn).unwrap();
    let members = uow.repository::<Member>();

    let member1 = members.save(Member::new("Member1")).unwrap();
    let member2 = members.save(Member::new("Member2")).unwrap();

    assert_eq!(members.get_by_id(&member1.id.unwrap()).unwrap(), member1);
    assert_eq!(members.get_by_id(&member2.id.unwrap()).unwrap(), member2);
    assert_eq!(members.find_all().unwrap().len(), 2);
    assert_eq!(members.count().unwrap(), 2);

    assert!(members.delete(&member1).unwrap());
    assert!(members.delete(&member2).unwrap());
    assert_eq!(members.count().unwrap(), 0);
    assert!(!members.delete(&member1).unwrap());
}

#[test]
fn missing_identifier_is_none_for_find_and_not_found_for_get() {
    let conn = open_db_in_memory().unwrap();
    let uow = UnitOfWork::begin(&conn).unwrap();
    let members = uow.repository::<Member>();

    assert_eq!(members.find_by_id(&42).unwrap(), None);
    assert!(!members.exists_by_id(&42).unwrap());
    let err = members.get_by_id(&42).unwrap_err();
    assert!(matches!(
        err,
        RepoError::NotFound { entity: "Member", ref id } if id == "42"
    ));
}

#[test]
fn find_by_username_and_age_greater_than() {
    let conn = open_db_in_memory().unwrap();
    let uow = UnitOfWork::begin(&conn).unwrap();
    let members = uow.repository::<Member>();
    members.save(Member::with_age("AAA", 10)).unwrap();
    members.save(Member::with_age("AAA", 20)).unwrap();

    let found = members
        .find_by_username_and_age_greater_than("AAA", 15)
        .unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].username, "AAA");
    assert_eq!(found[0].age, 20);
}

#[test]
fn finders_by_username_and_age() {
    let conn = open_db_in_memory().unwrap();
    let uow = UnitOfWork::begin(&conn).unwrap();
    let members = uow.repository::<Member>();
    members.save(Member::with_age("AAA", 10)).unwrap();
    members.save(Member::with_age("BBB", 20)).unwrap();

    let by_name = members.find_by_username("AAA").unwrap();
    assert_eq!(by_name.len(), 1);
    assert_eq!(by_name[0].age, 10);

    let user = members.find_user("AAA", 10).unwrap();
    assert_eq!(user.len(), 1);
    assert!(members.find_user("AAA", 20).unwrap().is_empty());

    let names = members.find_username_list().unwrap();
    assert!(names.contains(&"AAA".to_string()));
    assert!(names.contains(&"BBB".to_string()));
    assert!(!names.contains(&"CCC".to_string()));
}

#[test]
fn find_by_names_keeps_insertion_order() {
    let conn = open_db_in_memory().unwrap();
    let uow = UnitOfWork::begin(&conn).unwrap();
    let members = uow.repository::<Member>();
    members.save(Member::with_age("AAA", 10)).unwrap();
    members.save(Member::with_age("BBB", 20)).unwrap();
    members.save(Member::with_age("CCC", 30)).unwrap();

    let found = members.find_by_names(&["AAA", "BBB"]).unwrap();
    let names: Vec<_> = found.iter().map(|member| member.username.as_str()).collect();
    assert_eq!(names, vec!["AAA", "BBB"]);
    assert!(members.find_by_names(&[]).unwrap().is_empty());
}

#[test]
fn single_result_finders() {
    let conn = open_db_in_memory().unwrap();
    let uow = UnitOfWork::begin(&conn).unwrap();
    let members = uow.repository::<Member>();
    members.save(Member::with_age("AAA", 10)).unwrap();
    members.save(Member::with_age("BBB", 20)).unwrap();

    let list = members.find_list_by_username("AAA").unwrap();
    assert_eq!(list[0].username, "AAA");
    let single = members.find_member_by_username("BBB").unwrap().unwrap();
    assert_eq!(single.username, "BBB");
    assert_eq!(members.find_member_by_username("ZZZ").unwrap(), None);

    members.save(Member::with_age("AAA", 30)).unwrap();
    let err = members.find_member_by_username("AAA").unwrap_err();
    assert!(matches!(
        err,
        RepoError::NonUniqueResult {
            entity: "Member",
            count: 2
        }
    ));
}

#[test]
fn member_dto_requires_team() {
    let conn = open_db_in_memory().unwrap();
    let uow = UnitOfWork::begin(&conn).unwrap();
    let team_a = uow.repository::<Team>().save(Team::new("TeamA")).unwrap();
    let members = uow.repository::<Member>();
    members.save(Member::with_team("AAA", 10, &team_a)).unwrap();
    members.save(Member::with_age("loner", 10)).unwrap();

    let dtos = members.find_member_dto().unwrap();

    assert_eq!(dtos.len(), 1);
    assert_eq!(dtos[0].username, "AAA");
    assert_eq!(dtos[0].team_name.as_deref(), Some("TeamA"));
}

#[test]
fn blank_username_is_rejected_before_any_write() {
    let conn = open_db_in_memory().unwrap();
    let uow = UnitOfWork::begin(&conn).unwrap();
    let members = uow.repository::<Member>();

    let err = members.save(Member::new("   ")).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(ValidationError::Blank {
            entity: "Member",
            field: "username"
        })
    ));
    assert_eq!(uow.stats().writes, 0);
}

#[test]
fn unsaved_team_is_a_transient_reference() {
    let conn = open_db_in_memory().unwrap();
    let uow = UnitOfWork::begin(&conn).unwrap();

    let err = uow
        .repository::<Member>()
        .save(Member::with_team("m1", 1, &Team::new("unsaved")))
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::TransientReference {
            entity: "Member",
            relation: "team"
        }
    ));
}

#[test]
fn save_with_unknown_identifier_inserts_with_that_identifier() {
    let conn = open_db_in_memory().unwrap();
    let uow = UnitOfWork::begin(&conn).unwrap();
    let members = uow.repository::<Member>();

    let mut detached = Member::with_age("restored", 33);
    detached.id = Some(77);
    let saved = members.save(detached).unwrap();

    assert_eq!(saved.id, Some(77));
    assert!(members.exists_by_id(&77).unwrap());
    uow.clear();
    assert_eq!(members.get_by_id(&77).unwrap().username, "restored");
}

#[test]
fn item_with_assigned_identifier_is_new_until_stamped() {
    let conn = open_db_in_memory().unwrap();
    let uow = UnitOfWork::begin(&conn).unwrap();
    let items = uow.repository::<Item>();
    let id = Uuid::new_v4();

    let fresh = Item::new(id);
    assert!(fresh.is_new());
    let saved = items.save(fresh).unwrap();
    assert!(!saved.is_new());
    assert!(saved.audit.created_date.is_some());

    let writes = uow.stats().writes;
    items.save(saved.clone()).unwrap();
    assert_eq!(uow.flush().unwrap(), 0);
    assert_eq!(uow.stats().writes, writes);

    uow.clear();
    let loaded = items.get_by_id(&id).unwrap();
    assert_eq!(loaded, saved);
}

#[test]
fn delete_all_removes_rows_and_managed_instances() {
    let conn = open_db_in_memory().unwrap();
    let uow = UnitOfWork::begin(&conn).unwrap();
    let members = uow.repository::<Member>();
    let kept = members
        .save_all(vec![Member::new("a"), Member::new("b")])
        .unwrap();

    assert_eq!(members.delete_all().unwrap(), 2);
    assert!(!uow.is_managed::<Member>(&kept[0].id.unwrap()));
    assert_eq!(members.count().unwrap(), 0);
}
