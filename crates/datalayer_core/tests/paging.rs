use datalayer_core::db::open_db_in_memory;
use datalayer_core::{
    Member, MemberDto, MemberRepository, PageRequest, Predicate, Query, RepoError, Sort, Team,
    UnitOfWork,
};
use rusqlite::Connection;
use std::collections::HashSet;

fn seed_members(uow: &UnitOfWork<'_>, count: usize, age: u32) {
    let members = uow.repository::<Member>();
    for n in 1..=count {
        members
            .save(Member::with_age(format!("member{n}"), age))
            .unwrap();
    }
}

fn usernames(members: &[Member]) -> Vec<&str> {
    members.iter().map(|member| member.username.as_str()).collect()
}

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

#[test]
fn first_page_sorted_by_username_descending() {
    let conn = setup();
    let uow = UnitOfWork::begin(&conn).unwrap();
    seed_members(&uow, 8, 10);
    let before = uow.stats();

    let request = PageRequest::of_sorted(0, 3, Sort::desc("username")).unwrap();
    let page = uow.repository::<Member>().find_by_age(10, &request).unwrap();

    assert_eq!(usernames(&page.content), vec!["member8", "member7", "member6"]);
    assert_eq!(page.total_elements, 8);
    assert_eq!(page.number, 0);
    assert_eq!(page.total_pages, 3);
    assert!(page.first);
    assert!(page.has_next);
    assert!(!page.last);

    let after = uow.stats();
    assert_eq!(after.selects - before.selects, 1);
    assert_eq!(after.counts - before.counts, 1);
}

#[test]
fn mapped_page_keeps_totals() {
    let conn = setup();
    let uow = UnitOfWork::begin(&conn).unwrap();
    seed_members(&uow, 8, 10);

    let request = PageRequest::of_sorted(0, 3, Sort::desc("username")).unwrap();
    let page = uow
        .repository::<Member>()
        .find_by_age(10, &request)
        .unwrap()
        .map(|member| MemberDto::from(&member));

    assert_eq!(page.content[0].username, "member8");
    assert_eq!(page.content[0].team_name, None);
    assert_eq!(page.total_elements, 8);
    assert_eq!(page.total_pages, 3);
}

#[test]
fn last_short_page_and_page_beyond_the_end() {
    let conn = setup();
    let uow = UnitOfWork::begin(&conn).unwrap();
    seed_members(&uow, 8, 10);
    let members = uow.repository::<Member>();

    let last = members
        .find_by_age(10, &PageRequest::of_sorted(2, 3, Sort::desc("username")).unwrap())
        .unwrap();
    assert_eq!(usernames(&last.content), vec!["member2", "member1"]);
    assert!(last.last);
    assert!(!last.has_next);
    assert!(last.has_previous);
    assert_eq!(last.total_elements, 8);

    let beyond = members
        .find_by_age(10, &PageRequest::of(7, 3).unwrap())
        .unwrap();
    assert!(beyond.content.is_empty());
    assert!(!beyond.has_next);
    assert_eq!(beyond.total_elements, 8);
    assert_eq!(beyond.total_pages, 3);
}

#[test]
fn short_first_page_skips_the_count_statement() {
    let conn = setup();
    let uow = UnitOfWork::begin(&conn).unwrap();
    seed_members(&uow, 2, 10);
    let before = uow.stats();

    let page = uow
        .repository::<Member>()
        .find_by_age(10, &PageRequest::of(0, 10).unwrap())
        .unwrap();

    assert_eq!(page.total_elements, 2);
    assert_eq!(page.total_pages, 1);
    assert_eq!(uow.stats().counts, before.counts);
}

#[test]
fn slice_reports_next_page_without_counting() {
    let conn = setup();
    let uow = UnitOfWork::begin(&conn).unwrap();
    seed_members(&uow, 8, 10);
    let before = uow.stats();

    let request = PageRequest::of_sorted(0, 3, Sort::desc("username")).unwrap();
    let slice = uow
        .repository::<Member>()
        .find_slice_by_age(10, &request)
        .unwrap();

    assert_eq!(usernames(&slice.content), vec!["member8", "member7", "member6"]);
    assert_eq!(slice.number, 0);
    assert!(slice.first);
    assert!(slice.has_next);
    let after = uow.stats();
    assert_eq!(after.counts, before.counts);
    assert_eq!(after.selects - before.selects, 1);
}

#[test]
fn duplicate_sort_keys_still_page_exhaustively() {
    let conn = setup();
    let uow = UnitOfWork::begin(&conn).unwrap();
    seed_members(&uow, 7, 30);
    let members = uow.repository::<Member>();

    let mut seen = HashSet::new();
    let mut request = PageRequest::of_sorted(0, 3, Sort::desc("age")).unwrap();
    loop {
        let page = members.find_page(&Query::all(), &request).unwrap();
        for member in &page.content {
            assert!(seen.insert(member.id.unwrap()), "member seen twice");
        }
        if !page.has_next {
            break;
        }
        request = request.next();
    }
    assert_eq!(seen.len(), 7);
}

#[test]
fn separate_count_query_with_team_fetch() {
    let conn = setup();
    let uow = UnitOfWork::begin(&conn).unwrap();
    let team = uow.repository::<Team>().save(Team::new("TeamA")).unwrap();
    let members = uow.repository::<Member>();
    members.save(Member::with_team("member1", 10, &team)).unwrap();
    members.save(Member::with_team("member2", 10, &team)).unwrap();
    members.save(Member::with_age("member3", 10)).unwrap();
    members.save(Member::with_age("member4", 10)).unwrap();
    uow.clear();

    let request = PageRequest::of_sorted(0, 3, Sort::desc("username")).unwrap();
    let page = members.find_member_all_count_by(&request).unwrap();

    assert_eq!(page.total_elements, 4);
    assert_eq!(usernames(&page.content), vec!["member4", "member3", "member2"]);
    assert!(page.content[2].team.as_ref().unwrap().is_loaded());
    assert!(page.content[0].team.is_none());
}

#[test]
fn zero_page_size_is_invalid_and_empty_store_has_zero_pages() {
    assert!(matches!(
        PageRequest::of(0, 0),
        Err(RepoError::InvalidPagination(_))
    ));

    let conn = setup();
    let uow = UnitOfWork::begin(&conn).unwrap();
    let page = uow
        .repository::<Member>()
        .find_page(&Query::filter(Predicate::all()), &PageRequest::of(0, 5).unwrap())
        .unwrap();
    assert_eq!(page.total_elements, 0);
    assert_eq!(page.total_pages, 0);
    assert!(page.first);
    assert!(!page.has_next);
}

#[test]
fn page_serializes_with_camel_case_keys() {
    let conn = setup();
    let uow = UnitOfWork::begin(&conn).unwrap();
    seed_members(&uow, 4, 10);

    let page = uow
        .repository::<Member>()
        .find_by_age(10, &PageRequest::of(0, 3).unwrap())
        .unwrap()
        .map(|member| MemberDto::from(&member));
    let json = serde_json::to_value(&page).unwrap();

    assert_eq!(json["totalElements"], 4);
    assert_eq!(json["totalPages"], 2);
    assert_eq!(json["hasNext"], true);
    assert_eq!(json["hasPrevious"], false);
    assert_eq!(json["content"][0]["username"], "member1");
    assert!(json["content"][0]["teamName"].is_null());
}
