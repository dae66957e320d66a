//! Integration tests for the ticket store.

use ticketbook::{
    Category, ListFilter, ListQuery, Location, NewTicket, OwnerId, Patch, Place, QuotaUsage,
    RoutePoint, Store, StoreConfig, TicketError, TicketId, TicketPatch, Timestamp,
};
use tempfile::TempDir;

fn test_config(dir: &TempDir) -> StoreConfig {
    StoreConfig {
        path: dir.path().join("store"),
        create_if_missing: true,
        default_photo_quota: 100,
        sync_interval: 10,
    }
}

fn test_store(dir: &TempDir) -> Store {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    Store::create(test_config(dir)).unwrap()
}

fn day(n: u32) -> String {
    format!("2024-01-{:02}T12:00:00Z", n)
}

fn walk(store: &Store, owner: OwnerId, filter: ListFilter, limit: i64) -> Vec<Vec<TicketId>> {
    let mut pages = Vec::new();
    let mut query = ListQuery::new(filter).with_limit(limit);
    loop {
        let page = store.list_tickets(owner, &query).unwrap();
        pages.push(page.items.iter().map(|t| t.id).collect());
        match page.next_cursor {
            Some(cursor) => query = query.with_cursor(cursor),
            None => break,
        }
    }
    pages
}

// --- Realistic Workflow Tests ---

#[test]
fn test_photo_quota_workflow() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let owner = OwnerId(1);
    store.set_photo_quota(owner, 1).unwrap();

    let first = store
        .create_ticket(owner, NewTicket::new("a", "Hamlet", Category::Show).with_photo("p/a.jpg"))
        .unwrap();

    let blocked = store.create_ticket(
        owner,
        NewTicket::new("b", "Macbeth", Category::Show).with_photo("p/b.jpg"),
    );
    assert!(matches!(blocked, Err(TicketError::QuotaExceeded { quota: 1, .. })));

    // Without a photo the quota does not apply
    store
        .create_ticket(owner, NewTicket::new("c", "Lear", Category::Show))
        .unwrap();

    // Trashing keeps the photo slot taken
    store.delete_ticket(owner, first.id).unwrap();
    assert!(store
        .create_ticket(owner, NewTicket::new("b", "Macbeth", Category::Show).with_photo("p/b.jpg"))
        .is_err());

    // Purging frees it
    store.purge_ticket(owner, first.id).unwrap();
    store
        .create_ticket(owner, NewTicket::new("b", "Macbeth", Category::Show).with_photo("p/b.jpg"))
        .unwrap();

    assert_eq!(
        store.quota_usage(owner),
        QuotaUsage { total: 2, with_photo: 1, photo_quota: 1 }
    );
}

#[test]
fn test_paging_through_collection() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let owner = OwnerId(1);

    for n in 1..=25 {
        store
            .create_ticket(
                owner,
                NewTicket::new(format!("t-{n}"), format!("Film {n}"), Category::Movie)
                    .with_occurs_at(day(n)),
            )
            .unwrap();
    }

    let first = store
        .list_tickets(owner, &ListQuery::new(ListFilter::active()))
        .unwrap();
    assert_eq!(first.items.len(), 20);
    assert!(first.has_more);
    assert_eq!(first.total, 25);
    assert_eq!(first.items[0].name, "Film 25");
    let cursor = first.next_cursor.unwrap();

    let second = store
        .list_tickets(owner, &ListQuery::new(ListFilter::active()).with_cursor(cursor))
        .unwrap();
    assert_eq!(second.items.len(), 5);
    assert!(!second.has_more);
    assert!(second.next_cursor.is_none());
    assert_eq!(second.total, 25);
    assert_eq!(second.items.last().unwrap().name, "Film 1");

    // Cursor survives its token form
    let token = cursor.to_string();
    let again = store
        .list_tickets(
            owner,
            &ListQuery::new(ListFilter::active())
                .with_cursor_token(&token)
                .unwrap(),
        )
        .unwrap();
    assert_eq!(
        again.items.iter().map(|t| t.id).collect::<Vec<_>>(),
        second.items.iter().map(|t| t.id).collect::<Vec<_>>()
    );
}

#[test]
fn test_exact_page_has_no_cursor() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let owner = OwnerId(1);

    for n in 1..=5 {
        store
            .create_ticket(owner, NewTicket::new(format!("t-{n}"), "x", Category::Other))
            .unwrap();
    }

    let page = store
        .list_tickets(owner, &ListQuery::new(ListFilter::active()).with_limit(5))
        .unwrap();
    assert_eq!(page.items.len(), 5);
    assert!(!page.has_more);
    assert!(page.next_cursor.is_none());

    let empty = store
        .list_tickets(OwnerId(2), &ListQuery::new(ListFilter::active()))
        .unwrap();
    assert!(empty.items.is_empty());
    assert_eq!(empty.total, 0);
    assert!(!empty.has_more);
}

#[test]
fn test_same_date_orders_by_id() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let owner = OwnerId(1);

    let mut ids = Vec::new();
    for n in 0..7 {
        let t = store
            .create_ticket(
                owner,
                NewTicket::new(format!("t-{n}"), "x", Category::Train).with_occurs_at(day(3)),
            )
            .unwrap();
        ids.push(t.id);
    }
    ids.reverse();

    let pages = walk(&store, owner, ListFilter::active(), 3);
    assert_eq!(pages.len(), 3);
    assert_eq!(pages.concat(), ids);
}

#[test]
fn test_recycle_bin_lifecycle() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let owner = OwnerId(1);

    let ticket = store
        .create_ticket(owner, NewTicket::new("a", "Louvre", Category::Exhibition))
        .unwrap();

    let trashed = store.delete_ticket(owner, ticket.id).unwrap();
    assert!(trashed.state.is_trashed());
    assert!(trashed.trashed_at.is_some());

    // A second delete fails; so does purging an active ticket later
    assert!(matches!(
        store.delete_ticket(owner, ticket.id),
        Err(TicketError::NotFound(_))
    ));

    let active = store.list_tickets(owner, &ListQuery::new(ListFilter::active())).unwrap();
    let bin = store.list_tickets(owner, &ListQuery::new(ListFilter::trashed())).unwrap();
    assert_eq!(active.total, 0);
    assert_eq!(bin.total, 1);

    let restored = store.restore_ticket(owner, ticket.id).unwrap();
    assert!(!restored.state.is_trashed());
    assert!(restored.trashed_at.is_none());
    assert!(matches!(
        store.restore_ticket(owner, ticket.id),
        Err(TicketError::NotFound(_))
    ));
    assert!(matches!(
        store.purge_ticket(owner, ticket.id),
        Err(TicketError::NotFound(_))
    ));

    store.delete_ticket(owner, ticket.id).unwrap();
    let purged = store.purge_ticket(owner, ticket.id).unwrap();
    assert_eq!(purged.id, ticket.id);
    assert!(matches!(
        store.get_ticket(owner, ticket.id),
        Err(TicketError::NotFound(_))
    ));
    assert_eq!(store.quota_usage(owner).total, 0);

    // Client id is free again, under a fresh ticket id
    let again = store
        .create_ticket(owner, NewTicket::new("a", "Louvre", Category::Exhibition))
        .unwrap();
    assert!(again.id > ticket.id);
}

#[test]
fn test_purged_ticket_absent_from_every_listing() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let owner = OwnerId(1);

    let gone = store
        .create_ticket(
            owner,
            NewTicket::new("gone", "Terracotta Army", Category::Scenic).with_tags(["xian"]),
        )
        .unwrap();
    let kept_active = store
        .create_ticket(
            owner,
            NewTicket::new("active", "Huashan", Category::Scenic).with_tags(["xian"]),
        )
        .unwrap();
    let kept_trashed = store
        .create_ticket(
            owner,
            NewTicket::new("trashed", "Big Wild Goose", Category::Scenic).with_tags(["xian"]),
        )
        .unwrap();
    store.delete_ticket(owner, kept_trashed.id).unwrap();
    store.delete_ticket(owner, gone.id).unwrap();

    let filters = [
        ListFilter::active(),
        ListFilter::trashed(),
        ListFilter::active().with_category(Category::Scenic),
        ListFilter::trashed().with_category(Category::Scenic),
        ListFilter::active().with_tag("xian"),
        ListFilter::trashed().with_tag("xian"),
    ];
    let totals_before: Vec<u64> = filters
        .iter()
        .map(|f| store.list_tickets(owner, &ListQuery::new(f.clone())).unwrap().total)
        .collect();

    store.purge_ticket(owner, gone.id).unwrap();

    for (filter, before) in filters.iter().zip(totals_before) {
        let page = store
            .list_tickets(owner, &ListQuery::new(filter.clone()).with_limit(100))
            .unwrap();
        assert!(
            page.items.iter().all(|t| t.id != gone.id),
            "purged ticket listed under {filter:?}"
        );
        let expected = if filter.trashed { before - 1 } else { before };
        assert_eq!(page.total, expected, "{filter:?}");
    }

    let active = store
        .list_tickets(owner, &ListQuery::new(ListFilter::active()))
        .unwrap();
    assert_eq!(active.items.iter().map(|t| t.id).collect::<Vec<_>>(), vec![kept_active.id]);
    let bin = store
        .list_tickets(owner, &ListQuery::new(ListFilter::trashed()))
        .unwrap();
    assert_eq!(bin.items.iter().map(|t| t.id).collect::<Vec<_>>(), vec![kept_trashed.id]);
}

#[test]
fn test_other_owner_sees_nothing() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let alice = OwnerId(1);
    let bob = OwnerId(2);

    let ticket = store
        .create_ticket(alice, NewTicket::new("a", "Opera", Category::Show))
        .unwrap();

    assert!(matches!(store.get_ticket(bob, ticket.id), Err(TicketError::NotFound(_))));
    assert!(matches!(
        store.update_ticket(bob, ticket.id, TicketPatch::new().name("mine")),
        Err(TicketError::NotFound(_))
    ));
    assert!(matches!(store.delete_ticket(bob, ticket.id), Err(TicketError::NotFound(_))));
    assert_eq!(store.get_ticket(alice, ticket.id).unwrap().name, "Opera");
}

#[test]
fn test_client_id_conflict_spans_owners_and_states() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let owner = OwnerId(1);
    store.set_photo_quota(OwnerId(2), 0).unwrap();

    let ticket = store
        .create_ticket(owner, NewTicket::new("dup", "One", Category::Scenic))
        .unwrap();

    // Another owner, and a full quota: conflict still wins
    let other = store.create_ticket(
        OwnerId(2),
        NewTicket::new("dup", "Two", Category::Scenic).with_photo("p/x"),
    );
    assert!(matches!(other, Err(TicketError::Conflict { .. })));

    store.delete_ticket(owner, ticket.id).unwrap();
    let trashed = store.create_ticket(owner, NewTicket::new("dup", "Three", Category::Scenic));
    assert!(matches!(trashed, Err(TicketError::Conflict { .. })));

    assert_eq!(store.quota_usage(owner).total, 1);
    assert_eq!(store.quota_usage(OwnerId(2)).total, 0);
}

#[test]
fn test_update_dates_and_fields() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let owner = OwnerId(1);

    let ticket = store
        .create_ticket(
            owner,
            NewTicket::new("f-1", "MU5101", Category::Flight)
                .with_occurs_at("2024-05-01T08:00:00+08:00")
                .with_location(Location::Route {
                    departure: RoutePoint { city: "Shanghai".into(), ..Default::default() },
                    arrival: RoutePoint { city: "Beijing".into(), ..Default::default() },
                }),
        )
        .unwrap();
    assert_eq!(ticket.sort_key, Timestamp::parse_rfc3339("2024-05-01T00:00:00Z").unwrap());

    let moved = store
        .update_ticket(
            owner,
            ticket.id,
            TicketPatch::new().occurs_at(Patch::Set("2023-12-31T23:00:00Z".into())),
        )
        .unwrap();
    assert_eq!(moved.sort_key, moved.occurs_at.unwrap());
    assert_eq!(moved.created_at, ticket.created_at);
    assert!(moved.updated_at >= ticket.updated_at);

    let cleared = store
        .update_ticket(owner, ticket.id, TicketPatch::new().occurs_at(Patch::Clear))
        .unwrap();
    assert_eq!(cleared.occurs_at, None);
    assert_eq!(cleared.sort_key, cleared.created_at);

    let renamed = store
        .update_ticket(
            owner,
            ticket.id,
            TicketPatch::new()
                .name("MU5102")
                .tags(["work", "work", " "])
                .location(Patch::Set(Location::Single(Place {
                    city: Some("Beijing".into()),
                    ..Default::default()
                }))),
        )
        .unwrap();
    assert_eq!(renamed.name, "MU5102");
    assert_eq!(renamed.tags.as_slice(), ["work".to_string()]);
    assert!(matches!(renamed.location, Some(Location::Single(_))));
    assert_eq!(renamed.client_id, "f-1");
}

#[test]
fn test_blank_date_resets_sort_key_to_creation() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let owner = OwnerId(1);

    let ticket = store
        .create_ticket(
            owner,
            NewTicket::new("a", "Expo", Category::Exhibition).with_occurs_at(day(9)),
        )
        .unwrap();
    assert_ne!(ticket.sort_key, ticket.created_at);

    let cleared = store
        .update_ticket(owner, ticket.id, TicketPatch::new().occurs_at(Patch::Set(String::new())))
        .unwrap();
    assert_eq!(cleared.occurs_at, None);
    assert_eq!(cleared.sort_key, ticket.created_at);
}

#[test]
fn test_unparseable_date_is_ignored() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let owner = OwnerId(1);

    let ticket = store
        .create_ticket(
            owner,
            NewTicket::new("a", "Gig", Category::Show).with_occurs_at("next tuesday"),
        )
        .unwrap();
    assert_eq!(ticket.occurs_at, None);
    assert_eq!(ticket.sort_key, ticket.created_at);
}

#[test]
fn test_photo_updates_track_quota() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let owner = OwnerId(1);
    store.set_photo_quota(owner, 1).unwrap();

    let a = store
        .create_ticket(owner, NewTicket::new("a", "A", Category::Movie))
        .unwrap();
    let b = store
        .create_ticket(owner, NewTicket::new("b", "B", Category::Movie))
        .unwrap();

    store
        .update_ticket(owner, a.id, TicketPatch::new().photo(Patch::Set("p/a".into())))
        .unwrap();
    assert_eq!(store.quota_usage(owner).with_photo, 1);

    // Replacing an existing photo needs no extra slot
    store
        .update_ticket(owner, a.id, TicketPatch::new().photo(Patch::Set("p/a2".into())))
        .unwrap();

    let blocked =
        store.update_ticket(owner, b.id, TicketPatch::new().photo(Patch::Set("p/b".into())));
    assert!(matches!(blocked, Err(TicketError::QuotaExceeded { .. })));
    assert_eq!(store.get_ticket(owner, b.id).unwrap().photo, None);

    store
        .update_ticket(owner, a.id, TicketPatch::new().photo(Patch::Set(String::new())))
        .unwrap();
    assert_eq!(store.quota_usage(owner).with_photo, 0);
    store
        .update_ticket(owner, b.id, TicketPatch::new().photo(Patch::Set("p/b".into())))
        .unwrap();
    assert_eq!(store.quota_usage(owner).with_photo, 1);
}

#[test]
fn test_filters() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let owner = OwnerId(1);

    store
        .create_ticket(
            owner,
            NewTicket::new("1", "G1", Category::Train).with_tags(["business", "family"]),
        )
        .unwrap();
    store
        .create_ticket(owner, NewTicket::new("2", "CA981", Category::Flight).with_tags(["business"]))
        .unwrap();
    store
        .create_ticket(owner, NewTicket::new("3", "Oppenheimer", Category::Movie))
        .unwrap();

    let trains = store
        .list_tickets(
            owner,
            &ListQuery::new(ListFilter::active().with_category(Category::Train)),
        )
        .unwrap();
    assert_eq!(trains.total, 1);
    assert_eq!(trains.items[0].name, "G1");

    let business = store
        .list_tickets(owner, &ListQuery::new(ListFilter::active().with_tag("business")))
        .unwrap();
    assert_eq!(business.total, 2);

    let partial = store
        .list_tickets(owner, &ListQuery::new(ListFilter::active().with_tag("busi")))
        .unwrap();
    assert_eq!(partial.total, 0);

    let blank = store
        .list_tickets(owner, &ListQuery::new(ListFilter::active().with_tag("")))
        .unwrap();
    assert_eq!(blank.total, 3);
}

#[test]
fn test_out_of_range_limit_uses_default() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let owner = OwnerId(1);

    for n in 0..30 {
        store
            .create_ticket(owner, NewTicket::new(format!("t-{n}"), "x", Category::Other))
            .unwrap();
    }

    for limit in [0, -1, 101, 10_000] {
        let page = store
            .list_tickets(owner, &ListQuery::new(ListFilter::active()).with_limit(limit))
            .unwrap();
        assert_eq!(page.items.len(), 20, "limit {limit}");
    }
    let page = store
        .list_tickets(owner, &ListQuery::new(ListFilter::active()).with_limit(100))
        .unwrap();
    assert_eq!(page.items.len(), 30);
}

// --- Persistence Tests ---

#[test]
fn test_reopen_restores_everything() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let owner = OwnerId(3);

    let (before, usage) = {
        let store = Store::create(config.clone()).unwrap();
        store.set_photo_quota(owner, 4).unwrap();
        for n in 1..=6 {
            let input = NewTicket::new(format!("t-{n}"), format!("T{n}"), Category::Show)
                .with_occurs_at(day(n));
            let input = if n % 2 == 0 { input.with_photo(format!("p/{n}")) } else { input };
            store.create_ticket(owner, input).unwrap();
        }
        store.delete_ticket(owner, TicketId(2)).unwrap();
        store.delete_ticket(owner, TicketId(3)).unwrap();
        store.purge_ticket(owner, TicketId(3)).unwrap();
        store
            .update_ticket(owner, TicketId(1), TicketPatch::new().note(Patch::Set("front row".into())))
            .unwrap();

        let before = walk(&store, owner, ListFilter::active(), 2);
        (before, store.quota_usage(owner))
    };

    let store = Store::open(config).unwrap();
    assert_eq!(walk(&store, owner, ListFilter::active(), 2), before);
    assert_eq!(store.quota_usage(owner), usage);
    assert_eq!(usage, QuotaUsage { total: 5, with_photo: 3, photo_quota: 4 });
    assert_eq!(
        store.get_ticket(owner, TicketId(1)).unwrap().note.as_deref(),
        Some("front row")
    );
    assert!(store.get_ticket(owner, TicketId(2)).unwrap().state.is_trashed());

    // Next id continues past everything ever assigned
    let next = store
        .create_ticket(owner, NewTicket::new("t-7", "T7", Category::Show))
        .unwrap();
    assert_eq!(next.id, TicketId(7));
}

#[test]
fn test_compaction_keeps_state_and_ids() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let owner = OwnerId(1);

    {
        let store = Store::create(config.clone()).unwrap();
        store.set_photo_quota(owner, 2).unwrap();
        for n in 1..=10 {
            store
                .create_ticket(owner, NewTicket::new(format!("t-{n}"), "x", Category::Movie))
                .unwrap();
        }
        for n in 6..=10 {
            store.delete_ticket(owner, TicketId(n)).unwrap();
            store.purge_ticket(owner, TicketId(n)).unwrap();
        }

        let before = store.stats();
        store.compact().unwrap();
        let after = store.stats();
        assert_eq!(after.ticket_count, 5);
        assert!(after.log_size_bytes < before.log_size_bytes);
        assert!(after.log_entries < before.log_entries);

        // Still writable after the rewrite
        store.delete_ticket(owner, TicketId(5)).unwrap();
    }

    let store = Store::open(config).unwrap();
    assert_eq!(store.stats().ticket_count, 5);
    assert_eq!(store.quota_usage(owner).photo_quota, 2);
    assert!(store.get_ticket(owner, TicketId(5)).unwrap().state.is_trashed());

    let fresh = store
        .create_ticket(owner, NewTicket::new("t-10", "x", Category::Movie))
        .unwrap();
    assert_eq!(fresh.id, TicketId(11));
}
