//! Reservation and loan lifecycle tests

use std::sync::Arc;

use libris_server::{
    error::AppError,
    models::{borrow_record::RecordFilter, BookInput, BorrowStatus},
    repository::{Store, UnitOfWork},
    services::loans::MAX_RESERVATION_DAYS,
};

use crate::common::{date, harness, harness_with_store, FailingStore, ODYSSEY};

const PRIDE: &str = "9780141439518";

#[tokio::test]
async fn test_reserve_issue_return_flow() {
    let h = harness();
    h.add_book(ODYSSEY, 1).await;
    let reader = h.add_reader("reader@example.org").await;

    let record_id = h.services.loans.reserve_book(ODYSSEY, reader.id, None).await.unwrap();
    let record = h.services.loans.get_record(record_id).await.unwrap();
    assert_eq!(record.status, BorrowStatus::Reserved);
    assert_eq!(record.borrow_date, date(2024, 2, 20));
    assert_eq!(record.reservation_expiry, Some(date(2024, 2, 23)));
    assert_eq!(h.copies(ODYSSEY).await, 0);

    let issued = h.services.loans.issue_book(record_id).await.unwrap();
    assert_eq!(issued.status, BorrowStatus::Issued);
    assert_eq!(issued.issue_date, Some(date(2024, 2, 20)));
    assert_eq!(issued.reservation_expiry, None);
    assert_eq!(h.copies(ODYSSEY).await, 0);

    let returned = h
        .services
        .loans
        .return_book_by_record(record_id, "2024-03-01")
        .await
        .unwrap();
    assert_eq!(returned.status, BorrowStatus::Returned);
    assert_eq!(returned.return_date, Some(date(2024, 3, 1)));
    assert_eq!(h.copies(ODYSSEY).await, 1);
}

#[tokio::test]
async fn test_reserve_cancel_reserve_restores_count() {
    let h = harness();
    h.add_book(ODYSSEY, 2).await;
    let reader = h.add_reader("reader@example.org").await;

    let first = h.services.loans.reserve_book(ODYSSEY, reader.id, None).await.unwrap();
    assert_eq!(h.copies(ODYSSEY).await, 1);
    h.services.loans.cancel_reservation(first).await.unwrap();
    assert_eq!(h.copies(ODYSSEY).await, 2);

    let second = h.services.loans.reserve_book(ODYSSEY, reader.id, None).await.unwrap();
    assert_ne!(first, second);
    assert_eq!(h.copies(ODYSSEY).await, 1);
    h.services.loans.cancel_reservation(second).await.unwrap();
    assert_eq!(h.copies(ODYSSEY).await, 2);
}

#[tokio::test]
async fn test_issue_non_reserved_is_conflict_and_count_unchanged() {
    let h = harness();
    h.add_book(ODYSSEY, 1).await;
    let reader = h.add_reader("reader@example.org").await;

    let record_id = h.services.loans.reserve_book(ODYSSEY, reader.id, None).await.unwrap();
    h.services.loans.issue_book(record_id).await.unwrap();

    let err = h.services.loans.issue_book(record_id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(h.copies(ODYSSEY).await, 0);

    h.services.loans.cancel_issued_book(record_id).await.unwrap();
    assert_eq!(h.copies(ODYSSEY).await, 1);

    let err = h.services.loans.issue_book(record_id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(h.copies(ODYSSEY).await, 1);
}

#[tokio::test]
async fn test_cancel_reservation_only_from_reserved() {
    let h = harness();
    h.add_book(ODYSSEY, 1).await;
    let reader = h.add_reader("reader@example.org").await;

    let record_id = h.services.loans.reserve_book(ODYSSEY, reader.id, None).await.unwrap();
    h.services.loans.issue_book(record_id).await.unwrap();

    let err = h.services.loans.cancel_reservation(record_id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let err = h.services.loans.cancel_issued_book(999).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(h.copies(ODYSSEY).await, 0);
}

#[tokio::test]
async fn test_return_validation() {
    let h = harness();
    h.add_book(ODYSSEY, 1).await;
    let reader = h.add_reader("reader@example.org").await;
    let record_id = h.services.loans.reserve_book(ODYSSEY, reader.id, None).await.unwrap();

    // still reserved
    let err = h
        .services
        .loans
        .return_book_by_record(record_id, "2024-03-01")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    h.services.loans.issue_book(record_id).await.unwrap();

    let err = h
        .services
        .loans
        .return_book_by_record(record_id, "01/03/2024")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = h
        .services
        .loans
        .return_book_by_record(record_id, "2024-02-19")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(h.copies(ODYSSEY).await, 0);
}

#[tokio::test]
async fn test_reserve_errors() {
    let h = harness();
    h.add_book(ODYSSEY, 0).await;
    let reader = h.add_reader("reader@example.org").await;

    let err = h.services.loans.reserve_book(ODYSSEY, reader.id, None).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(ref m) if m == "No copies available"));

    let err = h.services.loans.reserve_book(PRIDE, reader.id, None).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = h.services.loans.reserve_book(ODYSSEY, 4242, None).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = h.services.loans.reserve_book("", reader.id, None).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = h.services.loans.reserve_book(ODYSSEY, reader.id, Some(0)).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(h.copies(ODYSSEY).await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reservations_take_single_copy() {
    let h = harness();
    h.add_book(ODYSSEY, 1).await;
    let first = h.add_reader("first@example.org").await;
    let second = h.add_reader("second@example.org").await;

    let loans_a = h.services.loans.clone();
    let loans_b = h.services.loans.clone();
    let a = tokio::spawn(async move { loans_a.reserve_book(ODYSSEY, first.id, None).await });
    let b = tokio::spawn(async move { loans_b.reserve_book(ODYSSEY, second.id, None).await });
    let results = vec![a.await.unwrap(), b.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let failure = results.into_iter().find_map(|r| r.err()).unwrap();
    assert!(matches!(failure, AppError::Conflict(ref m) if m == "No copies available"));
    assert_eq!(h.copies(ODYSSEY).await, 0);
}

#[tokio::test]
async fn test_sweep_cancels_expired_and_is_idempotent() {
    let h = harness();
    h.add_book(ODYSSEY, 2).await;
    h.add_book(PRIDE, 1).await;
    let reader = h.add_reader("reader@example.org").await;

    let short = h.services.loans.reserve_book(ODYSSEY, reader.id, Some(1)).await.unwrap();
    let long = h.services.loans.reserve_book(PRIDE, reader.id, Some(10)).await.unwrap();

    // expiry day itself is not expired yet
    h.clock.advance(1);
    assert_eq!(h.services.loans.cancel_expired_reservations().await.unwrap(), 0);

    h.clock.advance(1);
    assert_eq!(h.services.loans.cancel_expired_reservations().await.unwrap(), 1);
    assert_eq!(h.services.loans.cancel_expired_reservations().await.unwrap(), 0);

    let cancelled = h.services.loans.get_record(short).await.unwrap();
    assert_eq!(cancelled.status, BorrowStatus::Cancelled);
    assert_eq!(cancelled.reservation_expiry, None);
    assert_eq!(h.copies(ODYSSEY).await, 2);

    let kept = h.services.loans.get_record(long).await.unwrap();
    assert_eq!(kept.status, BorrowStatus::Reserved);
    assert_eq!(h.copies(PRIDE).await, 0);
}

#[tokio::test]
async fn test_sweep_continues_past_a_failing_record() {
    let store = FailingStore::new();
    let broken = store.broken_record();
    let h = harness_with_store(Arc::new(store));
    h.add_book(ODYSSEY, 3).await;
    let reader = h.add_reader("reader@example.org").await;

    let first = h.services.loans.reserve_book(ODYSSEY, reader.id, Some(1)).await.unwrap();
    let second = h.services.loans.reserve_book(ODYSSEY, reader.id, Some(1)).await.unwrap();
    let third = h.services.loans.reserve_book(ODYSSEY, reader.id, Some(1)).await.unwrap();
    assert_eq!(h.copies(ODYSSEY).await, 0);

    *broken.lock().unwrap() = Some(second);
    h.clock.advance(2);
    assert_eq!(h.services.loans.cancel_expired_reservations().await.unwrap(), 2);

    for id in [first, third] {
        let record = h.services.loans.get_record(id).await.unwrap();
        assert_eq!(record.status, BorrowStatus::Cancelled);
    }
    // plain reads do not take the record lock
    let stuck = h.services.loans.get_record(second).await.unwrap();
    assert_eq!(stuck.status, BorrowStatus::Reserved);
    assert_eq!(h.copies(ODYSSEY).await, 2);

    // picked up by the next sweep once the record can be locked again
    *broken.lock().unwrap() = None;
    assert_eq!(h.services.loans.cancel_expired_reservations().await.unwrap(), 1);
    assert_eq!(h.copies(ODYSSEY).await, 3);
}

#[tokio::test]
async fn test_reservation_length_is_bounded() {
    let h = harness();
    h.add_book(ODYSSEY, 1).await;
    let reader = h.add_reader("reader@example.org").await;

    for days in [MAX_RESERVATION_DAYS + 1, 200_000_000_000_000, i64::MAX] {
        let err = h
            .services
            .loans
            .reserve_book(ODYSSEY, reader.id, Some(days))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)), "{} days accepted", days);
    }
    assert_eq!(h.copies(ODYSSEY).await, 1);
    assert!(h.services.loans.all_records().await.unwrap().is_empty());

    let record_id = h
        .services
        .loans
        .reserve_book(ODYSSEY, reader.id, Some(MAX_RESERVATION_DAYS))
        .await
        .unwrap();
    let record = h.services.loans.get_record(record_id).await.unwrap();
    assert_eq!(record.reservation_expiry, Some(date(2025, 2, 19)));
}

#[tokio::test]
async fn test_huge_shelf_count_is_rejected() {
    let h = harness();
    h.add_book(ODYSSEY, 1).await;

    let err = h
        .services
        .catalog
        .update_book(
            ODYSSEY,
            &BookInput {
                isbn: ODYSSEY.to_string(),
                title: "The Odyssey".to_string(),
                copies: i32::MAX,
                authors: Vec::new(),
                genres: Vec::new(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(h.copies(ODYSSEY).await, 1);
}

#[tokio::test]
async fn test_restoring_a_copy_never_overflows() {
    let h = harness();
    h.add_book(ODYSSEY, 1).await;
    let reader = h.add_reader("reader@example.org").await;
    let record_id = h.services.loans.reserve_book(ODYSSEY, reader.id, None).await.unwrap();

    let mut uow = h.store.begin().await.unwrap();
    uow.set_copies(ODYSSEY, i32::MAX).await.unwrap();
    uow.commit().await.unwrap();

    let err = h.services.loans.cancel_reservation(record_id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let record = h.services.loans.get_record(record_id).await.unwrap();
    assert_eq!(record.status, BorrowStatus::Reserved);
    assert_eq!(h.copies(ODYSSEY).await, i32::MAX);
}

#[tokio::test]
async fn test_issue_before_sweep_wins() {
    let h = harness();
    h.add_book(ODYSSEY, 1).await;
    let reader = h.add_reader("reader@example.org").await;
    let record_id = h.services.loans.reserve_book(ODYSSEY, reader.id, Some(1)).await.unwrap();

    // expired but not yet swept: still issuable
    h.clock.advance(5);
    h.services.loans.issue_book(record_id).await.unwrap();
    assert_eq!(h.services.loans.cancel_expired_reservations().await.unwrap(), 0);

    let record = h.services.loans.get_record(record_id).await.unwrap();
    assert_eq!(record.status, BorrowStatus::Issued);
    assert_eq!(h.copies(ODYSSEY).await, 0);
}

#[tokio::test]
async fn test_sweep_before_issue_wins() {
    let h = harness();
    h.add_book(ODYSSEY, 1).await;
    let reader = h.add_reader("reader@example.org").await;
    let record_id = h.services.loans.reserve_book(ODYSSEY, reader.id, Some(1)).await.unwrap();

    h.clock.advance(5);
    assert_eq!(h.services.loans.cancel_expired_reservations().await.unwrap(), 1);

    let err = h.services.loans.issue_book(record_id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(h.copies(ODYSSEY).await, 1);
}

#[tokio::test]
async fn test_issue_directly_and_return_by_book() {
    let h = harness();
    h.add_book(ODYSSEY, 1).await;
    let reader = h.add_reader("reader@example.org").await;

    let record = h.services.loans.issue_directly(ODYSSEY, reader.id).await.unwrap();
    assert_eq!(record.status, BorrowStatus::Issued);
    assert_eq!(h.copies(ODYSSEY).await, 0);

    let err = h.services.loans.issue_directly(ODYSSEY, reader.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    h.clock.advance(3);
    let returned = h.services.loans.return_book(ODYSSEY, reader.id).await.unwrap();
    assert_eq!(returned.id, record.id);
    assert_eq!(returned.return_date, Some(date(2024, 2, 23)));
    assert_eq!(h.copies(ODYSSEY).await, 1);

    let err = h.services.loans.return_book(ODYSSEY, reader.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_delete_book_with_open_records_is_refused() {
    let h = harness();
    h.add_book(ODYSSEY, 1).await;
    let reader = h.add_reader("reader@example.org").await;
    let record_id = h.services.loans.reserve_book(ODYSSEY, reader.id, None).await.unwrap();

    let err = h.services.catalog.delete_book(ODYSSEY).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(h.copies(ODYSSEY).await, 0);

    h.services.loans.cancel_reservation(record_id).await.unwrap();
    h.services.catalog.delete_book(ODYSSEY).await.unwrap();

    let err = h.services.catalog.get_book(ODYSSEY).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert!(h.services.loans.all_records().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_create_book_rejects_short_isbn() {
    let h = harness();
    let err = h
        .services
        .catalog
        .create_book(&BookInput {
            isbn: "123".to_string(),
            title: "Title".to_string(),
            copies: 1,
            authors: Vec::new(),
            genres: Vec::new(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_listings_and_profile() {
    let h = harness();
    h.add_book(ODYSSEY, 3).await;
    h.add_book(PRIDE, 3).await;
    let jane = h.add_reader("jane@example.org").await;
    let john = h.add_reader("john@example.org").await;

    let reserved = h.services.loans.reserve_book(ODYSSEY, jane.id, None).await.unwrap();
    let issued = h.services.loans.issue_directly(PRIDE, jane.id).await.unwrap();
    let done = h.services.loans.issue_directly(ODYSSEY, john.id).await.unwrap();
    h.services
        .loans
        .return_book_by_record(done.id, "2024-02-25")
        .await
        .unwrap();

    let pending = h.services.loans.pending_reservations().await.unwrap();
    assert_eq!(pending.iter().map(|r| r.id).collect::<Vec<_>>(), vec![reserved]);

    let active = h.services.loans.active_borrows(Some(jane.id)).await.unwrap();
    assert_eq!(active.iter().map(|r| r.id).collect::<Vec<_>>(), vec![reserved, issued.id]);

    let history = h.services.loans.borrow_history(Some(ODYSSEY), None).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].book_title, "Book 9136");

    let filtered = h
        .services
        .loans
        .filter_records(&RecordFilter {
            status: Some("all".to_string()),
            user_email: Some("JOHN".to_string()),
            user_ticket: None,
        })
        .await
        .unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].status, BorrowStatus::Returned);

    let by_ticket = h
        .services
        .loans
        .filter_records(&RecordFilter {
            status: Some("issued".to_string()),
            user_email: None,
            user_ticket: jane.ticket_number.clone(),
        })
        .await
        .unwrap();
    assert_eq!(by_ticket.iter().map(|r| r.id).collect::<Vec<_>>(), vec![issued.id]);

    let profile = h.services.loans.profile(john.id).await.unwrap();
    assert!(profile.active_borrows.is_empty());
    assert_eq!(profile.returned_records.len(), 1);
}
