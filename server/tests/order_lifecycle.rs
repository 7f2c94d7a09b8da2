mod support;

use chrono::Duration;
use rust_decimal::Decimal;
use std::collections::HashSet;

use support::{admin, attendee, TestApp};
use ticketing_server::models::order::totals_reconcile;
use ticketing_server::models::{CheckInStatus, OrderStatus};
use ticketing_server::services::codes::{BOOKING_REFERENCE_LEN, TICKET_CODE_LEN};
use ticketing_server::utils::error::AppError;

#[tokio::test]
async fn test_create_order_prices_items_and_reserves_stock() {
    let app = TestApp::new().await;
    let general = app.ticket_type("General", 100, 50).await;
    let vip = app.ticket_type("VIP", 50, 10).await;
    let buyer = attendee();

    let details = app
        .place_order(&buyer, &[(general.id, 2), (vip.id, 1)])
        .await;

    assert_eq!(details.order.status, OrderStatus::Pending);
    assert_eq!(details.order.total_amount, Decimal::from(250));
    assert_eq!(details.order.discount_amount, Decimal::ZERO);
    assert_eq!(details.order.booking_reference.len(), BOOKING_REFERENCE_LEN);
    assert_eq!(details.items.len(), 2);
    assert!(totals_reconcile(&details.order, &details.items));

    let codes: HashSet<_> = details.items.iter().map(|item| item.ticket_code.clone()).collect();
    assert_eq!(codes.len(), 2);
    assert!(codes.iter().all(|code| code.len() == TICKET_CODE_LEN));
    assert!(details
        .items
        .iter()
        .all(|item| item.check_in_status == CheckInStatus::NotChecked));

    assert_eq!(app.sold(general.id).await, 2);
    assert_eq!(app.sold(vip.id).await, 1);
}

#[tokio::test]
async fn test_save10_discount() {
    let app = TestApp::new().await;
    let general = app.ticket_type("General", 250, 50).await;
    let promotion = app.percentage_promotion("SAVE10", 10, Some(100)).await;

    let details = app
        .state
        .orders
        .create_order(app.order_request(&attendee(), &[(general.id, 2)], Some("save10")))
        .await
        .unwrap();

    assert_eq!(details.order.discount_amount, Decimal::from(50));
    assert_eq!(details.order.total_amount, Decimal::from(450));
    assert_eq!(details.order.promotion_id, Some(promotion.id));
    assert!(totals_reconcile(&details.order, &details.items));
    assert_eq!(app.used(promotion.id).await, 1);
}

#[tokio::test]
async fn test_failed_line_rolls_back_earlier_reservations() {
    let app = TestApp::new().await;
    let plenty = app.ticket_type("General", 100, 50).await;
    let scarce = app.ticket_type("VIP", 300, 1).await;

    let err = app
        .state
        .orders
        .create_order(app.order_request(&attendee(), &[(plenty.id, 3), (scarce.id, 2)], None))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InsufficientInventory(_)));
    assert_eq!(app.sold(plenty.id).await, 0);
    assert_eq!(app.sold(scarce.id).await, 0);
    assert!(app.store.orders().await.is_empty());
}

#[tokio::test]
async fn test_promotion_failure_releases_reservations() {
    let app = TestApp::new().await;
    let general = app.ticket_type("General", 100, 50).await;

    let err = app
        .state
        .orders
        .create_order(app.order_request(&attendee(), &[(general.id, 2)], Some("NOPE")))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::PromotionInvalid(_)));
    assert_eq!(app.sold(general.id).await, 0);
    assert!(app.store.orders().await.is_empty());
}

#[tokio::test]
async fn test_exhausted_promotion_is_rejected() {
    let app = TestApp::new().await;
    let general = app.ticket_type("General", 100, 50).await;
    let promotion = app.percentage_promotion("ONCE", 20, Some(1)).await;

    app.state
        .orders
        .create_order(app.order_request(&attendee(), &[(general.id, 1)], Some("ONCE")))
        .await
        .unwrap();
    let err = app
        .state
        .orders
        .create_order(app.order_request(&attendee(), &[(general.id, 1)], Some("ONCE")))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::PromotionExhausted(_)));
    assert_eq!(app.used(promotion.id).await, 1);
    assert_eq!(app.sold(general.id).await, 1);
}

#[tokio::test]
async fn test_expired_promotion_is_rejected() {
    let app = TestApp::new().await;
    let general = app.ticket_type("General", 100, 50).await;
    let mut promotion = app.percentage_promotion("EARLY", 20, None).await;
    promotion.ends_at = Some(support::start_time() + Duration::hours(1));
    app.store.insert_promotion(promotion.clone()).await;
    app.clock.advance(Duration::hours(2));

    let err = app
        .state
        .orders
        .create_order(app.order_request(&attendee(), &[(general.id, 1)], Some("EARLY")))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::PromotionExpired(_)));
    assert_eq!(app.used(promotion.id).await, 0);
    assert_eq!(app.sold(general.id).await, 0);
}

#[tokio::test]
async fn test_window_and_range_errors_are_not_inventory_errors() {
    let app = TestApp::new().await;
    let general = app.ticket_type("General", 100, 50).await;

    let err = app
        .state
        .orders
        .create_order(app.order_request(&attendee(), &[(general.id, 11)], None))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::QuantityOutOfRange(_)));

    app.clock.advance(Duration::days(6));
    let err = app
        .state
        .orders
        .create_order(app.order_request(&attendee(), &[(general.id, 1)], None))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::TicketWindowClosed(_)));

    app.clock.advance(Duration::days(2));
    let err = app
        .state
        .orders
        .create_order(app.order_request(&attendee(), &[(general.id, 1)], None))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::TicketWindowClosed(_)));

    assert_eq!(app.sold(general.id).await, 0);
}

#[tokio::test]
async fn test_huge_quantities_are_rejected_without_overflow() {
    let app = TestApp::new().await;
    let mut uncapped = app.ticket_type("Standing", 20, 5).await;
    uncapped.max_per_order = None;
    app.store.insert_ticket_type(uncapped.clone()).await;

    let err = app
        .state
        .orders
        .create_order(app.order_request(
            &attendee(),
            &[(uncapped.id, i32::MAX), (uncapped.id, i32::MAX)],
            None,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::QuantityOutOfRange(_)));

    let err = app
        .state
        .orders
        .create_order(app.order_request(&attendee(), &[(uncapped.id, i32::MAX)], None))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientInventory(_)));

    app.place_order(&attendee(), &[(uncapped.id, 5)]).await;
    assert_eq!(app.sold(uncapped.id).await, 5);
    assert_eq!(app.store.orders().await.len(), 1);
}

#[tokio::test]
async fn test_invalid_requests_touch_nothing() {
    let app = TestApp::new().await;
    let general = app.ticket_type("General", 100, 50).await;

    let mut request = app.order_request(&attendee(), &[(general.id, 1)], None);
    request.billing.billing_email = "nobody".to_string();
    let err = app.state.orders.create_order(request).await.unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));

    let err = app
        .state
        .orders
        .create_order(app.order_request(&attendee(), &[], None))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));

    let err = app
        .state
        .orders
        .create_order(app.order_request(&attendee(), &[(uuid::Uuid::new_v4(), 1)], None))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    assert_eq!(app.sold(general.id).await, 0);
}

#[tokio::test]
async fn test_cancel_restores_inventory_and_promotion_once() {
    let app = TestApp::new().await;
    let general = app.ticket_type("General", 100, 50).await;
    let promotion = app.percentage_promotion("SAVE10", 10, Some(5)).await;
    let buyer = attendee();

    let details = app
        .state
        .orders
        .create_order(app.order_request(&buyer, &[(general.id, 3), (general.id, 1)], Some("SAVE10")))
        .await
        .unwrap();
    assert_eq!(app.sold(general.id).await, 4);
    assert_eq!(app.used(promotion.id).await, 1);

    let cancelled = app
        .state
        .orders
        .cancel_order(&buyer, details.order.id)
        .await
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(app.sold(general.id).await, 0);
    assert_eq!(app.used(promotion.id).await, 0);
    assert!(app
        .store
        .order_items(details.order.id)
        .await
        .iter()
        .all(|item| item.check_in_status == CheckInStatus::Cancelled));

    let err = app
        .state
        .orders
        .cancel_order(&buyer, details.order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::OrderNotPending(_)));
    assert_eq!(app.sold(general.id).await, 0);
    assert_eq!(app.used(promotion.id).await, 0);
}

#[tokio::test]
async fn test_only_buyer_or_admin_can_cancel() {
    let app = TestApp::new().await;
    let general = app.ticket_type("General", 100, 50).await;
    let details = app.place_order(&attendee(), &[(general.id, 1)]).await;

    let err = app
        .state
        .orders
        .cancel_order(&attendee(), details.order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    app.state
        .orders
        .cancel_order(&admin(), details.order.id)
        .await
        .unwrap();
    assert_eq!(app.sold(general.id).await, 0);
}

#[tokio::test]
async fn test_sweep_cancels_only_stale_pending_orders() {
    let app = TestApp::new().await;
    let general = app.ticket_type("General", 100, 50).await;
    let promotion = app.percentage_promotion("SAVE10", 10, None).await;

    let stale = app
        .state
        .orders
        .create_order(app.order_request(&attendee(), &[(general.id, 2)], Some("SAVE10")))
        .await
        .unwrap();
    app.clock.advance(Duration::minutes(31));
    let fresh = app.place_order(&attendee(), &[(general.id, 1)]).await;

    let report = app
        .state
        .orders
        .expire_pending(Duration::minutes(30))
        .await
        .unwrap();

    assert_eq!(report.examined, 1);
    assert_eq!(report.expired, 1);
    assert_eq!(
        app.store.order(stale.order.id).await.unwrap().status,
        OrderStatus::Cancelled
    );
    assert_eq!(
        app.store.order(fresh.order.id).await.unwrap().status,
        OrderStatus::Pending
    );
    assert_eq!(app.sold(general.id).await, 1);
    assert_eq!(app.used(promotion.id).await, 0);

    let again = app
        .state
        .orders
        .expire_pending(Duration::minutes(30))
        .await
        .unwrap();
    assert_eq!(again.expired, 0);
    assert_eq!(app.sold(general.id).await, 1);
}

#[tokio::test]
async fn test_order_visibility() {
    let app = TestApp::new().await;
    let general = app.ticket_type("General", 100, 50).await;
    let buyer = attendee();
    let details = app.place_order(&buyer, &[(general.id, 1)]).await;

    assert!(app.state.orders.get_order(&buyer, details.order.id).await.is_ok());
    assert!(app
        .state
        .orders
        .get_order(&app.organizer, details.order.id)
        .await
        .is_ok());

    let err = app
        .state
        .orders
        .get_order(&attendee(), details.order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn test_ticket_availability_and_promotion_preview() {
    let app = TestApp::new().await;
    let general = app.ticket_type("General", 100, 5).await;
    let promotion = app.percentage_promotion("SAVE10", 10, Some(1)).await;
    app.place_order(&attendee(), &[(general.id, 2)]).await;

    let availability = app
        .state
        .orders
        .ticket_availability(app.event.id)
        .await
        .unwrap();
    assert_eq!(availability.len(), 1);
    assert_eq!(availability[0].sold, 2);
    assert_eq!(availability[0].available, 3);
    assert!(availability[0].on_sale);

    let preview = app
        .state
        .orders
        .preview_promotion(app.event.id, " save10 ", Decimal::from(500))
        .await
        .unwrap();
    assert_eq!(preview.discount, Decimal::from(50));
    assert_eq!(app.used(promotion.id).await, 0);
}
