use std::ops::Add;
use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::future::join_all;
use sqlx::PgPool;

use crate::crypto::{encrypt_secret, sha512_hex};
use crate::error::ServiceError;
use crate::gateway::testing::StaticGateway;
use crate::models::{
    GatewayEnvironment, MerchantCredentials, PayoutStatus, QrStatus, QrType, Role, StaffRole,
    StaffStatus, TipAmounts, TipStatus, TipType, Venue, VenueStatus, VenueType,
};
use crate::reports::{build_commission_report, build_payout_report, DateRange};
use crate::tipping::{self, TipRequest};

use super::users::MAX_OTP_ATTEMPTS;
use super::{AppState, DatabaseConnection, NewStaff, NewTip, QrRemoval, TipFilter};

const SERVER_KEY: &str = "SB-Mid-server-warung";

async fn setup(pool: PgPool) -> (AppState, DatabaseConnection) {
    let _ = env_logger::builder().is_test(true).try_init();
    let app_state = AppState::from_pool(pool)
        .await
        .unwrap()
        .with_gateway(Arc::new(StaticGateway::default()));
    let db = app_state.connection().await.unwrap();
    (app_state, db)
}

async fn register_venue(db: &mut DatabaseConnection, email: &str, name: &str) -> Venue {
    let (_, venue) = db
        .register_manager(email, vec![13u8; 32], name, VenueType::Cafe)
        .await
        .unwrap();
    venue
}

async fn connect_venue(db: &mut DatabaseConnection, venue: &Venue) -> Venue {
    let credentials = MerchantCredentials {
        merchant_id: "G812785002".to_string(),
        server_key_encrypted: encrypt_secret(SERVER_KEY).unwrap(),
        client_key: "SB-Mid-client-warung".to_string(),
        environment: GatewayEnvironment::Sandbox,
    };
    db.connect_venue_gateway(venue.id, &credentials).await.unwrap()
}

async fn active_venue(db: &mut DatabaseConnection, email: &str, name: &str) -> Venue {
    let venue = register_venue(db, email, name).await;
    connect_venue(db, &venue).await
}

fn new_staff(display_name: &str, participates_in_pool: bool) -> NewStaff {
    NewStaff {
        display_name: display_name.to_string(),
        full_name: None,
        role: StaffRole::Waiter,
        avatar_url: None,
        participates_in_pool,
        email: None,
        phone: None,
    }
}

/// Store a tip and settle it directly.
async fn paid_tip(
    db: &mut DatabaseConnection,
    venue_id: u64,
    qr_code_id: u64,
    staff_id: Option<u64>,
    amount: i64,
) -> String {
    let order_id = tipping::generate_order_id(venue_id);
    db.insert_tip(NewTip {
        venue_id,
        qr_code_id,
        staff_id,
        amounts: TipAmounts::compute(amount, false).unwrap(),
        tip_type: if staff_id.is_some() {
            TipType::Personal
        } else {
            TipType::Pool
        },
        order_id: order_id.clone(),
    })
    .await
    .unwrap();
    db.transition_tip_status(&order_id, TipStatus::Paid, Some("qris"))
        .await
        .unwrap()
        .expect("pending tip becomes paid");
    order_id
}

fn tip_request(amount: i64) -> TipRequest {
    TipRequest {
        amount,
        guest_pays_fee: false,
        tip_type: None,
        staff_id: None,
    }
}

fn notification(order_id: &str, gross_amount: &str, transaction_status: &str, key: &str) -> serde_json::Value {
    serde_json::json!({
        "order_id": order_id,
        "status_code": "200",
        "gross_amount": gross_amount,
        "transaction_status": transaction_status,
        "payment_type": "qris",
        "signature_key": sha512_hex(&format!("{order_id}200{gross_amount}{key}")),
    })
}

fn today() -> DateRange {
    let today = Utc::now().date_naive();
    DateRange::inclusive(today, today).unwrap()
}

#[sqlx::test]
async fn test_session_crud(pool: PgPool) {
    let (_, mut db) = setup(pool).await;
    let (user, _) = db
        .register_manager("made@warung.id", vec![13u8; 32], "Warung Made", VenueType::Restaurant)
        .await
        .unwrap();

    let token = db
        .create_session_token(user.id, Utc::now().add(Duration::minutes(30)))
        .await
        .unwrap();
    let session = db.get_session_by_session_token(token.clone()).await.unwrap();
    let session = session.expect("there is a session for the token");

    assert_eq!(session.user, user);
    assert_eq!(session.token, token);

    db.delete_session_token(token.clone()).await.unwrap();
    assert_eq!(db.get_session_by_session_token(token).await.unwrap(), None);

    let expired = db
        .create_session_token(user.id, Utc::now() - Duration::minutes(1))
        .await
        .unwrap();
    assert_eq!(db.get_session_by_session_token(expired).await.unwrap(), None);
}

#[sqlx::test]
async fn test_register_manager(pool: PgPool) {
    let (_, mut db) = setup(pool).await;

    let (user, venue) = db
        .register_manager("made@warung.id", vec![13u8; 32], "Warung Made", VenueType::Restaurant)
        .await
        .unwrap();
    assert_eq!(user.role, Role::Manager);
    assert_eq!(venue.manager_id, user.id);
    assert_eq!(venue.status, VenueStatus::Draft);
    assert!(!venue.gateway_connected);
    assert!(!venue.accepts_tips());

    let duplicate = db
        .register_manager("Made@Warung.id", vec![13u8; 32], "Warung Lain", VenueType::Bar)
        .await;
    assert_eq!(
        duplicate,
        Err(ServiceError::validation("Email is already registered"))
    );
    assert_eq!(db.count_users().await.unwrap(), 1);
    assert_eq!(db.count_venues().await.unwrap(), 1);
}

#[sqlx::test]
async fn test_otp_codes_are_single_use(pool: PgPool) {
    let (_, mut db) = setup(pool).await;
    let valid_until = Utc::now() + Duration::minutes(10);

    db.store_otp_code("ketut@warung.id", "123456", valid_until)
        .await
        .unwrap();

    assert!(!db.consume_otp_code("ketut@warung.id", "654321").await.unwrap());
    assert!(db.consume_otp_code("ketut@warung.id", "123456").await.unwrap());
    assert!(!db.consume_otp_code("ketut@warung.id", "123456").await.unwrap());

    db.store_otp_code("ketut@warung.id", "111111", Utc::now() - Duration::minutes(1))
        .await
        .unwrap();
    assert!(!db.consume_otp_code("ketut@warung.id", "111111").await.unwrap());
}

#[sqlx::test]
async fn test_otp_code_locked_after_wrong_guesses(pool: PgPool) {
    let (_, mut db) = setup(pool).await;
    let valid_until = Utc::now() + Duration::minutes(10);

    db.store_otp_code("+6281234567", "424242", valid_until)
        .await
        .unwrap();

    for guess in 0..MAX_OTP_ATTEMPTS {
        let wrong = format!("{:06}", guess);
        assert!(!db.consume_otp_code("+6281234567", &wrong).await.unwrap());
    }
    assert!(!db.consume_otp_code("+6281234567", "424242").await.unwrap());

    // a fresh code starts with a clean attempt count
    db.store_otp_code("+6281234567", "515151", valid_until)
        .await
        .unwrap();
    assert!(!db.consume_otp_code("+6281234567", "000000").await.unwrap());
    assert!(db.consume_otp_code("+6281234567", "515151").await.unwrap());
}

#[sqlx::test]
async fn test_qr_creation_requires_gateway(pool: PgPool) {
    let (_, mut db) = setup(pool).await;
    let venue = register_venue(&mut db, "made@warung.id", "Warung Made").await;

    let result = db.create_qr_code(&venue, QrType::Table, "Table 1").await;
    assert_eq!(
        result,
        Err(ServiceError::state(
            "Please connect Midtrans before creating QR codes"
        ))
    );

    let venue = connect_venue(&mut db, &venue).await;
    assert_eq!(venue.status, VenueStatus::Active);
    assert!(venue.accepts_tips());

    let qr_code = db
        .create_qr_code(&venue, QrType::Table, "Table 1")
        .await
        .unwrap();
    assert_eq!(qr_code.qr_type, QrType::Table);
    assert_eq!(qr_code.status, QrStatus::Active);
    assert_eq!(qr_code.staff_id, None);

    let found = db
        .get_qr_code_by_short_code(&qr_code.short_code)
        .await
        .unwrap();
    assert_eq!(found, Some(qr_code));
}

#[sqlx::test]
async fn test_tip_below_minimum_is_rejected(pool: PgPool) {
    let (app_state, mut db) = setup(pool).await;
    let venue = active_venue(&mut db, "made@warung.id", "Warung Made").await;
    let qr_code = db
        .create_qr_code(&venue, QrType::Venue, "Entrance")
        .await
        .unwrap();

    let result = tipping::create_tip(
        &mut db,
        app_state.gateway.as_ref(),
        &qr_code.short_code,
        tip_request(33),
    )
    .await;
    assert_eq!(
        result,
        Err(ServiceError::validation("Minimum tip amount is 1,000"))
    );

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tips")
        .fetch_one(&mut *db.connection)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[sqlx::test]
async fn test_create_tip_for_blocked_venue(pool: PgPool) {
    let (app_state, mut db) = setup(pool).await;
    let venue = active_venue(&mut db, "made@warung.id", "Warung Made").await;
    let qr_code = db
        .create_qr_code(&venue, QrType::Table, "Table 2")
        .await
        .unwrap();
    db.set_venue_status(venue.id, VenueStatus::Blocked)
        .await
        .unwrap();

    let result = tipping::create_tip(
        &mut db,
        app_state.gateway.as_ref(),
        &qr_code.short_code,
        tip_request(20_000),
    )
    .await;
    assert!(matches!(result, Err(ServiceError::State(_))));

    let result = tipping::resolve(&mut db, "missing").await;
    assert_eq!(result, Err(ServiceError::NotFound("QR code not found")));
}

#[sqlx::test]
async fn test_personal_qr_code_targets_staff(pool: PgPool) {
    let gateway = Arc::new(StaticGateway::default());
    let (app_state, mut db) = setup(pool).await;
    let app_state = app_state.with_gateway(gateway.clone());
    let venue = active_venue(&mut db, "made@warung.id", "Warung Made").await;
    let (staff, qr_code) = db
        .create_staff_with_qr(venue.id, new_staff("Ketut", true))
        .await
        .unwrap();
    assert_eq!(qr_code.qr_type, QrType::Personal);
    assert_eq!(qr_code.staff_id, Some(staff.id));
    assert_eq!(qr_code.label, "Ketut");

    for amount in [25_000, 50_000] {
        let created = tipping::create_tip(
            &mut db,
            app_state.gateway.as_ref(),
            &qr_code.short_code,
            tip_request(amount),
        )
        .await
        .unwrap();

        assert_eq!(created.tip.staff_id, Some(staff.id));
        assert_eq!(created.tip.tip_type, TipType::Personal);
        assert_eq!(created.tip.status, TipStatus::Pending);
        assert_eq!(created.snap_token, format!("token-{}", created.tip.order_id));
    }

    let requests = gateway.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].transaction_details.gross_amount, 25_000);
    assert!(requests[0].item_details[0].name.contains("Ketut"));
    assert!(requests[0].callbacks.finish.contains("/tip/success?order_id=TIP-"));
}

#[sqlx::test]
async fn test_guest_pays_fee(pool: PgPool) {
    let (app_state, mut db) = setup(pool).await;
    let venue = active_venue(&mut db, "made@warung.id", "Warung Made").await;
    let qr_code = db
        .create_qr_code(&venue, QrType::Table, "Table 3")
        .await
        .unwrap();

    let created = tipping::create_tip(
        &mut db,
        app_state.gateway.as_ref(),
        &qr_code.short_code,
        TipRequest {
            amount: 50_000,
            guest_pays_fee: true,
            tip_type: None,
            staff_id: None,
        },
    )
    .await
    .unwrap();

    let amounts = created.tip.amounts;
    assert_eq!(created.tip.tip_type, TipType::Pool);
    assert_eq!(amounts.platform_fee, 2_500);
    assert_eq!(amounts.net_amount, 47_500);
    assert_eq!(amounts.total_amount, 52_500);
}

#[sqlx::test]
async fn test_gateway_failure_keeps_pending_tip(pool: PgPool) {
    let (app_state, mut db) = setup(pool).await;
    let app_state = app_state.with_gateway(Arc::new(StaticGateway {
        fail: true,
        ..Default::default()
    }));
    let venue = active_venue(&mut db, "made@warung.id", "Warung Made").await;
    let qr_code = db
        .create_qr_code(&venue, QrType::Table, "Table 4")
        .await
        .unwrap();

    let result = tipping::create_tip(
        &mut db,
        app_state.gateway.as_ref(),
        &qr_code.short_code,
        tip_request(10_000),
    )
    .await;
    assert!(matches!(result, Err(ServiceError::InternalServerError(_))));

    let records = db
        .get_tip_records(&TipFilter {
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].0.tip.status, TipStatus::Pending);
    assert_eq!(records[0].1, "pending");
}

#[sqlx::test]
async fn test_qr_code_removal(pool: PgPool) {
    let (app_state, mut db) = setup(pool).await;
    let venue = active_venue(&mut db, "made@warung.id", "Warung Made").await;

    let unused = db
        .create_qr_code(&venue, QrType::Table, "Table 5")
        .await
        .unwrap();
    assert_eq!(db.remove_qr_code(&unused).await.unwrap(), QrRemoval::Deleted);
    assert_eq!(db.get_qr_code_by_id(unused.id).await.unwrap(), None);

    let used = db
        .create_qr_code(&venue, QrType::Table, "Table 6")
        .await
        .unwrap();
    tipping::create_tip(
        &mut db,
        app_state.gateway.as_ref(),
        &used.short_code,
        tip_request(10_000),
    )
    .await
    .unwrap();
    assert_eq!(db.remove_qr_code(&used).await.unwrap(), QrRemoval::Deactivated);
    let used = db.get_qr_code_by_id(used.id).await.unwrap().unwrap();
    assert_eq!(used.status, QrStatus::Inactive);

    let (_, personal) = db
        .create_staff_with_qr(venue.id, new_staff("Wayan", true))
        .await
        .unwrap();
    assert!(matches!(
        db.remove_qr_code(&personal).await,
        Err(ServiceError::State(_))
    ));
}

#[sqlx::test]
async fn test_staff_status_follows_personal_qr_code(pool: PgPool) {
    let (_, mut db) = setup(pool).await;
    let venue = active_venue(&mut db, "made@warung.id", "Warung Made").await;
    let (mut staff, qr_code) = db
        .create_staff_with_qr(venue.id, new_staff("Agung", true))
        .await
        .unwrap();

    staff.status = StaffStatus::Inactive;
    let staff = db.store_staff(staff).await.unwrap();
    let qr_code = db.get_qr_code_by_id(qr_code.id).await.unwrap().unwrap();
    assert_eq!(qr_code.status, QrStatus::Inactive);
    assert!(matches!(
        tipping::resolve(&mut db, &qr_code.short_code).await,
        Err(ServiceError::State(_))
    ));

    let mut staff = staff;
    staff.status = StaffStatus::Active;
    db.store_staff(staff).await.unwrap();
    let qr_code = db.get_qr_code_by_id(qr_code.id).await.unwrap().unwrap();
    assert_eq!(qr_code.status, QrStatus::Active);

    let summaries = db.get_staff_summaries(venue.id).await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].qr_code.as_ref().map(|q| q.id), Some(qr_code.id));
}

#[sqlx::test]
async fn test_staff_login_is_created_with_contact(pool: PgPool) {
    let (_, mut db) = setup(pool).await;
    let venue = active_venue(&mut db, "made@warung.id", "Warung Made").await;

    let mut form = new_staff("Komang", true);
    form.email = Some("komang@warung.id".to_string());
    let (staff, _) = db.create_staff_with_qr(venue.id, form).await.unwrap();

    let user = db
        .get_user_by_contact("komang@warung.id")
        .await
        .unwrap()
        .expect("staff user exists");
    assert_eq!(user.role, Role::Staff);
    assert_eq!(staff.user_id, Some(user.id));
    assert_eq!(db.get_staff_by_user(user.id).await.unwrap(), Some(staff));

    let mut form = new_staff("Komang 2", true);
    form.email = Some("komang@warung.id".to_string());
    assert!(matches!(
        db.create_staff_with_qr(venue.id, form).await,
        Err(ServiceError::Validation(_))
    ));
}

#[sqlx::test]
async fn test_terminal_status_never_changes(pool: PgPool) {
    let (_, mut db) = setup(pool).await;
    let venue = active_venue(&mut db, "made@warung.id", "Warung Made").await;
    let (staff, qr_code) = db
        .create_staff_with_qr(venue.id, new_staff("Putu", true))
        .await
        .unwrap();

    let order_id = paid_tip(&mut db, venue.id, qr_code.id, Some(staff.id), 10_000).await;

    let repeated = db
        .transition_tip_status(&order_id, TipStatus::Paid, Some("qris"))
        .await
        .unwrap();
    assert_eq!(repeated, None);

    let late_failure = db
        .transition_tip_status(&order_id, TipStatus::Failed, None)
        .await
        .unwrap();
    assert_eq!(late_failure, None);

    let tip = db.get_tip_by_order_id(&order_id).await.unwrap().unwrap();
    assert_eq!(tip.status, TipStatus::Paid);
    assert_eq!(tip.payment_type.as_deref(), Some("qris"));
    assert!(tip.paid_at.is_some());

    let allocations = db.get_allocation_records(venue.id, &today()).await.unwrap();
    assert_eq!(allocations.len(), 1);
    assert_eq!(allocations[0].allocation.amount, 9_500);
}

#[sqlx::test]
async fn test_concurrent_notifications(pool: PgPool) {
    let (app_state, mut db) = setup(pool).await;
    let venue = active_venue(&mut db, "made@warung.id", "Warung Made").await;
    let (staff, qr_code) = db
        .create_staff_with_qr(venue.id, new_staff("Ketut", true))
        .await
        .unwrap();

    let order_id = tipping::generate_order_id(venue.id);
    db.insert_tip(NewTip {
        venue_id: venue.id,
        qr_code_id: qr_code.id,
        staff_id: Some(staff.id),
        amounts: TipAmounts::compute(20_000, false).unwrap(),
        tip_type: TipType::Personal,
        order_id: order_id.clone(),
    })
    .await
    .unwrap();

    let mut connections = Vec::new();
    for _ in 0..3 {
        connections.push(app_state.connection().await.unwrap());
    }
    let statuses = ["settlement", "expire", "settlement"];
    let results = join_all(connections.iter_mut().zip(statuses).map(|(connection, status)| {
        tipping::reconcile(connection, &order_id, status, Some("qris"))
    }))
    .await;

    let applied: Vec<_> = results
        .into_iter()
        .map(|result| result.unwrap())
        .flatten()
        .collect();
    assert_eq!(applied.len(), 1);

    let tip = db.get_tip_by_order_id(&order_id).await.unwrap().unwrap();
    assert_eq!(tip.status, applied[0].status);

    let allocations: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tip_allocations")
        .fetch_one(&mut *db.connection)
        .await
        .unwrap();
    let expected = if tip.status == TipStatus::Paid { 1 } else { 0 };
    assert_eq!(allocations, expected);
}

#[sqlx::test]
async fn test_pool_allocations_sum_to_net(pool: PgPool) {
    let (_, mut db) = setup(pool).await;
    let venue = active_venue(&mut db, "made@warung.id", "Warung Made").await;
    for (name, participates) in [("Agung", true), ("Wayan", true), ("Ketut", true), ("Made", false)] {
        db.create_staff_with_qr(venue.id, new_staff(name, participates))
            .await
            .unwrap();
    }
    let qr_code = db
        .create_qr_code(&venue, QrType::Venue, "Entrance")
        .await
        .unwrap();

    paid_tip(&mut db, venue.id, qr_code.id, None, 10_000).await;

    let allocations = db.get_allocation_records(venue.id, &today()).await.unwrap();
    let amounts: Vec<i64> = allocations.iter().map(|a| a.allocation.amount).collect();
    assert_eq!(amounts.len(), 3);
    assert_eq!(amounts.iter().sum::<i64>(), 9_500);
    assert!(amounts.iter().all(|a| *a == 3_166 || *a == 3_167));
    assert!(allocations.iter().all(|a| a.staff_display_name != "Made"));
}

#[sqlx::test]
async fn test_webhook_notifications(pool: PgPool) {
    let (app_state, mut db) = setup(pool).await;
    let venue = active_venue(&mut db, "made@warung.id", "Warung Made").await;
    let qr_code = db
        .create_qr_code(&venue, QrType::Table, "Table 8")
        .await
        .unwrap();
    let created = tipping::create_tip(
        &mut db,
        app_state.gateway.as_ref(),
        &qr_code.short_code,
        tip_request(50_000),
    )
    .await
    .unwrap();
    let order_id = created.tip.order_id;

    let forged = notification(&order_id, "50000.00", "settlement", "SB-Mid-server-forged");
    let result = tipping::handle_notification(&mut db, forged.clone()).await;
    assert_eq!(result, Err(ServiceError::Forbidden));

    let log = db.get_latest_webhook_log(&order_id).await.unwrap().unwrap();
    assert_eq!(log.payload, forged);
    let tip = db.get_tip_by_order_id(&order_id).await.unwrap().unwrap();
    assert_eq!(tip.status, TipStatus::Pending);

    let unknown = notification("TIP-0-0-0000", "1000.00", "settlement", SERVER_KEY);
    assert_eq!(
        tipping::handle_notification(&mut db, unknown).await,
        Err(ServiceError::NotFound("Tip not found"))
    );

    let pending = notification(&order_id, "50000.00", "pending", SERVER_KEY);
    assert_eq!(tipping::handle_notification(&mut db, pending).await, Ok(None));

    let settled = notification(&order_id, "50000.00", "settlement", SERVER_KEY);
    let tip = tipping::handle_notification(&mut db, settled)
        .await
        .unwrap()
        .expect("tip is settled");
    assert_eq!(tip.status, TipStatus::Paid);

    let records = db
        .get_tip_records(&TipFilter {
            gateway_status: Some("settlement".to_string()),
            limit: 100,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].0.tip.order_id, order_id);
}

#[sqlx::test]
async fn test_poll_status_asks_gateway(pool: PgPool) {
    let (app_state, mut db) = setup(pool).await;
    let venue = active_venue(&mut db, "made@warung.id", "Warung Made").await;
    let qr_code = db
        .create_qr_code(&venue, QrType::Table, "Table 9")
        .await
        .unwrap();
    let created = tipping::create_tip(
        &mut db,
        app_state.gateway.as_ref(),
        &qr_code.short_code,
        tip_request(15_000),
    )
    .await
    .unwrap();

    let record = tipping::poll_status(&mut db, app_state.gateway.as_ref(), &created.tip.order_id)
        .await
        .unwrap();
    assert_eq!(record.tip.status, TipStatus::Pending);
    assert_eq!(record.venue_name, "Warung Made");

    let settled = StaticGateway {
        status: Some("settlement".to_string()),
        ..Default::default()
    };
    let record = tipping::poll_status(&mut db, &settled, &created.tip.order_id)
        .await
        .unwrap();
    assert_eq!(record.tip.status, TipStatus::Paid);
    assert_eq!(record.tip.payment_type.as_deref(), Some("qris"));
}

#[sqlx::test]
async fn test_commission_report(pool: PgPool) {
    let (_, mut db) = setup(pool).await;
    let made = active_venue(&mut db, "made@warung.id", "Warung Made").await;
    let kopi = active_venue(&mut db, "kopi@ubud.id", "Kopi Ubud").await;
    let made_qr = db.create_qr_code(&made, QrType::Table, "Table 1").await.unwrap();
    let kopi_qr = db.create_qr_code(&kopi, QrType::Table, "Table 1").await.unwrap();

    paid_tip(&mut db, made.id, made_qr.id, None, 100_000).await;
    paid_tip(&mut db, kopi.id, kopi_qr.id, None, 50_000).await;

    let range = today();
    let tips = db
        .get_paid_tip_records(None, range.start_time(), range.end_time())
        .await
        .unwrap();
    let report = build_commission_report(range, &tips);

    assert_eq!(report.total_tips, 142_500);
    assert_eq!(report.total_platform_fee, 7_125);
    assert_eq!(report.total_transactions, 2);
    assert_eq!(report.venues[0].venue_name, "Warung Made");
    assert_eq!(report.venues[0].total_tips, 95_000);
    assert_eq!(report.venues[1].platform_fee, 2_375);

    let stats = db
        .get_platform_stats(range.start_time())
        .await
        .unwrap();
    assert_eq!(stats.total_venues, 2);
    assert_eq!(stats.active_venues, 2);
    assert_eq!(stats.total_transactions, 2);
    assert_eq!(stats.total_volume, 150_000);
    assert_eq!(stats.failed_today, 0);
}

#[sqlx::test]
async fn test_mark_payout_paid(pool: PgPool) {
    let (_, mut db) = setup(pool).await;
    let venue = active_venue(&mut db, "made@warung.id", "Warung Made").await;
    let (agung, agung_qr) = db
        .create_staff_with_qr(venue.id, new_staff("Agung", true))
        .await
        .unwrap();
    let (wayan, wayan_qr) = db
        .create_staff_with_qr(venue.id, new_staff("Wayan", true))
        .await
        .unwrap();

    paid_tip(&mut db, venue.id, agung_qr.id, Some(agung.id), 20_000).await;
    paid_tip(&mut db, venue.id, agung_qr.id, Some(agung.id), 10_000).await;
    paid_tip(&mut db, venue.id, wayan_qr.id, Some(wayan.id), 40_000).await;
    assert!(db.has_pending_allocations(venue.id).await.unwrap());

    let range = today();
    let payout = db
        .mark_payout_paid(venue.id, &range, Some(agung.id))
        .await
        .unwrap();
    assert_eq!(payout.status, PayoutStatus::Pending);
    assert_eq!(payout.total_amount, 19_000 + 9_500 + 38_000);

    let allocations = db.get_allocation_records(venue.id, &range).await.unwrap();
    let report = build_payout_report(Some(payout.id), range, &allocations);
    assert_eq!(report.status, PayoutStatus::Pending);
    let agung_payout = report
        .staff_payouts
        .iter()
        .find(|s| s.staff_id == agung.id)
        .unwrap();
    assert_eq!(agung_payout.status, PayoutStatus::Paid);
    assert_eq!(agung_payout.tips_count, 2);
    assert_eq!(agung_payout.gross_amount, 28_500);

    let payout = db.mark_payout_paid(venue.id, &range, None).await.unwrap();
    assert_eq!(payout.status, PayoutStatus::Paid);
    assert!(payout.paid_at.is_some());
    assert!(!db.has_pending_allocations(venue.id).await.unwrap());
    assert_eq!(
        db.get_payout_for_period(venue.id, &range).await.unwrap(),
        Some(payout)
    );
}
