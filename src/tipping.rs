//! Tip intake and payment status reconciliation.

use chrono::Utc;
use log::{info, warn};
use rand::Rng;

use crate::database::{DatabaseConnection, NewTip};
use crate::env;
use crate::error::{ServiceError, ServiceResult};
use crate::gateway::{
    map_transaction_status, Callbacks, GatewayCredentials, ItemDetails, Notification,
    PaymentGateway, SnapRequest, TransactionDetails,
};
use crate::models::{
    QrCode, QrStatus, QrType, Staff, StaffStatus, Tip, TipAmounts, TipRecord, TipStatus, TipType,
    Venue,
};

/// Interval between two status polls of the guest client.
pub const POLL_INTERVAL_MS: u64 = 3_000;

/// Number of polls before the client gives up and shows a timeout.
pub const MAX_POLLS: u32 = 60;

/// Everything a guest needs to know about a scanned qr code.
#[derive(Debug, PartialEq, Clone)]
pub struct TipContext {
    pub qr_code: QrCode,
    pub venue: Venue,
    /// Receiver of a personal qr code.
    pub staff: Option<Staff>,
    /// Staff a guest may pick from on table and venue qr codes.
    pub selectable_staff: Vec<Staff>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct TipRequest {
    pub amount: i64,
    pub guest_pays_fee: bool,
    pub tip_type: Option<TipType>,
    pub staff_id: Option<u64>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct CreatedTip {
    pub tip: Tip,
    pub snap_token: String,
    pub redirect_url: String,
}

pub async fn resolve(db: &mut DatabaseConnection, short_code: &str) -> ServiceResult<TipContext> {
    let qr_code = db
        .get_qr_code_by_short_code(short_code)
        .await?
        .ok_or(ServiceError::NotFound("QR code not found"))?;

    let venue = db
        .get_venue_by_id(qr_code.venue_id)
        .await?
        .ok_or(ServiceError::NotFound("Venue not found"))?;

    if qr_code.status != QrStatus::Active {
        return Err(ServiceError::state("This QR code is no longer active"));
    }
    if !venue.accepts_tips() {
        return Err(ServiceError::state("This venue is not accepting tips"));
    }

    let staff = match (qr_code.qr_type, qr_code.staff_id) {
        (QrType::Personal, Some(staff_id)) => db.get_staff_by_id(staff_id).await?,
        _ => None,
    };

    let selectable_staff = if qr_code.qr_type != QrType::Personal && venue.allow_staff_choice {
        let mut staff = db.get_pool_participants(venue.id).await?;
        staff.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        staff
    } else {
        Vec::new()
    };

    Ok(TipContext {
        qr_code,
        venue,
        staff,
        selectable_staff,
    })
}

/// Receiver and type of a tip scanned from `context`.
fn resolve_target(context: &TipContext, request: &TipRequest) -> ServiceResult<(TipType, Option<u64>)> {
    if context.qr_code.qr_type == QrType::Personal {
        return match &context.staff {
            Some(staff) if staff.status == StaffStatus::Active => {
                Ok((TipType::Personal, Some(staff.id)))
            }
            _ => Err(ServiceError::state("This staff member is not accepting tips")),
        };
    }

    match (request.tip_type, request.staff_id) {
        (Some(TipType::Personal), Some(staff_id)) => {
            if !context.venue.allow_staff_choice {
                return Err(ServiceError::validation(
                    "This venue does not allow choosing a staff member",
                ));
            }
            if !context.selectable_staff.iter().any(|s| s.id == staff_id) {
                return Err(ServiceError::validation("Unknown staff member"));
            }
            Ok((TipType::Personal, Some(staff_id)))
        }
        _ => Ok((TipType::Pool, None)),
    }
}

/// `TIP-{venue}-{millis}-{random}`, unique enough to never collide in practice.
pub fn generate_order_id(venue_id: u64) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..10_000);
    format!(
        "TIP-{}-{}-{:04}",
        venue_id,
        Utc::now().timestamp_millis(),
        suffix
    )
}

fn build_snap_request(tip: &Tip, venue: &Venue, staff_name: Option<&str>) -> SnapRequest {
    let callback = |page: &str| format!("{}/tip/{}?order_id={}", env::BASE_URL.as_str(), page, tip.order_id);
    let name = match staff_name {
        Some(name) => format!("Tip for {name}"),
        None => format!("Tip for the team at {}", venue.name),
    };

    SnapRequest {
        transaction_details: TransactionDetails {
            order_id: tip.order_id.clone(),
            gross_amount: tip.amounts.total_amount,
        },
        item_details: vec![ItemDetails {
            id: tip.order_id.clone(),
            name: name.chars().take(50).collect(),
            price: tip.amounts.total_amount,
            quantity: 1,
        }],
        callbacks: Callbacks {
            finish: callback("success"),
            error: callback("error"),
            pending: callback("pending"),
        },
    }
}

/// Create a pending tip and open the hosted payment page for it.
///
/// A gateway failure leaves the pending tip in place.
pub async fn create_tip(
    db: &mut DatabaseConnection,
    gateway: &dyn PaymentGateway,
    short_code: &str,
    request: TipRequest,
) -> ServiceResult<CreatedTip> {
    let amounts = TipAmounts::compute(request.amount, request.guest_pays_fee)?;
    let context = resolve(db, short_code).await?;
    let (tip_type, staff_id) = resolve_target(&context, &request)?;

    let credentials = match &context.venue.credentials {
        Some(credentials) => GatewayCredentials::from_merchant(credentials)?,
        None => return Err(ServiceError::state("Payment is not configured for this venue")),
    };

    let tip = db
        .insert_tip(NewTip {
            venue_id: context.venue.id,
            qr_code_id: context.qr_code.id,
            staff_id,
            amounts,
            tip_type,
            order_id: generate_order_id(context.venue.id),
        })
        .await?;
    info!(
        "Created tip {} over {} at venue {}",
        tip.order_id, tip.amounts.total_amount, tip.venue_id
    );

    let staff_name = match staff_id {
        Some(id) if context.staff.as_ref().map(|s| s.id) == Some(id) => {
            context.staff.as_ref().map(|s| s.display_name.clone())
        }
        Some(id) => context
            .selectable_staff
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.display_name.clone()),
        None => None,
    };

    let snap_request = build_snap_request(&tip, &context.venue, staff_name.as_deref());
    let snap = gateway
        .create_transaction(&credentials, &snap_request)
        .await?;

    Ok(CreatedTip {
        tip,
        snap_token: snap.token,
        redirect_url: snap.redirect_url,
    })
}

/// Apply a gateway status to a tip. Unknown and pending statuses are ignored,
/// terminal tips never change.
pub async fn reconcile(
    db: &mut DatabaseConnection,
    order_id: &str,
    transaction_status: &str,
    payment_type: Option<&str>,
) -> ServiceResult<Option<Tip>> {
    match map_transaction_status(transaction_status) {
        Some(status) => db.transition_tip_status(order_id, status, payment_type).await,
        None => Ok(None),
    }
}

/// Process an asynchronous gateway notification.
pub async fn handle_notification(
    db: &mut DatabaseConnection,
    payload: serde_json::Value,
) -> ServiceResult<Option<Tip>> {
    let order_id = payload
        .get("order_id")
        .and_then(|value| value.as_str())
        .map(str::to_owned);
    db.store_webhook_log(order_id.as_deref(), &payload).await?;

    let notification: Notification = serde_json::from_value(payload)
        .map_err(|e| ServiceError::validation(format!("Invalid notification: {e}")))?;

    let tip = db
        .get_tip_by_order_id(&notification.order_id)
        .await?
        .ok_or(ServiceError::NotFound("Tip not found"))?;
    let venue = db
        .get_venue_by_id(tip.venue_id)
        .await?
        .ok_or(ServiceError::NotFound("Venue not found"))?;
    let credentials = venue
        .credentials
        .as_ref()
        .ok_or_else(|| ServiceError::state("Payment is not configured for this venue"))?;
    let credentials = GatewayCredentials::from_merchant(credentials)?;

    if !notification.verify_signature(&credentials.server_key) {
        warn!("Rejected notification for {} with invalid signature", notification.order_id);
        return Err(ServiceError::Forbidden);
    }

    reconcile(
        db,
        &notification.order_id,
        &notification.transaction_status,
        notification.payment_type.as_deref(),
    )
    .await
}

/// Current state of a tip for the guest's status page.
///
/// Pending tips are checked against the gateway first.
pub async fn poll_status(
    db: &mut DatabaseConnection,
    gateway: &dyn PaymentGateway,
    order_id: &str,
) -> ServiceResult<TipRecord> {
    let record = db
        .get_tip_record_by_order_id(order_id)
        .await?
        .ok_or(ServiceError::NotFound("Tip not found"))?;

    if record.tip.status != TipStatus::Pending {
        return Ok(record);
    }

    let credentials = match db.get_venue_by_id(record.tip.venue_id).await? {
        Some(Venue {
            credentials: Some(credentials),
            ..
        }) => GatewayCredentials::from_merchant(&credentials)?,
        _ => return Ok(record),
    };

    match gateway.transaction_status(&credentials, order_id).await {
        Ok(status) => {
            let updated = reconcile(
                db,
                order_id,
                &status.transaction_status,
                status.payment_type.as_deref(),
            )
            .await?;
            if updated.is_none() {
                return Ok(record);
            }
        }
        Err(err) => {
            warn!("Could not query gateway status of {}: {:?}", order_id, err);
            return Ok(record);
        }
    }

    db.get_tip_record_by_order_id(order_id)
        .await?
        .ok_or(ServiceError::NotFound("Tip not found"))
}
