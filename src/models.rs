use std::fmt::Debug;

use chrono::{DateTime, NaiveDate, Utc};

/// Declares a plain enum that is persisted as upper case text.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            pub fn parse(value: &str) -> Option<Self> {
                match value {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

text_enum!(Role {
    Admin => "ADMIN",
    Manager => "MANAGER",
    Staff => "STAFF",
});

text_enum!(VenueStatus {
    Draft => "DRAFT",
    Active => "ACTIVE",
    Blocked => "BLOCKED",
});

text_enum!(VenueType {
    Restaurant => "RESTAURANT",
    Cafe => "CAFE",
    Bar => "BAR",
    CoffeeShop => "COFFEE_SHOP",
    Other => "OTHER",
});

text_enum!(
    /// How tips from non personal qr codes are attributed.
    DistributionMode {
        Personal => "PERSONAL",
        Pooled => "POOLED",
    }
);

text_enum!(GatewayEnvironment {
    Sandbox => "sandbox",
    Production => "production",
});

text_enum!(StaffRole {
    Waiter => "WAITER",
    Bartender => "BARTENDER",
    Barista => "BARISTA",
    Hostess => "HOSTESS",
    Other => "OTHER",
});

text_enum!(StaffStatus {
    Active => "ACTIVE",
    Inactive => "INACTIVE",
});

text_enum!(QrType {
    Personal => "PERSONAL",
    Table => "TABLE",
    Venue => "VENUE",
});

text_enum!(QrStatus {
    Active => "ACTIVE",
    Inactive => "INACTIVE",
});

text_enum!(TipType {
    Personal => "PERSONAL",
    Pool => "POOL",
});

text_enum!(
    /// Lifecycle of a tip. `Pending` is the only non terminal state.
    TipStatus {
        Pending => "PENDING",
        Paid => "PAID",
        Failed => "FAILED",
    }
);

text_enum!(PayoutStatus {
    Pending => "PENDING",
    Paid => "PAID",
});

impl TipStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TipStatus::Pending)
    }
}

#[derive(PartialEq, Clone)]
pub struct User {
    pub id: u64,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password_hash: Option<Vec<u8>>,
    pub role: Role,
}

impl Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("phone", &self.phone)
            .field("role", &self.role)
            .finish()
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Session {
    pub user: User,
    pub token: String,
    pub valid_until: DateTime<Utc>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct OtpCode {
    pub id: u64,
    pub contact: String,
    pub code: String,
    pub valid_until: DateTime<Utc>,
    pub used: bool,
}

/// Merchant account of a venue at the payment gateway.
///
/// The server key is kept encrypted, see `crypto::decrypt_secret`.
#[derive(PartialEq, Clone)]
pub struct MerchantCredentials {
    pub merchant_id: String,
    pub server_key_encrypted: String,
    pub client_key: String,
    pub environment: GatewayEnvironment,
}

impl Debug for MerchantCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MerchantCredentials")
            .field("merchant_id", &self.merchant_id)
            .field("environment", &self.environment)
            .finish()
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Venue {
    pub id: u64,
    pub name: String,
    pub venue_type: VenueType,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub logo_url: Option<String>,
    pub timezone: String,
    pub manager_id: u64,
    pub status: VenueStatus,
    pub gateway_connected: bool,
    pub credentials: Option<MerchantCredentials>,
    pub distribution_mode: DistributionMode,
    pub allow_staff_choice: bool,
    pub created_at: DateTime<Utc>,
}

impl Venue {
    /// A venue accepts tips only when it is active and its merchant account is connected.
    pub fn accepts_tips(&self) -> bool {
        self.status == VenueStatus::Active && self.gateway_connected && self.credentials.is_some()
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Staff {
    pub id: u64,
    pub venue_id: u64,
    pub user_id: Option<u64>,
    pub display_name: String,
    pub full_name: Option<String>,
    pub role: StaffRole,
    pub avatar_url: Option<String>,
    pub participates_in_pool: bool,
    pub status: StaffStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct QrCode {
    pub id: u64,
    pub venue_id: u64,
    pub short_code: String,
    pub qr_type: QrType,
    pub label: String,
    pub status: QrStatus,
    pub staff_id: Option<u64>,
    pub created_at: DateTime<Utc>,
}

/// Fee split of a single tip, see `fees::TipAmounts::compute`.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct TipAmounts {
    /// Tip amount excluding the fee the guest might pay on top.
    pub amount: i64,
    pub platform_fee: i64,
    pub net_amount: i64,
    /// Amount charged at the payment gateway.
    pub total_amount: i64,
    pub guest_pays_fee: bool,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Tip {
    pub id: u64,
    pub venue_id: u64,
    pub qr_code_id: u64,
    pub staff_id: Option<u64>,
    pub amounts: TipAmounts,
    pub tip_type: TipType,
    pub status: TipStatus,
    pub order_id: String,
    pub payment_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct TipAllocation {
    pub id: u64,
    pub tip_id: u64,
    pub staff_id: u64,
    pub amount: i64,
    pub date: DateTime<Utc>,
    pub payout_id: Option<u64>,
    pub status: PayoutStatus,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Payout {
    pub id: u64,
    pub venue_id: u64,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub total_amount: i64,
    pub status: PayoutStatus,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct WebhookLog {
    pub id: u64,
    pub order_id: Option<String>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Tip joined with the names shown in listings.
#[derive(Debug, PartialEq, Clone)]
pub struct TipRecord {
    pub tip: Tip,
    pub venue_name: String,
    pub staff_name: Option<String>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct StaffSummary {
    pub staff: Staff,
    pub qr_code: Option<QrCode>,
    pub tip_count: i64,
}

#[derive(Debug, PartialEq, Clone)]
pub struct QrCodeSummary {
    pub qr_code: QrCode,
    pub staff: Option<Staff>,
    pub tip_count: i64,
}

#[derive(Debug, PartialEq, Clone)]
pub struct VenueActivity {
    pub venue: Venue,
    pub staff_count: i64,
    /// Sum of the amounts of all paid tips.
    pub total_volume: i64,
    pub last_activity: Option<DateTime<Utc>>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct AllocationRecord {
    pub allocation: TipAllocation,
    pub staff_display_name: String,
    pub staff_role: StaffRole,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub struct PlatformStats {
    pub total_venues: i64,
    pub active_venues: i64,
    pub total_transactions: i64,
    pub total_volume: i64,
    pub today_transactions: i64,
    pub failed_today: i64,
}
