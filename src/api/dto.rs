//! Wire representation of the model enums.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::models::{
    DistributionMode, GatewayEnvironment, PayoutStatus, QrStatus, QrType, Role, StaffRole,
    StaffStatus, TipStatus, TipType, VenueStatus, VenueType,
};

macro_rules! dto_enum {
    ($name:ident, $model:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize, JsonSchema)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl From<&$model> for $name {
            fn from(value: &$model) -> Self {
                match value {
                    $($model::$variant => $name::$variant),+
                }
            }
        }

        impl From<$name> for $model {
            fn from(value: $name) -> Self {
                match value {
                    $($name::$variant => $model::$variant),+
                }
            }
        }
    };
}

dto_enum!(RoleDto, Role {
    Admin => "ADMIN",
    Manager => "MANAGER",
    Staff => "STAFF",
});

dto_enum!(VenueStatusDto, VenueStatus {
    Draft => "DRAFT",
    Active => "ACTIVE",
    Blocked => "BLOCKED",
});

dto_enum!(VenueTypeDto, VenueType {
    Restaurant => "RESTAURANT",
    Cafe => "CAFE",
    Bar => "BAR",
    CoffeeShop => "COFFEE_SHOP",
    Other => "OTHER",
});

dto_enum!(DistributionModeDto, DistributionMode {
    Personal => "PERSONAL",
    Pooled => "POOLED",
});

dto_enum!(GatewayEnvironmentDto, GatewayEnvironment {
    Sandbox => "sandbox",
    Production => "production",
});

dto_enum!(StaffRoleDto, StaffRole {
    Waiter => "WAITER",
    Bartender => "BARTENDER",
    Barista => "BARISTA",
    Hostess => "HOSTESS",
    Other => "OTHER",
});

dto_enum!(StaffStatusDto, StaffStatus {
    Active => "ACTIVE",
    Inactive => "INACTIVE",
});

dto_enum!(QrTypeDto, QrType {
    Personal => "PERSONAL",
    Table => "TABLE",
    Venue => "VENUE",
});

dto_enum!(QrStatusDto, QrStatus {
    Active => "ACTIVE",
    Inactive => "INACTIVE",
});

dto_enum!(TipTypeDto, TipType {
    Personal => "PERSONAL",
    Pool => "POOL",
});

dto_enum!(TipStatusDto, TipStatus {
    Pending => "PENDING",
    Paid => "PAID",
    Failed => "FAILED",
});

dto_enum!(PayoutStatusDto, PayoutStatus {
    Pending => "PENDING",
    Paid => "PAID",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dto_enum_wire_names() {
        assert_eq!(
            serde_json::to_string(&VenueTypeDto::from(&VenueType::CoffeeShop)).unwrap(),
            "\"COFFEE_SHOP\""
        );
        assert_eq!(
            serde_json::from_str::<GatewayEnvironmentDto>("\"sandbox\"").unwrap(),
            GatewayEnvironmentDto::Sandbox
        );
        assert_eq!(TipStatus::from(TipStatusDto::Failed), TipStatus::Failed);
        assert!(serde_json::from_str::<QrTypeDto>("\"personal\"").is_err());
    }
}
