use thiserror::Error;

/// Declares a closed set of string-valued states stored as `TEXT` columns.
///
/// Generates `as_str`, `Display`, `FromStr`, serde renames and the sqlx
/// encode/decode glue so the enum can sit directly on a `FromRow` struct.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* #[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::models::ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err($crate::models::ParseEnumError {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl sqlx::Type<sqlx::Postgres> for $name {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <&str as sqlx::Type<sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
                <&str as sqlx::Type<sqlx::Postgres>>::compatible(ty)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Postgres> for $name {
            fn decode(
                value: sqlx::postgres::PgValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let text = <&str as sqlx::Decode<'r, sqlx::Postgres>>::decode(value)?;
                Ok(text.parse()?)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Postgres> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut sqlx::postgres::PgArgumentBuffer,
            ) -> sqlx::encode::IsNull {
                <&str as sqlx::Encode<'q, sqlx::Postgres>>::encode_by_ref(&self.as_str(), buf)
            }
        }
    };
}

mod audit_log;
mod billing_item;
mod billing_settings;
mod customer;
mod handover;
mod invoice;
mod job;
mod leave_request;
mod user;

pub use audit_log::AuditLog;
pub use billing_item::{BillingItem, BillingItemType, NewBillingItem};
pub use billing_settings::{
    BankDetails, BillingSettings, CompanyDetails, EmailTemplates, MAX_PAYMENT_TERMS_DAYS,
};
pub use customer::{normalize_contacts, Customer, CustomerContact, CustomerStatus, NewCustomer};
pub use handover::{Handover, HandoverReason, HandoverSignature};
pub use invoice::{BillingAddress, InvoiceStatus, JobInvoice, Payment};
pub use job::{Job, JobNote, JobStage, JobStatus, LegReport, NewJob};
pub use leave_request::{LeaveRequest, LeaveStatus, LeaveType, NewLeaveRequest};
pub use user::{NewUser, Permission, Permissions, Role, User, UserStatus};

/// A stored string did not name any variant of the target enum.
#[derive(Debug, Error)]
#[error("unknown {kind} `{value}`")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Rounds a money amount to whole pence.
pub fn round_money(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
